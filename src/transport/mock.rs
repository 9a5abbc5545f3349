//! Transport double for state machine and routing tests.

use super::Transport;
use crate::{Error, Result};
use rsip::headers::Via;
use rsip::prelude::UntypedHeader;
use rsip::{Request, Response, Uri};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Records everything the core emits; never touches the network.
#[derive(Default)]
pub(crate) struct MockTransport {
    pub sent: Mutex<Vec<Request>>,
    pub resent: Mutex<Vec<Request>>,
    pub responses: Mutex<Vec<Response>>,
    pub fail_resend: AtomicBool,
    pub local_hosts: Vec<String>,
}

impl MockTransport {
    pub fn with_local_hosts(hosts: &[&str]) -> Self {
        Self {
            local_hosts: hosts.iter().map(|h| h.to_string()).collect(),
            ..Self::default()
        }
    }
}

impl Transport for MockTransport {
    fn send_request(&self, request: &Request) -> Result<()> {
        self.sent.lock().unwrap().push(request.clone());
        Ok(())
    }

    fn resend_request(&self, request: &Request) -> Result<()> {
        if self.fail_resend.load(Ordering::Relaxed) {
            return Err(Error::ServiceUnavailable("mock resend failure".to_string()));
        }
        self.resent.lock().unwrap().push(request.clone());
        Ok(())
    }

    fn send_response(&self, response: &Response) -> Result<()> {
        self.responses.lock().unwrap().push(response.clone());
        Ok(())
    }

    fn add_via(&self, mut request: Request) -> Request {
        let via: rsip::Header =
            Via::new("SIP/2.0/UDP proxy.local.example.com:5060;branch=z9hG4bKmock".to_string())
                .into();
        let mut new_headers: Vec<rsip::Header> = vec![via];
        new_headers.extend(std::mem::take(&mut request.headers));
        request.headers = rsip::Headers::default();
        request.headers.extend(new_headers);
        request
    }

    fn is_local(&self, uri: &Uri) -> bool {
        self.local_hosts
            .contains(&uri.host_with_port.host.to_string())
    }
}
