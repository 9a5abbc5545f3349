//! The transport seam consumed by the dialog core and the proxy engine.
//!
//! Wire transport (UDP/TCP/TLS sockets) lives outside this crate; the core
//! only needs a handful of operations, collected in the [`Transport`] trait.
//! Sends may block the caller but complete synchronously from the state
//! machine's point of view.

use crate::Result;
use rsip::{Request, Response, Uri};

#[cfg(test)]
pub(crate) mod mock;

/// Transport-level address of a SIP peer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SipAddr {
    pub r#type: Option<rsip::transport::Transport>,
    pub addr: rsip::HostWithPort,
}

impl std::fmt::Display for SipAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.r#type {
            Some(t) => write!(f, "{}://{}", t, self.addr),
            None => write!(f, "{}", self.addr),
        }
    }
}

impl TryFrom<&Uri> for SipAddr {
    type Error = crate::Error;

    fn try_from(uri: &Uri) -> Result<Self> {
        Ok(SipAddr {
            r#type: uri.transport().cloned(),
            addr: uri.host_with_port.clone(),
        })
    }
}

/// Operations the core requires from the transport layer.
pub trait Transport: Send + Sync {
    /// Send a freshly built request.
    fn send_request(&self, request: &Request) -> Result<()>;

    /// Retransmit a previously sent request verbatim (stored ACK replay).
    fn resend_request(&self, request: &Request) -> Result<()>;

    /// Relay a response towards the next Via hop.
    fn send_response(&self, response: &Response) -> Result<()>;

    /// Push this element's Via on top of the request.
    fn add_via(&self, request: Request) -> Request;

    /// Whether the URI resolves to an address this element listens on.
    fn is_local(&self, uri: &Uri) -> bool;
}
