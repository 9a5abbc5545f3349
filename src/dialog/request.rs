//! Outbound in-dialog request assembly.
//!
//! The builder does not serialize anything: it resolves the CSeq, Contact,
//! route and header decisions against the stored dialog and returns an
//! assembly plan for the sending side.

use super::dialog::DialogStatus;
use super::DialogId;
use crate::call::CallState;
use crate::config::fresh_cseq_seed;
use crate::rsip_ext::parse_uris;
use crate::{Error, Result};
use rsip::headers::Route;
use rsip::prelude::HeadersExt;
use rsip::{Header, Method, Uri};
use tracing::debug;

/// Caller-supplied knobs for an in-dialog request.
#[derive(Clone, Debug, Default)]
pub struct RequestOption {
    /// Explicit CSeq number; 0 selects the dialog's next sequence.
    pub cseq: u32,
    /// Ask the sending side to synthesize a Contact from the local endpoint.
    pub make_contact: bool,
    /// Explicit Contact URI list, comma separated. Input that parses to no
    /// URI is discarded and the dialog's local target is used instead.
    pub contact: Option<String>,
    /// Extra headers appended after the dialog-derived ones.
    pub headers: Vec<Header>,
    pub body: Option<Vec<u8>>,
}

/// Contact selection for an outbound in-dialog request.
#[derive(Clone, Debug, PartialEq)]
pub enum ContactSpec {
    /// The sending side builds a Contact from the local endpoint address.
    Make,
    Uris(Vec<Uri>),
}

/// Assembly plan for an outbound in-dialog request.
#[derive(Clone, Debug)]
pub struct DialogRequest {
    pub app_id: String,
    pub method: Method,
    /// Request target: the dialog's current remote target.
    pub uri: Uri,
    pub from: rsip::typed::From,
    pub to: rsip::typed::To,
    pub call_id: String,
    pub cseq: u32,
    pub route: Vec<Route>,
    pub contact: ContactSpec,
    /// Headers that must precede the caller's extras; carries the
    /// credentials copied from the INVITE onto its ACK.
    pub pre_headers: Vec<Header>,
    pub headers: Vec<Header>,
    pub body: Option<Vec<u8>>,
}

impl CallState {
    /// Build an outbound request inside an established dialog.
    ///
    /// CSeq advance follows RFC 3261 section 12.2.1.1: an auto-numbered ACK
    /// reuses the INVITE's CSeq, any other auto-numbered request takes the
    /// next local sequence (seeding it randomly for a dialog that never sent
    /// one), and an explicit CSeq is emitted verbatim without advancing the
    /// stored counter.
    ///
    /// Building an ACK is only legal while the dialog waits in
    /// `accepted_uac`; the ACK also inherits any Authorization and
    /// Proxy-Authorization headers of the INVITE it acknowledges.
    pub fn make_dialog_request(
        &mut self,
        id: DialogId,
        method: Method,
        option: RequestOption,
    ) -> Result<DialogRequest> {
        let dialog = self.dialogs.find_mut(id).ok_or(Error::UnknownDialog(id))?;
        if method == Method::Ack && dialog.status != DialogStatus::AcceptedUac {
            return Err(Error::InvalidDialog(id));
        }

        let cseq = if option.cseq == 0 {
            if method == Method::Ack {
                dialog
                    .request
                    .as_ref()
                    .and_then(|r| r.cseq_header().ok())
                    .and_then(|c| c.seq().ok())
                    .ok_or(Error::InvalidDialog(id))?
            } else if dialog.local_seq > 0 {
                dialog.local_seq += 1;
                dialog.local_seq
            } else {
                let seed = fresh_cseq_seed();
                dialog.local_seq = seed;
                seed
            }
        } else {
            if dialog.local_seq == 0 {
                dialog.local_seq = option.cseq;
            }
            option.cseq
        };

        let contact = if option.make_contact {
            ContactSpec::Make
        } else {
            match option.contact.as_deref().map(parse_uris) {
                Some(uris) if !uris.is_empty() => ContactSpec::Uris(uris),
                _ => ContactSpec::Uris(vec![dialog.local_target.clone()]),
            }
        };

        let mut pre_headers = Vec::new();
        if method == Method::Ack {
            if let Some(invite) = dialog.request.as_ref() {
                for header in invite.headers.iter() {
                    if matches!(
                        header,
                        Header::Authorization(_) | Header::ProxyAuthorization(_)
                    ) {
                        pre_headers.push(header.clone());
                    }
                }
            }
        }

        let from = rsip::typed::From {
            display_name: None,
            uri: dialog.local_uri.clone(),
            params: vec![rsip::Param::Tag(dialog.local_tag.clone().into())],
        };
        let to = rsip::typed::To {
            display_name: None,
            uri: dialog.remote_uri.clone(),
            params: vec![rsip::Param::Tag(dialog.remote_tag.clone().into())],
        };
        let uri = dialog.remote_target.clone();
        let call_id = dialog.call_id.clone();
        let route = dialog.route_set.clone();
        dialog.touch();

        let mut headers = vec![Header::UserAgent(self.option.user_agent.clone().into())];
        headers.extend(option.headers);

        debug!(%id, %method, cseq, "in-dialog request built");
        Ok(DialogRequest {
            app_id: self.app_id.clone(),
            method,
            uri,
            from,
            to,
            call_id,
            cseq,
            route,
            contact,
            pre_headers,
            headers,
            body: option.body,
        })
    }

    /// ACK for the 2xx currently held by the dialog.
    pub fn make_ack(&mut self, id: DialogId) -> Result<DialogRequest> {
        self.make_dialog_request(id, Method::Ack, RequestOption::default())
    }

    pub fn make_bye(&mut self, id: DialogId) -> Result<DialogRequest> {
        self.make_dialog_request(id, Method::Bye, RequestOption::default())
    }
}
