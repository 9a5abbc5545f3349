use super::DialogId;
use crate::rsip_ext::extract_uri_from_contact;
use crate::transaction::Transaction;
use crate::transport::SipAddr;
use crate::{Error, Result};
use rsip::headers::Route;
use rsip::prelude::{HeadersExt, UntypedHeader};
use rsip::{Header, Request, Response, Uri};
use std::time::SystemTime;
use tracing::debug;

/// Dialog lifecycle status.
///
/// The `Uac`/`Uas` suffix records which side drove the transition: a dialog
/// is `ProceedingUac` while a locally originated INVITE collects provisional
/// answers and `AcceptedUac` once a 2xx arrived but the ACK has not been sent
/// yet. `Stop` is terminal; a stopped dialog absorbs every further event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DialogStatus {
    Init,
    ProceedingUac,
    ProceedingUas,
    AcceptedUac,
    AcceptedUas,
    Confirmed,
    Bye,
    Stop,
}

impl DialogStatus {
    pub fn is_stop(&self) -> bool {
        matches!(self, DialogStatus::Stop)
    }
}

impl std::fmt::Display for DialogStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DialogStatus::Init => "init",
            DialogStatus::ProceedingUac => "proceeding_uac",
            DialogStatus::ProceedingUas => "proceeding_uas",
            DialogStatus::AcceptedUac => "accepted_uac",
            DialogStatus::AcceptedUas => "accepted_uas",
            DialogStatus::Confirmed => "confirmed",
            DialogStatus::Bye => "bye",
            DialogStatus::Stop => "stop",
        };
        f.write_str(name)
    }
}

/// Why a dialog reached [`DialogStatus::Stop`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// Terminated by a status code: the 408/481 kill codes, a final error
    /// answer to the initial INVITE, or 503 when an ACK replay failed.
    Code(u16),
    /// BYE sent by this side.
    CallerBye,
    /// BYE received from the peer.
    CalleeBye,
}

/// An RFC 3261 section 12 dialog, client side.
///
/// The record keeps everything subsequent in-dialog requests need: the AoR
/// URIs with their tags, the current remote target, the loose-routing route
/// set, and both CSeq counters. It also retains the latest INVITE exchange
/// (`request`/`response`) so an ACK can be built, and the last ACK sent so a
/// retransmitted 2xx can be answered by replaying it verbatim.
#[derive(Clone, Debug)]
pub struct Dialog {
    pub id: DialogId,
    pub app_id: String,
    pub call_id: String,
    pub status: DialogStatus,

    pub local_seq: u32,
    pub remote_seq: u32,

    pub local_uri: Uri,
    pub remote_uri: Uri,
    pub local_tag: String,
    pub remote_tag: String,

    pub local_target: Uri,
    pub remote_target: Uri,
    pub route_set: Vec<Route>,

    pub secure: bool,
    pub early: bool,

    /// Latest INVITE sent on this dialog.
    pub request: Option<Request>,
    /// Latest response to that INVITE.
    pub response: Option<Response>,
    /// Last ACK emitted for the current INVITE; cleared on a fresh INVITE.
    pub ack: Option<Request>,

    /// When the first 2xx was seen.
    pub answered: Option<SystemTime>,
    pub stop_reason: Option<StopReason>,

    /// Peer transport endpoint learned from the response Via.
    pub remote_addr: Option<SipAddr>,

    pub local_sdp: Option<Vec<u8>>,
    pub remote_sdp: Option<Vec<u8>>,

    pub created: SystemTime,
    pub updated: SystemTime,
}

impl Dialog {
    /// Create the UAC side of a dialog from a locally originated INVITE and
    /// the response that established it (RFC 3261 section 12.1.2).
    ///
    /// The route set comes from the response's Record-Route headers in
    /// reverse order; the remote target from its Contact. The record starts
    /// in `Init`: the caller feeds the establishing response through the
    /// state machine right after inserting it.
    pub fn new_uac(app_id: &str, tx: &Transaction, response: &Response) -> Result<Self> {
        let request = &tx.original;
        let call_id = request.call_id_header()?.value().to_string();

        let from = request.from_header()?;
        let local_tag = from
            .tag()?
            .map(|t| t.value().to_string())
            .ok_or_else(|| Error::SipMessage("from tag not found".to_string()))?;
        let remote_tag = response
            .to_header()?
            .tag()?
            .map(|t| t.value().to_string())
            .or_else(|| tx.pending_to_tag.clone())
            .ok_or_else(|| Error::SipMessage("to tag not found".to_string()))?;

        let id = DialogId::new(&call_id, &local_tag, &remote_tag)
            .ok_or_else(|| Error::SipMessage("empty dialog tag".to_string()))?;

        let local_uri = from.uri()?;
        let remote_uri = request.to_header()?.uri()?;

        let local_target = request
            .contact_header()
            .ok()
            .and_then(|c| extract_uri_from_contact(c.value()).ok())
            .unwrap_or_else(|| local_uri.clone());
        let remote_target = response
            .contact_header()
            .ok()
            .and_then(|c| extract_uri_from_contact(c.value()).ok())
            .unwrap_or_else(|| request.uri.clone());

        let mut route_set: Vec<Route> = response
            .headers
            .iter()
            .filter_map(|header| match header {
                Header::RecordRoute(rr) => Some(Route::from(rr.value().to_string())),
                _ => None,
            })
            .collect();
        route_set.reverse();

        let local_seq = request.cseq_header()?.seq()?;
        let secure = matches!(request.uri.scheme, Some(rsip::Scheme::Sips));
        let now = SystemTime::now();

        debug!(%id, call_id, "uac dialog created");
        Ok(Self {
            id,
            app_id: app_id.to_string(),
            call_id,
            status: DialogStatus::Init,
            local_seq,
            remote_seq: 0,
            local_uri,
            remote_uri,
            local_tag,
            remote_tag,
            local_target,
            remote_target,
            route_set,
            secure,
            early: true,
            request: Some(request.clone()),
            response: None,
            ack: None,
            answered: None,
            stop_reason: None,
            remote_addr: None,
            local_sdp: (!request.body.is_empty()).then(|| request.body.clone()),
            remote_sdp: None,
            created: now,
            updated: now,
        })
    }

    /// Move to a new status. A stopped dialog ignores the transition.
    pub fn set_status(&mut self, status: DialogStatus) {
        if self.status.is_stop() {
            debug!(id = %self.id, target = %status, "dialog already stopped, ignoring transition");
            return;
        }
        debug!(id = %self.id, from = %self.status, to = %status, "dialog transition");
        self.status = status;
        self.touch();
    }

    /// Terminate the dialog. Terminal: later transitions are ignored.
    pub fn stop(&mut self, reason: StopReason) {
        if self.status.is_stop() {
            return;
        }
        debug!(id = %self.id, ?reason, "dialog stopped");
        self.status = DialogStatus::Stop;
        self.stop_reason = Some(reason);
        self.touch();
    }

    /// Refresh the remote target from a response Contact, when present.
    pub fn update_remote_target(&mut self, response: &Response) {
        if let Ok(contact) = response.contact_header() {
            if let Ok(uri) = extract_uri_from_contact(contact.value()) {
                self.remote_target = uri;
            }
        }
    }

    /// Re-learn the route set from a dialog-establishing 2xx, so subsequent
    /// in-dialog requests reuse the proxy chain recorded there.
    pub fn update_route_set(&mut self, response: &Response) {
        let mut route_set: Vec<Route> = response
            .headers
            .iter()
            .filter_map(|header| match header {
                Header::RecordRoute(rr) => Some(Route::from(rr.value().to_string())),
                _ => None,
            })
            .collect();
        if route_set.is_empty() {
            return;
        }
        route_set.reverse();
        self.route_set = route_set;
    }

    pub(crate) fn touch(&mut self) {
        self.updated = SystemTime::now();
    }
}
