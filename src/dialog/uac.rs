//! Client-side (UAC) dialog state machine.
//!
//! Three entry points drive a dialog for requests this side originated:
//! [`CallState::handle_uac_request`] for an outgoing request about to be
//! sent, [`CallState::handle_uac_ack`] for an outgoing ACK, and
//! [`CallState::handle_uac_response`] for a received response. Transitions
//! fall into two buckets: unexpected responses in steady state are logged
//! and absorbed, while illegal caller-initiated requests return an error so
//! the caller can back off.

use super::dialog::{Dialog, DialogStatus, StopReason};
use super::DialogId;
use crate::call::CallState;
use crate::rsip_ext::via_remote_addr;
use crate::transaction::Transaction;
use crate::{Error, Result};
use rsip::prelude::{HeadersExt, ToTypedHeader};
use rsip::{Method, Response};
use std::time::SystemTime;
use tracing::{debug, info, warn};

impl CallState {
    /// Apply a locally originated request to its dialog before it is sent.
    ///
    /// An initial INVITE has no dialog yet and passes through; the dialog is
    /// created once the first response with a to-tag arrives. A non-INVITE
    /// request without a dialog is refused: the conversation it belonged to
    /// is gone.
    pub fn handle_uac_request(&mut self, tx: &Transaction) -> Result<()> {
        let method = tx.original.method.clone();
        if method == Method::Ack {
            // ACK has its own path, see handle_uac_ack
            return Ok(());
        }

        let Some(id) = DialogId::from_request(tx) else {
            // no dialog identity yet: an out-of-dialog request, nothing to do
            return Ok(());
        };
        let Some(dialog) = self.dialogs.find_mut(id) else {
            return if method == Method::Invite {
                Ok(())
            } else {
                Err(Error::Finished)
            };
        };

        let cseq = tx.original.cseq_header()?.seq()?;
        dialog.local_seq = dialog.local_seq.max(cseq);

        match (method, dialog.status) {
            (Method::Invite, DialogStatus::Confirmed) => {
                dialog.request = Some(tx.original.clone());
                dialog.ack = None;
                dialog.local_sdp = (!tx.original.body.is_empty()).then(|| tx.original.body.clone());
                dialog.set_status(DialogStatus::ProceedingUac);
                Ok(())
            }
            // only one INVITE may be in flight inside a dialog (RFC 3261 14.1)
            (Method::Invite, _) => Err(Error::RequestPending(dialog.id)),
            (Method::Bye, _) => {
                dialog.set_status(DialogStatus::Bye);
                Ok(())
            }
            (_, DialogStatus::Bye) | (_, DialogStatus::Stop) => Err(Error::Finished),
            _ => Ok(()),
        }
    }

    /// Record a locally emitted ACK.
    ///
    /// Only an ACK matching the current INVITE's CSeq while the dialog waits
    /// in `accepted_uac` confirms the dialog and is stored for later replay.
    /// Everything else is deliberately ignored: once confirmed, repeated 2xx
    /// answers are handled by [`handle_uac_response`] replaying the stored
    /// ACK, not by re-entering here.
    ///
    /// [`handle_uac_response`]: CallState::handle_uac_response
    pub fn handle_uac_ack(&mut self, tx: &Transaction) {
        let Some(id) = DialogId::from_request(tx) else {
            info!(call_id = %self.call_id, "ack without dialog identity ignored");
            return;
        };
        let Some(dialog) = self.dialogs.find_mut(id) else {
            info!(call_id = %self.call_id, %id, "ack for unknown dialog ignored");
            return;
        };

        let ack_cseq = tx.original.cseq_header().and_then(|c| c.seq()).ok();
        let invite_cseq = dialog
            .request
            .as_ref()
            .and_then(|r| r.cseq_header().ok())
            .and_then(|c| c.seq().ok());

        if dialog.status == DialogStatus::AcceptedUac
            && ack_cseq.is_some()
            && ack_cseq == invite_cseq
        {
            dialog.ack = Some(tx.original.clone());
            dialog.set_status(DialogStatus::Confirmed);
        } else {
            info!(
                %id,
                status = %dialog.status,
                ?ack_cseq,
                "ack ignored in current dialog state"
            );
        }
    }

    /// Process a response received for a request this side originated.
    ///
    /// A dialog springs into existence on the first 101..299 INVITE response
    /// carrying a to-tag; responses that match no dialog otherwise are
    /// dropped as benign retransmission noise.
    pub fn handle_uac_response(&mut self, tx: &Transaction) {
        let Some(response) = tx.response.as_ref() else {
            debug!(call_id = %self.call_id, "response event without response");
            return;
        };
        let code = u16::from(response.status_code.clone());
        let Some(id) = DialogId::from_response(tx) else {
            debug!(call_id = %self.call_id, code, "response without dialog identity dropped");
            return;
        };

        if self.dialogs.find(id).is_none() {
            let establishing =
                tx.original.method == Method::Invite && code > 100 && code < 300;
            if !establishing {
                debug!(%id, code, "response for unknown dialog dropped");
                return;
            }
            match Dialog::new_uac(&self.app_id, tx, response) {
                Ok(dialog) => self.dialogs.update(dialog),
                Err(e) => {
                    warn!(%id, error = %e, "failed to create uac dialog");
                    return;
                }
            }
        }

        self.do_response(id, tx, response, code);

        let stopped = match self.dialogs.find_mut(id) {
            Some(dialog) => {
                // remember where the peer actually answers from, for
                // dialog-level authentication of subsequent in-dialog requests
                if let Ok(via) = response.via_header() {
                    if let Ok(via) = via.clone().typed() {
                        dialog.remote_addr = Some(via_remote_addr(&via));
                    }
                }
                dialog.status.is_stop()
            }
            None => false,
        };
        if stopped {
            self.dialogs.remove(id);
        }
    }

    /// The response transition table.
    fn do_response(&mut self, id: DialogId, tx: &Transaction, response: &Response, code: u16) {
        let method = tx.original.method.clone();
        let transport = self.transport.clone();
        let Some(dialog) = self.dialogs.find_mut(id) else {
            return;
        };
        if dialog.status.is_stop() {
            debug!(%id, code, "response for stopped dialog ignored");
            return;
        }

        // 408 Request Timeout and 481 Call/Transaction Does Not Exist kill
        // the dialog whatever the method or state (RFC 3261 12.2.1.2)
        if code == 408 || code == 481 {
            dialog.stop(StopReason::Code(code));
            return;
        }
        if code < 101 {
            return;
        }

        match method {
            Method::Invite => match (code, dialog.status) {
                (101..=199, DialogStatus::Init | DialogStatus::ProceedingUac) => {
                    dialog.request = Some(tx.original.clone());
                    dialog.response = Some(response.clone());
                    dialog.ack = None;
                    dialog.early = true;
                    dialog.update_remote_target(response);
                    if !response.body.is_empty() {
                        dialog.remote_sdp = Some(response.body.clone());
                    }
                    dialog.set_status(DialogStatus::ProceedingUac);
                }
                (200..=299, DialogStatus::Init | DialogStatus::ProceedingUac) => {
                    dialog.request = Some(tx.original.clone());
                    dialog.response = Some(response.clone());
                    dialog.ack = None;
                    dialog.early = false;
                    if dialog.answered.is_none() {
                        dialog.answered = Some(SystemTime::now());
                    }
                    dialog.update_remote_target(response);
                    dialog.update_route_set(response);
                    if !response.body.is_empty() {
                        dialog.remote_sdp = Some(response.body.clone());
                    }
                    dialog.set_status(DialogStatus::AcceptedUac);
                }
                (200..=299, DialogStatus::AcceptedUac | DialogStatus::Confirmed) => {
                    // the peer did not see our ACK; replay the stored one
                    match dialog.ack.as_ref() {
                        Some(ack) => match transport.resend_request(ack) {
                            Ok(()) => debug!(%id, "retransmitted ack for repeated 2xx"),
                            Err(e) => {
                                warn!(%id, error = %e, "ack retransmission failed");
                                dialog.stop(StopReason::Code(503));
                            }
                        },
                        None => debug!(%id, "repeated 2xx before local ack, waiting"),
                    }
                }
                (300.., DialogStatus::Init | DialogStatus::ProceedingUac) => {
                    if dialog.answered.is_some() {
                        // the INVITE transaction failed but an earlier 2xx
                        // already answered the dialog; the dialog survives
                        dialog.set_status(DialogStatus::Confirmed);
                    } else {
                        dialog.stop(StopReason::Code(code));
                    }
                }
                _ => info!(
                    %id,
                    code,
                    status = %dialog.status,
                    "unexpected invite response ignored"
                ),
            },
            Method::Bye => {
                let from_tag = tx
                    .original
                    .from_header()
                    .ok()
                    .and_then(|f| f.tag().ok().flatten())
                    .map(|t| t.value().to_string());
                let reason = if from_tag.as_deref() == Some(dialog.local_tag.as_str()) {
                    StopReason::CallerBye
                } else {
                    StopReason::CalleeBye
                };
                dialog.stop(reason);
            }
            _ => {}
        }
    }
}
