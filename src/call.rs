//! Per-call ownership and scheduling.
//!
//! Each call (Call-ID + owning application instance) is owned by a single
//! task that serializes every mutation of its dialog store: the state machine
//! is single-threaded per call, and parallelism comes from running many call
//! tasks. Events arrive through a single-consumer mailbox and are processed
//! strictly in arrival order.

use crate::config::CoreOption;
use crate::dialog::dialog::StopReason;
use crate::dialog::store::DialogStore;
use crate::dialog::DialogId;
use crate::transaction::Transaction;
use crate::transport::Transport;
use crate::Result;
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Events delivered to a call's mailbox.
#[derive(Debug)]
pub enum CallEvent {
    /// A locally originated request is about to be sent.
    UacRequest(Transaction),
    /// A locally originated ACK is about to be sent.
    UacAck(Transaction),
    /// A response arrived for a request this side originated.
    UacResponse(Transaction),
    /// The transaction layer gave up on a request for this dialog.
    Timeout(DialogId),
}

/// State owned by one call: its dialog store plus the collaborators the
/// state machine needs.
pub struct CallState {
    pub app_id: String,
    pub call_id: String,
    pub dialogs: DialogStore,
    pub option: CoreOption,
    pub transport: Arc<dyn Transport>,
}

impl CallState {
    pub fn new(
        app_id: impl Into<String>,
        call_id: impl Into<String>,
        transport: Arc<dyn Transport>,
        option: CoreOption,
    ) -> Result<Self> {
        option.validate()?;
        Ok(Self {
            app_id: app_id.into(),
            call_id: call_id.into(),
            dialogs: DialogStore::new(),
            option,
            transport,
        })
    }

    /// Route one event into the state machine. Errors from caller-initiated
    /// requests surface through the synchronous entry points; inside the
    /// event loop they are only logged.
    pub fn dispatch(&mut self, event: CallEvent) {
        match event {
            CallEvent::UacRequest(tx) => {
                if let Err(e) = self.handle_uac_request(&tx) {
                    info!(call_id = %self.call_id, error = %e, "uac request rejected");
                }
            }
            CallEvent::UacAck(tx) => self.handle_uac_ack(&tx),
            CallEvent::UacResponse(tx) => self.handle_uac_response(&tx),
            CallEvent::Timeout(id) => self.handle_timeout(id),
        }
    }

    /// Transaction-layer timeout for a dialog, routed through the 408 path.
    pub fn handle_timeout(&mut self, id: DialogId) {
        let Some(dialog) = self.dialogs.find_mut(id) else {
            debug!(%id, "timeout for unknown dialog");
            return;
        };
        dialog.stop(StopReason::Code(408));
        self.dialogs.remove(id);
    }
}

pub type CallEventSender = UnboundedSender<CallEvent>;

/// A call task: the single consumer of the per-call mailbox.
pub struct Call {
    pub state: CallState,
    events: UnboundedReceiver<CallEvent>,
    cancel: CancellationToken,
}

impl Call {
    pub fn new(state: CallState, cancel: CancellationToken) -> (Self, CallEventSender) {
        let (sender, events) = unbounded_channel();
        (
            Self {
                state,
                events,
                cancel,
            },
            sender,
        )
    }

    /// Consume events until the mailbox closes or the call is cancelled.
    /// Returns the final state so the owner can inspect surviving dialogs.
    pub async fn serve(mut self) -> CallState {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!(call_id = %self.state.call_id, "call cancelled");
                    break;
                }
                event = self.events.recv() => match event {
                    Some(event) => self.state.dispatch(event),
                    None => break,
                },
            }
        }
        self.state
    }
}
