//! Dialog and routing core of a SIP (RFC 3261) signaling stack.
//!
//! `sipflow` owns two things:
//!
//! * the client-side (UAC) dialog state machine: how an INVITE conversation
//!   advances across provisional, accepted, confirmed and terminated states,
//!   how CSeq numbers move, how an ACK is matched to its 2xx and how
//!   retransmitted final answers are absorbed;
//! * the proxy routing engine: normalizing a target specification into
//!   serial/parallel fork groups, preprocessing Via/Route/Max-Forwards and
//!   dispatching a request statefully or statelessly.
//!
//! The crate consumes parsed [`rsip`] messages and emits outbound messages
//! through the [`transport::Transport`] seam. It performs no I/O and keeps no
//! state outside the per-call [`call::CallState`].

pub mod call;
pub mod config;
pub mod dialog;
pub mod error;
pub mod proxy;
pub mod rsip_ext;
pub mod transaction;
pub mod transport;

pub use config::CoreOption;
pub use error::{Error, Result};

/// Remove the topmost header of the given variant from a header list.
///
/// Used when relaying a response: the proxy pops the Via it contributed
/// before passing the response further down.
#[macro_export]
macro_rules! header_pop {
    ($headers:expr, $header:path) => {
        let mut popped = false;
        $headers.retain(|h| {
            if popped {
                return true;
            }
            if matches!(h, $header(_)) {
                popped = true;
                return false;
            }
            true
        });
    };
}
