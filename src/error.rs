use crate::dialog::DialogId;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors surfaced by the dialog core.
///
/// SIP-level rejections produced by the proxy engine (480/482/483/…) are not
/// errors of this API; they are [`crate::proxy::Reply`] values handed back to
/// the transaction layer.
#[derive(Debug, Error)]
pub enum Error {
    /// No dialog is stored under the given identity.
    #[error("unknown dialog {0}")]
    UnknownDialog(DialogId),

    /// The dialog has terminated; the operation can never succeed.
    #[error("dialog finished")]
    Finished,

    /// A second INVITE was issued while one is still in flight
    /// (RFC 3261 section 14.1, 491 semantics).
    #[error("request pending in dialog {0}")]
    RequestPending(DialogId),

    /// The operation is illegal in the dialog's current status,
    /// e.g. building an ACK before a 2xx was received.
    #[error("operation not allowed in dialog {0}")]
    InvalidDialog(DialogId),

    #[error("invalid uri: {0}")]
    InvalidUri(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The transport layer could not deliver a message.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("sip message error: {0}")]
    SipMessage(String),
}

impl From<rsip::Error> for Error {
    fn from(e: rsip::Error) -> Self {
        Error::SipMessage(e.to_string())
    }
}
