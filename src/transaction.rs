//! The core's view of a transaction: the original request plus, on the
//! client side, the response currently being processed. Retransmission
//! timers and transaction matching live in the surrounding stack.

use crate::transport::SipAddr;
use rsip::{Request, Response};

/// Role this element played in the transaction carrying a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransactionRole {
    Client,
    Server,
}

#[derive(Clone, Debug)]
pub struct Transaction {
    pub role: TransactionRole,
    /// The request that opened the transaction.
    pub original: Request,
    /// Latest response received for a client transaction.
    pub response: Option<Response>,
    /// To-tag allocated locally before any response carried one; lets the
    /// dialog identity resolve for an INVITE still waiting for its answer.
    pub pending_to_tag: Option<String>,
    /// Resolved next-hop address, when the caller already knows it.
    pub destination: Option<SipAddr>,
}

impl Transaction {
    pub fn new_client(original: Request) -> Self {
        Self {
            role: TransactionRole::Client,
            original,
            response: None,
            pending_to_tag: None,
            destination: None,
        }
    }

    pub fn new_server(original: Request) -> Self {
        Self {
            role: TransactionRole::Server,
            ..Self::new_client(original)
        }
    }

    pub fn with_response(mut self, response: Response) -> Self {
        self.response = Some(response);
        self
    }
}
