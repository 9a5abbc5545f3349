use crate::{Error, Result};
use rand::Rng;
use rsip::Method;

/// Behavior knobs shared by every call owned by one application instance.
#[derive(Clone, Debug)]
pub struct CoreOption {
    pub user_agent: String,
    /// Max-Forwards inserted when a proxied request carries none.
    pub max_forwards: u32,
    /// Methods advertised in Allow when answering an OPTIONS probe.
    pub allow: Vec<Method>,
    /// Tokens advertised in Supported.
    pub supported: Vec<String>,
    /// Media types advertised in Accept.
    pub accept: Vec<String>,
    /// Log a dropped stateless response (no Via left) at error level
    /// instead of info.
    pub strict_response_drop: bool,
}

impl Default for CoreOption {
    fn default() -> Self {
        Self {
            user_agent: format!("sipflow/{}", env!("CARGO_PKG_VERSION")),
            max_forwards: 70,
            allow: vec![
                Method::Invite,
                Method::Ack,
                Method::Cancel,
                Method::Bye,
                Method::Options,
            ],
            supported: vec!["100rel".to_string(), "path".to_string()],
            accept: vec!["application/sdp".to_string()],
            strict_response_drop: false,
        }
    }
}

impl CoreOption {
    pub fn validate(&self) -> Result<()> {
        if self.max_forwards == 0 || self.max_forwards > 255 {
            return Err(Error::InvalidConfig(format!(
                "max_forwards out of range: {}",
                self.max_forwards
            )));
        }
        if self.user_agent.is_empty() {
            return Err(Error::InvalidConfig("empty user agent".to_string()));
        }
        Ok(())
    }
}

/// Fresh CSeq seed for a dialog with no prior local sequence
/// (RFC 3261 section 8.1.1.5 recommends starting below 2^31).
pub fn fresh_cseq_seed() -> u32 {
    rand::rng().random_range(1..(1u32 << 31))
}
