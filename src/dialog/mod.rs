use crate::transaction::Transaction;
use rsip::prelude::{HeadersExt, UntypedHeader};
use rsip::Method;

pub mod dialog;
pub mod request;
pub mod store;
pub mod uac;

#[cfg(test)]
mod tests;

/// SIP dialog identifier.
///
/// RFC 3261 identifies a dialog by (Call-ID, local tag, remote tag). Because
/// the UAC and the UAS look at the same pair of tags from opposite sides,
/// this identity hashes the tags in sorted order so both roles derive the
/// same value:
///
/// ```text
/// id = H(call_id, min(tag_a, tag_b), max(tag_a, tag_b))
/// ```
///
/// The id is an opaque 32-bit handle; the call-id and tags themselves live on
/// the [`dialog::Dialog`] record.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct DialogId(u32);

impl DialogId {
    /// Compute the identity for a (call-id, tag, tag) triple.
    ///
    /// Returns `None` when either tag is empty: a dialog does not exist
    /// until both sides have tagged themselves.
    pub fn new(call_id: &str, tag_a: &str, tag_b: &str) -> Option<Self> {
        if tag_a.is_empty() || tag_b.is_empty() {
            return None;
        }
        let (low, high) = if tag_a <= tag_b {
            (tag_a, tag_b)
        } else {
            (tag_b, tag_a)
        };
        let mut buf = Vec::with_capacity(call_id.len() + low.len() + high.len() + 2);
        buf.extend_from_slice(call_id.as_bytes());
        buf.push(0);
        buf.extend_from_slice(low.as_bytes());
        buf.push(0);
        buf.extend_from_slice(high.as_bytes());
        let digest = md5::compute(&buf);
        Some(DialogId(u32::from_be_bytes([
            digest[0], digest[1], digest[2], digest[3],
        ])))
    }

    /// Identity of the dialog a locally originated request belongs to.
    ///
    /// When the To header carries no tag yet, an INVITE may still resolve
    /// through the transaction's pending to-tag.
    pub fn from_request(tx: &Transaction) -> Option<Self> {
        let request = &tx.original;
        let call_id = request.call_id_header().ok()?.value().to_string();
        let from_tag = request
            .from_header()
            .ok()?
            .tag()
            .ok()
            .flatten()
            .map(|t| t.value().to_string())?;
        let to_tag = request
            .to_header()
            .ok()?
            .tag()
            .ok()
            .flatten()
            .map(|t| t.value().to_string())
            .or_else(|| {
                if request.method == Method::Invite {
                    tx.pending_to_tag.clone()
                } else {
                    None
                }
            })?;
        Self::new(&call_id, &from_tag, &to_tag)
    }

    /// Identity of the dialog a received response belongs to.
    pub fn from_response(tx: &Transaction) -> Option<Self> {
        let response = tx.response.as_ref()?;
        let call_id = response.call_id_header().ok()?.value().to_string();
        let from_tag = response
            .from_header()
            .ok()?
            .tag()
            .ok()
            .flatten()
            .map(|t| t.value().to_string())?;
        let to_tag = response
            .to_header()
            .ok()?
            .tag()
            .ok()
            .flatten()
            .map(|t| t.value().to_string())
            .or_else(|| {
                if tx.original.method == Method::Invite {
                    tx.pending_to_tag.clone()
                } else {
                    None
                }
            })?;
        Self::new(&call_id, &from_tag, &to_tag)
    }
}

impl std::fmt::Display for DialogId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}
