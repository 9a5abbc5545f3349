//! Small extensions over [`rsip`] types used across the dialog and proxy
//! modules.

use crate::transport::SipAddr;
use crate::{Error, Result};
use rsip::prelude::UntypedHeader;
use rsip::{Param, Uri};

/// Extract the URI from a Contact header value, with or without angle
/// brackets or a display name.
pub fn extract_uri_from_contact(value: &str) -> Result<Uri> {
    let value = value.trim();
    let inner = match (value.find('<'), value.rfind('>')) {
        (Some(start), Some(end)) if start < end => &value[start + 1..end],
        _ => value.split(';').next().unwrap_or(value),
    };
    Uri::try_from(inner).map_err(|e| Error::InvalidUri(format!("{}: {}", inner, e)))
}

/// Parse a comma-separated list of URIs, dropping entries that do not parse.
pub fn parse_uris(text: &str) -> Vec<Uri> {
    text.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .filter_map(|part| {
            let inner = match (part.find('<'), part.rfind('>')) {
                (Some(start), Some(end)) if start < end => &part[start + 1..end],
                _ => part,
            };
            Uri::try_from(inner).ok()
        })
        .collect()
}

/// Derive the peer's transport address from a Via: sent-by host and port,
/// overridden by `received` and `rport` when the peer sits behind a NAT.
pub fn via_remote_addr(via: &rsip::typed::Via) -> SipAddr {
    let mut addr = via.uri.host_with_port.clone();
    for param in via.params.iter() {
        match param {
            Param::Received(received) => {
                if let Ok(host) = rsip::Host::try_from(received.value()) {
                    addr.host = host;
                }
            }
            Param::Other(name, Some(value)) if name.value().eq_ignore_ascii_case("rport") => {
                if let Ok(port) = value.value().parse::<u16>() {
                    addr.port = Some(port.into());
                }
            }
            _ => {}
        }
    }
    SipAddr {
        r#type: Some(via.transport),
        addr,
    }
}
