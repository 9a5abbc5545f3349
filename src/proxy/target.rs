//! Normalization of proxy target specifications.
//!
//! Callers hand the routing engine anything from a single URI to a nested
//! list mixing URIs, comma-separated strings and sub-lists. Normalization
//! flattens that into an ordered sequence of groups: groups are tried
//! serially, URIs within a group fork in parallel.

use crate::rsip_ext::parse_uris;
use rsip::Uri;

/// Heterogeneous target specification accepted by the routing engine.
#[derive(Clone, Debug)]
pub enum TargetSpec {
    Uri(Uri),
    /// One or more URIs, comma separated. Unparseable entries are dropped.
    Text(String),
    List(Vec<TargetSpec>),
}

impl From<Uri> for TargetSpec {
    fn from(uri: Uri) -> Self {
        TargetSpec::Uri(uri)
    }
}

impl From<&str> for TargetSpec {
    fn from(text: &str) -> Self {
        TargetSpec::Text(text.to_string())
    }
}

/// Normalized target set: serial groups of parallel URIs.
///
/// `UriSet(vec![vec![]])` is the sentinel for "no routable target".
#[derive(Clone, Debug, PartialEq)]
pub struct UriSet(pub Vec<Vec<Uri>>);

impl UriSet {
    pub fn groups(&self) -> &[Vec<Uri>] {
        &self.0
    }

    /// First URI in serial order, if any.
    pub fn first_uri(&self) -> Option<&Uri> {
        self.0.iter().flat_map(|group| group.iter()).next()
    }

    /// True when no group holds a single URI.
    pub fn is_unroutable(&self) -> bool {
        self.0.iter().all(|group| group.is_empty())
    }
}

impl From<&UriSet> for TargetSpec {
    fn from(set: &UriSet) -> Self {
        TargetSpec::List(
            set.0
                .iter()
                .map(|group| {
                    TargetSpec::List(group.iter().cloned().map(TargetSpec::Uri).collect())
                })
                .collect(),
        )
    }
}

/// Canonicalize a target specification.
///
/// A flat list concatenates every URI into one parallel group. The presence
/// of any sub-list switches to multi mode, where each element becomes its
/// own serial group and sub-lists fork in parallel. Text that parses to no
/// URI yields the unroutable sentinel.
pub fn normalize(spec: &TargetSpec) -> UriSet {
    match spec {
        TargetSpec::Uri(uri) => UriSet(vec![vec![uri.clone()]]),
        TargetSpec::Text(text) => {
            let uris = parse_uris(text);
            if uris.is_empty() {
                UriSet(vec![vec![]])
            } else {
                UriSet(vec![uris])
            }
        }
        TargetSpec::List(items) => {
            let multi = items.iter().any(|item| matches!(item, TargetSpec::List(_)));
            if multi {
                UriSet(
                    items
                        .iter()
                        .map(|item| match item {
                            TargetSpec::Uri(uri) => vec![uri.clone()],
                            TargetSpec::Text(text) => parse_uris(text),
                            TargetSpec::List(inner) => flatten_group(inner),
                        })
                        .collect(),
                )
            } else {
                UriSet(vec![flatten_group(items)])
            }
        }
    }
}

fn flatten_group(items: &[TargetSpec]) -> Vec<Uri> {
    let mut uris = Vec::new();
    for item in items {
        match item {
            TargetSpec::Uri(uri) => uris.push(uri.clone()),
            TargetSpec::Text(text) => uris.extend(parse_uris(text)),
            TargetSpec::List(inner) => uris.extend(flatten_group(inner)),
        }
    }
    uris
}
