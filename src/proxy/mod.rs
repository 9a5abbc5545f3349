//! Proxy routing engine.
//!
//! [`start`] takes an inbound server transaction and a target specification
//! and decides what happens to the request: a SIP-level reply, a stateless
//! forward to a single target, or a stateful fork across the normalized
//! target groups (performed by the forking layer around this core).

use crate::call::CallState;
use crate::config::CoreOption;
use crate::header_pop;
use crate::transaction::Transaction;
use rsip::headers::{MaxForwards, Route};
use rsip::prelude::{HeadersExt, ToTypedHeader, UntypedHeader};
use rsip::{Header, Method, Request, Response, StatusCode, Uri};
use tracing::{debug, error, info, warn};

pub mod target;


pub use target::{normalize, TargetSpec, UriSet};

/// Options accepted by [`start`].
///
/// A strongly typed bag: anything the engine does not know is not
/// expressible, so there is no runtime key validation.
#[derive(Clone, Debug, Default)]
pub struct ProxyOption {
    /// Forward without keeping transaction state.
    pub stateless: bool,
    /// Stay on the path of in-dialog requests (INVITE only).
    pub record_route: bool,
    /// Let the forking layer chase 3xx answers.
    pub follow_redirects: bool,
    /// Headers prepended to the forwarded request.
    pub headers: Vec<Header>,
    /// Route URIs prepended to the retained Route set.
    pub route: Vec<Uri>,
    /// Drop the request's existing Route set.
    pub remove_routes: bool,
    /// Drop all non-system headers.
    pub remove_headers: bool,
}

/// SIP-level reply the engine asks the transaction layer to send.
#[derive(Clone, Debug)]
pub struct Reply {
    pub status: StatusCode,
    pub headers: Vec<Header>,
    pub reason: Option<String>,
}

impl Reply {
    fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Vec::new(),
            reason: None,
        }
    }

    pub fn temporarily_unavailable() -> Self {
        Self::new(StatusCode::TemporarilyUnavailable)
    }

    pub fn too_many_hops() -> Self {
        Self::new(StatusCode::TooManyHops)
    }

    pub fn invalid_request() -> Self {
        Self::new(StatusCode::BadRequest)
    }

    pub fn loop_detected() -> Self {
        Self::new(StatusCode::LoopDetected)
    }

    pub fn bad_extension(tokens: String) -> Self {
        Self {
            status: StatusCode::BadExtension,
            headers: vec![Header::Unsupported(tokens.into())],
            reason: None,
        }
    }

    /// 200 answering an OPTIONS probe that arrived with Max-Forwards 0.
    pub fn options_reached(option: &CoreOption) -> Self {
        let allow = option
            .allow
            .iter()
            .map(|m| m.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        Self {
            status: StatusCode::OK,
            headers: vec![
                Header::Supported(option.supported.join(", ").into()),
                Header::Accept(option.accept.join(", ").into()),
                Header::Allow(allow.into()),
            ],
            reason: Some("Max Forwards".to_string()),
        }
    }
}

/// Decision of the routing engine.
#[derive(Clone, Debug)]
pub enum RouteAction {
    /// Fork the preprocessed request across the target groups; handed to
    /// the stateful forking layer together with the options it honors
    /// (`record_route`, `follow_redirects`).
    Stateful {
        request: Request,
        targets: UriSet,
        option: ProxyOption,
    },
    /// The request was forwarded statelessly; nothing left to do.
    Stateless,
    /// Answer the transaction with this reply.
    Reply(Reply),
}

/// Route an inbound request.
///
/// The target specification is normalized first; an unroutable result
/// answers 480. ACKs are forwarded statelessly to the first target since
/// they belong to no server transaction. Everything else is checked for
/// Max-Forwards exhaustion and unsupported Proxy-Require extensions, then
/// preprocessed and dispatched according to the `stateless` option.
pub fn start(
    tx: &Transaction,
    spec: &TargetSpec,
    option: &ProxyOption,
    call: &CallState,
) -> RouteAction {
    let targets = normalize(spec);
    let method = tx.original.method.clone();

    if targets.is_unroutable() {
        if method == Method::Ack {
            info!(call_id = %call.call_id, "ack without routable target");
        }
        return RouteAction::Reply(Reply::temporarily_unavailable());
    }

    let mut request = tx.original.clone();

    if method == Method::Ack {
        return match check_max_forwards(&request, &call.option) {
            MaxForwardsCheck::Routable => {
                preprocess(&mut request, option, &call.option);
                match targets.first_uri().cloned() {
                    Some(target) => route_stateless(call, request, target),
                    None => RouteAction::Reply(Reply::temporarily_unavailable()),
                }
            }
            MaxForwardsCheck::Reply(reply) => RouteAction::Reply(reply),
        };
    }

    if option.record_route && method == Method::Invite {
        debug!(call_id = %call.call_id, "record-route requested for invite fork");
    }

    if let MaxForwardsCheck::Reply(reply) = check_max_forwards(&request, &call.option) {
        return RouteAction::Reply(reply);
    }

    let unsupported = proxy_require_tokens(&request);
    if !unsupported.is_empty() {
        return RouteAction::Reply(Reply::bad_extension(unsupported.join(",")));
    }

    preprocess(&mut request, option, &call.option);

    if option.stateless {
        match targets.first_uri().cloned() {
            Some(target) => route_stateless(call, request, target),
            None => RouteAction::Reply(Reply::temporarily_unavailable()),
        }
    } else {
        RouteAction::Stateful {
            request,
            targets,
            option: option.clone(),
        }
    }
}

enum MaxForwardsCheck {
    Routable,
    Reply(Reply),
}

/// RFC 3261 section 16.6 step 3. A missing header counts as routable; the
/// preprocessing step will insert the configured default.
fn check_max_forwards(request: &Request, option: &CoreOption) -> MaxForwardsCheck {
    let header = request.headers.iter().find_map(|h| match h {
        Header::MaxForwards(mf) => Some(mf),
        _ => None,
    });
    let Some(max_forwards) = header else {
        return MaxForwardsCheck::Routable;
    };
    match max_forwards.num() {
        Ok(0) => {
            if request.method == Method::Options {
                MaxForwardsCheck::Reply(Reply::options_reached(option))
            } else {
                MaxForwardsCheck::Reply(Reply::too_many_hops())
            }
        }
        Ok(_) => MaxForwardsCheck::Routable,
        Err(_) => MaxForwardsCheck::Reply(Reply::invalid_request()),
    }
}

fn proxy_require_tokens(request: &Request) -> Vec<String> {
    let mut tokens = Vec::new();
    for header in request.headers.iter() {
        let value = match header {
            Header::ProxyRequire(pr) => pr.value().to_string(),
            Header::Other(name, value) if name.eq_ignore_ascii_case("proxy-require") => {
                value.clone()
            }
            _ => continue,
        };
        tokens.extend(
            value
                .split(',')
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty()),
        );
    }
    tokens
}

/// Rewrite the request for forwarding: decrement Max-Forwards, apply the
/// route and header removals/prepends from the options.
fn preprocess(request: &mut Request, option: &ProxyOption, core: &CoreOption) {
    let forwards = request
        .headers
        .iter()
        .find_map(|h| match h {
            Header::MaxForwards(mf) => mf.num().ok(),
            _ => None,
        })
        .unwrap_or(core.max_forwards);
    request
        .headers
        .retain(|h| !matches!(h, Header::MaxForwards(_)));
    request.headers.push(Header::MaxForwards(MaxForwards::from(
        forwards.saturating_sub(1),
    )));

    let retained: Vec<Route> = if option.remove_routes {
        Vec::new()
    } else {
        request
            .headers
            .iter()
            .filter_map(|h| match h {
                Header::Route(route) => Some(route.clone()),
                _ => None,
            })
            .collect()
    };
    request.headers.retain(|h| !matches!(h, Header::Route(_)));

    if option.remove_headers {
        request.headers.retain(is_system_header);
    }

    if !option.headers.is_empty() {
        let mut new_headers: Vec<Header> = option.headers.clone();
        new_headers.extend(std::mem::take(&mut request.headers));
        request.headers = rsip::Headers::default();
        request.headers.extend(new_headers);
    }

    let mut routes: Vec<Route> = option
        .route
        .iter()
        .map(|uri| Route::from(format!("<{}>", uri)))
        .collect();
    routes.extend(retained);
    for route in routes {
        request.headers.push(Header::Route(route));
    }
}

fn is_system_header(header: &Header) -> bool {
    matches!(
        header,
        Header::Via(_)
            | Header::From(_)
            | Header::To(_)
            | Header::CallId(_)
            | Header::CSeq(_)
            | Header::MaxForwards(_)
            | Header::Contact(_)
            | Header::Route(_)
            | Header::RecordRoute(_)
            | Header::ContentType(_)
            | Header::ContentLength(_)
            | Header::Authorization(_)
            | Header::ProxyAuthorization(_)
    )
}

/// Forward a request statelessly to a single target.
///
/// The actual next hop honors loose routing: with a Route set present the
/// request goes to the first Route entry, not the Request-URI. A next hop
/// pointing back at this element is refused as a loop.
fn route_stateless(call: &CallState, mut request: Request, target: Uri) -> RouteAction {
    request.uri = target;

    let destination = request
        .route_header()
        .and_then(|route| route.clone().typed().ok())
        .and_then(|route| route.uris().first().cloned())
        .map(|entry| entry.uri)
        .unwrap_or_else(|| request.uri.clone());

    if call.transport.is_local(&destination) {
        warn!(call_id = %call.call_id, uri = %destination, "stateless forward would loop back");
        return RouteAction::Reply(Reply::loop_detected());
    }

    let request = call.transport.add_via(request);
    match call.transport.send_request(&request) {
        Ok(()) => {
            debug!(
                call_id = %call.call_id,
                method = %request.method,
                uri = %request.uri,
                "stateless request forwarded"
            );
        }
        Err(e) => {
            warn!(call_id = %call.call_id, error = %e, "stateless forward failed");
        }
    }
    RouteAction::Stateless
}

/// Relay a response for a statelessly forwarded request: pop the Via this
/// element contributed and pass the response to the next one.
pub fn response_stateless(call: &CallState, mut response: Response) {
    header_pop!(response.headers, Header::Via);
    let has_via = response
        .headers
        .iter()
        .any(|h| matches!(h, Header::Via(_)));
    if has_via {
        match call.transport.send_response(&response) {
            Ok(()) => {
                debug!(
                    call_id = %call.call_id,
                    status = %response.status_code,
                    "stateless response forwarded"
                );
            }
            Err(e) => {
                warn!(call_id = %call.call_id, error = %e, "stateless response send failed");
            }
        }
    } else if call.option.strict_response_drop {
        error!(
            call_id = %call.call_id,
            status = %response.status_code,
            "dropping response with no remaining via"
        );
    } else {
        info!(
            call_id = %call.call_id,
            status = %response.status_code,
            "dropping response with no remaining via"
        );
    }
}
