use crate::call::CallState;
use crate::config::CoreOption;
use crate::dialog::DialogId;
use crate::transaction::Transaction;
use rsip::headers::{CallId, Contact, CSeq, From, MaxForwards, To, Via};
use rsip::prelude::{HeadersExt, UntypedHeader};
use rsip::{Method, Request, Response, StatusCode, Uri};
use std::sync::Arc;

mod test_request;

pub(crate) use crate::transport::mock::MockTransport;

pub(crate) fn new_call(transport: Arc<MockTransport>) -> CallState {
    CallState::new(
        "test-app",
        "test-call@example.com",
        transport,
        CoreOption::default(),
    )
    .expect("default options are valid")
}

pub(crate) fn request(
    method: Method,
    call_id: &str,
    from_tag: &str,
    to_tag: &str,
    cseq: u32,
) -> Request {
    let to = if to_tag.is_empty() {
        "Bob <sip:bob@example.com>".to_string()
    } else {
        format!("Bob <sip:bob@example.com>;tag={}", to_tag)
    };
    let headers: Vec<rsip::Header> = vec![
        Via::new("SIP/2.0/UDP alice.example.com:5060;branch=z9hG4bKnashds".to_string()).into(),
        CSeq::new(format!("{} {}", cseq, method)).into(),
        From::new(format!("Alice <sip:alice@example.com>;tag={}", from_tag)).into(),
        To::new(to).into(),
        CallId::new(call_id.to_string()).into(),
        Contact::new("<sip:alice@alice.example.com:5060>".to_string()).into(),
        MaxForwards::new("70".to_string()).into(),
    ];
    let body = if method == Method::Invite {
        b"v=0\r\no=alice 2890844526 2890844526 IN IP4 alice.example.com\r\n".to_vec()
    } else {
        vec![]
    };
    Request {
        method,
        uri: Uri::try_from("sip:bob@example.com:5060").unwrap(),
        headers: headers.into(),
        version: rsip::Version::V2,
        body,
    }
}

pub(crate) fn invite_request(call_id: &str, from_tag: &str, to_tag: &str, cseq: u32) -> Request {
    request(Method::Invite, call_id, from_tag, to_tag, cseq)
}

pub(crate) fn response_to(
    req: &Request,
    status: StatusCode,
    to_tag: &str,
    contact: Option<&str>,
) -> Response {
    let mut headers: Vec<rsip::Header> = vec![
        req.via_header().unwrap().clone().into(),
        req.cseq_header().unwrap().clone().into(),
        req.from_header().unwrap().clone().into(),
        To::new(format!("Bob <sip:bob@example.com>;tag={}", to_tag)).into(),
        req.call_id_header().unwrap().clone().into(),
    ];
    if let Some(contact) = contact {
        headers.push(Contact::new(contact.to_string()).into());
    }
    Response {
        status_code: status,
        version: rsip::Version::V2,
        headers: headers.into(),
        body: vec![],
    }
}

/// Drive a call to `accepted_uac`: INVITE out, 180 in, 200 in.
pub(crate) fn accept_dialog(call: &mut CallState, call_id: &str, cseq: u32) -> DialogId {
    let invite = invite_request(call_id, "alice-tag", "", cseq);
    let tx = Transaction::new_client(invite.clone());
    call.handle_uac_request(&tx).unwrap();

    let ringing = response_to(&invite, StatusCode::Ringing, "bob-tag", None);
    call.handle_uac_response(&tx.clone().with_response(ringing));

    let ok = response_to(
        &invite,
        StatusCode::OK,
        "bob-tag",
        Some("<sip:bob@bob.example.com:5060>"),
    );
    call.handle_uac_response(&tx.with_response(ok));

    DialogId::new(call_id, "alice-tag", "bob-tag").unwrap()
}

/// Accept and confirm: `accept_dialog` plus the matching ACK.
pub(crate) fn confirm_dialog(call: &mut CallState, call_id: &str, cseq: u32) -> DialogId {
    let id = accept_dialog(call, call_id, cseq);
    let ack = request(Method::Ack, call_id, "alice-tag", "bob-tag", cseq);
    call.handle_uac_ack(&Transaction::new_client(ack));
    id
}
