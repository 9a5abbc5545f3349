use super::*;
use crate::dialog::request::{ContactSpec, RequestOption};
use crate::dialog::DialogId;
use crate::transaction::Transaction;
use crate::Error;
use rsip::headers::ProxyAuthorization;
use rsip::prelude::UntypedHeader;
use rsip::{Header, Method, StatusCode, Uri};
use std::sync::Arc;

const CALL_ID: &str = "builder-test-call@example.com";

#[test]
fn test_ack_requires_accepted_uac() {
    let transport = Arc::new(MockTransport::default());
    let mut call = new_call(transport);

    let invite = invite_request(CALL_ID, "alice-tag", "", 1);
    let tx = Transaction::new_client(invite.clone());
    call.handle_uac_request(&tx).unwrap();
    let ringing = response_to(&invite, StatusCode::Ringing, "bob-tag", None);
    call.handle_uac_response(&tx.with_response(ringing));

    let id = DialogId::new(CALL_ID, "alice-tag", "bob-tag").unwrap();
    assert!(matches!(
        call.make_ack(id),
        Err(Error::InvalidDialog(got)) if got == id
    ));
}

#[test]
fn test_unknown_dialog_is_refused() {
    let transport = Arc::new(MockTransport::default());
    let mut call = new_call(transport);
    let id = DialogId::new(CALL_ID, "a", "b").unwrap();
    assert!(matches!(
        call.make_bye(id),
        Err(Error::UnknownDialog(got)) if got == id
    ));
}

#[test]
fn test_ack_reuses_invite_cseq_and_keeps_local_seq() {
    let transport = Arc::new(MockTransport::default());
    let mut call = new_call(transport);
    let id = accept_dialog(&mut call, CALL_ID, 9);

    let ack = call.make_ack(id).unwrap();
    assert_eq!(ack.method, Method::Ack);
    assert_eq!(ack.cseq, 9);
    assert_eq!(call.dialogs.find(id).unwrap().local_seq, 9);
    assert_eq!(ack.call_id, CALL_ID);
    assert_eq!(
        ack.uri,
        Uri::try_from("sip:bob@bob.example.com:5060").unwrap()
    );
    assert!(
        ack.headers
            .iter()
            .any(|h| matches!(h, Header::UserAgent(_))),
        "requests carry the configured user agent"
    );
}

#[test]
fn test_auto_cseq_advances_local_seq() {
    let transport = Arc::new(MockTransport::default());
    let mut call = new_call(transport);
    let id = confirm_dialog(&mut call, CALL_ID, 9);

    let bye = call.make_bye(id).unwrap();
    assert_eq!(bye.cseq, 10);
    assert_eq!(call.dialogs.find(id).unwrap().local_seq, 10);

    let info = call
        .make_dialog_request(id, Method::Info, RequestOption::default())
        .unwrap();
    assert_eq!(info.cseq, 11);
}

#[test]
fn test_auto_cseq_seeds_randomly_without_history() {
    let transport = Arc::new(MockTransport::default());
    let mut call = new_call(transport);
    let id = confirm_dialog(&mut call, CALL_ID, 1);
    call.dialogs.find_mut(id).unwrap().local_seq = 0;

    let info = call
        .make_dialog_request(id, Method::Info, RequestOption::default())
        .unwrap();
    assert!(info.cseq >= 1);
    assert!(info.cseq < (1 << 31));
    assert_eq!(call.dialogs.find(id).unwrap().local_seq, info.cseq);
}

#[test]
fn test_explicit_cseq_does_not_advance_local_seq() {
    let transport = Arc::new(MockTransport::default());
    let mut call = new_call(transport);
    let id = confirm_dialog(&mut call, CALL_ID, 9);

    let option = RequestOption {
        cseq: 5,
        ..Default::default()
    };
    let info = call.make_dialog_request(id, Method::Info, option).unwrap();
    assert_eq!(info.cseq, 5);
    assert_eq!(
        call.dialogs.find(id).unwrap().local_seq,
        9,
        "caller-driven replay leaves the counter alone"
    );
}

#[test]
fn test_explicit_cseq_seeds_a_fresh_counter() {
    let transport = Arc::new(MockTransport::default());
    let mut call = new_call(transport);
    let id = confirm_dialog(&mut call, CALL_ID, 1);
    call.dialogs.find_mut(id).unwrap().local_seq = 0;

    let option = RequestOption {
        cseq: 42,
        ..Default::default()
    };
    let info = call.make_dialog_request(id, Method::Info, option).unwrap();
    assert_eq!(info.cseq, 42);
    assert_eq!(call.dialogs.find(id).unwrap().local_seq, 42);
}

#[test]
fn test_contact_defaults_to_local_target() {
    let transport = Arc::new(MockTransport::default());
    let mut call = new_call(transport);
    let id = confirm_dialog(&mut call, CALL_ID, 1);

    let bye = call.make_bye(id).unwrap();
    assert_eq!(
        bye.contact,
        ContactSpec::Uris(vec![
            Uri::try_from("sip:alice@alice.example.com:5060").unwrap()
        ])
    );
}

#[test]
fn test_invalid_contact_falls_back_silently() {
    let transport = Arc::new(MockTransport::default());
    let mut call = new_call(transport);
    let id = confirm_dialog(&mut call, CALL_ID, 1);

    let option = RequestOption {
        contact: Some("definitely not a uri".to_string()),
        ..Default::default()
    };
    let info = call.make_dialog_request(id, Method::Info, option).unwrap();
    assert_eq!(
        info.contact,
        ContactSpec::Uris(vec![
            Uri::try_from("sip:alice@alice.example.com:5060").unwrap()
        ])
    );
}

#[test]
fn test_explicit_contact_list_is_used() {
    let transport = Arc::new(MockTransport::default());
    let mut call = new_call(transport);
    let id = confirm_dialog(&mut call, CALL_ID, 1);

    let option = RequestOption {
        contact: Some("sip:a@h.example.com, sip:b@h.example.com".to_string()),
        ..Default::default()
    };
    let info = call.make_dialog_request(id, Method::Info, option).unwrap();
    assert_eq!(
        info.contact,
        ContactSpec::Uris(vec![
            Uri::try_from("sip:a@h.example.com").unwrap(),
            Uri::try_from("sip:b@h.example.com").unwrap(),
        ])
    );

    let option = RequestOption {
        make_contact: true,
        ..Default::default()
    };
    let info = call.make_dialog_request(id, Method::Info, option).unwrap();
    assert_eq!(info.contact, ContactSpec::Make);
}

#[test]
fn test_ack_propagates_invite_credentials() {
    let transport = Arc::new(MockTransport::default());
    let mut call = new_call(transport);

    let mut invite = invite_request(CALL_ID, "alice-tag", "", 3);
    invite.headers.push(
        ProxyAuthorization::new(
            "Digest username=\"alice\", realm=\"example.com\", response=\"deadbeef\"".to_string(),
        )
        .into(),
    );
    let tx = Transaction::new_client(invite.clone());
    call.handle_uac_request(&tx).unwrap();
    let ok = response_to(&invite, StatusCode::OK, "bob-tag", None);
    call.handle_uac_response(&tx.with_response(ok));

    let id = DialogId::new(CALL_ID, "alice-tag", "bob-tag").unwrap();
    let ack = call.make_ack(id).unwrap();
    assert_eq!(ack.pre_headers.len(), 1);
    match &ack.pre_headers[0] {
        Header::ProxyAuthorization(auth) => {
            assert!(auth.value().contains("username=\"alice\""));
        }
        other => panic!("expected proxy authorization, got {:?}", other),
    }
}

#[test]
fn test_route_set_is_copied_onto_requests() {
    let transport = Arc::new(MockTransport::default());
    let mut call = new_call(transport);

    let invite = invite_request(CALL_ID, "alice-tag", "", 1);
    let tx = Transaction::new_client(invite.clone());
    call.handle_uac_request(&tx).unwrap();

    let mut ok = response_to(
        &invite,
        StatusCode::OK,
        "bob-tag",
        Some("<sip:bob@bob.example.com:5060>"),
    );
    ok.headers.push(Header::RecordRoute(
        rsip::headers::RecordRoute::new("<sip:edge1.example.net:5070;lr>".to_string()),
    ));
    ok.headers.push(Header::RecordRoute(
        rsip::headers::RecordRoute::new("<sip:edge2.example.net:5080;lr>".to_string()),
    ));
    call.handle_uac_response(&tx.with_response(ok));

    let id = DialogId::new(CALL_ID, "alice-tag", "bob-tag").unwrap();
    let ack = call.make_ack(id).unwrap();
    let routes: Vec<String> = ack.route.iter().map(|r| r.value().to_string()).collect();
    assert_eq!(
        routes,
        vec![
            "<sip:edge2.example.net:5080;lr>".to_string(),
            "<sip:edge1.example.net:5070;lr>".to_string(),
        ],
        "route set is the reversed Record-Route order"
    );
}

#[test]
fn test_from_and_to_carry_dialog_tags() {
    let transport = Arc::new(MockTransport::default());
    let mut call = new_call(transport);
    let id = confirm_dialog(&mut call, CALL_ID, 1);

    let bye = call.make_bye(id).unwrap();
    assert!(bye
        .from
        .params
        .iter()
        .any(|p| matches!(p, rsip::Param::Tag(t) if t.value() == "alice-tag")));
    assert!(bye
        .to
        .params
        .iter()
        .any(|p| matches!(p, rsip::Param::Tag(t) if t.value() == "bob-tag")));
}
