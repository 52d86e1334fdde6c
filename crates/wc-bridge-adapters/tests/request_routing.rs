mod common;

use std::sync::Arc;

use serde_json::json;

use wc_bridge_adapters::CommandKind;
use wc_bridge_core::domain::RpcResponse;
use wc_bridge_core::events::TransportEvent;
use wc_bridge_core::respond::UNSUPPORTED_METHODS;
use wc_bridge_core::{SecurityCheckState, SecurityVerdict, WcError, WcMethod};

use common::{incoming, within, Harness, ETH_ADDRESS, SOL_ADDRESS, WALLET};

fn error_response(response: &RpcResponse) -> (i64, &str) {
    match response {
        RpcResponse::Error { code, message, .. } => (*code, message.as_str()),
        other => panic!("expected an error response, got {other:?}"),
    }
}

#[tokio::test]
async fn unknown_session_is_rejected_as_unsupported() {
    let h = Harness::new();
    let mut routed = h.router.routed_requests();

    let err = h
        .router
        .route(incoming(1, "missing", "eth_sign", json!([ETH_ADDRESS, "0x00"])))
        .await
        .expect_err("no session");
    assert_eq!(err, WcError::SessionNotFound("missing".to_owned()));

    let responses = h.client.responses();
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].id(), 1);
    assert_eq!(
        error_response(&responses[0]),
        (UNSUPPORTED_METHODS, "unsupported: session not found")
    );
    assert!(routed.try_recv().is_err());
}

#[tokio::test]
async fn unknown_method_is_rejected() {
    let h = Harness::new();
    h.settle(WALLET, "t1");

    let err = h
        .router
        .route(incoming(2, "t1", "eth_foo", json!([])))
        .await
        .expect_err("no handler");
    assert_eq!(err, WcError::UnsupportedMethod("eth_foo".to_owned()));
    assert_eq!(
        error_response(&h.client.responses()[0]),
        (UNSUPPORTED_METHODS, "unsupported method: eth_foo")
    );
}

#[tokio::test]
async fn repeated_unknown_methods_are_rejected_independently() {
    let h = Harness::new();
    h.settle(WALLET, "t1");
    let mut routed = h.router.routed_requests();

    for _ in 0..2 {
        let err = h
            .router
            .route(incoming(7, "t1", "wallet_switchEthereumChain", json!([])))
            .await
            .expect_err("no handler");
        assert!(matches!(err, WcError::UnsupportedMethod(_)));
    }
    let responses = h.client.responses();
    assert_eq!(responses.len(), 2);
    assert!(responses.iter().all(|r| r.id() == 7));
    assert!(routed.try_recv().is_err());
}

#[tokio::test]
async fn malformed_params_are_rejected_like_unknown_methods() {
    let h = Harness::new();
    h.settle(WALLET, "t1");
    let mut routed = h.router.routed_requests();

    let err = h
        .router
        .route(incoming(3, "t1", "personal_sign", json!({"message": "hi"})))
        .await
        .expect_err("bad params");
    assert_eq!(err, WcError::UnsupportedMethod("personal_sign".to_owned()));
    assert_eq!(h.client.responses().len(), 1);
    assert!(routed.try_recv().is_err());
}

#[tokio::test]
async fn routed_requests_reach_subscribers_exactly_once() {
    let h = Harness::new();
    h.settle(WALLET, "t1");
    let mut routed = h.router.routed_requests();
    let listener = Arc::clone(&h.router).spawn(&h.hub);

    h.client.emit(TransportEvent::SessionRequest(incoming(
        4,
        "t1",
        "eth_sign",
        json!([ETH_ADDRESS, "0x68656c6c6f"]),
    )));
    let request = within(routed.recv()).await.expect("routed request");
    assert_eq!(request.id(), 4);
    assert_eq!(request.session.wallet_id.0, WALLET);
    assert!(matches!(request.method, WcMethod::EthSign { .. }));
    assert!(h.client.commands_of(CommandKind::Respond).is_empty());
    assert!(routed.try_recv().is_err());

    listener.abort();
}

#[tokio::test]
async fn ethereum_requests_seed_a_security_check() {
    let h = Harness::new();
    h.settle(WALLET, "t1");
    let mut request = incoming(5, "t1", "eth_sign", json!([ETH_ADDRESS, "0x00"]));
    request.verify.is_scam = true;
    request.verify.origin = "https://drainer.example".to_owned();

    h.router.route(request).await.expect("routed");
    let mut verdicts = h.security.verdicts(5).expect("check started");
    let state = within(verdicts.wait_for(|s| *s != SecurityCheckState::Loading))
        .await
        .expect("scanner finished")
        .clone();
    assert!(matches!(
        state,
        SecurityCheckState::Content(SecurityVerdict::Malicious(_))
    ));
}

#[tokio::test]
async fn solana_requests_use_the_solana_handler() {
    let h = Harness::new();
    h.settle(WALLET, "t1");

    let request = h
        .router
        .route(incoming(
            6,
            "t1",
            "solana_signMessage",
            json!({"message": bs58::encode(b"hello").into_string(), "pubkey": SOL_ADDRESS}),
        ))
        .await
        .expect("routed");
    let WcMethod::SolanaSignMessage { pubkey, message } = request.method else {
        panic!("expected solana message");
    };
    assert_eq!(pubkey, SOL_ADDRESS);
    assert_eq!(message.as_ref(), b"hello");
    assert!(h.security.verdicts(6).is_none());
}
