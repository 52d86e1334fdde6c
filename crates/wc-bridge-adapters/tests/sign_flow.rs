mod common;

use std::sync::Arc;

use alloy::primitives::U256;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{json, Value};

use wc_bridge_adapters::{CommandKind, DeterministicSigner, Reply};
use wc_bridge_core::domain::{RpcResponse, SigningTarget};
use wc_bridge_core::{
    PortError, SecurityCheckState, SignFlow, SignPhase, SignRequest, SignState, WalletId,
    WcError,
};

use common::{
    incoming, raw_session, within, Harness, ETH_ADDRESS, ETH_CHAIN, SOL_ADDRESS, SOL_CHAIN,
    WALLET,
};

async fn routed(h: &Harness, id: u64, method: &str, params: Value) -> SignRequest {
    h.settle(WALLET, "t1");
    h.router
        .route(incoming(id, "t1", method, params))
        .await
        .expect("request routed")
}

fn eth_target() -> SigningTarget {
    SigningTarget {
        wallet_id: WalletId::new(WALLET),
        chain_id: ETH_CHAIN.to_owned(),
        address: ETH_ADDRESS.to_owned(),
    }
}

fn result_payload(response: &RpcResponse) -> &Value {
    match response {
        RpcResponse::Result { result, .. } => result,
        other => panic!("expected a result response, got {other:?}"),
    }
}

#[tokio::test]
async fn eth_sign_responds_with_the_signature() {
    let h = Harness::new();
    let request = routed(&h, 10, "eth_sign", json!([ETH_ADDRESS, "0x68656c6c6f"])).await;
    let SignFlow::EthMessage { orchestrator, model } =
        h.use_cases.for_request(request).expect("flow")
    else {
        panic!("expected an eth message flow");
    };

    let mut states = orchestrator.invoke(model.clone()).expect("invoke");
    assert_eq!(states.recv().await, Some(SignState::PreSign(model.clone())));
    orchestrator.sign(model.clone()).await.expect("sign");
    assert_eq!(states.recv().await, Some(SignState::Signing(model.clone())));

    let expected = DeterministicSigner::evm_signature(&eth_target(), b"hello").to_string();
    let Some(SignState::Result { outcome, .. }) = states.recv().await else {
        panic!("expected a result");
    };
    assert_eq!(outcome, Ok(Value::String(expected.clone())));
    assert_eq!(states.recv().await, None);
    assert_eq!(orchestrator.phase(), SignPhase::Completed);

    let responses = h.client.responses();
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].id(), 10);
    assert_eq!(result_payload(&responses[0]), &Value::String(expected));
}

#[tokio::test]
async fn signer_failure_ends_with_an_error_and_no_response() {
    let h = Harness::new();
    h.signer
        .fail_with(Some(PortError::Signing("card removed".to_owned())))
        .expect("script signer");
    let request = routed(&h, 11, "personal_sign", json!(["0x00", ETH_ADDRESS])).await;
    let SignFlow::EthMessage { orchestrator, model } =
        h.use_cases.for_request(request).expect("flow")
    else {
        panic!("expected an eth message flow");
    };

    let mut states = orchestrator.invoke(model.clone()).expect("invoke");
    orchestrator.sign(model).await.expect("sign");
    states.recv().await;
    states.recv().await;
    let Some(SignState::Result { outcome, .. }) = states.recv().await else {
        panic!("expected a result");
    };
    assert_eq!(
        outcome,
        Err(WcError::Signing(PortError::Signing("card removed".to_owned())))
    );
    assert!(h.client.responses().is_empty());
}

#[tokio::test]
async fn cancel_closes_the_stream_without_a_response() {
    let h = Harness::new();
    let request = routed(&h, 12, "eth_sign", json!([ETH_ADDRESS, "0x00"])).await;
    let SignFlow::EthMessage { orchestrator, model } =
        h.use_cases.for_request(request).expect("flow")
    else {
        panic!("expected an eth message flow");
    };

    let mut states = orchestrator.invoke(model.clone()).expect("invoke");
    orchestrator.cancel();
    assert_eq!(states.recv().await, Some(SignState::PreSign(model.clone())));
    assert_eq!(states.recv().await, None);
    assert_eq!(orchestrator.phase(), SignPhase::Cancelled);
    assert!(orchestrator.sign(model).await.is_err());
    assert!(h.client.responses().is_empty());
}

#[tokio::test]
async fn invoking_twice_is_rejected() {
    let h = Harness::new();
    let request = routed(&h, 13, "eth_sign", json!([ETH_ADDRESS, "0x00"])).await;
    let SignFlow::EthMessage { orchestrator, model } =
        h.use_cases.for_request(request).expect("flow")
    else {
        panic!("expected an eth message flow");
    };
    let _states = orchestrator.invoke(model.clone()).expect("invoke");
    assert!(orchestrator.invoke(model).is_err());
}

#[tokio::test]
async fn unprepared_transaction_terminates_unexpectedly() {
    let h = Harness::new();
    h.signer.refuse_prepare(true).expect("script signer");
    let request = routed(
        &h,
        14,
        "eth_sendTransaction",
        json!([{"from": ETH_ADDRESS, "to": ETH_ADDRESS, "value": "0x1"}]),
    )
    .await;
    let SignFlow::EthTransaction { orchestrator, model } =
        h.use_cases.for_request(request).expect("flow")
    else {
        panic!("expected an eth transaction flow");
    };

    let mut states = orchestrator.invoke(model.clone()).expect("invoke");
    assert_eq!(
        orchestrator.sign(model).await,
        Err(WcError::UnexpectedTermination)
    );
    assert!(matches!(states.recv().await, Some(SignState::PreSign(_))));
    assert!(matches!(states.recv().await, Some(SignState::Signing(_))));
    assert_eq!(states.recv().await, None);
    assert_eq!(orchestrator.phase(), SignPhase::Terminated);
    assert!(h.client.responses().is_empty());
}

#[tokio::test]
async fn send_transaction_carries_the_prepared_model() {
    let h = Harness::new();
    let request = routed(
        &h,
        15,
        "eth_sendTransaction",
        json!([{"from": ETH_ADDRESS, "to": ETH_ADDRESS, "value": "0x1"}]),
    )
    .await;
    let SignFlow::EthTransaction { orchestrator, model } =
        h.use_cases.for_request(request).expect("flow")
    else {
        panic!("expected an eth transaction flow");
    };
    assert!(model.broadcast);
    assert_eq!(model.transaction.gas, None);

    let mut states = orchestrator.invoke(model.clone()).expect("invoke");
    orchestrator.sign(model).await.expect("sign");
    states.recv().await;
    states.recv().await;
    let Some(SignState::Result { model, outcome }) = states.recv().await else {
        panic!("expected a result");
    };
    assert_eq!(model.transaction.gas, Some(U256::from(21_000u64)));
    let hash = outcome.expect("broadcast hash");
    assert_eq!(hash.as_str().map(str::len), Some(66));
}

#[tokio::test]
async fn failed_response_surfaces_as_transport_error() {
    let h = Harness::new();
    h.client
        .script_reply(CommandKind::Respond, Reply::Drop)
        .expect("script reply");
    let request = routed(&h, 16, "eth_sign", json!([ETH_ADDRESS, "0x00"])).await;
    let SignFlow::EthMessage { orchestrator, model } =
        h.use_cases.for_request(request).expect("flow")
    else {
        panic!("expected an eth message flow");
    };

    let mut states = orchestrator.invoke(model.clone()).expect("invoke");
    orchestrator.sign(model).await.expect("sign");
    states.recv().await;
    states.recv().await;
    let Some(SignState::Result { outcome, .. }) = states.recv().await else {
        panic!("expected a result");
    };
    assert!(matches!(outcome, Err(WcError::Transport(_))));
}

#[tokio::test]
async fn solana_message_signature_is_base58() {
    let h = Harness::new();
    let request = routed(
        &h,
        17,
        "solana_signMessage",
        json!({"message": bs58::encode(b"gm").into_string(), "pubkey": SOL_ADDRESS}),
    )
    .await;
    let SignFlow::Solana { orchestrator, model } =
        h.use_cases.for_request(request).expect("flow")
    else {
        panic!("expected a solana flow");
    };

    let mut states = orchestrator.invoke(model.clone()).expect("invoke");
    orchestrator.sign(model).await.expect("sign");
    states.recv().await;
    states.recv().await;
    let Some(SignState::Result { outcome, .. }) = states.recv().await else {
        panic!("expected a result");
    };
    let target = SigningTarget {
        wallet_id: WalletId::new(WALLET),
        chain_id: SOL_CHAIN.to_owned(),
        address: SOL_ADDRESS.to_owned(),
    };
    let expected = bs58::encode(DeterministicSigner::solana_signature(&target, b"gm")).into_string();
    assert_eq!(outcome, Ok(json!({ "signature": expected })));
}

#[tokio::test]
async fn solana_sign_all_returns_every_transaction() {
    let h = Harness::new();
    let txs = [STANDARD.encode([1u8, 2, 3]), STANDARD.encode([4u8, 5])];
    let request = routed(
        &h,
        18,
        "solana_signAllTransactions",
        json!({ "transactions": txs }),
    )
    .await;
    let SignFlow::Solana { orchestrator, model } =
        h.use_cases.for_request(request).expect("flow")
    else {
        panic!("expected a solana flow");
    };

    let mut states = orchestrator.invoke(model.clone()).expect("invoke");
    orchestrator.sign(model).await.expect("sign");
    states.recv().await;
    states.recv().await;
    let Some(SignState::Result { outcome, .. }) = states.recv().await else {
        panic!("expected a result");
    };
    let payload = outcome.expect("signed transactions");
    let signed = payload["transactions"].as_array().expect("array");
    assert_eq!(signed.len(), 2);
    let first = STANDARD
        .decode(signed[0].as_str().expect("base64 string"))
        .expect("decode");
    assert_eq!(first.len(), 64 + 3);
    assert!(first.ends_with(&[1, 2, 3]));

    let (target, _) = h.signer.signed().expect("signed log").remove(0);
    assert_eq!(target.address, SOL_ADDRESS);
}

#[tokio::test]
async fn security_check_is_advisory() {
    let h = Harness::new();
    h.scanner.set_offline(true);
    let request = routed(&h, 19, "eth_sign", json!([ETH_ADDRESS, "0x00"])).await;
    let SignFlow::EthMessage { orchestrator, model } =
        h.use_cases.for_request(request).expect("flow")
    else {
        panic!("expected an eth message flow");
    };

    let mut check = orchestrator.security_check().expect("security check");
    let state = within(check.wait_for(|s| *s != SecurityCheckState::Loading))
        .await
        .expect("scanner finished")
        .clone();
    assert!(matches!(state, SecurityCheckState::Error(_)));

    let _states = orchestrator.invoke(model.clone()).expect("invoke");
    orchestrator.sign(model).await.expect("sign");
    assert_eq!(h.client.responses().len(), 1);
    assert!(h.security.verdicts(19).is_none());
}

#[tokio::test]
async fn cancel_while_signing_withholds_the_response() {
    let h = Harness::new();
    h.signer.hold();
    let request = routed(
        &h,
        20,
        "eth_sendTransaction",
        json!([{"from": ETH_ADDRESS, "to": ETH_ADDRESS, "value": "0x1"}]),
    )
    .await;
    let SignFlow::EthTransaction { orchestrator, model } =
        h.use_cases.for_request(request).expect("flow")
    else {
        panic!("expected an eth transaction flow");
    };
    let orchestrator = Arc::new(orchestrator);

    let mut states = orchestrator.invoke(model.clone()).expect("invoke");
    let signing = tokio::spawn({
        let orchestrator = Arc::clone(&orchestrator);
        async move { orchestrator.sign(model).await }
    });
    within(h.signer.wait_parked(1)).await;

    orchestrator.cancel();
    h.signer.release();
    assert_eq!(within(signing).await.expect("sign task"), Ok(()));

    assert!(matches!(states.recv().await, Some(SignState::PreSign(_))));
    assert!(matches!(states.recv().await, Some(SignState::Signing(_))));
    assert_eq!(states.recv().await, None);
    assert_eq!(orchestrator.phase(), SignPhase::Cancelled);
    assert!(h.client.responses().is_empty());
    assert!(h.signer.signed().expect("signed log").is_empty());
}

#[tokio::test]
async fn dropping_a_flow_forgets_its_security_check() {
    let h = Harness::new();
    let request = routed(&h, 21, "eth_sign", json!([ETH_ADDRESS, "0x00"])).await;
    assert!(h.security.verdicts(21).is_some());

    let flow = h.use_cases.for_request(request).expect("flow");
    assert_eq!(flow.request_id(), 21);
    drop(flow);
    assert!(h.security.verdicts(21).is_none());
}

#[tokio::test]
async fn request_without_chain_uses_the_session_only_chain() {
    let h = Harness::new();
    let wallet_id = WalletId::new(WALLET);
    let mut raw = raw_session("t-sol");
    raw.namespaces.remove("eip155");
    h.store
        .save(&wallet_id, wc_bridge_core::Session::new(wallet_id.clone(), raw));

    let mut event = incoming(
        22,
        "t-sol",
        "solana_signTransaction",
        json!({ "transaction": STANDARD.encode([7u8, 7]) }),
    );
    event.request.chain_id = None;
    let request = h.router.route(event).await.expect("request routed");
    let SignFlow::Solana { orchestrator, model } =
        h.use_cases.for_request(request).expect("flow")
    else {
        panic!("expected a solana flow");
    };

    let _states = orchestrator.invoke(model.clone()).expect("invoke");
    orchestrator.sign(model).await.expect("sign");
    let (target, _) = h.signer.signed().expect("signed log").remove(0);
    assert_eq!(target.chain_id, SOL_CHAIN);
    assert_eq!(target.address, SOL_ADDRESS);
    assert_eq!(h.client.responses().len(), 1);
}

#[tokio::test]
async fn request_without_chain_on_a_multichain_session_is_not_signed() {
    let h = Harness::new();
    h.settle(WALLET, "t1");
    let mut event = incoming(
        23,
        "t1",
        "solana_signTransaction",
        json!({ "transaction": STANDARD.encode([7u8, 7]) }),
    );
    event.request.chain_id = None;
    let request = h.router.route(event).await.expect("request routed");
    let SignFlow::Solana { orchestrator, model } =
        h.use_cases.for_request(request).expect("flow")
    else {
        panic!("expected a solana flow");
    };

    let mut states = orchestrator.invoke(model.clone()).expect("invoke");
    orchestrator.sign(model).await.expect("sign");
    states.recv().await;
    states.recv().await;
    let Some(SignState::Result { outcome, .. }) = states.recv().await else {
        panic!("expected a result");
    };
    assert!(matches!(
        outcome,
        Err(WcError::Signing(PortError::Validation(_)))
    ));
    assert!(h.signer.signed().expect("signed log").is_empty());
    assert!(h.client.responses().is_empty());
}
