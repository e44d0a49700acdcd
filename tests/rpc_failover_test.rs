//! JSON-RPC transport tests against a local mock server

use alloy_primitives::{Address, Bytes, B256, U256};
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{body_partial_json, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

use ruster_swap::core::quote::{OnChainQuoter, QuoteSource};
use ruster_swap::models::config::{RetryConfig, RpcEndpoint};
use ruster_swap::models::errors::ErrorCode;
use ruster_swap::models::types::{SimulationErrorCategory, SimulationOutcome, TxRequest};
use ruster_swap::providers::chain::{ChainReader, RpcChainReader};
use ruster_swap::providers::rpc::{JsonRpc, RpcFailoverClient};
use ruster_swap::providers::simulation::{AlchemySimulation, SimulationGateway};
use ruster_swap::utils::constants::{SWAP_ROUTER_02, USDC, WETH};

fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_retries: 2,
        base_delay_ms: 1,
        timeout_secs: 2,
        quoter_retries: 0,
    }
}

fn client(urls: &[String]) -> RpcFailoverClient {
    let endpoints = urls
        .iter()
        .enumerate()
        .map(|(i, url)| RpcEndpoint::new(format!("mock-{}", i), url.clone(), i as u32))
        .collect();
    RpcFailoverClient::new(endpoints, fast_retry()).unwrap()
}

fn rpc_result(result: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "jsonrpc": "2.0", "id": 1, "result": result }))
}

fn word(value: u64) -> String {
    format!("{:064x}", value)
}

#[tokio::test]
async fn test_failover_to_secondary_provider() {
    let primary = MockServer::start().await;
    let secondary = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&primary)
        .await;
    Mock::given(method("POST"))
        .respond_with(rpc_result(json!("0x10")))
        .expect(1)
        .mount(&secondary)
        .await;

    let rpc = client(&[primary.uri(), secondary.uri()]);
    let block: String = rpc.call("eth_blockNumber", json!([])).await.unwrap();
    assert_eq!(block, "0x10");
}

#[tokio::test]
async fn test_all_providers_failing_is_exhausted() {
    let primary = MockServer::start().await;
    let secondary = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&primary)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": { "code": -32000, "message": "header not found" }
        })))
        .mount(&secondary)
        .await;

    let rpc = client(&[primary.uri(), secondary.uri()]);
    let err = rpc.request("eth_blockNumber", json!([])).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::RpcExhausted);
    assert!(err.message.contains("header not found"));
    // Provider details stay internal
    assert!(!err.public_message().contains("header not found"));
}

#[tokio::test]
async fn test_quoter_decodes_eth_call() {
    let server = MockServer::start().await;
    let encoded = format!("0x{}{}{}{}", word(2_000_000_000), word(0), word(1), word(95_000));

    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": "eth_call" })))
        .respond_with(rpc_result(json!(encoded)))
        .mount(&server)
        .await;

    let quoter = OnChainQuoter::new(Arc::new(client(&[server.uri()])));
    let quote = quoter
        .quote_exact_input_single(WETH, USDC, U256::from(10u64).pow(U256::from(18u64)), 500)
        .await
        .unwrap();
    assert_eq!(quote.amount_out, U256::from(2_000_000_000u64));
    assert_eq!(quote.gas_estimate, 95_000);
}

#[tokio::test]
async fn test_chain_reader_allowance_and_receipts() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": "eth_call" })))
        .respond_with(rpc_result(json!(format!("0x{}", word(5_000_000)))))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": "eth_getTransactionReceipt" })))
        .respond_with(rpc_result(json!({
            "transactionHash": B256::repeat_byte(7),
            "status": "0x1",
            "blockNumber": "0x2a",
            "gasUsed": "0x1adb0"
        })))
        .mount(&server)
        .await;

    let reader = RpcChainReader::new(Arc::new(client(&[server.uri()])));

    let allowance = reader
        .allowance(USDC, Address::repeat_byte(1), SWAP_ROUTER_02)
        .await
        .unwrap();
    assert_eq!(allowance, U256::from(5_000_000u64));

    let receipt = reader.transaction_receipt(B256::repeat_byte(7)).await.unwrap().unwrap();
    assert!(receipt.success);
    assert_eq!(receipt.block_number, 42);
    assert_eq!(receipt.gas_used, 110_000);
}

#[tokio::test]
async fn test_pending_receipt_is_none() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(rpc_result(serde_json::Value::Null))
        .mount(&server)
        .await;

    let reader = RpcChainReader::new(Arc::new(client(&[server.uri()])));
    assert!(reader.transaction_receipt(B256::ZERO).await.unwrap().is_none());
}

#[tokio::test]
async fn test_simulation_revert_is_categorised() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": "alchemy_simulateAssetChanges" })))
        .respond_with(rpc_result(json!({
            "changes": [],
            "gasUsed": null,
            "error": { "message": "execution reverted: STF" }
        })))
        .mount(&server)
        .await;

    let gateway = SimulationGateway::new(Arc::new(AlchemySimulation::new(Arc::new(client(&[server.uri()])))));
    let tx = TxRequest {
        to: SWAP_ROUTER_02,
        data: Bytes::from_static(&[0x04, 0xe4, 0x5a, 0xaf]),
        value: U256::ZERO,
    };

    let outcome = gateway.simulate(Address::repeat_byte(1), &tx).await.unwrap();
    match outcome {
        SimulationOutcome::Failure { category, .. } => {
            assert_eq!(category, SimulationErrorCategory::MissingApproval)
        }
        other => panic!("expected failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unreachable_simulator_is_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let gateway = SimulationGateway::new(Arc::new(AlchemySimulation::new(Arc::new(client(&[server.uri()])))));
    let tx = TxRequest {
        to: SWAP_ROUTER_02,
        data: Bytes::new(),
        value: U256::ZERO,
    };

    let err = gateway.simulate(Address::repeat_byte(1), &tx).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::SimulationUnavailable);
}

#[tokio::test]
async fn test_health_check_reports_each_provider() {
    let healthy = MockServer::start().await;
    let failing = MockServer::start().await;

    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": "eth_blockNumber" })))
        .respond_with(rpc_result(json!("0x1b4")))
        .mount(&healthy)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&failing)
        .await;

    let rpc = client(&[healthy.uri(), failing.uri()]);
    let report = rpc.check_health().await;
    assert_eq!(report.len(), 2);

    assert_eq!(report[0].name, "mock-0");
    assert!(report[0].healthy);
    assert_eq!(report[0].block_number, Some(436));
    assert!(report[0].error.is_none());

    assert_eq!(report[1].name, "mock-1");
    assert_eq!(report[1].priority, 1);
    assert!(!report[1].healthy);
    assert!(report[1].block_number.is_none());
    assert_eq!(report[1].error.as_deref(), Some("RPC_REQUEST_FAILED"));
}
