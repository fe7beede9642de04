//! JSON-RPC deployment client.
//!
//! Speaks the Ethereum JSON-RPC dialect over HTTP:
//! 1. `net_version`: confirm the endpoint is on the expected network
//! 2. `eth_accounts`: resolve an account index to an address
//! 3. `eth_sendTransaction`: submit the creation transaction
//! 4. `eth_getTransactionReceipt`: poll until the deployment is mined
//!
//! The transaction hash is the receipt id; `lookup` re-queries it.

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use waypoint_common::{DeployError, DeploymentClient, DeploymentReceipt, DeploymentRequest, Identity};

use crate::waypoint_config::RpcSection;

/// Timeouts for the client.
#[derive(Debug, Clone)]
pub struct RpcSettings {
    pub request_timeout: Duration,
    pub poll_interval: Duration,
    pub receipt_timeout: Duration,
}

impl From<&RpcSection> for RpcSettings {
    fn from(section: &RpcSection) -> Self {
        Self {
            request_timeout: Duration::from_secs(section.request_timeout_secs),
            poll_interval: Duration::from_millis(section.receipt_poll_interval_ms),
            receipt_timeout: Duration::from_secs(section.receipt_timeout_secs),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionReceipt {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    contract_address: Option<String>,
}

impl TransactionReceipt {
    fn succeeded(&self) -> bool {
        // Pre-Byzantium receipts carry no status field.
        self.status.as_deref().is_none_or(|s| s == "0x1")
    }
}

/// How a failed call is reported once the request may have reached the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    /// Reads; failures are safe to retry
    Query,
    /// `eth_sendTransaction`; only an explicit refusal proves nothing happened
    Submission,
}

impl Delivery {
    fn unsettled(self, message: String) -> DeployError {
        match self {
            Delivery::Query => DeployError::Transient(message),
            Delivery::Submission => DeployError::Timeout {
                message,
                receipt_id: None,
            },
        }
    }
}

pub struct RpcDeploymentClient {
    http: reqwest::Client,
    settings: RpcSettings,
    next_id: AtomicU64,
}

impl RpcDeploymentClient {
    pub fn new(settings: RpcSettings) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http,
            settings,
            next_id: AtomicU64::new(1),
        })
    }

    async fn call(
        &self,
        endpoint: &str,
        method: &str,
        params: Value,
        delivery: Delivery,
    ) -> Result<Value, DeployError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });
        tracing::trace!(endpoint, method, id, "JSON-RPC request");

        let response = self
            .http
            .post(endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify(method, e, delivery))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(delivery.unsettled(format!("{} returned HTTP {}", method, status)));
        }
        if !status.is_success() {
            return Err(DeployError::Rejected(format!("{} returned HTTP {}", method, status)));
        }

        let parsed: RpcResponse = response
            .json()
            .await
            .map_err(|e| delivery.unsettled(format!("{}: malformed response: {}", method, e)))?;
        if let Some(err) = parsed.error {
            return Err(DeployError::Rejected(format!(
                "{}: {} (code {})",
                method, err.message, err.code
            )));
        }
        Ok(parsed.result.unwrap_or(Value::Null))
    }

    /// Calls made before submission cannot have taken effect, so a timeout
    /// there is an ordinary transient failure.
    async fn call_before_submit(
        &self,
        endpoint: &str,
        method: &str,
        params: Value,
    ) -> Result<Value, DeployError> {
        self.call(endpoint, method, params, Delivery::Query)
            .await
            .map_err(|e| match e {
            DeployError::Timeout { message, .. } => DeployError::Transient(message),
            other => other,
        })
    }

    async fn network_id(&self, endpoint: &str) -> Result<u64, DeployError> {
        let value = self.call_before_submit(endpoint, "net_version", json!([])).await?;
        let raw = value
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| value.to_string());
        parse_quantity(&raw)
            .ok_or_else(|| DeployError::Rejected(format!("net_version returned '{}'", raw)))
    }

    async fn sender(&self, endpoint: &str, identity: &Identity) -> Result<String, DeployError> {
        match identity {
            Identity::Address(address) => Ok(address.to_string()),
            Identity::Account(index) => {
                let accounts = self.call_before_submit(endpoint, "eth_accounts", json!([])).await?;
                accounts
                    .as_array()
                    .and_then(|list| list.get(*index))
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| {
                        DeployError::Rejected(format!("node has no account #{}", index))
                    })
            }
        }
    }

    async fn receipt(
        &self,
        endpoint: &str,
        tx_hash: &str,
    ) -> Result<Option<TransactionReceipt>, DeployError> {
        let value = self
            .call(
                endpoint,
                "eth_getTransactionReceipt",
                json!([tx_hash]),
                Delivery::Query,
            )
            .await?;
        if value.is_null() {
            return Ok(None);
        }
        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| DeployError::Transient(format!("malformed receipt: {}", e)))
    }

    async fn await_receipt(
        &self,
        endpoint: &str,
        tx_hash: &str,
    ) -> Result<DeploymentReceipt, DeployError> {
        let deadline = tokio::time::Instant::now() + self.settings.receipt_timeout;
        let unconfirmed = |message: String| DeployError::Timeout {
            message,
            receipt_id: Some(tx_hash.to_string()),
        };

        loop {
            match self.receipt(endpoint, tx_hash).await {
                Ok(Some(receipt)) => {
                    if !receipt.succeeded() {
                        return Err(DeployError::Rejected(format!(
                            "transaction {} reverted",
                            tx_hash
                        )));
                    }
                    let result_ref = receipt.contract_address.ok_or_else(|| {
                        DeployError::Rejected(format!(
                            "transaction {} created no contract",
                            tx_hash
                        ))
                    })?;
                    return Ok(DeploymentReceipt {
                        result_ref,
                        receipt_id: tx_hash.to_string(),
                    });
                }
                Ok(None) => {}
                Err(e) if e.is_retryable() => {
                    tracing::debug!(tx = tx_hash, error = %e, "Receipt poll failed; retrying");
                }
                Err(e) => return Err(e),
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(unconfirmed(format!(
                    "transaction {} not mined within {:?}",
                    tx_hash, self.settings.receipt_timeout
                )));
            }
            tokio::time::sleep(self.settings.poll_interval).await;
        }
    }
}

fn classify(method: &str, err: reqwest::Error, delivery: Delivery) -> DeployError {
    let message = format!("{}: {}", method, err);
    if err.is_connect() {
        // Never reached the node.
        DeployError::Transient(message)
    } else if err.is_timeout() || delivery == Delivery::Submission {
        DeployError::Timeout {
            message,
            receipt_id: None,
        }
    } else {
        DeployError::Transient(message)
    }
}

/// Parse a decimal or `0x` hex quantity.
fn parse_quantity(raw: &str) -> Option<u64> {
    let raw = raw.trim().trim_matches('"');
    match raw.strip_prefix("0x") {
        Some(hex_digits) => u64::from_str_radix(hex_digits, 16).ok(),
        None => raw.parse().ok(),
    }
}

#[async_trait]
impl DeploymentClient for RpcDeploymentClient {
    async fn deploy(
        &self,
        request: DeploymentRequest<'_>,
    ) -> Result<DeploymentReceipt, DeployError> {
        let endpoint = request.endpoint;
        let actual = self.network_id(endpoint).await?;
        if actual != request.expected_network_id {
            return Err(DeployError::NetworkMismatch {
                expected: request.expected_network_id,
                actual,
            });
        }

        let from = self.sender(endpoint, request.identity).await?;
        let mut data = format!("0x{}", hex::encode(&request.payload.bytecode));
        if let Some(ctor) = &request.args.constructor_data {
            data.push_str(ctor.digits());
        }

        let mut tx = json!({ "from": from, "data": data });
        if let Some(gas) = request.args.gas {
            tx["gas"] = json!(format!("0x{:x}", gas));
        }
        if let Some(value) = request.args.value {
            tx["value"] = json!(format!("0x{:x}", value));
        }

        let hash = self
            .call(endpoint, "eth_sendTransaction", json!([tx]), Delivery::Submission)
            .await?;
        let tx_hash = hash
            .as_str()
            .ok_or_else(|| DeployError::Rejected("eth_sendTransaction returned no hash".into()))?
            .to_string();
        tracing::info!(
            artifact = %request.payload.artifact_ref,
            tx = %tx_hash,
            from = %from,
            "Deployment submitted"
        );

        self.await_receipt(endpoint, &tx_hash).await
    }

    async fn lookup(&self, receipt_id: &str, endpoint: &str) -> Result<Option<String>, DeployError> {
        match self.receipt(endpoint, receipt_id).await? {
            Some(receipt) if receipt.succeeded() => Ok(receipt.contract_address),
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::response::{IntoResponse, Response};
    use axum::routing::post;
    use axum::{Json, Router};
    use std::sync::{Arc, Mutex};
    use waypoint_common::{DeployArgs, Payload};

    const ACCOUNT: &str = "0x90f8bf6a479f320ead074411a4b0e7944ea8c9c1";
    const CONTRACT: &str = "0xe78a0f7e598cc8b0bb87894b0f60dd2a88d6a8ab";

    #[derive(Default)]
    struct FakeNode {
        network_id: u64,
        revert: bool,
        mined: bool,
        lose_submit_response: bool,
        sent: Mutex<Vec<Value>>,
    }

    async fn handle(State(node): State<Arc<FakeNode>>, Json(req): Json<Value>) -> Response {
        let id = req["id"].clone();
        let result = match req["method"].as_str().unwrap_or_default() {
            "net_version" => json!(node.network_id.to_string()),
            "eth_accounts" => json!([ACCOUNT]),
            "eth_sendTransaction" => {
                node.sent.lock().unwrap().push(req["params"][0].clone());
                if node.lose_submit_response {
                    return (StatusCode::BAD_GATEWAY, "upstream closed").into_response();
                }
                json!("0xfeed")
            }
            "eth_getTransactionReceipt" => {
                if req["params"][0] != json!("0xfeed") || !node.mined {
                    Value::Null
                } else if node.revert {
                    json!({ "status": "0x0", "contractAddress": null })
                } else {
                    json!({ "status": "0x1", "contractAddress": CONTRACT })
                }
            }
            other => {
                return Json(json!({
                    "jsonrpc": "2.0", "id": id,
                    "error": { "code": -32601, "message": format!("method {} not found", other) }
                }))
                .into_response();
            }
        };
        Json(json!({ "jsonrpc": "2.0", "id": id, "result": result })).into_response()
    }

    async fn spawn_node(node: FakeNode) -> (String, Arc<FakeNode>) {
        let node = Arc::new(node);
        let app = Router::new()
            .route("/", post(handle))
            .with_state(node.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}", addr), node)
    }

    fn client() -> RpcDeploymentClient {
        RpcDeploymentClient::new(RpcSettings {
            request_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(10),
            receipt_timeout: Duration::from_millis(200),
        })
        .unwrap()
    }

    fn payload() -> Payload {
        Payload {
            artifact_ref: "Shop".into(),
            bytecode: vec![0x60, 0x80],
            digest: "00".into(),
        }
    }

    #[tokio::test]
    async fn test_deploy_returns_contract_address() {
        let (endpoint, node) = spawn_node(FakeNode {
            network_id: 1337,
            mined: true,
            ..FakeNode::default()
        })
        .await;
        let payload = payload();
        let args = DeployArgs {
            gas: Some(6_000_000),
            ..DeployArgs::default()
        };
        let receipt = client()
            .deploy(DeploymentRequest {
                payload: &payload,
                identity: &Identity::Account(0),
                args: &args,
                endpoint: &endpoint,
                expected_network_id: 1337,
            })
            .await
            .unwrap();
        assert_eq!(receipt.result_ref, CONTRACT);
        assert_eq!(receipt.receipt_id, "0xfeed");

        let sent = node.sent.lock().unwrap();
        assert_eq!(sent[0]["from"], json!(ACCOUNT));
        assert_eq!(sent[0]["data"], json!("0x6080"));
        assert_eq!(sent[0]["gas"], json!("0x5b8d80"));
    }

    #[tokio::test]
    async fn test_network_mismatch_submits_nothing() {
        let (endpoint, node) = spawn_node(FakeNode {
            network_id: 1,
            mined: true,
            ..FakeNode::default()
        })
        .await;
        let payload = payload();
        let err = client()
            .deploy(DeploymentRequest {
                payload: &payload,
                identity: &Identity::Account(0),
                args: &DeployArgs::default(),
                endpoint: &endpoint,
                expected_network_id: 1337,
            })
            .await
            .unwrap_err();
        assert_eq!(
            err,
            DeployError::NetworkMismatch {
                expected: 1337,
                actual: 1
            }
        );
        assert!(node.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reverted_deployment_is_rejected() {
        let (endpoint, _node) = spawn_node(FakeNode {
            network_id: 1337,
            mined: true,
            revert: true,
            ..FakeNode::default()
        })
        .await;
        let payload = payload();
        let err = client()
            .deploy(DeploymentRequest {
                payload: &payload,
                identity: &Identity::Account(0),
                args: &DeployArgs::default(),
                endpoint: &endpoint,
                expected_network_id: 1337,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::Rejected(ref m) if m.contains("reverted")));
    }

    #[tokio::test]
    async fn test_unmined_transaction_times_out_with_receipt_id() {
        let (endpoint, _node) = spawn_node(FakeNode {
            network_id: 1337,
            mined: false,
            ..FakeNode::default()
        })
        .await;
        let payload = payload();
        let err = client()
            .deploy(DeploymentRequest {
                payload: &payload,
                identity: &Identity::Account(0),
                args: &DeployArgs::default(),
                endpoint: &endpoint,
                expected_network_id: 1337,
            })
            .await
            .unwrap_err();
        assert!(err.outcome_unknown());
        assert_eq!(err.receipt_id(), Some("0xfeed"));
    }

    #[tokio::test]
    async fn test_lost_submission_response_leaves_outcome_unknown() {
        let (endpoint, node) = spawn_node(FakeNode {
            network_id: 1337,
            mined: true,
            lose_submit_response: true,
            ..FakeNode::default()
        })
        .await;
        let payload = payload();
        let err = client()
            .deploy(DeploymentRequest {
                payload: &payload,
                identity: &Identity::Account(0),
                args: &DeployArgs::default(),
                endpoint: &endpoint,
                expected_network_id: 1337,
            })
            .await
            .unwrap_err();
        assert!(err.outcome_unknown());
        assert_eq!(err.receipt_id(), None);
        assert_eq!(node.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_account_index_is_rejected() {
        let (endpoint, _node) = spawn_node(FakeNode {
            network_id: 1337,
            mined: true,
            ..FakeNode::default()
        })
        .await;
        let payload = payload();
        let err = client()
            .deploy(DeploymentRequest {
                payload: &payload,
                identity: &Identity::Account(3),
                args: &DeployArgs::default(),
                endpoint: &endpoint,
                expected_network_id: 1337,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::Rejected(ref m) if m.contains("#3")));
    }

    #[tokio::test]
    async fn test_lookup_finds_mined_deployment() {
        let (endpoint, _node) = spawn_node(FakeNode {
            network_id: 1337,
            mined: true,
            ..FakeNode::default()
        })
        .await;
        let client = client();
        assert_eq!(
            client.lookup("0xfeed", &endpoint).await.unwrap().as_deref(),
            Some(CONTRACT)
        );
        assert_eq!(client.lookup("0xdead", &endpoint).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_connection_refused_is_transient() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let payload = payload();
        let err = client()
            .deploy(DeploymentRequest {
                payload: &payload,
                identity: &Identity::Account(0),
                args: &DeployArgs::default(),
                endpoint: &endpoint,
                expected_network_id: 1337,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::Transient(_)));
    }

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("1337"), Some(1337));
        assert_eq!(parse_quantity("0x539"), Some(1337));
        assert_eq!(parse_quantity("\"5\""), Some(5));
        assert_eq!(parse_quantity("main"), None);
    }
}
