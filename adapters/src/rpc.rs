//! Minimal JSON-RPC over HTTP shared by both chain clients.

use crate::error::ChainError;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tandem_types::Chain;
use tracing::trace;

/// Envelope dialect spoken by the node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RpcDialect {
    /// bitcoind: `"jsonrpc": "1.0"`, errors may arrive with HTTP 500.
    Bitcoind,
    /// Ethereum nodes: `"jsonrpc": "2.0"`.
    Ethereum,
}

#[derive(Debug)]
pub struct JsonRpcClient {
    chain: Chain,
    url: String,
    dialect: RpcDialect,
    http: reqwest::Client,
    auth: Option<(String, String)>,
    next_id: AtomicU64,
}

impl JsonRpcClient {
    pub fn new(
        chain: Chain,
        url: impl Into<String>,
        dialect: RpcDialect,
        timeout: Duration,
    ) -> Result<Self, ChainError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChainError::Unavailable {
                chain,
                method: "connect".into(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            chain,
            url: url.into(),
            dialect,
            http,
            auth: None,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn with_basic_auth(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.auth = Some((user.into(), password.into()));
        self
    }

    pub fn chain(&self) -> Chain {
        self.chain
    }

    /// Issue one call and deserialize its `result`.
    pub async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, ChainError> {
        self.call_with_timeout(method, params, None).await
    }

    /// [`Self::call`] with `timeout` replacing the client-wide one for this
    /// request only.
    pub async fn call_with_timeout<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
        timeout: Option<Duration>,
    ) -> Result<T, ChainError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let version = match self.dialect {
            RpcDialect::Bitcoind => "1.0",
            RpcDialect::Ethereum => "2.0",
        };
        let body = json!({ "jsonrpc": version, "id": id, "method": method, "params": params });

        let started = Instant::now();
        let mut request = self.http.post(&self.url).json(&body);
        if let Some((user, password)) = &self.auth {
            request = request.basic_auth(user, Some(password));
        }
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        let response = request.send().await.map_err(|e| ChainError::Unavailable {
            chain: self.chain,
            method: method.to_string(),
            reason: if e.is_timeout() {
                "request timed out".to_string()
            } else {
                format!("request failed: {e}")
            },
        })?;

        let status = response.status();
        let json: Value = match response.json().await {
            Ok(json) => json,
            Err(e) if status.is_success() => {
                return Err(ChainError::invalid_response(self.chain, method, e))
            }
            Err(_) => {
                return Err(ChainError::Unavailable {
                    chain: self.chain,
                    method: method.to_string(),
                    reason: format!("node returned HTTP {status}"),
                })
            }
        };
        trace!(
            chain = %self.chain,
            method,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "rpc call"
        );

        if let Some(err) = json.get("error").filter(|e| !e.is_null()) {
            return Err(ChainError::Rpc {
                chain: self.chain,
                method: method.to_string(),
                code: err.get("code").and_then(Value::as_i64).unwrap_or_default(),
                message: err
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            });
        }
        let result = json
            .get("result")
            .cloned()
            .ok_or_else(|| ChainError::invalid_response(self.chain, method, "missing result"))?;
        serde_json::from_value(result)
            .map_err(|e| ChainError::invalid_response(self.chain, method, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header_exists, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client(server: &MockServer, dialect: RpcDialect) -> JsonRpcClient {
        JsonRpcClient::new(Chain::Utxo, server.uri(), dialect, Duration::from_secs(2)).unwrap()
    }

    #[tokio::test]
    async fn result_is_deserialized() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "method": "getblockcount", "jsonrpc": "1.0" })))
            .and(header_exists("authorization"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "result": 812_345, "error": null, "id": 1 })),
            )
            .mount(&server)
            .await;

        let rpc = client(&server, RpcDialect::Bitcoind)
            .await
            .with_basic_auth("user", "pass");
        let height: u64 = rpc.call("getblockcount", json!([])).await.unwrap();
        assert_eq!(height, 812_345);
    }

    #[tokio::test]
    async fn error_body_on_http_500_is_an_rpc_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({
                "result": null,
                "error": { "code": -26, "message": "min relay fee not met" },
                "id": 1
            })))
            .mount(&server)
            .await;

        let err = client(&server, RpcDialect::Bitcoind)
            .await
            .call::<String>("sendrawtransaction", json!(["00"]))
            .await
            .unwrap_err();
        assert!(matches!(err, ChainError::Rpc { code: -26, .. }));
    }

    #[tokio::test]
    async fn non_json_failure_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = client(&server, RpcDialect::Ethereum)
            .await
            .call::<String>("eth_blockNumber", json!([]))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn slow_node_times_out_as_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_millis(500))
                    .set_body_json(json!({ "result": "0x1" })),
            )
            .mount(&server)
            .await;

        let rpc = JsonRpcClient::new(
            Chain::Contract,
            server.uri(),
            RpcDialect::Ethereum,
            Duration::from_millis(50),
        )
        .unwrap();
        let err = rpc
            .call::<String>("eth_blockNumber", json!([]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), tandem_types::ErrorKind::ChainUnavailable);
    }

    #[tokio::test]
    async fn per_call_timeout_overrides_the_client_default() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_millis(300))
                    .set_body_json(json!({ "result": "0x1" })),
            )
            .mount(&server)
            .await;

        let rpc = client(&server, RpcDialect::Ethereum).await;
        let err = rpc
            .call_with_timeout::<String>(
                "eth_blockNumber",
                json!([]),
                Some(Duration::from_millis(50)),
            )
            .await
            .unwrap_err();
        match err {
            ChainError::Unavailable { reason, .. } => assert_eq!(reason, "request timed out"),
            other => panic!("unexpected {other}"),
        }

        let height: String = rpc.call("eth_blockNumber", json!([])).await.unwrap();
        assert_eq!(height, "0x1");
    }
}
