//! http clients for a live deployment
//!
//! - [`JsonRpcProvider`]: ethereum json-rpc (`eth_chainId`, `eth_call`) for
//!   the gateway key fetch
//! - [`HttpReencryptionService`]: POST `{gateway_url}/reencrypt`

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::fhe::NetworkProvider;
use crate::reencrypt::{ReencryptRequest, ReencryptResponse, ReencryptionService};
use crate::types::{parse_hex, to_hex_prefixed, Address};
use crate::{Error, Result};

/// json-rpc chain access
pub struct JsonRpcProvider {
    url: String,
    client: Client,
    next_id: AtomicU64,
}

impl JsonRpcProvider {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            client: Client::new(),
            next_id: AtomicU64::new(1),
        }
    }

    async fn rpc(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
            "method": method,
            "params": params,
        });

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        let json: RpcResponse = response
            .json()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        if let Some(error) = json.error {
            return Err(Error::Network(format!(
                "rpc error {}: {}",
                error.code, error.message
            )));
        }

        json.result
            .ok_or_else(|| Error::Network("no result in response".into()))
    }
}

#[async_trait]
impl NetworkProvider for JsonRpcProvider {
    async fn chain_id(&self) -> Result<u64> {
        let result = self.rpc("eth_chainId", vec![]).await?;
        let quantity = result
            .as_str()
            .ok_or_else(|| Error::Network("chain id is not a string".into()))?;
        parse_quantity(quantity)
    }

    async fn call(&self, to: &Address, data: &[u8]) -> Result<Vec<u8>> {
        let call = json!({ "to": to, "data": to_hex_prefixed(data) });
        let result = self.rpc("eth_call", vec![call, json!("latest")]).await?;
        let hex = result
            .as_str()
            .ok_or_else(|| Error::Network("call result is not a string".into()))?;
        parse_hex(hex)
    }
}

/// parse a `0x`-prefixed hex quantity
fn parse_quantity(s: &str) -> Result<u64> {
    let digits = s
        .strip_prefix("0x")
        .ok_or_else(|| Error::Network(format!("bad quantity {:?}", s)))?;
    u64::from_str_radix(digits, 16).map_err(|e| Error::Network(format!("bad quantity {:?}: {}", s, e)))
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

/// re-encryption gateway over http
pub struct HttpReencryptionService {
    gateway_url: String,
    client: Client,
}

impl HttpReencryptionService {
    pub fn new(gateway_url: &str) -> Self {
        Self {
            gateway_url: gateway_url.trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }
}

#[async_trait]
impl ReencryptionService for HttpReencryptionService {
    async fn reencrypt(&self, request: &ReencryptRequest) -> Result<Vec<u8>> {
        let resp = self
            .client
            .post(format!("{}/reencrypt", self.gateway_url))
            .json(request)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(Error::Authorization(format!(
                "gateway returned {}",
                resp.status()
            )));
        }

        let body: ReencryptResponse = resp
            .json()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;
        parse_hex(&body.response)
    }
}
