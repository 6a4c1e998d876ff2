/// Bitcoin Core JSON-RPC client
///
/// JSON-RPC 2.0 over HTTP POST with basic auth. Bitcoin Core will not return
/// the genesis coinbase through `getrawtransaction`, so that one transaction
/// is served from an embedded copy.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, warn};

use crate::config::NodeSettings;
use crate::error::NodeError;
use crate::metrics::{self, Timer};
use crate::node::model::{NetworkInfo, RawBlock, RawTransaction, RpcRequest, RpcResponse};
use crate::node::{NodeClient, BITCOIN_CORE};
use crate::telemetry::truncate_hex;
use crate::tx::GENESIS_TXID;

const GENESIS_TX_JSON: &str = r#"{
    "txid": "4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b",
    "version": 1,
    "locktime": 0,
    "vin": [
        {
            "coinbase": "04ffff001d0104455468652054696d65732030332f4a616e2f32303039204368616e63656c6c6f72206f6e206272696e6b206f66207365636f6e64206261696c6f757420666f722062616e6b73",
            "sequence": 4294967295
        }
    ],
    "vout": [
        {
            "value": 50.00000000,
            "n": 0,
            "scriptPubKey": {
                "hex": "4104678afdb0fe5548271967f1a67130b7105cd6a828e03909a67962e0ea1f61deb649f6bc3f4cef38c4f35504e51ec112de5c384df7ba0b8d578a4c702b6bf11d5fac",
                "type": "pubkey"
            }
        }
    ],
    "hex": "01000000010000000000000000000000000000000000000000000000000000000000000000ffffffff4d04ffff001d0104455468652054696d65732030332f4a616e2f32303039204368616e63656c6c6f72206f6e206272696e6b206f66207365636f6e64206261696c6f757420666f722062616e6b73ffffffff0100f2052a01000000434104678afdb0fe5548271967f1a67130b7105cd6a828e03909a67962e0ea1f61deb649f6bc3f4cef38c4f35504e51ec112de5c384df7ba0b8d578a4c702b6bf11d5fac00000000",
    "blockhash": "000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f",
    "blocktime": 1231006505
}"#;

/// The genesis coinbase as the node would have returned it
pub fn genesis_transaction() -> Result<RawTransaction, NodeError> {
    Ok(serde_json::from_str(GENESIS_TX_JSON)?)
}

/// Version number from a `getnetworkinfo` subversion such as "/Satoshi:25.0.0/"
pub fn parse_subversion(subversion: &str) -> Option<String> {
    let version = match subversion.split_once(':') {
        Some((_, rest)) => rest,
        None => subversion,
    };
    let version = version.replace('/', "");
    if version.is_empty() {
        None
    } else {
        Some(version)
    }
}

pub struct BitcoinCore {
    client: reqwest::Client,
    url: String,
    username: String,
    password: String,
    next_id: AtomicU64,
    version: String,
}

impl BitcoinCore {
    /// Build the client and confirm the node answers with a version
    pub async fn connect(settings: &NodeSettings) -> Result<Self, NodeError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;

        let mut node = BitcoinCore {
            client,
            url: settings.url(),
            username: settings.username.clone(),
            password: settings.password.clone(),
            next_id: AtomicU64::new(1),
            version: String::new(),
        };

        let info: NetworkInfo = node.call("getnetworkinfo", Vec::new()).await?;
        node.version = info
            .subversion
            .as_deref()
            .and_then(parse_subversion)
            .ok_or_else(|| NodeError::malformed("subversion", "node reported no version"))?;
        Ok(node)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<serde_json::Value>,
    ) -> Result<T, NodeError> {
        let timer = Timer::new();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest::new(id, method, params);

        let result = self.send(&request).await;

        metrics::observe_rpc_call(method, timer.elapsed_secs());
        match &result {
            Ok(_) => debug!(method, id, "RPC call succeeded"),
            Err(e) => {
                metrics::increment_rpc_errors(method, e.kind());
                warn!(method, id, error = %e, "RPC call failed");
            }
        }
        result
    }

    async fn send<T: DeserializeOwned>(&self, request: &RpcRequest<'_>) -> Result<T, NodeError> {
        // Bitcoin Core answers RPC errors with a non-2xx status and a JSON body,
        // so the body is read regardless of status.
        let body = self
            .client
            .post(&self.url)
            .basic_auth(&self.username, Some(&self.password))
            .json(request)
            .send()
            .await?
            .bytes()
            .await?;

        let response: RpcResponse<T> = serde_json::from_slice(&body)?;
        if let Some(error) = response.error {
            return Err(NodeError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        response
            .result
            .ok_or_else(|| NodeError::EmptyResult(request.method.to_string()))
    }
}

#[async_trait]
impl NodeClient for BitcoinCore {
    fn node_type(&self) -> &'static str {
        BITCOIN_CORE
    }

    fn version(&self) -> &str {
        &self.version
    }

    async fn block_count(&self) -> Result<u32, NodeError> {
        self.call("getblockcount", Vec::new()).await
    }

    async fn best_block_hash(&self) -> Result<String, NodeError> {
        self.call("getbestblockhash", Vec::new()).await
    }

    async fn block_hash(&self, height: u32) -> Result<String, NodeError> {
        self.call("getblockhash", vec![json!(height)]).await
    }

    async fn block(&self, hash: &str, with_txs: bool) -> Result<RawBlock, NodeError> {
        let verbosity = if with_txs { 2 } else { 1 };
        debug!(hash = %truncate_hex(hash, 16), verbosity, "Fetching block");
        self.call("getblock", vec![json!(hash), json!(verbosity)]).await
    }

    async fn raw_transaction(&self, txid: &str) -> Result<RawTransaction, NodeError> {
        if txid == GENESIS_TXID {
            return genesis_transaction();
        }
        self.call("getrawtransaction", vec![json!(txid), json!(true)]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::SpendType;
    use crate::node::convert::tx_from_raw;
    use crate::output::OutputType;

    #[test]
    fn test_parse_subversion() {
        assert_eq!(parse_subversion("/Satoshi:25.0.0/"), Some("25.0.0".to_string()));
        assert_eq!(parse_subversion("/Satoshi:0.21.1(custom)/"), Some("0.21.1(custom)".to_string()));
        assert_eq!(parse_subversion("26.1"), Some("26.1".to_string()));
        assert_eq!(parse_subversion("//"), None);
    }

    #[test]
    fn test_genesis_fixture() {
        let raw = genesis_transaction().unwrap();
        assert_eq!(raw.txid, GENESIS_TXID);

        let tx = tx_from_raw(&raw).unwrap();
        assert!(tx.is_coinbase());
        assert!(!tx.supports_bip141());
        assert_eq!(tx.inputs()[0].spend_type(), Some(SpendType::Coinbase));
        assert_eq!(tx.outputs()[0].value(), 5_000_000_000);
        assert_eq!(tx.outputs()[0].output_type(), OutputType::P2pk);
        assert_eq!(
            tx.outputs()[0].address(),
            Some("1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa")
        );
        assert_eq!(tx.block().map(|b| b.time), Some(1_231_006_505));
    }
}
