/// JSON-RPC wire types for the node client
///
/// Only the fields the explorer reads are modelled. Amounts stay as
/// `serde_json::Number` so the decimal text reaches `btc_to_satoshis` intact.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct RpcRequest<'a> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'a str,
    pub params: Vec<serde_json::Value>,
}

impl<'a> RpcRequest<'a> {
    pub fn new(id: u64, method: &'a str, params: Vec<serde_json::Value>) -> Self {
        RpcRequest {
            jsonrpc: "2.0",
            id,
            method,
            params,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcResponse<T> {
    pub result: Option<T>,
    pub error: Option<RpcErrorObject>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkInfo {
    pub subversion: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawScriptSig {
    pub hex: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawInput {
    pub coinbase: Option<String>,
    pub txid: Option<String>,
    pub vout: Option<u32>,
    #[serde(rename = "scriptSig")]
    pub script_sig: Option<RawScriptSig>,
    pub txinwitness: Option<Vec<String>>,
    pub sequence: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawScriptPubKey {
    pub hex: String,
    pub address: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawOutput {
    pub value: serde_json::Number,
    pub n: u32,
    #[serde(rename = "scriptPubKey")]
    pub script_pub_key: RawScriptPubKey,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawTransaction {
    pub txid: String,
    /// Signed on nodes older than v28; reinterpreted as `u32` on conversion
    pub version: i64,
    pub locktime: u32,
    pub vin: Vec<RawInput>,
    pub vout: Vec<RawOutput>,
    pub hex: String,
    pub blockhash: Option<String>,
    pub blocktime: Option<i64>,
}

/// `getblock` result. `tx` holds ids at verbosity 1 and full transaction
/// objects at verbosity 2.
#[derive(Debug, Clone, Deserialize)]
pub struct RawBlock {
    pub hash: String,
    pub height: u32,
    pub time: i64,
    pub version: i64,
    pub previousblockhash: Option<String>,
    pub nextblockhash: Option<String>,
    #[serde(default)]
    pub tx: Vec<serde_json::Value>,
}
