/// Block value object. Transaction bodies are fetched separately; the block
/// only lists their ids in order.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Block {
    pub hash: String,
    pub previous_hash: Option<String>,
    pub next_hash: Option<String>,
    pub height: u32,
    pub timestamp: i64,
    pub version: u32,
    pub tx_ids: Vec<String>,
}

impl Block {
    pub fn tx_count(&self) -> usize {
        self.tx_ids.len()
    }

    /// The first transaction of every block is its coinbase
    pub fn coinbase_txid(&self) -> Option<&str> {
        self.tx_ids.first().map(String::as_str)
    }

    pub fn is_tip(&self) -> bool {
        self.next_hash.is_none()
    }
}
