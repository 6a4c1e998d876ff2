/// Node access
///
/// `NodeClient` is the seam between the explorer and a concrete node. It
/// returns the typed wire values from `model`; `convert` turns them into
/// classified transactions and blocks.

pub mod bitcoin_core;
pub mod convert;
pub mod model;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::config::NodeSettings;
use crate::error::NodeError;

pub use bitcoin_core::BitcoinCore;
use model::{RawBlock, RawTransaction};

pub const BITCOIN_CORE: &str = "Bitcoin Core";

#[async_trait]
pub trait NodeClient: Send + Sync {
    /// Product name, e.g. "Bitcoin Core"
    fn node_type(&self) -> &'static str;

    /// Bare version number, e.g. "25.0.0"
    fn version(&self) -> &str;

    fn version_string(&self) -> String {
        format!("{} {}", self.node_type(), self.version())
    }

    async fn block_count(&self) -> Result<u32, NodeError>;

    async fn best_block_hash(&self) -> Result<String, NodeError>;

    async fn block_hash(&self, height: u32) -> Result<String, NodeError>;

    /// `with_txs` asks for full transaction objects instead of ids
    async fn block(&self, hash: &str, with_txs: bool) -> Result<RawBlock, NodeError>;

    async fn raw_transaction(&self, txid: &str) -> Result<RawTransaction, NodeError>;
}

/// Connect to the node named in the settings
pub async fn connect(settings: &NodeSettings) -> Result<Arc<dyn NodeClient>, NodeError> {
    match settings.node_type.as_str() {
        BITCOIN_CORE => {
            let node = BitcoinCore::connect(settings).await?;
            info!(
                node = %node.version_string(),
                url = %settings.url(),
                "Connected to node"
            );
            Ok(Arc::new(node))
        }
        other => Err(NodeError::UnsupportedNode(other.to_string())),
    }
}
