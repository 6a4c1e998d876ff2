/// Explorer service
///
/// Fronts a `NodeClient` with the cache and turns node JSON into classified
/// blocks and transactions. Previous outputs are fetched concurrently, bounded
/// by `explorer.max_concurrent_fetches`, and attached to each input, which
/// re-classifies it.

use std::str::FromStr;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{debug, info};

use crate::block::Block;
use crate::cache::CacheManager;
use crate::config::ExplorerSettings;
use crate::error::NodeError;
use crate::metrics;
use crate::node::convert::{block_from_raw, is_hash_hex, tx_from_raw};
use crate::node::NodeClient;
use crate::output::Output;
use crate::stats::BlockStats;
use crate::telemetry::{truncate_hex, ProgressCounter};
use crate::tx::{BlockLink, Tx};

/// How a block is requested: by hash, by height, or the current tip
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockKey {
    Tip,
    Height(u32),
    Hash(String),
}

impl FromStr for BlockKey {
    type Err = NodeError;

    fn from_str(key: &str) -> Result<Self, Self::Err> {
        let key = key.trim();
        if key.is_empty() {
            return Ok(BlockKey::Tip);
        }
        if is_hash_hex(key) {
            return Ok(BlockKey::Hash(key.to_lowercase()));
        }
        key.parse::<u32>()
            .map(BlockKey::Height)
            .map_err(|_| NodeError::malformed("block key", format!("not a hash or height: {}", key)))
    }
}

pub struct Explorer {
    node: Arc<dyn NodeClient>,
    cache: CacheManager,
    max_concurrent_fetches: usize,
}

impl Explorer {
    pub fn new(node: Arc<dyn NodeClient>, cache: CacheManager, settings: &ExplorerSettings) -> Self {
        Explorer {
            node,
            cache,
            max_concurrent_fetches: settings.max_concurrent_fetches.max(1),
        }
    }

    pub fn node_version(&self) -> String {
        self.node.version_string()
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    /// Never cached
    pub async fn current_block_height(&self) -> Result<u32, NodeError> {
        self.node.block_count().await
    }

    pub async fn block(&self, key: &BlockKey) -> Result<Block, NodeError> {
        let hash = match key {
            BlockKey::Tip => self.node.best_block_hash().await?,
            BlockKey::Height(height) => {
                if let Some(block) = self.cache.get_block_by_height(*height).await {
                    return Ok(block);
                }
                self.node.block_hash(*height).await?
            }
            BlockKey::Hash(hash) => hash.clone(),
        };
        self.block_by_hash(&hash).await
    }

    async fn block_by_hash(&self, hash: &str) -> Result<Block, NodeError> {
        if let Some(block) = self.cache.get_block_by_hash(hash).await {
            return Ok(block);
        }

        let (block, _) = block_from_raw(self.node.block(hash, false).await?)?;
        debug!(
            hash = %truncate_hex(&block.hash, 16),
            height = block.height,
            txs = block.tx_count(),
            "Fetched block"
        );
        self.cache.put_block(block.clone()).await;
        Ok(block)
    }

    /// Transaction with provisional input classification
    async fn base_tx(&self, txid: &str) -> Result<Tx, NodeError> {
        if !is_hash_hex(txid) {
            return Err(NodeError::malformed("txid", format!("not a txid: {}", txid)));
        }
        let txid = txid.to_lowercase();
        if let Some(tx) = self.cache.get_tx(&txid).await {
            return Ok(tx);
        }

        let tx = tx_from_raw(&self.node.raw_transaction(&txid).await?)?;
        self.cache.put_tx(tx.clone()).await;
        Ok(tx)
    }

    /// Fetch and classify a transaction. With `with_previous_outputs` every
    /// spent output is fetched and attached, giving final spend types.
    pub async fn tx(&self, txid: &str, with_previous_outputs: bool) -> Result<Tx, NodeError> {
        let mut tx = self.base_tx(txid).await?;
        if with_previous_outputs {
            self.attach_previous_outputs(&mut tx).await?;
        }
        metrics::record_classified_tx(&tx);
        Ok(tx)
    }

    pub async fn output(&self, txid: &str, index: u32) -> Result<Output, NodeError> {
        let tx = self.base_tx(txid).await?;
        tx.output(index as usize)
            .cloned()
            .ok_or_else(|| NodeError::NotFound(format!("output {}:{}", txid, index)))
    }

    async fn attach_previous_outputs(&self, tx: &mut Tx) -> Result<(), NodeError> {
        let outpoints: Vec<_> = tx
            .inputs()
            .iter()
            .enumerate()
            .filter_map(|(i, input)| input.outpoint().map(|op| (i, op.clone())))
            .collect();
        if outpoints.is_empty() {
            return Ok(());
        }

        let fetched: Vec<Result<(usize, Output), NodeError>> = stream::iter(outpoints)
            .map(|(i, outpoint)| async move {
                let output = self.output(&outpoint.txid, outpoint.index).await?;
                Ok::<_, NodeError>((i, output))
            })
            .buffer_unordered(self.max_concurrent_fetches)
            .collect()
            .await;

        for result in fetched {
            let (i, output) = result?;
            tx.set_previous_output(i, output);
        }
        debug!(txid = %truncate_hex(tx.id(), 16), inputs = tx.inputs().len(), "Attached previous outputs");
        Ok(())
    }

    /// Every transaction of a block, in block order, linked to the block
    pub async fn block_txs(&self, block: &Block) -> Result<Vec<Tx>, NodeError> {
        let (_, raw_txs) = block_from_raw(self.node.block(&block.hash, true).await?)?;
        let link = BlockLink {
            hash: block.hash.clone(),
            time: block.timestamp,
            height: Some(block.height),
        };

        let mut txs = Vec::with_capacity(raw_txs.len());
        for raw in &raw_txs {
            let mut tx = tx_from_raw(raw)?;
            tx.set_block(link.clone());
            self.cache.put_tx(tx.clone()).await;
            txs.push(tx);
        }
        Ok(txs)
    }

    /// Spend and output type statistics for a block.
    ///
    /// Without `resolve_inputs` the spend types are inferred from the inputs
    /// alone. Resolving fetches one previous output per input.
    pub async fn block_stats(&self, key: &BlockKey, resolve_inputs: bool) -> Result<(Block, BlockStats), NodeError> {
        let block = self.block(key).await?;
        let mut txs = self.block_txs(&block).await?;

        if resolve_inputs {
            let progress = ProgressCounter::new(100);
            let total = txs.len();
            for tx in txs.iter_mut() {
                if progress.should_log() {
                    info!(height = block.height, done = progress.get() - 1, total, "Resolving previous outputs");
                }
                self.attach_previous_outputs(tx).await?;
            }
        }

        for tx in &txs {
            metrics::record_classified_tx(tx);
        }
        let stats = BlockStats::from_txs(&txs);
        Ok((block, stats))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::{json, Value};

    use crate::input::SpendType;
    use crate::node::model::{RawBlock, RawTransaction};

    /// Node backed by JSON held in memory
    struct MemoryNode {
        txs: HashMap<String, Value>,
        blocks: Vec<(String, Vec<String>)>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl NodeClient for MemoryNode {
        fn node_type(&self) -> &'static str {
            "Memory"
        }

        fn version(&self) -> &str {
            "1.0"
        }

        async fn block_count(&self) -> Result<u32, NodeError> {
            Ok(self.blocks.len() as u32 - 1)
        }

        async fn best_block_hash(&self) -> Result<String, NodeError> {
            self.blocks
                .last()
                .map(|(hash, _)| hash.clone())
                .ok_or_else(|| NodeError::NotFound("tip".to_string()))
        }

        async fn block_hash(&self, height: u32) -> Result<String, NodeError> {
            self.blocks
                .get(height as usize)
                .map(|(hash, _)| hash.clone())
                .ok_or_else(|| NodeError::Rpc { code: -8, message: "Block height out of range".to_string() })
        }

        async fn block(&self, hash: &str, with_txs: bool) -> Result<RawBlock, NodeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let height = self
                .blocks
                .iter()
                .position(|(h, _)| h == hash)
                .ok_or_else(|| NodeError::Rpc { code: -5, message: "Block not found".to_string() })?;
            let (_, txids) = &self.blocks[height];
            let tx: Vec<Value> = txids
                .iter()
                .map(|id| if with_txs { self.txs[id].clone() } else { json!(id) })
                .collect();
            Ok(RawBlock {
                hash: hash.to_string(),
                height: height as u32,
                time: 1_700_000_000 + height as i64,
                version: 0x2000_0000,
                previousblockhash: height.checked_sub(1).map(|h| self.blocks[h].0.clone()),
                nextblockhash: self.blocks.get(height + 1).map(|(h, _)| h.clone()),
                tx,
            })
        }

        async fn raw_transaction(&self, txid: &str) -> Result<RawTransaction, NodeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let value = self
                .txs
                .get(txid)
                .ok_or_else(|| NodeError::Rpc { code: -5, message: "No such transaction".to_string() })?;
            Ok(serde_json::from_value(value.clone())?)
        }
    }

    fn signature_hex() -> String {
        format!("30440220{}0220{}01", "11".repeat(32), "22".repeat(32))
    }

    fn key_hex() -> String {
        format!("02{}", "33".repeat(32))
    }

    fn funding_txid() -> String {
        "aa".repeat(32)
    }

    fn spending_txid() -> String {
        "bb".repeat(32)
    }

    fn fixture() -> MemoryNode {
        let funding = json!({
            "txid": funding_txid(),
            "version": 1,
            "locktime": 0,
            "vin": [{ "coinbase": "0101", "sequence": 4294967295u32 }],
            "vout": [
                { "value": 0.5, "n": 0,
                  "scriptPubKey": { "hex": format!("76a914{}88ac", "44".repeat(20)) } },
                { "value": 0.25, "n": 1,
                  "scriptPubKey": { "hex": format!("0014{}", "55".repeat(20)) } }
            ],
            "hex": "01000000010000"
        });

        let spending = json!({
            "txid": spending_txid(),
            "version": 2,
            "locktime": 0,
            "vin": [
                { "txid": funding_txid(), "vout": 0,
                  "scriptSig": { "hex": format!("47{}21{}", signature_hex(), key_hex()) },
                  "txinwitness": [],
                  "sequence": 4294967294u32 },
                { "txid": funding_txid(), "vout": 1,
                  "scriptSig": { "hex": "" },
                  "txinwitness": [signature_hex(), key_hex()],
                  "sequence": 4294967294u32 }
            ],
            "vout": [
                { "value": 0.7, "n": 0,
                  "scriptPubKey": { "hex": format!("a914{}87", "66".repeat(20)) } }
            ],
            "hex": "02000000000102"
        });

        let mut txs = HashMap::new();
        txs.insert(funding_txid(), funding);
        txs.insert(spending_txid(), spending);

        MemoryNode {
            txs,
            blocks: vec![
                ("00".repeat(31) + "01", vec![funding_txid()]),
                ("00".repeat(31) + "02", vec![spending_txid()]),
            ],
            calls: AtomicUsize::new(0),
        }
    }

    fn explorer() -> (Explorer, Arc<MemoryNode>) {
        let node = Arc::new(fixture());
        let explorer = Explorer::new(
            node.clone(),
            CacheManager::default(),
            &ExplorerSettings { max_concurrent_fetches: 2 },
        );
        (explorer, node)
    }

    #[test]
    fn test_block_key_parsing() {
        assert_eq!("".parse::<BlockKey>().unwrap(), BlockKey::Tip);
        assert_eq!("170".parse::<BlockKey>().unwrap(), BlockKey::Height(170));
        assert_eq!(
            "AB".repeat(32).parse::<BlockKey>().unwrap(),
            BlockKey::Hash("ab".repeat(32))
        );
        assert!("12ab".parse::<BlockKey>().is_err());
    }

    #[tokio::test]
    async fn test_tx_with_previous_outputs() {
        let (explorer, _) = explorer();

        let provisional = explorer.tx(&spending_txid(), false).await.unwrap();
        assert!(provisional.inputs()[0].classification().is_provisional());
        assert_eq!(provisional.fee(), None);

        let tx = explorer.tx(&spending_txid(), true).await.unwrap();
        assert!(tx.supports_bip141());
        assert_eq!(tx.inputs()[0].spend_type(), Some(SpendType::P2pkh));
        assert_eq!(tx.inputs()[1].spend_type(), Some(SpendType::P2wpkh));
        assert!(!tx.inputs()[0].classification().is_provisional());
        assert_eq!(tx.total_in(), Some(75_000_000));
        assert_eq!(tx.fee(), Some(5_000_000));
    }

    #[tokio::test]
    async fn test_transactions_are_cached() {
        let (explorer, node) = explorer();
        explorer.tx(&funding_txid(), false).await.unwrap();
        explorer.tx(&funding_txid(), false).await.unwrap();
        explorer.output(&funding_txid(), 1).await.unwrap();
        assert_eq!(node.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_output_errors() {
        let (explorer, _) = explorer();
        assert!(matches!(
            explorer.output(&funding_txid(), 9).await,
            Err(NodeError::NotFound(_))
        ));
        assert!(matches!(
            explorer.tx("not-a-txid", false).await,
            Err(NodeError::MalformedField { .. })
        ));
        assert!(matches!(
            explorer.tx(&"cc".repeat(32), false).await,
            Err(NodeError::Rpc { code: -5, .. })
        ));
    }

    #[tokio::test]
    async fn test_block_lookup_by_key() {
        let (explorer, node) = explorer();
        assert_eq!(explorer.current_block_height().await.unwrap(), 1);

        let tip = explorer.block(&BlockKey::Tip).await.unwrap();
        assert_eq!(tip.height, 1);
        assert!(tip.is_tip());

        let genesis = explorer.block(&BlockKey::Height(0)).await.unwrap();
        assert_eq!(genesis.next_hash.as_deref(), Some(tip.hash.as_str()));
        assert_eq!(genesis.tx_ids, vec![funding_txid()]);

        let calls = node.calls.load(Ordering::SeqCst);
        explorer.block(&BlockKey::Height(0)).await.unwrap();
        explorer.block(&BlockKey::Hash(tip.hash.clone())).await.unwrap();
        assert_eq!(node.calls.load(Ordering::SeqCst), calls);
    }

    #[tokio::test]
    async fn test_block_stats() {
        let (explorer, _) = explorer();

        let (block, stats) = explorer.block_stats(&BlockKey::Height(1), true).await.unwrap();
        assert_eq!(block.height, 1);
        assert_eq!(stats.tx_count, 1);
        assert_eq!(stats.bip141_tx_count, 1);
        assert_eq!(stats.non_coinbase_input_count, 2);
        let labels: Vec<&str> = stats.spend_types.iter().map(|t| t.label).collect();
        assert_eq!(labels, vec!["P2PKH", "P2WPKH"]);
        assert_eq!(stats.output_types[0].label, "P2SH");

        let tx = explorer.tx(&spending_txid(), false).await.unwrap();
        assert_eq!(tx.block().and_then(|b| b.height), Some(1));
    }
}
