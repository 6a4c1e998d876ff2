/// Transaction value object
///
/// Holds classified inputs and outputs plus optional block linkage. Inputs are
/// classified provisionally at construction and again when their previous
/// outputs are attached.

use serde::Serialize;

use crate::input::Input;
use crate::output::Output;

/// Txid of the genesis coinbase, which Bitcoin Core refuses to return
pub const GENESIS_TXID: &str = "4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b";

/// Block a transaction was mined in
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockLink {
    pub hash: String,
    pub time: i64,
    pub height: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tx {
    id: String,
    version: u32,
    lock_time: u32,
    bip141: bool,
    inputs: Vec<Input>,
    outputs: Vec<Output>,
    block: Option<BlockLink>,
}

/// True when the serialized transaction carries the segwit marker byte.
///
/// The marker sits where a legacy transaction stores its input count, right
/// after the 4-byte version, so a zero there means bip141.
pub fn has_segwit_marker(raw_hex: &str) -> bool {
    raw_hex.get(8..10) == Some("00")
}

impl Tx {
    pub fn new(
        id: String,
        version: u32,
        lock_time: u32,
        bip141: bool,
        inputs: Vec<Input>,
        outputs: Vec<Output>,
        block: Option<BlockLink>,
    ) -> Self {
        Tx {
            id,
            version,
            lock_time,
            bip141,
            inputs,
            outputs,
            block,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn lock_time(&self) -> u32 {
        self.lock_time
    }

    pub fn supports_bip141(&self) -> bool {
        self.bip141
    }

    /// Coinbase transactions have exactly one, coinbase, input
    pub fn is_coinbase(&self) -> bool {
        self.inputs.first().map(|i| i.is_coinbase()).unwrap_or(false)
    }

    pub fn inputs(&self) -> &[Input] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[Output] {
        &self.outputs
    }

    pub fn input(&self, index: usize) -> Option<&Input> {
        self.inputs.get(index)
    }

    pub fn output(&self, index: usize) -> Option<&Output> {
        self.outputs.get(index)
    }

    pub fn block(&self) -> Option<&BlockLink> {
        self.block.as_ref()
    }

    pub fn set_block(&mut self, block: BlockLink) {
        self.block = Some(block);
    }

    /// Attach a previous output to one input. Returns false for a bad index.
    pub fn set_previous_output(&mut self, index: usize, output: Output) -> bool {
        match self.inputs.get_mut(index) {
            Some(input) => {
                input.set_previous_output(output);
                true
            }
            None => false,
        }
    }

    pub fn total_out(&self) -> u64 {
        self.outputs.iter().map(|o| o.value()).sum()
    }

    /// Sum of the spent outputs, once every one of them is attached.
    /// A coinbase spends nothing and reports its outputs instead.
    pub fn total_in(&self) -> Option<u64> {
        if self.is_coinbase() {
            return Some(self.total_out());
        }
        self.inputs
            .iter()
            .map(|i| i.previous_output().map(|o| o.value()))
            .sum()
    }

    pub fn fee(&self) -> Option<u64> {
        if self.is_coinbase() {
            return Some(0);
        }
        self.total_in()?.checked_sub(self.total_out())
    }
}
