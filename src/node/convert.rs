/// Conversion from node JSON to classified domain values
///
/// Every field is validated here so the classification core only ever sees
/// decoded bytes. A transaction without the segwit marker gets a nil segwit;
/// a bip141 transaction whose input has no `txinwitness` gets an empty one.

use tracing::debug;

use crate::block::Block;
use crate::error::NodeError;
use crate::input::{Input, OutPoint};
use crate::node::model::{RawBlock, RawInput, RawOutput, RawTransaction};
use crate::output::Output;
use crate::script::Script;
use crate::segwit::Segwit;
use crate::tx::{has_segwit_marker, BlockLink, Tx};
use crate::value_reader::btc_to_satoshis;

/// Txids and block hashes are 32 bytes of hex
pub fn is_hash_hex(text: &str) -> bool {
    text.len() == 64 && text.bytes().all(|b| b.is_ascii_hexdigit())
}

fn decode_script(field: &str, text: &str) -> Result<Script, NodeError> {
    Script::from_hex(text).map_err(|e| NodeError::malformed(field, e.to_string()))
}

pub fn output_from_raw(raw: &RawOutput) -> Result<Output, NodeError> {
    let value = btc_to_satoshis(&raw.value.to_string())?;
    let script = decode_script("vout.scriptPubKey.hex", &raw.script_pub_key.hex)?;
    Ok(Output::new(value, script, raw.script_pub_key.address.clone()))
}

pub fn input_from_raw(raw: &RawInput, bip141: bool) -> Result<Input, NodeError> {
    let segwit = if !bip141 {
        Segwit::nil()
    } else {
        match &raw.txinwitness {
            Some(items) => Segwit::from_hex(items)
                .map_err(|e| NodeError::malformed("vin.txinwitness", e.to_string()))?,
            None => Segwit::new(Vec::new()),
        }
    };

    if let Some(coinbase) = &raw.coinbase {
        let script = decode_script("vin.coinbase", coinbase)?;
        return Ok(Input::coinbase(script, segwit, raw.sequence));
    }

    let txid = raw
        .txid
        .as_ref()
        .ok_or_else(|| NodeError::malformed("vin.txid", "missing on non-coinbase input"))?;
    if !is_hash_hex(txid) {
        return Err(NodeError::malformed("vin.txid", format!("not a txid: {}", txid)));
    }
    let index = raw
        .vout
        .ok_or_else(|| NodeError::malformed("vin.vout", "missing on non-coinbase input"))?;
    let script = match &raw.script_sig {
        Some(sig) => decode_script("vin.scriptSig.hex", &sig.hex)?,
        None => Script::new(&[]),
    };

    Ok(Input::spending(
        OutPoint { txid: txid.clone(), index },
        script,
        segwit,
        raw.sequence,
    ))
}

pub fn tx_from_raw(raw: &RawTransaction) -> Result<Tx, NodeError> {
    if !is_hash_hex(&raw.txid) {
        return Err(NodeError::malformed("txid", format!("not a txid: {}", raw.txid)));
    }
    let bip141 = has_segwit_marker(&raw.hex);

    let inputs = raw
        .vin
        .iter()
        .map(|vin| input_from_raw(vin, bip141))
        .collect::<Result<Vec<_>, _>>()?;

    let mut outputs = Vec::with_capacity(raw.vout.len());
    for (position, vout) in raw.vout.iter().enumerate() {
        if vout.n as usize != position {
            return Err(NodeError::malformed(
                "vout.n",
                format!("output {} reported as {}", position, vout.n),
            ));
        }
        outputs.push(output_from_raw(vout)?);
    }

    let block = match (&raw.blockhash, raw.blocktime) {
        (Some(hash), Some(time)) => Some(BlockLink {
            hash: hash.clone(),
            time,
            height: None,
        }),
        _ => None,
    };

    debug!(
        txid = %raw.txid,
        inputs = inputs.len(),
        outputs = outputs.len(),
        bip141,
        "Decoded transaction"
    );

    Ok(Tx::new(
        raw.txid.clone(),
        raw.version as u32,
        raw.locktime,
        bip141,
        inputs,
        outputs,
        block,
    ))
}

/// Split a `getblock` result into the block and any full transactions it
/// carried (verbosity 2).
pub fn block_from_raw(raw: RawBlock) -> Result<(Block, Vec<RawTransaction>), NodeError> {
    if !is_hash_hex(&raw.hash) {
        return Err(NodeError::malformed("hash", format!("not a block hash: {}", raw.hash)));
    }

    let mut tx_ids = Vec::with_capacity(raw.tx.len());
    let mut full_txs = Vec::new();
    for entry in raw.tx {
        match entry {
            serde_json::Value::String(txid) => tx_ids.push(txid),
            other => {
                let tx: RawTransaction = serde_json::from_value(other)?;
                tx_ids.push(tx.txid.clone());
                full_txs.push(tx);
            }
        }
    }

    let block = Block {
        hash: raw.hash,
        previous_hash: raw.previousblockhash,
        next_hash: raw.nextblockhash,
        height: raw.height,
        timestamp: raw.time,
        version: raw.version as u32,
        tx_ids,
    };
    Ok((block, full_txs))
}
