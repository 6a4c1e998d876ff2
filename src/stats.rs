/// Block statistics
///
/// Counts spend types and output types over a block's transactions in the
/// fixed display order, and reports per-input use of serialized scripts
/// (multisig redeem/witness scripts, ordinal inscriptions in tapscripts).

use std::collections::HashMap;

use serde::Serialize;

use crate::input::{Input, SpendType};
use crate::output::OutputType;
use crate::script::Inscription;
use crate::tx::Tx;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeCount {
    pub label: &'static str,
    pub count: usize,
    pub percent: f64,
}

fn percent(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 * 100.0 / total as f64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockStats {
    pub tx_count: usize,
    pub bip141_tx_count: usize,
    pub input_count: usize,
    pub non_coinbase_input_count: usize,
    /// Inputs whose spend type could not be inferred
    pub unknown_spend_count: usize,
    pub output_count: usize,
    pub total_out: u64,
    /// Percentages over non-coinbase inputs
    pub spend_types: Vec<TypeCount>,
    /// Percentages over all outputs
    pub output_types: Vec<TypeCount>,
    pub ordinal_inscriptions: usize,
    pub multisig_redeem_scripts: usize,
    pub multisig_witness_scripts: usize,
}

impl BlockStats {
    pub fn from_txs(txs: &[Tx]) -> Self {
        let mut spend_counts: HashMap<SpendType, usize> = HashMap::new();
        let mut output_counts: HashMap<OutputType, usize> = HashMap::new();

        let mut stats = BlockStats {
            tx_count: txs.len(),
            bip141_tx_count: 0,
            input_count: 0,
            non_coinbase_input_count: 0,
            unknown_spend_count: 0,
            output_count: 0,
            total_out: 0,
            spend_types: Vec::new(),
            output_types: Vec::new(),
            ordinal_inscriptions: 0,
            multisig_redeem_scripts: 0,
            multisig_witness_scripts: 0,
        };

        for tx in txs {
            if tx.supports_bip141() {
                stats.bip141_tx_count += 1;
            }

            for (index, input) in tx.inputs().iter().enumerate() {
                stats.input_count += 1;
                if input.is_coinbase() {
                    continue;
                }
                stats.non_coinbase_input_count += 1;

                match input.spend_type() {
                    Some(spend_type) => *spend_counts.entry(spend_type).or_insert(0) += 1,
                    None => stats.unknown_spend_count += 1,
                }

                if let Some(usage) = SerializedScriptUsage::from_input(index, input) {
                    if usage.ordinal.is_some() {
                        stats.ordinal_inscriptions += 1;
                    }
                    if usage.redeem_multisig.is_some() {
                        stats.multisig_redeem_scripts += 1;
                    }
                    if usage.witness_multisig.is_some() {
                        stats.multisig_witness_scripts += 1;
                    }
                }
            }

            for output in tx.outputs() {
                stats.output_count += 1;
                stats.total_out += output.value();
                *output_counts.entry(output.output_type()).or_insert(0) += 1;
            }
        }

        stats.spend_types = SpendType::ALL
            .iter()
            .filter_map(|t| {
                let count = spend_counts.get(t).copied().unwrap_or(0);
                (count > 0).then(|| TypeCount {
                    label: t.as_str(),
                    count,
                    percent: percent(count, stats.non_coinbase_input_count),
                })
            })
            .collect();

        stats.output_types = OutputType::ALL
            .iter()
            .filter_map(|t| {
                let count = output_counts.get(t).copied().unwrap_or(0);
                (count > 0).then(|| TypeCount {
                    label: t.as_str(),
                    count,
                    percent: percent(count, stats.output_count),
                })
            })
            .collect();

        stats
    }
}

/// Serialized scripts revealed by one input
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SerializedScriptUsage {
    pub input_index: usize,
    /// (m, n) of a multisig redeem script
    pub redeem_multisig: Option<(u8, u8)>,
    /// (m, n) of a multisig witness script
    pub witness_multisig: Option<(u8, u8)>,
    pub ordinal: Option<Inscription>,
}

impl SerializedScriptUsage {
    /// `None` when the input reveals nothing of interest
    pub fn from_input(input_index: usize, input: &Input) -> Option<Self> {
        let c = input.classification();
        let usage = SerializedScriptUsage {
            input_index,
            redeem_multisig: c.redeem_script().and_then(|s| s.multisig_counts()),
            witness_multisig: c.witness_script().and_then(|s| s.multisig_counts()),
            ordinal: c.tap_script().and_then(|(s, _)| s.ordinal_inscription()),
        };

        if usage.redeem_multisig.is_none() && usage.witness_multisig.is_none() && usage.ordinal.is_none() {
            None
        } else {
            Some(usage)
        }
    }

    pub fn for_tx(tx: &Tx) -> Vec<Self> {
        tx.inputs()
            .iter()
            .enumerate()
            .filter_map(|(i, input)| SerializedScriptUsage::from_input(i, input))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::OutPoint;
    use crate::output::Output;
    use crate::script::Script;
    use crate::segwit::Segwit;

    fn output(hex_str: &str, value: u64) -> Output {
        Output::new(value, Script::from_hex(hex_str).unwrap(), None)
    }

    fn p2pkh_hex() -> String {
        format!("76a914{}88ac", "00".repeat(20))
    }

    #[test]
    fn test_counts_and_order() {
        let coinbase = Input::coinbase(Script::new(&[0x01, 0x00]), Segwit::nil(), 0);
        let cb_tx = Tx::new(
            "01".repeat(32),
            1,
            0,
            false,
            vec![coinbase],
            vec![output(&p2pkh_hex(), 50), output("6a", 0)],
            None,
        );

        let spend = |prev: &str| {
            Input::spending(
                OutPoint { txid: "02".repeat(32), index: 0 },
                Script::new(&[]),
                Segwit::nil(),
                0,
            )
            .with_previous_output(output(prev, 10))
        };
        let tx = Tx::new(
            "03".repeat(32),
            2,
            0,
            true,
            vec![spend(&p2pkh_hex()), spend(&p2pkh_hex()), spend("51")],
            vec![output(&p2pkh_hex(), 25)],
            None,
        );

        let stats = BlockStats::from_txs(&[cb_tx, tx]);
        assert_eq!(stats.tx_count, 2);
        assert_eq!(stats.bip141_tx_count, 1);
        assert_eq!(stats.input_count, 4);
        assert_eq!(stats.non_coinbase_input_count, 3);
        assert_eq!(stats.output_count, 3);
        assert_eq!(stats.total_out, 75);

        let labels: Vec<&str> = stats.spend_types.iter().map(|t| t.label).collect();
        assert_eq!(labels, vec!["P2PKH", "Non-Standard"]);
        assert_eq!(stats.spend_types[0].count, 2);
        assert!((stats.spend_types[0].percent - 66.666).abs() < 0.01);

        let labels: Vec<&str> = stats.output_types.iter().map(|t| t.label).collect();
        assert_eq!(labels, vec!["P2PKH", "OP_RETURN"]);
    }

    #[test]
    fn test_empty_block() {
        let stats = BlockStats::from_txs(&[]);
        assert_eq!(stats.input_count, 0);
        assert!(stats.spend_types.is_empty());
    }

    #[test]
    fn test_multisig_witness_usage() {
        let key = {
            let mut k = vec![0x02];
            k.extend_from_slice(&[0x09; 32]);
            k
        };
        let mut witness_script = vec![0x51, 0x21];
        witness_script.extend(&key);
        witness_script.extend([0x51, 0xae]);

        let input = Input::spending(
            OutPoint { txid: "04".repeat(32), index: 1 },
            Script::new(&[]),
            Segwit::new(vec![vec![], vec![0x01; 71], witness_script]),
            0,
        )
        .with_previous_output(output(&format!("0020{}", "00".repeat(32)), 1));

        let usage = SerializedScriptUsage::from_input(0, &input).unwrap();
        assert_eq!(usage.witness_multisig, Some((1, 1)));
        assert_eq!(usage.redeem_multisig, None);
    }
}
