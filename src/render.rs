/// JSON views of classified values
///
/// Every script and witness field is shown as hex, text and display type.
/// A script that failed to parse gets a trailing "parse error" field.

use serde::Serialize;

use crate::block::Block;
use crate::input::{Input, OutPoint};
use crate::output::Output;
use crate::script::{Inscription, Script};
use crate::segwit::Segwit;
use crate::stats::{BlockStats, SerializedScriptUsage};
use crate::tx::{BlockLink, Tx};
use crate::value_reader::format_btc;

pub const PARSE_ERROR_TYPE: &str = "parse error";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldView {
    pub hex: String,
    pub text: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScriptView {
    pub hex: String,
    pub parse_error: bool,
    pub fields: Vec<FieldView>,
}

pub fn script_view(script: &Script, schnorr: bool) -> ScriptView {
    let mut fields: Vec<FieldView> = script
        .fields()
        .iter()
        .map(|f| FieldView {
            hex: f.as_hex(),
            text: f.as_text(),
            kind: f.display_type(schnorr),
        })
        .collect();

    if script.has_parse_error() {
        fields.push(FieldView {
            hex: String::new(),
            text: String::new(),
            kind: PARSE_ERROR_TYPE.to_string(),
        });
    }

    ScriptView {
        hex: script.as_hex(),
        parse_error: script.has_parse_error(),
        fields,
    }
}

/// `None` for transactions without the segwit marker
pub fn segwit_view(segwit: &Segwit, schnorr: bool) -> Option<Vec<FieldView>> {
    if segwit.is_nil() {
        return None;
    }
    Some(
        segwit
            .fields()
            .iter()
            .map(|f| FieldView {
                hex: f.as_hex(),
                text: f.as_text(),
                kind: f.display_type(schnorr),
            })
            .collect(),
    )
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputView {
    pub value: u64,
    pub value_btc: String,
    pub output_type: &'static str,
    pub address: Option<String>,
    pub script: ScriptView,
}

impl From<&Output> for OutputView {
    fn from(output: &Output) -> Self {
        OutputView {
            value: output.value(),
            value_btc: format_btc(output.value()),
            output_type: output.output_type().as_str(),
            address: output.address().map(str::to_string),
            script: script_view(output.script(), false),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TapScriptView {
    /// Position of the tapscript in the witness stack
    pub witness_index: usize,
    pub script: ScriptView,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InputView {
    pub coinbase: bool,
    pub outpoint: Option<OutPoint>,
    pub sequence: u32,
    /// None when nothing could be inferred without the previous output
    pub spend_type: Option<&'static str>,
    pub provisional: bool,
    pub script: ScriptView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redeem_script: Option<ScriptView>,
    pub segwit: Option<Vec<FieldView>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub witness_script: Option<ScriptView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tap_script: Option<TapScriptView>,
    pub previous_output: Option<OutputView>,
}

impl From<&Input> for InputView {
    fn from(input: &Input) -> Self {
        let c = input.classification();
        let schnorr = c.spend_type().map(|t| t.uses_schnorr()).unwrap_or(false);

        InputView {
            coinbase: input.is_coinbase(),
            outpoint: input.outpoint().cloned(),
            sequence: input.sequence(),
            spend_type: c.spend_type().map(|t| t.as_str()),
            provisional: c.is_provisional(),
            script: script_view(c.script(), false),
            redeem_script: c.redeem_script().map(|s| script_view(s, false)),
            segwit: segwit_view(c.segwit(), schnorr),
            witness_script: c.witness_script().map(|s| script_view(s, false)),
            tap_script: c.tap_script().map(|(s, witness_index)| TapScriptView {
                witness_index,
                script: script_view(s, true),
            }),
            previous_output: input.previous_output().map(OutputView::from),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TxView {
    pub txid: String,
    pub version: u32,
    pub lock_time: u32,
    pub bip141: bool,
    pub coinbase: bool,
    pub block: Option<BlockLink>,
    pub total_in: Option<u64>,
    pub total_out: u64,
    pub fee: Option<u64>,
    pub inputs: Vec<InputView>,
    pub outputs: Vec<OutputView>,
    pub serialized_scripts: Vec<SerializedScriptUsage>,
}

impl From<&Tx> for TxView {
    fn from(tx: &Tx) -> Self {
        TxView {
            txid: tx.id().to_string(),
            version: tx.version(),
            lock_time: tx.lock_time(),
            bip141: tx.supports_bip141(),
            coinbase: tx.is_coinbase(),
            block: tx.block().cloned(),
            total_in: tx.total_in(),
            total_out: tx.total_out(),
            fee: tx.fee(),
            inputs: tx.inputs().iter().map(InputView::from).collect(),
            outputs: tx.outputs().iter().map(OutputView::from).collect(),
            serialized_scripts: SerializedScriptUsage::for_tx(tx),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockStatsView<'a> {
    pub block: &'a Block,
    pub stats: &'a BlockStats,
}

/// Offline report for a bare script, read as an output script
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScriptReport {
    pub output_type: &'static str,
    pub address: Option<String>,
    pub script: ScriptView,
    /// Final push parsed as a redeem script, when it parses
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serialized_script: Option<ScriptView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub multisig: Option<(u8, u8)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inscription: Option<Inscription>,
}

impl From<&Script> for ScriptReport {
    fn from(script: &Script) -> Self {
        let output = Output::new(0, script.clone(), None);
        ScriptReport {
            output_type: output.output_type().as_str(),
            address: output.address().map(str::to_string),
            script: script_view(output.script(), false),
            serialized_script: script.serialized_script().map(|s| script_view(&s, false)),
            multisig: script.multisig_counts(),
            inscription: script.ordinal_inscription(),
        }
    }
}

/// Offline report for a witness stack
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WitnessReport {
    pub fields: Vec<FieldView>,
    pub p2wpkh: bool,
    pub taproot_key_path: bool,
    pub annex: bool,
    pub control_block_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tap_script: Option<TapScriptView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub witness_script: Option<ScriptView>,
}

impl From<&Segwit> for WitnessReport {
    fn from(segwit: &Segwit) -> Self {
        let key_path = segwit.is_valid_taproot_key_path();
        WitnessReport {
            fields: segwit_view(segwit, key_path || segwit.tap_script().is_some()).unwrap_or_default(),
            p2wpkh: segwit.is_valid_p2wpkh(),
            taproot_key_path: key_path,
            annex: segwit.has_annex(),
            control_block_index: segwit.control_block_index(),
            tap_script: segwit.tap_script().map(|(s, witness_index)| TapScriptView {
                witness_index,
                script: script_view(s, true),
            }),
            witness_script: segwit.witness_script().map(|s| script_view(s, false)),
        }
    }
}

/// Render any view as JSON text
pub fn to_json<T: Serialize>(value: &T, pretty: bool) -> Result<String, serde_json::Error> {
    if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segwit::Segwit;

    #[test]
    fn test_parse_error_field_appended() {
        let script = Script::new(&[0x51, 0x05, 0xaa]);
        let view = script_view(&script, false);
        assert!(view.parse_error);
        assert_eq!(view.fields.len(), 3);
        assert_eq!(view.fields[0].kind, "OP_1");
        assert_eq!(view.fields[2].kind, PARSE_ERROR_TYPE);
        assert_eq!(view.fields[2].hex, "");
    }

    #[test]
    fn test_clean_script_has_no_parse_error_field() {
        let view = script_view(&Script::from_hex("6a0568656c6c6f").unwrap(), false);
        assert!(!view.parse_error);
        assert_eq!(view.fields.len(), 2);
        assert_eq!(view.fields[1].text, "hello");
    }

    #[test]
    fn test_segwit_view_distinguishes_nil_and_empty() {
        assert!(segwit_view(&Segwit::nil(), false).is_none());
        assert_eq!(segwit_view(&Segwit::new(Vec::new()), false), Some(Vec::new()));

        let fields = segwit_view(&Segwit::new(vec![vec![0x01; 64]]), true).unwrap();
        assert_eq!(fields[0].kind, "Signature (Schnorr)");
    }

    #[test]
    fn test_script_report_reads_redeem_script() {
        let multisig = format!("5121{}51ae", format!("02{}", "07".repeat(32)));
        let script = Script::from_hex(&format!("0047{}{:02x}{}", "30".repeat(71), multisig.len() / 2, multisig)).unwrap();
        let report = ScriptReport::from(&script);
        assert_eq!(report.output_type, "Non-Standard");
        assert!(report.serialized_script.is_some());

        let report = ScriptReport::from(&Script::from_hex(&multisig).unwrap());
        assert_eq!(report.output_type, "MultiSig");
        assert_eq!(report.multisig, Some((1, 1)));
    }

    #[test]
    fn test_witness_report() {
        let report = WitnessReport::from(&Segwit::new(vec![vec![0x01; 64], vec![0x50, 0x00]]));
        assert!(report.taproot_key_path);
        assert!(report.annex);
        assert_eq!(report.fields.len(), 2);
    }

    #[test]
    fn test_output_view_json() {
        let script = Script::from_hex("76a914000102030405060708090a0b0c0d0e0f1011121388ac").unwrap();
        let output = Output::new(12_345, script, None);
        let json = to_json(&OutputView::from(&output), false).unwrap();
        assert!(json.contains(r#""output_type":"P2PKH""#));
        assert!(json.contains(r#""value_btc":"0.00012345""#));
        assert!(json.contains(r#""type":"OP_DUP""#));
    }
}
