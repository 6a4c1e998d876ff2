/// Input Spend-Type Classifier
///
/// Combines an input's scriptSig, its witness stack and the type of the output
/// it spends into one spend type, unwrapping P2SH redeem scripts and pulling
/// witness scripts and tapscripts out of the witness stack along the way.
///
/// Classification is a pure function of the parsed input plus the previous
/// output type. `Input` keeps the parsed scriptSig and witness untouched and
/// stores the labeled copies in a `Classification` value that is rebuilt from
/// scratch whenever the previous output changes, so no label from an earlier
/// pass can survive.
///
/// Until the previous output is known, the type of the spent output is guessed
/// from the shape of the scriptSig and witness and the result is marked
/// provisional.

use std::fmt;

use serde::{Serialize, Serializer};
use tracing::{debug, trace};

use crate::opcodes::OP_0;
use crate::output::{Output, OutputType};
use crate::script::Script;
use crate::segwit::{annex_label, control_block_label, Segwit};

pub const REDEEM_SCRIPT_LABEL: &str = "<<< SERIALIZED REDEEM SCRIPT >>>";
pub const WITNESS_SCRIPT_LABEL: &str = "<<< SERIALIZED WITNESS SCRIPT >>>";
pub const TAP_SCRIPT_LABEL: &str = "<<< SERIALIZED TAP SCRIPT >>>";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpendType {
    Coinbase,
    P2pk,
    MultiSig,
    P2pkh,
    P2sh,
    P2shP2wpkh,
    P2shP2wsh,
    P2wpkh,
    P2wsh,
    TaprootKeyPath,
    TaprootScriptPath,
    NonStandard,
}

impl SpendType {
    /// Display order used by block statistics (coinbase excluded)
    pub const ALL: [SpendType; 11] = [
        SpendType::P2pk,
        SpendType::MultiSig,
        SpendType::P2pkh,
        SpendType::P2sh,
        SpendType::P2shP2wpkh,
        SpendType::P2shP2wsh,
        SpendType::P2wpkh,
        SpendType::P2wsh,
        SpendType::TaprootKeyPath,
        SpendType::TaprootScriptPath,
        SpendType::NonStandard,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SpendType::Coinbase => "COINBASE",
            SpendType::P2pk => "P2PK",
            SpendType::MultiSig => "MultiSig",
            SpendType::P2pkh => "P2PKH",
            SpendType::P2sh => "P2SH",
            SpendType::P2shP2wpkh => "P2SH-P2WPKH",
            SpendType::P2shP2wsh => "P2SH-P2WSH",
            SpendType::P2wpkh => "P2WPKH",
            SpendType::P2wsh => "P2WSH",
            SpendType::TaprootKeyPath => "Taproot Key Path",
            SpendType::TaprootScriptPath => "Taproot Script Path",
            SpendType::NonStandard => "Non-Standard",
        }
    }

    /// Taproot spends use Schnorr signatures and x-only keys
    pub fn uses_schnorr(&self) -> bool {
        matches!(self, SpendType::TaprootKeyPath | SpendType::TaprootScriptPath)
    }
}

impl fmt::Display for SpendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for SpendType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Reference to the output an input spends
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct OutPoint {
    pub txid: String,
    pub index: u32,
}

/// Derived view of one input: spend type plus labeled copies of its scripts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    spend_type: Option<SpendType>,
    provisional: bool,
    script: Script,
    redeem_script: Option<Script>,
    segwit: Segwit,
    witness_script: Option<Script>,
    tap_script: Option<(Script, usize)>,
}

impl Classification {
    fn unlabeled(script: &Script, segwit: &Segwit, provisional: bool) -> Self {
        Classification {
            spend_type: None,
            provisional,
            script: script.clone(),
            redeem_script: None,
            segwit: segwit.clone(),
            witness_script: None,
            tap_script: None,
        }
    }

    /// `None` only while provisional and nothing could be inferred
    pub fn spend_type(&self) -> Option<SpendType> {
        self.spend_type
    }

    /// True until the previous output type has been supplied
    pub fn is_provisional(&self) -> bool {
        self.provisional
    }

    /// scriptSig with labels
    pub fn script(&self) -> &Script {
        &self.script
    }

    pub fn redeem_script(&self) -> Option<&Script> {
        self.redeem_script.as_ref()
    }

    /// Witness stack with labels
    pub fn segwit(&self) -> &Segwit {
        &self.segwit
    }

    pub fn witness_script(&self) -> Option<&Script> {
        self.witness_script.as_ref()
    }

    pub fn tap_script(&self) -> Option<(&Script, usize)> {
        self.tap_script.as_ref().map(|(s, i)| (s, *i))
    }

    fn finish(mut self, spend_type: SpendType) -> Self {
        let schnorr = spend_type.uses_schnorr();
        self.spend_type = Some(spend_type);
        if spend_type != SpendType::Coinbase {
            self.script = self.script.with_generic_labels(false);
        }
        self.segwit = self.segwit.with_generic_labels(schnorr);
        self
    }
}

/// Classify an input.
///
/// `previous` is the type of the spent output when known. Without it the type
/// is inferred from the input's own shape and the result is provisional.
pub fn classify_input(
    coinbase: bool,
    script: &Script,
    segwit: &Segwit,
    previous: Option<OutputType>,
) -> Classification {
    let provisional = previous.is_none();
    let base = Classification::unlabeled(script, segwit, provisional);

    if coinbase {
        return base.finish(SpendType::Coinbase);
    }

    let previous = match previous.or_else(|| infer_previous_output_type(script, segwit)) {
        Some(output_type) => output_type,
        None => {
            trace!("no spend type could be inferred from input shape");
            let mut unknown = base.finish(SpendType::NonStandard);
            unknown.spend_type = None;
            return unknown;
        }
    };

    match previous {
        OutputType::P2pk => classify_p2pk(base),
        OutputType::MultiSig => classify_multisig(base),
        OutputType::P2pkh => classify_p2pkh(base),
        OutputType::P2wpkh => classify_p2wpkh(base, SpendType::P2wpkh),
        OutputType::P2sh => classify_p2sh(base),
        OutputType::P2wsh => classify_p2wsh(base),
        OutputType::Taproot => classify_taproot(base),
        OutputType::OpReturn | OutputType::WitnessUnknown | OutputType::NonStandard => {
            base.finish(SpendType::NonStandard)
        }
    }
}

fn classify_p2pk(mut c: Classification) -> Classification {
    if c.script.is_valid_p2pk_input() {
        c.script = c.script.with_field_label(0, "Signature");
    }
    c.finish(SpendType::P2pk)
}

fn classify_p2pkh(mut c: Classification) -> Classification {
    if c.script.is_valid_p2pkh_input() {
        c.script = c.script.with_labels(&["Signature", "Public Key"]);
    }
    c.finish(SpendType::P2pkh)
}

fn classify_multisig(mut c: Classification) -> Classification {
    if c.script.is_valid_multisig_input() {
        let mut script = c.script.with_field_label(0, "Dummy");
        for index in 1..script.field_count() {
            if !script.fields()[index].is_opcode() {
                script = script.with_field_label(index, "Signature");
            }
        }
        c.script = script;
    }
    c.finish(SpendType::MultiSig)
}

/// Native P2WPKH, or the witness half of P2SH-P2WPKH
fn classify_p2wpkh(mut c: Classification, spend_type: SpendType) -> Classification {
    if c.segwit.is_valid_p2wpkh() {
        if let (Some(sig), Some(key)) = (c.segwit.non_empty_index(0), c.segwit.non_empty_index(1)) {
            c.segwit = c
                .segwit
                .with_field_label(sig, "Signature")
                .with_field_label(key, "Public Key");
        }
    }
    c.finish(spend_type)
}

fn classify_p2sh(mut c: Classification) -> Classification {
    let last = match c.script.field_count() {
        0 => None,
        n => Some(n - 1),
    };

    // P2SH-wrapped segwit
    if !c.script.is_empty() && c.segwit.has_items() {
        let redeem = match c.script.serialized_script() {
            Some(redeem) => redeem,
            None => {
                debug!("witness present but scriptSig holds no redeem script");
                return c.finish(SpendType::NonStandard);
            }
        };

        if let Some(index) = last {
            c.script = c.script.with_field_label(index, REDEEM_SCRIPT_LABEL);
        }

        if redeem.is_p2wpkh_output() {
            c.redeem_script = Some(redeem.with_labels(&["OP_0", "20-Byte Witness Program"]));
            return classify_p2wpkh(c, SpendType::P2shP2wpkh);
        }
        if redeem.is_p2wsh_output() {
            c.redeem_script = Some(redeem.with_labels(&["OP_0", "32-Byte Witness Program"]));
            attach_witness_script(&mut c);
            return c.finish(SpendType::P2shP2wsh);
        }

        debug!(redeem = %redeem.as_hex(), "redeem script is not a segwit program");
        c.redeem_script = Some(redeem.with_generic_labels(false));
        return c.finish(SpendType::NonStandard);
    }

    // plain P2SH
    if let Some(index) = last {
        let ends_with_op_0 = c.script.fields()[index].is_opcode()
            && c.script.fields()[index].bytes() == [OP_0];

        let serialized = if ends_with_op_0 { None } else { c.script.serialized_script() };
        let pushes_op_0 = serialized.as_ref().map_or(false, |r| r.raw_bytes() == [OP_0]);

        let redeem = if ends_with_op_0 || pushes_op_0 {
            // a zero-length redeem script, either as OP_0 or as a pushed 0x00
            c.script = c.script.with_empty_final_push();
            Some(Script::new(&[]))
        } else {
            serialized
        };

        if let Some(redeem) = redeem {
            c.script = c.script.with_field_label(index, REDEEM_SCRIPT_LABEL);
            c.redeem_script = Some(redeem.with_generic_labels(false));
        }
    }

    c.finish(SpendType::P2sh)
}

fn attach_witness_script(c: &mut Classification) {
    let script = match c.segwit.witness_script() {
        Some(script) => script.with_generic_labels(false),
        None => return,
    };
    let last = c.segwit.field_count() - 1;
    c.segwit = c.segwit.with_field_label(last, WITNESS_SCRIPT_LABEL);
    c.witness_script = Some(script);
}

fn classify_p2wsh(mut c: Classification) -> Classification {
    if !c.segwit.is_valid_p2wsh() {
        return c.finish(SpendType::NonStandard);
    }
    attach_witness_script(&mut c);
    c.finish(SpendType::P2wsh)
}

fn classify_taproot(mut c: Classification) -> Classification {
    if c.segwit.has_annex() {
        let index = c.segwit.field_count() - 1;
        let len = c.segwit.fields()[index].bytes().len();
        c.segwit = c.segwit.with_field_label(index, annex_label(len));
    }

    // key path takes priority over script path
    if c.segwit.is_valid_taproot_key_path() {
        if let Some(index) = c.segwit.non_empty_index(0) {
            c.segwit = c.segwit.with_field_label(index, "Schnorr Signature");
        }
        return c.finish(SpendType::TaprootKeyPath);
    }

    let tap = c
        .segwit
        .tap_script()
        .map(|(script, index)| (script.with_generic_labels(true), index));
    let (tap_script, tap_index) = match tap {
        Some(tap) => tap,
        None => return c.finish(SpendType::NonStandard),
    };

    if let Some(path_len) = c.segwit.control_block_path_len() {
        c.segwit = c
            .segwit
            .with_field_label(tap_index + 1, control_block_label(path_len));
    }
    c.segwit = c.segwit.with_field_label(tap_index, TAP_SCRIPT_LABEL);
    c.tap_script = Some((tap_script, tap_index));
    c.finish(SpendType::TaprootScriptPath)
}

/// Guess the spent output type from the input alone.
///
/// Segwit shapes are tested from the most to the least specific. A lone
/// Schnorr signature also parses as a script, and a compressed key has the
/// length of a control block, so both are checked before tapscript.
pub fn infer_previous_output_type(script: &Script, segwit: &Segwit) -> Option<OutputType> {
    if segwit.has_items() {
        if !script.is_empty() {
            let redeem = script.serialized_script()?;
            if redeem.is_p2wpkh_output() || redeem.is_p2wsh_output() {
                return Some(OutputType::P2sh);
            }
            debug!("scriptSig and witness present but no wrapped segwit program");
            return None;
        }

        if segwit.is_valid_taproot_key_path() {
            return Some(OutputType::Taproot);
        }
        if segwit.is_valid_p2wpkh() {
            return Some(OutputType::P2wpkh);
        }
        if segwit.tap_script().is_some() {
            return Some(OutputType::Taproot);
        }
        if segwit.witness_script().is_some() {
            return Some(OutputType::P2wsh);
        }
        return None;
    }

    if script.is_valid_p2pkh_input() {
        Some(OutputType::P2pkh)
    } else if script.is_valid_p2pk_input() {
        Some(OutputType::P2pk)
    } else if script.serialized_script().is_some() {
        Some(OutputType::P2sh)
    } else {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Input {
    coinbase: bool,
    outpoint: Option<OutPoint>,
    script: Script,
    segwit: Segwit,
    sequence: u32,
    previous_output: Option<Output>,
    classification: Classification,
}

impl Input {
    pub fn coinbase(script: Script, segwit: Segwit, sequence: u32) -> Self {
        let classification = classify_input(true, &script, &segwit, None);
        Input {
            coinbase: true,
            outpoint: None,
            script,
            segwit,
            sequence,
            previous_output: None,
            classification,
        }
    }

    pub fn spending(outpoint: OutPoint, script: Script, segwit: Segwit, sequence: u32) -> Self {
        let classification = classify_input(false, &script, &segwit, None);
        Input {
            coinbase: false,
            outpoint: Some(outpoint),
            script,
            segwit,
            sequence,
            previous_output: None,
            classification,
        }
    }

    /// Attach the spent output and classify again from the parsed input
    pub fn set_previous_output(&mut self, output: Output) {
        self.classification = classify_input(
            self.coinbase,
            &self.script,
            &self.segwit,
            Some(output.output_type()),
        );
        self.previous_output = Some(output);
    }

    pub fn with_previous_output(mut self, output: Output) -> Self {
        self.set_previous_output(output);
        self
    }

    pub fn is_coinbase(&self) -> bool {
        self.coinbase
    }

    pub fn outpoint(&self) -> Option<&OutPoint> {
        self.outpoint.as_ref()
    }

    /// scriptSig as parsed, without labels
    pub fn parsed_script(&self) -> &Script {
        &self.script
    }

    /// Witness as parsed, without labels
    pub fn parsed_segwit(&self) -> &Segwit {
        &self.segwit
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    pub fn previous_output(&self) -> Option<&Output> {
        self.previous_output.as_ref()
    }

    pub fn classification(&self) -> &Classification {
        &self.classification
    }

    pub fn spend_type(&self) -> Option<SpendType> {
        self.classification.spend_type()
    }

    pub fn has_segwit(&self) -> bool {
        self.segwit.has_items()
    }
}
