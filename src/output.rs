/// Output Classifier
///
/// `classify_output` tests the standard templates in a fixed priority order;
/// the first match wins. `Output::new` classifies, labels the script fields for
/// display and fills in a legacy address when the node did not supply one.

use std::fmt;

use serde::{Serialize, Serializer};

use crate::address::legacy_address;
use crate::script::Script;
use crate::value_reader::stack_item_type;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputType {
    P2pk,
    MultiSig,
    P2pkh,
    P2sh,
    P2wpkh,
    P2wsh,
    Taproot,
    OpReturn,
    WitnessUnknown,
    NonStandard,
}

impl OutputType {
    /// Display order used by block statistics
    pub const ALL: [OutputType; 10] = [
        OutputType::P2pk,
        OutputType::MultiSig,
        OutputType::P2pkh,
        OutputType::P2sh,
        OutputType::P2wpkh,
        OutputType::P2wsh,
        OutputType::Taproot,
        OutputType::OpReturn,
        OutputType::WitnessUnknown,
        OutputType::NonStandard,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputType::P2pk => "P2PK",
            OutputType::MultiSig => "MultiSig",
            OutputType::P2pkh => "P2PKH",
            OutputType::P2sh => "P2SH",
            OutputType::P2wpkh => "P2WPKH",
            OutputType::P2wsh => "P2WSH",
            OutputType::Taproot => "Taproot",
            OutputType::OpReturn => "OP_RETURN",
            OutputType::WitnessUnknown => "Witness Unknown",
            OutputType::NonStandard => "Non-Standard",
        }
    }
}

impl fmt::Display for OutputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for OutputType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Classify an output script. A nil script is Non-Standard.
pub fn classify_output(script: &Script) -> OutputType {
    if script.is_nil() {
        return OutputType::NonStandard;
    }

    if script.is_p2pk_output() {
        OutputType::P2pk
    } else if script.is_multisig_output() {
        OutputType::MultiSig
    } else if script.is_p2pkh_output() {
        OutputType::P2pkh
    } else if script.is_p2sh_output() {
        OutputType::P2sh
    } else if script.is_p2wpkh_output() {
        OutputType::P2wpkh
    } else if script.is_p2wsh_output() {
        OutputType::P2wsh
    } else if script.is_taproot_output() {
        OutputType::Taproot
    } else if script.is_null_data_output() {
        OutputType::OpReturn
    } else if script.is_witness_unknown_output() {
        OutputType::WitnessUnknown
    } else {
        OutputType::NonStandard
    }
}

/// Field labels for an output script of a known type
pub fn label_output_script(script: &Script, output_type: OutputType) -> Script {
    match output_type {
        OutputType::Taproot => script.with_labels(&["OP_1", "32-Byte Witness Program"]),
        OutputType::P2wsh => script.with_labels(&["OP_0", "32-Byte Witness Program"]),
        OutputType::P2wpkh => script.with_labels(&["OP_0", "20-Byte Witness Program"]),
        OutputType::P2sh => script.with_labels(&["OP_HASH160", "20-Byte Script Hash", "OP_EQUAL"]),
        OutputType::P2pkh => script.with_labels(&[
            "OP_DUP",
            "OP_HASH160",
            "20-Byte Key Hash",
            "OP_EQUALVERIFY",
            "OP_CHECKSIG",
        ]),
        OutputType::P2pk => {
            let key_type = script
                .fields()
                .first()
                .map(|f| stack_item_type(f.bytes(), false))
                .unwrap_or_default();
            script.with_labels(&[key_type.as_str(), "OP_CHECKSIG"])
        }
        OutputType::MultiSig
        | OutputType::OpReturn
        | OutputType::WitnessUnknown
        | OutputType::NonStandard => script.with_generic_labels(false),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Output {
    value: u64,
    script: Script,
    output_type: OutputType,
    address: Option<String>,
}

impl Output {
    pub fn new(value: u64, script: Script, address: Option<String>) -> Self {
        let output_type = classify_output(&script);
        let address = address
            .filter(|a| !a.is_empty())
            .or_else(|| legacy_address(&script, output_type));
        let script = label_output_script(&script, output_type);

        Output {
            value,
            script,
            output_type,
            address,
        }
    }

    /// Value in satoshis
    pub fn value(&self) -> u64 {
        self.value
    }

    pub fn script(&self) -> &Script {
        &self.script
    }

    pub fn output_type(&self) -> OutputType {
        self.output_type
    }

    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify_hex(hex_str: &str) -> OutputType {
        classify_output(&Script::from_hex(hex_str).unwrap())
    }

    #[test]
    fn test_standard_templates() {
        let hash20 = "000102030405060708090a0b0c0d0e0f10111213";
        let hash32 = "ab".repeat(32);
        assert_eq!(classify_hex(&format!("76a914{}88ac", hash20)), OutputType::P2pkh);
        assert_eq!(classify_hex(&format!("a914{}87", hash20)), OutputType::P2sh);
        assert_eq!(classify_hex(&format!("0014{}", hash20)), OutputType::P2wpkh);
        assert_eq!(classify_hex(&format!("0020{}", hash32)), OutputType::P2wsh);
        assert_eq!(classify_hex(&format!("5120{}", hash32)), OutputType::Taproot);
        assert_eq!(classify_hex("6a04deadbeef"), OutputType::OpReturn);
        assert_eq!(classify_hex(&format!("5228{}", "cd".repeat(40))), OutputType::WitnessUnknown);
        assert_eq!(classify_hex("51"), OutputType::NonStandard);
        assert_eq!(classify_hex(""), OutputType::NonStandard);
        assert_eq!(classify_output(&Script::nil()), OutputType::NonStandard);
    }

    #[test]
    fn test_p2pk_before_others() {
        let compressed = format!("21{}ac", "03".repeat(33));
        assert_eq!(classify_hex(&compressed), OutputType::P2pk);
        let uncompressed = format!("41{}ac", "04".repeat(65));
        assert_eq!(classify_hex(&uncompressed), OutputType::P2pk);
    }

    #[test]
    fn test_multisig_output() {
        let key = format!("21{}", "02".repeat(33));
        assert_eq!(classify_hex(&format!("52{}{}{}53ae", key, key, key)), OutputType::MultiSig);
    }

    #[test]
    fn test_taproot_wins_over_witness_unknown() {
        let script = format!("5120{}", "00".repeat(32));
        assert_eq!(classify_hex(&script), OutputType::Taproot);
    }

    #[test]
    fn test_output_labels() {
        let hash20 = "000102030405060708090a0b0c0d0e0f10111213";
        let script = Script::from_hex(&format!("0014{}", hash20)).unwrap();
        let output = Output::new(1, script, Some("bc1qexample".to_string()));
        assert_eq!(output.output_type(), OutputType::P2wpkh);
        assert_eq!(output.address(), Some("bc1qexample"));
        assert_eq!(output.script().fields()[1].display_type(false), "20-Byte Witness Program");
    }

    #[test]
    fn test_missing_address_is_derived() {
        let script = Script::from_hex("76a914000000000000000000000000000000000000000088ac").unwrap();
        let output = Output::new(0, script, None);
        assert_eq!(output.address(), Some("1111111111111111111114oLvT2"));
        assert_eq!(output.script().fields()[2].label(), Some("20-Byte Key Hash"));
    }

    #[test]
    fn test_type_strings() {
        assert_eq!(OutputType::WitnessUnknown.to_string(), "Witness Unknown");
        assert_eq!(OutputType::NonStandard.as_str(), "Non-Standard");
        assert_eq!(serde_json::to_string(&OutputType::OpReturn).unwrap(), "\"OP_RETURN\"");
    }
}
