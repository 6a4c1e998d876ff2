/// Segwit Field Interpreter
///
/// Wraps one input's witness stack. Besides the raw items it answers the
/// structural questions the spend-type classifier asks:
/// - is this a P2WPKH signature/key pair
/// - is there an annex, where is the control block
/// - is this a Taproot key path spend
/// - does the last item (witness script) or the item before the control
///   block (tapscript) parse cleanly as a script
///
/// Witness script and tapscript extraction are computed on first use and cached.

use once_cell::sync::OnceCell;

use crate::script::Script;
use crate::value_reader::{
    data_label, is_valid_ec_signature, is_valid_public_key, is_valid_schnorr_signature,
    stack_item_type,
};

/// First byte of a Taproot annex
pub const ANNEX_TAG: u8 = 0x50;

/// Smallest control block: leaf version byte plus internal key
pub const CONTROL_BLOCK_BASE_LEN: usize = 33;
/// Each merkle path step adds one 32-byte node
pub const CONTROL_BLOCK_NODE_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegwitField {
    bytes: Vec<u8>,
    label: Option<String>,
}

impl SegwitField {
    pub fn new(bytes: Vec<u8>) -> Self {
        SegwitField { bytes, label: None }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn as_hex(&self) -> String {
        hex::encode(&self.bytes)
    }

    pub fn as_text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }

    /// Attached label, or a byte-shape guess
    pub fn display_type(&self, schnorr: bool) -> String {
        match &self.label {
            Some(label) => label.clone(),
            None => stack_item_type(&self.bytes, schnorr),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Segwit {
    fields: Option<Vec<SegwitField>>,
    witness_script: OnceCell<Option<Script>>,
    tap_script: OnceCell<Option<(Script, usize)>>,
}

// Cached extractions are derived from the fields
impl PartialEq for Segwit {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

impl Eq for Segwit {}

impl Default for Segwit {
    fn default() -> Self {
        Segwit::nil()
    }
}

impl Segwit {
    /// Sentinel for transactions without the bip141 marker
    pub fn nil() -> Self {
        Segwit {
            fields: None,
            witness_script: OnceCell::new(),
            tap_script: OnceCell::new(),
        }
    }

    pub fn new(items: Vec<Vec<u8>>) -> Self {
        Segwit {
            fields: Some(items.into_iter().map(SegwitField::new).collect()),
            witness_script: OnceCell::new(),
            tap_script: OnceCell::new(),
        }
    }

    pub fn from_hex<S: AsRef<str>>(items: &[S]) -> Result<Self, hex::FromHexError> {
        let decoded = items
            .iter()
            .map(|item| hex::decode(item.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Segwit::new(decoded))
    }

    pub fn is_nil(&self) -> bool {
        self.fields.is_none()
    }

    pub fn is_empty(&self) -> bool {
        self.fields().is_empty()
    }

    /// Present and holding at least one item
    pub fn has_items(&self) -> bool {
        !self.is_nil() && !self.is_empty()
    }

    pub fn fields(&self) -> &[SegwitField] {
        self.fields.as_deref().unwrap_or(&[])
    }

    pub fn field_count(&self) -> usize {
        self.fields().len()
    }

    fn non_empty_fields(&self) -> Vec<&SegwitField> {
        self.fields().iter().filter(|f| !f.is_empty()).collect()
    }

    // ========== Structural predicates ==========

    /// Exactly two non-empty items: a signature, then a public key
    pub fn is_valid_p2wpkh(&self) -> bool {
        match self.non_empty_fields().as_slice() {
            [signature, key] => {
                is_valid_ec_signature(signature.bytes()) && is_valid_public_key(key.bytes())
            }
            _ => false,
        }
    }

    pub fn has_annex(&self) -> bool {
        let fields = self.fields();
        fields.len() >= 2 && fields[fields.len() - 1].bytes.first() == Some(&ANNEX_TAG)
    }

    /// Index of the control block, if the stack has one
    pub fn control_block_index(&self) -> Option<usize> {
        let count = self.field_count();
        let annex = self.has_annex();
        let minimum = if annex { 3 } else { 2 };
        if count < minimum {
            return None;
        }

        let index = if annex { count - 2 } else { count - 1 };
        let len = self.fields()[index].bytes.len();
        if len >= CONTROL_BLOCK_BASE_LEN && (len - 1) % CONTROL_BLOCK_NODE_LEN == 0 {
            Some(index)
        } else {
            None
        }
    }

    /// Number of merkle path nodes committed in the control block
    pub fn control_block_path_len(&self) -> Option<usize> {
        let index = self.control_block_index()?;
        Some((self.fields()[index].bytes.len() - 1) / CONTROL_BLOCK_NODE_LEN)
    }

    /// A lone Schnorr signature, optionally followed by an annex
    pub fn is_valid_taproot_key_path(&self) -> bool {
        let expected = if self.has_annex() { 2 } else { 1 };
        let non_empty = self.non_empty_fields();
        non_empty.len() == expected && is_valid_schnorr_signature(non_empty[0].bytes())
    }

    /// Non-empty stack whose last item parses as a script
    pub fn is_valid_p2wsh(&self) -> bool {
        self.has_items() && self.witness_script().is_some()
    }

    // ========== Serialized scripts ==========

    /// Last item parsed as a script, if it parses cleanly
    pub fn witness_script(&self) -> Option<&Script> {
        self.witness_script
            .get_or_init(|| {
                let last = self.fields().last()?;
                let script = Script::new(last.bytes());
                if script.has_parse_error() {
                    return None;
                }
                Some(script)
            })
            .as_ref()
    }

    /// Item preceding the control block, parsed as a script, with its stack index
    pub fn tap_script(&self) -> Option<(&Script, usize)> {
        self.tap_script
            .get_or_init(|| {
                let control_block = self.control_block_index()?;
                let index = control_block - 1;
                let script = Script::new(self.fields()[index].bytes());
                if script.has_parse_error() {
                    return None;
                }
                Some((script, index))
            })
            .as_ref()
            .map(|(script, index)| (script, *index))
    }

    // ========== Labeling ==========

    /// Copy with one item relabeled. Cached extractions carry over.
    pub fn with_field_label(&self, index: usize, label: impl Into<String>) -> Self {
        let mut labeled = self.clone();
        if let Some(field) = labeled.fields.as_mut().and_then(|f| f.get_mut(index)) {
            field.label = Some(label.into());
        }
        labeled
    }

    /// Copy with every unlabeled item typed by its byte shape
    pub fn with_generic_labels(&self, schnorr: bool) -> Self {
        let mut labeled = self.clone();
        if let Some(fields) = labeled.fields.as_mut() {
            for field in fields.iter_mut().filter(|f| f.label.is_none()) {
                field.label = Some(stack_item_type(&field.bytes, schnorr));
            }
        }
        labeled
    }

    /// Index of the n-th non-empty item
    pub fn non_empty_index(&self, n: usize) -> Option<usize> {
        self.fields()
            .iter()
            .enumerate()
            .filter(|(_, f)| !f.is_empty())
            .nth(n)
            .map(|(i, _)| i)
    }
}

/// "Annex (N Bytes)"
pub fn annex_label(len: usize) -> String {
    data_label(len).replacen("Data", "Annex", 1)
}

/// "Control Block (N TapLeaf/TapLeaves)"
pub fn control_block_label(path_len: usize) -> String {
    let leaves = if path_len == 1 { "TapLeaf" } else { "TapLeaves" };
    format!("Control Block ({} {})", path_len, leaves)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equality_ignores_cached_extractions() {
        let queried = Segwit::new(vec![vec![0x51]]);
        let fresh = queried.clone();
        assert!(queried.witness_script().is_some());
        assert!(queried.tap_script().is_none());
        assert_eq!(queried, fresh);
        assert_ne!(queried, Segwit::new(vec![vec![0x52]]));
        assert_ne!(Segwit::nil(), Segwit::new(Vec::new()));
    }

    fn ec_signature() -> Vec<u8> {
        let mut sig = vec![0x30, 0x44, 0x02, 0x20];
        sig.extend_from_slice(&[0x11; 32]);
        sig.extend_from_slice(&[0x02, 0x20]);
        sig.extend_from_slice(&[0x22; 32]);
        sig.push(0x01);
        sig
    }

    fn compressed_key() -> Vec<u8> {
        let mut key = vec![0x02];
        key.extend_from_slice(&[0x33; 32]);
        key
    }

    fn control_block(path_len: usize) -> Vec<u8> {
        let mut cb = vec![0xc0];
        cb.extend_from_slice(&[0x44; 32]);
        for _ in 0..path_len {
            cb.extend_from_slice(&[0x55; 32]);
        }
        cb
    }

    #[test]
    fn test_nil_and_empty() {
        let nil = Segwit::nil();
        assert!(nil.is_nil());
        assert!(!nil.has_items());
        assert!(nil.witness_script().is_none());

        let empty = Segwit::new(vec![]);
        assert!(!empty.is_nil());
        assert!(empty.is_empty());
        assert!(empty.control_block_index().is_none());
    }

    #[test]
    fn test_p2wpkh() {
        let segwit = Segwit::new(vec![ec_signature(), compressed_key()]);
        assert!(segwit.is_valid_p2wpkh());

        // empty items are ignored
        let padded = Segwit::new(vec![vec![], ec_signature(), compressed_key()]);
        assert!(padded.is_valid_p2wpkh());

        let swapped = Segwit::new(vec![compressed_key(), ec_signature()]);
        assert!(!swapped.is_valid_p2wpkh());
    }

    #[test]
    fn test_annex() {
        let segwit = Segwit::new(vec![vec![0u8; 64], vec![ANNEX_TAG, 0x01]]);
        assert!(segwit.has_annex());
        assert!(segwit.is_valid_taproot_key_path());

        // a single item is never an annex
        assert!(!Segwit::new(vec![vec![ANNEX_TAG]]).has_annex());
    }

    #[test]
    fn test_control_block_index() {
        let segwit = Segwit::new(vec![vec![0x51], control_block(0)]);
        assert_eq!(segwit.control_block_index(), Some(1));
        assert_eq!(segwit.control_block_path_len(), Some(0));

        let with_annex = Segwit::new(vec![vec![0x51], control_block(2), vec![ANNEX_TAG]]);
        assert_eq!(with_annex.control_block_index(), Some(1));
        assert_eq!(with_annex.control_block_path_len(), Some(2));

        // annex needs a third item
        let too_short = Segwit::new(vec![control_block(0), vec![ANNEX_TAG]]);
        assert_eq!(too_short.control_block_index(), None);

        let bad_len = Segwit::new(vec![vec![0x51], vec![0xc0; 34]]);
        assert_eq!(bad_len.control_block_index(), None);
    }

    #[test]
    fn test_tap_script() {
        let segwit = Segwit::new(vec![vec![0u8; 64], vec![0x20, 0x01], control_block(1)]);
        // 0x20 declares 32 bytes but only one follows
        assert!(segwit.tap_script().is_none());

        let tapscript = {
            let mut s = vec![0x20];
            s.extend_from_slice(&[0x66; 32]);
            s.push(0xac);
            s
        };
        let segwit = Segwit::new(vec![vec![0u8; 64], tapscript, control_block(1)]);
        let (script, index) = segwit.tap_script().unwrap();
        assert_eq!(index, 1);
        assert_eq!(script.field_count(), 2);
        assert_eq!(segwit.control_block_index(), Some(index + 1));
    }

    #[test]
    fn test_witness_script() {
        let segwit = Segwit::new(vec![vec![], ec_signature(), vec![0x51, 0x21]]);
        // 0x21 push has no data
        assert!(segwit.witness_script().is_none());
        assert!(!segwit.is_valid_p2wsh());

        let segwit = Segwit::new(vec![vec![], ec_signature(), vec![0x51, 0xae]]);
        assert_eq!(segwit.witness_script().unwrap().field_count(), 2);
        assert!(segwit.is_valid_p2wsh());
    }

    #[test]
    fn test_labels() {
        let segwit = Segwit::new(vec![ec_signature(), compressed_key()]);
        let labeled = segwit.with_field_label(0, "Signature").with_generic_labels(false);
        assert_eq!(labeled.fields()[0].label(), Some("Signature"));
        assert_eq!(labeled.fields()[1].label(), Some("Compressed Public Key"));
        assert_eq!(segwit.fields()[0].label(), None);

        assert_eq!(annex_label(3), "Annex (3 Bytes)");
        assert_eq!(control_block_label(1), "Control Block (1 TapLeaf)");
        assert_eq!(control_block_label(0), "Control Block (0 TapLeaves)");
    }

    #[test]
    fn test_from_hex() {
        let segwit = Segwit::from_hex(&["", "00ff"]).unwrap();
        assert_eq!(segwit.field_count(), 2);
        assert!(segwit.fields()[0].is_empty());
        assert!(Segwit::from_hex(&["zz"]).is_err());
    }
}
