/// Script Tokenizer
///
/// Splits raw script bytes into an ordered list of opcode and stack-item fields.
/// Tokenizing never fails: a push that declares more bytes than remain sets
/// `parse_error`, clamps the final field to whatever is left and stops.
///
/// Fields carry an optional semantic label. Labels are attached by the
/// classifiers, which build new labeled copies (`with_field_label`,
/// `with_labels`) rather than mutating a script in place.

use serde::Serialize;

use crate::opcodes::{
    self, opcode_name, INVALID_OPCODE_NAME, OP_CHECKMULTISIG, OP_CHECKSIG, OP_DROP, OP_ELSE,
    OP_ENDIF, OP_IF, OP_NOTIF, OP_PUSHDATA1, OP_PUSHDATA2, OP_PUSHDATA4, OP_RETURN,
};
use crate::value_reader::{
    is_valid_ec_signature, is_valid_public_key, is_valid_schnorr_public_key, read_numeric,
    stack_item_type,
};

/// Length prefix a stack item was pushed with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushKind {
    Direct,
    PushData1,
    PushData2,
    PushData4,
}

impl PushKind {
    fn size_len(self) -> usize {
        match self {
            PushKind::Direct => 0,
            PushKind::PushData1 => 1,
            PushKind::PushData2 => 2,
            PushKind::PushData4 => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRole {
    Opcode,
    StackItem(PushKind),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    role: FieldRole,
    bytes: Vec<u8>,
    label: Option<String>,
}

impl Field {
    fn opcode(byte: u8) -> Self {
        Field {
            role: FieldRole::Opcode,
            bytes: vec![byte],
            label: None,
        }
    }

    fn stack_item(push: PushKind, bytes: &[u8]) -> Self {
        Field {
            role: FieldRole::StackItem(push),
            bytes: bytes.to_vec(),
            label: None,
        }
    }

    /// Zero-length push. Encodes to the same 0x00 byte as OP_0.
    pub fn empty_push() -> Self {
        Field::stack_item(PushKind::Direct, &[])
    }

    pub fn role(&self) -> FieldRole {
        self.role
    }

    pub fn is_opcode(&self) -> bool {
        self.role == FieldRole::Opcode
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Semantic label set by classification, if any
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Opcode mnemonic for opcode fields
    pub fn opcode_name(&self) -> Option<&'static str> {
        match self.role {
            FieldRole::Opcode => self.bytes.first().map(|b| opcode_name(*b)),
            FieldRole::StackItem(_) => None,
        }
    }

    fn is_op(&self, name: &str) -> bool {
        self.opcode_name() == Some(name)
    }

    fn is_opcode_byte(&self, byte: u8) -> bool {
        self.is_opcode() && self.bytes.first() == Some(&byte)
    }

    /// Mnemonic for opcodes, lowercase hex for stack items
    pub fn as_hex(&self) -> String {
        match self.opcode_name() {
            Some(name) => name.to_string(),
            None => hex::encode(&self.bytes),
        }
    }

    /// Mnemonic for opcodes, lossy UTF-8 text for stack items
    pub fn as_text(&self) -> String {
        match self.opcode_name() {
            Some(name) => name.to_string(),
            None => String::from_utf8_lossy(&self.bytes).into_owned(),
        }
    }

    /// Display type: the mnemonic for opcodes, otherwise the attached label
    /// or a byte-shape guess.
    pub fn display_type(&self, schnorr: bool) -> String {
        if let Some(name) = self.opcode_name() {
            return name.to_string();
        }
        match &self.label {
            Some(label) => label.clone(),
            None => stack_item_type(&self.bytes, schnorr),
        }
    }

    /// Encoded form: the opcode byte, or length prefix plus data
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        let push = match self.role {
            FieldRole::Opcode => {
                out.extend_from_slice(&self.bytes);
                return;
            }
            FieldRole::StackItem(push) => push,
        };

        let len = self.bytes.len();
        match push {
            PushKind::Direct => out.push(len as u8),
            PushKind::PushData1 => {
                out.push(OP_PUSHDATA1);
                out.push(len as u8);
            }
            PushKind::PushData2 => {
                out.push(OP_PUSHDATA2);
                out.extend_from_slice(&(len as u16).to_le_bytes());
            }
            PushKind::PushData4 => {
                out.push(OP_PUSHDATA4);
                out.extend_from_slice(&(len as u32).to_le_bytes());
            }
        }
        out.extend_from_slice(&self.bytes);
    }
}

/// Ordinal inscription found in a tapscript envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Inscription {
    pub mime_type: String,
    pub payload_len: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    raw: Option<Vec<u8>>,
    fields: Vec<Field>,
    parse_error: bool,
}

impl Default for Script {
    fn default() -> Self {
        Script::nil()
    }
}

impl Script {
    /// Sentinel for "no script at all", distinct from an empty script
    pub fn nil() -> Self {
        Script {
            raw: None,
            fields: Vec::new(),
            parse_error: false,
        }
    }

    pub fn new(raw: &[u8]) -> Self {
        let (fields, parse_error) = tokenize(raw);
        Script {
            raw: Some(raw.to_vec()),
            fields,
            parse_error,
        }
    }

    pub fn from_hex(text: &str) -> Result<Self, hex::FromHexError> {
        Ok(Script::new(&hex::decode(text)?))
    }

    /// Build a script from already-tokenized fields (used when a classifier
    /// rewrites a field, e.g. a normalized empty redeem script).
    fn from_fields(raw: Vec<u8>, fields: Vec<Field>, parse_error: bool) -> Self {
        Script {
            raw: Some(raw),
            fields,
            parse_error,
        }
    }

    pub fn is_nil(&self) -> bool {
        self.raw.is_none()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn raw_bytes(&self) -> &[u8] {
        self.raw.as_deref().unwrap_or(&[])
    }

    pub fn as_hex(&self) -> String {
        hex::encode(self.raw_bytes())
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn has_parse_error(&self) -> bool {
        self.parse_error
    }

    /// Re-encode all fields with their original push prefixes
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.raw_bytes().len());
        for field in &self.fields {
            field.encode_into(&mut out);
        }
        out
    }

    // ========== Labeling ==========

    /// Copy with one field relabeled. Out-of-range indexes leave the copy unchanged.
    pub fn with_field_label(&self, index: usize, label: impl Into<String>) -> Self {
        let mut labeled = self.clone();
        if let Some(field) = labeled.fields.get_mut(index) {
            field.label = Some(label.into());
        }
        labeled
    }

    /// Copy with labels applied positionally from the first field
    pub fn with_labels<S: AsRef<str>>(&self, labels: &[S]) -> Self {
        let mut labeled = self.clone();
        for (field, label) in labeled.fields.iter_mut().zip(labels) {
            field.label = Some(label.as_ref().to_string());
        }
        labeled
    }

    /// Copy with every stack item labeled by its byte shape
    pub fn with_generic_labels(&self, schnorr: bool) -> Self {
        let mut labeled = self.clone();
        for field in labeled.fields.iter_mut().filter(|f| !f.is_opcode()) {
            if field.label.is_none() {
                field.label = Some(stack_item_type(&field.bytes, schnorr));
            }
        }
        labeled
    }

    /// Copy with the final field replaced by an empty push. Used when a
    /// redeem script is the single byte 0x00 (OP_0 pushing nothing).
    pub fn with_empty_final_push(&self) -> Self {
        let mut fields = self.fields.clone();
        if let Some(last) = fields.last_mut() {
            let label = last.label.take();
            *last = Field::empty_push();
            last.label = label;
        }
        Script::from_fields(self.raw_bytes().to_vec(), fields, self.parse_error)
    }

    // ========== Serialized scripts ==========

    /// Parse the final stack item as a script of its own (redeem script).
    ///
    /// Rejected when the final field is an opcode, when the nested bytes do not
    /// parse cleanly or when they contain an unassigned opcode.
    pub fn serialized_script(&self) -> Option<Script> {
        let last = self.fields.last()?;
        if last.is_opcode() {
            return None;
        }

        let nested = Script::new(&last.bytes);
        if nested.parse_error {
            return None;
        }
        if nested.fields.iter().any(|f| f.is_op(INVALID_OPCODE_NAME)) {
            return None;
        }

        Some(nested)
    }

    /// Cheap sanity check on control flow opcodes
    pub fn appears_valid(&self) -> bool {
        let mut if_count = 0;
        let mut else_count = 0;
        let mut endif_count = 0;
        let mut return_count = 0;

        for field in self.fields.iter().filter(|f| f.is_opcode()) {
            match field.bytes[0] {
                OP_IF | OP_NOTIF => if_count += 1,
                OP_ELSE => else_count += 1,
                OP_ENDIF => endif_count += 1,
                OP_RETURN => return_count += 1,
                _ => {}
            }
        }

        let looks_like_op_return = return_count > 0 && if_count == 0;
        let mismatched_else = else_count > 0 && if_count == 0;
        let mismatched_if = if_count != endif_count;
        !(looks_like_op_return || mismatched_else || mismatched_if)
    }

    // ========== Output templates ==========

    pub fn is_p2pk_output(&self) -> bool {
        let raw = self.raw_bytes();
        let len = raw.len();
        if len != 35 && len != 67 {
            return false;
        }

        let key_len = raw[0] as usize;
        if len <= key_len + 1 {
            return false;
        }

        raw[len - 1] == OP_CHECKSIG && is_valid_public_key(&raw[1..1 + key_len])
    }

    /// `OP_m <keys...> OP_n OP_CHECKMULTISIG`, matched on the key count only.
    /// Counts pushed with anything other than a small-int opcode are not recognized.
    pub fn is_multisig_output(&self) -> bool {
        let raw = self.raw_bytes();
        let len = raw.len();
        if len < 3 || raw[len - 1] != OP_CHECKMULTISIG {
            return false;
        }

        match opcodes::small_int_value(raw[len - 2]) {
            Some(n) => self.fields.len() >= 3 && n as usize == self.fields.len() - 3,
            None => false,
        }
    }

    pub fn is_p2pkh_output(&self) -> bool {
        let raw = self.raw_bytes();
        raw.len() == 25
            && raw[0] == 0x76
            && raw[1] == 0xa9
            && raw[2] == 0x14
            && raw[23] == 0x88
            && raw[24] == 0xac
    }

    pub fn is_p2sh_output(&self) -> bool {
        let raw = self.raw_bytes();
        raw.len() == 23 && raw[0] == 0xa9 && raw[1] == 0x14 && raw[22] == 0x87
    }

    pub fn is_p2wpkh_output(&self) -> bool {
        let raw = self.raw_bytes();
        raw.len() == 22 && raw[0] == 0x00 && raw[1] == 0x14
    }

    pub fn is_p2wsh_output(&self) -> bool {
        let raw = self.raw_bytes();
        raw.len() == 34 && raw[0] == 0x00 && raw[1] == 0x20
    }

    pub fn is_taproot_output(&self) -> bool {
        let raw = self.raw_bytes();
        raw.len() == 34 && raw[0] == 0x51 && raw[1] == 0x20
    }

    /// OP_RETURN in first position only
    pub fn is_null_data_output(&self) -> bool {
        self.raw_bytes().first() == Some(&OP_RETURN)
    }

    pub fn is_witness_unknown_output(&self) -> bool {
        if self.fields.len() != 2 {
            return false;
        }
        let first = match self.raw_bytes().first() {
            Some(b) => *b,
            None => return false,
        };
        if opcodes::witness_version(first).is_none() {
            return false;
        }

        !(self.is_p2wpkh_output() || self.is_p2wsh_output() || self.is_taproot_output())
    }

    // ========== Input shapes ==========

    /// A single signature
    pub fn is_valid_p2pk_input(&self) -> bool {
        self.fields.len() == 1 && is_valid_ec_signature(&self.fields[0].bytes)
    }

    /// A signature followed by a public key
    pub fn is_valid_p2pkh_input(&self) -> bool {
        self.fields.len() == 2
            && is_valid_ec_signature(&self.fields[0].bytes)
            && is_valid_public_key(&self.fields[1].bytes)
    }

    /// The dummy item for the CHECKMULTISIG off-by-one, then signatures
    pub fn is_valid_multisig_input(&self) -> bool {
        if self.fields.is_empty() {
            return false;
        }
        self.fields[1..]
            .iter()
            .all(|f| is_valid_ec_signature(&f.bytes) || f.is_op("OP_DUP"))
    }

    /// (required signatures, total keys) of a small-int multisig script
    pub fn multisig_counts(&self) -> Option<(u8, u8)> {
        let count = self.fields.len();
        if count < 4 || !self.fields[count - 1].is_opcode_byte(OP_CHECKMULTISIG) {
            return None;
        }

        let first = &self.fields[0];
        let penultimate = &self.fields[count - 2];
        if !first.is_opcode() || !penultimate.is_opcode() {
            return None;
        }

        let m = opcodes::small_int_value(first.bytes[0])?;
        let n = opcodes::small_int_value(penultimate.bytes[0])?;
        if m > n {
            return None;
        }
        Some((m, n))
    }

    // ========== Ordinals ==========

    pub fn is_ordinal(&self) -> bool {
        self.ordinal_inscription().is_some()
    }

    /// Inscription envelope:
    /// `<xonly key> OP_CHECKSIG [<x> OP_DROP] OP_0 OP_IF "ord" 01 <mime> OP_0 <data...> OP_ENDIF`
    pub fn ordinal_inscription(&self) -> Option<Inscription> {
        let fields = &self.fields;
        let count = fields.len();
        if count < 10 {
            return None;
        }

        if fields[0].is_opcode() || !is_valid_schnorr_public_key(&fields[0].bytes) {
            return None;
        }
        if !fields[1].is_op("OP_CHECKSIG") {
            return None;
        }

        let begin = if fields[3].is_opcode_byte(OP_DROP) { 4 } else { 2 };
        if !fields[begin].is_op("OP_0") || !fields[begin + 1].is_op("OP_IF") {
            return None;
        }
        if fields[begin + 2].is_opcode() || fields[begin + 2].bytes != b"ord" {
            return None;
        }
        if fields[begin + 3].bytes.first() != Some(&0x01) {
            return None;
        }
        if !fields[begin + 5].is_op("OP_0") || !fields[count - 1].is_op("OP_ENDIF") {
            return None;
        }

        let payload_len = fields[begin + 6..count - 1]
            .iter()
            .filter(|f| !f.is_opcode())
            .map(|f| f.bytes.len())
            .sum();

        Some(Inscription {
            mime_type: fields[begin + 4].as_text(),
            payload_len,
        })
    }
}

/// Tokenizer core. Returns the fields and the parse error flag.
fn tokenize(raw: &[u8]) -> (Vec<Field>, bool) {
    let mut fields = Vec::new();
    let mut pos = 0;

    while pos < raw.len() {
        let byte = raw[pos];
        let remaining = raw.len() - pos;

        if opcodes::is_opcode_byte(byte) {
            fields.push(Field::opcode(byte));
            pos += 1;
            continue;
        }

        let push = match byte {
            OP_PUSHDATA1 => PushKind::PushData1,
            OP_PUSHDATA2 => PushKind::PushData2,
            OP_PUSHDATA4 => PushKind::PushData4,
            _ => PushKind::Direct,
        };

        // prefix byte plus the explicit length bytes
        let prefix_len = 1 + push.size_len();
        let data_len = match push {
            PushKind::Direct => byte as usize,
            // a truncated length prefix declares nothing
            _ if remaining < prefix_len => 0,
            _ => read_numeric(&raw[pos + 1..pos + prefix_len]) as usize,
        };

        let start = pos + prefix_len;
        if remaining >= prefix_len && remaining - prefix_len >= data_len {
            fields.push(Field::stack_item(push, &raw[start..start + data_len]));
            pos = start + data_len;
            continue;
        }

        // not enough bytes: keep what is left and stop
        if remaining > prefix_len {
            fields.push(Field::stack_item(push, &raw[start..]));
        }
        return (fields, true);
    }

    (fields, false)
}
