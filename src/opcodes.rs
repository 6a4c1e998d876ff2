/// Opcode Table
///
/// Static byte -> mnemonic lookup covering the whole 0x00-0xff range, following
/// Bitcoin Core's `script/script.h`. Unassigned values map to "OP_INVALIDOPCODE".
///
/// The push-data prefixes (0x4c-0x4e) keep their names here even though the
/// tokenizer never emits them as opcode fields.

pub const OP_0: u8 = 0x00;
pub const OP_PUSHDATA1: u8 = 0x4c;
pub const OP_PUSHDATA2: u8 = 0x4d;
pub const OP_PUSHDATA4: u8 = 0x4e;
pub const OP_1NEGATE: u8 = 0x4f;
pub const OP_RESERVED: u8 = 0x50;
pub const OP_1: u8 = 0x51;
pub const OP_16: u8 = 0x60;
pub const OP_IF: u8 = 0x63;
pub const OP_NOTIF: u8 = 0x64;
pub const OP_ELSE: u8 = 0x67;
pub const OP_ENDIF: u8 = 0x68;
pub const OP_RETURN: u8 = 0x6a;
pub const OP_DROP: u8 = 0x75;
pub const OP_DUP: u8 = 0x76;
pub const OP_EQUAL: u8 = 0x87;
pub const OP_EQUALVERIFY: u8 = 0x88;
pub const OP_HASH160: u8 = 0xa9;
pub const OP_CHECKSIG: u8 = 0xac;
pub const OP_CHECKMULTISIG: u8 = 0xae;
pub const OP_INVALIDOPCODE: u8 = 0xff;

/// Mnemonic used for every unassigned byte value
pub const INVALID_OPCODE_NAME: &str = "OP_INVALIDOPCODE";

const X: &str = INVALID_OPCODE_NAME;

#[rustfmt::skip]
static OPCODE_NAMES: [&str; 256] = [
    // 0x00 push value
    "OP_0",
    // 0x01 - 0x4b direct pushes (never emitted as opcode fields)
    X, X, X, X, X, X, X, X, X, X, X, X, X, X, X,
    X, X, X, X, X, X, X, X, X, X, X, X, X, X, X, X,
    X, X, X, X, X, X, X, X, X, X, X, X, X, X, X, X,
    X, X, X, X, X, X, X, X, X, X, X, X, X, X, X, X,
    X, X, X, X, X, X, X, X, X, X, X, X,
    // 0x4c
    "OP_PUSHDATA1", "OP_PUSHDATA2", "OP_PUSHDATA4", "OP_1NEGATE",
    // 0x50
    "OP_RESERVED", "OP_1", "OP_2", "OP_3", "OP_4", "OP_5", "OP_6", "OP_7",
    "OP_8", "OP_9", "OP_10", "OP_11", "OP_12", "OP_13", "OP_14", "OP_15",
    // 0x60
    "OP_16",
    // 0x61 control
    "OP_NOP", "OP_VER", "OP_IF", "OP_NOTIF", "OP_VERIF", "OP_VERNOTIF", "OP_ELSE",
    "OP_ENDIF", "OP_VERIFY", "OP_RETURN",
    // 0x6b stack ops
    "OP_TOALTSTACK", "OP_FROMALTSTACK", "OP_2DROP", "OP_2DUP", "OP_3DUP",
    // 0x70
    "OP_2OVER", "OP_2ROT", "OP_2SWAP", "OP_IFDUP", "OP_DEPTH", "OP_DROP", "OP_DUP", "OP_NIP",
    "OP_OVER", "OP_PICK", "OP_ROLL", "OP_ROT", "OP_SWAP", "OP_TUCK",
    // 0x7e splice ops
    "OP_CAT", "OP_SUBSTR",
    // 0x80
    "OP_LEFT", "OP_RIGHT", "OP_SIZE",
    // 0x83 bit logic
    "OP_INVERT", "OP_AND", "OP_OR", "OP_XOR", "OP_EQUAL", "OP_EQUALVERIFY",
    "OP_RESERVED1", "OP_RESERVED2",
    // 0x8b numeric
    "OP_1ADD", "OP_1SUB", "OP_2MUL", "OP_2DIV", "OP_NEGATE",
    // 0x90
    "OP_ABS", "OP_NOT", "OP_0NOTEQUAL", "OP_ADD", "OP_SUB", "OP_MUL", "OP_DIV", "OP_MOD",
    "OP_LSHIFT", "OP_RSHIFT", "OP_BOOLAND", "OP_BOOLOR", "OP_NUMEQUAL", "OP_NUMEQUALVERIFY",
    "OP_NUMNOTEQUAL", "OP_LESSTHAN",
    // 0xa0
    "OP_GREATERTHAN", "OP_LESSTHANOREQUAL", "OP_GREATERTHANOREQUAL", "OP_MIN", "OP_MAX",
    "OP_WITHIN",
    // 0xa6 crypto
    "OP_RIPEMD160", "OP_SHA1", "OP_SHA256", "OP_HASH160", "OP_HASH256", "OP_CODESEPARATOR",
    "OP_CHECKSIG", "OP_CHECKSIGVERIFY", "OP_CHECKMULTISIG", "OP_CHECKMULTISIGVERIFY",
    // 0xb0 expansion
    "OP_NOP1", "OP_CHECKLOCKTIMEVERIFY", "OP_CHECKSEQUENCEVERIFY", "OP_NOP4", "OP_NOP5",
    "OP_NOP6", "OP_NOP7", "OP_NOP8", "OP_NOP9", "OP_NOP10",
    // 0xba tapscript (BIP 342)
    "OP_CHECKSIGADD",
    // 0xbb - 0xbf
    X, X, X, X, X,
    // 0xc0 - 0xff
    X, X, X, X, X, X, X, X, X, X, X, X, X, X, X, X,
    X, X, X, X, X, X, X, X, X, X, X, X, X, X, X, X,
    X, X, X, X, X, X, X, X, X, X, X, X, X, X, X, X,
    X, X, X, X, X, X, X, X, X, X, X, X, X, X, X, "OP_INVALIDOPCODE",
];

/// Mnemonic for a single opcode byte
pub fn opcode_name(byte: u8) -> &'static str {
    OPCODE_NAMES[byte as usize]
}

/// True for bytes the tokenizer treats as single-byte opcode fields
/// (OP_0 and everything from OP_1NEGATE upward).
pub fn is_opcode_byte(byte: u8) -> bool {
    byte == OP_0 || byte >= OP_1NEGATE
}

/// True for bytes that are opcodes and assigned a real mnemonic
pub fn is_assigned_opcode(byte: u8) -> bool {
    is_opcode_byte(byte) && opcode_name(byte) != INVALID_OPCODE_NAME
}

/// Value of a small-integer opcode (OP_1 .. OP_16)
pub fn small_int_value(byte: u8) -> Option<u8> {
    if (OP_1..=OP_16).contains(&byte) {
        Some(byte - (OP_1 - 1))
    } else {
        None
    }
}

/// Witness version encoded by the first byte of an output script
pub fn witness_version(byte: u8) -> Option<u8> {
    if byte == OP_0 {
        Some(0)
    } else {
        small_int_value(byte)
    }
}
