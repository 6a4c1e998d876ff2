/// Value Reader
///
/// Leaf utilities used by the script tokenizer and the classifiers:
/// - little-endian integers and Bitcoin CompactSize varints
/// - structural (not cryptographic) public key / signature checks
/// - byte-shape typing of stack items for display
/// - exact BTC -> satoshi conversion for node-reported amounts

use std::io::Cursor;
use std::str::FromStr;

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::error::ValueError;

pub const SATOSHIS_PER_BTC: u64 = 100_000_000;

/// Little-endian decode of up to 8 bytes. Extra bytes beyond the 8th are ignored.
pub fn read_numeric(bytes: &[u8]) -> u64 {
    let len = bytes.len().min(8);
    if len == 0 {
        return 0;
    }
    LittleEndian::read_uint(&bytes[..len], len)
}

/// Read a Bitcoin CompactSize integer.
///
/// Returns the value and the number of bytes consumed. Non-minimal encodings
/// are accepted as-is.
pub fn read_var_int(bytes: &[u8]) -> Result<(u64, usize), ValueError> {
    let mut cursor = Cursor::new(bytes);
    let truncated = |needed: usize| ValueError::TruncatedVarInt {
        needed,
        available: bytes.len(),
    };

    let first = cursor.read_u8().map_err(|_| truncated(1))?;
    let value = match first {
        0x00..=0xfc => u64::from(first),
        0xfd => u64::from(cursor.read_u16::<LittleEndian>().map_err(|_| truncated(3))?),
        0xfe => u64::from(cursor.read_u32::<LittleEndian>().map_err(|_| truncated(5))?),
        0xff => cursor.read_u64::<LittleEndian>().map_err(|_| truncated(9))?,
    };

    Ok((value, cursor.position() as usize))
}

// ========== Structural key / signature checks ==========

fn is_valid_sighash(byte: u8) -> bool {
    matches!(byte, 0x01 | 0x02 | 0x03 | 0x81 | 0x82 | 0x83)
}

pub fn is_valid_uncompressed_public_key(field: &[u8]) -> bool {
    field.len() == 65 && field[0] == 0x04
}

pub fn is_valid_compressed_public_key(field: &[u8]) -> bool {
    field.len() == 33 && (field[0] == 0x02 || field[0] == 0x03)
}

/// Compressed (33 bytes, 0x02/0x03) or uncompressed (65 bytes, 0x04) EC key
pub fn is_valid_public_key(field: &[u8]) -> bool {
    is_valid_compressed_public_key(field) || is_valid_uncompressed_public_key(field)
}

/// DER-encoded ECDSA signature followed by a SIGHASH byte.
///
/// Checks the 0x30 envelope, the r/s integer markers and lengths, a plausible
/// overall size and the trailing SIGHASH byte.
pub fn is_valid_ec_signature(field: &[u8]) -> bool {
    let len = field.len();
    if !(55..=78).contains(&len) {
        return false;
    }
    if field[0] != 0x30 {
        return false;
    }

    let signature_len = field[1] as usize;
    if len < signature_len || field[2] != 0x02 {
        return false;
    }

    // r
    let r_len = field[3] as usize;
    if len < r_len + 6 || field[r_len + 4] != 0x02 {
        return false;
    }

    // s
    let s_len = field[r_len + 5] as usize;
    if r_len + s_len + 4 != signature_len {
        return false;
    }

    is_valid_sighash(field[len - 1])
}

/// x-only key; nothing to check beyond the length
pub fn is_valid_schnorr_public_key(field: &[u8]) -> bool {
    field.len() == 32
}

/// 64-byte Schnorr signature, or 65 bytes with an explicit SIGHASH byte
pub fn is_valid_schnorr_signature(field: &[u8]) -> bool {
    match field.len() {
        64 => true,
        65 => is_valid_sighash(field[64]),
        _ => false,
    }
}

/// Generic display type of a stack item, judged by its byte shape alone.
///
/// `schnorr` enables Taproot conventions (64/65-byte signatures, x-only keys).
pub fn stack_item_type(field: &[u8], schnorr: bool) -> String {
    if is_valid_ec_signature(field) {
        return "Signature (EC)".to_string();
    }
    if schnorr && is_valid_schnorr_signature(field) {
        return "Signature (Schnorr)".to_string();
    }
    if is_valid_uncompressed_public_key(field) {
        return "Uncompressed Public Key".to_string();
    }
    if is_valid_compressed_public_key(field) {
        return "Compressed Public Key".to_string();
    }
    if schnorr && is_valid_schnorr_public_key(field) {
        return "Schnorr Public Key".to_string();
    }

    data_label(field.len())
}

/// "Data (N Bytes)" label
pub fn data_label(len: usize) -> String {
    let plural = if len == 1 { "" } else { "s" };
    format!("Data ({} Byte{})", len, plural)
}

// ========== Amounts ==========

/// Convert a node-reported BTC amount (decimal text) to satoshis.
///
/// Uses decimal arithmetic so that amounts like 0.00000001 scale to exactly 1.
/// Scientific notation ("1e-8") is accepted.
pub fn btc_to_satoshis(text: &str) -> Result<u64, ValueError> {
    let text = text.trim();
    let amount = Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .map_err(|_| ValueError::InvalidAmount(text.to_string()))?;

    if amount < Decimal::ZERO {
        return Err(ValueError::NegativeAmount(text.to_string()));
    }

    let satoshis = amount
        .checked_mul(Decimal::from(SATOSHIS_PER_BTC))
        .ok_or_else(|| ValueError::AmountOutOfRange(text.to_string()))?;

    if !satoshis.fract().is_zero() {
        return Err(ValueError::SubSatoshi(text.to_string()));
    }

    satoshis
        .to_u64()
        .ok_or_else(|| ValueError::AmountOutOfRange(text.to_string()))
}

/// Format satoshis as BTC with 8 decimals.
///
/// # Examples
/// ```
/// use scriptscan::value_reader::format_btc;
/// assert_eq!(format_btc(100_000_000), "1.00000000");
/// ```
pub fn format_btc(satoshis: u64) -> String {
    let whole = satoshis / SATOSHIS_PER_BTC;
    let frac = satoshis % SATOSHIS_PER_BTC;
    format!("{}.{:08}", whole, frac)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 71-byte DER signature with SIGHASH_ALL
    pub(crate) fn sample_ec_signature() -> Vec<u8> {
        let mut sig = vec![0x30, 0x44, 0x02, 0x20];
        sig.extend_from_slice(&[0x11; 32]);
        sig.extend_from_slice(&[0x02, 0x20]);
        sig.extend_from_slice(&[0x22; 32]);
        sig.push(0x01);
        sig
    }

    #[test]
    fn test_read_numeric() {
        assert_eq!(read_numeric(&[]), 0);
        assert_eq!(read_numeric(&[0x01]), 1);
        assert_eq!(read_numeric(&[0x01, 0x02]), 0x0201);
        assert_eq!(read_numeric(&[0xff, 0xff, 0xff, 0xff]), 0xffff_ffff);
        assert_eq!(
            read_numeric(&[1, 2, 3, 4, 5, 6, 7, 8]),
            0x0807_0605_0403_0201
        );
    }

    #[test]
    fn test_read_var_int() {
        assert_eq!(read_var_int(&[0x00]).unwrap(), (0, 1));
        assert_eq!(read_var_int(&[0xfc, 0xaa]).unwrap(), (0xfc, 1));
        assert_eq!(read_var_int(&[0xfd, 0x34, 0x12]).unwrap(), (0x1234, 3));
        assert_eq!(
            read_var_int(&[0xfe, 0x78, 0x56, 0x34, 0x12]).unwrap(),
            (0x1234_5678, 5)
        );
        assert_eq!(
            read_var_int(&[0xff, 1, 0, 0, 0, 0, 0, 0, 0]).unwrap(),
            (1, 9)
        );
        // non-minimal encodings are tolerated
        assert_eq!(read_var_int(&[0xfd, 0x01, 0x00]).unwrap(), (1, 3));
    }

    #[test]
    fn test_read_var_int_truncated() {
        assert!(read_var_int(&[]).is_err());
        assert_eq!(
            read_var_int(&[0xfd, 0x01]),
            Err(ValueError::TruncatedVarInt { needed: 3, available: 2 })
        );
    }

    #[test]
    fn test_public_keys() {
        let mut compressed = vec![0x02];
        compressed.extend_from_slice(&[0xab; 32]);
        assert!(is_valid_public_key(&compressed));
        compressed[0] = 0x05;
        assert!(!is_valid_public_key(&compressed));

        let mut uncompressed = vec![0x04];
        uncompressed.extend_from_slice(&[0xcd; 64]);
        assert!(is_valid_public_key(&uncompressed));
        assert!(!is_valid_public_key(&uncompressed[..64]));
    }

    #[test]
    fn test_ec_signature() {
        let sig = sample_ec_signature();
        assert_eq!(sig.len(), 71);
        assert!(is_valid_ec_signature(&sig));

        let mut bad_sighash = sig.clone();
        *bad_sighash.last_mut().unwrap() = 0x04;
        assert!(!is_valid_ec_signature(&bad_sighash));

        let mut bad_envelope = sig.clone();
        bad_envelope[0] = 0x31;
        assert!(!is_valid_ec_signature(&bad_envelope));

        let mut bad_lengths = sig.clone();
        bad_lengths[3] = 0x21;
        assert!(!is_valid_ec_signature(&bad_lengths));

        assert!(!is_valid_ec_signature(&[0x30, 0x06, 0x02, 0x01, 0x01, 0x02, 0x01, 0x01, 0x01]));
    }

    #[test]
    fn test_schnorr_signature() {
        assert!(is_valid_schnorr_signature(&[0u8; 64]));
        let mut with_sighash = vec![0u8; 64];
        with_sighash.push(0x83);
        assert!(is_valid_schnorr_signature(&with_sighash));
        *with_sighash.last_mut().unwrap() = 0x00;
        assert!(!is_valid_schnorr_signature(&with_sighash));
        assert!(!is_valid_schnorr_signature(&[0u8; 63]));
    }

    #[test]
    fn test_stack_item_type() {
        assert_eq!(stack_item_type(&sample_ec_signature(), false), "Signature (EC)");
        assert_eq!(stack_item_type(&[0u8; 64], false), "Data (64 Bytes)");
        assert_eq!(stack_item_type(&[0u8; 64], true), "Signature (Schnorr)");
        assert_eq!(stack_item_type(&[0u8; 32], true), "Schnorr Public Key");
        assert_eq!(stack_item_type(&[0x07], false), "Data (1 Byte)");
        assert_eq!(stack_item_type(&[], false), "Data (0 Bytes)");
    }

    #[test]
    fn test_btc_to_satoshis() {
        assert_eq!(btc_to_satoshis("0.00000001").unwrap(), 1);
        assert_eq!(btc_to_satoshis("1e-8").unwrap(), 1);
        assert_eq!(btc_to_satoshis("50.00000000").unwrap(), 5_000_000_000);
        assert_eq!(btc_to_satoshis("0.29").unwrap(), 29_000_000);
        assert_eq!(btc_to_satoshis("20999999.97690000").unwrap(), 2_099_999_997_690_000);
        assert_eq!(btc_to_satoshis("0").unwrap(), 0);
        assert!(matches!(btc_to_satoshis("-1"), Err(ValueError::NegativeAmount(_))));
        assert!(matches!(btc_to_satoshis("0.000000001"), Err(ValueError::SubSatoshi(_))));
        assert!(matches!(btc_to_satoshis("abc"), Err(ValueError::InvalidAmount(_))));
    }

    #[test]
    fn test_format_btc() {
        assert_eq!(format_btc(0), "0.00000000");
        assert_eq!(format_btc(1), "0.00000001");
        assert_eq!(format_btc(123_456_789), "1.23456789");
    }
}
