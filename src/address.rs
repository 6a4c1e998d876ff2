// address.rs

use sha2::{Digest, Sha256};
use ripemd160::{Digest as RipemdDigest, Ripemd160};

use crate::output::OutputType;
use crate::script::Script;

/// Base58 version byte for mainnet pay-to-pubkey-hash addresses
pub const P2PKH_VERSION: u8 = 0x00;
/// Base58 version byte for mainnet pay-to-script-hash addresses
pub const P2SH_VERSION: u8 = 0x05;

/// HASH160: RIPEMD160(SHA256(data))
pub fn hash160(data: &[u8]) -> Vec<u8> {
    let sha = Sha256::digest(data);
    Ripemd160::digest(&sha).to_vec()
}

fn sha256d(data: &[u8]) -> Vec<u8> {
    let first = Sha256::digest(data);
    Sha256::digest(&first).to_vec()
}

/// Base58Check encoding of a 20-byte hash with a version prefix
pub fn hash_address(hash: &[u8], prefix: u8) -> String {
    let mut extended_hash = vec![prefix];
    extended_hash.extend_from_slice(hash);

    let checksum = sha256d(&extended_hash);
    extended_hash.extend_from_slice(&checksum[0..4]);

    bs58::encode(extended_hash).into_string()
}

/// Legacy address for an output when the node did not report one.
///
/// Only the base58 templates are derived here; segwit addresses always come
/// from the node.
pub fn legacy_address(script: &Script, output_type: OutputType) -> Option<String> {
    let raw = script.raw_bytes();
    match output_type {
        OutputType::P2pkh => Some(hash_address(&raw[3..23], P2PKH_VERSION)),
        OutputType::P2sh => Some(hash_address(&raw[2..22], P2SH_VERSION)),
        OutputType::P2pk => {
            let key_len = *raw.first()? as usize;
            let key = raw.get(1..1 + key_len)?;
            Some(hash_address(&hash160(key), P2PKH_VERSION))
        }
        _ => None,
    }
}
