//! Ciphers and key derivations used by MDict.
//!
//! - Salsa20/8 with a 128-bit key and a zero nonce (encrypted key block info,
//!   encrypted record blocks, passcode-derived master keys)
//! - The "fast" rotate-and-XOR cipher (v2 key index, some blocks)
//! - Key derivation from a registration code, a block checksum or a v3 UUID

use byteorder::{ByteOrder, LittleEndian};
use log::{debug, trace};
use ripemd::{Digest, Ripemd128};
use twox_hash::XxHash64;

use crate::mdict::types::error::{MdictError, Result};
use crate::mdict::types::models::EncryptionType;

/// "expand 16-byte k", the Salsa20 constant for 128-bit keys.
const TAU: [u32; 4] = [0x6170_7865, 0x3120_646e, 0x7962_2d36, 0x6b20_6574];

/// Magic suffix hashed together with the checksum to unlock a v2 key index.
const KEY_INDEX_MAGIC: u32 = 0x3695;

/// Turns a hex registration code and the registered e-mail into the master
/// key: the code is Salsa20/8-decrypted with RIPEMD-128(email) as key.
pub fn derive_master_key(reg_code: &[u8], user_id: &[u8]) -> Result<[u8; 16]> {
    debug!("Deriving master key from registration code");
    let mut code = reg_code.to_vec();
    salsa_decrypt(&mut code, &ripemd128(&[user_id]));
    code.try_into().map_err(|bytes: Vec<u8>| {
        MdictError::DecryptionError(format!(
            "registration code decrypted to {} bytes, expected 16",
            bytes.len()
        ))
    })
}

/// Master key of a v3 file: xxHash64 of each half of the UUID, big-endian,
/// concatenated.
pub fn derive_key_from_uuid(uuid: &[u8]) -> [u8; 16] {
    debug!("Deriving master key from {}-byte UUID", uuid.len());
    let (head, tail) = uuid.split_at(uuid.len().div_ceil(2));
    let mut key = [0u8; 16];
    key[..8].copy_from_slice(&XxHash64::oneshot(0, head).to_be_bytes());
    key[8..].copy_from_slice(&XxHash64::oneshot(0, tail).to_be_bytes());
    key
}

/// Key for an encrypted v2 key index: RIPEMD-128 over the block checksum
/// (bytes 4..8 of the raw block) followed by the magic constant.
pub fn derive_key_for_v2_index(raw_block: &[u8]) -> [u8; 16] {
    ripemd128(&[&raw_block[4..8], &KEY_INDEX_MAGIC.to_le_bytes()])
}

/// Key used by a block when no master key is known: RIPEMD-128 over its
/// checksum bytes.
pub fn derive_key_for_block(raw_block: &[u8]) -> [u8; 16] {
    ripemd128(&[&raw_block[4..8]])
}

fn ripemd128(parts: &[&[u8]]) -> [u8; 16] {
    let mut hasher = Ripemd128::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// Decrypts `payload` in place with the cipher the block header asked for.
pub fn decrypt_payload_in_place(payload: &mut [u8], encryption: EncryptionType, key: &[u8; 16]) {
    trace!("Decrypting {} bytes ({:?})", payload.len(), encryption);
    match encryption {
        EncryptionType::None => {}
        EncryptionType::Fast => fast_decrypt(payload, key),
        EncryptionType::Salsa20 => salsa_decrypt(payload, key),
    }
}

/// The fast cipher: each byte is nibble-swapped, then XORed with the previous
/// ciphertext byte (0x36 for the first), its index and the cycling key.
pub fn fast_decrypt(data: &mut [u8], key: &[u8]) {
    let mut previous = 0x36u8;
    for (i, byte) in data.iter_mut().enumerate() {
        let cipher = *byte;
        *byte = cipher.rotate_left(4) ^ previous ^ (i as u8) ^ key[i % key.len()];
        previous = cipher;
    }
}

/// Salsa20/8 stream cipher, 128-bit key, zero nonce. Encryption and
/// decryption are the same operation.
pub fn salsa_decrypt(data: &mut [u8], key: &[u8; 16]) {
    let mut input = [0u32; 16];
    input[0] = TAU[0];
    input[5] = TAU[1];
    input[10] = TAU[2];
    input[15] = TAU[3];
    for i in 0..4 {
        let word = LittleEndian::read_u32(&key[i * 4..]);
        input[1 + i] = word;
        input[11 + i] = word;
    }

    for (counter, chunk) in data.chunks_mut(64).enumerate() {
        let counter = counter as u64;
        input[8] = counter as u32;
        input[9] = (counter >> 32) as u32;
        let keystream = salsa20_8_block(&input);
        chunk
            .iter_mut()
            .zip(keystream.iter())
            .for_each(|(byte, k)| *byte ^= k);
    }
}

fn salsa20_8_block(input: &[u32; 16]) -> [u8; 64] {
    let mut x = *input;
    for _ in 0..4 {
        quarter_round(&mut x, 0, 4, 8, 12);
        quarter_round(&mut x, 5, 9, 13, 1);
        quarter_round(&mut x, 10, 14, 2, 6);
        quarter_round(&mut x, 15, 3, 7, 11);
        quarter_round(&mut x, 0, 1, 2, 3);
        quarter_round(&mut x, 5, 6, 7, 4);
        quarter_round(&mut x, 10, 11, 8, 9);
        quarter_round(&mut x, 15, 12, 13, 14);
    }
    let mut out = [0u8; 64];
    for (i, word) in x.iter().enumerate() {
        LittleEndian::write_u32(&mut out[i * 4..], word.wrapping_add(input[i]));
    }
    out
}

#[inline(always)]
fn quarter_round(x: &mut [u32; 16], a: usize, b: usize, c: usize, d: usize) {
    x[b] ^= x[a].wrapping_add(x[d]).rotate_left(7);
    x[c] ^= x[b].wrapping_add(x[a]).rotate_left(9);
    x[d] ^= x[c].wrapping_add(x[b]).rotate_left(13);
    x[a] ^= x[d].wrapping_add(x[c]).rotate_left(18);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_encrypt(data: &mut [u8], key: &[u8]) {
        let mut previous = 0x36u8;
        for (i, byte) in data.iter_mut().enumerate() {
            let cipher = (*byte ^ previous ^ (i as u8) ^ key[i % key.len()]).rotate_left(4);
            *byte = cipher;
            previous = cipher;
        }
    }

    #[test]
    fn salsa_is_its_own_inverse() {
        let key = *b"0123456789abcdef";
        let plain: Vec<u8> = (0..200u8).collect();
        let mut data = plain.clone();
        salsa_decrypt(&mut data, &key);
        assert_ne!(data, plain);
        salsa_decrypt(&mut data, &key);
        assert_eq!(data, plain);
    }

    #[test]
    fn fast_decrypt_reverses_fast_encrypt() {
        let key = ripemd128(&[b"key"]);
        let plain = b"key index payload spanning more than sixteen bytes".to_vec();
        let mut data = plain.clone();
        fast_encrypt(&mut data, &key);
        fast_decrypt(&mut data, &key);
        assert_eq!(data, plain);
    }

    #[test]
    fn master_key_requires_sixteen_bytes() {
        assert!(derive_master_key(&[1, 2, 3], b"user@example.com").is_err());
        let key = derive_master_key(&[7u8; 16], b"user@example.com").unwrap();
        assert_eq!(key.len(), 16);
    }

    #[test]
    fn uuid_key_depends_on_both_halves() {
        let a = derive_key_from_uuid(b"0123456789");
        let b = derive_key_from_uuid(b"0123456780");
        assert_eq!(a[..8], b[..8]);
        assert_ne!(a[8..], b[8..]);
    }
}
