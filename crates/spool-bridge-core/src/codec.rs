//! SpoolEase encrypted wire format
//!
//! Every message body on the device API is a single string:
//! `base64_no_pad(nonce) || base64_no_pad(ciphertext || tag)`, AES-256-GCM
//! with a random 12-byte nonce, a 16-byte tag, and no associated data. The
//! 12-byte nonce always encodes to exactly 16 unpadded base64 characters,
//! which is the fixed split point the decoder relies on.
//!
//! The AES key is derived from the device security key with
//! PBKDF2-HMAC-SHA256, matching the parameters baked into the firmware.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine as _;
use pbkdf2::pbkdf2_hmac;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;

use crate::error::{Error, Result};

/// AES-256 key length in bytes
pub const KEY_LEN: usize = 32;
/// AEAD nonce length in bytes
pub const NONCE_LEN: usize = 12;
/// Length of the base64-no-pad encoded nonce prefix
pub const NONCE_B64_LEN: usize = 16;

/// Default PBKDF2 salt used by the device firmware
pub const DEFAULT_SALT: &str = "example_salt";
/// Default PBKDF2 iteration count used by the device firmware
pub const DEFAULT_ITERATIONS: u32 = 10_000;

/// Derive the 32-byte AES key from the device security key.
///
/// Deterministic: identical inputs always yield the same key.
pub fn derive_key(security_key: &str, salt: &str, iterations: u32) -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    pbkdf2_hmac::<Sha256>(
        security_key.as_bytes(),
        salt.as_bytes(),
        iterations,
        &mut key,
    );
    key
}

/// Encrypt a string into the wire format with a fresh random nonce.
pub fn encrypt(key: &[u8; KEY_LEN], plaintext: &str) -> Result<String> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));

    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext_with_tag = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|_| Error::Encryption)?;

    Ok(format!(
        "{}{}",
        STANDARD_NO_PAD.encode(nonce_bytes),
        STANDARD_NO_PAD.encode(&ciphertext_with_tag)
    ))
}

/// Decrypt a wire-format string back to plaintext.
///
/// The first 16 characters are the encoded nonce, the remainder the
/// ciphertext with the appended tag.
pub fn decrypt(key: &[u8; KEY_LEN], encrypted: &str) -> Result<String> {
    let raw = encrypted.as_bytes();
    if raw.len() < NONCE_B64_LEN {
        return Err(Error::MalformedFrame(format!(
            "frame is {} chars, nonce prefix needs {}",
            raw.len(),
            NONCE_B64_LEN
        )));
    }
    let (nonce_b64, body_b64) = raw.split_at(NONCE_B64_LEN);

    let nonce_bytes = STANDARD_NO_PAD
        .decode(nonce_b64)
        .map_err(|e| Error::MalformedFrame(format!("nonce: {e}")))?;
    let body = STANDARD_NO_PAD
        .decode(body_b64)
        .map_err(|e| Error::MalformedFrame(format!("ciphertext: {e}")))?;

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let plaintext = cipher
        .decrypt(Nonce::from_slice(&nonce_bytes), body.as_ref())
        .map_err(|_| Error::Authentication)?;

    Ok(String::from_utf8(plaintext)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> [u8; KEY_LEN] {
        derive_key("TESTKEY", DEFAULT_SALT, DEFAULT_ITERATIONS)
    }

    #[test]
    fn test_derive_key_deterministic() {
        let k1 = derive_key("TESTKEY", "example_salt", 10_000);
        let k2 = derive_key("TESTKEY", "example_salt", 10_000);
        assert_eq!(k1, k2);
        assert_eq!(k1.len(), 32);
    }

    #[test]
    fn test_derive_key_sensitivity() {
        let base = derive_key("TESTKEY", "example_salt", 10_000);
        assert_ne!(base, derive_key("OTHKEY1", "example_salt", 10_000));
        assert_ne!(base, derive_key("TESTKEY", "other_salt", 10_000));
    }

    #[test]
    fn test_nonce_encodes_to_16_chars() {
        let encoded = STANDARD_NO_PAD.encode([0u8; NONCE_LEN]);
        assert_eq!(encoded.len(), NONCE_B64_LEN);
    }

    #[test]
    fn test_no_pad_roundtrip_various_lengths() {
        for length in 1..50usize {
            let data: Vec<u8> = (0..length as u8).collect();
            let encoded = STANDARD_NO_PAD.encode(&data);
            assert!(!encoded.contains('='));
            assert_eq!(STANDARD_NO_PAD.decode(&encoded).unwrap(), data);
        }
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = test_key();
        let plaintext = "1,04A3B2C1D5E6F7,PLA,,Black,000000FF";
        let wire = encrypt(&key, plaintext).unwrap();
        assert_eq!(decrypt(&key, &wire).unwrap(), plaintext);
    }

    #[test]
    fn test_encrypt_is_nondeterministic() {
        let key = test_key();
        let a = encrypt(&key, "same text").unwrap();
        let b = encrypt(&key, "same text").unwrap();
        // Fresh random nonce every message
        assert_ne!(a, b);
    }

    #[test]
    fn test_decrypt_wrong_key_fails() {
        let wire = encrypt(&test_key(), "secret").unwrap();
        let other = derive_key("WRONGKEY", DEFAULT_SALT, DEFAULT_ITERATIONS);
        assert!(matches!(decrypt(&other, &wire), Err(Error::Authentication)));
    }

    #[test]
    fn test_decrypt_tampered_ciphertext_fails() {
        let key = test_key();
        let wire = encrypt(&key, "secret").unwrap();
        let mut bytes = wire.into_bytes();
        let last = bytes.len() - 1;
        bytes[last] = if bytes[last] == b'A' { b'B' } else { b'A' };
        let tampered = String::from_utf8(bytes).unwrap();
        assert!(matches!(
            decrypt(&key, &tampered),
            Err(Error::Authentication) | Err(Error::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_decrypt_short_frame() {
        let result = decrypt(&test_key(), "tooshort");
        assert!(matches!(result, Err(Error::MalformedFrame(_))));
    }

    #[test]
    fn test_decrypt_invalid_base64() {
        let result = decrypt(&test_key(), "!!!!!!!!!!!!!!!!garbage-after");
        assert!(matches!(result, Err(Error::MalformedFrame(_))));
    }

    #[test]
    fn test_decrypt_non_ascii_frame() {
        // Multi-byte chars at the split point must not panic
        let result = decrypt(&test_key(), "ééééééééééééééééééé");
        assert!(matches!(result, Err(Error::MalformedFrame(_))));
    }

    #[test]
    fn test_empty_plaintext_roundtrip() {
        let key = test_key();
        let wire = encrypt(&key, "").unwrap();
        assert_eq!(decrypt(&key, &wire).unwrap(), "");
    }
}
