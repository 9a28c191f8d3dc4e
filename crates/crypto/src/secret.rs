//! Symmetric secret keys.
//!
//! Sealed output is `nonce (24) || ciphertext + tag` under XChaCha20-Poly1305.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::encoded::{Algorithm, EncodedString};
use crate::error::{CryptoError, CryptoResult};
use crate::keyfile;

const NONCE_LEN: usize = 24;
const TAG_LEN: usize = 16;

/// A 256-bit symmetric key, wiped from memory on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey {
    key: [u8; 32],
}

impl SecretKey {
    pub fn generate() -> Self {
        let mut key = [0u8; 32];
        OsRng.fill_bytes(&mut key);
        Self { key }
    }

    /// Accepts `XCHACHA20` keys, and `XSALSA20` keys written by older tools
    /// since both are 32 bytes.
    pub fn from_encoded(encoded: &EncodedString) -> CryptoResult<Self> {
        match encoded.algorithm() {
            Algorithm::XChaCha20 | Algorithm::XSalsa20 => {}
            other => {
                return Err(CryptoError::InvalidKeyUsage {
                    expected: Algorithm::XChaCha20,
                    actual: other.clone(),
                })
            }
        }
        Ok(Self {
            key: encoded.to_array::<32>()?,
        })
    }

    pub fn to_encoded(&self) -> EncodedString {
        EncodedString::new(Algorithm::XChaCha20, self.key.to_vec())
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
        let cipher = self.cipher().map_err(|reason| CryptoError::EncryptionFailure { reason })?;

        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let ciphertext = cipher
            .encrypt(XNonce::from_slice(&nonce), plaintext)
            .map_err(|e| CryptoError::EncryptionFailure {
                reason: e.to_string(),
            })?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    pub fn decrypt(&self, sealed: &[u8]) -> CryptoResult<Vec<u8>> {
        if sealed.len() < NONCE_LEN + TAG_LEN {
            return Err(CryptoError::DecryptionFailure {
                reason: format!("sealed data too short: {} bytes", sealed.len()),
            });
        }
        let cipher = self.cipher().map_err(|reason| CryptoError::DecryptionFailure { reason })?;
        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        cipher
            .decrypt(XNonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::DecryptionFailure {
                reason: "authentication tag mismatch".to_string(),
            })
    }

    /// Writes `{"SecretKey": ..}` to `path`, replacing any existing file.
    pub fn save(&self, path: impl AsRef<Path>) -> CryptoResult<()> {
        let file = SecretKeyFile {
            secret_key: self.to_encoded(),
        };
        keyfile::write_json(path.as_ref(), &file)
    }

    pub fn load(path: impl AsRef<Path>) -> CryptoResult<Self> {
        let file: SecretKeyFile = keyfile::read_json(path.as_ref())?;
        Self::from_encoded(&file.secret_key).map_err(keyfile::malformed)
    }

    fn cipher(&self) -> Result<XChaCha20Poly1305, String> {
        XChaCha20Poly1305::new_from_slice(&self.key).map_err(|e| e.to_string())
    }
}

impl PartialEq for SecretKey {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for SecretKey {}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey([REDACTED])")
    }
}

#[derive(Serialize, Deserialize)]
struct SecretKeyFile {
    #[serde(rename = "SecretKey")]
    secret_key: EncodedString,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let key = SecretKey::generate();
        let sealed = key.encrypt(b"workspace data").unwrap();
        assert_eq!(sealed.len(), NONCE_LEN + 14 + TAG_LEN);
        assert_eq!(key.decrypt(&sealed).unwrap(), b"workspace data");
    }

    #[test]
    fn test_nonce_is_random() {
        let key = SecretKey::generate();
        let a = key.encrypt(b"same").unwrap();
        let b = key.encrypt(b"same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_key_fails() {
        let key = SecretKey::generate();
        let other = SecretKey::generate();
        let sealed = key.encrypt(b"data").unwrap();
        assert!(matches!(
            other.decrypt(&sealed),
            Err(CryptoError::DecryptionFailure { .. })
        ));
    }

    #[test]
    fn test_tampered_nonce_fails() {
        let key = SecretKey::generate();
        let mut sealed = key.encrypt(b"data").unwrap();
        sealed[0] ^= 0x80;
        assert!(matches!(
            key.decrypt(&sealed),
            Err(CryptoError::DecryptionFailure { .. })
        ));
    }

    #[test]
    fn test_short_input_fails() {
        let key = SecretKey::generate();
        assert!(matches!(
            key.decrypt(&[0u8; 10]),
            Err(CryptoError::DecryptionFailure { .. })
        ));
    }

    #[test]
    fn test_encoded_roundtrip() {
        let key = SecretKey::generate();
        let encoded = key.to_encoded();
        assert_eq!(encoded.algorithm(), &Algorithm::XChaCha20);
        assert_eq!(SecretKey::from_encoded(&encoded).unwrap(), key);

        let legacy = EncodedString::new(Algorithm::XSalsa20, encoded.as_bytes().to_vec());
        assert_eq!(SecretKey::from_encoded(&legacy).unwrap(), key);
    }

    #[test]
    fn test_rejects_signing_key() {
        let encoded = EncodedString::new(Algorithm::Ed25519, vec![0u8; 32]);
        assert!(matches!(
            SecretKey::from_encoded(&encoded),
            Err(CryptoError::InvalidKeyUsage { .. })
        ));
    }
}
