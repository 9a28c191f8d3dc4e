//! CURVE25519 encryption pairs.
//!
//! Encryption to a public key uses an ephemeral X25519 agreement: the sender
//! generates a throwaway key, derives a symmetric key from the shared secret
//! with BLAKE3 in key-derivation mode, and seals the message with
//! XChaCha20-Poly1305. The output is
//!
//! ```text
//! ephemeral public key (32) || nonce (24) || ciphertext + tag
//! ```
//!
//! Only the holder of the private key can recompute the shared secret.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use x25519_dalek::{EphemeralSecret, PublicKey as X25519PublicKey, StaticSecret};
use zeroize::Zeroize;

use crate::encoded::{Algorithm, EncodedString};
use crate::error::{CryptoError, CryptoResult};
use crate::keyfile;
use crate::signing::key_id_for;

/// Context string for BLAKE3 key derivation.
const SEAL_CONTEXT: &str = "cardchain 2024 curve25519 sealed message v1";

const PUBLIC_KEY_LEN: usize = 32;
const NONCE_LEN: usize = 24;
const TAG_LEN: usize = 16;

/// An X25519 key pair used for public-key encryption.
#[derive(Clone)]
pub struct EncryptionPair {
    public: X25519PublicKey,
    secret: StaticSecret,
}

impl EncryptionPair {
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = X25519PublicKey::from(&secret);
        Self { public, secret }
    }

    /// Rebuilds a pair from both halves, checking that they belong together.
    pub fn from_encoded(public: &EncodedString, private: &EncodedString) -> CryptoResult<Self> {
        public.expect_algorithm(Algorithm::Curve25519)?;
        private.expect_algorithm(Algorithm::Curve25519)?;

        let mut secret_bytes = private.to_array::<32>()?;
        let secret = StaticSecret::from(secret_bytes);
        secret_bytes.zeroize();

        let derived = X25519PublicKey::from(&secret);
        if derived.as_bytes() != public.as_bytes() {
            return Err(CryptoError::MalformedData {
                reason: "public key does not match private key".to_string(),
            });
        }

        Ok(Self {
            public: derived,
            secret,
        })
    }

    pub fn public(&self) -> EncodedString {
        EncodedString::new(Algorithm::Curve25519, self.public.to_bytes().to_vec())
    }

    pub fn private(&self) -> EncodedString {
        EncodedString::new(Algorithm::Curve25519, self.secret.to_bytes().to_vec())
    }

    pub fn key_id(&self) -> String {
        key_id_for(self.public.as_bytes())
    }

    /// Encrypts `plaintext` to this pair's public key.
    pub fn encrypt(&self, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
        seal(&self.public, plaintext)
    }

    /// Decrypts data produced by [`EncryptionPair::encrypt`] or [`encrypt_to`].
    ///
    /// Fails with `DecryptionFailure` if the data is truncated, was encrypted
    /// to another key, or has been modified.
    pub fn decrypt(&self, sealed: &[u8]) -> CryptoResult<Vec<u8>> {
        if sealed.len() < PUBLIC_KEY_LEN + NONCE_LEN + TAG_LEN {
            return Err(CryptoError::DecryptionFailure {
                reason: format!("sealed data too short: {} bytes", sealed.len()),
            });
        }

        let (ephemeral, rest) = sealed.split_at(PUBLIC_KEY_LEN);
        let (nonce, ciphertext) = rest.split_at(NONCE_LEN);

        let mut ephemeral_bytes = [0u8; PUBLIC_KEY_LEN];
        ephemeral_bytes.copy_from_slice(ephemeral);
        let ephemeral = X25519PublicKey::from(ephemeral_bytes);

        let shared = self.secret.diffie_hellman(&ephemeral);
        let mut key = derive_key(shared.as_bytes(), ephemeral.as_bytes(), self.public.as_bytes());

        let result = XChaCha20Poly1305::new_from_slice(&key)
            .map_err(|e| CryptoError::DecryptionFailure {
                reason: e.to_string(),
            })
            .and_then(|cipher| {
                cipher
                    .decrypt(XNonce::from_slice(nonce), ciphertext)
                    .map_err(|_| CryptoError::DecryptionFailure {
                        reason: "authentication tag mismatch".to_string(),
                    })
            });
        key.zeroize();
        result
    }

    /// Writes `{"PublicKey": .., "PrivateKey": ..}` to `path`, replacing any
    /// existing file.
    pub fn save(&self, path: impl AsRef<Path>) -> CryptoResult<()> {
        let file = EncryptionPairFile {
            public_key: self.public(),
            private_key: self.private(),
        };
        keyfile::write_json(path.as_ref(), &file)
    }

    pub fn load(path: impl AsRef<Path>) -> CryptoResult<Self> {
        let file: EncryptionPairFile = keyfile::read_json(path.as_ref())?;
        Self::from_encoded(&file.public_key, &file.private_key).map_err(keyfile::malformed)
    }
}

/// Encrypts `plaintext` to an encoded `CURVE25519` public key.
///
/// This is how a sender who only knows an entry's `Encryption-Key` field
/// encrypts to its owner.
pub fn encrypt_to(public: &EncodedString, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
    public.expect_algorithm(Algorithm::Curve25519)?;
    let recipient = X25519PublicKey::from(public.to_array::<32>()?);
    seal(&recipient, plaintext)
}

fn seal(recipient: &X25519PublicKey, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
    let ephemeral_secret = EphemeralSecret::random_from_rng(OsRng);
    let ephemeral_public = X25519PublicKey::from(&ephemeral_secret);
    let shared = ephemeral_secret.diffie_hellman(recipient);

    let mut key = derive_key(shared.as_bytes(), ephemeral_public.as_bytes(), recipient.as_bytes());

    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let result = XChaCha20Poly1305::new_from_slice(&key)
        .map_err(|e| CryptoError::EncryptionFailure {
            reason: e.to_string(),
        })
        .and_then(|cipher| {
            cipher
                .encrypt(XNonce::from_slice(&nonce), plaintext)
                .map_err(|e| CryptoError::EncryptionFailure {
                    reason: e.to_string(),
                })
        });
    key.zeroize();
    let ciphertext = result?;

    let mut sealed = Vec::with_capacity(PUBLIC_KEY_LEN + NONCE_LEN + ciphertext.len());
    sealed.extend_from_slice(ephemeral_public.as_bytes());
    sealed.extend_from_slice(&nonce);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

fn derive_key(shared: &[u8], ephemeral_public: &[u8], recipient_public: &[u8]) -> [u8; 32] {
    let mut material = Vec::with_capacity(96);
    material.extend_from_slice(shared);
    material.extend_from_slice(ephemeral_public);
    material.extend_from_slice(recipient_public);
    let key = blake3::derive_key(SEAL_CONTEXT, &material);
    material.zeroize();
    key
}

impl PartialEq for EncryptionPair {
    fn eq(&self, other: &Self) -> bool {
        self.public == other.public && self.secret.to_bytes() == other.secret.to_bytes()
    }
}

impl Eq for EncryptionPair {}

impl fmt::Debug for EncryptionPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionPair")
            .field("key_id", &self.key_id())
            .finish_non_exhaustive()
    }
}

#[derive(Serialize, Deserialize)]
struct EncryptionPairFile {
    #[serde(rename = "PublicKey")]
    public_key: EncodedString,
    #[serde(rename = "PrivateKey")]
    private_key: EncodedString,
}
