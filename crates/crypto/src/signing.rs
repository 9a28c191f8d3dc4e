//! Ed25519 signing pairs and verification keys.
//!
//! # Security Model
//!
//! - Signing keys are generated from the operating system's CSPRNG
//! - Signatures are deterministic for a given key and message
//! - Verification fails closed: a malformed signature and a wrong signature
//!   produce the same `false` result
//! - Private key bytes are zeroized once copied into the dalek key

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use zeroize::Zeroize;

use crate::encoded::{Algorithm, EncodedString};
use crate::error::{CryptoError, CryptoResult};
use crate::keyfile;

/// Generates a stable short identifier from public key bytes.
pub(crate) fn key_id_for(public_key: &[u8]) -> String {
    let hash = blake3::hash(public_key);
    // First 16 bytes as hex
    hex::encode(&hash.as_bytes()[..16])
}

/// Public half of an Ed25519 pair, used to check signatures.
#[derive(Clone, PartialEq, Eq)]
pub struct VerificationKey {
    key: VerifyingKey,
}

impl VerificationKey {
    /// Parses an `ED25519:` encoded verification key.
    pub fn from_encoded(encoded: &EncodedString) -> CryptoResult<Self> {
        encoded.expect_algorithm(Algorithm::Ed25519)?;
        let bytes = encoded.to_array::<32>()?;
        let key = VerifyingKey::from_bytes(&bytes).map_err(|e| CryptoError::InvalidKey {
            reason: e.to_string(),
        })?;
        Ok(Self { key })
    }

    pub fn to_encoded(&self) -> EncodedString {
        EncodedString::new(Algorithm::Ed25519, self.key.to_bytes().to_vec())
    }

    pub fn key_id(&self) -> String {
        key_id_for(self.key.as_bytes())
    }

    /// Checks `signature` over exactly `message`.
    ///
    /// Returns `false` for a wrong signature, a signature with the wrong tag,
    /// or one whose bytes are not a valid Ed25519 signature.
    pub fn verify(&self, message: &[u8], signature: &EncodedString) -> bool {
        if signature.algorithm() != &Algorithm::Ed25519 {
            return false;
        }
        let Ok(signature) = Signature::from_slice(signature.as_bytes()) else {
            return false;
        };
        self.key.verify(message, &signature).is_ok()
    }
}

impl fmt::Debug for VerificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerificationKey")
            .field("key_id", &self.key_id())
            .finish()
    }
}

/// An Ed25519 signing pair.
///
/// Never mutated; rotating a key means generating a new pair.
#[derive(Clone)]
pub struct SigningPair {
    signing_key: SigningKey,
}

impl SigningPair {
    /// Generates a fresh pair from the OS random source.
    pub fn generate() -> Self {
        let mut secret_key_bytes = [0u8; 32];
        OsRng.fill_bytes(&mut secret_key_bytes);
        let signing_key = SigningKey::from_bytes(&secret_key_bytes);
        secret_key_bytes.zeroize();

        Self { signing_key }
    }

    /// Rebuilds a pair from its encoded private key.
    ///
    /// Fails with `InvalidKeyUsage` if the key is not tagged `ED25519`.
    pub fn from_private(private: &EncodedString) -> CryptoResult<Self> {
        private.expect_algorithm(Algorithm::Ed25519)?;
        let mut key_array = private.to_array::<32>()?;
        let signing_key = SigningKey::from_bytes(&key_array);
        key_array.zeroize();

        Ok(Self { signing_key })
    }

    /// Rebuilds a pair from both halves, checking that they belong together.
    pub fn from_encoded(public: &EncodedString, private: &EncodedString) -> CryptoResult<Self> {
        let pair = Self::from_private(private)?;
        let expected = VerificationKey::from_encoded(public)?;
        if pair.verification_key() != expected {
            return Err(CryptoError::MalformedData {
                reason: "verification key does not match signing key".to_string(),
            });
        }
        Ok(pair)
    }

    pub fn verification_key(&self) -> VerificationKey {
        VerificationKey {
            key: self.signing_key.verifying_key(),
        }
    }

    /// Encoded public (verification) key.
    pub fn public(&self) -> EncodedString {
        self.verification_key().to_encoded()
    }

    /// Encoded private (signing) key.
    pub fn private(&self) -> EncodedString {
        EncodedString::new(Algorithm::Ed25519, self.signing_key.to_bytes().to_vec())
    }

    pub fn key_id(&self) -> String {
        self.verification_key().key_id()
    }

    /// Signs exactly `message`.
    pub fn sign(&self, message: &[u8]) -> EncodedString {
        let signature = self.signing_key.sign(message);
        EncodedString::new(Algorithm::Ed25519, signature.to_bytes().to_vec())
    }

    pub fn verify(&self, message: &[u8], signature: &EncodedString) -> bool {
        self.verification_key().verify(message, signature)
    }

    /// Writes `{"VerificationKey": .., "SigningKey": ..}` to `path`, replacing
    /// any existing file.
    pub fn save(&self, path: impl AsRef<Path>) -> CryptoResult<()> {
        let file = SigningPairFile {
            verification_key: self.public(),
            signing_key: self.private(),
        };
        keyfile::write_json(path.as_ref(), &file)
    }

    pub fn load(path: impl AsRef<Path>) -> CryptoResult<Self> {
        let file: SigningPairFile = keyfile::read_json(path.as_ref())?;
        Self::from_encoded(&file.verification_key, &file.signing_key).map_err(keyfile::malformed)
    }
}

impl PartialEq for SigningPair {
    fn eq(&self, other: &Self) -> bool {
        self.signing_key.to_bytes() == other.signing_key.to_bytes()
    }
}

impl Eq for SigningPair {}

impl fmt::Debug for SigningPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningPair")
            .field("key_id", &self.key_id())
            .finish_non_exhaustive()
    }
}

#[derive(Serialize, Deserialize)]
struct SigningPairFile {
    #[serde(rename = "VerificationKey")]
    verification_key: EncodedString,
    #[serde(rename = "SigningKey")]
    signing_key: EncodedString,
}
