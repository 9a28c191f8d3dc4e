//! Encoded cryptographic strings.
//!
//! Every key, hash and signature in a keycard travels as text of the form
//! `ALGORITHM:payload`, where the payload is the Base64 encoding of the raw
//! bytes. [`EncodedString`] holds the decoded form, so two strings compare
//! equal whenever they name the same algorithm and carry the same bytes, no
//! matter how the payload text was laid out.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::{CryptoError, CryptoResult};

/// Algorithm tag carried in front of an encoded payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Algorithm {
    Ed25519,
    Curve25519,
    XChaCha20,
    XSalsa20,
    Blake2b256,
    Blake3_256,
    Sha256,
    Sha3_256,
    /// Any tag this crate does not know; carried through untouched
    Other(String),
}

impl Algorithm {
    pub fn as_str(&self) -> &str {
        match self {
            Algorithm::Ed25519 => "ED25519",
            Algorithm::Curve25519 => "CURVE25519",
            Algorithm::XChaCha20 => "XCHACHA20",
            Algorithm::XSalsa20 => "XSALSA20",
            Algorithm::Blake2b256 => "BLAKE2B-256",
            Algorithm::Blake3_256 => "BLAKE3-256",
            Algorithm::Sha256 => "SHA-256",
            Algorithm::Sha3_256 => "SHA3-256",
            Algorithm::Other(tag) => tag,
        }
    }

    fn from_tag(tag: &str) -> Self {
        match tag {
            "ED25519" => Algorithm::Ed25519,
            "CURVE25519" => Algorithm::Curve25519,
            "XCHACHA20" => Algorithm::XChaCha20,
            "XSALSA20" => Algorithm::XSalsa20,
            "BLAKE2B-256" => Algorithm::Blake2b256,
            "BLAKE3-256" => Algorithm::Blake3_256,
            "SHA-256" => Algorithm::Sha256,
            "SHA3-256" => Algorithm::Sha3_256,
            other => Algorithm::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tagged byte payload, e.g. `ED25519:<base64>`.
///
/// Immutable once constructed.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct EncodedString {
    algorithm: Algorithm,
    bytes: Vec<u8>,
}

impl EncodedString {
    /// Wraps raw bytes under an algorithm tag.
    pub fn new(algorithm: Algorithm, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            algorithm,
            bytes: bytes.into(),
        }
    }

    /// Parses `ALGORITHM:payload`.
    ///
    /// Fails with [`CryptoError::InvalidFormat`] when the separator is
    /// missing, the tag is empty, or the payload is empty or not valid Base64.
    /// Whitespace inside the payload is ignored.
    pub fn parse(text: &str) -> CryptoResult<Self> {
        let (tag, payload) = text.split_once(':').ok_or_else(|| CryptoError::InvalidFormat {
            reason: "missing ':' separator".to_string(),
        })?;

        let tag = tag.trim();
        if tag.is_empty() {
            return Err(CryptoError::InvalidFormat {
                reason: "empty algorithm tag".to_string(),
            });
        }

        let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
        if compact.is_empty() {
            return Err(CryptoError::InvalidFormat {
                reason: format!("empty payload for {}", tag),
            });
        }

        let bytes = STANDARD
            .decode(compact.as_bytes())
            .map_err(|e| CryptoError::InvalidFormat {
                reason: format!("payload is not valid Base64: {}", e),
            })?;

        Ok(Self {
            algorithm: Algorithm::from_tag(tag),
            bytes,
        })
    }

    pub fn algorithm(&self) -> &Algorithm {
        &self.algorithm
    }

    /// Decoded payload bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Canonical payload text (Base64, no whitespace).
    pub fn payload(&self) -> String {
        STANDARD.encode(&self.bytes)
    }

    /// Fails with `InvalidKeyUsage` unless tagged with `expected`.
    pub fn expect_algorithm(&self, expected: Algorithm) -> CryptoResult<()> {
        if self.algorithm != expected {
            return Err(CryptoError::InvalidKeyUsage {
                expected,
                actual: self.algorithm.clone(),
            });
        }
        Ok(())
    }

    /// Payload as a fixed-size array, for key material.
    pub(crate) fn to_array<const N: usize>(&self) -> CryptoResult<[u8; N]> {
        self.bytes
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::InvalidKey {
                reason: format!(
                    "{} payload is {} bytes (expected {})",
                    self.algorithm,
                    self.bytes.len(),
                    N
                ),
            })
    }
}

impl fmt::Display for EncodedString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.payload())
    }
}

impl fmt::Debug for EncodedString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncodedString({})", self)
    }
}

impl FromStr for EncodedString {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<&str> for EncodedString {
    type Error = CryptoError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl Serialize for EncodedString {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for EncodedString {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(serde::de::Error::custom)
    }
}
