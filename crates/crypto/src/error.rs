//! Error types for cardchain cryptographic operations.

use thiserror::Error;

use crate::encoded::Algorithm;

/// Errors that can occur in key, hash and encoded-string operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The text is not a well-formed `ALGORITHM:payload` string
    #[error("Invalid encoded string: {reason}")]
    InvalidFormat { reason: String },

    /// The algorithm tag is known but not supported for this operation
    #[error("Unsupported algorithm: {algorithm}")]
    UnsupportedAlgorithm { algorithm: String },

    /// A key of the wrong algorithm or purpose was supplied
    #[error("Invalid key usage: expected {expected}, got {actual}")]
    InvalidKeyUsage { expected: Algorithm, actual: Algorithm },

    /// Key bytes have the right tag but are not a usable key
    #[error("Invalid key material: {reason}")]
    InvalidKey { reason: String },

    /// Persisted key data is missing fields or cannot be parsed
    #[error("Malformed key data: {reason}")]
    MalformedData { reason: String },

    #[error("Encryption failed: {reason}")]
    EncryptionFailure { reason: String },

    /// Authenticated decryption rejected the ciphertext
    #[error("Decryption failed: {reason}")]
    DecryptionFailure { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for cryptographic operations.
pub type CryptoResult<T> = Result<T, CryptoError>;
