//! Error types for keycard operations.
//!
//! Signature and chain failures are ordinary, expected outcomes. They are
//! returned as distinct variants so a caller can tell "not signed" apart from
//! "signed but wrong", and can report which entry broke a chain.

use cardchain_crypto::CryptoError;
use std::fmt;
use thiserror::Error;

use crate::schema::SignatureSlot;

/// Which step of chain verification rejected an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChainCheck {
    /// Required fields, signatures or hash missing or malformed
    Compliance,
    /// `Index` does not follow the previous entry
    Index,
    /// `Previous-Hash` does not equal the previous entry's `Hash`
    PreviousHash,
    CustodySignature,
    SelfSignature,
    /// No key in the organization's card verifies the entry
    OrganizationSignature,
    /// The stored `Hash` does not match the entry's content
    Hash,
}

impl fmt::Display for ChainCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChainCheck::Compliance => "compliance",
            ChainCheck::Index => "index",
            ChainCheck::PreviousHash => "previous hash",
            ChainCheck::CustodySignature => "custody signature",
            ChainCheck::SelfSignature => "self signature",
            ChainCheck::OrganizationSignature => "organization signature",
            ChainCheck::Hash => "hash",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum KeycardError {
    /// A caller-supplied name or value was not acceptable
    #[error("Bad value for {parameter}: {reason}")]
    BadParameterValue { parameter: String, reason: String },

    /// A required field is missing or fails its syntax check
    #[error("Compliance failure on {field}: {reason}")]
    ComplianceFailure { field: String, reason: String },

    /// A key of the wrong algorithm, or not the key the entry declares
    #[error("Invalid key usage: {reason}")]
    InvalidKeyUsage { reason: String },

    #[error("Signature missing: {slot}")]
    SignatureMissing { slot: SignatureSlot },

    /// Signature present but does not verify
    #[error("Invalid signature: {slot}")]
    InvalidSignature { slot: SignatureSlot },

    #[error("Entry hash does not match its content")]
    HashMismatch,

    /// An entry does not follow the card's last entry
    #[error("Chain link mismatch at index {index}: expected {expected}, got {actual}")]
    ChainLinkMismatch {
        index: u32,
        expected: String,
        actual: String,
    },

    /// `index` is the entry's 0-based position in the card
    #[error("Chain verification failed at position {index}: {check}")]
    ChainVerificationFailure { index: usize, check: ChainCheck },

    /// Operation not allowed in the entry's current state
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Keycard has no entries")]
    EmptyKeycard,

    /// Entry or keycard text could not be parsed
    #[error("Parse error on line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error("Entry {index} already stored for {owner}")]
    DuplicateEntry { owner: String, index: u32 },

    #[error("Entry {index} not found for {owner}")]
    EntryNotFound { owner: String, index: u32 },

    #[error("Transport rejected entry with status {status}")]
    Transport { status: u16 },

    #[error("Cryptographic error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "sqlite")]
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Result type for keycard operations.
pub type KeycardResult<T> = Result<T, KeycardError>;
