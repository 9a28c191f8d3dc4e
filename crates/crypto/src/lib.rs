//! Cryptographic primitives for cardchain keycards.
//!
//! This crate provides the key material and encoding layer that keycard
//! entries are built on. Every key, hash and signature crosses this crate's
//! boundary as an [`EncodedString`] (`ALGORITHM:payload`), so callers never
//! handle raw key bytes.
//!
//! # Core Capabilities
//!
//! - **Encoded Strings**: parse, compare and render `ALGORITHM:payload` text
//! - **Signing Pairs**: Ed25519 generation, signing and fail-closed verification
//! - **Encryption Pairs**: X25519 sealed-box style public-key encryption
//! - **Secret Keys**: XChaCha20-Poly1305 symmetric encryption
//! - **Hashing**: BLAKE2B-256 (default), BLAKE3-256 and SHA-256
//! - **Key Files**: JSON persistence for all three key types
//!
//! # Security Principles
//!
//! - Key bytes come from the operating system's CSPRNG
//! - Decryption never returns unauthenticated plaintext
//! - Private material is zeroized and never appears in `Debug` output
//! - Key usage is enforced by algorithm tag: an encryption key cannot be
//!   used where a verification key is expected

pub mod encoded;
pub mod encryption;
pub mod error;
pub mod hash;
mod keyfile;
pub mod secret;
pub mod signing;

pub use encoded::{Algorithm, EncodedString};
pub use encryption::{encrypt_to, EncryptionPair};
pub use error::{CryptoError, CryptoResult};
pub use hash::{hash_matches, HashAlgorithm};
pub use secret::SecretKey;
pub use signing::{SigningPair, VerificationKey};
