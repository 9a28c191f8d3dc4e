//! Hash algorithms used to seal keycard entries.
//!
//! BLAKE2B-256 is the default. BLAKE3-256, SHA-256 and SHA3-256 are accepted
//! so that entries sealed by other implementations can still be verified; the
//! tag on a stored hash always says which one to recompute with.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use sha2::Sha256;
use sha3::Sha3_256;
use std::fmt;
use std::str::FromStr;

use crate::encoded::{Algorithm, EncodedString};
use crate::error::{CryptoError, CryptoResult};

type Blake2b256 = Blake2b<U32>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HashAlgorithm {
    #[default]
    Blake2b256,
    Blake3_256,
    Sha256,
    Sha3_256,
}

impl HashAlgorithm {
    pub fn algorithm(&self) -> Algorithm {
        match self {
            HashAlgorithm::Blake2b256 => Algorithm::Blake2b256,
            HashAlgorithm::Blake3_256 => Algorithm::Blake3_256,
            HashAlgorithm::Sha256 => Algorithm::Sha256,
            HashAlgorithm::Sha3_256 => Algorithm::Sha3_256,
        }
    }

    /// Raw 32-byte digest of `data`.
    pub fn digest_bytes(&self, data: &[u8]) -> [u8; 32] {
        match self {
            HashAlgorithm::Blake2b256 => Blake2b256::digest(data).into(),
            HashAlgorithm::Blake3_256 => *blake3::hash(data).as_bytes(),
            HashAlgorithm::Sha256 => Sha256::digest(data).into(),
            HashAlgorithm::Sha3_256 => Sha3_256::digest(data).into(),
        }
    }

    /// Digest of `data` tagged with this algorithm.
    pub fn digest(&self, data: &[u8]) -> EncodedString {
        EncodedString::new(self.algorithm(), self.digest_bytes(data).to_vec())
    }
}

impl TryFrom<&Algorithm> for HashAlgorithm {
    type Error = CryptoError;

    fn try_from(algorithm: &Algorithm) -> Result<Self, Self::Error> {
        match algorithm {
            Algorithm::Blake2b256 => Ok(HashAlgorithm::Blake2b256),
            Algorithm::Blake3_256 => Ok(HashAlgorithm::Blake3_256),
            Algorithm::Sha256 => Ok(HashAlgorithm::Sha256),
            Algorithm::Sha3_256 => Ok(HashAlgorithm::Sha3_256),
            other => Err(CryptoError::UnsupportedAlgorithm {
                algorithm: other.to_string(),
            }),
        }
    }
}

impl FromStr for HashAlgorithm {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BLAKE2B-256" => Ok(HashAlgorithm::Blake2b256),
            "BLAKE3-256" => Ok(HashAlgorithm::Blake3_256),
            "SHA-256" => Ok(HashAlgorithm::Sha256),
            "SHA3-256" => Ok(HashAlgorithm::Sha3_256),
            other => Err(CryptoError::UnsupportedAlgorithm {
                algorithm: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.algorithm().as_str())
    }
}

/// Recomputes `expected` over `data` using the algorithm it is tagged with.
pub fn hash_matches(expected: &EncodedString, data: &[u8]) -> CryptoResult<bool> {
    let algorithm = HashAlgorithm::try_from(expected.algorithm())?;
    Ok(algorithm.digest(data) == *expected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_deterministic() {
        for algorithm in [
            HashAlgorithm::Blake2b256,
            HashAlgorithm::Blake3_256,
            HashAlgorithm::Sha256,
            HashAlgorithm::Sha3_256,
        ] {
            let h1 = algorithm.digest(b"Type:Organization\r\n");
            let h2 = algorithm.digest(b"Type:Organization\r\n");
            assert_eq!(h1, h2);
            assert_eq!(h1.as_bytes().len(), 32);
            assert_eq!(h1.algorithm(), &algorithm.algorithm());
        }
    }

    #[test]
    fn test_algorithms_differ() {
        let a = HashAlgorithm::Blake2b256.digest_bytes(b"data");
        let b = HashAlgorithm::Blake3_256.digest_bytes(b"data");
        let c = HashAlgorithm::Sha256.digest_bytes(b"data");
        assert_ne!(a, b);
        assert_ne!(b, c);
        assert_ne!(c, HashAlgorithm::Sha3_256.digest_bytes(b"data"));
    }

    #[test]
    fn test_sha3_256_known_vector() {
        let digest = HashAlgorithm::Sha3_256.digest_bytes(b"abc");
        assert_eq!(
            hex::encode(digest),
            "3a985da74fe225b2045c172d6bd390bd855f086e3e9d525b46bfe24511431532"
        );
    }

    #[test]
    fn test_sha256_known_vector() {
        let digest = HashAlgorithm::Sha256.digest_bytes(b"abc");
        assert_eq!(
            hex::encode(digest),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_hash_matches() {
        let hash = HashAlgorithm::Blake3_256.digest(b"entry");
        assert!(hash_matches(&hash, b"entry").unwrap());
        assert!(!hash_matches(&hash, b"entrY").unwrap());

        let not_a_hash = EncodedString::new(Algorithm::Ed25519, vec![0u8; 32]);
        assert!(hash_matches(&not_a_hash, b"entry").is_err());
    }

    #[test]
    fn test_from_str() {
        assert_eq!(
            "BLAKE2B-256".parse::<HashAlgorithm>().unwrap(),
            HashAlgorithm::Blake2b256
        );
        assert_eq!(
            "SHA3-256".parse::<HashAlgorithm>().unwrap(),
            HashAlgorithm::Sha3_256
        );
        assert_eq!(
            HashAlgorithm::try_from(&Algorithm::Sha3_256).unwrap(),
            HashAlgorithm::Sha3_256
        );
        assert!("MD5".parse::<HashAlgorithm>().is_err());
        assert_eq!(HashAlgorithm::default().to_string(), "BLAKE2B-256");
    }
}
