//! JSON persistence for key material.
//!
//! Each key type owns its file layout (see `SigningPair::save` and friends);
//! this module only holds the shared open/write/parse plumbing. Files are
//! opened, written or read in full, and closed before returning.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::debug;

use crate::error::{CryptoError, CryptoResult};

/// Serializes `value` as pretty JSON, replacing any existing file.
pub(crate) fn write_json<T: Serialize>(path: &Path, value: &T) -> CryptoResult<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value).map_err(|e| {
        if e.is_io() {
            CryptoError::Io(e.into())
        } else {
            CryptoError::MalformedData {
                reason: e.to_string(),
            }
        }
    })?;
    writer.write_all(b"\n")?;
    writer.flush()?;

    debug!(path = %path.display(), "Key file written");
    Ok(())
}

/// Reads and parses a key file.
///
/// Unreadable files surface as `Io`; missing fields or values that are not
/// encoded strings surface as `MalformedData`.
pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> CryptoResult<T> {
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|e| CryptoError::MalformedData {
        reason: format!("{}: {}", path.display(), e),
    })
}

/// Reclassifies key construction errors hit while loading a file.
pub(crate) fn malformed(error: CryptoError) -> CryptoError {
    match error {
        CryptoError::Io(e) => CryptoError::Io(e),
        CryptoError::MalformedData { reason } => CryptoError::MalformedData { reason },
        other => CryptoError::MalformedData {
            reason: other.to_string(),
        },
    }
}
