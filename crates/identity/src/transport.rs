//! Sending entries to a keycard server.
//!
//! Framing and connection handling belong to the transport; this module only
//! decides what may be sent and how a reply status is interpreted.

use tracing::{debug, warn};

use crate::entry::Entry;
use crate::error::{KeycardError, KeycardResult};

pub const STATUS_OK: u16 = 200;

pub trait EntryTransport {
    /// Sends one serialized entry and returns the server's status code.
    fn send_entry(&mut self, entry: &[u8]) -> KeycardResult<u16>;
}

/// Sends a complete entry. Incomplete entries are never sent, and any
/// status other than 200 is a `Transport` error.
pub fn submit_entry<T: EntryTransport + ?Sized>(transport: &mut T, entry: &Entry) -> KeycardResult<()> {
    entry.is_compliant()?;

    let status = transport.send_entry(&entry.to_bytes())?;
    if status != STATUS_OK {
        warn!(status, index = entry.index().unwrap_or(0), "Entry rejected by server");
        return Err(KeycardError::Transport { status });
    }

    debug!(index = entry.index().unwrap_or(0), "Entry submitted");
    Ok(())
}
