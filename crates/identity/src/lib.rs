//! Identity keycards for cardchain.
//!
//! A keycard is the public identity record of an organization or a user: a
//! chain of signed, hashed entries in which every entry after the first is
//! vouched for by the key of the entry before it. Anyone holding the card can
//! check the whole history without trusting the server that delivered it.
//!
//! # Core Concepts
//!
//! - **Entry**: one record of fields, signatures and a sealing hash
//! - **Keycard**: the ordered chain of entries for one subject
//! - **Chaining**: rotating keys by appending a custody-signed entry
//! - **Organization vouching**: user entries carry their organization's signature
//!
//! # Security Model
//!
//! - Verification stops at the first broken entry; a partly valid chain is
//!   never reported as valid
//! - Missing signatures and wrong signatures are distinct failures
//! - Changing any field of an entry discards its signatures and hash
//!
//! # Integration Points
//!
//! - [`EntryStore`]: append-only persistence keyed by owner and index
//! - [`EntryTransport`]: submission of finished entries to a server

pub mod entry;
pub mod error;
pub mod keycard;
pub mod schema;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod store;
pub mod transport;

pub use entry::{Entry, EntryState};
pub use error::{ChainCheck, KeycardError, KeycardResult};
pub use keycard::{ChainOutcome, Keycard, KeycardPolicy, RotatedKeys};
pub use schema::{EntryType, FieldKind, FieldSpec, SignatureSlot};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteEntryStore;
pub use store::{EntryStore, MemoryEntryStore, StoredEntry};
pub use transport::{submit_entry, EntryTransport, STATUS_OK};
