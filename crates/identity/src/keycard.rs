//! Keycards: ordered chains of entries for one organization or user.
//!
//! Each entry after the root carries the previous entry's hash and a custody
//! signature made with the previous entry's key, so a card can only be
//! extended by whoever held the last key.

use cardchain_core::KeycardConfig;
use cardchain_crypto::{Algorithm, EncodedString, EncryptionPair, HashAlgorithm, SigningPair};
use chrono::Utc;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::entry::Entry;
use crate::error::{ChainCheck, KeycardError, KeycardResult};
use crate::schema::{EntryType, SignatureSlot};
use crate::store::EntryStore;

const BEGIN_ENTRY: &str = "----- BEGIN ENTRY -----";
const END_ENTRY: &str = "----- END ENTRY -----";

/// Defaults applied when a card creates or rotates entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeycardPolicy {
    pub hash_algorithm: HashAlgorithm,
    pub org_expiration_days: u32,
    pub user_expiration_days: u32,
    pub org_time_to_live: u32,
    pub user_time_to_live: u32,
}

impl KeycardPolicy {
    pub fn from_config(config: &KeycardConfig) -> KeycardResult<Self> {
        Ok(Self {
            hash_algorithm: config.hash_algorithm.parse()?,
            org_expiration_days: config.org_expiration_days,
            user_expiration_days: config.user_expiration_days,
            org_time_to_live: config.org_time_to_live,
            user_time_to_live: config.user_time_to_live,
        })
    }

    pub fn expiration_days(&self, entry_type: EntryType) -> u32 {
        match entry_type {
            EntryType::Organization => self.org_expiration_days,
            EntryType::User => self.user_expiration_days,
        }
    }

    pub fn time_to_live(&self, entry_type: EntryType) -> u32 {
        match entry_type {
            EntryType::Organization => self.org_time_to_live,
            EntryType::User => self.user_time_to_live,
        }
    }

    /// Writes `Expires` and `Time-To-Live` for a new entry.
    pub fn apply(&self, entry: &mut Entry) -> KeycardResult<()> {
        let entry_type = entry.entry_type();
        entry.set_expiration(Some(self.expiration_days(entry_type)))?;
        entry.set_time_to_live(self.time_to_live(entry_type))
    }
}

impl Default for KeycardPolicy {
    fn default() -> Self {
        let config = KeycardConfig::default();
        Self {
            hash_algorithm: HashAlgorithm::default(),
            org_expiration_days: config.org_expiration_days,
            user_expiration_days: config.user_expiration_days,
            org_time_to_live: config.org_time_to_live,
            user_time_to_live: config.user_time_to_live,
        }
    }
}

/// Key material generated by [`Keycard::chain`].
///
/// The caller must persist these; the card only keeps the public halves.
#[derive(Debug, Clone)]
pub struct RotatedKeys {
    /// Pair behind the new entry's self verification key
    pub signing: SigningPair,
    /// Organizations only: escrowed pair behind `Secondary-Verification-Key`
    pub secondary_signing: Option<SigningPair>,
    /// Organizations only: `Encryption-Key`
    pub encryption: Option<EncryptionPair>,
    pub contact_request_encryption: Option<EncryptionPair>,
    pub public_encryption: Option<EncryptionPair>,
    pub alternate_encryption: Option<EncryptionPair>,
}

impl RotatedKeys {
    fn new(signing: SigningPair) -> Self {
        Self {
            signing,
            secondary_signing: None,
            encryption: None,
            contact_request_encryption: None,
            public_encryption: None,
            alternate_encryption: None,
        }
    }
}

/// A new entry produced by [`Keycard::chain`], not yet appended.
#[derive(Debug, Clone)]
pub struct ChainOutcome {
    pub entry: Entry,
    pub keys: RotatedKeys,
}

impl ChainOutcome {
    /// Completes a chained user entry once the organization has vouched for
    /// it: organization signature, user signature with the new key, hash.
    pub fn finish_user_entry(
        &mut self,
        org_signing_key: &EncodedString,
        algorithm: HashAlgorithm,
    ) -> KeycardResult<()> {
        if self.entry.entry_type() != EntryType::User {
            return Err(KeycardError::InvalidOperation(
                "only user entries are finished by their organization".to_string(),
            ));
        }
        self.entry
            .sign(org_signing_key, SignatureSlot::Organization)?;
        self.entry
            .sign(&self.keys.signing.private(), SignatureSlot::User)?;
        self.entry.generate_hash(algorithm)
    }
}

/// An ordered chain of entries, oldest first.
///
/// Not synchronized; a card belongs to one chaining workflow at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keycard {
    subject_type: EntryType,
    pub(crate) entries: Vec<Entry>,
    policy: KeycardPolicy,
}

impl Keycard {
    pub fn new(subject_type: EntryType) -> Self {
        Self {
            subject_type,
            entries: Vec::new(),
            policy: KeycardPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: KeycardPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Builds a card from entries as they are. Nothing is verified.
    pub fn from_entries(subject_type: EntryType, entries: Vec<Entry>) -> KeycardResult<Self> {
        if let Some(other) = entries.iter().find(|e| e.entry_type() != subject_type) {
            return Err(KeycardError::BadParameterValue {
                parameter: "Type".to_string(),
                reason: format!(
                    "{} entry in a {} keycard",
                    other.entry_type(),
                    subject_type
                ),
            });
        }
        Ok(Self {
            subject_type,
            entries,
            policy: KeycardPolicy::default(),
        })
    }

    pub fn subject_type(&self) -> EntryType {
        self.subject_type
    }

    pub fn policy(&self) -> &KeycardPolicy {
        &self.policy
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, position: usize) -> Option<&Entry> {
        self.entries.get(position)
    }

    pub fn last(&self) -> Option<&Entry> {
        self.entries.last()
    }

    /// Appends a complete entry that directly follows the current last one.
    ///
    /// The first entry must have `Index` 1. Later entries must pass
    /// [`Entry::verify_chain`] against the last entry.
    pub fn append(&mut self, entry: Entry) -> KeycardResult<()> {
        if entry.entry_type() != self.subject_type {
            return Err(KeycardError::BadParameterValue {
                parameter: "Type".to_string(),
                reason: format!(
                    "cannot append a {} entry to a {} keycard",
                    entry.entry_type(),
                    self.subject_type
                ),
            });
        }

        let linked = entry.is_compliant().and_then(|_| match self.entries.last() {
            Some(last) => entry.verify_chain(last),
            None if entry.index() == Some(1) => Ok(()),
            None => Err(KeycardError::ChainLinkMismatch {
                index: entry.index().unwrap_or(0),
                expected: "index 1".to_string(),
                actual: format!("index {}", entry.index().unwrap_or(0)),
            }),
        });
        if let Err(e) = linked {
            warn!(
                entry_type = %self.subject_type,
                position = self.entries.len(),
                error = %e,
                "Rejected keycard entry"
            );
            return Err(e);
        }

        debug!(
            entry_type = %self.subject_type,
            index = entry.index().unwrap_or(0),
            "Entry appended"
        );
        self.entries.push(entry);
        Ok(())
    }

    /// Creates the next entry in the chain without appending it.
    ///
    /// `signing_key` must be the private key behind the last entry's self
    /// verification key; it makes the custody signature. A fresh primary
    /// signing pair is always generated. With `rotate_all`, every encryption
    /// key is replaced too, and organizations get a new escrowed secondary
    /// signing pair.
    ///
    /// Organization entries come back fully signed and hashed. User entries
    /// come back with only the custody signature, ready for
    /// [`ChainOutcome::finish_user_entry`].
    pub fn chain(&self, signing_key: &EncodedString, rotate_all: bool) -> KeycardResult<ChainOutcome> {
        let last = self.entries.last().ok_or(KeycardError::EmptyKeycard)?;

        if signing_key.algorithm() != &Algorithm::Ed25519 {
            return Err(KeycardError::InvalidKeyUsage {
                reason: format!("chaining needs an ED25519 key, got {}", signing_key.algorithm()),
            });
        }
        let current = SigningPair::from_private(signing_key)?;
        if current.public() != last.self_verification_key()? {
            return Err(KeycardError::InvalidKeyUsage {
                reason: format!(
                    "signing key does not match {} of the last entry",
                    self.subject_type.self_key_field()
                ),
            });
        }

        let last_index = last.index().ok_or_else(|| KeycardError::ComplianceFailure {
            field: "Index".to_string(),
            reason: "missing on last entry".to_string(),
        })?;
        let index = last_index.checked_add(1).ok_or_else(|| {
            KeycardError::InvalidOperation("keycard index overflow".to_string())
        })?;
        let last_hash = last.hash().cloned().ok_or_else(|| KeycardError::ComplianceFailure {
            field: "Hash".to_string(),
            reason: "missing on last entry".to_string(),
        })?;

        let mut entry = Entry::new(self.subject_type);
        entry.fields = last.fields.clone();
        entry.set_field("Index", index.to_string())?;
        entry.set_timestamp(Utc::now());
        entry.set_prev_hash(last_hash);

        let mut keys = RotatedKeys::new(SigningPair::generate());
        entry.set_field(
            self.subject_type.self_key_field(),
            keys.signing.public().to_string(),
        )?;

        if rotate_all {
            match self.subject_type {
                EntryType::Organization => {
                    let encryption = EncryptionPair::generate();
                    entry.set_field("Encryption-Key", encryption.public().to_string())?;
                    keys.encryption = Some(encryption);

                    let secondary = SigningPair::generate();
                    entry.set_field("Secondary-Verification-Key", secondary.public().to_string())?;
                    keys.secondary_signing = Some(secondary);
                }
                EntryType::User => {
                    let contact = EncryptionPair::generate();
                    entry.set_field("Contact-Request-Encryption-Key", contact.public().to_string())?;
                    keys.contact_request_encryption = Some(contact);

                    let public = EncryptionPair::generate();
                    entry.set_field("Public-Encryption-Key", public.public().to_string())?;
                    keys.public_encryption = Some(public);

                    if entry.field("Alternate-Encryption-Key").is_some() {
                        let alternate = EncryptionPair::generate();
                        entry.set_field("Alternate-Encryption-Key", alternate.public().to_string())?;
                        keys.alternate_encryption = Some(alternate);
                    }
                }
            }
        }

        if entry.field("Expires").is_some() {
            entry.set_expiration(Some(self.policy.expiration_days(self.subject_type)))?;
        }

        entry.sign(signing_key, SignatureSlot::Custody)?;
        if self.subject_type == EntryType::Organization {
            entry.sign(&keys.signing.private(), SignatureSlot::Organization)?;
            entry.generate_hash(self.policy.hash_algorithm)?;
        }

        info!(
            entry_type = %self.subject_type,
            index,
            rotate_all,
            old_key_id = %current.key_id(),
            new_key_id = %keys.signing.key_id(),
            "Keycard chained"
        );
        Ok(ChainOutcome { entry, keys })
    }

    /// Verifies the whole chain, stopping at the first broken entry.
    ///
    /// For each entry, in order: index and `Previous-Hash` link, custody
    /// signature against the previous entry's key, self signature, hash,
    /// then compliance. The root entry skips the custody checks.
    pub fn verify(&self) -> KeycardResult<()> {
        if self.entries.is_empty() {
            return Err(KeycardError::EmptyKeycard);
        }

        for (position, entry) in self.entries.iter().enumerate() {
            if let Err((check, reason)) = self.verify_entry(position, entry) {
                warn!(
                    entry_type = %self.subject_type,
                    position,
                    check = %check,
                    reason = %reason,
                    "Keycard verification failed"
                );
                return Err(KeycardError::ChainVerificationFailure {
                    index: position,
                    check,
                });
            }
        }
        Ok(())
    }

    fn verify_entry(&self, position: usize, entry: &Entry) -> Result<(), (ChainCheck, String)> {
        if entry.entry_type() != self.subject_type {
            return Err((
                ChainCheck::Compliance,
                format!("{} entry in a {} keycard", entry.entry_type(), self.subject_type),
            ));
        }

        match position.checked_sub(1).and_then(|p| self.entries.get(p)) {
            None => {
                if entry.index() != Some(1) {
                    return Err((ChainCheck::Index, "root entry must have index 1".to_string()));
                }
                if entry.prev_hash().is_some() {
                    return Err((
                        ChainCheck::PreviousHash,
                        "root entry must not have a Previous-Hash".to_string(),
                    ));
                }
                if entry.signature(SignatureSlot::Custody).is_some() {
                    return Err((
                        ChainCheck::CustodySignature,
                        "root entry must not have a Custody-Signature".to_string(),
                    ));
                }
            }
            Some(previous) => {
                let expected = previous.index().and_then(|i| i.checked_add(1));
                if expected.is_none() || entry.index() != expected {
                    return Err((
                        ChainCheck::Index,
                        format!("expected index {:?}, found {:?}", expected, entry.index()),
                    ));
                }
                if previous.hash().is_none() || entry.prev_hash() != previous.hash() {
                    return Err((
                        ChainCheck::PreviousHash,
                        "Previous-Hash does not match previous entry".to_string(),
                    ));
                }
                previous
                    .self_verification_key()
                    .and_then(|key| entry.verify_signature(&key, SignatureSlot::Custody))
                    .map_err(|e| (ChainCheck::CustodySignature, e.to_string()))?;
            }
        }

        entry
            .verify_self_signature()
            .map_err(|e| (ChainCheck::SelfSignature, e.to_string()))?;
        entry
            .verify_hash()
            .map_err(|e| (ChainCheck::Hash, e.to_string()))?;
        entry
            .is_compliant()
            .map_err(|e| (ChainCheck::Compliance, e.to_string()))
    }

    /// Verifies a user card together with the organization card that vouches
    /// for it. Every user entry's `Organization-Signature` must verify with
    /// one of the organization's primary verification keys.
    pub fn verify_against_organization(&self, organization: &Keycard) -> KeycardResult<()> {
        if self.subject_type != EntryType::User || organization.subject_type != EntryType::Organization
        {
            return Err(KeycardError::BadParameterValue {
                parameter: "keycard".to_string(),
                reason: "expected a user card and an organization card".to_string(),
            });
        }
        organization.verify()?;
        self.verify()?;

        let org_keys = organization
            .entries
            .iter()
            .map(Entry::self_verification_key)
            .collect::<KeycardResult<Vec<_>>>()?;

        for (position, entry) in self.entries.iter().enumerate() {
            let vouched = org_keys.iter().any(|key| {
                entry
                    .verify_signature(key, SignatureSlot::Organization)
                    .is_ok()
            });
            if !vouched {
                warn!(position, "User entry not signed by its organization");
                return Err(KeycardError::ChainVerificationFailure {
                    index: position,
                    check: ChainCheck::OrganizationSignature,
                });
            }
        }
        Ok(())
    }

    /// Writes every entry in BEGIN/END blocks. Refuses to replace an
    /// existing file unless `clobber` is set.
    pub fn save(&self, path: impl AsRef<Path>, clobber: bool) -> KeycardResult<()> {
        let path = path.as_ref();
        if self.entries.is_empty() {
            return Err(KeycardError::EmptyKeycard);
        }

        let file: File = if clobber {
            File::create(path)?
        } else {
            OpenOptions::new().write(true).create_new(true).open(path)?
        };
        let mut writer = BufWriter::new(file);
        for entry in &self.entries {
            writer.write_all(BEGIN_ENTRY.as_bytes())?;
            writer.write_all(b"\r\n")?;
            writer.write_all(&entry.to_bytes())?;
            writer.write_all(END_ENTRY.as_bytes())?;
            writer.write_all(b"\r\n")?;
        }
        writer.flush()?;

        debug!(path = %path.display(), entries = self.entries.len(), "Keycard saved");
        Ok(())
    }

    /// Reads a card written by [`Keycard::save`]. Call [`Keycard::verify`]
    /// before trusting it.
    pub fn load(path: impl AsRef<Path>) -> KeycardResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;

        let mut entries = Vec::new();
        let mut current: Option<Vec<(usize, &str)>> = None;
        let mut line_count = 0;

        for (i, line) in text.lines().enumerate() {
            let line_no = i + 1;
            line_count = line_no;
            if line == BEGIN_ENTRY {
                if current.is_some() {
                    return Err(parse_error(line_no, "BEGIN ENTRY inside an entry"));
                }
                current = Some(Vec::new());
            } else if line == END_ENTRY {
                let lines = current
                    .take()
                    .ok_or_else(|| parse_error(line_no, "END ENTRY without BEGIN ENTRY"))?;
                entries.push(Entry::parse_lines(lines)?);
            } else if let Some(lines) = current.as_mut() {
                lines.push((line_no, line));
            } else if !line.trim().is_empty() {
                return Err(parse_error(line_no, "text outside an entry block"));
            }
        }
        if current.is_some() {
            return Err(parse_error(line_count, "unterminated entry"));
        }

        let subject_type = entries
            .first()
            .map(Entry::entry_type)
            .ok_or(KeycardError::EmptyKeycard)?;
        Self::from_entries(subject_type, entries)
    }

    /// Inserts entries the store does not have yet. Returns how many were
    /// written.
    ///
    /// The store's latest entry for `owner` must be the same entry this card
    /// holds at that index.
    pub fn persist<S: EntryStore + ?Sized>(&self, owner: &str, store: &mut S) -> KeycardResult<usize> {
        let stored = store.latest_index(owner)?.unwrap_or(0);

        if stored > 0 {
            let ours = self
                .entries
                .iter()
                .find(|e| e.index() == Some(stored))
                .and_then(Entry::hash)
                .map(ToString::to_string)
                .unwrap_or_default();
            let theirs = store.get(owner, stored)?.hash;
            if ours != theirs {
                return Err(KeycardError::ChainLinkMismatch {
                    index: stored,
                    expected: theirs,
                    actual: ours,
                });
            }
        }

        let mut written = 0;
        for entry in &self.entries {
            let index = entry.index().unwrap_or(0);
            if index <= stored {
                continue;
            }
            let hash = entry.hash().ok_or_else(|| KeycardError::ComplianceFailure {
                field: "Hash".to_string(),
                reason: "missing".to_string(),
            })?;
            store.insert(owner, index, &entry.to_bytes(), &hash.to_string())?;
            written += 1;
        }

        debug!(owner, written, "Keycard persisted");
        Ok(written)
    }

    /// Rebuilds a card from a store. Call [`Keycard::verify`] before trusting
    /// it.
    pub fn load_from_store<S: EntryStore + ?Sized>(
        owner: &str,
        subject_type: EntryType,
        store: &S,
    ) -> KeycardResult<Self> {
        let records = store.entries(owner)?;
        if records.is_empty() {
            return Err(KeycardError::EmptyKeycard);
        }

        let entries = records
            .iter()
            .map(|record| {
                let entry = Entry::from_bytes(&record.bytes)?;
                if entry.index() != Some(record.index) {
                    return Err(KeycardError::ChainLinkMismatch {
                        index: record.index,
                        expected: format!("index {}", record.index),
                        actual: format!("index {:?}", entry.index()),
                    });
                }
                if entry.hash().map(ToString::to_string).as_deref() != Some(record.hash.as_str()) {
                    return Err(KeycardError::HashMismatch);
                }
                Ok(entry)
            })
            .collect::<KeycardResult<Vec<_>>>()?;

        Self::from_entries(subject_type, entries)
    }
}

fn parse_error(line: usize, reason: &str) -> KeycardError {
    KeycardError::Parse {
        line,
        reason: reason.to_string(),
    }
}
