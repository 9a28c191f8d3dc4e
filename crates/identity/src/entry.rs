//! Keycard entries.
//!
//! An entry serializes as CRLF-terminated `Name:Value` lines: `Type`, the
//! data fields in schema order, `Previous-Hash`, then the trailer. The
//! trailer is the type's signature slots followed by `Hash`.
//!
//! Every trailer position covers exactly the lines before it. A signature
//! slot at trailer position `p` signs `make_bytestring(trailer_len - p)`, and
//! the hash covers `make_bytestring(1)`, so it seals the signatures as well as
//! the fields.
//!
//! Lifecycle:
//!
//! ```text
//! Empty -> FieldsSet -> PartiallySigned -> FullySigned -> Hashed
//! ```
//!
//! Changing any field drops every signature and the hash. Re-signing a slot
//! drops the slots after it.

use cardchain_core::{KeycardConfig, MAX_EXPIRATION_DAYS};
use cardchain_crypto::{
    hash_matches, Algorithm, EncodedString, HashAlgorithm, SigningPair, VerificationKey,
};
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use tracing::debug;

use crate::error::{KeycardError, KeycardResult};
use crate::schema::{
    parse_index, EntryType, FieldKind, SignatureSlot, DATE_FORMAT, TIMESTAMP_FORMAT,
};

/// Where an entry is in its signing lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Empty,
    FieldsSet,
    PartiallySigned { signed: usize, required: usize },
    FullySigned,
    Hashed,
}

/// A single organization or user record in a keycard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub(crate) entry_type: EntryType,
    pub(crate) fields: BTreeMap<String, String>,
    pub(crate) prev_hash: Option<EncodedString>,
    pub(crate) signatures: BTreeMap<SignatureSlot, EncodedString>,
    pub(crate) hash: Option<EncodedString>,
}

impl Entry {
    pub fn new(entry_type: EntryType) -> Self {
        Self {
            entry_type,
            fields: BTreeMap::new(),
            prev_hash: None,
            signatures: BTreeMap::new(),
            hash: None,
        }
    }

    pub fn entry_type(&self) -> EntryType {
        self.entry_type
    }

    /// Value of a data field. `Type` is answered from the entry type.
    pub fn field(&self, name: &str) -> Option<&str> {
        if name == "Type" {
            return Some(self.entry_type.as_str());
        }
        self.fields.get(name).map(String::as_str)
    }

    /// `Index`, if present and numeric.
    pub fn index(&self) -> Option<u32> {
        self.fields.get("Index").and_then(|v| parse_index(v))
    }

    pub fn prev_hash(&self) -> Option<&EncodedString> {
        self.prev_hash.as_ref()
    }

    pub fn hash(&self) -> Option<&EncodedString> {
        self.hash.as_ref()
    }

    pub fn signature(&self, slot: SignatureSlot) -> Option<&EncodedString> {
        self.signatures.get(&slot)
    }

    /// Sets one field. Signatures and hash are discarded.
    ///
    /// Accepts the type's schema fields, `Previous-Hash`, and `Type` when it
    /// names this entry's own type. `Hash` and signature fields are written
    /// only by hashing and signing.
    pub fn set_field(&mut self, name: &str, value: impl Into<String>) -> KeycardResult<()> {
        self.insert_field(name, value.into())?;
        self.invalidate();
        Ok(())
    }

    /// Sets several fields at once. Nothing changes if any of them is rejected.
    pub fn set_fields<I, K, V>(&mut self, fields: I) -> KeycardResult<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut staged = self.clone();
        for (name, value) in fields {
            staged.insert_field(name.as_ref(), value.into())?;
        }
        staged.invalidate();
        *self = staged;
        Ok(())
    }

    pub fn remove_field(&mut self, name: &str) -> Option<String> {
        let removed = self.fields.remove(name);
        if removed.is_some() {
            self.invalidate();
        }
        removed
    }

    pub fn set_prev_hash(&mut self, hash: EncodedString) {
        self.prev_hash = Some(hash);
        self.invalidate();
    }

    pub fn set_timestamp(&mut self, time: DateTime<Utc>) {
        self.fields
            .insert("Timestamp".to_string(), time.format(TIMESTAMP_FORMAT).to_string());
        self.invalidate();
    }

    /// Sets `Expires` to `days` from today (UTC), or the type's default
    /// period when `days` is `None`. Longer periods are cut to three years.
    pub fn set_expiration(&mut self, days: Option<u32>) -> KeycardResult<()> {
        let days = days.unwrap_or_else(|| default_expiration_days(self.entry_type));
        if days == 0 {
            return Err(KeycardError::BadParameterValue {
                parameter: "Expires".to_string(),
                reason: "expiration must be at least one day".to_string(),
            });
        }
        let days = days.min(MAX_EXPIRATION_DAYS);
        let expires = Utc::now().date_naive() + Duration::days(i64::from(days));
        self.set_field("Expires", expires.format(DATE_FORMAT).to_string())
    }

    pub fn set_time_to_live(&mut self, days: u32) -> KeycardResult<()> {
        let value = days.to_string();
        FieldKind::TimeToLive
            .validate(&value)
            .map_err(|reason| KeycardError::BadParameterValue {
                parameter: "Time-To-Live".to_string(),
                reason,
            })?;
        self.set_field("Time-To-Live", value)
    }

    /// Full check: data fields, every required signature, and the hash.
    pub fn is_compliant(&self) -> KeycardResult<()> {
        self.check_fields()?;
        self.check_signatures()?;
        if self.hash.is_none() {
            return Err(KeycardError::ComplianceFailure {
                field: "Hash".to_string(),
                reason: "missing".to_string(),
            });
        }
        Ok(())
    }

    /// Checks data fields and `Previous-Hash` only.
    pub fn check_fields(&self) -> KeycardResult<()> {
        for spec in self.entry_type.fields() {
            match self.fields.get(spec.name).map(String::as_str) {
                None | Some("") => {
                    if spec.required {
                        return Err(compliance(spec.name, "missing"));
                    }
                }
                Some(value) => spec
                    .kind
                    .validate(value)
                    .map_err(|reason| compliance(spec.name, &reason))?,
            }
        }

        match &self.prev_hash {
            Some(_) if self.position() == 1 => {
                return Err(compliance("Previous-Hash", "not allowed on a root entry"));
            }
            Some(prev) => {
                HashAlgorithm::try_from(prev.algorithm())
                    .map_err(|e| compliance("Previous-Hash", &e.to_string()))?;
            }
            None if self.position() > 1 => {
                return Err(compliance("Previous-Hash", "missing on a non-root entry"));
            }
            None => {}
        }
        Ok(())
    }

    fn check_signatures(&self) -> KeycardResult<()> {
        let required = self.entry_type.required_slots(self.position());
        if let Some(stray) = self.signatures.keys().find(|slot| !required.contains(slot)) {
            return Err(compliance(stray.field_name(), "not allowed at this chain position"));
        }
        for slot in required {
            if !self.signatures.contains_key(&slot) {
                return Err(compliance(slot.field_name(), "missing"));
            }
        }
        Ok(())
    }

    /// Canonical bytes, leaving off the last `exclude` trailer positions.
    pub fn make_bytestring(&self, exclude: usize) -> Vec<u8> {
        let mut out = String::new();
        push_line(&mut out, "Type", self.entry_type.as_str());
        for spec in self.entry_type.fields() {
            if let Some(value) = self.fields.get(spec.name) {
                push_line(&mut out, spec.name, value);
            }
        }
        if let Some(prev) = &self.prev_hash {
            push_line(&mut out, "Previous-Hash", &prev.to_string());
        }

        let slots = self.entry_type.signature_slots();
        let keep = (slots.len() + 1).saturating_sub(exclude);
        for slot in slots.iter().take(keep) {
            if let Some(signature) = self.signatures.get(slot) {
                push_line(&mut out, slot.field_name(), &signature.to_string());
            }
        }
        if keep > slots.len() {
            if let Some(hash) = &self.hash {
                push_line(&mut out, "Hash", &hash.to_string());
            }
        }
        out.into_bytes()
    }

    /// Complete wire form, ending with the `Hash` line.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.make_bytestring(0)
    }

    /// Parses the wire form. Performs no verification.
    pub fn from_bytes(bytes: &[u8]) -> KeycardResult<Self> {
        let text = std::str::from_utf8(bytes).map_err(|e| KeycardError::Parse {
            line: 1,
            reason: e.to_string(),
        })?;
        Self::parse_lines(text.lines().enumerate().map(|(i, line)| (i + 1, line)))
    }

    pub(crate) fn parse_lines<'a, I>(lines: I) -> KeycardResult<Self>
    where
        I: IntoIterator<Item = (usize, &'a str)>,
    {
        let mut entry: Option<Entry> = None;
        let mut last_line = 0;

        for (line_no, line) in lines {
            last_line = line_no;
            if line.is_empty() {
                continue;
            }
            let (name, value) = line.split_once(':').ok_or_else(|| KeycardError::Parse {
                line: line_no,
                reason: "expected Name:Value".to_string(),
            })?;

            match entry.as_mut() {
                Some(current) => {
                    current
                        .parse_line(name, value)
                        .map_err(|e| KeycardError::Parse {
                            line: line_no,
                            reason: e.to_string(),
                        })?
                }
                None if name == "Type" => {
                    let entry_type = value.parse().map_err(|e: KeycardError| KeycardError::Parse {
                        line: line_no,
                        reason: e.to_string(),
                    })?;
                    entry = Some(Entry::new(entry_type));
                }
                None => {
                    return Err(KeycardError::Parse {
                        line: line_no,
                        reason: "entry must begin with a Type line".to_string(),
                    })
                }
            }
        }

        entry.ok_or(KeycardError::Parse {
            line: last_line,
            reason: "no entry found".to_string(),
        })
    }

    fn parse_line(&mut self, name: &str, value: &str) -> KeycardResult<()> {
        if name == "Hash" {
            if self.hash.is_some() {
                return Err(duplicate(name));
            }
            self.hash = Some(EncodedString::parse(value)?);
        } else if let Some(slot) = SignatureSlot::from_field_name(name) {
            if !self.entry_type.signature_slots().contains(&slot) {
                return Err(not_a_slot(self.entry_type, slot));
            }
            if self.signatures.contains_key(&slot) {
                return Err(duplicate(name));
            }
            self.signatures.insert(slot, EncodedString::parse(value)?);
        } else {
            let seen = match name {
                "Type" => true,
                "Previous-Hash" => self.prev_hash.is_some(),
                _ => self.fields.contains_key(name),
            };
            if seen {
                return Err(duplicate(name));
            }
            self.insert_field(name, value.to_string())?;
        }
        Ok(())
    }

    /// Hashes the signed entry, sealing it.
    ///
    /// Fails with `ComplianceFailure` if a data field or required signature
    /// is missing.
    pub fn generate_hash(&mut self, algorithm: HashAlgorithm) -> KeycardResult<()> {
        self.check_fields()?;
        self.check_signatures().map_err(|e| match e {
            KeycardError::ComplianceFailure { field, reason } if reason == "missing" => {
                compliance(&field, "missing; sign required slots before hashing")
            }
            e => e,
        })?;

        let hash = algorithm.digest(&self.make_bytestring(1));
        debug!(
            index = self.position(),
            entry_type = %self.entry_type,
            algorithm = %algorithm,
            "Entry hashed"
        );
        self.hash = Some(hash);
        Ok(())
    }

    /// Recomputes the hash with the algorithm it is tagged with.
    pub fn verify_hash(&self) -> KeycardResult<()> {
        let expected = self
            .hash
            .as_ref()
            .ok_or_else(|| compliance("Hash", "missing"))?;
        if hash_matches(expected, &self.make_bytestring(1))? {
            Ok(())
        } else {
            Err(KeycardError::HashMismatch)
        }
    }

    /// Signs `slot` with an `ED25519` private key.
    ///
    /// Slots must be filled in order and before hashing. Re-signing a slot
    /// clears the slots after it. The self slot only accepts the key behind
    /// the entry's own verification key field.
    pub fn sign(&mut self, signing_key: &EncodedString, slot: SignatureSlot) -> KeycardResult<()> {
        if !self.entry_type.signature_slots().contains(&slot) {
            return Err(not_a_slot(self.entry_type, slot));
        }
        require_ed25519(signing_key, slot)?;
        if self.hash.is_some() {
            return Err(KeycardError::InvalidOperation(format!(
                "cannot sign {} on an entry that is already hashed",
                slot
            )));
        }
        self.check_fields()?;

        let required = self.entry_type.required_slots(self.position());
        if !required.contains(&slot) {
            return Err(KeycardError::InvalidOperation(format!(
                "{} is not used on root entries",
                slot
            )));
        }
        if let Some(earlier) = required
            .iter()
            .take_while(|s| **s != slot)
            .find(|s| !self.signatures.contains_key(*s))
        {
            return Err(KeycardError::InvalidOperation(format!(
                "{} must be signed before {}",
                earlier, slot
            )));
        }

        let pair = SigningPair::from_private(signing_key)?;
        if slot == self.entry_type.self_slot() && pair.public() != self.self_verification_key()? {
            return Err(KeycardError::InvalidKeyUsage {
                reason: format!(
                    "signing key does not match {}",
                    self.entry_type.self_key_field()
                ),
            });
        }

        self.signatures.retain(|existing, _| *existing < slot);
        let signature = pair.sign(&self.signed_bytes(slot));
        self.signatures.insert(slot, signature);

        debug!(
            index = self.position(),
            slot = %slot,
            key_id = %pair.key_id(),
            "Entry signed"
        );
        Ok(())
    }

    /// Checks `slot` against an `ED25519` verification key.
    ///
    /// An empty slot is `SignatureMissing`; a signature that does not verify
    /// is `InvalidSignature`.
    pub fn verify_signature(
        &self,
        verification_key: &EncodedString,
        slot: SignatureSlot,
    ) -> KeycardResult<()> {
        if !self.entry_type.signature_slots().contains(&slot) {
            return Err(not_a_slot(self.entry_type, slot));
        }
        require_ed25519(verification_key, slot)?;

        let signature = self
            .signatures
            .get(&slot)
            .ok_or(KeycardError::SignatureMissing { slot })?;
        let key = VerificationKey::from_encoded(verification_key).map_err(|e| {
            KeycardError::InvalidKeyUsage {
                reason: e.to_string(),
            }
        })?;

        if key.verify(&self.signed_bytes(slot), signature) {
            Ok(())
        } else {
            Err(KeycardError::InvalidSignature { slot })
        }
    }

    /// Verifies the self slot against the entry's own declared key.
    pub fn verify_self_signature(&self) -> KeycardResult<()> {
        let key = self.self_verification_key()?;
        self.verify_signature(&key, self.entry_type.self_slot())
    }

    /// The key that checks this entry's self signature and the next entry's
    /// custody signature.
    pub fn self_verification_key(&self) -> KeycardResult<EncodedString> {
        let field = self.entry_type.self_key_field();
        let value = self
            .fields
            .get(field)
            .ok_or_else(|| compliance(field, "missing"))?;
        EncodedString::parse(value).map_err(|e| compliance(field, &e.to_string()))
    }

    /// Checks that this entry directly follows `previous`: same type, next
    /// index, matching `Previous-Hash`, and a custody signature made with
    /// the previous entry's key.
    pub fn verify_chain(&self, previous: &Entry) -> KeycardResult<()> {
        let index = self.index().ok_or_else(|| compliance("Index", "missing"))?;

        if previous.entry_type != self.entry_type {
            return Err(KeycardError::ChainLinkMismatch {
                index,
                expected: previous.entry_type.to_string(),
                actual: self.entry_type.to_string(),
            });
        }

        let prev_index = previous
            .index()
            .ok_or_else(|| compliance("Index", "missing on previous entry"))?;
        if prev_index.checked_add(1) != Some(index) {
            return Err(KeycardError::ChainLinkMismatch {
                index,
                expected: format!("index {}", u64::from(prev_index) + 1),
                actual: format!("index {}", index),
            });
        }

        let prev_hash = previous
            .hash
            .as_ref()
            .ok_or_else(|| compliance("Hash", "missing on previous entry"))?;
        if self.prev_hash.as_ref() != Some(prev_hash) {
            return Err(KeycardError::ChainLinkMismatch {
                index,
                expected: prev_hash.to_string(),
                actual: self
                    .prev_hash
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "no Previous-Hash".to_string()),
            });
        }

        let custody_key = previous.self_verification_key()?;
        self.verify_signature(&custody_key, SignatureSlot::Custody)
    }

    pub fn state(&self) -> EntryState {
        if self.hash.is_some() {
            return EntryState::Hashed;
        }
        let required = self.entry_type.required_slots(self.position());
        let signed = required
            .iter()
            .filter(|slot| self.signatures.contains_key(*slot))
            .count();
        if signed == required.len() && signed > 0 {
            EntryState::FullySigned
        } else if signed > 0 {
            EntryState::PartiallySigned {
                signed,
                required: required.len(),
            }
        } else if self.fields.is_empty() && self.prev_hash.is_none() {
            EntryState::Empty
        } else {
            EntryState::FieldsSet
        }
    }

    /// Chain position used for slot rules; unreadable indexes count as root.
    fn position(&self) -> u32 {
        self.index().unwrap_or(1)
    }

    fn signed_bytes(&self, slot: SignatureSlot) -> Vec<u8> {
        let slots = self.entry_type.signature_slots();
        let position = slots.iter().position(|s| *s == slot).unwrap_or(0);
        self.make_bytestring(slots.len() + 1 - position)
    }

    fn insert_field(&mut self, name: &str, value: String) -> KeycardResult<()> {
        if value.contains(|c: char| c == '\r' || c == '\n') {
            return Err(bad_parameter(name, "line breaks are not allowed"));
        }

        match name {
            "Type" => {
                if value != self.entry_type.as_str() {
                    return Err(bad_parameter(
                        name,
                        &format!("cannot change a {} entry to {}", self.entry_type, value),
                    ));
                }
                return Ok(());
            }
            "Previous-Hash" => {
                let hash = EncodedString::parse(&value)
                    .map_err(|e| bad_parameter(name, &e.to_string()))?;
                self.prev_hash = Some(hash);
                return Ok(());
            }
            "Hash" => return Err(bad_parameter(name, "written by generate_hash")),
            _ if SignatureSlot::from_field_name(name).is_some() => {
                return Err(bad_parameter(name, "written by sign"));
            }
            _ => {}
        }

        if self.entry_type.field(name).is_none() {
            return Err(bad_parameter(
                name,
                &format!("not a field of {} entries", self.entry_type),
            ));
        }
        self.fields.insert(name.to_string(), value);
        Ok(())
    }

    fn invalidate(&mut self) {
        self.signatures.clear();
        self.hash = None;
    }
}

fn default_expiration_days(entry_type: EntryType) -> u32 {
    let defaults = KeycardConfig::default();
    match entry_type {
        EntryType::Organization => defaults.org_expiration_days,
        EntryType::User => defaults.user_expiration_days,
    }
}

fn push_line(out: &mut String, name: &str, value: &str) {
    out.push_str(name);
    out.push(':');
    out.push_str(value);
    out.push_str("\r\n");
}

fn require_ed25519(key: &EncodedString, slot: SignatureSlot) -> KeycardResult<()> {
    if key.algorithm() != &Algorithm::Ed25519 {
        return Err(KeycardError::InvalidKeyUsage {
            reason: format!("{} needs an ED25519 key, got {}", slot, key.algorithm()),
        });
    }
    Ok(())
}

fn compliance(field: &str, reason: &str) -> KeycardError {
    KeycardError::ComplianceFailure {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

fn bad_parameter(parameter: &str, reason: &str) -> KeycardError {
    KeycardError::BadParameterValue {
        parameter: parameter.to_string(),
        reason: reason.to_string(),
    }
}

fn duplicate(name: &str) -> KeycardError {
    bad_parameter(name, "appears more than once")
}

fn not_a_slot(entry_type: EntryType, slot: SignatureSlot) -> KeycardError {
    bad_parameter(
        slot.field_name(),
        &format!("not a signature slot of {} entries", entry_type),
    )
}
