//! Field schema for organization and user entries.
//!
//! The order of the tables below is the canonical serialization order. `Type`
//! always comes first and is implied by [`EntryType`]; `Previous-Hash`, the
//! signature slots and `Hash` follow the data fields and are stored apart from
//! them.

use cardchain_crypto::{Algorithm, EncodedString};
use chrono::{NaiveDate, NaiveDateTime};
use std::fmt;
use std::str::FromStr;

use crate::error::KeycardError;

pub const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%SZ";
pub const DATE_FORMAT: &str = "%Y%m%d";

pub const MAX_USER_ID_LEN: usize = 128;
pub const MAX_TIME_TO_LIVE: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryType {
    Organization,
    User,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Organization => "Organization",
            EntryType::User => "User",
        }
    }

    /// Data fields in canonical order.
    pub fn fields(&self) -> &'static [FieldSpec] {
        match self {
            EntryType::Organization => ORGANIZATION_FIELDS,
            EntryType::User => USER_FIELDS,
        }
    }

    pub fn field(&self, name: &str) -> Option<&'static FieldSpec> {
        self.fields().iter().find(|spec| spec.name == name)
    }

    /// Every signature slot this type can carry, in signing order.
    pub fn signature_slots(&self) -> &'static [SignatureSlot] {
        match self {
            EntryType::Organization => &[SignatureSlot::Custody, SignatureSlot::Organization],
            EntryType::User => &[
                SignatureSlot::Custody,
                SignatureSlot::Organization,
                SignatureSlot::User,
            ],
        }
    }

    /// Slots that must be signed for an entry at `index`. Root entries have
    /// no custody signature.
    pub fn required_slots(&self, index: u32) -> Vec<SignatureSlot> {
        self.signature_slots()
            .iter()
            .copied()
            .filter(|slot| *slot != SignatureSlot::Custody || index > 1)
            .collect()
    }

    /// Slot signed by the entry's own key.
    pub fn self_slot(&self) -> SignatureSlot {
        match self {
            EntryType::Organization => SignatureSlot::Organization,
            EntryType::User => SignatureSlot::User,
        }
    }

    /// Field holding the key that checks the self signature, and the next
    /// entry's custody signature.
    pub fn self_key_field(&self) -> &'static str {
        match self {
            EntryType::Organization => "Primary-Verification-Key",
            EntryType::User => "Contact-Request-Verification-Key",
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryType {
    type Err = KeycardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Organization" => Ok(EntryType::Organization),
            "User" => Ok(EntryType::User),
            other => Err(KeycardError::BadParameterValue {
                parameter: "Type".to_string(),
                reason: format!("unknown entry type '{}'", other),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SignatureSlot {
    /// Made with the previous entry's key
    Custody,
    Organization,
    User,
}

impl SignatureSlot {
    pub fn field_name(&self) -> &'static str {
        match self {
            SignatureSlot::Custody => "Custody-Signature",
            SignatureSlot::Organization => "Organization-Signature",
            SignatureSlot::User => "User-Signature",
        }
    }

    pub fn from_field_name(name: &str) -> Option<Self> {
        match name {
            "Custody-Signature" => Some(SignatureSlot::Custody),
            "Organization-Signature" => Some(SignatureSlot::Organization),
            "User-Signature" => Some(SignatureSlot::User),
            _ => None,
        }
    }
}

impl fmt::Display for SignatureSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.field_name())
    }
}

/// Syntax a field value must satisfy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Index,
    Timestamp,
    Date,
    TimeToLive,
    Domain,
    UserId,
    WorkspaceId,
    VerificationKey,
    EncryptionKey,
}

impl FieldKind {
    /// Checks `value`, returning the reason it is unacceptable.
    pub fn validate(&self, value: &str) -> Result<(), String> {
        match self {
            FieldKind::Text => Ok(()),
            FieldKind::Index => match parse_index(value) {
                Some(_) => Ok(()),
                None => Err(format!("'{}' is not a positive decimal integer", value)),
            },
            FieldKind::Timestamp => NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT)
                .map(|_| ())
                .map_err(|e| format!("'{}' is not a YYYYMMDDTHHMMSSZ timestamp: {}", value, e)),
            FieldKind::Date => NaiveDate::parse_from_str(value, DATE_FORMAT)
                .map(|_| ())
                .map_err(|e| format!("'{}' is not a YYYYMMDD date: {}", value, e)),
            FieldKind::TimeToLive => match value.parse::<u32>() {
                Ok(n) if (1..=MAX_TIME_TO_LIVE).contains(&n) => Ok(()),
                _ => Err(format!("must be 1 to {} days", MAX_TIME_TO_LIVE)),
            },
            FieldKind::Domain => {
                if value.chars().any(char::is_whitespace) {
                    Err("domain contains whitespace".to_string())
                } else {
                    Ok(())
                }
            }
            FieldKind::UserId => {
                if value.chars().count() > MAX_USER_ID_LEN {
                    Err(format!("longer than {} characters", MAX_USER_ID_LEN))
                } else if value.chars().any(|c| c.is_whitespace() || c == '"') {
                    Err("contains whitespace or a quote".to_string())
                } else {
                    Ok(())
                }
            }
            FieldKind::WorkspaceId => uuid::Uuid::parse_str(value)
                .map(|_| ())
                .map_err(|e| format!("not a UUID: {}", e)),
            FieldKind::VerificationKey => expect_key(value, Algorithm::Ed25519),
            FieldKind::EncryptionKey => expect_key(value, Algorithm::Curve25519),
        }
    }
}

fn expect_key(value: &str, algorithm: Algorithm) -> Result<(), String> {
    let key = EncodedString::parse(value).map_err(|e| e.to_string())?;
    if key.algorithm() != &algorithm {
        return Err(format!("expected a {} key, got {}", algorithm, key.algorithm()));
    }
    if key.as_bytes().len() != 32 {
        return Err(format!("key is {} bytes", key.as_bytes().len()));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub required: bool,
    pub kind: FieldKind,
}

const fn required(name: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec {
        name,
        required: true,
        kind,
    }
}

const fn optional(name: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec {
        name,
        required: false,
        kind,
    }
}

static ORGANIZATION_FIELDS: &[FieldSpec] = &[
    required("Index", FieldKind::Index),
    required("Name", FieldKind::Text),
    required("Contact-Admin", FieldKind::Text),
    optional("Contact-Abuse", FieldKind::Text),
    optional("Contact-Support", FieldKind::Text),
    required("Language", FieldKind::Text),
    required("Domain", FieldKind::Domain),
    required("Primary-Verification-Key", FieldKind::VerificationKey),
    optional("Secondary-Verification-Key", FieldKind::VerificationKey),
    required("Encryption-Key", FieldKind::EncryptionKey),
    optional("Time-To-Live", FieldKind::TimeToLive),
    optional("Expires", FieldKind::Date),
    required("Timestamp", FieldKind::Timestamp),
];

static USER_FIELDS: &[FieldSpec] = &[
    required("Index", FieldKind::Index),
    required("Name", FieldKind::Text),
    required("Workspace-ID", FieldKind::WorkspaceId),
    required("User-ID", FieldKind::UserId),
    required("Domain", FieldKind::Domain),
    required("Contact-Request-Verification-Key", FieldKind::VerificationKey),
    required("Contact-Request-Encryption-Key", FieldKind::EncryptionKey),
    required("Public-Encryption-Key", FieldKind::EncryptionKey),
    optional("Alternate-Encryption-Key", FieldKind::EncryptionKey),
    optional("Time-To-Live", FieldKind::TimeToLive),
    optional("Expires", FieldKind::Date),
    required("Timestamp", FieldKind::Timestamp),
];

/// Parses an `Index` value written in canonical form: decimal digits, no
/// sign and no leading zero.
pub(crate) fn parse_index(value: &str) -> Option<u32> {
    let n = value.parse::<u32>().ok()?;
    (n > 0 && n.to_string() == value).then_some(n)
}
