//! Integration tests for keycard chains.
//!
//! These tests drive complete organization and user cards through the public
//! API, including:
//! - Root entry creation and single-entry verification
//! - Key rotation by chaining, with and without full rotation
//! - Tamper detection reporting the failing position and check
//! - Organization vouching for user entries
//! - Keycard files, entry stores and entry submission

use cardchain_core::{logging, Config};
use cardchain_crypto::{Algorithm, EncodedString, EncryptionPair, HashAlgorithm, SigningPair};
use cardchain_identity::{
    submit_entry, ChainCheck, Entry, EntryState, EntryStore, EntryTransport, EntryType, Keycard,
    KeycardError, KeycardPolicy, KeycardResult, MemoryEntryStore, SignatureSlot,
};
use proptest::prelude::*;
use std::path::PathBuf;

const WORKSPACE_ID: &str = "4418bf6c-000b-4bb3-8111-316e72030468";

fn setup() {
    logging::try_init();
}

fn temp_path(label: &str) -> PathBuf {
    std::env::temp_dir().join(format!("cardchain_{}_{}", label, uuid::Uuid::new_v4()))
}

/// Builds a single-entry organization card and returns its signing key.
fn org_card() -> (Keycard, SigningPair) {
    let signing = SigningPair::generate();
    let encryption = EncryptionPair::generate();

    let mut entry = Entry::new(EntryType::Organization);
    entry
        .set_fields(vec![
            ("Index", "1".to_string()),
            ("Name", "Example, Inc.".to_string()),
            (
                "Contact-Admin",
                "c590b44c-798d-4055-8d72-725a7942f3f6/example.com".to_string(),
            ),
            ("Language", "en".to_string()),
            ("Domain", "example.com".to_string()),
            ("Primary-Verification-Key", signing.public().to_string()),
            ("Encryption-Key", encryption.public().to_string()),
            ("Timestamp", "20240101T120000Z".to_string()),
        ])
        .expect("Failed to set organization fields");
    entry
        .sign(&signing.private(), SignatureSlot::Organization)
        .expect("Failed to sign root entry");
    entry
        .generate_hash(HashAlgorithm::default())
        .expect("Failed to hash root entry");

    let mut card = Keycard::new(EntryType::Organization);
    card.append(entry).expect("Failed to append root entry");
    (card, signing)
}

fn user_entry_fields(cr_key: &SigningPair) -> Vec<(&'static str, String)> {
    vec![
        ("Index", "1".to_string()),
        ("Name", "Corbin Simons".to_string()),
        ("Workspace-ID", WORKSPACE_ID.to_string()),
        ("User-ID", "csimons".to_string()),
        ("Domain", "example.com".to_string()),
        ("Contact-Request-Verification-Key", cr_key.public().to_string()),
        (
            "Contact-Request-Encryption-Key",
            EncryptionPair::generate().public().to_string(),
        ),
        (
            "Public-Encryption-Key",
            EncryptionPair::generate().public().to_string(),
        ),
        ("Timestamp", "20240101T120000Z".to_string()),
    ]
}

/// Builds a single-entry user card vouched for by `org_key`.
fn user_card(org_key: &SigningPair) -> (Keycard, SigningPair) {
    let cr_key = SigningPair::generate();

    let mut entry = Entry::new(EntryType::User);
    entry.set_fields(user_entry_fields(&cr_key)).unwrap();
    entry
        .sign(&org_key.private(), SignatureSlot::Organization)
        .unwrap();
    entry.sign(&cr_key.private(), SignatureSlot::User).unwrap();
    entry.generate_hash(HashAlgorithm::default()).unwrap();

    let mut card = Keycard::new(EntryType::User);
    card.append(entry).unwrap();
    (card, cr_key)
}

/// Chains `count` more entries onto an organization card.
fn extend_org(card: &mut Keycard, mut signing: SigningPair, count: usize) -> SigningPair {
    for _ in 0..count {
        let outcome = card.chain(&signing.private(), false).unwrap();
        card.append(outcome.entry).unwrap();
        signing = outcome.keys.signing;
    }
    signing
}

fn flipped(encoded: &EncodedString) -> EncodedString {
    let mut bytes = encoded.as_bytes().to_vec();
    bytes[0] ^= 0x01;
    EncodedString::new(encoded.algorithm().clone(), bytes)
}

/// Returns a copy of `card` with one encoded value in one entry replaced.
fn tampered(card: &Keycard, position: usize, from: &EncodedString, to: &EncodedString) -> Keycard {
    let mut entries = card.entries().to_vec();
    let text = String::from_utf8(entries[position].to_bytes())
        .unwrap()
        .replace(&from.to_string(), &to.to_string());
    entries[position] = Entry::from_bytes(text.as_bytes()).unwrap();
    Keycard::from_entries(card.subject_type(), entries).unwrap()
}

fn assert_fails_at(card: &Keycard, index: usize, check: ChainCheck) {
    match card.verify() {
        Err(KeycardError::ChainVerificationFailure {
            index: got_index,
            check: got_check,
        }) => {
            assert_eq!((got_index, got_check), (index, check));
        }
        other => panic!("Expected failure at {} ({}), got {:?}", index, check, other),
    }
}

#[test]
fn test_root_organization_entry() {
    setup();
    let (card, signing) = org_card();

    let root = card.get(0).unwrap();
    assert!(root.is_compliant().is_ok());
    assert_eq!(root.state(), EntryState::Hashed);
    assert!(root.prev_hash().is_none());
    assert_eq!(root.self_verification_key().unwrap(), signing.public());
    assert!(card.verify().is_ok());
}

#[test]
fn test_chain_rotate_all() {
    setup();
    let (mut card, signing) = org_card();
    let root = card.get(0).unwrap().clone();

    let outcome = card.chain(&signing.private(), true).unwrap();
    let entry = &outcome.entry;

    assert_eq!(entry.index(), Some(2));
    assert_eq!(entry.prev_hash(), root.hash());
    assert!(entry
        .verify_signature(&signing.public(), SignatureSlot::Custody)
        .is_ok());
    assert!(entry
        .verify_signature(&outcome.keys.signing.public(), SignatureSlot::Organization)
        .is_ok());
    assert!(entry.is_compliant().is_ok());

    let encryption = outcome.keys.encryption.as_ref().unwrap();
    assert_eq!(
        entry.field("Encryption-Key"),
        Some(encryption.public().to_string().as_str())
    );
    assert_ne!(entry.field("Encryption-Key"), root.field("Encryption-Key"));
    let secondary = outcome.keys.secondary_signing.as_ref().unwrap();
    assert_eq!(
        entry.field("Secondary-Verification-Key"),
        Some(secondary.public().to_string().as_str())
    );

    // Chaining does not touch the card until the caller appends
    assert_eq!(card.len(), 1);
    card.append(outcome.entry).unwrap();
    assert_eq!(card.len(), 2);
    assert!(card.verify().is_ok());
}

#[test]
fn test_chain_rotates_only_signing_key() {
    setup();
    let (card, signing) = org_card();
    let root = card.get(0).unwrap();

    let outcome = card.chain(&signing.private(), false).unwrap();
    assert!(outcome.keys.encryption.is_none());
    assert!(outcome.keys.secondary_signing.is_none());
    assert_eq!(
        outcome.entry.field("Encryption-Key"),
        root.field("Encryption-Key")
    );
    assert_ne!(
        outcome.entry.field("Primary-Verification-Key"),
        root.field("Primary-Verification-Key")
    );
    assert_eq!(outcome.entry.field("Name"), Some("Example, Inc."));
}

#[test]
fn test_chain_rejects_wrong_key() {
    setup();
    let (card, _) = org_card();

    assert!(matches!(
        card.chain(&SigningPair::generate().private(), true),
        Err(KeycardError::InvalidKeyUsage { .. })
    ));
    assert!(matches!(
        card.chain(&EncryptionPair::generate().private(), true),
        Err(KeycardError::InvalidKeyUsage { .. })
    ));
}

#[test]
fn test_old_key_cannot_extend_rotated_card() {
    setup();
    let (mut card, signing) = org_card();
    extend_org(&mut card, signing.clone(), 1);

    assert!(matches!(
        card.chain(&signing.private(), false),
        Err(KeycardError::InvalidKeyUsage { .. })
    ));
}

#[test]
fn test_long_chain_verifies() {
    setup();
    let (mut card, signing) = org_card();
    extend_org(&mut card, signing, 5);

    assert_eq!(card.len(), 6);
    assert_eq!(card.last().unwrap().index(), Some(6));
    assert!(card.verify().is_ok());
}

#[test]
fn test_chain_refreshes_expiration() {
    setup();
    let signing = SigningPair::generate();
    let mut entry = Entry::new(EntryType::Organization);
    entry
        .set_fields(vec![
            ("Index", "1".to_string()),
            ("Name", "Example, Inc.".to_string()),
            ("Contact-Admin", "admin/example.com".to_string()),
            ("Language", "en".to_string()),
            ("Domain", "example.com".to_string()),
            ("Primary-Verification-Key", signing.public().to_string()),
            (
                "Encryption-Key",
                EncryptionPair::generate().public().to_string(),
            ),
            ("Expires", "20200101".to_string()),
            ("Timestamp", "20190101T000000Z".to_string()),
        ])
        .unwrap();
    entry
        .sign(&signing.private(), SignatureSlot::Organization)
        .unwrap();
    entry.generate_hash(HashAlgorithm::default()).unwrap();

    let mut card = Keycard::new(EntryType::Organization);
    card.append(entry).unwrap();

    let outcome = card.chain(&signing.private(), false).unwrap();
    let expires = outcome.entry.field("Expires").unwrap();
    assert!(expires > "20200101");
    assert!(outcome.entry.field("Timestamp").unwrap() > "20190101T000000Z");
}

#[test]
fn test_append_rejects_broken_link() {
    setup();
    let (mut card, signing) = org_card();
    let root_only = card.clone();
    let first = card.chain(&signing.private(), false).unwrap();
    card.append(first.entry).unwrap();

    // A second entry chained from the same parent no longer fits
    let stale = root_only.chain(&signing.private(), false).unwrap();
    assert!(matches!(
        card.append(stale.entry),
        Err(KeycardError::ChainLinkMismatch { .. })
    ));
    assert_eq!(card.len(), 2);
}

/// Rewrites the root entry's wire form with an extra line after `Type`.
fn root_with_line(card: &Keycard, line: &str) -> Entry {
    let text = String::from_utf8(card.entries()[0].to_bytes()).unwrap();
    let forged = text.replacen("\r\n", &format!("\r\n{}\r\n", line), 1);
    Entry::from_bytes(forged.as_bytes()).expect("Failed to parse forged root")
}

#[test]
fn test_root_with_previous_hash_is_rejected() {
    setup();
    let (card, _) = org_card();
    let predecessor = HashAlgorithm::default().digest(b"forged predecessor");
    let forged = root_with_line(&card, &format!("Previous-Hash:{}", predecessor));
    assert_eq!(forged.prev_hash(), Some(&predecessor));

    let mut fresh = Keycard::new(EntryType::Organization);
    assert!(matches!(
        fresh.append(forged.clone()),
        Err(KeycardError::ComplianceFailure { ref field, .. }) if field == "Previous-Hash"
    ));
    assert!(fresh.is_empty());

    let loaded = Keycard::from_entries(EntryType::Organization, vec![forged]).unwrap();
    assert_fails_at(&loaded, 0, ChainCheck::PreviousHash);
}

#[test]
fn test_root_with_custody_signature_is_rejected() {
    setup();
    let (card, signing) = org_card();
    let stray = signing.sign(b"no predecessor");
    let forged = root_with_line(&card, &format!("Custody-Signature:{}", stray));
    assert!(forged.signature(SignatureSlot::Custody).is_some());

    let mut fresh = Keycard::new(EntryType::Organization);
    assert!(matches!(
        fresh.append(forged.clone()),
        Err(KeycardError::ComplianceFailure { ref field, .. }) if field == "Custody-Signature"
    ));
    assert!(fresh.is_empty());

    let loaded = Keycard::from_entries(EntryType::Organization, vec![forged]).unwrap();
    assert_fails_at(&loaded, 0, ChainCheck::CustodySignature);
}

#[test]
fn test_flipped_self_signature_is_detected() {
    setup();
    let (mut card, signing) = org_card();
    extend_org(&mut card, signing, 2);

    let signature = card.get(1).unwrap().signature(SignatureSlot::Organization).unwrap();
    let bad = tampered(&card, 1, signature, &flipped(signature));
    assert_fails_at(&bad, 1, ChainCheck::SelfSignature);
}

#[test]
fn test_flipped_custody_signature_is_detected() {
    setup();
    let (mut card, signing) = org_card();
    extend_org(&mut card, signing, 2);

    let signature = card.get(2).unwrap().signature(SignatureSlot::Custody).unwrap();
    let bad = tampered(&card, 2, signature, &flipped(signature));
    assert_fails_at(&bad, 2, ChainCheck::CustodySignature);
}

#[test]
fn test_flipped_hash_is_detected() {
    setup();
    let (mut card, signing) = org_card();
    extend_org(&mut card, signing, 2);

    for position in 0..3 {
        let hash = card.get(position).unwrap().hash().unwrap();
        let bad = tampered(&card, position, hash, &flipped(hash));
        assert_fails_at(&bad, position, ChainCheck::Hash);
    }
}

#[test]
fn test_flipped_previous_hash_is_detected() {
    setup();
    let (mut card, signing) = org_card();
    extend_org(&mut card, signing, 2);

    let prev = card.get(2).unwrap().prev_hash().unwrap();
    let bad = tampered(&card, 2, prev, &flipped(prev));
    assert_fails_at(&bad, 2, ChainCheck::PreviousHash);
}

#[test]
fn test_swapped_entries_are_detected() {
    setup();
    let (mut card, signing) = org_card();
    extend_org(&mut card, signing, 2);

    let mut entries = card.entries().to_vec();
    entries.swap(1, 2);
    let bad = Keycard::from_entries(EntryType::Organization, entries).unwrap();
    assert_fails_at(&bad, 1, ChainCheck::Index);

    let mut entries = card.entries().to_vec();
    entries.swap(0, 1);
    let bad = Keycard::from_entries(EntryType::Organization, entries).unwrap();
    assert_fails_at(&bad, 0, ChainCheck::Index);
}

#[test]
fn test_modified_field_is_detected() {
    setup();
    let (mut card, signing) = org_card();
    extend_org(&mut card, signing, 1);

    let mut entries = card.entries().to_vec();
    let text = String::from_utf8(entries[1].to_bytes())
        .unwrap()
        .replace("Name:Example, Inc.", "Name:Evil, Inc.");
    entries[1] = Entry::from_bytes(text.as_bytes()).unwrap();
    let bad = Keycard::from_entries(EntryType::Organization, entries).unwrap();
    assert_fails_at(&bad, 1, ChainCheck::CustodySignature);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_any_signature_bit_flip_fails_at_its_entry(
        position in 0usize..3,
        byte in 0usize..64,
        bit in 0u8..8,
    ) {
        let (mut card, signing) = org_card();
        extend_org(&mut card, signing, 2);

        let signature = card.get(position).unwrap().signature(SignatureSlot::Organization).unwrap();
        let mut bytes = signature.as_bytes().to_vec();
        bytes[byte] ^= 1 << bit;
        let bad = tampered(&card, position, signature, &EncodedString::new(Algorithm::Ed25519, bytes));

        let failed_at = matches!(
            bad.verify(),
            Err(KeycardError::ChainVerificationFailure { index, check: ChainCheck::SelfSignature })
                if index == position
        );
        prop_assert!(failed_at);
    }
}

#[test]
fn test_user_card_vouched_by_organization() {
    setup();
    let (org, org_key) = org_card();
    let (user, _) = user_card(&org_key);

    assert!(user.verify().is_ok());
    assert!(user.verify_against_organization(&org).is_ok());

    let (other_org, _) = org_card();
    match user.verify_against_organization(&other_org) {
        Err(KeycardError::ChainVerificationFailure { index, check }) => {
            assert_eq!(index, 0);
            assert_eq!(check, ChainCheck::OrganizationSignature);
        }
        other => panic!("Expected organization signature failure, got {:?}", other),
    }

    assert!(matches!(
        org.verify_against_organization(&user),
        Err(KeycardError::BadParameterValue { .. })
    ));
}

#[test]
fn test_user_chain_needs_organization_signature() {
    setup();
    let (mut org, org_key) = org_card();
    let (mut user, cr_key) = user_card(&org_key);

    let mut outcome = user.chain(&cr_key.private(), true).unwrap();
    assert_eq!(
        outcome.entry.state(),
        EntryState::PartiallySigned {
            signed: 1,
            required: 3
        }
    );
    assert!(outcome.keys.contact_request_encryption.is_some());
    assert!(outcome.keys.public_encryption.is_some());
    assert!(outcome.keys.alternate_encryption.is_none());
    assert!(matches!(
        user.append(outcome.entry.clone()),
        Err(KeycardError::ComplianceFailure { .. })
    ));

    // The organization rotates its own key in the meantime
    let new_org_key = extend_org(&mut org, org_key, 1);

    outcome
        .finish_user_entry(&new_org_key.private(), HashAlgorithm::default())
        .unwrap();
    assert_eq!(outcome.entry.state(), EntryState::Hashed);

    user.append(outcome.entry).unwrap();
    assert!(user.verify().is_ok());
    assert!(user.verify_against_organization(&org).is_ok());
}

#[test]
fn test_finish_rejects_organization_entries() {
    setup();
    let (org, org_key) = org_card();
    let mut outcome = org.chain(&org_key.private(), false).unwrap();
    assert!(matches!(
        outcome.finish_user_entry(&org_key.private(), HashAlgorithm::default()),
        Err(KeycardError::InvalidOperation(_))
    ));
}

#[test]
fn test_user_compliance_rules() {
    setup();
    let cr_key = SigningPair::generate();

    for (field, value) in [
        ("User-ID", "c simons"),
        ("User-ID", "c\"simons"),
        ("Workspace-ID", "not-a-uuid"),
        ("Domain", "example .com"),
        ("Contact-Request-Verification-Key", "CURVE25519:AQIDBA=="),
        ("Index", "0"),
        ("Timestamp", "yesterday"),
    ] {
        let mut entry = Entry::new(EntryType::User);
        entry.set_fields(user_entry_fields(&cr_key)).unwrap();
        entry.set_field(field, value).unwrap();
        assert!(
            matches!(
                entry.check_fields(),
                Err(KeycardError::ComplianceFailure { field: ref f, .. }) if f == field
            ),
            "{}={} accepted",
            field,
            value
        );
    }

    for (field, _) in user_entry_fields(&cr_key) {
        let mut entry = Entry::new(EntryType::User);
        entry.set_fields(user_entry_fields(&cr_key)).unwrap();
        entry.remove_field(field);
        assert!(entry.check_fields().is_err(), "missing {} accepted", field);
    }
}

#[test]
fn test_policy_from_config_sets_hash_algorithm() {
    setup();
    let mut config = Config::default_config();
    config.keycard.hash_algorithm = "SHA-256".to_string();
    config.validate().unwrap();
    let policy = KeycardPolicy::from_config(&config.keycard).unwrap();

    let (card, signing) = org_card();
    let card = card.with_policy(policy);
    let outcome = card.chain(&signing.private(), false).unwrap();
    assert_eq!(
        outcome.entry.hash().unwrap().algorithm(),
        &Algorithm::Sha256
    );

    let mut card = card;
    card.append(outcome.entry).unwrap();
    assert!(card.verify().is_ok());
}

#[test]
fn test_keycard_file_roundtrip() {
    setup();
    let path = temp_path("card");
    let (mut card, signing) = org_card();
    extend_org(&mut card, signing, 2);

    card.save(&path, false).expect("Failed to save keycard");
    let text = std::fs::read_to_string(&path).unwrap();
    assert_eq!(text.matches("----- BEGIN ENTRY -----\r\n").count(), 3);
    assert_eq!(text.matches("----- END ENTRY -----\r\n").count(), 3);

    assert!(matches!(
        card.save(&path, false),
        Err(KeycardError::Io(ref e)) if e.kind() == std::io::ErrorKind::AlreadyExists
    ));
    card.save(&path, true).expect("Clobbering save failed");

    let loaded = Keycard::load(&path).expect("Failed to load keycard");
    assert_eq!(loaded.subject_type(), EntryType::Organization);
    assert_eq!(loaded.entries(), card.entries());
    assert!(loaded.verify().is_ok());

    std::fs::remove_file(&path).ok();
}

#[test]
fn test_keycard_file_errors() {
    setup();
    let path = temp_path("bad_card");

    std::fs::write(&path, "----- BEGIN ENTRY -----\r\nType:Organization\r\n").unwrap();
    assert!(matches!(Keycard::load(&path), Err(KeycardError::Parse { .. })));

    std::fs::write(&path, "----- END ENTRY -----\r\n").unwrap();
    assert!(matches!(
        Keycard::load(&path),
        Err(KeycardError::Parse { line: 1, .. })
    ));

    std::fs::write(&path, "\r\n").unwrap();
    assert!(matches!(Keycard::load(&path), Err(KeycardError::EmptyKeycard)));

    std::fs::remove_file(&path).ok();
    assert!(matches!(Keycard::load(&path), Err(KeycardError::Io(_))));
}

fn exercise_store<S: EntryStore>(store: &mut S) {
    let (mut card, signing) = org_card();
    let signing = extend_org(&mut card, signing, 2);

    assert_eq!(card.persist("example.com", store).unwrap(), 3);
    assert_eq!(card.persist("example.com", store).unwrap(), 0);
    assert_eq!(store.latest_index("example.com").unwrap(), Some(3));

    extend_org(&mut card, signing, 1);
    assert_eq!(card.persist("example.com", store).unwrap(), 1);

    let loaded = Keycard::load_from_store("example.com", EntryType::Organization, &*store).unwrap();
    assert_eq!(loaded.entries(), card.entries());
    assert!(loaded.verify().is_ok());

    // A different card cannot be written over the stored history
    let (other, other_key) = org_card();
    let mut other = other;
    extend_org(&mut other, other_key, 4);
    assert!(matches!(
        other.persist("example.com", store),
        Err(KeycardError::ChainLinkMismatch { index: 4, .. })
    ));

    assert!(matches!(
        store.insert("example.com", 1, b"replacement", "hash"),
        Err(KeycardError::DuplicateEntry { .. })
    ));
    assert!(matches!(
        Keycard::load_from_store("nobody.example", EntryType::Organization, &*store),
        Err(KeycardError::EmptyKeycard)
    ));
}

#[test]
fn test_memory_store_persistence() {
    setup();
    let mut store = MemoryEntryStore::new();
    exercise_store(&mut store);
}

#[cfg(feature = "sqlite")]
#[test]
fn test_sqlite_store_persistence() {
    use cardchain_identity::SqliteEntryStore;

    setup();
    let path = temp_path("store").with_extension("db");
    let mut config = Config::default_config();
    config.storage.database_path = path.clone();

    {
        let mut store = SqliteEntryStore::from_config(&config.storage).unwrap();
        exercise_store(&mut store);
    }

    let store = SqliteEntryStore::open(&path).unwrap();
    assert_eq!(store.latest_index("example.com").unwrap(), Some(4));
    drop(store);

    std::fs::remove_file(&path).ok();
    std::fs::remove_file(path.with_extension("db-wal")).ok();
    std::fs::remove_file(path.with_extension("db-shm")).ok();
}

#[test]
fn test_store_detects_swapped_record() {
    setup();
    let mut store = MemoryEntryStore::new();
    let (card, _) = org_card();
    let entry = card.get(0).unwrap();

    store
        .insert("example.com", 1, &entry.to_bytes(), "BLAKE2B-256:AAAA")
        .unwrap();
    assert!(matches!(
        Keycard::load_from_store("example.com", EntryType::Organization, &store),
        Err(KeycardError::HashMismatch)
    ));
}

struct MockTransport {
    status: u16,
    sent: Vec<Vec<u8>>,
}

impl EntryTransport for MockTransport {
    fn send_entry(&mut self, entry: &[u8]) -> KeycardResult<u16> {
        self.sent.push(entry.to_vec());
        Ok(self.status)
    }
}

#[test]
fn test_submit_entry() {
    setup();
    let (card, signing) = org_card();
    let outcome = card.chain(&signing.private(), true).unwrap();

    let mut transport = MockTransport {
        status: 200,
        sent: Vec::new(),
    };
    submit_entry(&mut transport, &outcome.entry).unwrap();
    assert_eq!(transport.sent, vec![outcome.entry.to_bytes()]);

    let mut rejecting = MockTransport {
        status: 409,
        sent: Vec::new(),
    };
    assert!(matches!(
        submit_entry(&mut rejecting, &outcome.entry),
        Err(KeycardError::Transport { status: 409 })
    ));
}

#[test]
fn test_submit_refuses_incomplete_entry() {
    setup();
    let (_, org_key) = org_card();
    let (user, cr_key) = user_card(&org_key);
    let outcome = user.chain(&cr_key.private(), false).unwrap();

    let mut transport = MockTransport {
        status: 200,
        sent: Vec::new(),
    };
    assert!(matches!(
        submit_entry(&mut transport, &outcome.entry),
        Err(KeycardError::ComplianceFailure { .. })
    ));
    assert!(transport.sent.is_empty());
}
