use super::*;

const ISSUER: [u8; 8] = [0x54, 0x45, 0x53, 0x54, 0x53, 0x45, 0x43, 0x41];
const METER: [u8; 8] = [0x00, 0x0d, 0x6f, 0xff, 0xfe, 0x21, 0xae, 0x85];
const TRUST_CENTER: [u8; 8] = [0x00, 0x0d, 0x6f, 0xff, 0xfe, 0x10, 0x20, 0x30];

fn keys_generated(backend: &mut RustCryptoBackend, ticket: OperationTicket) -> PublicKey {
    backend.generate_keys(ticket).unwrap();
    match backend.poll() {
        Some(Completion::KeysGenerated {
            ticket: done,
            result: Ok(key),
        }) => {
            assert_eq!(done, ticket);
            key
        }
        other => panic!("Unexpected completion {:?}", other),
    }
}

fn smacs_calculated(
    backend: &mut RustCryptoBackend,
    ticket: OperationTicket,
    am_initiator: bool,
    certificate: &Certificate,
    key: &PublicKey,
) -> (Smac, Smac) {
    backend
        .calculate_smacs(ticket, am_initiator, certificate, key)
        .unwrap();
    match backend.poll() {
        Some(Completion::SmacsCalculated {
            ticket: done,
            result: Ok(smacs),
        }) => {
            assert_eq!(done, ticket);
            smacs
        }
        other => panic!("Unexpected completion {:?}", other),
    }
}

#[test]
fn test_mmo_hash_single_byte() {
    // Zigbee specification C.5.1
    let hash = mmo_hash(&[&[0xc0]]);
    assert_eq!(
        hash,
        [
            0xae, 0x3a, 0x10, 0x2a, 0x28, 0xd4, 0x3e, 0xe0, 0xd4, 0xa0, 0x9e, 0x22, 0x78, 0x8b,
            0x20, 0x6c
        ]
    );
}

#[test]
fn test_mmo_hash_split_input() {
    let data = [0x5au8; 40];
    let whole = mmo_hash(&[&data]);
    let split = mmo_hash(&[&data[..3], &data[3..17], &data[17..]]);
    assert_eq!(whole, split);

    // Fourteen bytes forces the padding into a extra block
    let short = mmo_hash(&[&data[..14]]);
    let shorter = mmo_hash(&[&data[..13]]);
    assert_ne!(short, shorter);
}

#[test]
fn test_mmo_hash_long_message() {
    // From 2^16 bits the bit length takes four bytes, followed by two zeros
    let data = [0xa5u8; 8192];
    let mut padded = MmoHash::new();
    padded.update(&data);
    padded.update(&[0x80, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x00, 0x01, 0x00, 0x00, 0, 0]);
    assert_eq!(padded.used, 0);
    assert_eq!(mmo_hash(&[&data]), padded.state);

    let mut padded = MmoHash::new();
    padded.update(&data[..8191]);
    padded.update(&[0x80, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0xff, 0xf8]);
    assert_eq!(padded.used, 0);
    assert_eq!(mmo_hash(&[&data[..8191]]), padded.state);
}

#[test]
fn test_hmac() {
    // Zigbee specification C.6.1
    let key = [
        0x40, 0x41, 0x42, 0x43, 0x44, 0x45, 0x46, 0x47, 0x48, 0x49, 0x4a, 0x4b, 0x4c, 0x4d, 0x4e,
        0x4f,
    ];
    let mac = hmac(&key, &[&[0xc0]]);
    assert_eq!(
        mac,
        [
            0x45, 0x12, 0x80, 0x7b, 0xf9, 0x4c, 0xb3, 0x40, 0x0f, 0x0e, 0x2c, 0x25, 0xfb, 0x76,
            0xe9, 0x99
        ]
    );
}

#[test]
fn test_make_certificate() {
    let certificate = make_certificate(METER, ISSUER);
    assert_eq!(certificate.subject(), METER);
    assert_eq!(certificate.issuer(), ISSUER);
    assert_eq!(certificate.as_bytes()[0], 0x02);
    assert_ne!(certificate, make_certificate(TRUST_CENTER, ISSUER));
}

#[test]
fn test_both_sides_agree() {
    let initiator_certificate = make_certificate(METER, ISSUER);
    let responder_certificate = make_certificate(TRUST_CENTER, ISSUER);
    let mut initiator = RustCryptoBackend::new(initiator_certificate);
    let mut responder = RustCryptoBackend::new(responder_certificate);

    let initiator_key = keys_generated(&mut initiator, OperationTicket::new(1));
    let responder_key = keys_generated(&mut responder, OperationTicket::new(7));
    assert_ne!(initiator_key, responder_key);

    let (initiator_smac, responder_smac) = smacs_calculated(
        &mut initiator,
        OperationTicket::new(2),
        true,
        &responder_certificate,
        &responder_key,
    );
    let (initiator_smac_remote, responder_smac_remote) = smacs_calculated(
        &mut responder,
        OperationTicket::new(8),
        false,
        &initiator_certificate,
        &initiator_key,
    );
    assert_eq!(initiator_smac, initiator_smac_remote);
    assert_eq!(responder_smac, responder_smac_remote);
    assert_ne!(initiator_smac, responder_smac);

    initiator.clear_temporary_data(true).unwrap();
    responder.clear_temporary_data(true).unwrap();
    let initiator_link = initiator.link_key().unwrap();
    let responder_link = responder.link_key().unwrap();
    assert_eq!(initiator_link.key, responder_link.key);
    assert_eq!(initiator_link.partner, TRUST_CENTER);
    assert_eq!(responder_link.partner, METER);
}

#[test]
fn test_keys_differ_per_exchange() {
    let mut backend = RustCryptoBackend::new(make_certificate(METER, ISSUER));
    let first = keys_generated(&mut backend, OperationTicket::new(1));
    let second = keys_generated(&mut backend, OperationTicket::new(2));
    assert_ne!(first, second);
}

#[test]
fn test_one_operation_at_a_time() {
    let mut backend = RustCryptoBackend::new(make_certificate(METER, ISSUER));
    backend.generate_keys(OperationTicket::new(1)).unwrap();
    assert_eq!(
        backend.generate_keys(OperationTicket::new(2)),
        Err(Error::OperationInProgress)
    );
    assert!(backend.poll().is_some());
    assert!(backend.poll().is_none());
}

#[test]
fn test_smacs_need_ephemeral_key() {
    let partner = make_certificate(TRUST_CENTER, ISSUER);
    let mut backend = RustCryptoBackend::new(make_certificate(METER, ISSUER));
    let key = PublicKey::new([0x03; PUBLIC_KEY_SIZE]);
    backend
        .calculate_smacs(OperationTicket::new(1), true, &partner, &key)
        .unwrap();
    match backend.poll() {
        Some(Completion::SmacsCalculated { result, .. }) => {
            assert_eq!(result, Err(Error::OperationNotAvailable));
        }
        other => panic!("Unexpected completion {:?}", other),
    }
}

#[test]
fn test_failing_operations() {
    let mut backend = RustCryptoBackend::new(make_certificate(METER, ISSUER));
    backend.set_fail_operations(true);
    backend.generate_keys(OperationTicket::new(3)).unwrap();
    match backend.poll() {
        Some(Completion::KeysGenerated { ticket, result }) => {
            assert_eq!(ticket, OperationTicket::new(3));
            assert_eq!(result, Err(Error::BackendError));
        }
        other => panic!("Unexpected completion {:?}", other),
    }
}

#[test]
fn test_storage() {
    let partner_certificate = make_certificate(TRUST_CENTER, ISSUER);
    let mut partner = RustCryptoBackend::new(partner_certificate);
    let mut backend = RustCryptoBackend::new(make_certificate(METER, ISSUER));

    // Nothing derived yet
    assert_eq!(
        backend.clear_temporary_data(true),
        Err(Error::OperationNotAvailable)
    );
    assert_eq!(backend.clear_temporary_data(false), Ok(()));

    let partner_key = keys_generated(&mut partner, OperationTicket::new(1));
    keys_generated(&mut backend, OperationTicket::new(1));
    smacs_calculated(
        &mut backend,
        OperationTicket::new(2),
        true,
        &partner_certificate,
        &partner_key,
    );
    backend.set_fail_storage(true);
    assert_eq!(
        backend.clear_temporary_data(true),
        Err(Error::StorageFailure)
    );
    assert!(backend.link_key().is_none());
}

#[test]
fn test_without_certificate() {
    let mut backend = RustCryptoBackend::default();
    assert!(!backend.is_available());
    assert_eq!(backend.local_certificate(), Err(Error::NoCertificate));
    backend.generate_keys(OperationTicket::new(1)).unwrap();
    match backend.poll() {
        Some(Completion::KeysGenerated { result, .. }) => {
            assert_eq!(result, Err(Error::NoCertificate));
        }
        other => panic!("Unexpected completion {:?}", other),
    }
}
