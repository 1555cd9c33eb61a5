//! # Software CBKE backend
//!
//! A deterministic stand-in for the elliptic curve engine, built on the
//! Zigbee AES-128 Matyas-Meyer-Oseas (MMO) hash. Both sides of a exchange
//! derive the same shared secret from the two certificates and the two
//! ephemeral keys, so key establishment can run end to end on a host. It
//! offers no security and is not ECMQV.
//!
//! Operations complete on the next call to `poll`.

#![no_std]

use aes::{
    cipher::{generic_array::GenericArray, BlockEncrypt, KeyInit},
    Aes128,
};

use psila_crypto::{
    CbkeBackend, Certificate, Completion, Error, OperationTicket, PublicKey, Smac, BLOCK_SIZE,
    CERTIFICATE_IDENTIFIER_SIZE, CERTIFICATE_ISSUER_OFFSET, CERTIFICATE_SIZE,
    CERTIFICATE_SUBJECT_OFFSET, KEY_SIZE, PUBLIC_KEY_SIZE,
};

#[cfg(test)]
mod test;

/// Zigbee AES-MMO hash, see B.6 in the Zigbee specification
pub struct MmoHash {
    state: [u8; BLOCK_SIZE],
    block: [u8; BLOCK_SIZE],
    used: usize,
    length: usize,
}

impl MmoHash {
    pub fn new() -> Self {
        Self {
            state: [0u8; BLOCK_SIZE],
            block: [0u8; BLOCK_SIZE],
            used: 0,
            length: 0,
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        for byte in data {
            self.block[self.used] = *byte;
            self.used += 1;
            self.length += 1;
            if self.used == BLOCK_SIZE {
                self.process_block();
            }
        }
    }

    /// Pad and process the last block
    ///
    /// Messages shorter than 2^16 bits end with a 16-bit bit length, longer
    /// ones with a 32-bit bit length followed by two zero bytes.
    pub fn finish(mut self) -> [u8; BLOCK_SIZE] {
        let bits = (self.length as u64) * 8;
        debug_assert!(bits <= u64::from(u32::MAX), "Message too long for AES-MMO");
        let trailer = if bits < 0x1_0000 { 2 } else { 6 };
        self.block[self.used] = 0x80;
        self.used += 1;
        if self.used > BLOCK_SIZE - trailer {
            for b in self.block[self.used..].iter_mut() {
                *b = 0;
            }
            self.process_block();
        }
        for b in self.block[self.used..BLOCK_SIZE - trailer].iter_mut() {
            *b = 0;
        }
        if trailer == 2 {
            self.block[BLOCK_SIZE - 2..].copy_from_slice(&(bits as u16).to_be_bytes());
        } else {
            self.block[BLOCK_SIZE - 6..BLOCK_SIZE - 2]
                .copy_from_slice(&(bits as u32).to_be_bytes());
            self.block[BLOCK_SIZE - 2..].copy_from_slice(&[0, 0]);
        }
        self.process_block();
        self.state
    }

    fn process_block(&mut self) {
        let cipher = Aes128::new(GenericArray::from_slice(&self.state));
        let mut output = aes::Block::clone_from_slice(&self.block);
        cipher.encrypt_block(&mut output);
        // XOR the input into the hash block
        for n in 0..BLOCK_SIZE {
            self.state[n] = output[n] ^ self.block[n];
        }
        self.used = 0;
    }
}

impl Default for MmoHash {
    fn default() -> Self {
        Self::new()
    }
}

/// Hash the concatenation of the parts
pub fn mmo_hash(parts: &[&[u8]]) -> [u8; BLOCK_SIZE] {
    let mut hash = MmoHash::new();
    for part in parts {
        hash.update(part);
    }
    hash.finish()
}

/// FIPS Pub 198 HMAC using the MMO hash
pub fn hmac(key: &[u8; KEY_SIZE], parts: &[&[u8]]) -> [u8; BLOCK_SIZE] {
    const HASH_INNER_PAD: u8 = 0x36;
    const HASH_OUTER_PAD: u8 = 0x5c;
    let mut inner_key = [0u8; KEY_SIZE];
    let mut outer_key = [0u8; KEY_SIZE];
    for n in 0..KEY_SIZE {
        inner_key[n] = key[n] ^ HASH_INNER_PAD;
        outer_key[n] = key[n] ^ HASH_OUTER_PAD;
    }
    let mut inner = MmoHash::new();
    inner.update(&inner_key);
    for part in parts {
        inner.update(part);
    }
    let inner = inner.finish();
    mmo_hash(&[&outer_key, &inner])
}

/// Build a certificate for the subject, signed by the issuer
pub fn make_certificate(
    subject: [u8; CERTIFICATE_IDENTIFIER_SIZE],
    issuer: [u8; CERTIFICATE_IDENTIFIER_SIZE],
) -> Certificate {
    let mut data = [0u8; CERTIFICATE_SIZE];
    let reconstruction = mmo_hash(&[&subject, &issuer]);
    data[0] = 0x02;
    data[1..=BLOCK_SIZE].copy_from_slice(&reconstruction);
    let extra = mmo_hash(&[&reconstruction]);
    data[BLOCK_SIZE + 1..CERTIFICATE_SUBJECT_OFFSET]
        .copy_from_slice(&extra[..CERTIFICATE_SUBJECT_OFFSET - BLOCK_SIZE - 1]);
    data[CERTIFICATE_SUBJECT_OFFSET..CERTIFICATE_ISSUER_OFFSET].copy_from_slice(&subject);
    data[CERTIFICATE_ISSUER_OFFSET..CERTIFICATE_ISSUER_OFFSET + CERTIFICATE_IDENTIFIER_SIZE]
        .copy_from_slice(&issuer);
    Certificate::new(data)
}

/// Link key derived by a completed key establishment
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LinkKey {
    /// Subject of the partner certificate, big endian EUI-64
    pub partner: [u8; CERTIFICATE_IDENTIFIER_SIZE],
    /// The derived key
    pub key: [u8; KEY_SIZE],
}

/// Software CBKE backend
pub struct RustCryptoBackend {
    certificate: Option<Certificate>,
    counter: u32,
    ephemeral_key: Option<PublicKey>,
    derived_key: Option<LinkKey>,
    stored_key: Option<LinkKey>,
    completion: Option<Completion>,
    fail_operations: bool,
    fail_storage: bool,
}

impl RustCryptoBackend {
    pub fn new(certificate: Certificate) -> Self {
        Self {
            certificate: Some(certificate),
            ..Self::default()
        }
    }

    /// Make every following operation fail
    pub fn set_fail_operations(&mut self, fail: bool) {
        self.fail_operations = fail;
    }

    /// Make storing the link key fail
    pub fn set_fail_storage(&mut self, fail: bool) {
        self.fail_storage = fail;
    }

    /// The last stored link key
    pub fn link_key(&self) -> Option<&LinkKey> {
        self.stored_key.as_ref()
    }

    fn check_idle(&self) -> Result<(), Error> {
        if self.completion.is_some() {
            return Err(Error::OperationInProgress);
        }
        Ok(())
    }

    fn make_ephemeral_key(&mut self) -> Result<PublicKey, Error> {
        let certificate = self.certificate.ok_or(Error::NoCertificate)?;
        self.counter = self.counter.wrapping_add(1);
        let first = mmo_hash(&[certificate.as_bytes(), &self.counter.to_be_bytes()]);
        let second = mmo_hash(&[&first]);
        let mut data = [0u8; PUBLIC_KEY_SIZE];
        data[0] = 0x03;
        data[1..=BLOCK_SIZE].copy_from_slice(&first);
        data[BLOCK_SIZE + 1..].copy_from_slice(&second[..PUBLIC_KEY_SIZE - BLOCK_SIZE - 1]);
        Ok(PublicKey::new(data))
    }

    fn derive(
        &mut self,
        am_initiator: bool,
        partner_certificate: &Certificate,
        partner_key: &PublicKey,
    ) -> Result<(Smac, Smac), Error> {
        let certificate = self.certificate.ok_or(Error::NoCertificate)?;
        let key = self.ephemeral_key.ok_or(Error::OperationNotAvailable)?;
        let (initiator_certificate, initiator_key, responder_certificate, responder_key) =
            if am_initiator {
                (&certificate, &key, partner_certificate, partner_key)
            } else {
                (partner_certificate, partner_key, &certificate, &key)
            };
        let shared_secret = mmo_hash(&[
            initiator_certificate.as_bytes(),
            initiator_key.as_bytes(),
            responder_certificate.as_bytes(),
            responder_key.as_bytes(),
        ]);
        let mac_key = mmo_hash(&[&shared_secret, &[0x00, 0x00, 0x00, 0x01]]);
        let key_data = mmo_hash(&[&shared_secret, &[0x00, 0x00, 0x00, 0x02]]);
        let initiator = initiator_certificate.subject();
        let responder = responder_certificate.subject();
        let initiator_smac = hmac(
            &mac_key,
            &[
                &[0x02],
                &initiator,
                &responder,
                initiator_key.as_bytes(),
                responder_key.as_bytes(),
            ],
        );
        let responder_smac = hmac(
            &mac_key,
            &[
                &[0x03],
                &responder,
                &initiator,
                responder_key.as_bytes(),
                initiator_key.as_bytes(),
            ],
        );
        self.derived_key = Some(LinkKey {
            partner: partner_certificate.subject(),
            key: key_data,
        });
        Ok((Smac::new(initiator_smac), Smac::new(responder_smac)))
    }
}

impl Default for RustCryptoBackend {
    fn default() -> Self {
        Self {
            certificate: None,
            counter: 0,
            ephemeral_key: None,
            derived_key: None,
            stored_key: None,
            completion: None,
            fail_operations: false,
            fail_storage: false,
        }
    }
}

impl CbkeBackend for RustCryptoBackend {
    fn is_available(&self) -> bool {
        self.certificate.is_some()
    }

    fn local_certificate(&self) -> Result<Certificate, Error> {
        self.certificate.ok_or(Error::NoCertificate)
    }

    fn generate_keys(&mut self, ticket: OperationTicket) -> Result<(), Error> {
        self.check_idle()?;
        let result = if self.fail_operations {
            Err(Error::BackendError)
        } else {
            self.make_ephemeral_key()
        };
        self.ephemeral_key = result.ok();
        self.completion = Some(Completion::KeysGenerated { ticket, result });
        Ok(())
    }

    fn calculate_smacs(
        &mut self,
        ticket: OperationTicket,
        am_initiator: bool,
        partner_certificate: &Certificate,
        partner_key: &PublicKey,
    ) -> Result<(), Error> {
        self.check_idle()?;
        let result = if self.fail_operations {
            Err(Error::BackendError)
        } else {
            self.derive(am_initiator, partner_certificate, partner_key)
        };
        self.completion = Some(Completion::SmacsCalculated { ticket, result });
        Ok(())
    }

    fn clear_temporary_data(&mut self, store_link_key: bool) -> Result<(), Error> {
        let derived = self.derived_key.take();
        self.ephemeral_key = None;
        self.completion = None;
        if !store_link_key {
            return Ok(());
        }
        if self.fail_storage {
            return Err(Error::StorageFailure);
        }
        match derived {
            Some(key) => {
                self.stored_key = Some(key);
                Ok(())
            }
            None => Err(Error::OperationNotAvailable),
        }
    }

    fn poll(&mut self) -> Option<Completion> {
        self.completion.take()
    }
}
