#![no_std]
#![warn(missing_docs)]

//! Traits and types for the crypto backend used in Psila key establishment
//!
//! The certificate based key establishment (CBKE) performs its public key
//! operations asynchronously. A backend is asked to start an operation and
//! later hands back a [`Completion`] tagged with the [`OperationTicket`] that
//! was given when the operation was started.

use core::convert::TryFrom;

/// Cipher block length
pub const BLOCK_SIZE: usize = 16;
/// Key length,
///
/// 128-bit keys are used
pub const KEY_SIZE: usize = 16;
/// Size of an implicit certificate
pub const CERTIFICATE_SIZE: usize = 48;
/// Size of a compressed public key
pub const PUBLIC_KEY_SIZE: usize = 22;
/// Size of a secure message authentication code (SMAC)
pub const SMAC_SIZE: usize = 16;
/// Offset of the subject in a certificate, after the public key reconstruction data
pub const CERTIFICATE_SUBJECT_OFFSET: usize = 22;
/// Offset of the issuer in a certificate
pub const CERTIFICATE_ISSUER_OFFSET: usize = CERTIFICATE_SUBJECT_OFFSET + 8;
/// Size of the subject and issuer fields
pub const CERTIFICATE_IDENTIFIER_SIZE: usize = 8;

/// Crypto backend error codes
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Error {
    /// Operation is not implemented
    NotImplemented,
    /// The key have a invalid size
    InvalidKeySize,
    /// The key has invalid data
    InvalidKey,
    /// The data has a invalid size
    InvalidDataSize,
    /// There is no local certificate
    NoCertificate,
    /// Another operation is already in progress
    OperationInProgress,
    /// Operation not available
    OperationNotAvailable,
    /// The link key could not be stored
    StorageFailure,
    /// Generic backend error
    BackendError,
    /// Other error, probably a error code from the backend
    Other(u32),
}

macro_rules! credential {
    ($(#[$outer:meta])* $name:ident, $size:expr) => {
        $(#[$outer])*
        #[derive(Copy, Clone, Debug, PartialEq)]
        pub struct $name([u8; $size]);

        impl $name {
            /// Create from raw bytes
            pub const fn new(data: [u8; $size]) -> Self {
                Self(data)
            }

            /// Raw bytes
            pub fn as_bytes(&self) -> &[u8; $size] {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self([0u8; $size])
            }
        }

        impl TryFrom<&[u8]> for $name {
            type Error = Error;

            fn try_from(data: &[u8]) -> Result<Self, Self::Error> {
                if data.len() != $size {
                    return Err(Error::InvalidDataSize);
                }
                let mut value = [0u8; $size];
                value.copy_from_slice(data);
                Ok(Self(value))
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0[..]
            }
        }
    };
}

credential!(
    /// Implicit ECQV certificate
    ///
    /// 22 bytes of public key reconstruction data, 8 bytes subject,
    /// 8 bytes issuer and 10 bytes of profile attribute data.
    Certificate,
    CERTIFICATE_SIZE
);

credential!(
    /// Compressed elliptic curve public key
    PublicKey,
    PUBLIC_KEY_SIZE
);

credential!(
    /// Secure message authentication code
    Smac,
    SMAC_SIZE
);

impl Certificate {
    /// Subject of the certificate, a big endian EUI-64
    pub fn subject(&self) -> [u8; CERTIFICATE_IDENTIFIER_SIZE] {
        let mut subject = [0u8; CERTIFICATE_IDENTIFIER_SIZE];
        subject.copy_from_slice(
            &self.0[CERTIFICATE_SUBJECT_OFFSET
                ..CERTIFICATE_SUBJECT_OFFSET + CERTIFICATE_IDENTIFIER_SIZE],
        );
        subject
    }

    /// Issuer of the certificate
    pub fn issuer(&self) -> [u8; CERTIFICATE_IDENTIFIER_SIZE] {
        let mut issuer = [0u8; CERTIFICATE_IDENTIFIER_SIZE];
        issuer.copy_from_slice(
            &self.0[CERTIFICATE_ISSUER_OFFSET
                ..CERTIFICATE_ISSUER_OFFSET + CERTIFICATE_IDENTIFIER_SIZE],
        );
        issuer
    }
}

/// Identifies one asynchronous operation
///
/// Each started operation gets a new ticket, a completion carrying any other
/// ticket is stale.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct OperationTicket(u16);

impl OperationTicket {
    /// Create a ticket with the given epoch
    pub const fn new(epoch: u16) -> Self {
        Self(epoch)
    }

    /// The following ticket
    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }

    /// Epoch of the ticket
    pub fn epoch(self) -> u16 {
        self.0
    }
}

/// Result of a finished asynchronous operation
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Completion {
    /// Ephemeral key generation finished
    KeysGenerated {
        /// Ticket given when the operation was started
        ticket: OperationTicket,
        /// The local ephemeral public key
        result: Result<PublicKey, Error>,
    },
    /// Shared secret and SMAC calculation finished
    SmacsCalculated {
        /// Ticket given when the operation was started
        ticket: OperationTicket,
        /// Initiator and responder SMAC
        result: Result<(Smac, Smac), Error>,
    },
}

/// Trait for implementing a CBKE crypto backend
pub trait CbkeBackend {
    /// Check that the backend has a certificate and the required libraries
    fn is_available(&self) -> bool;

    /// Get the local certificate
    fn local_certificate(&self) -> Result<Certificate, Error>;

    /// Start generating a ephemeral key pair
    fn generate_keys(&mut self, ticket: OperationTicket) -> Result<(), Error>;

    /// Start calculating the shared secret and the SMACs
    fn calculate_smacs(
        &mut self,
        ticket: OperationTicket,
        // The local side initiated the key establishment
        am_initiator: bool,
        // Certificate of the partner
        partner_certificate: &Certificate,
        // Ephemeral public key of the partner
        partner_key: &PublicKey,
    ) -> Result<(), Error>;

    /// Clear temporary data, storing the derived link key if requested
    fn clear_temporary_data(&mut self, store_link_key: bool) -> Result<(), Error>;

    /// Fetch a finished operation
    fn poll(&mut self) -> Option<Completion> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn certificate_fields() {
        let mut data = [0u8; CERTIFICATE_SIZE];
        for (n, b) in data.iter_mut().enumerate() {
            *b = n as u8;
        }
        let certificate = Certificate::new(data);
        assert_eq!(
            certificate.subject(),
            [0x16, 0x17, 0x18, 0x19, 0x1a, 0x1b, 0x1c, 0x1d]
        );
        assert_eq!(
            certificate.issuer(),
            [0x1e, 0x1f, 0x20, 0x21, 0x22, 0x23, 0x24, 0x25]
        );
    }

    #[test]
    fn credential_from_slice() {
        let data = [0x5a; 24];
        assert_eq!(PublicKey::try_from(&data[..22]), Ok(PublicKey::new([0x5a; 22])));
        assert_eq!(PublicKey::try_from(&data[..]), Err(Error::InvalidDataSize));
        assert_eq!(Smac::try_from(&data[..16]).map(|s| s.as_bytes()[0]), Ok(0x5a));
    }

    #[test]
    fn ticket_wraps() {
        let ticket = OperationTicket::new(0xffff);
        assert_eq!(ticket.next(), OperationTicket::new(0));
        assert_ne!(ticket, ticket.next());
    }
}
