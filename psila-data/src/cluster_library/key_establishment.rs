//! # Key establishment cluster
//!
//! Smart Energy certificate based key establishment (CBKE), cluster 0x0800.
//! The request and the response of each exchange share command identifier
//! and layout, the frame direction tells them apart.

use core::convert::TryFrom;

use byteorder::{ByteOrder, LittleEndian};
use psila_crypto::{Certificate, PublicKey, Smac, CERTIFICATE_SIZE, PUBLIC_KEY_SIZE, SMAC_SIZE};

use crate::pack::Pack;
use crate::Error;

/// Key establishment cluster identifier
pub const CLUSTER_IDENTIFIER: u16 = 0x0800;
/// Key establishment suite 1, CBKE with ECMQV
pub const SUITE_CBKE: u16 = 0x0001;
/// Reserved suite value, reported when no suite is available
pub const SUITE_INVALID: u16 = 0x0080;

/// Size of the initiate key establishment payload
pub const INITIATE_KEY_ESTABLISHMENT_SIZE: usize = 4 + CERTIFICATE_SIZE;
/// Size of the terminate key establishment payload
pub const TERMINATE_KEY_ESTABLISHMENT_SIZE: usize = 4;

extended_enum!(
    /// Key establishment command identifiers, same for both directions
    CommandIdentifier, u8,
    /// Initiate key establishment request or response
    InitiateKeyEstablishment => 0x00,
    /// Ephemeral data request or response
    EphemeralData => 0x01,
    /// Confirm key data request or response
    ConfirmKeyData => 0x02,
    /// Terminate key establishment
    TerminateKeyEstablishment => 0x03,
);

impl CommandIdentifier {
    /// Size of the command payload
    pub fn payload_size(self) -> usize {
        match self {
            CommandIdentifier::InitiateKeyEstablishment => INITIATE_KEY_ESTABLISHMENT_SIZE,
            CommandIdentifier::EphemeralData => PUBLIC_KEY_SIZE,
            CommandIdentifier::ConfirmKeyData => SMAC_SIZE,
            CommandIdentifier::TerminateKeyEstablishment => TERMINATE_KEY_ESTABLISHMENT_SIZE,
        }
    }
}

extended_enum!(
    /// Status carried by the terminate key establishment command
    KeyEstablishmentStatus, u8,
    /// Success
    Success => 0x00,
    /// The issuer of the certificate is not known
    UnknownIssuer => 0x01,
    /// The key confirmation failed
    BadKeyConfirm => 0x02,
    /// The received message was invalid
    BadMessage => 0x03,
    /// No resources to perform the key establishment
    NoResources => 0x04,
    /// The key establishment suite is not supported
    UnsupportedSuite => 0x05,
);

/// Initiate key establishment, carries the certificate
#[derive(Clone, Debug, PartialEq)]
pub struct InitiateKeyEstablishment {
    /// Requested key establishment suite
    pub suite: u16,
    /// Time in seconds the sender needs to generate ephemeral data
    pub ephemeral_data_generate_time: u8,
    /// Time in seconds the sender needs to generate the confirm key
    pub confirm_key_generate_time: u8,
    /// Certificate of the sender
    pub identity: Certificate,
}

impl Pack<InitiateKeyEstablishment, Error> for InitiateKeyEstablishment {
    fn pack(&self, data: &mut [u8]) -> Result<usize, Error> {
        if data.len() < INITIATE_KEY_ESTABLISHMENT_SIZE {
            return Err(Error::NotEnoughSpace);
        }
        LittleEndian::write_u16(&mut data[0..2], self.suite);
        data[2] = self.ephemeral_data_generate_time;
        data[3] = self.confirm_key_generate_time;
        data[4..INITIATE_KEY_ESTABLISHMENT_SIZE].copy_from_slice(self.identity.as_bytes());
        Ok(INITIATE_KEY_ESTABLISHMENT_SIZE)
    }

    fn unpack(data: &[u8]) -> Result<(Self, usize), Error> {
        if data.len() < INITIATE_KEY_ESTABLISHMENT_SIZE {
            return Err(Error::WrongNumberOfBytes);
        }
        let identity = Certificate::try_from(&data[4..INITIATE_KEY_ESTABLISHMENT_SIZE])?;
        Ok((
            Self {
                suite: LittleEndian::read_u16(&data[0..2]),
                ephemeral_data_generate_time: data[2],
                confirm_key_generate_time: data[3],
                identity,
            },
            INITIATE_KEY_ESTABLISHMENT_SIZE,
        ))
    }
}

/// Ephemeral data, carries the ephemeral public key
#[derive(Clone, Debug, PartialEq)]
pub struct EphemeralData {
    /// Ephemeral public key of the sender
    pub data: PublicKey,
}

impl Pack<EphemeralData, Error> for EphemeralData {
    fn pack(&self, data: &mut [u8]) -> Result<usize, Error> {
        if data.len() < PUBLIC_KEY_SIZE {
            return Err(Error::NotEnoughSpace);
        }
        data[..PUBLIC_KEY_SIZE].copy_from_slice(self.data.as_bytes());
        Ok(PUBLIC_KEY_SIZE)
    }

    fn unpack(data: &[u8]) -> Result<(Self, usize), Error> {
        if data.len() < PUBLIC_KEY_SIZE {
            return Err(Error::WrongNumberOfBytes);
        }
        let key = PublicKey::try_from(&data[..PUBLIC_KEY_SIZE])?;
        Ok((Self { data: key }, PUBLIC_KEY_SIZE))
    }
}

/// Confirm key data, carries the SMAC
#[derive(Clone, Debug, PartialEq)]
pub struct ConfirmKeyData {
    /// Secure message authentication code
    pub mac: Smac,
}

impl Pack<ConfirmKeyData, Error> for ConfirmKeyData {
    fn pack(&self, data: &mut [u8]) -> Result<usize, Error> {
        if data.len() < SMAC_SIZE {
            return Err(Error::NotEnoughSpace);
        }
        data[..SMAC_SIZE].copy_from_slice(self.mac.as_bytes());
        Ok(SMAC_SIZE)
    }

    fn unpack(data: &[u8]) -> Result<(Self, usize), Error> {
        if data.len() < SMAC_SIZE {
            return Err(Error::WrongNumberOfBytes);
        }
        let mac = Smac::try_from(&data[..SMAC_SIZE])?;
        Ok((Self { mac }, SMAC_SIZE))
    }
}

/// Terminate key establishment
#[derive(Clone, Debug, PartialEq)]
pub struct TerminateKeyEstablishment {
    /// Status code, see `KeyEstablishmentStatus`
    pub status: u8,
    /// Seconds to wait before trying again
    pub wait_time: u8,
    /// Key establishment suite of the sender
    pub suite: u16,
}

impl TerminateKeyEstablishment {
    /// Status as `KeyEstablishmentStatus`, if the value is known
    pub fn status(&self) -> Option<KeyEstablishmentStatus> {
        KeyEstablishmentStatus::try_from(self.status).ok()
    }
}

impl Pack<TerminateKeyEstablishment, Error> for TerminateKeyEstablishment {
    fn pack(&self, data: &mut [u8]) -> Result<usize, Error> {
        if data.len() < TERMINATE_KEY_ESTABLISHMENT_SIZE {
            return Err(Error::NotEnoughSpace);
        }
        data[0] = self.status;
        data[1] = self.wait_time;
        LittleEndian::write_u16(&mut data[2..4], self.suite);
        Ok(TERMINATE_KEY_ESTABLISHMENT_SIZE)
    }

    fn unpack(data: &[u8]) -> Result<(Self, usize), Error> {
        if data.len() < TERMINATE_KEY_ESTABLISHMENT_SIZE {
            return Err(Error::WrongNumberOfBytes);
        }
        Ok((
            Self {
                status: data[0],
                wait_time: data[1],
                suite: LittleEndian::read_u16(&data[2..4]),
            },
            TERMINATE_KEY_ESTABLISHMENT_SIZE,
        ))
    }
}

/// Key establishment cluster command
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Initiate key establishment request or response
    InitiateKeyEstablishment(InitiateKeyEstablishment),
    /// Ephemeral data request or response
    EphemeralData(EphemeralData),
    /// Confirm key data request or response
    ConfirmKeyData(ConfirmKeyData),
    /// Terminate key establishment
    TerminateKeyEstablishment(TerminateKeyEstablishment),
}

impl Command {
    /// Command identifier
    pub fn identifier(&self) -> CommandIdentifier {
        match self {
            Command::InitiateKeyEstablishment(_) => CommandIdentifier::InitiateKeyEstablishment,
            Command::EphemeralData(_) => CommandIdentifier::EphemeralData,
            Command::ConfirmKeyData(_) => CommandIdentifier::ConfirmKeyData,
            Command::TerminateKeyEstablishment(_) => CommandIdentifier::TerminateKeyEstablishment,
        }
    }

    /// Serialise the command payload into the buffer
    pub fn pack(&self, data: &mut [u8]) -> Result<usize, Error> {
        match self {
            Command::InitiateKeyEstablishment(cmd) => cmd.pack(data),
            Command::EphemeralData(cmd) => cmd.pack(data),
            Command::ConfirmKeyData(cmd) => cmd.pack(data),
            Command::TerminateKeyEstablishment(cmd) => cmd.pack(data),
        }
    }

    /// De-serialise the payload of the command with the given identifier
    pub fn unpack(data: &[u8], identifier: u8) -> Result<(Self, usize), Error> {
        let identifier = CommandIdentifier::try_from(identifier)
            .map_err(|_| Error::UnknownClusterCommand)?;
        match identifier {
            CommandIdentifier::InitiateKeyEstablishment => {
                let (cmd, used) = InitiateKeyEstablishment::unpack(data)?;
                Ok((Command::InitiateKeyEstablishment(cmd), used))
            }
            CommandIdentifier::EphemeralData => {
                let (cmd, used) = EphemeralData::unpack(data)?;
                Ok((Command::EphemeralData(cmd), used))
            }
            CommandIdentifier::ConfirmKeyData => {
                let (cmd, used) = ConfirmKeyData::unpack(data)?;
                Ok((Command::ConfirmKeyData(cmd), used))
            }
            CommandIdentifier::TerminateKeyEstablishment => {
                let (cmd, used) = TerminateKeyEstablishment::unpack(data)?;
                Ok((Command::TerminateKeyEstablishment(cmd), used))
            }
        }
    }
}

#[cfg(all(test, not(feature = "core")))]
mod tests {
    use super::*;

    fn certificate() -> Certificate {
        let mut data = [0u8; CERTIFICATE_SIZE];
        for (n, b) in data.iter_mut().enumerate() {
            *b = 0x30 + n as u8;
        }
        Certificate::new(data)
    }

    #[test]
    fn unpack_initiate() {
        let mut data = [0u8; INITIATE_KEY_ESTABLISHMENT_SIZE];
        data[..4].copy_from_slice(&[0x01, 0x00, 0x0a, 0x0f]);
        data[4..].copy_from_slice(certificate().as_bytes());

        let (command, used) = Command::unpack(&data, 0x00).unwrap();
        assert_eq!(used, 52);
        assert_eq!(command.identifier(), CommandIdentifier::InitiateKeyEstablishment);
        match command {
            Command::InitiateKeyEstablishment(cmd) => {
                assert_eq!(cmd.suite, SUITE_CBKE);
                assert_eq!(cmd.ephemeral_data_generate_time, 10);
                assert_eq!(cmd.confirm_key_generate_time, 15);
                assert_eq!(cmd.identity, certificate());
            }
            _ => panic!("Invalid command"),
        }
    }

    #[test]
    fn unpack_short_payloads() {
        let data = [0u8; 51];
        assert_eq!(Command::unpack(&data, 0x00), Err(Error::WrongNumberOfBytes));
        assert_eq!(Command::unpack(&data[..21], 0x01), Err(Error::WrongNumberOfBytes));
        assert_eq!(Command::unpack(&data[..15], 0x02), Err(Error::WrongNumberOfBytes));
        assert_eq!(Command::unpack(&data[..3], 0x03), Err(Error::WrongNumberOfBytes));
        assert_eq!(Command::unpack(&data, 0x04), Err(Error::UnknownClusterCommand));
    }

    #[test]
    fn pack_terminate() {
        let mut data = [0u8; 8];
        let command = Command::TerminateKeyEstablishment(TerminateKeyEstablishment {
            status: KeyEstablishmentStatus::NoResources.into(),
            wait_time: 30,
            suite: SUITE_CBKE,
        });
        assert_eq!(command.pack(&mut data), Ok(4));
        assert_eq!(data[..4], [0x04, 0x1e, 0x01, 0x00]);
        assert_eq!(command.pack(&mut data[..3]), Err(Error::NotEnoughSpace));

        let (command, _) = TerminateKeyEstablishment::unpack(&[0x09, 0x05, 0x80, 0x00]).unwrap();
        assert_eq!(command.status(), None);
        assert_eq!(command.suite, SUITE_INVALID);
    }

    #[test]
    fn pack_ephemeral_and_confirm() {
        let mut data = [0u8; 32];
        let command = Command::EphemeralData(EphemeralData {
            data: PublicKey::new([0x03; PUBLIC_KEY_SIZE]),
        });
        assert_eq!(command.pack(&mut data), Ok(22));
        assert_eq!(data[21], 0x03);
        assert_eq!(data[22], 0x00);

        let command = Command::ConfirmKeyData(ConfirmKeyData {
            mac: Smac::new([0xa5; SMAC_SIZE]),
        });
        assert_eq!(command.pack(&mut data[..16]), Ok(16));
        let (unpacked, used) = Command::unpack(&data[..16], 0x02).unwrap();
        assert_eq!(used, 16);
        assert_eq!(unpacked, command);
    }

    #[test]
    fn payload_sizes() {
        assert_eq!(CommandIdentifier::InitiateKeyEstablishment.payload_size(), 52);
        assert_eq!(CommandIdentifier::EphemeralData.payload_size(), 22);
        assert_eq!(CommandIdentifier::ConfirmKeyData.payload_size(), 16);
        assert_eq!(CommandIdentifier::TerminateKeyEstablishment.payload_size(), 4);
    }
}
