//! # Addresses used in the network

use core::default::Default;

use crate::pack::PackFixed;
use crate::Error;

use byteorder::{BigEndian, ByteOrder, LittleEndian};

/// Short address size
pub const SHORT_ADDRESS_SIZE: usize = 2;
/// Short address, broadcast address
pub const SHORT_ADDRESS_BROADCAST: u16 = 0xffff;
/// Short address of the trust center
pub const TRUST_CENTER_ADDRESS: u16 = 0x0000;

/// 16-bit short address
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ShortAddress(u16);

impl ShortAddress {
    /// Create from a 16-bit value
    pub const fn new(value: u16) -> Self {
        Self(value)
    }

    /// The broadcast address
    pub fn broadcast() -> Self {
        Self(SHORT_ADDRESS_BROADCAST)
    }

    /// The address of the trust center
    pub fn trust_center() -> Self {
        Self(TRUST_CENTER_ADDRESS)
    }

    /// Check if this is the broadcast address
    pub fn is_broadcast(self) -> bool {
        self.0 == SHORT_ADDRESS_BROADCAST
    }

    /// Check if this is the address of the trust center
    pub fn is_trust_center(self) -> bool {
        self.0 == TRUST_CENTER_ADDRESS
    }
}

impl PackFixed<ShortAddress, Error> for ShortAddress {
    fn pack(&self, data: &mut [u8]) -> Result<(), Error> {
        if data.len() == SHORT_ADDRESS_SIZE {
            LittleEndian::write_u16(data, self.0);
            Ok(())
        } else {
            Err(Error::NotEnoughSpace)
        }
    }

    fn unpack(data: &[u8]) -> Result<Self, Error> {
        if data.len() == SHORT_ADDRESS_SIZE {
            Ok(ShortAddress(LittleEndian::read_u16(data)))
        } else {
            Err(Error::WrongNumberOfBytes)
        }
    }
}

impl From<u16> for ShortAddress {
    fn from(value: u16) -> Self {
        ShortAddress(value)
    }
}

impl From<ShortAddress> for u16 {
    fn from(value: ShortAddress) -> Self {
        value.0
    }
}

impl PartialEq<u16> for ShortAddress {
    fn eq(&self, other: &u16) -> bool {
        self.0 == *other
    }
}

impl Default for ShortAddress {
    fn default() -> Self {
        Self(SHORT_ADDRESS_BROADCAST)
    }
}

impl core::fmt::Display for ShortAddress {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:04x}", self.0)
    }
}

/// 16-bit network address
pub type NetworkAddress = ShortAddress;
/// 16-bit personal area network (PAN) identifier
pub type PanIdentifier = ShortAddress;

/// Extended IEEE address size
pub const EXTENDED_ADDRESS_SIZE: usize = 8;
/// Extended IEEE address, broadcast address
pub const EXTENDED_ADDRESS_BROADCAST: u64 = 0xffff_ffff_ffff_ffffu64;

/// 64-bit extended IEEE address
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ExtendedAddress(u64);

impl ExtendedAddress {
    /// Create from a 64-bit value
    pub const fn new(address: u64) -> Self {
        Self(address)
    }

    /// The broadcast address
    pub fn broadcast() -> Self {
        Self(EXTENDED_ADDRESS_BROADCAST)
    }

    /// Check if this is the broadcast address
    pub fn is_broadcast(self) -> bool {
        self.0 == EXTENDED_ADDRESS_BROADCAST
    }

    /// Read a address stored most significant byte first, as in certificates
    pub fn from_big_endian(data: &[u8; EXTENDED_ADDRESS_SIZE]) -> Self {
        Self(BigEndian::read_u64(&data[..]))
    }

    /// Address with the most significant byte first
    pub fn to_big_endian(self) -> [u8; EXTENDED_ADDRESS_SIZE] {
        let mut data = [0u8; EXTENDED_ADDRESS_SIZE];
        BigEndian::write_u64(&mut data, self.0);
        data
    }
}

impl PackFixed<ExtendedAddress, Error> for ExtendedAddress {
    fn pack(&self, data: &mut [u8]) -> Result<(), Error> {
        if data.len() == EXTENDED_ADDRESS_SIZE {
            LittleEndian::write_u64(data, self.0);
            Ok(())
        } else {
            Err(Error::NotEnoughSpace)
        }
    }

    fn unpack(data: &[u8]) -> Result<Self, Error> {
        if data.len() == EXTENDED_ADDRESS_SIZE {
            Ok(ExtendedAddress(LittleEndian::read_u64(data)))
        } else {
            Err(Error::WrongNumberOfBytes)
        }
    }
}

impl From<u64> for ExtendedAddress {
    fn from(value: u64) -> Self {
        ExtendedAddress(value)
    }
}

impl From<ExtendedAddress> for u64 {
    fn from(value: ExtendedAddress) -> Self {
        value.0
    }
}

impl PartialEq<u64> for ExtendedAddress {
    fn eq(&self, other: &u64) -> bool {
        self.0 == *other
    }
}

impl Default for ExtendedAddress {
    fn default() -> Self {
        Self(EXTENDED_ADDRESS_BROADCAST)
    }
}

impl core::fmt::Display for ExtendedAddress {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let bytes = self.to_big_endian();
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
        )
    }
}

#[cfg(all(test, not(feature = "core")))]
mod tests {
    use super::*;

    #[test]
    fn short_address() {
        let a = ShortAddress::unpack(&[0x81, 0x45]).unwrap();
        assert_eq!(format!("{}", a), "4581");
        assert_eq!(a, 0x4581);
        let mut buf = [0; 2];
        a.pack(&mut buf).unwrap();
        assert_eq!(buf, [0x81, 0x45]);
        assert!(ShortAddress::new(0).is_trust_center());
        assert!(!a.is_trust_center());
        assert_eq!(ShortAddress::unpack(&[0x00]), Err(Error::WrongNumberOfBytes));
    }

    #[test]
    fn extended_address() {
        let a = ExtendedAddress::unpack(&[0x99, 0x88, 0x77, 0x66, 0x55, 0x44, 0x33, 0x22]).unwrap();
        assert_eq!(format!("{}", a), "22:33:44:55:66:77:88:99");
        assert_eq!(a, 0x2233_4455_6677_8899);
        let mut buf = [0; 8];
        a.pack(&mut buf).unwrap();
        assert_eq!(buf, [0x99, 0x88, 0x77, 0x66, 0x55, 0x44, 0x33, 0x22]);
    }

    #[test]
    fn extended_address_big_endian() {
        let subject = [0x00, 0x0d, 0x6f, 0x00, 0x00, 0x19, 0x8b, 0x36];
        let a = ExtendedAddress::from_big_endian(&subject);
        assert_eq!(a, 0x000d_6f00_0019_8b36);
        assert_eq!(a.to_big_endian(), subject);
    }
}
