use core::convert::TryFrom;

use crate::error::Error;
use crate::pack::{Pack, PackFixed};

use byteorder::{ByteOrder, LittleEndian};

// ZCL, 2.4.1.1.1 Frame Type Sub-field
/// Frame type field
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum FrameType {
    /// The command is global for all clusters
    Global = 0b00,
    /// Command is specific or local to a cluster
    Local = 0b01,
}

impl TryFrom<u8> for FrameType {
    type Error = Error;
    /// Get `FrameType` from a `u8`
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value & 0b11 {
            0b00 => Ok(FrameType::Global),
            0b01 => Ok(FrameType::Local),
            _ => Err(Error::UnknownFrameType),
        }
    }
}

/// Direction of the command
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Direction {
    /// Sent from the client side to the server side
    ToServer = 0,
    /// Sent from the server side to the client side
    ToClient = 1,
}

impl Direction {
    /// The direction of a reply
    pub fn reverse(self) -> Self {
        match self {
            Direction::ToServer => Direction::ToClient,
            Direction::ToClient => Direction::ToServer,
        }
    }
}

impl From<u8> for Direction {
    /// Get `Direction` from the frame control `u8`
    fn from(value: u8) -> Self {
        if value & 0b0000_1000 == 0b0000_1000 {
            Direction::ToClient
        } else {
            Direction::ToServer
        }
    }
}

impl From<Direction> for u8 {
    /// Get `u8` from `Direction`
    fn from(value: Direction) -> u8 {
        match value {
            Direction::ToServer => 0b0000_0000,
            Direction::ToClient => 0b0000_1000,
        }
    }
}

// ZCL, 2.4.1.1 Frame Control Field
/// Cluster library frame control field
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct FrameControl {
    /// Frame type, see `FrameType`
    pub frame_type: FrameType,
    /// Manufacturer specific command
    pub manufacturer_specific: bool,
    /// Command direction, see `Direction`
    pub direction: Direction,
    /// Disable default response mechanism
    pub disable_default_response: bool,
}

impl PackFixed<FrameControl, Error> for FrameControl {
    fn pack(&self, data: &mut [u8]) -> Result<(), Error> {
        if data.len() != 1 {
            return Err(Error::WrongNumberOfBytes);
        }
        data[0] = self.frame_type as u8
            | ((self.manufacturer_specific as u8) << 2)
            | u8::from(self.direction)
            | ((self.disable_default_response as u8) << 4);
        Ok(())
    }

    fn unpack(data: &[u8]) -> Result<Self, Error> {
        if data.len() != 1 {
            return Err(Error::WrongNumberOfBytes);
        }
        Ok(Self {
            frame_type: FrameType::try_from(data[0])?,
            manufacturer_specific: (data[0] & 0b0000_0100) == 0b0000_0100,
            direction: Direction::from(data[0]),
            disable_default_response: (data[0] & 0b0001_0000) == 0b0001_0000,
        })
    }
}

// ZCL, 2.4.1 General ZCL Frame Format
/// Cluster library frame header
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ClusterLibraryHeader {
    /// Frame control, see `FrameControl`
    pub control: FrameControl,
    /// Optional manufacturer code for manufacturer specific clusters
    pub manufacturer: Option<u16>,
    /// Transaction sequence code
    pub transaction_sequence: u8,
    /// Command identifier
    pub command: u8,
}

impl ClusterLibraryHeader {
    /// Header for a cluster specific command
    pub fn cluster_specific(direction: Direction, transaction_sequence: u8, command: u8) -> Self {
        Self {
            control: FrameControl {
                frame_type: FrameType::Local,
                manufacturer_specific: false,
                direction,
                disable_default_response: false,
            },
            manufacturer: None,
            transaction_sequence,
            command,
        }
    }

    /// Header for a general command, default response disabled
    pub fn general(direction: Direction, transaction_sequence: u8, command: u8) -> Self {
        Self {
            control: FrameControl {
                frame_type: FrameType::Global,
                manufacturer_specific: false,
                direction,
                disable_default_response: true,
            },
            manufacturer: None,
            transaction_sequence,
            command,
        }
    }

    /// Check if the command is specific to the cluster
    pub fn is_cluster_specific(&self) -> bool {
        self.control.frame_type == FrameType::Local
    }
}

impl Pack<ClusterLibraryHeader, Error> for ClusterLibraryHeader {
    fn pack(&self, data: &mut [u8]) -> Result<usize, Error> {
        let length = if self.manufacturer.is_some() { 5 } else { 3 };
        if data.len() < length {
            return Err(Error::NotEnoughSpace);
        }
        let mut control = self.control;
        control.manufacturer_specific = self.manufacturer.is_some();
        control.pack(&mut data[0..1])?;
        let mut offset = 1;
        if let Some(manufacturer) = self.manufacturer {
            LittleEndian::write_u16(&mut data[offset..offset + 2], manufacturer);
            offset += 2;
        }
        data[offset] = self.transaction_sequence;
        data[offset + 1] = self.command;
        Ok(offset + 2)
    }

    fn unpack(data: &[u8]) -> Result<(Self, usize), Error> {
        if data.len() < 3 {
            return Err(Error::WrongNumberOfBytes);
        }
        let control = FrameControl::unpack(&data[0..1])?;
        let mut offset = 1;
        let manufacturer = if control.manufacturer_specific {
            if data.len() < 5 {
                return Err(Error::WrongNumberOfBytes);
            }
            let manufacturer = LittleEndian::read_u16(&data[offset..offset + 2]);
            offset += 2;
            Some(manufacturer)
        } else {
            None
        };
        let transaction_sequence = data[offset];
        let command = data[offset + 1];
        Ok((
            Self {
                control,
                manufacturer,
                transaction_sequence,
                command,
            },
            offset + 2,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_control_bits() {
        let control = FrameControl::unpack(&[0x19]).unwrap();
        assert_eq!(control.frame_type, FrameType::Local);
        assert_eq!(control.manufacturer_specific, false);
        assert_eq!(control.direction, Direction::ToClient);
        assert_eq!(control.disable_default_response, true);

        let mut data = [0u8; 1];
        control.pack(&mut data).unwrap();
        assert_eq!(data[0], 0x19);

        assert_eq!(FrameControl::unpack(&[0x02]), Err(Error::UnknownFrameType));
    }

    #[test]
    fn unpack_initiate_request_header() {
        // Initiate key establishment request, client to server
        let data = [0x01, 0x42, 0x00, 0x01, 0x00, 0x0a, 0x0f];

        let (zcl, used) = ClusterLibraryHeader::unpack(&data[..]).unwrap();

        assert_eq!(used, 3);
        assert!(zcl.is_cluster_specific());
        assert_eq!(zcl.control.direction, Direction::ToServer);
        assert_eq!(zcl.control.disable_default_response, false);
        assert_eq!(zcl.manufacturer, None);
        assert_eq!(zcl.transaction_sequence, 0x42);
        assert_eq!(zcl.command, 0x00);
    }

    #[test]
    fn unpack_default_response_header() {
        let data = [0x18, 0x05, 0x0b, 0x02, 0x00];

        let (zcl, used) = ClusterLibraryHeader::unpack(&data[..]).unwrap();

        assert_eq!(used, 3);
        assert!(!zcl.is_cluster_specific());
        assert_eq!(zcl.control.direction, Direction::ToClient);
        assert_eq!(zcl.control.disable_default_response, true);
        assert_eq!(zcl.transaction_sequence, 0x05);
        assert_eq!(zcl.command, 0x0b);

        assert_eq!(
            ClusterLibraryHeader::unpack(&data[..2]),
            Err(Error::WrongNumberOfBytes)
        );
    }

    #[test]
    fn pack_header() {
        let mut buffer = [0u8; 8];

        let header = ClusterLibraryHeader::cluster_specific(Direction::ToClient, 0x34, 0x03);
        assert_eq!(header.pack(&mut buffer), Ok(3));
        assert_eq!(buffer[..3], [0x09, 0x34, 0x03]);

        let header = ClusterLibraryHeader::general(Direction::ToServer, 0x35, 0x0b);
        assert_eq!(header.pack(&mut buffer), Ok(3));
        assert_eq!(buffer[..3], [0x10, 0x35, 0x0b]);

        let mut header = ClusterLibraryHeader::cluster_specific(Direction::ToServer, 0x01, 0xee);
        header.manufacturer = Some(0x7654);
        assert_eq!(header.pack(&mut buffer), Ok(5));
        assert_eq!(buffer[..5], [0x05, 0x54, 0x76, 0x01, 0xee]);

        assert_eq!(header.pack(&mut buffer[..4]), Err(Error::NotEnoughSpace));
    }

    #[test]
    fn reverse_direction() {
        assert_eq!(Direction::ToServer.reverse(), Direction::ToClient);
        assert_eq!(Direction::ToClient.reverse(), Direction::ToServer);
    }
}
