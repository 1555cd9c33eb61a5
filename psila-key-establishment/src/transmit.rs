//! Outbound frames
//!
//! Every frame is put in the transmit queue as one record,
//! `[length][destination][cluster library frame]` where the length covers the
//! destination and the frame.

use psila_data::{
    pack::{Pack, PackFixed},
    Error, ExtendedAddress, NetworkAddress, PanIdentifier,
};

const DESTINATION_UNICAST: u8 = 0x00;
const DESTINATION_INTER_PAN: u8 = 0x01;

/// Where a outbound frame shall be sent
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Destination {
    /// Unicast within the network
    Unicast {
        /// Node to send to
        address: NetworkAddress,
        /// Local endpoint
        source_endpoint: u8,
        /// Endpoint of the node
        destination_endpoint: u8,
    },
    /// Inter-PAN message
    InterPan {
        /// PAN of the device
        pan: PanIdentifier,
        /// Device to send to
        address: ExtendedAddress,
    },
}

impl Pack<Destination, Error> for Destination {
    fn pack(&self, data: &mut [u8]) -> Result<usize, Error> {
        match *self {
            Destination::Unicast {
                address,
                source_endpoint,
                destination_endpoint,
            } => {
                if data.len() < 5 {
                    return Err(Error::NotEnoughSpace);
                }
                data[0] = DESTINATION_UNICAST;
                address.pack(&mut data[1..3])?;
                data[3] = source_endpoint;
                data[4] = destination_endpoint;
                Ok(5)
            }
            Destination::InterPan { pan, address } => {
                if data.len() < 11 {
                    return Err(Error::NotEnoughSpace);
                }
                data[0] = DESTINATION_INTER_PAN;
                pan.pack(&mut data[1..3])?;
                address.pack(&mut data[3..11])?;
                Ok(11)
            }
        }
    }

    fn unpack(data: &[u8]) -> Result<(Self, usize), Error> {
        if data.is_empty() {
            return Err(Error::WrongNumberOfBytes);
        }
        match data[0] {
            DESTINATION_UNICAST => {
                if data.len() < 5 {
                    return Err(Error::WrongNumberOfBytes);
                }
                Ok((
                    Destination::Unicast {
                        address: NetworkAddress::unpack(&data[1..3])?,
                        source_endpoint: data[3],
                        destination_endpoint: data[4],
                    },
                    5,
                ))
            }
            DESTINATION_INTER_PAN => {
                if data.len() < 11 {
                    return Err(Error::WrongNumberOfBytes);
                }
                Ok((
                    Destination::InterPan {
                        pan: PanIdentifier::unpack(&data[1..3])?,
                        address: ExtendedAddress::unpack(&data[3..11])?,
                    },
                    11,
                ))
            }
            _ => Err(Error::InvalidValue),
        }
    }
}

/// Split a queued record into destination and cluster library frame
///
/// `data` is the record without the leading length byte.
pub fn unpack_record(data: &[u8]) -> Result<(Destination, &[u8]), Error> {
    let (destination, used) = Destination::unpack(data)?;
    Ok((destination, &data[used..]))
}
