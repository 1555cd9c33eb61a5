//! Received key establishment cluster commands

use psila_data::{
    cluster_library::{ClusterLibraryHeader, Direction},
    pack::Pack,
    ExtendedAddress, InterPanOptions, NetworkAddress, PanIdentifier,
};

use crate::transmit::Destination;
use crate::Error;

/// How the command was delivered
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Delivery {
    /// Sent to this node only
    Unicast,
    /// Sent to all nodes
    Broadcast,
    /// Sent to a group
    Multicast,
}

/// Sender of a command
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CommandSource {
    /// Command from a node in the network
    IntraPan {
        /// Network address of the sender
        address: NetworkAddress,
        /// Endpoint of the sender
        source_endpoint: u8,
        /// Local endpoint the command was sent to
        destination_endpoint: u8,
        /// Application service (APS) sequence number
        aps_sequence: u8,
    },
    /// Inter-PAN command
    InterPan {
        /// PAN of the sender
        pan: PanIdentifier,
        /// Inter-PAN header options
        options: InterPanOptions,
        /// Long address of the sender, valid if the options say so
        long_address: ExtendedAddress,
    },
}

/// A received key establishment cluster frame
#[derive(Clone, Copy, Debug)]
pub struct IncomingCommand<'p> {
    /// Sender
    pub source: CommandSource,
    /// Delivery mode
    pub delivery: Delivery,
    /// Cluster library header
    pub header: ClusterLibraryHeader,
    /// Payload following the header
    pub payload: &'p [u8],
}

impl<'p> IncomingCommand<'p> {
    /// Parse the cluster library header of a received frame
    pub fn unpack(
        source: CommandSource,
        delivery: Delivery,
        data: &'p [u8],
    ) -> Result<Self, Error> {
        let (header, used) =
            ClusterLibraryHeader::unpack(data).map_err(|_| Error::MalformedPacket)?;
        Ok(Self {
            source,
            delivery,
            header,
            payload: &data[used..],
        })
    }

    /// Check if the command was unicast
    pub fn is_unicast(&self) -> bool {
        self.delivery == Delivery::Unicast
    }

    /// Command direction
    pub fn direction(&self) -> Direction {
        self.header.control.direction
    }

    /// Check if the command was sent within the network
    pub fn is_intra_pan(&self) -> bool {
        matches!(self.source, CommandSource::IntraPan { .. })
    }

    /// APS sequence number, only intra-PAN commands have one
    pub fn aps_sequence(&self) -> Option<u8> {
        match self.source {
            CommandSource::IntraPan { aps_sequence, .. } => Some(aps_sequence),
            CommandSource::InterPan { .. } => None,
        }
    }

    /// Where to send a reply to the command
    pub fn reply_destination(&self) -> Option<Destination> {
        match self.source {
            CommandSource::IntraPan {
                address,
                source_endpoint,
                destination_endpoint,
                ..
            } => Some(Destination::Unicast {
                address,
                source_endpoint: destination_endpoint,
                destination_endpoint: source_endpoint,
            }),
            CommandSource::InterPan {
                pan,
                options,
                long_address,
            } => {
                if options.has_long_address() {
                    Some(Destination::InterPan {
                        pan,
                        address: long_address,
                    })
                } else {
                    None
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unpack_command() {
        let data = [0x01, 0x42, 0x01, 0xaa, 0xbb];
        let source = CommandSource::IntraPan {
            address: NetworkAddress::new(0x0000),
            source_endpoint: 0x0a,
            destination_endpoint: 0x01,
            aps_sequence: 0x80,
        };
        let command = IncomingCommand::unpack(source, Delivery::Unicast, &data).unwrap();
        assert!(command.is_unicast());
        assert!(command.is_intra_pan());
        assert_eq!(command.direction(), Direction::ToServer);
        assert_eq!(command.header.command, 0x01);
        assert_eq!(command.payload, [0xaa, 0xbb]);
        assert_eq!(command.aps_sequence(), Some(0x80));
        assert_eq!(
            command.reply_destination(),
            Some(Destination::Unicast {
                address: NetworkAddress::new(0x0000),
                source_endpoint: 0x01,
                destination_endpoint: 0x0a,
            })
        );

        assert!(IncomingCommand::unpack(source, Delivery::Unicast, &data[..2]).is_err());
    }

    #[test]
    fn inter_pan_reply_needs_long_address() {
        let data = [0x09, 0x01, 0x03, 0x00, 0x1e, 0x01, 0x00];
        let source = CommandSource::InterPan {
            pan: PanIdentifier::new(0x1a62),
            options: InterPanOptions::empty(),
            long_address: ExtendedAddress::new(0x1122),
        };
        let command = IncomingCommand::unpack(source, Delivery::Broadcast, &data).unwrap();
        assert!(!command.is_unicast());
        assert_eq!(command.aps_sequence(), None);
        assert_eq!(command.reply_destination(), None);

        let source = CommandSource::InterPan {
            pan: PanIdentifier::new(0x1a62),
            options: InterPanOptions::MAC_HAS_LONG_ADDRESS,
            long_address: ExtendedAddress::new(0x1122),
        };
        let command = IncomingCommand::unpack(source, Delivery::Unicast, &data).unwrap();
        assert_eq!(
            command.reply_destination(),
            Some(Destination::InterPan {
                pan: PanIdentifier::new(0x1a62),
                address: ExtendedAddress::new(0x1122),
            })
        );
    }
}
