//! The device key establishment is performed with

use heapless::Vec;

use psila_data::{
    cluster_library::{key_establishment::CommandIdentifier, Direction},
    ExtendedAddress, NetworkAddress, PanIdentifier,
};

use crate::command::{CommandSource, IncomingCommand};
use crate::transmit::Destination;

/// Number of remembered sequence numbers, three exchanges and a terminate
pub const DUPLICATE_FILTER_SIZE: usize = 4;

/// Addressing of the partner
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PartnerAddress {
    /// Node in the same network
    IntraPan {
        /// Network address of the partner
        address: NetworkAddress,
        /// Endpoint of the partner
        endpoint: u8,
        /// Local endpoint used for the exchange
        local_endpoint: u8,
    },
    /// Device in another network
    InterPan {
        /// PAN of the partner
        pan: PanIdentifier,
        /// Long address of the partner
        address: ExtendedAddress,
    },
}

/// Key establishment partner
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Partner {
    /// Addressing of the partner
    pub address: PartnerAddress,
    /// The partner started the key establishment
    pub remote_is_initiator: bool,
    /// Transaction sequence number used for the exchange
    pub sequence_number: u8,
}

impl Partner {
    /// Partner which sent the command, the partner is taken as the initiator
    ///
    /// Inter-PAN commands without a long address, or a inter-PAN command
    /// when there is no local endpoint, do not give a partner.
    pub fn from_command(command: &IncomingCommand, local_endpoint: Option<u8>) -> Option<Self> {
        let address = match command.source {
            CommandSource::IntraPan {
                address,
                source_endpoint,
                destination_endpoint,
                ..
            } => PartnerAddress::IntraPan {
                address,
                endpoint: source_endpoint,
                local_endpoint: destination_endpoint,
            },
            CommandSource::InterPan {
                pan,
                options,
                long_address,
            } => {
                if !options.has_long_address() {
                    return None;
                }
                if local_endpoint.is_none() {
                    return None;
                }
                PartnerAddress::InterPan {
                    pan,
                    address: long_address,
                }
            }
        };
        Some(Self {
            address,
            remote_is_initiator: true,
            sequence_number: command.header.transaction_sequence,
        })
    }

    /// Check if the partner is in the same network
    pub fn is_intra_pan(&self) -> bool {
        matches!(self.address, PartnerAddress::IntraPan { .. })
    }

    /// Check if the partner is the trust center
    pub fn is_trust_center(&self) -> bool {
        match self.address {
            PartnerAddress::IntraPan { address, .. } => address.is_trust_center(),
            PartnerAddress::InterPan { .. } => false,
        }
    }

    /// Direction of frames sent to the partner
    ///
    /// The initiator acts as client.
    pub fn direction(&self) -> Direction {
        if self.remote_is_initiator {
            Direction::ToClient
        } else {
            Direction::ToServer
        }
    }

    /// Where frames for the partner are sent
    pub fn destination(&self) -> Destination {
        match self.address {
            PartnerAddress::IntraPan {
                address,
                endpoint,
                local_endpoint,
            } => Destination::Unicast {
                address,
                source_endpoint: local_endpoint,
                destination_endpoint: endpoint,
            },
            PartnerAddress::InterPan { pan, address } => Destination::InterPan { pan, address },
        }
    }

    /// Check if the command was sent by this partner
    ///
    /// Endpoints and sequence numbers are not compared, devices are known to
    /// get those wrong. The direction must match the role of the partner,
    /// except for terminate which some devices send in either direction.
    pub fn is_source_of(&self, command: &IncomingCommand) -> bool {
        let is_terminate = command.header.is_cluster_specific()
            && command.header.command == u8::from(CommandIdentifier::TerminateKeyEstablishment);
        let direction_matches =
            self.remote_is_initiator == (command.direction() == Direction::ToServer);
        if !direction_matches && !is_terminate {
            return false;
        }
        match (self.address, command.source) {
            (
                PartnerAddress::IntraPan { address, .. },
                CommandSource::IntraPan {
                    address: source, ..
                },
            ) => address == source,
            (
                PartnerAddress::InterPan { address, .. },
                CommandSource::InterPan {
                    options,
                    long_address,
                    ..
                },
            ) => options.has_long_address() && address == long_address,
            (_, _) => false,
        }
    }
}

impl core::fmt::Display for Partner {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.address {
            PartnerAddress::IntraPan { address, .. } => write!(f, "{}", address),
            PartnerAddress::InterPan { pan, address } => write!(f, "{} {}", pan, address),
        }
    }
}

/// Recently received APS sequence numbers of the partner
#[derive(Clone, Debug, Default)]
pub struct DuplicateFilter {
    sequences: Vec<u8, DUPLICATE_FILTER_SIZE>,
}

impl DuplicateFilter {
    /// Forget all sequence numbers
    pub fn clear(&mut self) {
        self.sequences.clear();
    }

    /// Check if the sequence number has been seen
    pub fn contains(&self, sequence: u8) -> bool {
        self.sequences.contains(&sequence)
    }

    /// Remember a sequence number, the oldest is dropped when full
    pub fn record(&mut self, sequence: u8) {
        if self.sequences.is_full() {
            self.sequences.rotate_left(1);
            self.sequences.pop();
        }
        let pushed = self.sequences.push(sequence);
        debug_assert!(pushed.is_ok());
    }

    /// Number of remembered sequence numbers
    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    /// Check if no sequence number is remembered
    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Delivery;
    use psila_data::InterPanOptions;

    fn intra_pan_command(data: &[u8], address: u16) -> IncomingCommand {
        IncomingCommand::unpack(
            CommandSource::IntraPan {
                address: NetworkAddress::new(address),
                source_endpoint: 0x0a,
                destination_endpoint: 0x01,
                aps_sequence: 0x10,
            },
            Delivery::Unicast,
            data,
        )
        .unwrap()
    }

    #[test]
    fn partner_from_intra_pan_command() {
        let data = [0x01, 0x42, 0x00];
        let command = intra_pan_command(&data, 0x1234);
        let partner = Partner::from_command(&command, None).unwrap();
        assert!(partner.remote_is_initiator);
        assert!(partner.is_intra_pan());
        assert!(!partner.is_trust_center());
        assert_eq!(partner.sequence_number, 0x42);
        assert_eq!(partner.direction(), Direction::ToClient);
        assert_eq!(
            partner.destination(),
            Destination::Unicast {
                address: NetworkAddress::new(0x1234),
                source_endpoint: 0x01,
                destination_endpoint: 0x0a,
            }
        );
        assert!(partner.is_source_of(&command));

        let other = intra_pan_command(&data, 0x1235);
        assert!(!partner.is_source_of(&other));
    }

    #[test]
    fn partner_from_inter_pan_command() {
        let data = [0x01, 0x42, 0x00];
        let mut source = CommandSource::InterPan {
            pan: PanIdentifier::new(0x1a62),
            options: InterPanOptions::empty(),
            long_address: ExtendedAddress::new(0x0102_0304_0506_0708),
        };
        let command = IncomingCommand::unpack(source, Delivery::Unicast, &data).unwrap();
        assert_eq!(Partner::from_command(&command, Some(1)), None);

        if let CommandSource::InterPan { ref mut options, .. } = source {
            *options = InterPanOptions::MAC_HAS_LONG_ADDRESS;
        }
        let command = IncomingCommand::unpack(source, Delivery::Unicast, &data).unwrap();
        assert_eq!(Partner::from_command(&command, None), None);
        let partner = Partner::from_command(&command, Some(1)).unwrap();
        assert!(!partner.is_intra_pan());
        assert!(partner.is_source_of(&command));

        // Intra-PAN command from a inter-PAN partner
        let intra = intra_pan_command(&data, 0x1234);
        assert!(!partner.is_source_of(&intra));
    }

    #[test]
    fn direction_must_match_role() {
        let request = [0x01, 0x42, 0x01];
        let response = [0x09, 0x42, 0x01];
        let terminate = [0x09, 0x42, 0x03];
        let command = intra_pan_command(&request, 0x0000);
        let mut partner = Partner::from_command(&command, None).unwrap();
        assert!(partner.is_source_of(&command));
        assert!(!partner.is_source_of(&intra_pan_command(&response, 0x0000)));
        assert!(partner.is_source_of(&intra_pan_command(&terminate, 0x0000)));

        partner.remote_is_initiator = false;
        assert!(!partner.is_source_of(&command));
        assert!(partner.is_source_of(&intra_pan_command(&response, 0x0000)));
        assert_eq!(partner.direction(), Direction::ToServer);
    }

    #[test]
    fn duplicate_filter_is_bounded() {
        let mut filter = DuplicateFilter::default();
        assert!(filter.is_empty());
        for sequence in 1..=4 {
            filter.record(sequence);
        }
        assert_eq!(filter.len(), 4);
        assert!(filter.contains(1));
        filter.record(5);
        assert_eq!(filter.len(), DUPLICATE_FILTER_SIZE);
        assert!(!filter.contains(1));
        assert!(filter.contains(2));
        assert!(filter.contains(5));
        for sequence in 6..=20 {
            filter.record(sequence);
        }
        assert_eq!(filter.len(), DUPLICATE_FILTER_SIZE);
        assert!(!filter.contains(16));
        assert!((17..=20).all(|sequence| filter.contains(sequence)));
        filter.clear();
        assert!(!filter.contains(20));
    }
}
