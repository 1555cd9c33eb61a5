use core::default::Default;

use psila_data::{ExtendedAddress, NetworkAddress};

/// Node identity
#[derive(Clone, Copy, Debug)]
pub struct Identity {
    /// The short address of the node
    pub short: NetworkAddress,
    /// The extended address of the node
    pub extended: ExtendedAddress,
}

impl Identity {
    /// Create `Identity` from short and extended address
    pub fn new(short: NetworkAddress, extended: ExtendedAddress) -> Self {
        Self { short, extended }
    }

    /// Check if this node is the trust center of the network
    pub fn is_trust_center(&self) -> bool {
        self.short.is_trust_center()
    }
}

impl Default for Identity {
    /// Create `Identity` with broadcast short and extended address
    fn default() -> Self {
        Identity {
            short: NetworkAddress::broadcast(),
            extended: ExtendedAddress::broadcast(),
        }
    }
}
