//! # Inter-PAN
//!
//! Options describing a inter-PAN message as delivered by the stack.

bitflags::bitflags! {
    /// Inter-PAN header options
    #[derive(Default, Copy, Clone, Debug, PartialEq)]
    pub struct InterPanOptions : u16 {
        /// The message is APS encrypted
        const APS_ENCRYPT = 0x0001;
        /// The MAC header carries the long address of the sender
        const MAC_HAS_LONG_ADDRESS = 0x0002;
    }
}

impl InterPanOptions {
    /// Check if the sender long address is known
    pub fn has_long_address(self) -> bool {
        self.contains(InterPanOptions::MAC_HAS_LONG_ADDRESS)
    }
}

#[cfg(all(test, not(feature = "core")))]
mod tests {
    use super::*;

    #[test]
    fn long_address_option() {
        assert!(!InterPanOptions::empty().has_long_address());
        assert!(!InterPanOptions::APS_ENCRYPT.has_long_address());
        let options = InterPanOptions::from_bits_truncate(0x0003);
        assert!(options.has_long_address());
        assert!(options.contains(InterPanOptions::APS_ENCRYPT));
    }
}
