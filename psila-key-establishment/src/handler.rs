use psila_data::{
    cluster_library::key_establishment::CommandIdentifier, ExtendedAddress, NetworkAddress,
    PanIdentifier,
};

use crate::notify::NotifyMessage;

/// Application side of the key establishment
pub trait KeyEstablishmentHandler {
    /// Key establishment progress with a node in the network
    ///
    /// Returning false while the establishment is in progress aborts it.
    fn key_establishment(
        &mut self,
        message: NotifyMessage,
        am_initiator: bool,
        partner: NetworkAddress,
        delay: u8,
    ) -> bool;

    /// Key establishment progress with a inter-PAN device
    fn inter_pan_key_establishment(
        &mut self,
        message: NotifyMessage,
        am_initiator: bool,
        pan: PanIdentifier,
        partner: ExtendedAddress,
        delay: u8,
    ) -> bool;

    /// Partner of the current trust center link key
    fn trust_center_link_key_partner(&self) -> Option<ExtendedAddress>;

    /// Check if the key table has an entry for the device
    fn has_key_table_entry(&self, address: ExtendedAddress) -> bool;

    /// Check if the key table has room for another device
    fn has_free_key_table_entry(&self) -> bool;

    /// A crypto operation was started or has finished
    fn crypto_operation_in_progress(&mut self, _in_progress: bool) {}

    /// Called before a key establishment command is sent, return false to drop it
    fn allow_send(&mut self, _command: CommandIdentifier) -> bool {
        true
    }
}
