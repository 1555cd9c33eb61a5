use chrono::{Local, SecondsFormat};

use psila_data::{
    cluster_library::key_establishment::CommandIdentifier, ExtendedAddress, NetworkAddress,
    PanIdentifier,
};
use psila_key_establishment::{KeyEstablishmentHandler, NotifyMessage};

fn timestamp() -> String {
    Local::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Application side of a simulated device
pub struct Application {
    name: &'static str,
    trust_center: Option<ExtendedAddress>,
    key_table: Vec<ExtendedAddress>,
    key_table_size: usize,
    drop: Option<CommandIdentifier>,
    outcome: Option<NotifyMessage>,
}

impl Application {
    pub fn new(name: &'static str) -> Self {
        Application {
            name,
            trust_center: None,
            key_table: Vec::new(),
            key_table_size: 4,
            drop: None,
            outcome: None,
        }
    }

    /// Device which has the trust center as link key partner
    pub fn with_trust_center(mut self, address: ExtendedAddress) -> Self {
        self.trust_center = Some(address);
        self
    }

    /// Trust center with a key table entry for the device
    pub fn with_key_table_entry(mut self, address: ExtendedAddress) -> Self {
        self.key_table.push(address);
        self
    }

    /// Silently drop a outbound command
    pub fn with_dropped_command(mut self, command: CommandIdentifier) -> Self {
        self.drop = Some(command);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The last terminal notification
    pub fn outcome(&self) -> Option<NotifyMessage> {
        self.outcome
    }

    fn report(&mut self, message: NotifyMessage, am_initiator: bool, partner: &str, delay: u8) {
        let role = if am_initiator { "initiator" } else { "responder" };
        if message.is_error() {
            println!(
                "{} {} ({}) with {}: {}, back off {} s",
                timestamp(),
                self.name,
                role,
                partner,
                message,
                delay
            );
        } else {
            println!(
                "{} {} ({}) with {}: {}",
                timestamp(),
                self.name,
                role,
                partner,
                message
            );
        }
        if u8::from(message) >= u8::from(NotifyMessage::LinkKeyEstablished) {
            self.outcome = Some(message);
        }
    }
}

impl KeyEstablishmentHandler for Application {
    fn key_establishment(
        &mut self,
        message: NotifyMessage,
        am_initiator: bool,
        partner: NetworkAddress,
        delay: u8,
    ) -> bool {
        self.report(message, am_initiator, &format!("{}", partner), delay);
        true
    }

    fn inter_pan_key_establishment(
        &mut self,
        message: NotifyMessage,
        am_initiator: bool,
        pan: PanIdentifier,
        partner: ExtendedAddress,
        delay: u8,
    ) -> bool {
        self.report(
            message,
            am_initiator,
            &format!("{} {}", pan, partner),
            delay,
        );
        true
    }

    fn trust_center_link_key_partner(&self) -> Option<ExtendedAddress> {
        self.trust_center
    }

    fn has_key_table_entry(&self, address: ExtendedAddress) -> bool {
        self.key_table.contains(&address)
    }

    fn has_free_key_table_entry(&self) -> bool {
        self.key_table.len() < self.key_table_size
    }

    fn crypto_operation_in_progress(&mut self, in_progress: bool) {
        log::debug!("{} crypto operation in progress {}", self.name, in_progress);
    }

    fn allow_send(&mut self, command: CommandIdentifier) -> bool {
        if self.drop == Some(command) {
            println!("{} {} dropping {:?}", timestamp(), self.name, command);
            return false;
        }
        true
    }
}
