//! Time allowed for each step of the key establishment

use crate::config::Config;
use crate::state_machine::KeyEstablishEvent;

/// Margin added to every step, in seconds
pub const KEY_ESTABLISHMENT_TIMEOUT_BASE: u16 = 10;

const EVENT_COUNT: usize = KeyEstablishEvent::InitiatorReceivedConfirmKey as usize;

/// Seconds to wait after each event for the next one
///
/// The partner reports its timings as 8-bit values, the table is 16-bit so
/// that the margin can be added.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EventTimeouts([u16; EVENT_COUNT]);

impl EventTimeouts {
    /// Calculate timeouts from the local configuration and the partner timings
    pub fn new(
        remote_is_initiator: bool,
        config: &Config,
        partner_generate_key_time: u8,
        partner_confirm_key_time: u8,
    ) -> Self {
        let mut timeouts = [KEY_ESTABLISHMENT_TIMEOUT_BASE; EVENT_COUNT];
        timeouts[KeyEstablishEvent::None as usize] = 0;
        if remote_is_initiator {
            timeouts[KeyEstablishEvent::Begin as usize] += u16::from(partner_generate_key_time);
        }
        timeouts[KeyEstablishEvent::GenerateKeys as usize] +=
            u16::from(config.ephemeral_data_generate_time);
        timeouts[KeyEstablishEvent::GenerateSharedSecret as usize] +=
            u16::from(config.generate_shared_secret_time);
        timeouts[KeyEstablishEvent::SendEphemeralData as usize] += u16::from(if remote_is_initiator {
            partner_confirm_key_time
        } else {
            partner_generate_key_time
        });
        // Only the initiator waits after sending the confirm key
        timeouts[KeyEstablishEvent::SendConfirmKey as usize] += u16::from(partner_confirm_key_time);
        Self(timeouts)
    }

    /// Timeout in seconds after the event
    pub fn get(&self, event: KeyEstablishEvent) -> u16 {
        self.0
            .get(event as usize)
            .copied()
            .unwrap_or(KEY_ESTABLISHMENT_TIMEOUT_BASE)
    }
}

impl Default for EventTimeouts {
    fn default() -> Self {
        Self::new(true, &Config::default(), 0, 0)
    }
}
