//! Certificate based key establishment (CBKE) state machine
//!
//! Both roles walk through the same sequence of events, an event is only
//! accepted if it directly follows the current state.
//!
//! | Event                        | Initiator                  | Responder                   |
//! |------------------------------|----------------------------|-----------------------------|
//! | Begin                        | send certificate           | check and store certificate, send certificate |
//! | GenerateKeys                 | check and store certificate, generate keys | store ephemeral key, generate keys |
//! | SendEphemeralData            | send ephemeral key         | send ephemeral key          |
//! | GenerateSharedSecret         | store ephemeral key, calculate SMACs | store SMAC, calculate SMACs |
//! | SendConfirmKey               | store SMAC, send SMAC      | verify SMAC, send SMAC, done |
//! | InitiatorReceivedConfirmKey  | verify SMAC, done          |                             |

use bbqueue::ArrayLength;

use psila_crypto::{CbkeBackend, PublicKey, Smac};
use psila_data::cluster_library::key_establishment::{
    Command, ConfirmKeyData, EphemeralData, InitiateKeyEstablishment, KeyEstablishmentStatus,
    SUITE_CBKE,
};
use psila_data::ExtendedAddress;

use crate::command::IncomingCommand;
use crate::handler::KeyEstablishmentHandler;
use crate::notify::NotifyMessage;
use crate::partner::Partner;
use crate::timeouts::EventTimeouts;
use crate::{KeyEstablishment, PendingOperation, BACK_OFF_TIME_REPORTED_TO_PARTNER};

/// Key establishment events, also used as state
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub enum KeyEstablishEvent {
    /// No key establishment in progress
    None = 0,
    /// Certificate exchange
    Begin = 1,
    /// Generating the ephemeral key pair
    GenerateKeys = 2,
    /// Sending the ephemeral public key
    SendEphemeralData = 3,
    /// Calculating the shared secret and SMACs
    GenerateSharedSecret = 4,
    /// Sending the SMAC
    SendConfirmKey = 5,
    /// The initiator received the SMAC of the responder
    InitiatorReceivedConfirmKey = 6,
}

impl KeyEstablishEvent {
    /// The event expected to follow this one
    pub fn next(self) -> Option<Self> {
        match self {
            KeyEstablishEvent::None => Some(KeyEstablishEvent::Begin),
            KeyEstablishEvent::Begin => Some(KeyEstablishEvent::GenerateKeys),
            KeyEstablishEvent::GenerateKeys => Some(KeyEstablishEvent::SendEphemeralData),
            KeyEstablishEvent::SendEphemeralData => Some(KeyEstablishEvent::GenerateSharedSecret),
            KeyEstablishEvent::GenerateSharedSecret => Some(KeyEstablishEvent::SendConfirmKey),
            KeyEstablishEvent::SendConfirmKey => {
                Some(KeyEstablishEvent::InitiatorReceivedConfirmKey)
            }
            KeyEstablishEvent::InitiatorReceivedConfirmKey => None,
        }
    }
}

impl Default for KeyEstablishEvent {
    fn default() -> Self {
        KeyEstablishEvent::None
    }
}

/// Data accompanying a event
#[derive(Clone, Copy, Debug)]
pub enum EventData<'d> {
    /// No data
    None,
    /// Initiate key establishment request or response
    Initiate(&'d InitiateKeyEstablishment),
    /// Ephemeral public key, generated locally or received
    PublicKey(&'d PublicKey),
    /// Received SMAC
    Smac(&'d Smac),
    /// Locally calculated SMACs
    Smacs {
        /// Initiator SMAC
        initiator: &'d Smac,
        /// Responder SMAC
        responder: &'d Smac,
    },
}

/// How a step of the state machine ended
enum Step {
    /// Wait for the next event
    Wait,
    /// The key establishment has ended
    Finished(NotifyMessage),
}

// Errors end the key establishment with the message
type StepResult = Result<Step, NotifyMessage>;

impl<'a, N, CB, H> KeyEstablishment<'a, N, CB, H>
where
    N: ArrayLength<u8>,
    CB: CbkeBackend,
    H: KeyEstablishmentHandler,
{
    /// Run the state machine with a new event
    ///
    /// `command` is the received command that caused the event, it is `None`
    /// for local events such as crypto completions.
    pub(crate) fn state_machine(
        &mut self,
        event: KeyEstablishEvent,
        data: EventData,
        command: Option<&IncomingCommand>,
    ) {
        if let Some(command) = command {
            if !command.is_unicast() {
                log::info!("> Ignoring broadcast key establishment command");
                return;
            }
            let remote_is_initiator = self.partner.map(|p| p.remote_is_initiator);
            let from_partner = self.partner.map_or(false, |p| p.is_source_of(command));
            if from_partner && (remote_is_initiator == Some(true) || self.is_active()) {
                if let Some(sequence) = command.aps_sequence() {
                    if self.duplicates.contains(sequence) {
                        log::info!("> Duplicate message, APS sequence {}, dropped", sequence);
                        return;
                    }
                }
            } else if !self.initialized || self.is_active() {
                self.reject_sender(command);
                return;
            }

            if !self.is_active() {
                match Partner::from_command(command, self.endpoint) {
                    Some(partner) => {
                        self.partner = Some(partner);
                    }
                    None => {
                        log::warn!("> Key establishment partner address incomplete");
                        return;
                    }
                }
                self.duplicates.clear();
            }

            if let Some(partner) = self.partner.as_mut() {
                if partner.is_intra_pan() {
                    if let Some(sequence) = command.aps_sequence() {
                        self.duplicates.record(sequence);
                    }
                }
                if partner.remote_is_initiator {
                    partner.sequence_number = command.header.transaction_sequence;
                }
            }
        }

        let partner = match self.partner {
            Some(partner) => partner,
            None => {
                log::warn!("Key establishment event {:?} without partner", event);
                return;
            }
        };

        if self.state.next() != Some(event) {
            log::warn!(
                "Unexpected key establishment event {:?} in state {:?}",
                event,
                self.state
            );
            self.terminate(NotifyMessage::InvalidPartnerMessage, 0);
            return;
        }

        // Key establishment can only take place with the trust center
        if partner.is_intra_pan() && !self.identity.is_trust_center() && !partner.is_trust_center()
        {
            self.terminate(NotifyMessage::NoEstablishmentAllowed, 0);
            return;
        }

        let result = match event {
            KeyEstablishEvent::None => return,
            KeyEstablishEvent::Begin => self.begin(&partner, data),
            KeyEstablishEvent::GenerateKeys => self.generate_keys(&partner, data),
            KeyEstablishEvent::SendEphemeralData => self.send_ephemeral_data(data),
            KeyEstablishEvent::GenerateSharedSecret => self.generate_shared_secret(&partner, data),
            KeyEstablishEvent::SendConfirmKey => self.send_confirm_key(&partner, data),
            KeyEstablishEvent::InitiatorReceivedConfirmKey => self.received_confirm_key(data),
        };

        match result {
            Ok(Step::Wait) => {
                self.schedule(event);
                self.state = event;
            }
            Ok(Step::Finished(message)) | Err(message) => {
                self.terminate(message, 0);
            }
        }
    }

    /// Initiator sends the certificate, responder also checks the received one
    fn begin(&mut self, partner: &Partner, data: EventData) -> StepResult {
        if partner.remote_is_initiator {
            let initiate = match data {
                EventData::Initiate(initiate) => initiate,
                _ => return Err(NotifyMessage::InvalidPartnerMessage),
            };
            self.check_partner_certificate(initiate)?;
            self.ask(NotifyMessage::ReceivedPartnerCertificate)?;
            self.storage
                .store_certificate(&initiate.identity)
                .map_err(|_| NotifyMessage::NoLocalResources)?;
            self.timeouts = EventTimeouts::new(
                true,
                &self.config,
                initiate.ephemeral_data_generate_time,
                initiate.confirm_key_generate_time,
            );
        }
        self.send_certificate()
    }

    fn generate_keys(&mut self, partner: &Partner, data: EventData) -> StepResult {
        if partner.remote_is_initiator {
            let key = match data {
                EventData::PublicKey(key) => key,
                _ => return Err(NotifyMessage::InvalidPartnerMessage),
            };
            self.ask(NotifyMessage::GeneratingEphemeralKeys)?;
            self.storage
                .store_public_key(key)
                .map_err(|_| NotifyMessage::NoLocalResources)?;
        } else {
            let initiate = match data {
                EventData::Initiate(initiate) => initiate,
                _ => return Err(NotifyMessage::InvalidPartnerMessage),
            };
            self.check_partner_certificate(initiate)?;
            self.timeouts = EventTimeouts::new(
                false,
                &self.config,
                initiate.ephemeral_data_generate_time,
                initiate.confirm_key_generate_time,
            );
            self.ask(NotifyMessage::GeneratingEphemeralKeys)?;
            self.storage
                .store_certificate(&initiate.identity)
                .map_err(|_| NotifyMessage::NoLocalResources)?;
        }
        let ticket = self.next_ticket();
        if let Err(error) = self.backend.generate_keys(ticket) {
            log::error!("Failed to start key generation, {:?}", error);
            return Err(NotifyMessage::NoLocalResources);
        }
        self.start_operation(PendingOperation::GenerateKeys(ticket));
        Ok(Step::Wait)
    }

    fn send_ephemeral_data(&mut self, data: EventData) -> StepResult {
        let key = match data {
            EventData::PublicKey(key) => key,
            _ => return Err(NotifyMessage::NoLocalResources),
        };
        self.ask(NotifyMessage::KeyGenerationDone)?;
        let command = Command::EphemeralData(EphemeralData { data: *key });
        if let Err(error) = self.send_command(&command) {
            log::error!("< Failed to queue ephemeral data, {:?}", error);
        }
        Ok(Step::Wait)
    }

    fn generate_shared_secret(&mut self, partner: &Partner, data: EventData) -> StepResult {
        if partner.remote_is_initiator {
            let smac = match data {
                EventData::Smac(smac) => smac,
                _ => return Err(NotifyMessage::InvalidPartnerMessage),
            };
            self.ask(NotifyMessage::GeneratingSharedSecret)?;
            self.storage.store_smac(smac);
        } else {
            let key = match data {
                EventData::PublicKey(key) => key,
                _ => return Err(NotifyMessage::InvalidPartnerMessage),
            };
            self.ask(NotifyMessage::GeneratingSharedSecret)?;
            self.storage
                .store_public_key(key)
                .map_err(|_| NotifyMessage::NoLocalResources)?;
        }
        let (certificate, key) = self
            .storage
            .retrieve_and_clear()
            .ok_or(NotifyMessage::NoLocalResources)?;
        let ticket = self.next_ticket();
        let am_initiator = !partner.remote_is_initiator;
        if let Err(error) = self
            .backend
            .calculate_smacs(ticket, am_initiator, &certificate, &key)
        {
            log::error!("Failed to start SMAC calculation, {:?}", error);
            return Err(NotifyMessage::NoLocalResources);
        }
        self.start_operation(PendingOperation::CalculateSmacs(ticket));
        Ok(Step::Wait)
    }

    fn send_confirm_key(&mut self, partner: &Partner, data: EventData) -> StepResult {
        let (initiator, responder) = match data {
            EventData::Smacs {
                initiator,
                responder,
            } => (initiator, responder),
            _ => return Err(NotifyMessage::NoLocalResources),
        };
        self.ask(NotifyMessage::GenerateSharedSecretDone)?;
        if partner.remote_is_initiator {
            self.verify_smac(initiator)?;
        } else {
            self.storage.store_smac(responder);
        }

        let mac = if partner.remote_is_initiator {
            *responder
        } else {
            *initiator
        };
        let command = Command::ConfirmKeyData(ConfirmKeyData { mac });
        if let Err(error) = self.send_command(&command) {
            log::error!("< Failed to queue confirm key, {:?}", error);
        }

        if partner.remote_is_initiator {
            // The responder is done once the confirm key has been sent
            return Ok(Step::Finished(NotifyMessage::LinkKeyEstablished));
        }
        Ok(Step::Wait)
    }

    fn received_confirm_key(&mut self, data: EventData) -> StepResult {
        let smac = match data {
            EventData::Smac(smac) => smac,
            _ => return Err(NotifyMessage::InvalidPartnerMessage),
        };
        self.verify_smac(smac)?;
        Ok(Step::Finished(NotifyMessage::LinkKeyEstablished))
    }

    /// Notify the application, a refusal ends the key establishment
    fn ask(&mut self, message: NotifyMessage) -> Result<(), NotifyMessage> {
        if self.notify(message, 0) {
            Ok(())
        } else {
            Err(NotifyMessage::NoLocalResources)
        }
    }

    fn send_certificate(&mut self) -> StepResult {
        let identity = match self.backend.local_certificate() {
            Ok(certificate) => certificate,
            Err(error) => {
                log::error!("Failed to retrieve certificate, {:?}", error);
                return Err(NotifyMessage::NoLocalResources);
            }
        };
        let command = Command::InitiateKeyEstablishment(InitiateKeyEstablishment {
            suite: SUITE_CBKE,
            ephemeral_data_generate_time: self.config.advertised_ephemeral_data_generate_time,
            confirm_key_generate_time: self.config.generate_shared_secret_time,
            identity,
        });
        if let Err(error) = self.send_command(&command) {
            log::error!("< Failed to queue certificate, {:?}", error);
            return Err(NotifyMessage::NoLocalResources);
        }
        Ok(Step::Wait)
    }

    /// Compare the SMAC against the stored one
    ///
    /// The initiator has stored the responder SMAC it calculated, the
    /// responder has stored the initiator SMAC it received.
    fn verify_smac(&self, smac: &Smac) -> Result<(), NotifyMessage> {
        match self.storage.smac() {
            Some(stored) if stored == smac => Ok(()),
            Some(_) => {
                log::warn!("SMAC mismatch");
                Err(NotifyMessage::KeyConfirmFailure)
            }
            None => Err(NotifyMessage::NoLocalResources),
        }
    }

    /// Check suite, issuer and key table for the certificate of the partner
    fn check_partner_certificate(
        &self,
        initiate: &InitiateKeyEstablishment,
    ) -> Result<(), NotifyMessage> {
        if initiate.suite != SUITE_CBKE {
            log::warn!("Bad key establishment suite {:04x}", initiate.suite);
            return Err(NotifyMessage::BadKeyEstablishmentSuite);
        }
        let local = match self.backend.local_certificate() {
            Ok(certificate) => certificate,
            Err(error) => {
                log::error!("Could not retrieve certificate, {:?}", error);
                return Err(NotifyMessage::NoLocalResources);
            }
        };
        if initiate.identity.issuer() != local.issuer() {
            log::warn!("Bad certificate issuer");
            return Err(NotifyMessage::BadCertificateIssuer);
        }
        let subject = ExtendedAddress::from_big_endian(&initiate.identity.subject());
        self.check_key_table(subject)
    }

    /// Check that a link key can be stored for the device
    fn check_key_table(&self, subject: ExtendedAddress) -> Result<(), NotifyMessage> {
        log::info!("Checking key table for {}", subject);
        if !self.identity.is_trust_center() {
            // Only the trust center link key may be updated
            return match self.handler.trust_center_link_key_partner() {
                Some(address) if address == subject => Ok(()),
                _ => {
                    log::warn!("Address of the trust center does not match its certificate");
                    Err(NotifyMessage::InvalidPartnerMessage)
                }
            };
        }
        if self.handler.has_key_table_entry(subject) {
            Ok(())
        } else if !self.config.allow_new_key_entries {
            log::warn!("Unknown device {} trying to establish a key", subject);
            Err(NotifyMessage::InvalidPartnerMessage)
        } else if self.handler.has_free_key_table_entry() {
            Ok(())
        } else {
            log::warn!("Key table full");
            Err(NotifyMessage::KeyTableFull)
        }
    }

    /// Tell a sender that a key establishment cannot be started now
    ///
    /// The ongoing key establishment is left untouched.
    fn reject_sender(&mut self, command: &IncomingCommand) {
        if self.initialized {
            log::warn!("> Second key establishment not supported, terminating it");
        } else {
            log::error!("> Key establishment not initialised, terminating");
        }
        if let Some(sender) = Partner::from_command(command, self.endpoint) {
            if let Err(error) = self.send_terminate_to(
                &sender,
                KeyEstablishmentStatus::NoResources,
                BACK_OFF_TIME_REPORTED_TO_PARTNER,
            ) {
                log::error!("< Failed to queue terminate, {:?}", error);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_follow_each_other() {
        let mut event = KeyEstablishEvent::None;
        let mut count = 0;
        while let Some(next) = event.next() {
            assert_eq!(next as u8, event as u8 + 1);
            event = next;
            count += 1;
        }
        assert_eq!(count, 6);
        assert_eq!(event, KeyEstablishEvent::InitiatorReceivedConfirmKey);
    }
}
