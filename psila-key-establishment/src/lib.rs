//! # Psila Key Establishment
//!
//! Smart Energy certificate based key establishment (CBKE) for the key
//! establishment cluster. One key establishment is handled at a time, a
//! second device trying to start one is told to come back later.
//!
//! Outbound frames are put on a `bbqueue` as records,
//! `[length][destination][cluster library frame]`, see [`transmit`].

#![no_std]

use bbqueue::{ArrayLength, Producer};

use psila_crypto::{CbkeBackend, Completion, OperationTicket, PublicKey, Smac};
use psila_data::{
    cluster_library::{
        key_establishment::{Command, KeyEstablishmentStatus},
        ClusterLibraryStatus, DefaultResponse, Direction, GeneralCommandIdentifier,
    },
    pack::Pack,
    ExtendedAddress, NetworkAddress, PanIdentifier,
};

pub mod command;
pub mod config;
mod error;
pub mod handler;
mod identity;
mod message;
pub mod notify;
pub mod partner;
pub mod state_machine;
mod storage;
mod terminate;
pub mod timeouts;
pub mod transmit;

pub use command::{CommandSource, Delivery, IncomingCommand};
pub use config::Config;
pub use error::Error;
pub use handler::KeyEstablishmentHandler;
pub use identity::Identity;
pub use notify::NotifyMessage;
pub use partner::{Partner, PartnerAddress};
pub use state_machine::KeyEstablishEvent;
pub use transmit::Destination;

use partner::DuplicateFilter;
use state_machine::EventData;
use storage::TemporaryStorage;
use timeouts::EventTimeouts;

/// Max buffer size
pub const PACKET_BUFFER_MAX: usize = 128;

/// Seconds the partner is asked to wait before trying again
pub const BACK_OFF_TIME_REPORTED_TO_PARTNER: u8 = 30;

/// Seconds to wait after a failure the partner gave no delay for
pub const INTERNAL_ERROR_BACK_OFF_TIME: u8 = 10;

const MICROSECONDS_PER_SECOND: u32 = 1_000_000;

/// The outstanding crypto operation
#[derive(Clone, Copy, Debug, PartialEq)]
enum PendingOperation {
    GenerateKeys(OperationTicket),
    CalculateSmacs(OperationTicket),
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Timer {
    start: u32,
    duration: u32,
}

/// Key establishment cluster service
pub struct KeyEstablishment<'a, N: ArrayLength<u8>, CB, H> {
    backend: CB,
    handler: H,
    config: Config,
    identity: Identity,
    tx_queue: Producer<'a, N>,
    endpoint: Option<u8>,
    initialized: bool,
    state: KeyEstablishEvent,
    partner: Option<Partner>,
    duplicates: DuplicateFilter,
    timeouts: EventTimeouts,
    storage: TemporaryStorage,
    pending: Option<PendingOperation>,
    ticket: OperationTicket,
    sequence: u8,
    timestamp: u32,
    timer: Option<Timer>,
}

impl<'a, N, CB, H> KeyEstablishment<'a, N, CB, H>
where
    N: ArrayLength<u8>,
    CB: CbkeBackend,
    H: KeyEstablishmentHandler,
{
    pub fn new(
        backend: CB,
        handler: H,
        tx_queue: Producer<'a, N>,
        identity: Identity,
        config: Config,
    ) -> Self {
        Self {
            backend,
            handler,
            config,
            identity,
            tx_queue,
            endpoint: None,
            initialized: false,
            state: KeyEstablishEvent::None,
            partner: None,
            duplicates: DuplicateFilter::default(),
            timeouts: EventTimeouts::new(true, &config, 0, 0),
            storage: TemporaryStorage::default(),
            pending: None,
            ticket: OperationTicket::default(),
            sequence: 0,
            timestamp: 0,
            timer: None,
        }
    }

    /// Initialise key establishment on the endpoint
    ///
    /// Key establishment only works if the crypto backend is available,
    /// otherwise every attempt by a partner is terminated.
    pub fn init(&mut self, endpoint: u8) {
        self.clear_state();
        self.timeouts = EventTimeouts::new(true, &self.config, 0, 0);
        self.endpoint = Some(endpoint);
        self.initialized = self.backend.is_available();
        if self.initialized {
            log::info!("Key establishment init success, endpoint {}", endpoint);
        } else {
            log::error!("Key establishment init FAILED, endpoint {}", endpoint);
        }
    }

    /// Start key establishment with a node in the network
    pub fn initiate(&mut self, address: NetworkAddress, endpoint: u8) -> Result<(), Error> {
        let local_endpoint = self.local_endpoint_for_initiate()?;
        self.start(PartnerAddress::IntraPan {
            address,
            endpoint,
            local_endpoint,
        })
    }

    /// Start key establishment with a device in another network
    pub fn initiate_inter_pan(
        &mut self,
        pan: PanIdentifier,
        address: ExtendedAddress,
    ) -> Result<(), Error> {
        self.local_endpoint_for_initiate()?;
        self.start(PartnerAddress::InterPan { pan, address })
    }

    fn local_endpoint_for_initiate(&self) -> Result<u8, Error> {
        if !self.initialized || self.is_active() {
            return Err(Error::InvalidCall);
        }
        self.endpoint.ok_or(Error::InvalidCall)
    }

    fn start(&mut self, address: PartnerAddress) -> Result<(), Error> {
        self.sequence = self.sequence.wrapping_add(1);
        let partner = Partner {
            address,
            remote_is_initiator: false,
            sequence_number: self.sequence,
        };
        log::info!("Initiate key establishment with {}", partner);
        self.partner = Some(partner);
        self.duplicates.clear();
        self.timeouts = EventTimeouts::new(false, &self.config, 0, 0);
        self.state_machine(KeyEstablishEvent::Begin, EventData::None, None);
        if self.is_active() {
            Ok(())
        } else {
            Err(Error::Fatal)
        }
    }

    /// Check if a key establishment is in progress
    pub fn is_active(&self) -> bool {
        self.state != KeyEstablishEvent::None
    }

    /// Current state
    pub fn state(&self) -> KeyEstablishEvent {
        self.state
    }

    /// The current or last partner
    pub fn partner(&self) -> Option<&Partner> {
        self.partner.as_ref()
    }

    /// Update the addresses of this node, after joining a network
    pub fn set_identity(&mut self, identity: Identity) {
        self.identity = identity;
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    pub fn backend(&self) -> &CB {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut CB {
        &mut self.backend
    }

    /// Receive, call this method when a key establishment cluster frame has
    /// been received
    ///
    /// `data` is the cluster library frame, header and payload.
    pub fn receive(
        &mut self,
        source: CommandSource,
        delivery: Delivery,
        data: &[u8],
    ) -> Result<(), Error> {
        let command = IncomingCommand::unpack(source, delivery, data)?;
        self.handle_command(&command)
    }

    fn handle_command(&mut self, command: &IncomingCommand) -> Result<(), Error> {
        if !command.header.is_cluster_specific() {
            if command.header.command == GeneralCommandIdentifier::DefaultResponse {
                self.handle_default_response(command);
            }
            return Ok(());
        }
        if command.header.manufacturer.is_some() {
            log::warn!("> Manufacturer specific key establishment command");
            return self.reply_default_response(
                command,
                ClusterLibraryStatus::UnsupportedManufacturerClusterCommand,
            );
        }
        let cluster_command = match Command::unpack(command.payload, command.header.command) {
            Ok((cluster_command, _)) => cluster_command,
            Err(psila_data::Error::UnknownClusterCommand) => {
                log::warn!(
                    "> Unsupported key establishment command {:02x}",
                    command.header.command
                );
                return self
                    .reply_default_response(command, ClusterLibraryStatus::UnsupportedClusterCommand);
            }
            Err(_) => {
                // The ongoing key establishment is not aborted, the partner
                // may correct the problem before the timeout
                log::warn!(
                    "> Invalid length for key establishment command {:02x}, {} bytes",
                    command.header.command,
                    command.payload.len()
                );
                return self.send_malformed_terminate(command);
            }
        };
        let direction = command.direction();
        log::info!("> {:?} {:?}", cluster_command.identifier(), direction);
        match cluster_command {
            Command::InitiateKeyEstablishment(initiate) => {
                let event = match direction {
                    Direction::ToServer => KeyEstablishEvent::Begin,
                    Direction::ToClient => KeyEstablishEvent::GenerateKeys,
                };
                self.state_machine(event, EventData::Initiate(&initiate), Some(command));
            }
            Command::EphemeralData(ephemeral) => {
                let event = match direction {
                    Direction::ToServer => KeyEstablishEvent::GenerateKeys,
                    Direction::ToClient => KeyEstablishEvent::GenerateSharedSecret,
                };
                self.state_machine(event, EventData::PublicKey(&ephemeral.data), Some(command));
            }
            Command::ConfirmKeyData(confirm) => {
                let event = match direction {
                    Direction::ToServer => KeyEstablishEvent::GenerateSharedSecret,
                    Direction::ToClient => KeyEstablishEvent::InitiatorReceivedConfirmKey,
                };
                self.state_machine(event, EventData::Smac(&confirm.mac), Some(command));
            }
            Command::TerminateKeyEstablishment(terminate) => {
                if !command.is_unicast() {
                    log::info!("> Ignoring broadcast terminate");
                    return Ok(());
                }
                let from_partner = self.partner.map_or(false, |p| p.is_source_of(command));
                if self.is_active() && from_partner {
                    if command.is_intra_pan() {
                        if let Some(sequence) = command.aps_sequence() {
                            self.duplicates.record(sequence);
                        }
                    }
                    log::info!(
                        "> Terminate received, status {:?} ({}), wait {} s",
                        terminate.status(),
                        terminate.status,
                        terminate.wait_time
                    );
                    self.terminate(NotifyMessage::PartnerSentTerminate, terminate.wait_time);
                }
                self.reply_default_response(command, ClusterLibraryStatus::Success)?;
            }
        }
        Ok(())
    }

    fn handle_default_response(&mut self, command: &IncomingCommand) {
        if !command.is_unicast() {
            log::info!("> Ignoring broadcast default response");
            return;
        }
        let failed = match DefaultResponse::unpack(command.payload) {
            Ok((response, _)) => response.status != ClusterLibraryStatus::Success,
            // Status codes not known here are failures as well
            Err(psila_data::Error::InvalidValue) => true,
            Err(_) => {
                log::warn!("> Invalid default response");
                return;
            }
        };
        let from_partner = self.partner.map_or(false, |p| p.is_source_of(command));
        if failed && self.is_active() && from_partner {
            log::warn!("> Default response with error from partner");
            self.terminate(NotifyMessage::PartnerSentDefaultResponseError, 0);
        }
    }

    /// Delivery report for a frame sent to a node in the network
    pub fn message_sent(&mut self, destination: NetworkAddress, success: bool) {
        let partner = match self.partner {
            Some(partner) => partner,
            None => return,
        };
        let to_partner = match partner.address {
            PartnerAddress::IntraPan { address, .. } => address == destination,
            PartnerAddress::InterPan { .. } => false,
        };
        if !to_partner || !self.is_active() {
            return;
        }
        if !success {
            log::error!("< Failed to send key establishment message to {}", destination);
            self.terminate(NotifyMessage::MessageSendFailure, 0);
        }
    }

    /// Key generation finished, call this when the backend reports it
    pub fn key_generation_complete(
        &mut self,
        ticket: OperationTicket,
        result: Result<PublicKey, psila_crypto::Error>,
    ) {
        if self.pending != Some(PendingOperation::GenerateKeys(ticket)) {
            log::warn!("Stale key generation result {:?}, ignored", ticket);
            return;
        }
        self.finish_operation();
        match result {
            Ok(key) => {
                self.state_machine(
                    KeyEstablishEvent::SendEphemeralData,
                    EventData::PublicKey(&key),
                    None,
                );
            }
            Err(error) => {
                log::error!("Key generation failed, {:?}", error);
                self.terminate(NotifyMessage::NoLocalResources, 0);
            }
        }
    }

    /// SMAC calculation finished, call this when the backend reports it
    pub fn smac_calculation_complete(
        &mut self,
        ticket: OperationTicket,
        result: Result<(Smac, Smac), psila_crypto::Error>,
    ) {
        if self.pending != Some(PendingOperation::CalculateSmacs(ticket)) {
            log::warn!("Stale SMAC calculation result {:?}, ignored", ticket);
            return;
        }
        self.finish_operation();
        match result {
            Ok((initiator, responder)) => {
                self.state_machine(
                    KeyEstablishEvent::SendConfirmKey,
                    EventData::Smacs {
                        initiator: &initiator,
                        responder: &responder,
                    },
                    None,
                );
            }
            Err(error) => {
                log::error!("SMAC calculation failed, {:?}", error);
                self.terminate(NotifyMessage::NoLocalResources, 0);
            }
        }
    }

    /// Poll the crypto backend for finished operations
    pub fn poll(&mut self) {
        while let Some(completion) = self.backend.poll() {
            match completion {
                Completion::KeysGenerated { ticket, result } => {
                    self.key_generation_complete(ticket, result);
                }
                Completion::SmacsCalculated { ticket, result } => {
                    self.smac_calculation_complete(ticket, result);
                }
            }
        }
    }

    /// Update, call this method at regular intervals
    ///
    /// `timestamp` is in microseconds and may wrap. Keep calling it while
    /// idle as well. A timeout is measured from the timestamp of the latest
    /// update, so a clock that is only fed while `next_timeout` is `Some`
    /// makes the next key establishment time out early.
    pub fn update(&mut self, timestamp: u32) {
        self.timestamp = timestamp;
        if let Some(timer) = self.timer {
            if timestamp.wrapping_sub(timer.start) >= timer.duration {
                self.timeout();
            }
        }
    }

    /// Timeout, call this method when the partner did not respond in time
    pub fn timeout(&mut self) {
        self.timer = None;
        if !self.is_active() {
            return;
        }
        if let Some(partner) = self.partner {
            // The partner never answered the certificate
            let unanswered =
                !partner.remote_is_initiator && self.state == KeyEstablishEvent::Begin;
            if !unanswered {
                if let Err(error) = self.send_terminate_to(
                    &partner,
                    KeyEstablishmentStatus::NoResources,
                    BACK_OFF_TIME_REPORTED_TO_PARTNER,
                ) {
                    log::error!("< Failed to queue terminate, {:?}", error);
                }
            }
        }
        self.terminate(NotifyMessage::TimeoutOccurred, 0);
    }

    /// Microseconds until the timeout, if one is scheduled
    ///
    /// Counted from the latest `update`.
    pub fn next_timeout(&self) -> Option<u32> {
        self.timer.map(|timer| {
            timer
                .duration
                .saturating_sub(self.timestamp.wrapping_sub(timer.start))
        })
    }

    fn schedule(&mut self, event: KeyEstablishEvent) {
        let seconds = self.timeouts.get(event);
        self.timer = Some(Timer {
            start: self.timestamp,
            duration: u32::from(seconds) * MICROSECONDS_PER_SECOND,
        });
    }

    fn next_ticket(&mut self) -> OperationTicket {
        self.ticket = self.ticket.next();
        self.ticket
    }

    fn start_operation(&mut self, operation: PendingOperation) {
        self.pending = Some(operation);
        self.handler.crypto_operation_in_progress(true);
    }

    fn finish_operation(&mut self) {
        self.pending = None;
        self.handler.crypto_operation_in_progress(false);
    }
}
