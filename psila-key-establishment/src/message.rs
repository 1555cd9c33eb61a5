//! Building and queueing of outbound key establishment frames

use bbqueue::ArrayLength;

use psila_crypto::CbkeBackend;
use psila_data::{
    cluster_library::{
        key_establishment::{
            Command, KeyEstablishmentStatus, TerminateKeyEstablishment, SUITE_CBKE,
            SUITE_INVALID,
        },
        ClusterLibraryHeader, ClusterLibraryStatus, DefaultResponse, Direction,
        GeneralCommandIdentifier,
    },
    pack::Pack,
};

use crate::command::IncomingCommand;
use crate::handler::KeyEstablishmentHandler;
use crate::partner::Partner;
use crate::transmit::Destination;
use crate::{Error, KeyEstablishment, BACK_OFF_TIME_REPORTED_TO_PARTNER, PACKET_BUFFER_MAX};

enum Payload<'p> {
    Command(&'p Command),
    DefaultResponse(&'p DefaultResponse),
}

impl<'a, N, CB, H> KeyEstablishment<'a, N, CB, H>
where
    N: ArrayLength<u8>,
    CB: CbkeBackend,
    H: KeyEstablishmentHandler,
{
    /// Suite reported in terminate messages
    pub(crate) fn suite(&self) -> u16 {
        if self.initialized {
            SUITE_CBKE
        } else {
            SUITE_INVALID
        }
    }

    /// Send a key establishment command to the current partner
    pub(crate) fn send_command(&mut self, command: &Command) -> Result<(), Error> {
        match self.partner {
            Some(partner) => self.send_command_to(&partner, command),
            None => Err(Error::InvalidCall),
        }
    }

    /// Send a key establishment command to a partner
    ///
    /// The application may drop the command, that is not a error.
    pub(crate) fn send_command_to(
        &mut self,
        partner: &Partner,
        command: &Command,
    ) -> Result<(), Error> {
        let identifier = command.identifier();
        if !self.handler.allow_send(identifier) {
            log::info!("< Dropped {:?} to {}", identifier, partner);
            return Ok(());
        }
        let header = ClusterLibraryHeader::cluster_specific(
            partner.direction(),
            partner.sequence_number,
            u8::from(identifier),
        );
        let length = self.queue_frame(
            &partner.destination(),
            &header,
            Payload::Command(command),
        )?;
        log::info!("< Queued {:?} to {}, {} bytes", identifier, partner, length);
        Ok(())
    }

    /// Send terminate key establishment to a partner
    pub(crate) fn send_terminate_to(
        &mut self,
        partner: &Partner,
        status: KeyEstablishmentStatus,
        wait_time: u8,
    ) -> Result<(), Error> {
        let command = Command::TerminateKeyEstablishment(TerminateKeyEstablishment {
            status: u8::from(status),
            wait_time,
            suite: self.suite(),
        });
        self.send_command_to(partner, &command)
    }

    /// Reply to a command that could not be parsed
    ///
    /// Sent to the sender of the command, which might not be the partner.
    pub(crate) fn send_malformed_terminate(&mut self, command: &IncomingCommand) -> Result<(), Error> {
        let destination = match command.reply_destination() {
            Some(destination) => destination,
            None => return Ok(()),
        };
        let reply = Command::TerminateKeyEstablishment(TerminateKeyEstablishment {
            status: u8::from(KeyEstablishmentStatus::BadMessage),
            wait_time: BACK_OFF_TIME_REPORTED_TO_PARTNER,
            suite: self.suite(),
        });
        let header = ClusterLibraryHeader::cluster_specific(
            command.direction().reverse(),
            command.header.transaction_sequence,
            u8::from(reply.identifier()),
        );
        self.queue_frame(&destination, &header, Payload::Command(&reply))?;
        log::info!("< Queued terminate, bad message");
        Ok(())
    }

    /// Reply with a default response to a received command
    ///
    /// A successful response is not sent if the sender disabled it.
    pub(crate) fn reply_default_response(
        &mut self,
        command: &IncomingCommand,
        status: ClusterLibraryStatus,
    ) -> Result<(), Error> {
        if status == ClusterLibraryStatus::Success && command.header.control.disable_default_response
        {
            return Ok(());
        }
        let destination = match command.reply_destination() {
            Some(destination) => destination,
            None => return Ok(()),
        };
        self.send_default_response(
            &destination,
            command.direction().reverse(),
            command.header.transaction_sequence,
            command.header.command,
            status,
        )
    }

    pub(crate) fn send_default_response(
        &mut self,
        destination: &Destination,
        direction: Direction,
        sequence: u8,
        command: u8,
        status: ClusterLibraryStatus,
    ) -> Result<(), Error> {
        let header = ClusterLibraryHeader::general(
            direction,
            sequence,
            u8::from(GeneralCommandIdentifier::DefaultResponse),
        );
        let response = DefaultResponse { command, status };
        self.queue_frame(destination, &header, Payload::DefaultResponse(&response))?;
        log::info!("< Queued default response {:?}", status);
        Ok(())
    }

    fn queue_frame(
        &mut self,
        destination: &Destination,
        header: &ClusterLibraryHeader,
        payload: Payload,
    ) -> Result<usize, Error> {
        let mut buffer = [0u8; PACKET_BUFFER_MAX];
        let mut offset = destination.pack(&mut buffer)?;
        offset += header.pack(&mut buffer[offset..])?;
        offset += match payload {
            Payload::Command(command) => command.pack(&mut buffer[offset..])?,
            Payload::DefaultResponse(response) => response.pack(&mut buffer[offset..])?,
        };
        self.queue_packet(&buffer[..offset])?;
        Ok(offset)
    }

    /// Push a record onto the queue
    fn queue_packet(&mut self, data: &[u8]) -> Result<(), Error> {
        let length = data.len();
        if length >= PACKET_BUFFER_MAX {
            return Err(Error::NotEnoughSpace);
        }
        let grant_size = length + 1;
        match self.tx_queue.grant_exact(grant_size) {
            Ok(mut grant) => {
                grant[0] = length as u8;
                grant[1..].copy_from_slice(data);
                grant.commit(grant_size);
                Ok(())
            }
            Err(_) => Err(Error::NotEnoughSpace),
        }
    }
}
