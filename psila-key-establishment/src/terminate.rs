//! Ending the key establishment and notifying the application

use bbqueue::ArrayLength;

use psila_crypto::CbkeBackend;
use psila_data::cluster_library::{
    key_establishment::{CommandIdentifier, KeyEstablishmentStatus},
    ClusterLibraryStatus,
};

use crate::handler::KeyEstablishmentHandler;
use crate::notify::NotifyMessage;
use crate::partner::PartnerAddress;
use crate::state_machine::KeyEstablishEvent;
use crate::{
    KeyEstablishment, BACK_OFF_TIME_REPORTED_TO_PARTNER, INTERNAL_ERROR_BACK_OFF_TIME,
};

impl<'a, N, CB, H> KeyEstablishment<'a, N, CB, H>
where
    N: ArrayLength<u8>,
    CB: CbkeBackend,
    H: KeyEstablishmentHandler,
{
    /// End the key establishment
    ///
    /// The link key is stored on success. The application is notified and,
    /// depending on the outcome, the partner is told. Partner and received
    /// sequence numbers are kept so that retries of already handled messages
    /// are recognised.
    pub(crate) fn terminate(&mut self, message: NotifyMessage, delay: u8) {
        let established = message == NotifyMessage::LinkKeyEstablished;
        let stored = self.backend.clear_temporary_data(established);
        let delay = if delay == 0 {
            INTERNAL_ERROR_BACK_OFF_TIME
        } else {
            delay
        };

        log::info!(
            "End key establishment, {} ({}), store link key {:?}",
            message,
            u8::from(message),
            stored
        );

        let message = if established && stored.is_err() {
            NotifyMessage::NoLocalResources
        } else {
            message
        };
        let status = message.status();

        self.notify(message, delay);

        if let Some(partner) = self.partner {
            if !partner.remote_is_initiator && message == NotifyMessage::LinkKeyEstablished {
                // Acknowledge the confirm key response
                let result = self.send_default_response(
                    &partner.destination(),
                    partner.direction(),
                    partner.sequence_number,
                    u8::from(CommandIdentifier::ConfirmKeyData),
                    ClusterLibraryStatus::Success,
                );
                if let Err(error) = result {
                    log::error!("< Failed to queue default response, {:?}", error);
                }
            } else if status != KeyEstablishmentStatus::Success
                && message != NotifyMessage::PartnerSentDefaultResponseError
                && (partner.remote_is_initiator || self.is_active())
            {
                if let Err(error) =
                    self.send_terminate_to(&partner, status, BACK_OFF_TIME_REPORTED_TO_PARTNER)
                {
                    log::error!("< Failed to queue terminate, {:?}", error);
                }
            }
        }

        self.clear_state();
    }

    /// Clear everything but the partner and the received sequence numbers
    pub(crate) fn clear_state(&mut self) {
        self.state = KeyEstablishEvent::None;
        if let Some(partner) = self.partner.as_mut() {
            partner.remote_is_initiator = true;
        }
        self.storage.clear();
        if let Err(error) = self.backend.clear_temporary_data(false) {
            log::warn!("Failed to clear temporary crypto data, {:?}", error);
        }
        if self.pending.take().is_some() {
            self.handler.crypto_operation_in_progress(false);
        }
        self.timer = None;
    }

    /// Report progress to the application
    ///
    /// Returns the answer of the application, `NoAppMessage` is not reported.
    pub(crate) fn notify(&mut self, message: NotifyMessage, delay: u8) -> bool {
        if message == NotifyMessage::NoAppMessage {
            return true;
        }
        let partner = match self.partner {
            Some(partner) => partner,
            None => return true,
        };
        let am_initiator = !partner.remote_is_initiator;
        let kind = if message.is_error() {
            "Error"
        } else if message == NotifyMessage::LinkKeyEstablished {
            "Success"
        } else {
            "Notify"
        };
        log::info!(
            "{} key establish {}: {} ({}), partner {}",
            if am_initiator { "Initiator" } else { "Responder" },
            kind,
            message,
            u8::from(message),
            partner
        );
        match partner.address {
            PartnerAddress::IntraPan { address, .. } => {
                self.handler
                    .key_establishment(message, am_initiator, address, delay)
            }
            PartnerAddress::InterPan { pan, address } => self
                .handler
                .inter_pan_key_establishment(message, am_initiator, pan, address, delay),
        }
    }
}
