//! Messages reported to the application during key establishment

use core::convert::TryFrom;

use psila_data::{cluster_library::key_establishment::KeyEstablishmentStatus, extended_enum};

extended_enum!(
    /// Progress and outcome of the key establishment
    NotifyMessage, u8,
    /// Nothing to report
    NoAppMessage => 0,
    /// The certificate of the partner was received
    ReceivedPartnerCertificate => 1,
    /// Started generating the ephemeral key pair
    GeneratingEphemeralKeys => 2,
    /// Started calculating the shared secret
    GeneratingSharedSecret => 3,
    /// The ephemeral key pair is ready
    KeyGenerationDone => 4,
    /// The shared secret is ready
    GenerateSharedSecretDone => 5,
    /// The link key was established
    LinkKeyEstablished => 6,
    /// Local certificate, crypto or storage failure
    NoLocalResources => 7,
    /// The partner has no resources
    PartnerNoResources => 8,
    /// The partner did not respond in time
    TimeoutOccurred => 9,
    /// The application made a invalid request
    InvalidAppCommand => 10,
    /// A message could not be delivered to the partner
    MessageSendFailure => 11,
    /// The partner terminated the key establishment
    PartnerSentTerminate => 12,
    /// The partner sent a unexpected or invalid message
    InvalidPartnerMessage => 13,
    /// The partner replied with a failing default response
    PartnerSentDefaultResponseError => 14,
    /// The partner certificate has a unknown issuer
    BadCertificateIssuer => 15,
    /// The SMACs did not match
    KeyConfirmFailure => 16,
    /// The partner requested a unsupported suite
    BadKeyEstablishmentSuite => 17,
    /// No room for the link key
    KeyTableFull => 18,
    /// Key establishment is only allowed with the trust center
    NoEstablishmentAllowed => 19,
);

/// Messages from this value and up are errors
pub const FIRST_ERROR_MESSAGE: u8 = 7;

const MESSAGE_COUNT: usize = 20;

// A success status means that no terminate is sent
const MESSAGE_STATUS: [KeyEstablishmentStatus; MESSAGE_COUNT] = [
    KeyEstablishmentStatus::Success,
    KeyEstablishmentStatus::Success,
    KeyEstablishmentStatus::Success,
    KeyEstablishmentStatus::Success,
    KeyEstablishmentStatus::Success,
    KeyEstablishmentStatus::Success,
    KeyEstablishmentStatus::Success,
    KeyEstablishmentStatus::NoResources,
    KeyEstablishmentStatus::Success,
    KeyEstablishmentStatus::Success,
    KeyEstablishmentStatus::Success,
    KeyEstablishmentStatus::Success,
    KeyEstablishmentStatus::Success,
    KeyEstablishmentStatus::BadMessage,
    KeyEstablishmentStatus::BadMessage,
    KeyEstablishmentStatus::UnknownIssuer,
    KeyEstablishmentStatus::BadKeyConfirm,
    KeyEstablishmentStatus::UnsupportedSuite,
    KeyEstablishmentStatus::NoResources,
    KeyEstablishmentStatus::NoResources,
];

const MESSAGE_TEXT: [&str; MESSAGE_COUNT] = [
    "None",
    "Received certificate",
    "Generate keys",
    "Generate secret",
    "Key generate done",
    "Generate secret done",
    "Link key verified",
    "No local resources",
    "Partner no resources",
    "Timeout",
    "Invalid application command",
    "Message send failure",
    "Partner sent terminate",
    "Bad message",
    "Partner sent default response",
    "Bad certificate issuer",
    "Key confirm failure",
    "Bad key establishment suite",
    "Key table full",
    "Not allowed",
];

impl NotifyMessage {
    /// Status sent to the partner for this outcome
    pub fn status(self) -> KeyEstablishmentStatus {
        MESSAGE_STATUS[u8::from(self) as usize]
    }

    /// Check if the message reports a failure
    pub fn is_error(self) -> bool {
        u8::from(self) >= FIRST_ERROR_MESSAGE
    }

    /// Short description
    pub fn text(self) -> &'static str {
        MESSAGE_TEXT[u8::from(self) as usize]
    }
}

impl core::fmt::Display for NotifyMessage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_table() {
        assert_eq!(NotifyMessage::NoAppMessage.status(), KeyEstablishmentStatus::Success);
        assert_eq!(NotifyMessage::LinkKeyEstablished.status(), KeyEstablishmentStatus::Success);
        assert_eq!(NotifyMessage::NoLocalResources.status(), KeyEstablishmentStatus::NoResources);
        assert_eq!(NotifyMessage::TimeoutOccurred.status(), KeyEstablishmentStatus::Success);
        assert_eq!(NotifyMessage::PartnerSentTerminate.status(), KeyEstablishmentStatus::Success);
        assert_eq!(NotifyMessage::InvalidPartnerMessage.status(), KeyEstablishmentStatus::BadMessage);
        assert_eq!(
            NotifyMessage::PartnerSentDefaultResponseError.status(),
            KeyEstablishmentStatus::BadMessage
        );
        assert_eq!(NotifyMessage::BadCertificateIssuer.status(), KeyEstablishmentStatus::UnknownIssuer);
        assert_eq!(NotifyMessage::KeyConfirmFailure.status(), KeyEstablishmentStatus::BadKeyConfirm);
        assert_eq!(
            NotifyMessage::BadKeyEstablishmentSuite.status(),
            KeyEstablishmentStatus::UnsupportedSuite
        );
        assert_eq!(NotifyMessage::KeyTableFull.status(), KeyEstablishmentStatus::NoResources);
        assert_eq!(NotifyMessage::NoEstablishmentAllowed.status(), KeyEstablishmentStatus::NoResources);
    }

    #[test]
    fn every_message_has_status_and_text() {
        for value in 0..MESSAGE_COUNT as u8 {
            let message = NotifyMessage::try_from(value).unwrap();
            assert_eq!(message.is_error(), value >= 7);
            assert!(!message.text().is_empty());
            let _ = message.status();
        }
        assert!(NotifyMessage::try_from(MESSAGE_COUNT as u8).is_err());
    }
}
