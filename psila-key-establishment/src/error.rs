use core::convert::From;

use psila_crypto;
use psila_data;

/// Errors
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Error {
    /// Key establishment is in progress or was not initialised
    InvalidCall,
    /// Key establishment ended before the first message was sent
    Fatal,
    /// The received frame could not be parsed
    MalformedPacket,
    /// No space left in the transmit queue
    NotEnoughSpace,
    /// Partner data stored out of order
    StorageOrder,
    /// Wire format error
    DataError(psila_data::Error),
    /// Crypto backend error
    CryptoError(psila_crypto::Error),
}

impl From<psila_data::Error> for Error {
    fn from(error: psila_data::Error) -> Self {
        Self::DataError(error)
    }
}

impl From<psila_crypto::Error> for Error {
    fn from(error: psila_crypto::Error) -> Self {
        Self::CryptoError(error)
    }
}
