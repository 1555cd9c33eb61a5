//! # Cluster Library (ZCL)

use core::convert::TryFrom;

pub mod commands;
mod frame;
pub mod key_establishment;

pub use commands::{DefaultResponse, GeneralCommandIdentifier};
pub use frame::{ClusterLibraryHeader, Direction, FrameControl, FrameType};

/// Smart energy profile identifier
pub const SMART_ENERGY_PROFILE: u16 = 0x0109;

extended_enum!(
    /// Cluster library status codes
    ClusterLibraryStatus, u8,
    /// Operation was successful.
    Success => 0x00,
    /// Operation was not successful.
    Failure => 0x01,
    /// The sender is not authorised to carry out the command.
    NotAuthorised => 0x7e,
    /// The command is missing fields or has invalid fields.
    MalformedCommand => 0x80,
    /// The cluster specific command is not supported.
    UnsupportedClusterCommand => 0x81,
    /// The general command is not supported.
    UnsupportedGeneralCommand => 0x82,
    /// The manufacturer specific cluster command is not supported.
    UnsupportedManufacturerClusterCommand => 0x83,
    /// The manufacturer specific general command is not supported.
    UnsupportedManufacturerGeneralCommand => 0x84,
    /// At least one field of the command contains an incorrect value.
    InvalidField => 0x85,
    /// Out of range error, or set to a reserved value.
    InvalidValue => 0x87,
    /// Not enough free space to carry out the operation.
    InsufficientSpace => 0x89,
    /// The requested information could not be found.
    NotFound => 0x8b,
    /// The credentials of the sender are not sufficient.
    ActionDenied => 0x93,
    /// The exchange was aborted due to excessive response time.
    Timeout => 0x94,
    /// Hardware failure.
    HardwareFailure => 0xc0,
    /// Software failure.
    SoftwareFailure => 0xc1,
    /// The cluster is not supported.
    UnsupportedCluster => 0xc3,
);
