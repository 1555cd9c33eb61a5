//! General cluster library commands

mod default_response;

use core::convert::TryFrom;

pub use default_response::DefaultResponse;

extended_enum!(
    /// Cluster library general command identifiers
    GeneralCommandIdentifier, u8,
    /// Read attributes
    ReadAttributes => 0x00,
    /// Read attributes response
    ReadAttributesResponse => 0x01,
    /// Write attributes
    WriteAttributes => 0x02,
    /// Write attributes response
    WriteAttributesResponse => 0x04,
    /// Report attributes
    ReportAttributes => 0x0a,
    /// Default response
    DefaultResponse => 0x0b,
    /// Discover attributes
    DiscoverAttributes => 0x0c,
    /// Discover attributes response
    DiscoverAttributesResponse => 0x0d,
);
