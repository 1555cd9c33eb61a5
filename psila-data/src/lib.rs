//! # Psila - A Z**bee crate
//!
//! Wire format of the Z**bee cluster library (ZCL) messages used by the
//! Smart Energy key establishment cluster.
//!

#![warn(missing_docs)]
#![cfg_attr(feature = "core", no_std)]

#[macro_use]
mod utils;

pub mod cluster_library; // ZCL
pub mod common;
pub mod error;
pub mod inter_pan;
pub mod pack;

pub use common::address::{ExtendedAddress, NetworkAddress, PanIdentifier, ShortAddress};
pub use error::Error;
pub use inter_pan::InterPanOptions;
