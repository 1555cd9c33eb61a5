//! # Common structs and functions
//!
//! Addresses used in the network

pub mod address;
