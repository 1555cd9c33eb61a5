//! # Packing and unpacking
//!
//! Every wire structure writes itself into, and reads itself from, a byte
//! slice in over-the-air byte order.

/// Structure with a size known up front, such as addresses and frame control
pub trait PackFixed<T, E> {
    /// Write into `data`
    fn pack(&self, data: &mut [u8]) -> Result<(), E>;
    /// Read from `data`
    fn unpack(data: &[u8]) -> Result<T, E>;
}

/// Structure which size depends on its content
pub trait Pack<T, E> {
    /// Write into `data`, returns the number of bytes written
    fn pack(&self, data: &mut [u8]) -> Result<usize, E>;
    /// Read from `data`, returns the structure and the number of bytes read
    fn unpack(data: &[u8]) -> Result<(T, usize), E>;
}
