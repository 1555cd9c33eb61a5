//! Key establishment timing and policy

/// Seconds needed to generate the ephemeral key pair
pub const EPHEMERAL_DATA_GENERATE_TIME: u8 = 10;
/// Seconds needed to calculate the shared secret and the SMACs
pub const GENERATE_SHARED_SECRET_TIME: u8 = 15;

/// Key establishment configuration
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Config {
    /// Local time in seconds for generating the ephemeral key pair
    pub ephemeral_data_generate_time: u8,
    /// Local time in seconds for calculating the shared secret
    pub generate_shared_secret_time: u8,
    /// Ephemeral data generate time reported to the partner
    pub advertised_ephemeral_data_generate_time: u8,
    /// Let the trust center create key table entries for unknown devices
    pub allow_new_key_entries: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ephemeral_data_generate_time: EPHEMERAL_DATA_GENERATE_TIME,
            generate_shared_secret_time: GENERATE_SHARED_SECRET_TIME,
            advertised_ephemeral_data_generate_time: EPHEMERAL_DATA_GENERATE_TIME,
            allow_new_key_entries: false,
        }
    }
}
