mod application;
mod simulation;

use std::fs;
use std::process;
use std::str::FromStr;

use clap::{App, AppSettings, Arg};

use serde_derive::Deserialize;

use psila_data::ExtendedAddress;

use crate::simulation::{Scenario, Settings};

/// Host configuration, every field is optional
#[derive(Debug, Default, Deserialize)]
struct Config {
    ephemeral_data_generate_time: Option<u8>,
    generate_shared_secret_time: Option<u8>,
    advertised_ephemeral_data_generate_time: Option<u8>,
    allow_new_key_entries: Option<bool>,
    /// Extended address of the trust center, hexadecimal
    trust_center: Option<String>,
    /// Extended address of the meter, hexadecimal
    meter: Option<String>,
    /// Frame delivery time in milliseconds
    latency: Option<u32>,
}

fn read_config(file_path: &str) -> Result<Config, String> {
    let bytes = fs::read(file_path).map_err(|e| format!("Failed to read {}, {}", file_path, e))?;
    toml::from_str::<Config>(&String::from_utf8_lossy(bytes.as_slice()))
        .map_err(|e| format!("Failed to parse {}, {}", file_path, e))
}

fn parse_address(value: &str) -> Result<[u8; 8], String> {
    let value = value.trim_start_matches("0x").replace(':', "");
    u64::from_str_radix(&value, 16)
        .map(|address| ExtendedAddress::new(address).to_big_endian())
        .map_err(|e| format!("Invalid extended address \"{}\", {}", value, e))
}

impl Config {
    fn settings(&self) -> Result<Settings, String> {
        let mut settings = Settings::default();
        if let Some(time) = self.ephemeral_data_generate_time {
            settings.config.ephemeral_data_generate_time = time;
            settings.config.advertised_ephemeral_data_generate_time = time;
        }
        if let Some(time) = self.generate_shared_secret_time {
            settings.config.generate_shared_secret_time = time;
        }
        if let Some(time) = self.advertised_ephemeral_data_generate_time {
            settings.config.advertised_ephemeral_data_generate_time = time;
        }
        if let Some(allow) = self.allow_new_key_entries {
            settings.config.allow_new_key_entries = allow;
        }
        if let Some(address) = &self.trust_center {
            settings.trust_center = parse_address(address)?;
        }
        if let Some(address) = &self.meter {
            settings.meter = parse_address(address)?;
        }
        if let Some(latency) = self.latency {
            settings.latency = latency.saturating_mul(1000);
        }
        Ok(settings)
    }
}

fn main() {
    env_logger::init();
    let matches = App::new("Psila key establishment simulator")
        .about("Run certificate based key establishment between a trust center and meters")
        .setting(AppSettings::DisableVersion)
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .help("Path to configuration file")
                .use_delimiter(false)
                .required(false)
                .takes_value(true),
        )
        .arg(
            Arg::with_name("scenario")
                .help("The scenario to run, all scenarios if not given")
                .possible_values(&Scenario::NAMES)
                .required(false),
        )
        .get_matches();

    let config = match matches.value_of("config") {
        Some(file_path) => match read_config(file_path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("{}", e);
                process::exit(1);
            }
        },
        None => Config::default(),
    };
    let settings = match config.settings() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    };
    log::info!("Settings {:?}", settings);

    let scenarios: Vec<Scenario> = match matches.value_of("scenario") {
        Some(name) => Scenario::from_str(name).into_iter().collect(),
        None => Scenario::NAMES
            .iter()
            .filter_map(|name| Scenario::from_str(name).ok())
            .collect(),
    };

    let mut failed = 0;
    for scenario in scenarios {
        match simulation::run(scenario, &settings) {
            Ok(true) => println!("Scenario {} passed", scenario),
            Ok(false) => {
                println!("Scenario {} FAILED", scenario);
                failed += 1;
            }
            Err(e) => {
                eprintln!("Scenario {} could not run, {}", scenario, e);
                failed += 1;
            }
        }
    }
    if failed > 0 {
        process::exit(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration() {
        let config: Config = toml::from_str(
            r#"
            ephemeral_data_generate_time = 20
            trust_center = "00:0d:6f:ff:fe:00:00:01"
            latency = 5
            "#,
        )
        .unwrap();
        let settings = config.settings().unwrap();
        assert_eq!(settings.config.ephemeral_data_generate_time, 20);
        assert_eq!(settings.config.advertised_ephemeral_data_generate_time, 20);
        assert_eq!(settings.config.generate_shared_secret_time, 15);
        assert_eq!(
            settings.trust_center,
            [0x00, 0x0d, 0x6f, 0xff, 0xfe, 0x00, 0x00, 0x01]
        );
        assert_eq!(settings.latency, 5_000);
        assert!(!settings.config.allow_new_key_entries);

        let config = Config {
            meter: Some("not an address".to_string()),
            ..Config::default()
        };
        assert!(config.settings().is_err());
    }
}
