use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

use bbqueue::{consts::U1024, BBBuffer, Consumer};
use chrono::{Local, SecondsFormat};

use psila_crypto::CERTIFICATE_IDENTIFIER_SIZE;
use psila_crypto_rust_crypto::{make_certificate, RustCryptoBackend};
use psila_data::{
    cluster_library::key_establishment::CommandIdentifier, ExtendedAddress, NetworkAddress,
};
use psila_key_establishment::{
    transmit::unpack_record, CommandSource, Config, Delivery, Destination, Identity,
    KeyEstablishment, NotifyMessage,
};

use crate::application::Application;

type Service<'a> = KeyEstablishment<'a, U1024, RustCryptoBackend, Application>;

/// Simulated time between two updates, in microseconds
const STEP: u32 = 50_000;
/// Give up after this many microseconds
const TIME_LIMIT: u32 = 300_000_000;

const TRUST_CENTER_ADDRESS: u16 = 0x0000;
const METER_ADDRESS: u16 = 0x4a1c;
const SECOND_METER_ADDRESS: u16 = 0x7e02;

const TRUST_CENTER_ENDPOINT: u8 = 0x01;
const METER_ENDPOINT: u8 = 0x0a;

/// Issuer of the simulated certificates
pub const ISSUER: [u8; CERTIFICATE_IDENTIFIER_SIZE] =
    [0x54, 0x45, 0x53, 0x54, 0x53, 0x45, 0x43, 0x41];
const FOREIGN_ISSUER: [u8; CERTIFICATE_IDENTIFIER_SIZE] =
    [0x46, 0x4f, 0x52, 0x45, 0x49, 0x47, 0x4e, 0x31];

fn timestamp() -> String {
    Local::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Scenario {
    /// Meter and trust center establish a link key
    Success,
    /// A second meter tries while the first one is busy
    Busy,
    /// The confirm key of the trust center gets lost
    Timeout,
    /// The meter certificate comes from a unknown issuer
    BadIssuer,
    /// The crypto engine of the trust center fails
    CryptoFailure,
}

impl Scenario {
    pub const NAMES: [&'static str; 5] =
        ["success", "busy", "timeout", "bad-issuer", "crypto-failure"];
}

impl FromStr for Scenario {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Scenario::Success),
            "busy" => Ok(Scenario::Busy),
            "timeout" => Ok(Scenario::Timeout),
            "bad-issuer" => Ok(Scenario::BadIssuer),
            "crypto-failure" => Ok(Scenario::CryptoFailure),
            _ => Err(format!("Unknown scenario \"{}\"", s)),
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Scenario::Success => Scenario::NAMES[0],
            Scenario::Busy => Scenario::NAMES[1],
            Scenario::Timeout => Scenario::NAMES[2],
            Scenario::BadIssuer => Scenario::NAMES[3],
            Scenario::CryptoFailure => Scenario::NAMES[4],
        };
        write!(f, "{}", name)
    }
}

/// Simulation settings
#[derive(Clone, Copy, Debug)]
pub struct Settings {
    /// Key establishment configuration of every device
    pub config: Config,
    /// Certificate subject of the trust center
    pub trust_center: [u8; CERTIFICATE_IDENTIFIER_SIZE],
    /// Certificate subject of the meter
    pub meter: [u8; CERTIFICATE_IDENTIFIER_SIZE],
    /// Frame delivery time in microseconds
    pub latency: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            config: Config::default(),
            trust_center: [0x00, 0x0d, 0x6f, 0xff, 0xfe, 0x10, 0x20, 0x30],
            meter: [0x00, 0x0d, 0x6f, 0xff, 0xfe, 0x21, 0xae, 0x85],
            latency: 20_000,
        }
    }
}

/// A simulated device
pub struct Device<'a> {
    pub service: Service<'a>,
    queue: Consumer<'a, U1024>,
    address: NetworkAddress,
    aps_sequence: u8,
}

impl<'a> Device<'a> {
    pub fn new(
        buffer: &'a BBBuffer<U1024>,
        address: u16,
        endpoint: u8,
        certificate: ([u8; CERTIFICATE_IDENTIFIER_SIZE], [u8; CERTIFICATE_IDENTIFIER_SIZE]),
        application: Application,
        config: Config,
    ) -> Result<Self, String> {
        let (producer, queue) = buffer
            .try_split()
            .map_err(|e| format!("Failed to split queue, {:?}", e))?;
        let (subject, issuer) = certificate;
        let backend = RustCryptoBackend::new(make_certificate(subject, issuer));
        let identity = Identity::new(
            NetworkAddress::new(address),
            ExtendedAddress::from_big_endian(&subject),
        );
        let mut service = KeyEstablishment::new(backend, application, producer, identity, config);
        service.init(endpoint);
        Ok(Device {
            service,
            queue,
            address: NetworkAddress::new(address),
            aps_sequence: 0,
        })
    }

    pub fn name(&self) -> &'static str {
        self.service.handler().name()
    }

    pub fn outcome(&self) -> Option<NotifyMessage> {
        self.service.handler().outcome()
    }
}

/// A frame on its way through the network
struct InFlight {
    from: NetworkAddress,
    aps_sequence: u8,
    destination: Destination,
    frame: Vec<u8>,
    deliver_at: u32,
}

/// Devices connected through a simulated network with a simulated clock
pub struct Network<'a> {
    devices: Vec<Device<'a>>,
    in_flight: VecDeque<InFlight>,
    clock: u32,
    latency: u32,
}

impl<'a> Network<'a> {
    pub fn new(latency: u32) -> Self {
        Network {
            devices: Vec::new(),
            in_flight: VecDeque::new(),
            clock: 0,
            latency,
        }
    }

    pub fn add(&mut self, device: Device<'a>) -> usize {
        self.devices.push(device);
        self.devices.len() - 1
    }

    pub fn device(&self, index: usize) -> &Device<'a> {
        &self.devices[index]
    }

    pub fn device_mut(&mut self, index: usize) -> &mut Device<'a> {
        &mut self.devices[index]
    }

    fn is_idle(&self) -> bool {
        self.in_flight.is_empty() && self.devices.iter().all(|d| !d.service.is_active())
    }

    /// Take the queued frames of every device
    fn collect(&mut self) {
        for device in self.devices.iter_mut() {
            while let Ok(grant) = device.queue.read() {
                let length = grant[0] as usize;
                match unpack_record(&grant[1..=length]) {
                    Ok((destination, frame)) => {
                        device.aps_sequence = device.aps_sequence.wrapping_add(1);
                        self.in_flight.push_back(InFlight {
                            from: device.address,
                            aps_sequence: device.aps_sequence,
                            destination,
                            frame: frame.to_vec(),
                            deliver_at: self.clock + self.latency,
                        });
                    }
                    Err(e) => log::error!("Invalid record from {}, {:?}", device.address, e),
                }
                grant.release(length + 1);
            }
        }
    }

    fn deliver(&mut self, message: InFlight) {
        let (address, source_endpoint, destination_endpoint) = match message.destination {
            Destination::Unicast {
                address,
                source_endpoint,
                destination_endpoint,
            } => (address, source_endpoint, destination_endpoint),
            Destination::InterPan { pan, address } => {
                log::warn!("Inter-PAN frame for {} {} not simulated", pan, address);
                return;
            }
        };
        let delivered = match self.devices.iter_mut().find(|d| d.address == address) {
            Some(device) => {
                let source = CommandSource::IntraPan {
                    address: message.from,
                    source_endpoint,
                    destination_endpoint,
                    aps_sequence: message.aps_sequence,
                };
                if let Err(e) = device
                    .service
                    .receive(source, Delivery::Unicast, &message.frame)
                {
                    log::error!("{} failed to receive frame, {:?}", device.name(), e);
                }
                true
            }
            None => false,
        };
        if let Some(sender) = self.devices.iter_mut().find(|d| d.address == message.from) {
            sender.service.message_sent(address, delivered);
        }
    }

    /// Advance the clock one step
    pub fn step(&mut self) {
        self.clock += STEP;
        for device in self.devices.iter_mut() {
            device.service.poll();
            device.service.update(self.clock);
        }
        self.collect();
        while let Some(message) = self.in_flight.front() {
            if message.deliver_at > self.clock {
                break;
            }
            if let Some(message) = self.in_flight.pop_front() {
                self.deliver(message);
            }
        }
        self.collect();
    }

    /// Run until nothing happens any more
    pub fn run(&mut self) -> bool {
        self.collect();
        while self.clock < TIME_LIMIT {
            self.step();
            if self.is_idle() {
                log::info!("Idle after {} ms", self.clock / 1000);
                return true;
            }
        }
        log::error!("Simulation did not finish in {} s", TIME_LIMIT / 1_000_000);
        false
    }
}

fn initiate(network: &mut Network, index: usize) -> Result<(), String> {
    let device = network.device_mut(index);
    println!("{} {} initiates key establishment", timestamp(), device.name());
    device
        .service
        .initiate(NetworkAddress::new(TRUST_CENTER_ADDRESS), TRUST_CENTER_ENDPOINT)
        .map_err(|e| format!("{} failed to initiate, {:?}", device.name(), e))
}

fn check(network: &Network, index: usize, expected: NotifyMessage) -> bool {
    let device = network.device(index);
    match device.outcome() {
        Some(outcome) if outcome == expected => {
            println!("{} {}: {} as expected", timestamp(), device.name(), outcome);
            true
        }
        Some(outcome) => {
            println!(
                "{} {}: {}, expected {}",
                timestamp(),
                device.name(),
                outcome,
                expected
            );
            false
        }
        None => {
            println!("{} {}: no outcome, expected {}", timestamp(), device.name(), expected);
            false
        }
    }
}

fn print_link_key(device: &Device) {
    if let Some(link_key) = device.service.backend().link_key() {
        let key: String = link_key.key.iter().map(|b| format!("{:02x}", b)).collect();
        println!(
            "{} {} link key with {}: {}",
            timestamp(),
            device.name(),
            ExtendedAddress::from_big_endian(&link_key.partner),
            key
        );
    }
}

/// Run a scenario, returns true if every device ended as expected
pub fn run(scenario: Scenario, settings: &Settings) -> Result<bool, String> {
    let trust_center_buffer: BBBuffer<U1024> = BBBuffer::new();
    let meter_buffer: BBBuffer<U1024> = BBBuffer::new();
    let second_meter_buffer: BBBuffer<U1024> = BBBuffer::new();

    let trust_center_eui = ExtendedAddress::from_big_endian(&settings.trust_center);
    let meter_eui = ExtendedAddress::from_big_endian(&settings.meter);
    let mut second_meter = settings.meter;
    second_meter[CERTIFICATE_IDENTIFIER_SIZE - 1] ^= 0xff;
    let second_meter_eui = ExtendedAddress::from_big_endian(&second_meter);

    let mut trust_center_application = Application::new("Trust center")
        .with_key_table_entry(meter_eui)
        .with_key_table_entry(second_meter_eui);
    if scenario == Scenario::Timeout {
        trust_center_application =
            trust_center_application.with_dropped_command(CommandIdentifier::ConfirmKeyData);
    }
    let meter_issuer = if scenario == Scenario::BadIssuer {
        FOREIGN_ISSUER
    } else {
        ISSUER
    };

    let mut network = Network::new(settings.latency);
    let trust_center = network.add(Device::new(
        &trust_center_buffer,
        TRUST_CENTER_ADDRESS,
        TRUST_CENTER_ENDPOINT,
        (settings.trust_center, ISSUER),
        trust_center_application,
        settings.config,
    )?);
    let meter = network.add(Device::new(
        &meter_buffer,
        METER_ADDRESS,
        METER_ENDPOINT,
        (settings.meter, meter_issuer),
        Application::new("Meter").with_trust_center(trust_center_eui),
        settings.config,
    )?);

    println!("{} Scenario {}", timestamp(), scenario);

    let passed = match scenario {
        Scenario::Success => {
            initiate(&mut network, meter)?;
            network.run()
                && check(&network, meter, NotifyMessage::LinkKeyEstablished)
                && check(&network, trust_center, NotifyMessage::LinkKeyEstablished)
        }
        Scenario::Busy => {
            let second = network.add(Device::new(
                &second_meter_buffer,
                SECOND_METER_ADDRESS,
                METER_ENDPOINT,
                (second_meter, ISSUER),
                Application::new("Second meter").with_trust_center(trust_center_eui),
                settings.config,
            )?);
            initiate(&mut network, meter)?;
            // Let the trust center pick up the first certificate
            for _ in 0..100 {
                if network.device(trust_center).service.is_active() {
                    break;
                }
                network.step();
            }
            initiate(&mut network, second)?;
            network.run()
                && check(&network, meter, NotifyMessage::LinkKeyEstablished)
                && check(&network, trust_center, NotifyMessage::LinkKeyEstablished)
                && check(&network, second, NotifyMessage::PartnerSentTerminate)
        }
        Scenario::Timeout => {
            initiate(&mut network, meter)?;
            network.run()
                && check(&network, meter, NotifyMessage::TimeoutOccurred)
                && check(&network, trust_center, NotifyMessage::LinkKeyEstablished)
        }
        Scenario::BadIssuer => {
            initiate(&mut network, meter)?;
            network.run()
                && check(&network, meter, NotifyMessage::PartnerSentTerminate)
                && check(&network, trust_center, NotifyMessage::BadCertificateIssuer)
        }
        Scenario::CryptoFailure => {
            network
                .device_mut(trust_center)
                .service
                .backend_mut()
                .set_fail_operations(true);
            initiate(&mut network, meter)?;
            network.run()
                && check(&network, meter, NotifyMessage::PartnerSentTerminate)
                && check(&network, trust_center, NotifyMessage::NoLocalResources)
        }
    };

    print_link_key(network.device(meter));
    print_link_key(network.device(trust_center));

    Ok(passed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_names() {
        for name in Scenario::NAMES.iter() {
            let scenario = Scenario::from_str(name).unwrap();
            assert_eq!(format!("{}", scenario), *name);
        }
        assert!(Scenario::from_str("other").is_err());
    }

    #[test]
    fn every_scenario_passes() {
        let settings = Settings::default();
        for name in Scenario::NAMES.iter() {
            let scenario = Scenario::from_str(name).unwrap();
            assert_eq!(run(scenario, &settings), Ok(true), "scenario {}", name);
        }
    }

    #[test]
    fn link_keys_match() {
        let buffers: [BBBuffer<U1024>; 2] = [BBBuffer::new(), BBBuffer::new()];
        let settings = Settings::default();
        let mut network = Network::new(settings.latency);
        let trust_center = network.add(
            Device::new(
                &buffers[0],
                TRUST_CENTER_ADDRESS,
                TRUST_CENTER_ENDPOINT,
                (settings.trust_center, ISSUER),
                Application::new("Trust center")
                    .with_key_table_entry(ExtendedAddress::from_big_endian(&settings.meter)),
                settings.config,
            )
            .unwrap(),
        );
        let meter = network.add(
            Device::new(
                &buffers[1],
                METER_ADDRESS,
                METER_ENDPOINT,
                (settings.meter, ISSUER),
                Application::new("Meter")
                    .with_trust_center(ExtendedAddress::from_big_endian(&settings.trust_center)),
                settings.config,
            )
            .unwrap(),
        );
        initiate(&mut network, meter).unwrap();
        assert!(network.run());
        let meter_key = network.device(meter).service.backend().link_key().copied();
        let trust_center_key = network
            .device(trust_center)
            .service
            .backend()
            .link_key()
            .copied();
        assert!(meter_key.is_some());
        assert_eq!(
            meter_key.map(|k| k.key),
            trust_center_key.map(|k| k.key)
        );
    }
}
