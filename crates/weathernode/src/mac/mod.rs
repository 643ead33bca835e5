//! The LoRaMAC stack interface.
//!
//! The MAC layer (join procedure, frame counters, receive windows, regional
//! rules) is an external collaborator. This module defines the trait the
//! application talks to, the parameter and status types exchanged with it, and
//! a host-side [`SimulatedMac`] implementation.

mod sim;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::keys::{AesKey, AppEui, DevAddr, DevEui};

pub use sim::{max_payload_len, SimulatedMac};

/// Highest data rate index accepted by `set dr` and `set rx2_dr`.
pub const MAX_DATARATE: u8 = 15;

/// Highest TX power index accepted by `set tx_power`.
pub const MAX_TX_POWER: u8 = 15;

/// Status codes the MAC stack reports for rejected operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MacError {
    /// The regional duty-cycle budget forbids transmitting now.
    #[error("dutycycle restriction")]
    DutycycleRestricted,

    /// The MAC is still processing a previous request.
    #[error("mac is busy")]
    Busy,

    /// The network did not accept the join request.
    #[error("join procedure failed")]
    JoinFailed,

    /// A session already exists.
    #[error("already joined")]
    AlreadyJoined,

    /// Sending requires a session.
    #[error("not joined")]
    NotJoined,

    /// The uplink could not be transmitted.
    #[error("transmission error")]
    TxError,

    /// Reading or writing the non-volatile configuration failed.
    #[error("NVM error: {0}")]
    Nvm(String),
}

/// LoRaWAN device class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DeviceClass {
    /// Receive windows only after uplinks.
    #[default]
    A,
    /// Scheduled receive slots.
    B,
    /// Continuously listening.
    C,
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::A => write!(f, "A"),
            Self::B => write!(f, "B"),
            Self::C => write!(f, "C"),
        }
    }
}

/// Network activation procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinMode {
    /// Over-the-air activation.
    #[default]
    Otaa,
    /// Activation by personalization.
    Abp,
}

impl fmt::Display for JoinMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Otaa => write!(f, "otaa"),
            Self::Abp => write!(f, "abp"),
        }
    }
}

/// Whether uplinks ask the network for an acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxMode {
    /// Confirmed uplink.
    #[default]
    Confirmed,
    /// Unconfirmed uplink.
    Unconfirmed,
}

/// A LoRaWAN application port, 1..=223.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct FPort(u8);

/// Rejected application port number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("port can only be between 1 and 223, got {0}")]
pub struct InvalidPort(pub u8);

impl FPort {
    /// Highest application port.
    pub const MAX: u8 = 223;

    /// Port used when none is given.
    pub const DEFAULT: FPort = FPort(2);

    /// Validate a port number.
    #[must_use]
    pub fn new(port: u8) -> Option<Self> {
        (1..=Self::MAX).contains(&port).then_some(Self(port))
    }

    /// The raw port number.
    #[must_use]
    pub fn get(self) -> u8 {
        self.0
    }
}

impl Default for FPort {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<u8> for FPort {
    type Error = InvalidPort;

    fn try_from(port: u8) -> Result<Self, Self::Error> {
        Self::new(port).ok_or(InvalidPort(port))
    }
}

impl From<FPort> for u8 {
    fn from(port: FPort) -> Self {
        port.0
    }
}

impl fmt::Display for FPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A MAC parameter that can be read and written from the shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Param {
    /// Device EUI.
    DevEui,
    /// Application EUI.
    AppEui,
    /// Application key.
    AppKey,
    /// Application session key.
    AppSKey,
    /// Network session key.
    NwkSKey,
    /// Device address.
    DevAddr,
    /// Device class.
    Class,
    /// Uplink data rate index.
    Dr,
    /// Adaptive data rate.
    Adr,
    /// Public network sync word.
    Public,
    /// Network identifier.
    NetId,
    /// TX power index.
    TxPower,
    /// RX2 window frequency in Hz.
    Rx2Freq,
    /// RX2 window data rate index.
    Rx2Dr,
}

impl Param {
    /// Every parameter, in the order the usage text lists them.
    pub const ALL: [Param; 14] = [
        Self::DevEui,
        Self::AppEui,
        Self::AppKey,
        Self::AppSKey,
        Self::NwkSKey,
        Self::DevAddr,
        Self::Class,
        Self::Dr,
        Self::Adr,
        Self::Public,
        Self::NetId,
        Self::TxPower,
        Self::Rx2Freq,
        Self::Rx2Dr,
    ];

    /// Name used on the command line.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::DevEui => "deveui",
            Self::AppEui => "appeui",
            Self::AppKey => "appkey",
            Self::AppSKey => "appskey",
            Self::NwkSKey => "nwkskey",
            Self::DevAddr => "devaddr",
            Self::Class => "class",
            Self::Dr => "dr",
            Self::Adr => "adr",
            Self::Public => "public",
            Self::NetId => "netid",
            Self::TxPower => "tx_power",
            Self::Rx2Freq => "rx2_freq",
            Self::Rx2Dr => "rx2_dr",
        }
    }

    /// Look a parameter up by its command-line name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|param| param.name() == name)
    }
}

/// A typed parameter value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamValue {
    /// Device EUI.
    DevEui(DevEui),
    /// Application EUI.
    AppEui(AppEui),
    /// Application key.
    AppKey(AesKey),
    /// Application session key.
    AppSKey(AesKey),
    /// Network session key.
    NwkSKey(AesKey),
    /// Device address.
    DevAddr(DevAddr),
    /// Device class.
    Class(DeviceClass),
    /// Uplink data rate index.
    Dr(u8),
    /// Adaptive data rate.
    Adr(bool),
    /// Public network.
    Public(bool),
    /// Network identifier.
    NetId(u32),
    /// TX power index.
    TxPower(u8),
    /// RX2 frequency in Hz.
    Rx2Freq(u32),
    /// RX2 data rate index.
    Rx2Dr(u8),
}

impl ParamValue {
    /// The parameter this value belongs to.
    #[must_use]
    pub fn param(&self) -> Param {
        match self {
            Self::DevEui(_) => Param::DevEui,
            Self::AppEui(_) => Param::AppEui,
            Self::AppKey(_) => Param::AppKey,
            Self::AppSKey(_) => Param::AppSKey,
            Self::NwkSKey(_) => Param::NwkSKey,
            Self::DevAddr(_) => Param::DevAddr,
            Self::Class(_) => Param::Class,
            Self::Dr(_) => Param::Dr,
            Self::Adr(_) => Param::Adr,
            Self::Public(_) => Param::Public,
            Self::NetId(_) => Param::NetId,
            Self::TxPower(_) => Param::TxPower,
            Self::Rx2Freq(_) => Param::Rx2Freq,
            Self::Rx2Dr(_) => Param::Rx2Dr,
        }
    }
}

fn on_off(flag: bool) -> &'static str {
    if flag {
        "on"
    } else {
        "off"
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DevEui(v) => write!(f, "DEVEUI: {v}"),
            Self::AppEui(v) => write!(f, "APPEUI: {v}"),
            Self::AppKey(v) => write!(f, "APPKEY: {v}"),
            Self::AppSKey(v) => write!(f, "APPSKEY: {v}"),
            Self::NwkSKey(v) => write!(f, "NWKSKEY: {v}"),
            Self::DevAddr(v) => write!(f, "DEVADDR: {v}"),
            Self::Class(v) => write!(f, "Device class: {v}"),
            Self::Dr(v) => write!(f, "DATARATE: {v}"),
            Self::Adr(v) => write!(f, "ADR: {}", on_off(*v)),
            Self::Public(v) => write!(f, "Public network: {}", on_off(*v)),
            Self::NetId(v) => write!(f, "NetID: {v}"),
            Self::TxPower(v) => write!(f, "TX power index: {v}"),
            Self::Rx2Freq(v) => write!(f, "RX2 freq: {v}"),
            Self::Rx2Dr(v) => write!(f, "RX2 dr: {v}"),
        }
    }
}

/// Every value the MAC keeps for the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MacSettings {
    /// Device EUI.
    pub dev_eui: DevEui,
    /// Application EUI.
    pub app_eui: AppEui,
    /// Application key.
    pub app_key: AesKey,
    /// Application session key.
    pub apps_key: AesKey,
    /// Network session key.
    pub nwks_key: AesKey,
    /// Device address.
    pub dev_addr: DevAddr,
    /// Device class.
    pub class: DeviceClass,
    /// Uplink data rate index.
    pub datarate: u8,
    /// Adaptive data rate.
    pub adr: bool,
    /// Public network.
    pub public_network: bool,
    /// Network identifier.
    pub net_id: u32,
    /// TX power index.
    pub tx_power: u8,
    /// RX2 frequency in Hz.
    pub rx2_freq: u32,
    /// RX2 data rate index.
    pub rx2_dr: u8,
    /// Mode of the next uplinks.
    pub tx_mode: TxMode,
    /// Port of the next uplinks.
    pub tx_port: FPort,
}

impl Default for MacSettings {
    fn default() -> Self {
        Self {
            dev_eui: DevEui::default(),
            app_eui: AppEui::default(),
            app_key: AesKey::default(),
            apps_key: AesKey::default(),
            nwks_key: AesKey::default(),
            dev_addr: DevAddr::default(),
            class: DeviceClass::A,
            datarate: 0,
            adr: false,
            public_network: true,
            net_id: 1,
            tx_power: 1,
            rx2_freq: 869_525_000,
            rx2_dr: 0,
            tx_mode: TxMode::Confirmed,
            tx_port: FPort::DEFAULT,
        }
    }
}

impl MacSettings {
    /// Read one parameter.
    #[must_use]
    pub fn get(&self, param: Param) -> ParamValue {
        match param {
            Param::DevEui => ParamValue::DevEui(self.dev_eui),
            Param::AppEui => ParamValue::AppEui(self.app_eui),
            Param::AppKey => ParamValue::AppKey(self.app_key),
            Param::AppSKey => ParamValue::AppSKey(self.apps_key),
            Param::NwkSKey => ParamValue::NwkSKey(self.nwks_key),
            Param::DevAddr => ParamValue::DevAddr(self.dev_addr),
            Param::Class => ParamValue::Class(self.class),
            Param::Dr => ParamValue::Dr(self.datarate),
            Param::Adr => ParamValue::Adr(self.adr),
            Param::Public => ParamValue::Public(self.public_network),
            Param::NetId => ParamValue::NetId(self.net_id),
            Param::TxPower => ParamValue::TxPower(self.tx_power),
            Param::Rx2Freq => ParamValue::Rx2Freq(self.rx2_freq),
            Param::Rx2Dr => ParamValue::Rx2Dr(self.rx2_dr),
        }
    }

    /// Write one parameter.
    pub fn apply(&mut self, value: ParamValue) {
        match value {
            ParamValue::DevEui(v) => self.dev_eui = v,
            ParamValue::AppEui(v) => self.app_eui = v,
            ParamValue::AppKey(v) => self.app_key = v,
            ParamValue::AppSKey(v) => self.apps_key = v,
            ParamValue::NwkSKey(v) => self.nwks_key = v,
            ParamValue::DevAddr(v) => self.dev_addr = v,
            ParamValue::Class(v) => self.class = v,
            ParamValue::Dr(v) => self.datarate = v,
            ParamValue::Adr(v) => self.adr = v,
            ParamValue::Public(v) => self.public_network = v,
            ParamValue::NetId(v) => self.net_id = v,
            ParamValue::TxPower(v) => self.tx_power = v,
            ParamValue::Rx2Freq(v) => self.rx2_freq = v,
            ParamValue::Rx2Dr(v) => self.rx2_dr = v,
        }
    }
}

/// Application data received in a downlink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Downlink {
    /// Port the network sent the data on.
    pub port: FPort,
    /// Raw payload.
    pub payload: Vec<u8>,
}

/// Network answer to a link check request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkCheck {
    /// Demodulation margin of the last uplink in dB.
    pub demod_margin: u8,
    /// Number of gateways that received the last uplink.
    pub nb_gateways: u8,
}

/// What the receive windows produced after an uplink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RxOutcome {
    /// A downlink carrying application data.
    Data(Downlink),
    /// The transmission completed without application data.
    TxDone,
}

/// The operations the application needs from a LoRaMAC stack.
///
/// Join and receive wait on protocol timers, so they are async. Everything
/// else is a direct accessor.
#[async_trait]
pub trait LoRaMac: Send {
    /// Read a parameter.
    fn get(&self, param: Param) -> ParamValue;

    /// Write a parameter.
    fn set(&mut self, value: ParamValue);

    /// Select confirmed or unconfirmed uplinks.
    fn set_tx_mode(&mut self, mode: TxMode);

    /// Select the application port for uplinks.
    fn set_tx_port(&mut self, port: FPort);

    /// Whether a network session exists.
    fn is_joined(&self) -> bool;

    /// Run the join procedure.
    ///
    /// # Errors
    ///
    /// Returns the MAC status when no session could be opened.
    async fn join(&mut self, mode: JoinMode) -> Result<(), MacError>;

    /// Transmit an uplink.
    ///
    /// # Errors
    ///
    /// Returns the MAC status when the uplink was not sent.
    async fn send(&mut self, payload: &[u8]) -> Result<(), MacError>;

    /// Wait for the receive windows of the last uplink.
    ///
    /// # Errors
    ///
    /// Returns the MAC status when reception failed.
    async fn recv(&mut self) -> Result<RxOutcome, MacError>;

    /// Piggyback a link check request on the next uplink.
    fn request_link_check(&mut self);

    /// The answer to the last link check request, if one arrived with the
    /// last uplink.
    fn link_check(&self) -> Option<LinkCheck>;

    /// Persist the current configuration and session.
    ///
    /// # Errors
    ///
    /// Returns [`MacError::Nvm`] if the configuration could not be written.
    #[cfg(feature = "eeprom")]
    fn save_config(&mut self) -> Result<(), MacError>;

    /// Erase the persisted configuration.
    ///
    /// # Errors
    ///
    /// Returns [`MacError::Nvm`] if the configuration could not be erased.
    #[cfg(feature = "eeprom")]
    fn erase_config(&mut self) -> Result<(), MacError>;
}
