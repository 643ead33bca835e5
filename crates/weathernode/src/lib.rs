//! `weathernode` - a LoRaWAN weather-station end-device
//!
//! This library provides the device shell (`loramac get|set|join|tx|loop|...`),
//! the bounded random-walk weather generator behind `loramac loop`, and a
//! host-side LoRaMAC stack to run them against.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod app;
pub mod cli;
pub mod config;
pub mod error;
pub mod keys;
pub mod logging;
pub mod mac;
pub mod shell;
#[cfg(feature = "eeprom")]
pub mod storage;
pub mod weather;

pub use config::Config;
pub use error::{Error, Result};
pub use logging::init_logging;
pub use mac::{LoRaMac, MacError, SimulatedMac};
pub use shell::{Interrupt, Shell};
pub use weather::{WeatherReading, WeatherStation};
