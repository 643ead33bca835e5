//! Device startup.
//!
//! Mirrors the firmware boot sequence: bring up the MAC stack, load the
//! device identity into it, join, then hand over to the shell.

use std::io::Write;

use tracing::{debug, info};

use crate::config::{Config, DeviceConfig};
use crate::error::Result;
use crate::mac::{LoRaMac, MacError, ParamValue, SimulatedMac};
use crate::shell::{Interrupt, Shell};

#[cfg(feature = "eeprom")]
use crate::storage::Nvm;

/// Build the MAC stack described by `config`.
///
/// With NVM support, the stack restores whatever `loramac save` stored.
///
/// # Errors
///
/// Returns an error if the NVM store cannot be opened or read.
pub fn build_mac(config: &Config) -> Result<SimulatedMac> {
    let mac = SimulatedMac::new(config.simulator.clone());

    #[cfg(feature = "eeprom")]
    let mac = mac.with_nvm(Nvm::open(config.nvm_path())?)?;

    Ok(mac)
}

/// Load the configured data rate and credentials into the stack.
pub fn apply_device_config<M: LoRaMac + ?Sized>(mac: &mut M, device: &DeviceConfig) {
    mac.set(ParamValue::Dr(device.datarate));
    mac.set(ParamValue::DevEui(device.dev_eui));
    mac.set(ParamValue::AppEui(device.app_eui));
    mac.set(ParamValue::AppKey(device.app_key));

    if let Some(dev_addr) = device.dev_addr {
        mac.set(ParamValue::DevAddr(dev_addr));
    }
    if let Some(apps_key) = device.apps_key {
        mac.set(ParamValue::AppSKey(apps_key));
    }
    if let Some(nwks_key) = device.nwks_key {
        mac.set(ParamValue::NwkSKey(nwks_key));
    }

    debug!(
        dev_eui = %device.dev_eui,
        datarate = device.datarate,
        "Device configuration applied"
    );
}

/// Configure the stack and, if `join` is set, join the network.
///
/// A session restored from NVM counts as joined.
///
/// # Errors
///
/// Returns [`crate::Error::Mac`] if the join fails, after printing
/// `Join procedure failed`.
pub async fn boot<M, W>(
    mac: &mut M,
    device: &DeviceConfig,
    join: bool,
    out: &mut W,
) -> Result<()>
where
    M: LoRaMac + ?Sized,
    W: Write,
{
    apply_device_config(mac, device);

    if !join {
        info!("Join skipped");
        return Ok(());
    }

    match mac.join(device.join_mode).await {
        Ok(()) => writeln!(out, "Join procedure succeeded")?,
        Err(MacError::AlreadyJoined) => {
            info!("Using restored network session");
            writeln!(out, "Join procedure succeeded")?;
        }
        Err(e) => {
            writeln!(out, "Join procedure failed")?;
            return Err(e.into());
        }
    }

    Ok(())
}

/// Boot the device and return a shell ready to run.
///
/// # Errors
///
/// Returns an error if the stack cannot be built or the join fails.
pub async fn start<W: Write>(
    config: &Config,
    join: bool,
    interrupt: Interrupt,
    out: &mut W,
) -> Result<Shell<SimulatedMac>> {
    let mut mac = build_mac(config)?;
    boot(&mut mac, &config.device, join && config.device.join_on_start, out).await?;
    Ok(Shell::new(mac, config.weather.clone(), interrupt))
}
