//! Configuration management for weathernode.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::keys::{AesKey, AppEui, DevAddr, DevEui};
use crate::mac::{FPort, JoinMode, MAX_DATARATE};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "weathernode";

/// Default NVM database file name.
const NVM_FILE_NAME: &str = "nvm.db";

/// Demo device credentials registered with the network server.
const DEMO_DEV_EUI: [u8; 8] = [0x00, 0xB8, 0x3D, 0x0E, 0x2F, 0xAC, 0x99, 0x80];
const DEMO_APP_EUI: [u8; 8] = [0x70, 0xB3, 0xD5, 0x7E, 0xD0, 0x02, 0xD4, 0xAC];
const DEMO_APP_KEY: [u8; 16] = [
    0xF9, 0x98, 0x12, 0xF7, 0x1B, 0x08, 0x92, 0xBB, 0xCD, 0xAB, 0xD5, 0xD5, 0x77, 0xAD, 0x63, 0x14,
];

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `WEATHERNODE_`, nested keys
///    separated by `__`)
/// 2. TOML config file at `~/.config/weathernode/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Device identity and boot-time MAC setup.
    pub device: DeviceConfig,
    /// Synthetic weather loop.
    pub weather: WeatherConfig,
    /// Behaviour of the simulated network.
    pub simulator: SimulatorConfig,
    /// NVM storage.
    pub storage: StorageConfig,
}

/// Device identity and boot-time MAC setup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Device EUI.
    pub dev_eui: DevEui,
    /// Application EUI.
    pub app_eui: AppEui,
    /// Application key used by OTAA.
    pub app_key: AesKey,
    /// Device address for ABP.
    pub dev_addr: Option<DevAddr>,
    /// Application session key for ABP.
    pub apps_key: Option<AesKey>,
    /// Network session key for ABP.
    pub nwks_key: Option<AesKey>,
    /// Data rate applied at boot.
    pub datarate: u8,
    /// Join procedure used at boot.
    pub join_mode: JoinMode,
    /// Join at boot before starting the shell.
    pub join_on_start: bool,
}

/// Synthetic weather loop configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    /// Device id written into every payload.
    pub device_id: u32,
    /// Seconds between two uplinks.
    pub interval_secs: u64,
    /// Stop after this many uplinks. 0 runs until interrupted.
    pub max_iterations: u64,
    /// Seed for reproducible readings. Unset draws from the OS.
    pub seed: Option<u64>,
}

/// Simulated network configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Delay before the join accept arrives, in milliseconds.
    pub join_delay_ms: u64,
    /// Delay before the receive windows close, in milliseconds.
    pub rx_delay_ms: u64,
    /// Whether the network accepts OTAA join requests.
    pub accept_join: bool,
    /// Demodulation margin reported by link checks.
    pub demod_margin: u8,
    /// Gateway count reported by link checks.
    pub nb_gateways: u8,
    /// Downlinks the network answers with, in order.
    pub downlinks: Vec<DownlinkConfig>,
}

/// A scripted downlink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownlinkConfig {
    /// Application port.
    pub port: u8,
    /// Payload text.
    pub payload: String,
}

/// NVM storage configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the NVM database.
    /// Defaults to `~/.local/share/weathernode/nvm.db`
    pub nvm_path: Option<PathBuf>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            dev_eui: DevEui::new(DEMO_DEV_EUI),
            app_eui: AppEui::new(DEMO_APP_EUI),
            app_key: AesKey::new(DEMO_APP_KEY),
            dev_addr: None,
            apps_key: None,
            nwks_key: None,
            datarate: 5,
            join_mode: JoinMode::Otaa,
            join_on_start: true,
        }
    }
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            device_id: 1,
            interval_secs: 5,
            max_iterations: 0,
            seed: None,
        }
    }
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            join_delay_ms: 5_000,
            rx_delay_ms: 1_000,
            accept_join: true,
            demod_margin: 20,
            nb_gateways: 1,
            downlinks: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed("WEATHERNODE_").split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.device.datarate > MAX_DATARATE {
            return Err(Error::config_validation(format!(
                "device.datarate ({}) must be at most {MAX_DATARATE}",
                self.device.datarate
            )));
        }

        if self.weather.interval_secs == 0 {
            return Err(Error::config_validation(
                "weather.interval_secs must be greater than 0",
            ));
        }

        for downlink in &self.simulator.downlinks {
            if FPort::new(downlink.port).is_none() {
                return Err(Error::config_validation(format!(
                    "simulator.downlinks port {} must be between 1 and {}",
                    downlink.port,
                    FPort::MAX
                )));
            }
        }

        Ok(())
    }

    /// Get the NVM path, resolving defaults if not set.
    #[must_use]
    pub fn nvm_path(&self) -> PathBuf {
        self.storage
            .nvm_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(NVM_FILE_NAME))
    }
}

impl WeatherConfig {
    /// Pause between two uplinks of the loop.
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Iteration limit, `None` when unbounded.
    #[must_use]
    pub fn iteration_limit(&self) -> Option<u64> {
        (self.max_iterations > 0).then_some(self.max_iterations)
    }
}

impl SimulatorConfig {
    /// Join accept delay as a Duration.
    #[must_use]
    pub fn join_delay(&self) -> Duration {
        Duration::from_millis(self.join_delay_ms)
    }

    /// Receive window delay as a Duration.
    #[must_use]
    pub fn rx_delay(&self) -> Duration {
        Duration::from_millis(self.rx_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.device.dev_eui.to_string(), "00B83D0E2FAC9980");
        assert_eq!(config.device.app_eui.to_string(), "70B3D57ED002D4AC");
        assert_eq!(
            config.device.app_key.to_string(),
            "F99812F71B0892BBCDABD5D577AD6314"
        );
        assert_eq!(config.device.datarate, 5);
        assert_eq!(config.device.join_mode, JoinMode::Otaa);
        assert!(config.device.join_on_start);
    }

    #[test]
    fn test_default_weather_config() {
        let weather = WeatherConfig::default();

        assert_eq!(weather.device_id, 1);
        assert_eq!(weather.interval(), Duration::from_secs(5));
        assert_eq!(weather.iteration_limit(), None);
        assert!(weather.seed.is_none());
    }

    #[test]
    fn test_iteration_limit() {
        let weather = WeatherConfig {
            max_iterations: 3,
            ..WeatherConfig::default()
        };
        assert_eq!(weather.iteration_limit(), Some(3));
    }

    #[test]
    fn test_default_simulator_config() {
        let simulator = SimulatorConfig::default();

        assert_eq!(simulator.join_delay(), Duration::from_secs(5));
        assert_eq!(simulator.rx_delay(), Duration::from_secs(1));
        assert!(simulator.accept_join);
        assert!(simulator.downlinks.is_empty());
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_datarate() {
        let mut config = Config::default();
        config.device.datarate = 16;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("device.datarate"));
    }

    #[test]
    fn test_validate_zero_interval() {
        let mut config = Config::default();
        config.weather.interval_secs = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("interval_secs"));
    }

    #[test]
    fn test_validate_downlink_port() {
        let mut config = Config::default();
        config.simulator.downlinks.push(DownlinkConfig {
            port: 0,
            payload: "x".to_string(),
        });

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("simulator.downlinks"));
    }

    #[test]
    fn test_nvm_path_default() {
        let config = Config::default();
        assert!(config.nvm_path().to_string_lossy().contains("nvm.db"));
    }

    #[test]
    fn test_nvm_path_custom() {
        let mut config = Config::default();
        config.storage.nvm_path = Some(PathBuf::from("/custom/nvm.db"));
        assert_eq!(config.nvm_path(), PathBuf::from("/custom/nvm.db"));
    }

    #[test]
    fn test_default_config_path() {
        let path = Config::default_config_path();
        assert!(path.to_string_lossy().contains("weathernode"));
        assert!(path.to_string_lossy().contains("config.toml"));
    }

    #[test]
    fn test_load_nonexistent_config() {
        let result = Config::load_from(Some(PathBuf::from("/nonexistent/config.toml")));
        assert!(result.is_ok());
    }

    #[test]
    fn test_load_from_toml() {
        let dir = std::env::temp_dir().join(format!("weathernode-cfg-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(
            &path,
            r#"
[device]
dev_eui = "0102030405060708"
datarate = 3
join_mode = "abp"
dev_addr = "26011BDA"

[weather]
interval_secs = 30

[[simulator.downlinks]]
port = 10
payload = "hello"
"#,
        )
        .unwrap();

        let config = Config::load_from(Some(path)).unwrap();
        let _ = std::fs::remove_dir_all(&dir);

        assert_eq!(config.device.dev_eui.to_string(), "0102030405060708");
        assert_eq!(config.device.datarate, 3);
        assert_eq!(config.device.join_mode, JoinMode::Abp);
        assert_eq!(
            config.device.dev_addr.map(|a| a.to_string()),
            Some("26011BDA".to_string())
        );
        assert_eq!(config.weather.interval_secs, 30);
        assert_eq!(config.simulator.downlinks.len(), 1);
        // Untouched values keep their defaults.
        assert_eq!(config.device.app_eui.to_string(), "70B3D57ED002D4AC");
    }

    #[test]
    fn test_load_rejects_bad_key() {
        let dir = std::env::temp_dir().join(format!("weathernode-badkey-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "[device]\napp_key = \"F998\"\n").unwrap();

        let result = Config::load_from(Some(path));
        let _ = std::fs::remove_dir_all(&dir);

        assert!(matches!(result, Err(Error::ConfigLoad(_))));
    }

    #[test]
    fn test_config_serialize() {
        let json = serde_json::to_string(&Config::default()).unwrap();
        assert!(json.contains("\"dev_eui\":\"00B83D0E2FAC9980\""));
        assert!(json.contains("\"join_mode\":\"otaa\""));
    }
}
