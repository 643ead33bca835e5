//! Host-side LoRaMAC stack.
//!
//! `SimulatedMac` stands in for the radio and the network server: it keeps the
//! MAC settings, opens sessions, counts uplinks, waits out the receive windows
//! and answers with scripted downlinks and link check results. Regional
//! constants follow EU868.

use std::collections::VecDeque;

use async_trait::async_trait;
use rand::Rng;
use tracing::{debug, info, warn};

use super::{
    Downlink, FPort, JoinMode, LinkCheck, LoRaMac, MacError, MacSettings, Param, ParamValue,
    RxOutcome, TxMode,
};
use crate::config::SimulatorConfig;
use crate::keys::HexBytes;

#[cfg(feature = "eeprom")]
use crate::storage::{Nvm, NvmState};

/// EU868 maximum application payload per data rate, DR0 to DR7.
const EU868_MAX_PAYLOAD: [usize; 8] = [51, 51, 51, 115, 242, 242, 242, 242];

/// Largest application payload allowed at `datarate`, `None` for data rates
/// the region does not define.
#[must_use]
pub fn max_payload_len(datarate: u8) -> Option<usize> {
    EU868_MAX_PAYLOAD.get(usize::from(datarate)).copied()
}

fn random_bytes<const N: usize>() -> HexBytes<N> {
    let mut bytes = [0u8; N];
    rand::rng().fill(&mut bytes[..]);
    HexBytes::new(bytes)
}

/// An in-process LoRaMAC stack.
#[derive(Debug)]
pub struct SimulatedMac {
    settings: MacSettings,
    network: SimulatorConfig,
    joined: bool,
    uplink_counter: u32,
    awaiting_rx: bool,
    link_check_requested: bool,
    link_check: Option<LinkCheck>,
    downlinks: VecDeque<Downlink>,
    last_uplink: Option<Vec<u8>>,
    #[cfg(feature = "eeprom")]
    nvm: Option<Nvm>,
}

impl SimulatedMac {
    /// Create a stack with default settings talking to the configured network.
    ///
    /// Scripted downlinks with an invalid port are skipped.
    #[must_use]
    pub fn new(network: SimulatorConfig) -> Self {
        let downlinks = network
            .downlinks
            .iter()
            .filter_map(|d| {
                FPort::new(d.port).map(|port| Downlink {
                    port,
                    payload: d.payload.clone().into_bytes(),
                })
            })
            .collect();

        Self {
            settings: MacSettings::default(),
            network,
            joined: false,
            uplink_counter: 0,
            awaiting_rx: false,
            link_check_requested: false,
            link_check: None,
            downlinks,
            last_uplink: None,
            #[cfg(feature = "eeprom")]
            nvm: None,
        }
    }

    /// Attach an NVM store and restore any state saved in it.
    ///
    /// # Errors
    ///
    /// Returns an error if the saved state cannot be read.
    #[cfg(feature = "eeprom")]
    pub fn with_nvm(mut self, nvm: Nvm) -> crate::Result<Self> {
        if let Some(state) = nvm.load()? {
            info!(
                joined = state.joined,
                uplink_counter = state.uplink_counter,
                "Restored MAC state saved at {}",
                state.saved_at
            );
            self.settings = state.settings;
            self.joined = state.joined;
            self.uplink_counter = state.uplink_counter;
        }
        self.nvm = Some(nvm);
        Ok(self)
    }

    /// Queue a downlink for the receive windows of a later uplink.
    pub fn queue_downlink(&mut self, downlink: Downlink) {
        self.downlinks.push_back(downlink);
    }

    /// Number of uplinks sent in the current session.
    #[must_use]
    pub fn uplink_counter(&self) -> u32 {
        self.uplink_counter
    }

    /// Payload of the most recent uplink.
    #[must_use]
    pub fn last_uplink(&self) -> Option<&[u8]> {
        self.last_uplink.as_deref()
    }

    /// Current settings.
    #[must_use]
    pub fn settings(&self) -> &MacSettings {
        &self.settings
    }

    #[cfg(feature = "eeprom")]
    fn nvm(&self) -> Result<&Nvm, MacError> {
        self.nvm
            .as_ref()
            .ok_or_else(|| MacError::Nvm("no NVM attached".to_string()))
    }
}

#[async_trait]
impl LoRaMac for SimulatedMac {
    fn get(&self, param: Param) -> ParamValue {
        self.settings.get(param)
    }

    fn set(&mut self, value: ParamValue) {
        debug!(param = value.param().name(), "MAC parameter updated");
        self.settings.apply(value);
    }

    fn set_tx_mode(&mut self, mode: TxMode) {
        self.settings.tx_mode = mode;
    }

    fn set_tx_port(&mut self, port: FPort) {
        self.settings.tx_port = port;
    }

    fn is_joined(&self) -> bool {
        self.joined
    }

    async fn join(&mut self, mode: JoinMode) -> Result<(), MacError> {
        if self.joined {
            return Err(MacError::AlreadyJoined);
        }
        if self.awaiting_rx {
            return Err(MacError::Busy);
        }

        match mode {
            JoinMode::Otaa => {
                debug!(
                    dev_eui = %self.settings.dev_eui,
                    app_eui = %self.settings.app_eui,
                    "Sending join request"
                );
                tokio::time::sleep(self.network.join_delay()).await;
                if !self.network.accept_join {
                    warn!("No join accept received");
                    return Err(MacError::JoinFailed);
                }
                self.settings.dev_addr = random_bytes();
                self.settings.apps_key = random_bytes();
                self.settings.nwks_key = random_bytes();
            }
            JoinMode::Abp => {
                debug!(dev_addr = %self.settings.dev_addr, "Activating by personalization");
            }
        }

        self.joined = true;
        self.uplink_counter = 0;
        info!(mode = %mode, dev_addr = %self.settings.dev_addr, "Network session opened");
        Ok(())
    }

    async fn send(&mut self, payload: &[u8]) -> Result<(), MacError> {
        if !self.joined {
            return Err(MacError::NotJoined);
        }
        if self.awaiting_rx {
            return Err(MacError::Busy);
        }

        let datarate = self.settings.datarate;
        let Some(max_len) = max_payload_len(datarate) else {
            warn!(datarate, "Data rate not defined for EU868");
            return Err(MacError::TxError);
        };
        if payload.len() > max_len {
            warn!(
                datarate,
                len = payload.len(),
                max_len,
                "Payload too large for data rate"
            );
            return Err(MacError::TxError);
        }

        self.link_check = None;
        self.uplink_counter = self.uplink_counter.wrapping_add(1);
        self.last_uplink = Some(payload.to_vec());
        self.awaiting_rx = true;
        debug!(
            fcnt = self.uplink_counter,
            port = %self.settings.tx_port,
            confirmed = self.settings.tx_mode == TxMode::Confirmed,
            len = payload.len(),
            "Uplink sent"
        );
        Ok(())
    }

    async fn recv(&mut self) -> Result<RxOutcome, MacError> {
        if !self.awaiting_rx {
            return Ok(RxOutcome::TxDone);
        }

        tokio::time::sleep(self.network.rx_delay()).await;
        self.awaiting_rx = false;

        if std::mem::take(&mut self.link_check_requested) {
            self.link_check = Some(LinkCheck {
                demod_margin: self.network.demod_margin,
                nb_gateways: self.network.nb_gateways,
            });
        }

        match self.downlinks.pop_front() {
            Some(downlink) => {
                debug!(port = %downlink.port, len = downlink.payload.len(), "Downlink received");
                Ok(RxOutcome::Data(downlink))
            }
            None => Ok(RxOutcome::TxDone),
        }
    }

    fn request_link_check(&mut self) {
        self.link_check_requested = true;
    }

    fn link_check(&self) -> Option<LinkCheck> {
        self.link_check
    }

    #[cfg(feature = "eeprom")]
    fn save_config(&mut self) -> Result<(), MacError> {
        let state = NvmState {
            settings: self.settings.clone(),
            joined: self.joined,
            uplink_counter: self.uplink_counter,
            saved_at: chrono::Utc::now(),
        };
        self.nvm()?
            .save(&state)
            .map_err(|e| MacError::Nvm(e.to_string()))?;
        info!("MAC configuration saved");
        Ok(())
    }

    #[cfg(feature = "eeprom")]
    fn erase_config(&mut self) -> Result<(), MacError> {
        let erased = self
            .nvm()?
            .erase()
            .map_err(|e| MacError::Nvm(e.to_string()))?;
        info!(erased, "MAC configuration erased");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DownlinkConfig;

    fn instant_network() -> SimulatorConfig {
        SimulatorConfig {
            join_delay_ms: 0,
            rx_delay_ms: 0,
            ..SimulatorConfig::default()
        }
    }

    async fn joined_mac() -> SimulatedMac {
        let mut mac = SimulatedMac::new(instant_network());
        mac.set(ParamValue::Dr(5));
        mac.join(JoinMode::Otaa).await.unwrap();
        mac
    }

    #[test]
    fn test_max_payload_len() {
        assert_eq!(max_payload_len(0), Some(51));
        assert_eq!(max_payload_len(3), Some(115));
        assert_eq!(max_payload_len(5), Some(242));
        assert_eq!(max_payload_len(8), None);
    }

    #[tokio::test]
    async fn test_otaa_join_opens_session() {
        let mut mac = SimulatedMac::new(instant_network());
        assert!(!mac.is_joined());

        mac.join(JoinMode::Otaa).await.unwrap();

        assert!(mac.is_joined());
        assert!(!mac.settings().dev_addr.is_zero());
        assert!(!mac.settings().nwks_key.is_zero());
    }

    #[tokio::test]
    async fn test_join_twice_is_already_joined() {
        let mut mac = joined_mac().await;
        assert_eq!(
            mac.join(JoinMode::Otaa).await,
            Err(MacError::AlreadyJoined)
        );
        assert_eq!(mac.join(JoinMode::Abp).await, Err(MacError::AlreadyJoined));
    }

    #[tokio::test]
    async fn test_rejected_join() {
        let mut mac = SimulatedMac::new(SimulatorConfig {
            accept_join: false,
            ..instant_network()
        });
        assert_eq!(mac.join(JoinMode::Otaa).await, Err(MacError::JoinFailed));
        assert!(!mac.is_joined());
    }

    #[tokio::test]
    async fn test_abp_keeps_configured_address() {
        let mut mac = SimulatedMac::new(SimulatorConfig {
            accept_join: false,
            ..instant_network()
        });
        let addr = "26011BDA".parse().unwrap();
        mac.set(ParamValue::DevAddr(addr));

        mac.join(JoinMode::Abp).await.unwrap();

        assert!(mac.is_joined());
        assert_eq!(mac.get(Param::DevAddr), ParamValue::DevAddr(addr));
    }

    #[tokio::test]
    async fn test_send_requires_session() {
        let mut mac = SimulatedMac::new(instant_network());
        assert_eq!(mac.send(b"hello").await, Err(MacError::NotJoined));
    }

    #[tokio::test]
    async fn test_send_then_recv() {
        let mut mac = joined_mac().await;

        mac.send(b"hello").await.unwrap();
        assert_eq!(mac.uplink_counter(), 1);
        assert_eq!(mac.last_uplink(), Some(&b"hello"[..]));

        assert_eq!(mac.recv().await, Ok(RxOutcome::TxDone));
    }

    #[tokio::test]
    async fn test_send_while_awaiting_rx_is_busy() {
        let mut mac = joined_mac().await;
        mac.send(b"one").await.unwrap();
        assert_eq!(mac.send(b"two").await, Err(MacError::Busy));

        mac.recv().await.unwrap();
        assert!(mac.send(b"two").await.is_ok());
    }

    #[tokio::test]
    async fn test_payload_limit_follows_datarate() {
        let mut mac = joined_mac().await;
        let payload = vec![b'x'; 100];

        mac.set(ParamValue::Dr(0));
        assert_eq!(mac.send(&payload).await, Err(MacError::TxError));

        mac.set(ParamValue::Dr(3));
        assert!(mac.send(&payload).await.is_ok());
    }

    #[tokio::test]
    async fn test_undefined_datarate_is_tx_error() {
        let mut mac = joined_mac().await;
        mac.set(ParamValue::Dr(12));
        assert_eq!(mac.send(b"x").await, Err(MacError::TxError));
    }

    #[tokio::test]
    async fn test_scripted_downlinks_in_order() {
        let network = SimulatorConfig {
            downlinks: vec![
                DownlinkConfig {
                    port: 10,
                    payload: "first".to_string(),
                },
                DownlinkConfig {
                    port: 0,
                    payload: "skipped".to_string(),
                },
            ],
            ..instant_network()
        };
        let mut mac = SimulatedMac::new(network);
        mac.join(JoinMode::Otaa).await.unwrap();
        mac.queue_downlink(Downlink {
            port: FPort::new(3).unwrap(),
            payload: b"second".to_vec(),
        });

        mac.send(b"a").await.unwrap();
        let RxOutcome::Data(first) = mac.recv().await.unwrap() else {
            panic!("expected downlink");
        };
        assert_eq!(first.port.get(), 10);
        assert_eq!(first.payload, b"first");

        mac.send(b"b").await.unwrap();
        let RxOutcome::Data(second) = mac.recv().await.unwrap() else {
            panic!("expected downlink");
        };
        assert_eq!(second.payload, b"second");

        mac.send(b"c").await.unwrap();
        assert_eq!(mac.recv().await, Ok(RxOutcome::TxDone));
    }

    #[tokio::test]
    async fn test_link_check_answer_follows_next_uplink() {
        let mut mac = joined_mac().await;
        mac.request_link_check();
        assert!(mac.link_check().is_none());

        mac.send(b"a").await.unwrap();
        mac.recv().await.unwrap();
        assert_eq!(
            mac.link_check(),
            Some(LinkCheck {
                demod_margin: 20,
                nb_gateways: 1
            })
        );

        // The answer only belongs to the uplink that carried the request.
        mac.send(b"b").await.unwrap();
        mac.recv().await.unwrap();
        assert!(mac.link_check().is_none());
    }

    #[tokio::test]
    async fn test_recv_without_uplink() {
        let mut mac = joined_mac().await;
        assert_eq!(mac.recv().await, Ok(RxOutcome::TxDone));
    }

    #[tokio::test]
    async fn test_tx_options_are_stored() {
        let mut mac = joined_mac().await;
        mac.set_tx_mode(TxMode::Unconfirmed);
        mac.set_tx_port(FPort::new(42).unwrap());

        assert_eq!(mac.settings().tx_mode, TxMode::Unconfirmed);
        assert_eq!(mac.settings().tx_port.get(), 42);
    }

    #[cfg(feature = "eeprom")]
    #[tokio::test]
    async fn test_save_without_nvm_fails() {
        let mut mac = SimulatedMac::new(instant_network());
        assert!(matches!(mac.save_config(), Err(MacError::Nvm(_))));
        assert!(matches!(mac.erase_config(), Err(MacError::Nvm(_))));
    }

    #[cfg(feature = "eeprom")]
    #[tokio::test]
    async fn test_save_and_restore_session() {
        let nvm = Nvm::open_in_memory().unwrap();
        let mut mac = SimulatedMac::new(instant_network()).with_nvm(nvm).unwrap();
        mac.set(ParamValue::Dr(5));
        mac.join(JoinMode::Otaa).await.unwrap();
        mac.send(b"a").await.unwrap();
        mac.recv().await.unwrap();
        mac.save_config().unwrap();

        let dev_addr = mac.get(Param::DevAddr);
        let nvm = mac.nvm.take().unwrap();
        let restored = SimulatedMac::new(instant_network()).with_nvm(nvm).unwrap();

        assert!(restored.is_joined());
        assert_eq!(restored.uplink_counter(), 1);
        assert_eq!(restored.get(Param::DevAddr), dev_addr);
        assert_eq!(restored.get(Param::Dr), ParamValue::Dr(5));
    }

    #[cfg(feature = "eeprom")]
    #[tokio::test]
    async fn test_erase_forgets_saved_state() {
        let nvm = Nvm::open_in_memory().unwrap();
        let mut mac = SimulatedMac::new(instant_network()).with_nvm(nvm).unwrap();
        mac.join(JoinMode::Abp).await.unwrap();
        mac.save_config().unwrap();
        mac.erase_config().unwrap();

        // Erasing leaves the running session alone.
        assert!(mac.is_joined());

        let nvm = mac.nvm.take().unwrap();
        let restored = SimulatedMac::new(instant_network()).with_nvm(nvm).unwrap();
        assert!(!restored.is_joined());
    }
}
