//! The `loramac` shell command.
//!
//! Parsing turns an argument vector into a [`LoramacCommand`]; execution
//! drives the MAC stack and prints the outcome. Every failure is reported as a
//! [`CommandError`] whose `Display` is the exact line shown to the user.

use std::io::Write;

use rand::rngs::StdRng;
use rand::SeedableRng;
use thiserror::Error;
use tracing::{debug, info};

use super::Interrupt;
use crate::config::WeatherConfig;
use crate::keys::HexBytes;
use crate::mac::{
    DeviceClass, FPort, JoinMode, LoRaMac, MacError, Param, ParamValue, RxOutcome, TxMode,
    MAX_DATARATE, MAX_TX_POWER,
};
use crate::weather::WeatherStation;

/// Top-level usage.
#[cfg(feature = "eeprom")]
pub const USAGE: &str = "Usage: loramac <get|set|join|tx|link_check|save|erase>";

/// Top-level usage.
#[cfg(not(feature = "eeprom"))]
pub const USAGE: &str = "Usage: loramac <get|set|join|tx|link_check>";

/// Usage of `loramac join`.
pub const JOIN_USAGE: &str = "Usage: loramac join <otaa|abp>";

/// Usage of `loramac tx`.
pub const TX_USAGE: &str = "Usage: loramac tx <payload> [<cnf|uncnf>] [port]";

/// Usage of `loramac loop`.
pub const LOOP_USAGE: &str = "Usage: loramac loop [<cnf|uncnf>] [port]";

/// Usage of `loramac set`.
pub const SET_USAGE: &str = "Usage: loramac set <deveui|appeui|appkey|appskey|nwkskey|devaddr|class|dr|adr|public|netid|tx_power|rx2_freq|rx2_dr> <value>";

/// Usage of `loramac get`.
pub const GET_USAGE: &str = "Usage: loramac get <deveui|appeui|appkey|appskey|nwkskey|devaddr|class|dr|adr|public|netid|tx_power|rx2_freq|rx2_dr>";

/// Usage of `loramac set <param>` for one parameter.
#[must_use]
pub fn set_usage(param: Param) -> &'static str {
    match param {
        Param::DevEui => "Usage: loramac set deveui <16 hex chars>",
        Param::AppEui => "Usage: loramac set appeui <16 hex chars>",
        Param::AppKey => "Usage: loramac set appkey <32 hex chars>",
        Param::AppSKey => "Usage: loramac set appskey <32 hex chars>",
        Param::NwkSKey => "Usage: loramac set nwkskey <32 hex chars>",
        Param::DevAddr => "Usage: loramac set devaddr <8 hex chars>",
        Param::Class => "Usage: loramac set class <A,B,C>",
        Param::Dr => "Usage: loramac set dr <0..16>",
        Param::Adr => "Usage: loramac set adr <on|off>",
        Param::Public => "Usage: loramac set public <on|off>",
        Param::NetId => "Usage: loramac set netid <integer value>",
        Param::TxPower => "Usage: loramac set tx_power <0..16>",
        Param::Rx2Freq => "Usage: loramac set rx2_freq <frequency>",
        Param::Rx2Dr => "Usage: loramac set rx2_dr <0..16>",
    }
}

/// Uplink mode and port of `tx` and `loop`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TxOptions {
    /// Confirmed or unconfirmed.
    pub mode: TxMode,
    /// Application port.
    pub port: FPort,
}

/// A parsed `loramac` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoramacCommand {
    /// Print one parameter.
    Get(Param),
    /// Write one parameter.
    Set(ParamValue),
    /// Run the join procedure.
    Join(JoinMode),
    /// Send one uplink and wait for its receive windows.
    Tx {
        /// Text sent as the payload.
        payload: String,
        /// Mode and port.
        options: TxOptions,
    },
    /// Send synthetic weather readings until interrupted.
    Loop {
        /// Mode and port.
        options: TxOptions,
    },
    /// Piggyback a link check request on the next uplink.
    LinkCheck,
    /// Persist the MAC configuration.
    #[cfg(feature = "eeprom")]
    Save,
    /// Erase the persisted MAC configuration.
    #[cfg(feature = "eeprom")]
    Erase,
}

/// Why a `loramac` command did not complete.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Malformed arguments.
    #[error("{0}")]
    Usage(&'static str),

    /// Port argument outside 1..=223.
    #[error("error: invalid port given '{0}', port can only be between 1 and 223")]
    InvalidPort(String),

    /// The stack refused or failed the join.
    #[error("{}", join_failure(.0))]
    Join(MacError),

    /// The stack refused or failed the uplink.
    #[error("{}", send_failure(.0))]
    Send(MacError),

    /// Persisting the configuration failed.
    #[cfg(feature = "eeprom")]
    #[error("Cannot save configuration: {0}")]
    Save(MacError),

    /// Erasing the configuration failed.
    #[cfg(feature = "eeprom")]
    #[error("Cannot erase configuration: {0}")]
    Erase(MacError),

    /// Writing to the terminal failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Any other failure.
    #[error(transparent)]
    Other(#[from] crate::Error),
}

fn join_failure(err: &MacError) -> String {
    match err {
        MacError::DutycycleRestricted => "Cannot join: dutycycle restriction".to_string(),
        MacError::Busy => "Cannot join: mac is busy".to_string(),
        MacError::JoinFailed => "Join procedure failed!".to_string(),
        MacError::AlreadyJoined => "Warning: already joined!".to_string(),
        other => format!("Cannot join: {other}"),
    }
}

fn send_failure(err: &MacError) -> String {
    match err {
        MacError::NotJoined => "Cannot send: not joined".to_string(),
        MacError::DutycycleRestricted => "Cannot send: dutycycle restriction".to_string(),
        MacError::Busy => "Cannot send: MAC is busy".to_string(),
        MacError::TxError => "Cannot send: error".to_string(),
        other => format!("Cannot send: {other}"),
    }
}

/// Parse a full argument vector, `loramac` included.
///
/// # Errors
///
/// Returns [`CommandError::Usage`] with the matching usage text, or
/// [`CommandError::InvalidPort`] for a bad port argument.
pub fn parse<S: AsRef<str>>(argv: &[S]) -> Result<LoramacCommand, CommandError> {
    let args: Vec<&str> = argv.iter().map(AsRef::as_ref).collect();

    match args.as_slice() {
        [_, "get"] => Err(CommandError::Usage(GET_USAGE)),
        [_, "get", name, ..] => Param::from_name(name)
            .map(LoramacCommand::Get)
            .ok_or(CommandError::Usage(GET_USAGE)),
        [_, "set"] => Err(CommandError::Usage(SET_USAGE)),
        [_, "set", name, rest @ ..] => {
            let param = Param::from_name(name).ok_or(CommandError::Usage(SET_USAGE))?;
            let value = rest
                .first()
                .and_then(|value| parse_value(param, value))
                .ok_or(CommandError::Usage(set_usage(param)))?;
            Ok(LoramacCommand::Set(value))
        }
        [_, "join", "otaa", ..] => Ok(LoramacCommand::Join(JoinMode::Otaa)),
        [_, "join", "abp", ..] => Ok(LoramacCommand::Join(JoinMode::Abp)),
        [_, "join", ..] => Err(CommandError::Usage(JOIN_USAGE)),
        [_, "tx"] => Err(CommandError::Usage(TX_USAGE)),
        [_, "tx", payload, rest @ ..] => Ok(LoramacCommand::Tx {
            payload: (*payload).to_string(),
            options: parse_tx_options(rest, TX_USAGE)?,
        }),
        [_, "loop", rest @ ..] => Ok(LoramacCommand::Loop {
            options: parse_tx_options(rest, LOOP_USAGE)?,
        }),
        [_, "link_check"] => Ok(LoramacCommand::LinkCheck),
        #[cfg(feature = "eeprom")]
        [_, "save"] => Ok(LoramacCommand::Save),
        #[cfg(feature = "eeprom")]
        [_, "erase"] => Ok(LoramacCommand::Erase),
        _ => Err(CommandError::Usage(USAGE)),
    }
}

fn parse_tx_options(args: &[&str], usage: &'static str) -> Result<TxOptions, CommandError> {
    let mut options = TxOptions::default();

    if let Some(mode) = args.first() {
        options.mode = match *mode {
            "cnf" => TxMode::Confirmed,
            "uncnf" => TxMode::Unconfirmed,
            _ => return Err(CommandError::Usage(usage)),
        };
    }
    if let Some(port) = args.get(1) {
        options.port = port
            .parse::<u8>()
            .ok()
            .and_then(FPort::new)
            .ok_or_else(|| CommandError::InvalidPort((*port).to_string()))?;
    }

    Ok(options)
}

fn parse_value(param: Param, value: &str) -> Option<ParamValue> {
    Some(match param {
        Param::DevEui => ParamValue::DevEui(value.parse().ok()?),
        Param::AppEui => ParamValue::AppEui(value.parse().ok()?),
        Param::AppKey => ParamValue::AppKey(parse_hex(value)?),
        Param::AppSKey => ParamValue::AppSKey(parse_hex(value)?),
        Param::NwkSKey => ParamValue::NwkSKey(parse_hex(value)?),
        Param::DevAddr => ParamValue::DevAddr(parse_hex(value)?),
        Param::Class => ParamValue::Class(match value {
            "A" => DeviceClass::A,
            "B" => DeviceClass::B,
            "C" => DeviceClass::C,
            _ => return None,
        }),
        Param::Dr => ParamValue::Dr(parse_index(value, MAX_DATARATE)?),
        Param::Adr => ParamValue::Adr(parse_on_off(value)?),
        Param::Public => ParamValue::Public(parse_on_off(value)?),
        Param::NetId => ParamValue::NetId(parse_integer(value)?),
        Param::TxPower => ParamValue::TxPower(parse_index(value, MAX_TX_POWER)?),
        Param::Rx2Freq => ParamValue::Rx2Freq(value.parse().ok()?),
        Param::Rx2Dr => ParamValue::Rx2Dr(parse_index(value, MAX_DATARATE)?),
    })
}

fn parse_hex<const N: usize>(value: &str) -> Option<HexBytes<N>> {
    value.parse().ok()
}

fn parse_index(value: &str, max: u8) -> Option<u8> {
    value.parse::<u8>().ok().filter(|index| *index <= max)
}

fn parse_on_off(value: &str) -> Option<bool> {
    match value {
        "on" => Some(true),
        "off" => Some(false),
        _ => None,
    }
}

/// Decimal, or hexadecimal with a `0x` prefix.
fn parse_integer(value: &str) -> Option<u32> {
    match value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => value.parse().ok(),
    }
}

/// Parse and execute one `loramac` invocation, returning the shell status.
///
/// Failures are printed to `out` and yield status 1.
///
/// # Errors
///
/// Returns an error only if writing to `out` fails.
pub async fn run<M, W, S>(
    mac: &mut M,
    weather: &WeatherConfig,
    interrupt: &Interrupt,
    argv: &[S],
    out: &mut W,
) -> crate::Result<i32>
where
    M: LoRaMac + ?Sized,
    W: Write,
    S: AsRef<str>,
{
    let result = match parse(argv) {
        Ok(command) => execute(mac, weather, interrupt, command, out).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => Ok(0),
        Err(CommandError::Io(e)) => Err(e.into()),
        Err(e) => {
            debug!(error = ?e, "loramac command failed");
            writeln!(out, "{e}")?;
            Ok(1)
        }
    }
}

/// Execute a parsed command.
///
/// # Errors
///
/// Returns a [`CommandError`] describing the failure.
pub async fn execute<M, W>(
    mac: &mut M,
    weather: &WeatherConfig,
    interrupt: &Interrupt,
    command: LoramacCommand,
    out: &mut W,
) -> Result<(), CommandError>
where
    M: LoRaMac + ?Sized,
    W: Write,
{
    match command {
        LoramacCommand::Get(param) => writeln!(out, "{}", mac.get(param))?,
        LoramacCommand::Set(value) => mac.set(value),
        LoramacCommand::Join(mode) => {
            mac.join(mode).await.map_err(CommandError::Join)?;
            writeln!(out, "Join procedure succeeded!")?;
        }
        LoramacCommand::Tx { payload, options } => {
            transmit(mac, payload.as_bytes(), options, out).await?;
        }
        LoramacCommand::Loop { options } => {
            run_loop(mac, weather, options, interrupt, out).await?;
        }
        LoramacCommand::LinkCheck => {
            mac.request_link_check();
            writeln!(out, "Link check request scheduled")?;
        }
        #[cfg(feature = "eeprom")]
        LoramacCommand::Save => mac.save_config().map_err(CommandError::Save)?,
        #[cfg(feature = "eeprom")]
        LoramacCommand::Erase => mac.erase_config().map_err(CommandError::Erase)?,
    }
    Ok(())
}

/// Send one uplink, wait for its receive windows and print what came back.
///
/// # Errors
///
/// Returns [`CommandError::Send`] when the stack refuses the uplink or the
/// receive windows fail.
pub async fn transmit<M, W>(
    mac: &mut M,
    payload: &[u8],
    options: TxOptions,
    out: &mut W,
) -> Result<(), CommandError>
where
    M: LoRaMac + ?Sized,
    W: Write,
{
    mac.set_tx_mode(options.mode);
    mac.set_tx_port(options.port);

    mac.send(payload).await.map_err(CommandError::Send)?;

    match mac.recv().await.map_err(CommandError::Send)? {
        RxOutcome::Data(downlink) => writeln!(
            out,
            "Data received: {}, port: {}",
            String::from_utf8_lossy(&downlink.payload),
            downlink.port
        )?,
        RxOutcome::TxDone => writeln!(out, "TX complete, no data received")?,
    }

    if let Some(check) = mac.link_check() {
        writeln!(out, "Link check information:")?;
        writeln!(out, "  - Demodulation margin: {}", check.demod_margin)?;
        writeln!(out, "  - Number of gateways: {}", check.nb_gateways)?;
    }

    Ok(())
}

/// Transmit synthetic weather readings until interrupted.
///
/// Each iteration walks the readings one step from the previous ones, sends
/// them as JSON and sleeps the configured interval. An interrupt triggered
/// while the loop runs ends it after the current transmit. The loop also ends
/// after `weather.max_iterations` uplinks when that is set.
///
/// # Errors
///
/// Returns the first transmit failure.
pub async fn run_loop<M, W>(
    mac: &mut M,
    weather: &WeatherConfig,
    options: TxOptions,
    interrupt: &Interrupt,
    out: &mut W,
) -> Result<(), CommandError>
where
    M: LoRaMac + ?Sized,
    W: Write,
{
    let rng = weather
        .seed
        .map_or_else(StdRng::from_os_rng, StdRng::seed_from_u64);
    let mut station = WeatherStation::new(weather.device_id, rng);
    info!(
        device_id = station.device_id(),
        interval_secs = weather.interval_secs,
        "Weather loop started"
    );

    // Listen for the whole loop so a Ctrl-C during a transmit is not lost.
    let stop = interrupt.listen();
    tokio::pin!(stop);

    let mut sent: u64 = 0;
    loop {
        let reading = station.advance();
        debug!(%reading, "New weather reading");

        let payload = station.payload()?;
        transmit(mac, payload.as_bytes(), options, out).await?;
        sent += 1;

        if weather.iteration_limit().is_some_and(|limit| sent >= limit) {
            info!(sent, "Weather loop reached its iteration limit");
            break;
        }

        tokio::select! {
            () = &mut stop => {
                info!(sent, "Weather loop interrupted");
                break;
            }
            () = tokio::time::sleep(weather.interval()) => {}
        }
    }

    Ok(())
}
