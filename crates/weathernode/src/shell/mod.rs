//! Interactive line shell.
//!
//! Reads one line at a time, splits it into arguments and dispatches on the
//! first one. `help` is built in; `loramac` is the only application command.

pub mod loramac;

use std::fmt;
use std::io::Write;
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::futures::Notified;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::config::WeatherConfig;
use crate::error::Result;
use crate::mac::LoRaMac;

pub use loramac::{CommandError, LoramacCommand, TxOptions};

/// Prompt printed before every line.
pub const PROMPT: &str = "> ";

/// Shared stop signal for the shell and the weather loop.
///
/// A trigger reaches every listener created before it and is then gone.
/// Nothing is queued, so a Ctrl-C during a command that does not listen
/// (such as `join`) is dropped.
#[derive(Debug, Clone, Default)]
pub struct Interrupt(Arc<Notify>);

impl Interrupt {
    /// Create an interrupt that is not wired to any signal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Trigger this interrupt on every Ctrl-C.
    ///
    /// Must be called from within a tokio runtime.
    pub fn listen_for_ctrl_c(&self) {
        let notify = Arc::clone(&self.0);
        tokio::spawn(async move {
            loop {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => {
                        debug!("Ctrl-C received");
                        notify.notify_waiters();
                    }
                    Err(e) => {
                        warn!("Cannot listen for Ctrl-C: {}", e);
                        break;
                    }
                }
            }
        });
    }

    /// Trigger the interrupt, waking every current listener.
    pub fn trigger(&self) {
        self.0.notify_waiters();
    }

    /// Start listening.
    ///
    /// The returned future completes on the first trigger after this call,
    /// whether or not it has been polled yet.
    pub fn listen(&self) -> Notified<'_> {
        self.0.notified()
    }
}

/// A line with an unterminated quote or a trailing backslash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotingError;

impl fmt::Display for QuotingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "incorrect quoting")
    }
}

impl std::error::Error for QuotingError {}

/// Split a line into arguments.
///
/// Arguments are separated by whitespace. Single or double quotes group
/// words, and a backslash takes the next character literally.
///
/// # Errors
///
/// Returns [`QuotingError`] if a quote is left open or the line ends with a
/// backslash.
pub fn tokenize(line: &str) -> std::result::Result<Vec<String>, QuotingError> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match (quote, c) {
            (_, '\\') => {
                current.push(chars.next().ok_or(QuotingError)?);
                in_word = true;
            }
            (Some(q), c) if c == q => quote = None,
            (Some(_), c) => current.push(c),
            (None, '"' | '\'') => {
                quote = Some(c);
                in_word = true;
            }
            (None, c) if c.is_whitespace() => {
                if in_word {
                    args.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            (None, c) => {
                current.push(c);
                in_word = true;
            }
        }
    }

    if quote.is_some() {
        return Err(QuotingError);
    }
    if in_word {
        args.push(current);
    }
    Ok(args)
}

/// The device shell.
#[derive(Debug)]
pub struct Shell<M> {
    mac: M,
    weather: WeatherConfig,
    interrupt: Interrupt,
}

impl<M: LoRaMac> Shell<M> {
    /// Create a shell driving `mac`.
    pub fn new(mac: M, weather: WeatherConfig, interrupt: Interrupt) -> Self {
        Self {
            mac,
            weather,
            interrupt,
        }
    }

    /// The MAC stack.
    #[must_use]
    pub fn mac(&self) -> &M {
        &self.mac
    }

    /// The MAC stack, mutably.
    pub fn mac_mut(&mut self) -> &mut M {
        &mut self.mac
    }

    /// Read and execute lines until end of input or an interrupt.
    ///
    /// # Errors
    ///
    /// Returns an error if reading the input or writing the output fails.
    pub async fn run<R, W>(&mut self, input: R, out: &mut W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        let mut lines = input.lines();

        loop {
            write!(out, "{PROMPT}")?;
            out.flush()?;

            let line = tokio::select! {
                line = lines.next_line() => line?,
                () = self.interrupt.listen() => {
                    writeln!(out)?;
                    info!("Interrupted, leaving the shell");
                    break;
                }
            };

            let Some(line) = line else {
                writeln!(out)?;
                debug!("End of input, leaving the shell");
                break;
            };

            self.execute_line(&line, out).await?;
        }

        Ok(())
    }

    /// Tokenize and execute one line.
    ///
    /// Returns the command status, or `None` when the line held no command.
    ///
    /// # Errors
    ///
    /// Returns an error if writing the output fails.
    pub async fn execute_line<W: Write>(
        &mut self,
        line: &str,
        out: &mut W,
    ) -> Result<Option<i32>> {
        let argv = match tokenize(line) {
            Ok(argv) => argv,
            Err(e) => {
                writeln!(out, "shell: {e}")?;
                return Ok(None);
            }
        };

        if argv.is_empty() {
            return Ok(None);
        }
        self.execute(&argv, out).await.map(Some)
    }

    /// Execute an argument vector and return its status.
    ///
    /// # Errors
    ///
    /// Returns an error if writing the output fails.
    pub async fn execute<S, W>(&mut self, argv: &[S], out: &mut W) -> Result<i32>
    where
        S: AsRef<str>,
        W: Write,
    {
        let Some(name) = argv.first() else {
            return Ok(0);
        };

        match name.as_ref() {
            "help" => {
                writeln!(out, "Command              Description")?;
                writeln!(out, "---------------------------------------")?;
                writeln!(out, "{:<20} {}", "loramac", "control the loramac stack")?;
                Ok(0)
            }
            "loramac" => {
                loramac::run(&mut self.mac, &self.weather, &self.interrupt, argv, out).await
            }
            other => {
                writeln!(out, "shell: command not found: {other}")?;
                Ok(1)
            }
        }
    }
}
