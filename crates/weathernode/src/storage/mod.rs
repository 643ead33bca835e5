//! Non-volatile MAC state.
//!
//! A device keeps its MAC configuration and session in EEPROM so that a reboot
//! does not require a new join. On the host this role is played by a small
//! `SQLite` database holding one row of serialized state.

pub mod migrations;
pub mod schema;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::mac::MacSettings;

/// Everything persisted by `loramac save`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NvmState {
    /// MAC parameters, keys and uplink options.
    pub settings: MacSettings,
    /// Whether a network session was open.
    pub joined: bool,
    /// Uplink frame counter of the session.
    pub uplink_counter: u32,
    /// When the state was written.
    pub saved_at: DateTime<Utc>,
}

/// `SQLite`-backed NVM store.
#[derive(Debug)]
pub struct Nvm {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection.
    conn: Connection,
}

impl Nvm {
    /// Open or create the store at the given path.
    ///
    /// Creates the parent directories and database file if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema initialization fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening NVM at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        migrations::initialize_schema(&conn)?;

        info!("NVM opened at {}", path.display());
        Ok(Self { path, conn })
    }

    /// Create an in-memory store for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;

        migrations::initialize_schema(&conn)?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn,
        })
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the state, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the database write fails.
    pub fn save(&self, state: &NvmState) -> Result<()> {
        let settings = serde_json::to_string(&state.settings)?;
        self.conn.execute(
            r"
            INSERT OR REPLACE INTO mac_state (id, settings, joined, uplink_counter, saved_at)
            VALUES (1, ?1, ?2, ?3, ?4)
            ",
            params![
                settings,
                state.joined,
                state.uplink_counter,
                state.saved_at.to_rfc3339(),
            ],
        )?;
        debug!(
            joined = state.joined,
            uplink_counter = state.uplink_counter,
            "MAC state written to NVM"
        );
        Ok(())
    }

    /// Read the saved state, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the database read fails or the stored settings
    /// cannot be decoded.
    pub fn load(&self) -> Result<Option<NvmState>> {
        let row = self
            .conn
            .query_row(
                "SELECT settings, joined, uplink_counter, saved_at FROM mac_state WHERE id = 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, bool>(1)?,
                        row.get::<_, u32>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;

        let Some((settings, joined, uplink_counter, saved_at)) = row else {
            return Ok(None);
        };

        let settings: MacSettings = serde_json::from_str(&settings)?;
        let saved_at = DateTime::parse_from_rfc3339(&saved_at).map_or_else(
            |_| {
                warn!("Unreadable NVM timestamp: {}", saved_at);
                DateTime::<Utc>::default()
            },
            |dt| dt.with_timezone(&Utc),
        );

        Ok(Some(NvmState {
            settings,
            joined,
            uplink_counter,
            saved_at,
        }))
    }

    /// Erase the saved state.
    ///
    /// Returns `true` if there was anything to erase.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn erase(&self) -> Result<bool> {
        let affected = self.conn.execute("DELETE FROM mac_state", [])?;
        Ok(affected > 0)
    }
}
