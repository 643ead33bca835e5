//! `SQLite` schema of the NVM store.
//!
//! The store emulates the EEPROM area where a device keeps its MAC
//! configuration: a single row of MAC state plus a key-value metadata table.

/// SQL statement to create the MAC state table (schema version 1 layout).
///
/// The `id` check keeps the table to a single row.
pub const CREATE_MAC_STATE_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS mac_state (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    settings TEXT NOT NULL,
    joined INTEGER NOT NULL,
    saved_at TEXT NOT NULL
)
";

/// SQL statement to create the metadata table for storing key-value pairs.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// Version 2: persist the uplink frame counter with the session.
pub const ADD_UPLINK_COUNTER_COLUMN: &str = r"
ALTER TABLE mac_state ADD COLUMN uplink_counter INTEGER NOT NULL DEFAULT 0
";

/// All base schema statements in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[CREATE_MAC_STATE_TABLE, CREATE_METADATA_TABLE];
