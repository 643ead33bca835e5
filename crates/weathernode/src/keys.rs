//! Fixed-length identifiers and keys used by the LoRaWAN stack.
//!
//! EUIs, AES keys and device addresses are byte arrays of a fixed size. They
//! are entered and displayed as hex strings, two characters per byte.

use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Length of a device EUI in bytes.
pub const DEVEUI_LEN: usize = 8;
/// Length of an application EUI in bytes.
pub const APPEUI_LEN: usize = 8;
/// Length of an AES-128 key in bytes.
pub const KEY_LEN: usize = 16;
/// Length of a device address in bytes.
pub const DEVADDR_LEN: usize = 4;

/// Errors produced when parsing a hex string into a fixed-length array.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseHexError {
    /// The string does not have exactly two characters per byte.
    #[error("expected {expected} hex chars, got {actual}")]
    Length {
        /// Required number of characters.
        expected: usize,
        /// Number of characters supplied.
        actual: usize,
    },

    /// The string contains a non-hex character.
    #[error("invalid hex string: {0}")]
    Invalid(#[from] hex::FromHexError),
}

/// A fixed-size byte array written as hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct HexBytes<const N: usize>([u8; N]);

/// 64-bit device EUI.
pub type DevEui = HexBytes<DEVEUI_LEN>;
/// 64-bit application (join) EUI.
pub type AppEui = HexBytes<APPEUI_LEN>;
/// AES-128 key (application key or session key).
pub type AesKey = HexBytes<KEY_LEN>;
/// 32-bit device address.
pub type DevAddr = HexBytes<DEVADDR_LEN>;

impl<const N: usize> HexBytes<N> {
    /// Number of hex characters in the textual form.
    pub const HEX_LEN: usize = N * 2;

    /// Wrap raw bytes.
    #[must_use]
    pub const fn new(bytes: [u8; N]) -> Self {
        Self(bytes)
    }

    /// Borrow the raw bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; N] {
        &self.0
    }

    /// Whether every byte is zero (the unset value).
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }
}

impl<const N: usize> Default for HexBytes<N> {
    fn default() -> Self {
        Self([0; N])
    }
}

impl<const N: usize> From<[u8; N]> for HexBytes<N> {
    fn from(bytes: [u8; N]) -> Self {
        Self(bytes)
    }
}

impl<const N: usize> fmt::Display for HexBytes<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode_upper(self.0))
    }
}

impl<const N: usize> fmt::Debug for HexBytes<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HexBytes({self})")
    }
}

impl<const N: usize> FromStr for HexBytes<N> {
    type Err = ParseHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != Self::HEX_LEN {
            return Err(ParseHexError::Length {
                expected: Self::HEX_LEN,
                actual: s.len(),
            });
        }
        let mut bytes = [0u8; N];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self(bytes))
    }
}

impl<const N: usize> Serialize for HexBytes<N> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de, const N: usize> Deserialize<'de> for HexBytes<N> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}
