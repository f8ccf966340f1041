//! Identifiers that appear on the wire.
//!
//! Client and game ids are plain integers assigned by the game server. They are
//! wrapped so that a client id can never be used where a game id is expected.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Creation timestamp of a log file, in whole seconds since the epoch.
///
/// Also the key of the historical enum translation table and of the tile-bag
/// correction table.
pub type LogTimestamp = u64;

/// Connection identifier assigned by the server for the life of one socket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(u64);

impl ClientId {
    /// Create from raw value
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get raw value
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ClientId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Game identifier, either the external (client-facing) or the internal number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameId(u64);

impl GameId {
    /// Create from raw value
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get raw value
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for GameId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}
