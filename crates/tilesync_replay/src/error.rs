//! Faults raised while applying one event.
//!
//! None of these stop a run. The reconstructor and the slicer log them with
//! the line number and move on to the next command.

use tilesync_core::{ClientId, GameId};
use tilesync_log::CommandError;

/// A single command or entry could not be applied
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandlerError {
    /// Bad command arguments
    #[error(transparent)]
    Command(#[from] CommandError),

    /// Batch with no recipients
    #[error("Command batch has no recipients")]
    NoRecipient,

    /// The client is not routed to any game
    #[error("Client {0} is not in a game")]
    UnroutedClient(ClientId),

    /// The client has no known username
    #[error("Client {0} is not connected")]
    UnknownClient(ClientId),

    /// No open game with this id
    #[error("Game {0} is not open")]
    UnknownGame(GameId),

    /// The username has no seat in the game
    #[error("Username {username:?} has no seat in game {game_id}")]
    UnseatedUsername {
        /// Game
        game_id: GameId,
        /// Username
        username: String,
    },

    /// No username is seated at this player id
    #[error("Game {game_id} has no player {player_id}")]
    EmptySeat {
        /// Game
        game_id: GameId,
        /// Seat
        player_id: usize,
    },

    /// No client is connected under the username
    #[error("No client connected as {0:?}")]
    UnknownUsername(String),

    /// An index is outside its table
    #[error("{what} index {index} out of range")]
    OutOfRange {
        /// Table being indexed
        what: &'static str,
        /// Offending index
        index: usize,
    },

    /// A structured entry lacks a field or has the wrong type
    #[error("Log entry field {field:?} is malformed: {value}")]
    MalformedEntry {
        /// Field name
        field: &'static str,
        /// Rendered value, empty if missing
        value: String,
    },
}

impl HandlerError {
    /// Entry field error from an optional value
    pub(crate) fn entry(field: &'static str, value: Option<&serde_json::Value>) -> Self {
        Self::MalformedEntry {
            field,
            value: value.map(ToString::to_string).unwrap_or_default(),
        }
    }
}
