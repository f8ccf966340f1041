//! Classified log events.
//!
//! One event per input line. Command payloads stay as decoded JSON arrays;
//! typed access goes through [`Command`] so a malformed argument surfaces as a
//! [`CommandError`] at the point of use instead of failing classification.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tilesync_core::{ClientCommand, ClientId, CoreError, GameId, ServerCommand, Tile};

/// Errors reading typed arguments out of a command array
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    /// Command is shorter than the argument index
    #[error("Command has {len} entries, argument {index} missing")]
    Missing {
        /// Requested position
        index: usize,
        /// Actual length
        len: usize,
    },

    /// Argument is not a non-negative integer
    #[error("Argument {index} is not an integer: {value}")]
    NotInteger {
        /// Requested position
        index: usize,
        /// Rendered value
        value: String,
    },

    /// Argument is not an array
    #[error("Argument {index} is not an array: {value}")]
    NotArray {
        /// Requested position
        index: usize,
        /// Rendered value
        value: String,
    },

    /// Coordinate off the board
    #[error(transparent)]
    Tile(#[from] CoreError),
}

/// A decoded command array: wire code followed by arguments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Command(Vec<Value>);

impl Command {
    /// Wrap a decoded array
    #[must_use]
    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    /// Wire code at position 0
    #[must_use]
    pub fn code(&self) -> Option<i64> {
        self.0.first().and_then(Value::as_i64)
    }

    /// Interpret the code as a server-to-client command
    #[must_use]
    pub fn client_command(&self) -> Option<ClientCommand> {
        self.code().and_then(ClientCommand::from_code)
    }

    /// Interpret the code as a client-to-server command
    #[must_use]
    pub fn server_command(&self) -> Option<ServerCommand> {
        self.code().and_then(ServerCommand::from_code)
    }

    /// Raw value at a position
    ///
    /// # Errors
    ///
    /// Returns error if the command is too short
    pub fn arg(&self, index: usize) -> Result<&Value, CommandError> {
        self.0.get(index).ok_or(CommandError::Missing {
            index,
            len: self.0.len(),
        })
    }

    /// Integer at a position
    ///
    /// # Errors
    ///
    /// Returns error if missing or not an integer
    pub fn int(&self, index: usize) -> Result<i64, CommandError> {
        let value = self.arg(index)?;
        value.as_i64().ok_or_else(|| CommandError::NotInteger {
            index,
            value: value.to_string(),
        })
    }

    /// Non-negative integer usable as an index
    ///
    /// # Errors
    ///
    /// Returns error if missing, not an integer or negative
    pub fn index(&self, index: usize) -> Result<usize, CommandError> {
        let value = self.arg(index)?;
        value
            .as_u64()
            .and_then(|v| usize::try_from(v).ok())
            .ok_or_else(|| CommandError::NotInteger {
                index,
                value: value.to_string(),
            })
    }

    /// Client id at a position
    ///
    /// # Errors
    ///
    /// Returns error if missing or not a non-negative integer
    pub fn client_id(&self, index: usize) -> Result<ClientId, CommandError> {
        self.index(index).map(|id| ClientId::new(id as u64))
    }

    /// Game id at a position
    ///
    /// # Errors
    ///
    /// Returns error if missing or not a non-negative integer
    pub fn game_id(&self, index: usize) -> Result<GameId, CommandError> {
        self.index(index).map(|id| GameId::new(id as u64))
    }

    /// Tile whose x is at `index` and y at `index + 1`
    ///
    /// # Errors
    ///
    /// Returns error if either coordinate is missing or off the board
    pub fn tile(&self, index: usize) -> Result<Tile, CommandError> {
        Ok(Tile::try_new(self.int(index)?, self.int(index + 1)?)?)
    }

    /// Array at a position
    ///
    /// # Errors
    ///
    /// Returns error if missing or not an array
    pub fn array(&self, index: usize) -> Result<&Vec<Value>, CommandError> {
        let value = self.arg(index)?;
        value.as_array().ok_or_else(|| CommandError::NotArray {
            index,
            value: value.to_string(),
        })
    }

    /// True if the position holds JSON `null`
    ///
    /// # Errors
    ///
    /// Returns error if the command is too short
    pub fn is_null(&self, index: usize) -> Result<bool, CommandError> {
        Ok(self.arg(index)?.is_null())
    }

    /// Everything after the code
    #[must_use]
    pub fn args(&self) -> &[Value] {
        self.0.get(1..).unwrap_or(&[])
    }

    /// Every entry including the code
    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.0
    }

    /// Mutable entries, for code translation
    pub fn values_mut(&mut self) -> &mut [Value] {
        &mut self.0
    }

    /// Consume into the raw array
    #[must_use]
    pub fn into_values(self) -> Vec<Value> {
        self.0
    }
}

impl From<Vec<Value>> for Command {
    fn from(values: Vec<Value>) -> Self {
        Self(values)
    }
}

/// A structured diagnostic entry (`{"_": kind, ...}`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogEntry(Map<String, Value>);

impl LogEntry {
    /// Wrap a decoded object
    #[must_use]
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Entry kind tag
    #[must_use]
    pub fn kind(&self) -> Option<&str> {
        self.0.get("_").and_then(Value::as_str)
    }

    /// Field by name
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Unsigned integer field by name
    #[must_use]
    pub fn u64(&self, key: &str) -> Option<u64> {
        self.0.get(key).and_then(Value::as_u64)
    }

    /// All fields
    #[must_use]
    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }
}

/// One classified log line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClassifiedEvent {
    /// `time: <float>`
    Time(f64),
    /// A client connected under a username
    Connect {
        /// Connection id
        client_id: ClientId,
        /// Username
        username: String,
    },
    /// A client disconnected
    Disconnect {
        /// Connection id
        client_id: ClientId,
    },
    /// A batch of commands sent to one or more clients
    CommandToClient {
        /// Recipients, in log order
        client_ids: Vec<ClientId>,
        /// Commands, translated and reordered
        commands: Vec<Command>,
    },
    /// A command sent by a client
    CommandToServer {
        /// Sender
        client_id: ClientId,
        /// Command
        command: Command,
    },
    /// Structured diagnostic entry
    LogEntry(LogEntry),
    /// `game #<id> expired`
    GameExpired {
        /// External game id
        game_id: GameId,
    },
    /// First `connection_made` of the file
    ConnectionMade,
    /// Frame terminator
    BlankLine,
    /// Known diagnostic noise
    Ignorable,
}

impl ClassifiedEvent {
    /// True if pending frame mutations must be flushed after this event.
    ///
    /// `connection_made` and diagnostic noise close a frame just like a blank
    /// line does.
    #[must_use]
    pub fn is_frame_boundary(&self) -> bool {
        matches!(self, Self::BlankLine | Self::ConnectionMade | Self::Ignorable)
    }
}

/// A raw line together with its classification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedLine {
    /// 1-based line number in the source file
    pub line_number: usize,
    /// Line text without its newline
    pub raw: String,
    /// Event, or `None` for lines no pattern recognises
    pub event: Option<ClassifiedEvent>,
}

impl ClassifiedLine {
    /// True if this line closes a frame
    #[must_use]
    pub fn is_frame_boundary(&self) -> bool {
        self.event
            .as_ref()
            .is_some_and(ClassifiedEvent::is_frame_boundary)
    }
}
