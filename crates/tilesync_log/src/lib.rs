//! tilesync wire log
//!
//! Turns raw server log lines into typed events. Command batches sent to
//! clients are translated from the numbering in force when the log was written
//! onto the current numbering before anyone else sees them.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod classify;
pub mod event;
pub mod stream;
pub mod translate;

pub use classify::{Classification, LineClassifier, LineShape, move_player_commands_first};
pub use event::{ClassifiedEvent, ClassifiedLine, Command, CommandError, LogEntry};
pub use stream::EventStream;
pub use translate::{EnumSnapshot, TranslateError, TranslationTable, HISTORICAL_SNAPSHOTS};
