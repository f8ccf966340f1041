//! tilesync core types
//!
//! Pure protocol vocabulary with no I/O: wire enums, identifiers, tiles,
//! board and score-sheet shapes shared by every other crate.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod board;
pub mod error;
pub mod id;
pub mod protocol;

// Re-exports
pub use board::{
    AddressedMessage, Board, ChainSizes, HistoryMessage, ScoreRow, Tile, TileRack, BOARD_HEIGHT,
    BOARD_WIDTH, CHAIN_COUNT, INITIAL_SCORE_ROW, MAX_PLAYERS, RACK_SIZE, SCORE_ROW_LEN, TILE_COUNT,
};
pub use error::{CoreError, CoreResult};
pub use id::{ClientId, GameId, LogTimestamp};
pub use protocol::{
    ClientCommand, EnumFamily, ErrorCode, GameBoardType, GameHistoryMessage, GameMode, ServerCommand,
};
