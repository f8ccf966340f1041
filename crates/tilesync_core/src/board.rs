//! Board, rack and score-sheet shapes.
//!
//! A tile is identified by its board coordinate, so the 108 tiles of the set
//! and the 108 cells of the 12x9 board are the same space.

use crate::error::{CoreError, CoreResult};
use crate::protocol::GameBoardType;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Board columns
pub const BOARD_WIDTH: usize = 12;
/// Board rows
pub const BOARD_HEIGHT: usize = 9;
/// Tiles in a full set
pub const TILE_COUNT: usize = BOARD_WIDTH * BOARD_HEIGHT;
/// Seats per game
pub const MAX_PLAYERS: usize = 6;
/// Slots per tile rack
pub const RACK_SIZE: usize = 6;
/// Hotel chains
pub const CHAIN_COUNT: usize = 7;
/// Client-visible cells per player row: one share count per chain plus cash
pub const SCORE_ROW_LEN: usize = 8;

/// Player row of the score sheet
pub type ScoreRow = [i64; SCORE_ROW_LEN];

/// Shared chain-size row of the score sheet
pub type ChainSizes = [i64; CHAIN_COUNT];

/// Tile rack; `None` is an empty or unknown slot
pub type TileRack = [Option<Tile>; RACK_SIZE];

/// A history message as delivered: code followed by arguments
pub type HistoryMessage = Vec<serde_json::Value>;

/// Player row every game starts with: no shares, 6000 in cash
pub const INITIAL_SCORE_ROW: ScoreRow = [0, 0, 0, 0, 0, 0, 0, 60];

/// A tile, named by the board cell it occupies once played
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "(u8, u8)", into = "(u8, u8)")]
pub struct Tile {
    /// Column, 0..12
    pub x: u8,
    /// Row, 0..9
    pub y: u8,
}

impl Tile {
    /// Create a tile from in-range coordinates
    #[must_use]
    pub const fn new(x: u8, y: u8) -> Self {
        Self { x, y }
    }

    /// Create a tile from wire integers, checking board bounds
    ///
    /// # Errors
    ///
    /// Returns error if the coordinate is off the board
    pub fn try_new(x: i64, y: i64) -> CoreResult<Self> {
        let in_range = (0..BOARD_WIDTH as i64).contains(&x) && (0..BOARD_HEIGHT as i64).contains(&y);
        if !in_range {
            return Err(CoreError::TileOutOfBounds { x, y });
        }
        Ok(Self::new(x as u8, y as u8))
    }

    /// Every tile of the set, column-major
    pub fn all() -> impl Iterator<Item = Tile> {
        (0..BOARD_WIDTH as u8).flat_map(|x| (0..BOARD_HEIGHT as u8).map(move |y| Tile::new(x, y)))
    }
}

impl TryFrom<(u8, u8)> for Tile {
    type Error = CoreError;

    fn try_from((x, y): (u8, u8)) -> CoreResult<Self> {
        Self::try_new(i64::from(x), i64::from(y))
    }
}

impl From<Tile> for (u8, u8) {
    fn from(tile: Tile) -> Self {
        (tile.x, tile.y)
    }
}

impl fmt::Display for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// The 12x9 board grid of board-type codes, indexed `[x][y]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    cells: [[i64; BOARD_HEIGHT]; BOARD_WIDTH],
}

impl Board {
    /// Create an empty board
    #[must_use]
    pub fn new() -> Self {
        Self {
            cells: [[GameBoardType::Nothing.code(); BOARD_HEIGHT]; BOARD_WIDTH],
        }
    }

    /// Create from a full grid
    #[must_use]
    pub const fn from_cells(cells: [[i64; BOARD_HEIGHT]; BOARD_WIDTH]) -> Self {
        Self { cells }
    }

    /// Board type at a cell
    #[must_use]
    pub fn get(&self, tile: Tile) -> i64 {
        self.cells[tile.x as usize][tile.y as usize]
    }

    /// Set the board type at a cell
    pub fn set(&mut self, tile: Tile, board_type: i64) {
        self.cells[tile.x as usize][tile.y as usize] = board_type;
    }

    /// True if no tile has been placed at the cell
    #[must_use]
    pub fn is_empty_at(&self, tile: Tile) -> bool {
        self.get(tile) == GameBoardType::Nothing.code()
    }

    /// Grid view
    #[must_use]
    pub fn cells(&self) -> &[[i64; BOARD_HEIGHT]; BOARD_WIDTH] {
        &self.cells
    }

    /// Number of occupied cells
    #[must_use]
    pub fn occupied_count(&self) -> usize {
        Tile::all().filter(|tile| !self.is_empty_at(*tile)).count()
    }
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}

/// A history message together with its addressee in a simulation.
///
/// `player_id` of `None` means the message went to every player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressedMessage {
    /// Addressee
    pub player_id: Option<usize>,
    /// Message body
    pub message: HistoryMessage,
}

impl AddressedMessage {
    /// Create a message addressed to one player, or to all with `None`
    #[must_use]
    pub fn new(player_id: Option<usize>, message: HistoryMessage) -> Self {
        Self { player_id, message }
    }

    /// True if the message reaches `player_id`
    #[must_use]
    pub fn reaches(&self, player_id: usize) -> bool {
        self.player_id.is_none_or(|target| target == player_id)
    }
}
