//! Captured end state of a replayed simulation.

use crate::harness::ServerGameView;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tilesync_core::{
    AddressedMessage, Board, ChainSizes, GameId, LogTimestamp, ScoreRow, Tile, TileRack,
    CHAIN_COUNT,
};

/// Score sheet as the simulation holds it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreSheetRecord {
    /// Client-visible part of each player row
    pub player_data: Vec<ScoreRow>,
    /// Shares left per chain
    pub available: [i64; CHAIN_COUNT],
    /// Tiles per chain
    pub chain_size: ChainSizes,
    /// Share price per chain
    pub price: [i64; CHAIN_COUNT],
    /// Username of the game's creator
    pub creator_username: Option<String>,
    /// Seat of each username
    pub username_to_player_id: BTreeMap<String, usize>,
}

impl Default for ScoreSheetRecord {
    fn default() -> Self {
        Self {
            player_data: Vec::new(),
            available: [25; CHAIN_COUNT],
            chain_size: [0; CHAIN_COUNT],
            price: [0; CHAIN_COUNT],
            creator_username: None,
            username_to_player_id: BTreeMap::new(),
        }
    }
}

/// Every field of a simulated game worth keeping as a regression fixture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerGameRecord {
    /// External game id
    pub game_id: GameId,
    /// Internal game id
    pub internal_game_id: GameId,
    /// Lifecycle state code
    pub state: i64,
    /// Game mode code
    pub mode: i64,
    /// Seats
    pub max_players: usize,
    /// Seated players
    pub num_players: usize,
    /// Tiles still in the bag
    pub tile_bag: Vec<Tile>,
    /// Whose turn it is
    pub turn_player_id: Option<usize>,
    /// Consecutive turns in which nobody placed a tile
    pub turns_without_played_tiles_count: i64,
    /// Every history message produced, with its addressee
    pub history_messages: Vec<AddressedMessage>,
    /// Board
    pub game_board: Board,
    /// Score sheet
    pub score_sheet: ScoreSheetRecord,
    /// Racks, absent once the simulation drops them
    pub tile_racks: Option<Vec<TileRack>>,
    /// Pending action stack, each action as a JSON object tagged by `__name__`
    pub actions: Vec<serde_json::Value>,
    /// Timestamp of the log the game came from
    pub log_time: LogTimestamp,
    /// Begin time from the log
    pub begin: Option<i64>,
    /// End time from the log
    pub end: Option<i64>,
}

impl ServerGameRecord {
    /// Empty record for a game
    #[must_use]
    pub fn new(game_id: GameId, internal_game_id: GameId) -> Self {
        Self {
            game_id,
            internal_game_id,
            state: 0,
            mode: 0,
            max_players: 0,
            num_players: 0,
            tile_bag: Vec::new(),
            turn_player_id: None,
            turns_without_played_tiles_count: 0,
            history_messages: Vec::new(),
            game_board: Board::new(),
            score_sheet: ScoreSheetRecord::default(),
            tile_racks: None,
            actions: Vec::new(),
            log_time: 0,
            begin: None,
            end: None,
        }
    }

    /// Attach the log-side metadata
    #[must_use]
    pub fn with_log_metadata(
        mut self,
        log_time: LogTimestamp,
        begin: Option<i64>,
        end: Option<i64>,
    ) -> Self {
        self.log_time = log_time;
        self.begin = begin;
        self.end = end;
        self
    }

    /// Serialize to JSON
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Deserialize from JSON
    ///
    /// # Errors
    ///
    /// Returns error if the text is not a record
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl ServerGameView for ServerGameRecord {
    fn board(&self) -> &Board {
        &self.game_board
    }

    fn score_sheet_players(&self) -> Vec<ScoreRow> {
        self.score_sheet.player_data.clone()
    }

    fn chain_sizes(&self) -> ChainSizes {
        self.score_sheet.chain_size
    }

    fn tile_racks(&self) -> Option<Vec<TileRack>> {
        self.tile_racks.clone()
    }

    fn history_messages(&self) -> &[AddressedMessage] {
        &self.history_messages
    }

    fn player_count(&self) -> usize {
        self.score_sheet.username_to_player_id.len()
    }
}
