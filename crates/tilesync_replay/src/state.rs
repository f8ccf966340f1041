//! A game as its clients saw it.

use crate::error::HandlerError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use tilesync_core::{
    Board, ChainSizes, GameHistoryMessage, GameId, GameMode, HistoryMessage, LogTimestamp,
    ScoreRow, Tile, TileRack, CHAIN_COUNT, INITIAL_SCORE_ROW, MAX_PLAYERS, RACK_SIZE,
};
use tilesync_log::LogEntry;
use tilesync_sim::{
    CorrectionTable, GameParams, RecordedAction, ReplayScript, SimError, TileBag,
    TileBagInferencer,
};

/// Reconstructed client-side state of one game
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Game {
    /// Timestamp of the log the game came from
    pub log_timestamp: LogTimestamp,
    /// External (client-facing) id, the key games are tracked by
    pub game_id: GameId,
    /// Internal id
    pub internal_game_id: GameId,
    /// Lifecycle state as logged
    pub state: Option<String>,
    /// Mode name as logged
    pub mode: Option<String>,
    /// Seats
    pub max_players: Option<usize>,
    /// Authoritative initial bag, when the log recorded it
    pub tile_bag: Option<Vec<Tile>>,
    /// Begin time
    pub begin: Option<i64>,
    /// End time
    pub end: Option<i64>,
    /// Final score per player
    pub score: Option<Vec<i64>>,
    /// Seat to username
    pub player_id_to_username: BTreeMap<usize, String>,
    /// Username to seat
    pub username_to_player_id: BTreeMap<String, usize>,
    /// Usernames in the order they first took a seat
    pub player_join_order: Vec<String>,
    /// Board
    pub board: Board,
    /// Player rows of the score sheet
    pub score_sheet_players: [ScoreRow; MAX_PLAYERS],
    /// Chain-size row of the score sheet
    pub score_sheet_chain_size: ChainSizes,
    /// Tiles in the order they reached the board
    pub played_tiles_order: Vec<Tile>,
    /// Every tile seen in any rack
    pub tile_rack_tiles: BTreeSet<Tile>,
    /// First tile seen in each rack slot
    pub initial_tile_racks: [TileRack; MAX_PLAYERS],
    /// Current racks
    pub tile_racks: [TileRack; MAX_PLAYERS],
    /// Rack tiles first seen after the initial racks, in order
    pub additional_tile_rack_tiles_order: Vec<Tile>,
    /// Observed game actions in order
    pub actions: Vec<RecordedAction>,
    /// History delivered to each seated username
    pub username_to_game_history: BTreeMap<String, Vec<HistoryMessage>>,
    /// Set when the log reported the game expired
    pub expired: bool,
}

impl Game {
    /// Fresh game, as created by its first log entry
    #[must_use]
    pub fn new(log_timestamp: LogTimestamp, game_id: GameId, internal_game_id: GameId) -> Self {
        Self {
            log_timestamp,
            game_id,
            internal_game_id,
            state: None,
            mode: None,
            max_players: None,
            tile_bag: None,
            begin: None,
            end: None,
            score: None,
            player_id_to_username: BTreeMap::new(),
            username_to_player_id: BTreeMap::new(),
            player_join_order: Vec::new(),
            board: Board::new(),
            score_sheet_players: [INITIAL_SCORE_ROW; MAX_PLAYERS],
            score_sheet_chain_size: [0; CHAIN_COUNT],
            played_tiles_order: Vec::new(),
            tile_rack_tiles: BTreeSet::new(),
            initial_tile_racks: [[None; RACK_SIZE]; MAX_PLAYERS],
            tile_racks: [[None; RACK_SIZE]; MAX_PLAYERS],
            additional_tile_rack_tiles_order: Vec::new(),
            actions: Vec::new(),
            username_to_game_history: BTreeMap::new(),
            expired: false,
        }
    }

    /// Seated players
    #[must_use]
    pub fn num_players(&self) -> usize {
        self.player_id_to_username.len()
    }

    /// Seat of a username
    #[must_use]
    pub fn player_id(&self, username: &str) -> Option<usize> {
        self.username_to_player_id.get(username).copied()
    }

    /// Apply a structured log entry.
    ///
    /// A `game-player` entry seats a username; any other entry sets whichever
    /// lifecycle fields it carries.
    ///
    /// # Errors
    ///
    /// Returns error if a present field has the wrong shape
    pub fn apply_entry(&mut self, entry: &LogEntry) -> Result<(), HandlerError> {
        if entry.kind() == Some("game-player") {
            let player_id = entry
                .u64("player-id")
                .map(|id| id as usize)
                .ok_or_else(|| HandlerError::entry("player-id", entry.get("player-id")))?;
            let username = entry
                .get("username")
                .and_then(Value::as_str)
                .ok_or_else(|| HandlerError::entry("username", entry.get("username")))?;
            self.seat(player_id, username);
            return Ok(());
        }

        if let Some(value) = entry.get("state") {
            self.state = Some(text_field("state", value)?);
        }
        if let Some(value) = entry.get("mode") {
            self.mode = Some(text_field("mode", value)?);
        }
        if let Some(value) = entry.get("max-players") {
            self.max_players = Some(typed_field("max-players", value)?);
        }
        if let Some(value) = entry.get("tile-bag") {
            self.tile_bag = Some(typed_field("tile-bag", value)?);
        }
        if let Some(value) = entry.get("begin") {
            self.begin = Some(typed_field("begin", value)?);
        }
        if let Some(value) = entry.get("end") {
            self.end = Some(typed_field("end", value)?);
        }
        if let Some(value) = entry.get("score") {
            self.score = Some(typed_field("score", value)?);
        }
        if let Some(value) = entry.get("scores") {
            self.score = Some(typed_field("scores", value)?);
        }
        Ok(())
    }

    fn seat(&mut self, player_id: usize, username: &str) {
        self.player_id_to_username
            .insert(player_id, username.to_string());
        self.username_to_player_id
            .insert(username.to_string(), player_id);
        if !self.player_join_order.iter().any(|joined| joined == username) {
            self.player_join_order.push(username.to_string());
        }
        self.username_to_game_history
            .entry(username.to_string())
            .or_default();
    }

    /// Set a board cell. The first placement on an empty cell records the
    /// play order and clears the tile from whichever seated rack held it.
    pub fn set_board_cell(&mut self, tile: Tile, board_type: i64) {
        if self.board.is_empty_at(tile) {
            self.played_tiles_order.push(tile);

            let seated = self.num_players().min(MAX_PLAYERS);
            for rack in &mut self.tile_racks[..seated] {
                if let Some(slot) = rack.iter_mut().find(|slot| **slot == Some(tile)) {
                    *slot = None;
                }
            }
        }

        self.board.set(tile, board_type);
    }

    /// Set one score-sheet cell; rows past the player rows address chain sizes
    ///
    /// # Errors
    ///
    /// Returns error if the row or column is off the sheet
    pub fn set_score_sheet_cell(
        &mut self,
        row: usize,
        index: usize,
        value: i64,
    ) -> Result<(), HandlerError> {
        let cell = if row < MAX_PLAYERS {
            self.score_sheet_players[row].get_mut(index)
        } else {
            self.score_sheet_chain_size.get_mut(index)
        };
        let cell = cell.ok_or(HandlerError::OutOfRange {
            what: "score sheet column",
            index,
        })?;
        *cell = value;
        Ok(())
    }

    /// Replace the score sheet from `[player_rows, chain_sizes]`.
    ///
    /// Only as many player rows as were sent are replaced.
    ///
    /// # Errors
    ///
    /// Returns error if the payload does not have that shape
    pub fn set_score_sheet(&mut self, data: &Value) -> Result<(), HandlerError> {
        let (rows, chain_sizes): (Vec<ScoreRow>, ChainSizes) =
            serde_json::from_value(data.clone()).map_err(|_| HandlerError::MalformedEntry {
                field: "score sheet",
                value: data.to_string(),
            })?;
        if rows.len() > MAX_PLAYERS {
            return Err(HandlerError::OutOfRange {
                what: "score sheet row",
                index: rows.len() - 1,
            });
        }

        self.score_sheet_players[..rows.len()].copy_from_slice(&rows);
        self.score_sheet_chain_size = chain_sizes;
        Ok(())
    }

    /// Place a tile in a rack slot, tracking initial and additional rack tiles
    ///
    /// # Errors
    ///
    /// Returns error if the seat or slot is out of range
    pub fn set_tile(&mut self, player_id: usize, slot: usize, tile: Tile) -> Result<(), HandlerError> {
        check_rack_position(player_id, slot)?;

        if self.initial_tile_racks[player_id][slot].is_none() {
            self.tile_rack_tiles.insert(tile);
            self.initial_tile_racks[player_id][slot] = Some(tile);
        } else if self.tile_rack_tiles.insert(tile) {
            self.additional_tile_rack_tiles_order.push(tile);
        }

        self.tile_racks[player_id][slot] = Some(tile);
        Ok(())
    }

    /// Empty a rack slot
    ///
    /// # Errors
    ///
    /// Returns error if the seat or slot is out of range
    pub fn remove_tile(&mut self, player_id: usize, slot: usize) -> Result<(), HandlerError> {
        check_rack_position(player_id, slot)?;
        self.tile_racks[player_id][slot] = None;
        Ok(())
    }

    /// Rewrite a history message for storage.
    ///
    /// Position draws name the drawing player by seat; the seat is replaced by
    /// the username so histories stay comparable across players who joined at
    /// different times.
    ///
    /// # Errors
    ///
    /// Returns error if the seat is empty
    pub fn translate_history_message(
        &self,
        mut message: HistoryMessage,
    ) -> Result<HistoryMessage, HandlerError> {
        let is_position_draw = message.first().and_then(Value::as_i64)
            == Some(GameHistoryMessage::DrewPositionTile.code());
        if !is_position_draw {
            return Ok(message);
        }

        if let Some(player_id) = message.get(1).and_then(Value::as_u64) {
            let player_id = player_id as usize;
            let username = self
                .player_id_to_username
                .get(&player_id)
                .ok_or(HandlerError::EmptySeat {
                    game_id: self.game_id,
                    player_id,
                })?;
            message[1] = Value::String(username.clone());
        }
        Ok(message)
    }

    /// Append a history message delivered to a seated username
    ///
    /// # Errors
    ///
    /// Returns error if a position draw names an empty seat
    pub fn push_history(&mut self, username: &str, message: HistoryMessage) -> Result<(), HandlerError> {
        let message = self.translate_history_message(message)?;
        self.username_to_game_history
            .entry(username.to_string())
            .or_default()
            .push(message);
        Ok(())
    }

    /// Replace the history of a seated username
    ///
    /// # Errors
    ///
    /// Returns error if a position draw names an empty seat
    pub fn replace_history(
        &mut self,
        username: &str,
        messages: Vec<HistoryMessage>,
    ) -> Result<(), HandlerError> {
        let messages = messages
            .into_iter()
            .map(|message| self.translate_history_message(message))
            .collect::<Result<Vec<_>, _>>()?;
        self.username_to_game_history
            .insert(username.to_string(), messages);
        Ok(())
    }

    /// Record an action by a seat
    pub fn record_action(&mut self, player_id: usize, action: Vec<Value>) {
        self.actions.push(RecordedAction::new(player_id, action));
    }

    /// Histories of the seated players, in seat order
    #[must_use]
    pub fn player_histories(&self) -> Vec<&[HistoryMessage]> {
        self.player_id_to_username
            .values()
            .map(|username| {
                self.username_to_game_history
                    .get(username)
                    .map_or(&[][..], Vec::as_slice)
            })
            .collect()
    }

    /// The initial bag: the logged one if present, inferred otherwise
    #[must_use]
    pub fn initial_tile_bag(&self, corrections: &CorrectionTable) -> TileBag {
        match &self.tile_bag {
            Some(bag) => bag.clone(),
            None => TileBagInferencer::new(corrections).infer(
                self.log_timestamp,
                self.internal_game_id,
                &self.player_histories(),
            ),
        }
    }

    /// Parameters for a simulation of this game
    ///
    /// # Errors
    ///
    /// Returns error if mode or seat count were never logged
    pub fn game_params(&self, corrections: &CorrectionTable) -> Result<GameParams, SimError> {
        let mode_name = self
            .mode
            .as_deref()
            .ok_or(SimError::MissingMode(self.internal_game_id))?;
        let mode = GameMode::from_name(mode_name).map_err(|_| SimError::UnknownMode {
            game_id: self.internal_game_id,
            mode: mode_name.to_string(),
        })?;
        let max_players = self
            .max_players
            .ok_or(SimError::MissingMaxPlayers(self.internal_game_id))?;

        Ok(GameParams {
            game_id: self.game_id,
            internal_game_id: self.internal_game_id,
            mode,
            max_players,
            tile_bag: self.initial_tile_bag(corrections),
            logging_enabled: false,
        })
    }

    /// What the replay needs to drive a simulation
    #[must_use]
    pub fn replay_script(&self) -> ReplayScript<'_> {
        ReplayScript {
            players: &self.player_id_to_username,
            join_order: &self.player_join_order,
            actions: &self.actions,
        }
    }

    /// Mode label used by ranking reports: `Singles<n>` or `Teams`
    #[must_use]
    pub fn mode_label(&self) -> Option<String> {
        match self.mode.as_deref()? {
            "Singles" => Some(format!("Singles{}", self.num_players())),
            other => Some(other.to_string()),
        }
    }

    /// Observed rows of the seated players
    #[must_use]
    pub fn seated_score_rows(&self) -> &[ScoreRow] {
        &self.score_sheet_players[..self.num_players().min(MAX_PLAYERS)]
    }

    /// Observed racks of the seated players
    #[must_use]
    pub fn seated_tile_racks(&self) -> &[TileRack] {
        &self.tile_racks[..self.num_players().min(MAX_PLAYERS)]
    }
}

fn check_rack_position(player_id: usize, slot: usize) -> Result<(), HandlerError> {
    if player_id >= MAX_PLAYERS {
        return Err(HandlerError::OutOfRange {
            what: "player",
            index: player_id,
        });
    }
    if slot >= RACK_SIZE {
        return Err(HandlerError::OutOfRange {
            what: "rack slot",
            index: slot,
        });
    }
    Ok(())
}

fn text_field(field: &'static str, value: &Value) -> Result<String, HandlerError> {
    match value {
        Value::String(text) => Ok(text.clone()),
        Value::Number(number) => Ok(number.to_string()),
        other => Err(HandlerError::entry(field, Some(other))),
    }
}

fn typed_field<T: serde::de::DeserializeOwned>(
    field: &'static str,
    value: &Value,
) -> Result<T, HandlerError> {
    serde_json::from_value(value.clone()).map_err(|_| HandlerError::entry(field, Some(value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tilesync_core::GameBoardType;

    fn entry(value: Value) -> LogEntry {
        serde_json::from_value(value).unwrap()
    }

    fn game() -> Game {
        let mut game = Game::new(1_500_000_000, GameId::new(3), GameId::new(7));
        game.apply_entry(&entry(json!({"_": "game-player", "game-id": 7, "player-id": 0, "username": "alice"})))
            .unwrap();
        game.apply_entry(&entry(json!({"_": "game-player", "game-id": 7, "player-id": 1, "username": "bob"})))
            .unwrap();
        game
    }

    #[test]
    fn test_new_game_defaults() {
        let game = Game::new(1, GameId::new(1), GameId::new(1));
        assert_eq!(game.board.occupied_count(), 0);
        assert_eq!(game.score_sheet_players[5], [0, 0, 0, 0, 0, 0, 0, 60]);
        assert_eq!(game.num_players(), 0);
        assert!(!game.expired);
    }

    #[test]
    fn test_game_player_entry() {
        let game = game();
        assert_eq!(game.player_id_to_username[&1], "bob");
        assert_eq!(game.player_id("alice"), Some(0));
        assert_eq!(game.player_join_order, vec!["alice", "bob"]);
        assert!(game.username_to_game_history["bob"].is_empty());
    }

    #[test]
    fn test_rejoin_keeps_join_order() {
        let mut game = game();
        game.apply_entry(&entry(json!({"_": "game-player", "game-id": 7, "player-id": 0, "username": "alice"})))
            .unwrap();
        assert_eq!(game.player_join_order, vec!["alice", "bob"]);
    }

    #[test]
    fn test_lifecycle_entry() {
        let mut game = game();
        game.apply_entry(&entry(json!({
            "_": "game", "game-id": 7, "state": "InProgress", "mode": "Teams",
            "max-players": 4, "begin": 100, "scores": [1, 2]
        })))
        .unwrap();
        assert_eq!(game.state.as_deref(), Some("InProgress"));
        assert_eq!(game.mode.as_deref(), Some("Teams"));
        assert_eq!(game.max_players, Some(4));
        assert_eq!(game.begin, Some(100));
        assert_eq!(game.score, Some(vec![1, 2]));
        assert_eq!(game.end, None);
    }

    #[test]
    fn test_tile_bag_entry() {
        let mut game = game();
        game.apply_entry(&entry(json!({"_": "game", "game-id": 7, "tile-bag": [[0, 1], [2, 3]]})))
            .unwrap();
        assert_eq!(game.tile_bag, Some(vec![Tile::new(0, 1), Tile::new(2, 3)]));
        assert_eq!(
            game.initial_tile_bag(&CorrectionTable::empty()),
            vec![Tile::new(0, 1), Tile::new(2, 3)]
        );
    }

    #[test]
    fn test_malformed_entry_field() {
        let mut game = game();
        let err = game
            .apply_entry(&entry(json!({"_": "game", "game-id": 7, "max-players": "four"})))
            .unwrap_err();
        assert!(matches!(err, HandlerError::MalformedEntry { field: "max-players", .. }));
    }

    #[test]
    fn test_off_board_tile_bag_rejected() {
        let mut game = game();
        let err = game
            .apply_entry(&entry(json!({"_": "game", "game-id": 7, "tile-bag": [[0, 1], [12, 0]]})))
            .unwrap_err();
        assert!(matches!(err, HandlerError::MalformedEntry { field: "tile-bag", .. }));
        assert_eq!(game.tile_bag, None);
    }

    #[test]
    fn test_board_cell_records_play_and_clears_rack() {
        let mut game = game();
        let tile = Tile::new(4, 2);
        game.set_tile(1, 3, tile).unwrap();

        game.set_board_cell(tile, GameBoardType::NothingYet.code());
        assert_eq!(game.played_tiles_order, vec![tile]);
        assert_eq!(game.tile_racks[1][3], None);

        // Re-setting an occupied cell is not a new play
        game.set_board_cell(tile, GameBoardType::Luxor.code());
        assert_eq!(game.played_tiles_order, vec![tile]);
        assert_eq!(game.board.get(tile), GameBoardType::Luxor.code());
    }

    #[test]
    fn test_set_tile_tracks_initial_and_additional() {
        let mut game = game();
        game.set_tile(0, 0, Tile::new(0, 0)).unwrap();
        game.set_tile(0, 0, Tile::new(1, 1)).unwrap();
        game.set_tile(0, 0, Tile::new(1, 1)).unwrap();

        assert_eq!(game.initial_tile_racks[0][0], Some(Tile::new(0, 0)));
        assert_eq!(game.additional_tile_rack_tiles_order, vec![Tile::new(1, 1)]);
        assert_eq!(game.tile_racks[0][0], Some(Tile::new(1, 1)));
        assert!(game.set_tile(0, 6, Tile::new(0, 0)).is_err());
        assert!(game.set_tile(6, 0, Tile::new(0, 0)).is_err());
    }

    #[test]
    fn test_score_sheet_cells() {
        let mut game = game();
        game.set_score_sheet_cell(1, 7, 55).unwrap();
        game.set_score_sheet_cell(6, 2, 4).unwrap();
        assert_eq!(game.score_sheet_players[1][7], 55);
        assert_eq!(game.score_sheet_chain_size[2], 4);
        assert!(game.set_score_sheet_cell(0, 8, 1).is_err());
        assert!(game.set_score_sheet_cell(6, 7, 1).is_err());
    }

    #[test]
    fn test_score_sheet_replace() {
        let mut game = game();
        game.set_score_sheet(&json!([[[1, 0, 0, 0, 0, 0, 0, 50]], [2, 0, 0, 0, 0, 0, 0]]))
            .unwrap();
        assert_eq!(game.score_sheet_players[0], [1, 0, 0, 0, 0, 0, 0, 50]);
        assert_eq!(game.score_sheet_players[1], INITIAL_SCORE_ROW);
        assert_eq!(game.score_sheet_chain_size[0], 2);
        assert!(game.set_score_sheet(&json!([[1, 2], []])).is_err());
    }

    #[test]
    fn test_position_draw_uses_username() {
        let mut game = game();
        let code = GameHistoryMessage::DrewPositionTile.code();
        game.push_history("alice", vec![json!(code), json!(1), json!(3), json!(4)])
            .unwrap();
        assert_eq!(
            game.username_to_game_history["alice"][0],
            vec![json!(code), json!("bob"), json!(3), json!(4)]
        );

        let err = game.push_history("alice", vec![json!(code), json!(5), json!(3), json!(4)]);
        assert!(matches!(err, Err(HandlerError::EmptySeat { player_id: 5, .. })));
    }

    #[test]
    fn test_game_params() {
        let mut game = game();
        assert_eq!(
            game.game_params(&CorrectionTable::empty()).unwrap_err(),
            SimError::MissingMode(GameId::new(7))
        );

        game.mode = Some("Singles".to_string());
        game.max_players = Some(4);
        let params = game.game_params(&CorrectionTable::empty()).unwrap();
        assert_eq!(params.mode, GameMode::Singles);
        assert_eq!(params.tile_bag.len(), 108);
        assert_eq!(game.mode_label().as_deref(), Some("Singles2"));
    }
}
