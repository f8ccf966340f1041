//! Minimal in-memory simulation for tests.
//!
//! Knows one action, placing a tile from the actor's rack, and deals racks
//! from the tail of the bag. Enough rules to drive the replay and comparison
//! paths end to end without the real game engine.

use crate::harness::{GameParams, ServerGame, ServerGameView, SimClient, SimError, SimulationFactory};
use crate::record::{ScoreSheetRecord, ServerGameRecord};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tilesync_core::{
    AddressedMessage, Board, ChainSizes, GameBoardType, GameHistoryMessage, ScoreRow, Tile,
    TileRack, CHAIN_COUNT, INITIAL_SCORE_ROW, RACK_SIZE,
};

/// Action id of the only action the fake understands: `[PLAY_TILE, x, y]`
pub const PLAY_TILE: i64 = 1;

/// Factory for [`FakeGame`]
#[derive(Debug, Clone, Copy, Default)]
pub struct FakeSimulation;

impl SimulationFactory for FakeSimulation {
    type Game = FakeGame;

    fn create(&self, params: GameParams) -> Result<FakeGame, SimError> {
        Ok(FakeGame::new(params))
    }
}

/// A game that deals racks and places tiles
#[derive(Debug, Clone)]
pub struct FakeGame {
    params: GameParams,
    bag: Vec<Tile>,
    board: Board,
    joined: Vec<String>,
    seats: BTreeMap<String, usize>,
    score_rows: BTreeMap<usize, ScoreRow>,
    racks: BTreeMap<usize, TileRack>,
    history: Vec<AddressedMessage>,
}

impl FakeGame {
    fn new(params: GameParams) -> Self {
        Self {
            bag: params.tile_bag.clone(),
            params,
            board: Board::new(),
            joined: Vec::new(),
            seats: BTreeMap::new(),
            score_rows: BTreeMap::new(),
            racks: BTreeMap::new(),
            history: Vec::new(),
        }
    }

    /// Usernames in the order they joined
    #[must_use]
    pub fn joined(&self) -> &[String] {
        &self.joined
    }

    fn draw_into(&mut self, player_id: usize, slot: usize) {
        let Some(tile) = self.bag.pop() else {
            return;
        };
        if let Some(rack) = self.racks.get_mut(&player_id) {
            rack[slot] = Some(tile);
        }
        self.history.push(AddressedMessage::new(
            Some(player_id),
            vec![
                json!(GameHistoryMessage::DrewTile.code()),
                json!(player_id),
                json!(tile.x),
                json!(tile.y),
            ],
        ));
    }
}

impl ServerGameView for FakeGame {
    fn board(&self) -> &Board {
        &self.board
    }

    fn score_sheet_players(&self) -> Vec<ScoreRow> {
        self.score_rows.values().copied().collect()
    }

    fn chain_sizes(&self) -> ChainSizes {
        [0; CHAIN_COUNT]
    }

    fn tile_racks(&self) -> Option<Vec<TileRack>> {
        Some(self.racks.values().copied().collect())
    }

    fn history_messages(&self) -> &[AddressedMessage] {
        &self.history
    }

    fn player_count(&self) -> usize {
        self.seats.len()
    }
}

impl ServerGame for FakeGame {
    fn join_game(&mut self, client: &SimClient) -> Result<(), SimError> {
        if self.seats.len() >= self.params.max_players {
            return Err(SimError::Rejected {
                operation: "join".to_string(),
                message: "game is full".to_string(),
            });
        }

        self.joined.push(client.username.clone());
        self.seats.insert(client.username.clone(), client.player_id);
        self.score_rows.insert(client.player_id, INITIAL_SCORE_ROW);
        self.racks.insert(client.player_id, [None; RACK_SIZE]);
        for slot in 0..RACK_SIZE {
            self.draw_into(client.player_id, slot);
        }
        Ok(())
    }

    fn do_game_action(
        &mut self,
        client: &SimClient,
        action_id: i64,
        data: &[Value],
    ) -> Result<(), SimError> {
        let rejected = |message: &str| SimError::Rejected {
            operation: format!("action {action_id}"),
            message: message.to_string(),
        };

        if action_id != PLAY_TILE {
            return Err(rejected("unknown action"));
        }
        let coordinate = |index: usize| data.get(index).and_then(Value::as_i64);
        let (Some(x), Some(y)) = (coordinate(0), coordinate(1)) else {
            return Err(rejected("missing coordinate"));
        };
        let tile = Tile::try_new(x, y).map_err(|err| rejected(&err.to_string()))?;

        let player_id = client.player_id;
        let slot = self
            .racks
            .get(&player_id)
            .and_then(|rack| rack.iter().position(|entry| *entry == Some(tile)));

        self.board.set(tile, GameBoardType::NothingYet.code());
        self.history.push(AddressedMessage::new(
            None,
            vec![
                json!(GameHistoryMessage::PlayedTile.code()),
                json!(player_id),
                json!(tile.x),
                json!(tile.y),
            ],
        ));

        if let Some(slot) = slot {
            if let Some(rack) = self.racks.get_mut(&player_id) {
                rack[slot] = None;
            }
            self.draw_into(player_id, slot);
        }
        Ok(())
    }

    fn record(&self) -> ServerGameRecord {
        let mut record = ServerGameRecord::new(self.params.game_id, self.params.internal_game_id);
        record.mode = self.params.mode.code();
        record.max_players = self.params.max_players;
        record.num_players = self.seats.len();
        record.tile_bag = self.bag.clone();
        record.history_messages = self.history.clone();
        record.game_board = self.board.clone();
        record.score_sheet = ScoreSheetRecord {
            player_data: self.score_sheet_players(),
            username_to_player_id: self.seats.clone(),
            creator_username: self.joined.first().cloned(),
            ..ScoreSheetRecord::default()
        };
        record.tile_racks = self.tile_racks();
        record
    }
}
