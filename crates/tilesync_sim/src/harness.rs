//! Boundary to the reference game simulation and the replay driver.
//!
//! The simulation's rules are not implemented here. A caller supplies them
//! through [`SimulationFactory`]; this module only knows how to admit the
//! observed players and feed the observed actions back in.

use crate::record::ServerGameRecord;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tilesync_core::{
    AddressedMessage, Board, ChainSizes, ClientId, GameId, GameMode, ScoreRow, Tile, TileRack,
};

/// Simulation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SimError {
    /// The game has no recorded mode
    #[error("Game {0} has no mode")]
    MissingMode(GameId),

    /// The recorded mode is not a known mode name
    #[error("Game {game_id} has unknown mode {mode:?}")]
    UnknownMode {
        /// Internal game id
        game_id: GameId,
        /// Recorded mode
        mode: String,
    },

    /// The game has no recorded seat count
    #[error("Game {0} has no max-players")]
    MissingMaxPlayers(GameId),

    /// A joining username has no seat
    #[error("Username {0:?} joined but has no player id")]
    UnknownPlayer(String),

    /// The simulation rejected an operation
    #[error("Simulation rejected {operation}: {message}")]
    Rejected {
        /// What was attempted
        operation: String,
        /// Simulation's explanation
        message: String,
    },
}

/// Construction parameters for one simulated game
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameParams {
    /// External game id
    pub game_id: GameId,
    /// Internal game id
    pub internal_game_id: GameId,
    /// Mode
    pub mode: GameMode,
    /// Seats
    pub max_players: usize,
    /// Initial bag, drawn from the tail
    pub tile_bag: Vec<Tile>,
    /// Whether the simulation should write its own log
    pub logging_enabled: bool,
}

/// A simulated connection standing in for one seated player
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimClient {
    /// Client id, always the player id plus one
    pub client_id: ClientId,
    /// Username
    pub username: String,
    /// Seat
    pub player_id: usize,
}

impl SimClient {
    /// Client for a seat
    #[must_use]
    pub fn for_player(player_id: usize, username: impl Into<String>) -> Self {
        Self {
            client_id: ClientId::new(player_id as u64 + 1),
            username: username.into(),
            player_id,
        }
    }
}

/// An observed game action: the acting seat and the action payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedAction {
    /// Acting seat
    pub player_id: usize,
    /// Action id followed by its data
    pub action: Vec<Value>,
}

impl RecordedAction {
    /// Create a recorded action
    #[must_use]
    pub fn new(player_id: usize, action: Vec<Value>) -> Self {
        Self { player_id, action }
    }

    /// Action id, if the payload starts with one
    #[must_use]
    pub fn action_id(&self) -> Option<i64> {
        self.action.first().and_then(Value::as_i64)
    }

    /// Payload after the action id
    #[must_use]
    pub fn data(&self) -> &[Value] {
        self.action.get(1..).unwrap_or(&[])
    }
}

/// Read-only view of a simulated game's comparable state
pub trait ServerGameView {
    /// Board
    fn board(&self) -> &Board;

    /// Client-visible part of every player row
    fn score_sheet_players(&self) -> Vec<ScoreRow>;

    /// Chain sizes
    fn chain_sizes(&self) -> ChainSizes;

    /// Tile racks, or `None` once the simulation no longer tracks them
    fn tile_racks(&self) -> Option<Vec<TileRack>>;

    /// Every history message with its addressee, in production order
    fn history_messages(&self) -> &[AddressedMessage];

    /// Seated players
    fn player_count(&self) -> usize;
}

/// A running reference simulation
pub trait ServerGame: ServerGameView {
    /// Seat a player
    ///
    /// # Errors
    ///
    /// Returns error if the simulation refuses the player
    fn join_game(&mut self, client: &SimClient) -> Result<(), SimError>;

    /// Apply a game action on behalf of a player
    ///
    /// # Errors
    ///
    /// Returns error if the simulation cannot process the action at all
    fn do_game_action(
        &mut self,
        client: &SimClient,
        action_id: i64,
        data: &[Value],
    ) -> Result<(), SimError>;

    /// Capture the full state as a record
    fn record(&self) -> ServerGameRecord;
}

/// Builds fresh simulations
pub trait SimulationFactory {
    /// Simulation type
    type Game: ServerGame;

    /// Construct a simulation
    ///
    /// # Errors
    ///
    /// Returns error if the parameters are unacceptable
    fn create(&self, params: GameParams) -> Result<Self::Game, SimError>;
}

/// Everything the replay needs from an observed game
#[derive(Debug, Clone, Copy)]
pub struct ReplayScript<'a> {
    /// Seat to username
    pub players: &'a BTreeMap<usize, String>,
    /// Usernames in the order they first joined
    pub join_order: &'a [String],
    /// Observed actions in order
    pub actions: &'a [RecordedAction],
}

/// Replay an observed game through a fresh simulation.
///
/// Players are admitted in their original join order, which decides the
/// simulation's starting racks, then every action is applied in order. An
/// action the simulation rejects is logged and skipped; the resulting
/// divergence is for the comparison to report.
///
/// # Errors
///
/// Returns error if the simulation cannot be created or a player cannot be seated
pub fn make_server_game<F: SimulationFactory>(
    factory: &F,
    params: GameParams,
    script: ReplayScript<'_>,
) -> Result<F::Game, SimError> {
    let internal_game_id = params.internal_game_id;
    let mut game = factory.create(params)?;

    let clients: BTreeMap<usize, SimClient> = script
        .players
        .iter()
        .map(|(player_id, username)| (*player_id, SimClient::for_player(*player_id, username.clone())))
        .collect();
    let by_username: BTreeMap<&str, &SimClient> = clients
        .values()
        .map(|client| (client.username.as_str(), client))
        .collect();

    for username in script.join_order {
        let client = by_username
            .get(username.as_str())
            .ok_or_else(|| SimError::UnknownPlayer(username.clone()))?;
        game.join_game(client)?;
    }

    for (index, recorded) in script.actions.iter().enumerate() {
        let Some(client) = clients.get(&recorded.player_id) else {
            tracing::warn!(%internal_game_id, index, player_id = recorded.player_id, "action from unseated player");
            continue;
        };
        let Some(action_id) = recorded.action_id() else {
            tracing::warn!(%internal_game_id, index, "action without an action id");
            continue;
        };
        if let Err(err) = game.do_game_action(client, action_id, recorded.data()) {
            tracing::warn!(%internal_game_id, index, error = %err, "simulation rejected action");
        }
    }

    Ok(game)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{FakeSimulation, PLAY_TILE};
    use serde_json::json;

    fn params() -> GameParams {
        GameParams {
            game_id: GameId::new(1),
            internal_game_id: GameId::new(7),
            mode: GameMode::Singles,
            max_players: 4,
            tile_bag: Tile::all().collect(),
            logging_enabled: false,
        }
    }

    #[test]
    fn test_sim_client_id_is_player_plus_one() {
        let client = SimClient::for_player(2, "carol");
        assert_eq!(client.client_id, ClientId::new(3));
        assert_eq!(client.player_id, 2);
    }

    #[test]
    fn test_recorded_action_parts() {
        let action = RecordedAction::new(0, vec![json!(PLAY_TILE), json!(3), json!(4)]);
        assert_eq!(action.action_id(), Some(PLAY_TILE));
        assert_eq!(action.data(), &[json!(3), json!(4)]);
        assert!(RecordedAction::new(0, vec![]).action_id().is_none());
    }

    #[test]
    fn test_players_join_in_join_order() {
        let players = BTreeMap::from([(0, "alice".to_string()), (1, "bob".to_string())]);
        let join_order = vec!["bob".to_string(), "alice".to_string()];
        let script = ReplayScript {
            players: &players,
            join_order: &join_order,
            actions: &[],
        };

        let game = make_server_game(&FakeSimulation, params(), script).unwrap();
        assert_eq!(game.joined(), &["bob".to_string(), "alice".to_string()]);
        assert_eq!(game.player_count(), 2);
    }

    #[test]
    fn test_unknown_joiner_is_error() {
        let players = BTreeMap::from([(0, "alice".to_string())]);
        let join_order = vec!["mallory".to_string()];
        let script = ReplayScript {
            players: &players,
            join_order: &join_order,
            actions: &[],
        };

        let err = make_server_game(&FakeSimulation, params(), script).err();
        assert_eq!(err, Some(SimError::UnknownPlayer("mallory".to_string())));
    }

    #[test]
    fn test_actions_replayed_and_bad_ones_skipped() {
        let players = BTreeMap::from([(0, "alice".to_string())]);
        let join_order = vec!["alice".to_string()];
        let actions = vec![
            RecordedAction::new(0, vec![json!(PLAY_TILE), json!(2), json!(3)]),
            RecordedAction::new(5, vec![json!(PLAY_TILE), json!(4), json!(4)]),
            RecordedAction::new(0, vec![json!(PLAY_TILE), json!("x")]),
            RecordedAction::new(0, vec![json!(PLAY_TILE), json!(5), json!(5)]),
        ];
        let script = ReplayScript {
            players: &players,
            join_order: &join_order,
            actions: &actions,
        };

        let game = make_server_game(&FakeSimulation, params(), script).unwrap();
        assert_eq!(game.board().occupied_count(), 2);
        assert!(!game.board().is_empty_at(Tile::new(2, 3)));
        assert!(game.board().is_empty_at(Tile::new(4, 4)));
    }
}
