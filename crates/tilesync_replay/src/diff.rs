//! Differential comparison of an observed game against a simulation replay.

use crate::state::Game;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tilesync_core::{GameId, HistoryMessage, LogTimestamp};
use tilesync_sim::{CorrectionTable, ServerGameView, SimError, SimulationFactory};

/// Comparison settings
#[derive(Debug, Clone, PartialEq)]
pub struct CheckConfig {
    /// Record every compared value, not only the differences
    pub verbose: bool,
    /// Bag corrections for known mis-inferred games
    pub corrections: CorrectionTable,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            corrections: CorrectionTable::historical(),
        }
    }
}

impl CheckConfig {
    /// Default settings
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record every compared value
    #[must_use]
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Replace the correction table
    #[must_use]
    pub fn with_corrections(mut self, corrections: CorrectionTable) -> Self {
        self.corrections = corrections;
        self
    }
}

/// A compared field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncField {
    /// Board grid
    Board,
    /// Player-visible score-sheet rows
    ScoreSheetPlayers,
    /// Chain-size row
    ScoreSheetChainSize,
    /// Tile racks
    TileRacks,
    /// Per-player history
    PlayerIdToGameHistory,
}

impl SyncField {
    /// Name used in sync logs
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Board => "board",
            Self::ScoreSheetPlayers => "score_sheet_players",
            Self::ScoreSheetChainSize => "score_sheet_chain_size",
            Self::TileRacks => "tile_racks",
            Self::PlayerIdToGameHistory => "player_id_to_game_history",
        }
    }
}

/// One mismatch between observed and simulated state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDiff {
    /// Field
    pub field: SyncField,
    /// Player the mismatch is isolated to, for racks and history
    pub player_id: Option<usize>,
    /// Observed value
    pub observed: Value,
    /// Simulated value
    pub simulated: Value,
}

/// Outcome of comparing one game
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncReport {
    /// Timestamp of the log
    pub log_timestamp: LogTimestamp,
    /// Internal game id
    pub internal_game_id: GameId,
    /// Tiles on the observed board
    pub played_tiles: usize,
    /// True if every field matched
    pub synchronized: bool,
    /// Every mismatch
    pub diffs: Vec<FieldDiff>,
    /// Human-readable log of the comparison
    pub sync_log: Vec<String>,
}

impl SyncReport {
    /// `<ts>_<internal:05>_<played:03>_sync_log.txt`
    #[must_use]
    pub fn file_name(&self) -> String {
        format!(
            "{}_{:05}_{:03}_sync_log.txt",
            self.log_timestamp,
            self.internal_game_id.as_u64(),
            self.played_tiles
        )
    }

    /// Write the sync log into `dir`, one entry per line
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be written
    pub fn write_sync_log(&self, dir: &Path) -> io::Result<PathBuf> {
        let path = dir.join(self.file_name());
        let mut text = self.sync_log.join("\n");
        text.push('\n');
        fs::write(&path, text)?;
        Ok(path)
    }
}

/// Replay an observed game through a fresh simulation
///
/// # Errors
///
/// Returns error if the game lacks its mode or seat count, or the simulation
/// refuses to create or seat it
pub fn make_server_game<F: SimulationFactory>(
    game: &Game,
    factory: &F,
    corrections: &CorrectionTable,
) -> Result<F::Game, SimError> {
    let params = game.game_params(corrections)?;
    tilesync_sim::make_server_game(factory, params, game.replay_script())
}

/// Compare an observed game with a simulation's state
pub fn compare_with_server_game(
    game: &Game,
    server: &impl ServerGameView,
    verbose: bool,
) -> SyncReport {
    let mut comparison = Comparison {
        verbose,
        diffs: Vec::new(),
        sync_log: Vec::new(),
    };

    comparison.compare(SyncField::Board, game.board.cells(), server.board().cells());
    comparison.compare(
        SyncField::ScoreSheetPlayers,
        game.seated_score_rows(),
        server.score_sheet_players().as_slice(),
    );
    comparison.compare(
        SyncField::ScoreSheetChainSize,
        &game.score_sheet_chain_size,
        &server.chain_sizes(),
    );
    if let Some(server_racks) = server.tile_racks() {
        comparison.compare_racks(game, &server_racks);
    }
    comparison.compare_histories(game, server);

    SyncReport {
        log_timestamp: game.log_timestamp,
        internal_game_id: game.internal_game_id,
        played_tiles: game.played_tiles_order.len(),
        synchronized: comparison.diffs.is_empty(),
        diffs: comparison.diffs,
        sync_log: comparison.sync_log,
    }
}

/// Replay a game and compare the result
///
/// # Errors
///
/// Returns error if the game cannot be replayed
pub fn check_game<F: SimulationFactory>(
    game: &Game,
    factory: &F,
    config: &CheckConfig,
) -> Result<(F::Game, SyncReport), SimError> {
    let server = make_server_game(game, factory, &config.corrections)?;
    let report = compare_with_server_game(game, &server, config.verbose);
    if report.synchronized {
        tracing::debug!(log_timestamp = game.log_timestamp, internal_game_id = %game.internal_game_id, "synchronized");
    } else {
        tracing::info!(
            log_timestamp = game.log_timestamp,
            internal_game_id = %game.internal_game_id,
            diffs = report.diffs.len(),
            "desynchronized"
        );
    }
    Ok((server, report))
}

/// Simulated history of each seat; broadcasts reach everyone
#[must_use]
pub fn server_histories(server: &impl ServerGameView) -> Vec<Vec<HistoryMessage>> {
    let mut histories = vec![Vec::new(); server.player_count()];
    for addressed in server.history_messages() {
        match addressed.player_id {
            None => {
                for history in &mut histories {
                    history.push(addressed.message.clone());
                }
            }
            Some(player_id) => {
                if let Some(history) = histories.get_mut(player_id) {
                    history.push(addressed.message.clone());
                }
            }
        }
    }
    histories
}

struct Comparison {
    verbose: bool,
    diffs: Vec<FieldDiff>,
    sync_log: Vec<String>,
}

impl Comparison {
    fn compare<T>(&mut self, field: SyncField, observed: &T, simulated: &T)
    where
        T: PartialEq + Serialize + ?Sized,
    {
        if self.verbose {
            self.sync_log.push(format!("{}: {}", field.name(), to_value(observed)));
        }
        if observed != simulated {
            self.sync_log.push(format!("{} diff!", field.name()));
            self.push_diff(field, None, to_value(observed), to_value(simulated));
        }
    }

    fn compare_racks(&mut self, game: &Game, server_racks: &[tilesync_core::TileRack]) {
        let field = SyncField::TileRacks;
        let observed = game.seated_tile_racks();
        if self.verbose {
            self.sync_log.push(format!("{}: {}", field.name(), to_value(observed)));
        }
        if observed == server_racks {
            return;
        }

        let mut isolated = false;
        for (player_id, (ours, theirs)) in observed.iter().zip(server_racks).enumerate() {
            if ours != theirs {
                isolated = true;
                self.sync_log
                    .push(format!("{} diff for player_id {player_id}!", field.name()));
                self.push_diff(field, Some(player_id), to_value(ours), to_value(theirs));
            }
        }
        // Same prefix, different seat counts
        if !isolated {
            self.sync_log.push(format!("{} diff!", field.name()));
            self.push_diff(field, None, to_value(observed), to_value(server_racks));
        }
    }

    fn compare_histories(&mut self, game: &Game, server: &impl ServerGameView) {
        let field = SyncField::PlayerIdToGameHistory;
        let observed = game.player_histories();
        let simulated = server_histories(server);

        if self.verbose {
            self.sync_log.push(format!("{}:", field.name()));
            for history in &observed {
                self.sync_log.push(to_value(history).to_string());
            }
        }

        for (player_id, (ours, theirs)) in observed.iter().zip(&simulated).enumerate() {
            let delivered = &theirs[..theirs.len().min(ours.len())];
            if *ours != delivered {
                self.sync_log
                    .push(format!("{} diff for player_id {player_id}!", field.name()));
                self.push_diff(field, Some(player_id), to_value(ours), to_value(delivered));
            }
        }
    }

    fn push_diff(&mut self, field: SyncField, player_id: Option<usize>, observed: Value, simulated: Value) {
        self.sync_log.push(observed.to_string());
        self.sync_log.push(simulated.to_string());
        self.diffs.push(FieldDiff {
            field,
            player_id,
            observed,
            simulated,
        });
    }
}

/// Render a compared value for the sync log; never used for equality
fn to_value<T: Serialize + ?Sized>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|err| Value::String(format!("<unrenderable: {err}>")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tilesync_core::{AddressedMessage, GameBoardType, Tile};
    use tilesync_sim::ServerGameRecord;
    use tilesync_sim::fake::{FakeSimulation, PLAY_TILE};

    fn observed() -> Game {
        let mut game = Game::new(1_500_000_000, GameId::new(2), GameId::new(2));
        game.mode = Some("Singles".to_string());
        game.max_players = Some(4);
        game.player_id_to_username.insert(0, "alice".to_string());
        game.username_to_player_id.insert("alice".to_string(), 0);
        game.player_join_order.push("alice".to_string());
        game.username_to_game_history.insert("alice".to_string(), Vec::new());
        game
    }

    fn record_for(game: &Game) -> ServerGameRecord {
        let mut record = ServerGameRecord::new(game.game_id, game.internal_game_id);
        record.game_board = game.board.clone();
        record.score_sheet.player_data = game.seated_score_rows().to_vec();
        record.score_sheet.chain_size = game.score_sheet_chain_size;
        record.score_sheet.username_to_player_id = game.username_to_player_id.clone();
        record.tile_racks = Some(game.seated_tile_racks().to_vec());
        record
    }

    /// Compares by value but refuses to serialize
    #[derive(PartialEq)]
    struct Unrenderable(u8);

    impl Serialize for Unrenderable {
        fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("no rendering"))
        }
    }

    #[test]
    fn test_difference_found_without_rendering() {
        let mut comparison = Comparison {
            verbose: false,
            diffs: Vec::new(),
            sync_log: Vec::new(),
        };
        comparison.compare(SyncField::Board, &Unrenderable(1), &Unrenderable(1));
        assert!(comparison.diffs.is_empty());

        comparison.compare(SyncField::Board, &Unrenderable(1), &Unrenderable(2));
        assert_eq!(comparison.diffs.len(), 1);
        assert_ne!(comparison.diffs[0].observed, Value::Null);
        assert_eq!(comparison.sync_log[0], "board diff!");
    }

    #[test]
    fn test_identical_state_is_synchronized() {
        let game = observed();
        let report = compare_with_server_game(&game, &record_for(&game), false);
        assert!(report.synchronized);
        assert!(report.diffs.is_empty());
        assert!(report.sync_log.is_empty());
    }

    #[test]
    fn test_verbose_records_every_field() {
        let game = observed();
        let report = compare_with_server_game(&game, &record_for(&game), true);
        assert!(report.synchronized);
        assert!(report.sync_log[0].starts_with("board: [["));
        assert!(report.sync_log.contains(&"player_id_to_game_history:".to_string()));
        assert_eq!(report.sync_log.last().map(String::as_str), Some("[]"));
    }

    #[test]
    fn test_board_diff() {
        let game = observed();
        let mut record = record_for(&game);
        record.game_board.set(Tile::new(0, 0), GameBoardType::NothingYet.code());

        let report = compare_with_server_game(&game, &record, false);
        assert!(!report.synchronized);
        assert_eq!(report.diffs.len(), 1);
        assert_eq!(report.diffs[0].field, SyncField::Board);
        assert_eq!(report.sync_log[0], "board diff!");
        assert_eq!(report.sync_log.len(), 3);
    }

    #[test]
    fn test_rack_diff_isolated_per_player() {
        let mut game = observed();
        game.tile_racks[0][0] = Some(Tile::new(1, 1));
        let record = record_for(&observed());

        let report = compare_with_server_game(&game, &record, false);
        assert_eq!(report.diffs.len(), 1);
        assert_eq!(report.diffs[0].player_id, Some(0));
        assert_eq!(report.sync_log[0], "tile_racks diff for player_id 0!");
        assert_eq!(report.sync_log[1], "[[1,1],null,null,null,null,null]");
        assert_eq!(report.sync_log[2], "[null,null,null,null,null,null]");
    }

    #[test]
    fn test_absent_racks_not_compared() {
        let mut game = observed();
        game.tile_racks[0][0] = Some(Tile::new(1, 1));
        let mut record = record_for(&observed());
        record.tile_racks = None;
        assert!(compare_with_server_game(&game, &record, false).synchronized);
    }

    #[test]
    fn test_history_prefix_and_broadcast() {
        let mut game = observed();
        game.username_to_game_history
            .insert("alice".to_string(), vec![vec![json!(0)]]);

        let mut record = record_for(&game);
        record.history_messages = vec![
            AddressedMessage::new(None, vec![json!(0)]),
            AddressedMessage::new(Some(0), vec![json!(3), json!(0), json!(1), json!(1)]),
        ];
        // The simulation produced more than was delivered
        assert!(compare_with_server_game(&game, &record, false).synchronized);

        record.history_messages = vec![AddressedMessage::new(Some(0), vec![json!(5)])];
        let report = compare_with_server_game(&game, &record, false);
        assert_eq!(report.diffs[0].field, SyncField::PlayerIdToGameHistory);
        assert_eq!(report.sync_log[0], "player_id_to_game_history diff for player_id 0!");
    }

    #[test]
    fn test_check_game_against_fake() {
        let mut game = observed();
        game.tile_bag = Some(Tile::all().collect());
        let (server, report) = check_game(&game, &FakeSimulation, &CheckConfig::default()).unwrap();
        assert_eq!(server.joined(), ["alice".to_string()]);
        // The fake dealt a rack the observed game never saw
        assert!(!report.synchronized);
        assert!(report.diffs.iter().any(|diff| diff.field == SyncField::TileRacks));

        game.record_action(0, vec![json!(PLAY_TILE), json!(0), json!(0)]);
        let (server, _) = check_game(&game, &FakeSimulation, &CheckConfig::default()).unwrap();
        assert_eq!(server.board().get(Tile::new(0, 0)), GameBoardType::NothingYet.code());
    }

    #[test]
    fn test_check_game_requires_mode() {
        let mut game = observed();
        game.mode = None;
        assert!(matches!(
            check_game(&game, &FakeSimulation, &CheckConfig::default()),
            Err(SimError::MissingMode(_))
        ));
    }

    #[test]
    fn test_sync_log_file() {
        let game = observed();
        let mut record = record_for(&game);
        record.game_board.set(Tile::new(0, 0), GameBoardType::NothingYet.code());
        let report = compare_with_server_game(&game, &record, false);
        assert_eq!(report.file_name(), "1500000000_00002_000_sync_log.txt");

        let dir = tempfile::tempdir().unwrap();
        let path = report.write_sync_log(dir.path()).unwrap();
        let text = fs::read_to_string(path).unwrap();
        assert!(text.starts_with("board diff!\n"));
        assert!(text.ends_with('\n'));
    }
}
