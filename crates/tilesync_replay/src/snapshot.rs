//! Binary snapshots of an observed game next to its simulated replay.
//!
//! A snapshot freezes both sides of one comparison so it can be rerun later
//! without the original log or the simulation.

use crate::diff::{CheckConfig, SyncReport, compare_with_server_game, make_server_game};
use crate::state::Game;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tilesync_core::{GameId, LogTimestamp};
use tilesync_sim::{ServerGame, ServerGameRecord, SimulationFactory};

/// Current snapshot layout
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// Snapshot error
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// CBOR encoding or decoding failed
    #[error("Snapshot encoding: {0}")]
    Encoding(#[from] serde_cbor::Error),

    /// Reading or writing the file failed
    #[error("Snapshot file {path}: {source}")]
    Io {
        /// File
        path: PathBuf,
        /// Cause
        source: std::io::Error,
    },

    /// Written by an incompatible version
    #[error("Snapshot format version mismatch: expected {expected}, got {actual}")]
    VersionMismatch {
        /// Supported version
        expected: u32,
        /// Version found
        actual: u32,
    },
}

/// Where and when a snapshot was taken
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    /// Timestamp of the log
    pub log_timestamp: LogTimestamp,
    /// Internal game id
    pub internal_game_id: GameId,
    /// Frame boundary the snapshot was taken at, if mid-log
    pub line_number: Option<usize>,
    /// Comparison outcome when taken
    pub synchronized: bool,
    /// Layout version
    pub format_version: u32,
}

/// Observed and simulated state of one game
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameSnapshot {
    /// Metadata
    pub metadata: SnapshotMetadata,
    /// Reconstructed client-side state
    pub observed: Game,
    /// Simulation state after the replay
    pub simulated: ServerGameRecord,
}

impl GameSnapshot {
    /// Capture a game and its simulation record
    #[must_use]
    pub fn capture(observed: &Game, simulated: ServerGameRecord, line_number: Option<usize>) -> Self {
        let simulated = simulated.with_log_metadata(observed.log_timestamp, observed.begin, observed.end);
        let synchronized = compare_with_server_game(observed, &simulated, false).synchronized;
        Self {
            metadata: SnapshotMetadata {
                log_timestamp: observed.log_timestamp,
                internal_game_id: observed.internal_game_id,
                line_number,
                synchronized,
                format_version: SNAPSHOT_FORMAT_VERSION,
            },
            observed: observed.clone(),
            simulated,
        }
    }

    /// `<ts>_<internal:05>_<line:06>.bin` mid-log, `<ts>_<internal:05>_<played:03>.bin` otherwise
    #[must_use]
    pub fn file_name(&self) -> String {
        let prefix = format!(
            "{}_{:05}",
            self.metadata.log_timestamp,
            self.metadata.internal_game_id.as_u64()
        );
        match self.metadata.line_number {
            Some(line_number) => format!("{prefix}_{line_number:06}.bin"),
            None => format!("{prefix}_{:03}.bin", self.observed.played_tiles_order.len()),
        }
    }

    /// Encode as CBOR
    ///
    /// # Errors
    ///
    /// Returns error if encoding fails
    pub fn encode(&self) -> Result<Vec<u8>, SnapshotError> {
        Ok(serde_cbor::to_vec(self)?)
    }

    /// Decode from CBOR
    ///
    /// # Errors
    ///
    /// Returns error if the bytes are not a snapshot of the current layout
    pub fn decode(bytes: &[u8]) -> Result<Self, SnapshotError> {
        let snapshot: Self = serde_cbor::from_slice(bytes)?;
        if snapshot.metadata.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(SnapshotError::VersionMismatch {
                expected: SNAPSHOT_FORMAT_VERSION,
                actual: snapshot.metadata.format_version,
            });
        }
        Ok(snapshot)
    }

    /// Write into `dir` under [`Self::file_name`]
    ///
    /// # Errors
    ///
    /// Returns error if encoding or writing fails
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf, SnapshotError> {
        let path = dir.join(self.file_name());
        let bytes = self.encode()?;
        fs::write(&path, bytes).map_err(|source| SnapshotError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }

    /// Read a snapshot file
    ///
    /// # Errors
    ///
    /// Returns error if reading or decoding fails
    pub fn read_file(path: &Path) -> Result<Self, SnapshotError> {
        let bytes = fs::read(path).map_err(|source| SnapshotError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::decode(&bytes)
    }

    /// Rerun the comparison on the stored states
    #[must_use]
    pub fn recheck(&self, verbose: bool) -> SyncReport {
        compare_with_server_game(&self.observed, &self.simulated, verbose)
    }
}

/// Which open games get frozen into snapshots.
///
/// A game qualifies while it is `InProgress` with at least two seated players.
/// In the newest log only expired games qualify, since the others may still
/// be running.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnapshotSelection {
    /// The games come from the newest log
    pub most_recent_log: bool,
}

impl SnapshotSelection {
    /// Selection for games of an older log
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the games as coming from the newest log
    #[must_use]
    pub fn most_recent_log(mut self, most_recent_log: bool) -> Self {
        self.most_recent_log = most_recent_log;
        self
    }

    /// True if the game should be snapshotted
    #[must_use]
    pub fn selects(&self, game: &Game) -> bool {
        game.state.as_deref() == Some("InProgress")
            && game.num_players() >= 2
            && (!self.most_recent_log || game.expired)
    }
}

/// Replay every selected game and write its snapshot into `dir`.
///
/// Games the simulation cannot replay are logged and skipped. Returns the
/// written paths in input order.
///
/// # Errors
///
/// Returns error if a snapshot cannot be encoded or written
pub fn snapshot_in_progress_games<'a, F: SimulationFactory>(
    games: impl IntoIterator<Item = &'a Game>,
    factory: &F,
    config: &CheckConfig,
    selection: SnapshotSelection,
    dir: &Path,
) -> Result<Vec<PathBuf>, SnapshotError> {
    let mut written = Vec::new();
    for game in games.into_iter().filter(|game| selection.selects(game)) {
        let server = match make_server_game(game, factory, &config.corrections) {
            Ok(server) => server,
            Err(err) => {
                tracing::warn!(internal_game_id = %game.internal_game_id, error = %err, "game not replayed");
                continue;
            }
        };
        let snapshot = GameSnapshot::capture(game, server.record(), None);
        written.push(snapshot.write_to(dir)?);
    }
    Ok(written)
}
