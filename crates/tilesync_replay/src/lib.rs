//! tilesync replay
//!
//! Rebuilds every game of a server log as its clients saw it, replays it
//! through a reference simulation and reports where the two disagree. Also
//! cuts logs into per-game fixtures and summarizes batches of results.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod diff;
pub mod engine;
pub mod error;
pub mod identity;
pub mod report;
pub mod slice;
pub mod snapshot;
pub mod state;

pub use diff::{
    CheckConfig, FieldDiff, SyncField, SyncReport, check_game, compare_with_server_game,
    make_server_game, server_histories,
};
pub use engine::{GameStream, Reconstructor, reconstruct_games};
pub use error::HandlerError;
pub use identity::{IdentityMap, RoutingEffect, routing_effect};
pub use report::{
    BonusBucket, FULLY_UNKNOWN_RACK, FirstMergeBonusTable, FirstMergeBonuses, RankingDistribution,
    RankingMode, ReportError, SyncLogName, SyncLogTriage, first_merge_bonuses, player_rankings,
    triage_sync_logs,
};
pub use slice::{GameLogSlicer, SliceConfig, SlicedGameLog, slice_games};
pub use snapshot::{
    GameSnapshot, SNAPSHOT_FORMAT_VERSION, SnapshotError, SnapshotMetadata, SnapshotSelection,
    snapshot_in_progress_games,
};
pub use state::Game;
