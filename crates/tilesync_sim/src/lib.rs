//! tilesync simulation boundary
//!
//! Rebuilds the hidden initial tile bag of a logged game and replays the game
//! through a reference simulation supplied by the caller. Bag shuffles are
//! reproducible from the game's log timestamp and internal id.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bag;
pub mod harness;
pub mod record;
pub mod seed;

#[cfg(any(test, feature = "testing"))]
pub mod fake;

pub use bag::{
    BagCorrection, CorrectionTable, TileBag, TileBagInferencer, TurnDraws, observed_draw_order,
    turn_draws,
};
pub use harness::{
    GameParams, RecordedAction, ReplayScript, ServerGame, ServerGameView, SimClient, SimError,
    SimulationFactory, make_server_game,
};
pub use record::{ScoreSheetRecord, ServerGameRecord};
pub use seed::{SeedSource, SimSeed, game_label};
