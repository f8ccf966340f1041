//! Hidden tile-bag inference.
//!
//! The server never logs its shuffled tile bag. What the log does carry is,
//! per player, the history messages announcing each tile that player drew or
//! had replaced. Walking those draws turn by turn recovers the front of the
//! bag; tiles nobody was seen drawing are shuffled deterministically behind
//! them. The result is reversed because the simulation draws from the tail.

use crate::seed::SimSeed;
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tilesync_core::{GameHistoryMessage, GameId, HistoryMessage, LogTimestamp, Tile};

/// The server's private draw order
pub type TileBag = Vec<Tile>;

/// Tiles one player drew or had replaced, split by turn
pub type TurnDraws = Vec<Vec<Tile>>;

/// One manual fix to the inferred bag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BagCorrection {
    /// Position the tile is inserted at
    pub position: usize,
    /// Tile to insert; `None` picks one of the unseen tiles at random
    pub tile: Option<Tile>,
}

impl BagCorrection {
    /// Insert a specific tile
    #[must_use]
    pub const fn insert(position: usize, x: u8, y: u8) -> Self {
        Self {
            position,
            tile: Some(Tile::new(x, y)),
        }
    }

    /// Insert a random unseen tile
    #[must_use]
    pub const fn insert_random(position: usize) -> Self {
        Self {
            position,
            tile: None,
        }
    }
}

/// Manual corrections for games whose bag the turn heuristic gets wrong
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorrectionTable {
    entries: BTreeMap<(LogTimestamp, GameId), Vec<BagCorrection>>,
}

impl CorrectionTable {
    /// Table with no corrections
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Corrections worked out by hand for historical games
    #[must_use]
    pub fn historical() -> Self {
        let mut table = Self::empty();
        let fixes: [(LogTimestamp, u64, &[BagCorrection]); 10] = [
            (1_414_827_614, 43, &[BagCorrection::insert(34, 1, 5)]),
            (1_415_355_783, 106, &[BagCorrection::insert(68, 11, 1)]),
            (1_421_578_193, 3366, &[BagCorrection::insert(80, 9, 6)]),
            (1_427_270_069, 3903, &[BagCorrection::insert(53, 0, 8)]),
            (1_430_041_771, 1330, &[BagCorrection::insert(63, 0, 8)]),
            (1_432_033_655, 1965, &[BagCorrection::insert(91, 5, 5)]),
            (1_433_241_253, 1336, &[BagCorrection::insert(69, 7, 5)]),
            (1_433_837_429, 1110, &[BagCorrection::insert(73, 7, 1)]),
            (
                1_435_226_336,
                3165,
                &[BagCorrection::insert(88, 2, 7), BagCorrection::insert(89, 11, 3)],
            ),
            (1_435_226_336, 5690, &[BagCorrection::insert(101, 10, 7)]),
        ];
        for (log_timestamp, internal_game_id, corrections) in fixes {
            table.insert(log_timestamp, GameId::new(internal_game_id), corrections.to_vec());
        }
        table
    }

    /// Add or replace the corrections for one game
    pub fn insert(
        &mut self,
        log_timestamp: LogTimestamp,
        internal_game_id: GameId,
        corrections: Vec<BagCorrection>,
    ) {
        self.entries
            .insert((log_timestamp, internal_game_id), corrections);
    }

    /// Corrections for one game, in application order
    #[must_use]
    pub fn get(&self, log_timestamp: LogTimestamp, internal_game_id: GameId) -> &[BagCorrection] {
        self.entries
            .get(&(log_timestamp, internal_game_id))
            .map_or(&[], Vec::as_slice)
    }

    /// Games with corrections, in key order
    pub fn games(&self) -> impl Iterator<Item = (LogTimestamp, GameId)> + '_ {
        self.entries.keys().copied()
    }

    /// Number of corrected games
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no game is corrected
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Split one player's history into tiles drawn or replaced per turn.
///
/// A turn-began message closes the current turn. Whatever was drawn after the
/// last one forms a final, possibly empty, turn. Draw messages whose tile does
/// not decode are skipped.
#[must_use]
pub fn turn_draws(history: &[HistoryMessage]) -> TurnDraws {
    let mut turns = Vec::new();
    let mut current = Vec::new();

    for message in history {
        let kind = message
            .first()
            .and_then(serde_json::Value::as_i64)
            .and_then(GameHistoryMessage::from_code);
        match kind {
            Some(kind) if kind.is_draw_or_replace() => match message_tile(message) {
                Some(tile) => current.push(tile),
                None => tracing::debug!(?message, "draw message without a tile"),
            },
            Some(GameHistoryMessage::TurnBegan) => turns.push(std::mem::take(&mut current)),
            _ => {}
        }
    }
    turns.push(current);

    turns
}

fn message_tile(message: &HistoryMessage) -> Option<Tile> {
    let x = message.get(2)?.as_i64()?;
    let y = message.get(3)?.as_i64()?;
    Tile::try_new(x, y).ok()
}

/// Observed draw order, before corrections and the shuffled remainder.
///
/// Turns are walked in lock-step across players. Within a turn the player
/// with more draws goes first, since that is almost always the player whose
/// turn it was; ties keep the order players were given in. A tile already
/// placed is not placed again.
#[must_use]
pub fn observed_draw_order(players: &[TurnDraws]) -> TileBag {
    let turn_count = players.iter().map(Vec::len).max().unwrap_or(0);
    let mut seen = BTreeSet::new();
    let mut order = Vec::new();

    for turn in 0..turn_count {
        let mut contributing: Vec<&Vec<Tile>> = players
            .iter()
            .filter_map(|turns| turns.get(turn))
            .filter(|tiles| !tiles.is_empty())
            .collect();
        contributing.sort_by(|a, b| b.len().cmp(&a.len()));

        for tile in contributing.into_iter().flatten() {
            if seen.insert(*tile) {
                order.push(*tile);
            }
        }
    }

    order
}

/// Rebuilds a game's initial tile bag
#[derive(Debug, Clone)]
pub struct TileBagInferencer<'a> {
    corrections: &'a CorrectionTable,
}

impl<'a> TileBagInferencer<'a> {
    /// Inferencer applying `corrections`
    #[must_use]
    pub fn new(corrections: &'a CorrectionTable) -> Self {
        Self { corrections }
    }

    /// Infer the bag from per-player histories, given in player-id order.
    ///
    /// Always returns a permutation of the 108 tiles. The same inputs always
    /// produce the same bag.
    #[must_use]
    pub fn infer(
        &self,
        log_timestamp: LogTimestamp,
        internal_game_id: GameId,
        histories: &[&[HistoryMessage]],
    ) -> TileBag {
        let players: Vec<TurnDraws> = histories.iter().map(|history| turn_draws(history)).collect();
        let mut bag = observed_draw_order(&players);

        let placed: BTreeSet<Tile> = bag.iter().copied().collect();
        let mut remaining: BTreeSet<Tile> = Tile::all().filter(|tile| !placed.contains(tile)).collect();
        let mut rng = SimSeed::for_game(log_timestamp, internal_game_id).rng();

        for correction in self.corrections.get(log_timestamp, internal_game_id) {
            if bag.len() < correction.position {
                continue;
            }

            let tile = match correction.tile {
                Some(tile) if remaining.contains(&tile) => tile,
                Some(tile) => {
                    tracing::warn!(
                        %internal_game_id,
                        %tile,
                        position = correction.position,
                        "skipping correction for a tile already in the bag"
                    );
                    continue;
                }
                None => {
                    let pool: Vec<Tile> = remaining.iter().copied().collect();
                    if pool.is_empty() {
                        continue;
                    }
                    let tile = pool[rng.gen_range(0..pool.len())];
                    tracing::debug!(%internal_game_id, %tile, "random tile chosen for correction");
                    tile
                }
            };

            bag.insert(correction.position, tile);
            remaining.remove(&tile);
        }

        let mut unseen: Vec<Tile> = remaining.into_iter().collect();
        unseen.shuffle(&mut rng);
        bag.extend(unseen);
        bag.reverse();

        bag
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;
    use tilesync_core::TILE_COUNT;

    fn drew(x: u8, y: u8) -> HistoryMessage {
        vec![json!(GameHistoryMessage::DrewTile.code()), json!("alice"), json!(x), json!(y)]
    }

    fn replaced(x: u8, y: u8) -> HistoryMessage {
        vec![json!(GameHistoryMessage::ReplacedDeadTile.code()), json!(0), json!(x), json!(y)]
    }

    fn turn() -> HistoryMessage {
        vec![json!(GameHistoryMessage::TurnBegan.code()), json!(0)]
    }

    fn assert_permutation(bag: &[Tile]) {
        let distinct: BTreeSet<Tile> = bag.iter().copied().collect();
        assert_eq!(bag.len(), TILE_COUNT);
        assert_eq!(distinct.len(), TILE_COUNT);
    }

    #[test]
    fn test_turn_draws_split_on_turn_began() {
        let history = vec![drew(0, 0), drew(1, 0), turn(), replaced(2, 0), turn(), drew(3, 0)];
        assert_eq!(
            turn_draws(&history),
            vec![
                vec![Tile::new(0, 0), Tile::new(1, 0)],
                vec![Tile::new(2, 0)],
                vec![Tile::new(3, 0)],
            ]
        );
    }

    #[test]
    fn test_turn_draws_empty_history() {
        assert_eq!(turn_draws(&[]), vec![Vec::<Tile>::new()]);
    }

    #[test]
    fn test_turn_draws_skips_bad_tiles() {
        let history = vec![
            vec![json!(GameHistoryMessage::DrewTile.code()), json!(0), json!(40), json!(0)],
            drew(1, 1),
        ];
        assert_eq!(turn_draws(&history), vec![vec![Tile::new(1, 1)]]);
    }

    #[test]
    fn test_more_draws_goes_first() {
        let first = vec![vec![Tile::new(0, 0)]];
        let second = vec![vec![Tile::new(1, 0), Tile::new(2, 0)]];
        assert_eq!(
            observed_draw_order(&[first, second]),
            vec![Tile::new(1, 0), Tile::new(2, 0), Tile::new(0, 0)]
        );
    }

    #[test]
    fn test_ties_keep_player_order() {
        let first = vec![vec![Tile::new(5, 5)]];
        let second = vec![vec![Tile::new(0, 0)]];
        assert_eq!(
            observed_draw_order(&[first, second]),
            vec![Tile::new(5, 5), Tile::new(0, 0)]
        );
    }

    #[test]
    fn test_duplicates_dropped() {
        let first = vec![vec![Tile::new(0, 0)], vec![Tile::new(1, 0)]];
        let second = vec![vec![], vec![Tile::new(0, 0), Tile::new(2, 0)]];
        assert_eq!(
            observed_draw_order(&[first, second]),
            vec![Tile::new(0, 0), Tile::new(2, 0), Tile::new(1, 0)]
        );
    }

    #[test]
    fn test_bag_tail_is_observed_order() {
        let corrections = CorrectionTable::empty();
        let history = vec![drew(0, 0), drew(1, 0), turn(), drew(2, 0)];
        let bag = TileBagInferencer::new(&corrections).infer(100, GameId::new(1), &[&history]);

        assert_permutation(&bag);
        assert_eq!(&bag[TILE_COUNT - 3..], &[Tile::new(2, 0), Tile::new(1, 0), Tile::new(0, 0)]);
    }

    #[test]
    fn test_bag_is_reproducible() {
        let corrections = CorrectionTable::historical();
        let history = vec![drew(3, 3)];
        let inferencer = TileBagInferencer::new(&corrections);
        let first = inferencer.infer(1_414_827_614, GameId::new(43), &[&history]);
        let second = inferencer.infer(1_414_827_614, GameId::new(43), &[&history]);
        assert_eq!(first, second);

        let other = inferencer.infer(1_414_827_614, GameId::new(44), &[&history]);
        assert_ne!(first, other);
    }

    #[test]
    fn test_correction_applies_once_bag_long_enough() {
        let mut corrections = CorrectionTable::empty();
        corrections.insert(100, GameId::new(1), vec![BagCorrection::insert(1, 11, 8)]);
        let history = vec![drew(0, 0), drew(1, 0)];

        let bag = TileBagInferencer::new(&corrections).infer(100, GameId::new(1), &[&history]);
        assert_permutation(&bag);
        assert_eq!(
            &bag[TILE_COUNT - 3..],
            &[Tile::new(1, 0), Tile::new(11, 8), Tile::new(0, 0)]
        );
    }

    #[test]
    fn test_correction_skipped_when_bag_short() {
        let mut corrections = CorrectionTable::empty();
        corrections.insert(100, GameId::new(1), vec![BagCorrection::insert(5, 11, 8)]);
        let history = vec![drew(0, 0)];

        let with = TileBagInferencer::new(&corrections).infer(100, GameId::new(1), &[&history]);
        let empty = CorrectionTable::empty();
        let without = TileBagInferencer::new(&empty).infer(100, GameId::new(1), &[&history]);
        assert_eq!(with, without);
    }

    #[test]
    fn test_correction_of_seen_tile_skipped() {
        let mut corrections = CorrectionTable::empty();
        corrections.insert(100, GameId::new(1), vec![BagCorrection::insert(0, 0, 0)]);
        let history = vec![drew(0, 0)];

        let bag = TileBagInferencer::new(&corrections).infer(100, GameId::new(1), &[&history]);
        assert_permutation(&bag);
        assert_eq!(bag.last(), Some(&Tile::new(0, 0)));
    }

    #[test]
    fn test_random_correction_keeps_permutation() {
        let mut corrections = CorrectionTable::empty();
        corrections.insert(100, GameId::new(1), vec![BagCorrection::insert_random(0)]);
        let inferencer = TileBagInferencer::new(&corrections);
        let empty: &[HistoryMessage] = &[];
        let bag = inferencer.infer(100, GameId::new(1), &[empty]);
        assert_permutation(&bag);
        assert_eq!(bag, inferencer.infer(100, GameId::new(1), &[empty]));
    }

    #[test]
    fn test_historical_table() {
        let table = CorrectionTable::historical();
        assert_eq!(table.len(), 10);
        assert_eq!(
            table.get(1_435_226_336, GameId::new(3165)),
            &[BagCorrection::insert(88, 2, 7), BagCorrection::insert(89, 11, 3)]
        );
        assert!(table.get(1_435_226_336, GameId::new(1)).is_empty());
    }

    fn tile() -> impl Strategy<Value = Tile> {
        (0u8..12, 0u8..9).prop_map(|(x, y)| Tile::new(x, y))
    }

    fn history() -> impl Strategy<Value = Vec<HistoryMessage>> {
        prop::collection::vec(
            prop_oneof![
                tile().prop_map(|t| drew(t.x, t.y)),
                tile().prop_map(|t| replaced(t.x, t.y)),
                Just(turn()),
            ],
            0..40,
        )
    }

    proptest! {
        #[test]
        fn prop_bag_is_permutation(
            histories in prop::collection::vec(history(), 1..6),
            timestamp in 0u64..2_000_000_000,
            game in 0u64..10_000,
            position in 0usize..120,
        ) {
            let mut corrections = CorrectionTable::empty();
            corrections.insert(timestamp, GameId::new(game), vec![
                BagCorrection::insert_random(position),
                BagCorrection::insert(position, 6, 4),
            ]);
            let refs: Vec<&[HistoryMessage]> = histories.iter().map(Vec::as_slice).collect();
            let bag = TileBagInferencer::new(&corrections).infer(timestamp, GameId::new(game), &refs);

            let distinct: BTreeSet<Tile> = bag.iter().copied().collect();
            prop_assert_eq!(bag.len(), TILE_COUNT);
            prop_assert_eq!(distinct.len(), TILE_COUNT);
        }
    }
}
