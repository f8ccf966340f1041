//! Seed management for reproducible tile-bag shuffles.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::hash::Hasher;
use tilesync_core::{GameId, LogTimestamp};

/// Source of a shuffle seed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SeedSource {
    /// From a literal value
    Literal(u64),
    /// From a game's log timestamp and internal id
    Game {
        /// Log creation timestamp
        log_timestamp: LogTimestamp,
        /// Internal game id
        internal_game_id: GameId,
    },
}

impl SeedSource {
    /// Generate a seed value
    #[must_use]
    pub fn to_seed(&self) -> u64 {
        match self {
            SeedSource::Literal(seed) => *seed,
            SeedSource::Game {
                log_timestamp,
                internal_game_id,
            } => {
                let mut hasher = fnv::FnvHasher::default();
                hasher.write(game_label(*log_timestamp, *internal_game_id).as_bytes());
                hasher.finish()
            }
        }
    }
}

/// `"<timestamp>-<internal id>"`, the text a game's shuffle seed is hashed from
#[must_use]
pub fn game_label(log_timestamp: LogTimestamp, internal_game_id: GameId) -> String {
    format!("{log_timestamp}-{internal_game_id}")
}

/// Shuffle seed for reproducibility
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimSeed {
    /// Seed value
    pub seed: u64,
    /// Where it came from
    pub source: SeedSource,
}

impl SimSeed {
    /// Create a new seed
    #[must_use]
    pub fn new(source: SeedSource) -> Self {
        Self {
            seed: source.to_seed(),
            source,
        }
    }

    /// Create a seed from a literal value
    #[must_use]
    pub fn from_literal(seed: u64) -> Self {
        Self::new(SeedSource::Literal(seed))
    }

    /// Seed for one game's bag
    #[must_use]
    pub fn for_game(log_timestamp: LogTimestamp, internal_game_id: GameId) -> Self {
        Self::new(SeedSource::Game {
            log_timestamp,
            internal_game_id,
        })
    }

    /// Create RNG borrowing seed
    #[must_use]
    pub fn rng(&self) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(self.seed)
    }
}

impl Default for SimSeed {
    fn default() -> Self {
        Self::from_literal(42)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_seed_source_literal() {
        assert_eq!(SeedSource::Literal(123).to_seed(), 123);
    }

    #[test]
    fn test_game_label() {
        assert_eq!(game_label(1_432_798_259, GameId::new(43)), "1432798259-43");
    }

    #[test]
    fn test_game_seed_reproducible() {
        let first = SimSeed::for_game(1_414_827_614, GameId::new(43));
        let second = SimSeed::for_game(1_414_827_614, GameId::new(43));
        assert_eq!(first.seed, second.seed);
    }

    #[test]
    fn test_game_seed_differs_per_game() {
        let first = SimSeed::for_game(1_414_827_614, GameId::new(43));
        let other_game = SimSeed::for_game(1_414_827_614, GameId::new(44));
        let other_log = SimSeed::for_game(1_414_827_615, GameId::new(43));
        assert_ne!(first.seed, other_game.seed);
        assert_ne!(first.seed, other_log.seed);
    }

    #[test]
    fn test_game_seed_is_fnv_of_label() {
        let mut hasher = fnv::FnvHasher::default();
        hasher.write(b"100-7");
        assert_eq!(SimSeed::for_game(100, GameId::new(7)).seed, hasher.finish());
    }

    #[test]
    fn test_sim_seed_rng() {
        let seed = SimSeed::from_literal(42);
        let mut rng1 = seed.rng();
        let mut rng2 = seed.rng();

        let val1: u64 = rng1.r#gen();
        let val2: u64 = rng2.r#gen();
        assert_eq!(val1, val2);
    }

    #[test]
    fn test_sim_seed_default() {
        assert_eq!(SimSeed::default().seed, 42);
    }
}
