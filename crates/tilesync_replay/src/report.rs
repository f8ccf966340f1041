//! Batch reports over many games: sync-log triage, ranking distributions and
//! how the first merge's bonuses relate to final rankings.

use crate::state::Game;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tilesync_core::{GameHistoryMessage, LogTimestamp};

/// A tile rack with no known tile, as rendered in sync logs
pub const FULLY_UNKNOWN_RACK: &str = "[null,null,null,null,null,null]";

static SYNC_LOG_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d+)_0*(\d+)_0*(\d+)_sync_log\.txt$").expect("sync log name pattern compiles")
});

/// Report error
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    /// Reading a directory or file failed
    #[error("Report input {path}: {source}")]
    Io {
        /// Path
        path: PathBuf,
        /// Cause
        source: std::io::Error,
    },
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ReportError + '_ {
    move |source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// A sync log identified by its file name
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SyncLogName {
    /// Timestamp of the log
    pub log_timestamp: LogTimestamp,
    /// Internal game id
    pub internal_game_id: u64,
    /// Tiles on the board when compared
    pub played_tiles: usize,
}

impl SyncLogName {
    /// Parse `<ts>_<internal>_<played>_sync_log.txt`
    #[must_use]
    pub fn parse(file_name: &str) -> Option<Self> {
        let captures = SYNC_LOG_NAME.captures(file_name)?;
        Some(Self {
            log_timestamp: captures[1].parse().ok()?,
            internal_game_id: captures[2].parse().ok()?,
            played_tiles: captures[3].parse().ok()?,
        })
    }
}

impl fmt::Display for SyncLogName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.log_timestamp, self.internal_game_id, self.played_tiles)
    }
}

/// Sync logs split by whether any rack was never seen at all
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncLogTriage {
    /// Logs whose diffs show no fully unknown rack, newest first
    pub without_unknown_racks: Vec<SyncLogName>,
    /// Logs with at least one fully unknown rack, newest first
    pub with_unknown_racks: Vec<SyncLogName>,
}

impl fmt::Display for SyncLogTriage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "without fully unknown tile racks:")?;
        for name in &self.without_unknown_racks {
            writeln!(f, "{name}")?;
        }
        writeln!(f)?;
        writeln!(f, "with fully unknown tile racks:")?;
        for name in &self.with_unknown_racks {
            writeln!(f, "{name}")?;
        }
        Ok(())
    }
}

/// Triage every sync log in `dir`; other files are ignored
///
/// # Errors
///
/// Returns error if the directory or a sync log cannot be read
pub fn triage_sync_logs(dir: &Path) -> Result<SyncLogTriage, ReportError> {
    let mut triage = SyncLogTriage::default();

    for dir_entry in fs::read_dir(dir).map_err(io_error(dir))? {
        let dir_entry = dir_entry.map_err(io_error(dir))?;
        let file_name = dir_entry.file_name();
        let Some(name) = file_name.to_str().and_then(SyncLogName::parse) else {
            continue;
        };

        let path = dir_entry.path();
        let text = fs::read_to_string(&path).map_err(io_error(&path))?;
        if text.lines().any(|line| line == FULLY_UNKNOWN_RACK) {
            triage.with_unknown_racks.push(name);
        } else {
            triage.without_unknown_racks.push(name);
        }
    }

    triage.with_unknown_racks.sort_unstable_by(|a, b| b.cmp(a));
    triage.without_unknown_racks.sort_unstable_by(|a, b| b.cmp(a));
    Ok(triage)
}

/// Mode and table size a ranking is bucketed under
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RankingMode {
    /// Free-for-all with this many players
    Singles(usize),
    /// Two teams of two
    Teams,
}

impl RankingMode {
    /// Bucket of a completed game
    #[must_use]
    pub fn of(game: &Game) -> Option<Self> {
        match game.mode.as_deref()? {
            "Singles" => Some(Self::Singles(game.num_players())),
            "Teams" => Some(Self::Teams),
            _ => None,
        }
    }
}

impl fmt::Display for RankingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Singles(players) => write!(f, "Singles{players}"),
            Self::Teams => write!(f, "Teams"),
        }
    }
}

/// Rank each entry of a score list, highest first.
///
/// Returns `(index, ranking)` in descending score order. Equal scores share a
/// ranking and the next distinct score skips past them, so `[50, 80, 80]`
/// ranks as `[(1, 1), (2, 1), (0, 3)]`.
#[must_use]
pub fn player_rankings(score: &[i64]) -> Vec<(usize, usize)> {
    let mut order: Vec<(usize, i64)> = score.iter().copied().enumerate().collect();
    order.sort_by(|a, b| b.1.cmp(&a.1));

    let mut rankings: Vec<(usize, usize)> = Vec::with_capacity(order.len());
    let mut last: Option<(i64, usize)> = None;
    for (position, (index, amount)) in order.into_iter().enumerate() {
        let ranking = match last {
            Some((last_amount, last_ranking)) if last_amount == amount => last_ranking,
            _ => position + 1,
        };
        last = Some((amount, ranking));
        rankings.push((index, ranking));
    }
    rankings
}

/// Mode and ranked score of a completed game with at least two players.
///
/// Team scores are folded into team totals.
fn completed_score(game: &Game) -> Option<(RankingMode, Vec<i64>)> {
    if game.state.as_deref() != Some("Completed") || game.num_players() < 2 {
        return None;
    }
    let mode = RankingMode::of(game)?;
    let score = game.score.as_deref()?;
    let score = match mode {
        RankingMode::Teams => match score {
            [a, b, c, d, ..] => vec![a + c, b + d],
            _ => {
                tracing::debug!(internal_game_id = %game.internal_game_id, "team game without four scores");
                return None;
            }
        },
        RankingMode::Singles(_) => score.to_vec(),
    };
    Some((mode, score))
}

/// How often each ranking pattern occurs, per mode
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RankingDistribution {
    modes: BTreeMap<RankingMode, BTreeMap<Vec<usize>, usize>>,
}

impl RankingDistribution {
    /// Empty distribution
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a game if it completed with at least two players and a score.
    ///
    /// Team games are ranked on team totals, seats 0 and 2 against 1 and 3.
    /// Returns true if the game was counted.
    pub fn add_game(&mut self, game: &Game) -> bool {
        let Some((mode, score)) = completed_score(game) else {
            return false;
        };
        let pattern = player_rankings(&score)
            .into_iter()
            .map(|(_, ranking)| ranking)
            .collect();
        *self.modes.entry(mode).or_default().entry(pattern).or_default() += 1;
        true
    }

    /// Count every eligible game
    pub fn extend<'a>(&mut self, games: impl IntoIterator<Item = &'a Game>) {
        for game in games {
            self.add_game(game);
        }
    }

    /// Patterns of a mode, most frequent first
    #[must_use]
    pub fn patterns(&self, mode: RankingMode) -> Vec<(Vec<usize>, usize)> {
        let mut patterns: Vec<(Vec<usize>, usize)> = self
            .modes
            .get(&mode)
            .map(|counts| counts.iter().map(|(pattern, count)| (pattern.clone(), *count)).collect())
            .unwrap_or_default();
        patterns.sort_by(|a, b| b.1.cmp(&a.1));
        patterns
    }

    /// Modes with at least one counted game
    pub fn modes(&self) -> impl Iterator<Item = RankingMode> + '_ {
        self.modes.keys().copied()
    }
}

impl fmt::Display for RankingDistribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for mode in self.modes() {
            writeln!(f, "{mode}")?;
            for (pattern, count) in self.patterns(mode) {
                let pattern: Vec<String> = pattern.iter().map(ToString::to_string).collect();
                writeln!(f, "({}) {count}", pattern.join(", "))?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Bonuses paid at the first merge: chain, then seat, then amount
pub type FirstMergeBonuses = BTreeMap<i64, BTreeMap<usize, i64>>;

/// Bonuses paid at a game's first merge, read from seat 0's history.
///
/// Collects `ReceivedBonus` messages and stops at the first other message
/// once a bonus has been seen.
#[must_use]
pub fn first_merge_bonuses(game: &Game) -> FirstMergeBonuses {
    let received_bonus = GameHistoryMessage::ReceivedBonus.code();
    let mut bonuses = FirstMergeBonuses::new();
    let Some(history) = game
        .player_id_to_username
        .get(&0)
        .and_then(|username| game.username_to_game_history.get(username))
    else {
        return bonuses;
    };

    for message in history {
        if message.first().and_then(Value::as_i64) != Some(received_bonus) {
            if bonuses.is_empty() {
                continue;
            }
            break;
        }
        let field = |index: usize| message.get(index).and_then(Value::as_i64);
        let player_id = field(1).and_then(|id| usize::try_from(id).ok());
        if let (Some(player_id), Some(chain), Some(amount)) = (player_id, field(2), field(3)) {
            bonuses.entry(chain).or_default().insert(player_id, amount);
        }
    }
    bonuses
}

/// Where a player stood in the first merge's payout
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BonusBucket {
    /// Took the majority bonus
    Winner,
    /// Took the minority bonus
    RunnerUp,
    /// Took no bonus
    Other,
}

impl BonusBucket {
    /// Every bucket in table order
    pub const ALL: [Self; 3] = [Self::Winner, Self::RunnerUp, Self::Other];

    fn index(self) -> usize {
        match self {
            Self::Winner => 0,
            Self::RunnerUp => 1,
            Self::Other => 2,
        }
    }
}

/// Seat buckets when exactly one chain paid two distinct amounts
fn bonus_buckets(bonuses: &FirstMergeBonuses, seats: usize) -> Option<BTreeMap<usize, BonusBucket>> {
    if bonuses.len() != 1 {
        return None;
    }
    let paid = bonuses.values().next()?;
    let mut ranked: Vec<(usize, i64)> = paid.iter().map(|(player_id, amount)| (*player_id, *amount)).collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    let [(winner, majority), (runner_up, minority)] = ranked.as_slice() else {
        return None;
    };
    if majority == minority {
        return None;
    }

    let mut buckets = BTreeMap::from([(*winner, BonusBucket::Winner), (*runner_up, BonusBucket::RunnerUp)]);
    for player_id in 0..seats {
        buckets.entry(player_id).or_insert(BonusBucket::Other);
    }
    Some(buckets)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct BonusCounts {
    rankings: [BTreeMap<usize, usize>; 3],
    not_applicable: [usize; 3],
}

/// Final rankings of players by their first-merge bonus, per mode.
///
/// Games whose first merge did not pay exactly one chain's majority and
/// minority bonus at distinct amounts count as not applicable for every seat.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FirstMergeBonusTable {
    modes: BTreeMap<RankingMode, BonusCounts>,
}

impl FirstMergeBonusTable {
    /// Empty table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a game if it completed with at least two players and a score.
    ///
    /// In team games each seat takes its team's ranking. Returns true if the
    /// game was counted.
    pub fn add_game(&mut self, game: &Game) -> bool {
        let Some((mode, score)) = completed_score(game) else {
            return false;
        };
        let seats = match mode {
            RankingMode::Singles(players) => players,
            RankingMode::Teams => 4,
        };
        let counts = self.modes.entry(mode).or_default();

        let Some(buckets) = bonus_buckets(&first_merge_bonuses(game), seats) else {
            counts.not_applicable[BonusBucket::Winner.index()] += 1;
            counts.not_applicable[BonusBucket::RunnerUp.index()] += 1;
            counts.not_applicable[BonusBucket::Other.index()] += seats.saturating_sub(2);
            return true;
        };

        let rankings: BTreeMap<usize, usize> = player_rankings(&score).into_iter().collect();
        for (player_id, bucket) in buckets {
            let seat = match mode {
                RankingMode::Teams => player_id % 2,
                RankingMode::Singles(_) => player_id,
            };
            match rankings.get(&seat) {
                Some(ranking) => *counts.rankings[bucket.index()].entry(*ranking).or_default() += 1,
                None => tracing::debug!(internal_game_id = %game.internal_game_id, player_id, "bonus to a seat without a score"),
            }
        }
        true
    }

    /// Count every eligible game
    pub fn extend<'a>(&mut self, games: impl IntoIterator<Item = &'a Game>) {
        for game in games {
            self.add_game(game);
        }
    }

    /// Modes with at least one counted game
    pub fn modes(&self) -> impl Iterator<Item = RankingMode> + '_ {
        self.modes.keys().copied()
    }

    /// Ranking to count for one bucket of a mode
    #[must_use]
    pub fn rankings(&self, mode: RankingMode, bucket: BonusBucket) -> BTreeMap<usize, usize> {
        self.modes
            .get(&mode)
            .map(|counts| counts.rankings[bucket.index()].clone())
            .unwrap_or_default()
    }

    /// Seats of a bucket in games that did not qualify
    #[must_use]
    pub fn not_applicable(&self, mode: RankingMode, bucket: BonusBucket) -> usize {
        self.modes
            .get(&mode)
            .map_or(0, |counts| counts.not_applicable[bucket.index()])
    }

    fn table(counts: &BonusCounts) -> Vec<Vec<String>> {
        let all_rankings: BTreeSet<usize> = counts
            .rankings
            .iter()
            .flat_map(|rankings| rankings.keys().copied())
            .collect();
        let mut rows: Vec<Vec<String>> = all_rankings.iter().map(|ranking| vec![ranking.to_string()]).collect();
        let mut not_applicable_row = vec!["N/A".to_string()];

        for bucket in BonusBucket::ALL {
            let rankings = &counts.rankings[bucket.index()];
            if rankings.is_empty() {
                continue;
            }
            let total: usize = rankings.values().sum();
            for (row, ranking) in rows.iter_mut().zip(&all_rankings) {
                match rankings.get(ranking) {
                    Some(count) => row.extend([format!("{count}/{total}"), percent(*count, total)]),
                    None => row.extend([String::new(), String::new()]),
                }
            }
            let not_applicable = counts.not_applicable[bucket.index()];
            let total = total + not_applicable;
            not_applicable_row.extend([format!("{not_applicable}/{total}"), percent(not_applicable, total)]);
        }

        rows.push(not_applicable_row);
        rows
    }
}

fn percent(count: usize, total: usize) -> String {
    format!("{:.1}%", count as f64 / total as f64 * 100.0)
}

impl fmt::Display for FirstMergeBonusTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (mode, counts) in &self.modes {
            writeln!(f, "{mode}")?;
            let rows = Self::table(counts);
            let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
            let widths: Vec<usize> = (0..columns)
                .map(|column| {
                    rows.iter()
                        .filter_map(|row| row.get(column))
                        .map(String::len)
                        .max()
                        .unwrap_or(0)
                })
                .collect();
            for row in &rows {
                let cells: Vec<String> = row
                    .iter()
                    .zip(&widths)
                    .map(|(cell, width)| format!("{cell:>width$}"))
                    .collect();
                writeln!(f, "{}", cells.join("  ").trim_end())?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;
    use tilesync_core::GameId;

    fn completed(mode: &str, players: usize, score: Vec<i64>) -> Game {
        let mut game = Game::new(1, GameId::new(1), GameId::new(1));
        game.state = Some("Completed".to_string());
        game.mode = Some(mode.to_string());
        for player_id in 0..players {
            game.player_id_to_username
                .insert(player_id, format!("player{player_id}"));
        }
        game.score = Some(score);
        game
    }

    #[test]
    fn test_parse_sync_log_name() {
        assert_eq!(
            SyncLogName::parse("1414827614_00043_057_sync_log.txt"),
            Some(SyncLogName {
                log_timestamp: 1_414_827_614,
                internal_game_id: 43,
                played_tiles: 57
            })
        );
        assert_eq!(SyncLogName::parse("1414827614_00043.txt"), None);
        assert_eq!(SyncLogName::parse("x_1_2_sync_log.txt"), None);
    }

    #[test]
    fn test_triage_splits_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        let write = |name: &str, text: &str| fs::write(dir.path().join(name), text).unwrap();
        write("1000_00001_010_sync_log.txt", "board diff!\n[]\n[]\n");
        write("2000_00002_020_sync_log.txt", &format!("tile_racks diff for player_id 1!\n{FULLY_UNKNOWN_RACK}\n[[0,0],null,null,null,null,null]\n"));
        write("3000_00003_030_sync_log.txt", "board diff!\n");
        write("3000_00003.txt", FULLY_UNKNOWN_RACK);

        let triage = triage_sync_logs(dir.path()).unwrap();
        let ids = |names: &[SyncLogName]| names.iter().map(|name| name.internal_game_id).collect::<Vec<_>>();
        assert_eq!(ids(&triage.without_unknown_racks), vec![3, 1]);
        assert_eq!(ids(&triage.with_unknown_racks), vec![2]);
        assert_eq!(
            triage.to_string(),
            "without fully unknown tile racks:\n3000 3 30\n1000 1 10\n\nwith fully unknown tile racks:\n2000 2 20\n"
        );
    }

    #[test]
    fn test_triage_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(triage_sync_logs(&dir.path().join("absent")).is_err());
    }

    #[test]
    fn test_rankings_share_ties() {
        assert_eq!(player_rankings(&[50, 80, 80]), vec![(1, 1), (2, 1), (0, 3)]);
        assert_eq!(player_rankings(&[10, 20, 30]), vec![(2, 1), (1, 2), (0, 3)]);
        assert_eq!(player_rankings(&[]), vec![]);
    }

    #[test]
    fn test_distribution_by_mode() {
        let mut distribution = RankingDistribution::new();
        assert!(distribution.add_game(&completed("Singles", 2, vec![100, 50])));
        assert!(distribution.add_game(&completed("Singles", 2, vec![70, 70])));
        assert!(distribution.add_game(&completed("Singles", 2, vec![10, 90])));
        assert!(distribution.add_game(&completed("Teams", 4, vec![10, 20, 30, 40])));
        assert!(distribution.add_game(&completed("Singles", 3, vec![1, 2, 3])));

        assert_eq!(
            distribution.modes().collect::<Vec<_>>(),
            vec![RankingMode::Singles(2), RankingMode::Singles(3), RankingMode::Teams]
        );
        assert_eq!(
            distribution.patterns(RankingMode::Singles(2)),
            vec![(vec![1, 2], 2), (vec![1, 1], 1)]
        );
        assert_eq!(distribution.patterns(RankingMode::Teams), vec![(vec![1, 2], 1)]);
        assert!(distribution.to_string().starts_with("Singles2\n(1, 2) 2\n(1, 1) 1\n\nSingles3\n"));
    }

    #[test]
    fn test_ineligible_games_skipped() {
        let mut distribution = RankingDistribution::new();
        let mut in_progress = completed("Singles", 2, vec![1, 2]);
        in_progress.state = Some("InProgress".to_string());
        assert!(!distribution.add_game(&in_progress));
        assert!(!distribution.add_game(&completed("Singles", 1, vec![1])));
        assert!(!distribution.add_game(&completed("Teams", 4, vec![1, 2])));
        let mut unscored = completed("Singles", 2, vec![]);
        unscored.score = None;
        assert!(!distribution.add_game(&unscored));
        assert_eq!(distribution, RankingDistribution::new());
    }

    fn bonus(player_id: usize, chain: i64, amount: i64) -> Vec<Value> {
        vec![
            json!(GameHistoryMessage::ReceivedBonus.code()),
            json!(player_id),
            json!(chain),
            json!(amount),
        ]
    }

    fn with_seat0_history(mut game: Game, history: Vec<Vec<Value>>) -> Game {
        game.username_to_game_history
            .insert("player0".to_string(), history);
        game
    }

    #[test]
    fn test_first_merge_bonuses_stop_after_first_group() {
        let played = vec![json!(GameHistoryMessage::PlayedTile.code()), json!(0), json!(1), json!(1)];
        let game = with_seat0_history(
            completed("Singles", 3, vec![10, 30, 20]),
            vec![played.clone(), bonus(0, 2, 3000), bonus(1, 2, 1500), played, bonus(2, 4, 9999)],
        );
        assert_eq!(
            first_merge_bonuses(&game),
            BTreeMap::from([(2, BTreeMap::from([(0, 3000), (1, 1500)]))])
        );
    }

    #[test]
    fn test_bonus_table_clear_winner() {
        let game = with_seat0_history(
            completed("Singles", 3, vec![10, 30, 20]),
            vec![bonus(0, 2, 3000), bonus(1, 2, 1500)],
        );
        let mut table = FirstMergeBonusTable::new();
        assert!(table.add_game(&game));

        let mode = RankingMode::Singles(3);
        assert_eq!(table.rankings(mode, BonusBucket::Winner), BTreeMap::from([(3, 1)]));
        assert_eq!(table.rankings(mode, BonusBucket::RunnerUp), BTreeMap::from([(1, 1)]));
        assert_eq!(table.rankings(mode, BonusBucket::Other), BTreeMap::from([(2, 1)]));
        assert_eq!(table.not_applicable(mode, BonusBucket::Winner), 0);
    }

    #[test]
    fn test_bonus_table_tied_or_split_merges_not_applicable() {
        let tied = with_seat0_history(
            completed("Singles", 3, vec![10, 30, 20]),
            vec![bonus(0, 2, 2000), bonus(1, 2, 2000)],
        );
        let two_chains = with_seat0_history(
            completed("Singles", 3, vec![10, 30, 20]),
            vec![bonus(0, 2, 2000), bonus(1, 2, 1000), bonus(2, 5, 4000), bonus(0, 5, 2000)],
        );
        let mut table = FirstMergeBonusTable::new();
        table.extend([&tied, &two_chains]);

        let mode = RankingMode::Singles(3);
        for bucket in BonusBucket::ALL {
            assert!(table.rankings(mode, bucket).is_empty());
        }
        assert_eq!(table.not_applicable(mode, BonusBucket::Winner), 2);
        assert_eq!(table.not_applicable(mode, BonusBucket::RunnerUp), 2);
        assert_eq!(table.not_applicable(mode, BonusBucket::Other), 2);
    }

    #[test]
    fn test_bonus_table_folds_team_seats() {
        // Team of seats 0 and 2 totals 40, team of seats 1 and 3 totals 60
        let game = with_seat0_history(
            completed("Teams", 4, vec![10, 20, 30, 40]),
            vec![bonus(2, 1, 3000), bonus(3, 1, 1500)],
        );
        let mut table = FirstMergeBonusTable::new();
        assert!(table.add_game(&game));

        let mode = RankingMode::Teams;
        assert_eq!(table.rankings(mode, BonusBucket::Winner), BTreeMap::from([(2, 1)]));
        assert_eq!(table.rankings(mode, BonusBucket::RunnerUp), BTreeMap::from([(1, 1)]));
        assert_eq!(table.rankings(mode, BonusBucket::Other), BTreeMap::from([(1, 1), (2, 1)]));
    }

    #[test]
    fn test_bonus_table_rendering() {
        let winner = with_seat0_history(
            completed("Singles", 2, vec![100, 50]),
            vec![bonus(0, 0, 2000), bonus(1, 0, 1000)],
        );
        let tied = with_seat0_history(
            completed("Singles", 2, vec![100, 50]),
            vec![bonus(0, 0, 2000), bonus(1, 0, 2000)],
        );
        let mut in_progress = winner.clone();
        in_progress.state = Some("InProgress".to_string());

        let mut table = FirstMergeBonusTable::new();
        assert!(!table.add_game(&in_progress));
        table.extend([&winner, &tied]);

        let expected = format!(
            "Singles2\n  1  1/1  100.0%\n  2{}1/1  100.0%\nN/A  1/2   50.0%  1/2   50.0%\n\n",
            " ".repeat(15)
        );
        assert_eq!(table.to_string(), expected);
    }

    proptest! {
        #[test]
        fn prop_rankings_start_at_one_and_follow_scores(score in prop::collection::vec(-100i64..100, 1..7)) {
            let rankings = player_rankings(&score);
            prop_assert_eq!(rankings.len(), score.len());
            prop_assert_eq!(rankings[0].1, 1);
            for pair in rankings.windows(2) {
                let (a, b) = (pair[0], pair[1]);
                prop_assert!(score[a.0] >= score[b.0]);
                if score[a.0] == score[b.0] {
                    prop_assert_eq!(a.1, b.1);
                } else {
                    prop_assert!(b.1 > a.1);
                }
            }
        }
    }
}
