//! tilesync CLI
//!
//! Offline tools over game server logs: list reconstructed games, cut logs
//! into per-game fixtures, inspect inferred tile bags, recheck snapshots and
//! summarize batches of results.

#![warn(missing_docs)]
#![warn(clippy::all)]

use clap::{Parser, Subcommand};
use color_eyre::Result;
use color_eyre::eyre::{WrapErr, eyre};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tilesync_core::{GameId, LogTimestamp};
use tilesync_replay::{
    FirstMergeBonusTable, Game, GameLogSlicer, GameSnapshot, RankingDistribution, SliceConfig,
    reconstruct_games, triage_sync_logs,
};
use tilesync_sim::CorrectionTable;
use tracing_subscriber::EnvFilter;

const LOG_TARGETS: &[&str] = &[
    "tilesync",
    "tilesync_log",
    "tilesync_sim",
    "tilesync_replay",
];

#[derive(Parser)]
#[command(name = "tilesync")]
#[command(about = "tilesync - offline desync verification for game server logs", long_about = None)]
struct Cli {
    /// Log debug detail (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconstruct and list every game of a log
    Games {
        /// Server log
        log: PathBuf,
        /// Log timestamp, if the file name does not start with it
        #[arg(short, long)]
        timestamp: Option<LogTimestamp>,
        /// Print each game as JSON
        #[arg(long)]
        json: bool,
    },
    /// Write one replayable log per game
    Slice {
        /// Server log
        log: PathBuf,
        /// Output directory
        #[arg(short, long)]
        output: PathBuf,
        /// Log timestamp, if the file name does not start with it
        #[arg(short, long)]
        timestamp: Option<LogTimestamp>,
        /// Internal game ids to keep
        #[arg(short, long)]
        game: Vec<u64>,
    },
    /// Check that every sliced game replays to the same state
    Roundtrip {
        /// Server log
        log: PathBuf,
        /// Log timestamp, if the file name does not start with it
        #[arg(short, long)]
        timestamp: Option<LogTimestamp>,
    },
    /// Print the initial tile bag of a game
    TileBag {
        /// Server log
        log: PathBuf,
        /// Internal game id
        #[arg(short, long)]
        game: u64,
        /// Log timestamp, if the file name does not start with it
        #[arg(short, long)]
        timestamp: Option<LogTimestamp>,
        /// Skip the manual corrections
        #[arg(long)]
        no_corrections: bool,
    },
    /// Rerun the comparison stored in a snapshot
    CheckSnapshot {
        /// Snapshot file
        snapshot: PathBuf,
        /// Include every compared value
        #[arg(long)]
        verbose_diff: bool,
    },
    /// Triage a directory of sync logs
    SyncReport {
        /// Directory holding `<ts>_<id>_<tiles>_sync_log.txt` files
        dir: PathBuf,
    },
    /// Ranking distribution of completed games
    Rankings {
        /// Server logs
        #[arg(required = true)]
        logs: Vec<PathBuf>,
    },
    /// Final rankings by first-merge bonus of completed games
    Bonuses {
        /// Server logs
        #[arg(required = true)]
        logs: Vec<PathBuf>,
    },
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Games {
            log,
            timestamp,
            json,
        } => list_games(&log, timestamp, json),
        Commands::Slice {
            log,
            output,
            timestamp,
            game,
        } => slice(&log, &output, timestamp, &game),
        Commands::Roundtrip { log, timestamp } => roundtrip(&log, timestamp),
        Commands::TileBag {
            log,
            game,
            timestamp,
            no_corrections,
        } => tile_bag(&log, GameId::new(game), timestamp, no_corrections),
        Commands::CheckSnapshot {
            snapshot,
            verbose_diff,
        } => check_snapshot(&snapshot, verbose_diff),
        Commands::SyncReport { dir } => {
            let triage = triage_sync_logs(&dir)?;
            print!("{triage}");
            Ok(())
        }
        Commands::Rankings { logs } => rankings(&logs),
        Commands::Bonuses { logs } => bonuses(&logs),
    }
}

fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let directives: Vec<String> = LOG_TARGETS
        .iter()
        .map(|target| format!("{target}={level}"))
        .collect();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives.join(","))),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Timestamp from the flag, else the leading digits of the file name
fn log_timestamp(path: &Path, explicit: Option<LogTimestamp>) -> Result<LogTimestamp> {
    if let Some(timestamp) = explicit {
        return Ok(timestamp);
    }
    let digits: String = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default()
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().map_err(|_| {
        eyre!(
            "cannot read a log timestamp from {}; pass --timestamp",
            path.display()
        )
    })
}

fn open(path: &Path) -> Result<BufReader<File>> {
    let file = File::open(path).wrap_err_with(|| format!("opening {}", path.display()))?;
    Ok(BufReader::new(file))
}

fn load_games(path: &Path, timestamp: Option<LogTimestamp>) -> Result<Vec<Game>> {
    let log_timestamp = log_timestamp(path, timestamp)?;
    let games = reconstruct_games(open(path)?, log_timestamp);
    tracing::info!(log = %path.display(), games = games.len(), "log reconstructed");
    Ok(games)
}

fn list_games(path: &Path, timestamp: Option<LogTimestamp>, json: bool) -> Result<()> {
    for game in load_games(path, timestamp)? {
        if json {
            println!("{}", serde_json::to_string(&game)?);
            continue;
        }
        println!(
            "{} {} {} {} {} players={} tiles={}{}",
            game.log_timestamp,
            game.internal_game_id,
            game.game_id,
            game.state.as_deref().unwrap_or("-"),
            game.mode_label().as_deref().unwrap_or("-"),
            game.num_players(),
            game.played_tiles_order.len(),
            if game.expired { " expired" } else { "" },
        );
    }
    Ok(())
}

fn slice(path: &Path, output: &Path, timestamp: Option<LogTimestamp>, games: &[u64]) -> Result<()> {
    let log_timestamp = log_timestamp(path, timestamp)?;
    let mut config = SliceConfig::new();
    if !games.is_empty() {
        config = config.only(games.iter().copied().map(GameId::new));
    }

    std::fs::create_dir_all(output).wrap_err_with(|| format!("creating {}", output.display()))?;
    for log in GameLogSlicer::with_config(open(path)?, log_timestamp, config) {
        let written = log.write_to(output)?;
        println!("{} {} {}", log.log_timestamp, log.internal_game_id, written.display());
    }
    Ok(())
}

fn roundtrip(path: &Path, timestamp: Option<LogTimestamp>) -> Result<()> {
    let log_timestamp = log_timestamp(path, timestamp)?;
    let full: BTreeMap<GameId, Game> = reconstruct_games(open(path)?, log_timestamp)
        .into_iter()
        .map(|game| (game.game_id, game))
        .collect();

    let mut mismatches = 0;
    for log in GameLogSlicer::new(open(path)?, log_timestamp) {
        let replayed = reconstruct_games(log.to_text().as_bytes(), log_timestamp);
        let matches = match (replayed.as_slice(), full.get(&log.game_id)) {
            ([game], Some(expected)) => game == expected,
            _ => false,
        };
        if !matches {
            mismatches += 1;
        }
        println!(
            "{} {} {}",
            log_timestamp,
            log.internal_game_id,
            if matches { "ok" } else { "mismatch" }
        );
    }

    if mismatches > 0 {
        return Err(eyre!("{mismatches} sliced games replayed differently"));
    }
    Ok(())
}

fn tile_bag(
    path: &Path,
    internal_game_id: GameId,
    timestamp: Option<LogTimestamp>,
    no_corrections: bool,
) -> Result<()> {
    let game = load_games(path, timestamp)?
        .into_iter()
        .find(|game| game.internal_game_id == internal_game_id)
        .ok_or_else(|| eyre!("no game {internal_game_id} in {}", path.display()))?;

    let corrections = if no_corrections {
        CorrectionTable::empty()
    } else {
        CorrectionTable::historical()
    };
    let bag = game.initial_tile_bag(&corrections);
    println!("{}", serde_json::to_string(&bag)?);
    Ok(())
}

fn check_snapshot(path: &Path, verbose: bool) -> Result<()> {
    let snapshot = GameSnapshot::read_file(path)?;
    let report = snapshot.recheck(verbose);

    for line in &report.sync_log {
        println!("{line}");
    }
    let line_number = snapshot
        .metadata
        .line_number
        .map(|line| line.to_string())
        .unwrap_or_default();
    println!(
        "{} {} {} {}",
        report.log_timestamp,
        report.internal_game_id,
        line_number,
        if report.synchronized { "yay!" } else { "boo!" }
    );
    Ok(())
}

fn rankings(paths: &[PathBuf]) -> Result<()> {
    let mut distribution = RankingDistribution::new();
    for path in paths {
        let games = load_games(path, None)?;
        distribution.extend(&games);
    }
    print!("{distribution}");
    Ok(())
}

fn bonuses(paths: &[PathBuf]) -> Result<()> {
    let mut table = FirstMergeBonusTable::new();
    for path in paths {
        let games = load_games(path, None)?;
        table.extend(&games);
    }
    print!("{table}");
    Ok(())
}
