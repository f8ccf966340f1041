//! Cut a server log into one self-contained log per game.
//!
//! Frames are routed to games with the same classification the reconstructor
//! uses, so replaying a sliced log rebuilds the game exactly as the full log
//! does. Connect and disconnect frames are shared with every game open at the
//! time, and a client's connect frame is prepended to every game created while
//! the client is still connected.

use crate::identity::{IdentityMap, RoutingEffect, routing_effect};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fs;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use tilesync_core::{ClientId, GameId, LogTimestamp, ServerCommand};
use tilesync_log::{ClassifiedEvent, ClassifiedLine, Command, EventStream, LogEntry};

static DISCONNECT_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+ disconnect$").expect("disconnect pattern compiles"));

/// Frames of one game, keyed by the line number the frame starts at
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlicedGameLog {
    /// Timestamp of the source log
    pub log_timestamp: LogTimestamp,
    /// External game id
    pub game_id: GameId,
    /// Internal game id
    pub internal_game_id: GameId,
    /// Seat to username
    pub player_id_to_username: BTreeMap<usize, String>,
    /// Username to seat
    pub username_to_player_id: BTreeMap<String, usize>,
    /// Raw frame lines by starting line number
    pub batches: BTreeMap<usize, Vec<String>>,
}

impl SlicedGameLog {
    fn new(log_timestamp: LogTimestamp, game_id: GameId, internal_game_id: GameId) -> Self {
        Self {
            log_timestamp,
            game_id,
            internal_game_id,
            player_id_to_username: BTreeMap::new(),
            username_to_player_id: BTreeMap::new(),
            batches: BTreeMap::new(),
        }
    }

    /// `<ts>_<internal:05>.txt`
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("{}_{:05}.txt", self.log_timestamp, self.internal_game_id.as_u64())
    }

    /// Render as a replayable log
    #[must_use]
    pub fn to_text(&self) -> String {
        let mut text = String::new();
        for (line_number, batch) in &self.batches {
            text.push_str(&format!("--- batch line number: {line_number}\n"));
            text.push_str(&batch.join("\n"));
            text.push('\n');
        }
        text
    }

    /// Write into `dir` under [`Self::file_name`]
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be written
    pub fn write_to(&self, dir: &Path) -> io::Result<PathBuf> {
        let path = dir.join(self.file_name());
        fs::write(&path, self.to_text())?;
        Ok(path)
    }
}

/// Which games to emit
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SliceConfig {
    /// Internal ids to keep; every game if `None`
    pub internal_game_ids: Option<BTreeSet<GameId>>,
}

impl SliceConfig {
    /// Emit every game
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit only these internal ids
    #[must_use]
    pub fn only(mut self, internal_game_ids: impl IntoIterator<Item = GameId>) -> Self {
        self.internal_game_ids = Some(internal_game_ids.into_iter().collect());
        self
    }

    fn wants(&self, internal_game_id: GameId) -> bool {
        self.internal_game_ids
            .as_ref()
            .is_none_or(|ids| ids.contains(&internal_game_id))
    }
}

/// Frame bookkeeping reset at every frame boundary
#[derive(Debug, Default)]
struct Frame {
    line_number: usize,
    lines: Vec<String>,
    game_id: Option<GameId>,
    added_client: Option<ClientId>,
    removed_client: Option<ClientId>,
    expired: Vec<GameId>,
}

/// Lazy sequence of sliced game logs.
///
/// A game's log is emitted when its expiry frame ends; games still open when
/// the log ends follow in creation order.
pub struct GameLogSlicer<R> {
    events: EventStream<R>,
    log_timestamp: LogTimestamp,
    config: SliceConfig,
    identity: IdentityMap,
    logs: IndexMap<GameId, SlicedGameLog>,
    connect_frames: BTreeMap<ClientId, (usize, Vec<String>)>,
    frame: Frame,
    ready: VecDeque<SlicedGameLog>,
    finished: bool,
}

impl<R: BufRead> GameLogSlicer<R> {
    /// Slice every game of a log written at `log_timestamp`
    pub fn new(reader: R, log_timestamp: LogTimestamp) -> Self {
        Self::with_config(reader, log_timestamp, SliceConfig::default())
    }

    /// Slice with a game filter
    pub fn with_config(reader: R, log_timestamp: LogTimestamp, config: SliceConfig) -> Self {
        Self {
            events: EventStream::new(reader, log_timestamp),
            log_timestamp,
            config,
            identity: IdentityMap::new(),
            logs: IndexMap::new(),
            connect_frames: BTreeMap::new(),
            frame: Frame {
                line_number: 1,
                ..Frame::default()
            },
            ready: VecDeque::new(),
            finished: false,
        }
    }

    fn process(&mut self, line: ClassifiedLine) {
        let boundary = line.is_frame_boundary();
        let line_number = line.line_number;
        self.frame.lines.push(line.raw);

        if let Some(event) = line.event {
            self.route(line_number, event);
        }

        if boundary {
            for result in self.identity.flush_pending() {
                match result {
                    Ok(client_id) => self.frame.removed_client = Some(client_id),
                    Err(client_id) => {
                        tracing::warn!(line = line_number, %client_id, "disconnect of unknown client");
                    }
                }
            }

            let frame = std::mem::replace(
                &mut self.frame,
                Frame {
                    line_number: line_number + 1,
                    ..Frame::default()
                },
            );
            self.complete(frame);
        }
    }

    fn route(&mut self, line_number: usize, event: ClassifiedEvent) {
        match event {
            ClassifiedEvent::Connect {
                client_id,
                username,
            } => {
                if self.identity.connect(client_id, &username) {
                    self.frame.added_client = Some(client_id);
                }
            }
            ClassifiedEvent::Disconnect { client_id } => self.identity.queue_disconnect(client_id),
            ClassifiedEvent::CommandToClient {
                client_ids,
                commands,
            } => {
                for command in &commands {
                    self.route_client_command(line_number, &client_ids, command);
                }
            }
            ClassifiedEvent::CommandToServer { client_id, command } => {
                self.route_server_command(client_id, &command);
            }
            ClassifiedEvent::LogEntry(entry) => self.route_entry(line_number, &entry),
            ClassifiedEvent::GameExpired { game_id } => self.frame.expired.push(game_id),
            ClassifiedEvent::Time(_)
            | ClassifiedEvent::ConnectionMade
            | ClassifiedEvent::BlankLine
            | ClassifiedEvent::Ignorable => {}
        }
    }

    fn route_client_command(&mut self, line_number: usize, client_ids: &[ClientId], command: &Command) {
        let Some(kind) = command.client_command() else {
            return;
        };
        let effect = match routing_effect(kind, command) {
            Ok(Some(effect)) => effect,
            Ok(None) => return,
            Err(err) => {
                tracing::warn!(line = line_number, error = %err, "command not routed");
                return;
            }
        };

        match effect {
            RoutingEffect::Attach { game_id, client_id } => {
                self.identity.attach(client_id, game_id);
                self.frame.game_id = Some(game_id);
            }
            RoutingEffect::Detach { client_id } => {
                if let Some(game_id) = self.identity.detach(client_id) {
                    self.frame.game_id = Some(game_id);
                }
            }
            RoutingEffect::DetachPlayer { game_id, player_id } => {
                let client_id = self
                    .logs
                    .get(&game_id)
                    .and_then(|log| log.player_id_to_username.get(&player_id))
                    .and_then(|username| self.identity.client_for(username));
                match client_id {
                    Some(client_id) => {
                        if self.identity.detach(client_id).is_some() {
                            self.frame.game_id = Some(game_id);
                        }
                    }
                    None => {
                        tracing::warn!(line = line_number, %game_id, player_id, "seat has no connected client");
                    }
                }
            }
            RoutingEffect::Touch => {
                let game_id = client_ids
                    .first()
                    .and_then(|client_id| self.identity.game_of(*client_id));
                match game_id {
                    Some(game_id) => self.frame.game_id = Some(game_id),
                    None => tracing::warn!(line = line_number, "game command for unrouted client"),
                }
            }
        }
    }

    fn route_server_command(&mut self, client_id: ClientId, command: &Command) {
        if command.server_command() != Some(ServerCommand::DoGameAction) {
            return;
        }
        let Some(game_id) = self.identity.game_of(client_id) else {
            return;
        };
        let seated = self
            .identity
            .username(client_id)
            .zip(self.logs.get(&game_id))
            .is_some_and(|(username, log)| log.username_to_player_id.contains_key(username));
        if seated {
            self.frame.game_id = Some(game_id);
        }
    }

    fn route_entry(&mut self, line_number: usize, entry: &LogEntry) {
        let Some(internal_game_id) = entry.u64("game-id").map(GameId::new) else {
            tracing::warn!(line = line_number, "log entry without game-id");
            return;
        };
        let game_id = entry
            .u64("external-game-id")
            .map_or(internal_game_id, GameId::new);

        if !self.logs.contains_key(&game_id) {
            let mut log = SlicedGameLog::new(self.log_timestamp, game_id, internal_game_id);
            for (line_number, lines) in self.connect_frames.values() {
                let lines = lines
                    .iter()
                    .filter(|line| !DISCONNECT_LINE.is_match(line))
                    .cloned()
                    .collect();
                log.batches.insert(*line_number, lines);
            }
            self.logs.insert(game_id, log);
        }

        if entry.kind() == Some("game-player") {
            let player_id = entry.u64("player-id").map(|id| id as usize);
            let username = entry.get("username").and_then(serde_json::Value::as_str);
            if let (Some(player_id), Some(username), Some(log)) =
                (player_id, username, self.logs.get_mut(&game_id))
            {
                log.player_id_to_username
                    .insert(player_id, username.to_string());
                log.username_to_player_id
                    .insert(username.to_string(), player_id);
            }
        }
        self.frame.game_id = Some(game_id);
    }

    fn complete(&mut self, frame: Frame) {
        let Frame {
            line_number,
            lines,
            game_id,
            added_client,
            removed_client,
            expired,
        } = frame;

        if added_client.is_some() || removed_client.is_some() {
            for log in self.logs.values_mut() {
                log.batches.insert(line_number, lines.clone());
            }
        }
        if let Some(client_id) = added_client {
            self.connect_frames
                .insert(client_id, (line_number, lines.clone()));
        }
        if let Some(client_id) = removed_client {
            self.connect_frames.remove(&client_id);
        }

        if let Some(log) = game_id.and_then(|game_id| self.logs.get_mut(&game_id)) {
            log.batches.insert(line_number, lines.clone());
        }

        for game_id in expired {
            match self.logs.shift_remove(&game_id) {
                Some(mut log) => {
                    log.batches.insert(line_number, lines.clone());
                    self.emit(log);
                }
                None => tracing::warn!(line = line_number, %game_id, "expiry of unknown game"),
            }
        }
    }

    fn emit(&mut self, log: SlicedGameLog) {
        if self.config.wants(log.internal_game_id) {
            self.ready.push_back(log);
        }
    }
}

impl<R: BufRead> Iterator for GameLogSlicer<R> {
    type Item = SlicedGameLog;

    fn next(&mut self) -> Option<SlicedGameLog> {
        loop {
            if let Some(log) = self.ready.pop_front() {
                return Some(log);
            }
            if self.finished {
                return None;
            }

            match self.events.next() {
                Some(line) => self.process(line),
                None => {
                    self.finished = true;
                    let open: Vec<SlicedGameLog> = self.logs.drain(..).map(|(_, log)| log).collect();
                    for log in open {
                        self.emit(log);
                    }
                }
            }
        }
    }
}

/// Slice every game of a log
pub fn slice_games<R: BufRead>(reader: R, log_timestamp: LogTimestamp) -> Vec<SlicedGameLog> {
    GameLogSlicer::new(reader, log_timestamp).collect()
}
