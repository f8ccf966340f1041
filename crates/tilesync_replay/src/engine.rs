//! Game state reconstruction from a classified event stream.
//!
//! The reconstructor consumes classified lines one at a time and keeps every
//! open game keyed by its external id. Games leave the table when the log says
//! they expired; the remaining ones are handed out, in creation order, when
//! the stream ends.

use crate::error::HandlerError;
use crate::identity::{IdentityMap, RoutingEffect, routing_effect};
use crate::state::Game;
use indexmap::IndexMap;
use std::collections::VecDeque;
use std::io::BufRead;
use tilesync_core::{ClientCommand, ClientId, GameId, LogTimestamp, ServerCommand};
use tilesync_log::{ClassifiedEvent, ClassifiedLine, Command, EventStream, LogEntry};

/// Rebuilds per-game client-visible state from one log
#[derive(Debug, Clone)]
pub struct Reconstructor {
    log_timestamp: LogTimestamp,
    identity: IdentityMap,
    games: IndexMap<GameId, Game>,
    expired: VecDeque<Game>,
    time: Option<f64>,
    line_number: usize,
    fault_count: usize,
}

impl Reconstructor {
    /// Create a reconstructor for a log written at `log_timestamp`
    #[must_use]
    pub fn new(log_timestamp: LogTimestamp) -> Self {
        Self {
            log_timestamp,
            identity: IdentityMap::new(),
            games: IndexMap::new(),
            expired: VecDeque::new(),
            time: None,
            line_number: 0,
            fault_count: 0,
        }
    }

    /// Timestamp of the log
    #[must_use]
    pub fn log_timestamp(&self) -> LogTimestamp {
        self.log_timestamp
    }

    /// Last `time:` value seen
    #[must_use]
    pub fn time(&self) -> Option<f64> {
        self.time
    }

    /// Line number of the last processed line
    #[must_use]
    pub fn line_number(&self) -> usize {
        self.line_number
    }

    /// Handler faults logged so far
    #[must_use]
    pub fn fault_count(&self) -> usize {
        self.fault_count
    }

    /// Connection identities
    #[must_use]
    pub fn identity(&self) -> &IdentityMap {
        &self.identity
    }

    /// Open games in creation order
    pub fn open_games(&self) -> impl Iterator<Item = &Game> {
        self.games.values()
    }

    /// Open game by external id
    #[must_use]
    pub fn game(&self, game_id: GameId) -> Option<&Game> {
        self.games.get(&game_id)
    }

    /// Apply one classified line.
    ///
    /// A fault in one command is logged and counted; the rest of the line and
    /// every later line are still applied.
    pub fn process(&mut self, line: &ClassifiedLine) {
        self.line_number = line.line_number;
        let Some(event) = &line.event else {
            return;
        };

        match event {
            ClassifiedEvent::Time(time) => self.time = Some(*time),
            ClassifiedEvent::Connect {
                client_id,
                username,
            } => {
                self.identity.connect(*client_id, username);
            }
            ClassifiedEvent::Disconnect { client_id } => {
                self.identity.queue_disconnect(*client_id);
            }
            ClassifiedEvent::CommandToClient {
                client_ids,
                commands,
            } => {
                for command in commands {
                    if let Err(err) = self.apply_client_command(client_ids, command) {
                        self.fault(&err);
                    }
                }
            }
            ClassifiedEvent::CommandToServer { client_id, command } => {
                if let Err(err) = self.apply_server_command(*client_id, command) {
                    self.fault(&err);
                }
            }
            ClassifiedEvent::LogEntry(entry) => {
                if let Err(err) = self.apply_log_entry(entry) {
                    self.fault(&err);
                }
            }
            ClassifiedEvent::GameExpired { game_id } => {
                if let Err(err) = self.expire(*game_id) {
                    self.fault(&err);
                }
            }
            ClassifiedEvent::ConnectionMade
            | ClassifiedEvent::BlankLine
            | ClassifiedEvent::Ignorable => self.end_frame(),
        }
    }

    /// Take the games that expired since the last call, in expiry order
    pub fn take_expired(&mut self) -> Vec<Game> {
        self.expired.drain(..).collect()
    }

    /// Take every game still open, in creation order
    pub fn finish(&mut self) -> Vec<Game> {
        self.games.drain(..).map(|(_, game)| game).collect()
    }

    fn fault(&mut self, err: &HandlerError) {
        self.fault_count += 1;
        tracing::warn!(line = self.line_number, error = %err, "event not applied");
    }

    fn end_frame(&mut self) {
        for result in self.identity.flush_pending() {
            if let Err(client_id) = result {
                self.fault(&HandlerError::UnknownClient(client_id));
            }
        }
    }

    fn expire(&mut self, game_id: GameId) -> Result<(), HandlerError> {
        let mut game = self
            .games
            .shift_remove(&game_id)
            .ok_or(HandlerError::UnknownGame(game_id))?;
        tracing::debug!(%game_id, internal_game_id = %game.internal_game_id, "game expired");
        game.expired = true;
        self.expired.push_back(game);
        Ok(())
    }

    fn apply_log_entry(&mut self, entry: &LogEntry) -> Result<(), HandlerError> {
        let internal_game_id = entry
            .u64("game-id")
            .map(GameId::new)
            .ok_or_else(|| HandlerError::entry("game-id", entry.get("game-id")))?;
        let game_id = entry
            .u64("external-game-id")
            .map_or(internal_game_id, GameId::new);

        let log_timestamp = self.log_timestamp;
        self.games
            .entry(game_id)
            .or_insert_with(|| Game::new(log_timestamp, game_id, internal_game_id))
            .apply_entry(entry)
    }

    fn apply_server_command(&mut self, client_id: ClientId, command: &Command) -> Result<(), HandlerError> {
        if command.server_command() != Some(ServerCommand::DoGameAction) {
            return Ok(());
        }
        // Actions from the lobby are not game actions
        let Some(game_id) = self.identity.game_of(client_id) else {
            return Ok(());
        };

        let username = self
            .identity
            .username(client_id)
            .ok_or(HandlerError::UnknownClient(client_id))?;
        let game = self
            .games
            .get_mut(&game_id)
            .ok_or(HandlerError::UnknownGame(game_id))?;
        // Watchers can send actions too; the server ignores them
        if let Some(player_id) = game.player_id(username) {
            game.record_action(player_id, command.args().to_vec());
        }
        Ok(())
    }

    fn apply_client_command(
        &mut self,
        client_ids: &[ClientId],
        command: &Command,
    ) -> Result<(), HandlerError> {
        let Some(kind) = command.client_command() else {
            tracing::debug!(line = self.line_number, code = ?command.code(), "unknown command code");
            return Ok(());
        };

        match routing_effect(kind, command)? {
            None => Ok(()),
            Some(RoutingEffect::Attach { game_id, client_id }) => {
                self.identity.attach(client_id, game_id);
                Ok(())
            }
            Some(RoutingEffect::Detach { client_id }) => {
                self.identity.detach(client_id);
                Ok(())
            }
            Some(RoutingEffect::DetachPlayer { game_id, player_id }) => {
                self.detach_player(game_id, player_id)
            }
            Some(RoutingEffect::Touch) => self.apply_game_command(kind, client_ids, command),
        }
    }

    fn detach_player(&mut self, game_id: GameId, player_id: usize) -> Result<(), HandlerError> {
        let Some(game) = self.games.get(&game_id) else {
            return Ok(());
        };
        let username = game
            .player_id_to_username
            .get(&player_id)
            .ok_or(HandlerError::EmptySeat { game_id, player_id })?;
        let client_id = self
            .identity
            .client_for(username)
            .ok_or_else(|| HandlerError::UnknownUsername(username.clone()))?;
        self.identity.detach(client_id);
        Ok(())
    }

    fn apply_game_command(
        &mut self,
        kind: ClientCommand,
        client_ids: &[ClientId],
        command: &Command,
    ) -> Result<(), HandlerError> {
        use ClientCommand as C;

        match kind {
            C::AddGameHistoryMessage => {
                let message = command.args().to_vec();
                for &client_id in client_ids {
                    let (game, username) = self.recipient(client_id)?;
                    if game.player_id(&username).is_some() {
                        game.push_history(&username, message.clone())?;
                    }
                }
                return Ok(());
            }
            C::AddGameHistoryMessages => {
                let messages = command
                    .array(1)?
                    .iter()
                    .map(|message| {
                        message.as_array().cloned().ok_or_else(|| HandlerError::MalformedEntry {
                            field: "history message",
                            value: message.to_string(),
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                for &client_id in client_ids {
                    let (game, username) = self.recipient(client_id)?;
                    if game.player_id(&username).is_some() {
                        game.replace_history(&username, messages.clone())?;
                    }
                }
                return Ok(());
            }
            _ => {}
        }

        let client_id = *client_ids.first().ok_or(HandlerError::NoRecipient)?;
        let (game, username) = self.recipient(client_id)?;

        match kind {
            C::SetGameBoardCell => game.set_board_cell(command.tile(1)?, command.int(3)?),
            C::SetScoreSheetCell => {
                game.set_score_sheet_cell(command.index(1)?, command.index(2)?, command.int(3)?)?;
            }
            C::SetScoreSheet => game.set_score_sheet(command.arg(1)?)?,
            C::SetTile => {
                let player_id = seat(game, &username)?;
                game.set_tile(player_id, command.index(1)?, command.tile(2)?)?;
            }
            C::RemoveTile => {
                let player_id = seat(game, &username)?;
                game.remove_tile(player_id, command.index(1)?)?;
            }
            // Routing commands never reach here
            _ => {}
        }
        Ok(())
    }

    /// The game a recipient is routed to, with the recipient's username
    fn recipient(&mut self, client_id: ClientId) -> Result<(&mut Game, String), HandlerError> {
        let game_id = self
            .identity
            .game_of(client_id)
            .ok_or(HandlerError::UnroutedClient(client_id))?;
        let username = self
            .identity
            .username(client_id)
            .ok_or(HandlerError::UnknownClient(client_id))?
            .to_string();
        let game = self
            .games
            .get_mut(&game_id)
            .ok_or(HandlerError::UnknownGame(game_id))?;
        Ok((game, username))
    }

    /// Consume a whole log, calling `on_frame` after every frame boundary.
    ///
    /// Returns every game: expired ones in expiry order, then the games still
    /// open at the end in creation order.
    pub fn run_with_callback<R, F>(reader: R, log_timestamp: LogTimestamp, mut on_frame: F) -> Vec<Game>
    where
        R: BufRead,
        F: FnMut(usize, &Reconstructor),
    {
        let mut reconstructor = Self::new(log_timestamp);
        let mut games = Vec::new();

        for line in EventStream::new(reader, log_timestamp) {
            reconstructor.process(&line);
            if line.is_frame_boundary() {
                on_frame(line.line_number, &reconstructor);
            }
            games.extend(reconstructor.take_expired());
        }

        games.extend(reconstructor.finish());
        games
    }
}

fn seat(game: &Game, username: &str) -> Result<usize, HandlerError> {
    game.player_id(username)
        .ok_or_else(|| HandlerError::UnseatedUsername {
            game_id: game.game_id,
            username: username.to_string(),
        })
}

/// Lazy sequence of reconstructed games.
///
/// Expired games are yielded as soon as their expiry line is read. Once the
/// log is exhausted the games still open follow in creation order.
pub struct GameStream<R> {
    events: EventStream<R>,
    reconstructor: Reconstructor,
    ready: VecDeque<Game>,
    finished: bool,
}

impl<R: BufRead> GameStream<R> {
    /// Stream the games of a log written at `log_timestamp`
    pub fn new(reader: R, log_timestamp: LogTimestamp) -> Self {
        Self {
            events: EventStream::new(reader, log_timestamp),
            reconstructor: Reconstructor::new(log_timestamp),
            ready: VecDeque::new(),
            finished: false,
        }
    }

    /// Reconstructor state so far
    #[must_use]
    pub fn reconstructor(&self) -> &Reconstructor {
        &self.reconstructor
    }
}

impl<R: BufRead> Iterator for GameStream<R> {
    type Item = Game;

    fn next(&mut self) -> Option<Game> {
        loop {
            if let Some(game) = self.ready.pop_front() {
                return Some(game);
            }
            if self.finished {
                return None;
            }

            match self.events.next() {
                Some(line) => {
                    self.reconstructor.process(&line);
                    self.ready.extend(self.reconstructor.take_expired());
                }
                None => {
                    self.finished = true;
                    self.ready.extend(self.reconstructor.finish());
                }
            }
        }
    }
}

/// Reconstruct every game of a log
pub fn reconstruct_games<R: BufRead>(reader: R, log_timestamp: LogTimestamp) -> Vec<Game> {
    GameStream::new(reader, log_timestamp).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tilesync_core::{GameBoardType, Tile};

    const TS: LogTimestamp = 1_500_000_000;

    fn games(log: &str) -> Vec<Game> {
        reconstruct_games(log.as_bytes(), TS)
    }

    /// Two seated players in game 7, routed and connected
    const SETUP: &str = "\
time: 100.0
1 connect alice 10.0.0.1 tok
2 connect bob 10.0.0.2 tok

{\"_\":\"game\",\"game-id\":7,\"state\":\"InProgress\",\"mode\":\"Singles\",\"max-players\":4}
{\"_\":\"game-player\",\"game-id\":7,\"player-id\":0,\"username\":\"alice\"}
{\"_\":\"game-player\",\"game-id\":7,\"player-id\":1,\"username\":\"bob\"}
1,2 <- [[8,7,0,1],[8,7,1,2]]

";

    #[test]
    fn test_game_player_entry_opens_game() {
        let log = "time: 100.0\n{\"_\":\"game-player\",\"game-id\":7,\"player-id\":0,\"username\":\"alice\"}\n\n";
        let games = games(log);
        assert_eq!(games.len(), 1);

        let game = &games[0];
        assert_eq!(game.internal_game_id, GameId::new(7));
        assert_eq!(game.player_id_to_username.len(), 1);
        assert_eq!(game.player_id_to_username[&0], "alice");
        assert_eq!(game.board.occupied_count(), 0);
        assert!(game.played_tiles_order.is_empty());
        assert!(game.tile_rack_tiles.is_empty());
        assert!(!game.expired);
    }

    #[test]
    fn test_board_move_then_expiry() {
        let log = format!(
            "{SETUP}1 <- [[18,2,4,5]]\n\n1,2 <- [[4,4,5,{}]]\n\ngame #7 expired\n",
            GameBoardType::NothingYet.code()
        );
        let games = games(&log);
        assert_eq!(games.len(), 1);

        let game = &games[0];
        assert!(game.expired);
        assert_eq!(game.played_tiles_order, vec![Tile::new(4, 5)]);
        assert_eq!(game.initial_tile_racks[0][2], Some(Tile::new(4, 5)));
        assert_eq!(game.tile_racks[0][2], None);
        assert_eq!(game.board.get(Tile::new(4, 5)), GameBoardType::NothingYet.code());
    }

    #[test]
    fn test_expired_games_come_first() {
        let log = "\
{\"_\":\"game\",\"game-id\":1}
{\"_\":\"game\",\"game-id\":2}
{\"_\":\"game\",\"game-id\":3}
game #2 expired

";
        let ids: Vec<u64> = games(log)
            .iter()
            .map(|game| game.game_id.as_u64())
            .collect();
        assert_eq!(ids, vec![2, 1, 3]);
    }

    #[test]
    fn test_external_game_id_keys_games() {
        let log = "{\"_\":\"game\",\"game-id\":40,\"external-game-id\":3}\n";
        let games = games(log);
        assert_eq!(games[0].game_id, GameId::new(3));
        assert_eq!(games[0].internal_game_id, GameId::new(40));
    }

    #[test]
    fn test_faults_do_not_stop_processing() {
        let log = "\
game #99 expired
{\"_\":\"game\"}
{\"_\":\"game\",\"game-id\":5}

";
        let mut reconstructor = Reconstructor::new(TS);
        for line in EventStream::new(log.as_bytes(), TS) {
            reconstructor.process(&line);
        }
        assert_eq!(reconstructor.fault_count(), 2);
        assert!(reconstructor.game(GameId::new(5)).is_some());
    }

    #[test]
    fn test_disconnect_applies_at_frame_end() {
        let log = format!("{SETUP}2 disconnect\n2 -> [5,1,4,5]\n\n2 -> [5,1,4,6]\n\n");
        let games = games(&log);
        let game = &games[0];
        // The action in the disconnect's own frame still counts
        assert_eq!(game.actions.len(), 1);
        assert_eq!(game.actions[0].player_id, 1);
        assert_eq!(game.actions[0].action, vec![json!(1), json!(4), json!(5)]);
    }

    #[test]
    fn test_actions_only_from_seated_players() {
        let log = format!("{SETUP}3 connect carol 10.0.0.3 tok\n3 <- [[12,7,3]]\n3 -> [5,1,0,0]\n1 -> [5,1,0,1]\n1 -> [1]\n\n");
        let games = games(&log);
        let game = &games[0];
        assert_eq!(game.actions.len(), 1);
        assert_eq!(game.actions[0].player_id, 0);
    }

    #[test]
    fn test_history_delivered_per_recipient() {
        let log = format!(
            "{SETUP}1,2 <- [[14,{},0,1,1]]\n\n2 <- [[14,{},1,2,2]]\n\n",
            tilesync_core::GameHistoryMessage::DrewPositionTile.code(),
            tilesync_core::GameHistoryMessage::DrewTile.code(),
        );
        let games = games(&log);
        let game = &games[0];
        assert_eq!(game.username_to_game_history["alice"], vec![vec![json!(1), json!("alice"), json!(1), json!(1)]]);
        assert_eq!(game.username_to_game_history["bob"].len(), 2);
    }

    #[test]
    fn test_history_replaced() {
        let log = format!("{SETUP}1 <- [[14,0]]\n1 <- [[15,[[0],[3,0,2,2]]]]\n\n");
        let games = games(&log);
        assert_eq!(
            games[0].username_to_game_history["alice"],
            vec![vec![json!(0)], vec![json!(3), json!(0), json!(2), json!(2)]]
        );
    }

    #[test]
    fn test_watchers_get_no_history() {
        let log = format!("{SETUP}3 connect carol 10.0.0.3 tok\n3 <- [[12,7,3]]\n1,3 <- [[14,0]]\n\n");
        let games = games(&log);
        assert!(!games[0].username_to_game_history.contains_key("carol"));
        assert_eq!(games[0].username_to_game_history["alice"].len(), 1);
    }

    #[test]
    fn test_score_sheet_commands() {
        let log = format!(
            "{SETUP}1 <- [[6,0,7,55],[6,6,1,3]]\n1 <- [[7,[[[1,2,3,4,5,6,7,8]],[1,1,1,1,1,1,1]]]]\n\n"
        );
        let games = games(&log);
        let game = &games[0];
        assert_eq!(game.score_sheet_players[0], [1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(game.score_sheet_chain_size, [1; 7]);
    }

    #[test]
    fn test_remove_tile() {
        let log = format!("{SETUP}2 <- [[18,0,1,1]]\n2 <- [[20,0]]\n\n");
        let games = games(&log);
        assert_eq!(games[0].tile_racks[1][0], None);
        assert_eq!(games[0].initial_tile_racks[1][0], Some(Tile::new(1, 1)));
    }

    #[test]
    fn test_leave_stops_routing() {
        let log = format!("{SETUP}1 <- [[10,7,0,1]]\n1 <- [[18,0,1,1]]\n\n");
        let mut reconstructor = Reconstructor::new(TS);
        for line in EventStream::new(log.as_bytes(), TS) {
            reconstructor.process(&line);
        }
        assert_eq!(reconstructor.identity().game_of(ClientId::new(1)), None);
        assert_eq!(reconstructor.fault_count(), 1);
    }

    #[test]
    fn test_defunct_player_client_id_detaches_seat() {
        let log = format!("{SETUP}2 <- [[25,7,1,null]]\n\n");
        let mut reconstructor = Reconstructor::new(TS);
        for line in EventStream::new(log.as_bytes(), TS) {
            reconstructor.process(&line);
        }
        assert_eq!(reconstructor.identity().game_of(ClientId::new(2)), None);
        assert_eq!(reconstructor.identity().game_of(ClientId::new(1)), Some(GameId::new(7)));
    }

    #[test]
    fn test_run_with_callback_sees_each_frame() {
        let mut frames = Vec::new();
        let games = Reconstructor::run_with_callback(SETUP.as_bytes(), TS, |line_number, reconstructor| {
            frames.push((line_number, reconstructor.open_games().count()));
        });
        assert_eq!(frames, vec![(4, 0), (9, 1)]);
        assert_eq!(games.len(), 1);
    }

    #[test]
    fn test_stream_stops_at_second_connection_made() {
        let log = "connection_made\n{\"_\":\"game\",\"game-id\":1}\nconnection_made\n{\"_\":\"game\",\"game-id\":2}\n";
        let games = games(log);
        assert_eq!(games.len(), 1);
        assert_eq!(games[0].game_id, GameId::new(1));
    }
}
