//! Who is connected, under which name, and which game they are looking at.
//!
//! Shared by the reconstructor and the slicer. Both route command batches to
//! games through the same [`routing_effect`] classification so that a frame
//! the slicer assigns to a game is exactly a frame the reconstructor applies to
//! that game.

use std::collections::BTreeMap;
use tilesync_core::{ClientCommand, ClientId, GameId};
use tilesync_log::{Command, CommandError};

/// Connection identities and game routing for one log
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityMap {
    client_to_username: BTreeMap<ClientId, String>,
    username_to_client: BTreeMap<String, ClientId>,
    client_to_game: BTreeMap<ClientId, GameId>,
    pending_disconnects: Vec<ClientId>,
}

impl IdentityMap {
    /// Create an empty map
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a connection. Returns true if the client's username changed.
    pub fn connect(&mut self, client_id: ClientId, username: &str) -> bool {
        let changed = self.username(client_id) != Some(username);
        self.client_to_username
            .insert(client_id, username.to_string());
        self.username_to_client
            .insert(username.to_string(), client_id);
        changed
    }

    /// Queue a disconnect until the end of the current frame
    pub fn queue_disconnect(&mut self, client_id: ClientId) {
        self.pending_disconnects.push(client_id);
    }

    /// True if disconnects are waiting for the frame to end
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.pending_disconnects.is_empty()
    }

    /// Apply queued disconnects in order.
    ///
    /// Returns one result per queued client: the client if it was known, an
    /// error otherwise. Game routing is left alone.
    pub fn flush_pending(&mut self) -> Vec<Result<ClientId, ClientId>> {
        let pending = std::mem::take(&mut self.pending_disconnects);
        if pending.is_empty() {
            return Vec::new();
        }

        let results = pending
            .into_iter()
            .map(|client_id| match self.client_to_username.remove(&client_id) {
                Some(_) => Ok(client_id),
                None => Err(client_id),
            })
            .collect();

        self.username_to_client = self
            .client_to_username
            .iter()
            .map(|(client_id, username)| (username.clone(), *client_id))
            .collect();

        results
    }

    /// Username of a connected client
    #[must_use]
    pub fn username(&self, client_id: ClientId) -> Option<&str> {
        self.client_to_username.get(&client_id).map(String::as_str)
    }

    /// Latest client connected under a username
    #[must_use]
    pub fn client_for(&self, username: &str) -> Option<ClientId> {
        self.username_to_client.get(username).copied()
    }

    /// Game a client is routed to
    #[must_use]
    pub fn game_of(&self, client_id: ClientId) -> Option<GameId> {
        self.client_to_game.get(&client_id).copied()
    }

    /// Route a client to a game
    pub fn attach(&mut self, client_id: ClientId, game_id: GameId) {
        self.client_to_game.insert(client_id, game_id);
    }

    /// Stop routing a client; returns the game it was routed to
    pub fn detach(&mut self, client_id: ClientId) -> Option<GameId> {
        self.client_to_game.remove(&client_id)
    }

    /// Number of connected clients
    #[must_use]
    pub fn connected_count(&self) -> usize {
        self.client_to_username.len()
    }
}

/// How one server-to-client command affects routing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingEffect {
    /// A client now belongs to a game (join, rejoin, watch)
    Attach {
        /// Game
        game_id: GameId,
        /// Client
        client_id: ClientId,
    },
    /// A client left whatever game it was in
    Detach {
        /// Client
        client_id: ClientId,
    },
    /// A seat lost its client; resolved through the game's seating
    DetachPlayer {
        /// Game
        game_id: GameId,
        /// Seat
        player_id: usize,
    },
    /// The command changes the state of the first recipient's game
    Touch,
}

/// Classify a command's effect on routing.
///
/// `None` for commands that neither move clients nor change game state.
///
/// # Errors
///
/// Returns error if a routing command lacks its arguments
pub fn routing_effect(
    kind: ClientCommand,
    command: &Command,
) -> Result<Option<RoutingEffect>, CommandError> {
    use ClientCommand as C;

    let effect = match kind {
        C::SetGamePlayerJoin | C::SetGamePlayerRejoin => RoutingEffect::Attach {
            game_id: command.game_id(1)?,
            client_id: command.client_id(3)?,
        },
        C::SetGamePlayerLeave => RoutingEffect::Detach {
            client_id: command.client_id(3)?,
        },
        C::SetGameWatcherClientId => RoutingEffect::Attach {
            game_id: command.game_id(1)?,
            client_id: command.client_id(2)?,
        },
        C::ReturnWatcherToLobby => RoutingEffect::Detach {
            client_id: command.client_id(2)?,
        },
        C::SetGamePlayerClientId => {
            if command.is_null(3)? {
                RoutingEffect::DetachPlayer {
                    game_id: command.game_id(1)?,
                    player_id: command.index(2)?,
                }
            } else {
                RoutingEffect::Attach {
                    game_id: command.game_id(1)?,
                    client_id: command.client_id(3)?,
                }
            }
        }
        C::SetGameBoardCell
        | C::SetScoreSheetCell
        | C::SetScoreSheet
        | C::AddGameHistoryMessage
        | C::AddGameHistoryMessages
        | C::SetTile
        | C::RemoveTile => RoutingEffect::Touch,
        // Lobby, chat and UI-only commands
        C::FatalError
        | C::SetClientId
        | C::SetClientIdToData
        | C::SetGameState
        | C::SetGameBoard
        | C::SetGamePlayerJoinMissing
        | C::SetTurn
        | C::SetGameAction
        | C::SetTileGameBoardType
        | C::AddGlobalChatMessage
        | C::AddGameChatMessage
        | C::DestroyGame
        | C::SetGamePlayerUsername => return Ok(None),
    };

    Ok(Some(effect))
}
