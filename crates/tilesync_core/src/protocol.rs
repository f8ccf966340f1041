//! Wire-level enum vocabulary.
//!
//! Every enum here is transmitted as its position in the current ordered name
//! list. Old logs used different orderings for some families; the translation
//! layer in `tilesync_log` maps those back onto the orderings defined here.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};

macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $family:literal {
            $($(#[$vmeta:meta])* $variant:ident),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            /// Every variant, in wire order
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Symbolic names, in wire order
            pub const NAMES: &'static [&'static str] = &[$(stringify!($variant)),+];

            /// Family name used in diagnostics
            pub const FAMILY: &'static str = $family;

            /// Look up a variant by its current wire code
            #[must_use]
            pub fn from_code(code: i64) -> Option<Self> {
                usize::try_from(code)
                    .ok()
                    .and_then(|index| Self::ALL.get(index).copied())
            }

            /// Look up a variant by wire code, reporting unknown codes
            ///
            /// # Errors
            ///
            /// Returns error if the code is outside the family
            pub fn try_from_code(code: i64) -> CoreResult<Self> {
                Self::from_code(code).ok_or_else(|| CoreError::UnknownCode {
                    family: $family.to_string(),
                    code,
                })
            }

            /// Look up a variant by its symbolic name
            ///
            /// # Errors
            ///
            /// Returns error if the name is not part of the family
            pub fn from_name(name: &str) -> CoreResult<Self> {
                Self::NAMES
                    .iter()
                    .position(|candidate| *candidate == name)
                    .map(|index| Self::ALL[index])
                    .ok_or_else(|| CoreError::UnknownName {
                        family: $family.to_string(),
                        name: name.to_string(),
                    })
            }

            /// Current wire code
            #[must_use]
            pub fn code(self) -> i64 {
                self as i64
            }

            /// Symbolic name
            #[must_use]
            pub fn name(self) -> &'static str {
                Self::NAMES[self as usize]
            }
        }
    };
}

wire_enum! {
    /// Commands sent from the server to clients.
    ///
    /// The last two variants are defunct: current servers never send them, but
    /// logs from before they were retired still contain them.
    ClientCommand, "CommandsToClient" {
        /// Fatal error; argument 1 is an error code
        FatalError,
        /// Assigns the receiving client its id
        SetClientId,
        /// Announces a client's username and ip
        SetClientIdToData,
        /// Game lifecycle change
        SetGameState,
        /// Sets one board cell to a board type
        SetGameBoardCell,
        /// Replaces the whole board
        SetGameBoard,
        /// Sets one score-sheet cell
        SetScoreSheetCell,
        /// Replaces the whole score sheet
        SetScoreSheet,
        /// A player joined a game
        SetGamePlayerJoin,
        /// A player rejoined a game
        SetGamePlayerRejoin,
        /// A player left a game
        SetGamePlayerLeave,
        /// A player seat is held for a missing player
        SetGamePlayerJoinMissing,
        /// A watcher attached to a game
        SetGameWatcherClientId,
        /// A watcher returned to the lobby
        ReturnWatcherToLobby,
        /// Appends one history message
        AddGameHistoryMessage,
        /// Replaces the full history
        AddGameHistoryMessages,
        /// Turn indicator
        SetTurn,
        /// Pending action prompt
        SetGameAction,
        /// Places a tile in a rack slot
        SetTile,
        /// Rack tile hint
        SetTileGameBoardType,
        /// Empties a rack slot
        RemoveTile,
        /// Lobby chat
        AddGlobalChatMessage,
        /// Game chat
        AddGameChatMessage,
        /// Game removed from the lobby
        DestroyGame,
        /// Defunct: player username announcement
        SetGamePlayerUsername,
        /// Defunct: player seat to client id assignment
        SetGamePlayerClientId,
    }
}

impl ClientCommand {
    /// True for the player-identity commands that route a client to a game
    #[must_use]
    pub fn is_set_game_player(self) -> bool {
        self.name().starts_with("SetGamePlayer")
    }
}

wire_enum! {
    /// Commands sent from clients to the server.
    ServerCommand, "CommandsToServer" {
        /// Create a game
        CreateGame,
        /// Join a game
        JoinGame,
        /// Rejoin a game
        RejoinGame,
        /// Watch a game
        WatchGame,
        /// Leave a game
        LeaveGame,
        /// Perform a game action; argument 1 is the action id
        DoGameAction,
        /// Lobby chat
        SendGlobalChatMessage,
        /// Game chat
        SendGameChatMessage,
    }
}

wire_enum! {
    /// Error codes carried by `FatalError`.
    ErrorCode, "Errors" {
        /// Client version is stale
        NotUsingLatestVersion,
        /// Unspecified failure
        GenericError,
        /// Username rejected
        InvalidUsername,
        /// Password rejected
        InvalidPassword,
        /// Password required
        MissingPassword,
        /// Password given for an account without one
        ProvidedPassword,
        /// Password does not match
        IncorrectPassword,
        /// Confirmation does not match
        NonMatchingPasswords,
        /// Account already has a password
        ExistingPassword,
        /// Username already connected
        UsernameAlreadyInUse,
    }
}

wire_enum! {
    /// Narrative history messages delivered to players.
    GameHistoryMessage, "GameHistoryMessages" {
        /// Delimits turns
        TurnBegan,
        /// Initial position draw; argument 1 is a player index or username
        DrewPositionTile,
        /// Game started
        StartedGame,
        /// Tile drawn into a rack
        DrewTile,
        /// Player has no playable tile
        HasNoPlayableTile,
        /// Tile placed on the board
        PlayedTile,
        /// Chain founded
        FormedChain,
        /// Chains merged
        MergedChains,
        /// Merger survivor chosen
        SelectedMergerSurvivor,
        /// Next defunct chain chosen
        SelectedChainToDisposeOfNext,
        /// Majority or minority bonus
        ReceivedBonus,
        /// Shares sold or traded
        DisposedOfShares,
        /// No affordable shares
        CouldNotAffordAnyShares,
        /// Shares bought
        PurchasedShares,
        /// Bag emptied
        DrewLastTile,
        /// Dead tile swapped for a new one
        ReplacedDeadTile,
        /// Game over
        EndedGame,
        /// Full round without a placement
        NoTilesPlayedForEntireRound,
        /// Every tile placed
        AllTilesPlayed,
    }
}

impl GameHistoryMessage {
    /// True for messages that reveal a tile leaving the bag
    #[must_use]
    pub fn is_draw_or_replace(self) -> bool {
        matches!(
            self,
            Self::DrewPositionTile | Self::DrewTile | Self::ReplacedDeadTile
        )
    }
}

wire_enum! {
    /// Board cell contents and rack-tile hints.
    GameBoardType, "GameBoardTypes" {
        /// Chain
        Luxor,
        /// Chain
        Tower,
        /// Chain
        American,
        /// Chain
        Festival,
        /// Chain
        Worldwide,
        /// Chain
        Continental,
        /// Chain
        Imperial,
        /// Empty cell
        Nothing,
        /// Placed tile not yet in a chain
        NothingYet,
        /// Permanently unplayable
        CantPlayEver,
        /// Tile is in the viewer's rack
        IHaveThis,
        /// Rack hint
        WillPutLonelyTileDown,
        /// Rack hint
        HaveNeighboringTileToo,
        /// Rack hint
        WillFormNewChain,
        /// Rack hint
        WillMergeChains,
        /// Temporarily unplayable
        CantPlayNow,
    }
}

wire_enum! {
    /// Game modes.
    GameMode, "GameModes" {
        /// Every player for themselves
        Singles,
        /// Two teams of two
        Teams,
    }
}

/// Enum families whose wire numbering changed over the life of the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EnumFamily {
    /// Server to client commands
    CommandsToClient,
    /// Fatal error codes
    Errors,
}

impl EnumFamily {
    /// Current ordered name list of the family
    #[must_use]
    pub fn current_names(self) -> &'static [&'static str] {
        match self {
            Self::CommandsToClient => ClientCommand::NAMES,
            Self::Errors => ErrorCode::NAMES,
        }
    }
}
