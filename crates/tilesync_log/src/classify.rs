//! Line classifier.
//!
//! Patterns are tried in a fixed order and the first one whose payload also
//! decodes wins. A pattern that matches but whose payload does not decode
//! falls through to the later patterns; several of those exist only to catch
//! lines that the server printed interleaved with an error report.

use crate::event::{ClassifiedEvent, Command, LogEntry};
use crate::translate::TranslationTable;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::{Map, Value};
use tilesync_core::{ClientCommand, ClientId, GameId, LogTimestamp};

/// Shapes a log line can take, in matching order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LineShape {
    /// `time: <float>`
    Time,
    /// `<id>[,<id>...] <- <json>`
    CommandToClient,
    /// Empty line
    BlankLine,
    /// `<id> -> <json>`
    CommandToServer,
    /// `{...}`
    LogEntry,
    /// `<id> connect <username> <ip> <token> [True|False]`
    Connect,
    /// `<id> disconnect`
    Disconnect,
    /// `game #<id> expired [(internal #<id>)]`
    GameExpired,
    /// `<id> connect <ip> <username>`, the oldest connect format
    LegacyConnect,
    /// `<n> -> <id> disconnect`, a disconnect printed inside an error report
    DisconnectAfterError,
    /// `<n> connect <id> -> <json>`, a command printed inside a connect error
    CommandToServerAfterConnect,
    /// `connection_made`
    ConnectionMade,
    /// Tracebacks and socket noise
    Ignorable,
}

struct LinePattern {
    shape: LineShape,
    regex: Regex,
}

const IGNORABLE_PREFIXES: &[&str] = &[
    r"^ ",
    r"^AttributeError:",
    r"^connection_lost$",
    r"^Exception in callback ",
    r"^handle:",
    r"^ImportError:",
    r"^socket\.send\(\) raised exception\.$",
    r"^Traceback \(most recent call last\):",
    r"^UnicodeEncodeError:",
];

static LINE_PATTERNS: Lazy<Vec<LinePattern>> = Lazy::new(|| {
    let ignorable = IGNORABLE_PREFIXES.join("|");
    let table: [(LineShape, &str); 13] = [
        (LineShape::Time, r"^time: (?P<time>[\d\.]+)$"),
        (LineShape::CommandToClient, r"^(?P<client_ids>[\d,]+) <- (?P<commands>.*)"),
        (LineShape::BlankLine, r"^$"),
        (LineShape::CommandToServer, r"^(?P<client_id>\d+) -> (?P<command>.*)"),
        (LineShape::LogEntry, r"^(?P<entry>\{.*)"),
        (
            LineShape::Connect,
            r"^(?P<client_id>\d+) connect (?P<username>.+) \d+\.\d+\.\d+\.\d+ \S+(?: (?:True|False))?$",
        ),
        (LineShape::Disconnect, r"^(?P<client_id>\d+) disconnect$"),
        (
            LineShape::GameExpired,
            r"^game #(?P<game_id>\d+) expired(?: \(internal #\d+\))?$",
        ),
        (
            LineShape::LegacyConnect,
            r"^(?P<client_id>\d+) connect \d+\.\d+\.\d+\.\d+ (?P<username>.+)$",
        ),
        (
            LineShape::DisconnectAfterError,
            r"^\d+ -> (?P<client_id>\d+) disconnect$",
        ),
        (
            LineShape::CommandToServerAfterConnect,
            r"^\d+ connect (?P<client_id>\d+) -> (?P<command>.*)",
        ),
        (LineShape::ConnectionMade, r"^connection_made$"),
        (LineShape::Ignorable, ignorable.as_str()),
    ];

    table
        .iter()
        .map(|(shape, pattern)| LinePattern {
            shape: *shape,
            regex: Regex::new(pattern).expect("line pattern compiles"),
        })
        .collect()
});

/// Outcome of classifying one line
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    /// The line is an event
    Event(ClassifiedEvent),
    /// No pattern recognised the line
    Unrecognized,
    /// A second `connection_made`: the server restarted into the same file
    /// and nothing after this point belongs to the trace being analysed
    Stop,
}

/// Stateful classifier for the lines of one log file
pub struct LineClassifier {
    patterns: &'static [LinePattern],
    translation: TranslationTable,
    connection_made_count: usize,
}

impl LineClassifier {
    /// Classifier for a log written at `log_timestamp`
    #[must_use]
    pub fn new(log_timestamp: LogTimestamp) -> Self {
        Self::with_translation(TranslationTable::for_timestamp(log_timestamp))
    }

    /// Classifier with an explicit translation table
    #[must_use]
    pub fn with_translation(translation: TranslationTable) -> Self {
        Self {
            patterns: LINE_PATTERNS.as_slice(),
            translation,
            connection_made_count: 0,
        }
    }

    /// Translation table in use
    #[must_use]
    pub fn translation(&self) -> &TranslationTable {
        &self.translation
    }

    /// Classify one line, given without its newline
    pub fn classify(&mut self, line: &str) -> Classification {
        for pattern in self.patterns {
            let Some(captures) = pattern.regex.captures(line) else {
                continue;
            };
            if let Some(classification) = self.decode(pattern.shape, &captures) {
                return classification;
            }
        }
        Classification::Unrecognized
    }

    /// Decode a matched line; `None` lets later patterns try
    fn decode(&mut self, shape: LineShape, captures: &Captures<'_>) -> Option<Classification> {
        let event = match shape {
            LineShape::Time => ClassifiedEvent::Time(captures["time"].parse().ok()?),
            LineShape::CommandToClient => {
                self.decode_command_to_client(&captures["client_ids"], &captures["commands"])?
            }
            LineShape::BlankLine => ClassifiedEvent::BlankLine,
            LineShape::CommandToServer | LineShape::CommandToServerAfterConnect => {
                ClassifiedEvent::CommandToServer {
                    client_id: parse_client_id(&captures["client_id"])?,
                    command: Command::new(serde_json::from_str(&captures["command"]).ok()?),
                }
            }
            LineShape::LogEntry => {
                let fields: Map<String, Value> = serde_json::from_str(&captures["entry"]).ok()?;
                ClassifiedEvent::LogEntry(LogEntry::new(fields))
            }
            LineShape::Connect | LineShape::LegacyConnect => ClassifiedEvent::Connect {
                client_id: parse_client_id(&captures["client_id"])?,
                username: captures["username"].to_string(),
            },
            LineShape::Disconnect | LineShape::DisconnectAfterError => {
                ClassifiedEvent::Disconnect {
                    client_id: parse_client_id(&captures["client_id"])?,
                }
            }
            LineShape::GameExpired => ClassifiedEvent::GameExpired {
                game_id: GameId::new(captures["game_id"].parse().ok()?),
            },
            LineShape::ConnectionMade => {
                self.connection_made_count += 1;
                if self.connection_made_count > 1 {
                    return Some(Classification::Stop);
                }
                ClassifiedEvent::ConnectionMade
            }
            LineShape::Ignorable => ClassifiedEvent::Ignorable,
        };
        Some(Classification::Event(event))
    }

    fn decode_command_to_client(
        &self,
        client_ids: &str,
        commands: &str,
    ) -> Option<ClassifiedEvent> {
        let client_ids = client_ids
            .split(',')
            .map(parse_client_id)
            .collect::<Option<Vec<_>>>()?;
        let mut commands: Vec<Command> = serde_json::from_str(commands).ok()?;

        if let Err(err) = self.translation.translate_commands(&mut commands) {
            tracing::debug!(error = %err, "dropping untranslatable command batch");
            return None;
        }

        Some(ClassifiedEvent::CommandToClient {
            client_ids,
            commands: move_player_commands_first(commands),
        })
    }
}

fn parse_client_id(text: &str) -> Option<ClientId> {
    text.parse().ok().map(ClientId::new)
}

/// Move the player-identity commands of a batch ahead of its board commands.
///
/// A batch can set a board cell before the `SetGamePlayer*` commands that tell
/// us which game the recipient belongs to. When the first board-cell command
/// comes before the first player command, the span from the first to the last
/// player command is moved to the front. Such spans are always contiguous in
/// real logs. Batches already in order are returned unchanged.
#[must_use]
pub fn move_player_commands_first(mut commands: Vec<Command>) -> Vec<Command> {
    let kind = |command: &Command| command.client_command();

    let first_board = commands
        .iter()
        .position(|c| kind(c) == Some(ClientCommand::SetGameBoardCell));
    let first_player = commands
        .iter()
        .position(|c| kind(c).is_some_and(ClientCommand::is_set_game_player));
    let last_player = commands
        .iter()
        .rposition(|c| kind(c).is_some_and(ClientCommand::is_set_game_player));

    if let (Some(board), Some(first), Some(last)) = (first_board, first_player, last_player) {
        if board < first {
            let span: Vec<Command> = commands.drain(first..=last).collect();
            commands.splice(0..0, span);
        }
    }

    commands
}
