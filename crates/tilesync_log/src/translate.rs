//! Historical enum translation.
//!
//! The server renumbered some wire enums over time. Each renumbering is
//! recorded as the full ordered name list that was in force *before* the
//! change, keyed by the timestamp at which the change took effect. A log
//! written at or before that timestamp uses the old list.

use crate::event::Command;
use std::collections::BTreeMap;
use tilesync_core::{ClientCommand, EnumFamily, LogTimestamp};

/// Ordered names of one enum family before a renumbering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnumSnapshot {
    /// When the renumbering took effect
    pub timestamp: LogTimestamp,
    /// Family that changed
    pub family: EnumFamily,
    /// Names in their old wire order
    pub names: &'static [&'static str],
}

/// Every recorded renumbering
pub const HISTORICAL_SNAPSHOTS: &[EnumSnapshot] = &[
    EnumSnapshot {
        timestamp: 1_417_176_502,
        family: EnumFamily::CommandsToClient,
        names: &[
            "FatalError",
            "SetClientId",
            "SetClientIdToData",
            "SetGameState",
            "SetGameBoardCell",
            "SetGameBoard",
            "SetScoreSheetCell",
            "SetScoreSheet",
            "SetGamePlayerUsername",
            "SetGamePlayerClientId",
            "SetGameWatcherClientId",
            "ReturnWatcherToLobby",
            "AddGameHistoryMessage",
            "AddGameHistoryMessages",
            "SetTurn",
            "SetGameAction",
            "SetTile",
            "SetTileGameBoardType",
            "RemoveTile",
            "AddGlobalChatMessage",
            "AddGameChatMessage",
            "DestroyGame",
        ],
    },
    EnumSnapshot {
        timestamp: 1_409_233_190,
        family: EnumFamily::Errors,
        names: &["NotUsingLatestVersion", "InvalidUsername", "UsernameAlreadyInUse"],
    },
];

/// Translation failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TranslateError {
    /// The old code has no entry in the historical list
    #[error("{family:?} code {code} has no historical mapping")]
    UnmappedCode {
        /// Family being translated
        family: EnumFamily,
        /// Old code
        code: i64,
    },

    /// The value to translate is not an integer
    #[error("{family:?} code is missing or not an integer")]
    MissingCode {
        /// Family being translated
        family: EnumFamily,
    },
}

/// Old-code to current-code maps for one log timestamp
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranslationTable {
    families: BTreeMap<EnumFamily, BTreeMap<i64, i64>>,
}

impl TranslationTable {
    /// Table for a log written at `timestamp`, from the recorded history
    #[must_use]
    pub fn for_timestamp(timestamp: LogTimestamp) -> Self {
        Self::from_snapshots(timestamp, HISTORICAL_SNAPSHOTS)
    }

    /// Table for a log written at `timestamp`, from an explicit history.
    ///
    /// Snapshots are applied newest first and each applicable snapshot
    /// replaces the family's map, so the oldest applicable snapshot decides.
    #[must_use]
    pub fn from_snapshots(timestamp: LogTimestamp, snapshots: &[EnumSnapshot]) -> Self {
        let mut ordered: Vec<&EnumSnapshot> = snapshots.iter().collect();
        ordered.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        let mut families = BTreeMap::new();
        for snapshot in ordered {
            if timestamp <= snapshot.timestamp {
                families.insert(snapshot.family, Self::snapshot_map(snapshot));
            }
        }

        Self { families }
    }

    /// Map from a snapshot's positions to current positions
    fn snapshot_map(snapshot: &EnumSnapshot) -> BTreeMap<i64, i64> {
        let current = snapshot.family.current_names();
        snapshot
            .names
            .iter()
            .enumerate()
            .filter_map(|(old_index, name)| {
                current
                    .iter()
                    .position(|candidate| candidate == name)
                    .map(|new_index| (old_index as i64, new_index as i64))
            })
            .collect()
    }

    /// True if no family needs translating
    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.families.is_empty()
    }

    /// Map for one family, if it changed after the log was written
    #[must_use]
    pub fn family(&self, family: EnumFamily) -> Option<&BTreeMap<i64, i64>> {
        self.families.get(&family)
    }

    /// Translate one code of a family
    ///
    /// # Errors
    ///
    /// Returns error if the family changed and the code is unknown to the old list
    pub fn translate(&self, family: EnumFamily, code: i64) -> Result<i64, TranslateError> {
        match self.families.get(&family) {
            Some(map) => map
                .get(&code)
                .copied()
                .ok_or(TranslateError::UnmappedCode { family, code }),
            None => Ok(code),
        }
    }

    /// Translate a batch of server-to-client commands in place.
    ///
    /// The command code at position 0 is translated through `CommandsToClient`;
    /// for `FatalError` commands the error code at position 1 is then
    /// translated through `Errors`.
    ///
    /// # Errors
    ///
    /// Returns error on the first code that cannot be translated
    pub fn translate_commands(&self, commands: &mut [Command]) -> Result<(), TranslateError> {
        if self.is_identity() {
            return Ok(());
        }

        for command in commands.iter_mut() {
            self.translate_slot(command, 0, EnumFamily::CommandsToClient)?;
        }

        if self.families.contains_key(&EnumFamily::Errors) {
            for command in commands.iter_mut() {
                if command.client_command() == Some(ClientCommand::FatalError) {
                    self.translate_slot(command, 1, EnumFamily::Errors)?;
                }
            }
        }

        Ok(())
    }

    fn translate_slot(
        &self,
        command: &mut Command,
        position: usize,
        family: EnumFamily,
    ) -> Result<(), TranslateError> {
        if !self.families.contains_key(&family) {
            return Ok(());
        }

        let slot = command
            .values_mut()
            .get_mut(position)
            .ok_or(TranslateError::MissingCode { family })?;
        let code = slot.as_i64().ok_or(TranslateError::MissingCode { family })?;
        *slot = self.translate(family, code)?.into();
        Ok(())
    }
}
