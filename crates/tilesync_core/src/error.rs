//! Core error types for tilesync.

/// Core result type
pub type CoreResult<T> = Result<T, CoreError>;

/// Core error type
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    /// A symbolic name that is not part of an enum family
    #[error("Unknown {family} name: {name}")]
    UnknownName {
        /// Enum family searched
        family: String,
        /// Offending name
        name: String,
    },

    /// A numeric code outside of an enum family
    #[error("Unknown {family} code: {code}")]
    UnknownCode {
        /// Enum family searched
        family: String,
        /// Offending code
        code: i64,
    },

    /// Coordinate outside the 12x9 board
    #[error("Tile ({x}, {y}) is off the board")]
    TileOutOfBounds {
        /// Column
        x: i64,
        /// Row
        y: i64,
    },

    /// Parse error
    #[error("Parse error: {message}")]
    ParseError {
        /// Description of what failed to parse
        message: String,
    },
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::ParseError {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::UnknownCode {
            family: "CommandsToClient".to_string(),
            code: 99,
        };
        assert_eq!(format!("{}", err), "Unknown CommandsToClient code: 99");

        let err = CoreError::TileOutOfBounds { x: 12, y: 0 };
        assert_eq!(format!("{}", err), "Tile (12, 0) is off the board");
    }

    #[test]
    fn test_error_from_json() {
        let json_err = serde_json::from_str::<u64>("nope").unwrap_err();
        let err = CoreError::from(json_err);
        assert!(matches!(err, CoreError::ParseError { .. }));
    }
}
