//! Error types for SQLModel operations.

use std::fmt;

/// The primary error type for all SQLModel operations.
#[derive(Debug)]
pub enum Error {
    /// Flush could not be planned (insert ordering failed)
    Flush(FlushError),
    /// Configuration errors
    Config(ConfigError),
}

/// A flush plan could not be computed.
///
/// These are raised before any statement reaches the database and are kept
/// apart from database-level failures such as constraint violations.
#[derive(Debug, Clone)]
pub struct FlushError {
    pub kind: FlushErrorKind,
    pub message: String,
    /// Tables involved, in the order they were reported.
    pub tables: Vec<&'static str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushErrorKind {
    /// Pending inserts reference each other in a cycle
    DependencyCycle,
    /// The same object was queued for insertion twice
    DuplicateKey,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    pub message: String,
}

impl ConfigError {
    /// Create a configuration error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl FlushError {
    /// Create a new flush error.
    pub fn new(kind: FlushErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            tables: Vec::new(),
        }
    }

    /// Attach the tables involved in the failure.
    #[must_use]
    pub fn with_tables(mut self, tables: Vec<&'static str>) -> Self {
        self.tables = tables;
        self
    }
}

impl Error {
    /// Did the flush fail while computing the insert order?
    ///
    /// True for cycles and duplicate keys; false for anything reported by
    /// the database itself.
    pub fn is_flush_ordering_error(&self) -> bool {
        matches!(self, Error::Flush(_))
    }

    /// Tables named by the error, if any.
    pub fn tables(&self) -> &[&'static str] {
        match self {
            Error::Flush(f) => &f.tables,
            Error::Config(_) => &[],
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Flush(e) => write!(f, "Flush error: {}", e),
            Error::Config(e) => write!(f, "Configuration error: {}", e.message),
        }
    }
}

impl fmt::Display for FlushError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            FlushErrorKind::DependencyCycle => "insert order could not be computed",
            FlushErrorKind::DuplicateKey => "invalid pending insert",
        };
        write!(f, "{}: {}", kind, self.message)
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Flush(e) => Some(e),
            Error::Config(e) => Some(e),
        }
    }
}

impl std::error::Error for FlushError {}

impl std::error::Error for ConfigError {}

impl From<FlushError> for Error {
    fn from(err: FlushError) -> Self {
        Error::Flush(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

/// Result type alias for SQLModel operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flush_errors_are_not_database_errors() {
        let err = Error::from(
            FlushError::new(FlushErrorKind::DependencyCycle, "teams -> heroes -> teams")
                .with_tables(vec!["teams", "heroes"]),
        );

        assert!(err.is_flush_ordering_error());
        assert_eq!(err.tables(), &["teams", "heroes"]);
        assert_eq!(
            err.to_string(),
            "Flush error: insert order could not be computed: teams -> heroes -> teams"
        );

        let config: Error = ConfigError::new("batch_size must be at least 1").into();
        assert!(!config.is_flush_ordering_error());
        assert!(config.tables().is_empty());
    }

    #[test]
    fn config_error_display_and_source() {
        let err: Error = ConfigError::new("batch_size must be at least 1").into();
        assert_eq!(
            err.to_string(),
            "Configuration error: batch_size must be at least 1"
        );

        let source = std::error::Error::source(&err).map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("batch_size must be at least 1"));
    }

    #[test]
    fn duplicate_key_display() {
        let err = FlushError::new(FlushErrorKind::DuplicateKey, "hero queued twice");
        assert_eq!(err.to_string(), "invalid pending insert: hero queued twice");
        assert!(err.tables.is_empty());
    }
}
