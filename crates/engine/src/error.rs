//! Engine-level errors
//!
//! Transaction outcomes use [`epochdb_core::TxnError`]; this type covers
//! everything around them: configuration, files, lifecycle.

use thiserror::Error;

/// Result type alias for engine operations
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Engine errors
#[derive(Debug, Error)]
pub enum EngineError {
    /// A configuration value is out of range
    #[error("invalid configuration: {0}")]
    Config(String),

    /// I/O error reading or writing a config file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parse or serialization error
    #[error("TOML error: {0}")]
    Toml(String),

    /// The database was shut down
    #[error("database is shut down")]
    ShutDown,

    /// No worker with this index
    #[error("unknown worker {0}")]
    UnknownWorker(usize),
}

impl From<toml::de::Error> for EngineError {
    fn from(e: toml::de::Error) -> Self {
        EngineError::Toml(e.to_string())
    }
}

impl From<toml::ser::Error> for EngineError {
    fn from(e: toml::ser::Error) -> Self {
        EngineError::Toml(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(EngineError::ShutDown.to_string(), "database is shut down");
        assert_eq!(EngineError::UnknownWorker(9).to_string(), "unknown worker 9");
        let msg = EngineError::Config("workers must be positive".into()).to_string();
        assert!(msg.contains("invalid configuration"));
    }

    #[test]
    fn test_toml_error_converts() {
        let err: EngineError = toml::from_str::<toml::Value>("= broken").unwrap_err().into();
        assert!(matches!(err, EngineError::Toml(_)));
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: EngineError = io.into();
        assert!(err.to_string().contains("I/O error"));
    }
}
