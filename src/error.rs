//! Error type shared by the loader, config, and state-store layers.
//!
//! Only input-level failures are errors. A single field that fails to coerce
//! is not: it resolves through the field's default policy and is counted as
//! an anomaly on the [`Dataset`](crate::storage::record::Dataset).

use std::io;

use crate::io::format_detect::FileFormat;

/// Errors that can occur while loading, configuring, or persisting pipeline state.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Underlying file I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The tabular input could not be parsed. No partial dataset is produced.
    #[error("failed to parse {format} input: {message}")]
    Parse { format: FileFormat, message: String },

    /// The dashboard config is malformed or inconsistent.
    #[error("invalid config: {0}")]
    Config(String),

    /// A filter, aggregate, or CLI flag names a field the schema does not declare.
    #[error("unknown field '{0}'")]
    UnknownField(String),

    /// Persisted UI state could not be read or written.
    #[error("state store error: {0}")]
    State(String),
}

impl PipelineError {
    pub(crate) fn parse(format: FileFormat, message: impl Into<String>) -> Self {
        PipelineError::Parse {
            format,
            message: message.into(),
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_message() {
        let err = PipelineError::parse(FileFormat::Csv, "unterminated quote");
        assert_eq!(
            err.to_string(),
            "failed to parse CSV input: unterminated quote"
        );
    }

    #[test]
    fn test_io_error_converts() {
        fn open() -> Result<()> {
            std::fs::File::open("/tmp/nonexistent_tabagg_error_test_12345")?;
            Ok(())
        }
        let err = open().unwrap_err();
        assert!(matches!(err, PipelineError::Io(_)));
    }

    #[test]
    fn test_unknown_field_message() {
        let err = PipelineError::UnknownField("Sale Price".into());
        assert_eq!(err.to_string(), "unknown field 'Sale Price'");
    }
}
