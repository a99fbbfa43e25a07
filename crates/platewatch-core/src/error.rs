//! Core error types for PlateWatch.
//!
//! Configuration and roster problems are run-fatal: they are detected once at
//! startup and reported with enough context to fix the offending file.

use thiserror::Error;

/// Central error type for shared PlateWatch operations.
#[derive(Error, Debug)]
pub enum PlateWatchError {
    /// Configuration errors (file loading, parsing, validation)
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation errors (invalid input, constraints)
    #[error("validation error: {0}")]
    Validation(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration and station roster errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to determine config directory path
    #[error("could not determine config directory (XDG base directories not available)")]
    NoConfigDir,

    /// Config or roster file not found
    #[error("file not found at {path}")]
    NotFound {
        /// Path where the file was expected
        path: String,
    },

    /// Failed to parse TOML
    #[error("failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    /// I/O error reading config
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration value
    #[error("invalid config value for {field}: {reason}")]
    InvalidValue {
        /// Field name
        field: String,
        /// Reason for invalidity
        reason: String,
    },

    /// A credential required to run is absent
    #[error("missing required credential: {name}")]
    MissingCredential {
        /// Name of the credential (usually the environment variable)
        name: String,
    },

    /// A roster entry failed validation
    #[error("invalid station entry #{index}: {reason}")]
    InvalidStation {
        /// Zero-based position in the roster file
        index: usize,
        /// Reason for invalidity
        reason: String,
    },

    /// Two roster entries share the same partition
    #[error("duplicate station {region_id}/{station_id} in roster")]
    DuplicateStation {
        /// Region code
        region_id: String,
        /// Station code
        station_id: String,
    },

    /// No stations left after roster filtering
    #[error("no stations configured for shard '{label}'")]
    EmptyShard {
        /// Requested shard label (or `*` for the full roster)
        label: String,
    },
}

/// Result type alias using `PlateWatchError`.
pub type Result<T> = std::result::Result<T, PlateWatchError>;

/// Result type alias for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PlateWatchError::Validation("empty plate number".to_string());
        assert_eq!(err.to_string(), "validation error: empty plate number");

        let err = ConfigError::DuplicateStation {
            region_id: "2".to_string(),
            station_id: "20".to_string(),
        };
        assert_eq!(err.to_string(), "duplicate station 2/20 in roster");
    }

    #[test]
    fn test_error_from_config() {
        let config_err = ConfigError::NoConfigDir;
        let err: PlateWatchError = config_err.into();
        assert!(matches!(err, PlateWatchError::Config(_)));
    }

    #[test]
    fn test_missing_credential_names_variable() {
        let err = ConfigError::MissingCredential {
            name: "GEMINI_API_KEY".to_string(),
        };
        assert!(err.to_string().contains("GEMINI_API_KEY"));
    }
}
