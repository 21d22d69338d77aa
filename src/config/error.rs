//! Configuration Error Types
//!
//! Errors raised while loading, merging and validating batch configuration.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    /// Configuration sources could not be read or merged
    #[error("Failed to load configuration from '{source_path}': {error}")]
    LoadError { source_path: String, error: String },

    /// Merged configuration does not match the expected shape
    #[error("Type mismatch while deserializing configuration: {error}")]
    TypeMismatch { error: String },

    /// Missing required configuration field
    #[error("Missing required configuration field '{field}' in {context}")]
    MissingRequiredField { field: String, context: String },

    /// Invalid configuration value
    #[error("Invalid value '{value}' for field '{field}': {context}")]
    InvalidValue {
        field: String,
        value: String,
        context: String,
    },
}

impl ConfigurationError {
    pub fn load_error(source_path: impl Into<String>, error: impl std::fmt::Display) -> Self {
        Self::LoadError {
            source_path: source_path.into(),
            error: error.to_string(),
        }
    }

    pub fn type_mismatch(error: impl std::fmt::Display) -> Self {
        Self::TypeMismatch {
            error: error.to_string(),
        }
    }

    pub fn missing_required_field(field: impl Into<String>, context: impl Into<String>) -> Self {
        Self::MissingRequiredField {
            field: field.into(),
            context: context.into(),
        }
    }

    pub fn invalid_value(
        field: impl Into<String>,
        value: impl ToString,
        context: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.to_string(),
            context: context.into(),
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigurationError>;
