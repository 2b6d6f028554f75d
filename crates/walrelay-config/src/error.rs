use thiserror::Error;

/// Errors that can occur when parsing or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("invalid action '{value}' for table '{table}': expected one of insert, update, delete, truncate")]
    InvalidAction { table: String, value: String },

    #[error("publisher topic must not be empty")]
    EmptyTopic,

    #[error("column filter for table '{table}' has no matching entry in filter.tables")]
    ColumnFilterWithoutTable { table: String },

    #[error("column filter '{table}.{column}' has no allowed values")]
    EmptyAllowedValues { table: String, column: String },

    #[error("invalid log level '{value}': expected one of trace, debug, info, warn, error")]
    InvalidLogLevel { value: String },

    #[error("environment variable '{name}' is not set")]
    MissingEnvVar { name: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;
