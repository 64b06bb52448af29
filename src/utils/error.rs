use thiserror::Error;

#[derive(Error, Debug)]
pub enum DataSourceError {
    #[error("{service} data source is not connected")]
    NotConnected { service: &'static str },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Missing configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid value for {field} ({value}): {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Invalid query: {message}")]
    InvalidQuery { message: String },

    #[error("{service} has no table named '{table}'")]
    UnsupportedTable { service: &'static str, table: String },

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("{service} transport failure: {message}")]
    Transport {
        service: &'static str,
        message: String,
    },

    #[error("{service} returned HTTP {status}: {message}")]
    HttpStatus {
        service: &'static str,
        status: u16,
        message: String,
    },

    #[error("{service} error: {message}")]
    Backend {
        service: &'static str,
        message: String,
    },

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("XML parsing error: {message}")]
    XmlError { message: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Coarse classification callers use to tell "no rows" apart from
/// "backend unreachable" or "invalid query".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Validation,
    Transport,
    Backend,
    NotConnected,
}

impl DataSourceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotConnected { .. } => ErrorKind::NotConnected,
            Self::ConfigError { .. }
            | Self::MissingConfigError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::IoError(_) => ErrorKind::Configuration,
            Self::InvalidQuery { .. } | Self::UnsupportedTable { .. } => ErrorKind::Validation,
            Self::HttpError(_) | Self::Transport { .. } => ErrorKind::Transport,
            Self::HttpStatus { .. }
            | Self::Backend { .. }
            | Self::SerializationError(_)
            | Self::XmlError { .. } => ErrorKind::Backend,
        }
    }

    pub fn invalid_query(message: impl Into<String>) -> Self {
        Self::InvalidQuery {
            message: message.into(),
        }
    }

    pub fn backend(service: &'static str, message: impl Into<String>) -> Self {
        Self::Backend {
            service,
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    /// Short message suitable for printing to a terminal.
    pub fn user_friendly_message(&self) -> String {
        match self.kind() {
            ErrorKind::Configuration => format!("Configuration problem: {}", self),
            ErrorKind::Validation => format!("The query could not be run: {}", self),
            ErrorKind::Transport => format!("Could not reach AWS: {}", self),
            ErrorKind::Backend => format!("AWS rejected the request: {}", self),
            ErrorKind::NotConnected => self.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DataSourceError>;
