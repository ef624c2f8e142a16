//! Errors raised by the command line front-end before a lock client exists.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    IoError(String),
}

impl Error {
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig(_) | Self::ParseError(_) => "CONFIGURATION",
            Self::IoError(_) => "IO_ERROR",
        }
    }

    /// Configuration problems exit like an unparsable server version.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidConfig(_) | Self::ParseError(_) => 2,
            Self::IoError(_) => 4,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
