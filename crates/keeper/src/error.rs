//! Error types for the keeper service

use reflector_sdk::SdkError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KeeperError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Sdk(#[from] SdkError),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Holder directory returned no holders for {0}")]
    EmptyHolderSet(String),

    #[error("Swap failed: {0}")]
    SwapFailed(String),

    #[error("Submission failed: {0}")]
    Submission(String),
}

impl From<std::io::Error> for KeeperError {
    fn from(err: std::io::Error) -> Self {
        KeeperError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for KeeperError {
    fn from(err: serde_json::Error) -> Self {
        KeeperError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for KeeperError {
    fn from(err: toml::de::Error) -> Self {
        KeeperError::InvalidConfig(err.to_string())
    }
}

impl From<toml::ser::Error> for KeeperError {
    fn from(err: toml::ser::Error) -> Self {
        KeeperError::Serialization(err.to_string())
    }
}

pub type KeeperResult<T> = std::result::Result<T, KeeperError>;
