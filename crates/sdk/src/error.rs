use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

/// Errors raised by the ledger, directory and aggregator clients
#[derive(Error, Debug)]
pub enum SdkError {
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Account not found: {0}")]
    AccountNotFound(Pubkey),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("No route from {input} to {output}")]
    NoRoute { input: Pubkey, output: Pubkey },

    #[error("{0}")]
    Other(String),
}

impl From<solana_client::client_error::ClientError> for SdkError {
    fn from(err: solana_client::client_error::ClientError) -> Self {
        SdkError::Rpc(err.to_string())
    }
}

impl From<reqwest::Error> for SdkError {
    fn from(err: reqwest::Error) -> Self {
        SdkError::Http(err.to_string())
    }
}

impl From<serde_json::Error> for SdkError {
    fn from(err: serde_json::Error) -> Self {
        SdkError::Deserialization(err.to_string())
    }
}

impl From<bincode::Error> for SdkError {
    fn from(err: bincode::Error) -> Self {
        SdkError::Serialization(err.to_string())
    }
}

impl From<solana_program::program_error::ProgramError> for SdkError {
    fn from(err: solana_program::program_error::ProgramError) -> Self {
        SdkError::InvalidParameters(err.to_string())
    }
}

impl From<reflector_types::LayoutError> for SdkError {
    fn from(err: reflector_types::LayoutError) -> Self {
        SdkError::Deserialization(err.to_string())
    }
}

pub type SdkResult<T> = std::result::Result<T, SdkError>;
