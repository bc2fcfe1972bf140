use thiserror::Error;

/// Top-level error type for the entire audit run
#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("No deposit record for nonce {nonce} toward chain {destination_chain_id}")]
    DepositNotFound { nonce: u64, destination_chain_id: u8 },

    #[error("Report error: {0}")]
    Report(#[from] ReportError),
}

/// Remote-read errors surfaced by a ledger reader
///
/// Every variant is one failed best-effort read; the reconciler decides
/// whether it voids one nonce or the whole sweep.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("RPC request failed: {0}")]
    Rpc(String),

    #[error("Contract call failed: {0}")]
    Contract(String),

    #[error("Malformed chain response: {0}")]
    Decode(String),
}

impl From<alloy::transports::TransportError> for TransportError {
    fn from(error: alloy::transports::TransportError) -> Self {
        TransportError::Rpc(error.to_string())
    }
}

impl From<alloy::contract::Error> for TransportError {
    fn from(error: alloy::contract::Error) -> Self {
        TransportError::Contract(error.to_string())
    }
}

/// Report serialization and persistence errors
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("CSV serialization failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed writing {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for the application
pub type AuditResult<T> = Result<T, AuditError>;
