/// Error types shared across the crate
///
/// The classification core never fails: malformed scripts become `parse_error`
/// scripts and unknown shapes become Non-Standard. These errors belong to the
/// layers around it (value decoding, node access, settings).

use thiserror::Error;

/// Errors while decoding numeric values handed to the core
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    #[error("varint truncated: needed {needed} bytes, had {available}")]
    TruncatedVarInt { needed: usize, available: usize },

    #[error("invalid BTC amount: {0}")]
    InvalidAmount(String),

    #[error("negative BTC amount: {0}")]
    NegativeAmount(String),

    #[error("BTC amount has sub-satoshi precision: {0}")]
    SubSatoshi(String),

    #[error("BTC amount out of range: {0}")]
    AmountOutOfRange(String),
}

/// Errors raised by the node client and the explorer around it
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("node transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("node returned error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("node returned no result for {0}")]
    EmptyResult(String),

    #[error("malformed node response: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed field {field}: {reason}")]
    MalformedField { field: String, reason: String },

    #[error("bad value: {0}")]
    Value(#[from] ValueError),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unsupported node type: {0}")]
    UnsupportedNode(String),
}

impl NodeError {
    /// Shorthand for a field that failed typed validation
    pub fn malformed(field: impl Into<String>, reason: impl Into<String>) -> Self {
        NodeError::MalformedField {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Short label used for the RPC error metric
    pub fn kind(&self) -> &'static str {
        match self {
            NodeError::Transport(_) => "transport",
            NodeError::Rpc { .. } => "rpc",
            NodeError::EmptyResult(_) => "empty",
            NodeError::Json(_) => "json",
            NodeError::MalformedField { .. } => "malformed",
            NodeError::Value(_) => "value",
            NodeError::NotFound(_) => "not_found",
            NodeError::UnsupportedNode(_) => "unsupported",
        }
    }
}

/// Errors while loading settings
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("invalid setting {key}: {reason}")]
    Invalid { key: String, reason: String },
}
