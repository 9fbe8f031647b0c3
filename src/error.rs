use thiserror::Error;

#[derive(Error, Debug)]
pub enum RuleError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid geosite data: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("Worker task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Structured payload could not be parsed; the caller falls back to plain lines.
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Unsupported rule: {0}")]
    UnsupportedDirective(String),

    #[error("Invalid port in rule {line}: {source}")]
    InvalidNumericField {
        line: String,
        #[source]
        source: std::num::ParseIntError,
    },

    #[error("Invalid CIDR: {0}")]
    InvalidCidr(String),

    #[error("Exclusion tag not found: {0}")]
    MissingRequiredTag(String),

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("{asset} not found in upstream release {release}")]
    AssetNotFound { asset: String, release: String },

    #[error("Checksum mismatch: {0}")]
    ChecksumMismatch(String),
}

impl RuleError {
    /// Conditions the classifier recovers from by dropping the offending line.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            RuleError::MalformedInput(_)
                | RuleError::UnsupportedDirective(_)
                | RuleError::InvalidNumericField { .. }
                | RuleError::InvalidCidr(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, RuleError>;
