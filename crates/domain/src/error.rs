/// Shared error type used across all agent crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("store: {0}")]
    Store(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("geocoding: {0}")]
    Geocode(String),

    #[error("pricing: {0}")]
    Pricing(String),

    #[error("telephony: {0}")]
    Telephony(String),

    #[error("config: {0}")]
    Config(String),

    /// Signal raised when the caller asks for a human agent mid-flow.
    /// Every flow handler matches on this and routes straight to transfer.
    #[error("caller requested a human agent")]
    HumanRequested,

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
