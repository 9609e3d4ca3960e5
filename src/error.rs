use thiserror::Error;

/// Errors produced while parsing, enriching or formatting VAST
#[derive(Error, Debug)]
pub enum VastError {
    #[error("Failed to parse XML: {0}")]
    XmlParseError(#[from] quick_xml::Error),

    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("URL error: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid duration format: {0}")]
    InvalidDuration(String),

    #[error("Invalid VAST: {0}")]
    Validation(String),

    #[error("Bid response is nil")]
    NilBidResponse,

    #[error("Failed to serialize VAST: {0}")]
    Serialize(#[from] std::fmt::Error),

    #[error("Auction failed: {0}")]
    Auction(String),

    #[error("Invalid request: {0}")]
    BadInput(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, VastError>;
