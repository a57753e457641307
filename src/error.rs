use std::path::PathBuf;

use http::StatusCode;
use thiserror::Error;

pub(crate) type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub(crate) enum Error {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unauthorized ({0}) - check the access token")]
    Unauthorized(StatusCode),

    #[error("Rate limit exceeded")]
    RateLimit,

    #[error("API request failed with status {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Metadata XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Metadata XML attribute error: {0}")]
    XmlAttr(#[from] quick_xml::events::attributes::AttrError),

    #[error("Configuration error: {0}")]
    Config(#[from] ::config::ConfigError),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid page size: {0} (expected 1..=1000)")]
    InvalidPageSize(String),

    #[error("Count response has no @odata.count")]
    MissingCount,

    #[error("Next link has no $skiptoken: {0}")]
    MissingSkipToken(String),

    #[error("Incremental run needs a prior watermark in {0}")]
    MissingWatermark(PathBuf),
}
