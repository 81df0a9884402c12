use hyper::StatusCode;
use thiserror::Error;

use crate::insight::Provider;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("http error: {0}")]
    Hyper(#[from] hyper::Error),

    #[error("invalid request: {0}")]
    Http(#[from] hyper::http::Error),

    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    #[error("invalid uri: {0}")]
    Uri(#[from] hyper::http::uri::InvalidUri),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unexpected status {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("location parameter is required")]
    MissingLocation,

    #[error("unsupported location: {0}")]
    UnsupportedLocation(String),

    #[error("missing api key for {0}")]
    MissingApiKey(Provider),

    #[error("invalid provider: {0}")]
    InvalidProvider(String),

    #[error("unknown dataset: {0}")]
    UnknownDataset(String),

    #[error("invalid aggregation: {0}")]
    InvalidAggregation(String),

    #[error("invalid {name}: {value}")]
    InvalidParameter { name: &'static str, value: String },
}

impl Error {
    /// Status code of a non-success response, if this error carries one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}
