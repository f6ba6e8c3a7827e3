//! Error handling for the application

use thiserror::Error;

/// Observation-related errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ObservationError {
    #[error("Malformed observation: {0}")]
    Malformed(String),

    #[error("Invalid price: {0}")]
    InvalidPrice(f64),

    #[error("Observation has no source")]
    MissingSource,
}

/// Suppression store errors
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store call timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Corrupt value for {key}: {value}")]
    CorruptValue { key: String, value: String },
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

/// Notification channel errors
#[derive(Error, Debug, Clone)]
pub enum NotifyError {
    #[error("Notification request failed: {0}")]
    RequestFailed(String),

    #[error("Notification rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Notification timed out")]
    Timeout,

    #[error("Missing notification credential: {0}")]
    MissingCredential(&'static str),
}

impl From<reqwest::Error> for NotifyError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            NotifyError::Timeout
        } else {
            NotifyError::RequestFailed(err.to_string())
        }
    }
}

/// Transport-related errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("Unknown topic: {0}")]
    UnknownTopic(String),

    #[error("Topic {0} already has a subscriber")]
    AlreadySubscribed(String),

    #[error("Partition {0} closed")]
    PartitionClosed(usize),

    #[error("Publish failed: {0}")]
    PublishFailed(String),

    #[error("Broker error: {0}")]
    Broker(String),
}

impl From<redis::RedisError> for TransportError {
    fn from(err: redis::RedisError) -> Self {
        TransportError::Broker(err.to_string())
    }
}

/// Source fetcher errors
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Unknown API source: {0}")]
    UnknownSource(String),

    #[error("Error fetching {source_name}: {message}")]
    Http { source_name: String, message: String },

    #[error("Error decoding {source_name} response: {message}")]
    Decode { source_name: String, message: String },

    #[error("No price data in {0} response")]
    MissingPrice(String),

    #[error(transparent)]
    Observation(#[from] ObservationError),
}

/// General application error
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Notify error: {0}")]
    Notify(#[from] NotifyError),
}
