//! Error type definitions for the token logo proxy

use thiserror::Error;

/// Top-level application error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Persistent store failures
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Transport-level HTTP failures (no response received)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Upstream answered, but not with a usable status
    #[error("Upstream returned HTTP {status} for {url}")]
    UpstreamStatus { url: String, status: u16 },

    /// Client input validation errors
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl AppError {
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn upstream_status<S: Into<String>>(url: S, status: u16) -> Self {
        Self::UpstreamStatus {
            url: url.into(),
            status,
        }
    }

    /// Whether the error came from talking to an upstream service
    pub fn is_upstream(&self) -> bool {
        matches!(self, Self::Http(_) | Self::UpstreamStatus { .. })
    }
}

/// Persistent store errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// Database errors from SeaORM
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// Stored value could not be encoded or decoded
    #[error("Value encoding failed for key {key}: {message}")]
    Encoding { key: String, message: String },

    /// Lease bookkeeping failures
    #[error("Lease error on {key}: {message}")]
    Lease { key: String, message: String },
}

impl StoreError {
    pub fn encoding<K: Into<String>, M: std::fmt::Display>(key: K, message: M) -> Self {
        Self::Encoding {
            key: key.into(),
            message: message.to_string(),
        }
    }
}
