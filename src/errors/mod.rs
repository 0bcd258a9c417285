//! Centralized error handling for the token logo proxy
//!
//! Two layers of errors exist:
//!
//! - **Store Errors**: failures of the persistent key-value store backends
//! - **Application Errors**: everything the fetch, indexing and serving
//!   pipeline can surface, including wrapped store errors
//!
//! # Usage
//!
//! ```rust
//! use token_logo_proxy::errors::{AppError, AppResult};
//!
//! fn parse_chain(raw: &str) -> AppResult<u64> {
//!     raw.parse()
//!         .map_err(|_| AppError::validation("Invalid chainId or address"))
//! }
//!
//! assert!(parse_chain("137").is_ok());
//! assert!(parse_chain("polygon").is_err());
//! ```

pub mod types;

pub use types::*;

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Convenience type alias for store Results
pub type StoreResult<T> = Result<T, StoreError>;
