//! Token logo cache and image proxy
//!
//! Token lists from the upstream provider are indexed into a key-value store
//! on a schedule; `GET /token/{chainId}/{address}` answers from that store
//! with native-token and identicon fallbacks and streams the image back.

pub mod config;
pub mod database;
pub mod errors;
pub mod fetch;
pub mod indexer;
pub mod job_scheduling;
pub mod registry;
pub mod responder;
pub mod store;
pub mod utils;
pub mod web;
