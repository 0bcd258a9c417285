//! HTTP request handlers organized by route group

pub mod admin;
pub mod health;
pub mod token;
