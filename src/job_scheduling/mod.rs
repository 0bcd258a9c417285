//! Scheduled refresh of the registry and the supported chains' token lists

pub mod refresh_job;
pub mod scheduler;

pub use refresh_job::{ChainReport, CycleReport, REFRESH_LOCK, RefreshJob};
pub use scheduler::IndexScheduler;
