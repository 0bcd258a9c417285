pub mod backoff;
pub mod jitter;

pub use backoff::{parse_retry_after, retry_delay};
pub use jitter::generate_jitter_ms;
