//! Jitter for retry mechanisms

use rand::Rng;

/// Upper bound of the random component added to every computed backoff
pub const MAX_RETRY_JITTER_MS: u64 = 250;

/// Random jitter between 0 and `max_jitter_ms` (inclusive)
///
/// # Examples
/// ```
/// use token_logo_proxy::utils::jitter::generate_jitter_ms;
///
/// let jitter = generate_jitter_ms(250);
/// assert!(jitter <= 250);
/// ```
pub fn generate_jitter_ms(max_jitter_ms: u64) -> u64 {
    if max_jitter_ms == 0 {
        return 0;
    }
    rand::rng().random_range(0..=max_jitter_ms)
}
