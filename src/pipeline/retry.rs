use rand::Rng;
use std::time::Duration;

const PUSH_RETRY_BASE_MS: u64 = 100;
const PUSH_RETRY_CAP_MS: u64 = 5_000;

/// Number of in-band push attempts the admission gate makes before surfacing
/// the queue as unavailable.
pub const PUSH_MAX_TRIES: u32 = 5;

const WORKER_BACKOFF_BASE_SECS: u64 = 1;
const WORKER_BACKOFF_CAP_SECS: u64 = 60;

/// Exponential delay before the gate retries a failed push: base 100 ms,
/// factor 2, capped at 5 s.
pub fn push_retry_delay(attempt: u32) -> Duration {
    let exp = PUSH_RETRY_BASE_MS.saturating_mul(1u64 << attempt.min(16));
    Duration::from_millis(exp.min(PUSH_RETRY_CAP_MS))
}

/// Jittered re-visibility delay for a worker retry: uniform in
/// `[0, base * 2^attempts]` seconds, capped at 60 s. Full jitter keeps
/// redelivered envelopes from thundering back in lockstep.
pub fn worker_backoff_delay(attempts: u32) -> Duration {
    let ceiling_secs = WORKER_BACKOFF_BASE_SECS
        .saturating_mul(1u64 << attempts.min(16))
        .min(WORKER_BACKOFF_CAP_SECS);

    let millis = rand::thread_rng().gen_range(0..=ceiling_secs * 1000);
    Duration::from_millis(millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_delay_doubles_until_cap() {
        assert_eq!(push_retry_delay(0), Duration::from_millis(100));
        assert_eq!(push_retry_delay(1), Duration::from_millis(200));
        assert_eq!(push_retry_delay(2), Duration::from_millis(400));
        assert_eq!(push_retry_delay(10), Duration::from_millis(5_000));
    }

    #[test]
    fn worker_backoff_stays_within_jitter_ceiling() {
        for attempts in 0..8 {
            let ceiling = Duration::from_secs((1u64 << attempts).min(60));
            for _ in 0..50 {
                assert!(worker_backoff_delay(attempts) <= ceiling);
            }
        }
    }

    #[test]
    fn worker_backoff_caps_at_sixty_seconds() {
        for _ in 0..50 {
            assert!(worker_backoff_delay(30) <= Duration::from_secs(60));
        }
    }
}
