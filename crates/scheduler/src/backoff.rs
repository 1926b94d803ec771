//! Exponential backoff with full jitter for failed-run retries.

use rand::Rng;

/// `initial_ms * 2^retry_count`, capped at `max_ms`.
pub fn backoff_cap_ms(retry_count: u32, initial_ms: u64, max_ms: u64) -> u64 {
    let shift = retry_count.min(63);
    let exp = initial_ms.saturating_mul(1u64.checked_shl(shift).unwrap_or(u64::MAX));
    exp.min(max_ms)
}

/// A uniformly random delay in `[0, backoff_cap_ms]` — full jitter.
pub fn retry_delay_ms(retry_count: u32, initial_ms: u64, max_ms: u64) -> u64 {
    let cap = backoff_cap_ms(retry_count, initial_ms, max_ms);
    if cap == 0 {
        return 0;
    }
    rand::thread_rng().gen_range(0..=cap)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cap_grows_exponentially_until_max() {
        assert_eq!(backoff_cap_ms(0, 1_000, 300_000), 1_000);
        assert_eq!(backoff_cap_ms(1, 1_000, 300_000), 2_000);
        assert_eq!(backoff_cap_ms(2, 1_000, 300_000), 4_000);
    }

    #[test]
    fn cap_saturates_at_max() {
        assert_eq!(backoff_cap_ms(20, 1_000, 300_000), 300_000);
    }

    #[test]
    fn jittered_delay_never_exceeds_cap() {
        for retry in 0..10 {
            let cap = backoff_cap_ms(retry, 1_000, 300_000);
            for _ in 0..20 {
                let delay = retry_delay_ms(retry, 1_000, 300_000);
                assert!(delay <= cap);
            }
        }
    }
}
