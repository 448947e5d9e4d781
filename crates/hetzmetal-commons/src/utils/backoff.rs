use std::time::Duration;

use rand::Rng;

const MAX_BACKOFF_EXPONENT: u32 = 9;

/// Requeue delay for a counted failure.
///
/// The error count is clamped to 9 so the delay tops out around eight hours.
/// With `base = 2^count` minutes the returned delay is drawn uniformly from
/// `[0.5 * base, base]`, which keeps simultaneously failing hosts from
/// reconciling in lockstep.
pub fn calculate_backoff(error_count: u32) -> Duration {
    let exponent = error_count.min(MAX_BACKOFF_EXPONENT);
    let base_minutes = f64::from(1u32 << exponent);
    let r: f64 = rand::rng().random();
    let minutes = base_minutes - 0.5 * r * base_minutes;
    Duration::from_secs_f64(minutes * 60.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_within_bounds() {
        for count in 1..=9u32 {
            let base = Duration::from_secs(60 * (1u64 << count));
            for _ in 0..1000 {
                let backoff = calculate_backoff(count);
                assert!(
                    backoff >= base / 2 && backoff <= base,
                    "count {count}: {backoff:?} outside [{:?}, {base:?}]",
                    base / 2
                );
            }
        }
    }

    #[test]
    fn test_backoff_clamps_error_count() {
        let max = Duration::from_secs(60 * 512);
        for _ in 0..1000 {
            assert!(calculate_backoff(40) <= max);
            assert!(calculate_backoff(40) >= max / 2);
        }
    }

    #[test]
    fn test_backoff_mean_near_three_quarters_of_base() {
        for count in [3u32, 6, 9] {
            let base_secs = 60.0 * f64::from(1u32 << count);
            let samples = 1000;
            let total: f64 = (0..samples)
                .map(|_| calculate_backoff(count).as_secs_f64())
                .sum();
            let mean = total / f64::from(samples);
            let expected = 0.75 * base_secs;
            assert!(
                (mean - expected).abs() < 0.05 * base_secs,
                "count {count}: mean {mean} too far from {expected}"
            );
        }
    }
}
