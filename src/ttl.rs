//! TTL Picker - chooses a base TTL and applies symmetric jitter so that keys
//! sharing a TTL don't all expire in the same instant.

use rand::Rng;

/// Pick a jittered TTL in seconds, or `None` if the base TTL is non-positive
/// (used to disable negative caching entirely).
pub fn pick_ttl(is_negative: bool, defaults_secs: i64, negatives_secs: i64, jitter_fraction: f64) -> Option<u64> {
    let base = if is_negative { negatives_secs } else { defaults_secs };
    if base <= 0 {
        return None;
    }
    let jitter = (base as f64 * jitter_fraction).floor() as i64;
    let offset = if jitter > 0 {
        rand::rng().random_range(-jitter..=jitter)
    } else {
        0
    };
    Some((base + offset).max(1) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_or_negative_base_disables_write() {
        assert_eq!(pick_ttl(true, 60, 0, 0.1), None);
        assert_eq!(pick_ttl(true, 60, -5, 0.1), None);
    }

    #[test]
    fn jitter_stays_within_bound() {
        let base = 60i64;
        let jitter_fraction = 0.1;
        let max_jitter = (base as f64 * jitter_fraction).floor() as i64;
        for _ in 0..500 {
            let ttl = pick_ttl(false, base, 60, jitter_fraction).unwrap() as i64;
            assert!(ttl >= (base - max_jitter).max(1));
            assert!(ttl <= base + max_jitter);
        }
    }

    #[test]
    fn floor_of_one_second_is_enforced() {
        // base so small that a full-negative jitter would go to zero or below
        let ttl = pick_ttl(false, 1, 1, 0.9).unwrap();
        assert!(ttl >= 1);
    }

    #[test]
    fn negative_vs_positive_base_selection() {
        assert_eq!(pick_ttl(false, 60, 30, 0.0), Some(60));
        assert_eq!(pick_ttl(true, 60, 30, 0.0), Some(30));
    }
}
