use std::time::Duration;

use uuid::Uuid;

/// Deterministic staggered-start delay `d(u) = f(user-id) mod jitter_max`,
/// where `f` takes the first 8 bytes of the user id as a big-endian
/// unsigned integer. Same user, same delay, every run; distinct users land
/// uniformly across `[0, jitter_max)`.
pub fn initial_delay(user_id: Uuid, jitter_max: Duration) -> Duration {
    let jitter_millis = jitter_max.as_millis() as u64;
    if jitter_millis == 0 {
        return Duration::ZERO;
    }

    let bytes = user_id.as_bytes();
    let mut first_eight = [0u8; 8];
    first_eight.copy_from_slice(&bytes[0..8]);
    let f = u64::from_be_bytes(first_eight);

    Duration::from_millis(f % jitter_millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_for_same_user() {
        let u = Uuid::new_v4();
        let jitter = Duration::from_secs(30);
        assert_eq!(initial_delay(u, jitter), initial_delay(u, jitter));
    }

    #[test]
    fn bounded_by_jitter_max() {
        let jitter = Duration::from_secs(30);
        for _ in 0..1000 {
            let u = Uuid::new_v4();
            assert!(initial_delay(u, jitter) < jitter);
        }
    }

    #[test]
    fn zero_jitter_is_zero_delay() {
        let u = Uuid::new_v4();
        assert_eq!(initial_delay(u, Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn distinct_users_spread_across_range() {
        // Not a strict uniformity proof, just a sanity check that distinct
        // ids don't all collapse onto the same delay.
        let jitter = Duration::from_secs(30);
        let delays: std::collections::HashSet<_> =
            (0..50).map(|_| initial_delay(Uuid::new_v4(), jitter)).collect();
        assert!(delays.len() > 1);
    }
}
