use std::time::Duration;

use discovery_engine::jitter::initial_delay;
use proptest::array::uniform16;
use proptest::prelude::*;
use uuid::Uuid;

proptest! {
    // Spec property 4: d(u) is deterministic in u and lies in [0, jitter_max).
    #[test]
    fn jitter_is_deterministic_and_bounded(bytes in uniform16(any::<u8>())) {
        let user_id = Uuid::from_bytes(bytes);
        let jitter_max = Duration::from_secs(30);

        let first = initial_delay(user_id, jitter_max);
        let second = initial_delay(user_id, jitter_max);

        prop_assert_eq!(first, second);
        prop_assert!(first < jitter_max);
    }
}
