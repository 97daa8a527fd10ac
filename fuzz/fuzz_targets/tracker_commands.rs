#![no_main]

use libfuzzer_sys::fuzz_target;
use playlog::tracker::{FAVORITE_THRESHOLD, PlayLogTracker};
use time::{Duration, OffsetDateTime};

fuzz_target!(|data: &[u8]| {
    let mut tracker = PlayLogTracker::new();
    let mut now = OffsetDateTime::UNIX_EPOCH;
    let mut expected_total = 0_u64;

    for pair in data.chunks(2) {
        let op = pair[0];
        let arg = pair.get(1).copied().unwrap_or_default();
        let track_id = format!("track_{}", arg % 4);
        match op % 6 {
            0 | 1 => {
                now += Duration::minutes(i64::from(arg) * 15);
                let outcome = tracker
                    .record_play(&track_id, now, i64::from(arg))
                    .expect("valid play");
                expected_total += u64::from(arg);
                assert_eq!(outcome.recent_plays, tracker.recent_play_count(&track_id, now));
                if outcome.recent_plays >= FAVORITE_THRESHOLD {
                    assert!(tracker.is_favorite(&track_id));
                }
            }
            2 => {
                let favorites_before = tracker.favorites().len();
                tracker.prune_expired(now);
                assert_eq!(tracker.favorites().len(), favorites_before);
            }
            3 => {
                tracker.remove_favorite(&track_id);
                assert!(!tracker.is_favorite(&track_id));
            }
            4 => {
                tracker.add_favorite(&track_id).expect("valid id");
            }
            _ => {
                let restored = PlayLogTracker::from_snapshot(tracker.snapshot());
                assert_eq!(restored.snapshot(), tracker.snapshot());
            }
        }
        assert_eq!(tracker.total_listen_seconds(), expected_total);
    }
});
