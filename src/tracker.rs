use crate::error::{TrackerError, TrackerResult};
use crate::model::{PlayEvent, TrackerSnapshot};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use time::{Duration, OffsetDateTime};
use tracing::{debug, info};

pub const RETENTION_WINDOW: Duration = Duration::hours(24);
pub const FAVORITE_THRESHOLD: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayOutcome {
    /// Plays of the track inside the retention window, this one included.
    pub recent_plays: usize,
    /// True only for the call that moved the track into the favorites.
    pub promoted: bool,
}

/// Rolling per-track play history, auto-favorites, and total listening time.
///
/// The tracker never reads the clock: every time-sensitive operation takes
/// `now` from the caller, so replaying the same calls yields the same state.
#[derive(Debug, Clone, Default)]
pub struct PlayLogTracker {
    play_log: HashMap<String, VecDeque<PlayEvent>>,
    favorites: Vec<String>,
    total_listen_seconds: u64,
}

impl PlayLogTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: TrackerSnapshot) -> Self {
        let play_log = snapshot
            .play_log
            .into_iter()
            .filter(|(track_id, events)| !track_id.trim().is_empty() && !events.is_empty())
            .map(|(track_id, events)| (track_id, VecDeque::from(events)))
            .collect();

        let mut favorites: Vec<String> = Vec::with_capacity(snapshot.favorites.len());
        for track_id in snapshot.favorites {
            if !track_id.trim().is_empty() && !favorites.contains(&track_id) {
                favorites.push(track_id);
            }
        }

        Self {
            play_log,
            favorites,
            total_listen_seconds: snapshot.total_listen_seconds,
        }
    }

    pub fn snapshot(&self) -> TrackerSnapshot {
        TrackerSnapshot {
            play_log: self
                .play_log
                .iter()
                .map(|(track_id, events)| (track_id.clone(), events.iter().copied().collect()))
                .collect(),
            favorites: self.favorites.clone(),
            total_listen_seconds: self.total_listen_seconds,
        }
    }

    /// Appends a play at `now`, prunes the track's expired plays, checks the
    /// favorite threshold, then adds `duration_seconds` to the listening total.
    pub fn record_play(
        &mut self,
        track_id: &str,
        now: OffsetDateTime,
        duration_seconds: i64,
    ) -> TrackerResult<PlayOutcome> {
        validate_track_id(track_id)?;
        if duration_seconds < 0 {
            return Err(TrackerError::NegativeDuration(duration_seconds));
        }

        let events = self.play_log.entry(track_id.to_string()).or_default();
        events.push_back(PlayEvent::from(now));
        let expired = prune_events(events, now);
        let recent_plays = events.len();

        let promoted = recent_plays >= FAVORITE_THRESHOLD && self.insert_favorite(track_id);

        self.total_listen_seconds = self
            .total_listen_seconds
            .saturating_add(duration_seconds.unsigned_abs());

        debug!(
            track_id,
            recent_plays, expired, duration_seconds, "recorded play"
        );
        if promoted {
            info!(track_id, recent_plays, "promoted track to favorites");
        }

        Ok(PlayOutcome {
            recent_plays,
            promoted,
        })
    }

    pub fn recent_play_count(&self, track_id: &str, now: OffsetDateTime) -> usize {
        let cutoff = now - RETENTION_WINDOW;
        self.play_log.get(track_id).map_or(0, |events| {
            events.iter().filter(|event| event.at() > cutoff).count()
        })
    }

    /// Drops expired plays for every track. Favorites and the listening total
    /// are left alone.
    pub fn prune_expired(&mut self, now: OffsetDateTime) -> usize {
        let mut expired = 0;
        self.play_log.retain(|_, events| {
            expired += prune_events(events, now);
            !events.is_empty()
        });
        if expired > 0 {
            debug!(expired, "pruned expired plays");
        }
        expired
    }

    pub fn add_favorite(&mut self, track_id: &str) -> TrackerResult<bool> {
        validate_track_id(track_id)?;
        let added = self.insert_favorite(track_id);
        if added {
            info!(track_id, "added favorite");
        }
        Ok(added)
    }

    pub fn remove_favorite(&mut self, track_id: &str) -> bool {
        let Some(position) = self.favorites.iter().position(|id| id == track_id) else {
            return false;
        };
        self.favorites.remove(position);
        info!(track_id, "removed favorite");
        true
    }

    pub fn reset(&mut self) {
        self.play_log.clear();
        self.favorites.clear();
        self.total_listen_seconds = 0;
        info!("cleared play log, favorites and listening time");
    }

    pub fn favorites(&self) -> &[String] {
        &self.favorites
    }

    pub fn is_favorite(&self, track_id: &str) -> bool {
        self.favorites.iter().any(|id| id == track_id)
    }

    pub fn total_listen_seconds(&self) -> u64 {
        self.total_listen_seconds
    }

    pub fn history(&self, track_id: &str) -> impl Iterator<Item = PlayEvent> + '_ {
        self.play_log.get(track_id).into_iter().flatten().copied()
    }

    /// Tracks with stored history, sorted by id.
    pub fn tracks(&self) -> Vec<(&str, &VecDeque<PlayEvent>)> {
        let mut rows: Vec<(&str, &VecDeque<PlayEvent>)> = self
            .play_log
            .iter()
            .map(|(track_id, events)| (track_id.as_str(), events))
            .collect();
        rows.sort_by(|a, b| a.0.cmp(b.0));
        rows
    }

    fn insert_favorite(&mut self, track_id: &str) -> bool {
        if self.is_favorite(track_id) {
            return false;
        }
        self.favorites.push(track_id.to_string());
        true
    }
}

/// Cloneable handle that serializes every operation behind one lock.
#[derive(Debug, Clone, Default)]
pub struct SharedTracker {
    inner: Arc<Mutex<PlayLogTracker>>,
}

impl SharedTracker {
    pub fn new(tracker: PlayLogTracker) -> Self {
        Self {
            inner: Arc::new(Mutex::new(tracker)),
        }
    }

    pub fn record_play(
        &self,
        track_id: &str,
        now: OffsetDateTime,
        duration_seconds: i64,
    ) -> TrackerResult<PlayOutcome> {
        self.lock().record_play(track_id, now, duration_seconds)
    }

    pub fn recent_play_count(&self, track_id: &str, now: OffsetDateTime) -> usize {
        self.lock().recent_play_count(track_id, now)
    }

    pub fn prune_expired(&self, now: OffsetDateTime) -> usize {
        self.lock().prune_expired(now)
    }

    pub fn add_favorite(&self, track_id: &str) -> TrackerResult<bool> {
        self.lock().add_favorite(track_id)
    }

    pub fn remove_favorite(&self, track_id: &str) -> bool {
        self.lock().remove_favorite(track_id)
    }

    pub fn reset(&self) {
        self.lock().reset();
    }

    pub fn snapshot(&self) -> TrackerSnapshot {
        self.lock().snapshot()
    }

    /// Runs `f` with the tracker locked, for reads that need several fields
    /// from the same moment.
    pub fn with<R>(&self, f: impl FnOnce(&mut PlayLogTracker) -> R) -> R {
        f(&mut self.lock())
    }

    fn lock(&self) -> MutexGuard<'_, PlayLogTracker> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// `0s`, `59s`, `1m 0s`, `1h 1m 1s`.
pub fn format_duration(total_seconds: u64) -> String {
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}

fn validate_track_id(track_id: &str) -> TrackerResult<()> {
    if track_id.trim().is_empty() {
        return Err(TrackerError::EmptyTrackId);
    }
    Ok(())
}

fn prune_events(events: &mut VecDeque<PlayEvent>, now: OffsetDateTime) -> usize {
    let cutoff = now - RETENTION_WINDOW;
    let before = events.len();
    events.retain(|event| event.at() > cutoff);
    before - events.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prop_assert;
    use proptest::prop_assert_eq;
    use std::thread;
    use time::macros::datetime;

    const T0: OffsetDateTime = datetime!(2024-05-01 08:00:00 UTC);

    fn hours(count: i64) -> Duration {
        Duration::hours(count)
    }

    #[test]
    fn fourth_play_in_window_promotes() {
        let mut tracker = PlayLogTracker::new();
        for offset in 0..3 {
            let outcome = tracker
                .record_play("trackX", T0 + hours(offset), 200)
                .expect("record");
            assert!(!outcome.promoted);
        }
        let outcome = tracker
            .record_play("trackX", T0 + hours(3), 200)
            .expect("record");

        assert_eq!(
            outcome,
            PlayOutcome {
                recent_plays: 4,
                promoted: true
            }
        );
        assert_eq!(tracker.recent_play_count("trackX", T0 + hours(3)), 4);
        assert_eq!(tracker.favorites(), ["trackX".to_string()]);
        assert_eq!(tracker.total_listen_seconds(), 800);
    }

    #[test]
    fn fourth_play_after_window_does_not_promote() {
        let mut tracker = PlayLogTracker::new();
        tracker.record_play("trackX", T0, 200).expect("record");
        tracker.record_play("trackX", T0 + hours(1), 200).expect("record");
        tracker.record_play("trackX", T0 + hours(2), 200).expect("record");
        let outcome = tracker
            .record_play("trackX", T0 + hours(25), 200)
            .expect("record");

        assert_eq!(outcome.recent_plays, 2);
        assert!(!outcome.promoted);
        assert!(!tracker.is_favorite("trackX"));
        let kept: Vec<OffsetDateTime> = tracker.history("trackX").map(PlayEvent::at).collect();
        assert_eq!(kept, [T0 + hours(2), T0 + hours(25)]);
    }

    #[test]
    fn play_exactly_at_cutoff_is_excluded() {
        let mut tracker = PlayLogTracker::new();
        tracker.record_play("a", T0, 10).expect("record");

        assert_eq!(tracker.recent_play_count("a", T0 + hours(24)), 0);
        assert_eq!(
            tracker.recent_play_count("a", T0 + hours(24) - Duration::seconds(1)),
            1
        );

        let outcome = tracker.record_play("a", T0 + hours(24), 10).expect("record");
        assert_eq!(outcome.recent_plays, 1);
    }

    #[test]
    fn favorites_stay_after_plays_expire() {
        let mut tracker = PlayLogTracker::new();
        for offset in 0..4 {
            tracker
                .record_play("song", T0 + Duration::minutes(offset), 60)
                .expect("record");
        }
        assert!(tracker.is_favorite("song"));

        let later = T0 + hours(72);
        assert_eq!(tracker.prune_expired(later), 4);
        assert_eq!(tracker.recent_play_count("song", later), 0);
        assert!(tracker.is_favorite("song"));

        assert!(tracker.remove_favorite("song"));
        assert!(!tracker.is_favorite("song"));
        assert!(!tracker.remove_favorite("song"));
    }

    #[test]
    fn promotion_fires_once() {
        let mut tracker = PlayLogTracker::new();
        let promotions = (0..8)
            .map(|offset| {
                tracker
                    .record_play("song", T0 + Duration::minutes(offset), 60)
                    .expect("record")
            })
            .filter(|outcome| outcome.promoted)
            .count();

        assert_eq!(promotions, 1);
        assert_eq!(tracker.favorites().len(), 1);
    }

    #[test]
    fn removed_favorite_can_be_earned_again() {
        let mut tracker = PlayLogTracker::new();
        for offset in 0..4 {
            tracker
                .record_play("song", T0 + Duration::minutes(offset), 60)
                .expect("record");
        }
        tracker.remove_favorite("song");

        let outcome = tracker
            .record_play("song", T0 + Duration::minutes(5), 60)
            .expect("record");
        assert!(outcome.promoted);
        assert!(tracker.is_favorite("song"));
    }

    #[test]
    fn unknown_track_records_history() {
        let mut tracker = PlayLogTracker::new();
        let outcome = tracker.record_play("trackY", T0, 150).expect("record");

        assert_eq!(outcome.recent_plays, 1);
        assert_eq!(tracker.recent_play_count("trackY", T0), 1);
        assert_eq!(tracker.recent_play_count("never-played", T0), 0);
        assert_eq!(tracker.total_listen_seconds(), 150);
    }

    #[test]
    fn invalid_arguments_leave_state_untouched() {
        let mut tracker = PlayLogTracker::new();
        tracker.record_play("a", T0, 30).expect("record");
        let before = tracker.snapshot();

        assert_eq!(
            tracker.record_play("", T0, 30),
            Err(TrackerError::EmptyTrackId)
        );
        assert_eq!(
            tracker.record_play("   ", T0, 30),
            Err(TrackerError::EmptyTrackId)
        );
        assert_eq!(
            tracker.record_play("a", T0, -1),
            Err(TrackerError::NegativeDuration(-1))
        );
        assert_eq!(tracker.add_favorite(""), Err(TrackerError::EmptyTrackId));

        assert_eq!(tracker.snapshot(), before);
    }

    #[test]
    fn manual_favorite_ignores_history() {
        let mut tracker = PlayLogTracker::new();
        assert_eq!(tracker.add_favorite("curated"), Ok(true));
        assert_eq!(tracker.add_favorite("curated"), Ok(false));
        assert!(tracker.is_favorite("curated"));
        assert_eq!(tracker.history("curated").count(), 0);
    }

    #[test]
    fn reset_clears_everything() {
        let mut tracker = PlayLogTracker::new();
        for offset in 0..4 {
            tracker
                .record_play("song", T0 + hours(offset), 100)
                .expect("record");
        }
        tracker.add_favorite("other").expect("favorite");

        tracker.reset();

        assert_eq!(tracker.total_listen_seconds(), 0);
        assert!(tracker.favorites().is_empty());
        assert!(tracker.tracks().is_empty());
        assert_eq!(tracker.recent_play_count("song", T0 + hours(3)), 0);
    }

    #[test]
    fn snapshot_restores_same_state() {
        let mut tracker = PlayLogTracker::new();
        for offset in 0..4 {
            tracker
                .record_play("b", T0 + hours(offset), 90)
                .expect("record");
        }
        tracker.record_play("a", T0, 45).expect("record");

        let json = serde_json::to_string(&tracker.snapshot()).expect("serialize");
        let restored =
            PlayLogTracker::from_snapshot(serde_json::from_str(&json).expect("deserialize"));

        assert_eq!(restored.snapshot(), tracker.snapshot());
        assert_eq!(restored.recent_play_count("b", T0 + hours(3)), 4);
        assert_eq!(restored.favorites(), ["b".to_string()]);
        assert_eq!(restored.total_listen_seconds(), 405);
        let ids: Vec<&str> = restored.tracks().iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, ["a", "b"]);
    }

    #[test]
    fn snapshot_import_drops_empty_entries_and_duplicate_favorites() {
        let mut snapshot = TrackerSnapshot::default();
        snapshot.play_log.insert("empty".to_string(), Vec::new());
        snapshot.play_log.insert(String::new(), vec![PlayEvent::from(T0)]);
        snapshot
            .play_log
            .insert("kept".to_string(), vec![PlayEvent::from(T0)]);
        snapshot.favorites = vec![
            "x".to_string(),
            "y".to_string(),
            "x".to_string(),
            " ".to_string(),
        ];

        let tracker = PlayLogTracker::from_snapshot(snapshot);

        let ids: Vec<&str> = tracker.tracks().iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, ["kept"]);
        assert_eq!(tracker.favorites(), ["x".to_string(), "y".to_string()]);
    }

    #[test]
    fn format_duration_omits_leading_zero_units() {
        assert_eq!(format_duration(0), "0s");
        assert_eq!(format_duration(59), "59s");
        assert_eq!(format_duration(60), "1m 0s");
        assert_eq!(format_duration(3600), "1h 0m 0s");
        assert_eq!(format_duration(3661), "1h 1m 1s");
        assert_eq!(format_duration(90_061), "25h 1m 1s");
    }

    #[test]
    fn shared_tracker_serializes_concurrent_plays() {
        let shared = SharedTracker::default();
        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let shared = shared.clone();
                thread::spawn(move || {
                    for play in 0..25 {
                        let now = T0 + Duration::seconds(worker * 100 + play);
                        shared
                            .record_play(&format!("track-{}", worker % 2), now, 3)
                            .expect("record");
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("join");
        }

        let snapshot = shared.snapshot();
        assert_eq!(snapshot.total_listen_seconds, 8 * 25 * 3);
        assert_eq!(snapshot.play_log.values().map(Vec::len).sum::<usize>(), 200);
        shared.with(|tracker| {
            assert!(tracker.is_favorite("track-0"));
            assert!(tracker.is_favorite("track-1"));
        });
    }

    proptest::proptest! {
        #[test]
        fn recent_count_matches_window(gaps in proptest::collection::vec(0i64..30_000, 1..60)) {
            let mut tracker = PlayLogTracker::new();
            let mut recorded = Vec::new();
            let mut now = T0;
            for gap in gaps {
                now += Duration::seconds(gap);
                tracker.record_play("t", now, 1).expect("record");
                recorded.push(now);

                let expected = recorded
                    .iter()
                    .filter(|at| **at > now - RETENTION_WINDOW)
                    .count();
                prop_assert_eq!(tracker.recent_play_count("t", now), expected);
                prop_assert_eq!(tracker.history("t").count(), expected);
            }
        }

        #[test]
        fn promotion_matches_first_full_window(gaps in proptest::collection::vec(0i64..60_000, 1..40)) {
            let mut tracker = PlayLogTracker::new();
            let mut recorded = Vec::new();
            let mut reached = false;
            let mut now = T0;
            for gap in gaps {
                now += Duration::seconds(gap);
                let outcome = tracker.record_play("t", now, 1).expect("record");
                recorded.push(now);

                let in_window = recorded
                    .iter()
                    .filter(|at| **at > now - RETENTION_WINDOW)
                    .count();
                let first_time = in_window >= FAVORITE_THRESHOLD && !reached;
                prop_assert_eq!(outcome.promoted, first_time);
                reached |= in_window >= FAVORITE_THRESHOLD;
                prop_assert_eq!(tracker.is_favorite("t"), reached);
            }
        }

        #[test]
        fn total_time_is_sum_of_durations(durations in proptest::collection::vec(0i64..100_000, 0..50)) {
            let mut tracker = PlayLogTracker::new();
            let mut previous = 0;
            for (index, duration) in durations.iter().enumerate() {
                let now = T0 + Duration::minutes(index as i64);
                tracker.record_play("t", now, *duration).expect("record");
                prop_assert!(tracker.total_listen_seconds() >= previous);
                previous = tracker.total_listen_seconds();
            }
            prop_assert_eq!(
                tracker.total_listen_seconds(),
                durations.iter().map(|value| *value as u64).sum::<u64>()
            );
            tracker.reset();
            prop_assert_eq!(tracker.total_listen_seconds(), 0);
        }
    }
}
