use std::sync::Arc;

use serde::Serialize;

use crate::emotion::domain::emotion::{most_common, Emotion};
use crate::persistence::domain::session_store::{SessionId, SessionStore, StoreError};
use crate::pipeline::snapshot::PipelineSnapshot;

/// Outcome of finalizing a session.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SessionReport {
    pub session_id: SessionId,
    pub total_faces: usize,
    pub top_emotion: Emotion,
    pub logged_tracks: usize,
    /// `false` if any store write failed; failures are logged, not raised.
    pub persisted: bool,
}

/// Turns a session's live state into durable aggregates.
///
/// Talks to the store only at the start and end of a session.
pub struct SessionAggregator {
    store: Arc<dyn SessionStore>,
}

impl SessionAggregator {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn begin(&self, user_id: Option<u32>) -> Result<SessionId, StoreError> {
        let id = self.store.create_session(user_id)?;
        log::info!("Session {id} started");
        Ok(id)
    }

    /// Persists the final state of a session, best effort.
    ///
    /// Writes one emotion log per resident track in a single batch, closes
    /// the session with the last cycle's face count and top emotion, then
    /// folds the session into the dashboard. Each failure is logged and the remaining writes
    /// still run.
    pub fn finalize(&self, session_id: SessionId, last: &PipelineSnapshot) -> SessionReport {
        let total_faces = last.summary.total_faces;
        let top_emotion = last.summary.most_common();
        let mut persisted = true;

        let emotions: Vec<Emotion> = last.tracks.iter().map(|t| t.emotion).collect();
        let logged_tracks = match self.store.append_emotion_logs(session_id, &emotions) {
            Ok(()) => emotions.len(),
            Err(e) => {
                log::error!("Failed to log {} track emotions: {e}", emotions.len());
                persisted = false;
                0
            }
        };

        if let Err(e) = self
            .store
            .finalize_session(session_id, total_faces, top_emotion)
        {
            log::error!("Failed to finalize session {session_id}: {e}");
            persisted = false;
        }

        let global_top = match self.store.emotion_counts(None) {
            Ok(counts) => most_common(&counts),
            Err(e) => {
                log::warn!("Could not recompute dashboard emotion: {e}");
                None
            }
        };
        if let Err(e) = self
            .store
            .update_dashboard_aggregate(total_faces, global_top)
        {
            log::error!("Failed to update dashboard: {e}");
            persisted = false;
        }

        log::info!(
            "Session {session_id} finalized: {total_faces} faces, top emotion {top_emotion}, {logged_tracks} tracks logged"
        );
        SessionReport {
            session_id,
            total_faces,
            top_emotion,
            logged_tracks,
            persisted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::domain::session_store::{DashboardStats, SessionRecord};
    use crate::persistence::infrastructure::in_memory_store::InMemorySessionStore;
    use crate::pipeline::emotion_summary::EmotionSummary;
    use crate::shared::bounding_box::BoundingBox;
    use crate::tracking::domain::face_observation::FaceObservation;
    use crate::tracking::domain::face_tracker::FaceTracker;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts write calls on the way to an in-memory store.
    #[derive(Default)]
    struct CountingStore {
        inner: InMemorySessionStore,
        single_logs: AtomicUsize,
        batch_logs: AtomicUsize,
    }

    impl SessionStore for CountingStore {
        fn create_session(&self, user_id: Option<u32>) -> Result<SessionId, StoreError> {
            self.inner.create_session(user_id)
        }

        fn append_emotion_log(
            &self,
            session_id: SessionId,
            emotion: Emotion,
        ) -> Result<(), StoreError> {
            self.single_logs.fetch_add(1, Ordering::SeqCst);
            self.inner.append_emotion_log(session_id, emotion)
        }

        fn append_emotion_logs(
            &self,
            session_id: SessionId,
            emotions: &[Emotion],
        ) -> Result<(), StoreError> {
            self.batch_logs.fetch_add(1, Ordering::SeqCst);
            self.inner.append_emotion_logs(session_id, emotions)
        }

        fn finalize_session(
            &self,
            session_id: SessionId,
            total_faces: usize,
            top_emotion: Emotion,
        ) -> Result<(), StoreError> {
            self.inner.finalize_session(session_id, total_faces, top_emotion)
        }

        fn update_dashboard_aggregate(
            &self,
            delta_faces: usize,
            top_emotion: Option<Emotion>,
        ) -> Result<(), StoreError> {
            self.inner.update_dashboard_aggregate(delta_faces, top_emotion)
        }

        fn dashboard_stats(&self) -> Result<DashboardStats, StoreError> {
            self.inner.dashboard_stats()
        }

        fn list_sessions(&self, user_id: Option<u32>) -> Result<Vec<SessionRecord>, StoreError> {
            self.inner.list_sessions(user_id)
        }

        fn emotion_counts(
            &self,
            session_id: Option<SessionId>,
        ) -> Result<BTreeMap<Emotion, usize>, StoreError> {
            self.inner.emotion_counts(session_id)
        }
    }

    fn snapshot_of(emotions: &[Emotion]) -> PipelineSnapshot {
        let observations: Vec<FaceObservation> = emotions
            .iter()
            .enumerate()
            .map(|(i, &e)| FaceObservation::new(BoundingBox::new(i as i32 * 200, 0, 40, 40), e))
            .collect();
        let mut tracker = FaceTracker::new(75.0, 0);
        tracker.update(&observations);
        PipelineSnapshot {
            cycle: 1,
            summary: EmotionSummary::from_observations(&observations),
            tracks: tracker.tracks().to_vec(),
            frame: None,
        }
    }

    #[test]
    fn test_finalize_writes_logs_session_and_dashboard() {
        let store = Arc::new(InMemorySessionStore::new());
        let aggregator = SessionAggregator::new(store.clone());
        let id = aggregator.begin(Some(1)).unwrap();

        let report = aggregator.finalize(id, &snapshot_of(&[Emotion::Happy, Emotion::Happy, Emotion::Sad]));

        assert_eq!(
            report,
            SessionReport {
                session_id: id,
                total_faces: 3,
                top_emotion: Emotion::Happy,
                logged_tracks: 3,
                persisted: true,
            }
        );
        let session = &store.list_sessions(None).unwrap()[0];
        assert_eq!(session.total_faces, 3);
        assert_eq!(session.most_common_emotion, Some(Emotion::Happy));

        let stats = store.dashboard_stats().unwrap();
        assert_eq!(stats.total_sessions, 1);
        assert_eq!(stats.total_faces_detected, 3);
        assert_eq!(stats.most_common_emotion, Some(Emotion::Happy));
    }

    #[test]
    fn test_track_logs_are_written_in_one_batch() {
        let store = Arc::new(CountingStore::default());
        let aggregator = SessionAggregator::new(store.clone());
        let id = aggregator.begin(None).unwrap();

        let report = aggregator.finalize(
            id,
            &snapshot_of(&[Emotion::Happy, Emotion::Sad, Emotion::Sad, Emotion::Fear]),
        );

        assert_eq!(report.logged_tracks, 4);
        assert_eq!(store.batch_logs.load(Ordering::SeqCst), 1);
        assert_eq!(store.single_logs.load(Ordering::SeqCst), 0);
        assert_eq!(store.emotion_counts(Some(id)).unwrap()[&Emotion::Sad], 2);
    }

    #[test]
    fn test_empty_session_defaults_to_neutral_and_keeps_dashboard_emotion() {
        let store = Arc::new(InMemorySessionStore::new());
        let aggregator = SessionAggregator::new(store.clone());

        let first = aggregator.begin(None).unwrap();
        aggregator.finalize(first, &snapshot_of(&[Emotion::Fear]));

        let second = aggregator.begin(None).unwrap();
        let report = aggregator.finalize(second, &PipelineSnapshot::default());

        assert_eq!(report.top_emotion, Emotion::Neutral);
        assert_eq!(report.logged_tracks, 0);
        let stats = store.dashboard_stats().unwrap();
        assert_eq!(stats.most_common_emotion, Some(Emotion::Fear));
        assert_eq!(stats.total_faces_detected, 1);
    }

    #[test]
    fn test_dashboard_emotion_is_global_across_sessions() {
        let store = Arc::new(InMemorySessionStore::new());
        let aggregator = SessionAggregator::new(store.clone());

        let a = aggregator.begin(None).unwrap();
        aggregator.finalize(a, &snapshot_of(&[Emotion::Sad, Emotion::Sad]));
        let b = aggregator.begin(None).unwrap();
        aggregator.finalize(b, &snapshot_of(&[Emotion::Happy]));

        assert_eq!(
            store.emotion_counts(None).unwrap(),
            BTreeMap::from([(Emotion::Happy, 1), (Emotion::Sad, 2)])
        );
        assert_eq!(
            store.dashboard_stats().unwrap().most_common_emotion,
            Some(Emotion::Sad)
        );
    }

    #[test]
    fn test_store_outage_at_finalize_is_reported_not_raised() {
        let store = Arc::new(InMemorySessionStore::new());
        let aggregator = SessionAggregator::new(store.clone());
        let id = aggregator.begin(None).unwrap();

        store.set_available(false);
        let report = aggregator.finalize(id, &snapshot_of(&[Emotion::Happy]));

        assert!(!report.persisted);
        assert_eq!(report.logged_tracks, 0);
        assert_eq!(report.top_emotion, Emotion::Happy);
    }
}
