use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::emotion::domain::emotion::Emotion;
use crate::persistence::domain::session_store::{
    DashboardStats, SessionId, SessionRecord, SessionStore, StoreError,
};
use crate::persistence::domain::store_ledger::StoreLedger;

/// Process-local session store.
///
/// Can be switched offline with [`set_available`](Self::set_available) to
/// exercise the controller's store-failure paths.
pub struct InMemorySessionStore {
    ledger: Mutex<StoreLedger>,
    available: AtomicBool,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self {
            ledger: Mutex::new(StoreLedger::default()),
            available: AtomicBool::new(true),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn ledger(&self) -> Result<MutexGuard<'_, StoreLedger>, StoreError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("store is offline".into()));
        }
        Ok(self.ledger.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore for InMemorySessionStore {
    fn create_session(&self, user_id: Option<u32>) -> Result<SessionId, StoreError> {
        Ok(self.ledger()?.create_session(user_id))
    }

    fn append_emotion_log(
        &self,
        session_id: SessionId,
        emotion: Emotion,
    ) -> Result<(), StoreError> {
        self.ledger()?.append_emotion_log(session_id, emotion)
    }

    fn append_emotion_logs(
        &self,
        session_id: SessionId,
        emotions: &[Emotion],
    ) -> Result<(), StoreError> {
        self.ledger()?.append_emotion_logs(session_id, emotions)
    }

    fn finalize_session(
        &self,
        session_id: SessionId,
        total_faces: usize,
        top_emotion: Emotion,
    ) -> Result<(), StoreError> {
        self.ledger()?
            .finalize_session(session_id, total_faces, top_emotion)
    }

    fn update_dashboard_aggregate(
        &self,
        delta_faces: usize,
        top_emotion: Option<Emotion>,
    ) -> Result<(), StoreError> {
        self.ledger()?
            .update_dashboard_aggregate(delta_faces, top_emotion);
        Ok(())
    }

    fn dashboard_stats(&self) -> Result<DashboardStats, StoreError> {
        Ok(self.ledger()?.dashboard_stats())
    }

    fn list_sessions(&self, user_id: Option<u32>) -> Result<Vec<SessionRecord>, StoreError> {
        Ok(self.ledger()?.list_sessions(user_id))
    }

    fn emotion_counts(
        &self,
        session_id: Option<SessionId>,
    ) -> Result<BTreeMap<Emotion, usize>, StoreError> {
        Ok(self.ledger()?.emotion_counts(session_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_through_trait() {
        let store = InMemorySessionStore::new();
        let id = store.create_session(Some(1)).unwrap();
        store.append_emotion_log(id, Emotion::Happy).unwrap();
        store.finalize_session(id, 1, Emotion::Happy).unwrap();

        assert_eq!(store.list_sessions(Some(1)).unwrap().len(), 1);
        assert_eq!(
            store.emotion_counts(Some(id)).unwrap(),
            BTreeMap::from([(Emotion::Happy, 1)])
        );
    }

    #[test]
    fn test_offline_store_rejects_calls() {
        let store = InMemorySessionStore::new();
        store.set_available(false);
        assert!(matches!(
            store.create_session(None),
            Err(StoreError::Unavailable(_))
        ));
        assert!(store.dashboard_stats().is_err());

        store.set_available(true);
        assert!(store.create_session(None).is_ok());
    }
}
