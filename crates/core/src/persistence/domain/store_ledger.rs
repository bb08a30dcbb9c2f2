use std::collections::BTreeMap;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::emotion::domain::emotion::Emotion;
use crate::persistence::domain::session_store::{
    DashboardStats, EmotionLogEntry, SessionId, SessionRecord, StoreError,
};

/// The complete contents of a session store.
///
/// Store implementations differ only in where the ledger lives; every rule
/// about ids, counters and aggregates is here.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreLedger {
    sessions: Vec<SessionRecord>,
    emotion_logs: Vec<EmotionLogEntry>,
    dashboard: DashboardStats,
    last_session_id: u64,
}

impl StoreLedger {
    pub fn create_session(&mut self, user_id: Option<u32>) -> SessionId {
        self.last_session_id += 1;
        let id = SessionId(self.last_session_id);
        let now = SystemTime::now();
        self.sessions.push(SessionRecord {
            id,
            user_id,
            started_at: now,
            ended_at: None,
            total_faces: 0,
            most_common_emotion: None,
        });
        self.dashboard.total_sessions += 1;
        self.dashboard.last_updated = now;
        id
    }

    pub fn append_emotion_log(
        &mut self,
        session_id: SessionId,
        emotion: Emotion,
    ) -> Result<(), StoreError> {
        self.session_mut(session_id)?;
        self.emotion_logs.push(EmotionLogEntry {
            session_id,
            emotion,
            logged_at: SystemTime::now(),
        });
        Ok(())
    }

    /// Appends all entries or, for an unknown session, none.
    pub fn append_emotion_logs(
        &mut self,
        session_id: SessionId,
        emotions: &[Emotion],
    ) -> Result<(), StoreError> {
        self.session_mut(session_id)?;
        let logged_at = SystemTime::now();
        self.emotion_logs
            .extend(emotions.iter().map(|&emotion| EmotionLogEntry {
                session_id,
                emotion,
                logged_at,
            }));
        Ok(())
    }

    pub fn finalize_session(
        &mut self,
        session_id: SessionId,
        total_faces: usize,
        top_emotion: Emotion,
    ) -> Result<(), StoreError> {
        let session = self.session_mut(session_id)?;
        session.ended_at = Some(SystemTime::now());
        session.total_faces = total_faces;
        session.most_common_emotion = Some(top_emotion);
        Ok(())
    }

    pub fn update_dashboard_aggregate(&mut self, delta_faces: usize, top_emotion: Option<Emotion>) {
        self.dashboard.total_faces_detected += delta_faces as u64;
        if top_emotion.is_some() {
            self.dashboard.most_common_emotion = top_emotion;
        }
        self.dashboard.last_updated = SystemTime::now();
    }

    pub fn dashboard_stats(&self) -> DashboardStats {
        self.dashboard.clone()
    }

    pub fn list_sessions(&self, user_id: Option<u32>) -> Vec<SessionRecord> {
        let mut sessions: Vec<SessionRecord> = self
            .sessions
            .iter()
            .filter(|s| user_id.is_none() || s.user_id == user_id)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.started_at.cmp(&a.started_at).then(b.id.cmp(&a.id)));
        sessions
    }

    pub fn emotion_counts(&self, session_id: Option<SessionId>) -> BTreeMap<Emotion, usize> {
        let mut counts = BTreeMap::new();
        for entry in &self.emotion_logs {
            if session_id.map_or(true, |id| id == entry.session_id) {
                *counts.entry(entry.emotion).or_insert(0) += 1;
            }
        }
        counts
    }

    fn session_mut(&mut self, session_id: SessionId) -> Result<&mut SessionRecord, StoreError> {
        self.sessions
            .iter_mut()
            .find(|s| s.id == session_id)
            .ok_or(StoreError::UnknownSession(session_id))
    }
}
