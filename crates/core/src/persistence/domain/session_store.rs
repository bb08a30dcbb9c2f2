use std::collections::BTreeMap;
use std::fmt;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::emotion::domain::emotion::Emotion;
use crate::shared::constants::DASHBOARD_EMOTION_PLACEHOLDER;

/// Store-assigned identifier of a capture session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: SessionId,
    pub user_id: Option<u32>,
    pub started_at: SystemTime,
    pub ended_at: Option<SystemTime>,
    pub total_faces: usize,
    pub most_common_emotion: Option<Emotion>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmotionLogEntry {
    pub session_id: SessionId,
    pub emotion: Emotion,
    pub logged_at: SystemTime,
}

/// Lifetime totals across every session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_sessions: u64,
    pub total_faces_detected: u64,
    pub most_common_emotion: Option<Emotion>,
    pub last_updated: SystemTime,
}

impl DashboardStats {
    /// Emotion label for display, `N/A` until one has been recorded.
    pub fn most_common_label(&self) -> &'static str {
        self.most_common_emotion
            .map(|e| e.as_str())
            .unwrap_or(DASHBOARD_EMOTION_PLACEHOLDER)
    }
}

impl Default for DashboardStats {
    fn default() -> Self {
        Self {
            total_sessions: 0,
            total_faces_detected: 0,
            most_common_emotion: None,
            last_updated: SystemTime::now(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Session store unavailable: {0}")]
    Unavailable(String),
    #[error("Unknown session {0}")]
    UnknownSession(SessionId),
    #[error("Session store I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("Session store data is malformed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Durable home of sessions, emotion logs and the dashboard aggregate.
///
/// Written only at session transitions, never per frame. Shared between the
/// controller and read-side callers, hence `&self` methods.
pub trait SessionStore: Send + Sync {
    /// Records a new session started now and bumps the session counter.
    fn create_session(&self, user_id: Option<u32>) -> Result<SessionId, StoreError>;

    fn append_emotion_log(&self, session_id: SessionId, emotion: Emotion)
        -> Result<(), StoreError>;

    /// Appends one log entry per emotion. Stores that can do it in a single
    /// write override this; the default appends them one at a time.
    fn append_emotion_logs(
        &self,
        session_id: SessionId,
        emotions: &[Emotion],
    ) -> Result<(), StoreError> {
        emotions
            .iter()
            .try_for_each(|&emotion| self.append_emotion_log(session_id, emotion))
    }

    /// Stamps the end time and final statistics of a session.
    fn finalize_session(
        &self,
        session_id: SessionId,
        total_faces: usize,
        top_emotion: Emotion,
    ) -> Result<(), StoreError>;

    /// Adds `delta_faces` to the lifetime total. A `None` emotion keeps the
    /// previous most-common value.
    fn update_dashboard_aggregate(
        &self,
        delta_faces: usize,
        top_emotion: Option<Emotion>,
    ) -> Result<(), StoreError>;

    fn dashboard_stats(&self) -> Result<DashboardStats, StoreError>;

    /// Sessions newest first, optionally restricted to one user.
    fn list_sessions(&self, user_id: Option<u32>) -> Result<Vec<SessionRecord>, StoreError>;

    /// Logged emotion counts for one session, or across all sessions.
    fn emotion_counts(
        &self,
        session_id: Option<SessionId>,
    ) -> Result<BTreeMap<Emotion, usize>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dashboard_label_placeholder() {
        let stats = DashboardStats::default();
        assert_eq!(stats.most_common_label(), "N/A");
    }

    #[test]
    fn test_dashboard_label_uses_emotion() {
        let stats = DashboardStats {
            most_common_emotion: Some(Emotion::Happy),
            ..DashboardStats::default()
        };
        assert_eq!(stats.most_common_label(), "happy");
    }

    #[test]
    fn test_session_id_serializes_as_number() {
        assert_eq!(serde_json::to_string(&SessionId(7)).unwrap(), "7");
    }
}
