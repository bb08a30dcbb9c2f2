use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use crate::emotion::domain::emotion::Emotion;
use crate::persistence::domain::session_store::{
    DashboardStats, SessionId, SessionRecord, SessionStore, StoreError,
};
use crate::persistence::domain::store_ledger::StoreLedger;

/// Session store persisted as a single pretty-printed JSON document.
///
/// Every mutation rewrites the file through a sibling `.tmp` file and a
/// rename, so a crash leaves either the old or the new ledger on disk. A
/// mutation that fails to persist is rolled back in memory.
pub struct JsonFileSessionStore {
    path: PathBuf,
    ledger: Mutex<StoreLedger>,
}

impl JsonFileSessionStore {
    /// Opens the ledger at `path`, starting empty if the file doesn't exist.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let ledger = match fs::read_to_string(&path) {
            Ok(json) => serde_json::from_str(&json)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoreLedger::default(),
            Err(e) => return Err(e.into()),
        };
        log::info!("Session store at {}", path.display());
        Ok(Self {
            path,
            ledger: Mutex::new(ledger),
        })
    }

    /// Default location under the platform data directory.
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_dir().map(|d| d.join("Moodwatch").join("sessions.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn mutate<T>(
        &self,
        f: impl FnOnce(&mut StoreLedger) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut ledger = self.ledger.lock().unwrap_or_else(PoisonError::into_inner);
        let mut next = ledger.clone();
        let value = f(&mut next)?;
        write_atomic(&self.path, &next)?;
        *ledger = next;
        Ok(value)
    }

    fn read<T>(&self, f: impl FnOnce(&StoreLedger) -> T) -> T {
        let ledger = self.ledger.lock().unwrap_or_else(PoisonError::into_inner);
        f(&ledger)
    }
}

fn write_atomic(path: &Path, ledger: &StoreLedger) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(ledger)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

impl SessionStore for JsonFileSessionStore {
    fn create_session(&self, user_id: Option<u32>) -> Result<SessionId, StoreError> {
        self.mutate(|ledger| Ok(ledger.create_session(user_id)))
    }

    fn append_emotion_log(
        &self,
        session_id: SessionId,
        emotion: Emotion,
    ) -> Result<(), StoreError> {
        self.mutate(|ledger| ledger.append_emotion_log(session_id, emotion))
    }

    fn append_emotion_logs(
        &self,
        session_id: SessionId,
        emotions: &[Emotion],
    ) -> Result<(), StoreError> {
        self.mutate(|ledger| ledger.append_emotion_logs(session_id, emotions))
    }

    fn finalize_session(
        &self,
        session_id: SessionId,
        total_faces: usize,
        top_emotion: Emotion,
    ) -> Result<(), StoreError> {
        self.mutate(|ledger| ledger.finalize_session(session_id, total_faces, top_emotion))
    }

    fn update_dashboard_aggregate(
        &self,
        delta_faces: usize,
        top_emotion: Option<Emotion>,
    ) -> Result<(), StoreError> {
        self.mutate(|ledger| {
            ledger.update_dashboard_aggregate(delta_faces, top_emotion);
            Ok(())
        })
    }

    fn dashboard_stats(&self) -> Result<DashboardStats, StoreError> {
        Ok(self.read(StoreLedger::dashboard_stats))
    }

    fn list_sessions(&self, user_id: Option<u32>) -> Result<Vec<SessionRecord>, StoreError> {
        Ok(self.read(|ledger| ledger.list_sessions(user_id)))
    }

    fn emotion_counts(
        &self,
        session_id: Option<SessionId>,
    ) -> Result<BTreeMap<Emotion, usize>, StoreError> {
        Ok(self.read(|ledger| ledger.emotion_counts(session_id)))
    }
}
