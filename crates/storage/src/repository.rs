//! Repository Implementation

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use dms::SessionRecord;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::StorageError;

/// Aggregate over all stored sessions
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HistorySummary {
    pub sessions: usize,
    pub total_frames: u64,
    pub drowsy_frames: u64,
    pub no_face_frames: u64,
    pub events: usize,
    pub drowsiness_percentage: f64,
    /// Frame-weighted mean score over frames with a face
    pub mean_score: Option<f64>,
    pub longest_event_ms: Option<u64>,
}

/// Session log repository
pub struct Repository {
    /// Session records, oldest first
    sessions: Mutex<Vec<SessionRecord>>,
    /// JSON log file mirror (in-memory only when absent)
    log_path: Option<PathBuf>,
    /// Max session records kept
    max_sessions: usize,
}

impl Repository {
    /// Create a new in-memory repository
    pub fn new() -> Self {
        info!("Creating in-memory session repository");
        Self {
            sessions: Mutex::new(Vec::new()),
            log_path: None,
            max_sessions: 10_000,
        }
    }

    /// Open a repository backed by a JSON log file.
    /// A missing or unreadable log starts an empty history.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();

        let sessions = match fs::read_to_string(&path) {
            Ok(text) if text.trim().is_empty() => Vec::new(),
            Ok(text) => match serde_json::from_str::<Vec<SessionRecord>>(&text) {
                Ok(sessions) => drop_inconsistent(sessions, &path),
                Err(e) => {
                    warn!("Session log {} is corrupt, starting empty: {}", path.display(), e);
                    Vec::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        info!(
            "Opened session log {} ({} sessions)",
            path.display(),
            sessions.len()
        );

        Ok(Self {
            sessions: Mutex::new(sessions),
            log_path: Some(path),
            max_sessions: 10_000,
        })
    }

    pub fn log_path(&self) -> Option<&Path> {
        self.log_path.as_deref()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<SessionRecord>>, StorageError> {
        self.sessions
            .lock()
            .map_err(|e| StorageError::Lock(e.to_string()))
    }

    /// Append a finalized session and persist the log
    pub fn insert_session(&self, record: SessionRecord) -> Result<(), StorageError> {
        let mut sessions = self.lock()?;

        if sessions.iter().any(|s| s.session_id == record.session_id) {
            return Err(StorageError::Duplicate(record.session_id));
        }

        // Enforce retention
        if sessions.len() >= self.max_sessions {
            let excess = sessions.len() + 1 - self.max_sessions;
            sessions.drain(..excess);
        }

        debug!("Inserting session {}", record.session_id);
        sessions.push(record);

        if let Some(path) = &self.log_path {
            persist(path, &sessions)?;
        }
        Ok(())
    }

    /// Most recent sessions first
    pub fn get_sessions(&self, limit: usize) -> Result<Vec<SessionRecord>, StorageError> {
        let sessions = self.lock()?;
        Ok(sessions.iter().rev().take(limit).cloned().collect())
    }

    pub fn get_session(&self, id: Uuid) -> Result<SessionRecord, StorageError> {
        let sessions = self.lock()?;
        sessions
            .iter()
            .find(|s| s.session_id == id)
            .cloned()
            .ok_or(StorageError::NotFound(id))
    }

    pub fn latest(&self) -> Result<Option<SessionRecord>, StorageError> {
        Ok(self.lock()?.last().cloned())
    }

    /// Get total session count
    pub fn session_count(&self) -> usize {
        self.sessions.lock().map(|s| s.len()).unwrap_or(0)
    }

    /// Summarize the whole history
    pub fn summary(&self) -> Result<HistorySummary, StorageError> {
        let sessions = self.lock()?;

        let mut summary = HistorySummary {
            sessions: sessions.len(),
            ..Default::default()
        };
        let mut score_sum = 0.0;
        let mut scored_frames = 0u64;

        for session in sessions.iter() {
            summary.total_frames += session.total_frames;
            summary.drowsy_frames += session.drowsy_frames;
            summary.no_face_frames += session.no_face_frames;
            summary.events += session.events.len();

            if let Some(mean) = session.mean_score {
                let scored = session.total_frames.saturating_sub(session.no_face_frames);
                score_sum += mean * scored as f64;
                scored_frames += scored;
            }

            let longest = session.events.iter().filter_map(|e| e.duration_ms()).max();
            summary.longest_event_ms = summary.longest_event_ms.max(longest);
        }

        summary.drowsiness_percentage =
            summary.drowsy_frames as f64 / summary.total_frames.max(1) as f64 * 100.0;
        summary.mean_score = (scored_frames > 0).then(|| score_sum / scored_frames as f64);
        Ok(summary)
    }
}

impl Default for Repository {
    fn default() -> Self {
        Self::new()
    }
}

/// Skip records whose frame counters contradict each other
fn drop_inconsistent(sessions: Vec<SessionRecord>, path: &Path) -> Vec<SessionRecord> {
    sessions
        .into_iter()
        .filter(|s| {
            let ok = s.is_consistent();
            if !ok {
                warn!(
                    "Skipping session {} in {}: {} drowsy + {} no-face frames exceed {} total",
                    s.session_id,
                    path.display(),
                    s.drowsy_frames,
                    s.no_face_frames,
                    s.total_frames
                );
            }
            ok
        })
        .collect()
}

/// Write through a temp file so a crash never leaves a half-written log
fn persist(path: &Path, sessions: &[SessionRecord]) -> Result<(), StorageError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_string_pretty(sessions)?;
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)?;

    debug!("Persisted {} sessions to {}", sessions.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use dms::AlertEvent;

    fn record(total: u64, drowsy: u64, no_face: u64, mean: Option<f64>) -> SessionRecord {
        let start = Utc::now();
        SessionRecord {
            session_id: Uuid::new_v4(),
            start_time: start,
            end_time: start + Duration::seconds(30),
            total_frames: total,
            no_face_frames: no_face,
            drowsy_frames: drowsy,
            events: Vec::new(),
            mean_score: mean,
        }
    }

    fn event(start: u64, end: u64) -> AlertEvent {
        AlertEvent {
            start_frame_index: 1,
            end_frame_index: Some(2),
            start_timestamp: start,
            end_timestamp: Some(end),
            mean_score: Some(0.1),
            peak_score: Some(0.05),
        }
    }

    #[test]
    fn test_session_insert_and_retrieve() {
        let repo = Repository::new();
        let first = record(100, 10, 0, Some(0.3));
        let second = record(50, 0, 5, Some(0.28));

        repo.insert_session(first.clone()).unwrap();
        repo.insert_session(second.clone()).unwrap();

        let sessions = repo.get_sessions(10).unwrap();
        assert_eq!(sessions, vec![second.clone(), first.clone()]);
        assert_eq!(repo.latest().unwrap(), Some(second));
        assert_eq!(repo.get_session(first.session_id).unwrap(), first);
        assert_eq!(repo.session_count(), 2);
    }

    #[test]
    fn test_unknown_and_duplicate_sessions() {
        let repo = Repository::new();
        assert!(matches!(
            repo.get_session(Uuid::new_v4()),
            Err(StorageError::NotFound(_))
        ));

        let r = record(1, 0, 0, None);
        repo.insert_session(r.clone()).unwrap();
        assert!(matches!(
            repo.insert_session(r),
            Err(StorageError::Duplicate(_))
        ));
    }

    #[test]
    fn test_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("sessions.json");

        let r = record(10, 3, 1, Some(0.22));
        {
            let repo = Repository::open(&path).unwrap();
            assert_eq!(repo.session_count(), 0);
            repo.insert_session(r.clone()).unwrap();
        }

        let reopened = Repository::open(&path).unwrap();
        assert_eq!(reopened.get_sessions(10).unwrap(), vec![r]);
        assert_eq!(reopened.log_path(), Some(path.as_path()));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_corrupt_log_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.json");
        fs::write(&path, "{ not json").unwrap();

        let repo = Repository::open(&path).unwrap();
        assert_eq!(repo.session_count(), 0);

        repo.insert_session(record(1, 0, 0, None)).unwrap();
        assert_eq!(Repository::open(&path).unwrap().session_count(), 1);
    }

    #[test]
    fn test_retention_limit() {
        let mut repo = Repository::new();
        repo.max_sessions = 3;

        let records: Vec<_> = (0..5).map(|_| record(1, 0, 0, None)).collect();
        for r in &records {
            repo.insert_session(r.clone()).unwrap();
        }

        assert_eq!(repo.session_count(), 3);
        let kept = repo.get_sessions(10).unwrap();
        assert_eq!(kept[2].session_id, records[2].session_id);
    }

    #[test]
    fn test_summary() {
        let repo = Repository::new();
        assert_eq!(repo.summary().unwrap(), HistorySummary::default());

        let mut a = record(100, 20, 0, Some(0.2));
        a.events = vec![event(0, 1500), event(2000, 2400)];
        let b = record(100, 0, 50, Some(0.3));
        repo.insert_session(a).unwrap();
        repo.insert_session(b).unwrap();

        let summary = repo.summary().unwrap();
        assert_eq!(summary.sessions, 2);
        assert_eq!(summary.total_frames, 200);
        assert_eq!(summary.events, 2);
        assert_eq!(summary.drowsiness_percentage, 10.0);
        assert_eq!(summary.longest_event_ms, Some(1500));
        // (0.2 * 100 + 0.3 * 50) / 150
        let mean = summary.mean_score.unwrap();
        assert!((mean - 35.0 / 150.0).abs() < 1e-12);
    }

    #[test]
    fn test_inconsistent_records_skipped_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.json");

        let good = record(10, 2, 1, Some(0.24));
        let bad = record(1, 0, 5, Some(0.3));
        fs::write(&path, serde_json::to_string(&vec![bad, good.clone()]).unwrap()).unwrap();

        let repo = Repository::open(&path).unwrap();
        assert_eq!(repo.get_sessions(10).unwrap(), vec![good]);

        let summary = repo.summary().unwrap();
        assert_eq!(summary.total_frames, 10);
        assert!((summary.mean_score.unwrap() - 0.24).abs() < 1e-12);
    }

    #[test]
    fn test_summary_tolerates_inconsistent_inserted_record() {
        let repo = Repository::new();
        repo.insert_session(record(1, 0, 5, Some(0.3))).unwrap();

        let summary = repo.summary().unwrap();
        assert_eq!(summary.mean_score, None);
        assert_eq!(summary.no_face_frames, 5);
    }
}
