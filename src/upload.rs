use crate::app_dirs::AppDirs;
use crate::ledger::SessionRecord;
use crate::stimulus::{MIN_CATALOG_SIZE, TARGET_COUNT};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Body of a result upload to the remote result store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultUpload {
    pub user_id: i64,
    pub score: i64,
    pub moves: i64,
    /// Whole seconds, rounded up
    pub time_taken: i64,
    pub difficulty: String,
    pub grid_size: String,
    pub completed: bool,
}

impl ResultUpload {
    pub fn from_record(record: &SessionRecord, user_id: i64, difficulty: &str) -> Self {
        Self {
            user_id,
            score: record.accuracy.round() as i64,
            moves: record.selected_sounds.len() as i64,
            time_taken: record.reaction_time_ms.div_ceil(1000) as i64,
            difficulty: difficulty.to_string(),
            grid_size: format!("{TARGET_COUNT}x{MIN_CATALOG_SIZE}"),
            completed: true,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("result store rejected upload: {0}")]
    Rejected(String),
    #[error("result upload failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("result upload encoding failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Fire-and-forget destination for finished trials. Retries are the sink's business.
///
/// `submit` runs inside the session's submit path, so it must return without
/// waiting on the network: write to a local queue or hand off to a worker
/// thread, and ship from there.
pub trait ResultSink {
    fn submit(&mut self, upload: &ResultUpload) -> Result<(), UploadError>;
}

/// Appends each upload as one JSON line to a local outbox file for a
/// separate shipper to drain.
#[derive(Debug)]
pub struct JsonlOutbox {
    path: PathBuf,
}

impl JsonlOutbox {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, UploadError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(Self { path })
    }

    /// Outbox under the state directory
    pub fn open_default() -> Result<Self, UploadError> {
        Self::open(AppDirs::outbox_path().unwrap_or_else(|| PathBuf::from("soundspan_outbox.jsonl")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ResultSink for JsonlOutbox {
    fn submit(&mut self, upload: &ResultUpload) -> Result<(), UploadError> {
        let mut line = serde_json::to_vec(upload)?;
        line.push(b'\n');
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.write_all(&line)?;
        debug!(path = %self.path.display(), score = upload.score, "queued result upload");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn upload_from_record() {
        let record = SessionRecord::new(
            Utc::now(),
            200.0 / 3.0,
            4201,
            vec!["Dog".into(), "Cat".into(), "Bird".into()],
            vec!["Dog".into(), "Cat".into(), "Drum".into()],
            4,
            false,
        );
        let upload = ResultUpload::from_record(&record, 12, "medium");
        assert_eq!(
            upload,
            ResultUpload {
                user_id: 12,
                score: 67,
                moves: 3,
                time_taken: 5,
                difficulty: "medium".into(),
                grid_size: "3x6".into(),
                completed: true,
            }
        );
    }

    #[test]
    fn outbox_appends_one_line_per_upload() {
        let dir = tempfile::tempdir().unwrap();
        let mut outbox = JsonlOutbox::open(dir.path().join("state").join("outbox.jsonl")).unwrap();
        let record = SessionRecord::new(
            Utc::now(),
            100.0,
            1500,
            vec!["Dog".into(), "Cat".into(), "Bird".into()],
            vec!["Bird".into(), "Cat".into(), "Dog".into()],
            1,
            true,
        );
        let first = ResultUpload::from_record(&record, 7, "medium");
        let second = ResultUpload::from_record(&record, 7, "hard");
        outbox.submit(&first).unwrap();
        outbox.submit(&second).unwrap();

        let text = std::fs::read_to_string(outbox.path()).unwrap();
        let queued: Vec<ResultUpload> = text
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(queued, vec![first, second]);
    }

    #[test]
    fn upload_json_field_names() {
        let upload = ResultUpload {
            user_id: 1,
            score: 100,
            moves: 3,
            time_taken: 2,
            difficulty: "easy".into(),
            grid_size: "3x6".into(),
            completed: true,
        };
        let json = serde_json::to_value(&upload).unwrap();
        assert_eq!(json["user_id"], 1);
        assert_eq!(json["time_taken"], 2);
        assert_eq!(json["grid_size"], "3x6");
    }
}
