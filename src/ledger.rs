use crate::app_dirs::AppDirs;
use crate::util::{mean, round_to, std_dev};
use chrono::{DateTime, Utc};
use itertools::Itertools;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Persisted outcome of one completed trial
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub accuracy: f64,
    pub reaction_time_ms: u64,
    pub correct_sounds: Vec<String>,
    pub selected_sounds: Vec<String>,
    pub game_number: u32,
    pub is_correct: bool,
}

impl SessionRecord {
    pub fn new(
        timestamp: DateTime<Utc>,
        accuracy: f64,
        reaction_time_ms: u64,
        correct_sounds: Vec<String>,
        selected_sounds: Vec<String>,
        game_number: u32,
        is_correct: bool,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp,
            accuracy,
            reaction_time_ms,
            correct_sounds,
            selected_sounds,
            game_number,
            is_correct,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("ledger database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("ledger encoding error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("ledger export error: {0}")]
    Csv(#[from] csv::Error),
    #[error("ledger io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt ledger row {row}: {reason}")]
    Corrupt { row: i64, reason: String },
}

/// Durable backing for the ledger
pub trait LedgerStore {
    /// Every stored record in insertion order
    fn load(&self) -> Result<Vec<SessionRecord>, LedgerError>;
    fn append(&mut self, record: &SessionRecord) -> Result<(), LedgerError>;
    fn clear(&mut self) -> Result<(), LedgerError>;
}

/// SQLite-backed store, one row per trial
#[derive(Debug)]
pub struct SqliteLedgerStore {
    conn: Connection,
}

impl SqliteLedgerStore {
    /// Open the store at the default state location
    pub fn open_default() -> Result<Self, LedgerError> {
        let path = AppDirs::ledger_path().unwrap_or_else(|| PathBuf::from("soundspan_ledger.db"));
        Self::open(path)
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, LedgerError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        debug!(path = %path.display(), "opening ledger database");
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, LedgerError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, LedgerError> {
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS session_records (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                timestamp TEXT NOT NULL,
                accuracy REAL NOT NULL,
                reaction_time_ms INTEGER NOT NULL,
                correct_sounds TEXT NOT NULL,
                selected_sounds TEXT NOT NULL,
                game_number INTEGER NOT NULL,
                is_correct BOOLEAN NOT NULL
            )
            "#,
            [],
        )?;
        Ok(Self { conn })
    }
}

impl LedgerStore for SqliteLedgerStore {
    fn load(&self) -> Result<Vec<SessionRecord>, LedgerError> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT seq, id, timestamp, accuracy, reaction_time_ms,
                   correct_sounds, selected_sounds, game_number, is_correct
            FROM session_records
            ORDER BY seq ASC
            "#,
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, f64>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, u32>(7)?,
                row.get::<_, bool>(8)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (seq, id, timestamp, accuracy, reaction, correct, selected, game_number, is_correct) =
                row?;
            let timestamp = DateTime::parse_from_rfc3339(&timestamp)
                .map_err(|e| LedgerError::Corrupt {
                    row: seq,
                    reason: e.to_string(),
                })?
                .with_timezone(&Utc);

            records.push(SessionRecord {
                id,
                timestamp,
                accuracy,
                reaction_time_ms: reaction.max(0) as u64,
                correct_sounds: serde_json::from_str(&correct)?,
                selected_sounds: serde_json::from_str(&selected)?,
                game_number,
                is_correct,
            });
        }

        Ok(records)
    }

    fn append(&mut self, record: &SessionRecord) -> Result<(), LedgerError> {
        self.conn.execute(
            r#"
            INSERT INTO session_records
            (id, timestamp, accuracy, reaction_time_ms, correct_sounds, selected_sounds, game_number, is_correct)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                record.id,
                record.timestamp.to_rfc3339(),
                record.accuracy,
                record.reaction_time_ms as i64,
                serde_json::to_string(&record.correct_sounds)?,
                serde_json::to_string(&record.selected_sounds)?,
                record.game_number,
                record.is_correct,
            ],
        )?;
        Ok(())
    }

    fn clear(&mut self) -> Result<(), LedgerError> {
        self.conn.execute("DELETE FROM session_records", [])?;
        Ok(())
    }
}

/// Volatile store, used headless and in tests
#[derive(Debug, Default, Clone)]
pub struct MemoryLedgerStore {
    records: Vec<SessionRecord>,
}

impl LedgerStore for MemoryLedgerStore {
    fn load(&self) -> Result<Vec<SessionRecord>, LedgerError> {
        Ok(self.records.clone())
    }

    fn append(&mut self, record: &SessionRecord) -> Result<(), LedgerError> {
        self.records.push(record.clone());
        Ok(())
    }

    fn clear(&mut self) -> Result<(), LedgerError> {
        self.records.clear();
        Ok(())
    }
}

/// Trend thresholds for the caregiver alert.
///
/// The alert is raised when, among the last `window` trials, at least
/// `min_low_trials` scored below `accuracy_floor`. With the defaults that
/// means three low trials in a row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertPolicy {
    pub window: usize,
    pub accuracy_floor: f64,
    pub min_low_trials: usize,
}

impl Default for AlertPolicy {
    fn default() -> Self {
        Self {
            window: 3,
            accuracy_floor: 60.0,
            min_low_trials: 3,
        }
    }
}

impl AlertPolicy {
    pub fn evaluate(&self, records: &[SessionRecord]) -> bool {
        if self.window == 0 || self.min_low_trials == 0 || records.len() < self.window {
            return false;
        }
        let low = records[records.len() - self.window..]
            .iter()
            .filter(|r| r.accuracy < self.accuracy_floor)
            .count();
        low >= self.min_low_trials
    }
}

/// Aggregates over the whole ledger
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LedgerStats {
    pub total_trials: usize,
    pub exact_matches: usize,
    pub average_accuracy: f64,
    pub best_accuracy: f64,
    pub average_reaction_ms: f64,
    pub reaction_std_dev_ms: f64,
    pub total_reaction_ms: u64,
}

#[derive(Serialize)]
struct CsvRow<'a> {
    id: &'a str,
    timestamp: String,
    game_number: u32,
    accuracy: f64,
    reaction_time_ms: u64,
    is_correct: bool,
    correct_sounds: String,
    selected_sounds: String,
}

/// Append-only log of completed trials.
///
/// Reads are served from memory. Writes go to memory first and then through
/// to the store, so a failing store never loses the live session's records.
pub struct SessionLedger {
    store: Box<dyn LedgerStore>,
    records: Vec<SessionRecord>,
    policy: AlertPolicy,
}

impl std::fmt::Debug for SessionLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionLedger")
            .field("records", &self.records.len())
            .field("policy", &self.policy)
            .finish()
    }
}

impl SessionLedger {
    pub fn open<S: LedgerStore + 'static>(store: S, policy: AlertPolicy) -> Result<Self, LedgerError> {
        let records = store.load()?;
        debug!(count = records.len(), "loaded session ledger");
        Ok(Self {
            store: Box::new(store),
            records,
            policy,
        })
    }

    pub fn in_memory(policy: AlertPolicy) -> Self {
        Self {
            store: Box::new(MemoryLedgerStore::default()),
            records: Vec::new(),
            policy,
        }
    }

    pub fn policy(&self) -> AlertPolicy {
        self.policy
    }

    pub fn append(&mut self, record: SessionRecord) -> Result<(), LedgerError> {
        let result = self.store.append(&record);
        self.records.push(record);
        result
    }

    /// The last `n` records, oldest of the window first
    pub fn recent(&self, n: usize) -> &[SessionRecord] {
        let start = self.records.len().saturating_sub(n);
        &self.records[start..]
    }

    pub fn all(&self) -> &[SessionRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn next_session_number(&self) -> u32 {
        self.records.len() as u32 + 1
    }

    /// Up to `limit` records, newest first
    pub fn history(&self, limit: Option<usize>) -> Vec<&SessionRecord> {
        let limit = limit.unwrap_or(self.records.len());
        self.records.iter().rev().take(limit).collect()
    }

    pub fn alert_condition(&self) -> bool {
        self.policy.evaluate(&self.records)
    }

    pub fn stats(&self) -> LedgerStats {
        if self.records.is_empty() {
            return LedgerStats::default();
        }
        let accuracies: Vec<f64> = self.records.iter().map(|r| r.accuracy).collect();
        let reactions: Vec<f64> = self
            .records
            .iter()
            .map(|r| r.reaction_time_ms as f64)
            .collect();

        LedgerStats {
            total_trials: self.records.len(),
            exact_matches: self.records.iter().filter(|r| r.is_correct).count(),
            average_accuracy: round_to(mean(&accuracies).unwrap_or(0.0), 2),
            best_accuracy: accuracies.iter().copied().fold(0.0, f64::max),
            average_reaction_ms: mean(&reactions).unwrap_or(0.0),
            reaction_std_dev_ms: round_to(std_dev(&reactions).unwrap_or(0.0), 1),
            total_reaction_ms: self.records.iter().map(|r| r.reaction_time_ms).sum(),
        }
    }

    /// Irreversibly empty the ledger. Memory is cleared even if the store fails.
    pub fn clear_all(&mut self) -> Result<(), LedgerError> {
        info!(count = self.records.len(), "clearing session ledger");
        self.records.clear();
        self.store.clear()
    }

    pub fn export_csv<W: Write>(&self, writer: W) -> Result<(), LedgerError> {
        let mut wtr = csv::Writer::from_writer(writer);
        for record in &self.records {
            wtr.serialize(CsvRow {
                id: &record.id,
                timestamp: record.timestamp.to_rfc3339(),
                game_number: record.game_number,
                accuracy: record.accuracy,
                reaction_time_ms: record.reaction_time_ms,
                is_correct: record.is_correct,
                correct_sounds: record.correct_sounds.iter().join(";"),
                selected_sounds: record.selected_sounds.iter().join(";"),
            })?;
        }
        wtr.flush()?;
        Ok(())
    }
}
