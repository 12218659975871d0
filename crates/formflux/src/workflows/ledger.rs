//! Append-only CSV ledgers for submissions and bug reports.

use std::fs::{File, OpenOptions};
use std::io::BufReader;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubmissionStatus {
    Success,
    DispatchFailed,
}

impl SubmissionStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::DispatchFailed => "DispatchFailed",
        }
    }
}

/// One row of the submission log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Time")]
    pub time: DateTime<Utc>,
    #[serde(rename = "Client")]
    pub client: String,
    #[serde(rename = "Type")]
    pub form_type: String,
    #[serde(rename = "Status")]
    pub status: SubmissionStatus,
}

impl SubmissionRecord {
    pub fn new(client: &str, form_type: &str, status: SubmissionStatus) -> Self {
        Self {
            id: short_id(),
            time: Utc::now(),
            client: client.to_string(),
            form_type: form_type.to_string(),
            status,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BugSeverity {
    Low,
    #[default]
    #[serde(rename = "Med", alias = "Medium")]
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BugReport {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Time")]
    pub time: DateTime<Utc>,
    #[serde(rename = "User")]
    pub user: String,
    #[serde(rename = "Severity")]
    pub severity: BugSeverity,
    #[serde(rename = "Description")]
    pub description: String,
}

impl BugReport {
    pub fn new(user: &str, severity: BugSeverity, description: &str) -> Self {
        Self {
            id: short_id(),
            time: Utc::now(),
            user: user.to_string(),
            severity,
            description: description.to_string(),
        }
    }
}

/// Audit trail of submission attempts, read back by the admin dashboard.
pub trait SubmissionLog: Send + Sync {
    fn record(&self, entry: SubmissionRecord) -> Result<(), LedgerError>;
    fn entries(&self) -> Result<Vec<SubmissionRecord>, LedgerError>;
}

/// CSV file of `T` rows. The header row is written when the file is first created or
/// found empty.
#[derive(Debug)]
pub struct CsvLedger<T> {
    path: PathBuf,
    lock: Mutex<()>,
    _rows: PhantomData<fn() -> T>,
}

pub type SubmissionLedger = CsvLedger<SubmissionRecord>;
pub type BugLedger = CsvLedger<BugReport>;

impl<T> CsvLedger<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
            _rows: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, row: &T) -> Result<(), LedgerError> {
        let _guard = self.lock.lock().map_err(|_| LedgerError::Poisoned)?;
        if let Some(parent) = self.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let needs_header = file.metadata()?.len() == 0;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(needs_header)
            .from_writer(file);
        writer.serialize(row)?;
        writer.flush()?;
        Ok(())
    }

    /// All rows in file order. A missing file reads as an empty ledger.
    pub fn read_all(&self) -> Result<Vec<T>, LedgerError> {
        let _guard = self.lock.lock().map_err(|_| LedgerError::Poisoned)?;
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(BufReader::new(file));
        let mut rows = Vec::new();
        for row in reader.deserialize::<T>() {
            rows.push(row?);
        }
        Ok(rows)
    }
}

impl SubmissionLog for CsvLedger<SubmissionRecord> {
    fn record(&self, entry: SubmissionRecord) -> Result<(), LedgerError> {
        self.append(&entry)
    }

    fn entries(&self) -> Result<Vec<SubmissionRecord>, LedgerError> {
        self.read_all()
    }
}

fn short_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("ledger io failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("ledger csv failure: {0}")]
    Csv(#[from] csv::Error),
    #[error("ledger lock poisoned")]
    Poisoned,
}
