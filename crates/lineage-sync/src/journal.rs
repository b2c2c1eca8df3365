//! Tamper-evident journal of maintenance runs.
//!
//! Each job run produces a [`RunReport`]. Reports are content-hashed with
//! BLAKE3 over their canonical JSON (hash excluded) and stored as JSON files
//! organized by date:
//!
//! ```text
//! {root}/
//!   2026/
//!     10/
//!       19/
//!         {run_id}.json
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, SyncError};
use crate::propagate::PropagationReport;
use crate::rekey::RekeyReport;

/// What a run did, tagged by job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "job", rename_all = "snake_case")]
pub enum JobOutcome {
    Propagation(PropagationReport),
    Rekey(RekeyReport),
}

impl JobOutcome {
    pub fn job_name(&self) -> &'static str {
        match self {
            JobOutcome::Propagation(_) => "propagation",
            JobOutcome::Rekey(_) => "rekey",
        }
    }
}

/// The journaled record of one job run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunReport {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcome: JobOutcome,
    /// BLAKE3 hash of all other fields.
    pub content_hash: String,
}

/// Hashable representation of a RunReport (excludes content_hash).
#[derive(Serialize)]
struct HashableReport<'a> {
    id: &'a Uuid,
    started_at: &'a DateTime<Utc>,
    finished_at: &'a DateTime<Utc>,
    outcome: &'a JobOutcome,
}

impl RunReport {
    /// Seal a finished run.
    pub fn seal(started_at: DateTime<Utc>, outcome: JobOutcome) -> Result<Self> {
        let mut report = Self {
            id: Uuid::new_v4(),
            started_at,
            finished_at: Utc::now(),
            outcome,
            content_hash: String::new(),
        };
        report.content_hash = report.compute_hash()?;
        Ok(report)
    }

    pub fn compute_hash(&self) -> Result<String> {
        let hashable = HashableReport {
            id: &self.id,
            started_at: &self.started_at,
            finished_at: &self.finished_at,
            outcome: &self.outcome,
        };
        let json = serde_json::to_vec(&hashable)?;
        Ok(blake3::hash(&json).to_hex().to_string())
    }

    pub fn verify_integrity(&self) -> bool {
        self.compute_hash()
            .map(|h| h == self.content_hash)
            .unwrap_or(false)
    }

    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}

/// File-system backed journal.
pub struct Journal {
    root: PathBuf,
}

impl Journal {
    /// Open a journal rooted at the given directory, creating it if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn report_path(&self, report: &RunReport) -> PathBuf {
        let date = report.started_at.format("%Y/%m/%d");
        self.root.join(format!("{}/{}.json", date, report.id))
    }

    /// Persist a sealed report. Returns the file it was written to.
    pub fn save(&self, report: &RunReport) -> Result<PathBuf> {
        let path = self.report_path(report);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, serde_json::to_string_pretty(report)?)?;

        tracing::debug!(
            run_id = %report.id,
            job = report.outcome.job_name(),
            path = %path.display(),
            "Run report saved"
        );
        Ok(path)
    }

    /// Load a report by id, verifying its integrity.
    pub fn get(&self, id: Uuid) -> Result<RunReport> {
        let filename = format!("{id}.json");
        let path = find_file_recursive(&self.root, &filename)
            .ok_or_else(|| SyncError::Journal(format!("run report {id} not found")))?;
        let report: RunReport = serde_json::from_str(&fs::read_to_string(&path)?)?;
        if !report.verify_integrity() {
            return Err(SyncError::Journal(format!(
                "integrity check failed for run report {id}"
            )));
        }
        Ok(report)
    }
}

/// Seal a run and save it if a journal is configured.
pub fn record(
    journal: Option<&Journal>,
    started_at: DateTime<Utc>,
    outcome: JobOutcome,
) -> Result<RunReport> {
    let report = RunReport::seal(started_at, outcome)?;
    if let Some(journal) = journal {
        journal.save(&report)?;
    }
    Ok(report)
}

fn find_file_recursive(dir: &Path, filename: &str) -> Option<PathBuf> {
    let entries = fs::read_dir(dir).ok()?;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            if let Some(found) = find_file_recursive(&path, filename) {
                return Some(found);
            }
        } else if path.file_name().and_then(|n| n.to_str()) == Some(filename) {
            return Some(path);
        }
    }
    None
}
