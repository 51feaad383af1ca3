use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{LogalError, Result};
use crate::pipeline::storage::Storage;
use crate::types::{CatalogId, FileFingerprint};

/// One build of the record store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeRun {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub catalogs: Vec<CatalogId>,
    /// Fingerprints of the raw files each catalog was read from
    pub inputs: Vec<CatalogInput>,
}

impl MergeRun {
    pub fn start(catalogs: Vec<CatalogId>) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            catalogs,
            inputs: Vec::new(),
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogInput {
    pub catalog: CatalogId,
    pub rows: usize,
    pub files: Vec<FileFingerprint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Created,
    Updated,
    Skip,
    Error,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Created => "created",
            ChangeType::Updated => "updated",
            ChangeType::Skip => "skip",
            ChangeType::Error => "error",
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeType {
    type Err = LogalError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "created" => Ok(ChangeType::Created),
            "updated" => Ok(ChangeType::Updated),
            "skip" => Ok(ChangeType::Skip),
            "error" => Ok(ChangeType::Error),
            other => Err(LogalError::Config(format!("unknown change type '{}'", other))),
        }
    }
}

/// Audit entry for one merged catalog row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeRecord {
    pub id: Option<Uuid>,
    pub run_id: Uuid,
    pub catalog: CatalogId,
    pub source_name: String,
    pub galaxy_id: Option<String>,
    pub change_type: ChangeType,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Writes the audit trail of a merge run
pub struct ProvenanceTracker {
    storage: Arc<dyn Storage>,
    run_id: Uuid,
}

impl ProvenanceTracker {
    pub fn new(storage: Arc<dyn Storage>, run_id: Uuid) -> Self {
        Self { storage, run_id }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn emit_record(
        &self,
        catalog: CatalogId,
        source_name: &str,
        galaxy_id: Option<&str>,
        change_type: ChangeType,
        message: String,
    ) -> Result<()> {
        let mut record = MergeRecord {
            id: None,
            run_id: self.run_id,
            catalog,
            source_name: source_name.to_string(),
            galaxy_id: galaxy_id.map(str::to_string),
            change_type,
            message,
            created_at: Utc::now(),
        };
        self.storage.create_merge_record(&mut record)
    }

    pub fn created(&self, catalog: CatalogId, source_name: &str, galaxy_id: &str) -> Result<()> {
        self.emit_record(
            catalog,
            source_name,
            Some(galaxy_id),
            ChangeType::Created,
            format!("Created record {} from {}", galaxy_id, source_name),
        )
    }

    pub fn updated(&self, catalog: CatalogId, source_name: &str, galaxy_id: &str, changed: usize) -> Result<()> {
        self.emit_record(
            catalog,
            source_name,
            Some(galaxy_id),
            ChangeType::Updated,
            format!("Merged {} into {} ({} values changed)", source_name, galaxy_id, changed),
        )
    }

    pub fn skipped(&self, catalog: CatalogId, source_name: &str, galaxy_id: Option<&str>, reason: &str) -> Result<()> {
        self.emit_record(
            catalog,
            source_name,
            galaxy_id,
            ChangeType::Skip,
            format!("Skipped {}: {}", source_name, reason),
        )
    }

    pub fn failed(&self, catalog: CatalogId, source_name: &str, galaxy_id: Option<&str>, error: &LogalError) -> Result<()> {
        self.emit_record(catalog, source_name, galaxy_id, ChangeType::Error, error.to_string())
    }
}
