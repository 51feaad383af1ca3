use uuid::Uuid;

use crate::error::Result;
use crate::pipeline::processing::catalog::{GalaxyRecord, MergeRecord, MergeRun};

/// Storage trait for the record store and its merge audit trail
pub trait Storage: Send + Sync {
    /// Drop every record, run and audit entry
    fn reset(&self) -> Result<()>;

    // Galaxy records
    fn save_record(&self, record: &GalaxyRecord) -> Result<()>;
    fn get_record(&self, id: &str) -> Result<Option<GalaxyRecord>>;
    fn find_by_alias(&self, alias: &str) -> Result<Option<GalaxyRecord>>;
    fn list_records(&self) -> Result<Vec<GalaxyRecord>>;

    // Merge runs and records
    fn create_merge_run(&self, run: &MergeRun) -> Result<()>;
    fn update_merge_run(&self, run: &MergeRun) -> Result<()>;
    fn list_merge_runs(&self) -> Result<Vec<MergeRun>>;
    fn create_merge_record(&self, record: &mut MergeRecord) -> Result<()>;
    /// Audit entries of one run, in the order they were written
    fn get_merge_records(&self, run_id: Uuid) -> Result<Vec<MergeRecord>>;

    /// Look a source up by canonical ID, then by any alias
    fn lookup(&self, name: &str) -> Result<Option<GalaxyRecord>> {
        match self.get_record(name)? {
            Some(record) => Ok(Some(record)),
            None => self.find_by_alias(name),
        }
    }
}
