use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};
use uuid::Uuid;

use super::traits::Storage;
use crate::error::{LogalError, Result};
use crate::pipeline::processing::catalog::{GalaxyRecord, MergeRecord, MergeRun};

/// In-memory storage implementation for tests and dry runs
pub struct InMemoryStorage {
    records: Arc<Mutex<BTreeMap<String, GalaxyRecord>>>,
    aliases: Arc<Mutex<HashMap<String, String>>>,
    runs: Arc<Mutex<Vec<MergeRun>>>,
    merge_records: Arc<Mutex<Vec<MergeRecord>>>,
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            records: Arc::new(Mutex::new(BTreeMap::new())),
            aliases: Arc::new(Mutex::new(HashMap::new())),
            runs: Arc::new(Mutex::new(Vec::new())),
            merge_records: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl Storage for InMemoryStorage {
    fn reset(&self) -> Result<()> {
        self.records.lock().unwrap().clear();
        self.aliases.lock().unwrap().clear();
        self.runs.lock().unwrap().clear();
        self.merge_records.lock().unwrap().clear();
        debug!("Cleared in-memory store");
        Ok(())
    }

    fn save_record(&self, record: &GalaxyRecord) -> Result<()> {
        let mut aliases = self.aliases.lock().unwrap();
        aliases.retain(|_, id| *id != record.id);
        // The first record to claim an alias keeps it
        for alias in &record.aliases {
            match aliases.get(alias) {
                Some(owner) if *owner != record.id => {
                    warn!("Alias {} already belongs to {}, not moving it to {}", alias, owner, record.id);
                }
                _ => {
                    aliases.insert(alias.clone(), record.id.clone());
                }
            }
        }
        self.records
            .lock()
            .unwrap()
            .insert(record.id.clone(), record.clone());
        debug!("Saved record {}", record.id);
        Ok(())
    }

    fn get_record(&self, id: &str) -> Result<Option<GalaxyRecord>> {
        Ok(self.records.lock().unwrap().get(id).cloned())
    }

    fn find_by_alias(&self, alias: &str) -> Result<Option<GalaxyRecord>> {
        let id = self.aliases.lock().unwrap().get(alias).cloned();
        match id {
            Some(id) => self.get_record(&id),
            None => Ok(None),
        }
    }

    fn list_records(&self) -> Result<Vec<GalaxyRecord>> {
        Ok(self.records.lock().unwrap().values().cloned().collect())
    }

    fn create_merge_run(&self, run: &MergeRun) -> Result<()> {
        self.runs.lock().unwrap().push(run.clone());
        debug!("Created merge run {}", run.id);
        Ok(())
    }

    fn update_merge_run(&self, run: &MergeRun) -> Result<()> {
        let mut runs = self.runs.lock().unwrap();
        let slot = runs
            .iter_mut()
            .find(|r| r.id == run.id)
            .ok_or_else(|| LogalError::NotFound(format!("merge run {}", run.id)))?;
        *slot = run.clone();
        Ok(())
    }

    fn list_merge_runs(&self) -> Result<Vec<MergeRun>> {
        Ok(self.runs.lock().unwrap().clone())
    }

    fn create_merge_record(&self, record: &mut MergeRecord) -> Result<()> {
        record.id = Some(Uuid::new_v4());
        self.merge_records.lock().unwrap().push(record.clone());
        Ok(())
    }

    fn get_merge_records(&self, run_id: Uuid) -> Result<Vec<MergeRecord>> {
        Ok(self
            .merge_records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.run_id == run_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CatalogId;

    #[test]
    fn test_lookup_by_id_and_alias() {
        let storage = InMemoryStorage::new();
        let mut record = GalaxyRecord::new("Arp220");
        record.aliases.insert("IRAS15327+2340".to_string());
        storage.save_record(&record).unwrap();

        assert_eq!(storage.lookup("Arp220").unwrap().unwrap().id, "Arp220");
        assert_eq!(storage.lookup("IRAS15327+2340").unwrap().unwrap().id, "Arp220");
        assert!(storage.lookup("NGC1068").unwrap().is_none());

        // aliases follow the latest save
        record.aliases.clear();
        storage.save_record(&record).unwrap();
        assert!(storage.find_by_alias("IRAS15327+2340").unwrap().is_none());
    }

    #[test]
    fn test_runs_and_reset() {
        let storage = InMemoryStorage::new();
        let mut run = MergeRun::start(vec![CatalogId::G14]);
        storage.create_merge_run(&run).unwrap();
        run.finish();
        storage.update_merge_run(&run).unwrap();
        assert!(storage.list_merge_runs().unwrap()[0].finished_at.is_some());

        storage.save_record(&GalaxyRecord::new("NGC0023")).unwrap();
        storage.reset().unwrap();
        assert!(storage.list_records().unwrap().is_empty());
        assert!(storage.list_merge_runs().unwrap().is_empty());
        assert!(storage.update_merge_run(&run).is_err());
    }

    #[test]
    fn test_alias_keeps_first_owner() {
        let storage = InMemoryStorage::new();
        let mut first = GalaxyRecord::new("NGC3690");
        first.aliases.insert("Arp299".to_string());
        storage.save_record(&first).unwrap();

        let mut second = GalaxyRecord::new("IC694");
        second.aliases.insert("Arp299".to_string());
        storage.save_record(&second).unwrap();

        assert_eq!(storage.find_by_alias("Arp299").unwrap().unwrap().id, "NGC3690");

        // Once the owner drops it, the alias is free again
        first.aliases.clear();
        storage.save_record(&first).unwrap();
        storage.save_record(&second).unwrap();
        assert_eq!(storage.find_by_alias("Arp299").unwrap().unwrap().id, "IC694");
    }
}
