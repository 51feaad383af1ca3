use metrics::counter;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, instrument};

use super::correction::apply_bolometric_correction;
use super::policy::MergePolicy;
use super::provenance::{ChangeType, ProvenanceTracker};
use super::record::{CatalogValue, GalaxyRecord};
use crate::error::Result;
use crate::pipeline::processing::conflation::{CrossMatchResult, ResolutionDecision};
use crate::pipeline::storage::Storage;
use crate::types::{CatalogId, CatalogTable, SourceRow};

/// Counts of what a merge did to the store
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MergeStats {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub errors: usize,
    pub records: usize,
    pub bolometric_factor: Option<f64>,
}

/// An audit entry waiting for its record to be saved
struct Pending {
    catalog: CatalogId,
    source_name: String,
    change: ChangeType,
    changed: usize,
}

/// Folds cross-matched catalog rows into galaxy records and persists them
pub struct RecordMerger {
    policy: MergePolicy,
    storage: Arc<dyn Storage>,
    tracker: ProvenanceTracker,
    bolometric_correction: bool,
}

impl RecordMerger {
    pub fn new(policy: MergePolicy, storage: Arc<dyn Storage>, tracker: ProvenanceTracker) -> Self {
        Self {
            policy,
            storage,
            tracker,
            bolometric_correction: true,
        }
    }

    pub fn with_bolometric_correction(mut self, enabled: bool) -> Self {
        self.bolometric_correction = enabled;
        self
    }

    #[instrument(skip_all, fields(run_id = %self.tracker.run_id()))]
    pub fn merge(&self, tables: &[CatalogTable], crossmatch: &CrossMatchResult) -> Result<MergeStats> {
        let by_catalog: HashMap<CatalogId, &CatalogTable> = tables.iter().map(|t| (t.catalog, t)).collect();
        let row_of = |catalog: CatalogId, i: usize| by_catalog.get(&catalog).copied().and_then(|t| t.rows.get(i));

        let mut stats = MergeStats::default();
        let mut members: Vec<Vec<&SourceRow>> = vec![Vec::new(); crossmatch.master.len()];

        for assignment in &crossmatch.assignments {
            let Some(row) = row_of(assignment.catalog, assignment.row) else { continue };
            match assignment.decision {
                ResolutionDecision::Duplicate(entry) => {
                    let galaxy = crossmatch.master.get(entry).map(|e| e.key.as_str());
                    self.tracker
                        .skipped(row.catalog, &row.id_raw, galaxy, "catalog already has a row for this source")?;
                    counter!("logal_merge_rows_total", "change" => ChangeType::Skip.as_str()).increment(1);
                    stats.skipped += 1;
                }
                decision => {
                    if let Some(entry) = decision.assigned_entry() {
                        members[entry].push(row);
                    }
                }
            }
        }

        let mut records = Vec::with_capacity(members.len());
        let mut pending: Vec<Vec<Pending>> = Vec::with_capacity(members.len());
        for (entry, rows) in crossmatch.master.entries().iter().zip(&members) {
            let existing = self.storage.get_record(&entry.key)?;
            let fresh = existing.is_none();
            let mut record = existing.unwrap_or_else(|| GalaxyRecord::new(&entry.key));

            if entry.z.is_some() {
                record.z = entry.z;
            }
            record
                .aliases
                .extend(entry.names.iter().filter(|n| **n != entry.key).cloned());
            record
                .catalogs
                .extend(entry.members.iter().map(|(c, n)| (*c, n.clone())));

            let mut events = Vec::with_capacity(rows.len());
            for (k, row) in rows.iter().enumerate() {
                let changed = merge_row(&mut record, row);
                let change = if fresh && k == 0 {
                    ChangeType::Created
                } else {
                    ChangeType::Updated
                };
                events.push(Pending {
                    catalog: row.catalog,
                    source_name: row.id_raw.clone(),
                    change,
                    changed,
                });
            }
            records.push(record);
            pending.push(events);
        }

        if self.bolometric_correction {
            stats.bolometric_factor = apply_bolometric_correction(&mut records);
        }

        for (mut record, events) in records.into_iter().zip(pending) {
            self.policy.refresh(&mut record);
            record.updated_at = chrono::Utc::now();
            match self.storage.save_record(&record) {
                Ok(()) => {
                    stats.records += 1;
                    for e in events {
                        match e.change {
                            ChangeType::Created => {
                                self.tracker.created(e.catalog, &e.source_name, &record.id)?;
                                stats.created += 1;
                            }
                            _ => {
                                self.tracker.updated(e.catalog, &e.source_name, &record.id, e.changed)?;
                                stats.updated += 1;
                            }
                        }
                        counter!("logal_merge_rows_total", "change" => e.change.as_str()).increment(1);
                    }
                }
                Err(err) => {
                    error!("Failed to save {}: {}", record.id, err);
                    for e in events {
                        self.tracker.failed(e.catalog, &e.source_name, Some(&record.id), &err)?;
                        counter!("logal_merge_rows_total", "change" => ChangeType::Error.as_str()).increment(1);
                        stats.errors += 1;
                    }
                }
            }
        }

        info!(
            "Merge finished: {} records ({} created, {} updated, {} skipped, {} errors)",
            stats.records, stats.created, stats.updated, stats.skipped, stats.errors
        );
        Ok(stats)
    }
}

/// Copy a row's values into the record; returns how many values changed
fn merge_row(record: &mut GalaxyRecord, row: &SourceRow) -> usize {
    let mut changed = 0;
    for (quantity, measurement) in &row.measurements {
        if record.set_value(*quantity, row.catalog, CatalogValue::measured(*measurement)) {
            changed += 1;
        }
    }
    if let Some(z) = row.z {
        record
            .attributes
            .insert(format!("{}:z", row.catalog.code()), format!("{}", z));
    }
    for (key, value) in &row.attributes {
        record
            .attributes
            .insert(format!("{}:{}", row.catalog.code(), key), value.clone());
    }
    debug!("{} <- {} {}: {} values changed", record.id, row.catalog, row.id, changed);
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::processing::catalog::provenance::MergeRun;
    use crate::pipeline::processing::conflation::CrossMatcher;
    use crate::pipeline::storage::InMemoryStorage;
    use crate::types::{Measurement, Quantity, Transition};

    fn row(catalog: CatalogId, id: &str, values: &[(Quantity, Measurement)]) -> SourceRow {
        let mut r = SourceRow::new(catalog, id, id);
        if catalog.has_alternate() {
            r.alt = Some(id.to_string());
        }
        for (q, m) in values {
            r.set(*q, *m);
        }
        r
    }

    fn table(catalog: CatalogId, rows: Vec<SourceRow>) -> CatalogTable {
        let mut t = CatalogTable::new(catalog);
        t.rows = rows;
        t
    }

    fn merger(storage: Arc<InMemoryStorage>) -> (RecordMerger, uuid::Uuid) {
        let run = MergeRun::start(CatalogId::ALL.to_vec());
        let tracker = ProvenanceTracker::new(storage.clone(), run.id);
        (RecordMerger::new(MergePolicy::default(), storage, tracker), run.id)
    }

    fn co10() -> Quantity {
        Quantity::line(Transition::co(1))
    }

    #[test]
    fn test_master_follows_priority_not_merge_order() {
        let tables = vec![
            table(CatalogId::J17, vec![row(CatalogId::J17, "NGC1068", &[(co10(), Measurement::detection(1000.0, Some(50.0)))])]),
            table(CatalogId::K16, vec![row(CatalogId::K16, "NGC1068", &[(co10(), Measurement::detection(900.0, None))])]),
        ];
        let result = CrossMatcher::default().crossmatch(&tables);
        let storage = Arc::new(InMemoryStorage::new());
        let (merger, run_id) = merger(storage.clone());
        let stats = merger.merge(&tables, &result).unwrap();
        assert_eq!(stats.created, 1);
        assert_eq!(stats.updated, 1);

        let record = storage.get_record("NGC1068").unwrap().unwrap();
        let master = record.master(co10()).unwrap();
        assert_eq!(master.catalog, CatalogId::J17);
        assert_eq!(master.measurement, Measurement::detection(1000.0, Some(50.0)));
        assert_eq!(record.quantities[&co10()].values.len(), 2);

        let audit = storage.get_merge_records(run_id).unwrap();
        assert_eq!(audit.len(), 2);
        assert_eq!(audit[0].catalog, CatalogId::K16);
        assert_eq!(audit[0].change_type, ChangeType::Created);
    }

    #[test]
    fn test_duplicates_are_skipped_and_audited() {
        let tables = vec![table(
            CatalogId::G14,
            vec![
                row(CatalogId::G14, "NGC0023", &[(Quantity::LIR_8_1000, Measurement::detection(1.0, None))]),
                row(CatalogId::G14, "NGC0023", &[(Quantity::LIR_8_1000, Measurement::detection(2.0, None))]),
            ],
        )];
        let result = CrossMatcher::default().crossmatch(&tables);
        let storage = Arc::new(InMemoryStorage::new());
        let (merger, run_id) = merger(storage.clone());
        let stats = merger.merge(&tables, &result).unwrap();
        assert_eq!(stats.skipped, 1);
        let record = storage.get_record("NGC0023").unwrap().unwrap();
        assert_eq!(record.master(Quantity::LIR_8_1000).unwrap().measurement.value(), 1.0);
        let audit = storage.get_merge_records(run_id).unwrap();
        assert!(audit.iter().any(|r| r.change_type == ChangeType::Skip));
    }

    #[test]
    fn test_derived_k16_luminosity_only_wins_without_measurement() {
        let tables = vec![
            table(
                CatalogId::K16,
                vec![
                    row(CatalogId::K16, "NGC1068", &[(Quantity::LIR_40_120, Measurement::detection(1.0e11, None))]),
                    row(CatalogId::K16, "NGC0253", &[(Quantity::LIR_40_120, Measurement::detection(2.0e10, None))]),
                ],
            ),
            table(
                CatalogId::L17,
                vec![row(CatalogId::L17, "NGC1068", &[(Quantity::LIR_8_1000, Measurement::detection(2.0e11, None))])],
            ),
        ];
        let result = CrossMatcher::default().crossmatch(&tables);
        let storage = Arc::new(InMemoryStorage::new());
        let (merger, _) = merger(storage.clone());
        let stats = merger.merge(&tables, &result).unwrap();
        assert_eq!(stats.bolometric_factor, Some(2.0));

        let ngc1068 = storage.get_record("NGC1068").unwrap().unwrap();
        assert_eq!(ngc1068.master(Quantity::LIR_8_1000).unwrap().catalog, CatalogId::L17);
        let ngc253 = storage.get_record("NGC0253").unwrap().unwrap();
        let master = ngc253.master(Quantity::LIR_8_1000).unwrap();
        assert!(master.derived);
        assert_eq!(master.measurement.value(), 4.0e10);
    }

    #[test]
    fn test_rebuild_into_kept_store_updates() {
        let tables = vec![table(
            CatalogId::G14,
            vec![row(CatalogId::G14, "NGC0023", &[(Quantity::LIR_8_1000, Measurement::detection(1.0, None))])],
        )];
        let result = CrossMatcher::default().crossmatch(&tables);
        let storage = Arc::new(InMemoryStorage::new());
        let (first, _) = merger(storage.clone());
        first.merge(&tables, &result).unwrap();
        let (second, run_id) = merger(storage.clone());
        let stats = second.merge(&tables, &result).unwrap();
        assert_eq!(stats.created, 0);
        assert_eq!(stats.updated, 1);
        let audit = storage.get_merge_records(run_id).unwrap();
        assert!(audit[0].message.contains("0 values changed"));
    }
}
