use crate::constants::DEFAULT_PRIORITY;
use crate::types::CatalogId;

use super::record::{GalaxyRecord, MasterValue, QuantityEntry};

/// Which catalog's value becomes the master value of a quantity
#[derive(Debug, Clone)]
pub struct MergePolicy {
    /// Highest priority first
    priority: Vec<CatalogId>,
}

impl Default for MergePolicy {
    fn default() -> Self {
        Self::new(DEFAULT_PRIORITY.iter().filter_map(|c| c.parse().ok()).collect())
    }
}

impl MergePolicy {
    pub fn new(priority: Vec<CatalogId>) -> Self {
        Self { priority }
    }

    pub fn priority(&self) -> &[CatalogId] {
        &self.priority
    }

    /// Lower is better; unlisted catalogs rank below every listed one
    pub fn rank(&self, catalog: CatalogId) -> usize {
        self.priority
            .iter()
            .position(|c| *c == catalog)
            .unwrap_or(self.priority.len() + catalog as usize)
    }

    /// Published values beat derived ones; within each group the
    /// highest-priority catalog wins.
    pub fn select(&self, entry: &QuantityEntry) -> Option<MasterValue> {
        entry
            .values
            .iter()
            .min_by_key(|(catalog, value)| (value.derived, self.rank(**catalog)))
            .map(|(catalog, value)| MasterValue {
                catalog: *catalog,
                measurement: value.measurement,
                derived: value.derived,
            })
    }

    /// Recompute every master value of a record
    pub fn refresh(&self, record: &mut GalaxyRecord) {
        for entry in record.quantities.values_mut() {
            entry.master = self.select(entry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::processing::catalog::record::CatalogValue;
    use crate::types::{Measurement, Quantity};

    fn entry(values: &[(CatalogId, CatalogValue)]) -> QuantityEntry {
        QuantityEntry {
            values: values.iter().cloned().collect(),
            master: None,
        }
    }

    #[test]
    fn test_default_priority() {
        let policy = MergePolicy::default();
        assert_eq!(policy.rank(CatalogId::J17), 0);
        assert_eq!(policy.rank(CatalogId::A09), 6);
        let e = entry(&[
            (CatalogId::A09, CatalogValue::measured(Measurement::detection(1.0, None))),
            (CatalogId::R15, CatalogValue::measured(Measurement::detection(2.0, None))),
            (CatalogId::G14, CatalogValue::measured(Measurement::detection(3.0, None))),
        ]);
        let master = policy.select(&e).unwrap();
        assert_eq!(master.catalog, CatalogId::R15);
        assert_eq!(master.measurement.value(), 2.0);
    }

    #[test]
    fn test_measured_beats_derived() {
        let policy = MergePolicy::default();
        let e = entry(&[
            (CatalogId::K16, CatalogValue::derived(Measurement::detection(5.0, None), "scaled")),
            (CatalogId::A09, CatalogValue::measured(Measurement::detection(4.0, None))),
        ]);
        assert_eq!(policy.select(&e).unwrap().catalog, CatalogId::A09);

        let only_derived = entry(&[(CatalogId::K16, CatalogValue::derived(Measurement::detection(5.0, None), "scaled"))]);
        let master = policy.select(&only_derived).unwrap();
        assert!(master.derived);
    }

    #[test]
    fn test_custom_priority_and_unlisted_catalogs() {
        let policy = MergePolicy::new(vec![CatalogId::A09]);
        let e = entry(&[
            (CatalogId::J17, CatalogValue::measured(Measurement::upper_limit(1.0))),
            (CatalogId::A09, CatalogValue::measured(Measurement::detection(2.0, None))),
        ]);
        assert_eq!(policy.select(&e).unwrap().catalog, CatalogId::A09);
        assert!(policy.rank(CatalogId::G14) < policy.rank(CatalogId::J17));

        let mut record = GalaxyRecord::new("x");
        record.quantities.insert(Quantity::LIR_8_1000, e);
        policy.refresh(&mut record);
        assert_eq!(record.master(Quantity::LIR_8_1000).unwrap().catalog, CatalogId::A09);
    }
}
