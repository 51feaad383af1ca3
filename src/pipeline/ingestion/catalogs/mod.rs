//! One reader per published catalog.

mod armus09;
mod greve14;
mod israel15;
mod jiao17;
mod kamenetzky16;
mod lu17;
mod rosenberg15;

pub use armus09::Armus09Reader;
pub use greve14::Greve14Reader;
pub use israel15::Israel15Reader;
pub use jiao17::Jiao17Reader;
pub use kamenetzky16::Kamenetzky16Reader;
pub use lu17::Lu17Reader;
pub use rosenberg15::Rosenberg15Reader;

use std::collections::HashMap;
use tracing::warn;

use super::table::{load_table, RawTable, TableSpec};
use super::ReadContext;
use crate::error::{LogalError, Result};
use crate::physics::si_to_jansky_kms;
use crate::types::{CatalogId, CatalogTable, Measurement, SourceRow, Transition};

/// Accumulates rows, fingerprints and skip counts while a reader runs
pub(crate) struct TableBuilder {
    table: CatalogTable,
}

impl TableBuilder {
    pub(crate) fn new(catalog: CatalogId) -> Self {
        Self {
            table: CatalogTable::new(catalog),
        }
    }

    /// Load a required table
    pub(crate) fn load(&mut self, ctx: &ReadContext<'_>, spec: &TableSpec) -> Result<RawTable> {
        let raw = load_table(ctx.raw_dir, spec)?;
        self.table.files.push(raw.fingerprint.clone());
        Ok(raw)
    }

    /// Load a supplementary table; a failure is logged and yields `None`
    pub(crate) fn load_optional(&mut self, ctx: &ReadContext<'_>, spec: &TableSpec) -> Option<RawTable> {
        match self.load(ctx, spec) {
            Ok(raw) => Some(raw),
            Err(e) => {
                warn!("{}: skipping {}: {}", self.table.catalog, spec.file, e);
                None
            }
        }
    }

    pub(crate) fn skip(&mut self, err: LogalError) {
        warn!("{}: skipping row: {}", self.table.catalog, err);
        self.table.skipped_lines += 1;
    }

    /// De-duplicate and drop extended sources
    pub(crate) fn filter(&mut self, ctx: &ReadContext<'_>, rows: Vec<SourceRow>) -> Vec<SourceRow> {
        let (kept, stats) = ctx.normalizer.filter_rows(self.table.catalog, rows);
        self.table.dropped_duplicates += stats.duplicates;
        self.table.dropped_extended += stats.extended;
        kept
    }

    pub(crate) fn finish(mut self, rows: Vec<SourceRow>) -> CatalogTable {
        self.table.rows = rows;
        self.table
    }
}

/// Map every row ID to the rows carrying it
pub(crate) fn index_by_id(rows: &[SourceRow]) -> HashMap<String, Vec<usize>> {
    let mut index: HashMap<String, Vec<usize>> = HashMap::new();
    for (i, row) in rows.iter().enumerate() {
        index.entry(row.id.clone()).or_default().push(i);
    }
    index
}

/// Convert a measurement in W m^-2 to Jy km/s
pub(crate) fn to_jansky(transition: Transition, m: Measurement) -> Option<Measurement> {
    let freq = transition.rest_frequency_ghz()?;
    Some(m.scaled(si_to_jansky_kms(1.0, freq)))
}

/// 10^x for a log-luminosity cell
pub(crate) fn delog(x: f64) -> f64 {
    10f64.powf(x)
}

/// CO upper levels observed by the SPIRE FTS (4-3 through 13-12)
pub(crate) const SPIRE_CO_LADDER: [u8; 10] = [4, 5, 6, 7, 8, 9, 10, 11, 12, 13];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_jansky_scales_error_too() {
        let m = to_jansky(Transition::co(1), Measurement::detection(1e-18, Some(1e-19))).unwrap();
        match m {
            Measurement::Detection { value, error } => {
                assert!((value - 260.076).abs() < 1e-2);
                assert!((error.unwrap() - 26.0076).abs() < 1e-3);
            }
            _ => panic!("expected a detection"),
        }
        assert!(to_jansky(Transition::co(20), Measurement::upper_limit(1.0)).is_none());
    }

    #[test]
    fn test_index_by_id_groups_rows() {
        let rows = vec![
            SourceRow::new(CatalogId::K16, "a", "NGC1"),
            SourceRow::new(CatalogId::K16, "b", "NGC2"),
            SourceRow::new(CatalogId::K16, "c", "NGC1"),
        ];
        let index = index_by_id(&rows);
        assert_eq!(index["NGC1"], vec![0, 2]);
        assert_eq!(index["NGC2"], vec![1]);
    }
}
