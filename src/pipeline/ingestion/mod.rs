//! Catalog ingestion: table loading, per-catalog readers and redshift lookup.

pub mod catalogs;
pub mod redshift;
pub mod table;

use metrics::counter;
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, instrument, warn};

use crate::error::{LogalError, Result};
use crate::physics::Cosmology;
use crate::pipeline::processing::normalize::{Identity, IdentifierNormalizer};
use crate::types::{CatalogId, CatalogTable, Measurement, SourceRow};
use redshift::RedshiftResolver;

/// Everything a reader needs besides its own files
pub struct ReadContext<'a> {
    pub raw_dir: &'a Path,
    pub normalizer: &'a IdentifierNormalizer,
    /// Cosmology luminosities are converted to
    pub standard: Cosmology,
    pub redshifts: &'a dyn RedshiftResolver,
}

impl<'a> ReadContext<'a> {
    pub fn new(
        raw_dir: &'a Path,
        normalizer: &'a IdentifierNormalizer,
        standard: Cosmology,
        redshifts: &'a dyn RedshiftResolver,
    ) -> Self {
        Self {
            raw_dir,
            normalizer,
            standard,
            redshifts,
        }
    }

    pub fn identify(&self, catalog: CatalogId, id_raw: &str, alt_raw: Option<&str>) -> Identity {
        self.normalizer.identify(catalog, id_raw, alt_raw)
    }

    /// Start a row from a raw name
    pub fn row(&self, catalog: CatalogId, id_raw: &str, alt_raw: Option<&str>, line: usize) -> SourceRow {
        let ident = self.identify(catalog, id_raw, alt_raw);
        let mut row = SourceRow::new(catalog, ident.query_name, ident.id);
        row.alt_raw = alt_raw.map(str::to_string).filter(|a| !a.trim().is_empty());
        row.alt = ident.alt;
        row.line = line;
        row
    }

    /// Rescale a luminosity from the catalog's cosmology to the standard one.
    /// Without a redshift the value is returned unchanged.
    pub fn to_standard(&self, catalog: CatalogId, z: Option<f64>, luminosity: f64) -> f64 {
        match z {
            Some(z) => luminosity * catalog.cosmology().luminosity_correction(&self.standard, z),
            None => luminosity,
        }
    }

    pub fn correct(&self, catalog: CatalogId, z: Option<f64>, m: Measurement) -> Measurement {
        match z {
            Some(z) => m.scaled(catalog.cosmology().luminosity_correction(&self.standard, z)),
            None => m,
        }
    }
}

/// Turns one catalog's raw files into normalized rows
pub trait CatalogReader {
    fn catalog(&self) -> CatalogId;

    /// Files read from the raw data directory, primary table first
    fn files(&self) -> Vec<&'static str>;

    fn read(&self, ctx: &ReadContext<'_>) -> Result<CatalogTable>;
}

/// Registry of the built-in catalog readers
pub struct CatalogRegistry {
    readers: HashMap<CatalogId, Box<dyn CatalogReader>>,
}

impl Default for CatalogRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CatalogRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            readers: HashMap::new(),
        };
        registry.register(Box::new(catalogs::Armus09Reader));
        registry.register(Box::new(catalogs::Greve14Reader));
        registry.register(Box::new(catalogs::Rosenberg15Reader));
        registry.register(Box::new(catalogs::Israel15Reader));
        registry.register(Box::new(catalogs::Kamenetzky16Reader));
        registry.register(Box::new(catalogs::Lu17Reader));
        registry.register(Box::new(catalogs::Jiao17Reader));
        registry
    }

    pub fn register(&mut self, reader: Box<dyn CatalogReader>) {
        self.readers.insert(reader.catalog(), reader);
    }

    pub fn get_reader(&self, catalog: CatalogId) -> Option<&dyn CatalogReader> {
        self.readers.get(&catalog).map(|r| r.as_ref())
    }

    /// Read one catalog
    #[instrument(skip(self, ctx), fields(catalog = %catalog))]
    pub fn read(&self, catalog: CatalogId, ctx: &ReadContext<'_>) -> Result<CatalogTable> {
        let reader = self
            .get_reader(catalog)
            .ok_or_else(|| LogalError::UnknownCatalog(catalog.code().to_string()))?;
        let table = reader.read(ctx)?;

        counter!("logal_rows_read_total", "catalog" => catalog.code()).increment(table.rows.len() as u64);
        counter!("logal_rows_skipped_total", "catalog" => catalog.code()).increment(table.skipped_lines as u64);
        counter!("logal_rows_dropped_total", "catalog" => catalog.code())
            .increment((table.dropped_extended + table.dropped_duplicates) as u64);

        info!(
            "{} sample size: {} ({} lines skipped, {} extended, {} duplicates)",
            catalog.label(),
            table.rows.len(),
            table.skipped_lines,
            table.dropped_extended,
            table.dropped_duplicates
        );
        Ok(table)
    }

    /// Read several catalogs; a catalog that fails is skipped with a warning
    pub fn read_all(&self, catalogs: &[CatalogId], ctx: &ReadContext<'_>) -> (Vec<CatalogTable>, Vec<String>) {
        let mut tables = Vec::new();
        let mut warnings = Vec::new();
        for &catalog in catalogs {
            match self.read(catalog, ctx) {
                Ok(table) => tables.push(table),
                Err(e) => {
                    warn!("Skipping {}: {}", catalog.label(), e);
                    counter!("logal_catalog_failures_total", "catalog" => catalog.code()).increment(1);
                    warnings.push(format!("{}: {}", catalog.code(), e));
                }
            }
        }
        (tables, warnings)
    }

    pub fn list_catalogs(&self) -> Vec<CatalogId> {
        let mut ids: Vec<CatalogId> = self.readers.keys().copied().collect();
        ids.sort();
        ids
    }
}
