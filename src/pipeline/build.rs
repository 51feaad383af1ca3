use chrono::Utc;
use metrics::{counter, histogram};
use serde::Serialize;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::Result;
use crate::pipeline::ingestion::redshift::RedshiftResolver;
use crate::pipeline::ingestion::{CatalogRegistry, ReadContext};
use crate::pipeline::processing::catalog::{
    CatalogInput, GalaxyRecord, MergePolicy, MergeRun, MergeStats, ProvenanceTracker, RecordMerger,
};
use crate::pipeline::processing::conflation::{CrossMatchResult, CrossMatcher};
use crate::pipeline::processing::normalize::IdentifierNormalizer;
use crate::pipeline::storage::Storage;
use crate::types::{CatalogId, CatalogTable};

/// What one catalog contributed to a build
#[derive(Debug, Clone, Serialize)]
pub struct CatalogSummary {
    pub catalog: CatalogId,
    pub label: &'static str,
    pub rows: usize,
    pub skipped_lines: usize,
    pub dropped_extended: usize,
    pub dropped_duplicates: usize,
}

impl From<&CatalogTable> for CatalogSummary {
    fn from(table: &CatalogTable) -> Self {
        Self {
            catalog: table.catalog,
            label: table.catalog.label(),
            rows: table.rows.len(),
            skipped_lines: table.skipped_lines,
            dropped_extended: table.dropped_extended,
            dropped_duplicates: table.dropped_duplicates,
        }
    }
}

/// Result of a complete build
#[derive(Debug, Serialize)]
pub struct BuildResult {
    pub run_id: Uuid,
    pub catalogs: Vec<CatalogSummary>,
    pub master_size: usize,
    pub conflicts: usize,
    pub duplicates: usize,
    pub merge: MergeStats,
    pub warnings: Vec<String>,
    pub export_file: Option<String>,
}

/// Tables and the cross-match over them
pub struct CrossMatchOutput {
    pub tables: Vec<CatalogTable>,
    pub result: CrossMatchResult,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Catalogs to read; empty means all
    pub catalogs: Vec<CatalogId>,
    /// Merge into the existing store instead of rebuilding it
    pub keep: bool,
    pub export: Option<std::path::PathBuf>,
}

/// Read, cross-match, merge, persist
pub struct BuildPipeline<'a> {
    config: &'a Config,
    registry: CatalogRegistry,
    normalizer: IdentifierNormalizer,
    redshifts: &'a dyn RedshiftResolver,
    storage: Arc<dyn Storage>,
}

impl<'a> BuildPipeline<'a> {
    pub fn new(config: &'a Config, redshifts: &'a dyn RedshiftResolver, storage: Arc<dyn Storage>) -> Self {
        let normalizer = IdentifierNormalizer::default().with_extended_sources(config.merge.extended_sources.clone());
        Self {
            config,
            registry: CatalogRegistry::new(),
            normalizer,
            redshifts,
            storage,
        }
    }

    fn selected(&self, catalogs: &[CatalogId]) -> Vec<CatalogId> {
        if catalogs.is_empty() {
            self.registry.list_catalogs()
        } else {
            catalogs.to_vec()
        }
    }

    /// Read the selected catalogs; failures become warnings
    pub fn read(&self, catalogs: &[CatalogId]) -> (Vec<CatalogTable>, Vec<String>) {
        let ctx = ReadContext::new(
            &self.config.data.raw_dir,
            &self.normalizer,
            self.config.cosmology.standard(),
            self.redshifts,
        );
        self.registry.read_all(&self.selected(catalogs), &ctx)
    }

    #[instrument(skip(self))]
    pub fn crossmatch(&self, catalogs: &[CatalogId]) -> Result<CrossMatchOutput> {
        let (tables, mut warnings) = self.read(catalogs);
        let matcher = CrossMatcher::new(self.config.merge.crossmatch_order()?);
        let result = matcher.crossmatch(&tables);
        warnings.extend(result.warnings.iter().cloned());
        Ok(CrossMatchOutput {
            tables,
            result,
            warnings,
        })
    }

    #[instrument(skip(self, options), fields(keep = options.keep))]
    pub fn run(&self, options: &BuildOptions) -> Result<BuildResult> {
        let started = Instant::now();
        counter!("logal_build_runs_total").increment(1);

        if !options.keep {
            info!("Dropping the record store");
            self.storage.reset()?;
        }

        let catalogs = self.selected(&options.catalogs);
        let mut run = MergeRun::start(catalogs.clone());
        self.storage.create_merge_run(&run)?;
        info!("Starting build {} over {} catalogs", run.id, catalogs.len());

        let CrossMatchOutput {
            tables,
            result,
            warnings,
        } = self.crossmatch(&catalogs)?;
        run.inputs = tables
            .iter()
            .map(|t| CatalogInput {
                catalog: t.catalog,
                rows: t.rows.len(),
                files: t.files.clone(),
            })
            .collect();

        let tracker = ProvenanceTracker::new(self.storage.clone(), run.id);
        let merger = RecordMerger::new(MergePolicy::new(self.config.merge.priority()?), self.storage.clone(), tracker)
            .with_bolometric_correction(self.config.merge.bolometric_correction);
        let merge = merger.merge(&tables, &result)?;

        run.finish();
        self.storage.update_merge_run(&run)?;

        let export_file = match &options.export {
            Some(path) => Some(persist_to_json(&self.storage.list_records()?, path)?),
            None => None,
        };

        for w in &warnings {
            warn!("{}", w);
        }
        histogram!("logal_build_duration_seconds").record(started.elapsed().as_secs_f64());
        histogram!("logal_master_list_size").record(result.master.len() as f64);

        Ok(BuildResult {
            run_id: run.id,
            catalogs: tables.iter().map(CatalogSummary::from).collect(),
            master_size: result.master.len(),
            conflicts: result.conflicts(),
            duplicates: result.duplicates(),
            merge,
            warnings,
            export_file,
        })
    }
}

/// Write records as pretty-printed JSON. A directory gets a timestamped file.
pub fn persist_to_json(records: &[GalaxyRecord], path: &Path) -> Result<String> {
    let filepath = if path.is_dir() {
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
        path.join(format!("logal_{timestamp}.json"))
    } else {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        path.to_path_buf()
    };

    let json_content = serde_json::to_string_pretty(records)?;
    fs::write(&filepath, json_content)?;
    info!("Exported {} records to {}", records.len(), filepath.display());
    Ok(filepath.to_string_lossy().to_string())
}
