use anyhow::Result;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

use logal::config::Config;
use logal::pipeline::ingestion::redshift::StaticRedshifts;
use logal::pipeline::processing::catalog::ChangeType;
use logal::pipeline::processing::conflation::overlap_report;
use logal::pipeline::storage::{InMemoryStorage, SqliteStorage, Storage};
use logal::pipeline::{BuildOptions, BuildPipeline};
use logal::types::{CatalogId, Measurement, Quantity, Transition};

fn header(lines: usize) -> String {
    (0..lines).map(|i| format!("% header {}\n", i)).collect()
}

/// A09, K16 table 1 and J17 with two shared sources and one A09-only source
fn write_tables(dir: &Path) -> Result<()> {
    let mut a09 = header(33);
    a09.push_str("15327+2340 & Arp 220 & a & b & c & d & 12.28 \\\\\n");
    a09.push_str("23007+0836 & NGC 7469 & a & b & c & d & 11.65 \\\\\n");
    a09.push_str("F12112+0305 & nan & a & b & c & d & 12.36 \\\\\n");
    a09.push_str("F99999+0000 & Broken & a & b & c & d & ... \\\\\n");
    fs::write(dir.join("Armus-et-al-2009-table-1.txt"), a09)?;

    let k16 = "Name|logLIR|DL|z\n\
               Arp220|11.90|79.9|0.018126\n\
               NGC7469|11.30|70.8|0.016317\n";
    fs::write(dir.join("Kamenetzky-et-al-2015-Table-1.bsv"), k16)?;

    let j17 = "Jiao et al. 2017\nName & CO10 & err & z\n\
               Arp 220\tULIRG & 520.0 & 30.0 & 0.018126\n\
               NGC 7469 & -80.0 & & 0.016317\n";
    fs::write(dir.join("Jiao-et-al-2017.txt"), j17)?;
    Ok(())
}

fn config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.data.raw_dir = dir.to_path_buf();
    config.data.database = dir.join("logal.db");
    config
}

fn redshifts() -> StaticRedshifts {
    StaticRedshifts::new()
        .with("F15327+2340", 0.018126)
        .with("F23007+0836", 0.016317)
}

const SELECTED: [CatalogId; 3] = [CatalogId::A09, CatalogId::K16, CatalogId::J17];

#[test]
fn test_build_merges_three_catalogs() -> Result<()> {
    let dir = tempdir()?;
    write_tables(dir.path())?;
    let config = config(dir.path());
    let redshifts = redshifts();
    let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
    let pipeline = BuildPipeline::new(&config, &redshifts, storage.clone());

    let result = pipeline.run(&BuildOptions {
        catalogs: SELECTED.to_vec(),
        ..Default::default()
    })?;

    assert_eq!(result.master_size, 3);
    assert_eq!(result.conflicts, 0);
    assert_eq!(result.duplicates, 0);
    assert_eq!(result.merge.created, 3);
    assert_eq!(result.merge.updated, 4);
    assert_eq!(result.merge.errors, 0);
    // No L17 overlap, so no bolometric factor
    assert_eq!(result.merge.bolometric_factor, None);

    let a09 = result.catalogs.iter().find(|c| c.catalog == CatalogId::A09).unwrap();
    assert_eq!(a09.rows, 3);
    assert_eq!(a09.skipped_lines, 1);

    let arp220 = storage.get_record("Arp220")?.expect("Arp220 merged");
    assert_eq!(arp220.z, Some(0.018126));
    assert!(arp220.member_of(CatalogId::A09));
    assert!(arp220.member_of(CatalogId::K16));
    assert!(arp220.member_of(CatalogId::J17));

    let lir = arp220.master(Quantity::LIR_8_1000).unwrap();
    assert_eq!(lir.catalog, CatalogId::A09);
    assert!((lir.measurement.value() / 10f64.powf(12.28) - 1.0).abs() < 1e-9);

    let co10 = arp220.master(Quantity::line(Transition::co(1))).unwrap();
    assert_eq!(co10.catalog, CatalogId::J17);
    assert_eq!(co10.measurement, Measurement::detection(520.0, Some(30.0)));

    assert_eq!(arp220.attributes.get("K16:DL").map(String::as_str), Some("79.9"));

    let ngc7469 = storage.lookup("IRAS23007+0836")?.expect("found by A09 alias");
    assert_eq!(ngc7469.id, "NGC7469");
    assert_eq!(
        ngc7469.master(Quantity::line(Transition::co(1))).map(|m| m.measurement),
        Some(Measurement::upper_limit(80.0))
    );

    let lonely = storage.get_record("IRAS12112+0305")?.expect("A09-only source");
    assert_eq!(lonely.z, None);
    assert_eq!(lonely.catalogs.len(), 1);

    let records = storage.get_merge_records(result.run_id)?;
    assert_eq!(records.len(), 7);
    assert_eq!(
        records.iter().filter(|r| r.change_type == ChangeType::Created).count(),
        3
    );

    let runs = storage.list_merge_runs()?;
    assert_eq!(runs.len(), 1);
    assert!(runs[0].finished_at.is_some());
    assert_eq!(runs[0].inputs.len(), 3);
    Ok(())
}

#[test]
fn test_rebuild_with_keep_updates_sqlite_store() -> Result<()> {
    let dir = tempdir()?;
    write_tables(dir.path())?;
    let config = config(dir.path());
    let redshifts = redshifts();
    let storage: Arc<dyn Storage> = Arc::new(SqliteStorage::open(&config.data.database)?);
    let pipeline = BuildPipeline::new(&config, &redshifts, storage.clone());
    let options = BuildOptions {
        catalogs: SELECTED.to_vec(),
        ..Default::default()
    };

    let first = pipeline.run(&options)?;
    assert_eq!(first.merge.created, 3);

    let second = pipeline.run(&BuildOptions {
        keep: true,
        ..options.clone()
    })?;
    assert_eq!(second.merge.created, 0);
    assert_eq!(second.merge.updated, 7);
    assert_eq!(storage.list_records()?.len(), 3);
    assert_eq!(storage.list_merge_runs()?.len(), 2);

    // A rebuild without keep starts from an empty store
    let third = pipeline.run(&options)?;
    assert_eq!(third.merge.created, 3);
    assert_eq!(storage.list_merge_runs()?.len(), 1);
    Ok(())
}

#[test]
fn test_crossmatch_report_and_export() -> Result<()> {
    let dir = tempdir()?;
    write_tables(dir.path())?;
    let config = config(dir.path());
    let redshifts = redshifts();
    let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
    let pipeline = BuildPipeline::new(&config, &redshifts, storage);

    let output = pipeline.crossmatch(&SELECTED)?;
    let report = overlap_report(&output.result, &[CatalogId::K16, CatalogId::A09, CatalogId::J17]);
    let lines: Vec<&str> = report.lines().collect();
    assert_eq!(lines.len(), 4);
    assert!(lines[0].starts_with("ID"));
    assert!(report.contains("0.01813"));
    assert!(lines.iter().any(|l| l.starts_with("IRAS12112+0305") && l.contains(" - ")));

    let export = dir.path().join("export").join("records.json");
    let result = pipeline.run(&BuildOptions {
        catalogs: SELECTED.to_vec(),
        export: Some(export.clone()),
        ..Default::default()
    })?;
    assert_eq!(result.export_file.as_deref(), Some(export.to_string_lossy().as_ref()));
    let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&export)?)?;
    assert_eq!(json.as_array().map(Vec::len), Some(3));
    Ok(())
}

#[test]
fn test_missing_catalog_file_is_a_warning() -> Result<()> {
    let dir = tempdir()?;
    write_tables(dir.path())?;
    let config = config(dir.path());
    let redshifts = redshifts();
    let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
    let pipeline = BuildPipeline::new(&config, &redshifts, storage);

    // G14 has no file in the directory
    let result = pipeline.run(&BuildOptions {
        catalogs: vec![CatalogId::K16, CatalogId::G14],
        ..Default::default()
    })?;
    assert_eq!(result.master_size, 2);
    assert!(result.warnings.iter().any(|w| w.contains("G14")));
    Ok(())
}
