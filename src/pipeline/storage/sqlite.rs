use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::traits::Storage;
use crate::error::{LogalError, Result};
use crate::pipeline::processing::catalog::{
    CatalogInput, CatalogValue, ChangeType, GalaxyRecord, MasterValue, MergeRecord, MergeRun,
};
use crate::types::{CatalogId, FileFingerprint, Measurement, Quantity};

const SCHEMA: &str = r#"
    PRAGMA foreign_keys=ON;
    CREATE TABLE IF NOT EXISTS galaxies (
        id          TEXT PRIMARY KEY,
        z           REAL,
        catalogs    TEXT NOT NULL,
        attributes  TEXT NOT NULL,
        updated_at  TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS aliases (
        alias      TEXT PRIMARY KEY,
        galaxy_id  TEXT NOT NULL REFERENCES galaxies(id) ON DELETE CASCADE
    );
    CREATE TABLE IF NOT EXISTS measurements (
        galaxy_id  TEXT NOT NULL REFERENCES galaxies(id) ON DELETE CASCADE,
        quantity   TEXT NOT NULL,
        catalog    TEXT NOT NULL,
        kind       TEXT NOT NULL,
        value      REAL NOT NULL,
        error      REAL,
        derived    INTEGER NOT NULL DEFAULT 0,
        note       TEXT,
        PRIMARY KEY (galaxy_id, quantity, catalog)
    );
    CREATE TABLE IF NOT EXISTS masters (
        galaxy_id  TEXT NOT NULL REFERENCES galaxies(id) ON DELETE CASCADE,
        quantity   TEXT NOT NULL,
        catalog    TEXT NOT NULL,
        kind       TEXT NOT NULL,
        value      REAL NOT NULL,
        error      REAL,
        derived    INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (galaxy_id, quantity)
    );
    CREATE TABLE IF NOT EXISTS merge_runs (
        id           TEXT PRIMARY KEY,
        started_at   TEXT NOT NULL,
        finished_at  TEXT,
        catalogs     TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS input_files (
        run_id   TEXT NOT NULL REFERENCES merge_runs(id) ON DELETE CASCADE,
        catalog  TEXT NOT NULL,
        rows     INTEGER NOT NULL,
        file     TEXT NOT NULL,
        sha256   TEXT NOT NULL,
        bytes    INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS merge_records (
        id           TEXT PRIMARY KEY,
        run_id       TEXT NOT NULL REFERENCES merge_runs(id) ON DELETE CASCADE,
        catalog      TEXT NOT NULL,
        source_name  TEXT NOT NULL,
        galaxy_id    TEXT,
        change_type  TEXT NOT NULL,
        message      TEXT NOT NULL,
        created_at   TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_merge_records_run ON merge_records(run_id);
"#;

const DROP: &str = r#"
    DROP TABLE IF EXISTS merge_records;
    DROP TABLE IF EXISTS input_files;
    DROP TABLE IF EXISTS merge_runs;
    DROP TABLE IF EXISTS masters;
    DROP TABLE IF EXISTS measurements;
    DROP TABLE IF EXISTS aliases;
    DROP TABLE IF EXISTS galaxies;
"#;

/// SQLite backed record store
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        info!("Record store at {}", path.display());
        Self::with_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn load_record(conn: &Connection, id: &str) -> Result<Option<GalaxyRecord>> {
        let row = conn
            .query_row(
                "SELECT z, catalogs, attributes, updated_at FROM galaxies WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, Option<f64>>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;
        let Some((z, catalogs, attributes, updated_at)) = row else {
            return Ok(None);
        };

        let mut record = GalaxyRecord::new(id);
        record.z = z;
        record.catalogs = serde_json::from_str(&catalogs)?;
        record.attributes = serde_json::from_str(&attributes)?;
        record.updated_at = parse_time(&updated_at)?;

        let mut stmt = conn.prepare("SELECT alias FROM aliases WHERE galaxy_id = ?1")?;
        for alias in stmt.query_map(params![id], |row| row.get::<_, String>(0))? {
            record.aliases.insert(alias?);
        }

        let mut stmt = conn.prepare(
            "SELECT quantity, catalog, kind, value, error, derived, note FROM measurements WHERE galaxy_id = ?1",
        )?;
        let rows = stmt.query_map(params![id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, f64>(3)?,
                row.get::<_, Option<f64>>(4)?,
                row.get::<_, bool>(5)?,
                row.get::<_, Option<String>>(6)?,
            ))
        })?;
        for row in rows {
            let (quantity, catalog, kind, value, error, derived, note) = row?;
            let quantity: Quantity = quantity.parse()?;
            let catalog: CatalogId = catalog.parse()?;
            let value = CatalogValue {
                measurement: measurement(&kind, value, error)?,
                derived,
                note,
            };
            record
                .quantities
                .entry(quantity)
                .or_default()
                .values
                .insert(catalog, value);
        }

        let mut stmt =
            conn.prepare("SELECT quantity, catalog, kind, value, error, derived FROM masters WHERE galaxy_id = ?1")?;
        let rows = stmt.query_map(params![id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, f64>(3)?,
                row.get::<_, Option<f64>>(4)?,
                row.get::<_, bool>(5)?,
            ))
        })?;
        for row in rows {
            let (quantity, catalog, kind, value, error, derived) = row?;
            let quantity: Quantity = quantity.parse()?;
            record.quantities.entry(quantity).or_default().master = Some(MasterValue {
                catalog: catalog.parse()?,
                measurement: measurement(&kind, value, error)?,
                derived,
            });
        }

        Ok(Some(record))
    }

    fn load_inputs(conn: &Connection, run_id: &str) -> Result<Vec<CatalogInput>> {
        let mut stmt = conn.prepare(
            "SELECT catalog, rows, file, sha256, bytes FROM input_files WHERE run_id = ?1 ORDER BY rowid",
        )?;
        let rows = stmt.query_map(params![run_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, i64>(4)?,
            ))
        })?;
        let mut inputs: Vec<CatalogInput> = Vec::new();
        for row in rows {
            let (catalog, n, name, sha256, bytes) = row?;
            let catalog: CatalogId = catalog.parse()?;
            let file = FileFingerprint {
                name,
                sha256,
                bytes: bytes as u64,
            };
            match inputs.iter_mut().find(|i| i.catalog == catalog) {
                Some(input) => input.files.push(file),
                None => inputs.push(CatalogInput {
                    catalog,
                    rows: n as usize,
                    files: vec![file],
                }),
            }
        }
        Ok(inputs)
    }

    fn write_run(conn: &Connection, run: &MergeRun) -> Result<()> {
        let id = run.id.to_string();
        conn.execute(
            "INSERT INTO merge_runs (id, started_at, finished_at, catalogs) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET finished_at=excluded.finished_at, catalogs=excluded.catalogs",
            params![
                id,
                run.started_at.to_rfc3339(),
                run.finished_at.map(|t| t.to_rfc3339()),
                serde_json::to_string(&run.catalogs)?
            ],
        )?;
        conn.execute("DELETE FROM input_files WHERE run_id = ?1", params![id])?;
        for input in &run.inputs {
            for file in &input.files {
                conn.execute(
                    "INSERT INTO input_files (run_id, catalog, rows, file, sha256, bytes) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        id,
                        input.catalog.code(),
                        input.rows as i64,
                        file.name,
                        file.sha256,
                        file.bytes as i64
                    ],
                )?;
            }
        }
        Ok(())
    }
}

fn parse_time(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| LogalError::Corrupt(format!("bad timestamp '{}': {}", s, e)))
}

fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| LogalError::Corrupt(format!("bad id '{}': {}", s, e)))
}

/// (kind, value, error) columns for a measurement
fn columns(m: &Measurement) -> (&'static str, f64, Option<f64>) {
    match *m {
        Measurement::Detection { value, error } => ("detection", value, error),
        Measurement::UpperLimit { value } => ("upper_limit", value, None),
    }
}

fn measurement(kind: &str, value: f64, error: Option<f64>) -> Result<Measurement> {
    match kind {
        "detection" => Ok(Measurement::detection(value, error)),
        "upper_limit" => Ok(Measurement::upper_limit(value)),
        other => Err(LogalError::Corrupt(format!("unknown measurement kind '{}'", other))),
    }
}

impl Storage for SqliteStorage {
    fn reset(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(DROP)?;
        conn.execute_batch(SCHEMA)?;
        info!("Record store reset");
        Ok(())
    }

    fn save_record(&self, record: &GalaxyRecord) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO galaxies (id, z, catalogs, attributes, updated_at) VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET z=excluded.z, catalogs=excluded.catalogs,
                attributes=excluded.attributes, updated_at=excluded.updated_at",
            params![
                record.id,
                record.z,
                serde_json::to_string(&record.catalogs)?,
                serde_json::to_string(&record.attributes)?,
                record.updated_at.to_rfc3339()
            ],
        )?;
        tx.execute("DELETE FROM aliases WHERE galaxy_id = ?1", params![record.id])?;
        tx.execute("DELETE FROM measurements WHERE galaxy_id = ?1", params![record.id])?;
        tx.execute("DELETE FROM masters WHERE galaxy_id = ?1", params![record.id])?;

        // The first record to claim an alias keeps it
        for alias in &record.aliases {
            let inserted = tx.execute(
                "INSERT INTO aliases (alias, galaxy_id) VALUES (?1, ?2) ON CONFLICT(alias) DO NOTHING",
                params![alias, record.id],
            )?;
            if inserted == 0 {
                let owner: String = tx.query_row(
                    "SELECT galaxy_id FROM aliases WHERE alias = ?1",
                    params![alias],
                    |row| row.get(0),
                )?;
                warn!("Alias {} already belongs to {}, not moving it to {}", alias, owner, record.id);
            }
        }
        for (quantity, entry) in &record.quantities {
            let quantity = quantity.to_string();
            for (catalog, value) in &entry.values {
                let (kind, v, e) = columns(&value.measurement);
                tx.execute(
                    "INSERT INTO measurements (galaxy_id, quantity, catalog, kind, value, error, derived, note)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![record.id, quantity, catalog.code(), kind, v, e, value.derived, value.note],
                )?;
            }
            if let Some(master) = &entry.master {
                let (kind, v, e) = columns(&master.measurement);
                tx.execute(
                    "INSERT INTO masters (galaxy_id, quantity, catalog, kind, value, error, derived)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![record.id, quantity, master.catalog.code(), kind, v, e, master.derived],
                )?;
            }
        }
        tx.commit()?;
        debug!("Saved record {}", record.id);
        Ok(())
    }

    fn get_record(&self, id: &str) -> Result<Option<GalaxyRecord>> {
        let conn = self.conn.lock().unwrap();
        Self::load_record(&conn, id)
    }

    fn find_by_alias(&self, alias: &str) -> Result<Option<GalaxyRecord>> {
        let conn = self.conn.lock().unwrap();
        let id: Option<String> = conn
            .query_row(
                "SELECT galaxy_id FROM aliases WHERE alias = ?1",
                params![alias],
                |row| row.get(0),
            )
            .optional()?;
        match id {
            Some(id) => Self::load_record(&conn, &id),
            None => Ok(None),
        }
    }

    fn list_records(&self) -> Result<Vec<GalaxyRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT id FROM galaxies ORDER BY id")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = Self::load_record(&conn, &id)? {
                records.push(record);
            }
        }
        Ok(records)
    }

    fn create_merge_run(&self, run: &MergeRun) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        Self::write_run(&conn, run)?;
        debug!("Created merge run {}", run.id);
        Ok(())
    }

    fn update_merge_run(&self, run: &MergeRun) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let exists: Option<String> = conn
            .query_row(
                "SELECT id FROM merge_runs WHERE id = ?1",
                params![run.id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Err(LogalError::NotFound(format!("merge run {}", run.id)));
        }
        Self::write_run(&conn, run)
    }

    fn list_merge_runs(&self) -> Result<Vec<MergeRun>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT id, started_at, finished_at, catalogs FROM merge_runs ORDER BY started_at")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut runs = Vec::with_capacity(rows.len());
        for (id, started_at, finished_at, catalogs) in rows {
            runs.push(MergeRun {
                id: parse_uuid(&id)?,
                started_at: parse_time(&started_at)?,
                finished_at: finished_at.as_deref().map(parse_time).transpose()?,
                catalogs: serde_json::from_str(&catalogs)?,
                inputs: Self::load_inputs(&conn, &id)?,
            });
        }
        Ok(runs)
    }

    fn create_merge_record(&self, record: &mut MergeRecord) -> Result<()> {
        let id = Uuid::new_v4();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO merge_records (id, run_id, catalog, source_name, galaxy_id, change_type, message, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                id.to_string(),
                record.run_id.to_string(),
                record.catalog.code(),
                record.source_name,
                record.galaxy_id,
                record.change_type.as_str(),
                record.message,
                record.created_at.to_rfc3339()
            ],
        )?;
        record.id = Some(id);
        Ok(())
    }

    fn get_merge_records(&self, run_id: Uuid) -> Result<Vec<MergeRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, catalog, source_name, galaxy_id, change_type, message, created_at
             FROM merge_records WHERE run_id = ?1 ORDER BY rowid",
        )?;
        let rows = stmt
            .query_map(params![run_id.to_string()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut records = Vec::with_capacity(rows.len());
        for (id, catalog, source_name, galaxy_id, change_type, message, created_at) in rows {
            records.push(MergeRecord {
                id: Some(parse_uuid(&id)?),
                run_id,
                catalog: catalog.parse()?,
                source_name,
                galaxy_id,
                change_type: change_type.parse::<ChangeType>()?,
                message,
                created_at: parse_time(&created_at)?,
            });
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FileFingerprint, Transition};
    use tempfile::tempdir;

    fn sample() -> GalaxyRecord {
        let mut record = GalaxyRecord::new("Arp220");
        record.z = Some(0.018126);
        record.aliases.insert("IRAS15327+2340".to_string());
        record.catalogs.insert(CatalogId::A09, "Arp220".to_string());
        record.catalogs.insert(CatalogId::K16, "Arp220".to_string());
        record.attributes.insert("K16:DL".to_string(), "77.0".to_string());
        let co = Quantity::line(Transition::co(6));
        record.set_value(co, CatalogId::K16, CatalogValue::measured(Measurement::detection(3000.0, Some(200.0))));
        record.set_value(co, CatalogId::L17, CatalogValue::measured(Measurement::upper_limit(1000.0)));
        record.set_value(
            Quantity::LIR_8_1000,
            CatalogId::K16,
            CatalogValue::derived(Measurement::detection(1.5e12, None), "scaled"),
        );
        crate::pipeline::processing::catalog::MergePolicy::default().refresh(&mut record);
        record
    }

    #[test]
    fn test_record_roundtrip_through_sqlite() {
        let storage = SqliteStorage::in_memory().unwrap();
        let record = sample();
        storage.save_record(&record).unwrap();
        let loaded = storage.get_record("Arp220").unwrap().unwrap();
        assert_eq!(loaded.z, record.z);
        assert_eq!(loaded.aliases, record.aliases);
        assert_eq!(loaded.catalogs, record.catalogs);
        assert_eq!(loaded.attributes, record.attributes);
        assert_eq!(loaded.quantities, record.quantities);
        assert_eq!(storage.lookup("IRAS15327+2340").unwrap().unwrap().id, "Arp220");
        assert_eq!(storage.list_records().unwrap().len(), 1);
    }

    #[test]
    fn test_resave_replaces_children() {
        let storage = SqliteStorage::in_memory().unwrap();
        let mut record = sample();
        storage.save_record(&record).unwrap();
        record.aliases.clear();
        record.quantities.clear();
        storage.save_record(&record).unwrap();
        let loaded = storage.get_record("Arp220").unwrap().unwrap();
        assert!(loaded.aliases.is_empty());
        assert!(loaded.quantities.is_empty());
        assert!(storage.find_by_alias("IRAS15327+2340").unwrap().is_none());
    }

    #[test]
    fn test_alias_keeps_first_owner() {
        let storage = SqliteStorage::in_memory().unwrap();
        storage.save_record(&sample()).unwrap();

        let mut other = GalaxyRecord::new("IRAS15327+2340-B");
        other.aliases.insert("IRAS15327+2340".to_string());
        storage.save_record(&other).unwrap();

        assert_eq!(storage.find_by_alias("IRAS15327+2340").unwrap().unwrap().id, "Arp220");
        assert!(storage.get_record("IRAS15327+2340-B").unwrap().unwrap().aliases.is_empty());
    }

    #[test]
    fn test_runs_records_and_reset_on_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out").join("logal.db");
        let run_id;
        {
            let storage = SqliteStorage::open(&path).unwrap();
            let mut run = MergeRun::start(vec![CatalogId::G14]);
            run_id = run.id;
            storage.create_merge_run(&run).unwrap();
            run.inputs.push(CatalogInput {
                catalog: CatalogId::G14,
                rows: 3,
                files: vec![FileFingerprint {
                    name: "Greve-et-al-2014-table-1.txt".to_string(),
                    sha256: "ab".repeat(32),
                    bytes: 120,
                }],
            });
            run.finish();
            storage.update_merge_run(&run).unwrap();

            let mut rec = MergeRecord {
                id: None,
                run_id,
                catalog: CatalogId::G14,
                source_name: "NGC0023".to_string(),
                galaxy_id: Some("NGC0023".to_string()),
                change_type: ChangeType::Created,
                message: "Created".to_string(),
                created_at: Utc::now(),
            };
            storage.create_merge_record(&mut rec).unwrap();
            assert!(rec.id.is_some());
        }

        let storage = SqliteStorage::open(&path).unwrap();
        let runs = storage.list_merge_runs().unwrap();
        assert_eq!(runs.len(), 1);
        assert!(runs[0].finished_at.is_some());
        assert_eq!(runs[0].inputs[0].files[0].bytes, 120);
        let records = storage.get_merge_records(run_id).unwrap();
        assert_eq!(records[0].change_type, ChangeType::Created);

        storage.reset().unwrap();
        assert!(storage.list_merge_runs().unwrap().is_empty());
        assert!(storage.get_merge_records(run_id).unwrap().is_empty());
    }
}
