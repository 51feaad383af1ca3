use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::constants;
use crate::error::{LogalError, Result};
use crate::physics::Cosmology;
use crate::types::CatalogId;

pub const DEFAULT_CONFIG_PATH: &str = "logal.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data: DataConfig,
    pub cosmology: CosmologyConfig,
    pub redshift: RedshiftConfig,
    pub merge: MergeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Directory holding the published tables
    pub raw_dir: PathBuf,
    pub output_dir: PathBuf,
    /// SQLite record store
    pub database: PathBuf,
    pub log_dir: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            raw_dir: PathBuf::from("raw-data"),
            output_dir: PathBuf::from("output"),
            database: PathBuf::from("output/logal.db"),
            log_dir: "logs".to_string(),
        }
    }
}

/// Target cosmology all luminosities are converted to
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CosmologyConfig {
    pub h0: f64,
    pub omega_m: f64,
}

impl Default for CosmologyConfig {
    fn default() -> Self {
        Self {
            h0: 70.0,
            omega_m: 0.28,
        }
    }
}

impl CosmologyConfig {
    pub fn standard(&self) -> Cosmology {
        Cosmology::flat(self.h0, self.omega_m)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RedshiftSource {
    /// NASA/IPAC Extragalactic Database, cached locally
    Ned,
    /// Tab separated `name<TAB>z` file
    File,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedshiftConfig {
    pub source: RedshiftSource,
    pub file: Option<PathBuf>,
    pub ned_url: String,
    pub timeout_seconds: u64,
    /// Pause between uncached NED queries
    pub delay_ms: u64,
    pub cache: PathBuf,
}

impl Default for RedshiftConfig {
    fn default() -> Self {
        Self {
            source: RedshiftSource::Ned,
            file: None,
            ned_url: constants::NED_OBJECT_LOOKUP_URL.to_string(),
            timeout_seconds: 30,
            delay_ms: 250,
            cache: PathBuf::from("output/ned_cache.db"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Master value priority, highest first
    pub priority: Vec<String>,
    pub crossmatch_order: Vec<String>,
    pub extended_sources: Vec<String>,
    /// Derive K16 L_IR(8-1000) from L_IR(40-120) using the L17 overlap
    pub bolometric_correction: bool,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            priority: constants::DEFAULT_PRIORITY.iter().map(|s| s.to_string()).collect(),
            crossmatch_order: constants::DEFAULT_CROSSMATCH_ORDER
                .iter()
                .map(|s| s.to_string())
                .collect(),
            extended_sources: constants::DEFAULT_EXTENDED_SOURCES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            bolometric_correction: true,
        }
    }
}

impl MergeConfig {
    pub fn priority(&self) -> Result<Vec<CatalogId>> {
        parse_codes("merge.priority", &self.priority)
    }

    pub fn crossmatch_order(&self) -> Result<Vec<CatalogId>> {
        parse_codes("merge.crossmatch_order", &self.crossmatch_order)
    }
}

fn parse_codes(field: &str, codes: &[String]) -> Result<Vec<CatalogId>> {
    let mut out = Vec::with_capacity(codes.len());
    for code in codes {
        let id: CatalogId = code
            .parse()
            .map_err(|_| LogalError::Config(format!("{}: unknown catalog '{}'", field, code)))?;
        if out.contains(&id) {
            return Err(LogalError::Config(format!("{}: '{}' listed twice", field, code)));
        }
        out.push(id);
    }
    Ok(out)
}

impl Config {
    /// Load from `logal.toml` in the working directory
    pub fn load() -> Result<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            LogalError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;

        let mut config: Config = toml::from_str(&content)?;
        config.apply_env_overrides();
        config.validate()?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Like [`Config::load_from`], but a missing file yields the defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            return Self::load_from(path);
        }
        info!("No config file at {}, using defaults", path.display());
        let mut config = Config::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// `LOGAL_RAW_DIR`, `LOGAL_DATABASE` and `LOGAL_REDSHIFT_FILE` win over the file
    pub fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("LOGAL_RAW_DIR") {
            if !dir.trim().is_empty() {
                self.data.raw_dir = PathBuf::from(dir);
            }
        }
        if let Ok(db) = std::env::var("LOGAL_DATABASE") {
            if !db.trim().is_empty() {
                self.data.database = PathBuf::from(db);
            }
        }
        if let Ok(file) = std::env::var("LOGAL_REDSHIFT_FILE") {
            if !file.trim().is_empty() {
                self.redshift.source = RedshiftSource::File;
                self.redshift.file = Some(PathBuf::from(file));
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.merge.priority()?;
        let order = self.merge.crossmatch_order()?;
        if order.is_empty() {
            return Err(LogalError::Config(
                "merge.crossmatch_order must list at least one catalog".to_string(),
            ));
        }
        if self.cosmology.h0 <= 0.0 || !(0.0..=1.0).contains(&self.cosmology.omega_m) {
            return Err(LogalError::Config(format!(
                "invalid cosmology: H0 = {}, Om = {}",
                self.cosmology.h0, self.cosmology.omega_m
            )));
        }
        if self.redshift.source == RedshiftSource::File && self.redshift.file.is_none() {
            return Err(LogalError::Config(
                "redshift.source = \"file\" requires redshift.file".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.cosmology.h0, 70.0);
        assert_eq!(config.merge.priority().unwrap()[0], CatalogId::J17);
        assert_eq!(config.merge.crossmatch_order().unwrap()[0], CatalogId::K16);
        assert!(config.merge.bolometric_correction);
        assert_eq!(config.redshift.source, RedshiftSource::Ned);
    }

    #[test]
    fn test_partial_sections_keep_other_defaults() {
        let config: Config = toml::from_str(
            r#"
            [data]
            raw_dir = "/data/tables"

            [redshift]
            source = "file"
            file = "z.tsv"

            [merge]
            priority = ["A09", "G14"]
            "#,
        )
        .unwrap();
        assert_eq!(config.data.raw_dir, PathBuf::from("/data/tables"));
        assert_eq!(config.data.output_dir, PathBuf::from("output"));
        assert_eq!(config.redshift.source, RedshiftSource::File);
        assert_eq!(
            config.merge.priority().unwrap(),
            vec![CatalogId::A09, CatalogId::G14]
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_codes() {
        let mut config = Config::default();
        config.merge.priority = vec!["A09".into(), "A09".into()];
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.merge.crossmatch_order = vec!["Z99".into()];
        assert!(matches!(config.validate(), Err(LogalError::Config(_))));
    }

    #[test]
    fn test_file_source_needs_a_path() {
        let mut config = Config::default();
        config.redshift.source = RedshiftSource::File;
        assert!(config.validate().is_err());
    }
}
