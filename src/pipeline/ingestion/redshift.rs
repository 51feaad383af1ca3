use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

use crate::error::{LogalError, Result};
use crate::pipeline::ingestion::table::parse_float;

/// Looks up a source redshift by name for catalogs that do not publish one
pub trait RedshiftResolver {
    /// Short name for logs
    fn name(&self) -> &str;

    /// `Ok(None)` when the name is unknown to the service
    fn resolve(&self, name: &str) -> Result<Option<f64>>;

    /// Try each name in turn and return the first hit. Lookup errors are
    /// logged and the next name is tried.
    fn resolve_first(&self, names: &[&str]) -> Option<f64> {
        for name in names.iter().filter(|n| !n.is_empty()) {
            match self.resolve(name) {
                Ok(Some(z)) => return Some(z),
                Ok(None) => debug!("{}: no redshift for {}", self.name(), name),
                Err(e) => warn!("{}: lookup of {} failed: {}", self.name(), name, e),
            }
        }
        None
    }
}

/// Redshifts from a fixed table
#[derive(Debug, Default, Clone)]
pub struct StaticRedshifts {
    values: HashMap<String, f64>,
}

impl StaticRedshifts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, z: f64) -> Self {
        self.insert(name, z);
        self
    }

    pub fn insert(&mut self, name: &str, z: f64) {
        self.values.insert(name.to_string(), z);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Load `name<TAB>z` lines; `#` starts a comment
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let mut out = Self::new();
        for (i, line) in text.lines().enumerate() {
            let line = line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let (name, z) = line
                .rsplit_once(|c: char| c == '\t' || c == ' ')
                .ok_or_else(|| {
                    LogalError::parse(path.display().to_string(), i + 1, "expected '<name> <z>'")
                })?;
            let z = parse_float(z).ok_or_else(|| {
                LogalError::parse(path.display().to_string(), i + 1, format!("bad redshift '{}'", z))
            })?;
            out.insert(name.trim(), z);
        }
        debug!("Loaded {} redshifts from {}", out.len(), path.display());
        Ok(out)
    }
}

impl RedshiftResolver for StaticRedshifts {
    fn name(&self) -> &str {
        "static"
    }

    fn resolve(&self, name: &str) -> Result<Option<f64>> {
        Ok(self.values.get(name).copied())
    }
}

/// Resolver for runs without redshift lookups
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRedshifts;

impl RedshiftResolver for NoRedshifts {
    fn name(&self) -> &str {
        "none"
    }

    fn resolve(&self, _name: &str) -> Result<Option<f64>> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use tempfile::tempdir;

    struct Flaky {
        calls: RefCell<Vec<String>>,
    }

    impl RedshiftResolver for Flaky {
        fn name(&self) -> &str {
            "flaky"
        }

        fn resolve(&self, name: &str) -> Result<Option<f64>> {
            self.calls.borrow_mut().push(name.to_string());
            match name {
                "broken" => Err(LogalError::Lookup {
                    name: name.to_string(),
                    message: "timeout".to_string(),
                }),
                "Mrk231" => Ok(Some(0.0422)),
                _ => Ok(None),
            }
        }
    }

    #[test]
    fn test_resolve_first_falls_through_errors_and_misses() {
        let resolver = Flaky {
            calls: RefCell::new(Vec::new()),
        };
        let z = resolver.resolve_first(&["broken", "", "unknown", "Mrk231", "never"]);
        assert_eq!(z, Some(0.0422));
        assert_eq!(*resolver.calls.borrow(), vec!["broken", "unknown", "Mrk231"]);
    }

    #[test]
    fn test_static_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("z.tsv");
        fs::write(&path, "# name z\nArp220\t0.018126\nMrk 231 0.04217\n\n").unwrap();
        let table = StaticRedshifts::from_file(&path).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.resolve("Arp220").unwrap(), Some(0.018126));
        assert_eq!(table.resolve("Mrk 231").unwrap(), Some(0.04217));
        assert_eq!(NoRedshifts.resolve("Arp220").unwrap(), None);
    }

    #[test]
    fn test_static_from_file_rejects_garbage() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("z.tsv");
        fs::write(&path, "Arp220\tfoo\n").unwrap();
        assert!(StaticRedshifts::from_file(&path).is_err());
    }
}
