use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::types::{CatalogId, Measurement, Quantity};

/// A catalog's value for one quantity of one source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogValue {
    pub measurement: Measurement,
    /// Computed from other quantities rather than published
    #[serde(default)]
    pub derived: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl CatalogValue {
    pub fn measured(measurement: Measurement) -> Self {
        Self {
            measurement,
            derived: false,
            note: None,
        }
    }

    pub fn derived(measurement: Measurement, note: impl Into<String>) -> Self {
        Self {
            measurement,
            derived: true,
            note: Some(note.into()),
        }
    }
}

/// The value adopted for a quantity, and where it came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasterValue {
    pub catalog: CatalogId,
    pub measurement: Measurement,
    #[serde(default)]
    pub derived: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuantityEntry {
    /// Per-catalog provenance
    pub values: BTreeMap<CatalogId, CatalogValue>,
    pub master: Option<MasterValue>,
}

/// Everything known about one source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GalaxyRecord {
    pub id: String,
    pub z: Option<f64>,
    pub aliases: BTreeSet<String>,
    /// Name each member catalog lists the source under
    pub catalogs: BTreeMap<CatalogId, String>,
    pub quantities: BTreeMap<Quantity, QuantityEntry>,
    /// Catalog specific columns, keyed `CODE:column`
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    pub updated_at: DateTime<Utc>,
}

impl GalaxyRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            z: None,
            aliases: BTreeSet::new(),
            catalogs: BTreeMap::new(),
            quantities: BTreeMap::new(),
            attributes: BTreeMap::new(),
            updated_at: Utc::now(),
        }
    }

    /// Whether the source is known under `name`, as ID or alias
    pub fn is_named(&self, name: &str) -> bool {
        self.id == name || self.aliases.contains(name)
    }

    pub fn value(&self, quantity: Quantity, catalog: CatalogId) -> Option<&CatalogValue> {
        self.quantities.get(&quantity)?.values.get(&catalog)
    }

    pub fn master(&self, quantity: Quantity) -> Option<&MasterValue> {
        self.quantities.get(&quantity)?.master.as_ref()
    }

    /// Store a catalog's value; returns false if the same value was already there
    pub fn set_value(&mut self, quantity: Quantity, catalog: CatalogId, value: CatalogValue) -> bool {
        let entry = self.quantities.entry(quantity).or_default();
        match entry.values.get(&catalog) {
            Some(existing) if *existing == value => false,
            _ => {
                entry.values.insert(catalog, value);
                true
            }
        }
    }

    pub fn member_of(&self, catalog: CatalogId) -> bool {
        self.catalogs.contains_key(&catalog)
    }
}
