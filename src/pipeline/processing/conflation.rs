//! Cross-matching: resolve every catalog row to a canonical source in the
//! master list.

use metrics::counter;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::Write as _;
use tracing::{debug, info, instrument, warn};

use crate::constants::DEFAULT_CROSSMATCH_ORDER;
use crate::types::{CatalogId, CatalogTable, SourceRow};

/// The decision made for one catalog row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolutionDecision {
    /// The row introduced a new master entry
    NewEntry(usize),
    /// The row's ID or ALT was already known
    Matched(usize),
    /// ID and ALT point at different entries; matched by ID
    Conflict { by_id: usize, by_alt: usize },
    /// The entry already has a row from this catalog; the row is not assigned
    Duplicate(usize),
}

impl ResolutionDecision {
    /// Entry the row's values belong to
    pub fn assigned_entry(&self) -> Option<usize> {
        match *self {
            ResolutionDecision::NewEntry(i)
            | ResolutionDecision::Matched(i)
            | ResolutionDecision::Conflict { by_id: i, .. } => Some(i),
            ResolutionDecision::Duplicate(_) => None,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            ResolutionDecision::NewEntry(_) => "new",
            ResolutionDecision::Matched(_) => "matched",
            ResolutionDecision::Conflict { .. } => "conflict",
            ResolutionDecision::Duplicate(_) => "duplicate",
        }
    }
}

/// One canonical source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasterEntry {
    /// Canonical ID
    pub key: String,
    pub z: Option<f64>,
    /// Every ID and ALT the source was seen under
    pub names: BTreeSet<String>,
    /// Name each member catalog lists the source under
    pub members: BTreeMap<CatalogId, String>,
    pub introduced_by: CatalogId,
}

/// Canonical sources with a name index
#[derive(Debug, Clone, Default)]
pub struct MasterList {
    entries: Vec<MasterEntry>,
    index: HashMap<String, usize>,
}

impl MasterList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[MasterEntry] {
        &self.entries
    }

    pub fn get(&self, i: usize) -> Option<&MasterEntry> {
        self.entries.get(i)
    }

    /// Entry a name is indexed under
    pub fn lookup(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn find(&self, name: &str) -> Option<&MasterEntry> {
        self.lookup(name).and_then(|i| self.entries.get(i))
    }

    /// Index a name, keeping any earlier owner
    fn index_name(&mut self, name: &str, entry: usize) {
        if name.is_empty() {
            return;
        }
        let owner = *self.index.entry(name.to_string()).or_insert(entry);
        if owner == entry {
            if let Some(e) = self.entries.get_mut(entry) {
                e.names.insert(name.to_string());
            }
        }
    }

    fn create(&mut self, row: &SourceRow) -> usize {
        let key = match &row.alt {
            Some(alt) if row.catalog.keys_on_alternate() && !alt.is_empty() => alt.clone(),
            _ => row.id.clone(),
        };
        let i = self.entries.len();
        self.entries.push(MasterEntry {
            key: key.clone(),
            z: row.z,
            names: BTreeSet::new(),
            members: BTreeMap::from([(row.catalog, key.clone())]),
            introduced_by: row.catalog,
        });
        self.index_name(&key, i);
        for name in row.names() {
            self.index_name(name, i);
        }
        i
    }

    fn attach(&mut self, entry: usize, row: &SourceRow, matched_name: &str) {
        for name in row.names() {
            self.index_name(name, entry);
        }
        let e = &mut self.entries[entry];
        e.members.insert(row.catalog, matched_name.to_string());
        if e.z.is_none() && row.z.is_some() {
            debug!("{}: redshift {:?} from {}", e.key, row.z, row.catalog);
            e.z = row.z;
        }
    }
}

/// Where one catalog row ended up
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub catalog: CatalogId,
    /// Position of the row in its [`CatalogTable`]
    pub row: usize,
    pub decision: ResolutionDecision,
}

#[derive(Debug, Clone, Default)]
pub struct CrossMatchResult {
    pub master: MasterList,
    pub assignments: Vec<Assignment>,
    pub warnings: Vec<String>,
}

impl CrossMatchResult {
    pub fn count(&self, f: impl Fn(&ResolutionDecision) -> bool) -> usize {
        self.assignments.iter().filter(|a| f(&a.decision)).count()
    }

    pub fn duplicates(&self) -> usize {
        self.count(|d| matches!(d, ResolutionDecision::Duplicate(_)))
    }

    pub fn conflicts(&self) -> usize {
        self.count(|d| matches!(d, ResolutionDecision::Conflict { .. }))
    }
}

/// Visits catalogs in a fixed order and resolves each row against the
/// growing master list
pub struct CrossMatcher {
    order: Vec<CatalogId>,
}

impl Default for CrossMatcher {
    fn default() -> Self {
        let order = DEFAULT_CROSSMATCH_ORDER
            .iter()
            .filter_map(|c| c.parse().ok())
            .collect();
        Self::new(order)
    }
}

impl CrossMatcher {
    pub fn new(order: Vec<CatalogId>) -> Self {
        Self { order }
    }

    pub fn order(&self) -> &[CatalogId] {
        &self.order
    }

    /// Tables in visiting order. Catalogs missing from the configured order
    /// go last, in the order given.
    fn ordered<'t>(&self, tables: &'t [CatalogTable]) -> Vec<&'t CatalogTable> {
        let mut out: Vec<&CatalogTable> = self
            .order
            .iter()
            .filter_map(|c| tables.iter().find(|t| t.catalog == *c))
            .collect();
        for table in tables {
            if !self.order.contains(&table.catalog) {
                warn!("{} is not in the cross-match order, visiting it last", table.catalog);
                out.push(table);
            }
        }
        out
    }

    fn resolve(&self, master: &MasterList, row: &SourceRow) -> (ResolutionDecision, String) {
        let by_id = master.lookup(&row.id);
        let by_alt = row
            .alt
            .as_deref()
            .filter(|a| !a.is_empty())
            .and_then(|a| master.lookup(a).map(|i| (i, a)));

        let (decision, name) = match (by_id, by_alt) {
            (Some(i), Some((j, _))) if i != j => (ResolutionDecision::Conflict { by_id: i, by_alt: j }, row.id.clone()),
            (Some(i), _) => (ResolutionDecision::Matched(i), row.id.clone()),
            (None, Some((j, alt))) => (ResolutionDecision::Matched(j), alt.to_string()),
            (None, None) => return (ResolutionDecision::NewEntry(master.len()), row.id.clone()),
        };

        let entry = decision.assigned_entry().unwrap_or_default();
        if master.entries[entry].members.contains_key(&row.catalog) {
            return (ResolutionDecision::Duplicate(entry), name);
        }
        (decision, name)
    }

    #[instrument(skip(self, tables), fields(catalogs = tables.len()))]
    pub fn crossmatch(&self, tables: &[CatalogTable]) -> CrossMatchResult {
        let mut result = CrossMatchResult::default();

        for table in self.ordered(tables) {
            let before = result.master.len();
            for (i, row) in table.rows.iter().enumerate() {
                let (decision, name) = self.resolve(&result.master, row);
                match decision {
                    ResolutionDecision::NewEntry(_) => {
                        result.master.create(row);
                    }
                    ResolutionDecision::Matched(entry) => result.master.attach(entry, row, &name),
                    ResolutionDecision::Conflict { by_id, by_alt } => {
                        let msg = format!(
                            "{}: {} matches '{}' by ID but '{}' by ALT {}",
                            table.catalog,
                            row.id,
                            result.master.entries[by_id].key,
                            result.master.entries[by_alt].key,
                            row.alt.as_deref().unwrap_or_default()
                        );
                        warn!("{}", msg);
                        result.warnings.push(msg);
                        result.master.attach(by_id, row, &name);
                    }
                    ResolutionDecision::Duplicate(entry) => {
                        let msg = format!(
                            "{}: {} duplicates its catalog's entry for '{}', not assigned",
                            table.catalog, row.id, result.master.entries[entry].key
                        );
                        warn!("{}", msg);
                        result.warnings.push(msg);
                    }
                }
                counter!("logal_crossmatch_rows_total", "catalog" => table.catalog.code(), "decision" => decision.label())
                    .increment(1);
                result.assignments.push(Assignment {
                    catalog: table.catalog,
                    row: i,
                    decision,
                });
            }
            info!(
                "{}: {} rows, {} new entries (master list size {})",
                table.catalog,
                table.rows.len(),
                result.master.len() - before,
                result.master.len()
            );
        }

        result
    }
}

/// One line per master entry: the name each catalog lists it under, and z
pub fn overlap_report(result: &CrossMatchResult, catalogs: &[CatalogId]) -> String {
    let width = result
        .master
        .entries()
        .iter()
        .flat_map(|e| std::iter::once(e.key.len()).chain(e.members.values().map(String::len)))
        .max()
        .unwrap_or(0)
        .max(8);

    let mut out = String::new();
    let _ = write!(out, "{:<w$}", "ID", w = width);
    for c in catalogs {
        let _ = write!(out, " {:<w$}", c.code(), w = width);
    }
    let _ = writeln!(out, " z");

    for entry in result.master.entries() {
        let _ = write!(out, "{:<w$}", entry.key, w = width);
        for c in catalogs {
            let name = entry.members.get(c).map(String::as_str).unwrap_or("-");
            let _ = write!(out, " {:<w$}", name, w = width);
        }
        match entry.z {
            Some(z) => {
                let _ = writeln!(out, " {:.5}", z);
            }
            None => {
                let _ = writeln!(out, " -");
            }
        }
    }
    out
}
