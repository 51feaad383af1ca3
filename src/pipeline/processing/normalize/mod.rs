//! Identifier normalization: catalog specific name repair, the alias table,
//! the extended-source filter and per-catalog de-duplication.

pub mod rules;

use std::collections::HashSet;
use tracing::debug;

use crate::constants::DEFAULT_EXTENDED_SOURCES;
use crate::types::{CatalogId, SourceRow};
pub use rules::{apply_rules, AliasRule, DEFAULT_ALT_RULES, DEFAULT_ID_RULES};

/// The names a raw catalog row resolves to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Cleaned raw name, in the form to send to name resolvers
    pub query_name: String,
    pub id: String,
    pub alt: Option<String>,
}

/// What [`IdentifierNormalizer::filter_rows`] removed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterStats {
    pub duplicates: usize,
    pub extended: usize,
}

#[derive(Debug, Clone)]
pub struct IdentifierNormalizer {
    id_rules: Vec<AliasRule>,
    alt_rules: Vec<AliasRule>,
    extended_sources: Vec<String>,
}

impl Default for IdentifierNormalizer {
    fn default() -> Self {
        Self::new(
            DEFAULT_ID_RULES.clone(),
            DEFAULT_ALT_RULES.clone(),
            DEFAULT_EXTENDED_SOURCES.iter().map(|s| s.to_string()).collect(),
        )
    }
}

impl IdentifierNormalizer {
    pub fn new(id_rules: Vec<AliasRule>, alt_rules: Vec<AliasRule>, extended_sources: Vec<String>) -> Self {
        Self {
            id_rules,
            alt_rules,
            extended_sources,
        }
    }

    pub fn with_extended_sources(mut self, extended_sources: Vec<String>) -> Self {
        self.extended_sources = extended_sources;
        self
    }

    /// Remove LaTeX residue and whitespace from a raw name
    pub fn clean(raw: &str) -> String {
        let mut s = raw.to_string();
        for token in ["{", "}", "tt", "\\", " ", "\t"] {
            s = s.replace(token, "");
        }
        s
    }

    /// [`Self::clean`], and primary IDs also lose footnote asterisks
    pub fn clean_id(raw: &str) -> String {
        Self::clean(raw).replace('*', "")
    }

    pub fn canonical_id(&self, id: &str) -> String {
        apply_rules(&self.id_rules, id)
    }

    pub fn canonical_alt(&self, alt: &str) -> String {
        apply_rules(&self.alt_rules, alt)
    }

    /// Resolve a raw catalog row name (and alternate name, if the catalog has one).
    pub fn identify(&self, catalog: CatalogId, id_raw: &str, alt_raw: Option<&str>) -> Identity {
        let cleaned = Self::clean_id(id_raw);
        let cleaned_alt = alt_raw.map(Self::clean).filter(|a| !a.is_empty() && a != "nan");

        let (query_name, id, alt) = match catalog {
            CatalogId::A09 => {
                // IRAS designations: F-prefixed for lookups, IRAS-prefixed as IDs
                let iras = if cleaned.contains('F') {
                    cleaned.replace('F', "IRAS")
                } else {
                    format!("IRAS{}", cleaned)
                };
                let query = if cleaned.contains('F') {
                    cleaned.clone()
                } else {
                    format!("F{}", cleaned)
                };
                let alt = match cleaned_alt {
                    Some(a) => a.replace("tablenotemarka", ""),
                    None => iras.clone(),
                };
                (query, iras, Some(alt))
            }
            CatalogId::I15 => {
                if let Some((id, alt)) = cleaned.split_once('/') {
                    (cleaned.clone(), id.to_string(), Some(alt.to_string()))
                } else if let Some((id, alt)) = cleaned.split_once('(') {
                    (cleaned.clone(), id.to_string(), Some(alt.replace(')', "")))
                } else {
                    (cleaned.clone(), cleaned.clone(), Some(cleaned.clone()))
                }
            }
            CatalogId::J17 => (cleaned.clone(), cleaned.clone(), Some(cleaned.clone())),
            _ => (cleaned.clone(), cleaned.clone(), None),
        };

        let id = self.canonical_id(&id);
        let alt = alt
            .filter(|a| !a.is_empty())
            .map(|a| self.canonical_alt(&a));
        Identity { query_name, id, alt }
    }

    /// Name of the extended source this row refers to, if any
    pub fn extended_match(&self, id: &str, alt: Option<&str>) -> Option<&str> {
        self.extended_sources
            .iter()
            .find(|ext| id.contains(ext.as_str()) || alt.map_or(false, |a| a.contains(ext.as_str())))
            .map(String::as_str)
    }

    /// De-duplicate (first row per ID, then per alternate ID) and drop
    /// extended sources. K16 keeps all its rows.
    pub fn filter_rows(&self, catalog: CatalogId, rows: Vec<SourceRow>) -> (Vec<SourceRow>, FilterStats) {
        let mut stats = FilterStats::default();
        let mut kept = Vec::with_capacity(rows.len());

        let mut seen_ids: HashSet<String> = HashSet::new();
        let mut seen_alts: HashSet<String> = HashSet::new();

        for row in rows {
            if catalog.deduplicates() {
                if !seen_ids.insert(row.id.clone()) {
                    debug!("{}: dropping duplicate ID {}", catalog, row.id);
                    stats.duplicates += 1;
                    continue;
                }
                if let Some(alt) = &row.alt {
                    if !seen_alts.insert(alt.clone()) {
                        debug!("{}: dropping duplicate alternate ID {}", catalog, alt);
                        stats.duplicates += 1;
                        continue;
                    }
                }
            }
            if let Some(ext) = self.extended_match(&row.id, row.alt.as_deref()) {
                debug!("{}: dropping {} (extended source {})", catalog, row.id, ext);
                stats.extended += 1;
                continue;
            }
            kept.push(row);
        }

        (kept, stats)
    }
}
