use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use tracing::debug;

use super::{delog, index_by_id, TableBuilder};
use crate::constants::K16_MIN_REDSHIFT;
use crate::error::Result;
use crate::pipeline::ingestion::table::{Delimiter, TableLine, TableSpec};
use crate::pipeline::ingestion::{CatalogReader, ReadContext};
use crate::types::{CatalogId, CatalogTable, Measurement, Quantity, Transition};

const TABLE_1: TableSpec = TableSpec::new("Kamenetzky-et-al-2015-Table-1.bsv", 1, Delimiter::Char('|'));
const TABLE_2: TableSpec = TableSpec::new("Kamenetzky-et-al-2015-Table-2.bsv", 45, Delimiter::Char('|'));
const TABLE_3: TableSpec = TableSpec::new("Kamenetzky-et-al-2015-Table-3.bsv", 49, Delimiter::Char('|'));

// Table 3 columns
const T3_SDV: usize = 8;
const T3_ESDV: usize = 9;

static CO_LABEL: Lazy<Regex> = Lazy::new(|| Regex::new(r"CO\s*\(?\s*(\d+)\s*-\s*(\d+)\s*\)?").unwrap());

/// Kamenetzky et al. 2016 (VizieR J/ApJ/829/93): L_IR(40-120) and z in table 1,
/// SPIRE FTS fluxes with 3-sigma limits in table 2, ground based CO(1-0) to
/// CO(3-2) in table 3. Fluxes are already in Jy km/s.
pub struct Kamenetzky16Reader;

impl CatalogReader for Kamenetzky16Reader {
    fn catalog(&self) -> CatalogId {
        CatalogId::K16
    }

    fn files(&self) -> Vec<&'static str> {
        vec![TABLE_1.file, TABLE_2.file, TABLE_3.file]
    }

    fn read(&self, ctx: &ReadContext<'_>) -> Result<CatalogTable> {
        let catalog = self.catalog();
        let mut builder = TableBuilder::new(catalog);
        let raw = builder.load(ctx, &TABLE_1)?;

        let mut rows = Vec::with_capacity(raw.lines.len());
        for line in &raw.lines {
            let values = line.float(1).and_then(|l| Ok((l, line.float(3)?)));
            let (log_lir, z) = match values {
                Ok(v) => v,
                Err(e) => {
                    builder.skip(e);
                    continue;
                }
            };
            let mut row = ctx
                .row(catalog, line.cell(0).unwrap_or_default(), None, line.line_no)
                .with_attribute("DL", line.cell(2).unwrap_or_default());
            row.z = Some(if z < 0.0 { K16_MIN_REDSHIFT } else { z });
            row.set(
                Quantity::LIR_40_120,
                ctx.correct(catalog, row.z, Measurement::detection(delog(log_lir), None)),
            );
            rows.push(row);
        }
        let mut rows = builder.filter(ctx, rows);
        let index = index_by_id(&rows);

        if let Some(table2) = builder.load_optional(ctx, &TABLE_2) {
            for line in &table2.lines {
                let Some((id, transition, m)) = spire_flux(ctx, line) else { continue };
                match index.get(&id) {
                    Some(positions) => {
                        for &i in positions {
                            rows[i].set(Quantity::line(transition), m);
                        }
                    }
                    None => debug!("K16: {}:{} has no table 1 entry ({})", line.file, line.line_no, id),
                }
            }
        }

        if let Some(table3) = builder.load_optional(ctx, &TABLE_3) {
            // (ID, J) -> all flux entries, to be averaged
            let mut groups: BTreeMap<(String, u8), Vec<(Option<f64>, Option<f64>)>> = BTreeMap::new();
            for line in &table3.lines {
                let Some(name) = line.cell(0) else { continue };
                let Some(j) = line.cell(1).and_then(ground_transition) else { continue };
                if j > 3 {
                    continue;
                }
                let id = ctx.identify(catalog, name, None).id;
                groups
                    .entry((id, j))
                    .or_default()
                    .push((line.optional_float(T3_SDV), line.optional_float(T3_ESDV)));
            }
            for ((id, j), entries) in groups {
                let Some(m) = combine_ground_fluxes(&entries) else { continue };
                if let Some(positions) = index.get(&id) {
                    for &i in positions {
                        rows[i].set(Quantity::line(Transition::co(j)), m);
                    }
                }
            }
        }

        Ok(builder.finish(rows))
    }
}

/// Table 2 transition labels: `CO4-3` style, `CI1`, `CI2`, `NII`
fn spire_transition(label: &str) -> Option<Transition> {
    let label = label.trim();
    if let Some(caps) = CO_LABEL.captures(label) {
        let upper: u8 = caps[1].parse().ok()?;
        let lower: u8 = caps[2].parse().ok()?;
        return (lower.checked_add(1) == Some(upper)).then_some(Transition::co(upper));
    }
    if label.contains("CI1") {
        Some(Transition::Ci609)
    } else if label.contains("CI2") {
        Some(Transition::Ci370)
    } else if label.contains("NII") {
        Some(Transition::Nii205)
    } else {
        None
    }
}

/// One table 2 row: (ID, transition, measurement). Only CO(4-3) and above,
/// [CI] and [NII] are taken from this table.
fn spire_flux(ctx: &ReadContext<'_>, line: &TableLine) -> Option<(String, Transition, Measurement)> {
    let name = line.cell(0)?;
    let transition = spire_transition(line.cell(1)?)?;
    if matches!(transition, Transition::Co(j) if j < 4) {
        return None;
    }
    let flux = line.optional_float(3).unwrap_or(f64::NAN);
    let low = line.optional_float(4);
    let high = line.optional_float(5);
    let limit = line.optional_float(6).filter(|v| *v > 0.0);

    let measurement = if let Some(limit) = limit {
        Measurement::upper_limit(limit)
    } else if flux > 0.0 {
        let error = match (low, high) {
            (Some(lo), Some(hi)) if hi == lo => Some(flux),
            (Some(lo), Some(hi)) => Some((hi - lo) / 2.0),
            _ => None,
        };
        Measurement::detection(flux, error.filter(|e| *e > 0.0))
    } else {
        return None;
    };
    let id = ctx.identify(CatalogId::K16, name, None).id;
    Some((id, transition, measurement))
}

/// Table 3 encodes the transition by its upper level; the highest known digit wins.
fn ground_transition(label: &str) -> Option<u8> {
    [1u8, 2, 3, 4, 6, 7]
        .into_iter()
        .filter(|d| label.contains(char::from(b'0' + d)))
        .max()
}

/// A single entry is taken as published; several pointings are averaged, with
/// the population scatter as the error. NaN fluxes are ignored.
fn combine_ground_fluxes(entries: &[(Option<f64>, Option<f64>)]) -> Option<Measurement> {
    match entries {
        [(Some(flux), error)] if *flux > 0.0 => Some(Measurement::detection(*flux, error.filter(|e| *e > 0.0))),
        [_] | [] => None,
        many => {
            let fluxes: Vec<f64> = many.iter().filter_map(|(f, _)| *f).collect();
            if fluxes.is_empty() {
                return None;
            }
            let n = fluxes.len() as f64;
            let mean = fluxes.iter().sum::<f64>() / n;
            let var = fluxes.iter().map(|f| (f - mean).powi(2)).sum::<f64>() / n;
            (mean > 0.0).then(|| Measurement::detection(mean, Some(var.sqrt())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spire_transition_labels() {
        assert_eq!(spire_transition("CO4-3"), Some(Transition::co(4)));
        assert_eq!(spire_transition(" CO13-12 "), Some(Transition::co(13)));
        assert_eq!(spire_transition("CI1"), Some(Transition::Ci609));
        assert_eq!(spire_transition("CI2"), Some(Transition::Ci370));
        assert_eq!(spire_transition("NII"), Some(Transition::Nii205));
        assert_eq!(spire_transition("HCN"), None);
    }

    #[test]
    fn test_ground_transition_digits() {
        assert_eq!(ground_transition("1"), Some(1));
        assert_eq!(ground_transition("2-1"), Some(2));
        assert_eq!(ground_transition("3-2"), Some(3));
        assert_eq!(ground_transition("x"), None);
    }

    #[test]
    fn test_combine_single_and_many() {
        assert_eq!(
            combine_ground_fluxes(&[(Some(100.0), Some(10.0))]),
            Some(Measurement::detection(100.0, Some(10.0)))
        );
        assert_eq!(combine_ground_fluxes(&[(Some(-1.0), None)]), None);
        assert_eq!(combine_ground_fluxes(&[(None, None)]), None);

        let m = combine_ground_fluxes(&[(Some(100.0), None), (None, None), (Some(200.0), None)]).unwrap();
        assert_eq!(m, Measurement::detection(150.0, Some(50.0)));
    }
}
