use std::collections::HashMap;
use tracing::{debug, warn};

use super::{delog, index_by_id, to_jansky, TableBuilder, SPIRE_CO_LADDER};
use crate::error::Result;
use crate::pipeline::ingestion::table::{parse_float, Delimiter, RawTable, TableLine, TableSpec};
use crate::pipeline::ingestion::{CatalogReader, ReadContext};
use crate::types::{CatalogId, CatalogTable, Measurement, Quantity, SourceRow, Transition};

const TABLE_1: TableSpec = TableSpec::new("Rosenberg-et-al-2015-table-1.txt", 4, Delimiter::Char('&'));
const TABLE_2: TableSpec = TableSpec::new("Rosenberg-et-al-2015-table-2.txt", 20, Delimiter::Char('&'));
const TABLE_3: TableSpec = TableSpec::new("Rosenberg-et-al-2015-table-3.txt", 12, Delimiter::Char('&'));

/// Relative errors the paper quotes for its line fluxes
const LOW_J_REL_ERROR: f64 = 0.30;
const HIGH_J_REL_ERROR: f64 = 0.16;

const LOW_J_UNIT: f64 = 1e-18;
const HIGH_J_UNIT: f64 = 1e-17;

/// HerCULES (Rosenberg et al. 2015): z and L_IR in table 1, SPIRE FTS lines in
/// table 2, ground based CO(1-0) to CO(3-2) in table 3. Fluxes are in W m^-2.
pub struct Rosenberg15Reader;

fn table_2_transitions() -> Vec<Transition> {
    let mut t: Vec<Transition> = SPIRE_CO_LADDER.iter().map(|&j| Transition::co(j)).collect();
    t.extend([
        Transition::Ci609,
        Transition::Ci370,
        Transition::Oi63,
        Transition::Oi145,
        Transition::Cii158,
    ]);
    t
}

/// (column, transition) pairs of table 3
const TABLE_3_COLUMNS: [(usize, u8); 3] = [(1, 1), (4, 2), (7, 3)];

impl CatalogReader for Rosenberg15Reader {
    fn catalog(&self) -> CatalogId {
        CatalogId::R15
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
            let parsed = line.float(1).and_then(|lir| Ok((lir, line.float(3)?)));
            let (log_lir, z) = match parsed {
                Ok(v) => v,
                Err(e) => {
                    builder.skip(e);
                    continue;
                }
            };
            let mut row = ctx
                .row(catalog, line.cell(0).unwrap_or_default(), None, line.line_no)
                .with_attribute("FIR", line.cell(2).unwrap_or_default())
                .with_attribute("DL", line.cell(4).unwrap_or_default())
                .with_attribute("FWHM_CO10", line.cell(5).unwrap_or_default())
                .with_attribute("AGN_SB_type", clean_attribute(line.cell(6).unwrap_or_default()));
            row.z = Some(z);
            row.set(
                Quantity::LIR_8_1000,
                ctx.correct(catalog, row.z, Measurement::detection(delog(log_lir), None)),
            );
            rows.push(row);
        }
        let mut rows = builder.filter(ctx, rows);

        if let Some(table2) = builder.load_optional(ctx, &TABLE_2) {
            let transitions = table_2_transitions();
            let lines = first_line_per_id(ctx, &table2);
            merge_fluxes(&mut rows, &lines, |line, row| {
                for (k, &t) in transitions.iter().enumerate() {
                    let Some(cell) = line.cell(k + 1) else { continue };
                    apply_flux(row, t, parse_high_j(cell), line);
                }
            });
        }

        if let Some(table3) = builder.load_optional(ctx, &TABLE_3) {
            let lines = first_line_per_id(ctx, &table3);
            merge_fluxes(&mut rows, &lines, |line, row| {
                for (col, j) in TABLE_3_COLUMNS {
                    let Some(cell) = line.cell(col) else { continue };
                    apply_flux(row, Transition::co(j), parse_low_j(cell), line);
                }
            });
        }

        Ok(builder.finish(rows))
    }
}

fn clean_attribute(cell: &str) -> String {
    cell.trim_end_matches("\\\\").trim().to_string()
}

/// Line tables are joined to table 1 by normalized ID; the first line per ID wins.
fn first_line_per_id<'t>(ctx: &ReadContext<'_>, table: &'t RawTable) -> HashMap<String, &'t TableLine> {
    let mut out: HashMap<String, &TableLine> = HashMap::new();
    for line in &table.lines {
        let Some(name) = line.cell(0) else { continue };
        let id = ctx.identify(CatalogId::R15, name, None).id;
        out.entry(id).or_insert(line);
    }
    out
}

fn merge_fluxes<F>(rows: &mut [SourceRow], lines: &HashMap<String, &TableLine>, mut apply: F)
where
    F: FnMut(&TableLine, &mut SourceRow),
{
    let index = index_by_id(rows);
    for (id, line) in lines {
        match index.get(id) {
            Some(positions) => {
                for &i in positions {
                    apply(line, &mut rows[i]);
                }
            }
            None => debug!("R15: {}:{} has no table 1 entry ({})", line.file, line.line_no, id),
        }
    }
}

fn apply_flux(row: &mut SourceRow, t: Transition, parsed: std::result::Result<Option<Measurement>, String>, line: &TableLine) {
    match parsed {
        Ok(Some(m)) => {
            if let Some(m) = to_jansky(t, m) {
                row.set(Quantity::line(t), m);
            }
        }
        Ok(None) => {}
        Err(msg) => warn!("R15: {}:{} {}: {}", line.file, line.line_no, t, msg),
    }
}

fn number(s: &str) -> std::result::Result<f64, String> {
    parse_float(s).ok_or_else(|| format!("'{}' is not a number", s))
}

/// CO(1-0) to CO(3-2): `...` means not observed; values are 1e-18 W m^-2 with 30% errors.
fn parse_low_j(cell: &str) -> std::result::Result<Option<Measurement>, String> {
    let cell = cell.replace('\t', "");
    if cell.contains("...") || cell.trim().is_empty() {
        return Ok(None);
    }
    let value = number(&cell)? * LOW_J_UNIT;
    if value < 0.0 {
        return Ok(None);
    }
    Ok(Some(Measurement::detection(value, Some(LOW_J_REL_ERROR * value))))
}

/// SPIRE lines, in 1e-17 W m^-2. Footnote `a` puts the adopted value in
/// parentheses, `b` marks a 3-sigma upper limit, `d` a line that could not be
/// measured; a dash means not covered.
fn parse_high_j(cell: &str) -> std::result::Result<Option<Measurement>, String> {
    let cell = cell.replace('\t', "");
    let cell = cell.trim().trim_end_matches("\\\\").trim();
    if cell.is_empty() {
        return Ok(None);
    }

    let measurement = if cell.contains("^a") {
        let stripped = cell.replace("^a", "");
        let start = stripped.find('(').ok_or("footnote a without a parenthesized value")?;
        let end = stripped[start..]
            .find(')')
            .map(|e| start + e)
            .ok_or("unbalanced parentheses")?;
        let value = number(&stripped[start + 1..end])? * HIGH_J_UNIT;
        Measurement::detection(value, Some(HIGH_J_REL_ERROR * value))
    } else if cell.contains('-') {
        return Ok(None);
    } else if let Some(open) = cell.find('(') {
        let value = number(&cell[..open])? * HIGH_J_UNIT;
        Measurement::detection(value, Some(HIGH_J_REL_ERROR * value))
    } else if cell.contains("^b") {
        Measurement::upper_limit(number(&cell.replace("^b", ""))? * HIGH_J_UNIT)
    } else if cell.contains("^d") {
        return Ok(None);
    } else {
        let value = number(cell)? * HIGH_J_UNIT;
        Measurement::detection(value, Some(HIGH_J_REL_ERROR * value))
    };

    if measurement.value() < 0.0 {
        return Ok(None);
    }
    Ok(Some(measurement))
}
