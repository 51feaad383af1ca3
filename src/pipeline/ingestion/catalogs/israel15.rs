use std::collections::HashMap;
use tracing::{debug, warn};

use super::{delog, index_by_id, to_jansky, TableBuilder};
use crate::constants::MAX_INVERSION_REDSHIFT;
use crate::error::Result;
use crate::pipeline::ingestion::table::{parse_float, Delimiter, TableLine, TableSpec};
use crate::pipeline::ingestion::{CatalogReader, ReadContext};
use crate::types::{CatalogId, CatalogTable, Measurement, Quantity, Transition};

const TABLE_1: TableSpec = TableSpec::new("Israel-et-al-2015-Table-1.txt", 3, Delimiter::Char('&'));

/// Line tables 2-4; table 5 (individual pointings) is not merged
const LINE_TABLES: [TableSpec; 3] = [
    TableSpec::new("Israel-et-al-2015-Table-2.txt", 18, Delimiter::Char('&')),
    TableSpec::new("Israel-et-al-2015-Table-3.txt", 18, Delimiter::Char('&')),
    TableSpec::new("Israel-et-al-2015-Table-4.txt", 19, Delimiter::Char('&')),
];

/// (column, transition, unit in W m^-2, relative error)
const LINE_COLUMNS: [(usize, Transition, f64, f64); 6] = [
    (1, Transition::Co(4), 1e-17, 0.15),
    (2, Transition::Co(7), 1e-17, 0.15),
    (3, Transition::Ci609, 1e-17, 0.15),
    (4, Transition::Ci370, 1e-17, 0.15),
    (5, Transition::Co(2), 1e-19, 0.20),
    (6, Transition::Co13_21, 1e-19, 0.20),
];

/// Israel et al. 2015: distances and L_IR in table 1 (H0 = 73, Om = 0.27), CO and
/// [CI] fluxes in tables 2-4. Redshifts follow from the published distances.
pub struct Israel15Reader;

impl CatalogReader for Israel15Reader {
    fn catalog(&self) -> CatalogId {
        CatalogId::I15
    }

    fn files(&self) -> Vec<&'static str> {
        std::iter::once(TABLE_1.file)
            .chain(LINE_TABLES.iter().map(|t| t.file))
            .collect()
    }

    fn read(&self, ctx: &ReadContext<'_>) -> Result<CatalogTable> {
        let catalog = self.catalog();
        let cosmology = catalog.cosmology();
        let mut builder = TableBuilder::new(catalog);
        let raw = builder.load(ctx, &TABLE_1)?;

        // columns 0, 3, 4, 6: name, V_LSR, D_L, log L_IR
        let mut parsed = Vec::with_capacity(raw.lines.len());
        for line in &raw.lines {
            let values = line.float(4).and_then(|dl| Ok((dl, line.float(6)?)));
            let (distance, log_lir) = match values {
                Ok(v) => v,
                Err(e) => {
                    builder.skip(e);
                    continue;
                }
            };
            let row = ctx
                .row(catalog, line.cell(0).unwrap_or_default(), None, line.line_no)
                .with_attribute("VLSR", line.cell(3).unwrap_or_default())
                .with_attribute("DL", line.cell(4).unwrap_or_default());
            parsed.push((row, distance, log_lir));
        }

        let rows: Vec<_> = parsed.iter().map(|(row, _, _)| row.clone()).collect();
        let kept = builder.filter(ctx, rows);
        let values: HashMap<usize, (f64, f64)> = parsed
            .iter()
            .map(|(row, d, l)| (row.line, (*d, *l)))
            .collect();

        let mut rows = Vec::with_capacity(kept.len());
        for mut row in kept {
            let Some(&(distance, log_lir)) = values.get(&row.line) else { continue };
            row.z = match cosmology.z_at_luminosity_distance(distance, MAX_INVERSION_REDSHIFT) {
                Ok(z) => Some(z),
                Err(e) => {
                    warn!("I15: {}: {}", row.id, e);
                    None
                }
            };
            row.set(
                Quantity::LIR_8_1000,
                ctx.correct(catalog, row.z, Measurement::detection(delog(log_lir), None)),
            );
            rows.push(row);
        }

        let index = index_by_id(&rows);
        for spec in &LINE_TABLES {
            let Some(table) = builder.load_optional(ctx, spec) else { continue };
            for line in &table.lines {
                let Some(name) = line.cell(0) else { continue };
                let id = ctx.identify(catalog, name, None).id;
                let Some(positions) = index.get(&id) else {
                    debug!("I15: {}:{} has no table 1 entry ({})", line.file, line.line_no, id);
                    continue;
                };
                for (transition, m) in line_fluxes(line) {
                    for &i in positions {
                        rows[i].set(Quantity::line(transition), m);
                    }
                }
            }
        }

        Ok(builder.finish(rows))
    }
}

/// Positive fluxes of one line-table row, converted to Jy km/s.
/// Dashes (Unicode minus or em-dash) mark missing entries.
fn line_fluxes(line: &TableLine) -> Vec<(Transition, Measurement)> {
    let mut out = Vec::new();
    for (col, transition, unit, rel_error) in LINE_COLUMNS {
        let Some(cell) = line.cell(col) else { continue };
        if cell.contains('\u{2212}') || cell.contains('\u{2014}') {
            continue;
        }
        let Some(value) = parse_float(cell).map(|v| v * unit) else {
            continue;
        };
        if value <= 0.0 {
            continue;
        }
        if let Some(m) = to_jansky(transition, Measurement::detection(value, Some(rel_error * value))) {
            out.push((transition, m));
        }
    }
    out
}
