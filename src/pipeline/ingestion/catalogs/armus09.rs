use tracing::warn;

use super::{delog, TableBuilder};
use crate::error::Result;
use crate::pipeline::ingestion::table::{parse_float, strip_latex, Delimiter, TableSpec};
use crate::pipeline::ingestion::{CatalogReader, ReadContext};
use crate::types::{CatalogId, CatalogTable, Measurement, Quantity};

const TABLE_1: TableSpec = TableSpec::new("Armus-et-al-2009-table-1.txt", 33, Delimiter::Char('&'));

const COL_ID: usize = 0;
const COL_ALT: usize = 1;
const COL_LOG_LIR: usize = 6;

/// GOALS sample (Armus et al. 2009): IRAS names, common names and L_IR(8-1000).
/// Redshifts are looked up by name.
pub struct Armus09Reader;

impl CatalogReader for Armus09Reader {
    fn catalog(&self) -> CatalogId {
        CatalogId::A09
    }

    fn files(&self) -> Vec<&'static str> {
        vec![TABLE_1.file]
    }

    fn read(&self, ctx: &ReadContext<'_>) -> Result<CatalogTable> {
        let catalog = self.catalog();
        let mut builder = TableBuilder::new(catalog);
        let raw = builder.load(ctx, &TABLE_1)?;

        let mut rows = Vec::with_capacity(raw.lines.len());
        for line in &raw.lines {
            let parsed = line.required(COL_LOG_LIR).and_then(|cell| {
                parse_float(&strip_latex(cell))
                    .ok_or_else(|| line.error(format!("bad log L_IR '{}'", cell)))
            });
            let log_lir = match parsed {
                Ok(v) => v,
                Err(e) => {
                    builder.skip(e);
                    continue;
                }
            };
            let id_raw = line.cell(COL_ID).unwrap_or_default();
            let mut row = ctx.row(catalog, id_raw, line.cell(COL_ALT), line.line_no);
            row.set(Quantity::LIR_8_1000, Measurement::detection(delog(log_lir), None));
            rows.push(row);
        }

        let mut rows = builder.filter(ctx, rows);
        for row in &mut rows {
            row.z = ctx.redshifts.resolve_first(&[row.id_raw.as_str(), row.id.as_str()]);
            match row.z {
                Some(_) => {
                    if let Some(m) = row.get(Quantity::LIR_8_1000).copied() {
                        row.set(Quantity::LIR_8_1000, ctx.correct(catalog, row.z, m));
                    }
                }
                None => warn!("A09: no redshift for {}, L_IR left uncorrected", row.id),
            }
        }

        Ok(builder.finish(rows))
    }
}
