use super::TableBuilder;
use crate::error::Result;
use crate::pipeline::ingestion::table::{Delimiter, TableLine, TableSpec};
use crate::pipeline::ingestion::{CatalogReader, ReadContext};
use crate::types::{CatalogId, CatalogTable, Measurement, Quantity, Transition};

const TABLE_1: TableSpec = TableSpec::new("Jiao-et-al-2017.txt", 2, Delimiter::Char('&'));

/// Jiao et al. 2017: CO(1-0) fluxes in Jy km/s with redshifts.
pub struct Jiao17Reader;

impl CatalogReader for Jiao17Reader {
    fn catalog(&self) -> CatalogId {
        CatalogId::J17
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
            let (flux, error, z) = match parse_line(line) {
                Ok(v) => v,
                Err(e) => {
                    builder.skip(e);
                    continue;
                }
            };
            let mut row = ctx.row(catalog, name_cell(line.cell(0).unwrap_or_default()), None, line.line_no);
            row.z = Some(z);
            let measurement = if flux > 0.0 {
                Some(Measurement::detection(flux, error.filter(|e| *e > 0.0)))
            } else if flux < 0.0 {
                Some(Measurement::upper_limit(flux.abs()))
            } else {
                None
            };
            if let Some(m) = measurement {
                row.set(Quantity::line(Transition::co(1)), m);
            }
            rows.push(row);
        }

        let rows = builder.filter(ctx, rows);
        Ok(builder.finish(rows))
    }
}

/// The name column carries trailing notes after a tab
fn name_cell(cell: &str) -> &str {
    cell.split('\t').next().unwrap_or(cell).trim()
}

/// (CO(1-0) flux, its error, z)
fn parse_line(line: &TableLine) -> Result<(f64, Option<f64>, f64)> {
    Ok((line.float(1)?, line.optional_float(2), line.float(3)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_cell_drops_notes() {
        assert_eq!(name_cell("NGC 1068\tSy2"), "NGC 1068");
        assert_eq!(name_cell("Arp 220"), "Arp 220");
    }
}
