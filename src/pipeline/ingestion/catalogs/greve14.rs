use super::{delog, TableBuilder};
use crate::error::Result;
use crate::pipeline::ingestion::table::{Delimiter, TableLine, TableSpec};
use crate::pipeline::ingestion::{CatalogReader, ReadContext};
use crate::types::{CatalogId, CatalogTable, Measurement, Quantity};

const TABLE_1: TableSpec = TableSpec::new("Greve-et-al-2014-table-1.txt", 1, Delimiter::Whitespace);

/// Greve et al. 2014: z, L_IR(50-300) and L_IR(8-1000), published for H0 = 67, Om = 0.315.
pub struct Greve14Reader;

impl CatalogReader for Greve14Reader {
    fn catalog(&self) -> CatalogId {
        CatalogId::G14
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
            let (z, log_50_300, log_8_1000) = match parse_line(line) {
                Ok(v) => v,
                Err(e) => {
                    builder.skip(e);
                    continue;
                }
            };

            let mut row = ctx.row(catalog, line.cell(0).unwrap_or_default(), None, line.line_no);
            row.z = Some(z);
            row.set(
                Quantity::LIR_50_300,
                ctx.correct(catalog, row.z, Measurement::detection(delog(log_50_300), None)),
            );
            row.set(
                Quantity::LIR_8_1000,
                ctx.correct(catalog, row.z, Measurement::detection(delog(log_8_1000), None)),
            );
            rows.push(row);
        }

        let rows = builder.filter(ctx, rows);
        Ok(builder.finish(rows))
    }
}

/// (z, log L_IR(50-300), log L_IR(8-1000))
fn parse_line(line: &TableLine) -> Result<(f64, f64, f64)> {
    Ok((line.float(1)?, line.float(2)?, line.float(3)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::Cosmology;
    use crate::pipeline::ingestion::redshift::NoRedshifts;
    use crate::pipeline::processing::normalize::IdentifierNormalizer;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_read_whitespace_table_and_rescale_to_h0_70() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join(TABLE_1.file),
            "Name z logL50_300 logL8_1000\n\
             NGC0023   0.015\t10.5  11.0\n\
             \n\
             Broken 0.010 x 11.2\n",
        )
        .unwrap();

        let normalizer = IdentifierNormalizer::default();
        let standard = Cosmology::flat(70.0, 0.28);
        let ctx = ReadContext::new(dir.path(), &normalizer, standard, &NoRedshifts);
        let table = Greve14Reader.read(&ctx).unwrap();

        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.skipped_lines, 1);
        assert_eq!(table.files.len(), 1);

        let row = &table.rows[0];
        assert_eq!(row.id, "NGC0023");
        assert_eq!(row.z, Some(0.015));

        let factor = CatalogId::G14.cosmology().luminosity_correction(&standard, 0.015);
        assert!((factor - (67.0_f64 / 70.0).powi(2)).abs() < 1e-2);
        let lir = row.get(Quantity::LIR_8_1000).unwrap().value();
        assert!((lir / (1e11 * factor) - 1.0).abs() < 1e-12);
        let l50 = row.get(Quantity::LIR_50_300).unwrap().value();
        assert!((l50 / (10f64.powf(10.5) * factor) - 1.0).abs() < 1e-12);
    }
}
