use tracing::{debug, warn};

use super::{delog, index_by_id, to_jansky, TableBuilder, SPIRE_CO_LADDER};
use crate::error::Result;
use crate::pipeline::ingestion::table::{Delimiter, TableLine, TableSpec};
use crate::pipeline::ingestion::{CatalogReader, ReadContext};
use crate::types::{CatalogId, CatalogTable, Measurement, Quantity, Transition};

const TABLE_1: TableSpec = TableSpec::new("Lu-et-al-2017-table-1.txt", 0, Delimiter::Char('&'));
const TABLE_4: TableSpec = TableSpec::new("Lu-et-al-2017-table-4.txt", 0, Delimiter::Char('&'));

const FLUX_UNIT: f64 = 1e-17;
/// Table 4 uses values at or below this as "not observed"
const MISSING_FLAG: f64 = -90.0;

const COL_FLUX: usize = 1;
const COL_ERROR: usize = 14;
const COL_F35: usize = 118;
const COL_F30: usize = 119;
const COL_F17: usize = 120;

/// Beam size an aperture correction refers to
#[derive(Debug, Clone, Copy, PartialEq)]
enum Aperture {
    F35,
    F30,
    F17,
}

/// Table 4 flux columns in order, with the aperture each is corrected for
fn table_4_columns() -> Vec<(Transition, Aperture)> {
    let mut cols: Vec<(Transition, Aperture)> = SPIRE_CO_LADDER
        .iter()
        .map(|&j| {
            let aperture = match j {
                6 => Aperture::F30,
                9.. => Aperture::F17,
                _ => Aperture::F35,
            };
            (Transition::co(j), aperture)
        })
        .collect();
    cols.extend([
        (Transition::Ci609, Aperture::F35),
        (Transition::Ci370, Aperture::F35),
        (Transition::Nii205, Aperture::F17),
    ]);
    cols
}

/// Lu et al. 2017 (GOALS SPIRE FTS): L_IR(8-1000) in table 1, aperture
/// corrected line fluxes in table 4. Redshifts are looked up by name.
pub struct Lu17Reader;

impl CatalogReader for Lu17Reader {
    fn catalog(&self) -> CatalogId {
        CatalogId::L17
    }

    fn files(&self) -> Vec<&'static str> {
        vec![TABLE_1.file, TABLE_4.file]
    }

    fn read(&self, ctx: &ReadContext<'_>) -> Result<CatalogTable> {
        let catalog = self.catalog();
        let mut builder = TableBuilder::new(catalog);
        let raw = builder.load(ctx, &TABLE_1)?;

        // columns 0, 3, 4, 5, 6: name, log L_IR, pair flag, C60, D_L
        let mut rows = Vec::with_capacity(raw.lines.len());
        for line in &raw.lines {
            let Some(name) = line.cell(0).filter(|n| !n.is_empty()) else {
                builder.skip(line.error("missing name"));
                continue;
            };
            let c60 = line.optional_float(5).map(|v| v.to_string()).unwrap_or_default();
            let mut row = ctx
                .row(catalog, name, None, line.line_no)
                .with_attribute("pair", line.cell(4).unwrap_or_default())
                .with_attribute("C60", c60)
                .with_attribute("DL", line.cell(6).unwrap_or_default());
            if let Some(log_lir) = line.optional_float(3) {
                row.set(Quantity::LIR_8_1000, Measurement::detection(delog(log_lir), None));
            } else {
                debug!("L17: {}:{} no L_IR for {}", line.file, line.line_no, row.id);
            }
            rows.push(row);
        }
        let mut rows = builder.filter(ctx, rows);

        for row in &mut rows {
            row.z = ctx.redshifts.resolve_first(&[row.id_raw.as_str(), row.id.as_str()]);
            match row.z {
                Some(z) => {
                    if let Some(m) = row.get(Quantity::LIR_8_1000).copied() {
                        row.set(Quantity::LIR_8_1000, ctx.correct(catalog, Some(z), m));
                    }
                }
                None => warn!("L17: no redshift for {}, L_IR left in the published cosmology", row.id),
            }
        }

        if let Some(table4) = builder.load_optional(ctx, &TABLE_4) {
            let index = index_by_id(&rows);
            let columns = table_4_columns();
            for line in &table4.lines {
                let Some(name) = line.cell(0) else { continue };
                let id = ctx.identify(catalog, name, None).id;
                let Some(positions) = index.get(&id) else {
                    debug!("L17: {}:{} has no table 1 entry ({})", line.file, line.line_no, id);
                    continue;
                };
                for (transition, m) in line_fluxes(line, &columns) {
                    for &i in positions {
                        rows[i].set(Quantity::line(transition), m);
                    }
                }
            }
        }

        Ok(builder.finish(rows))
    }
}

/// Fluxes of one table 4 row, aperture corrected and converted to Jy km/s
fn line_fluxes(line: &TableLine, columns: &[(Transition, Aperture)]) -> Vec<(Transition, Measurement)> {
    let factor = |aperture: Aperture| {
        let col = match aperture {
            Aperture::F35 => COL_F35,
            Aperture::F30 => COL_F30,
            Aperture::F17 => COL_F17,
        };
        line.optional_float(col).filter(|f| f.is_finite() && *f > 0.0)
    };

    let mut out = Vec::new();
    for (k, &(transition, aperture)) in columns.iter().enumerate() {
        let Some(flux) = line.optional_float(COL_FLUX + k) else { continue };
        let measurement = if flux > 0.0 {
            let scale = factor(aperture).map_or(1.0, |f| 1.0 / f);
            let error = line
                .optional_float(COL_ERROR + k)
                .filter(|e| *e > 0.0)
                .map(|e| e * FLUX_UNIT);
            Measurement::detection(flux * scale * FLUX_UNIT, error)
        } else if flux < 0.0 && flux > MISSING_FLAG {
            Measurement::upper_limit(flux.abs() * FLUX_UNIT)
        } else {
            continue;
        };
        if let Some(m) = to_jansky(transition, measurement) {
            out.push((transition, m));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::si_to_jansky_kms;

    fn row_with(fluxes: &[(usize, &str)], apertures: (&str, &str, &str)) -> TableLine {
        let mut cells = vec![String::new(); 121];
        cells[0] = "NGC0001".to_string();
        for &(col, v) in fluxes {
            cells[col] = v.to_string();
        }
        cells[COL_F35] = apertures.0.to_string();
        cells[COL_F30] = apertures.1.to_string();
        cells[COL_F17] = apertures.2.to_string();
        TableLine {
            file: "test",
            line_no: 1,
            cells,
        }
    }

    #[test]
    fn test_aperture_assignment() {
        let cols = table_4_columns();
        assert_eq!(cols.len(), 13);
        assert_eq!(cols[0], (Transition::co(4), Aperture::F35));
        assert_eq!(cols[2], (Transition::co(6), Aperture::F30));
        assert_eq!(cols[4], (Transition::co(8), Aperture::F35));
        assert_eq!(cols[5], (Transition::co(9), Aperture::F17));
        assert_eq!(cols[12], (Transition::Nii205, Aperture::F17));
    }

    #[test]
    fn test_fluxes_detection_limit_and_missing() {
        let cols = table_4_columns();
        // CO(4-3) detected, CO(5-4) limit, CO(6-5) missing flag, CO(4-3) error
        let line = row_with(&[(1, "10.0"), (2, "-3.0"), (3, "-99"), (14, "1.0")], ("0.5", "0.8", "0.9"));
        let fluxes = line_fluxes(&line, &cols);
        assert_eq!(fluxes.len(), 2);

        let expected = si_to_jansky_kms(20.0 * FLUX_UNIT, 461.0407682);
        match fluxes[0] {
            (Transition::Co(4), Measurement::Detection { value, error: Some(_) }) => {
                assert!((value - expected).abs() / expected < 1e-12)
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(fluxes[1], (Transition::Co(5), Measurement::UpperLimit { .. })));
    }

    #[test]
    fn test_bad_aperture_factor_is_ignored() {
        let cols = table_4_columns();
        let line = row_with(&[(1, "10.0")], ("0", "nan", ""));
        let fluxes = line_fluxes(&line, &cols);
        let expected = si_to_jansky_kms(10.0 * FLUX_UNIT, 461.0407682);
        assert!((fluxes[0].1.value() - expected).abs() / expected < 1e-12);
    }
}
