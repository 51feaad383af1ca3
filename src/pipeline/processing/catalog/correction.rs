use metrics::gauge;
use tracing::{info, warn};

use super::record::{CatalogValue, GalaxyRecord};
use crate::types::{CatalogId, Quantity};

/// Median L_IR(8-1000)[L17] / L_IR(40-120)[K16] over sources with both
/// published values.
pub fn bolometric_factor(records: &[GalaxyRecord]) -> Option<f64> {
    let mut ratios: Vec<f64> = records
        .iter()
        .filter_map(|r| {
            let total = r.value(Quantity::LIR_8_1000, CatalogId::L17).filter(|v| !v.derived)?;
            let far = r.value(Quantity::LIR_40_120, CatalogId::K16).filter(|v| !v.derived)?;
            let (total, far) = (total.measurement.value(), far.measurement.value());
            (total > 0.0 && far > 0.0).then(|| total / far)
        })
        .filter(|x| x.is_finite())
        .collect();
    median(&mut ratios)
}

fn median(xs: &mut [f64]) -> Option<f64> {
    if xs.is_empty() {
        return None;
    }
    xs.sort_by(|a, b| a.total_cmp(b));
    let mid = xs.len() / 2;
    Some(if xs.len() % 2 == 0 {
        (xs[mid - 1] + xs[mid]) / 2.0
    } else {
        xs[mid]
    })
}

/// Give every K16 source a derived K16 L_IR(8-1000). Returns the factor used,
/// or `None` when the L17 and K16 samples do not overlap.
pub fn apply_bolometric_correction(records: &mut [GalaxyRecord]) -> Option<f64> {
    let Some(factor) = bolometric_factor(records) else {
        warn!("No L17/K16 overlap, K16 L_IR(8-1000) not derived");
        return None;
    };
    let note = format!("{:.4} x K16 L_IR(40-120), median L17/K16 ratio", factor);

    let mut derived = 0;
    for record in records.iter_mut() {
        let Some(far) = record.value(Quantity::LIR_40_120, CatalogId::K16).map(|v| v.measurement) else {
            continue;
        };
        record.set_value(
            Quantity::LIR_8_1000,
            CatalogId::K16,
            CatalogValue::derived(far.scaled(factor), note.clone()),
        );
        derived += 1;
    }
    gauge!("logal_bolometric_factor").set(factor);
    info!("Bolometric correction {:.4} applied to {} K16 sources", factor, derived);
    Some(factor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Measurement;

    fn record(id: &str, l17_total: Option<f64>, k16_far: Option<f64>) -> GalaxyRecord {
        let mut r = GalaxyRecord::new(id);
        if let Some(v) = l17_total {
            r.set_value(
                Quantity::LIR_8_1000,
                CatalogId::L17,
                CatalogValue::measured(Measurement::detection(v, None)),
            );
        }
        if let Some(v) = k16_far {
            r.set_value(
                Quantity::LIR_40_120,
                CatalogId::K16,
                CatalogValue::measured(Measurement::detection(v, None)),
            );
        }
        r
    }

    #[test]
    fn test_factor_is_median_of_overlap() {
        let records = vec![
            record("a", Some(2.0), Some(1.0)),
            record("b", Some(3.0), Some(1.0)),
            record("c", Some(10.0), Some(1.0)),
            record("d", Some(5.0), None),
            record("e", None, Some(4.0)),
        ];
        assert_eq!(bolometric_factor(&records), Some(3.0));
        assert_eq!(bolometric_factor(&records[..2]), Some(2.5));
        assert_eq!(bolometric_factor(&records[3..]), None);
    }

    #[test]
    fn test_every_k16_source_gets_derived_value() {
        let mut records = vec![record("a", Some(2.0), Some(1.0)), record("e", None, Some(4.0))];
        assert_eq!(apply_bolometric_correction(&mut records), Some(2.0));
        let derived = records[1].value(Quantity::LIR_8_1000, CatalogId::K16).unwrap();
        assert!(derived.derived);
        assert_eq!(derived.measurement.value(), 8.0);
        assert!(derived.note.as_deref().unwrap().contains("2.0000"));
        // the L17 value is untouched
        assert_eq!(
            records[0].value(Quantity::LIR_8_1000, CatalogId::L17).unwrap().measurement.value(),
            2.0
        );
    }

    #[test]
    fn test_no_overlap_leaves_records_alone() {
        let mut records = vec![record("e", None, Some(4.0))];
        assert_eq!(apply_bolometric_correction(&mut records), None);
        assert!(records[0].value(Quantity::LIR_8_1000, CatalogId::K16).is_none());
    }
}
