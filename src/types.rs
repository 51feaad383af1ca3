use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::constants;
use crate::error::LogalError;
use crate::physics::Cosmology;

/// One of the supported published catalogs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CatalogId {
    A09,
    G14,
    R15,
    I15,
    K16,
    L17,
    J17,
}

impl CatalogId {
    pub const ALL: [CatalogId; 7] = [
        CatalogId::A09,
        CatalogId::G14,
        CatalogId::R15,
        CatalogId::I15,
        CatalogId::K16,
        CatalogId::L17,
        CatalogId::J17,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            CatalogId::A09 => constants::ARMUS_09,
            CatalogId::G14 => constants::GREVE_14,
            CatalogId::R15 => constants::ROSENBERG_15,
            CatalogId::I15 => constants::ISRAEL_15,
            CatalogId::K16 => constants::KAMENETZKY_16,
            CatalogId::L17 => constants::LU_17,
            CatalogId::J17 => constants::JIAO_17,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CatalogId::A09 => constants::ARMUS_09_LABEL,
            CatalogId::G14 => constants::GREVE_14_LABEL,
            CatalogId::R15 => constants::ROSENBERG_15_LABEL,
            CatalogId::I15 => constants::ISRAEL_15_LABEL,
            CatalogId::K16 => constants::KAMENETZKY_16_LABEL,
            CatalogId::L17 => constants::LU_17_LABEL,
            CatalogId::J17 => constants::JIAO_17_LABEL,
        }
    }

    /// Cosmology the catalog's luminosities were published in
    pub fn cosmology(&self) -> Cosmology {
        match self {
            CatalogId::A09 | CatalogId::R15 | CatalogId::K16 => Cosmology::flat(70.0, 0.28),
            CatalogId::G14 => Cosmology::flat(67.0, 0.315),
            CatalogId::I15 => Cosmology::flat(73.0, 0.27),
            CatalogId::L17 | CatalogId::J17 => Cosmology::flat(70.0, 0.3),
        }
    }

    /// Catalogs whose alternate name is the common name, used to key new master entries
    pub fn keys_on_alternate(&self) -> bool {
        matches!(self, CatalogId::A09 | CatalogId::I15 | CatalogId::J17)
    }

    /// Catalogs whose rows carry an alternate identifier column
    pub fn has_alternate(&self) -> bool {
        self.keys_on_alternate()
    }

    /// K16 lists one row per pointing and is never de-duplicated
    pub fn deduplicates(&self) -> bool {
        !matches!(self, CatalogId::K16)
    }
}

impl fmt::Display for CatalogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for CatalogId {
    type Err = LogalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = constants::normalize_catalog_code(s);
        CatalogId::ALL
            .iter()
            .copied()
            .find(|c| c.code() == code)
            .ok_or_else(|| LogalError::UnknownCatalog(s.to_string()))
    }
}

/// Parse a comma separated list of catalog codes
pub fn parse_catalog_list(list: &str) -> Result<Vec<CatalogId>, LogalError> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(CatalogId::from_str)
        .collect()
}

/// Spectral line transitions carried by the catalogs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Transition {
    /// 12CO(J -> J-1), J = upper level
    Co(u8),
    Co13_21,
    Ci609,
    Ci370,
    Nii205,
    Oi63,
    Oi145,
    Cii158,
}

impl Transition {
    pub fn co(upper: u8) -> Transition {
        Transition::Co(upper)
    }

    /// Rest frequency in GHz
    pub fn rest_frequency_ghz(&self) -> Option<f64> {
        let f = match self {
            Transition::Co(1) => 115.2712018,
            Transition::Co(2) => 230.538,
            Transition::Co(3) => 345.7959899,
            Transition::Co(4) => 461.0407682,
            Transition::Co(5) => 576.2679305,
            Transition::Co(6) => 691.4730763,
            Transition::Co(7) => 806.651806,
            Transition::Co(8) => 921.7997,
            Transition::Co(9) => 1036.912393,
            Transition::Co(10) => 1151.985452,
            Transition::Co(11) => 1267.014486,
            Transition::Co(12) => 1381.995105,
            Transition::Co(13) => 1496.922909,
            Transition::Co(_) => return None,
            Transition::Co13_21 => 220.3986842,
            Transition::Ci609 => 492.160651,
            Transition::Ci370 => 809.34197,
            Transition::Nii205 => 1461.13141,
            Transition::Oi63 => 4744.77749,
            Transition::Oi145 => 2060.06909,
            Transition::Cii158 => 1900.5369,
        };
        Some(f)
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transition::Co(j) => write!(f, "12CO({}-{})", j, j.saturating_sub(1)),
            Transition::Co13_21 => f.write_str("13CO(2-1)"),
            Transition::Ci609 => f.write_str("[CI]609"),
            Transition::Ci370 => f.write_str("[CI]370"),
            Transition::Nii205 => f.write_str("[NII]205"),
            Transition::Oi63 => f.write_str("[OI]63"),
            Transition::Oi145 => f.write_str("[OI]145"),
            Transition::Cii158 => f.write_str("[CII]158"),
        }
    }
}

impl FromStr for Transition {
    type Err = LogalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let t = match s {
            "13CO(2-1)" => Transition::Co13_21,
            "[CI]609" => Transition::Ci609,
            "[CI]370" => Transition::Ci370,
            "[NII]205" => Transition::Nii205,
            "[OI]63" => Transition::Oi63,
            "[OI]145" => Transition::Oi145,
            "[CII]158" => Transition::Cii158,
            other => {
                let inner = other
                    .strip_prefix("12CO(")
                    .and_then(|rest| rest.strip_suffix(')'))
                    .ok_or_else(|| LogalError::UnknownQuantity(other.to_string()))?;
                let (upper, lower) = inner
                    .split_once('-')
                    .ok_or_else(|| LogalError::UnknownQuantity(other.to_string()))?;
                let upper: u8 = upper
                    .parse()
                    .map_err(|_| LogalError::UnknownQuantity(other.to_string()))?;
                let lower: u8 = lower
                    .parse()
                    .map_err(|_| LogalError::UnknownQuantity(other.to_string()))?;
                if lower.checked_add(1) != Some(upper) {
                    return Err(LogalError::UnknownQuantity(other.to_string()));
                }
                Transition::Co(upper)
            }
        };
        Ok(t)
    }
}

impl From<Transition> for String {
    fn from(t: Transition) -> Self {
        t.to_string()
    }
}

impl TryFrom<String> for Transition {
    type Error = LogalError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Infrared luminosity integration windows (microns)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LuminosityBand {
    Ir8To1000,
    Ir40To120,
    Ir50To300,
}

impl LuminosityBand {
    pub fn key(&self) -> &'static str {
        match self {
            LuminosityBand::Ir8To1000 => "LIR_8_1000",
            LuminosityBand::Ir40To120 => "LIR_40_120",
            LuminosityBand::Ir50To300 => "LIR_50_300",
        }
    }
}

/// A physical quantity a record can hold. Luminosities are in L_sun,
/// line fluxes in Jy km/s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Quantity {
    Luminosity(LuminosityBand),
    LineFlux(Transition),
}

impl Quantity {
    pub const LIR_8_1000: Quantity = Quantity::Luminosity(LuminosityBand::Ir8To1000);
    pub const LIR_40_120: Quantity = Quantity::Luminosity(LuminosityBand::Ir40To120);
    pub const LIR_50_300: Quantity = Quantity::Luminosity(LuminosityBand::Ir50To300);

    pub fn line(t: Transition) -> Quantity {
        Quantity::LineFlux(t)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Quantity::Luminosity(band) => f.write_str(band.key()),
            Quantity::LineFlux(t) => write!(f, "{}", t),
        }
    }
}

impl FromStr for Quantity {
    type Err = LogalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "LIR_8_1000" => Ok(Quantity::LIR_8_1000),
            "LIR_40_120" => Ok(Quantity::LIR_40_120),
            "LIR_50_300" => Ok(Quantity::LIR_50_300),
            other => other.parse::<Transition>().map(Quantity::LineFlux),
        }
    }
}

impl From<Quantity> for String {
    fn from(q: Quantity) -> Self {
        q.to_string()
    }
}

impl TryFrom<String> for Quantity {
    type Error = LogalError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A single catalog's statement about a quantity
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Measurement {
    Detection { value: f64, error: Option<f64> },
    /// 3-sigma upper limit
    UpperLimit { value: f64 },
}

impl Measurement {
    pub fn detection(value: f64, error: Option<f64>) -> Self {
        Measurement::Detection { value, error }
    }

    pub fn upper_limit(value: f64) -> Self {
        Measurement::UpperLimit { value }
    }

    pub fn value(&self) -> f64 {
        match self {
            Measurement::Detection { value, .. } | Measurement::UpperLimit { value } => *value,
        }
    }

    /// Apply a multiplicative factor to value and error alike
    pub fn scaled(&self, factor: f64) -> Measurement {
        match *self {
            Measurement::Detection { value, error } => Measurement::Detection {
                value: value * factor,
                error: error.map(|e| e * factor),
            },
            Measurement::UpperLimit { value } => Measurement::UpperLimit {
                value: value * factor,
            },
        }
    }
}

/// SHA-256 fingerprint of a raw input file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFingerprint {
    pub name: String,
    pub sha256: String,
    pub bytes: u64,
}

/// One normalized row from a catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRow {
    pub catalog: CatalogId,
    pub id_raw: String,
    pub alt_raw: Option<String>,
    pub id: String,
    pub alt: Option<String>,
    pub z: Option<f64>,
    pub measurements: Vec<(Quantity, Measurement)>,
    /// Catalog specific columns kept verbatim (AGN/SB class, pair flag, ...)
    pub attributes: BTreeMap<String, String>,
    /// 1-based line number in the primary table
    pub line: usize,
}

impl SourceRow {
    pub fn new(catalog: CatalogId, id_raw: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            catalog,
            id_raw: id_raw.into(),
            alt_raw: None,
            id: id.into(),
            alt: None,
            z: None,
            measurements: Vec::new(),
            attributes: BTreeMap::new(),
            line: 0,
        }
    }

    /// All names this row is known under
    pub fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.id.as_str()).chain(self.alt.as_deref().filter(|a| !a.is_empty()))
    }

    /// Set a measurement, replacing any earlier value for the same quantity
    pub fn set(&mut self, quantity: Quantity, measurement: Measurement) {
        if let Some(slot) = self.measurements.iter_mut().find(|(q, _)| *q == quantity) {
            slot.1 = measurement;
        } else {
            self.measurements.push((quantity, measurement));
        }
    }

    pub fn get(&self, quantity: Quantity) -> Option<&Measurement> {
        self.measurements
            .iter()
            .find(|(q, _)| *q == quantity)
            .map(|(_, m)| m)
    }

    pub fn with_attribute(mut self, key: &str, value: impl Into<String>) -> Self {
        let value = value.into();
        if !value.is_empty() {
            self.attributes.insert(key.to_string(), value);
        }
        self
    }
}

/// Everything read from one catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogTable {
    pub catalog: CatalogId,
    pub rows: Vec<SourceRow>,
    pub files: Vec<FileFingerprint>,
    pub skipped_lines: usize,
    pub dropped_extended: usize,
    pub dropped_duplicates: usize,
}

impl CatalogTable {
    pub fn new(catalog: CatalogId) -> Self {
        Self {
            catalog,
            rows: Vec::new(),
            files: Vec::new(),
            skipped_lines: 0,
            dropped_extended: 0,
            dropped_duplicates: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_codes_parse_case_insensitively() {
        assert_eq!("k16".parse::<CatalogId>().unwrap(), CatalogId::K16);
        assert!("X99".parse::<CatalogId>().is_err());
        assert_eq!(
            parse_catalog_list("A09, g14,,J17").unwrap(),
            vec![CatalogId::A09, CatalogId::G14, CatalogId::J17]
        );
    }

    #[test]
    fn test_quantity_labels() {
        assert_eq!(Quantity::line(Transition::co(10)).to_string(), "12CO(10-9)");
        assert_eq!("12CO(13-12)".parse::<Quantity>().unwrap(), Quantity::line(Transition::co(13)));
        assert_eq!("LIR_40_120".parse::<Quantity>().unwrap(), Quantity::LIR_40_120);
        assert_eq!("[NII]205".parse::<Quantity>().unwrap(), Quantity::line(Transition::Nii205));
        assert!("12CO(3-1)".parse::<Quantity>().is_err());
    }

    #[test]
    fn test_quantity_serializes_as_map_key() {
        let mut map = BTreeMap::new();
        map.insert(Quantity::line(Transition::Ci609), 1.0);
        map.insert(Quantity::LIR_8_1000, 2.0);
        let json = serde_json::to_string(&map).unwrap();
        assert!(json.contains("\"[CI]609\""));
        let back: BTreeMap<Quantity, f64> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, map);
    }

    #[test]
    fn test_row_set_replaces_existing_quantity() {
        let mut row = SourceRow::new(CatalogId::I15, "NGC253", "NGC253");
        row.set(Quantity::LIR_8_1000, Measurement::detection(1.0, None));
        row.set(Quantity::LIR_8_1000, Measurement::upper_limit(2.0));
        assert_eq!(row.measurements.len(), 1);
        assert_eq!(row.get(Quantity::LIR_8_1000), Some(&Measurement::upper_limit(2.0)));
    }
}
