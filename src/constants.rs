/// Catalog code constants to ensure consistency across the codebase.
/// Codes are what the CLI and config accept; labels are what reports print.

// Catalog codes (used in CLI, config and storage)
pub const ARMUS_09: &str = "A09";
pub const GREVE_14: &str = "G14";
pub const ROSENBERG_15: &str = "R15";
pub const ISRAEL_15: &str = "I15";
pub const KAMENETZKY_16: &str = "K16";
pub const LU_17: &str = "L17";
pub const JIAO_17: &str = "J17";

// Publication labels
pub const ARMUS_09_LABEL: &str = "Armus+09";
pub const GREVE_14_LABEL: &str = "Greve+14";
pub const ROSENBERG_15_LABEL: &str = "Rosenberg+15";
pub const ISRAEL_15_LABEL: &str = "Israel+15";
pub const KAMENETZKY_16_LABEL: &str = "Kamenetzky+16";
pub const LU_17_LABEL: &str = "Lu+17";
pub const JIAO_17_LABEL: &str = "Jiao+17";

/// Order in which catalogs introduce sources to the master list
pub const DEFAULT_CROSSMATCH_ORDER: [&str; 7] = [
    KAMENETZKY_16,
    LU_17,
    ROSENBERG_15,
    GREVE_14,
    ARMUS_09,
    ISRAEL_15,
    JIAO_17,
];

/// Master value priority, highest first
pub const DEFAULT_PRIORITY: [&str; 7] = [
    JIAO_17,
    LU_17,
    KAMENETZKY_16,
    ROSENBERG_15,
    GREVE_14,
    ISRAEL_15,
    ARMUS_09,
];

/// Sources resolved into several pointings or too large for a single beam.
/// Any row whose ID or alternate ID contains one of these is dropped.
pub const DEFAULT_EXTENDED_SOURCES: [&str; 17] = [
    "Arp299",
    "NGC2146",
    "NGC1365",
    "NGC3690",
    "UGC06471",
    "Arp299B",
    "IC694",
    "UGC06742",
    "NGC3690A",
    "Arp299A",
    "NGC4038",
    "NGC4038overlap",
    "NGC5010",
    "IRAS05223+1908",
    "MilkyWay",
    "SgrA*",
    "NGC3256",
];

/// K16 lists a handful of negative (blueshifted) redshifts; they are replaced by this.
pub const K16_MIN_REDSHIFT: f64 = 0.0023;

/// Upper bound for redshift inversion from a luminosity distance
pub const MAX_INVERSION_REDSHIFT: f64 = 1.0;

pub const NED_OBJECT_LOOKUP_URL: &str = "https://ned.ipac.caltech.edu/srs/ObjectLookup";

/// Convert a user supplied code (any case) to its canonical form
pub fn normalize_catalog_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

