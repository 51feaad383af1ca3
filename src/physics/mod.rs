//! Cosmology and unit conversions shared by the catalog readers.

pub mod cosmology;
pub mod units;

pub use cosmology::{Cosmology, SPEED_OF_LIGHT_KMS};
pub use units::{jansky_kms_to_si, si_to_jansky_kms};
