use super::cosmology::SPEED_OF_LIGHT_KMS;

const JANSKY_SI: f64 = 1e-26;

/// Velocity-integrated line flux: W m^-2 to Jy km/s at the given rest frequency.
pub fn si_to_jansky_kms(flux_w_m2: f64, rest_frequency_ghz: f64) -> f64 {
    flux_w_m2 * SPEED_OF_LIGHT_KMS / (JANSKY_SI * rest_frequency_ghz * 1e9)
}

/// Inverse of [`si_to_jansky_kms`].
pub fn jansky_kms_to_si(flux_jy_kms: f64, rest_frequency_ghz: f64) -> f64 {
    flux_jy_kms * JANSKY_SI * rest_frequency_ghz * 1e9 / SPEED_OF_LIGHT_KMS
}
