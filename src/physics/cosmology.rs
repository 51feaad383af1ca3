use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{LogalError, Result};

/// Speed of light in km/s
pub const SPEED_OF_LIGHT_KMS: f64 = 299_792.458;

// Simpson panels per unit redshift; local galaxies sit well below z = 0.1
const PANELS_PER_UNIT_Z: f64 = 2000.0;
const MIN_PANELS: usize = 64;

const BISECTION_TOLERANCE: f64 = 1e-10;
const BISECTION_MAX_ITER: usize = 200;

/// A flat Lambda-CDM cosmology (Omega_k = 0).
///
/// The CMB radiation term (Tcmb0) is left out of E(z); below z = 0.1 it moves
/// luminosity distances by far less than the catalog uncertainties.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Cosmology {
    /// Hubble constant in km/s/Mpc
    pub h0: f64,
    /// Matter density parameter
    pub omega_m: f64,
}

impl Cosmology {
    pub const fn flat(h0: f64, omega_m: f64) -> Self {
        Self { h0, omega_m }
    }

    pub fn omega_lambda(&self) -> f64 {
        1.0 - self.omega_m
    }

    /// c / H0 in Mpc
    pub fn hubble_distance(&self) -> f64 {
        SPEED_OF_LIGHT_KMS / self.h0
    }

    fn inv_efunc(&self, z: f64) -> f64 {
        let zp1 = 1.0 + z;
        1.0 / (self.omega_m * zp1 * zp1 * zp1 + self.omega_lambda()).sqrt()
    }

    /// Line-of-sight comoving distance in Mpc
    pub fn comoving_distance(&self, z: f64) -> f64 {
        if z <= 0.0 {
            return 0.0;
        }
        let mut n = ((z * PANELS_PER_UNIT_Z).ceil() as usize).max(MIN_PANELS);
        if n % 2 == 1 {
            n += 1;
        }
        let h = z / n as f64;
        let mut sum = self.inv_efunc(0.0) + self.inv_efunc(z);
        for i in 1..n {
            let weight = if i % 2 == 1 { 4.0 } else { 2.0 };
            sum += weight * self.inv_efunc(i as f64 * h);
        }
        self.hubble_distance() * sum * h / 3.0
    }

    /// Luminosity distance in Mpc
    pub fn luminosity_distance(&self, z: f64) -> f64 {
        (1.0 + z) * self.comoving_distance(z)
    }

    /// Invert the luminosity distance by bisection on (0, z_max].
    pub fn z_at_luminosity_distance(&self, distance_mpc: f64, z_max: f64) -> Result<f64> {
        if !distance_mpc.is_finite() || distance_mpc < 0.0 {
            return Err(LogalError::Cosmology(format!(
                "luminosity distance must be a non-negative number, got {}",
                distance_mpc
            )));
        }
        if distance_mpc == 0.0 {
            return Ok(0.0);
        }
        let d_max = self.luminosity_distance(z_max);
        if distance_mpc > d_max {
            return Err(LogalError::Cosmology(format!(
                "D_L = {:.3} Mpc lies beyond z = {} ({:.3} Mpc)",
                distance_mpc, z_max, d_max
            )));
        }

        let (mut lo, mut hi) = (0.0_f64, z_max);
        for _ in 0..BISECTION_MAX_ITER {
            let mid = 0.5 * (lo + hi);
            if self.luminosity_distance(mid) < distance_mpc {
                lo = mid;
            } else {
                hi = mid;
            }
            if hi - lo < BISECTION_TOLERANCE {
                break;
            }
        }
        Ok(0.5 * (lo + hi))
    }

    /// Factor that rescales a luminosity published in this cosmology to `target`:
    /// (D_L,target(z) / D_L,self(z))^2. At z <= 0 the low-redshift limit
    /// (H0,self / H0,target)^2 is returned.
    pub fn luminosity_correction(&self, target: &Cosmology, z: f64) -> f64 {
        if self == target {
            return 1.0;
        }
        if z <= 0.0 {
            let ratio = self.h0 / target.h0;
            return ratio * ratio;
        }
        let ratio = target.luminosity_distance(z) / self.luminosity_distance(z);
        ratio * ratio
    }
}

impl fmt::Display for Cosmology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(H0, OmegaL, OmegaM) = ({}, {:.3}, {:.3})",
            self.h0,
            self.omega_lambda(),
            self.omega_m
        )
    }
}
