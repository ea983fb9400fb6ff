//! Exponential atmospheric density model
//!
//! Single scale height anchored at a reference altitude:
//! ρ(h) = ρ_ref × exp(-(h - h_ref) / H)

use super::AtmosphereModel;
use crate::bodies::AtmosphereParams;

/// Exponential atmosphere model
#[derive(Debug, Clone)]
pub struct Exponential {
    /// Density at the reference altitude (kg/km³)
    pub reference_density: f64,

    /// Altitude where `reference_density` holds (km)
    pub reference_altitude: f64,

    /// Scale height (km)
    pub scale_height: f64,

    /// Maximum altitude for non-zero density (km)
    pub max_altitude: f64,
}

impl Default for Exponential {
    fn default() -> Self {
        Self::standard()
    }
}

impl Exponential {
    /// Earth sea-level parameters (1.225 kg/m³, 8.5 km scale height)
    pub fn standard() -> Self {
        Self {
            reference_density: 1.225e9,
            reference_altitude: 0.0,
            scale_height: 8.5,
            max_altitude: 1000.0,
        }
    }

    pub fn new(
        reference_density: f64,
        reference_altitude: f64,
        scale_height: f64,
        max_altitude: f64,
    ) -> Self {
        Self {
            reference_density,
            reference_altitude,
            scale_height,
            max_altitude,
        }
    }

    /// Build from a body's atmosphere description
    pub fn from_params(params: &AtmosphereParams) -> Self {
        Self::new(
            params.reference_density,
            params.reference_altitude,
            params.scale_height,
            params.max_altitude,
        )
    }
}

impl AtmosphereModel for Exponential {
    fn density(&self, altitude: f64) -> f64 {
        if altitude > self.max_altitude || self.scale_height <= 0.0 {
            return 0.0;
        }

        // Below the surface the density is held at its surface value
        let altitude = altitude.max(0.0);
        self.reference_density * (-(altitude - self.reference_altitude) / self.scale_height).exp()
    }

    fn max_altitude(&self) -> f64 {
        self.max_altitude
    }

    fn name(&self) -> &'static str {
        "Exponential"
    }
}
