//! Atmospheric density models for drag calculations
//!
//! Density is a function of altitude above a body's equatorial radius.
//! Every body with an atmosphere carries [`AtmosphereParams`], from which an
//! [`Exponential`] model is built on demand.
//!
//! [`AtmosphereParams`]: crate::bodies::AtmosphereParams

mod exponential;

pub use exponential::Exponential;

/// Trait for atmospheric density models
///
/// Implementations must be thread-safe (Send + Sync) to allow
/// parallel propagation of multiple vehicles.
pub trait AtmosphereModel: Send + Sync {
    /// Mass density (kg/km³) at the given altitude (km)
    ///
    /// Returns zero above [`max_altitude`](Self::max_altitude).
    fn density(&self, altitude: f64) -> f64;

    /// Altitude (km) above which the atmosphere is treated as vacuum
    fn max_altitude(&self) -> f64;

    /// Model name for logging and display
    fn name(&self) -> &'static str;
}
