//! Two-body conic propagation
//!
//! Universal-variable Kepler propagation (works for every conic) and
//! conversion from classical elements to Cartesian state.

use nalgebra::Vector3;

const MAX_ITERATIONS: usize = 100;

/// Classical orbital elements (km, radians)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrbitalElements {
    pub semi_major_axis: f64,
    pub eccentricity: f64,
    pub inclination: f64,
    /// Longitude of the ascending node
    pub raan: f64,
    pub arg_periapsis: f64,
    /// Mean anomaly at the reference epoch
    pub mean_anomaly: f64,
}

impl OrbitalElements {
    /// Build from angles given in degrees
    pub fn from_degrees(a: f64, e: f64, i: f64, raan: f64, argp: f64, m0: f64) -> Self {
        Self {
            semi_major_axis: a,
            eccentricity: e,
            inclination: i.to_radians(),
            raan: raan.to_radians(),
            arg_periapsis: argp.to_radians(),
            mean_anomaly: m0.to_radians(),
        }
    }

    /// Mean motion (rad/s) for gravitational parameter `mu`
    pub fn mean_motion(&self, mu: f64) -> f64 {
        (mu / self.semi_major_axis.abs().powi(3)).sqrt()
    }
}

/// Stumpff function c2(z) = (1 - cos √z) / z
pub fn stumpff_c2(z: f64) -> f64 {
    if z.abs() < 1e-3 {
        // Series avoids cancellation near the parabola
        0.5 - z / 24.0 + z * z / 720.0 - z * z * z / 40_320.0
    } else if z > 0.0 {
        let s = z.sqrt();
        // 1 - cos u = 2 sin²(u/2)
        2.0 * (s / 2.0).sin().powi(2) / z
    } else {
        let s = (-z).sqrt();
        -2.0 * (s / 2.0).sinh().powi(2) / z
    }
}

/// Stumpff function c3(z) = (√z - sin √z) / √z³
pub fn stumpff_c3(z: f64) -> f64 {
    if z.abs() < 1e-3 {
        1.0 / 6.0 - z / 120.0 + z * z / 5040.0 - z * z * z / 362_880.0
    } else if z > 0.0 {
        let s = z.sqrt();
        (s - s.sin()) / (s * s * s)
    } else {
        let s = (-z).sqrt();
        (s.sinh() - s) / (s * s * s)
    }
}

/// Advance a relative state along its conic by `dt` seconds
///
/// Solves the universal Kepler equation for χ with Newton's method,
/// falling back to bisection whenever a Newton step leaves the bracket.
/// Returns the input unchanged for degenerate input (zero radius or μ).
pub fn propagate_universal(
    position: &Vector3<f64>,
    velocity: &Vector3<f64>,
    mu: f64,
    dt: f64,
) -> (Vector3<f64>, Vector3<f64>) {
    let r0 = position.norm();
    if r0 <= 0.0 || mu <= 0.0 || dt == 0.0 {
        return (*position, *velocity);
    }

    let sqrt_mu = mu.sqrt();
    let vr0 = position.dot(velocity) / r0;
    let alpha = 2.0 / r0 - velocity.norm_squared() / mu;
    let sigma0 = r0 * vr0 / sqrt_mu;

    // F(χ) is monotonic in χ with F'(χ) = r(χ) > 0
    let universal = |chi: f64| -> (f64, f64) {
        let z = alpha * chi * chi;
        let c2 = stumpff_c2(z);
        let c3 = stumpff_c3(z);
        let chi2 = chi * chi;
        let f = sigma0 * chi2 * c2 + (1.0 - alpha * r0) * chi2 * chi * c3 + r0 * chi
            - sqrt_mu * dt;
        let df = sigma0 * chi * (1.0 - z * c3) + (1.0 - alpha * r0) * chi2 * c2 + r0;
        (f, df)
    };

    let chi = solve_monotonic(universal, sqrt_mu * dt / r0);

    let z = alpha * chi * chi;
    let c2 = stumpff_c2(z);
    let c3 = stumpff_c3(z);
    let chi2 = chi * chi;

    let f = 1.0 - chi2 / r0 * c2;
    let g = dt - chi2 * chi * c3 / sqrt_mu;
    let new_position = f * position + g * velocity;
    let r = new_position.norm();

    let f_dot = sqrt_mu / (r * r0) * (alpha * chi2 * chi * c3 - chi);
    let g_dot = 1.0 - chi2 / r * c2;
    let new_velocity = f_dot * position + g_dot * velocity;

    (new_position, new_velocity)
}

/// Root of an increasing function, Newton with a bisection safeguard
fn solve_monotonic(f_and_df: impl Fn(f64) -> (f64, f64), initial_guess: f64) -> f64 {
    // Bracket by doubling outwards from the guess
    let mut radius = initial_guess.abs().max(1e-3);
    let (mut lo, mut hi) = (initial_guess - radius, initial_guess + radius);
    for _ in 0..MAX_ITERATIONS {
        if f_and_df(lo).0 <= 0.0 && f_and_df(hi).0 >= 0.0 {
            break;
        }
        radius *= 2.0;
        lo = initial_guess - radius;
        hi = initial_guess + radius;
    }

    let mut guess = initial_guess.clamp(lo, hi);
    for _ in 0..MAX_ITERATIONS {
        let (f, df) = f_and_df(guess);
        if f == 0.0 {
            return guess;
        }
        if f < 0.0 {
            lo = guess;
        } else {
            hi = guess;
        }

        let newton = guess - f / df;
        let next = if df > 0.0 && newton > lo && newton < hi {
            newton
        } else {
            0.5 * (lo + hi)
        };

        if (next - guess).abs() <= 1e-12 * (1.0 + guess.abs()) {
            return next;
        }
        guess = next;
    }

    log::warn!("Universal Kepler solve hit the iteration limit at chi = {:.6e}", guess);
    guess
}

/// Eccentric anomaly from mean anomaly (elliptical orbits)
pub fn eccentric_anomaly(mean_anomaly: f64, eccentricity: f64) -> f64 {
    let m = mean_anomaly.rem_euclid(std::f64::consts::TAU);
    let mut e_anom = if eccentricity > 0.8 { std::f64::consts::PI } else { m };
    for _ in 0..MAX_ITERATIONS {
        let delta = (e_anom - eccentricity * e_anom.sin() - m) / (1.0 - eccentricity * e_anom.cos());
        e_anom -= delta;
        if delta.abs() < 1e-14 {
            break;
        }
    }
    e_anom
}

/// Cartesian state of an elliptical orbit `dt` seconds after its element epoch
pub fn elements_to_state(
    elements: &OrbitalElements,
    mu: f64,
    dt: f64,
) -> (Vector3<f64>, Vector3<f64>) {
    let a = elements.semi_major_axis;
    let e = elements.eccentricity;
    let n = elements.mean_motion(mu);

    let e_anom = eccentric_anomaly(elements.mean_anomaly + n * dt, e);
    let (sin_e, cos_e) = e_anom.sin_cos();
    let b_ratio = (1.0 - e * e).sqrt();

    // Perifocal frame
    let r = a * (1.0 - e * cos_e);
    let p_pf = Vector3::new(a * (cos_e - e), a * b_ratio * sin_e, 0.0);
    let v_scale = (mu * a).sqrt() / r;
    let v_pf = Vector3::new(-v_scale * sin_e, v_scale * b_ratio * cos_e, 0.0);

    let (so, co) = elements.raan.sin_cos();
    let (sw, cw) = elements.arg_periapsis.sin_cos();
    let (si, ci) = elements.inclination.sin_cos();

    let p_axis = Vector3::new(co * cw - so * sw * ci, so * cw + co * sw * ci, sw * si);
    let q_axis = Vector3::new(-co * sw - so * cw * ci, -so * sw + co * cw * ci, cw * si);

    (
        p_axis * p_pf.x + q_axis * p_pf.y,
        p_axis * v_pf.x + q_axis * v_pf.y,
    )
}
