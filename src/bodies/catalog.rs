//! Built-in solar system catalog with a Keplerian fallback ephemeris
//!
//! Bodies are keyed by NAIF id. Planets and moons hang off their system
//! barycenter. Each barycenter follows its heliocentric conic, and moons
//! follow conics about their planet; the planet is then offset so the
//! subsystem's centre of mass sits on the barycenter. This is the
//! ephemeris used when no external source streams body states.
//!
//! Frame: ecliptic J2000, km and km/s. Poles are authored as equatorial
//! right ascension / declination and rotated into the ecliptic.

use super::kepler::{elements_to_state, OrbitalElements};
use super::{AtmosphereParams, Body, BodyId, EphemerisSnapshot, RotationParams};
use crate::error::{EngineError, Result};
use nalgebra::Vector3;
use satkit::Instant;

pub const SECONDS_PER_DAY: f64 = 86_400.0;
const DAYS_PER_CENTURY: f64 = 36_525.0;

/// Mean obliquity of the ecliptic at J2000 (degrees)
const OBLIQUITY_J2000_DEG: f64 = 23.439_291_1;

/// Days from J2000 (2000-01-01 12:00) to the catalog epoch 2025-05-11 00:00
const DEFAULT_EPOCH_J2000_DAYS: f64 = 9_261.5;

/// Earth drag cutoff altitude (km)
pub const DEFAULT_DRAG_CUTOFF_KM: f64 = 500.0;

/// IAU-style pole and prime-meridian rates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoleModel {
    /// Right ascension: degrees, degrees per century
    pub ra: [f64; 2],
    /// Declination: degrees, degrees per century
    pub dec: [f64; 2],
    /// Prime meridian rate (degrees per day)
    pub rotation_rate: f64,
}

/// Canonical conic: a (km), e, i, Ω, ω, M0 (degrees) at the catalog epoch
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CanonicalOrbit(pub [f64; 6]);

impl CanonicalOrbit {
    pub fn elements(&self) -> OrbitalElements {
        let [a, e, i, raan, argp, m0] = self.0;
        OrbitalElements::from_degrees(a, e, i, raan, argp, m0)
    }
}

/// One catalog row
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    pub id: u32,
    pub name: &'static str,
    pub parent: Option<u32>,
    pub gm: f64,
    pub radius: f64,
    pub j2: Option<f64>,
    pub pole: Option<PoleModel>,
    pub atmosphere: Option<AtmosphereParams>,
    pub orbit: Option<CanonicalOrbit>,
}

const fn entry(id: u32, name: &'static str, parent: Option<u32>, gm: f64, radius: f64) -> CatalogEntry {
    CatalogEntry {
        id,
        name,
        parent,
        gm,
        radius,
        j2: None,
        pole: None,
        atmosphere: None,
        orbit: None,
    }
}

const fn pole(ra: [f64; 2], dec: [f64; 2], rotation_rate: f64) -> Option<PoleModel> {
    Some(PoleModel {
        ra,
        dec,
        rotation_rate,
    })
}

const fn orbit(a: f64, e: f64, i: f64, raan: f64, argp: f64, m0: f64) -> Option<CanonicalOrbit> {
    Some(CanonicalOrbit([a, e, i, raan, argp, m0]))
}

const fn atmosphere(density: f64, reference: f64, scale: f64, max: f64) -> Option<AtmosphereParams> {
    Some(AtmosphereParams {
        reference_density: density,
        reference_altitude: reference,
        scale_height: scale,
        max_altitude: max,
    })
}

fn builtin_entries() -> Vec<CatalogEntry> {
    let ssb = Some(0);
    vec![
        entry(0, "Solar System Barycenter", None, 0.0, 0.0),
        CatalogEntry {
            pole: pole([286.13, 0.0], [63.87, 0.0], 14.1844),
            ..entry(10, "Sun", ssb, 1.327_124_400_18e11, 695_700.0)
        },
        // Planetary barycenters carry the heliocentric conic of each system
        CatalogEntry {
            orbit: orbit(57_909_050.0, 0.2056, 7.005, 48.331, 29.124, 174.796),
            ..entry(1, "Mercury Barycenter", ssb, 0.0, 0.0)
        },
        CatalogEntry {
            orbit: orbit(108_208_000.0, 0.0067, 3.3947, 76.680, 54.884, 50.416),
            ..entry(2, "Venus Barycenter", ssb, 0.0, 0.0)
        },
        CatalogEntry {
            orbit: orbit(149_598_023.0, 0.0167, 0.0, -11.26064, 114.20783, 358.617),
            ..entry(3, "Earth Barycenter", ssb, 0.0, 0.0)
        },
        CatalogEntry {
            orbit: orbit(227_939_200.0, 0.0935, 1.85, 49.558, 286.502, 19.373),
            ..entry(4, "Mars Barycenter", ssb, 0.0, 0.0)
        },
        CatalogEntry {
            orbit: orbit(778_570_000.0, 0.0489, 1.303, 100.464, 273.867, 20.020),
            ..entry(5, "Jupiter Barycenter", ssb, 0.0, 0.0)
        },
        CatalogEntry {
            orbit: orbit(1_433_530_000.0, 0.0565, 2.485, 113.665, 339.392, 317.020),
            ..entry(6, "Saturn Barycenter", ssb, 0.0, 0.0)
        },
        CatalogEntry {
            orbit: orbit(2_875_040_000.0, 0.0463, 0.773, 74.006, 96.998, 142.2386),
            ..entry(7, "Uranus Barycenter", ssb, 0.0, 0.0)
        },
        CatalogEntry {
            orbit: orbit(4_504_450_000.0, 0.0097, 1.770, 131.784, 273.187, 256.228),
            ..entry(8, "Neptune Barycenter", ssb, 0.0, 0.0)
        },
        CatalogEntry {
            orbit: orbit(5_906_440_628.0, 0.2488, 17.16, 110.299, 113.834, 14.53),
            ..entry(9, "Pluto System Barycenter", ssb, 0.0, 0.0)
        },
        // Planets
        CatalogEntry {
            j2: Some(6.0e-5),
            pole: pole([281.0103, -0.0328], [61.4155, -0.0049], 6.1385108),
            orbit: orbit(57_909_050.0, 0.2056, 7.005, 48.331, 29.124, 174.796),
            ..entry(199, "Mercury", Some(1), 22_031.868_55, 2_439.7)
        },
        CatalogEntry {
            j2: Some(4.458e-6),
            pole: pole([272.76, 0.0], [67.16, 0.0], -1.4813688),
            atmosphere: atmosphere(6.5e10, 0.0, 15.9, 250.0),
            orbit: orbit(108_208_000.0, 0.0067, 3.3947, 76.680, 54.884, 50.416),
            ..entry(299, "Venus", Some(2), 324_858.592, 6_051.8)
        },
        CatalogEntry {
            j2: Some(1.082_626_68e-3),
            pole: pole([0.0, -0.641], [90.0, -0.557], 360.985_623_5),
            atmosphere: atmosphere(0.25, 200.0, 37.5, DEFAULT_DRAG_CUTOFF_KM),
            orbit: orbit(149_598_023.0, 0.0167, 0.0, -11.26064, 114.20783, 358.617),
            ..entry(399, "Earth", Some(3), 398_600.435_507, 6_378.1366)
        },
        CatalogEntry {
            j2: Some(1.960_45e-3),
            pole: pole([317.269_202, -0.109_275_47], [54.432_516, -0.058_271_05], 350.891_982_443),
            atmosphere: atmosphere(2.0e7, 0.0, 11.1, 200.0),
            orbit: orbit(227_939_200.0, 0.0935, 1.85, 49.558, 286.502, 19.373),
            ..entry(499, "Mars", Some(4), 42_828.375_214, 3_396.19)
        },
        CatalogEntry {
            j2: Some(0.014_696),
            pole: pole([268.056_595, -0.006_499], [64.495_303, 0.002_413], 870.536),
            orbit: orbit(778_570_000.0, 0.0489, 1.303, 100.464, 273.867, 20.020),
            ..entry(599, "Jupiter", Some(5), 126_686_531.9, 71_492.0)
        },
        CatalogEntry {
            j2: Some(0.016_298),
            pole: pole([40.589, -0.036], [83.537, -0.004], 810.793_902_4),
            orbit: orbit(1_433_530_000.0, 0.0565, 2.485, 113.665, 339.392, 317.020),
            ..entry(699, "Saturn", Some(6), 37_931_207.8, 60_268.0)
        },
        CatalogEntry {
            j2: Some(3.343_43e-3),
            pole: pole([257.311, 0.0], [-15.175, 0.0], -501.160_092_8),
            orbit: orbit(2_875_040_000.0, 0.0463, 0.773, 74.006, 96.998, 142.2386),
            ..entry(799, "Uranus", Some(7), 5_793_951.3, 25_559.0)
        },
        CatalogEntry {
            j2: Some(3.411e-3),
            pole: pole([299.36, 0.0], [43.46, 0.0], 541.139_775_7),
            orbit: orbit(4_504_450_000.0, 0.0097, 1.770, 131.784, 273.187, 256.228),
            ..entry(899, "Neptune", Some(8), 6_835_103.1, 24_764.0)
        },
        CatalogEntry {
            pole: pole([132.993, 0.0], [-6.163, 0.0], -56.362_522_5),
            orbit: orbit(5_906_440_628.0, 0.2488, 17.16, 110.299, 113.834, 14.53),
            ..entry(999, "Pluto", Some(9), 869.613_817, 1_188.3)
        },
        // Moons
        CatalogEntry {
            j2: Some(2.032e-4),
            pole: pole([269.9949, 0.0031], [66.5392, 0.0130], 13.176_358_15),
            orbit: orbit(384_400.0, 0.0549, 5.145, 125.08, 318.15, 115.3654),
            ..entry(301, "Moon", Some(3), 4_902.800_066, 1_737.4)
        },
        CatalogEntry {
            pole: pole([317.670_716_57, -0.108_443_26], [52.886_272_66, -0.061_347_06], 1_128.844_759_28),
            orbit: orbit(9_376.0, 0.0151, 1.075, 49.2, 150.057, 177.4),
            ..entry(401, "Phobos", Some(4), 7.112e-4, 11.08)
        },
        CatalogEntry {
            pole: pole([316.657_058_08, -0.105_180_14], [53.509_920_33, -0.059_790_94], 285.161_888_99),
            orbit: orbit(23_463.2, 0.00033, 1.788, 316.65, 260.729, 53.2),
            ..entry(402, "Deimos", Some(4), 9.85e-5, 6.2)
        },
        CatalogEntry {
            pole: pole([268.05, -0.009], [64.50, 0.003], 203.488_953_8),
            orbit: orbit(421_700.0, 0.0041, 0.036, 43.977, 84.129, 171.016),
            ..entry(501, "Io", Some(5), 5_959.916, 1_821.6)
        },
        CatalogEntry {
            pole: pole([268.08, -0.009], [64.51, 0.003], 101.374_723_5),
            orbit: orbit(671_034.0, 0.009, 0.465, 219.106, 88.970, 29.298),
            ..entry(502, "Europa", Some(5), 3_202.739, 1_560.8)
        },
        CatalogEntry {
            pole: pole([268.20, -0.009], [64.57, 0.003], 50.317_608_1),
            orbit: orbit(1_070_412.0, 0.0013, 0.177, 63.552, 192.417, 192.417),
            ..entry(503, "Ganymede", Some(5), 9_887.834, 2_631.2)
        },
        CatalogEntry {
            pole: pole([268.72, -0.009], [64.83, 0.003], 21.571_071_5),
            orbit: orbit(1_882_709.0, 0.007, 0.192, 298.848, 52.643, 52.643),
            ..entry(504, "Callisto", Some(5), 7_179.289, 2_410.3)
        },
        CatalogEntry {
            pole: pole([40.66, -0.036], [83.52, -0.004], 262.731_899_6),
            orbit: orbit(238_042.0, 0.0047, 0.009, 0.0, 119.5, 57.0),
            ..entry(602, "Enceladus", Some(6), 7.21, 252.1)
        },
        CatalogEntry {
            pole: pole([39.4827, 0.0], [83.4279, 0.0], 22.576_976_8),
            atmosphere: atmosphere(5.3e9, 0.0, 40.0, 600.0),
            orbit: orbit(1_221_870.0, 0.0288, 0.348_54, 78.6, 78.3, 11.7),
            ..entry(606, "Titan", Some(6), 8_978.0, 2_574.7)
        },
        CatalogEntry {
            pole: pole([299.36, 0.0], [41.17, 0.0], -61.257_263_7),
            orbit: orbit(354_800.0, 0.0, 157.3, 178.1, 0.0, 63.0),
            ..entry(801, "Triton", Some(8), 1_427.6, 1_353.4)
        },
        CatalogEntry {
            orbit: orbit(19_591.4, 0.0, 96.145, 223.046, 0.0, 0.0),
            ..entry(901, "Charon", Some(9), 101.4, 606.0)
        },
    ]
}

/// Catalog of bodies with a fallback conic ephemeris
#[derive(Debug, Clone)]
pub struct SolarSystemCatalog {
    entries: Vec<CatalogEntry>,
    /// Catalog epoch expressed as days since J2000
    epoch_j2000_days: f64,
}

impl SolarSystemCatalog {
    /// The built-in solar system at its default epoch (2025-05-11T00:00:00)
    pub fn builtin() -> Self {
        Self::from_entries(builtin_entries())
    }

    pub fn from_entries(entries: Vec<CatalogEntry>) -> Self {
        Self {
            entries,
            epoch_j2000_days: DEFAULT_EPOCH_J2000_DAYS,
        }
    }

    /// Catalog epoch as a calendar instant
    pub fn default_epoch() -> Instant {
        Instant::from_datetime(2025, 5, 11, 0, 0, 0.0)
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn entry(&self, id: BodyId) -> Option<&CatalogEntry> {
        self.entries.iter().find(|e| e.id == id.0)
    }

    fn children(&self, id: u32) -> impl Iterator<Item = &CatalogEntry> + '_ {
        self.entries.iter().filter(move |e| e.parent == Some(id))
    }

    /// Total GM of an entry and everything below it
    fn system_gm(&self, id: u32) -> f64 {
        let own = self.entries.iter().find(|e| e.id == id).map_or(0.0, |e| e.gm);
        own + self.children(id).map(|c| self.system_gm(c.id)).sum::<f64>()
    }

    /// Snapshot at a calendar instant
    pub fn snapshot_at(&self, epoch: &Instant) -> Result<EphemerisSnapshot> {
        let j2000 = Instant::from_datetime(2000, 1, 1, 12, 0, 0.0);
        let days = (*epoch - j2000).as_seconds() / SECONDS_PER_DAY;
        let sim_time = (days - self.epoch_j2000_days) * SECONDS_PER_DAY;
        if !sim_time.is_finite() {
            return Err(EngineError::InvalidEpoch(format!("{:?}", epoch)));
        }
        Ok(self.snapshot(sim_time))
    }

    /// Snapshot `sim_time` seconds after the catalog epoch
    pub fn snapshot(&self, sim_time: f64) -> EphemerisSnapshot {
        let mut states = Vec::with_capacity(self.entries.len());
        for root in self.entries.iter().filter(|e| e.parent.is_none()) {
            self.place_system(root.id, Vector3::zeros(), Vector3::zeros(), sim_time, &mut states);
        }

        let centuries = (self.epoch_j2000_days + sim_time / SECONDS_PER_DAY) / DAYS_PER_CENTURY;
        let bodies = states.into_iter().filter_map(|(id, position, velocity)| {
            let entry = self.entries.iter().find(|e| e.id == id)?;
            Some(self.build_body(entry, position, velocity, centuries))
        });

        EphemerisSnapshot::from_bodies(sim_time, bodies)
    }

    /// Place `id` and its subtree so the subtree's centre of mass sits at
    /// `(sys_pos, sys_vel)`
    fn place_system(
        &self,
        id: u32,
        sys_pos: Vector3<f64>,
        sys_vel: Vector3<f64>,
        sim_time: f64,
        out: &mut Vec<(u32, Vector3<f64>, Vector3<f64>)>,
    ) {
        let Some(node) = self.entries.iter().find(|e| e.id == id) else {
            return;
        };
        let children: Vec<&CatalogEntry> = self.children(id).collect();

        // A massless node is centred on its heaviest child; everything else
        // in the subsystem orbits that centre.
        let center = if node.gm > 0.0 {
            None
        } else {
            children
                .iter()
                .max_by(|a, b| self.system_gm(a.id).total_cmp(&self.system_gm(b.id)))
                .map(|c| c.id)
        };
        let center_gm = match center {
            Some(c) => self.system_gm(c),
            None => node.gm,
        };

        let satellites: Vec<(u32, f64, Vector3<f64>, Vector3<f64>)> = children
            .iter()
            .filter(|c| Some(c.id) != center)
            .filter_map(|c| {
                let elements = c.orbit?.elements();
                let gm = self.system_gm(c.id);
                let (p, v) = elements_to_state(&elements, center_gm + gm, sim_time);
                Some((c.id, gm, p, v))
            })
            .collect();

        let total_gm = center_gm + satellites.iter().map(|s| s.1).sum::<f64>();
        let (mut center_pos, mut center_vel) = (sys_pos, sys_vel);
        if total_gm > 0.0 {
            for (_, gm, p, v) in &satellites {
                center_pos -= p * (gm / total_gm);
                center_vel -= v * (gm / total_gm);
            }
        }

        match center {
            Some(c) => {
                out.push((id, sys_pos, sys_vel));
                self.place_system(c, center_pos, center_vel, sim_time, out);
            }
            None => out.push((id, center_pos, center_vel)),
        }
        for (sat, _, p, v) in satellites {
            self.place_system(sat, center_pos + p, center_vel + v, sim_time, out);
        }
    }

    fn build_body(
        &self,
        entry: &CatalogEntry,
        position: Vector3<f64>,
        velocity: Vector3<f64>,
        centuries: f64,
    ) -> Body {
        let mut body = Body::new(BodyId(entry.id), entry.name, entry.gm, entry.radius)
            .with_state(position, velocity);
        body.parent = entry.parent.map(BodyId);
        body.j2 = entry.j2;
        body.atmosphere = entry.atmosphere;
        body.rotation = entry.pole.map(|p| {
            let ra = p.ra[0] + p.ra[1] * centuries;
            let dec = p.dec[0] + p.dec[1] * centuries;
            RotationParams::new(
                equatorial_to_ecliptic(ra, dec),
                p.rotation_rate.to_radians() / SECONDS_PER_DAY,
            )
        });
        body
    }
}

/// Unit vector for equatorial RA/Dec (degrees) expressed in the ecliptic frame
pub fn equatorial_to_ecliptic(ra_deg: f64, dec_deg: f64) -> Vector3<f64> {
    let (sin_ra, cos_ra) = ra_deg.to_radians().sin_cos();
    let (sin_dec, cos_dec) = dec_deg.to_radians().sin_cos();
    let eq = Vector3::new(cos_dec * cos_ra, cos_dec * sin_ra, sin_dec);

    let (sin_eps, cos_eps) = OBLIQUITY_J2000_DEG.to_radians().sin_cos();
    Vector3::new(
        eq.x,
        cos_eps * eq.y + sin_eps * eq.z,
        -sin_eps * eq.y + cos_eps * eq.z,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const EARTH: BodyId = BodyId(399);
    const MOON: BodyId = BodyId(301);
    const SUN: BodyId = BodyId(10);

    #[test]
    fn test_builtin_hierarchy() {
        let snapshot = SolarSystemCatalog::builtin().snapshot(0.0);

        assert_eq!(snapshot.primary(), Some(SUN));
        assert_eq!(snapshot.dynamical_parent(EARTH), Some(SUN));
        assert_eq!(snapshot.dynamical_parent(MOON), Some(EARTH));
        assert_eq!(snapshot.dynamical_parent(BodyId(501)), Some(BodyId(599)));
        assert!(snapshot.get(BodyId(3)).map_or(false, |b| !b.is_massive()));
    }

    #[test]
    fn test_builtin_distances() {
        let snapshot = SolarSystemCatalog::builtin().snapshot(0.0);
        let sun = snapshot.get(SUN).unwrap();
        let earth = snapshot.get(EARTH).unwrap();
        let moon = snapshot.get(MOON).unwrap();

        let au = (earth.position - sun.position).norm();
        assert!(au > 1.46e8 && au < 1.53e8, "Earth-Sun distance {}", au);

        let lunar = (moon.position - earth.position).norm();
        assert!(lunar > 360_000.0 && lunar < 410_000.0, "Earth-Moon distance {}", lunar);

        // Sun is offset from the barycenter by Jupiter's pull, ~1 solar radius
        assert!(sun.position.norm() < 2.0e6);
    }

    #[test]
    fn test_soi_radii() {
        let snapshot = SolarSystemCatalog::builtin().snapshot(0.0);
        let earth_soi = snapshot.get(EARTH).unwrap().soi_radius.unwrap();
        assert!(earth_soi > 900_000.0 && earth_soi < 950_000.0);
        let moon_soi = snapshot.get(MOON).unwrap().soi_radius.unwrap();
        assert!(moon_soi > 60_000.0 && moon_soi < 70_000.0);
    }

    #[test]
    fn test_earth_rotation_axis() {
        let snapshot = SolarSystemCatalog::builtin().snapshot(0.0);
        let rotation = snapshot.get(EARTH).unwrap().rotation.unwrap();

        // Earth's pole is tilted from the ecliptic normal by the obliquity
        let tilt = rotation.pole.z.acos().to_degrees();
        assert!((tilt - OBLIQUITY_J2000_DEG).abs() < 0.05);
        assert_relative_eq!(rotation.rate, 7.292_115e-5, max_relative = 1e-5);
    }

    #[test]
    fn test_snapshot_at_default_epoch() {
        let catalog = SolarSystemCatalog::builtin();
        let epoch = SolarSystemCatalog::default_epoch();
        let snapshot = catalog.snapshot_at(&epoch).unwrap();
        // Leap seconds since J2000 are the only difference
        assert!(snapshot.sim_time.abs() < 10.0);

        let later = catalog.snapshot_at(&(epoch + satkit::Duration::from_days(1.0))).unwrap();
        assert!((later.sim_time - SECONDS_PER_DAY).abs() < 1e-3);
    }
}
