//! Orbit engine demo
//!
//! Propagates a single Earth-orbiting vehicle through the job scheduler
//! against the built-in solar system and prints what came back.

use anyhow::{bail, Context, Result};
use clap::Parser;
use nalgebra::Vector3;
use orbit_engine::bodies::catalog::SolarSystemCatalog;
use orbit_engine::bodies::BodyId;
use orbit_engine::cache::CacheEntry;
use orbit_engine::propagation::analyzer::analyze;
use orbit_engine::propagation::forces::{CompositeForce, ForceContext};
use orbit_engine::propagation::{
    Maneuver, ManeuverDeltaV, PerturbationToggles, PropagationChunk, VehicleId, VehicleState,
};
use orbit_engine::scheduler::{JobId, JobObserver, JobScheduler, OrbitUpdate};
use orbit_engine::transitions::{split_segments, stitch};
use orbit_engine::{EngineConfig, EngineError};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

const EARTH: BodyId = BodyId(399);

#[derive(Parser, Debug)]
#[command(name = "orbit_engine", about = "Propagate a vehicle around Earth through the job scheduler")]
struct Args {
    /// Circular orbit altitude (km)
    #[arg(long, default_value_t = 400.0)]
    altitude: f64,

    /// Orbital periods to cover
    #[arg(long, default_value_t = 1.0)]
    periods: f64,

    #[arg(long)]
    samples_per_period: Option<usize>,

    /// Prograde burn (km/s) half a period in
    #[arg(long)]
    burn: Option<f64>,

    #[arg(long)]
    drag: bool,

    #[arg(long)]
    j2: bool,

    #[arg(long)]
    third_body: bool,

    /// JSON engine configuration
    #[arg(long)]
    config: Option<PathBuf>,
}

/// Keeps the final entry, logs the rest
#[derive(Default)]
struct Collector {
    chunks: Mutex<usize>,
    result: Mutex<Option<CacheEntry>>,
    error: Mutex<Option<EngineError>>,
}

impl JobObserver for Collector {
    fn on_chunk(&self, vehicle: VehicleId, job: JobId, chunk: &PropagationChunk) {
        *self.chunks.lock() += 1;
        log::debug!("{} / {}: chunk of {} samples", vehicle, job, chunk.len());
    }

    fn on_complete(&self, _vehicle: VehicleId, _job: JobId, entry: &CacheEntry) {
        *self.result.lock() = Some(entry.clone());
    }

    fn on_failed(&self, vehicle: VehicleId, _job: Option<JobId>, error: &EngineError) {
        log::error!("Update for {} failed: {}", vehicle, error);
        *self.error.lock() = Some(error.clone());
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::default(),
    };
    config.propagation.perturbations = PerturbationToggles {
        j2: args.j2,
        drag: args.drag,
        third_body: args.third_body,
    };
    if let Some(samples) = args.samples_per_period {
        config.propagation.samples_per_period = samples;
    }

    let snapshot = Arc::new(SolarSystemCatalog::builtin().snapshot(0.0));
    let earth = snapshot.require(EARTH)?;
    let radius = earth.radius + args.altitude;
    let mut vehicle = VehicleState::new(
        Vector3::new(radius, 0.0, 0.0),
        Vector3::new(0.0, (earth.gm / radius).sqrt(), 0.0),
        EARTH,
    );

    let summary = analyze(&vehicle.position, &vehicle.velocity, earth.gm);
    log::info!(
        "{:?} orbit: a = {:.1} km, e = {:.4}, period = {}",
        summary.orbit_type,
        summary.semi_major_axis,
        summary.eccentricity,
        summary.period.map_or("n/a".to_string(), |p| format!("{:.1} s", p))
    );

    if let Some(dv) = args.burn {
        let at = summary.period.unwrap_or(config.propagation.open_orbit_duration) / 2.0;
        vehicle.upsert_maneuver(Maneuver::new(1, at, ManeuverDeltaV::prograde(dv)));
        log::info!("Scheduled {:.3} km/s prograde burn at t = {:.1} s", dv, at);
    }

    let forces = CompositeForce::from_toggles(&config.propagation.perturbations);
    let ctx = ForceContext::new(vehicle.position, vehicle.velocity, vehicle.properties, earth, &snapshot);
    for (name, accel) in forces.acceleration_breakdown(&ctx) {
        println!("  {:<28} {:.6e} km/s²", name, accel.norm());
    }

    let collector = Arc::new(Collector::default());
    let vehicle_id = VehicleId(1);
    let update = OrbitUpdate::new(vehicle_id, vehicle, 0.0, &config.propagation).with_coverage(args.periods);

    let mut scheduler = JobScheduler::new(config, collector.clone());
    scheduler.set_snapshot(snapshot.clone());
    scheduler.request_update(update);
    if !scheduler.pump_until_idle(Duration::from_secs(120)) {
        scheduler.shutdown();
        bail!("propagation did not finish within two minutes");
    }
    scheduler.shutdown();

    if let Some(error) = collector.error.lock().take() {
        return Err(error).context("propagation failed");
    }
    let entry = collector
        .result
        .lock()
        .take()
        .or_else(|| scheduler.cache().get(vehicle_id))
        .context("no trajectory produced")?;

    let segments = split_segments(&entry.samples, &entry.transitions);
    let stitched = stitch(&entry.samples, &segments, &snapshot, entry.start_time)?;

    println!("samples:     {}", entry.samples.len());
    println!("coverage:    {:.3} periods", entry.coverage);
    println!("time step:   {:.2} s", entry.time_step);
    println!("chunks:      {}", *collector.chunks.lock());
    println!("transitions: {}", entry.transitions.len());
    println!(
        "segments:    {} ({} connectors)",
        stitched.len(),
        stitched.iter().filter(|s| s.is_connector()).count()
    );
    if let Some(last) = entry.last_sample() {
        println!(
            "final:       t = {:.1} s, r = {:.1} km around body {}",
            last.time,
            last.position.norm(),
            last.dominant_body
        );
    }
    println!("stats:       {:?}", scheduler.stats());

    Ok(())
}
