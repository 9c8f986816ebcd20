use clap::{Parser, ValueEnum};
use fluid_sim_core::solver::create_fluid_solver;
use fluid_sim_core::{
    AdvectionType, FluidError, FluidSettings, GridDimensions, Ray, VolumeTransform,
};
use nalgebra::Vector3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::process::ExitCode;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Scheme {
    Normal,
    Maccormack,
}

impl From<Scheme> for AdvectionType {
    fn from(scheme: Scheme) -> Self {
        match scheme {
            Scheme::Normal => AdvectionType::Normal,
            Scheme::Maccormack => AdvectionType::MacCormack,
        }
    }
}

/// Headless smoke simulation with configurable parameters
#[derive(Parser, Debug)]
#[command(name = "fluid-sim-demo")]
#[command(about = "Real-time 3D smoke solver demo", long_about = None)]
struct Args {
    /// Grid size in cells along each axis
    #[arg(short, long, default_value_t = 64)]
    size: u32,

    /// Number of steps to run
    #[arg(short = 'n', long, default_value_t = 200)]
    steps: u32,

    /// Pressure relaxation iterations per step
    #[arg(short, long, default_value_t = 20)]
    jacobi: u32,

    /// Density advection scheme
    #[arg(long, value_enum, default_value_t = Scheme::Maccormack)]
    scheme: Scheme,

    /// Vorticity confinement strength
    #[arg(long, default_value_t = 0.35)]
    vorticity: f32,

    /// Fire a random interaction ray every N steps (0 = never)
    #[arg(short, long, default_value_t = 0)]
    interact_every: u32,

    /// Seed for interaction rays
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Report interval in steps
    #[arg(short, long, default_value_t = 20)]
    report_interval: u32,
}

fn density_report(density: &[f32]) -> (f64, f32, usize) {
    let total: f64 = density.iter().map(|d| f64::from(*d)).sum();
    let peak = density.iter().copied().fold(0.0_f32, f32::max);
    let occupied = density.iter().filter(|d| **d > 0.01).count();
    (total, peak, occupied)
}

fn run(args: &Args) -> Result<(), FluidError> {
    let settings = FluidSettings {
        dimensions: GridDimensions::cube(args.size),
        jacobi_iterations: args.jacobi,
        advection_type: args.scheme.into(),
        vorticity_strength: args.vorticity,
        ..FluidSettings::default()
    };

    println!("=== Smoke Simulation Demo ===\n");
    let mut sim = create_fluid_solver(settings)?;
    println!(
        "Backend: {} ({})",
        sim.backend_name(),
        if sim.is_gpu_accelerated() { "GPU" } else { "CPU" }
    );
    println!(
        "Grid: {} cells, {} Jacobi iterations, {:?} advection\n",
        sim.dimensions(),
        args.jacobi,
        sim.settings().advection_type
    );

    let volume = VolumeTransform::default();
    let mut rng = StdRng::seed_from_u64(args.seed);
    let started = Instant::now();

    for step in 1..=args.steps {
        if args.interact_every > 0 && step % args.interact_every == 0 {
            // Aim from a random point on a sphere around the volume at a random target inside it
            let origin = Vector3::new(
                rng.random_range(-1.0_f32..1.0),
                rng.random_range(-1.0_f32..1.0),
                rng.random_range(-1.0_f32..1.0),
            )
            .normalize()
                * 3.0;
            let target = Vector3::new(
                rng.random_range(-0.4_f32..0.4),
                rng.random_range(-0.4_f32..0.4),
                rng.random_range(-0.4_f32..0.4),
            );
            let hit = sim.interact_ray(&volume, &Ray::new(origin, target - origin))?;
            tracing::debug!("Interaction at step {}: hit={}", step, hit);
        }

        sim.step(1.0 / 60.0)?;

        if step % args.report_interval.max(1) == 0 || step == args.steps {
            let (total, peak, occupied) = density_report(&sim.read_density()?);
            println!(
                "Step {:4}: total density {:10.2}, peak {:6.3}, occupied cells {:7}, {:.2} ms/step",
                step,
                total,
                peak,
                occupied,
                sim.stats().last_step_ms
            );
        }
    }

    let elapsed = started.elapsed().as_secs_f64();
    let stats = sim.stats();
    println!(
        "\nRan {} steps in {:.2}s ({:.1} steps/s), simulated {:.2}s",
        stats.steps,
        elapsed,
        f64::from(args.steps) / elapsed.max(1e-9),
        stats.simulated_time
    );
    Ok(())
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Simulation failed: {e}");
            ExitCode::FAILURE
        }
    }
}
