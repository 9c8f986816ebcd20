//! Grid-based smoke solver module
//!
//! This module provides a unified GPU/CPU abstraction layer for the smoke
//! solver. Simulation logic lives once in `Solver<B>`, which drives compute
//! stages through the `ComputeBackend` trait; backends only own volumes,
//! parameter blocks and kernel dispatch.
//!
//! # Feature Flags
//!
//! - `gpu` (default): Enables GPU acceleration via wgpu. Disable with `--no-default-features`
//!   for environments without GPU access.
//!
//! # Backend Selection
//!
//! The system automatically selects the best available backend:
//! 1. Try GPU (if `gpu` feature enabled and hardware available)
//! 2. Fall back to CPU (always available)
//!
//! # Example
//!
//! ```rust,ignore
//! use fluid_sim_core::solver::create_fluid_solver;
//! use fluid_sim_core::FluidSettings;
//!
//! let mut solver = create_fluid_solver(FluidSettings::default())?;
//! solver.step(1.0 / 60.0)?;
//! let density = solver.read_density()?;
//! ```

mod backend;
mod context;
mod cpu;
mod fields;
mod kernels;
mod obstacle;
mod params;
mod pipeline;
mod stage;
#[allow(clippy::module_name_repetitions)]
mod r#trait;

#[cfg(feature = "gpu")]
mod gpu;

// Re-exports
pub use backend::{ComputeBackend, VolumeFormat, VolumeHandle};
pub use context::{solver_bytes_per_cell, GpuInitResult, MAX_KERNEL_STORAGE_BUFFERS};
pub use cpu::{CpuBackend, CpuKernel};
pub use fields::{BufferRole, GridDimensions, GridField};
pub use obstacle::ObstacleField;
pub use params::{
    AdvectionParams, GeneralParams, ImpulseParams, ParameterBlock, AMBIENT_TEMPERATURE,
};
pub use pipeline::{FieldKind, Solver, SolverStats, INTERACTION_IMPULSE_RADIUS};
pub use r#trait::FluidSimulator;
pub use stage::{ComputeStage, StageKind, WORKGROUP_SIZE};

#[cfg(feature = "gpu")]
pub use context::GpuContext;
#[cfg(feature = "gpu")]
pub use gpu::{GpuBackend, GpuKernel};

use crate::{FluidError, FluidSettings};
use tracing::info;

#[cfg(feature = "gpu")]
use tracing::warn;

/// Create a smoke solver with automatic backend selection
///
/// This function tries to use GPU acceleration if available, falling back to CPU otherwise.
/// The selection process is:
/// 1. If `gpu` feature is enabled, try to initialize GPU
/// 2. If the device cannot hold the grid or solver setup fails on it, use CPU
/// 3. If GPU initialization fails or feature is disabled, use CPU
///
/// # Arguments
///
/// * `settings` - Initial solver settings, including grid dimensions
///
/// # Returns
///
/// A boxed `FluidSimulator` trait object using the best available backend
///
/// # Errors
///
/// `FluidError::InvalidSettings` if the settings fail validation, or a
/// resource creation error from the CPU backend
pub fn create_fluid_solver(
    settings: FluidSettings,
) -> Result<Box<dyn FluidSimulator>, FluidError> {
    settings.validate()?;

    #[cfg(feature = "gpu")]
    {
        let dims = settings.dimensions;
        match GpuContext::new() {
            GpuInitResult::Success(gpu_context) => {
                if gpu_context.can_allocate(dims) {
                    info!(
                        "Using GPU backend: {} ({} grid)",
                        gpu_context.adapter_name(),
                        dims
                    );
                    match Solver::new(GpuBackend::new(gpu_context), settings.clone()) {
                        Ok(solver) => return Ok(Box::new(solver)),
                        Err(e) => {
                            warn!("GPU solver setup failed: {}. Falling back to CPU.", e);
                        }
                    }
                } else {
                    warn!(
                        "GPU has insufficient memory for {} grid, falling back to CPU",
                        dims
                    );
                }
            }
            GpuInitResult::NoGpuFound => {
                info!("No GPU found, using CPU backend");
            }
            GpuInitResult::InitFailed {
                adapter_name,
                error,
            } => {
                warn!(
                    "GPU '{}' found but failed to initialize: {}. Falling back to CPU.",
                    adapter_name, error
                );
            }
        }
    }

    #[cfg(not(feature = "gpu"))]
    info!("GPU feature disabled, using CPU backend");

    Ok(Box::new(Solver::new(CpuBackend::new(), settings)?))
}

/// Create a smoke solver on the CPU backend only
///
/// # Errors
///
/// Same as `Solver::new`
pub fn create_cpu_solver(settings: FluidSettings) -> Result<Solver<CpuBackend>, FluidError> {
    Solver::new(CpuBackend::new(), settings)
}
