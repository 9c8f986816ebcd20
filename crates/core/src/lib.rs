//! Fluid Simulation Core Library
//!
//! A real-time 3D smoke solver on a regular voxel grid. Each step advects
//! velocity, temperature and density semi-Lagrangianly (optionally with the
//! MacCormack correction), injects a constant smoke source, applies buoyancy
//! and vorticity confinement, and projects the velocity field onto its
//! divergence-free part with a Jacobi pressure solve.
//!
//! ## Backends
//!
//! The simulation pipeline is written once against `solver::ComputeBackend`:
//! - wgpu compute shaders on the GPU (`gpu` feature, default)
//! - rayon-parallel kernels on the CPU, always available
//!
//! Use `solver::create_fluid_solver` to pick the best backend at runtime.

pub mod interaction;
pub mod solver;

mod error;
mod settings;

// Re-export core types
pub use error::FluidError;
pub use settings::{AdvectionType, FluidSettings, SettingsChange};

// Re-export solver types
pub use interaction::{Ray, VolumeTransform};
pub use solver::{
    create_cpu_solver, create_fluid_solver, ComputeBackend, CpuBackend, FieldKind,
    FluidSimulator, GridDimensions, Solver, SolverStats, VolumeFormat, VolumeHandle,
};

#[cfg(feature = "gpu")]
pub use solver::{GpuBackend, GpuContext};
