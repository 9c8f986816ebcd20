//! Fluid simulator trait definition
//!
//! This module defines the `FluidSimulator` trait, the backend-agnostic host
//! surface of the solver. `Solver<B>` implements it for every compute backend
//! so hosts can hold a `Box<dyn FluidSimulator>` chosen at runtime.

use super::backend::{ComputeBackend, VolumeHandle};
use super::fields::GridDimensions;
use super::pipeline::{FieldKind, Solver, SolverStats};
use crate::interaction::{Ray, VolumeTransform};
use crate::settings::SettingsChange;
use crate::{FluidError, FluidSettings};
use nalgebra::Vector3;

/// Backend-agnostic interface for a running smoke simulation
///
/// Both the CPU and GPU backed solvers implement this trait. All fields are
/// 3D grids of `dimensions()` cells laid out x fastest, then y, then z.
pub trait FluidSimulator: Send + Sync {
    /// Advance the simulation by one step
    ///
    /// # Arguments
    ///
    /// * `dt` - Host frame time in seconds, accumulated into statistics only
    ///
    /// # Errors
    ///
    /// Returns `FluidError::MapFailure` if a parameter block cannot be mapped
    fn step(&mut self, dt: f32) -> Result<(), FluidError>;

    /// Current settings
    fn settings(&self) -> &FluidSettings;

    /// Replace the settings
    ///
    /// # Returns
    ///
    /// Which parts of the pipeline the update invalidated
    ///
    /// # Errors
    ///
    /// Returns `FluidError::InvalidSettings` or a resource creation error
    fn apply_settings(&mut self, settings: FluidSettings) -> Result<SettingsChange, FluidError>;

    /// Handle of the current density volume, for volume rendering
    fn volume_texture(&self) -> VolumeHandle;

    /// Read the current density field
    ///
    /// # Returns
    ///
    /// One value per cell
    ///
    /// # Errors
    ///
    /// Propagates readback failures
    fn read_density(&self) -> Result<Vec<f32>, FluidError>;

    /// Read the current value of any field
    ///
    /// # Returns
    ///
    /// One value per cell for scalar fields, four for vector fields
    ///
    /// # Errors
    ///
    /// Propagates readback failures
    fn read_field(&self, kind: FieldKind) -> Result<Vec<f32>, FluidError>;

    /// Inject density and temperature at a normalized local-space point
    ///
    /// # Errors
    ///
    /// Returns `FluidError::MapFailure` if the impulse block cannot be mapped
    fn interact(&mut self, local_point: Vector3<f32>) -> Result<(), FluidError>;

    /// Inject an impulse where a world-space ray enters the volume
    ///
    /// # Returns
    ///
    /// `true` if the ray hit the volume
    ///
    /// # Errors
    ///
    /// Same as `interact`
    fn interact_ray(&mut self, transform: &VolumeTransform, ray: &Ray)
        -> Result<bool, FluidError>;

    /// Zero every simulation field
    fn reset(&mut self);

    /// Get grid dimensions
    fn dimensions(&self) -> GridDimensions;

    /// Activity counters
    fn stats(&self) -> SolverStats;

    /// Backend name for logging
    fn backend_name(&self) -> &str;

    /// Check if this is the GPU backend
    ///
    /// # Returns
    ///
    /// `true` if GPU-accelerated, `false` if CPU-only
    fn is_gpu_accelerated(&self) -> bool;
}

impl<B: ComputeBackend> FluidSimulator for Solver<B> {
    fn step(&mut self, dt: f32) -> Result<(), FluidError> {
        Solver::step(self, dt)
    }

    fn settings(&self) -> &FluidSettings {
        Solver::settings(self)
    }

    fn apply_settings(&mut self, settings: FluidSettings) -> Result<SettingsChange, FluidError> {
        Solver::apply_settings(self, settings)
    }

    fn volume_texture(&self) -> VolumeHandle {
        Solver::volume_texture(self)
    }

    fn read_density(&self) -> Result<Vec<f32>, FluidError> {
        Solver::read_density(self)
    }

    fn read_field(&self, kind: FieldKind) -> Result<Vec<f32>, FluidError> {
        Solver::read_field(self, kind)
    }

    fn interact(&mut self, local_point: Vector3<f32>) -> Result<(), FluidError> {
        Solver::interact(self, local_point)
    }

    fn interact_ray(
        &mut self,
        transform: &VolumeTransform,
        ray: &Ray,
    ) -> Result<bool, FluidError> {
        Solver::interact_ray(self, transform, ray)
    }

    fn reset(&mut self) {
        Solver::reset(self);
    }

    fn dimensions(&self) -> GridDimensions {
        Solver::dimensions(self)
    }

    fn stats(&self) -> SolverStats {
        Solver::stats(self)
    }

    fn backend_name(&self) -> &str {
        self.backend().name()
    }

    fn is_gpu_accelerated(&self) -> bool {
        self.backend().is_gpu_accelerated()
    }
}
