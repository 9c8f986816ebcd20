//! Fluid configuration
//!
//! `FluidSettings` is the complete, serializable configuration of a solver.
//! Hosts read it with `settings()` and hand back a modified copy through
//! `apply_settings()`, which decides how much of the pipeline must be rebuilt.

use crate::solver::GridDimensions;
use crate::FluidError;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Scheme used to advect density
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum AdvectionType {
    /// Single semi-Lagrangian backtrace
    Normal,
    /// Forward/backward trace with error correction and extrema clamping
    #[default]
    MacCormack,
}

/// Complete solver configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FluidSettings {
    /// Grid size in cells
    pub dimensions: GridDimensions,
    /// Integration step in seconds
    pub time_step: f32,
    /// Upward force per unit of temperature above ambient
    pub density_buoyancy: f32,
    /// Downward force per unit of density
    pub density_weight: f32,
    /// Vorticity confinement strength (epsilon)
    pub vorticity_strength: f32,
    pub temperature_dissipation: f32,
    pub density_dissipation: f32,
    pub velocity_dissipation: f32,
    /// Scheme used for density advection
    pub advection_type: AdvectionType,
    /// Pressure relaxation iterations per step
    pub jacobi_iterations: u32,
    /// Constant source position, normalized 0..1 per axis
    pub constant_input_position: Vector3<f32>,
    pub constant_density_amount: f32,
    pub constant_temperature: f32,
    /// Constant source radius in cells
    pub constant_input_radius: f32,
}

impl Default for FluidSettings {
    fn default() -> Self {
        Self {
            dimensions: GridDimensions::cube(64),
            time_step: 0.1,
            density_buoyancy: 1.0,
            density_weight: 0.0125,
            vorticity_strength: 0.35,
            temperature_dissipation: 0.995,
            density_dissipation: 0.999,
            velocity_dissipation: 0.999,
            advection_type: AdvectionType::MacCormack,
            jacobi_iterations: 20,
            constant_input_position: Vector3::new(0.5, 0.1, 0.5),
            constant_density_amount: 1.0,
            constant_temperature: 5.0,
            constant_input_radius: 6.0,
        }
    }
}

/// What a settings update requires from the solver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SettingsChange {
    /// The general parameter block must be re-pushed
    pub general: bool,
    /// Every field and stage must be rebuilt for new dimensions
    pub reallocate: bool,
}

impl FluidSettings {
    /// Check that every value is usable by the solver
    ///
    /// # Errors
    ///
    /// Returns `FluidError::InvalidSettings` naming the first offending field
    pub fn validate(&self) -> Result<(), FluidError> {
        if !self.dimensions.is_valid() {
            return Err(FluidError::InvalidSettings(format!(
                "dimensions must be positive, got {}",
                self.dimensions
            )));
        }
        if self.jacobi_iterations == 0 {
            return Err(FluidError::InvalidSettings(
                "jacobi_iterations must be at least 1".to_string(),
            ));
        }

        let scalars = [
            ("time_step", self.time_step),
            ("density_buoyancy", self.density_buoyancy),
            ("density_weight", self.density_weight),
            ("vorticity_strength", self.vorticity_strength),
            ("temperature_dissipation", self.temperature_dissipation),
            ("density_dissipation", self.density_dissipation),
            ("velocity_dissipation", self.velocity_dissipation),
            ("constant_density_amount", self.constant_density_amount),
            ("constant_temperature", self.constant_temperature),
            ("constant_input_radius", self.constant_input_radius),
        ];
        if let Some((name, value)) = scalars.iter().find(|(_, v)| !v.is_finite()) {
            return Err(FluidError::InvalidSettings(format!(
                "{name} must be finite, got {value}"
            )));
        }

        if self.time_step <= 0.0 {
            return Err(FluidError::InvalidSettings(format!(
                "time_step must be positive, got {}",
                self.time_step
            )));
        }
        if self.constant_input_radius <= 0.0 {
            return Err(FluidError::InvalidSettings(format!(
                "constant_input_radius must be positive, got {}",
                self.constant_input_radius
            )));
        }
        if self
            .constant_input_position
            .iter()
            .any(|c| !(0.0..=1.0).contains(c))
        {
            return Err(FluidError::InvalidSettings(format!(
                "constant_input_position must lie in 0..1, got {:?}",
                self.constant_input_position
            )));
        }

        Ok(())
    }

    /// Compare against the settings currently in use
    ///
    /// # Arguments
    ///
    /// * `next` - Settings about to be applied
    ///
    /// # Returns
    ///
    /// Which parts of the solver the update invalidates
    #[must_use]
    pub fn diff(&self, next: &Self) -> SettingsChange {
        let reallocate = self.dimensions != next.dimensions;
        let general = reallocate
            || self.time_step != next.time_step
            || self.density_buoyancy != next.density_buoyancy
            || self.density_weight != next.density_weight
            || self.vorticity_strength != next.vorticity_strength;

        SettingsChange {
            general,
            reallocate,
        }
    }
}
