//! Parameter blocks pushed to kernels
//!
//! Each block is a small fixed-layout record. The GPU backend uploads them into
//! uniform buffers, so every struct mirrors its WGSL counterpart including the
//! explicit padding.

use crate::FluidSettings;
use nalgebra::Vector3;

/// Temperature the buoyancy force is measured against
pub const AMBIENT_TEMPERATURE: f32 = 0.0;

/// Parameters shared by buoyancy and confinement (must match WGSL struct layout)
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "gpu", derive(bytemuck::Pod, bytemuck::Zeroable))]
pub struct GeneralParams {
    pub time_step: f32,
    pub density_buoyancy: f32,
    pub density_weight: f32,
    pub vorticity_strength: f32,
    pub ambient_temperature: f32,
    pub _pad: [f32; 3],
}

impl GeneralParams {
    /// Build the block from the current settings
    #[must_use]
    pub fn from_settings(settings: &FluidSettings) -> Self {
        Self {
            time_step: settings.time_step,
            density_buoyancy: settings.density_buoyancy,
            density_weight: settings.density_weight,
            vorticity_strength: settings.vorticity_strength,
            ambient_temperature: AMBIENT_TEMPERATURE,
            _pad: [0.0; 3],
        }
    }
}

/// Advection parameters (must match WGSL struct layout)
///
/// `time_step_modifier` is -1 for the backward MacCormack pass.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "gpu", derive(bytemuck::Pod, bytemuck::Zeroable))]
pub struct AdvectionParams {
    pub dissipation: f32,
    pub time_step_modifier: f32,
    pub _pad: [f32; 2],
}

impl AdvectionParams {
    #[must_use]
    pub fn new(dissipation: f32, time_step_modifier: f32) -> Self {
        Self {
            dissipation,
            time_step_modifier,
            _pad: [0.0; 2],
        }
    }
}

/// Gaussian impulse parameters (must match WGSL struct layout)
///
/// WGSL aligns `vec3<f32>` to 16 bytes, so `radius` packs into the fourth lane
/// and the struct is padded to 32 bytes.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "gpu", derive(bytemuck::Pod, bytemuck::Zeroable))]
pub struct ImpulseParams {
    /// Centre in cell coordinates
    pub point: [f32; 3],
    /// Radius in cells
    pub radius: f32,
    pub amount: f32,
    pub _pad: [f32; 3],
}

impl ImpulseParams {
    #[must_use]
    pub fn new(point: Vector3<f32>, radius: f32, amount: f32) -> Self {
        Self {
            point: [point.x, point.y, point.z],
            radius,
            amount,
            _pad: [0.0; 3],
        }
    }
}

/// A block ready to be pushed to the backend
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ParameterBlock {
    General(GeneralParams),
    Advection(AdvectionParams),
    Impulse(ImpulseParams),
}

impl ParameterBlock {
    /// Name used in logs and `MapFailure` errors
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::General(_) => "general",
            Self::Advection(_) => "advection",
            Self::Impulse(_) => "impulse",
        }
    }
}
