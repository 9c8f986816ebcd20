//! C-compatible solver settings

use crate::error::{DefaultFluidSimError, FluidSimErrorCode};
use crate::helpers::track_error;
use fluid_sim_core::{AdvectionType, FluidSettings, GridDimensions};
use nalgebra::Vector3;

/// Density advection scheme.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FluidSimAdvectionType {
    /// Single semi-Lagrangian backtrace.
    Normal = 0,
    /// Forward/backward traces with error correction and extrema clamping.
    MacCormack = 1,
}

/// Three floats laid out as x, y, z.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FluidSimVec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl From<FluidSimVec3> for Vector3<f32> {
    fn from(v: FluidSimVec3) -> Self {
        Vector3::new(v.x, v.y, v.z)
    }
}

impl From<Vector3<f32>> for FluidSimVec3 {
    fn from(v: Vector3<f32>) -> Self {
        Self {
            x: v.x,
            y: v.y,
            z: v.z,
        }
    }
}

/// Complete solver configuration, mirrored field by field from the core settings.
///
/// Obtain defaults with `fluid_sim_default_settings` and modify the fields you need.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FluidSimSettings {
    /// Grid cells along x
    pub width: u32,
    /// Grid cells along y (up)
    pub height: u32,
    /// Grid cells along z
    pub depth: u32,
    /// Integration step in seconds
    pub time_step: f32,
    pub density_buoyancy: f32,
    pub density_weight: f32,
    pub vorticity_strength: f32,
    pub temperature_dissipation: f32,
    pub density_dissipation: f32,
    pub velocity_dissipation: f32,
    pub advection_type: FluidSimAdvectionType,
    pub jacobi_iterations: u32,
    /// Constant source position, normalized 0..1 per axis
    pub constant_input_position: FluidSimVec3,
    pub constant_density_amount: f32,
    pub constant_temperature: f32,
    /// Constant source radius in cells
    pub constant_input_radius: f32,
}

impl From<&FluidSettings> for FluidSimSettings {
    fn from(settings: &FluidSettings) -> Self {
        Self {
            width: settings.dimensions.x,
            height: settings.dimensions.y,
            depth: settings.dimensions.z,
            time_step: settings.time_step,
            density_buoyancy: settings.density_buoyancy,
            density_weight: settings.density_weight,
            vorticity_strength: settings.vorticity_strength,
            temperature_dissipation: settings.temperature_dissipation,
            density_dissipation: settings.density_dissipation,
            velocity_dissipation: settings.velocity_dissipation,
            advection_type: match settings.advection_type {
                AdvectionType::Normal => FluidSimAdvectionType::Normal,
                AdvectionType::MacCormack => FluidSimAdvectionType::MacCormack,
            },
            jacobi_iterations: settings.jacobi_iterations,
            constant_input_position: settings.constant_input_position.into(),
            constant_density_amount: settings.constant_density_amount,
            constant_temperature: settings.constant_temperature,
            constant_input_radius: settings.constant_input_radius,
        }
    }
}

impl From<&FluidSimSettings> for FluidSettings {
    fn from(settings: &FluidSimSettings) -> Self {
        Self {
            dimensions: GridDimensions::new(settings.width, settings.height, settings.depth),
            time_step: settings.time_step,
            density_buoyancy: settings.density_buoyancy,
            density_weight: settings.density_weight,
            vorticity_strength: settings.vorticity_strength,
            temperature_dissipation: settings.temperature_dissipation,
            density_dissipation: settings.density_dissipation,
            velocity_dissipation: settings.velocity_dissipation,
            advection_type: match settings.advection_type {
                FluidSimAdvectionType::Normal => AdvectionType::Normal,
                FluidSimAdvectionType::MacCormack => AdvectionType::MacCormack,
            },
            jacobi_iterations: settings.jacobi_iterations,
            constant_input_position: settings.constant_input_position.into(),
            constant_density_amount: settings.constant_density_amount,
            constant_temperature: settings.constant_temperature,
            constant_input_radius: settings.constant_input_radius,
        }
    }
}

/// Write the default solver settings into `out_settings`.
///
/// Returns
/// - `FluidSimErrorCode::Ok` on success
/// - `FluidSimErrorCode::NullPointer` if `out_settings` is null
///
/// # Safety
/// `out_settings` must be null or point to writable memory for one `FluidSimSettings`.
#[no_mangle]
pub unsafe extern "C" fn fluid_sim_default_settings(
    out_settings: *mut FluidSimSettings,
) -> FluidSimErrorCode {
    if out_settings.is_null() {
        return track_error(&DefaultFluidSimError::null_pointer("out_settings"));
    }
    // SAFETY: non-null and writable per the caller contract
    unsafe {
        *out_settings = FluidSimSettings::from(&FluidSettings::default());
    }
    FluidSimErrorCode::Ok
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_mirror_core_defaults() {
        let core = FluidSettings {
            advection_type: AdvectionType::Normal,
            ..FluidSettings::default()
        };
        let c_settings = FluidSimSettings::from(&core);
        assert_eq!(c_settings.width, 64);
        assert_eq!(c_settings.advection_type, FluidSimAdvectionType::Normal);
        assert_eq!(FluidSettings::from(&c_settings), core);
    }

    #[test]
    fn test_default_settings_rejects_null() {
        let code = unsafe { fluid_sim_default_settings(std::ptr::null_mut()) };
        assert_eq!(code, FluidSimErrorCode::NullPointer);
    }
}
