//! C-compatible bindings for the fluid solver
//!
//! Every entry point returns a `FluidSimErrorCode` (or a neutral value for
//! queries) and records a human-readable message retrievable through
//! `fluid_sim_get_last_error` on the calling thread.

mod error;
mod helpers;
mod instance;
mod settings;
mod simulation;

pub use error::{fluid_sim_get_last_error, fluid_sim_get_last_error_code, FluidSimErrorCode};
pub use instance::{fluid_sim_destroy, fluid_sim_new, FluidSimInstance};
pub use settings::{
    fluid_sim_default_settings, FluidSimAdvectionType, FluidSimSettings, FluidSimVec3,
};
pub use simulation::{
    fluid_sim_apply_settings, fluid_sim_cell_count, fluid_sim_get_settings,
    fluid_sim_interact, fluid_sim_interact_ray, fluid_sim_is_gpu_accelerated,
    fluid_sim_read_density, fluid_sim_reset, fluid_sim_step,
};

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CStr;
    use std::ptr;

    fn small_settings() -> FluidSimSettings {
        let mut settings = unsafe {
            let mut settings = std::mem::MaybeUninit::<FluidSimSettings>::uninit();
            assert_eq!(
                fluid_sim_default_settings(settings.as_mut_ptr()),
                FluidSimErrorCode::Ok
            );
            settings.assume_init()
        };
        settings.width = 8;
        settings.height = 8;
        settings.depth = 8;
        settings.jacobi_iterations = 5;
        settings
    }

    #[test]
    fn test_lifecycle_and_density_readback() {
        let settings = small_settings();
        let mut sim: *mut FluidSimInstance = ptr::null_mut();
        unsafe {
            assert_eq!(fluid_sim_new(&settings, &mut sim), FluidSimErrorCode::Ok);
            assert!(!sim.is_null());
            assert_eq!(fluid_sim_cell_count(sim), 512);

            assert_eq!(fluid_sim_step(sim, 0.016), FluidSimErrorCode::Ok);

            let mut density = vec![0.0_f32; 512];
            assert_eq!(
                fluid_sim_read_density(sim, density.as_mut_ptr(), density.len()),
                FluidSimErrorCode::Ok
            );
            assert!(density.iter().any(|d| *d > 0.0));

            // Wrong buffer length is rejected
            assert_eq!(
                fluid_sim_read_density(sim, density.as_mut_ptr(), 100),
                FluidSimErrorCode::InvalidParameter
            );
            assert_eq!(fluid_sim_get_last_error_code(), FluidSimErrorCode::InvalidParameter);

            assert_eq!(fluid_sim_reset(sim), FluidSimErrorCode::Ok);
            assert_eq!(fluid_sim_get_last_error_code(), FluidSimErrorCode::Ok);

            fluid_sim_destroy(sim);
        }
    }

    #[test]
    fn test_invalid_settings_report_error() {
        let mut settings = small_settings();
        settings.jacobi_iterations = 0;
        let mut sim: *mut FluidSimInstance = ptr::null_mut();
        unsafe {
            assert_eq!(
                fluid_sim_new(&settings, &mut sim),
                FluidSimErrorCode::InvalidSettings
            );
            assert!(sim.is_null());
            let message = CStr::from_ptr(fluid_sim_get_last_error());
            assert!(message.to_str().unwrap().contains("jacobi_iterations"));
        }
    }

    #[test]
    fn test_settings_round_trip_through_instance() {
        let settings = small_settings();
        let mut sim: *mut FluidSimInstance = ptr::null_mut();
        unsafe {
            assert_eq!(fluid_sim_new(&settings, &mut sim), FluidSimErrorCode::Ok);

            let mut updated = settings;
            updated.width = 12;
            updated.advection_type = FluidSimAdvectionType::Normal;
            assert_eq!(fluid_sim_apply_settings(sim, &updated), FluidSimErrorCode::Ok);
            assert_eq!(fluid_sim_cell_count(sim), 12 * 8 * 8);

            let mut current = settings;
            assert_eq!(fluid_sim_get_settings(sim, &mut current), FluidSimErrorCode::Ok);
            assert_eq!(current, updated);

            fluid_sim_destroy(sim);
        }
    }

    #[test]
    fn test_ray_interaction() {
        let settings = small_settings();
        let mut sim: *mut FluidSimInstance = ptr::null_mut();
        let center = FluidSimVec3::default();
        let extent = FluidSimVec3 {
            x: 2.0,
            y: 2.0,
            z: 2.0,
        };
        unsafe {
            assert_eq!(fluid_sim_new(&settings, &mut sim), FluidSimErrorCode::Ok);

            let mut hit = false;
            let origin = FluidSimVec3 {
                x: -5.0,
                y: 0.0,
                z: 0.0,
            };
            let direction = FluidSimVec3 {
                x: 1.0,
                y: 0.0,
                z: 0.0,
            };
            assert_eq!(
                fluid_sim_interact_ray(sim, center, extent, origin, direction, &mut hit),
                FluidSimErrorCode::Ok
            );
            assert!(hit);

            let away = FluidSimVec3 {
                x: -1.0,
                y: 0.0,
                z: 0.0,
            };
            assert_eq!(
                fluid_sim_interact_ray(sim, center, extent, origin, away, &mut hit),
                FluidSimErrorCode::Ok
            );
            assert!(!hit);

            fluid_sim_destroy(sim);
        }
    }

    #[test]
    fn test_null_pointers_are_rejected() {
        unsafe {
            assert_eq!(
                fluid_sim_step(ptr::null(), 0.016),
                FluidSimErrorCode::NullPointer
            );
            assert_eq!(
                fluid_sim_new(ptr::null(), ptr::null_mut()),
                FluidSimErrorCode::NullPointer
            );
            assert_eq!(fluid_sim_cell_count(ptr::null()), 0);
            assert!(!fluid_sim_is_gpu_accelerated(ptr::null()));
            fluid_sim_destroy(ptr::null_mut());
        }
    }
}
