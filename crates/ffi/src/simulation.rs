use crate::error::{DefaultFluidSimError, FluidSimErrorCode};
use crate::helpers::{handle_ffi_result, instance_from_ptr, with_fluid_sim, with_fluid_sim_mut};
use crate::instance::FluidSimInstance;
use crate::settings::{FluidSimSettings, FluidSimVec3};
use fluid_sim_core::{FluidSettings, Ray, VolumeTransform};

/// Advance the simulation by one step.
///
/// Thread-safe: acquires `RwLock` write lock for the step.
///
/// `dt` is the host frame time; integration always uses the configured `time_step`.
///
/// Returns
/// - `FluidSimErrorCode::Ok` on success
/// - `FluidSimErrorCode::InvalidParameter` if `dt` is non-finite or negative
/// - `FluidSimErrorCode::MapFailure` if a parameter block could not be mapped
///
/// # Safety
/// `ptr` must be null or a valid pointer returned by `fluid_sim_new`.
#[no_mangle]
pub unsafe extern "C" fn fluid_sim_step(
    ptr: *const FluidSimInstance,
    dt: f32,
) -> FluidSimErrorCode {
    handle_ffi_result(|| {
        if !dt.is_finite() || dt < 0.0 {
            return Err(DefaultFluidSimError::invalid_parameter(format!(
                "dt must be finite and non-negative, got {dt}"
            )));
        }
        // SAFETY: forwarded caller contract
        let instance = unsafe { instance_from_ptr(ptr) }?;
        with_fluid_sim_mut(instance, |sim| sim.step(dt))??;
        Ok(())
    })
}

/// Replace the solver settings.
///
/// A change of `width`, `height` or `depth` rebuilds every field, discarding the
/// current smoke. On failure the previous settings stay in effect.
///
/// # Safety
/// - `ptr` must be null or a valid pointer returned by `fluid_sim_new`.
/// - `settings` must be null or point to a valid `FluidSimSettings`.
#[no_mangle]
pub unsafe extern "C" fn fluid_sim_apply_settings(
    ptr: *const FluidSimInstance,
    settings: *const FluidSimSettings,
) -> FluidSimErrorCode {
    handle_ffi_result(|| {
        // SAFETY: forwarded caller contract
        let instance = unsafe { instance_from_ptr(ptr) }?;
        // SAFETY: forwarded caller contract
        let settings = unsafe { settings.as_ref() }
            .ok_or_else(|| DefaultFluidSimError::null_pointer("settings"))?;
        let settings = FluidSettings::from(settings);
        with_fluid_sim_mut(instance, |sim| sim.apply_settings(settings))??;
        Ok(())
    })
}

/// Copy the current solver settings into `out_settings`.
///
/// # Safety
/// - `ptr` must be null or a valid pointer returned by `fluid_sim_new`.
/// - `out_settings` must be null or point to writable memory for one `FluidSimSettings`.
#[no_mangle]
pub unsafe extern "C" fn fluid_sim_get_settings(
    ptr: *const FluidSimInstance,
    out_settings: *mut FluidSimSettings,
) -> FluidSimErrorCode {
    handle_ffi_result(|| {
        // SAFETY: forwarded caller contract
        let instance = unsafe { instance_from_ptr(ptr) }?;
        // SAFETY: forwarded caller contract
        let out = unsafe { out_settings.as_mut() }
            .ok_or_else(|| DefaultFluidSimError::null_pointer("out_settings"))?;
        *out = with_fluid_sim(instance, |sim| FluidSimSettings::from(sim.settings()))?;
        Ok(())
    })
}

/// Number of cells in the grid, i.e. the length `fluid_sim_read_density` expects.
///
/// Returns 0 if `ptr` is null or the lock is poisoned.
///
/// # Safety
/// `ptr` must be null or a valid pointer returned by `fluid_sim_new`.
#[no_mangle]
pub unsafe extern "C" fn fluid_sim_cell_count(ptr: *const FluidSimInstance) -> usize {
    // SAFETY: forwarded caller contract
    unsafe { instance_from_ptr(ptr) }
        .and_then(|instance| with_fluid_sim(instance, |sim| sim.dimensions().cell_count()))
        .unwrap_or_default()
}

/// Copy the current density field into `out_buffer`.
///
/// Cells are laid out x fastest, then y, then z.
///
/// Returns
/// - `FluidSimErrorCode::Ok` on success
/// - `FluidSimErrorCode::InvalidParameter` if `len` differs from `fluid_sim_cell_count`
/// - `FluidSimErrorCode::MapFailure` if the readback could not be mapped
///
/// # Safety
/// - `ptr` must be null or a valid pointer returned by `fluid_sim_new`.
/// - `out_buffer` must be null or point to `len` writable floats.
#[no_mangle]
pub unsafe extern "C" fn fluid_sim_read_density(
    ptr: *const FluidSimInstance,
    out_buffer: *mut f32,
    len: usize,
) -> FluidSimErrorCode {
    handle_ffi_result(|| {
        // SAFETY: forwarded caller contract
        let instance = unsafe { instance_from_ptr(ptr) }?;
        if out_buffer.is_null() {
            return Err(DefaultFluidSimError::null_pointer("out_buffer"));
        }
        let density = with_fluid_sim(instance, |sim| {
            sim.read_density().map_err(DefaultFluidSimError::from)
        })??;
        if density.len() != len {
            return Err(DefaultFluidSimError::invalid_parameter(format!(
                "buffer holds {len} floats, density has {}",
                density.len()
            )));
        }
        // SAFETY: non-null and `len` floats long per the caller contract
        let out = unsafe { std::slice::from_raw_parts_mut(out_buffer, len) };
        out.copy_from_slice(&density);
        Ok(())
    })
}

/// Inject density and temperature at a normalized point inside the volume.
///
/// # Safety
/// `ptr` must be null or a valid pointer returned by `fluid_sim_new`.
#[no_mangle]
pub unsafe extern "C" fn fluid_sim_interact(
    ptr: *const FluidSimInstance,
    local_point: FluidSimVec3,
) -> FluidSimErrorCode {
    handle_ffi_result(|| {
        // SAFETY: forwarded caller contract
        let instance = unsafe { instance_from_ptr(ptr) }?;
        with_fluid_sim_mut(instance, |sim| sim.interact(local_point.into()))??;
        Ok(())
    })
}

/// Inject an impulse where a world-space ray enters the volume.
///
/// The volume occupies the axis-aligned box centred on `volume_center` with full
/// edge lengths `volume_extent`. `out_hit` (optional) receives whether the ray hit.
///
/// # Safety
/// - `ptr` must be null or a valid pointer returned by `fluid_sim_new`.
/// - `out_hit` must be null or point to a writable bool.
#[no_mangle]
pub unsafe extern "C" fn fluid_sim_interact_ray(
    ptr: *const FluidSimInstance,
    volume_center: FluidSimVec3,
    volume_extent: FluidSimVec3,
    ray_origin: FluidSimVec3,
    ray_direction: FluidSimVec3,
    out_hit: *mut bool,
) -> FluidSimErrorCode {
    handle_ffi_result(|| {
        // SAFETY: forwarded caller contract
        let instance = unsafe { instance_from_ptr(ptr) }?;
        let transform = VolumeTransform::new(volume_center.into(), volume_extent.into());
        let ray = Ray::new(ray_origin.into(), ray_direction.into());
        let hit = with_fluid_sim_mut(instance, |sim| sim.interact_ray(&transform, &ray))??;
        // SAFETY: forwarded caller contract
        if let Some(out) = unsafe { out_hit.as_mut() } {
            *out = hit;
        }
        Ok(())
    })
}

/// Zero every field. The grid and settings are kept.
///
/// # Safety
/// `ptr` must be null or a valid pointer returned by `fluid_sim_new`.
#[no_mangle]
pub unsafe extern "C" fn fluid_sim_reset(ptr: *const FluidSimInstance) -> FluidSimErrorCode {
    handle_ffi_result(|| {
        // SAFETY: forwarded caller contract
        let instance = unsafe { instance_from_ptr(ptr) }?;
        with_fluid_sim_mut(instance, |sim| {
            sim.reset();
        })?;
        Ok(())
    })
}

/// Check whether the instance runs on the GPU.
///
/// Returns false if `ptr` is null.
///
/// # Safety
/// `ptr` must be null or a valid pointer returned by `fluid_sim_new`.
#[no_mangle]
#[allow(clippy::redundant_closure_for_method_calls)]
pub unsafe extern "C" fn fluid_sim_is_gpu_accelerated(ptr: *const FluidSimInstance) -> bool {
    // SAFETY: forwarded caller contract
    let gpu = unsafe { instance_from_ptr(ptr) }
        .and_then(|instance| with_fluid_sim(instance, |sim| sim.is_gpu_accelerated()));
    matches!(gpu, Ok(true))
}
