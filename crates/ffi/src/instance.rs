use fluid_sim_core::solver::create_fluid_solver;
use fluid_sim_core::{FluidSettings, FluidSimulator};
use std::ptr;
use std::sync::RwLock;

use crate::error::{DefaultFluidSimError, FluidSimErrorCode};
use crate::helpers::{clear_last_error, track_error, track_result};
use crate::settings::FluidSimSettings;

/// The main fluid simulation context.
/// Holds the solver, running on the GPU when one is available and on the CPU otherwise.
///
/// # Thread Safety
/// `FluidSimInstance` is fully thread-safe and can be shared across threads in a
/// game engine or renderer.
///
/// The internal solver is protected by an `RwLock`, allowing:
/// - **Multiple concurrent readers** (density readback, settings queries): `.read()` lock
/// - **Exclusive writer** (stepping, interaction, settings updates): `.write()` lock
///
/// # Usage in Game Engines
///
/// ```cpp
/// FluidSimSettings settings;
/// fluid_sim_default_settings(&settings);
/// settings.width = settings.height = settings.depth = 96;
///
/// FluidSimInstance* sim = nullptr;
/// if (fluid_sim_new(&settings, &sim) != FluidSimErrorCode::Ok) {
///     fprintf(stderr, "%s\n", fluid_sim_get_last_error());
///     return;
/// }
///
/// // Once per frame
/// fluid_sim_step(sim, DeltaTime);
/// fluid_sim_read_density(sim, VoxelBuffer, VoxelCount);
///
/// fluid_sim_destroy(sim);
/// ```
pub struct FluidSimInstance {
    pub(crate) sim: RwLock<Box<dyn FluidSimulator>>,
}

impl FluidSimInstance {
    /// Creates a new instance with automatic backend selection.
    ///
    /// # Errors
    ///
    /// Returns `FluidSimErrorCode::InvalidSettings` if the settings fail validation.
    /// Returns `FluidSimErrorCode::DeviceInitFailed` if no backend could allocate the grid.
    pub(crate) fn new(settings: FluidSettings) -> Result<Box<Self>, DefaultFluidSimError> {
        let sim = create_fluid_solver(settings)?;
        Ok(Box::new(Self {
            sim: RwLock::new(sim),
        }))
    }
}

/// Create a new `FluidSim` instance and return it via out-parameter.
///
/// This function follows standard C error handling conventions:
/// - Returns `FluidSimErrorCode::Ok` (0) on success with valid instance in `out_instance`
/// - Returns non-zero error code on failure with `out_instance` set to null
///
/// Parameters
/// - `settings`: Initial configuration, or null for the defaults.
/// - `out_instance`: Pointer to receive the created instance. Must be non-null.
///
/// Returns
/// - `FluidSimErrorCode::Ok` (0) - success, `out_instance` contains valid pointer
/// - `FluidSimErrorCode::NullPointer` - `out_instance` parameter is null
/// - `FluidSimErrorCode::InvalidSettings` - settings failed validation
/// - `FluidSimErrorCode::DeviceInitFailed` - solver resources could not be created
///
/// Error Details
/// - Call `fluid_sim_get_last_error()` to retrieve human-readable error description
///
/// # Safety
///
/// - `settings` must be null or point to a valid `FluidSimSettings`.
/// - `out_instance` must be a valid, non-null pointer to writable memory.
/// - The caller takes ownership of the returned instance and MUST call `fluid_sim_destroy`
///   exactly once to avoid memory leaks.
#[no_mangle]
pub unsafe extern "C" fn fluid_sim_new(
    settings: *const FluidSimSettings,
    out_instance: *mut *mut FluidSimInstance,
) -> FluidSimErrorCode {
    if out_instance.is_null() {
        return track_error(&DefaultFluidSimError::null_pointer("out_instance"));
    }

    // SAFETY: the caller guarantees `settings` is null or valid
    let settings =
        unsafe { settings.as_ref() }.map_or_else(FluidSettings::default, FluidSettings::from);

    match track_result(FluidSimInstance::new(settings)) {
        Ok(instance) => {
            // SAFETY: `out_instance` is non-null and writable per the caller contract
            unsafe {
                *out_instance = Box::into_raw(instance);
            }
            clear_last_error();
            FluidSimErrorCode::Ok
        }
        Err(code) => {
            // SAFETY: as above; set to null on error per documentation contract
            unsafe {
                *out_instance = ptr::null_mut();
            }
            code
        }
    }
}

/// Destroys a `FluidSim` instance previously created by `fluid_sim_new`.
///
/// Behavior:
/// - If `ptr` is null, this function is a no-op.
/// - Otherwise every volume the solver owns is released and the instance is freed.
///
/// # Safety
/// - The pointer MUST have been created by `fluid_sim_new`.
/// - The pointer MUST NOT have been freed already, moved, or otherwise invalidated.
/// - After calling this function, the caller must not use the pointer again.
#[no_mangle]
pub unsafe extern "C" fn fluid_sim_destroy(ptr: *mut FluidSimInstance) {
    if ptr.is_null() {
        return;
    }

    // SAFETY: The pointer was created by `Box::into_raw` in `fluid_sim_new`
    // and has not been freed. Dropping the Box runs the solver's destructors.
    unsafe {
        drop(Box::from_raw(ptr));
    }
}
