use crate::error::{with_last_error_mut, DefaultFluidSimError, FluidSimError, FluidSimErrorCode};
use crate::instance::FluidSimInstance;
use fluid_sim_core::FluidSimulator;
use std::ffi::CString;
use tracing::debug;

/// Set the thread-local error message and code.
/// Internal helper for FFI functions to record failure details.
/// Accepts any type implementing `FluidSimError` trait.
pub(crate) fn set_last_error(error: &impl FluidSimError) {
    debug!("FFI call failed ({:?}): {}", error.code(), error.msg());
    with_last_error_mut(|(cstring, code)| {
        *cstring = CString::new(error.msg()).ok();
        *code = error.code();
    });
}

/// Track an error by setting it in thread-local storage and returning its code.
/// More efficient than handling results for immediate errors.
#[inline]
pub(crate) fn track_error(error: &impl FluidSimError) -> FluidSimErrorCode {
    set_last_error(error);
    error.code()
}

/// Record the error of a failed result, passing successes through.
pub(crate) fn track_result<T>(
    result: Result<T, DefaultFluidSimError>,
) -> Result<T, FluidSimErrorCode> {
    result.map_err(|error| track_error(&error))
}

/// Clear the thread-local error message and code.
/// Internal helper called on successful operations.
pub(crate) fn clear_last_error() {
    with_last_error_mut(|(cstring, code)| {
        *cstring = None;
        *code = FluidSimErrorCode::Ok;
    });
}

/// Run an FFI body and convert its outcome into an error code.
///
/// Success clears the thread-local error; failure records it.
pub(crate) fn handle_ffi_result<F>(body: F) -> FluidSimErrorCode
where
    F: FnOnce() -> Result<(), DefaultFluidSimError>,
{
    match track_result(body()) {
        Ok(()) => {
            clear_last_error();
            FluidSimErrorCode::Ok
        }
        Err(code) => code,
    }
}

/// Borrow an instance from a raw pointer.
///
/// # Safety
/// `ptr` must be null or a pointer returned by `fluid_sim_new` that has not been destroyed.
pub(crate) unsafe fn instance_from_ptr<'a>(
    ptr: *const FluidSimInstance,
) -> Result<&'a FluidSimInstance, DefaultFluidSimError> {
    // SAFETY: the caller guarantees `ptr` is null or a live instance
    unsafe { ptr.as_ref() }.ok_or_else(|| DefaultFluidSimError::null_pointer("ptr"))
}

/// Run `func` with shared access to the simulation.
pub(crate) fn with_fluid_sim<F, T>(
    instance: &FluidSimInstance,
    func: F,
) -> Result<T, DefaultFluidSimError>
where
    F: FnOnce(&dyn FluidSimulator) -> T,
{
    let sim = instance
        .sim
        .read()
        .map_err(|_| DefaultFluidSimError::lock_poisoned("RwLock"))?;
    Ok(func(&**sim))
}

/// Run `func` with exclusive access to the simulation.
pub(crate) fn with_fluid_sim_mut<F, T>(
    instance: &FluidSimInstance,
    func: F,
) -> Result<T, DefaultFluidSimError>
where
    F: FnOnce(&mut dyn FluidSimulator) -> T,
{
    let mut sim = instance
        .sim
        .write()
        .map_err(|_| DefaultFluidSimError::lock_poisoned("RwLock"))?;
    Ok(func(&mut **sim))
}
