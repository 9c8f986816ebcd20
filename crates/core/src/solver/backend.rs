//! Compute backend abstraction
//!
//! Every solver component receives the backend explicitly. The backend owns the
//! device-side memory for volumes and parameter blocks and executes kernels in
//! submission order. `CpuBackend` and `GpuBackend` implement the same kernel
//! contract, so the solver pipeline is written once.

use super::fields::GridDimensions;
use super::params::ParameterBlock;
use super::stage::StageKind;
use crate::FluidError;
use std::fmt;

/// Opaque identifier of a volume owned by a backend
///
/// Handles are never reused within a backend's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VolumeHandle(pub(crate) u64);

impl VolumeHandle {
    /// Raw identifier, for hosts that need to pass the handle across an FFI boundary
    #[must_use]
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for VolumeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Cell layout of a volume
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VolumeFormat {
    /// One f32 per cell
    Scalar,
    /// Four f32 per cell (xyz plus one spare lane)
    Vector,
}

impl VolumeFormat {
    /// Number of f32 values per cell
    #[must_use]
    pub const fn channels(self) -> usize {
        match self {
            Self::Scalar => 1,
            Self::Vector => 4,
        }
    }

    /// Size of one cell in bytes
    #[must_use]
    pub const fn bytes_per_cell(self) -> u64 {
        (self.channels() * std::mem::size_of::<f32>()) as u64
    }
}

/// Device capability interface used by the solver
///
/// All calls are issued from a single thread in pipeline order. Dispatches are
/// fire-and-forget; only resource creation, parameter pushes and host
/// transfers report failure.
pub trait ComputeBackend: Send + Sync {
    /// Compiled kernel bound to a stage kind and grid size
    type Kernel: Send + Sync;

    /// Backend name for logging
    fn name(&self) -> &str;

    /// `true` if kernels run on a GPU
    fn is_gpu_accelerated(&self) -> bool;

    /// `true` if every field and kernel of a solver at `dims` fits the device
    fn can_allocate(&self, _dims: GridDimensions) -> bool {
        true
    }

    /// Allocate a zero-filled volume
    ///
    /// # Errors
    ///
    /// Returns `FluidError::ResourceCreation` if the volume cannot be allocated
    fn create_volume(
        &mut self,
        dims: GridDimensions,
        format: VolumeFormat,
        label: &str,
    ) -> Result<VolumeHandle, FluidError>;

    /// Free a volume. Unknown handles are ignored.
    fn release_volume(&mut self, handle: VolumeHandle);

    /// Compile the kernel for a stage at fixed grid dimensions
    ///
    /// # Errors
    ///
    /// Returns `FluidError::ResourceCreation` if the kernel fails to compile
    fn create_kernel(
        &mut self,
        kind: StageKind,
        dims: GridDimensions,
    ) -> Result<Self::Kernel, FluidError>;

    /// Upload a parameter block, visible to every dispatch issued afterwards
    ///
    /// # Errors
    ///
    /// Returns `FluidError::MapFailure` if the block's buffer cannot be mapped
    fn push_params(&mut self, block: &ParameterBlock) -> Result<(), FluidError>;

    /// Zero every cell of a volume
    fn clear_volume(&mut self, handle: VolumeHandle);

    /// Run a kernel over the whole grid
    ///
    /// `output` must not appear in `inputs`.
    fn dispatch(&mut self, kernel: &Self::Kernel, inputs: &[VolumeHandle], output: VolumeHandle);

    /// Copy a volume back to host memory
    ///
    /// # Errors
    ///
    /// Returns `FluidError::UnknownVolume` for foreign handles and
    /// `FluidError::MapFailure` if the readback buffer cannot be mapped
    fn read_volume(&self, handle: VolumeHandle) -> Result<Vec<f32>, FluidError>;

    /// Overwrite a volume from host memory
    ///
    /// # Errors
    ///
    /// Returns `FluidError::SizeMismatch` if `data` does not match the volume size
    fn write_volume(&mut self, handle: VolumeHandle, data: &[f32]) -> Result<(), FluidError>;
}
