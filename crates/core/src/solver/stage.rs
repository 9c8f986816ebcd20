//! Compute stages
//!
//! A stage is one kernel bound to fixed grid dimensions. It holds no state
//! between invocations apart from the compiled kernel; every input and output
//! is passed per call and every tunable arrives through a parameter block.

use super::backend::{ComputeBackend, VolumeFormat, VolumeHandle};
use super::fields::GridDimensions;
use crate::FluidError;
use tracing::debug;

/// Workgroup size used by every kernel
pub const WORKGROUP_SIZE: [u32; 3] = [4, 4, 4];

/// The kernels the solver pipeline is built from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    /// Semi-Lagrangian advection: velocity, source, obstacle
    Advection(VolumeFormat),
    /// MacCormack correction: velocity, forward, backward, original, obstacle
    MacCormack(VolumeFormat),
    /// Gaussian splat into a scalar field: source, obstacle
    Impulse,
    /// velocity, temperature, density
    Buoyancy,
    /// Curl of velocity
    Vorticity,
    /// velocity, vorticity
    Confinement,
    /// velocity, obstacle
    Divergence,
    /// pressure, divergence, obstacle
    Jacobi,
    /// velocity, pressure, obstacle
    SubtractGradient,
    /// Boundary mask, no inputs
    Obstacle,
}

impl StageKind {
    /// Label for logs and GPU debug names
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Advection(VolumeFormat::Scalar) => "advect_scalar",
            Self::Advection(VolumeFormat::Vector) => "advect_vector",
            Self::MacCormack(VolumeFormat::Scalar) => "maccormack_scalar",
            Self::MacCormack(VolumeFormat::Vector) => "maccormack_vector",
            Self::Impulse => "impulse",
            Self::Buoyancy => "buoyancy",
            Self::Vorticity => "vorticity",
            Self::Confinement => "confinement",
            Self::Divergence => "divergence",
            Self::Jacobi => "jacobi",
            Self::SubtractGradient => "subtract_gradient",
            Self::Obstacle => "obstacle",
        }
    }

    /// Formats of the input volumes, in binding order
    #[must_use]
    pub fn input_formats(&self) -> Vec<VolumeFormat> {
        use VolumeFormat::{Scalar, Vector};
        match *self {
            Self::Advection(format) => vec![Vector, format, Scalar],
            Self::MacCormack(format) => vec![Vector, format, format, format, Scalar],
            Self::Buoyancy | Self::SubtractGradient => vec![Vector, Scalar, Scalar],
            Self::Vorticity => vec![Vector],
            Self::Confinement => vec![Vector, Vector],
            Self::Divergence => vec![Vector, Scalar],
            Self::Impulse => vec![Scalar, Scalar],
            Self::Jacobi => vec![Scalar, Scalar, Scalar],
            Self::Obstacle => Vec::new(),
        }
    }

    /// Format of the output volume
    #[must_use]
    pub fn output_format(&self) -> VolumeFormat {
        match *self {
            Self::Advection(format) | Self::MacCormack(format) => format,
            Self::Buoyancy | Self::Vorticity | Self::Confinement | Self::SubtractGradient => {
                VolumeFormat::Vector
            }
            Self::Impulse | Self::Divergence | Self::Jacobi | Self::Obstacle => {
                VolumeFormat::Scalar
            }
        }
    }

    /// Number of input volumes
    #[must_use]
    pub fn input_count(&self) -> usize {
        self.input_formats().len()
    }
}

/// A kernel bound to fixed grid dimensions
pub struct ComputeStage<B: ComputeBackend> {
    kind: StageKind,
    kernel: B::Kernel,
}

impl<B: ComputeBackend> ComputeStage<B> {
    /// Compile the stage's kernel
    ///
    /// # Arguments
    ///
    /// * `backend` - Backend that compiles and later runs the kernel
    /// * `kind` - Which kernel
    /// * `dims` - Grid dimensions every dispatch covers
    ///
    /// # Errors
    ///
    /// Returns `FluidError::ResourceCreation` if the kernel fails to compile
    pub fn new(backend: &mut B, kind: StageKind, dims: GridDimensions) -> Result<Self, FluidError> {
        let kernel = backend.create_kernel(kind, dims)?;
        debug!(
            "Compiled {} stage for {} grid on {}",
            kind.label(),
            dims,
            backend.name()
        );
        Ok(Self { kind, kernel })
    }

    /// Dispatch the kernel once over the whole grid
    ///
    /// # Arguments
    ///
    /// * `backend` - Backend the kernel was compiled on
    /// * `inputs` - Input volumes in binding order
    /// * `output` - Target volume, distinct from every input
    pub fn compute(&self, backend: &mut B, inputs: &[VolumeHandle], output: VolumeHandle) {
        debug_assert_eq!(
            inputs.len(),
            self.kind.input_count(),
            "{} takes {} inputs",
            self.kind.label(),
            self.kind.input_count()
        );
        debug_assert!(
            !inputs.contains(&output),
            "{} output aliases an input",
            self.kind.label()
        );
        backend.dispatch(&self.kernel, inputs, output);
    }

    #[must_use]
    pub fn kind(&self) -> StageKind {
        self.kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_signatures() {
        assert_eq!(StageKind::MacCormack(VolumeFormat::Scalar).input_count(), 5);
        assert_eq!(StageKind::Obstacle.input_count(), 0);
        assert_eq!(
            StageKind::Advection(VolumeFormat::Vector).output_format(),
            VolumeFormat::Vector
        );
        assert_eq!(StageKind::Divergence.output_format(), VolumeFormat::Scalar);
        assert_eq!(
            StageKind::Vorticity.input_formats(),
            vec![VolumeFormat::Vector]
        );
    }
}
