//! Static obstacle mask
//!
//! The mask is produced once by the obstacle stage when the solver is built
//! and is only ever bound as a read-only input afterwards. It has no swap or
//! write API; a dimension change replaces it wholesale.

use super::backend::{ComputeBackend, VolumeFormat, VolumeHandle};
use super::fields::GridDimensions;
use super::stage::{ComputeStage, StageKind};
use crate::FluidError;
use tracing::debug;

/// Single-buffer scalar volume, 1 in solid cells and 0 in fluid cells
#[derive(Debug)]
pub struct ObstacleField {
    handle: VolumeHandle,
}

impl ObstacleField {
    /// Allocate the mask and run the obstacle stage into it
    ///
    /// The stage is compiled for this single dispatch and dropped afterwards.
    ///
    /// # Errors
    ///
    /// Returns `FluidError::ResourceCreation` if the volume or kernel cannot be created
    pub fn compute<B: ComputeBackend>(
        backend: &mut B,
        dims: GridDimensions,
    ) -> Result<Self, FluidError> {
        let handle = backend.create_volume(dims, VolumeFormat::Scalar, "obstacle")?;
        let stage = match ComputeStage::new(backend, StageKind::Obstacle, dims) {
            Ok(stage) => stage,
            Err(err) => {
                backend.release_volume(handle);
                return Err(err);
            }
        };
        stage.compute(backend, &[], handle);
        debug!("Obstacle mask computed for {} grid", dims);

        Ok(Self { handle })
    }

    /// Handle of the mask volume
    #[must_use]
    pub fn handle(&self) -> VolumeHandle {
        self.handle
    }

    /// Read the mask back as a per-cell solid flag
    ///
    /// # Errors
    ///
    /// Propagates readback failures from the backend
    pub fn solid_cells<B: ComputeBackend>(&self, backend: &B) -> Result<Vec<bool>, FluidError> {
        Ok(backend
            .read_volume(self.handle)?
            .into_iter()
            .map(|v| v > 0.5)
            .collect())
    }

    pub fn release<B: ComputeBackend>(self, backend: &mut B) {
        backend.release_volume(self.handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::CpuBackend;

    #[test]
    fn test_marks_exactly_the_outer_layer() {
        let mut backend = CpuBackend::new();
        let dims = GridDimensions::new(5, 4, 6);
        let obstacle = ObstacleField::compute(&mut backend, dims).unwrap();
        let solid = obstacle.solid_cells(&backend).unwrap();

        for z in 0..dims.z {
            for y in 0..dims.y {
                for x in 0..dims.x {
                    assert_eq!(
                        solid[dims.index(x, y, z)],
                        dims.is_boundary(x, y, z),
                        "cell ({x}, {y}, {z})"
                    );
                }
            }
        }
    }
}
