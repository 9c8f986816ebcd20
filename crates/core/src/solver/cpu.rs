//! CPU compute backend
//!
//! Volumes live in host memory in a handle-keyed arena. Kernels run one after
//! another in dispatch order; each one is parallelized over z-slices with rayon.
//! This backend is always available and is the reference for the GPU shaders.

use super::backend::{ComputeBackend, VolumeFormat, VolumeHandle};
use super::fields::GridDimensions;
use super::kernels::{self, Lattice};
use super::params::{AdvectionParams, GeneralParams, ImpulseParams, ParameterBlock};
use super::stage::StageKind;
use crate::FluidError;
use rustc_hash::FxHashMap;
use tracing::{debug, warn};

#[derive(Debug)]
struct CpuVolume {
    format: VolumeFormat,
    dims: GridDimensions,
    data: Vec<f32>,
}

/// Kernel descriptor for the CPU backend
#[derive(Debug, Clone, Copy)]
pub struct CpuKernel {
    kind: StageKind,
    dims: GridDimensions,
}

impl CpuKernel {
    /// Stage this kernel implements
    #[must_use]
    pub fn kind(&self) -> StageKind {
        self.kind
    }
}

/// Host-memory backend running kernels with rayon
#[derive(Debug, Default)]
pub struct CpuBackend {
    volumes: FxHashMap<VolumeHandle, CpuVolume>,
    next_handle: u64,
    general: GeneralParams,
    advection: AdvectionParams,
    impulse: ImpulseParams,
    dispatches: u64,
}

impl CpuBackend {
    /// Create an empty backend
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live volumes
    #[must_use]
    pub fn volume_count(&self) -> usize {
        self.volumes.len()
    }

    /// Number of kernel dispatches issued so far
    #[must_use]
    pub fn dispatch_count(&self) -> u64 {
        self.dispatches
    }

    fn volume(&self, handle: VolumeHandle) -> Result<&CpuVolume, FluidError> {
        self.volumes
            .get(&handle)
            .ok_or(FluidError::UnknownVolume(handle))
    }

    fn run(&self, kernel: &CpuKernel, inputs: &[&[f32]], dest: &mut [f32]) {
        let lattice = Lattice::new(kernel.dims);
        let general = &self.general;
        let advection = &self.advection;
        match (kernel.kind, inputs) {
            (StageKind::Advection(VolumeFormat::Scalar), [velocity, source, obstacle]) => {
                kernels::advect::<1>(lattice, general, advection, velocity, source, obstacle, dest);
            }
            (StageKind::Advection(VolumeFormat::Vector), [velocity, source, obstacle]) => {
                kernels::advect::<4>(lattice, general, advection, velocity, source, obstacle, dest);
            }
            (
                StageKind::MacCormack(VolumeFormat::Scalar),
                [velocity, forward, backward, original, obstacle],
            ) => kernels::maccormack::<1>(
                lattice, general, advection, velocity, forward, backward, original, obstacle,
                dest,
            ),
            (
                StageKind::MacCormack(VolumeFormat::Vector),
                [velocity, forward, backward, original, obstacle],
            ) => kernels::maccormack::<4>(
                lattice, general, advection, velocity, forward, backward, original, obstacle,
                dest,
            ),
            (StageKind::Impulse, [source, obstacle]) => {
                kernels::impulse(lattice, &self.impulse, source, obstacle, dest);
            }
            (StageKind::Buoyancy, [velocity, temperature, density]) => {
                kernels::buoyancy(lattice, general, velocity, temperature, density, dest);
            }
            (StageKind::Vorticity, [velocity]) => kernels::vorticity(lattice, velocity, dest),
            (StageKind::Confinement, [velocity, vorticity]) => {
                kernels::confinement(lattice, general, velocity, vorticity, dest);
            }
            (StageKind::Divergence, [velocity, obstacle]) => {
                kernels::divergence(lattice, velocity, obstacle, dest);
            }
            (StageKind::Jacobi, [pressure, divergence, obstacle]) => {
                kernels::jacobi(lattice, pressure, divergence, obstacle, dest);
            }
            (StageKind::SubtractGradient, [velocity, pressure, obstacle]) => {
                kernels::subtract_gradient(lattice, velocity, pressure, obstacle, dest);
            }
            (StageKind::Obstacle, []) => kernels::obstacle(lattice, dest),
            (kind, _) => warn!(
                "Skipping {} dispatch: expected {} inputs, got {}",
                kind.label(),
                kind.input_count(),
                inputs.len()
            ),
        }
    }
}

impl ComputeBackend for CpuBackend {
    type Kernel = CpuKernel;

    fn name(&self) -> &str {
        "CPU (rayon)"
    }

    fn is_gpu_accelerated(&self) -> bool {
        false
    }

    fn create_volume(
        &mut self,
        dims: GridDimensions,
        format: VolumeFormat,
        label: &str,
    ) -> Result<VolumeHandle, FluidError> {
        self.next_handle += 1;
        let handle = VolumeHandle(self.next_handle);
        let data = vec![0.0; dims.cell_count() * format.channels()];
        debug!("Allocated {} volume {} {} ({})", dims, handle, label, data.len());
        self.volumes.insert(
            handle,
            CpuVolume {
                format,
                dims,
                data,
            },
        );
        Ok(handle)
    }

    fn release_volume(&mut self, handle: VolumeHandle) {
        self.volumes.remove(&handle);
    }

    fn create_kernel(
        &mut self,
        kind: StageKind,
        dims: GridDimensions,
    ) -> Result<CpuKernel, FluidError> {
        if !dims.is_valid() {
            return Err(FluidError::ResourceCreation {
                resource: kind.label().to_string(),
                message: format!("empty grid {dims}"),
            });
        }
        Ok(CpuKernel { kind, dims })
    }

    fn push_params(&mut self, block: &ParameterBlock) -> Result<(), FluidError> {
        match *block {
            ParameterBlock::General(params) => self.general = params,
            ParameterBlock::Advection(params) => self.advection = params,
            ParameterBlock::Impulse(params) => self.impulse = params,
        }
        Ok(())
    }

    fn clear_volume(&mut self, handle: VolumeHandle) {
        if let Some(volume) = self.volumes.get_mut(&handle) {
            volume.data.fill(0.0);
        }
    }

    fn dispatch(&mut self, kernel: &CpuKernel, inputs: &[VolumeHandle], output: VolumeHandle) {
        debug_assert!(!inputs.contains(&output), "dispatch output aliases an input");

        // Take the output out of the arena so inputs can be borrowed alongside it
        let Some(mut dest) = self.volumes.remove(&output) else {
            warn!("Dispatch of {} to unknown volume {}", kernel.kind.label(), output);
            return;
        };
        debug_assert_eq!(dest.format, kernel.kind.output_format());
        debug_assert_eq!(dest.dims, kernel.dims);

        let sources: Option<Vec<&[f32]>> = inputs
            .iter()
            .map(|h| self.volumes.get(h).map(|v| v.data.as_slice()))
            .collect();
        match sources {
            Some(sources) => self.run(kernel, &sources, &mut dest.data),
            None => warn!("Dispatch of {} with unknown input volume", kernel.kind.label()),
        }

        self.volumes.insert(output, dest);
        self.dispatches += 1;
    }

    fn read_volume(&self, handle: VolumeHandle) -> Result<Vec<f32>, FluidError> {
        Ok(self.volume(handle)?.data.clone())
    }

    fn write_volume(&mut self, handle: VolumeHandle, data: &[f32]) -> Result<(), FluidError> {
        let volume = self
            .volumes
            .get_mut(&handle)
            .ok_or(FluidError::UnknownVolume(handle))?;
        if volume.data.len() != data.len() {
            return Err(FluidError::SizeMismatch {
                expected: volume.data.len(),
                actual: data.len(),
            });
        }
        volume.data.copy_from_slice(data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handles_are_never_reused() {
        let mut backend = CpuBackend::new();
        let dims = GridDimensions::cube(2);
        let a = backend
            .create_volume(dims, VolumeFormat::Scalar, "a")
            .unwrap();
        backend.release_volume(a);
        let b = backend
            .create_volume(dims, VolumeFormat::Scalar, "b")
            .unwrap();
        assert_ne!(a, b);
        assert_eq!(backend.volume_count(), 1);
    }

    #[test]
    fn test_write_rejects_wrong_length() {
        let mut backend = CpuBackend::new();
        let v = backend
            .create_volume(GridDimensions::cube(2), VolumeFormat::Vector, "v")
            .unwrap();
        assert_eq!(
            backend.write_volume(v, &[0.0; 8]),
            Err(FluidError::SizeMismatch {
                expected: 32,
                actual: 8
            })
        );
    }

    #[test]
    fn test_dispatch_writes_output_only() {
        let mut backend = CpuBackend::new();
        let dims = GridDimensions::cube(3);
        let source = backend
            .create_volume(dims, VolumeFormat::Scalar, "source")
            .unwrap();
        let open = backend
            .create_volume(dims, VolumeFormat::Scalar, "open")
            .unwrap();
        let dest = backend
            .create_volume(dims, VolumeFormat::Scalar, "dest")
            .unwrap();
        backend.write_volume(source, &[2.0; 27]).unwrap();
        backend
            .push_params(&ParameterBlock::Impulse(ImpulseParams::default()))
            .unwrap();

        let kernel = backend.create_kernel(StageKind::Impulse, dims).unwrap();
        backend.dispatch(&kernel, &[source, open], dest);

        assert_eq!(backend.read_volume(dest).unwrap(), vec![2.0; 27]);
        assert_eq!(backend.read_volume(source).unwrap(), vec![2.0; 27]);
        assert_eq!(backend.dispatch_count(), 1);
    }

    #[test]
    fn test_clear_zeroes_volume() {
        let mut backend = CpuBackend::new();
        let v = backend
            .create_volume(GridDimensions::cube(2), VolumeFormat::Scalar, "v")
            .unwrap();
        backend.write_volume(v, &[5.0; 8]).unwrap();
        backend.clear_volume(v);
        assert_eq!(backend.read_volume(v).unwrap(), vec![0.0; 8]);
    }
}
