//! Runtime settings changes and error propagation

mod common;

use common::quiescent_settings;
use fluid_sim_core::solver::{
    ComputeBackend, CpuKernel, ParameterBlock, StageKind, VolumeFormat, VolumeHandle,
};
use fluid_sim_core::{
    create_cpu_solver, CpuBackend, FieldKind, FluidError, FluidSettings, GridDimensions, Solver,
};

fn settings() -> FluidSettings {
    FluidSettings {
        dimensions: GridDimensions::cube(8),
        jacobi_iterations: 5,
        ..FluidSettings::default()
    }
}

#[test]
fn test_source_change_does_not_repush_general_block() {
    let mut solver = create_cpu_solver(settings()).unwrap();
    solver.step(0.1).unwrap();
    assert_eq!(solver.stats().general_pushes, 1);

    let change = solver
        .apply_settings(FluidSettings {
            constant_density_amount: 3.0,
            ..settings()
        })
        .unwrap();
    assert!(!change.general);
    assert!(!change.reallocate);

    solver.step(0.1).unwrap();
    assert_eq!(solver.stats().general_pushes, 1);
    assert_eq!(solver.settings().constant_density_amount, 3.0);
}

#[test]
fn test_force_change_repushes_general_block_once() {
    let mut solver = create_cpu_solver(settings()).unwrap();
    let change = solver
        .apply_settings(FluidSettings {
            vorticity_strength: 0.8,
            ..settings()
        })
        .unwrap();
    assert!(change.general);
    assert!(!change.reallocate);

    // Deferred to the next step
    assert_eq!(solver.stats().general_pushes, 1);
    solver.step(0.1).unwrap();
    solver.step(0.1).unwrap();
    assert_eq!(solver.stats().general_pushes, 2);
}

#[test]
fn test_dimension_change_reallocates_everything() {
    let mut solver = create_cpu_solver(settings()).unwrap();
    solver.step(0.1).unwrap();
    let old_density = solver.volume_texture();
    let volumes = solver.backend().volume_count();

    let change = solver
        .apply_settings(FluidSettings {
            dimensions: GridDimensions::new(12, 16, 10),
            ..settings()
        })
        .unwrap();
    assert!(change.reallocate);
    assert!(change.general);

    let stats = solver.stats();
    assert_eq!(stats.reallocations, 1);
    assert_eq!(solver.dimensions(), GridDimensions::new(12, 16, 10));
    assert_eq!(solver.backend().volume_count(), volumes);
    assert_eq!(
        solver.backend().read_volume(old_density),
        Err(FluidError::UnknownVolume(old_density))
    );

    // Fresh fields start empty
    let density = solver.read_density().unwrap();
    assert_eq!(density.len(), 12 * 16 * 10);
    assert!(density.iter().all(|d| *d == 0.0));

    solver.step(0.1).unwrap();
    assert!(solver.read_density().unwrap().iter().any(|d| *d > 0.0));
}

#[test]
fn test_invalid_update_keeps_previous_settings() {
    let mut solver = create_cpu_solver(settings()).unwrap();
    let result = solver.apply_settings(FluidSettings {
        time_step: -1.0,
        ..settings()
    });
    assert!(matches!(result, Err(FluidError::InvalidSettings(_))));
    assert_eq!(solver.settings(), &settings());
    solver.step(0.1).unwrap();
}

#[test]
fn test_upload_checks_length() {
    let mut solver = Solver::new(CpuBackend::new(), quiescent_settings(8)).unwrap();
    assert_eq!(
        solver.upload_field(FieldKind::Velocity, &[0.0; 512]),
        Err(FluidError::SizeMismatch {
            expected: 2048,
            actual: 512
        })
    );
}

/// CPU backend with a cell budget whose advection block can stop mapping
struct FailingBackend {
    inner: CpuBackend,
    fail_advection: bool,
    max_cells: usize,
}

impl ComputeBackend for FailingBackend {
    type Kernel = CpuKernel;

    fn name(&self) -> &str {
        "failing"
    }

    fn is_gpu_accelerated(&self) -> bool {
        false
    }

    fn can_allocate(&self, dims: GridDimensions) -> bool {
        dims.cell_count() <= self.max_cells
    }

    fn create_volume(
        &mut self,
        dims: GridDimensions,
        format: VolumeFormat,
        label: &str,
    ) -> Result<VolumeHandle, FluidError> {
        self.inner.create_volume(dims, format, label)
    }

    fn release_volume(&mut self, handle: VolumeHandle) {
        self.inner.release_volume(handle);
    }

    fn create_kernel(
        &mut self,
        kind: StageKind,
        dims: GridDimensions,
    ) -> Result<CpuKernel, FluidError> {
        self.inner.create_kernel(kind, dims)
    }

    fn push_params(&mut self, block: &ParameterBlock) -> Result<(), FluidError> {
        if self.fail_advection && matches!(block, ParameterBlock::Advection(_)) {
            return Err(FluidError::MapFailure { block: block.name() });
        }
        self.inner.push_params(block)
    }

    fn clear_volume(&mut self, handle: VolumeHandle) {
        self.inner.clear_volume(handle);
    }

    fn dispatch(&mut self, kernel: &CpuKernel, inputs: &[VolumeHandle], output: VolumeHandle) {
        self.inner.dispatch(kernel, inputs, output);
    }

    fn read_volume(&self, handle: VolumeHandle) -> Result<Vec<f32>, FluidError> {
        self.inner.read_volume(handle)
    }

    fn write_volume(&mut self, handle: VolumeHandle, data: &[f32]) -> Result<(), FluidError> {
        self.inner.write_volume(handle, data)
    }
}

#[test]
fn test_map_failure_abandons_step() {
    let backend = FailingBackend {
        inner: CpuBackend::new(),
        fail_advection: false,
        max_cells: usize::MAX,
    };
    let mut solver = Solver::new(backend, settings()).unwrap();
    solver.step(0.1).unwrap();

    solver.backend_mut().fail_advection = true;
    assert_eq!(
        solver.step(0.1),
        Err(FluidError::MapFailure { block: "advection" })
    );
    assert_eq!(solver.stats().steps, 1);

    // Stepping resumes once the block maps again
    solver.backend_mut().fail_advection = false;
    solver.step(0.1).unwrap();
    assert_eq!(solver.stats().steps, 2);
}

#[test]
fn test_growth_past_budget_is_rejected_before_allocating() {
    let backend = FailingBackend {
        inner: CpuBackend::new(),
        fail_advection: false,
        max_cells: 1000,
    };
    let mut solver = Solver::new(backend, settings()).unwrap();
    let volumes = solver.backend().inner.volume_count();
    let density = solver.volume_texture();

    let result = solver.apply_settings(FluidSettings {
        dimensions: GridDimensions::cube(16),
        ..settings()
    });
    assert!(matches!(result, Err(FluidError::ResourceCreation { .. })));
    assert_eq!(solver.dimensions(), GridDimensions::cube(8));
    assert_eq!(solver.stats().reallocations, 0);
    assert_eq!(solver.backend().inner.volume_count(), volumes);
    assert_eq!(solver.volume_texture(), density);
    solver.step(0.1).unwrap();

    // Shrinking stays within budget
    solver
        .apply_settings(FluidSettings {
            dimensions: GridDimensions::cube(6),
            ..settings()
        })
        .unwrap();
    assert_eq!(solver.stats().reallocations, 1);
}
