//! Smoke solver pipeline
//!
//! `Solver` owns the backend, every grid field, the obstacle mask and the
//! compiled stages, and runs them in a fixed order each step. Every stage that
//! produces a value downstream stages depend on is followed by a role swap, so
//! READ always names the latest complete result.

use super::backend::{ComputeBackend, VolumeFormat, VolumeHandle};
use super::fields::{BufferRole, GridDimensions, GridField};
use super::obstacle::ObstacleField;
use super::params::{AdvectionParams, GeneralParams, ImpulseParams, ParameterBlock};
use super::stage::{ComputeStage, StageKind};
use crate::interaction::{Ray, VolumeTransform};
use crate::settings::{AdvectionType, SettingsChange};
use crate::{FluidError, FluidSettings};
use nalgebra::Vector3;
use std::time::Instant;
use tracing::{debug, info, trace};

/// Radius in cells of impulses injected through `interact`
pub const INTERACTION_IMPULSE_RADIUS: f32 = 7.0;

/// Fields a host can read back or seed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Velocity,
    Density,
    Temperature,
    Pressure,
    Vorticity,
    Divergence,
    Obstacle,
}

impl FieldKind {
    /// Cell layout of the field
    #[must_use]
    pub fn format(self) -> VolumeFormat {
        match self {
            Self::Velocity | Self::Vorticity => VolumeFormat::Vector,
            Self::Density
            | Self::Temperature
            | Self::Pressure
            | Self::Divergence
            | Self::Obstacle => VolumeFormat::Scalar,
        }
    }
}

/// Counters describing solver activity
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SolverStats {
    /// Completed steps
    pub steps: u64,
    /// Uploads of the general parameter block
    pub general_pushes: u64,
    /// Full reallocations caused by dimension changes
    pub reallocations: u64,
    /// Sum of `dt` passed to `step`, in seconds
    pub simulated_time: f64,
    /// Host time spent enqueueing the last step
    pub last_step_ms: f64,
}

struct SimulationFields {
    velocity: GridField<4>,
    density: GridField<4>,
    temperature: GridField<4>,
    pressure: GridField<2>,
    vorticity: GridField<1>,
    divergence: GridField<1>,
}

impl SimulationFields {
    fn allocate<B: ComputeBackend>(
        backend: &mut B,
        dims: GridDimensions,
    ) -> Result<Self, FluidError> {
        let mut created = Vec::new();
        let result = Self::allocate_tracked(backend, dims, &mut created);
        if result.is_err() {
            for handle in created {
                backend.release_volume(handle);
            }
        }
        result
    }

    fn allocate_tracked<B: ComputeBackend>(
        backend: &mut B,
        dims: GridDimensions,
        created: &mut Vec<VolumeHandle>,
    ) -> Result<Self, FluidError> {
        fn track<const N: usize>(
            field: GridField<N>,
            created: &mut Vec<VolumeHandle>,
        ) -> GridField<N> {
            created.extend_from_slice(field.handles());
            field
        }

        use VolumeFormat::{Scalar, Vector};
        let velocity = track(GridField::allocate(backend, dims, Vector, "velocity")?, created);
        let density = track(GridField::allocate(backend, dims, Scalar, "density")?, created);
        let temperature = track(
            GridField::allocate(backend, dims, Scalar, "temperature")?,
            created,
        );
        let pressure = track(GridField::allocate(backend, dims, Scalar, "pressure")?, created);
        let vorticity = track(GridField::allocate(backend, dims, Vector, "vorticity")?, created);
        let divergence = track(
            GridField::allocate(backend, dims, Scalar, "divergence")?,
            created,
        );

        Ok(Self {
            velocity,
            density,
            temperature,
            pressure,
            vorticity,
            divergence,
        })
    }

    fn release<B: ComputeBackend>(self, backend: &mut B) {
        self.velocity.release(backend);
        self.density.release(backend);
        self.temperature.release(backend);
        self.pressure.release(backend);
        self.vorticity.release(backend);
        self.divergence.release(backend);
    }

    fn all_handles(&self) -> Vec<VolumeHandle> {
        let mut handles = Vec::with_capacity(16);
        handles.extend_from_slice(self.velocity.handles());
        handles.extend_from_slice(self.density.handles());
        handles.extend_from_slice(self.temperature.handles());
        handles.extend_from_slice(self.pressure.handles());
        handles.extend_from_slice(self.vorticity.handles());
        handles.extend_from_slice(self.divergence.handles());
        handles
    }
}

struct StageSet<B: ComputeBackend> {
    advect_scalar: ComputeStage<B>,
    advect_vector: ComputeStage<B>,
    maccormack: ComputeStage<B>,
    impulse: ComputeStage<B>,
    buoyancy: ComputeStage<B>,
    vorticity: ComputeStage<B>,
    confinement: ComputeStage<B>,
    divergence: ComputeStage<B>,
    jacobi: ComputeStage<B>,
    subtract_gradient: ComputeStage<B>,
}

impl<B: ComputeBackend> StageSet<B> {
    fn new(backend: &mut B, dims: GridDimensions) -> Result<Self, FluidError> {
        use VolumeFormat::{Scalar, Vector};
        Ok(Self {
            advect_scalar: ComputeStage::new(backend, StageKind::Advection(Scalar), dims)?,
            advect_vector: ComputeStage::new(backend, StageKind::Advection(Vector), dims)?,
            maccormack: ComputeStage::new(backend, StageKind::MacCormack(Scalar), dims)?,
            impulse: ComputeStage::new(backend, StageKind::Impulse, dims)?,
            buoyancy: ComputeStage::new(backend, StageKind::Buoyancy, dims)?,
            vorticity: ComputeStage::new(backend, StageKind::Vorticity, dims)?,
            confinement: ComputeStage::new(backend, StageKind::Confinement, dims)?,
            divergence: ComputeStage::new(backend, StageKind::Divergence, dims)?,
            jacobi: ComputeStage::new(backend, StageKind::Jacobi, dims)?,
            subtract_gradient: ComputeStage::new(backend, StageKind::SubtractGradient, dims)?,
        })
    }

    /// Advect `field` along `velocity` and swap the result into READ
    fn advect(
        &self,
        backend: &mut B,
        field: &mut GridField<4>,
        velocity: VolumeHandle,
        obstacle: VolumeHandle,
        scheme: AdvectionType,
        dissipation: f32,
    ) -> Result<(), FluidError> {
        let advect = match field.format() {
            VolumeFormat::Scalar => &self.advect_scalar,
            VolumeFormat::Vector => &self.advect_vector,
        };

        if scheme == AdvectionType::MacCormack && field.format() == VolumeFormat::Scalar {
            let read = field.current();
            let forward = field.slot(BufferRole::Write2);
            let backward = field.slot(BufferRole::Write3);

            backend.push_params(&ParameterBlock::Advection(AdvectionParams::new(1.0, 1.0)))?;
            advect.compute(backend, &[velocity, read, obstacle], forward);

            backend.push_params(&ParameterBlock::Advection(AdvectionParams::new(1.0, -1.0)))?;
            advect.compute(backend, &[velocity, forward, obstacle], backward);

            backend.push_params(&ParameterBlock::Advection(AdvectionParams::new(
                dissipation,
                1.0,
            )))?;
            self.maccormack.compute(
                backend,
                &[velocity, forward, backward, read, obstacle],
                field.slot(BufferRole::Write),
            );
            field.swap(BufferRole::Read, BufferRole::Write);
        } else {
            backend.push_params(&ParameterBlock::Advection(AdvectionParams::new(
                dissipation,
                1.0,
            )))?;
            advect.compute(
                backend,
                &[velocity, field.current(), obstacle],
                field.slot(BufferRole::Write2),
            );
            field.swap(BufferRole::Read, BufferRole::Write2);
        }
        Ok(())
    }

    /// Splat a Gaussian into `field` and swap the result into READ
    fn inject(
        &self,
        backend: &mut B,
        field: &mut GridField<4>,
        obstacle: VolumeHandle,
        params: ImpulseParams,
    ) -> Result<(), FluidError> {
        backend.push_params(&ParameterBlock::Impulse(params))?;
        self.impulse.compute(
            backend,
            &[field.current(), obstacle],
            field.slot(BufferRole::Write),
        );
        field.swap(BufferRole::Read, BufferRole::Write);
        Ok(())
    }
}

/// Everything that depends on the grid dimensions
struct Resources<B: ComputeBackend> {
    dims: GridDimensions,
    fields: SimulationFields,
    obstacle: ObstacleField,
    stages: StageSet<B>,
}

impl<B: ComputeBackend> Resources<B> {
    fn build(backend: &mut B, dims: GridDimensions) -> Result<Self, FluidError> {
        let stages = StageSet::new(backend, dims)?;
        let fields = SimulationFields::allocate(backend, dims)?;
        let obstacle = match ObstacleField::compute(backend, dims) {
            Ok(obstacle) => obstacle,
            Err(err) => {
                fields.release(backend);
                return Err(err);
            }
        };
        Ok(Self {
            dims,
            fields,
            obstacle,
            stages,
        })
    }

    fn release(self, backend: &mut B) {
        self.fields.release(backend);
        self.obstacle.release(backend);
    }

    fn handle(&self, kind: FieldKind) -> VolumeHandle {
        match kind {
            FieldKind::Velocity => self.fields.velocity.current(),
            FieldKind::Density => self.fields.density.current(),
            FieldKind::Temperature => self.fields.temperature.current(),
            FieldKind::Pressure => self.fields.pressure.current(),
            FieldKind::Vorticity => self.fields.vorticity.current(),
            FieldKind::Divergence => self.fields.divergence.current(),
            FieldKind::Obstacle => self.obstacle.handle(),
        }
    }

    fn buoyancy(&mut self, backend: &mut B) {
        let velocity = &mut self.fields.velocity;
        self.stages.buoyancy.compute(
            backend,
            &[
                velocity.current(),
                self.fields.temperature.current(),
                self.fields.density.current(),
            ],
            velocity.slot(BufferRole::Write),
        );
        velocity.swap(BufferRole::Read, BufferRole::Write);
    }

    fn confine_vorticity(&mut self, backend: &mut B) {
        let velocity = &mut self.fields.velocity;
        let vorticity = self.fields.vorticity.current();
        self.stages
            .vorticity
            .compute(backend, &[velocity.current()], vorticity);
        self.stages.confinement.compute(
            backend,
            &[velocity.current(), vorticity],
            velocity.slot(BufferRole::Write),
        );
        velocity.swap(BufferRole::Read, BufferRole::Write);
    }

    fn project(&mut self, backend: &mut B, iterations: u32) {
        let obstacle = self.obstacle.handle();
        let divergence = self.fields.divergence.current();
        let velocity = &mut self.fields.velocity;
        let pressure = &mut self.fields.pressure;

        self.stages
            .divergence
            .compute(backend, &[velocity.current(), obstacle], divergence);

        // No warm start: every solve begins from zero pressure
        backend.clear_volume(pressure.current());
        for _ in 0..iterations {
            self.stages.jacobi.compute(
                backend,
                &[pressure.current(), divergence, obstacle],
                pressure.slot(BufferRole::Write),
            );
            pressure.swap(BufferRole::Read, BufferRole::Write);
        }

        self.stages.subtract_gradient.compute(
            backend,
            &[velocity.current(), pressure.current(), obstacle],
            velocity.slot(BufferRole::Write),
        );
        velocity.swap(BufferRole::Read, BufferRole::Write);
    }

    /// Inject density and temperature at a point given in cell coordinates
    fn splat(
        &mut self,
        backend: &mut B,
        point: Vector3<f32>,
        radius: f32,
        density: f32,
        temperature: f32,
    ) -> Result<(), FluidError> {
        let obstacle = self.obstacle.handle();
        self.stages.inject(
            backend,
            &mut self.fields.density,
            obstacle,
            ImpulseParams::new(point, radius, density),
        )?;
        self.stages.inject(
            backend,
            &mut self.fields.temperature,
            obstacle,
            ImpulseParams::new(point, radius, temperature),
        )
    }
}

/// Semi-Lagrangian smoke solver over a compute backend
pub struct Solver<B: ComputeBackend> {
    backend: B,
    settings: FluidSettings,
    resources: Resources<B>,
    general_dirty: bool,
    stats: SolverStats,
}

impl<B: ComputeBackend> Solver<B> {
    /// Build every field, stage and the obstacle mask, then push the general block
    ///
    /// # Arguments
    ///
    /// * `backend` - Backend the solver takes ownership of
    /// * `settings` - Initial configuration
    ///
    /// # Errors
    ///
    /// Returns `FluidError::InvalidSettings` for unusable settings and any
    /// resource creation or mapping error raised by the backend. Partially
    /// created resources are released before returning.
    pub fn new(mut backend: B, settings: FluidSettings) -> Result<Self, FluidError> {
        settings.validate()?;
        let resources = Resources::build(&mut backend, settings.dimensions)?;
        info!(
            "Fluid solver initialized: {} grid on {}",
            settings.dimensions,
            backend.name()
        );

        let mut solver = Self {
            backend,
            settings,
            resources,
            general_dirty: true,
            stats: SolverStats::default(),
        };
        solver.push_general()?;
        Ok(solver)
    }

    fn push_general(&mut self) -> Result<(), FluidError> {
        self.backend
            .push_params(&ParameterBlock::General(GeneralParams::from_settings(
                &self.settings,
            )))?;
        self.general_dirty = false;
        self.stats.general_pushes += 1;
        debug!("General parameters pushed");
        Ok(())
    }

    /// Advance the simulation by one fixed step
    ///
    /// Integration always uses `settings.time_step`; `dt` is the host frame
    /// time and only feeds `stats().simulated_time`.
    ///
    /// # Errors
    ///
    /// Returns `FluidError::MapFailure` if a parameter block cannot be mapped.
    /// The step is abandoned at that point.
    pub fn step(&mut self, dt: f32) -> Result<(), FluidError> {
        let started = Instant::now();

        if self.general_dirty {
            self.push_general()?;
        }

        let settings = &self.settings;
        let backend = &mut self.backend;
        let resources = &mut self.resources;
        let obstacle = resources.obstacle.handle();
        let stages = &resources.stages;
        let fields = &mut resources.fields;

        let velocity = fields.velocity.current();
        stages.advect(
            backend,
            &mut fields.temperature,
            velocity,
            obstacle,
            AdvectionType::Normal,
            settings.temperature_dissipation,
        )?;
        stages.advect(
            backend,
            &mut fields.density,
            velocity,
            obstacle,
            settings.advection_type,
            settings.density_dissipation,
        )?;
        stages.advect(
            backend,
            &mut fields.velocity,
            velocity,
            obstacle,
            AdvectionType::Normal,
            settings.velocity_dissipation,
        )?;

        resources.buoyancy(backend);

        let source = resources
            .dims
            .as_vector()
            .component_mul(&settings.constant_input_position);
        resources.splat(
            backend,
            source,
            settings.constant_input_radius,
            settings.constant_density_amount,
            settings.constant_temperature,
        )?;

        resources.confine_vorticity(backend);
        resources.project(backend, settings.jacobi_iterations);

        self.stats.steps += 1;
        self.stats.simulated_time += f64::from(dt);
        self.stats.last_step_ms = started.elapsed().as_secs_f64() * 1000.0;
        trace!(
            "Step {} enqueued in {:.3} ms",
            self.stats.steps,
            self.stats.last_step_ms
        );
        Ok(())
    }

    /// Run the projection alone: divergence, pressure solve and gradient subtraction
    pub fn project(&mut self) {
        self.resources
            .project(&mut self.backend, self.settings.jacobi_iterations);
    }

    /// Replace the settings
    ///
    /// Changes to dimensions, time step, buoyancy, weight or vorticity strength
    /// mark the general block for re-upload at the start of the next step. A
    /// dimension change also rebuilds every field, stage and the obstacle mask;
    /// the old resources are kept until the new ones exist.
    ///
    /// # Errors
    ///
    /// Returns `FluidError::InvalidSettings`, or `FluidError::ResourceCreation`
    /// when the new grid exceeds the backend's memory budget or fails to
    /// allocate. On error the solver keeps running with its previous settings.
    pub fn apply_settings(
        &mut self,
        settings: FluidSettings,
    ) -> Result<SettingsChange, FluidError> {
        settings.validate()?;
        let change = self.settings.diff(&settings);

        if change.reallocate {
            if !self.backend.can_allocate(settings.dimensions) {
                return Err(FluidError::ResourceCreation {
                    resource: "fluid fields".to_string(),
                    message: format!(
                        "{} grid exceeds the memory budget of {}",
                        settings.dimensions,
                        self.backend.name()
                    ),
                });
            }
            let resources = Resources::build(&mut self.backend, settings.dimensions)?;
            let old = std::mem::replace(&mut self.resources, resources);
            old.release(&mut self.backend);
            self.stats.reallocations += 1;
            info!(
                "Fluid solver reinitialized: {} -> {} grid",
                self.settings.dimensions, settings.dimensions
            );
        }
        if change.general {
            self.general_dirty = true;
        }

        self.settings = settings;
        Ok(change)
    }

    #[must_use]
    pub fn settings(&self) -> &FluidSettings {
        &self.settings
    }

    #[must_use]
    pub fn dimensions(&self) -> GridDimensions {
        self.resources.dims
    }

    /// Handle of the current density volume, for the renderer
    #[must_use]
    pub fn volume_texture(&self) -> VolumeHandle {
        self.resources.fields.density.current()
    }

    /// Handle of the current volume of a field
    #[must_use]
    pub fn field_handle(&self, kind: FieldKind) -> VolumeHandle {
        self.resources.handle(kind)
    }

    /// Every volume handle owned by the simulation fields, grouped by field
    #[must_use]
    pub fn field_handles(&self) -> Vec<VolumeHandle> {
        self.resources.fields.all_handles()
    }

    /// Read the current density back to host memory
    ///
    /// # Errors
    ///
    /// Propagates readback failures from the backend
    pub fn read_density(&self) -> Result<Vec<f32>, FluidError> {
        self.read_field(FieldKind::Density)
    }

    /// Read the current value of a field back to host memory
    ///
    /// # Errors
    ///
    /// Propagates readback failures from the backend
    pub fn read_field(&self, kind: FieldKind) -> Result<Vec<f32>, FluidError> {
        self.backend.read_volume(self.resources.handle(kind))
    }

    /// Overwrite the current value of a field
    ///
    /// # Errors
    ///
    /// Returns `FluidError::ReadOnlyField` for the obstacle mask and
    /// `FluidError::SizeMismatch` if `data` has the wrong length
    pub fn upload_field(&mut self, kind: FieldKind, data: &[f32]) -> Result<(), FluidError> {
        if kind == FieldKind::Obstacle {
            return Err(FluidError::ReadOnlyField(kind));
        }
        self.backend.write_volume(self.resources.handle(kind), data)
    }

    /// Fill every fluid cell of a field with `value`
    ///
    /// Solid cells are written as zero. Vector fields receive `value` in all
    /// three components.
    ///
    /// # Errors
    ///
    /// Same as `upload_field`
    pub fn fill_field(&mut self, kind: FieldKind, value: f32) -> Result<(), FluidError> {
        let solid = self.resources.obstacle.solid_cells(&self.backend)?;
        let data: Vec<f32> = match kind.format() {
            VolumeFormat::Scalar => solid
                .iter()
                .map(|&s| if s { 0.0 } else { value })
                .collect(),
            VolumeFormat::Vector => solid
                .iter()
                .flat_map(|&s| {
                    if s {
                        [0.0; 4]
                    } else {
                        [value, value, value, 0.0]
                    }
                })
                .collect(),
        };
        self.upload_field(kind, &data)
    }

    /// Zero every simulation field; the obstacle mask is kept
    pub fn reset(&mut self) {
        for handle in self.resources.fields.all_handles() {
            self.backend.clear_volume(handle);
        }
        debug!("Fluid fields reset");
    }

    /// Inject density and temperature at a normalized local-space point
    ///
    /// # Arguments
    ///
    /// * `local_point` - Position in 0..1 per axis, clamped into the volume
    ///
    /// # Errors
    ///
    /// Returns `FluidError::MapFailure` if the impulse block cannot be mapped
    pub fn interact(&mut self, local_point: Vector3<f32>) -> Result<(), FluidError> {
        let local = local_point.map(|c| c.clamp(0.0, 1.0));
        let point = self.resources.dims.as_vector().component_mul(&local);
        debug!("Interaction impulse at cell {:?}", point);
        self.resources.splat(
            &mut self.backend,
            point,
            INTERACTION_IMPULSE_RADIUS,
            self.settings.constant_density_amount,
            self.settings.constant_temperature,
        )
    }

    /// Inject an impulse where `ray` enters the volume
    ///
    /// # Returns
    ///
    /// `true` if the ray hit the volume and an impulse was injected
    ///
    /// # Errors
    ///
    /// Same as `interact`
    pub fn interact_ray(
        &mut self,
        transform: &VolumeTransform,
        ray: &Ray,
    ) -> Result<bool, FluidError> {
        match transform.intersect(ray) {
            Some(distance) => {
                self.interact(transform.local_position(ray, distance))?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    #[must_use]
    pub fn stats(&self) -> SolverStats {
        self.stats
    }

    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Mutable backend access, for hosts that share the device with a renderer
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}
