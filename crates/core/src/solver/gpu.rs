//! GPU compute backend
//!
//! This module implements `ComputeBackend` on top of wgpu compute shaders and
//! storage buffers. It is only available when the `gpu` feature is enabled.
//!
//! # Shader Files
//!
//! GPU compute shaders are located in `shaders/`. Every kernel is compiled from
//! `common.wgsl` (uniform layouts and grid helpers) followed by its own body:
//! - `advect.wgsl` / `maccormack.wgsl` - Semi-Lagrangian transport, per field format
//! - `impulse.wgsl`, `buoyancy.wgsl` - Sources and forces
//! - `vorticity.wgsl`, `confinement.wgsl` - Vorticity confinement
//! - `divergence.wgsl`, `jacobi.wgsl`, `subtract_gradient.wgsl` - Pressure projection
//! - `obstacle.wgsl` - Boundary mask
//!
//! # Implementation
//!
//! Bindings 0-3 are the grid, general, advection and impulse uniforms, shared
//! by every kernel. Inputs follow from binding 4 in order, the output last.
//! Each dispatch is recorded into its own command buffer and submitted
//! immediately, so parameter writes queued before a dispatch are visible to it
//! and dispatches execute in call order.

use super::backend::{ComputeBackend, VolumeFormat, VolumeHandle};
use super::context::GpuContext;
use super::fields::GridDimensions;
use super::params::{AdvectionParams, GeneralParams, ImpulseParams, ParameterBlock};
use super::stage::{StageKind, WORKGROUP_SIZE};
use crate::FluidError;
use bytemuck::{Pod, Zeroable};
use rustc_hash::FxHashMap;
use std::borrow::Cow;
use tracing::{debug, warn};
use wgpu::util::DeviceExt;

const COMMON_WGSL: &str = include_str!("shaders/common.wgsl");

/// First binding used for stage inputs
const FIRST_VOLUME_BINDING: u32 = 4;

/// Grid uniform (must match WGSL struct layout)
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct GridParams {
    dims: [u32; 3],
    cell_count: u32,
}

struct GpuVolume {
    buffer: wgpu::Buffer,
    size: u64,
}

/// Compiled compute pipeline for one stage at fixed dimensions
pub struct GpuKernel {
    kind: StageKind,
    dims: GridDimensions,
    pipeline: wgpu::ComputePipeline,
    layout: wgpu::BindGroupLayout,
    grid_buffer: wgpu::Buffer,
}

impl GpuKernel {
    #[must_use]
    pub fn kind(&self) -> StageKind {
        self.kind
    }
}

/// wgpu backend: storage buffers for volumes, uniform buffers for parameter blocks
pub struct GpuBackend {
    context: GpuContext,
    volumes: FxHashMap<VolumeHandle, GpuVolume>,
    next_handle: u64,
    general_buffer: wgpu::Buffer,
    advection_buffer: wgpu::Buffer,
    impulse_buffer: wgpu::Buffer,
}

/// WGSL declarations that make the advection kernels format-generic
fn cell_prelude(format: VolumeFormat) -> &'static str {
    match format {
        VolumeFormat::Scalar => {
            "alias Cell = f32;\nfn zero_cell() -> Cell { return 0.0; }\n"
        }
        VolumeFormat::Vector => {
            "alias Cell = vec4<f32>;\nfn zero_cell() -> Cell { return vec4<f32>(0.0); }\n"
        }
    }
}

fn shader_body(kind: StageKind) -> &'static str {
    match kind {
        StageKind::Advection(_) => include_str!("shaders/advect.wgsl"),
        StageKind::MacCormack(_) => include_str!("shaders/maccormack.wgsl"),
        StageKind::Impulse => include_str!("shaders/impulse.wgsl"),
        StageKind::Buoyancy => include_str!("shaders/buoyancy.wgsl"),
        StageKind::Vorticity => include_str!("shaders/vorticity.wgsl"),
        StageKind::Confinement => include_str!("shaders/confinement.wgsl"),
        StageKind::Divergence => include_str!("shaders/divergence.wgsl"),
        StageKind::Jacobi => include_str!("shaders/jacobi.wgsl"),
        StageKind::SubtractGradient => include_str!("shaders/subtract_gradient.wgsl"),
        StageKind::Obstacle => include_str!("shaders/obstacle.wgsl"),
    }
}

/// Full WGSL source for a stage
fn shader_source(kind: StageKind) -> String {
    let format = match kind {
        StageKind::Advection(format) | StageKind::MacCormack(format) => format,
        _ => VolumeFormat::Scalar,
    };
    format!(
        "{}\n{}\n{}",
        cell_prelude(format),
        COMMON_WGSL,
        shader_body(kind)
    )
}

fn uniform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

/// Uniforms at 0-3, read-only inputs from 4, read-write output last
fn layout_entries(kind: StageKind) -> Vec<wgpu::BindGroupLayoutEntry> {
    let inputs = kind.input_count() as u32;
    let mut entries: Vec<_> = (0..FIRST_VOLUME_BINDING).map(uniform_entry).collect();
    entries.extend((0..inputs).map(|i| storage_entry(FIRST_VOLUME_BINDING + i, true)));
    entries.push(storage_entry(FIRST_VOLUME_BINDING + inputs, false));
    entries
}

impl GpuBackend {
    /// Create the backend and its parameter-block uniform buffers
    ///
    /// # Arguments
    ///
    /// * `context` - GPU context with device and queue
    #[must_use]
    pub fn new(context: GpuContext) -> Self {
        let device = context.device();
        let uniform = |label: &str, contents: &[u8]| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            })
        };
        let general_buffer = uniform(
            "General Params Buffer",
            bytemuck::bytes_of(&GeneralParams::default()),
        );
        let advection_buffer = uniform(
            "Advection Params Buffer",
            bytemuck::bytes_of(&AdvectionParams::default()),
        );
        let impulse_buffer = uniform(
            "Impulse Params Buffer",
            bytemuck::bytes_of(&ImpulseParams::default()),
        );

        Self {
            context,
            volumes: FxHashMap::default(),
            next_handle: 0,
            general_buffer,
            advection_buffer,
            impulse_buffer,
        }
    }

    /// Acquire a device and create the backend
    ///
    /// # Errors
    ///
    /// `FluidError::NoAdapter` or `FluidError::DeviceInit`
    pub fn try_new() -> Result<Self, FluidError> {
        GpuContext::try_new().map(Self::new)
    }

    #[must_use]
    pub fn context(&self) -> &GpuContext {
        &self.context
    }

    /// Number of live volumes
    #[must_use]
    pub fn volume_count(&self) -> usize {
        self.volumes.len()
    }

    /// Storage buffer behind a volume, for renderers sharing the device
    #[must_use]
    pub fn buffer(&self, handle: VolumeHandle) -> Option<&wgpu::Buffer> {
        self.volumes.get(&handle).map(|v| &v.buffer)
    }

    fn submit(&self, encoder: wgpu::CommandEncoder) {
        self.context.queue().submit(std::iter::once(encoder.finish()));
    }

    fn encoder(&self, label: &str) -> wgpu::CommandEncoder {
        self.context
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) })
    }
}

impl ComputeBackend for GpuBackend {
    type Kernel = GpuKernel;

    fn name(&self) -> &str {
        self.context.adapter_name()
    }

    fn is_gpu_accelerated(&self) -> bool {
        true
    }

    fn can_allocate(&self, dims: GridDimensions) -> bool {
        self.context.can_allocate(dims)
    }

    fn create_volume(
        &mut self,
        dims: GridDimensions,
        format: VolumeFormat,
        label: &str,
    ) -> Result<VolumeHandle, FluidError> {
        let device = self.context.device();
        let size = dims.cell_count() as u64 * format.bytes_per_cell();
        let limit = u64::from(device.limits().max_storage_buffer_binding_size);
        if size == 0 || size > limit {
            return Err(FluidError::ResourceCreation {
                resource: label.to_string(),
                message: format!("{size} bytes is outside the storage binding limit of {limit}"),
            });
        }

        device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        // New buffers are zero-initialized by wgpu
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        if let Some(error) = pollster::block_on(device.pop_error_scope()) {
            return Err(FluidError::ResourceCreation {
                resource: label.to_string(),
                message: error.to_string(),
            });
        }

        self.next_handle += 1;
        let handle = VolumeHandle(self.next_handle);
        debug!("Allocated GPU volume {} {} ({} bytes)", handle, label, size);
        self.volumes.insert(handle, GpuVolume { buffer, size });
        Ok(handle)
    }

    fn release_volume(&mut self, handle: VolumeHandle) {
        if let Some(volume) = self.volumes.remove(&handle) {
            volume.buffer.destroy();
        }
    }

    fn create_kernel(
        &mut self,
        kind: StageKind,
        dims: GridDimensions,
    ) -> Result<GpuKernel, FluidError> {
        let device = self.context.device();
        let label = kind.label();

        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(Cow::Owned(shader_source(kind))),
        });

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(label),
            entries: &layout_entries(kind),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(label),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(label),
            layout: Some(&pipeline_layout),
            module: &module,
            entry_point: "main",
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        });

        let grid = GridParams {
            dims: [dims.x, dims.y, dims.z],
            cell_count: dims.cell_count() as u32,
        };
        let grid_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Grid Params Buffer"),
            contents: bytemuck::bytes_of(&grid),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        if let Some(error) = pollster::block_on(device.pop_error_scope()) {
            return Err(FluidError::ResourceCreation {
                resource: format!("{label} kernel"),
                message: error.to_string(),
            });
        }

        Ok(GpuKernel {
            kind,
            dims,
            pipeline,
            layout,
            grid_buffer,
        })
    }

    fn push_params(&mut self, block: &ParameterBlock) -> Result<(), FluidError> {
        let (buffer, bytes) = match block {
            ParameterBlock::General(params) => (&self.general_buffer, bytemuck::bytes_of(params)),
            ParameterBlock::Advection(params) => {
                (&self.advection_buffer, bytemuck::bytes_of(params))
            }
            ParameterBlock::Impulse(params) => (&self.impulse_buffer, bytemuck::bytes_of(params)),
        };
        let map_failure = FluidError::MapFailure {
            block: block.name(),
        };

        let size = wgpu::BufferSize::new(bytes.len() as u64).ok_or(map_failure.clone())?;
        let mut view = self
            .context
            .queue()
            .write_buffer_with(buffer, 0, size)
            .ok_or(map_failure)?;
        view.copy_from_slice(bytes);
        Ok(())
    }

    fn clear_volume(&mut self, handle: VolumeHandle) {
        let Some(volume) = self.volumes.get(&handle) else {
            warn!("Clear of unknown volume {}", handle);
            return;
        };
        let mut encoder = self.encoder("Clear Volume Encoder");
        encoder.clear_buffer(&volume.buffer, 0, None);
        self.submit(encoder);
    }

    fn dispatch(&mut self, kernel: &GpuKernel, inputs: &[VolumeHandle], output: VolumeHandle) {
        let label = kernel.kind.label();

        let mut volumes = Vec::with_capacity(inputs.len() + 1);
        for handle in inputs.iter().chain(std::iter::once(&output)) {
            match self.volumes.get(handle) {
                Some(volume) => volumes.push(&volume.buffer),
                None => {
                    warn!("Skipping {} dispatch: unknown volume {}", label, handle);
                    return;
                }
            }
        }

        let mut entries = vec![
            wgpu::BindGroupEntry {
                binding: 0,
                resource: kernel.grid_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: self.general_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: self.advection_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 3,
                resource: self.impulse_buffer.as_entire_binding(),
            },
        ];
        entries.extend(
            volumes
                .iter()
                .enumerate()
                .map(|(i, buffer)| wgpu::BindGroupEntry {
                    binding: FIRST_VOLUME_BINDING + i as u32,
                    resource: buffer.as_entire_binding(),
                }),
        );

        let bind_group = self
            .context
            .device()
            .create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(label),
                layout: &kernel.layout,
                entries: &entries,
            });

        let mut encoder = self.encoder(label);
        {
            let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(label),
                timestamp_writes: None,
            });
            compute_pass.set_pipeline(&kernel.pipeline);
            compute_pass.set_bind_group(0, &bind_group, &[]);
            let [x, y, z] = kernel.dims.workgroups(WORKGROUP_SIZE);
            compute_pass.dispatch_workgroups(x, y, z);
        }
        self.submit(encoder);
    }

    fn read_volume(&self, handle: VolumeHandle) -> Result<Vec<f32>, FluidError> {
        let volume = self
            .volumes
            .get(&handle)
            .ok_or(FluidError::UnknownVolume(handle))?;
        let device = self.context.device();

        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Volume Readback Staging"),
            size: volume.size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self.encoder("Volume Readback Encoder");
        encoder.copy_buffer_to_buffer(&volume.buffer, 0, &staging, 0, volume.size);
        self.submit(encoder);

        let buffer_slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });

        let _ = device.poll(wgpu::Maintain::Wait);
        match rx.recv() {
            Ok(Ok(())) => {}
            _ => return Err(FluidError::MapFailure { block: "readback" }),
        }

        let data = buffer_slice.get_mapped_range();
        let result: Vec<f32> = bytemuck::cast_slice(&data).to_vec();
        drop(data);
        staging.unmap();

        Ok(result)
    }

    fn write_volume(&mut self, handle: VolumeHandle, data: &[f32]) -> Result<(), FluidError> {
        let volume = self
            .volumes
            .get(&handle)
            .ok_or(FluidError::UnknownVolume(handle))?;
        let expected = (volume.size / std::mem::size_of::<f32>() as u64) as usize;
        if data.len() != expected {
            return Err(FluidError::SizeMismatch {
                expected,
                actual: data.len(),
            });
        }
        self.context
            .queue()
            .write_buffer(&volume.buffer, 0, bytemuck::cast_slice(data));
        Ok(())
    }
}
