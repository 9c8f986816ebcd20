//! GPU context and initialization
//!
//! This module handles GPU device initialization and capability detection.
//! It distinguishes between "no GPU found" (expected on headless machines)
//! and "GPU found but failed to initialize" (potential driver issue).

use super::backend::VolumeFormat;

/// Result of GPU initialization attempt
///
/// This enum distinguishes between different failure modes:
/// - `NoGpuFound`: No compatible GPU adapter (silent fallback to CPU)
/// - `InitFailed`: GPU found but initialization failed (log warning)
#[derive(Debug)]
pub enum GpuInitResult {
    /// GPU initialized successfully
    #[cfg(feature = "gpu")]
    Success(GpuContext),
    /// No GPU adapter found (silent fallback to CPU)
    NoGpuFound,
    /// GPU found but initialization failed (log warning, fallback to CPU)
    InitFailed {
        /// Name of the adapter that failed
        adapter_name: String,
        /// Error message
        error: String,
    },
}

/// Bytes per cell across every volume the solver allocates
///
/// velocity ×4, density ×4, temperature ×4, pressure ×2, vorticity, divergence, obstacle
#[must_use]
pub fn solver_bytes_per_cell() -> u64 {
    let vector = VolumeFormat::Vector.bytes_per_cell();
    let scalar = VolumeFormat::Scalar.bytes_per_cell();
    4 * vector + 4 * scalar + 4 * scalar + 2 * scalar + vector + scalar + scalar
}

/// Storage buffers bound by the widest kernel (MacCormack: five inputs, one output)
pub const MAX_KERNEL_STORAGE_BUFFERS: u32 = 6;

// All GPU-specific code is conditionally compiled only when "gpu" feature is enabled
#[cfg(feature = "gpu")]
mod gpu_impl {
    use super::{solver_bytes_per_cell, GpuInitResult, VolumeFormat, MAX_KERNEL_STORAGE_BUFFERS};
    use crate::solver::{GridDimensions, WORKGROUP_SIZE};
    use crate::FluidError;
    use tracing::{debug, info};

    /// GPU context managing device and queue
    ///
    /// Wraps wgpu device and queue along with adapter information.
    #[derive(Debug)]
    pub struct GpuContext {
        device: wgpu::Device,
        queue: wgpu::Queue,
        adapter_info: wgpu::AdapterInfo,
    }

    impl GpuContext {
        /// Initialize GPU context
        ///
        /// Attempts to create a wgpu device and queue for compute work.
        ///
        /// # Returns
        ///
        /// - `GpuInitResult::Success` - GPU ready to use
        /// - `GpuInitResult::NoGpuFound` - No compatible GPU adapter
        /// - `GpuInitResult::InitFailed` - GPU found but initialization failed
        #[allow(clippy::new_ret_no_self)]
        pub fn new() -> GpuInitResult {
            info!("Attempting to initialize GPU context");

            let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
                backends: wgpu::Backends::all(),
                ..Default::default()
            });

            let adapter = if let Some(a) =
                pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
                    power_preference: wgpu::PowerPreference::HighPerformance,
                    compatible_surface: None,
                    force_fallback_adapter: false,
                })) {
                debug!("Found GPU adapter: {}", a.get_info().name);
                a
            } else {
                debug!("No GPU adapter found");
                return GpuInitResult::NoGpuFound;
            };

            let adapter_info = adapter.get_info();
            let adapter_name = adapter_info.name.clone();

            // Device creation can fail even with a valid adapter
            match pollster::block_on(adapter.request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("FluidSim GPU"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )) {
                Ok((device, queue)) => {
                    info!("GPU context initialized successfully: {}", adapter_name);
                    GpuInitResult::Success(Self {
                        device,
                        queue,
                        adapter_info,
                    })
                }
                Err(e) => {
                    debug!("Failed to create GPU device: {}", e);
                    GpuInitResult::InitFailed {
                        adapter_name,
                        error: e.to_string(),
                    }
                }
            }
        }

        /// Initialize GPU context, mapping failures to `FluidError`
        ///
        /// # Errors
        ///
        /// `FluidError::NoAdapter` or `FluidError::DeviceInit`
        pub fn try_new() -> Result<Self, FluidError> {
            match Self::new() {
                GpuInitResult::Success(context) => Ok(context),
                GpuInitResult::NoGpuFound => Err(FluidError::NoAdapter),
                GpuInitResult::InitFailed {
                    adapter_name,
                    error,
                } => Err(FluidError::DeviceInit {
                    adapter: adapter_name,
                    message: error,
                }),
            }
        }

        /// Get adapter name for logging
        #[must_use]
        pub fn adapter_name(&self) -> &str {
            &self.adapter_info.name
        }

        /// Check if the device can hold every volume of a grid
        ///
        /// # Arguments
        ///
        /// * `dims` - Grid dimensions in cells
        ///
        /// # Returns
        ///
        /// `true` if every single volume fits a storage binding and the total
        /// stays within half of the device's buffer limit
        #[must_use]
        pub fn can_allocate(&self, dims: GridDimensions) -> bool {
            let cells = dims.cell_count() as u64;
            let limits = self.device.limits();

            if limits.max_storage_buffers_per_shader_stage < MAX_KERNEL_STORAGE_BUFFERS {
                return false;
            }

            let largest_volume = cells * VolumeFormat::Vector.bytes_per_cell();
            if largest_volume > u64::from(limits.max_storage_buffer_binding_size)
                || largest_volume > limits.max_buffer_size
            {
                return false;
            }

            let max_workgroups = u64::from(limits.max_compute_workgroups_per_dimension);
            let workgroups = dims.workgroups(WORKGROUP_SIZE);
            if workgroups.iter().any(|&w| u64::from(w) > max_workgroups) {
                return false;
            }

            // Leave headroom for the renderer sharing the device
            cells * solver_bytes_per_cell() < limits.max_buffer_size / 2
        }

        /// Get reference to wgpu device
        #[must_use]
        pub fn device(&self) -> &wgpu::Device {
            &self.device
        }

        /// Get reference to wgpu queue
        #[must_use]
        pub fn queue(&self) -> &wgpu::Queue {
            &self.queue
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_gpu_init_returns_valid_result() {
            // Which variant we get depends on hardware availability
            match GpuContext::new() {
                GpuInitResult::Success(ctx) => {
                    assert!(!ctx.adapter_name().is_empty());
                }
                GpuInitResult::NoGpuFound => {}
                GpuInitResult::InitFailed {
                    adapter_name,
                    error,
                } => {
                    assert!(!adapter_name.is_empty());
                    assert!(!error.is_empty());
                }
            }
        }

        #[test]
        fn test_can_allocate() {
            if let GpuInitResult::Success(ctx) = GpuContext::new() {
                assert!(ctx.can_allocate(GridDimensions::cube(32)));
                assert!(!ctx.can_allocate(GridDimensions::cube(4096)));
            }
        }
    }
}

// Re-export GpuContext only when GPU feature is enabled
#[cfg(feature = "gpu")]
pub use gpu_impl::GpuContext;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_per_cell() {
        // 5 vector volumes at 16 bytes, 12 scalar volumes at 4 bytes
        assert_eq!(solver_bytes_per_cell(), 128);
    }
}
