//! Grid dimensions and multi-buffered grid fields
//!
//! A `GridField` owns N volumes of identical size and format and tracks which
//! slot plays which role. Rotating roles only exchanges handles; no cell data
//! is ever copied.

use super::backend::{ComputeBackend, VolumeFormat, VolumeHandle};
use crate::FluidError;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Size of the simulation grid in cells
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridDimensions {
    /// Cells along x
    pub x: u32,
    /// Cells along y (up)
    pub y: u32,
    /// Cells along z
    pub z: u32,
}

impl GridDimensions {
    /// Create dimensions from per-axis cell counts
    #[must_use]
    pub const fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }

    /// Cubic grid with `n` cells per axis
    #[must_use]
    pub const fn cube(n: u32) -> Self {
        Self { x: n, y: n, z: n }
    }

    /// Total number of cells
    #[must_use]
    pub fn cell_count(&self) -> usize {
        self.x as usize * self.y as usize * self.z as usize
    }

    /// `true` when every axis has at least one cell
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.x > 0 && self.y > 0 && self.z > 0
    }

    /// Linear index of a cell (x fastest, then y, then z)
    #[must_use]
    pub fn index(&self, x: u32, y: u32, z: u32) -> usize {
        (z as usize * self.y as usize + y as usize) * self.x as usize + x as usize
    }

    /// `true` when the cell lies on the outermost layer of the grid
    #[must_use]
    pub fn is_boundary(&self, x: u32, y: u32, z: u32) -> bool {
        x == 0 || y == 0 || z == 0 || x + 1 == self.x || y + 1 == self.y || z + 1 == self.z
    }

    /// Dimensions as a float vector, used to scale normalized positions
    #[must_use]
    pub fn as_vector(&self) -> Vector3<f32> {
        Vector3::new(self.x as f32, self.y as f32, self.z as f32)
    }

    /// Number of workgroups needed to cover the grid
    ///
    /// # Arguments
    ///
    /// * `workgroup` - Workgroup size per axis
    ///
    /// # Returns
    ///
    /// `ceil(dim / workgroup)` per axis
    #[must_use]
    pub fn workgroups(&self, workgroup: [u32; 3]) -> [u32; 3] {
        [
            self.x.div_ceil(workgroup[0]),
            self.y.div_ceil(workgroup[1]),
            self.z.div_ceil(workgroup[2]),
        ]
    }
}

impl std::fmt::Display for GridDimensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}x{}", self.x, self.y, self.z)
    }
}

/// Logical role of a slot in a `GridField`
///
/// `Read` always refers to the most recently completed write. The `Write*`
/// roles are scratch targets that are never read from outside the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferRole {
    /// Current value
    Read = 0,
    /// Primary scratch target
    Write = 1,
    /// Secondary scratch target (normal advection, MacCormack forward pass)
    Write2 = 2,
    /// Tertiary scratch target (MacCormack backward pass)
    Write3 = 3,
}

impl BufferRole {
    #[inline]
    fn slot(self) -> usize {
        self as usize
    }
}

/// N-buffered volume set with symbolic roles
#[derive(Debug)]
pub struct GridField<const N: usize> {
    slots: [VolumeHandle; N],
    format: VolumeFormat,
}

impl<const N: usize> GridField<N> {
    /// Allocate N zeroed volumes on the backend
    ///
    /// If any allocation fails, volumes created so far are released before
    /// the error is returned.
    ///
    /// # Arguments
    ///
    /// * `backend` - Backend that owns the volumes
    /// * `dims` - Grid dimensions
    /// * `format` - Scalar or vector cells
    /// * `label` - Debug label prefix
    ///
    /// # Errors
    ///
    /// Returns `FluidError::ResourceCreation` if the backend cannot allocate a volume
    pub fn allocate<B: ComputeBackend>(
        backend: &mut B,
        dims: GridDimensions,
        format: VolumeFormat,
        label: &str,
    ) -> Result<Self, FluidError> {
        let mut created = Vec::with_capacity(N);
        for slot in 0..N {
            match backend.create_volume(dims, format, &format!("{label}[{slot}]")) {
                Ok(handle) => created.push(handle),
                Err(err) => {
                    for handle in created {
                        backend.release_volume(handle);
                    }
                    return Err(err);
                }
            }
        }

        let slots: [VolumeHandle; N] = created
            .try_into()
            .map_err(|_| FluidError::ResourceCreation {
                resource: label.to_string(),
                message: "slot count mismatch".to_string(),
            })?;

        Ok(Self { slots, format })
    }

    /// Release every volume back to the backend
    pub fn release<B: ComputeBackend>(self, backend: &mut B) {
        for handle in self.slots {
            backend.release_volume(handle);
        }
    }

    /// Handle of the current (READ) volume
    #[must_use]
    pub fn current(&self) -> VolumeHandle {
        self.slots[BufferRole::Read.slot()]
    }

    /// Handle of the volume currently playing `role`
    ///
    /// Panics if `role` is outside this field's slot count.
    #[must_use]
    pub fn slot(&self, role: BufferRole) -> VolumeHandle {
        self.slots[role.slot()]
    }

    /// Exchange the roles of two slots
    pub fn swap(&mut self, a: BufferRole, b: BufferRole) {
        self.slots.swap(a.slot(), b.slot());
    }

    /// Cycle several roles at once
    ///
    /// The volume in `roles[0]` moves to `roles[1]`, `roles[1]` to `roles[2]`,
    /// and the last one wraps back to `roles[0]`.
    pub fn rotate(&mut self, roles: &[BufferRole]) {
        for pair in roles.windows(2).rev() {
            self.swap(pair[0], pair[1]);
        }
    }

    /// Every handle, in slot order
    #[must_use]
    pub fn handles(&self) -> &[VolumeHandle; N] {
        &self.slots
    }

    /// Cell format of every slot
    #[must_use]
    pub fn format(&self) -> VolumeFormat {
        self.format
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::CpuBackend;

    #[test]
    fn test_dimensions_index_and_boundary() {
        let dims = GridDimensions::new(4, 3, 2);
        assert_eq!(dims.cell_count(), 24);
        assert_eq!(dims.index(0, 0, 0), 0);
        assert_eq!(dims.index(1, 0, 0), 1);
        assert_eq!(dims.index(0, 1, 0), 4);
        assert_eq!(dims.index(0, 0, 1), 12);
        assert!(dims.is_boundary(0, 1, 1));
        assert!(dims.is_boundary(3, 1, 0));
        assert!(!GridDimensions::cube(3).is_boundary(1, 1, 1));
        assert_eq!(GridDimensions::cube(9).workgroups([4, 4, 4]), [3, 3, 3]);
    }

    #[test]
    fn test_swap_exchanges_handles_only() {
        let mut backend = CpuBackend::new();
        let dims = GridDimensions::cube(2);
        let mut field =
            GridField::<4>::allocate(&mut backend, dims, VolumeFormat::Scalar, "test").unwrap();
        let before = *field.handles();

        backend.write_volume(field.current(), &[1.0; 8]).unwrap();
        let volumes = backend.volume_count();

        field.swap(BufferRole::Read, BufferRole::Write2);

        assert_eq!(field.current(), before[2]);
        assert_eq!(field.slot(BufferRole::Write2), before[0]);
        assert_eq!(backend.volume_count(), volumes);
        // Data stays with the handle, not the role
        assert_eq!(backend.read_volume(before[0]).unwrap(), vec![1.0; 8]);
        assert_eq!(backend.read_volume(field.current()).unwrap(), vec![0.0; 8]);
    }

    #[test]
    fn test_rotate_cycles_roles() {
        let mut backend = CpuBackend::new();
        let mut field = GridField::<4>::allocate(
            &mut backend,
            GridDimensions::cube(2),
            VolumeFormat::Vector,
            "rotate",
        )
        .unwrap();
        let [a, b, c, d] = *field.handles();

        field.rotate(&[BufferRole::Read, BufferRole::Write, BufferRole::Write2]);

        assert_eq!(field.slot(BufferRole::Write), a);
        assert_eq!(field.slot(BufferRole::Write2), b);
        assert_eq!(field.current(), c);
        assert_eq!(field.slot(BufferRole::Write3), d);
    }

    #[test]
    fn test_release_frees_volumes() {
        let mut backend = CpuBackend::new();
        let field = GridField::<2>::allocate(
            &mut backend,
            GridDimensions::cube(3),
            VolumeFormat::Scalar,
            "release",
        )
        .unwrap();
        let handle = field.current();
        assert_eq!(backend.volume_count(), 2);

        field.release(&mut backend);

        assert_eq!(backend.volume_count(), 0);
        assert_eq!(
            backend.read_volume(handle),
            Err(FluidError::UnknownVolume(handle))
        );
    }
}
