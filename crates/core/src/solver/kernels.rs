//! Host implementations of the solver kernels
//!
//! These follow the WGSL shaders line for line: same sampling, same boundary
//! handling, same operation order. Each kernel writes every cell of its output
//! and parallelizes over z-slices.

use super::fields::GridDimensions;
use super::params::{AdvectionParams, GeneralParams, ImpulseParams};
use nalgebra::Vector3;
use rayon::prelude::*;

/// Obstacle values above this mark a solid cell
const SOLID_THRESHOLD: f32 = 0.5;

type Cell = [i32; 3];

/// Integer lattice helper for a fixed grid
#[derive(Debug, Clone, Copy)]
pub(crate) struct Lattice {
    nx: i32,
    ny: i32,
    nz: i32,
}

impl Lattice {
    pub(crate) fn new(dims: GridDimensions) -> Self {
        Self {
            nx: dims.x as i32,
            ny: dims.y as i32,
            nz: dims.z as i32,
        }
    }

    #[inline]
    fn contains(&self, c: Cell) -> bool {
        c[0] >= 0 && c[1] >= 0 && c[2] >= 0 && c[0] < self.nx && c[1] < self.ny && c[2] < self.nz
    }

    #[inline]
    fn clamp(&self, c: Cell) -> Cell {
        [
            c[0].clamp(0, self.nx - 1),
            c[1].clamp(0, self.ny - 1),
            c[2].clamp(0, self.nz - 1),
        ]
    }

    #[inline]
    fn index(&self, c: Cell) -> usize {
        ((c[2] * self.ny + c[1]) * self.nx + c[0]) as usize
    }

    #[inline]
    fn max_position(&self) -> [f32; 3] {
        [
            (self.nx - 1) as f32,
            (self.ny - 1) as f32,
            (self.nz - 1) as f32,
        ]
    }
}

#[inline]
fn offset(c: Cell, axis: usize, delta: i32) -> Cell {
    let mut n = c;
    n[axis] += delta;
    n
}

/// Read-only view of a volume with `C` channels per cell
#[derive(Clone, Copy)]
struct View<'a, const C: usize> {
    data: &'a [f32],
    lattice: Lattice,
}

impl<'a, const C: usize> View<'a, C> {
    fn new(data: &'a [f32], lattice: Lattice) -> Self {
        Self { data, lattice }
    }

    /// Cell value, clamped to the grid edge
    #[inline]
    fn at(&self, c: Cell) -> [f32; C] {
        let i = self.lattice.index(self.lattice.clamp(c)) * C;
        let mut out = [0.0; C];
        out.copy_from_slice(&self.data[i..i + C]);
        out
    }

    /// Trilinear sample at a continuous cell-space position, clamped to the grid edge
    fn sample(&self, p: [f32; 3]) -> [f32; C] {
        let (base, f) = split_position(self.lattice, p);
        let mut out = [0.0; C];
        let c000 = self.at(base);
        let c100 = self.at(offset(base, 0, 1));
        let c010 = self.at(offset(base, 1, 1));
        let c110 = self.at(offset(offset(base, 0, 1), 1, 1));
        let c001 = self.at(offset(base, 2, 1));
        let c101 = self.at(offset(offset(base, 0, 1), 2, 1));
        let c011 = self.at(offset(offset(base, 1, 1), 2, 1));
        let c111 = self.at([base[0] + 1, base[1] + 1, base[2] + 1]);
        for ch in 0..C {
            let x00 = lerp(c000[ch], c100[ch], f[0]);
            let x10 = lerp(c010[ch], c110[ch], f[0]);
            let x01 = lerp(c001[ch], c101[ch], f[0]);
            let x11 = lerp(c011[ch], c111[ch], f[0]);
            let y0 = lerp(x00, x10, f[1]);
            let y1 = lerp(x01, x11, f[1]);
            out[ch] = lerp(y0, y1, f[2]);
        }
        out
    }

    /// Per-channel min and max of the 8 cells surrounding a position
    fn corner_extrema(&self, p: [f32; 3]) -> ([f32; C], [f32; C]) {
        let (base, _) = split_position(self.lattice, p);
        let mut lo = [f32::INFINITY; C];
        let mut hi = [f32::NEG_INFINITY; C];
        for dz in 0..2 {
            for dy in 0..2 {
                for dx in 0..2 {
                    let v = self.at([base[0] + dx, base[1] + dy, base[2] + dz]);
                    for ch in 0..C {
                        lo[ch] = lo[ch].min(v[ch]);
                        hi[ch] = hi[ch].max(v[ch]);
                    }
                }
            }
        }
        (lo, hi)
    }
}

/// Obstacle mask view; cells outside the grid count as solid
#[derive(Clone, Copy)]
struct Solids<'a> {
    data: &'a [f32],
    lattice: Lattice,
}

impl Solids<'_> {
    #[inline]
    fn solid(&self, c: Cell) -> bool {
        !self.lattice.contains(c) || self.data[self.lattice.index(c)] > SOLID_THRESHOLD
    }
}

#[inline]
fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Clamp a position into the grid and split it into base cell and fraction
#[inline]
fn split_position(lattice: Lattice, p: [f32; 3]) -> (Cell, [f32; 3]) {
    let max = lattice.max_position();
    let mut base = [0; 3];
    let mut frac = [0.0; 3];
    for axis in 0..3 {
        let q = p[axis].clamp(0.0, max[axis]);
        let b = q.floor();
        base[axis] = b as i32;
        frac[axis] = q - b;
    }
    (base, frac)
}

#[inline]
fn xyz(v: [f32; 4]) -> Vector3<f32> {
    Vector3::new(v[0], v[1], v[2])
}

/// Run `kernel` for every cell, writing `C` channels per cell into `dest`
fn fill_cells<const C: usize, F>(lattice: Lattice, dest: &mut [f32], kernel: F)
where
    F: Fn(Cell) -> [f32; C] + Sync,
{
    let slab = (lattice.nx * lattice.ny) as usize * C;
    dest.par_chunks_mut(slab)
        .enumerate()
        .for_each(|(z, slice)| {
            for y in 0..lattice.ny {
                for x in 0..lattice.nx {
                    let at = (y * lattice.nx + x) as usize * C;
                    slice[at..at + C].copy_from_slice(&kernel([x, y, z as i32]));
                }
            }
        });
}

#[inline]
fn position(c: Cell) -> [f32; 3] {
    [c[0] as f32, c[1] as f32, c[2] as f32]
}

/// Backtraced position of a cell along the velocity field
#[inline]
fn backtrace(
    velocity: View<'_, 4>,
    c: Cell,
    general: &GeneralParams,
    advection: &AdvectionParams,
) -> [f32; 3] {
    let v = velocity.at(c);
    let scale = general.time_step * advection.time_step_modifier;
    let p = position(c);
    [p[0] - scale * v[0], p[1] - scale * v[1], p[2] - scale * v[2]]
}

/// Semi-Lagrangian advection of `source` along `velocity`
pub(crate) fn advect<const C: usize>(
    lattice: Lattice,
    general: &GeneralParams,
    advection: &AdvectionParams,
    velocity: &[f32],
    source: &[f32],
    obstacle: &[f32],
    dest: &mut [f32],
) {
    let velocity = View::<4>::new(velocity, lattice);
    let source = View::<C>::new(source, lattice);
    let solids = Solids {
        data: obstacle,
        lattice,
    };
    fill_cells::<C, _>(lattice, dest, |c| {
        if solids.solid(c) {
            return [0.0; C];
        }
        let mut value = source.sample(backtrace(velocity, c, general, advection));
        for ch in &mut value {
            *ch *= advection.dissipation;
        }
        value
    });
}

/// MacCormack blend of forward and backward advection results
///
/// The corrected value is clamped to the extrema of `original` around the
/// backtraced position, which keeps the scheme from creating new maxima.
#[allow(clippy::too_many_arguments)]
pub(crate) fn maccormack<const C: usize>(
    lattice: Lattice,
    general: &GeneralParams,
    advection: &AdvectionParams,
    velocity: &[f32],
    forward: &[f32],
    backward: &[f32],
    original: &[f32],
    obstacle: &[f32],
    dest: &mut [f32],
) {
    let velocity = View::<4>::new(velocity, lattice);
    let forward = View::<C>::new(forward, lattice);
    let backward = View::<C>::new(backward, lattice);
    let original = View::<C>::new(original, lattice);
    let solids = Solids {
        data: obstacle,
        lattice,
    };
    fill_cells::<C, _>(lattice, dest, |c| {
        if solids.solid(c) {
            return [0.0; C];
        }
        let traced = backtrace(velocity, c, general, advection);
        let (lo, hi) = original.corner_extrema(traced);
        let fwd = forward.at(c);
        let back = backward.at(c);
        let orig = original.at(c);
        let mut out = [0.0; C];
        for ch in 0..C {
            let corrected = fwd[ch] + 0.5 * (orig[ch] - back[ch]);
            out[ch] = corrected.clamp(lo[ch], hi[ch]) * advection.dissipation;
        }
        out
    });
}

/// Add a Gaussian splat to the fluid cells of a scalar field
pub(crate) fn impulse(
    lattice: Lattice,
    params: &ImpulseParams,
    source: &[f32],
    obstacle: &[f32],
    dest: &mut [f32],
) {
    let source = View::<1>::new(source, lattice);
    let solids = Solids {
        data: obstacle,
        lattice,
    };
    let centre = Vector3::from(params.point);
    let radius_sq = params.radius * params.radius;
    fill_cells::<1, _>(lattice, dest, |c| {
        let value = source.at(c)[0];
        if solids.solid(c) {
            return [value];
        }
        let d = Vector3::from(position(c)) - centre;
        let dist_sq = d.norm_squared();
        if dist_sq < radius_sq {
            [value + params.amount * (-dist_sq / radius_sq).exp()]
        } else {
            [value]
        }
    });
}

/// Thermal lift minus density weight, applied to the y component
pub(crate) fn buoyancy(
    lattice: Lattice,
    general: &GeneralParams,
    velocity: &[f32],
    temperature: &[f32],
    density: &[f32],
    dest: &mut [f32],
) {
    let velocity = View::<4>::new(velocity, lattice);
    let temperature = View::<1>::new(temperature, lattice);
    let density = View::<1>::new(density, lattice);
    fill_cells::<4, _>(lattice, dest, |c| {
        let mut v = velocity.at(c);
        let t = temperature.at(c)[0];
        let rho = density.at(c)[0];
        let force = (t - general.ambient_temperature) * general.density_buoyancy
            - rho * general.density_weight;
        v[1] += general.time_step * force;
        v
    });
}

/// Curl of velocity by central differences, magnitude in the w lane
pub(crate) fn vorticity(lattice: Lattice, velocity: &[f32], dest: &mut [f32]) {
    let velocity = View::<4>::new(velocity, lattice);
    fill_cells::<4, _>(lattice, dest, |c| {
        let curl = curl_at(velocity, c);
        [curl.x, curl.y, curl.z, curl.norm()]
    });
}

fn curl_at(velocity: View<'_, 4>, c: Cell) -> Vector3<f32> {
    let l = velocity.at(offset(c, 0, -1));
    let r = velocity.at(offset(c, 0, 1));
    let b = velocity.at(offset(c, 1, -1));
    let t = velocity.at(offset(c, 1, 1));
    let d = velocity.at(offset(c, 2, -1));
    let u = velocity.at(offset(c, 2, 1));
    Vector3::new(
        ((t[2] - b[2]) - (u[1] - d[1])) * 0.5,
        ((u[0] - d[0]) - (r[2] - l[2])) * 0.5,
        ((r[1] - l[1]) - (t[0] - b[0])) * 0.5,
    )
}

/// Vorticity confinement force `dt * epsilon * (N x omega)`
pub(crate) fn confinement(
    lattice: Lattice,
    general: &GeneralParams,
    velocity: &[f32],
    vorticity: &[f32],
    dest: &mut [f32],
) {
    let velocity = View::<4>::new(velocity, lattice);
    let vorticity = View::<4>::new(vorticity, lattice);
    fill_cells::<4, _>(lattice, dest, |c| {
        let magnitude = |axis: usize, delta: i32| vorticity.at(offset(c, axis, delta))[3];
        let eta = Vector3::new(
            magnitude(0, 1) - magnitude(0, -1),
            magnitude(1, 1) - magnitude(1, -1),
            magnitude(2, 1) - magnitude(2, -1),
        ) * 0.5;
        let normal = eta / (eta.norm() + 1e-5);
        let omega = xyz(vorticity.at(c));
        let force = normal.cross(&omega) * (general.vorticity_strength * general.time_step);
        let mut v = velocity.at(c);
        v[0] += force.x;
        v[1] += force.y;
        v[2] += force.z;
        v
    });
}

/// Net outward flux per fluid cell
///
/// The flux through the face between `a` and `a + e` is the velocity component
/// of the far cell, or zero if either side is solid.
pub(crate) fn divergence(lattice: Lattice, velocity: &[f32], obstacle: &[f32], dest: &mut [f32]) {
    let velocity = View::<4>::new(velocity, lattice);
    let solids = Solids {
        data: obstacle,
        lattice,
    };
    let flux = |a: Cell, axis: usize| -> f32 {
        let b = offset(a, axis, 1);
        if solids.solid(a) || solids.solid(b) {
            0.0
        } else {
            velocity.at(b)[axis]
        }
    };
    fill_cells::<1, _>(lattice, dest, |c| {
        if solids.solid(c) {
            return [0.0];
        }
        let mut div = 0.0;
        for axis in 0..3 {
            div += flux(c, axis) - flux(offset(c, axis, -1), axis);
        }
        [div]
    });
}

/// One Jacobi relaxation sweep of the pressure Poisson equation
pub(crate) fn jacobi(
    lattice: Lattice,
    pressure: &[f32],
    divergence: &[f32],
    obstacle: &[f32],
    dest: &mut [f32],
) {
    let pressure = View::<1>::new(pressure, lattice);
    let divergence = View::<1>::new(divergence, lattice);
    let solids = Solids {
        data: obstacle,
        lattice,
    };
    fill_cells::<1, _>(lattice, dest, |c| {
        if solids.solid(c) {
            return [0.0];
        }
        let centre = pressure.at(c)[0];
        let mut sum = 0.0;
        for axis in 0..3 {
            for delta in [-1, 1] {
                let n = offset(c, axis, delta);
                sum += if solids.solid(n) {
                    centre
                } else {
                    pressure.at(n)[0]
                };
            }
        }
        [(sum - divergence.at(c)[0]) / 6.0]
    });
}

/// Remove the pressure gradient from velocity
///
/// Faces shared with a solid keep zero normal velocity and solid cells carry
/// no velocity at all.
pub(crate) fn subtract_gradient(
    lattice: Lattice,
    velocity: &[f32],
    pressure: &[f32],
    obstacle: &[f32],
    dest: &mut [f32],
) {
    let velocity = View::<4>::new(velocity, lattice);
    let pressure = View::<1>::new(pressure, lattice);
    let solids = Solids {
        data: obstacle,
        lattice,
    };
    fill_cells::<4, _>(lattice, dest, |c| {
        if solids.solid(c) {
            return [0.0; 4];
        }
        let p = pressure.at(c)[0];
        let v = velocity.at(c);
        let mut out = [0.0; 4];
        for axis in 0..3 {
            let back = offset(c, axis, -1);
            if !solids.solid(back) {
                out[axis] = v[axis] - (p - pressure.at(back)[0]);
            }
        }
        out
    });
}

/// Mark the outermost cell layer as solid
pub(crate) fn obstacle(lattice: Lattice, dest: &mut [f32]) {
    fill_cells::<1, _>(lattice, dest, |c| {
        let boundary = (0..3).any(|axis| {
            let extent = [lattice.nx, lattice.ny, lattice.nz][axis];
            c[axis] == 0 || c[axis] == extent - 1
        });
        [if boundary { 1.0 } else { 0.0 }]
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn lattice(n: u32) -> Lattice {
        Lattice::new(GridDimensions::cube(n))
    }

    #[test]
    fn test_sample_reproduces_cell_values() {
        let l = lattice(3);
        let data: Vec<f32> = (0..27).map(|i| i as f32).collect();
        let view = View::<1>::new(&data, l);
        assert_eq!(view.sample([1.0, 2.0, 0.0])[0], data[l.index([1, 2, 0])]);
        // Clamped outside the grid
        assert_eq!(view.sample([-4.0, 0.0, 0.0])[0], data[0]);
        assert_eq!(view.sample([9.0, 9.0, 9.0])[0], data[26]);
    }

    #[test]
    fn test_sample_interpolates_linearly() {
        let l = lattice(2);
        // value = x
        let data = vec![0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0];
        let view = View::<1>::new(&data, l);
        assert_abs_diff_eq!(view.sample([0.25, 0.5, 0.5])[0], 0.25, epsilon = 1e-6);
    }

    #[test]
    fn test_obstacle_marks_outer_layer() {
        let l = lattice(4);
        let mut mask = vec![0.0; 64];
        obstacle(l, &mut mask);
        assert_eq!(mask.iter().filter(|v| **v > 0.5).count(), 64 - 8);
        assert_eq!(mask[l.index([1, 1, 1])], 0.0);
        assert_eq!(mask[l.index([2, 2, 2])], 0.0);
        assert_eq!(mask[l.index([0, 2, 2])], 1.0);
    }

    #[test]
    fn test_impulse_peaks_at_centre() {
        let l = lattice(5);
        let source = vec![0.0; 125];
        let open = vec![0.0; 125];
        let mut dest = vec![0.0; 125];
        let params = ImpulseParams::new(Vector3::new(2.0, 2.0, 2.0), 2.0, 3.0);
        impulse(l, &params, &source, &open, &mut dest);
        assert_abs_diff_eq!(dest[l.index([2, 2, 2])], 3.0, epsilon = 1e-6);
        assert_abs_diff_eq!(
            dest[l.index([3, 2, 2])],
            3.0 * (-0.25f32).exp(),
            epsilon = 1e-6
        );
        // d == radius is outside
        assert_eq!(dest[l.index([4, 2, 2])], 0.0);
    }

    #[test]
    fn test_impulse_leaves_solid_cells_untouched() {
        let l = lattice(5);
        let source = vec![0.0; 125];
        let mut mask = vec![0.0; 125];
        obstacle(l, &mut mask);
        let mut dest = vec![0.0; 125];
        let params = ImpulseParams::new(Vector3::new(1.0, 1.0, 1.0), 3.0, 2.0);
        impulse(l, &params, &source, &mask, &mut dest);

        assert_abs_diff_eq!(dest[l.index([1, 1, 1])], 2.0, epsilon = 1e-6);
        for (value, solid) in dest.iter().zip(&mask) {
            if *solid > 0.5 {
                assert_eq!(*value, 0.0);
            }
        }
    }

    #[test]
    fn test_vorticity_of_rigid_rotation() {
        // v = (-y, x, 0) has curl (0, 0, 2)
        let l = lattice(5);
        let mut velocity = vec![0.0; 125 * 4];
        for z in 0..5 {
            for y in 0..5 {
                for x in 0..5 {
                    let i = l.index([x, y, z]) * 4;
                    velocity[i] = -(y as f32);
                    velocity[i + 1] = x as f32;
                }
            }
        }
        let mut dest = vec![0.0; 125 * 4];
        vorticity(l, &velocity, &mut dest);
        let i = l.index([2, 2, 2]) * 4;
        assert_abs_diff_eq!(dest[i + 2], 2.0, epsilon = 1e-6);
        assert_abs_diff_eq!(dest[i + 3], 2.0, epsilon = 1e-6);
    }

    #[test]
    fn test_buoyancy_lifts_hot_cells() {
        let l = lattice(2);
        let general = GeneralParams {
            time_step: 0.5,
            density_buoyancy: 2.0,
            density_weight: 1.0,
            ..GeneralParams::default()
        };
        let velocity = vec![0.0; 8 * 4];
        let temperature = vec![3.0; 8];
        let density = vec![1.0; 8];
        let mut dest = vec![0.0; 8 * 4];
        buoyancy(l, &general, &velocity, &temperature, &density, &mut dest);
        // 0.5 * (3 * 2 - 1 * 1)
        assert_abs_diff_eq!(dest[1], 2.5, epsilon = 1e-6);
        assert_eq!(dest[0], 0.0);
    }
}
