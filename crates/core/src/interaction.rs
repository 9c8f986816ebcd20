//! Ray interaction with the simulation volume
//!
//! Hosts turn a pointer or camera ray into an impulse by intersecting it with
//! the world-space box of the volume and converting the hit into normalized
//! local coordinates.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// World-space ray
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ray {
    pub origin: Vector3<f32>,
    /// Unit direction (normalized on construction when non-zero)
    pub direction: Vector3<f32>,
}

impl Ray {
    #[must_use]
    pub fn new(origin: Vector3<f32>, direction: Vector3<f32>) -> Self {
        Self {
            origin,
            direction: direction.try_normalize(f32::EPSILON).unwrap_or(direction),
        }
    }

    /// Point at `distance` along the ray
    #[must_use]
    pub fn at(&self, distance: f32) -> Vector3<f32> {
        self.origin + self.direction * distance
    }
}

/// Axis-aligned world-space box occupied by the simulation volume
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolumeTransform {
    pub center: Vector3<f32>,
    /// Full edge lengths of the box
    pub extent: Vector3<f32>,
}

impl VolumeTransform {
    #[must_use]
    pub fn new(center: Vector3<f32>, extent: Vector3<f32>) -> Self {
        Self { center, extent }
    }

    fn min(&self) -> Vector3<f32> {
        self.center - self.extent * 0.5
    }

    fn max(&self) -> Vector3<f32> {
        self.center + self.extent * 0.5
    }

    /// Slab test against the volume box
    ///
    /// # Returns
    ///
    /// Distance along the ray to the entry point, `0.0` when the origin is
    /// inside the box, or `None` if the ray misses or points away
    #[must_use]
    pub fn intersect(&self, ray: &Ray) -> Option<f32> {
        let min = self.min();
        let max = self.max();
        let mut t_near = f32::NEG_INFINITY;
        let mut t_far = f32::INFINITY;

        for axis in 0..3 {
            let origin = ray.origin[axis];
            let direction = ray.direction[axis];
            if direction.abs() < f32::EPSILON {
                // Parallel to this slab
                if origin < min[axis] || origin > max[axis] {
                    return None;
                }
                continue;
            }

            let inv = 1.0 / direction;
            let mut t0 = (min[axis] - origin) * inv;
            let mut t1 = (max[axis] - origin) * inv;
            if t0 > t1 {
                std::mem::swap(&mut t0, &mut t1);
            }
            t_near = t_near.max(t0);
            t_far = t_far.min(t1);
            if t_near > t_far {
                return None;
            }
        }

        if t_far < 0.0 {
            return None;
        }
        Some(t_near.max(0.0))
    }

    /// Map the point at `distance` along `ray` into 0..1 local coordinates
    #[must_use]
    pub fn local_position(&self, ray: &Ray, distance: f32) -> Vector3<f32> {
        (ray.at(distance) - self.min())
            .component_div(&self.extent)
            .map(|c| c.clamp(0.0, 1.0))
    }
}

impl Default for VolumeTransform {
    fn default() -> Self {
        Self::new(Vector3::zeros(), Vector3::new(1.0, 1.0, 1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_ray_hits_front_face() {
        let volume = VolumeTransform::new(Vector3::zeros(), Vector3::new(2.0, 2.0, 2.0));
        let ray = Ray::new(Vector3::new(-5.0, 0.5, 0.0), Vector3::new(1.0, 0.0, 0.0));

        let distance = volume.intersect(&ray).unwrap();
        assert_abs_diff_eq!(distance, 4.0, epsilon = 1e-5);

        let local = volume.local_position(&ray, distance);
        assert_abs_diff_eq!(local.x, 0.0, epsilon = 1e-5);
        assert_abs_diff_eq!(local.y, 0.75, epsilon = 1e-5);
        assert_abs_diff_eq!(local.z, 0.5, epsilon = 1e-5);
    }

    #[test]
    fn test_ray_misses_or_points_away() {
        let volume = VolumeTransform::default();
        let above = Ray::new(Vector3::new(0.0, 3.0, 0.0), Vector3::new(1.0, 0.0, 0.0));
        assert!(volume.intersect(&above).is_none());

        let away = Ray::new(Vector3::new(2.0, 0.0, 0.0), Vector3::new(1.0, 0.0, 0.0));
        assert!(volume.intersect(&away).is_none());
    }

    #[test]
    fn test_origin_inside_hits_at_zero() {
        let volume = VolumeTransform::default();
        let ray = Ray::new(Vector3::new(0.1, 0.0, 0.0), Vector3::new(0.0, 1.0, 1.0));
        assert_eq!(volume.intersect(&ray), Some(0.0));
        let local = volume.local_position(&ray, 0.0);
        assert_abs_diff_eq!(local.x, 0.6, epsilon = 1e-5);
    }
}
