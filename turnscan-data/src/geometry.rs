//! Rays, laser planes and the ray-plane intersection used for triangulation.

use crate::types::Vector3;
use glam::DQuat;
use serde::{Deserialize, Serialize};

/// Below this |cos| a ray is treated as parallel to a plane.
pub const PARALLEL_EPSILON: f64 = 1e-9;

/// A camera projection ray through one pixel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vector3,
    /// Unit direction.
    pub direction: Vector3,
}

impl Ray {
    /// Create a ray, normalizing `direction`.
    pub fn new(origin: Vector3, direction: Vector3) -> Self {
        Self {
            origin,
            direction: direction.normalize(),
        }
    }

    pub fn point_at(&self, t: f64) -> Vector3 {
        self.origin + self.direction * t
    }
}

/// A calibrated laser plane in the fixed scanner frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Plane {
    /// The plane normal
    pub normal: Vector3,
    /// A point in the plane
    pub point: Vector3,
}

impl Plane {
    /// Create a plane, normalizing `normal`.
    pub fn new(normal: Vector3, point: Vector3) -> Self {
        Self {
            normal: normal.normalize(),
            point,
        }
    }

    pub fn signed_distance_to_point(&self, p: Vector3) -> f64 {
        self.normal.dot(p - self.point)
    }

    /// Intersect a ray with the plane.
    ///
    /// Returns `None` when the ray is parallel to the plane, when the hit lies
    /// behind the ray origin, or when the result is not finite.
    pub fn intersect(&self, ray: &Ray) -> Option<Vector3> {
        let denom = ray.direction.dot(self.normal);
        if denom.abs() < PARALLEL_EPSILON {
            return None;
        }

        let t = (self.point - ray.origin).dot(self.normal) / denom;
        if !(t > 0.0) {
            return None;
        }

        let hit = ray.point_at(t);
        hit.is_finite().then_some(hit)
    }
}

/// Rotate a point about the world Y axis by `angle` radians (right handed).
pub fn rotate_about_y(p: Vector3, angle: f64) -> Vector3 {
    DQuat::from_rotation_y(angle) * p
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intersect_straight_on() {
        let plane = Plane::new(Vector3::Z, Vector3::new(0.0, 0.0, 50.0));
        let ray = Ray::new(Vector3::new(0.0, 0.0, 300.0), Vector3::NEG_Z);
        let hit = plane.intersect(&ray).unwrap();
        assert!((hit - Vector3::new(0.0, 0.0, 50.0)).length() < 1e-9);
    }

    #[test]
    fn test_parallel_ray_is_rejected() {
        let plane = Plane::new(Vector3::Z, Vector3::new(0.0, 0.0, 50.0));
        for dir in [Vector3::X, Vector3::Y, Vector3::new(1.0, -1.0, 0.0)] {
            let ray = Ray::new(Vector3::new(0.0, 0.0, 300.0), dir);
            assert_eq!(plane.intersect(&ray), None);
        }

        // A ray lying inside the plane is parallel as well.
        let ray = Ray::new(Vector3::new(0.0, 0.0, 50.0), Vector3::X);
        assert_eq!(plane.intersect(&ray), None);
    }

    #[test]
    fn test_intersection_behind_origin_is_rejected() {
        let plane = Plane::new(Vector3::Z, Vector3::new(0.0, 0.0, 50.0));
        let ray = Ray::new(Vector3::ZERO, Vector3::NEG_Z);
        assert_eq!(plane.intersect(&ray), None);
    }

    #[test]
    fn test_plane_normal_is_normalized() {
        let plane = Plane::new(Vector3::new(0.0, 0.0, 4.0), Vector3::ZERO);
        assert!((plane.normal.length() - 1.0).abs() < 1e-12);
        assert!((plane.signed_distance_to_point(Vector3::new(1.0, 1.0, 2.0)) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_rotate_about_y() {
        let p = rotate_about_y(Vector3::new(0.0, 1.0, 50.0), std::f64::consts::FRAC_PI_2);
        assert!((p - Vector3::new(50.0, 1.0, 0.0)).length() < 1e-9);
    }
}
