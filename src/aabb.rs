use nalgebra::{point, vector, Point3, Vector3};

use crate::util::is_between;

#[rustfmt::skip]
fn spans_overlap(amin: f32, amax: f32, bmin: f32, bmax: f32) -> bool {
    is_between(bmin, amin, amax) || is_between(amin, bmin, bmax) ||
    is_between(bmax, amin, amax) || is_between(amax, bmin, bmax)
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Aabb {
    pub min: Point3<f32>,
    pub max: Point3<f32>,
}

impl Aabb {
    pub fn with_dimensions(dims: Vector3<f32>) -> Self {
        let half_dims = dims / 2.0;
        Aabb {
            min: Point3::from(-half_dims),
            max: Point3::from(half_dims),
        }
    }

    /// The AABB the working set centers at a slot's render-list check: a cube
    /// of side `side` centered at `center`.
    pub fn centered(center: Point3<f32>, side: f32) -> Self {
        Self::with_dimensions(vector![side, side, side]).translated(center.coords)
    }

    #[rustfmt::skip]
    pub fn contains(&self, point: &Point3<f32>) -> bool {
        is_between(point.x, self.min.x, self.max.x) &&
        is_between(point.y, self.min.y, self.max.y) &&
        is_between(point.z, self.min.z, self.max.z)
    }

    #[rustfmt::skip]
    pub fn intersects(&self, other: &Aabb) -> bool {
        spans_overlap(self.min.x, self.max.x, other.min.x, other.max.x) &&
        spans_overlap(self.min.y, self.max.y, other.min.y, other.max.y) &&
        spans_overlap(self.min.z, self.max.z, other.min.z, other.max.z)
    }

    pub fn dimensions(&self) -> Vector3<f32> {
        vector![
            self.max.x - self.min.x,
            self.max.y - self.min.y,
            self.max.z - self.min.z
        ]
    }

    pub fn center(&self) -> Point3<f32> {
        self.min + self.dimensions() / 2.0
    }

    pub fn translated(&self, translation: Vector3<f32>) -> Aabb {
        Aabb {
            min: self.min + translation,
            max: self.max + translation,
        }
    }

    pub fn inflate(&self, distance: f32) -> Aabb {
        Aabb {
            min: self.min - vector![distance, distance, distance],
            max: self.max + vector![distance, distance, distance],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centered_cube_contains_its_center() {
        let cube = Aabb::centered(point![16.0, 16.0, 16.0], 32.0);
        assert!(cube.contains(&point![16.0, 16.0, 16.0]));
        assert!(cube.contains(&point![0.5, 0.5, 0.5]));
        assert!(!cube.contains(&point![33.0, 16.0, 16.0]));
    }

    #[test]
    fn disjoint_boxes_do_not_intersect() {
        let a = Aabb::centered(point![0.0, 0.0, 0.0], 2.0);
        let b = Aabb::centered(point![10.0, 0.0, 0.0], 2.0);
        assert!(!a.intersects(&b));
    }
}
