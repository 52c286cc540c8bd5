//! Planes of the form `z = f(x, y)`.

use nalgebra::{Point3, Vector3};

use crate::error::{Result, VuError};

/// Smallest acceptable normal z component, relative to the normal length.
const MIN_NORMAL_Z: f64 = 1e-10;

/// A non-vertical plane with a z clamp range.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaneData {
    /// A point on the plane.
    pub origin: Point3<f64>,
    /// Unit normal.
    pub normal: Vector3<f64>,
    /// Lower z clamp.
    pub z_min: f64,
    /// Upper z clamp.
    pub z_max: f64,
    /// Caller tag, usually the index of the source polygon.
    pub tag: i64,
}

impl PlaneData {
    /// The plane's z at `(x, y)`, clamped to `[z_min, z_max]`.
    pub fn evaluate(&self, x: f64, y: f64) -> f64 {
        let n = &self.normal;
        let z = self.origin.z - (n.x * (x - self.origin.x) + n.y * (y - self.origin.y)) / n.z;
        z.clamp(self.z_min, self.z_max)
    }

    /// The unclamped z at `(x, y)`.
    pub fn evaluate_unclamped(&self, x: f64, y: f64) -> f64 {
        let n = &self.normal;
        self.origin.z - (n.x * (x - self.origin.x) + n.y * (y - self.origin.y)) / n.z
    }
}

/// Indexed store of planes.
#[derive(Debug, Clone, Default)]
pub struct PlaneArray {
    planes: Vec<PlaneData>,
}

impl PlaneArray {
    /// An empty array.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a plane through `origin` with the given `normal`.
    ///
    /// The normal is normalised and flipped to point upwards. Fails with
    /// [`VuError::DegenerateNormal`] when it is near zero or near horizontal,
    /// and with [`VuError::InvalidParameter`] when `z_min > z_max`.
    pub fn add_by_origin_and_normal(
        &mut self,
        origin: Point3<f64>,
        normal: Vector3<f64>,
        tag: i64,
        z_min: f64,
        z_max: f64,
    ) -> Result<usize> {
        let length = normal.norm();
        if !(length > f64::EPSILON) || (normal.z.abs() / length) < MIN_NORMAL_Z {
            return Err(VuError::DegenerateNormal {
                x: normal.x,
                y: normal.y,
                z: normal.z,
            });
        }
        if z_min > z_max {
            return Err(VuError::invalid_param("z_min", z_min, "must not exceed z_max"));
        }
        let mut unit = normal / length;
        if unit.z < 0.0 {
            unit = -unit;
        }
        self.planes.push(PlaneData {
            origin,
            normal: unit,
            z_min,
            z_max,
            tag,
        });
        Ok(self.planes.len() - 1)
    }

    /// Keep only the first `len` planes.
    pub fn truncate(&mut self, len: usize) {
        self.planes.truncate(len);
    }

    /// Number of planes.
    pub fn len(&self) -> usize {
        self.planes.len()
    }

    /// True if there are no planes.
    pub fn is_empty(&self) -> bool {
        self.planes.is_empty()
    }

    /// Plane by index.
    pub fn get(&self, index: usize) -> Option<&PlaneData> {
        self.planes.get(index)
    }

    /// Iterate over the planes in index order.
    pub fn iter(&self) -> impl Iterator<Item = &PlaneData> {
        self.planes.iter()
    }

    /// Clamped z of plane `index` at `(x, y)`.
    pub fn evaluate(&self, index: usize, x: f64, y: f64) -> Option<f64> {
        self.get(index).map(|p| p.evaluate(x, y))
    }
}

/// Newell normal of a closed polygon (unnormalised, length twice the area).
pub fn newell_normal(points: &[Point3<f64>]) -> Vector3<f64> {
    let mut normal = Vector3::zeros();
    let count = points.len();
    for i in 0..count {
        let p = &points[i];
        let q = &points[(i + 1) % count];
        normal.x += (p.y - q.y) * (p.z + q.z);
        normal.y += (p.z - q.z) * (p.x + q.x);
        normal.z += (p.x - q.x) * (p.y + q.y);
    }
    normal
}
