//! Axis-aligned bounding boxes

/// An axis-aligned bounding box in millimeters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    /// Minimum corner
    pub min: [f64; 3],
    /// Maximum corner
    pub max: [f64; 3],
}

impl Aabb {
    /// Create a bounding box from explicit corners
    pub fn new(min: [f64; 3], max: [f64; 3]) -> Self {
        Self { min, max }
    }

    /// An empty box: expanding it with any point yields that point
    pub fn empty() -> Self {
        Self {
            min: [f64::INFINITY; 3],
            max: [f64::NEG_INFINITY; 3],
        }
    }

    /// Whether no point has been accumulated yet
    pub fn is_empty(&self) -> bool {
        self.min[0] > self.max[0]
    }

    /// Grow to include a point
    pub fn expand_point(&mut self, p: [f64; 3]) {
        for i in 0..3 {
            if p[i] < self.min[i] {
                self.min[i] = p[i];
            }
            if p[i] > self.max[i] {
                self.max[i] = p[i];
            }
        }
    }

    /// Grow to include another box
    pub fn expand(&mut self, other: &Aabb) {
        if other.is_empty() {
            return;
        }
        self.expand_point(other.min);
        self.expand_point(other.max);
    }

    /// Size along each axis
    pub fn size(&self) -> [f64; 3] {
        if self.is_empty() {
            return [0.0; 3];
        }
        [
            self.max[0] - self.min[0],
            self.max[1] - self.min[1],
            self.max[2] - self.min[2],
        ]
    }

    /// XY center
    pub fn center_xy(&self) -> (f64, f64) {
        (
            (self.min[0] + self.max[0]) / 2.0,
            (self.min[1] + self.max[1]) / 2.0,
        )
    }

    /// Shift by an XY offset, Z unchanged
    pub fn offset_xy(&self, dx: f64, dy: f64) -> Aabb {
        Aabb {
            min: [self.min[0] + dx, self.min[1] + dy, self.min[2]],
            max: [self.max[0] + dx, self.max[1] + dy, self.max[2]],
        }
    }
}
