use bytemuck::{Pod, Zeroable};

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct Aabb {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

impl Default for Aabb {
    fn default() -> Self {
        Self::empty()
    }
}

impl Aabb {
    /// An inverted box that any call to `extend` will snap onto the first point.
    pub fn empty() -> Self {
        Self {
            min: [f32::MAX; 3],
            max: [f32::MIN; 3],
        }
    }

    pub fn from_min_max(min: [f32; 3], max: [f32; 3]) -> Option<Self> {
        let aabb = Self { min, max };
        aabb.is_valid().then_some(aabb)
    }

    pub fn from_points<'a>(positions: impl IntoIterator<Item = &'a [f32; 3]>) -> Self {
        let mut aabb = Self::empty();
        for p in positions {
            aabb.extend(p);
        }
        aabb
    }

    pub fn extend(&mut self, p: &[f32; 3]) {
        for axis in 0..3 {
            self.min[axis] = self.min[axis].min(p[axis]);
            self.max[axis] = self.max[axis].max(p[axis]);
        }
    }

    /// True once at least one point was added and every component satisfies min <= max.
    pub fn is_valid(&self) -> bool {
        (0..3).all(|axis| self.min[axis] <= self.max[axis])
    }

    pub fn extent(&self) -> [f32; 3] {
        [
            self.max[0] - self.min[0],
            self.max[1] - self.min[1],
            self.max[2] - self.min[2],
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_is_invalid() {
        assert!(!Aabb::empty().is_valid());
    }

    #[test]
    fn from_points_spans_every_point() {
        let points = [[1.0, -2.0, 3.0], [-1.0, 5.0, 0.5], [0.0, 0.0, 0.0]];
        let aabb = Aabb::from_points(points.iter());
        assert!(aabb.is_valid());
        assert_eq!(aabb.min, [-1.0, -2.0, 0.0]);
        assert_eq!(aabb.max, [1.0, 5.0, 3.0]);
    }

    #[test]
    fn single_point_is_degenerate_but_valid() {
        let aabb = Aabb::from_points([[2.0, 2.0, 2.0]].iter());
        assert!(aabb.is_valid());
        assert_eq!(aabb.extent(), [0.0, 0.0, 0.0]);
        assert_eq!(aabb.min, [2.0, 2.0, 2.0]);
    }

    #[test]
    fn from_min_max_rejects_inverted() {
        assert!(Aabb::from_min_max([1.0, 0.0, 0.0], [0.0, 1.0, 1.0]).is_none());
        assert!(Aabb::from_min_max([0.0; 3], [1.0; 3]).is_some());
    }
}
