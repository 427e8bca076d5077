use crate::geometry::aabb::Aabb;

/// Quantisation resolution per axis; three axes fit a 30-bit code.
pub const BITS_PER_AXIS: u32 = 10;
pub const AXIS_MAX: u32 = (1 << BITS_PER_AXIS) - 1;

/// Spread the low 10 bits of `v` so two zero bits separate each original bit.
pub fn expand_bits(v: u32) -> u32 {
    let mut v = v & AXIS_MAX;
    v = (v | (v << 16)) & 0x0300_00FF;
    v = (v | (v << 8)) & 0x0300_F00F;
    v = (v | (v << 4)) & 0x030C_30C3;
    v = (v | (v << 2)) & 0x0924_9249;
    v
}

pub fn encode(q: [u32; 3]) -> u32 {
    (expand_bits(q[0]) << 2) | (expand_bits(q[1]) << 1) | expand_bits(q[2])
}

pub fn decode(code: u32) -> [u32; 3] {
    let compact = |mut v: u32| {
        v &= 0x0924_9249;
        v = (v | (v >> 2)) & 0x030C_30C3;
        v = (v | (v >> 4)) & 0x0300_F00F;
        v = (v | (v >> 8)) & 0x0300_00FF;
        v = (v | (v >> 16)) & AXIS_MAX;
        v
    };
    [compact(code >> 2), compact(code >> 1), compact(code)]
}

/// Bounds-relative integer coordinates. A zero-extent axis maps to 0.
pub fn quantize(position: &[f32; 3], bounds: &Aabb) -> [u32; 3] {
    let extent = bounds.extent();
    let mut q = [0u32; 3];
    for axis in 0..3 {
        if extent[axis] > 0.0 {
            let t = ((position[axis] - bounds.min[axis]) / extent[axis]).clamp(0.0, 1.0);
            q[axis] = (t * AXIS_MAX as f32) as u32;
        }
    }
    q
}

pub fn morton_code(position: &[f32; 3], bounds: &Aabb) -> u32 {
    encode(quantize(position, bounds))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_bits_spreads() {
        assert_eq!(expand_bits(0b1), 0b1);
        assert_eq!(expand_bits(0b11), 0b1001);
        assert_eq!(expand_bits(AXIS_MAX), 0x0924_9249);
    }

    #[test]
    fn axis_order_is_x_y_z() {
        assert_eq!(encode([1, 0, 0]), 0b100);
        assert_eq!(encode([0, 1, 0]), 0b010);
        assert_eq!(encode([0, 0, 1]), 0b001);
        assert_eq!(encode([AXIS_MAX; 3]), (1 << 30) - 1);
    }

    #[test]
    fn decode_inverts_encode_on_samples() {
        for q in [[0, 0, 0], [1023, 0, 511], [7, 300, 1000], [AXIS_MAX; 3]] {
            assert_eq!(decode(encode(q)), q);
        }
    }

    #[test]
    fn distinct_cells_never_alias() {
        let mut seen = std::collections::HashSet::new();
        for x in (0..=AXIS_MAX).step_by(31) {
            for y in (0..=AXIS_MAX).step_by(37) {
                for z in (0..=AXIS_MAX).step_by(41) {
                    assert!(seen.insert(encode([x, y, z])));
                }
            }
        }
    }

    #[test]
    fn same_cell_same_code() {
        let bounds = Aabb::from_min_max([0.0; 3], [1024.0; 3]).unwrap();
        let a = morton_code(&[10.1, 20.2, 30.3], &bounds);
        let b = morton_code(&[10.15, 20.25, 30.35], &bounds);
        assert_eq!(a, b);
        assert_ne!(a, morton_code(&[500.0, 20.2, 30.3], &bounds));
    }

    #[test]
    fn quantize_corners_and_degenerate_axis() {
        let bounds = Aabb::from_min_max([0.0, 5.0, -1.0], [2.0, 5.0, 1.0]).unwrap();
        assert_eq!(quantize(&[0.0, 5.0, -1.0], &bounds), [0, 0, 0]);
        assert_eq!(quantize(&[2.0, 5.0, 1.0], &bounds), [AXIS_MAX, 0, AXIS_MAX]);
    }
}
