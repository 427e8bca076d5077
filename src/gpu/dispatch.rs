/// Threads per workgroup; must match `@workgroup_size` in every kernel.
pub const WORKGROUP_SIZE: u32 = 256;

/// Per-axis workgroup ceiling guaranteed by every backend.
pub const MAX_GROUPS_PER_DIM: u32 = 65535;

/// Map `n` work items to an `(x, y)` workgroup grid with `x * y * group_size >= n` and
/// `x <= ceiling`. `n == 0` yields `(0, 0)`; callers skip the dispatch in that case.
pub fn dispatch_size(n: u64, group_size: u32, ceiling: u32) -> (u32, u32) {
    if n == 0 {
        return (0, 0);
    }
    let total_groups = n.div_ceil(group_size as u64);
    if total_groups <= ceiling as u64 {
        (total_groups as u32, 1)
    } else {
        (ceiling, total_groups.div_ceil(ceiling as u64) as u32)
    }
}

/// Dispatch grid for `items` threads with the crate-wide workgroup size.
pub fn dispatch_for_items(items: u32) -> [u32; 3] {
    let (x, y) = dispatch_size(items as u64, WORKGROUP_SIZE, MAX_GROUPS_PER_DIM);
    [x, y, 1]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn covers_every_item_within_ceiling() {
        let cases = [
            0u64,
            1,
            256,
            65535 * 256,
            65535 * 256 + 1,
            (1u64 << 32) - 1,
            1u64 << 32,
        ];
        for n in cases {
            let (x, y) = dispatch_size(n, WORKGROUP_SIZE, MAX_GROUPS_PER_DIM);
            assert!(x as u64 * y as u64 * WORKGROUP_SIZE as u64 >= n, "n = {n}");
            assert!(x <= MAX_GROUPS_PER_DIM, "n = {n}");
            assert_eq!((x, y) == (0, 0), n == 0, "n = {n}");
        }
    }

    #[test]
    fn exact_grids() {
        assert_eq!(dispatch_size(1, 256, 65535), (1, 1));
        assert_eq!(dispatch_size(256, 256, 65535), (1, 1));
        assert_eq!(dispatch_size(257, 256, 65535), (2, 1));
        assert_eq!(dispatch_size(65535 * 256, 256, 65535), (65535, 1));
        assert_eq!(dispatch_size(65535 * 256 + 1, 256, 65535), (65535, 2));
        assert_eq!(dispatch_size((1u64 << 32) - 1, 256, 65535), (65535, 257));
    }

    #[test]
    fn dispatch_for_items_is_flat_for_small_counts() {
        assert_eq!(dispatch_for_items(0), [0, 0, 1]);
        assert_eq!(dispatch_for_items(1000), [4, 1, 1]);
    }
}
