use std::ops::Range;

/// 1 where a new voxel begins in Morton order.
pub fn mark_heads(sorted_codes: &[u32]) -> Vec<u32> {
    sorted_codes
        .iter()
        .enumerate()
        .map(|(i, &code)| (i == 0 || sorted_codes[i - 1] != code) as u32)
        .collect()
}

/// Exclusive prefix sum of the head flags and the resulting unique-voxel count.
///
/// The count is `scanned[N-1] + flags[N-1]`; an empty input yields zero voxels.
pub fn exclusive_scan(flags: &[u32]) -> (Vec<u32>, u32) {
    let mut scanned = Vec::with_capacity(flags.len());
    let mut running = 0u32;
    for &flag in flags {
        scanned.push(running);
        running += flag;
    }
    let num_unique = match (scanned.last(), flags.last()) {
        (Some(&s), Some(&f)) => s + f,
        _ => 0,
    };
    debug_assert_eq!(num_unique, running);
    (scanned, num_unique)
}

/// Compact the head of every voxel into `(unique_codes, voxel_starts)`, each `num_unique` long.
pub fn scatter(
    sorted_codes: &[u32],
    flags: &[u32],
    scanned: &[u32],
    num_unique: u32,
) -> (Vec<u32>, Vec<u32>) {
    let mut unique_codes = vec![0u32; num_unique as usize];
    let mut voxel_starts = vec![0u32; num_unique as usize];
    for i in 0..sorted_codes.len() {
        if flags[i] == 1 {
            let slot = scanned[i] as usize;
            unique_codes[slot] = sorted_codes[i];
            voxel_starts[slot] = i as u32;
        }
    }
    (unique_codes, voxel_starts)
}

/// Point range of voxel `v`: up to the next voxel start, or to `point_count` for the last one.
pub fn voxel_range(voxel_starts: &[u32], v: usize, point_count: u32) -> Range<u32> {
    let end = voxel_starts.get(v + 1).copied().unwrap_or(point_count);
    voxel_starts[v]..end
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_four_points() {
        let sorted = [1, 1, 5, 9];
        let flags = mark_heads(&sorted);
        assert_eq!(flags, vec![1, 0, 1, 1]);

        let (scanned, num_unique) = exclusive_scan(&flags);
        assert_eq!(scanned, vec![0, 1, 1, 2]);
        assert_eq!(num_unique, 3);

        let (unique, starts) = scatter(&sorted, &flags, &scanned, num_unique);
        assert_eq!(unique, vec![1, 5, 9]);
        assert_eq!(starts, vec![0, 2, 3]);
        assert_eq!(voxel_range(&starts, 0, 4), 0..2);
        assert_eq!(voxel_range(&starts, 2, 4), 3..4);
    }

    #[test]
    fn empty_scan_has_no_voxels() {
        let (scanned, num_unique) = exclusive_scan(&[]);
        assert!(scanned.is_empty());
        assert_eq!(num_unique, 0);
    }

    #[test]
    fn single_point_is_one_voxel() {
        let flags = mark_heads(&[42]);
        assert_eq!(flags, vec![1]);
        let (scanned, num_unique) = exclusive_scan(&flags);
        assert_eq!(scanned, vec![0]);
        assert_eq!(num_unique, 1);
    }

    #[test]
    fn all_equal_codes_collapse() {
        let sorted = [7; 6];
        let flags = mark_heads(&sorted);
        let (scanned, num_unique) = exclusive_scan(&flags);
        assert_eq!(num_unique, 1);
        assert_eq!(scanned, vec![0, 1, 1, 1, 1, 1]);
        let (_, starts) = scatter(&sorted, &flags, &scanned, num_unique);
        assert_eq!(voxel_range(&starts, 0, 6), 0..6);
    }

    #[test]
    fn scanned_counts_preceding_heads() {
        let flags = mark_heads(&[0, 0, 1, 2, 2, 2, 3, 8, 8]);
        let (scanned, num_unique) = exclusive_scan(&flags);
        for i in 0..flags.len() {
            assert_eq!(scanned[i], flags[..i].iter().sum::<u32>());
        }
        assert_eq!(num_unique, flags.iter().sum::<u32>());
    }
}
