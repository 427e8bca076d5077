//! Host-side twin of the LPC compute kernels.
//!
//! Every function here mirrors one kernel stage exactly, so the same code builds the
//! reference structure and checks what the GPU produced.

pub mod bitonic;
pub mod morton;
pub mod radix_tree;
pub mod scan;

use crate::error::{LpcError, Result};
use crate::point_cloud::{Point, PointCloudData};
use radix_tree::{INVALID_NODE, Node, leaf_index};

/// Every intermediate array of one LPC build, trimmed to its live length.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LpcArrays {
    pub sorted_codes: Vec<u32>,
    pub sort_indices: Vec<u32>,
    pub sorted_points: Vec<Point>,
    pub head_flags: Vec<u32>,
    pub scanned: Vec<u32>,
    pub num_unique: u32,
    pub unique_codes: Vec<u32>,
    pub voxel_starts: Vec<u32>,
    pub nodes: Vec<Node>,
}

impl LpcArrays {
    pub fn point_count(&self) -> u32 {
        self.sorted_codes.len() as u32
    }

    pub fn root(&self) -> Option<&Node> {
        self.nodes.first()
    }
}

/// Run every stage over explicit Morton codes.
pub fn build_from_codes(codes: &[u32], points: &[Point]) -> LpcArrays {
    let n = codes.len() as u32;
    let mut sorted_codes = codes.to_vec();
    let mut sort_indices: Vec<u32> = (0..n).collect();
    bitonic::sort_pairs(&mut sorted_codes, &mut sort_indices);

    let sorted_points = if points.len() == codes.len() {
        sort_indices.iter().map(|&i| points[i as usize]).collect()
    } else {
        Vec::new()
    };

    let head_flags = scan::mark_heads(&sorted_codes);
    let (scanned, num_unique) = scan::exclusive_scan(&head_flags);
    let (unique_codes, voxel_starts) =
        scan::scatter(&sorted_codes, &head_flags, &scanned, num_unique);
    let nodes = radix_tree::build(&unique_codes, &voxel_starts, n);

    LpcArrays {
        sorted_codes,
        sort_indices,
        sorted_points,
        head_flags,
        scanned,
        num_unique,
        unique_codes,
        voxel_starts,
        nodes,
    }
}

pub fn reference_build(cloud: &PointCloudData) -> LpcArrays {
    let bounds = cloud.bounds();
    let codes: Vec<u32> = cloud
        .points()
        .iter()
        .map(|p| morton::morton_code(&p.position, &bounds))
        .collect();
    build_from_codes(&codes, cloud.points())
}

fn fail(msg: String) -> LpcError {
    LpcError::Validation(msg)
}

/// Two codes are accepted as equal when their cells differ by at most one step per axis.
/// GPU float division may round a coordinate sitting exactly on a cell border differently.
fn codes_match(a: u32, b: u32, exact: bool) -> bool {
    if exact || a == b {
        return a == b;
    }
    let (qa, qb) = (morton::decode(a), morton::decode(b));
    (0..3).all(|axis| qa[axis].abs_diff(qb[axis]) <= 1)
}

/// Check the structural invariants of a finished build against the source cloud.
///
/// `exact_codes` demands bit-identical Morton codes; GPU output is checked with a
/// one-cell tolerance instead.
pub fn validate(cloud: &PointCloudData, arrays: &LpcArrays, exact_codes: bool) -> Result<()> {
    let n = cloud.len();
    let codes = &arrays.sorted_codes;
    if codes.len() != n || arrays.sort_indices.len() != n || arrays.head_flags.len() != n {
        return Err(fail(format!(
            "array lengths {}/{}/{} do not match {n} points",
            codes.len(),
            arrays.sort_indices.len(),
            arrays.head_flags.len()
        )));
    }
    if n == 0 {
        return if arrays.num_unique == 0 && arrays.nodes.is_empty() {
            Ok(())
        } else {
            Err(fail("empty cloud produced voxels".into()))
        };
    }

    if let Some(i) = (1..n).find(|&i| codes[i - 1] > codes[i]) {
        return Err(fail(format!("codes decrease at slot {i}")));
    }

    let bounds = cloud.bounds();
    let mut seen = vec![false; n];
    for (slot, &idx) in arrays.sort_indices.iter().enumerate() {
        let Some(flag) = seen.get_mut(idx as usize) else {
            return Err(fail(format!("sort index {idx} out of range")));
        };
        if std::mem::replace(flag, true) {
            return Err(fail(format!("sort index {idx} appears twice")));
        }
        let point = &cloud.points()[idx as usize];
        let expected = morton::morton_code(&point.position, &bounds);
        if !codes_match(codes[slot], expected, exact_codes) {
            return Err(fail(format!(
                "slot {slot} holds code {:#x}, point {idx} encodes to {expected:#x}",
                codes[slot]
            )));
        }
        if let Some(sorted) = arrays.sorted_points.get(slot) {
            if sorted != point {
                return Err(fail(format!("reordered point {slot} is not source point {idx}")));
            }
        }
    }

    let expected_flags = scan::mark_heads(codes);
    if arrays.head_flags != expected_flags {
        return Err(fail("head flags disagree with code boundaries".into()));
    }
    let (expected_scan, expected_unique) = scan::exclusive_scan(&arrays.head_flags);
    if arrays.scanned != expected_scan {
        return Err(fail("scanned indices are not the exclusive sum of the flags".into()));
    }
    let num_unique = arrays.num_unique;
    if num_unique != expected_unique || num_unique != arrays.scanned[n - 1] + arrays.head_flags[n - 1] {
        return Err(fail(format!(
            "unique count {num_unique}, flags count {expected_unique}"
        )));
    }

    validate_partition(arrays, n as u32)?;
    validate_tree(arrays, n as u32)
}

fn validate_partition(arrays: &LpcArrays, n: u32) -> Result<()> {
    let u = arrays.num_unique as usize;
    let starts = &arrays.voxel_starts;
    if starts.len() != u || arrays.unique_codes.len() != u {
        return Err(fail(format!("expected {u} voxel starts, got {}", starts.len())));
    }
    if starts.first() != Some(&0) {
        return Err(fail("first voxel does not start at 0".into()));
    }
    let mut covered = 0u32;
    for v in 0..u {
        let range = scan::voxel_range(starts, v, n);
        if range.start != covered || range.is_empty() {
            return Err(fail(format!("voxel {v} range {range:?} breaks the partition")));
        }
        if arrays.unique_codes[v] != arrays.sorted_codes[range.start as usize] {
            return Err(fail(format!("voxel {v} code does not match its first point")));
        }
        covered = range.end;
    }
    if covered != n {
        return Err(fail(format!("voxels cover {covered} of {n} points")));
    }
    Ok(())
}

fn validate_tree(arrays: &LpcArrays, n: u32) -> Result<()> {
    let u = arrays.num_unique;
    let node_count = (2 * u - 1) as usize;
    if arrays.nodes.len() < node_count {
        return Err(fail(format!("{} nodes, need {node_count}", arrays.nodes.len())));
    }
    let nodes = &arrays.nodes[..node_count];

    let leaves = nodes.iter().filter(|node| node.is_leaf()).count();
    if leaves != u as usize || node_count - leaves != (u - 1) as usize {
        return Err(fail(format!("{leaves} leaves in {node_count} nodes for {u} voxels")));
    }
    if nodes[0].parent != INVALID_NODE || nodes[0].start != 0 || nodes[0].count != n {
        return Err(fail(format!("root {:?} does not cover the cloud", nodes[0])));
    }

    for (i, node) in nodes.iter().enumerate().skip(1) {
        let parent = nodes
            .get(node.parent as usize)
            .ok_or_else(|| fail(format!("node {i} has no parent")))?;
        if parent.left != i as u32 && parent.right != i as u32 {
            return Err(fail(format!("node {i} is not a child of its parent {}", node.parent)));
        }
    }

    for v in 0..u {
        let leaf_idx = leaf_index(u, v);
        let leaf = &nodes[leaf_idx as usize];
        let range = scan::voxel_range(&arrays.voxel_starts, v as usize, n);
        if !leaf.is_leaf() || leaf.start != range.start || leaf.count != range.end - range.start {
            return Err(fail(format!("leaf {leaf_idx} does not cover voxel {v}")));
        }
        let mut current = leaf_idx;
        let mut steps = 0;
        while current != 0 {
            current = nodes[current as usize].parent;
            steps += 1;
            if current == INVALID_NODE || steps > u {
                return Err(fail(format!("leaf {leaf_idx} does not reach the root")));
            }
        }
    }
    Ok(())
}

/// Longest leaf-to-root walk, in parent links.
pub fn tree_depth(nodes: &[Node], num_unique: u32) -> u32 {
    (0..num_unique)
        .map(|v| {
            let mut current = leaf_index(num_unique, v);
            let mut depth = 0;
            while current != 0 && current != INVALID_NODE {
                current = nodes[current as usize].parent;
                depth += 1;
            }
            depth
        })
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_cloud(side: u32, copies: u32) -> PointCloudData {
        let mut points = Vec::new();
        for _ in 0..copies {
            for x in 0..side {
                for y in 0..side {
                    for z in 0..side {
                        points.push(Point::at([x as f32, y as f32, z as f32]));
                    }
                }
            }
        }
        PointCloudData::from_points(points)
    }

    #[test]
    fn scenario_a_explicit_codes() {
        let arrays = build_from_codes(&[5, 1, 9, 1], &[]);
        assert_eq!(arrays.sorted_codes, vec![1, 1, 5, 9]);
        assert_eq!(arrays.head_flags, vec![1, 0, 1, 1]);
        assert_eq!(arrays.scanned, vec![0, 1, 1, 2]);
        assert_eq!(arrays.num_unique, 3);
        assert_eq!(arrays.voxel_starts, vec![0, 2, 3]);
        assert_eq!(arrays.nodes.len(), 5);
    }

    #[test]
    fn scenario_b_empty_cloud() {
        let cloud = PointCloudData::empty();
        let arrays = reference_build(&cloud);
        assert_eq!(arrays, LpcArrays::default());
        assert!(validate(&cloud, &arrays, true).is_ok());
    }

    #[test]
    fn scenario_c_single_point() {
        let cloud = PointCloudData::from_points(vec![Point::at([1.0, 2.0, 3.0])]);
        let arrays = reference_build(&cloud);
        assert_eq!(arrays.head_flags, vec![1]);
        assert_eq!(arrays.num_unique, 1);
        assert_eq!(arrays.nodes.len(), 1);
        let root = arrays.root().unwrap();
        assert!(root.is_leaf());
        assert_eq!((root.start, root.count), (0, 1));
        validate(&cloud, &arrays, true).unwrap();
    }

    #[test]
    fn duplicated_grid_dedups_to_cells() {
        let cloud = grid_cloud(4, 3);
        let arrays = reference_build(&cloud);
        assert_eq!(arrays.num_unique, 64);
        assert_eq!(arrays.head_flags.iter().filter(|&&f| f == 1).count(), 64);
        validate(&cloud, &arrays, true).unwrap();
        // A full 4x4x4 grid produces a perfectly balanced tree.
        assert_eq!(tree_depth(&arrays.nodes, 64), 6);
    }

    #[test]
    fn validate_catches_broken_partition() {
        let cloud = grid_cloud(2, 2);
        let mut arrays = reference_build(&cloud);
        arrays.voxel_starts[1] = arrays.voxel_starts[2];
        assert!(validate(&cloud, &arrays, true).is_err());
    }

    #[test]
    fn validate_catches_unsorted_codes() {
        let cloud = grid_cloud(2, 1);
        let mut arrays = reference_build(&cloud);
        arrays.sorted_codes.swap(0, 7);
        assert!(validate(&cloud, &arrays, true).is_err());
    }

    #[test]
    fn tolerant_code_match_accepts_neighbouring_cells() {
        let a = morton::encode([10, 10, 10]);
        let b = morton::encode([11, 10, 9]);
        assert!(codes_match(a, b, false));
        assert!(!codes_match(a, b, true));
        assert!(!codes_match(a, morton::encode([12, 10, 10]), false));
    }
}
