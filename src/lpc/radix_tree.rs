use crate::lpc::scan::voxel_range;
use bytemuck::{Pod, Zeroable};

/// Unset parent/child link.
pub const INVALID_NODE: u32 = u32::MAX;

/// Binary radix tree entry; layout matches `Node` in `common.wgsl`.
///
/// Internal nodes occupy `[0, U-1)` and leaves `[U-1, 2U-1)` for `U` unique voxels,
/// so node 0 is the root whether or not any internal node exists.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Pod, Zeroable)]
pub struct Node {
    pub parent: u32,
    pub left: u32,
    pub right: u32,
    pub is_leaf: u32,
    pub code: u32,
    pub prefix_len: u32,
    pub start: u32,
    pub count: u32,
}

impl Node {
    pub fn leaf(code: u32, start: u32, count: u32) -> Self {
        Self {
            parent: INVALID_NODE,
            left: INVALID_NODE,
            right: INVALID_NODE,
            is_leaf: 1,
            code,
            prefix_len: 32,
            start,
            count,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.is_leaf != 0
    }
}

pub fn leaf_index(num_unique: u32, voxel: u32) -> u32 {
    num_unique - 1 + voxel
}

/// Common prefix length of keys `i` and `j`, or -1 when `j` is out of range.
/// Equal codes fall back to the index bits so the ordering stays total.
pub fn common_prefix(codes: &[u32], i: i64, j: i64) -> i32 {
    if j < 0 || j >= codes.len() as i64 {
        return -1;
    }
    let (a, b) = (codes[i as usize], codes[j as usize]);
    if a == b {
        32 + ((i as u32) ^ (j as u32)).leading_zeros() as i32
    } else {
        (a ^ b).leading_zeros() as i32
    }
}

/// Leaf range `[first, last]` and split position owned by internal node `i`.
pub fn internal_split(codes: &[u32], i: i64) -> (i64, i64, i64, i32) {
    let delta = |j: i64| common_prefix(codes, i, j);
    let d: i64 = if delta(i + 1) > delta(i - 1) { 1 } else { -1 };

    let delta_min = delta(i - d);
    let mut l_max = 2i64;
    while delta(i + l_max * d) > delta_min {
        l_max *= 2;
    }
    let mut l = 0i64;
    let mut t = l_max / 2;
    while t >= 1 {
        if delta(i + (l + t) * d) > delta_min {
            l += t;
        }
        t /= 2;
    }
    let j = i + l * d;

    let delta_node = delta(j);
    let mut s = 0i64;
    let mut t = l;
    loop {
        t = (t + 1) / 2;
        if delta(i + (s + t) * d) > delta_node {
            s += t;
        }
        if t <= 1 {
            break;
        }
    }
    let gamma = i + s * d + d.min(0);
    (i.min(j), i.max(j), gamma, delta_node)
}

/// Build the full tree on the host. Returns `2U - 1` nodes (empty for `U = 0`).
pub fn build(unique_codes: &[u32], voxel_starts: &[u32], point_count: u32) -> Vec<Node> {
    let num_unique = unique_codes.len() as u32;
    if num_unique == 0 {
        return Vec::new();
    }

    let mut nodes = vec![Node::zeroed(); (2 * num_unique - 1) as usize];
    for v in 0..num_unique {
        let range = voxel_range(voxel_starts, v as usize, point_count);
        nodes[leaf_index(num_unique, v) as usize] =
            Node::leaf(unique_codes[v as usize], range.start, range.end - range.start);
    }

    for i in 0..num_unique.saturating_sub(1) {
        let (first, last, gamma, prefix_len) = internal_split(unique_codes, i as i64);
        let left = if first == gamma {
            leaf_index(num_unique, gamma as u32)
        } else {
            gamma as u32
        };
        let right = if last == gamma + 1 {
            leaf_index(num_unique, gamma as u32 + 1)
        } else {
            gamma as u32 + 1
        };
        let start = voxel_starts[first as usize];
        let end = voxel_range(voxel_starts, last as usize, point_count).end;

        let node = &mut nodes[i as usize];
        node.left = left;
        node.right = right;
        node.is_leaf = 0;
        node.code = unique_codes[first as usize];
        node.prefix_len = prefix_len as u32;
        node.start = start;
        node.count = end - start;
        nodes[left as usize].parent = i;
        nodes[right as usize].parent = i;
    }
    nodes[0].parent = INVALID_NODE;
    nodes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_is_eight_words() {
        assert_eq!(size_of::<Node>(), 32);
    }

    #[test]
    fn single_voxel_is_a_lone_leaf() {
        let nodes = build(&[3], &[0], 1);
        assert_eq!(nodes.len(), 1);
        assert!(nodes[0].is_leaf());
        assert_eq!(nodes[0].parent, INVALID_NODE);
        assert_eq!((nodes[0].start, nodes[0].count), (0, 1));
    }

    #[test]
    fn two_voxels_share_the_root() {
        let nodes = build(&[0b0001, 0b1000], &[0, 3], 5);
        assert_eq!(nodes.len(), 3);
        let root = nodes[0];
        assert!(!root.is_leaf());
        assert_eq!((root.left, root.right), (1, 2));
        assert_eq!((root.start, root.count), (0, 5));
        assert_eq!(root.prefix_len, 28);
        assert_eq!(nodes[1].parent, 0);
        assert_eq!(nodes[2].parent, 0);
        assert_eq!((nodes[2].start, nodes[2].count), (3, 2));
    }

    #[test]
    fn karras_example_layout() {
        // The eight 5-bit keys from Karras' figure, shifted into the top of a u32.
        let codes: Vec<u32> = [0b00001, 0b00010, 0b00100, 0b00101, 0b10011, 0b11000, 0b11001, 0b11110]
            .iter()
            .map(|c| c << 27)
            .collect();
        let starts: Vec<u32> = (0..8).collect();
        let nodes = build(&codes, &starts, 8);
        let leaf = |v| leaf_index(8, v);

        assert_eq!((nodes[0].left, nodes[0].right), (3, 4));
        assert_eq!((nodes[3].left, nodes[3].right), (1, 2));
        assert_eq!((nodes[1].left, nodes[1].right), (leaf(0), leaf(1)));
        assert_eq!((nodes[2].left, nodes[2].right), (leaf(2), leaf(3)));
        assert_eq!((nodes[4].left, nodes[4].right), (leaf(4), 5));
        assert_eq!((nodes[5].left, nodes[5].right), (6, leaf(7)));
        assert_eq!((nodes[6].left, nodes[6].right), (leaf(5), leaf(6)));
        assert_eq!(nodes[0].count, 8);
    }

    #[test]
    fn equal_codes_use_index_tiebreak() {
        assert!(common_prefix(&[4, 4], 0, 1) >= 32);
        assert_eq!(common_prefix(&[4, 4], 0, 2), -1);
    }
}
