/// One `(j, k)` stage of the sorting network.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BitonicStep {
    pub j: u32,
    pub k: u32,
}

/// Smallest power of two >= `n`. Entries past `n` act as if they held the maximal key.
pub fn padded_len(n: u32) -> u64 {
    (n.max(1) as u64).next_power_of_two()
}

/// Every `(j, k)` pair in dispatch order: k doubles from 2 to `pot`, j halves from k/2 to 1.
///
/// `n <= 1` yields no steps.
pub fn schedule(n: u32) -> Vec<BitonicStep> {
    let pot = padded_len(n);
    let mut steps = Vec::new();
    let mut k = 2u64;
    while k <= pot {
        let mut j = k / 2;
        while j > 0 {
            steps.push(BitonicStep {
                j: j as u32,
                k: k as u32,
            });
            j /= 2;
        }
        k *= 2;
    }
    steps
}

/// Number of steps `schedule(n)` produces: log2(pot) * (log2(pot) + 1) / 2.
pub fn step_count(n: u32) -> usize {
    let log = padded_len(n).trailing_zeros() as usize;
    log * (log + 1) / 2
}

/// Compare partner of element `i`.
///
/// The first step of each `k` mirrors the block (`i ^ (k - 1)`) instead of the classic
/// `i ^ j` with a direction bit, so every exchange is ascending and the virtual padding
/// at the tail never has to move.
pub fn partner(i: u32, step: BitonicStep) -> u32 {
    if step.j == step.k / 2 {
        i ^ (step.k - 1)
    } else {
        i ^ step.j
    }
}

/// Run one network stage over `(code, index)` pairs. Ties on code are broken by index.
pub fn run_step(codes: &mut [u32], indices: &mut [u32], step: BitonicStep) {
    let n = codes.len() as u32;
    for i in 0..n {
        let l = partner(i, step);
        if l <= i || l >= n {
            continue;
        }
        let (iu, lu) = (i as usize, l as usize);
        if (codes[lu], indices[lu]) < (codes[iu], indices[iu]) {
            codes.swap(iu, lu);
            indices.swap(iu, lu);
        }
    }
}

/// Sort codes ascending in place, carrying `indices` along.
pub fn sort_pairs(codes: &mut [u32], indices: &mut [u32]) {
    debug_assert_eq!(codes.len(), indices.len());
    for step in schedule(codes.len() as u32) {
        run_step(codes, indices, step);
    }
}
