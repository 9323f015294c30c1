//! Parity Engine
//!
//! Byte-wise XOR primitives and the group parity computation. The simple
//! parity of a row is the XOR of its N data blocks; the double parity of a
//! diagonal is the XOR of its N members (spanning data and simple-parity
//! columns). Both codes are folds of the same associative primitive, so
//! recovery can rebuild any single missing member of a redundancy set by
//! folding over the others in any order.
//!
//! Parity is computed data-first: only once all N² data blocks of a group
//! are final, because diagonal membership spans multiple rows. There is no
//! incremental update path.

use crate::geometry::Geometry;

/// XOR `src` into `dst` in place. Both slices must have the same length.
///
/// Works u64-wide and finishes the tail byte-by-byte, so the block size
/// does not have to be a multiple of the word width.
pub fn xor_into(dst: &mut [u8], src: &[u8]) {
    debug_assert_eq!(dst.len(), src.len(), "parity blocks must have equal size");

    let mut dst_words = dst.chunks_exact_mut(8);
    let mut src_words = src.chunks_exact(8);

    for (d, s) in dst_words.by_ref().zip(src_words.by_ref()) {
        let mut word = [0u8; 8];
        word.copy_from_slice(d);
        let x = u64::from_ne_bytes(word);

        word.copy_from_slice(s);
        let y = u64::from_ne_bytes(word);

        d.copy_from_slice(&(x ^ y).to_ne_bytes());
    }

    for (d, s) in dst_words.into_remainder().iter_mut().zip(src_words.remainder()) {
        *d ^= *s;
    }
}

/// XOR two equally sized blocks into `out`.
pub fn xor_blocks(a: &[u8], b: &[u8], out: &mut [u8]) {
    debug_assert_eq!(a.len(), out.len());
    out.copy_from_slice(a);
    xor_into(out, b);
}

/// Fold the members of a redundancy set, excluding `skip`, into a fresh
/// block. This is the recovery primitive: with `skip` being the corrupted
/// member, the fold reproduces its original contents.
pub fn fold_set(blocks: &[Vec<u8>], set: &[usize], skip: usize, block_size: usize) -> Vec<u8> {
    let mut acc = vec![0u8; block_size];

    for &member in set {
        if member != skip {
            xor_into(&mut acc, &blocks[member]);
        }
    }

    acc
}

/// Compute all simple and double parity blocks of a fully populated group.
///
/// Overwrites the parity slots of `blocks` in place; the N² data blocks are
/// left untouched, so running this twice on unchanged data is idempotent.
///
/// The diagonal pass walks the grid with `jump = N + 3`, stepping past
/// already-placed blocks, mirroring the construction the redundancy sets in
/// [`Geometry::diagonal_set`] are built from. A mismatch between the two
/// walks would break the diagonal XOR invariant, which the tests check.
pub fn compute_group_parity(geo: &Geometry, blocks: &mut [Vec<u8>]) {
    debug_assert_eq!(blocks.len(), geo.total_blocks());

    let n = geo.data_stripes();
    let total_stripes = geo.total_stripes();
    let w = geo.block_size();

    // Simple parity: XOR of the N data blocks of each row.
    for row in 0..n {
        let base = row * total_stripes;
        let mut acc = vec![0u8; w];

        for col in 0..n {
            xor_into(&mut acc, &blocks[base + col]);
        }

        blocks[geo.row_parity_index(row)].copy_from_slice(&acc);
    }

    // Double parity: one diagonal per dp slot, walked jump-wise through the
    // flattened grid, skipping slots already owned by another diagonal.
    let jump = total_stripes + 1;
    let total = geo.total_blocks();
    let mut used = geo.double_parity_indices();

    for row in 0..n {
        let dp = geo.diag_parity_index(row);
        let mut next = row + jump;
        let mut acc = blocks[row].clone();

        xor_into(&mut acc, &blocks[next]);
        used.push(row);
        used.push(next);

        for _ in 0..n.saturating_sub(2) {
            let aux = next + jump;

            if aux < total && !used.contains(&aux) {
                next = aux;
            } else {
                next += 1;

                while used.contains(&next) {
                    next += 1;
                }
            }

            xor_into(&mut acc, &blocks[next]);
            used.push(next);
        }

        blocks[dp].copy_from_slice(&acc);
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn is_zero(block: &[u8]) -> bool {
        block.iter().all(|&b| b == 0)
    }

    fn patterned_group(geo: &Geometry, seed: u8) -> Vec<Vec<u8>> {
        let w = geo.block_size();
        let mut blocks = vec![vec![0u8; w]; geo.total_blocks()];

        for small in 0..geo.data_blocks() {
            let big = geo.big_from_small(small);
            for (i, byte) in blocks[big].iter_mut().enumerate() {
                *byte = seed
                    .wrapping_mul(31)
                    .wrapping_add(small as u8)
                    .wrapping_add(i as u8);
            }
        }

        blocks
    }

    #[test]
    fn test_xor_into_odd_length() {
        // 13 bytes: one u64 word plus a 5-byte tail.
        let mut a: Vec<u8> = (0..13).collect();
        let b: Vec<u8> = (100..113).collect();
        let expect: Vec<u8> = a.iter().zip(b.iter()).map(|(x, y)| x ^ y).collect();

        xor_into(&mut a, &b);
        assert_eq!(a, expect);
    }

    #[test]
    fn test_xor_blocks_self_inverse() {
        let a = vec![0xA5u8; 32];
        let b = vec![0x3Cu8; 32];
        let mut out = vec![0u8; 32];

        xor_blocks(&a, &b, &mut out);
        xor_into(&mut out, &b);
        assert_eq!(out, a);
    }

    #[test]
    fn test_row_parity_invariant() {
        for n in [2, 3, 4, 5] {
            let geo = Geometry::new(n, 100).expect("valid geometry");
            let mut blocks = patterned_group(&geo, n as u8);
            compute_group_parity(&geo, &mut blocks);

            for row in 0..n {
                let set = geo
                    .horizontal_set(row * geo.total_stripes())
                    .expect("data blocks have a row set");
                let folded = fold_set(&blocks, &set, usize::MAX, geo.block_size());
                assert!(is_zero(&folded), "row {} parity broken for N={}", row, n);
            }
        }
    }

    #[test]
    fn test_diagonal_parity_invariant() {
        // Cross-validates the parity walk against Geometry::diagonal_set:
        // every stored diagonal must XOR-fold to zero.
        for n in [2, 3, 4, 5] {
            let geo = Geometry::new(n, 64).expect("valid geometry");
            let mut blocks = patterned_group(&geo, 7);
            compute_group_parity(&geo, &mut blocks);

            for dp in geo.double_parity_indices() {
                let set = geo.diagonal_set(dp).expect("dp block is never omitted");
                let folded = fold_set(&blocks, &set, usize::MAX, geo.block_size());
                assert!(is_zero(&folded), "diagonal of dp {} broken for N={}", dp, n);
            }
        }
    }

    #[test]
    fn test_parity_idempotent() {
        let geo = Geometry::new(4, 96).expect("valid geometry");
        let mut blocks = patterned_group(&geo, 42);

        compute_group_parity(&geo, &mut blocks);
        let first = blocks.clone();

        compute_group_parity(&geo, &mut blocks);
        assert_eq!(blocks, first);
    }

    #[test]
    fn test_fold_set_rebuilds_member() {
        let geo = Geometry::new(3, 128).expect("valid geometry");
        let mut blocks = patterned_group(&geo, 9);
        compute_group_parity(&geo, &mut blocks);

        // Rebuild data block 6 from its row.
        let set = geo.horizontal_set(6).expect("row set");
        let rebuilt = fold_set(&blocks, &set, 6, geo.block_size());
        assert_eq!(rebuilt, blocks[6]);

        // Rebuild data block 6 from its diagonal.
        let set = geo.diagonal_set(6).expect("stored diagonal");
        let rebuilt = fold_set(&blocks, &set, 6, geo.block_size());
        assert_eq!(rebuilt, blocks[6]);
    }
}
