//! Split engine - partitioning an overfull block into two siblings.

use crate::arena::PageArena;
use crate::common::config::{KEY_SIZE, PAGE_SIZE};
use crate::common::Result;

use super::layout::{BlockLayout, ChildRef, PageRef};

/// Choose the slot where an overfull block is cut in two.
///
/// The cut starts at the midpoint and is nudged so that a run of equal
/// keys is never divided between the two halves:
/// - if the midpoint key equals the front key, the whole left half is one
///   run, and the cut moves right until it clears the run;
/// - otherwise, a run straddling the midpoint is pushed wholly into the
///   right half.
///
/// The one exception: a block consisting of a single run has to be cut
/// somewhere, and the midpoint is where.
pub(crate) fn split_point(block: &[u8], count: usize) -> usize {
    let key = |i: usize| BlockLayout::read_key(block, i);

    let mut at = count / 2;
    if key(at) == key(0) {
        if key(count - 1) != key(0) {
            while key(at) == key(0) {
                at += 1;
            }
        }
        // else: the block is one maximal run, cut at the midpoint
    } else {
        while at > 0 && key(at) == key(at - 1) {
            at -= 1;
        }
    }
    at
}

/// Split the overfull block behind `node`, allocating a sibling of the
/// same role from `arena`.
///
/// On return `node` describes the lower half and the returned descriptor
/// the upper half. The sibling block is allocated before any bytes move,
/// so a failed allocation leaves the original block untouched.
///
/// # Errors
/// Propagates the arena's allocation failure.
pub(crate) fn split(
    arena: &mut PageArena,
    layout: BlockLayout,
    node: &mut ChildRef,
) -> Result<ChildRef> {
    let id = node.page.block();
    let count = node.count as usize;

    let at = split_point(arena.block(id, layout.block_size()), count);
    let moved = count - at;

    let sibling = arena.alloc(layout.block_size(), PAGE_SIZE)?;

    // move the upper partition: keys and aux slots travel together
    arena.copy_between(id, BlockLayout::key_at(at), sibling, 0, moved * KEY_SIZE);
    arena.copy_between(
        id,
        layout.aux_at(at),
        sibling,
        layout.aux_at(0),
        moved * layout.aux_size(),
    );

    node.count = at as u32;
    let page = match node.page {
        PageRef::Leaf(_) => PageRef::Leaf(sibling),
        PageRef::Node(_) => PageRef::Node(sibling),
    };
    Ok(ChildRef {
        page,
        count: moved as u32,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::config::FANOUT;

    fn block_of(keys: &[u64]) -> Vec<u8> {
        let mut block = vec![0u8; FANOUT * KEY_SIZE];
        for (i, &k) in keys.iter().enumerate() {
            BlockLayout::write_key(&mut block, i, k);
        }
        block
    }

    #[test]
    fn test_distinct_keys_cut_at_midpoint() {
        let block = block_of(&[1, 2, 3, 4, 5, 6]);
        assert_eq!(split_point(&block, 6), 3);
    }

    #[test]
    fn test_straddling_run_moves_right() {
        // the run of 3s crosses the midpoint; the cut retreats before it
        let block = block_of(&[1, 2, 3, 3, 3, 6]);
        assert_eq!(split_point(&block, 6), 2);
    }

    #[test]
    fn test_front_run_cut_moves_past_it() {
        // the left half is all 1s; the cut advances to the run's end
        let block = block_of(&[1, 1, 1, 1, 2, 3]);
        assert_eq!(split_point(&block, 6), 4);
    }

    #[test]
    fn test_single_run_block_cuts_at_midpoint() {
        let block = block_of(&[7; 6]);
        assert_eq!(split_point(&block, 6), 3);
    }

    #[test]
    fn test_run_ending_exactly_at_midpoint() {
        let block = block_of(&[1, 2, 2, 5, 6, 7]);
        // key(3) = 5 differs from key(2) = 2, nothing to do
        assert_eq!(split_point(&block, 6), 3);
    }

    #[test]
    fn test_split_moves_upper_half() {
        let value_size = 8;
        let layout = BlockLayout::leaf(value_size);
        let mut arena = PageArena::anonymous();

        let id = arena.alloc(layout.block_size(), PAGE_SIZE).unwrap();
        let count = FANOUT;
        {
            let block = arena.block_mut(id, layout.block_size());
            for i in 0..count {
                BlockLayout::write_key(block, i, i as u64 * 2);
                let at = layout.aux_at(i);
                block[at..at + value_size].copy_from_slice(&(i as u64).to_le_bytes());
            }
        }

        let mut node = ChildRef {
            page: PageRef::Leaf(id),
            count: count as u32,
        };
        let sibling = split(&mut arena, layout, &mut node).unwrap();

        assert_eq!(node.count as usize + sibling.count as usize, count);
        assert_eq!(node.count as usize, count / 2);
        assert!(matches!(sibling.page, PageRef::Leaf(_)));

        // upper keys and values landed at the sibling's front, in order
        let sib_block = arena.block(sibling.page.block(), layout.block_size());
        for i in 0..sibling.count as usize {
            let orig = count / 2 + i;
            assert_eq!(BlockLayout::read_key(sib_block, i), orig as u64 * 2);
            let at = layout.aux_at(i);
            assert_eq!(
                sib_block[at..at + value_size],
                (orig as u64).to_le_bytes()
            );
        }

        // the lower half is untouched
        let block = arena.block(id, layout.block_size());
        for i in 0..node.count as usize {
            assert_eq!(BlockLayout::read_key(block, i), i as u64 * 2);
        }
    }
}
