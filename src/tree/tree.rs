//! The tree handle and its lookup and insertion engines.

use std::path::Path;

use crate::arena::PageArena;
use crate::common::config::{FANOUT, PAGE_SIZE};
use crate::common::{BlockId, Result};

use super::layout::{BlockLayout, ChildRef, PageRef};
use super::search::locate;
use super::split;

/// Outcome of probing one subtree for the n-th occurrence of a key.
enum Probe {
    /// The requested occurrence lives in this leaf slot.
    Hit { leaf: BlockId, slot: usize },
    /// The subtree's run of the key ended before reaching the requested
    /// occurrence; `remaining` occurrences are still owed and the next
    /// sibling run should supply them.
    Skip { remaining: u64 },
    /// The key, or the requested occurrence of it, is definitively absent.
    Miss,
}

/// A page-granular sorted index mapping `u64` keys to fixed-size value
/// slots, with duplicate keys allowed.
///
/// # Architecture
/// ```text
/// ┌─────────────────────────────────────────────────────┐
/// │                      PageTree                       │
/// │        find(key, occurrence)      insert(key)       │
/// ├──────────────────────────┬──────────────────────────┤
/// │      internal nodes      │          leaves          │
/// │  keys + child descriptors│      keys + values       │
/// ├──────────────────────────┼──────────────────────────┤
/// │     PageArena (nodes)    │    PageArena (leaves)    │
/// │     anonymous memory     │  anonymous memory or a   │
/// │                          │      scratch file        │
/// └──────────────────────────┴──────────────────────────┘
/// ```
///
/// Node storage stays in RAM (a multi-GB tree has only a few MB of
/// nodes); leaf storage may swap through a scratch file, in which case
/// the OS pages value blocks in and out on demand and the working set,
/// not the tree size, determines memory residency.
///
/// # Duplicates
/// Several entries may share a key. `find` takes a 0-based occurrence
/// index to pick one; the order of occurrences within a key is stable
/// between mutations but is not insertion order.
///
/// # Thread Safety
/// `PageTree` is single-threaded. Callers needing concurrent access must
/// serialize externally.
///
/// # Usage
/// ```
/// use pagetree::PageTree;
///
/// let mut tree = PageTree::new(8)?;
/// tree.insert(42)?.copy_from_slice(&7u64.to_le_bytes());
///
/// let slot = tree.find(42, 0).unwrap();
/// assert_eq!(u64::from_le_bytes(slot.try_into().unwrap()), 7);
/// assert!(tree.find(42, 1).is_none());
/// # Ok::<(), pagetree::Error>(())
/// ```
pub struct PageTree {
    /// Internal-node storage; stays memory-resident.
    nodes: PageArena,
    /// Leaf storage; may swap through a scratch file.
    leaves: PageArena,
    leaf_layout: BlockLayout,
    /// The topmost block and its entry count.
    root: ChildRef,
    /// Internal-node levels above the leaves. 0 means the root is a leaf.
    depth: usize,
    /// Total number of entries.
    len: u64,
}

impl PageTree {
    /// Create an empty tree whose leaves live in anonymous memory.
    ///
    /// `value_size` is the byte width of every value slot; it may be 0,
    /// degenerating the tree into a key multiset.
    ///
    /// # Errors
    /// Propagates the allocation of the initial root leaf.
    pub fn new(value_size: usize) -> Result<Self> {
        Self::build(value_size, PageArena::anonymous())
    }

    /// Create an empty tree whose leaves swap through a scratch file.
    ///
    /// The file at `path` is created (truncated if present) and grows with
    /// the tree; its layout is private and its contents are meaningless
    /// once the tree is dropped.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created, or propagates the
    /// allocation of the initial root leaf.
    pub fn with_leaf_file<P: AsRef<Path>>(value_size: usize, path: P) -> Result<Self> {
        Self::build(value_size, PageArena::file_backed(path)?)
    }

    fn build(value_size: usize, mut leaves: PageArena) -> Result<Self> {
        let leaf_layout = BlockLayout::leaf(value_size);
        let first = leaves.alloc(leaf_layout.block_size(), PAGE_SIZE)?;
        Ok(Self {
            nodes: PageArena::anonymous(),
            leaves,
            leaf_layout,
            root: ChildRef {
                page: PageRef::Leaf(first),
                count: 0,
            },
            depth: 0,
            len: 0,
        })
    }

    /// Byte width of one value slot.
    #[inline]
    pub fn value_size(&self) -> usize {
        self.leaf_layout.aux_size()
    }

    /// Total number of entries.
    #[inline]
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Whether the tree holds no entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Internal-node levels between the root and the leaves.
    #[inline]
    pub fn depth(&self) -> usize {
        self.depth
    }

    // ========================================================================
    // Lookup engine
    // ========================================================================

    /// Look up the value slot of the `occurrence`-th entry with `key`.
    ///
    /// `occurrence` is 0-based: the first entry with the key is occurrence
    /// 0. Returns `None` when the key is absent or has fewer occurrences.
    pub fn find(&self, key: u64, occurrence: u64) -> Option<&[u8]> {
        match self.probe(key, occurrence, self.root) {
            Probe::Hit { leaf, slot } => {
                let at = self.leaf_layout.aux_at(slot);
                let block = self.leaves.block(leaf, self.leaf_layout.block_size());
                Some(&block[at..at + self.leaf_layout.aux_size()])
            }
            Probe::Skip { .. } | Probe::Miss => None,
        }
    }

    /// Probe the subtree behind `node` for the `occurrence`-th entry with
    /// `key`.
    ///
    /// `node` is always the subtree whose key range covers `key` (its
    /// siblings to the right start above it), with one exception: a run of
    /// `key` too large for one block spans several adjacent subtrees, and
    /// the walk below threads the occurrence budget through them via
    /// [`Probe::Skip`].
    fn probe(&self, key: u64, occurrence: u64, node: ChildRef) -> Probe {
        let count = node.count as usize;
        match node.page {
            PageRef::Leaf(id) => {
                let block = self.leaves.block(id, self.leaf_layout.block_size());
                let Some(i) = locate(block, count, key) else {
                    return Probe::Miss;
                };
                if BlockLayout::read_key(block, i) != key {
                    return Probe::Miss;
                }

                // `i` is the front of the run in this leaf
                let tail = (count - i) as u64;
                if occurrence < tail {
                    let slot = i + occurrence as usize;
                    if BlockLayout::read_key(block, slot) == key {
                        Probe::Hit { leaf: id, slot }
                    } else {
                        // the run ends inside this leaf, short of the
                        // requested occurrence; no sibling can continue it
                        Probe::Miss
                    }
                } else {
                    // the run may continue in the next sibling leaf
                    Probe::Skip {
                        remaining: occurrence - tail,
                    }
                }
            }
            PageRef::Node(id) => {
                let block = self.nodes.block(id, BlockLayout::NODE.block_size());
                let Some(i) = locate(block, count, key) else {
                    return Probe::Miss;
                };
                if BlockLayout::read_key(block, i) != key {
                    // the key, if present at all, lives under this child
                    let child = BlockLayout::read_child(block, i);
                    return self.probe(key, occurrence, child);
                }

                // several children may start with `key`; walk them left to
                // right, carrying the budget left over by each exhausted run
                let mut remaining = occurrence;
                let mut j = i;
                while j < count && BlockLayout::read_key(block, j) == key {
                    let child = BlockLayout::read_child(block, j);
                    match self.probe(key, remaining, child) {
                        hit @ Probe::Hit { .. } => return hit,
                        Probe::Miss => return Probe::Miss,
                        Probe::Skip { remaining: left } => remaining = left,
                    }
                    j += 1;
                }
                Probe::Skip { remaining }
            }
        }
    }

    // ========================================================================
    // Insertion engine
    // ========================================================================

    /// Insert `key` and return its freshly reserved value slot.
    ///
    /// The slot's bytes are zeroed fresh memory the first time and stale
    /// otherwise; the caller is expected to write the value.
    ///
    /// # Errors
    /// Propagates allocation failure. An `Err` aborts the insertion; a
    /// failure that strikes while a split was propagating can leave the
    /// new sibling unattached, so the tree must be treated as poisoned
    /// after any `Err` from this method.
    pub fn insert(&mut self, key: u64) -> Result<&mut [u8]> {
        let mut root = self.root;
        let (leaf, slot, split_off) = self.insert_rec(key, &mut root)?;
        self.root = root;

        if let Some(sibling) = split_off {
            self.grow_root(sibling)?;
        }
        self.len += 1;

        let at = self.leaf_layout.aux_at(slot);
        let size = self.leaf_layout.aux_size();
        let block = self.leaves.block_mut(leaf, self.leaf_layout.block_size());
        Ok(&mut block[at..at + size])
    }

    /// Recursive insertion step.
    ///
    /// Reserves a slot for `key` under `node`, updating `node`'s count in
    /// place. Returns the leaf block and slot index of the reserved value,
    /// plus the descriptor of a new sibling subtree if `node`'s block had
    /// to split; the caller owns attaching that sibling next to `node`.
    fn insert_rec(
        &mut self,
        key: u64,
        node: &mut ChildRef,
    ) -> Result<(BlockId, usize, Option<ChildRef>)> {
        match node.page {
            PageRef::Leaf(_) => self.insert_into_leaf(key, node),
            PageRef::Node(_) => self.insert_below(key, node),
        }
    }

    /// Leaf-level insertion: split first if the leaf is full, then open a
    /// slot at the key's position.
    fn insert_into_leaf(
        &mut self,
        key: u64,
        node: &mut ChildRef,
    ) -> Result<(BlockId, usize, Option<ChildRef>)> {
        let layout = self.leaf_layout;

        let mut sibling = None;
        if node.count as usize >= FANOUT {
            sibling = Some(split::split(&mut self.leaves, layout, node)?);
        }

        // the new key goes into whichever half covers it
        let dest: &mut ChildRef = match sibling.as_mut() {
            Some(sib) if key >= self.min_key(sib.page) => sib,
            _ => node,
        };

        let id = dest.page.block();
        let count = dest.count as usize;
        let slot = insert_slot(self.leaves.block(id, layout.block_size()), count, key);

        let block = self.leaves.block_mut(id, layout.block_size());
        shift_right(block, layout, slot, count);
        BlockLayout::write_key(block, slot, key);
        dest.count += 1;

        Ok((id, slot, sibling))
    }

    /// Internal-level insertion: descend into the covering child, refresh
    /// its descriptor, and absorb any sibling its split produced.
    fn insert_below(
        &mut self,
        key: u64,
        node: &mut ChildRef,
    ) -> Result<(BlockId, usize, Option<ChildRef>)> {
        let id = node.page.block();
        let count = node.count as usize;

        let (i, mut child) = {
            let block = self.nodes.block(id, BlockLayout::NODE.block_size());
            let i = locate(block, count, key).unwrap_or(0);
            (i, BlockLayout::read_child(block, i))
        };

        let (leaf, slot, child_split) = self.insert_rec(key, &mut child)?;

        // write the descriptor back and refresh this node's copy of the
        // child's minimum (the new key may have become its front)
        let child_min = self.min_key(child.page);
        {
            let block = self.nodes.block_mut(id, BlockLayout::NODE.block_size());
            BlockLayout::write_child(block, i, child);
            if child_min < BlockLayout::read_key(block, i) {
                BlockLayout::write_key(block, i, child_min);
            }
        }

        let Some(new_child) = child_split else {
            return Ok((leaf, slot, None));
        };

        // the split below produced a new subtree; enter its descriptor
        // here, with the same capacity handling as a leaf entry
        let sep = self.min_key(new_child.page);

        let mut sibling = None;
        if node.count as usize >= FANOUT {
            sibling = Some(split::split(&mut self.nodes, BlockLayout::NODE, node)?);
        }
        let dest: &mut ChildRef = match sibling.as_mut() {
            Some(sib) if sep >= self.min_key(sib.page) => sib,
            _ => node,
        };

        let dest_id = dest.page.block();
        let dest_count = dest.count as usize;
        let at = insert_slot(
            self.nodes.block(dest_id, BlockLayout::NODE.block_size()),
            dest_count,
            sep,
        );

        let block = self.nodes.block_mut(dest_id, BlockLayout::NODE.block_size());
        shift_right(block, BlockLayout::NODE, at, dest_count);
        BlockLayout::write_key(block, at, sep);
        BlockLayout::write_child(block, at, new_child);
        dest.count += 1;

        Ok((leaf, slot, sibling))
    }

    /// Install a new root above the old one after a root split.
    ///
    /// The new root is an internal node holding exactly two descriptors,
    /// the truncated former root and its new sibling; only once it is in
    /// place does the depth grow.
    fn grow_root(&mut self, sibling: ChildRef) -> Result<()> {
        let low = self.root;
        let low_min = self.min_key(low.page);
        let sib_min = self.min_key(sibling.page);

        let id = self.nodes.alloc(BlockLayout::NODE.block_size(), PAGE_SIZE)?;
        let block = self.nodes.block_mut(id, BlockLayout::NODE.block_size());
        BlockLayout::write_key(block, 0, low_min);
        BlockLayout::write_child(block, 0, low);
        BlockLayout::write_key(block, 1, sib_min);
        BlockLayout::write_child(block, 1, sibling);

        self.root = ChildRef {
            page: PageRef::Node(id),
            count: 2,
        };
        self.depth += 1;
        Ok(())
    }

    /// Smallest key in the subtree behind `page` (key slot 0 of a block is
    /// its subtree's minimum).
    fn min_key(&self, page: PageRef) -> u64 {
        match page {
            PageRef::Leaf(id) => {
                BlockLayout::read_key(self.leaves.block(id, self.leaf_layout.block_size()), 0)
            }
            PageRef::Node(id) => {
                BlockLayout::read_key(self.nodes.block(id, BlockLayout::NODE.block_size()), 0)
            }
        }
    }
}

/// Slot where `key` enters a block holding `count` sorted keys: the front
/// of an equal run, or right after the last smaller key, or 0 when every
/// present key is larger.
fn insert_slot(block: &[u8], count: usize, key: u64) -> usize {
    match locate(block, count, key) {
        None => 0,
        Some(i) if BlockLayout::read_key(block, i) < key => i + 1,
        Some(i) => i,
    }
}

/// Open slot `at` by shifting entries `at..count` one slot right, keys
/// and aux slots moving in lockstep.
fn shift_right(block: &mut [u8], layout: BlockLayout, at: usize, count: usize) {
    if at < count {
        block.copy_within(BlockLayout::key_range(at, count), BlockLayout::key_at(at + 1));
        block.copy_within(layout.aux_range(at, count), layout.aux_at(at + 1));
    }
}
