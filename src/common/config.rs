//! Configuration constants for pagetree.

/// Size of a memory page in bytes (4KB).
///
/// This value is chosen to match:
/// - OS page size on most systems (4096 bytes)
/// - The granularity at which the OS pages file-backed leaf storage in
///   and out of memory
///
/// # Alignment
/// Every tree block is allocated at this alignment, so the key array of a
/// block always occupies exactly one memory page.
pub const PAGE_SIZE: usize = 4096;

/// Size of one key slot in bytes. Keys are `u64`.
pub const KEY_SIZE: usize = std::mem::size_of::<u64>();

/// Number of key slots a single page can hold (512 on 64-bit platforms).
///
/// One page of keys determines the fanout of the whole tree: every leaf
/// and every internal node holds at most this many entries, and a lookup
/// that only needs to locate a key touches exactly one key page per level.
pub const FANOUT: usize = PAGE_SIZE / KEY_SIZE;
