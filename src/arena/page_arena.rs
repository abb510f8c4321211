//! Page Arena - bump allocation of page-aligned memory blocks.
//!
//! The [`PageArena`] hands out blocks carved from large memory-mapped
//! chunks. Allocation only ever moves forward: blocks are never freed,
//! never resized, and never move, so a [`BlockId`] stays valid for the
//! lifetime of the arena.
//!
//! Two kinds of arena exist:
//! - **anonymous**: chunks are plain process memory,
//! - **file-backed**: chunks map consecutive ranges of a growable scratch
//!   file, so cold blocks can be paged out by the OS instead of occupying
//!   RAM.
//!
//! The scratch file is swap space, not a database file: it is created
//! fresh on construction and its contents mean nothing once the arena is
//! gone.

use std::fs::{File, OpenOptions};
use std::path::Path;

use memmap2::{MmapMut, MmapOptions};

use crate::common::config::PAGE_SIZE;
use crate::common::{BlockId, Error, Result};

/// Minimum size of one mapped chunk (4 MiB).
const CHUNK_BYTES: usize = 4 << 20;

/// One mapped region. `start` is the arena-wide offset of its first byte.
struct Chunk {
    start: u64,
    map: MmapMut,
}

impl Chunk {
    #[inline]
    fn end(&self) -> u64 {
        self.start + self.map.len() as u64
    }
}

/// A bump allocator over memory-mapped chunks.
///
/// # Address Space
/// ```text
/// offset:  0             4MiB          8MiB
///          ┌─────────────┬─────────────┬───────── ...
///          │   chunk 0   │   chunk 1   │   chunk 2
///          └─────────────┴─────────────┴───────── ...
///           ▲ blocks are carved front to back; a BlockId is the
///             arena-wide byte offset of the block's first byte
/// ```
///
/// Chunk boundaries never fall inside a block: a request that does not fit
/// the current chunk's remainder opens a new chunk (at least [`CHUNK_BYTES`]
/// long, larger if the request demands it) and the remainder is abandoned.
///
/// # Thread Safety
/// `PageArena` is single-threaded; the owning structure serializes access.
pub struct PageArena {
    chunks: Vec<Chunk>,
    backing: Option<File>,
    /// Arena-wide offset of the next free byte.
    cursor: u64,
}

impl PageArena {
    /// Create an arena backed by anonymous memory.
    ///
    /// No memory is mapped until the first allocation.
    pub fn anonymous() -> Self {
        Self {
            chunks: Vec::new(),
            backing: None,
            cursor: 0,
        }
    }

    /// Create an arena whose chunks are mapped from a scratch file.
    ///
    /// The file at `path` is created, truncated if it already exists, and
    /// grown as the arena grows.
    ///
    /// # Errors
    /// Returns `Error::Backing` if the file cannot be opened.
    pub fn file_backed<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(Error::Backing)?;

        Ok(Self {
            chunks: Vec::new(),
            backing: Some(file),
            cursor: 0,
        })
    }

    /// Allocate `size` bytes aligned to `align`.
    ///
    /// The returned block's location is fixed forever; there is no way to
    /// free it.
    ///
    /// # Panics
    /// Panics if `align` is zero, not a power of two, or greater than
    /// [`PAGE_SIZE`].
    ///
    /// # Errors
    /// Returns `Error::Alloc` if the OS refuses to map a new chunk, or
    /// `Error::Backing` if the scratch file cannot be grown.
    pub fn alloc(&mut self, size: usize, align: usize) -> Result<BlockId> {
        assert!(
            align.is_power_of_two() && align <= PAGE_SIZE,
            "unsupported alignment: {align}"
        );

        let mut at = align_up(self.cursor, align as u64);
        let end = self.chunks.last().map(Chunk::end).unwrap_or(0);
        if at + size as u64 > end {
            self.grow(size)?;
            // a fresh chunk starts page-aligned, satisfying any allowed align
            at = self.cursor;
        }
        self.cursor = at + size as u64;
        Ok(BlockId::new(at))
    }

    /// Borrow `len` bytes of the block at `id`.
    ///
    /// # Panics
    /// Panics if the range was never allocated from this arena.
    pub fn block(&self, id: BlockId, len: usize) -> &[u8] {
        let chunk = &self.chunks[self.chunk_index(id.offset())];
        let off = (id.offset() - chunk.start) as usize;
        assert!(off + len <= chunk.map.len(), "block range out of bounds");
        &chunk.map[off..off + len]
    }

    /// Mutably borrow `len` bytes of the block at `id`.
    ///
    /// # Panics
    /// Panics if the range was never allocated from this arena.
    pub fn block_mut(&mut self, id: BlockId, len: usize) -> &mut [u8] {
        let chunk_index = self.chunk_index(id.offset());
        let chunk = &mut self.chunks[chunk_index];
        let off = (id.offset() - chunk.start) as usize;
        assert!(off + len <= chunk.map.len(), "block range out of bounds");
        &mut chunk.map[off..off + len]
    }

    /// Copy `len` bytes from one block to another.
    ///
    /// The two ranges must belong to distinct blocks and therefore never
    /// overlap.
    pub fn copy_between(
        &mut self,
        src: BlockId,
        src_off: usize,
        dst: BlockId,
        dst_off: usize,
        len: usize,
    ) {
        if len == 0 {
            return;
        }
        let si = self.chunk_index(src.offset());
        let di = self.chunk_index(dst.offset());
        let s = (src.offset() - self.chunks[si].start) as usize + src_off;
        let d = (dst.offset() - self.chunks[di].start) as usize + dst_off;
        assert!(s + len <= self.chunks[si].map.len(), "copy source out of bounds");
        assert!(d + len <= self.chunks[di].map.len(), "copy target out of bounds");

        if si == di {
            self.chunks[si].map.copy_within(s..s + len, d);
        } else if si < di {
            let (head, tail) = self.chunks.split_at_mut(di);
            tail[0].map[d..d + len].copy_from_slice(&head[si].map[s..s + len]);
        } else {
            let (head, tail) = self.chunks.split_at_mut(si);
            head[di].map[d..d + len].copy_from_slice(&tail[0].map[s..s + len]);
        }
    }

    /// Total bytes handed out so far, including alignment padding.
    #[inline]
    pub fn allocated_bytes(&self) -> u64 {
        self.cursor
    }

    /// Total bytes of address space reserved from the OS.
    #[inline]
    pub fn reserved_bytes(&self) -> u64 {
        self.chunks.last().map(Chunk::end).unwrap_or(0)
    }

    /// Whether this arena swaps to a scratch file.
    #[inline]
    pub fn is_file_backed(&self) -> bool {
        self.backing.is_some()
    }

    /// Map a new chunk big enough for a `min`-byte request.
    fn grow(&mut self, min: usize) -> Result<()> {
        let len = align_up(min.max(CHUNK_BYTES) as u64, PAGE_SIZE as u64) as usize;
        let start = self.chunks.last().map(Chunk::end).unwrap_or(0);

        let map = match &self.backing {
            None => MmapMut::map_anon(len).map_err(|e| Error::Alloc {
                requested: len,
                source: e,
            })?,
            Some(file) => {
                file.set_len(start + len as u64).map_err(Error::Backing)?;
                // SAFETY: the scratch file was created by this arena with
                // truncate and is not shared with any other process; each
                // chunk maps a disjoint range and lives as long as `self`.
                unsafe {
                    MmapOptions::new()
                        .offset(start)
                        .len(len)
                        .map_mut(file)
                        .map_err(|e| Error::Alloc {
                            requested: len,
                            source: e,
                        })?
                }
            }
        };

        self.chunks.push(Chunk { start, map });
        self.cursor = start;
        Ok(())
    }

    /// Index of the chunk containing arena offset `offset`.
    fn chunk_index(&self, offset: u64) -> usize {
        let i = self.chunks.partition_point(|c| c.start <= offset);
        assert!(i > 0, "offset {offset} precedes all chunks");
        i - 1
    }
}

#[inline]
fn align_up(value: u64, align: u64) -> u64 {
    (value + align - 1) & !(align - 1)
}
