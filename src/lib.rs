//! pagetree - a page-granular sorted index for datasets larger than RAM.
//!
//! # Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          PageTree                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────┐   │
//! │  │               Index Layer (tree/)                    │   │
//! │  │   layout math → binary search → split → find/insert  │   │
//! │  └─────────────────────────────────────────────────────┘   │
//! │                              ↓                              │
//! │  ┌──────────────────────┐      ┌──────────────────────┐    │
//! │  │  node arena (RAM)    │      │  leaf arena (RAM or  │    │
//! │  │  keys + child refs   │      │  scratch file)       │    │
//! │  │                      │      │  keys + values       │    │
//! │  └──────────────────────┘      └──────────────────────┘    │
//! │              Allocation Layer (arena/)                      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The tree maps `u64` keys to fixed-size value slots and allows several
//! entries per key (multimap semantics). Its blocks keep keys and values
//! in physically separate pages, so locating a key touches one key page
//! per level and value pages stay cold until a lookup actually hits.
//! With file-backed leaves, the OS pages value storage in and out and the
//! working set, not the tree size, determines memory residency.
//!
//! Entries can be inserted but never removed; storage grows monotonically
//! and is reclaimed only when the tree is dropped.
//!
//! # Modules
//! - [`common`] - Shared primitives (BlockId, Error, config)
//! - [`arena`] - Page-granular bump allocation over mmap chunks
//! - [`tree`] - The sorted index itself
//!
//! # Quick Start
//! ```
//! use pagetree::PageTree;
//!
//! // 8-byte value slots, leaves in anonymous memory
//! let mut tree = PageTree::new(8)?;
//!
//! tree.insert(7)?.copy_from_slice(&700u64.to_le_bytes());
//! tree.insert(7)?.copy_from_slice(&701u64.to_le_bytes());
//!
//! // two entries share key 7; pick one by occurrence index
//! assert!(tree.find(7, 0).is_some());
//! assert!(tree.find(7, 1).is_some());
//! assert!(tree.find(7, 2).is_none());
//! # Ok::<(), pagetree::Error>(())
//! ```

pub mod arena;
pub mod common;
pub mod tree;

// Re-export commonly used items at crate root for convenience
pub use common::config::{FANOUT, PAGE_SIZE};
pub use common::{BlockId, Error, Result};

pub use arena::PageArena;
pub use tree::PageTree;
