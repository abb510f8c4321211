//! Allocation layer - page-granular bump allocation.
//!
//! This module provides the memory the tree lives in:
//! - [`PageArena`] - chunked, optionally file-backed block allocator

mod page_arena;

pub use page_arena::PageArena;
