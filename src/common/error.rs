//! Error types for pagetree.

use thiserror::Error;

/// Convenient Result type alias.
///
/// Instead of writing `Result<T, Error>` everywhere, we can write
/// `Result<T>`. This is a common Rust pattern (see `std::io::Result`).
pub type Result<T> = std::result::Result<T, Error>;

/// All possible errors in pagetree.
///
/// Only allocation can fail. A missing key is a normal outcome of `find`
/// and is reported as `None`, never as an `Error`.
#[derive(Debug, Error)]
pub enum Error {
    /// The arena's backing file could not be created or grown.
    #[error("backing file error: {0}")]
    Backing(#[source] std::io::Error),

    /// A page allocation request could not be satisfied.
    ///
    /// Propagated out of the insertion that needed the block. The insertion
    /// is aborted; see [`PageTree::insert`](crate::PageTree::insert) for
    /// what the caller may assume about the tree afterwards.
    #[error("allocation of {requested} bytes failed: {source}")]
    Alloc {
        /// Size of the failed request in bytes.
        requested: usize,
        #[source]
        source: std::io::Error,
    },
}
