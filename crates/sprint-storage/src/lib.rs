//! Storage abstraction for sprint groups.
//!
//! Backend crates (e.g., sprint-store-sqlite) implement these traits so
//! `sprint-groups` doesn't depend on any specific database engine or schema details.

mod store;
mod types;

pub use store::*;
pub use types::*;

use thiserror::Error;

/// Uniform error type for all storage backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,
    #[error("already exists")]
    AlreadyExists,
    /// A guarded write observed a state other than the one it expected.
    #[error("conflict")]
    Conflict,
    /// A personnel update would leave the group outside `1..=max_personnel`.
    #[error("capacity exceeded")]
    CapacityExceeded,
    #[error("backend error: {0}")]
    Backend(String),
}
