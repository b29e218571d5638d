//! Type definitions for sprint storage.

mod groups;
mod ids;
mod members;
mod memberships;

// Re-export all types from submodules
pub use groups::*;
pub use ids::*;
pub use members::*;
pub use memberships::*;
