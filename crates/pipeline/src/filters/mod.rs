//! Filter implementations for the ranking pipeline.

pub mod already_rated;
pub mod known_item;

// Re-export for convenience
pub use already_rated::AlreadyRatedFilter;
pub use known_item::KnownItemFilter;
