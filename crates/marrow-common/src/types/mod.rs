//! Core types for MarrowDB.

mod ids;

pub use ids::PageId;
