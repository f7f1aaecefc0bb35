//! # marrow-common
//!
//! Common types and constants for MarrowDB.
//!
//! This crate provides the foundational pieces shared across the storage
//! layers:
//!
//! - **Types**: the strongly-typed [`PageId`] identifier
//! - **Constants**: page-size and buffer-pool defaults
//!
//! ## Example
//!
//! ```rust
//! use marrow_common::types::PageId;
//!
//! let page_id = PageId::new(42);
//! assert!(page_id.is_valid());
//! assert!(!PageId::INVALID.is_valid());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod constants;
pub mod types;

// Re-export commonly used items at the crate root
pub use constants::*;
pub use types::PageId;
