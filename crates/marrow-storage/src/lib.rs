//! # marrow-storage
//!
//! Disk manager for MarrowDB.
//!
//! This crate provides the byte-level page I/O sink used by the buffer
//! pool: blocking, page-granular reads and writes against a single data
//! file. Pages live at `page_id * page_size` offsets; reading a page that
//! was never written yields zeroed bytes.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Page-granular file I/O
pub mod disk;

/// I/O error types
pub mod error;

pub use disk::DiskManager;
pub use error::{IoError, IoResult};
