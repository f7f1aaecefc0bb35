//! Buffer pool errors.

use marrow_common::types::PageId;
use thiserror::Error;

/// Result type for buffer pool operations.
pub type BufferResult<T> = Result<T, BufferError>;

/// Errors that can occur during buffer pool operations.
#[derive(Debug, Error)]
#[allow(missing_docs)] // Fields are documented by variant docs
pub enum BufferError {
    /// No free frame and no evictable frame available.
    #[error("no free frames available, all pages are pinned")]
    NoFreeFrames,

    /// Page not resident in the buffer pool.
    #[error("page {page_id} not found in buffer pool")]
    PageNotFound { page_id: PageId },

    /// Unpin of a page whose pin count is already zero.
    #[error("page {page_id} is not pinned")]
    PageNotPinned { page_id: PageId },

    /// Delete of a page that still has outstanding pins.
    #[error("page {page_id} is pinned ({pin_count} outstanding)")]
    PagePinned { page_id: PageId, pin_count: u32 },

    /// Disk I/O error during page read/write.
    #[error("disk I/O error: {0}")]
    Io(#[from] marrow_storage::IoError),

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config { message: String },
}

impl BufferError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a page not found error.
    pub fn page_not_found(page_id: PageId) -> Self {
        Self::PageNotFound { page_id }
    }

    /// Returns true if this is a transient error that can be retried
    /// once other callers release their pins.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NoFreeFrames | Self::PagePinned { .. })
    }
}
