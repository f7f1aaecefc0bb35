//! System-wide constants for MarrowDB.

// =============================================================================
// Page and Memory Constants
// =============================================================================

/// Default page size in bytes (8 KB).
///
/// This is a common page size that balances I/O efficiency with memory usage.
/// It matches the typical SSD block size and OS page size.
pub const DEFAULT_PAGE_SIZE: usize = 8 * 1024;

/// Minimum page size in bytes (512 B, one disk sector).
pub const MIN_PAGE_SIZE: usize = 512;

/// Maximum page size in bytes (64 KB).
pub const MAX_PAGE_SIZE: usize = 64 * 1024;

// =============================================================================
// Buffer Pool Constants
// =============================================================================

/// Default number of frames in the buffer pool.
pub const DEFAULT_POOL_FRAMES: usize = 128;

/// Default history depth for the LRU-K replacer (LRU-2).
pub const DEFAULT_REPLACER_K: usize = 2;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_constants() {
        // Page size should be power of 2
        assert!(DEFAULT_PAGE_SIZE.is_power_of_two());
        assert!(MIN_PAGE_SIZE.is_power_of_two());
        assert!(MAX_PAGE_SIZE.is_power_of_two());

        assert!(MIN_PAGE_SIZE <= DEFAULT_PAGE_SIZE);
        assert!(DEFAULT_PAGE_SIZE <= MAX_PAGE_SIZE);
    }

    #[test]
    fn test_pool_constants() {
        assert!(DEFAULT_POOL_FRAMES >= 1);
        assert!(DEFAULT_REPLACER_K >= 1);
    }
}
