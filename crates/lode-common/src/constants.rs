//! System-wide constants for LodeDB.

// =============================================================================
// Page Geometry
// =============================================================================

/// Page size in bytes (4 KB).
///
/// The unit of disk I/O and the size of every buffer-pool frame. This is a
/// build-time constant of the engine, not negotiable at runtime.
pub const PAGE_SIZE: usize = 4 * 1024;

// =============================================================================
// Buffer Pool Defaults
// =============================================================================

/// Default number of frames in the buffer pool.
pub const DEFAULT_POOL_FRAMES: usize = 1024;

/// Minimum number of frames a pool can be configured with.
pub const MIN_POOL_FRAMES: usize = 1;

/// Default K for the LRU-K replacement policy.
///
/// LRU-2 is the classical choice: it distinguishes pages with established
/// reuse from pages touched once by a scan.
pub const DEFAULT_REPLACER_K: usize = 2;
