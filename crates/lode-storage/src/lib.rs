//! # lode-storage
//!
//! Storage layer for LodeDB: the buffer pool and its disk collaborator.
//!
//! The centerpiece is the [`buffer`] module - a bounded pool of page
//! frames with LRU-K replacement, reference-counted pinning, dirty
//! tracking, and RAII page guards. The [`disk`] module provides the
//! synchronous page-granular file I/O the pool reads from and writes to.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Buffer pool: frames, replacement policy, manager, and guards
pub mod buffer;

/// Durable page I/O
pub mod disk;
