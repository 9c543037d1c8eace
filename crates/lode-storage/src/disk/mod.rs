//! Durable page I/O for LodeDB.
//!
//! The buffer pool talks to the disk through the [`DiskManager`] trait:
//! synchronous, page-granular reads and writes against block storage.
//! [`FileDiskManager`] is the standard implementation over a single
//! database file.
//!
//! I/O here is deliberately blocking. The buffer pool serializes page
//! replacement with its own mutex and calls straight into this layer;
//! there is no scheduler or request queue in between.

mod error;
mod manager;

pub use error::{DiskError, DiskResult};
pub use manager::{DiskManager, FileDiskManager};
