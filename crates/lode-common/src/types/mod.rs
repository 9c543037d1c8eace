//! Type definitions for LodeDB.

mod ids;

pub use ids::{Lsn, PageId};
