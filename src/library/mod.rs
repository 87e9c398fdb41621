//! Video library.
//!
//! The library is populated only by ingestion and read by every navigation
//! call. Records are grouped into four categories and kept in append order
//! (source message sequence) so sequential browsing sees new items last.

pub mod catalog;

pub use catalog::ContentStore;
