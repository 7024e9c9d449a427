//! Asset providers backed by the local filesystem.
//!
//! The in-memory provider from `quire-traits` is re-exported so callers can
//! depend on this crate alone.

mod filesystem;

pub use filesystem::FilesystemResourceProvider;
pub use quire_traits::InMemoryResourceProvider;
