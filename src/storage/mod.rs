//! File content storage backends.
//!
//! The [`backend::StorageBackend`] trait abstracts over where uploaded
//! bytes physically live: the local upload directory or process memory.

pub mod backend;
pub mod local;
pub mod memory;
