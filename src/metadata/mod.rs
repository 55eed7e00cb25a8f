//! Metadata storage layer.
//!
//! The metadata document keeps one record per stored file.  The
//! [`store::MetadataStore`] trait defines whole-document load/save;
//! [`local::JsonMetadataStore`] is the default implementation and
//! [`catalog::FileCatalog`] serializes every read-modify-write on top.

pub mod catalog;
pub mod local;
pub mod memory;
pub mod store;
