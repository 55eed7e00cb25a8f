//! HTTP handlers for the file API.

pub mod files;
pub mod upload;
