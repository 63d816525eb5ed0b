//! Domain logic for the document conversion service.
//!
//! Everything here is free of database access: job status rules, upload
//! acceptance, the per-job working directory tree, and the external
//! converter invocation.

pub mod converter;
pub mod error;
pub mod status;
pub mod storage;
pub mod types;
pub mod upload;
