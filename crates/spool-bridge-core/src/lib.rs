//! Spool Bridge Core Library
//!
//! This crate provides the I/O-free building blocks of the bridge:
//!
//! - [`codec`]: the SpoolEase encrypted wire format (PBKDF2 + AES-256-GCM)
//! - [`record`]: SpoolEase spool records and the CSV inventory-dump decoder
//! - [`types`]: cross-system identity mappings and persisted sync state
//! - [`error`]: error types

pub mod codec;
pub mod error;
pub mod record;
pub mod types;

pub use error::{Error, Result};
pub use record::SpoolRecord;
pub use types::{SpoolMapping, SyncState};
