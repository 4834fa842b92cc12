//! bridged - SpoolEase to Spoolman Sync Daemon
//!
//! This daemon provides:
//! - Periodic inventory polling from the SpoolEase device
//! - Consumption delta reporting to Spoolman
//! - Automatic vendor/filament/spool onboarding
//! - Persistent tag-id mapping with crash-safe writes
//! - Spoolman event handling (deletions, external updates)

pub mod config;
pub mod store;
pub mod sync;

pub use config::Config;
pub use store::MappingStore;
pub use sync::SyncEngine;
