//! Network clients for the SpoolEase/Spoolman bridge
//!
//! This crate provides:
//! - Encrypted REST client for the SpoolEase device
//! - JSON REST client for the Spoolman server
//! - Spoolman WebSocket event listener with reconnection

pub mod error;
pub mod events;
pub mod spoolease;
pub mod spoolman;

pub use error::{NetError, Result};
pub use spoolease::SpoolEaseClient;
pub use spoolman::{decode_extra_str, NewSpool, Spool, SpoolmanClient};
