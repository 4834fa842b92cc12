//! Cross-system identity types
//!
//! These are the records persisted in the mapping file; field names are the
//! on-disk JSON schema and must stay stable.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Links one spool between SpoolEase and Spoolman via its NFC tag id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpoolMapping {
    /// NFC tag hex id, the primary cross-system key
    pub tag_id: String,
    /// SpoolEase's device-local id; may change across re-enrollments
    pub spoolease_id: String,
    /// Spoolman's stable integer spool id
    pub spoolman_spool_id: i64,
    /// Spoolman's filament record id (informational)
    pub spoolman_filament_id: i64,
    /// Last `consumed_since_add` value successfully reflected to Spoolman
    pub last_known_consumed: f64,
    /// RFC 3339 UTC timestamp of mapping creation
    pub created_at: String,
}

/// Persistent state for the sync engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncState {
    /// RFC 3339 UTC timestamp of the last successful save
    pub last_sync_time: Option<String>,
    /// Mappings keyed by tag id
    #[serde(default)]
    pub mappings: HashMap<String, SpoolMapping>,
}
