//! Persistent tag mapping store
//!
//! The identity map is serialized as a single JSON document and rewritten
//! atomically (temp file in the same directory, then rename) on every
//! mutation that must survive a restart. A lost or corrupted file is not
//! fatal: the store starts empty and can be rebuilt from the extra fields
//! Spoolman already carries.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use parking_lot::RwLock;
use thiserror::Error;
use tracing::{error, info};

use spool_bridge_core::types::{SpoolMapping, SyncState};
use spool_bridge_net::spoolman::Spool;
use spool_bridge_net::decode_extra_str;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Persistent JSON-file store for tag_id <-> Spoolman spool mappings.
///
/// Both sync loops call through this store; all public methods take `&self`
/// and guard the state internally.
pub struct MappingStore {
    path: PathBuf,
    state: RwLock<SyncState>,
}

impl MappingStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: RwLock::new(SyncState::default()),
        }
    }

    /// Load state from disk. A missing file leaves the store empty; a
    /// corrupted file is logged and also leaves the store empty so the
    /// daemon can self-heal via [`rebuild_from_spoolman_spools`].
    ///
    /// [`rebuild_from_spoolman_spools`]: Self::rebuild_from_spoolman_spools
    pub fn load(&self) {
        if !self.path.exists() {
            info!("No mapping file found at {}, starting fresh", self.path.display());
            return;
        }
        let parsed = fs::read_to_string(&self.path)
            .map_err(|e| e.to_string())
            .and_then(|text| serde_json::from_str::<SyncState>(&text).map_err(|e| e.to_string()));
        match parsed {
            Ok(state) => {
                let count = state.mappings.len();
                *self.state.write() = state;
                info!("Loaded {} spool mappings from {}", count, self.path.display());
            }
            Err(e) => {
                error!(
                    "Failed to parse mapping file {}: {} - starting fresh",
                    self.path.display(),
                    e
                );
                *self.state.write() = SyncState::default();
            }
        }
    }

    /// Save state to disk atomically.
    ///
    /// The snapshot is taken under the lock; the temp-write-rename happens
    /// outside it. On failure the temp file is removed and the error is
    /// propagated; the in-memory state stays authoritative either way.
    pub fn save(&self) -> Result<(), StoreError> {
        let snapshot = {
            let mut state = self.state.write();
            state.last_sync_time = Some(Utc::now().to_rfc3339());
            state.clone()
        };
        let json = serde_json::to_string_pretty(&snapshot)?;

        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => {
                fs::create_dir_all(parent)?;
                parent
            }
            _ => Path::new("."),
        };

        // Temp file in the target directory so the rename cannot cross
        // filesystems
        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        tmp.write_all(json.as_bytes())?;
        tmp.persist(&self.path).map_err(|e| StoreError::Io(e.error))?;
        Ok(())
    }

    pub fn get_by_tag_id(&self, tag_id: &str) -> Option<SpoolMapping> {
        self.state.read().mappings.get(tag_id).cloned()
    }

    pub fn get_by_spoolman_id(&self, spoolman_id: i64) -> Option<SpoolMapping> {
        self.state
            .read()
            .mappings
            .values()
            .find(|m| m.spoolman_spool_id == spoolman_id)
            .cloned()
    }

    pub fn set_mapping(&self, mapping: SpoolMapping) {
        self.state
            .write()
            .mappings
            .insert(mapping.tag_id.clone(), mapping);
    }

    pub fn remove_by_tag_id(&self, tag_id: &str) {
        self.state.write().mappings.remove(tag_id);
    }

    /// Remove every mapping that points at the given Spoolman spool.
    pub fn remove_by_spoolman_id(&self, spoolman_id: i64) {
        self.state
            .write()
            .mappings
            .retain(|_, m| m.spoolman_spool_id != spoolman_id);
    }

    pub fn mapping_count(&self) -> usize {
        self.state.read().mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().mappings.is_empty()
    }

    /// Rebuild mappings from Spoolman spools carrying the bridge's extra
    /// fields. Used when the mapping file is lost but the data survives in
    /// Spoolman. Returns the number of mappings recovered.
    pub fn rebuild_from_spoolman_spools(
        &self,
        spools: &[Spool],
        tag_id_field: &str,
        spoolease_id_field: &str,
    ) -> usize {
        let mut recovered = 0;
        for spool in spools {
            let tag_id = spool
                .extra
                .get(tag_id_field)
                .and_then(|v| decode_extra_str(v));
            let Some(tag_id) = tag_id else { continue };
            let spoolease_id = spool
                .extra
                .get(spoolease_id_field)
                .and_then(|v| decode_extra_str(v))
                .unwrap_or_default();
            let mapping = SpoolMapping {
                tag_id: tag_id.clone(),
                spoolease_id,
                spoolman_spool_id: spool.id,
                spoolman_filament_id: spool.filament.as_ref().map(|f| f.id).unwrap_or(0),
                last_known_consumed: spool.used_weight,
                created_at: Utc::now().to_rfc3339(),
            };
            self.state.write().mappings.insert(tag_id, mapping);
            recovered += 1;
        }
        if recovered > 0 {
            info!("Rebuilt {} mappings from Spoolman extra fields", recovered);
        }
        recovered
    }
}
