//! Core sync logic between SpoolEase and Spoolman
//!
//! Two concurrent loops drive the engine: a periodic poll that pulls the
//! device inventory and reflects consumption deltas into Spoolman, and the
//! WebSocket event handler that reacts to Spoolman-side deletions and
//! updates. The mapping store is the only state shared between them.
//!
//! Per-spool consumption accounting is a baseline scheme: the store keeps
//! the last `consumed_since_add` value reflected to Spoolman, each cycle
//! reports only the positive delta against it, and a negative delta means
//! the physical spool under the tag was swapped or reset, so the baseline
//! moves down without reporting negative usage.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use spool_bridge_core::record::SpoolRecord;
use spool_bridge_core::types::SpoolMapping;
use spool_bridge_net::error::NetError;
use spool_bridge_net::spoolman::{NewFilament, NewSpool, Spool};
use spool_bridge_net::{decode_extra_str, SpoolEaseClient, SpoolmanClient};

use crate::config::Config;
use crate::store::MappingStore;

/// Fallback filament density (g/cm^3)
pub const DEFAULT_DENSITY: f64 = 1.24;

/// Default filament density by material family.
pub fn material_density(material: &str) -> f64 {
    match material.to_ascii_uppercase().as_str() {
        "PLA" => 1.24,
        "PETG" => 1.27,
        "ABS" => 1.04,
        "ASA" => 1.07,
        "TPU" => 1.21,
        "PA" => 1.14,
        "PC" => 1.20,
        "PVA" => 1.23,
        "HIPS" => 1.04,
        _ => DEFAULT_DENSITY,
    }
}

/// Device-side inventory source, as the sync engine sees it.
pub trait InventorySource {
    /// Fetch the full spool inventory; `None` means the device is
    /// unreachable and the cycle must be skipped.
    fn fetch_spools(&self) -> impl Future<Output = Option<Vec<SpoolRecord>>> + Send;
}

/// Server-side spool database, as the sync engine sees it.
pub trait SpoolDatabase {
    fn get_or_create_vendor(
        &self,
        name: &str,
        empty_spool_weight: Option<f64>,
    ) -> impl Future<Output = Result<i64, NetError>> + Send;

    fn get_or_create_filament(
        &self,
        filament: &NewFilament,
    ) -> impl Future<Output = Result<i64, NetError>> + Send;

    fn create_spool(&self, spool: &NewSpool) -> impl Future<Output = Result<Spool, NetError>> + Send;

    fn update_spool(
        &self,
        spool_id: i64,
        fields: Value,
    ) -> impl Future<Output = Result<Spool, NetError>> + Send;

    fn use_spool(
        &self,
        spool_id: i64,
        use_weight: f64,
    ) -> impl Future<Output = Result<Spool, NetError>> + Send;
}

impl InventorySource for SpoolEaseClient {
    async fn fetch_spools(&self) -> Option<Vec<SpoolRecord>> {
        self.get_spools().await
    }
}

impl SpoolDatabase for SpoolmanClient {
    async fn get_or_create_vendor(
        &self,
        name: &str,
        empty_spool_weight: Option<f64>,
    ) -> Result<i64, NetError> {
        SpoolmanClient::get_or_create_vendor(self, name, empty_spool_weight).await
    }

    async fn get_or_create_filament(&self, filament: &NewFilament) -> Result<i64, NetError> {
        SpoolmanClient::get_or_create_filament(self, filament).await
    }

    async fn create_spool(&self, spool: &NewSpool) -> Result<Spool, NetError> {
        SpoolmanClient::create_spool(self, spool).await
    }

    async fn update_spool(&self, spool_id: i64, fields: Value) -> Result<Spool, NetError> {
        SpoolmanClient::update_spool(self, spool_id, fields).await
    }

    async fn use_spool(&self, spool_id: i64, use_weight: f64) -> Result<Spool, NetError> {
        SpoolmanClient::use_spool(self, spool_id, use_weight).await
    }
}

/// Engine tunables, extracted from the daemon config.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Minimum grams of consumption change before a delta is reported
    pub delta_threshold: f64,
    /// Pause between poll cycles
    pub poll_interval: Duration,
    /// Spoolman extra-field key holding the NFC tag id
    pub tag_id_field: String,
    /// Spoolman extra-field key holding the device-local spool id
    pub spoolease_id_field: String,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            delta_threshold: 0.1,
            poll_interval: Duration::from_secs(30),
            tag_id_field: "spoolease_tag_id".to_owned(),
            spoolease_id_field: "spoolease_id".to_owned(),
        }
    }
}

impl SyncSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            delta_threshold: config.delta_threshold,
            poll_interval: Duration::from_secs(config.poll_interval_seconds),
            tag_id_field: config.spoolman_tag_id_field.clone(),
            spoolease_id_field: config.spoolman_spoolease_id_field.clone(),
        }
    }
}

/// Orchestrates the SpoolEase -> Spoolman synchronization.
pub struct SyncEngine<D, S> {
    device: D,
    spoolman: S,
    store: Arc<MappingStore>,
    settings: SyncSettings,
}

impl<D: InventorySource, S: SpoolDatabase> SyncEngine<D, S> {
    pub fn new(device: D, spoolman: S, store: Arc<MappingStore>, settings: SyncSettings) -> Self {
        Self {
            device,
            spoolman,
            store,
            settings,
        }
    }

    /// Run one full synchronization cycle.
    ///
    /// Unmapped spools with a valid tag are onboarded; mapped spools get
    /// their consumption delta reported. Per-record failures are logged and
    /// do not abort the cycle; a device fetch failure skips the cycle with
    /// no state touched.
    pub async fn full_sync(&self) {
        let Some(records) = self.device.fetch_spools().await else {
            warn!("Skipping sync - SpoolEase unreachable");
            return;
        };

        let valid: Vec<&SpoolRecord> =
            records.iter().filter(|r| r.has_valid_tag_id()).collect();
        info!(
            "Syncing {} spools ({} with valid tags)",
            records.len(),
            valid.len()
        );

        for record in valid {
            if let Err(e) = self.sync_single_spool(record).await {
                error!(
                    "Failed to sync spool {} (tag={}): {}",
                    record.id, record.tag_id, e
                );
            }
        }

        if let Err(e) = self.store.save() {
            error!("Failed to persist mapping store: {}", e);
        }
    }

    async fn sync_single_spool(&self, record: &SpoolRecord) -> Result<(), NetError> {
        match self.store.get_by_tag_id(&record.tag_id) {
            None => self.onboard_spool(record).await,
            Some(mapping) => self.sync_existing_spool(record, mapping).await,
        }
    }

    /// Create the vendor/filament/spool triple in Spoolman for a spool seen
    /// for the first time, and record the mapping.
    async fn onboard_spool(&self, record: &SpoolRecord) -> Result<(), NetError> {
        info!(
            "New spool detected: tag={}, {} {} {}",
            record.tag_id, record.brand, record.material_type, record.color_name
        );

        let vendor_name = if record.brand.is_empty() {
            "Unknown"
        } else {
            record.brand.as_str()
        };
        let vendor_id = self
            .spoolman
            .get_or_create_vendor(vendor_name, record.weight_core.map(f64::from))
            .await?;

        let filament_name = if record.color_name.is_empty() {
            &record.material_type
        } else {
            &record.color_name
        };
        let filament_id = self
            .spoolman
            .get_or_create_filament(&NewFilament {
                name: filament_name.clone(),
                vendor_id,
                material: record.material_type.clone(),
                color_hex: record.color_hex_rgb().to_owned(),
                weight: record.weight_advertised.map(f64::from),
                spool_weight: record.weight_core.map(f64::from),
                density: material_density(&record.material_type),
            })
            .await?;

        let spool = self
            .spoolman
            .create_spool(&NewSpool {
                filament_id,
                initial_weight: record.weight_advertised.map(f64::from),
                spool_weight: record.weight_core.map(f64::from),
                used_weight: f64::from(record.consumed_since_add),
                comment: record.note.clone(),
                extra: self.extra_fields(&record.tag_id, &record.id),
            })
            .await?;

        self.store.set_mapping(SpoolMapping {
            tag_id: record.tag_id.clone(),
            spoolease_id: record.id.clone(),
            spoolman_spool_id: spool.id,
            spoolman_filament_id: filament_id,
            last_known_consumed: f64::from(record.consumed_since_add),
            created_at: Utc::now().to_rfc3339(),
        });
        info!(
            "Mapped SpoolEase spool {} (tag={}) -> Spoolman spool {}",
            record.id, record.tag_id, spool.id
        );
        Ok(())
    }

    /// Report the consumption delta for an already-mapped spool.
    async fn sync_existing_spool(
        &self,
        record: &SpoolRecord,
        mut mapping: SpoolMapping,
    ) -> Result<(), NetError> {
        let consumed = f64::from(record.consumed_since_add);
        let delta = consumed - mapping.last_known_consumed;

        if delta > self.settings.delta_threshold {
            self.spoolman
                .use_spool(mapping.spoolman_spool_id, delta)
                .await?;
            mapping.last_known_consumed = consumed;
            self.store.set_mapping(mapping.clone());
            debug!(
                "Synced +{:.1}g for tag={} (device total: {:.1}g)",
                delta, record.tag_id, record.consumed_since_add
            );
        } else if delta < -self.settings.delta_threshold {
            // Counter went down: a new spool was put under the old tag or
            // the user reset it. Move the baseline, never report negative
            // usage, keep the server spool.
            warn!(
                "Consumption decreased for tag={} ({:.1} -> {:.1}) - likely spool reset or replacement",
                record.tag_id, mapping.last_known_consumed, consumed
            );
            mapping.last_known_consumed = consumed;
            mapping.spoolease_id = record.id.clone();
            self.store.set_mapping(mapping.clone());
        }

        self.refresh_device_id(record, &mapping).await;
        Ok(())
    }

    /// Keep the device-local id stored in Spoolman's extra fields current.
    /// Best-effort: a failed PATCH is logged and retried on a later drift.
    async fn refresh_device_id(&self, record: &SpoolRecord, mapping: &SpoolMapping) {
        if mapping.spoolease_id == record.id {
            return;
        }
        let mut updated = mapping.clone();
        updated.spoolease_id = record.id.clone();
        self.store.set_mapping(updated);

        let extra = self.extra_fields(&record.tag_id, &record.id);
        if let Err(e) = self
            .spoolman
            .update_spool(mapping.spoolman_spool_id, json!({ "extra": extra }))
            .await
        {
            debug!(
                "Failed to update device id for spool {}: {}",
                mapping.spoolman_spool_id, e
            );
        }
    }

    fn extra_fields(&self, tag_id: &str, spoolease_id: &str) -> HashMap<String, String> {
        HashMap::from([
            (self.settings.tag_id_field.clone(), tag_id.to_owned()),
            (self.settings.spoolease_id_field.clone(), spoolease_id.to_owned()),
        ])
    }

    /// Run [`full_sync`](Self::full_sync) forever at the configured
    /// interval. Exits only by cancellation.
    pub async fn poll_loop(&self) {
        info!(
            "Starting periodic sync loop (interval={}s)",
            self.settings.poll_interval.as_secs()
        );
        loop {
            self.full_sync().await;
            tokio::time::sleep(self.settings.poll_interval).await;
        }
    }

    /// Handle one Spoolman push event.
    ///
    /// Deletions drop the mapping (and persist); updates on tracked spools
    /// are observed but never re-propagated as consumption, since our own
    /// `use` calls echo back through this channel.
    pub async fn handle_event(&self, event_type: &str, payload: &Value) {
        let Some(spool_id) = payload.get("id").and_then(Value::as_i64) else {
            return;
        };

        match event_type {
            "deleted" => {
                if let Some(mapping) = self.store.get_by_spoolman_id(spool_id) {
                    info!(
                        "Spoolman spool {} was deleted - removing mapping for tag={}",
                        spool_id, mapping.tag_id
                    );
                    self.store.remove_by_spoolman_id(spool_id);
                    if let Err(e) = self.store.save() {
                        error!("Failed to persist mapping store: {}", e);
                    }
                }
            }
            "updated" => {
                let tag_id = payload
                    .get("extra")
                    .and_then(|extra| extra.get(&self.settings.tag_id_field))
                    .and_then(Value::as_str)
                    .and_then(decode_extra_str);
                if let Some(tag_id) = tag_id {
                    let used_weight = payload
                        .get("used_weight")
                        .and_then(Value::as_f64)
                        .unwrap_or(0.0);
                    debug!(
                        "Spoolman spool {} updated (tag={}, used_weight={:.1}g)",
                        spool_id, tag_id, used_weight
                    );
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use tempfile::tempdir;

    fn make_record(id: &str, tag_id: &str, consumed: f32) -> SpoolRecord {
        SpoolRecord {
            id: id.to_owned(),
            tag_id: tag_id.to_owned(),
            material_type: "PLA".to_owned(),
            color_name: "Black".to_owned(),
            color_code: "000000FF".to_owned(),
            brand: "Bambu".to_owned(),
            weight_advertised: Some(1000),
            weight_core: Some(200),
            added_full: Some(true),
            consumed_since_add: consumed,
            tag_type: "SpoolEaseV1".to_owned(),
            ..Default::default()
        }
    }

    fn make_mapping(tag_id: &str, last_known_consumed: f64) -> SpoolMapping {
        SpoolMapping {
            tag_id: tag_id.to_owned(),
            spoolease_id: "1".to_owned(),
            spoolman_spool_id: 42,
            spoolman_filament_id: 10,
            last_known_consumed,
            created_at: "2025-01-01T00:00:00+00:00".to_owned(),
        }
    }

    fn fake_spool(id: i64) -> Spool {
        Spool {
            id,
            used_weight: 0.0,
            filament: None,
            extra: HashMap::new(),
        }
    }

    struct FakeDevice {
        records: Option<Vec<SpoolRecord>>,
    }

    impl InventorySource for FakeDevice {
        async fn fetch_spools(&self) -> Option<Vec<SpoolRecord>> {
            self.records.clone()
        }
    }

    #[derive(Default)]
    struct FakeSpoolman {
        vendors: Mutex<Vec<String>>,
        filaments: Mutex<Vec<NewFilament>>,
        spools: Mutex<Vec<NewSpool>>,
        updates: Mutex<Vec<(i64, Value)>>,
        uses: Mutex<Vec<(i64, f64)>>,
        fail_use: bool,
    }

    impl SpoolDatabase for FakeSpoolman {
        async fn get_or_create_vendor(
            &self,
            name: &str,
            _empty_spool_weight: Option<f64>,
        ) -> Result<i64, NetError> {
            self.vendors.lock().push(name.to_owned());
            Ok(1)
        }

        async fn get_or_create_filament(&self, filament: &NewFilament) -> Result<i64, NetError> {
            self.filaments.lock().push(filament.clone());
            Ok(10)
        }

        async fn create_spool(&self, spool: &NewSpool) -> Result<Spool, NetError> {
            self.spools.lock().push(spool.clone());
            Ok(fake_spool(42))
        }

        async fn update_spool(&self, spool_id: i64, fields: Value) -> Result<Spool, NetError> {
            self.updates.lock().push((spool_id, fields));
            Ok(fake_spool(spool_id))
        }

        async fn use_spool(&self, spool_id: i64, use_weight: f64) -> Result<Spool, NetError> {
            if self.fail_use {
                return Err(NetError::Api {
                    status: 404,
                    body: "spool not found".to_owned(),
                });
            }
            self.uses.lock().push((spool_id, use_weight));
            Ok(fake_spool(spool_id))
        }
    }

    struct Harness {
        engine: SyncEngine<FakeDevice, FakeSpoolman>,
        store: Arc<MappingStore>,
        path: std::path::PathBuf,
        _dir: tempfile::TempDir,
    }

    fn harness(records: Option<Vec<SpoolRecord>>) -> Harness {
        harness_with(records, FakeSpoolman::default())
    }

    fn harness_with(records: Option<Vec<SpoolRecord>>, spoolman: FakeSpoolman) -> Harness {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mapping.json");
        let store = Arc::new(MappingStore::new(&path));
        let engine = SyncEngine::new(
            FakeDevice { records },
            spoolman,
            store.clone(),
            SyncSettings::default(),
        );
        Harness {
            engine,
            store,
            path,
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn test_onboard_creates_vendor_filament_spool_and_mapping() {
        let h = harness(Some(vec![make_record("1", "04A3B2C1D5E6F7", 0.0)]));
        h.engine.full_sync().await;

        let spoolman = &h.engine.spoolman;
        assert_eq!(*spoolman.vendors.lock(), vec!["Bambu".to_owned()]);

        let filaments = spoolman.filaments.lock();
        assert_eq!(filaments.len(), 1);
        assert_eq!(filaments[0].material, "PLA");
        assert_eq!(filaments[0].color_hex, "000000");
        assert_eq!(filaments[0].name, "Black");
        assert_eq!(filaments[0].density, 1.24);

        let spools = spoolman.spools.lock();
        assert_eq!(spools.len(), 1);
        assert_eq!(spools[0].filament_id, 10);
        assert_eq!(spools[0].initial_weight, Some(1000.0));
        assert_eq!(spools[0].spool_weight, Some(200.0));
        assert_eq!(spools[0].used_weight, 0.0);
        assert_eq!(spools[0].extra["spoolease_tag_id"], "04A3B2C1D5E6F7");
        assert_eq!(spools[0].extra["spoolease_id"], "1");

        let mapping = h.store.get_by_tag_id("04A3B2C1D5E6F7").unwrap();
        assert_eq!(mapping.spoolman_spool_id, 42);
        assert_eq!(mapping.spoolman_filament_id, 10);
        assert_eq!(mapping.last_known_consumed, 0.0);
    }

    #[tokio::test]
    async fn test_unknown_vendor_fallback() {
        let mut record = make_record("1", "04A3B2C1D5E6F7", 0.0);
        record.brand = String::new();
        let h = harness(Some(vec![record]));
        h.engine.full_sync().await;
        assert_eq!(*h.engine.spoolman.vendors.lock(), vec!["Unknown".to_owned()]);
    }

    #[tokio::test]
    async fn test_skips_record_without_tag() {
        let h = harness(Some(vec![make_record("1", "", 0.0)]));
        h.engine.full_sync().await;
        assert!(h.engine.spoolman.spools.lock().is_empty());
        assert!(h.store.is_empty());
    }

    #[tokio::test]
    async fn test_skips_record_with_dash_tag() {
        let h = harness(Some(vec![make_record("1", "-04A3B2C1D5E6F", 0.0)]));
        h.engine.full_sync().await;
        assert!(h.engine.spoolman.spools.lock().is_empty());
        assert!(h.store.is_empty());
    }

    #[tokio::test]
    async fn test_positive_delta_reports_usage() {
        let h = harness(Some(vec![make_record("1", "04A3B2C1D5E6F7", 150.0)]));
        h.store.set_mapping(make_mapping("04A3B2C1D5E6F7", 100.0));
        h.engine.full_sync().await;

        let uses = h.engine.spoolman.uses.lock();
        assert_eq!(uses.len(), 1);
        assert_eq!(uses[0].0, 42);
        assert!((uses[0].1 - 50.0).abs() < 0.1);

        let mapping = h.store.get_by_tag_id("04A3B2C1D5E6F7").unwrap();
        assert!((mapping.last_known_consumed - 150.0).abs() < 0.1);
    }

    #[tokio::test]
    async fn test_zero_delta_no_use() {
        let h = harness(Some(vec![make_record("1", "04A3B2C1D5E6F7", 100.0)]));
        h.store.set_mapping(make_mapping("04A3B2C1D5E6F7", 100.0));
        h.engine.full_sync().await;
        assert!(h.engine.spoolman.uses.lock().is_empty());
    }

    #[tokio::test]
    async fn test_sub_threshold_delta_no_use() {
        let h = harness(Some(vec![make_record("1", "04A3B2C1D5E6F7", 100.05)]));
        h.store.set_mapping(make_mapping("04A3B2C1D5E6F7", 100.0));
        h.engine.full_sync().await;

        assert!(h.engine.spoolman.uses.lock().is_empty());
        let mapping = h.store.get_by_tag_id("04A3B2C1D5E6F7").unwrap();
        assert!((mapping.last_known_consumed - 100.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_negative_delta_resets_baseline() {
        let h = harness(Some(vec![make_record("2", "04A3B2C1D5E6F7", 10.0)]));
        h.store.set_mapping(make_mapping("04A3B2C1D5E6F7", 500.0));
        h.engine.full_sync().await;

        assert!(h.engine.spoolman.uses.lock().is_empty());
        let mapping = h.store.get_by_tag_id("04A3B2C1D5E6F7").unwrap();
        assert!((mapping.last_known_consumed - 10.0).abs() < 0.1);
        // Reset refreshes the device-local id without a server PATCH
        assert_eq!(mapping.spoolease_id, "2");
        assert!(h.engine.spoolman.updates.lock().is_empty());
    }

    #[tokio::test]
    async fn test_device_id_drift_patches_extra() {
        let h = harness(Some(vec![make_record("9", "04A3B2C1D5E6F7", 100.0)]));
        h.store.set_mapping(make_mapping("04A3B2C1D5E6F7", 100.0));
        h.engine.full_sync().await;

        let mapping = h.store.get_by_tag_id("04A3B2C1D5E6F7").unwrap();
        assert_eq!(mapping.spoolease_id, "9");

        let updates = h.engine.spoolman.updates.lock();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].0, 42);
        assert_eq!(updates[0].1["extra"]["spoolease_id"], "9");
    }

    #[tokio::test]
    async fn test_offline_device_no_calls_no_save() {
        let h = harness(None);
        h.store.set_mapping(make_mapping("04A3B2C1D5E6F7", 100.0));
        h.engine.full_sync().await;

        assert!(h.engine.spoolman.uses.lock().is_empty());
        assert!(h.engine.spoolman.spools.lock().is_empty());
        assert!(!h.path.exists());
    }

    #[tokio::test]
    async fn test_cycle_saves_mapping_file() {
        let h = harness(Some(vec![make_record("1", "04A3B2C1D5E6F7", 0.0)]));
        h.engine.full_sync().await;
        assert!(h.path.exists());
    }

    #[tokio::test]
    async fn test_record_failure_does_not_abort_cycle() {
        let spoolman = FakeSpoolman {
            fail_use: true,
            ..Default::default()
        };
        let h = harness_with(
            Some(vec![
                make_record("1", "04A3B2C1D5E6F7", 150.0),
                make_record("2", "AAAABBBBCCCCDD", 0.0),
            ]),
            spoolman,
        );
        h.store.set_mapping(make_mapping("04A3B2C1D5E6F7", 100.0));
        h.engine.full_sync().await;

        // The failed use left its baseline untouched...
        let failed = h.store.get_by_tag_id("04A3B2C1D5E6F7").unwrap();
        assert!((failed.last_known_consumed - 100.0).abs() < 1e-9);
        // ...and the second record still onboarded
        assert!(h.store.get_by_tag_id("AAAABBBBCCCCDD").is_some());
    }

    #[tokio::test]
    async fn test_deleted_event_removes_mapping_and_saves() {
        let h = harness(None);
        h.store.set_mapping(make_mapping("04A3B2C1D5E6F7", 100.0));
        h.engine
            .handle_event("deleted", &json!({"id": 42}))
            .await;

        assert!(h.store.get_by_tag_id("04A3B2C1D5E6F7").is_none());
        assert!(h.path.exists());
    }

    #[tokio::test]
    async fn test_deleted_event_unknown_id_ignored() {
        let h = harness(None);
        h.store.set_mapping(make_mapping("04A3B2C1D5E6F7", 100.0));
        h.engine
            .handle_event("deleted", &json!({"id": 999}))
            .await;
        assert!(h.store.get_by_tag_id("04A3B2C1D5E6F7").is_some());
    }

    #[tokio::test]
    async fn test_updated_event_is_observed_not_propagated() {
        let h = harness(None);
        h.store.set_mapping(make_mapping("04A3B2C1D5E6F7", 100.0));
        h.engine
            .handle_event(
                "updated",
                &json!({
                    "id": 42,
                    "used_weight": 175.0,
                    "extra": {"spoolease_tag_id": "\"04A3B2C1D5E6F7\""}
                }),
            )
            .await;

        // The baseline only moves through the poll loop
        let mapping = h.store.get_by_tag_id("04A3B2C1D5E6F7").unwrap();
        assert!((mapping.last_known_consumed - 100.0).abs() < 1e-9);
        assert!(h.engine.spoolman.uses.lock().is_empty());
    }

    #[tokio::test]
    async fn test_event_missing_id_ignored() {
        let h = harness(None);
        h.engine.handle_event("deleted", &json!({})).await;
        h.engine.handle_event("updated", &json!({"extra": {}})).await;
        assert!(h.store.is_empty());
    }

    #[test]
    fn test_material_density_lookup() {
        assert_eq!(material_density("PLA"), 1.24);
        assert_eq!(material_density("petg"), 1.27);
        assert_eq!(material_density("UNOBTAINIUM"), DEFAULT_DENSITY);
    }
}
