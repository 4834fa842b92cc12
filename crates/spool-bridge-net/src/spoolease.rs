//! Encrypted REST client for the SpoolEase device
//!
//! All request bodies carry `Content-Type: application/text` and are
//! AES-256-GCM encrypted in the wire format of [`spool_bridge_core::codec`];
//! responses are encrypted text that must be decrypted before parsing.
//! The device is an embedded board and can be slow, hence the generous
//! request timeout.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use spool_bridge_core::codec::{self, KEY_LEN};
use spool_bridge_core::record::{parse_spools_csv, SpoolRecord};

use crate::error::Result;

/// Request timeout for the embedded device
const DEVICE_TIMEOUT: Duration = Duration::from_secs(10);

/// Plaintext sent on the key-validation probe
const KEY_PROBE_BODY: &str = r#"{"test":"Hello"}"#;

#[derive(Debug, Deserialize)]
struct SlotAssignments {
    #[serde(default)]
    spools: HashMap<String, String>,
}

/// Client for SpoolEase's encrypted REST API.
#[derive(Clone)]
pub struct SpoolEaseClient {
    client: reqwest::Client,
    base_url: String,
    key: [u8; KEY_LEN],
}

impl SpoolEaseClient {
    pub fn new(base_url: impl Into<String>, key: [u8; KEY_LEN]) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(DEVICE_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            key,
        })
    }

    /// Validate that our derived encryption key matches the device's.
    ///
    /// Returns true only on HTTP 200. Never fails the caller: network errors
    /// and non-200 statuses are logged and reported as `false`.
    pub async fn test_key(&self) -> bool {
        let url = format!("{}/api/test-key", self.base_url);
        let body = match codec::encrypt(&self.key, KEY_PROBE_BODY) {
            Ok(body) => body,
            Err(e) => {
                error!("Failed to encrypt key probe: {}", e);
                return false;
            }
        };
        let result = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/text")
            .body(body)
            .send()
            .await;
        match result {
            Ok(resp) if resp.status() == StatusCode::OK => {
                info!("SpoolEase key validation successful");
                true
            }
            Ok(resp) => {
                error!("SpoolEase key validation failed (HTTP {})", resp.status());
                false
            }
            Err(e) => {
                error!("SpoolEase unreachable during key test: {}", e);
                false
            }
        }
    }

    /// Fetch the full spool inventory.
    ///
    /// Returns `None` when the device is unreachable, answers non-200, or
    /// the response cannot be decrypted — the caller skips that sync cycle.
    pub async fn get_spools(&self) -> Option<Vec<SpoolRecord>> {
        let url = format!("{}/api/spools", self.base_url);
        let resp = match self.client.get(&url).send().await {
            Ok(resp) => resp,
            Err(e) => {
                warn!("SpoolEase unreachable: {}", e);
                return None;
            }
        };
        if resp.status() != StatusCode::OK {
            warn!("SpoolEase GET /api/spools returned HTTP {}", resp.status());
            return None;
        }
        let encrypted = match resp.text().await {
            Ok(text) => text,
            Err(e) => {
                warn!("SpoolEase response read failed: {}", e);
                return None;
            }
        };
        let csv_text = match codec::decrypt(&self.key, &encrypted) {
            Ok(text) => text,
            Err(e) => {
                error!("Failed to decrypt SpoolEase spools: {}", e);
                return None;
            }
        };
        let records = parse_spools_csv(&csv_text);
        debug!("Fetched {} spools from SpoolEase", records.len());
        Some(records)
    }

    /// Fetch which spools are currently loaded in printer slots.
    ///
    /// Returns a map of slot identifier to device-local spool id, or `None`
    /// under the same failure policy as [`get_spools`](Self::get_spools).
    pub async fn get_spools_in_printers(&self) -> Option<HashMap<String, String>> {
        let url = format!("{}/api/spools-in-printers", self.base_url);
        let resp = match self.client.get(&url).send().await {
            Ok(resp) => resp,
            Err(e) => {
                warn!("SpoolEase unreachable: {}", e);
                return None;
            }
        };
        if resp.status() != StatusCode::OK {
            warn!(
                "SpoolEase GET /api/spools-in-printers returned HTTP {}",
                resp.status()
            );
            return None;
        }
        let encrypted = match resp.text().await {
            Ok(text) => text,
            Err(e) => {
                warn!("SpoolEase response read failed: {}", e);
                return None;
            }
        };
        let json_text = match codec::decrypt(&self.key, &encrypted) {
            Ok(text) => text,
            Err(e) => {
                error!("Failed to decrypt SpoolEase printer slots: {}", e);
                return None;
            }
        };
        match parse_slot_assignments(&json_text) {
            Ok(slots) => Some(slots),
            Err(e) => {
                error!("Failed to parse SpoolEase printer slots: {}", e);
                None
            }
        }
    }
}

/// Parse the decrypted `/api/spools-in-printers` body.
fn parse_slot_assignments(json_text: &str) -> Result<HashMap<String, String>> {
    let parsed: SlotAssignments = serde_json::from_str(json_text)?;
    Ok(parsed.spools)
}
