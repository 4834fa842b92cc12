//! JSON REST client for the Spoolman server
//!
//! Spoolman stores extra-field values as JSON string literals: the plain
//! string `04AA` travels as the 6-character literal `"04AA"`. This client
//! owns that transformation in both directions so callers only ever see
//! plain strings.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::Response;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::error::{NetError, Result};

/// Request timeout for Spoolman calls
const SERVER_TIMEOUT: Duration = Duration::from_secs(10);

/// Filament diameter reported for created filaments (mm)
const DEFAULT_DIAMETER: f64 = 1.75;

/// Attempts for the extra-field schema bootstrap
const BOOTSTRAP_RETRIES: u32 = 5;
/// Pause between bootstrap attempts
const BOOTSTRAP_DELAY: Duration = Duration::from_secs(3);

/// A Spoolman vendor, narrowed to the fields the bridge consumes.
#[derive(Debug, Clone, Deserialize)]
pub struct Vendor {
    pub id: i64,
    pub name: String,
}

/// A Spoolman filament, narrowed to the fields the bridge consumes.
#[derive(Debug, Clone, Deserialize)]
pub struct Filament {
    pub id: i64,
    #[serde(default)]
    pub color_hex: Option<String>,
}

/// Filament reference embedded in a spool response.
#[derive(Debug, Clone, Deserialize)]
pub struct FilamentRef {
    pub id: i64,
}

/// A Spoolman spool, narrowed to the fields the bridge consumes.
#[derive(Debug, Clone, Deserialize)]
pub struct Spool {
    pub id: i64,
    #[serde(default)]
    pub used_weight: f64,
    #[serde(default)]
    pub filament: Option<FilamentRef>,
    #[serde(default)]
    pub extra: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct ExtraFieldDef {
    key: String,
}

/// Parameters for filament find-or-create.
#[derive(Debug, Clone)]
pub struct NewFilament {
    pub name: String,
    pub vendor_id: i64,
    pub material: String,
    /// 6-char RGB hex; empty to omit
    pub color_hex: String,
    pub weight: Option<f64>,
    pub spool_weight: Option<f64>,
    /// Density in g/cm^3, looked up by material family
    pub density: f64,
}

/// Parameters for spool creation.
#[derive(Debug, Clone)]
pub struct NewSpool {
    pub filament_id: i64,
    pub initial_weight: Option<f64>,
    pub spool_weight: Option<f64>,
    pub used_weight: f64,
    pub comment: String,
    /// Plain string values; double-encoding happens inside the client
    pub extra: HashMap<String, String>,
}

/// Client for Spoolman's REST API.
#[derive(Clone)]
pub struct SpoolmanClient {
    client: reqwest::Client,
    base_url: String,
    pub(crate) ws_url: String,
    tag_id_field: String,
    spoolease_id_field: String,
}

impl SpoolmanClient {
    pub fn new(
        base_url: impl Into<String>,
        ws_url: impl Into<String>,
        tag_id_field: impl Into<String>,
        spoolease_id_field: impl Into<String>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(SERVER_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            ws_url: ws_url.into(),
            tag_id_field: tag_id_field.into(),
            spoolease_id_field: spoolease_id_field.into(),
        })
    }

    /// Raise-for-status with the response body logged for diagnostics.
    async fn check_status(resp: Response, context: &str) -> Result<Response> {
        let status = resp.status();
        if status.is_client_error() || status.is_server_error() {
            let url = resp.url().clone();
            let body = resp.text().await.unwrap_or_default();
            error!("{}: HTTP {} from {} - body: {}", context, status, url, body);
            return Err(NetError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp)
    }

    // ── Extra field setup ────────────────────────────────────────────

    /// Ensure the tag-id and device-id extra fields exist on the spool
    /// entity, creating any that are missing.
    ///
    /// Retried to absorb Spoolman still starting up when the bridge comes
    /// online; exhausting the retries is fatal to the daemon.
    pub async fn ensure_extra_fields_exist(&self) -> Result<()> {
        let needed: [(&str, Value); 2] = [
            (
                self.tag_id_field.as_str(),
                json!({"name": "SpoolEase Tag ID", "field_type": "text", "order": 100}),
            ),
            (
                self.spoolease_id_field.as_str(),
                json!({"name": "SpoolEase ID", "field_type": "text", "order": 101}),
            ),
        ];
        let url = format!("{}/api/v1/field/spool", self.base_url);

        for attempt in 1..=BOOTSTRAP_RETRIES {
            match self.try_create_extra_fields(&url, &needed).await {
                Ok(true) => return Ok(()),
                Ok(false) => {
                    if attempt < BOOTSTRAP_RETRIES {
                        info!("Retrying extra field setup in {:?}...", BOOTSTRAP_DELAY);
                    }
                }
                Err(e) => {
                    warn!(
                        "Spoolman not reachable for extra field setup (attempt {}/{}): {}",
                        attempt, BOOTSTRAP_RETRIES, e
                    );
                }
            }
            if attempt < BOOTSTRAP_RETRIES {
                tokio::time::sleep(BOOTSTRAP_DELAY).await;
            }
        }
        Err(NetError::Bootstrap(format!(
            "could not create required Spoolman extra fields after {BOOTSTRAP_RETRIES} attempts"
        )))
    }

    /// One bootstrap attempt. `Ok(true)` means all fields exist.
    async fn try_create_extra_fields(
        &self,
        url: &str,
        needed: &[(&str, Value)],
    ) -> Result<bool> {
        let resp = self.client.get(url).send().await?;
        if !resp.status().is_success() {
            warn!("Failed to list extra fields (HTTP {})", resp.status());
            return Ok(false);
        }
        let existing: Vec<ExtraFieldDef> = resp.json().await?;
        let existing_keys: Vec<&str> = existing.iter().map(|f| f.key.as_str()).collect();

        let mut all_ok = true;
        for (key, field_def) in needed {
            if existing_keys.contains(key) {
                info!("Extra field '{}' already exists", key);
                continue;
            }
            let create_url = format!("{url}/{key}");
            let resp = self.client.post(&create_url).json(field_def).send().await?;
            if resp.status().is_success() {
                info!("Created Spoolman extra field: {}", key);
            } else {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                error!(
                    "Failed to create extra field '{}': HTTP {} - {}",
                    key, status, body
                );
                all_ok = false;
            }
        }
        Ok(all_ok)
    }

    // ── Vendor operations ────────────────────────────────────────────

    /// Find a vendor by exact name (case-insensitive).
    ///
    /// The `name` query parameter is a partial match on the server side, so
    /// the exact match is applied here.
    pub async fn find_vendor(&self, name: &str) -> Result<Option<Vendor>> {
        let url = format!("{}/api/v1/vendor", self.base_url);
        let resp = self.client.get(&url).query(&[("name", name)]).send().await?;
        if !resp.status().is_success() {
            return Ok(None);
        }
        let vendors: Vec<Vendor> = resp.json().await?;
        Ok(vendors.into_iter().find(|v| v.name.eq_ignore_ascii_case(name)))
    }

    pub async fn create_vendor(
        &self,
        name: &str,
        empty_spool_weight: Option<f64>,
    ) -> Result<Vendor> {
        let url = format!("{}/api/v1/vendor", self.base_url);
        let mut payload = json!({"name": name});
        if let Some(weight) = empty_spool_weight {
            payload["empty_spool_weight"] = json!(weight);
        }
        let resp = self.client.post(&url).json(&payload).send().await?;
        let resp = Self::check_status(resp, &format!("Create vendor '{name}'")).await?;
        let vendor: Vendor = resp.json().await?;
        info!("Created Spoolman vendor: {} (id={})", name, vendor.id);
        Ok(vendor)
    }

    /// Find or create a vendor; returns the vendor id. Empty names map to
    /// the catch-all `Unknown` vendor.
    pub async fn get_or_create_vendor(
        &self,
        name: &str,
        empty_spool_weight: Option<f64>,
    ) -> Result<i64> {
        let name = if name.is_empty() { "Unknown" } else { name };
        if let Some(existing) = self.find_vendor(name).await? {
            return Ok(existing.id);
        }
        Ok(self.create_vendor(name, empty_spool_weight).await?.id)
    }

    // ── Filament operations ──────────────────────────────────────────

    /// Find a filament by vendor, material, and color.
    ///
    /// Color is matched case-insensitively; when the vendor+material exists
    /// but no color matches, the first result is reused.
    pub async fn find_filament(
        &self,
        vendor_id: i64,
        material: &str,
        color_hex: &str,
    ) -> Result<Option<Filament>> {
        let url = format!("{}/api/v1/filament", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&[
                ("vendor.id", vendor_id.to_string().as_str()),
                ("material", material),
            ])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Ok(None);
        }
        let filaments: Vec<Filament> = resp.json().await?;
        let exact = filaments.iter().position(|f| {
            f.color_hex
                .as_deref()
                .unwrap_or("")
                .eq_ignore_ascii_case(color_hex)
        });
        Ok(match exact {
            Some(i) => filaments.into_iter().nth(i),
            None => filaments.into_iter().next(),
        })
    }

    pub async fn create_filament(&self, filament: &NewFilament) -> Result<Filament> {
        let url = format!("{}/api/v1/filament", self.base_url);
        let mut payload = json!({
            "name": filament.name,
            "vendor_id": filament.vendor_id,
            "material": filament.material,
            "density": filament.density,
            "diameter": DEFAULT_DIAMETER,
        });
        if !filament.color_hex.is_empty() {
            payload["color_hex"] = json!(filament.color_hex);
        }
        if let Some(weight) = filament.weight {
            payload["weight"] = json!(weight);
        }
        if let Some(spool_weight) = filament.spool_weight {
            payload["spool_weight"] = json!(spool_weight);
        }
        let resp = self.client.post(&url).json(&payload).send().await?;
        let context = format!(
            "Create filament '{}' (material={})",
            filament.name, filament.material
        );
        let resp = Self::check_status(resp, &context).await?;
        let created: Filament = resp.json().await?;
        info!(
            "Created Spoolman filament: {} {} (id={})",
            filament.material, filament.name, created.id
        );
        Ok(created)
    }

    /// Find or create a filament; returns the filament id.
    pub async fn get_or_create_filament(&self, filament: &NewFilament) -> Result<i64> {
        if let Some(existing) = self
            .find_filament(filament.vendor_id, &filament.material, &filament.color_hex)
            .await?
        {
            return Ok(existing.id);
        }
        Ok(self.create_filament(filament).await?.id)
    }

    // ── Spool operations ─────────────────────────────────────────────

    /// Get all spools, archived ones included.
    pub async fn get_all_spools(&self) -> Result<Vec<Spool>> {
        let url = format!("{}/api/v1/spool", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&[("allow_archived", "true")])
            .send()
            .await?;
        let resp = Self::check_status(resp, "Get all spools").await?;
        Ok(resp.json().await?)
    }

    pub async fn create_spool(&self, spool: &NewSpool) -> Result<Spool> {
        let url = format!("{}/api/v1/spool", self.base_url);
        let mut payload = json!({"filament_id": spool.filament_id});
        if let Some(weight) = spool.initial_weight {
            payload["initial_weight"] = json!(weight);
        }
        if let Some(weight) = spool.spool_weight {
            payload["spool_weight"] = json!(weight);
        }
        if spool.used_weight > 0.0 {
            payload["used_weight"] = json!(spool.used_weight);
        }
        if !spool.comment.is_empty() {
            payload["comment"] = json!(spool.comment);
        }
        if !spool.extra.is_empty() {
            payload["extra"] = json!(encode_extra(&spool.extra));
        }
        debug!("Creating spool with payload: {}", payload);
        let resp = self.client.post(&url).json(&payload).send().await?;
        let context = format!("Create spool (filament_id={})", spool.filament_id);
        let resp = Self::check_status(resp, &context).await?;
        let created: Spool = resp.json().await?;
        info!(
            "Created Spoolman spool (id={}, filament_id={})",
            created.id, spool.filament_id
        );
        Ok(created)
    }

    /// Patch an arbitrary field subset on a spool.
    ///
    /// When the subset contains an `extra` object, its string values are
    /// double-encoded before sending.
    pub async fn update_spool(&self, spool_id: i64, mut fields: Value) -> Result<Spool> {
        if let Some(extra) = fields.get_mut("extra").and_then(Value::as_object_mut) {
            for value in extra.values_mut() {
                if let Value::String(plain) = value {
                    *value = Value::String(Value::String(plain.clone()).to_string());
                }
            }
        }
        let url = format!("{}/api/v1/spool/{spool_id}", self.base_url);
        let resp = self.client.patch(&url).json(&fields).send().await?;
        let resp = Self::check_status(resp, &format!("Update spool {spool_id}")).await?;
        Ok(resp.json().await?)
    }

    /// Report incremental filament consumption on a spool.
    ///
    /// `PUT /api/v1/spool/{id}/use` atomically adds `use_weight` to the
    /// spool's used weight on the server.
    pub async fn use_spool(&self, spool_id: i64, use_weight: f64) -> Result<Spool> {
        let url = format!("{}/api/v1/spool/{spool_id}/use", self.base_url);
        let resp = self
            .client
            .put(&url)
            .json(&json!({"use_weight": use_weight}))
            .send()
            .await?;
        let resp = Self::check_status(resp, &format!("Use spool {spool_id}")).await?;
        let spool: Spool = resp.json().await?;
        info!(
            "Reported {:.1}g usage on Spoolman spool {} (total used: {:.1}g)",
            use_weight, spool_id, spool.used_weight
        );
        Ok(spool)
    }
}

/// Encode plain extra-field values as JSON string literals.
pub fn encode_extra(extra: &HashMap<String, String>) -> HashMap<String, String> {
    extra
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone()).to_string()))
        .collect()
}

/// Decode a Spoolman extra-field value back to a plain string.
///
/// Handles both JSON-encoded values (the normal case) and bare legacy
/// strings. Returns `None` for empty input or an empty decoded value.
pub fn decode_extra_str(value: &str) -> Option<String> {
    if value.is_empty() {
        return None;
    }
    let decoded = match serde_json::from_str::<Value>(value) {
        Ok(Value::String(s)) => s,
        Ok(other) => other.to_string(),
        Err(_) => value.to_owned(),
    };
    if decoded.is_empty() {
        None
    } else {
        Some(decoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_extra_is_json_literal() {
        let mut extra = HashMap::new();
        extra.insert("spoolease_tag_id".to_owned(), "04AA".to_owned());
        let encoded = encode_extra(&extra);
        // 6 characters: the quotes are part of the stored value
        assert_eq!(encoded["spoolease_tag_id"], "\"04AA\"");
    }

    #[test]
    fn test_decode_extra_str_quoted() {
        assert_eq!(
            decode_extra_str("\"04A3B2C1D5E6F7\"").as_deref(),
            Some("04A3B2C1D5E6F7")
        );
    }

    #[test]
    fn test_decode_extra_str_bare() {
        // Legacy values were stored without JSON quoting
        assert_eq!(
            decode_extra_str("04A3B2C1D5E6F7").as_deref(),
            Some("04A3B2C1D5E6F7")
        );
    }

    #[test]
    fn test_decode_extra_str_empty() {
        assert_eq!(decode_extra_str(""), None);
        assert_eq!(decode_extra_str("\"\""), None);
    }

    #[test]
    fn test_decode_extra_str_number() {
        assert_eq!(decode_extra_str("42").as_deref(), Some("42"));
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let mut extra = HashMap::new();
        extra.insert("k".to_owned(), "plain value".to_owned());
        let encoded = encode_extra(&extra);
        assert_eq!(decode_extra_str(&encoded["k"]).as_deref(), Some("plain value"));
    }
}
