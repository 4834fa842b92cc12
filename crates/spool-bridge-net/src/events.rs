//! Spoolman push-event channel
//!
//! Spoolman broadcasts spool lifecycle events as JSON `{type, payload}`
//! frames on a WebSocket. The listener reconnects forever with exponential
//! backoff; cancellation happens by dropping the future.

use std::future::Future;
use std::time::Duration;

use futures_util::StreamExt;
use serde_json::Value;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::spoolman::SpoolmanClient;

/// Initial reconnect delay
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
/// Reconnect delay cap
const MAX_BACKOFF: Duration = Duration::from_secs(60);

impl SpoolmanClient {
    /// Subscribe to the spool event channel.
    ///
    /// `on_event(event_type, payload)` is invoked for every well-formed
    /// frame. The connection is re-established with exponential backoff on
    /// any failure; the backoff resets after each successful connection.
    pub async fn listen_events<F, Fut>(&self, mut on_event: F)
    where
        F: FnMut(String, Value) -> Fut,
        Fut: Future<Output = ()>,
    {
        let ws_url = format!("{}/api/v1/spool", self.ws_url);
        let mut backoff = INITIAL_BACKOFF;

        loop {
            match connect_async(ws_url.as_str()).await {
                Ok((mut stream, _)) => {
                    info!("Connected to Spoolman WebSocket at {}", ws_url);
                    backoff = INITIAL_BACKOFF;

                    while let Some(frame) = stream.next().await {
                        match frame {
                            Ok(Message::Text(text)) => {
                                match serde_json::from_str::<Value>(text.as_str()) {
                                    Ok(event) => {
                                        let event_type = event
                                            .get("type")
                                            .and_then(Value::as_str)
                                            .unwrap_or("unknown")
                                            .to_owned();
                                        let payload = event
                                            .get("payload")
                                            .cloned()
                                            .unwrap_or_else(|| Value::Object(Default::default()));
                                        on_event(event_type, payload).await;
                                    }
                                    Err(_) => {
                                        let preview: String =
                                            text.as_str().chars().take(100).collect();
                                        debug!("Non-JSON WebSocket message: {}", preview);
                                    }
                                }
                            }
                            Ok(Message::Close(_)) => break,
                            Ok(_) => {}
                            Err(e) => {
                                warn!("WebSocket error: {}", e);
                                break;
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!("Spoolman WebSocket connection failed: {}", e);
                }
            }

            info!("Reconnecting to Spoolman WebSocket in {:?}...", backoff);
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    }
}
