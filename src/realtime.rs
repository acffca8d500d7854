//! Change feed for the `orders` table over the hosted realtime websocket.
//!
//! The socket speaks Phoenix channel frames: we join
//! `realtime:public:orders` for INSERT and UPDATE changes and heartbeat every
//! 30 seconds. Decoded events go out on an mpsc channel. When the socket
//! closes the channel closes with it; there is no reconnect.

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::time::interval;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tracing::{debug, error, info, warn};

use crate::config::AppConfig;
use crate::error::AdminError;
use crate::models::{decode_row, Order, ORDERS};

pub const ORDERS_TOPIC: &str = "realtime:public:orders";
const HEARTBEAT_SECS: u64 = 30;
const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub order: Order,
    pub commit_timestamp: Option<String>,
}

/// Websocket endpoint derived from the REST base URL.
pub fn realtime_url(supabase_url: &str, anon_key: &str) -> Result<String, AdminError> {
    let mut url = reqwest::Url::parse(supabase_url)
        .map_err(|e| AdminError::Config(format!("invalid backend URL {supabase_url:?}: {e}")))?;
    let scheme = match url.scheme() {
        "https" => "wss",
        "http" => "ws",
        other => {
            return Err(AdminError::Config(format!(
                "change feed is unavailable for {other}:// backends"
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| AdminError::Config("could not derive websocket URL".to_string()))?;
    url.set_path("/realtime/v1/websocket");
    url.query_pairs_mut()
        .clear()
        .append_pair("apikey", anon_key)
        .append_pair("vsn", "1.0.0");
    Ok(url.to_string())
}

pub fn join_message(anon_key: &str, msg_ref: u64) -> String {
    json!({
        "topic": ORDERS_TOPIC,
        "event": "phx_join",
        "payload": {
            "config": {
                "postgres_changes": [
                    { "event": "INSERT", "schema": "public", "table": ORDERS },
                    { "event": "UPDATE", "schema": "public", "table": ORDERS },
                ]
            },
            "access_token": anon_key,
        },
        "ref": msg_ref.to_string(),
    })
    .to_string()
}

pub fn heartbeat_message(msg_ref: u64) -> String {
    json!({
        "topic": "phoenix",
        "event": "heartbeat",
        "payload": {},
        "ref": msg_ref.to_string(),
    })
    .to_string()
}

fn change_kind(raw: &str) -> Option<ChangeKind> {
    match raw {
        "INSERT" => Some(ChangeKind::Insert),
        "UPDATE" => Some(ChangeKind::Update),
        _ => None,
    }
}

/// Decode one text frame. `Ok(None)` for frames that are not order changes
/// (replies, heartbeats, presence, DELETE); `Err` when an order change
/// carries a row of the wrong shape.
pub fn parse_change_event(text: &str) -> Result<Option<ChangeEvent>, AdminError> {
    let frame: Value =
        serde_json::from_str(text).map_err(|e| AdminError::decode("realtime frame", e))?;
    let event = frame.get("event").and_then(Value::as_str).unwrap_or("");
    let payload = frame.get("payload").cloned().unwrap_or(Value::Null);

    let (kind, record, commit_timestamp) = match event {
        "postgres_changes" => {
            let data = payload.get("data").cloned().unwrap_or(Value::Null);
            if data.get("table").and_then(Value::as_str).is_some_and(|t| t != ORDERS) {
                return Ok(None);
            }
            let Some(kind) = data.get("type").and_then(Value::as_str).and_then(change_kind)
            else {
                return Ok(None);
            };
            (
                kind,
                data.get("record").cloned(),
                data.get("commit_timestamp").and_then(Value::as_str).map(str::to_string),
            )
        }
        // Older servers send the change type as the event name.
        legacy => {
            let Some(kind) = change_kind(legacy) else {
                return Ok(None);
            };
            (
                kind,
                payload.get("record").cloned(),
                payload.get("commit_timestamp").and_then(Value::as_str).map(str::to_string),
            )
        }
    };

    let record = record.ok_or_else(|| AdminError::decode("order", "change without record"))?;
    let order: Order = decode_row("order", record)?;
    Ok(Some(ChangeEvent {
        kind,
        order,
        commit_timestamp,
    }))
}

/// Open the change feed. Returns once the join frame has been sent.
pub async fn subscribe_orders(
    config: &AppConfig,
) -> Result<mpsc::Receiver<ChangeEvent>, AdminError> {
    let url = realtime_url(&config.supabase_url, &config.supabase_anon_key)?;
    let (ws_stream, response) = connect_async(url.as_str())
        .await
        .map_err(|e| AdminError::Network(format!("change feed connection failed: {e}")))?;
    info!(status = %response.status(), "change feed connected");

    let (write, mut read) = ws_stream.split();
    let writer = Arc::new(Mutex::new(write));
    let next_ref = Arc::new(AtomicU64::new(1));

    {
        let msg_ref = next_ref.fetch_add(1, Ordering::Relaxed);
        let mut w = writer.lock().await;
        w.send(WsMessage::Text(join_message(&config.supabase_anon_key, msg_ref)))
            .await
            .map_err(|e| AdminError::Network(format!("change feed join failed: {e}")))?;
    }

    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

    let writer_for_heartbeat = writer.clone();
    let heartbeat_ref = next_ref.clone();
    let heartbeat = tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(HEARTBEAT_SECS));
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let msg_ref = heartbeat_ref.fetch_add(1, Ordering::Relaxed);
            let mut w = writer_for_heartbeat.lock().await;
            if w.send(WsMessage::Text(heartbeat_message(msg_ref))).await.is_err() {
                break;
            }
        }
    });

    tokio::spawn(async move {
        while let Some(msg_result) = read.next().await {
            match msg_result {
                Ok(WsMessage::Text(text)) => match parse_change_event(&text) {
                    Ok(Some(event)) => {
                        if tx.send(event).await.is_err() {
                            debug!("change feed receiver dropped");
                            break;
                        }
                    }
                    Ok(None) => log_control_frame(&text),
                    Err(e) => warn!(error = %e, "skipping malformed change event"),
                },
                Ok(WsMessage::Ping(_)) | Ok(WsMessage::Pong(_)) => {}
                Ok(WsMessage::Close(frame)) => {
                    warn!(?frame, "change feed closed");
                    break;
                }
                Err(e) => {
                    error!(error = %e, "change feed error");
                    break;
                }
                _ => {}
            }
        }
        heartbeat.abort();
    });

    Ok(rx)
}

fn log_control_frame(text: &str) {
    let Ok(frame) = serde_json::from_str::<Value>(text) else {
        return;
    };
    let event = frame.get("event").and_then(Value::as_str).unwrap_or("");
    let status = frame
        .pointer("/payload/status")
        .and_then(Value::as_str)
        .unwrap_or("");
    if event == "phx_reply" && status != "ok" {
        warn!(frame = %text, "change feed request rejected");
    } else if event == "phx_error" || event == "system" {
        warn!(frame = %text, "change feed notice");
    } else {
        debug!(event, "change feed control frame");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OrderStatus;

    fn order_record(status: &str) -> Value {
        json!({
            "id": "o-1",
            "service_type": "Deep Clean",
            "material": "Leather",
            "quantity": 2,
            "status": status,
            "created_at": "2025-03-01T10:00:00+00:00",
            "updated_at": "2025-03-01T11:00:00+00:00"
        })
    }

    #[test]
    fn websocket_url_follows_the_rest_scheme() {
        assert_eq!(
            realtime_url("https://abc.supabase.co", "key").unwrap(),
            "wss://abc.supabase.co/realtime/v1/websocket?apikey=key&vsn=1.0.0"
        );
        assert_eq!(
            realtime_url("http://localhost:54321", "k").unwrap(),
            "ws://localhost:54321/realtime/v1/websocket?apikey=k&vsn=1.0.0"
        );
        assert!(matches!(
            realtime_url("memory://local", ""),
            Err(AdminError::Config(_))
        ));
    }

    #[test]
    fn join_subscribes_to_inserts_and_updates() {
        let join: Value = serde_json::from_str(&join_message("anon", 1)).unwrap();
        assert_eq!(join["topic"], ORDERS_TOPIC);
        assert_eq!(join["event"], "phx_join");
        assert_eq!(join["ref"], "1");
        let changes = join["payload"]["config"]["postgres_changes"]
            .as_array()
            .unwrap();
        let events: Vec<_> = changes.iter().map(|c| c["event"].as_str().unwrap()).collect();
        assert_eq!(events, vec!["INSERT", "UPDATE"]);
    }

    #[test]
    fn postgres_changes_frame_decodes() {
        let frame = json!({
            "topic": ORDERS_TOPIC,
            "event": "postgres_changes",
            "payload": { "data": {
                "table": "orders",
                "type": "UPDATE",
                "commit_timestamp": "2025-03-01T11:00:00Z",
                "record": order_record("listo")
            }},
            "ref": null
        });
        let event = parse_change_event(&frame.to_string()).unwrap().unwrap();
        assert_eq!(event.kind, ChangeKind::Update);
        assert_eq!(event.order.status, OrderStatus::Ready);
        assert_eq!(event.commit_timestamp.as_deref(), Some("2025-03-01T11:00:00Z"));
    }

    #[test]
    fn legacy_insert_frame_decodes() {
        let frame = json!({
            "topic": ORDERS_TOPIC,
            "event": "INSERT",
            "payload": { "type": "INSERT", "record": order_record("received") },
            "ref": null
        });
        let event = parse_change_event(&frame.to_string()).unwrap().unwrap();
        assert_eq!(event.kind, ChangeKind::Insert);
        assert_eq!(event.order.id, "o-1");
    }

    #[test]
    fn control_and_delete_frames_are_ignored() {
        let reply = json!({ "topic": ORDERS_TOPIC, "event": "phx_reply",
                            "payload": { "status": "ok", "response": {} }, "ref": "1" });
        assert_eq!(parse_change_event(&reply.to_string()).unwrap(), None);
        let delete = json!({ "event": "postgres_changes",
                             "payload": { "data": { "type": "DELETE", "old_record": { "id": "o-1" } } } });
        assert_eq!(parse_change_event(&delete.to_string()).unwrap(), None);
    }

    #[test]
    fn malformed_order_record_is_an_error() {
        let frame = json!({
            "event": "postgres_changes",
            "payload": { "data": { "type": "INSERT", "record": { "id": "o-1" } } }
        });
        assert!(matches!(
            parse_change_event(&frame.to_string()),
            Err(AdminError::Decode { entity: "order", .. })
        ));
    }
}
