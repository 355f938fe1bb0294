//! WebSocket event stream
//!
//! Forwards hub events to the client as `{ "event", "data", "timestamp" }`
//! frames: `alert` for findings, `recovery-mode` for recovery transitions.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use chrono::Utc;
use futures::{stream::StreamExt, SinkExt};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};

use crate::monitor::{Monitor, MonitorEvent, Topic};

/// Wire frame for one hub event
pub fn frame(event: &MonitorEvent) -> serde_json::Value {
    json!({
        "event": event.event_name(),
        "data": event.payload(),
        "timestamp": event.timestamp().to_rfc3339(),
    })
}

/// GET /api/stream
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(monitor): State<Arc<Monitor>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_websocket(socket, monitor))
}

async fn handle_websocket(socket: WebSocket, monitor: Arc<Monitor>) {
    let (mut sender, mut receiver) = socket.split();
    let subscription = monitor.subscribe(Topic::All);
    let subscription_id = subscription.id();

    info!(subscription = %subscription_id, "WebSocket connected");

    let welcome = json!({
        "event": "connected",
        "data": { "message": "Connected to monitor event stream" },
        "timestamp": Utc::now().to_rfc3339(),
    });
    if sender.send(Message::Text(welcome.to_string())).await.is_err() {
        debug!(subscription = %subscription_id, "WebSocket closed before welcome");
        return;
    }

    let mut send_task = tokio::spawn(async move {
        let mut events = subscription.into_stream();
        while let Some(event) = events.next().await {
            if sender.send(Message::Text(frame(&event).to_string())).await.is_err() {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            match message {
                Message::Close(_) => break,
                other => debug!(?other, "Ignoring client frame"),
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    };

    info!(subscription = %subscription_id, "WebSocket disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::{Finding, FindingType, RecoveryState};

    #[test]
    fn test_alert_frame() {
        let finding = Finding::new(FindingType::Reentrancy, "0xabc", Utc::now(), "reentrancy");
        let value = frame(&MonitorEvent::FindingCreated(finding));
        assert_eq!(value["event"], "alert");
        assert_eq!(value["data"]["type"], "Potential Reentrancy Attack");
        assert_eq!(value["data"]["severity"], "critical");
    }

    #[test]
    fn test_recovery_frame() {
        let value = frame(&MonitorEvent::RecoveryChanged {
            active: true,
            neutralized: 3,
            state: RecoveryState::default(),
        });
        assert_eq!(value["event"], "recovery-mode");
        assert_eq!(value["data"]["active"], true);
        assert_eq!(value["data"]["neutralized"], 3);
    }
}
