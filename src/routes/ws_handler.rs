use axum::extract::ws::{Message, WebSocket};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::state::app_state::SignalInfo;

#[derive(Serialize)]
struct SignalPayload {
    timestamp: f64, // seconds since the Unix epoch
    value: f64,
    desc: String,
    seq: u64,
    end_flag: bool,
}

async fn send_payload(socket: &mut WebSocket, payload: &SignalPayload) -> bool {
    let json = match serde_json::to_string(payload) {
        Ok(j) => j,
        Err(e) => {
            error!("json serialize error: {}", e);
            return false;
        }
    };
    match socket.send(Message::Text(json.into())).await {
        Ok(()) => true,
        Err(e) => {
            warn!("ws send failed: {}", e);
            false
        }
    }
}

/// Streams every point of the signal, then an end marker.
pub async fn handle_ws_fetch(mut socket: WebSocket, signal_name: String, signal: SignalInfo) {
    info!(
        "ws_fetch streaming started: {} ({} points)",
        signal_name,
        signal.series.len()
    );

    let mut seq: u64 = 0;
    for (ts, value) in signal.series.iter() {
        let payload = SignalPayload {
            timestamp: ts.and_utc().timestamp() as f64,
            value,
            desc: signal.original_name.clone(),
            seq,
            end_flag: false,
        };
        if !send_payload(&mut socket, &payload).await {
            return;
        }
        seq += 1;
    }

    let end_payload = SignalPayload {
        timestamp: 0.0,
        value: 0.0,
        desc: signal.original_name.clone(),
        seq,
        end_flag: true,
    };
    send_payload(&mut socket, &end_payload).await;

    info!("ws_fetch finished: {}", signal_name);
}
