use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use shared::{
    domain::{LaneVector, LANE_COUNT},
    error::ProtocolError,
    protocol::{OutboundFrame, LIVENESS_ACK, LIVENESS_PROBE},
};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod lights;

use config::load_settings;

/// Controller-side state shared by every tracker connection.
struct AppState {
    air: watch::Sender<LaneVector>,
    lights_enabled: bool,
    led_interval: Duration,
}

impl AppState {
    fn new(lights_enabled: bool, led_interval: Duration) -> Self {
        let (air, _) = watch::channel(LaneVector::EMPTY);
        Self {
            air,
            lights_enabled,
            led_interval,
        }
    }

    fn reset_air(&self) {
        self.air.send_replace(LaneVector::EMPTY);
    }
}

#[derive(Debug, Serialize)]
struct AirResponse {
    air: [u8; LANE_COUNT],
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let settings = load_settings();
    let state = AppState::new(settings.lights_enabled, settings.led_interval());
    let app = build_router(Arc::new(state));

    let addr: SocketAddr = settings.bind_addr.parse()?;
    info!(%addr, lights = settings.lights_enabled, "endpoint listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/air", get(air))
        .route("/ws", get(ws_handler))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn air(State(state): State<Arc<AppState>>) -> Json<AirResponse> {
    let lanes = *state.air.borrow();
    Json(AirResponse {
        air: lanes.lanes().map(u8::from),
    })
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| ws_connection(state, socket))
}

async fn ws_connection(state: Arc<AppState>, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    let send_task = tokio::spawn(async move {
        while let Some(msg) = outbound_rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if sender.send(msg).await.is_err() || closing {
                break;
            }
        }
    });
    let lights_task = state.lights_enabled.then(|| {
        tokio::spawn(push_lights(
            state.air.subscribe(),
            state.led_interval,
            outbound.clone(),
        ))
    });
    info!("endpoint: tracker connected");

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                if !handle_text(&state, &text, &outbound) {
                    break;
                }
            }
            Ok(Message::Close(_)) => {
                info!("endpoint: tracker disconnected");
                state.reset_air();
                break;
            }
            Ok(_) => {}
            Err(err) => {
                warn!(%err, "endpoint: websocket error");
                state.reset_air();
                break;
            }
        }
    }

    if let Some(task) = lights_task {
        task.abort();
    }
    let _ = outbound.send(Message::Close(None));
    let _ = send_task.await;
}

/// Returns `false` when the connection should be closed.
fn handle_text(state: &AppState, text: &str, outbound: &mpsc::UnboundedSender<Message>) -> bool {
    match OutboundFrame::decode(text) {
        Ok(OutboundFrame::LivenessProbe) => {
            let _ = outbound.send(Message::Text(LIVENESS_ACK.to_string()));
            true
        }
        Ok(OutboundFrame::Lanes(lanes)) => {
            debug!(%lanes, "endpoint: air update");
            state.air.send_replace(lanes);
            true
        }
        // Known frame sizes with an unexpected tag are skipped, not fatal.
        Err(ProtocolError::UnknownTextFrame { len, .. })
            if len == LIVENESS_PROBE.len() || len == LANE_COUNT + 1 =>
        {
            debug!(text, "endpoint: ignoring frame with unknown tag");
            true
        }
        Err(err) => {
            warn!(%err, "endpoint: closing on unrecognized frame");
            false
        }
    }
}

async fn push_lights(
    air: watch::Receiver<LaneVector>,
    interval: Duration,
    outbound: mpsc::UnboundedSender<Message>,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        let lanes = *air.borrow();
        if outbound
            .send(Message::Binary(lights::render_led_frame(lanes)))
            .is_err()
        {
            break;
        }
    }
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
