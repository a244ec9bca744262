//! Transport seam between the link state machine and the wire.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, trace};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Text(String),
    Binary(Vec<u8>),
    Closed,
    Failed(String),
}

/// Delivers transport events into the session, tagged with the connect
/// attempt they belong to.
#[derive(Debug, Clone)]
pub struct InboundSender {
    attempt: u64,
    tx: mpsc::UnboundedSender<(u64, TransportEvent)>,
}

impl InboundSender {
    pub fn new(attempt: u64, tx: mpsc::UnboundedSender<(u64, TransportEvent)>) -> Self {
        Self { attempt, tx }
    }

    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    /// Returns `false` once the session has shut down.
    pub fn deliver(&self, event: TransportEvent) -> bool {
        self.tx.send((self.attempt, event)).is_ok()
    }
}

/// An established transport. Dropping it stops the background tasks.
#[derive(Debug)]
pub struct LinkConnection {
    outbound: mpsc::UnboundedSender<String>,
    tasks: Vec<JoinHandle<()>>,
}

impl LinkConnection {
    pub fn new(outbound: mpsc::UnboundedSender<String>, tasks: Vec<JoinHandle<()>>) -> Self {
        Self { outbound, tasks }
    }

    /// Queues a text frame. Returns `false` if the writer is gone.
    pub fn transmit(&self, text: String) -> bool {
        self.outbound.send(text).is_ok()
    }
}

impl Drop for LinkConnection {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

#[async_trait]
pub trait LinkConnector: Send + Sync + 'static {
    async fn connect(&self, url: &str, inbound: InboundSender) -> Result<LinkConnection>;
}

/// WebSocket transport to the controller endpoint.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl LinkConnector for WsConnector {
    async fn connect(&self, url: &str, inbound: InboundSender) -> Result<LinkConnection> {
        let (ws_stream, _) = connect_async(url)
            .await
            .with_context(|| format!("failed to connect websocket: {url}"))?;
        let (mut ws_writer, mut ws_reader) = ws_stream.split();
        let attempt = inbound.attempt();

        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        let write_inbound = inbound.clone();
        tokio::spawn(async move {
            while let Some(text) = outbound_rx.recv().await {
                trace!(attempt, %text, "ws: send");
                if let Err(err) = ws_writer.send(Message::Text(text)).await {
                    write_inbound.deliver(TransportEvent::Failed(format!(
                        "websocket send failed: {err}"
                    )));
                    return;
                }
            }
            let _ = ws_writer.send(Message::Close(None)).await;
        });

        let reader = tokio::spawn(async move {
            while let Some(msg) = ws_reader.next().await {
                let event = match msg {
                    Ok(Message::Text(text)) => TransportEvent::Text(text),
                    Ok(Message::Binary(payload)) => TransportEvent::Binary(payload),
                    Ok(Message::Close(frame)) => {
                        debug!(attempt, ?frame, "ws: closed by endpoint");
                        TransportEvent::Closed
                    }
                    Ok(_) => continue,
                    Err(err) => TransportEvent::Failed(format!("websocket receive failed: {err}")),
                };
                let terminal = matches!(event, TransportEvent::Closed | TransportEvent::Failed(_));
                if !inbound.deliver(event) || terminal {
                    return;
                }
            }
            inbound.deliver(TransportEvent::Closed);
        });

        // The writer is left detached: it drains the queue and sends a close
        // frame once the connection (and with it the outbound sender) drops.
        Ok(LinkConnection::new(outbound, vec![reader]))
    }
}
