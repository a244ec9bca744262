use super::*;
use std::{
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    routing::get,
    Router,
};
use tokio::{net::TcpListener, sync::broadcast::error::TryRecvError, time::timeout};

use crate::{detector::HandSample, link::DEFAULT_RECONNECT_DELAY, transport::WsConnector};

struct FakeLink {
    inbound: InboundSender,
    outbound: mpsc::UnboundedReceiver<String>,
}

impl FakeLink {
    async fn next_frame(&mut self) -> Option<String> {
        self.outbound.recv().await
    }

    fn reply(&self, event: TransportEvent) {
        assert!(self.inbound.deliver(event), "session stopped listening");
    }
}

#[derive(Clone)]
struct FakeConnector {
    links: mpsc::UnboundedSender<FakeLink>,
    attempts: Arc<AtomicUsize>,
    refuse: bool,
    /// Endpoint greets with an ack before the connect result is handled.
    eager_ack: bool,
}

#[async_trait::async_trait]
impl LinkConnector for FakeConnector {
    async fn connect(&self, _url: &str, inbound: InboundSender) -> AnyResult<LinkConnection> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.refuse {
            anyhow::bail!("connection refused");
        }
        if self.eager_ack {
            inbound.deliver(TransportEvent::Text("alive".into()));
        }
        let (outbound_tx, outbound) = mpsc::unbounded_channel();
        let _ = self.links.send(FakeLink { inbound, outbound });
        Ok(LinkConnection::new(outbound_tx, Vec::new()))
    }
}

struct Harness {
    handle: SessionHandle,
    task: JoinHandle<Result<(), CoreError>>,
    events: broadcast::Receiver<SessionEvent>,
    links: mpsc::UnboundedReceiver<FakeLink>,
    attempts: Arc<AtomicUsize>,
}

impl Harness {
    fn start(config: SessionConfig, refuse: bool) -> Self {
        Self::start_with(config, refuse, false)
    }

    fn start_with(config: SessionConfig, refuse: bool, eager_ack: bool) -> Self {
        let (links_tx, links) = mpsc::unbounded_channel();
        let attempts = Arc::new(AtomicUsize::new(0));
        let connector = FakeConnector {
            links: links_tx,
            attempts: Arc::clone(&attempts),
            refuse,
            eager_ack,
        };
        let (handle, task) = spawn(config, connector).expect("spawn session");
        let events = handle.subscribe_events();
        Self {
            handle,
            task,
            events,
            links,
            attempts,
        }
    }

    async fn next_event(&mut self) -> SessionEvent {
        timeout(Duration::from_secs(30), self.events.recv())
            .await
            .expect("event in time")
            .expect("event channel open")
    }

    async fn next_link(&mut self) -> FakeLink {
        self.links.recv().await.expect("connect attempt")
    }

    /// Drives the handshake on the next link and consumes the initial lane
    /// frame sent on connect.
    async fn connect(&mut self) -> FakeLink {
        let mut link = self.next_link().await;
        assert_eq!(link.next_frame().await.as_deref(), Some("alive?"));
        link.reply(TransportEvent::Text("alive".into()));
        assert_eq!(self.next_event().await, SessionEvent::Connected);
        assert_eq!(link.next_frame().await.as_deref(), Some("d000000"));
        link
    }

    fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

fn two_hands() -> DetectionCycle {
    DetectionCycle::pixels(vec![
        HandSample::new(120.0, 10.0).with_label("Left"),
        HandSample::new(480.0, 150.0).with_label("Right"),
    ])
}

#[tokio::test(start_paused = true)]
async fn hands_at_10_and_150_send_d010001() {
    let mut harness = Harness::start(SessionConfig::default(), false);
    let mut link = harness.connect().await;

    harness.handle.submit_cycle(two_hands()).expect("submit");

    let expected = LaneVector::from_active([5, 1]).expect("lanes");
    assert_eq!(
        harness.next_event().await,
        SessionEvent::LanesChanged(expected)
    );
    assert_eq!(link.next_frame().await.as_deref(), Some("d010001"));
}

#[tokio::test(start_paused = true)]
async fn unchanged_cycles_are_not_resent() {
    let mut harness = Harness::start(SessionConfig::default(), false);
    let mut link = harness.connect().await;

    for _ in 0..5 {
        harness.handle.submit_cycle(two_hands()).expect("submit");
    }
    assert_eq!(link.next_frame().await.as_deref(), Some("d010001"));

    time::sleep(Duration::from_millis(200)).await;
    assert!(link.outbound.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn acknowledged_probes_keep_the_link() {
    let mut harness = Harness::start(SessionConfig::default(), false);
    let mut link = harness.connect().await;

    for _ in 0..5 {
        assert_eq!(link.next_frame().await.as_deref(), Some("alive?"));
        link.reply(TransportEvent::Text("alive".into()));
    }

    assert_eq!(harness.attempts(), 1);
    assert!(matches!(harness.events.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test(start_paused = true)]
async fn unanswered_probes_reconnect_once() {
    let mut harness = Harness::start(SessionConfig::default(), false);
    let mut stale = harness.connect().await;

    assert_eq!(stale.next_frame().await.as_deref(), Some("alive?"));
    assert_eq!(stale.next_frame().await.as_deref(), Some("alive?"));
    // Third tick expires the link and drops its transport.
    assert_eq!(stale.next_frame().await, None);
    assert_eq!(harness.next_event().await, SessionEvent::Disconnected);

    let mut link = harness.next_link().await;
    assert_eq!(harness.attempts(), 2);

    stale.reply(TransportEvent::Closed);
    assert_eq!(link.next_frame().await.as_deref(), Some("alive?"));
    link.reply(TransportEvent::Text("alive".into()));
    assert_eq!(harness.next_event().await, SessionEvent::Connected);
    assert_eq!(harness.attempts(), 2);
}

#[tokio::test(start_paused = true)]
async fn ack_before_transport_open_is_not_fatal() {
    let mut harness = Harness::start_with(SessionConfig::default(), false, true);
    let mut link = harness.next_link().await;

    assert_eq!(link.next_frame().await.as_deref(), Some("alive?"));
    time::sleep(Duration::from_millis(50)).await;
    assert!(!harness.task.is_finished());

    // The early ack may or may not have counted, depending on which event
    // the session saw first; a reply to the probe settles it either way.
    link.reply(TransportEvent::Text("alive".into()));
    assert_eq!(harness.next_event().await, SessionEvent::Connected);
    assert_eq!(link.next_frame().await.as_deref(), Some("d000000"));
    assert!(!harness.task.is_finished());
}

#[tokio::test(start_paused = true)]
async fn closed_transport_reconnects_after_delay() {
    let mut harness = Harness::start(SessionConfig::default(), false);
    let mut first = harness.connect().await;

    let closed_at = Instant::now();
    first.reply(TransportEvent::Closed);
    assert_eq!(harness.next_event().await, SessionEvent::Disconnected);
    assert_eq!(first.next_frame().await, None);

    let mut second = harness.next_link().await;
    assert!(Instant::now() - closed_at >= DEFAULT_RECONNECT_DELAY);
    assert_eq!(second.next_frame().await.as_deref(), Some("alive?"));
}

#[tokio::test(start_paused = true)]
async fn refused_connects_retry_quietly() {
    let mut harness = Harness::start(SessionConfig::default(), true);

    time::sleep(Duration::from_millis(1200)).await;

    assert_eq!(harness.attempts(), 3);
    assert!(matches!(harness.events.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test(start_paused = true)]
async fn pause_suppresses_sends_and_resume_resends_current_lanes() {
    let mut harness = Harness::start(SessionConfig::default(), false);
    let mut link = harness.connect().await;

    harness.handle.set_paused(true).expect("pause");
    harness.handle.submit_cycle(two_hands()).expect("submit");
    assert!(matches!(
        harness.next_event().await,
        SessionEvent::LanesChanged(_)
    ));

    time::sleep(Duration::from_millis(100)).await;
    assert!(link.outbound.try_recv().is_err());

    harness.handle.set_paused(false).expect("resume");
    assert_eq!(link.next_frame().await.as_deref(), Some("d010001"));
}

#[tokio::test(start_paused = true)]
async fn session_started_paused_sends_nothing_on_connect() {
    let config = SessionConfig {
        start_paused: true,
        ..SessionConfig::default()
    };
    let mut harness = Harness::start(config, false);
    let mut link = harness.next_link().await;
    assert_eq!(link.next_frame().await.as_deref(), Some("alive?"));
    link.reply(TransportEvent::Text("alive".into()));
    assert_eq!(harness.next_event().await, SessionEvent::Connected);

    time::sleep(Duration::from_millis(100)).await;
    assert!(link.outbound.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn led_payload_is_published() {
    let mut harness = Harness::start(SessionConfig::default(), false);
    let link = harness.connect().await;

    link.reply(TransportEvent::Binary(vec![7; 93]));

    assert_eq!(
        harness.next_event().await,
        SessionEvent::LedPayload(vec![7; 93])
    );
}

#[tokio::test(start_paused = true)]
async fn zone_height_update_applies_to_next_cycle() {
    let mut harness = Harness::start(SessionConfig::default(), false);
    let mut link = harness.connect().await;

    assert!(harness.handle.set_zone_height(-1.0).is_err());
    harness.handle.set_zone_height(100.0).expect("zone height");
    harness
        .handle
        .submit_cycle(DetectionCycle::pixels(vec![HandSample::new(0.0, 150.0)]))
        .expect("submit");
    harness
        .handle
        .submit_cycle(DetectionCycle::pixels(vec![HandSample::new(0.0, 90.0)]))
        .expect("submit");

    assert_eq!(
        harness.next_event().await,
        SessionEvent::LanesChanged(LaneVector::from_active([0]).expect("lanes"))
    );
    assert_eq!(link.next_frame().await.as_deref(), Some("d100000"));
}

#[tokio::test(start_paused = true)]
async fn shutdown_closes_transport_and_handle() {
    let mut harness = Harness::start(SessionConfig::default(), false);
    let mut link = harness.connect().await;

    harness.handle.shutdown().expect("shutdown");
    let result = harness.task.await.expect("join");
    assert!(result.is_ok());
    assert_eq!(link.next_frame().await, None);
    assert!(matches!(
        harness.handle.submit_cycle(two_hands()),
        Err(CoreError::SessionClosed)
    ));
}

#[test]
fn spawn_rejects_invalid_config() {
    let (links, _links_rx) = mpsc::unbounded_channel();
    let connector = FakeConnector {
        links,
        attempts: Arc::new(AtomicUsize::new(0)),
        refuse: false,
        eager_ack: false,
    };
    let result = spawn(SessionConfig::with_url("http://127.0.0.1:1606/ws"), connector);
    assert!(matches!(result, Err(CoreError::InvalidConfig(_))));
}

async fn spawn_endpoint() -> (String, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let (frames_tx, frames) = mpsc::unbounded_channel();
    let app = Router::new().route(
        "/ws",
        get(move |ws: WebSocketUpgrade| {
            let frames_tx = frames_tx.clone();
            async move { ws.on_upgrade(move |socket| acknowledging_endpoint(socket, frames_tx)) }
        }),
    );
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("ws://{addr}/ws"), frames)
}

async fn acknowledging_endpoint(mut socket: WebSocket, frames: mpsc::UnboundedSender<String>) {
    while let Some(Ok(message)) = socket.recv().await {
        let Message::Text(text) = message else {
            continue;
        };
        if text == "alive?" {
            if socket.send(Message::Text("alive".into())).await.is_err() {
                return;
            }
        } else {
            let _ = frames.send(text);
        }
    }
}

#[tokio::test]
async fn websocket_session_delivers_lane_frames() {
    let (url, mut frames) = spawn_endpoint().await;
    let (handle, task) = spawn(SessionConfig::with_url(url), WsConnector).expect("spawn session");
    let mut events = handle.subscribe_events();

    let connected = timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("connected in time")
        .expect("event");
    assert_eq!(connected, SessionEvent::Connected);

    handle.submit_cycle(two_hands()).expect("submit");

    let mut seen = Vec::new();
    loop {
        let frame = timeout(Duration::from_secs(5), frames.recv())
            .await
            .expect("frame in time")
            .expect("endpoint open");
        let done = frame == "d010001";
        seen.push(frame);
        if done {
            break;
        }
    }
    assert_eq!(seen, vec!["d000000".to_string(), "d010001".to_string()]);

    handle.shutdown().expect("shutdown");
    assert!(task.await.expect("join").is_ok());
}
