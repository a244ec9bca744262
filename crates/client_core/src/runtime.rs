//! The session task.
//!
//! Detection cycles, watchdog ticks, throttle and reconnect deadlines and
//! transport callbacks all run on one task that owns every piece of session
//! state, so cycle n+1 always observes what cycle n left behind.

use std::{future::pending, sync::Arc};

use anyhow::Result as AnyResult;
use shared::{
    domain::LaneVector,
    protocol::{InboundFrame, OutboundFrame},
};
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tracing::{debug, info, trace, warn};

use crate::{
    composer::{HandSlots, StateComposer},
    detector::DetectionCycle,
    error::CoreError,
    link::{LinkAction, LinkSession},
    throttle::Throttle,
    transport::{InboundSender, LinkConnection, LinkConnector, TransportEvent},
    watchdog::Watchdog,
    zone::{map_zone, zone_label, ZoneConfig},
    SessionConfig, SessionEvent,
};

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub enum SessionCommand {
    Cycle(DetectionCycle),
    SetPaused(bool),
    SetZone(ZoneConfig),
    Shutdown,
}

/// Cloneable front end of a running session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<SessionCommand>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionHandle {
    pub fn submit_cycle(&self, cycle: DetectionCycle) -> Result<(), CoreError> {
        self.command(SessionCommand::Cycle(cycle))
    }

    pub fn set_paused(&self, paused: bool) -> Result<(), CoreError> {
        self.command(SessionCommand::SetPaused(paused))
    }

    pub fn set_zone_height(&self, zone_height: f64) -> Result<(), CoreError> {
        let zone = ZoneConfig::new(zone_height)?;
        self.command(SessionCommand::SetZone(zone))
    }

    pub fn shutdown(&self) -> Result<(), CoreError> {
        self.command(SessionCommand::Shutdown)
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    fn command(&self, command: SessionCommand) -> Result<(), CoreError> {
        self.commands
            .send(command)
            .map_err(|_| CoreError::SessionClosed)
    }
}

/// Starts a session on the current tokio runtime and begins connecting.
///
/// The join handle resolves once the session is shut down, or with the
/// error that stopped it.
pub fn spawn<C>(
    config: SessionConfig,
    connector: C,
) -> Result<(SessionHandle, JoinHandle<Result<(), CoreError>>), CoreError>
where
    C: LinkConnector,
{
    let zone = config.validate()?;
    let (commands_tx, commands_rx) = mpsc::unbounded_channel();
    let (events, _) = broadcast::channel(EVENT_CAPACITY);
    let (connected_tx, connected_rx) = mpsc::unbounded_channel();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

    let runtime = SessionRuntime {
        connector: Arc::new(connector),
        url: config.url.clone(),
        zone,
        slots: HandSlots::new(config.hand_expiry_cycles),
        composer: StateComposer::new(),
        throttle: Throttle::new(config.throttle_window),
        link: LinkSession::new(
            Watchdog::new(config.watchdog_interval, config.missed_probe_threshold),
            config.reconnect_delay,
        ),
        paused: config.start_paused,
        connection: None,
        connecting: None,
        reconnect_at: None,
        events: events.clone(),
        connected_tx,
        inbound_tx,
    };
    let task = tokio::spawn(runtime.run(commands_rx, connected_rx, inbound_rx));

    Ok((
        SessionHandle {
            commands: commands_tx,
            events,
        },
        task,
    ))
}

type ConnectResult = (u64, AnyResult<LinkConnection>);

struct SessionRuntime {
    connector: Arc<dyn LinkConnector>,
    url: String,
    zone: ZoneConfig,
    slots: HandSlots,
    composer: StateComposer,
    throttle: Throttle<LaneVector>,
    link: LinkSession,
    paused: bool,
    connection: Option<LinkConnection>,
    connecting: Option<JoinHandle<()>>,
    reconnect_at: Option<Instant>,
    events: broadcast::Sender<SessionEvent>,
    connected_tx: mpsc::UnboundedSender<ConnectResult>,
    inbound_tx: mpsc::UnboundedSender<(u64, TransportEvent)>,
}

impl SessionRuntime {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<SessionCommand>,
        mut connected: mpsc::UnboundedReceiver<ConnectResult>,
        mut inbound: mpsc::UnboundedReceiver<(u64, TransportEvent)>,
    ) -> Result<(), CoreError> {
        let period = self.link.watchdog().interval();
        let mut watchdog = time::interval_at(Instant::now() + period, period);
        watchdog.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(url = %self.url, paused = self.paused, "session: starting");
        let actions = self.link.open();
        self.apply(actions)?;

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(SessionCommand::Shutdown) | None => break,
                    Some(command) => self.on_command(command)?,
                },
                _ = watchdog.tick() => {
                    let actions = self.link.on_watchdog_tick();
                    self.apply(actions)?;
                }
                _ = sleep_until(self.throttle.deadline()) => {
                    if let Some(lanes) = self.throttle.poll(Instant::now()) {
                        self.transmit_lanes(lanes)?;
                    }
                }
                _ = sleep_until(self.reconnect_at) => {
                    self.reconnect_at = None;
                    let actions = self.link.open();
                    self.apply(actions)?;
                }
                Some((attempt, result)) = connected.recv() => {
                    self.on_connect_result(attempt, result)?;
                }
                Some((attempt, event)) = inbound.recv() => {
                    self.on_transport_event(attempt, event)?;
                }
            }
        }

        self.close_transport();
        info!("session: shut down");
        Ok(())
    }

    fn on_command(&mut self, command: SessionCommand) -> Result<(), CoreError> {
        match command {
            SessionCommand::Cycle(cycle) => self.on_cycle(&cycle),
            SessionCommand::SetPaused(paused) => {
                if paused == self.paused {
                    return Ok(());
                }
                self.paused = paused;
                info!(paused, "session: pause toggled");
                if paused {
                    Ok(())
                } else {
                    self.dispatch(self.composer.current())
                }
            }
            SessionCommand::SetZone(zone) => {
                debug!(zone_height = zone.zone_height(), "session: zone height updated");
                self.zone = zone;
                Ok(())
            }
            // Handled by the run loop.
            SessionCommand::Shutdown => Ok(()),
        }
    }

    fn on_cycle(&mut self, cycle: &DetectionCycle) -> Result<(), CoreError> {
        let heights = self.slots.observe(cycle);
        let zones = heights.map(|height| height.and_then(|height| map_zone(height, &self.zone)));
        trace!(zones = ?zones.map(zone_label), "session: cycle mapped");

        if let Some(lanes) = self.composer.compose(&zones)? {
            debug!(%lanes, "session: lanes changed");
            let _ = self.events.send(SessionEvent::LanesChanged(lanes));
            self.dispatch(lanes)?;
        }
        Ok(())
    }

    fn dispatch(&mut self, lanes: LaneVector) -> Result<(), CoreError> {
        if self.paused {
            return Ok(());
        }
        match self.throttle.dispatch(lanes, Instant::now()) {
            Some(fired) => self.transmit_lanes(fired),
            None => Ok(()),
        }
    }

    fn transmit_lanes(&mut self, lanes: LaneVector) -> Result<(), CoreError> {
        if self.paused {
            trace!(%lanes, "session: paused, dropping lanes");
            return Ok(());
        }
        let actions = self.link.send(OutboundFrame::Lanes(lanes));
        self.apply(actions)
    }

    fn on_connect_result(
        &mut self,
        attempt: u64,
        result: AnyResult<LinkConnection>,
    ) -> Result<(), CoreError> {
        if !self.link.is_current(attempt) {
            debug!(attempt, "session: discarding stale connect result");
            return Ok(());
        }
        self.connecting = None;
        match result {
            Ok(connection) => {
                debug!(attempt, "session: transport open");
                self.connection = Some(connection);
                let actions = self.link.on_transport_opened(attempt);
                self.apply(actions)
            }
            Err(err) => {
                let actions = self.link.on_transport_lost(attempt, &format!("{err:#}"));
                self.apply(actions)
            }
        }
    }

    fn on_transport_event(&mut self, attempt: u64, event: TransportEvent) -> Result<(), CoreError> {
        if !self.link.is_current(attempt) {
            trace!(attempt, ?event, "session: event from stale transport");
            return Ok(());
        }
        let actions = match event {
            TransportEvent::Text(text) => match InboundFrame::from_text(&text) {
                Ok(frame) => self.link.on_frame(frame),
                Err(err) => {
                    debug!(%err, "session: ignoring text frame");
                    Vec::new()
                }
            },
            TransportEvent::Binary(payload) => {
                self.link.on_frame(InboundFrame::from_binary(payload))
            }
            TransportEvent::Closed => self.link.on_transport_lost(attempt, "closed by endpoint"),
            TransportEvent::Failed(reason) => self.link.on_transport_lost(attempt, &reason),
        };
        self.apply(actions)
    }

    fn apply(&mut self, actions: Vec<LinkAction>) -> Result<(), CoreError> {
        for action in actions {
            match action {
                LinkAction::Connect { attempt } => self.start_connect(attempt),
                LinkAction::ScheduleReconnect { delay } => {
                    debug!(?delay, "session: reconnect scheduled");
                    self.reconnect_at = Some(Instant::now() + delay);
                }
                LinkAction::Transmit(frame) => self.transmit(frame)?,
                LinkAction::CloseTransport => self.close_transport(),
                LinkAction::Emit(event) => {
                    let connected = event == SessionEvent::Connected;
                    let _ = self.events.send(event);
                    if connected {
                        self.dispatch(self.composer.current())?;
                    }
                }
            }
        }
        Ok(())
    }

    fn start_connect(&mut self, attempt: u64) {
        if let Some(task) = self.connecting.take() {
            task.abort();
        }
        self.reconnect_at = None;

        let connector = Arc::clone(&self.connector);
        let url = self.url.clone();
        let inbound = InboundSender::new(attempt, self.inbound_tx.clone());
        let results = self.connected_tx.clone();
        self.connecting = Some(tokio::spawn(async move {
            let result = connector.connect(&url, inbound).await;
            let _ = results.send((attempt, result));
        }));
    }

    fn transmit(&mut self, frame: OutboundFrame) -> Result<(), CoreError> {
        let Some(connection) = self.connection.as_ref() else {
            return Err(CoreError::LinkInvariant(
                "frame scheduled for transmit without an open transport",
            ));
        };
        let text = frame.encode();
        trace!(%text, "session: transmit");
        if connection.transmit(text) {
            return Ok(());
        }
        let actions = self
            .link
            .on_transport_lost(self.link.attempt(), "outbound queue closed");
        self.apply(actions)
    }

    fn close_transport(&mut self) {
        if let Some(task) = self.connecting.take() {
            task.abort();
        }
        self.connection = None;
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => pending::<()>().await,
    }
}

#[cfg(test)]
#[path = "tests/runtime_tests.rs"]
mod tests;
