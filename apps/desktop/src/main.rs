use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use client_core::{SessionEvent, WsConnector};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::broadcast::error::RecvError,
};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod input;

use config::{load_settings, parse_backend, Settings, SETTINGS_FILE};
use input::{parse_line, Control, InputLine};

/// Feeds detector output from stdin to the controller endpoint.
#[derive(Parser, Debug)]
struct Args {
    #[arg(long, default_value = SETTINGS_FILE)]
    config: PathBuf,
    #[arg(long)]
    url: Option<String>,
    #[arg(long, value_parser = parse_backend)]
    backend: Option<client_core::DetectorBackend>,
    #[arg(long)]
    zone_height: Option<f64>,
    #[arg(long)]
    image_height: Option<f64>,
    /// Start with sends suppressed until a resume control line arrives.
    #[arg(long)]
    paused: bool,
}

impl Args {
    fn apply(&self, settings: &mut Settings) {
        if let Some(url) = &self.url {
            settings.url = url.clone();
        }
        if let Some(backend) = self.backend {
            settings.backend = backend;
        }
        if let Some(zone_height) = self.zone_height {
            settings.zone_height = zone_height;
        }
        if let Some(image_height) = self.image_height {
            settings.image_height = image_height;
        }
        if self.paused {
            settings.start_paused = true;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let mut settings = load_settings(&args.config);
    args.apply(&mut settings);

    let adapter = settings
        .backend
        .adapter(&settings.thresholds, settings.image_height);
    let (session, mut task) = client_core::spawn(settings.session_config(), WsConnector)
        .context("invalid tracker settings")?;
    let mut events = session.subscribe_events();
    info!(url = %settings.url, backend = adapter.name(), "tracker started");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    break;
                };
                match parse_line(&line, adapter.as_ref()) {
                    Ok(InputLine::Cycle(cycle)) => session.submit_cycle(cycle)?,
                    Ok(InputLine::Control(Control::Pause)) => session.set_paused(true)?,
                    Ok(InputLine::Control(Control::Resume)) => session.set_paused(false)?,
                    Ok(InputLine::Blank) => {}
                    Err(err) => warn!(%err, "skipping input line"),
                }
            }
            event = events.recv() => match event {
                Ok(event) => report(&event),
                Err(RecvError::Lagged(skipped)) => debug!(skipped, "event stream lagged"),
                Err(RecvError::Closed) => {}
            },
            result = &mut task => {
                // The session only stops on its own after a fatal fault.
                result.context("tracker session panicked")??;
                return Ok(());
            }
        }
    }

    info!("input closed, shutting down");
    session.shutdown()?;
    task.await.context("tracker session panicked")??;
    Ok(())
}

fn report(event: &SessionEvent) {
    match event {
        SessionEvent::Connected => info!("endpoint connected"),
        SessionEvent::Disconnected => info!("endpoint disconnected"),
        SessionEvent::LedPayload(payload) => debug!(len = payload.len(), "led frame"),
        SessionEvent::LanesChanged(lanes) => info!(%lanes, "lanes"),
    }
}
