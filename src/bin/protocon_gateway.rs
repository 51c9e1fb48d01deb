use std::{
    error::Error,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use clap::Parser;
use log::{info, warn};

use protocon::{GatewayBuilder, HandshakeEvent, Request, Response, STATUS_OK};

const ECHO_REQUEST: u16 = 0x0001;
const HEARTBEAT_REQUEST: u16 = 0x0004;
const POLL_EVERY: Duration = Duration::from_millis(200);

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Peer host to connect to
    host: String,
    /// Peer port
    port: u16,
    /// Client id from an earlier sign-up; zero signs up a new client
    #[arg(long, default_value_t = 0)]
    client_id: u64,
    /// API version stamped on outbound requests
    #[arg(long, default_value_t = 1)]
    api_version: u16,
    /// Seconds between heartbeat requests
    #[arg(long, default_value_t = 5)]
    interval: u64,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let cli = Cli::parse();
    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        ctrlc::set_handler(move || running.store(false, Ordering::SeqCst))?;
    }

    let mut gateway = GatewayBuilder::new(cli.api_version)
        .with_request_handler(ECHO_REQUEST, |token, request| {
            info!("{token} echoing {} bytes", request.data.len());
            Response::now(STATUS_OK, request.data.clone())
        })
        .with_handshake_handler(|event| match event {
            HandshakeEvent::SignedUp { client_id, .. } => {
                info!("signed up as client {client_id}, reuse it with --client-id {client_id}")
            }
            HandshakeEvent::SignedIn { token, client_id } => {
                info!("{token} is active as client {client_id}")
            }
            event => warn!("handshake failed: {event:?}"),
        })
        .build();
    let token = gateway.create_client_token(cli.client_id);

    gateway.run(&cli.host, cli.port)?;

    let interval = Duration::from_secs(cli.interval);
    let mut last_heartbeat: Option<Instant> = None;
    while running.load(Ordering::SeqCst) && gateway.is_open() {
        if let Err(e) = gateway.poll() {
            warn!("dropped inbound frame: {e}");
        }

        let due = last_heartbeat.is_none_or(|at| at.elapsed() >= interval);
        if due && gateway.client_id(token).is_ok() {
            gateway.send(
                token,
                Request::now(HEARTBEAT_REQUEST, Vec::new()),
                |response| info!("heartbeat answered with status {}", response.status),
            )?;
            last_heartbeat = Some(Instant::now());
        }

        thread::sleep(POLL_EVERY);
    }

    if !gateway.is_open() {
        warn!("connection to {}:{} closed", cli.host, cli.port);
    }
    gateway.stop();
    Ok(())
}
