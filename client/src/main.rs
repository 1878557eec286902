use clap::Parser;
use client::input::{self, Command};
use client::network::{Client, ClientConfig};
use log::{info, warn};
use shared::{
    HandshakeVariant, InputFrame, LatencyBounds, CLIENT_TICK_RATE, CONTROL_PORT, MAX_JITTER_MS,
    MAX_ROUNDTRIP_DELAY_MS, SERVER_HOST, SETTINGS_PORT,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server host to connect to
    #[arg(short = 'H', long, default_value = SERVER_HOST)]
    host: String,

    /// Server UDP control port
    #[arg(short = 'c', long, default_value_t = CONTROL_PORT)]
    control_port: u16,

    /// Server TCP settings port
    #[arg(short = 's', long, default_value_t = SETTINGS_PORT)]
    settings_port: u16,

    /// Handshake variant: 'shared' control port or 'dedicated' port per client
    #[arg(long, default_value = "shared")]
    variant: HandshakeVariant,

    /// Input frames sent per second
    #[arg(short = 't', long, default_value_t = CLIENT_TICK_RATE)]
    tick_rate: u32,

    #[arg(long, default_value_t = MAX_ROUNDTRIP_DELAY_MS)]
    max_delay: i32,

    #[arg(long, default_value_t = MAX_JITTER_MS)]
    max_jitter: i32,
}

impl From<Args> for ClientConfig {
    fn from(args: Args) -> Self {
        ClientConfig {
            server_host: args.host,
            control_port: args.control_port,
            settings_port: args.settings_port,
            variant: args.variant,
            latency_bounds: LatencyBounds {
                max_roundtrip_delay_ms: args.max_delay,
                max_jitter_ms: args.max_jitter,
            },
            tick_rate: args.tick_rate,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let config = ClientConfig::from(Args::parse());
    info!(
        "Connecting to {} (settings {}, control {})",
        config.server_host, config.settings_port, config.control_port
    );

    let client = Client::connect(&config).await?;
    let mut positions = client.subscribe();

    let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            match input::parse(&line) {
                Ok(Some(command)) => {
                    if cmd_tx.send(command).is_err() {
                        break;
                    }
                }
                Ok(None) => {}
                Err(e) => warn!("{}", e),
            }
        }
    });

    info!("Commands: hold <udlr> | release | latency <delay> <jitter> | status | quit");

    let mut input_interval = interval(config.tick_duration());
    input_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut held = InputFrame::default();
    let mut console_open = true;
    let mut mirror_open = true;

    loop {
        tokio::select! {
            _ = input_interval.tick() => {
                client.send_input(held).await;
            }

            changed = positions.changed(), if mirror_open => {
                if changed.is_ok() {
                    info!("Position {}", *positions.borrow_and_update());
                } else {
                    warn!("Position updates stopped");
                    mirror_open = false;
                }
            }

            command = cmd_rx.recv(), if console_open => {
                match command {
                    Some(Command::Hold(frame)) => {
                        if frame.is_idle() {
                            info!("Released all keys");
                        } else {
                            info!("Holding {:?}", frame);
                        }
                        held = frame;
                    }
                    Some(Command::Latency(settings)) => {
                        client.set_latency(settings).await;
                    }
                    Some(Command::Status) => {
                        info!(
                            "Position {}, latency {}, held {:?}",
                            client.position(),
                            client.latency().await,
                            held
                        );
                        if !client.settings_open() {
                            warn!("Settings channel is closed; latency changes stay local");
                        }
                        if !client.is_receiving() {
                            warn!("State updates are no longer received");
                        }
                    }
                    Some(Command::Quit) => break,
                    None => console_open = false,
                }
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down");
                break;
            }
        }
    }

    Ok(())
}
