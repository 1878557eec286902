use clap::Parser;
use log::{error, info, warn};
use server::config::ServerConfig;
use server::console::{self, ConsoleCommand};
use server::network::{Server, ServerHandle};
use shared::{
    HandshakeVariant, LatencyBounds, LatencySettings, Position, CONTROL_PORT,
    MAX_JITTER_MS, MAX_ROUNDTRIP_DELAY_MS, PLAYER_SPEED, SERVER_HOST, SERVER_TICK_RATE,
    SETTINGS_PORT, SPAWN_X, SPAWN_Y,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = SERVER_HOST)]
    host: String,

    /// Well-known UDP control port
    #[arg(short = 'c', long, default_value_t = CONTROL_PORT)]
    control_port: u16,

    /// Well-known TCP settings port
    #[arg(short = 's', long, default_value_t = SETTINGS_PORT)]
    settings_port: u16,

    /// Simulation ticks per second
    #[arg(short = 't', long, default_value_t = SERVER_TICK_RATE)]
    tick_rate: u32,

    /// Pixels moved per tick per held direction
    #[arg(long, default_value_t = PLAYER_SPEED)]
    speed: i32,

    /// Handshake variant: 'shared' control port or 'dedicated' port per client
    #[arg(long, default_value = "shared")]
    variant: HandshakeVariant,

    /// Initial artificial round-trip delay in milliseconds
    #[arg(short = 'd', long, default_value_t = 0)]
    delay: i32,

    /// Initial artificial jitter in milliseconds
    #[arg(short = 'j', long, default_value_t = 0)]
    jitter: i32,

    #[arg(long, default_value_t = MAX_ROUNDTRIP_DELAY_MS)]
    max_delay: i32,

    #[arg(long, default_value_t = MAX_JITTER_MS)]
    max_jitter: i32,

    #[arg(long, default_value_t = SPAWN_X)]
    spawn_x: i32,

    #[arg(long, default_value_t = SPAWN_Y)]
    spawn_y: i32,

    /// Maximum concurrent clients
    #[arg(short = 'm', long, default_value_t = 1)]
    max_clients: usize,
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        ServerConfig {
            host: args.host,
            control_port: args.control_port,
            settings_port: args.settings_port,
            tick_rate: args.tick_rate,
            speed: args.speed,
            variant: args.variant,
            initial_latency: LatencySettings::new(args.delay, args.jitter),
            latency_bounds: LatencyBounds {
                max_roundtrip_delay_ms: args.max_delay,
                max_jitter_ms: args.max_jitter,
            },
            spawn: Position::new(args.spawn_x, args.spawn_y),
            max_clients: args.max_clients,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let config = ServerConfig::from(Args::parse());
    let server = Server::bind(config).await?;
    let handle = server.handle();

    let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            match console::parse(&line) {
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

    let server_task = tokio::spawn(server.run());

    info!("Commands: latency <delay> <jitter> | status | quit");

    tokio::pin!(server_task);
    let mut console_open = true;
    loop {
        tokio::select! {
            result = &mut server_task => {
                match result {
                    Ok(Err(e)) => error!("Server stopped: {}", e),
                    Err(e) => error!("Server task panicked: {}", e),
                    Ok(Ok(())) => {}
                }
                break;
            }
            command = cmd_rx.recv(), if console_open => {
                match command {
                    Some(ConsoleCommand::Quit) => break,
                    Some(command) => handle_command(&handle, command).await,
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

async fn handle_command(handle: &ServerHandle, command: ConsoleCommand) {
    match command {
        ConsoleCommand::Latency(settings) => {
            handle.set_latency(settings).await;
        }
        ConsoleCommand::Status => {
            info!(
                "{} client(s), {} pending, default latency {}",
                handle.session_count().await,
                handle.pending_count().await,
                handle.latency().await
            );
            for session in handle.sessions().await {
                info!(
                    "Client {} at {} position {} latency {}",
                    session.id,
                    session.peer,
                    session.position().await,
                    session.latency().await
                );
            }
        }
        ConsoleCommand::Quit => {}
    }
}
