use clap::Parser;
use log::{error, info};
use server::config::{GameConfig, ServerSettings};
use server::gateway::Server;
use server::hub::Hub;
use std::path::PathBuf;
use tokio::time::Duration;

/// Main-method of the application.
/// Parses command-line arguments, loads the game config, then runs the gateway until Ctrl+C.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Command line arguments
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Server IP address to bind to
        #[clap(short = 'H', long, default_value = "127.0.0.1")]
        host: String,
        /// Server port to listen on
        #[clap(short, long, default_value = "8080")]
        port: u16,
        /// Game config (maps, conditions, badges, events); built-in defaults when absent
        #[clap(short, long)]
        game_config: Option<PathBuf>,
        /// Secret shared with clients for frame signatures
        #[clap(long, env = "SIGNING_KEY", default_value = "overlay-dev-key")]
        signing_key: String,
        /// Maximum occupants per room
        #[clap(long, default_value = "512")]
        room_capacity: usize,
        /// Bound of every actor mailbox
        #[clap(long, default_value = "1024")]
        mailbox_capacity: usize,
        /// Bound of every connection's outbound queue
        #[clap(long, default_value = "256")]
        outbox_capacity: usize,
        /// Seconds between keepalive pings
        #[clap(long, default_value = "30")]
        keepalive: u64,
        /// Concurrent connections allowed per address
        #[clap(long, default_value = "16")]
        max_connections_per_ip: usize,
        /// Messages returned by chat history requests
        #[clap(long, default_value = "50")]
        chat_history_limit: usize,
    }

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Parse command line arguments
    let args = Args::parse();

    let game = match &args.game_config {
        Some(path) => GameConfig::from_file(path)?,
        None => GameConfig::default(),
    };
    info!(
        "Loaded {} maps, {} conditions, {} badges",
        game.maps.len(),
        game.conditions.len(),
        game.badges.len()
    );

    let settings = ServerSettings {
        signing_key: args.signing_key.into_bytes(),
        room_capacity: args.room_capacity,
        mailbox_capacity: args.mailbox_capacity,
        outbox_capacity: args.outbox_capacity,
        keepalive: Duration::from_secs(args.keepalive.max(1)),
        max_connections_per_ip: args.max_connections_per_ip,
        chat_history_limit: args.chat_history_limit,
    };

    let hub = Hub::in_memory(settings, game)?;
    let address = format!("{}:{}", args.host, args.port);
    let server = Server::bind(&address, hub).await?;

    // Handle shutdown gracefully
    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Gateway stopped: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    Ok(())
}
