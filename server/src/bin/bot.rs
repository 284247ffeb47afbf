//! Headless lobby client that wanders around and chats, for exercising a server

use clap::Parser;
use log::{info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{decode_line, ClientMessage, Direction, LobbyState, Welcome};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::sleep;

const DIRECTIONS: [Direction; 4] = [Direction::Up, Direction::Left, Direction::Down, Direction::Right];

const PHRASES: [&str; 4] = ["hello", "anyone here?", "/color cyan", "/avatar *"];

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server address to connect to
    #[clap(short, long, default_value = "127.0.0.1:5000")]
    server: String,
    /// Number of actions to send before disconnecting
    #[clap(long, default_value_t = 50)]
    steps: u32,
    /// Delay between actions in milliseconds
    #[clap(short, long, default_value_t = 250)]
    delay_ms: u64,
    /// Seed for reproducible runs
    #[clap(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    info!("Connecting to {}", args.server);
    let stream = TcpStream::connect(&args.server).await?;
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        return Err("server closed the connection before the handshake".into());
    }
    let welcome: Welcome = decode_line(&line)?;
    info!("Joined as player {}", welcome.player_id);

    let own_id = welcome.player_id;
    let listener = tokio::spawn(async move {
        let mut line = String::new();
        let mut snapshots = 0u64;
        loop {
            line.clear();
            match reader.read_line(&mut line).await {
                Ok(0) => break,
                Ok(_) => match decode_line::<LobbyState>(&line) {
                    Ok(state) => {
                        snapshots += 1;
                        if let Some(me) = state.players.iter().find(|p| p.id == own_id) {
                            info!(
                                "Snapshot {}: {} players, at ({}, {}), {} chat lines",
                                snapshots,
                                state.players.len(),
                                me.x,
                                me.y,
                                state.chat_history.len()
                            );
                        }
                    }
                    Err(e) => warn!("Unreadable snapshot: {}", e),
                },
                Err(e) => {
                    warn!("Read failed: {}", e);
                    break;
                }
            }
        }
        snapshots
    });

    for _ in 0..args.steps {
        let message = if rng.gen_bool(0.1) {
            ClientMessage::chat(PHRASES[rng.gen_range(0..PHRASES.len())])
        } else {
            ClientMessage::move_to(DIRECTIONS[rng.gen_range(0..DIRECTIONS.len())])
        };

        writer.write_all(message.encode()?.as_bytes()).await?;

        sleep(Duration::from_millis(args.delay_ms)).await;
    }

    writer.shutdown().await?;
    drop(writer);

    listener.abort();
    match listener.await {
        Ok(snapshots) => info!("Bot finished after {} snapshots", snapshots),
        Err(_) => info!("Bot finished"),
    }

    Ok(())
}
