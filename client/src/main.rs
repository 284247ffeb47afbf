use clap::Parser;
use client::network::Client;
use log::{error, info};
use std::fs::File;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:5000")]
    server: String,

    /// Write logs to this file; the terminal itself is taken by the lobby view
    #[arg(short = 'l', long)]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if let Some(path) = &args.log_file {
        let file = File::create(path)?;
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();
    }

    info!("Starting client...");
    info!("Controls: WASD/arrows to move, Enter to chat, Ctrl+C to quit");

    let client = Client::connect(&args.server).await?;

    // The terminal is restored by the time run returns
    if let Err(e) = client.run().await {
        error!("Client stopped: {}", e);
        return Err(e.into());
    }

    println!("Disconnected from {}", args.server);
    Ok(())
}
