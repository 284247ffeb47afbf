//! # Lobby Server Library
//!
//! This library provides the authoritative server for a shared text-mode
//! lobby. Players connect over TCP, move an avatar around a fixed grid and
//! chat; the server owns every player record and periodically pushes a
//! snapshot of the whole lobby to everyone.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative State
//! Clients never tell the server where they are. They send a direction and
//! the server applies it, clamping to the grid. Chat entries are always
//! attributed to the connection they arrived on.
//!
//! ### Connection Lifecycle
//! - A fresh id and a `Welcome` line for every accepted connection
//! - Newline-delimited JSON in both directions
//! - Removal of the player as soon as the peer disconnects or a write fails
//!
//! ### Snapshot Broadcasting
//! On a fixed interval (200ms by default) the broadcaster encodes one
//! `LobbyState` containing all players and the ten most recent chat lines,
//! then offers that same line to every connection.
//!
//! ## Architecture Design
//!
//! ### Shared State
//! The [`lobby::Lobby`] handle bundles two locks: the registry of players and
//! their connections (`RwLock`), and the bounded chat log (`Mutex`). Players
//! and connections live in the same map, so a snapshot can never list a
//! player without a connection or the other way around.
//!
//! ### Per-Connection Writers
//! Each connection owns a bounded outbound queue drained by its own task.
//! The broadcaster only ever does a non-blocking enqueue, so a stalled peer
//! misses snapshots without slowing anyone else down.
//!
//! ## Module Organization
//!
//! - `registry`: player ids, player records and outbound queues
//! - `chat_log`: bounded chat history
//! - `commands`: `/avatar`, `/color` and `/name` parsing
//! - `lobby`: shared handle and snapshots
//! - `session`: per-connection read loop and writer task
//! - `broadcaster`: periodic snapshot fan-out
//! - `network`: TCP accept loop and shutdown
//! - `config`: command line options
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::Server;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Listen on the default port and broadcast five times per second
//!     let server = Server::bind("0.0.0.0:5000", Duration::from_millis(200)).await?;
//!
//!     // Serve until Ctrl+C, then stop the broadcaster and close every
//!     // connection
//!     server
//!         .run_until(async {
//!             let _ = tokio::signal::ctrl_c().await;
//!         })
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

pub mod broadcaster;
pub mod chat_log;
pub mod commands;
pub mod config;
pub mod lobby;
pub mod network;
pub mod registry;
pub mod session;
