//! # Lobby Client Library
//!
//! This library provides the terminal client for the shared lobby. It keeps
//! a local view in step with the snapshots the server pushes and turns
//! keystrokes into move and chat messages.
//!
//! ## Architecture Overview
//!
//! The client is a thin view over server state. It never predicts: pressing
//! a movement key sends a `Move` and the avatar only moves once a snapshot
//! says so.
//!
//! ### Latest Snapshot Wins
//! The receive task decodes each `LobbyState` line and overwrites a single
//! slot in [`state::ClientState`]. A snapshot that arrives before the last
//! one was drawn replaces it; nothing queues up.
//!
//! ### One Lock, Two Producers
//! The receive task and the keyboard loop both end in a render pass. The
//! client state, the renderer's previous frame and the screen sit behind a
//! single mutex, so a frame is never drawn from a half-applied snapshot or a
//! half-edited input buffer.
//!
//! ## Module Organization
//!
//! ### Input Module (`input`)
//! - Move mode: W/A/S/D or the arrow keys send a move immediately
//! - Chat mode: typed text, Backspace, Enter to send, Esc to cancel
//! - Ctrl+C quits from either mode
//!
//! ### Rendering Module (`rendering`)
//! - The 20x10 map, diffed against the previous frame cell by cell
//! - The chat pane and input line, redrawn whole each pass
//! - `Screen`, which batches draw ops with crossterm and flushes once
//!
//! ### State Module (`state`)
//! Latest snapshot, local player id, input state and renderer.
//!
//! ### Network Module (`network`)
//! - TCP connect and the `Welcome` handshake
//! - Receive and send tasks plus the blocking keyboard loop
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::Client;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::connect("127.0.0.1:5000").await?;
//!     println!("Joined as player {}", client.player_id());
//!
//!     // Takes over the terminal until Ctrl+C or disconnect
//!     client.run().await?;
//!     Ok(())
//! }
//! ```

pub mod input;
pub mod network;
pub mod rendering;
pub mod state;
