//! Authoritative player and connection bookkeeping for the lobby server
//!
//! Each player id maps to one entry holding both the [`Player`] and its
//! [`Connection`]. They are inserted and removed together, so every live
//! connection has exactly one player and vice versa. The
//! registry itself is a plain struct; the server shares it as
//! `Arc<RwLock<Registry>>` so the broadcaster can read while sessions write.

use log::info;
use shared::Player;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Lines buffered per connection before new payloads are dropped for that peer
pub const OUTBOUND_QUEUE_LEN: usize = 64;

/// Result of handing one payload to a connection's writer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Queued,
    /// Queue full; this peer misses the payload but stays connected
    Dropped,
    /// Writer is gone or the connection was unregistered
    Closed,
}

/// Outbound half of one client connection
///
/// Cloning is cheap: clones share the queue and the closed flag. Writes to
/// the socket happen on the connection's own writer task, so `send` never
/// waits on a slow peer.
#[derive(Debug, Clone)]
pub struct Connection {
    pub id: u32,
    sender: mpsc::Sender<Arc<str>>,
    closed: Arc<AtomicBool>,
}

impl Connection {
    /// Creates a connection and the receiving end its writer task drains
    pub fn new(id: u32) -> (Self, mpsc::Receiver<Arc<str>>) {
        let (sender, receiver) = mpsc::channel(OUTBOUND_QUEUE_LEN);
        let connection = Self {
            id,
            sender,
            closed: Arc::new(AtomicBool::new(false)),
        };
        (connection, receiver)
    }

    pub fn send(&self, payload: Arc<str>) -> Delivery {
        if self.is_closed() {
            return Delivery::Closed;
        }

        match self.sender.try_send(payload) {
            Ok(()) => Delivery::Queued,
            Err(TrySendError::Full(_)) => Delivery::Dropped,
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.sender.is_closed()
    }

    /// Flag checked by the writer task before every write
    pub fn closed_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.closed)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

struct Entry {
    player: Player,
    connection: Connection,
}

/// Players and their connections, keyed by player id
pub struct Registry {
    entries: HashMap<u32, Entry>,
    /// Next id to hand out; ids are never reused within a process run
    next_player_id: u32,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            next_player_id: 1,
        }
    }

    /// Reserves a fresh player id
    pub fn allocate_id(&mut self) -> u32 {
        let id = self.next_player_id;
        self.next_player_id += 1;
        id
    }

    /// Inserts a player together with its connection
    ///
    /// Returns false and leaves the registry untouched when the ids disagree
    /// or the id is already taken.
    pub fn register(&mut self, player: Player, connection: Connection) -> bool {
        if player.id != connection.id || self.entries.contains_key(&player.id) {
            return false;
        }

        info!("Player {} joined the lobby", player.id);
        self.entries
            .insert(player.id, Entry { player, connection });
        true
    }

    /// Removes a player and its connection; absent ids are a no-op
    ///
    /// The connection is marked closed before it is dropped so no queued or
    /// racing send reaches the socket afterwards.
    pub fn unregister(&mut self, id: u32) -> Option<Player> {
        let entry = self.entries.remove(&id)?;
        entry.connection.close();
        info!("Player {} left the lobby", id);
        Some(entry.player)
    }

    pub fn get(&self, id: u32) -> Option<&Player> {
        self.entries.get(&id).map(|entry| &entry.player)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut Player> {
        self.entries.get_mut(&id).map(|entry| &mut entry.player)
    }

    /// Point-in-time copy of every player, sorted by id
    pub fn all_players(&self) -> Vec<Player> {
        let mut players: Vec<Player> = self
            .entries
            .values()
            .map(|entry| entry.player.clone())
            .collect();
        players.sort_by_key(|player| player.id);
        players
    }

    /// Point-in-time copy of the live connection set
    pub fn connections(&self) -> Vec<Connection> {
        self.entries
            .values()
            .map(|entry| entry.connection.clone())
            .collect()
    }

    pub fn ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.entries.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
