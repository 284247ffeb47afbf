use crate::chat_log::ChatLog;
use crate::registry::{Connection, Registry};
use log::info;
use shared::{ChatEntry, LobbyState, Player, SNAPSHOT_CHAT_LEN};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Shared lobby state handed to every session and to the broadcaster
///
/// Lock order is registry first, then chat log. Sessions never hold both;
/// the broadcaster nests them to take a consistent snapshot.
#[derive(Clone)]
pub struct Lobby {
    pub registry: Arc<RwLock<Registry>>,
    pub chat: Arc<Mutex<ChatLog>>,
}

impl Lobby {
    pub fn new() -> Self {
        Self::with_chat_log(ChatLog::new())
    }

    pub fn with_chat_log(chat: ChatLog) -> Self {
        Self {
            registry: Arc::new(RwLock::new(Registry::new())),
            chat: Arc::new(Mutex::new(chat)),
        }
    }

    /// Point-in-time copy of all players plus the most recent chat
    pub async fn snapshot(&self) -> LobbyState {
        self.capture().await.0
    }

    /// Snapshot together with the connections it should be sent to
    ///
    /// Both come from the same registry read, so every player in the
    /// snapshot has its connection in the list and vice versa.
    pub async fn capture(&self) -> (LobbyState, Vec<Connection>) {
        let registry = self.registry.read().await;
        let chat = self.chat.lock().await;
        let snapshot = LobbyState {
            players: registry.all_players(),
            chat_history: chat.recent(SNAPSHOT_CHAT_LEN),
        };
        (snapshot, registry.connections())
    }

    pub async fn post_chat(&self, player_id: u32, message: String) {
        self.chat.lock().await.push(ChatEntry { player_id, message });
    }

    pub async fn player(&self, id: u32) -> Option<Player> {
        self.registry.read().await.get(id).cloned()
    }

    pub async fn remove_player(&self, id: u32) -> Option<Player> {
        self.registry.write().await.unregister(id)
    }

    /// Unregisters every connection, closing their writers
    pub async fn disconnect_all(&self) -> usize {
        let mut registry = self.registry.write().await;
        let ids = registry.ids();
        for id in &ids {
            registry.unregister(*id);
        }
        if !ids.is_empty() {
            info!("Disconnected {} players", ids.len());
        }
        ids.len()
    }
}

impl Default for Lobby {
    fn default() -> Self {
        Self::new()
    }
}
