//! Periodic lobby snapshot fan-out
//!
//! Every tick the broadcaster copies the registry and recent chat, encodes
//! the snapshot once, and offers the same line to every live connection.
//! Offers never wait: a full peer queue drops that tick for that peer and a
//! closed one is pruned from the registry after the fan-out.

use crate::lobby::Lobby;
use crate::registry::{Connection, Delivery};
use log::{debug, error, info};
use serde::Serialize;
use shared::{encode_line, ProtocolError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcasterState {
    Running,
    Stopped,
}

/// Outcome of one tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub players: usize,
    pub delivered: usize,
    pub dropped: usize,
    pub pruned: usize,
}

pub struct Broadcaster {
    lobby: Lobby,
    interval: Duration,
}

impl Broadcaster {
    pub fn new(lobby: Lobby, interval: Duration) -> Self {
        Self { lobby, interval }
    }

    /// Starts the tick loop on its own task
    ///
    /// Dropping the returned handle without calling `stop` also ends the loop
    /// at its next wakeup.
    pub fn spawn(self) -> BroadcasterHandle {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(self.run(shutdown_rx));
        BroadcasterHandle {
            shutdown: Some(shutdown_tx),
            task,
        }
    }

    async fn run(self, mut shutdown: oneshot::Receiver<()>) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // Skip the first tick since it fires immediately
        ticker.tick().await;

        info!("Broadcaster running every {:?}", self.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.tick().await {
                        Ok(report) => {
                            if report.dropped > 0 || report.pruned > 0 {
                                debug!(
                                    "Tick: {} players, {} delivered, {} dropped, {} pruned",
                                    report.players, report.delivered, report.dropped, report.pruned
                                );
                            }
                        }
                        Err(e) => error!("Broadcast tick skipped: {}", e),
                    }
                }
                _ = &mut shutdown => break,
            }
        }

        info!("Broadcaster stopped");
    }

    /// Runs one broadcast cycle
    pub async fn tick(&self) -> Result<TickReport, ProtocolError> {
        let (snapshot, connections) = self.lobby.capture().await;

        let mut report = self.broadcast(&snapshot, &connections).await?;
        report.players = snapshot.players.len();
        Ok(report)
    }

    /// Offers one encoded message to each connection, pruning closed ones
    ///
    /// Nothing is queued anywhere when encoding fails.
    async fn broadcast<T: Serialize>(
        &self,
        message: &T,
        connections: &[Connection],
    ) -> Result<TickReport, ProtocolError> {
        // Serialized once, shared by every connection
        let payload: Arc<str> = Arc::from(encode_line(message)?);

        let mut report = TickReport::default();
        let mut dead = Vec::new();

        for connection in connections {
            match connection.send(Arc::clone(&payload)) {
                Delivery::Queued => report.delivered += 1,
                Delivery::Dropped => {
                    debug!("Player {} is behind, skipping this snapshot", connection.id);
                    report.dropped += 1;
                }
                Delivery::Closed => dead.push(connection.id),
            }
        }

        if !dead.is_empty() {
            let mut registry = self.lobby.registry.write().await;
            for id in dead {
                if registry.unregister(id).is_some() {
                    report.pruned += 1;
                }
            }
        }

        Ok(report)
    }
}

/// Control handle for a spawned broadcaster
pub struct BroadcasterHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl BroadcasterHandle {
    pub fn state(&self) -> BroadcasterState {
        if self.task.is_finished() {
            BroadcasterState::Stopped
        } else {
            BroadcasterState::Running
        }
    }

    /// Halts future ticks and waits for the loop to exit
    pub async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Err(e) = (&mut self.task).await {
            error!("Broadcaster task failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Connection, OUTBOUND_QUEUE_LEN};
    use shared::{decode_line, LobbyState, Player};
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    async fn join(lobby: &Lobby) -> (u32, mpsc::Receiver<Arc<str>>) {
        let mut registry = lobby.registry.write().await;
        let id = registry.allocate_id();
        let (connection, receiver) = Connection::new(id);
        registry.register(Player::new(id), connection);
        (id, receiver)
    }

    #[tokio::test]
    async fn test_tick_sends_identical_snapshot_to_everyone() {
        let lobby = Lobby::new();
        let (a, mut rx_a) = join(&lobby).await;
        let (b, mut rx_b) = join(&lobby).await;
        lobby.post_chat(a, "hello".to_string()).await;

        let broadcaster = Broadcaster::new(lobby.clone(), Duration::from_millis(200));
        let report = broadcaster.tick().await.unwrap();
        assert_eq!(report.players, 2);
        assert_eq!(report.delivered, 2);

        let line_a = rx_a.try_recv().unwrap();
        let line_b = rx_b.try_recv().unwrap();
        // Same allocation: encoded once per tick
        assert!(Arc::ptr_eq(&line_a, &line_b));

        let state: LobbyState = decode_line(&line_a).unwrap();
        let ids: Vec<u32> = state.players.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![a, b]);
        assert_eq!(state.chat_history[0].message, "hello");
    }

    #[tokio::test]
    async fn test_dead_connection_is_pruned_without_affecting_others() {
        let lobby = Lobby::new();
        let (dead, rx_dead) = join(&lobby).await;
        let (alive, mut rx_alive) = join(&lobby).await;
        drop(rx_dead);

        let broadcaster = Broadcaster::new(lobby.clone(), Duration::from_millis(200));
        let report = broadcaster.tick().await.unwrap();
        assert_eq!(report.delivered, 1);
        assert_eq!(report.pruned, 1);
        assert!(lobby.player(dead).await.is_none());

        broadcaster.tick().await.unwrap();
        let _first = rx_alive.try_recv().unwrap();
        let second: LobbyState = decode_line(&rx_alive.try_recv().unwrap()).unwrap();
        let ids: Vec<u32> = second.players.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![alive]);
    }

    #[tokio::test]
    async fn test_slow_peer_drops_ticks_but_stays_connected() {
        let lobby = Lobby::new();
        let (slow, _rx_slow) = join(&lobby).await;
        let (_fast, mut rx_fast) = join(&lobby).await;

        let broadcaster = Broadcaster::new(lobby.clone(), Duration::from_millis(200));
        for _ in 0..(OUTBOUND_QUEUE_LEN + 3) {
            broadcaster.tick().await.unwrap();
            rx_fast.try_recv().unwrap();
        }

        let report = broadcaster.tick().await.unwrap();
        assert_eq!(report.dropped, 1);
        assert_eq!(report.delivered, 1);
        assert!(lobby.player(slow).await.is_some());
    }

    struct Unencodable;

    impl Serialize for Unencodable {
        fn serialize<S: serde::Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("refused"))
        }
    }

    #[tokio::test]
    async fn test_encode_failure_sends_nothing_and_next_tick_recovers() {
        let lobby = Lobby::new();
        let (id, mut rx) = join(&lobby).await;
        let broadcaster = Broadcaster::new(lobby.clone(), Duration::from_millis(200));

        let (_, connections) = lobby.capture().await;
        let result = broadcaster.broadcast(&Unencodable, &connections).await;
        assert!(matches!(result, Err(ProtocolError::Json(_))));
        assert!(rx.try_recv().is_err());
        assert!(lobby.player(id).await.is_some());

        let report = broadcaster.tick().await.unwrap();
        assert_eq!(report.delivered, 1);
        let state: LobbyState = decode_line(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(state.players[0].id, id);
    }

    #[tokio::test]
    async fn test_tick_with_no_connections() {
        let broadcaster = Broadcaster::new(Lobby::new(), Duration::from_millis(200));
        assert_eq!(broadcaster.tick().await.unwrap(), TickReport::default());
    }

    #[tokio::test]
    async fn test_spawned_loop_ticks_and_stops() {
        let lobby = Lobby::new();
        let (_id, mut rx) = join(&lobby).await;

        let handle = Broadcaster::new(lobby.clone(), Duration::from_millis(10)).spawn();
        assert_eq!(handle.state(), BroadcasterState::Running);

        let line = timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
        assert!(line.starts_with("{\"players\""));

        timeout(Duration::from_secs(2), handle.stop()).await.unwrap();
    }
}
