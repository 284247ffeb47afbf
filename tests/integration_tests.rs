//! Integration tests for the lobby server and client
//!
//! These tests boot a real server on an ephemeral port and talk to it over
//! TCP with hand-written JSON lines.

use serde_json::{json, Value};
use server::lobby::Lobby;
use server::network::Server;
use shared::{LobbyState, PlayerColor, LOBBY_HEIGHT, LOBBY_WIDTH};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};

const TICK: Duration = Duration::from_millis(20);
const WAIT: Duration = Duration::from_secs(5);

struct TestServer {
    addr: SocketAddr,
    lobby: Lobby,
    task: JoinHandle<std::io::Result<()>>,
}

impl TestServer {
    async fn start() -> Self {
        let server = Server::bind("127.0.0.1:0", TICK).await.unwrap();
        let addr = server.local_addr().unwrap();
        let lobby = server.lobby();
        let task = tokio::spawn(server.run());
        TestServer { addr, lobby, task }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// A raw protocol client
struct TestClient {
    id: u32,
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (reader, writer) = stream.into_split();
        let mut reader = BufReader::new(reader);

        let welcome = read_json(&mut reader).await;
        let id = welcome["playerId"].as_u64().unwrap() as u32;

        TestClient { id, reader, writer }
    }

    async fn send(&mut self, message: Value) {
        let mut line = message.to_string();
        line.push('\n');
        self.writer.write_all(line.as_bytes()).await.unwrap();
    }

    async fn send_raw(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.unwrap();
    }

    async fn next_snapshot(&mut self) -> LobbyState {
        serde_json::from_value(read_json(&mut self.reader).await).unwrap()
    }

    /// Reads snapshots until one satisfies `done`, checking `each` on every one
    async fn wait_for<F, G>(&mut self, mut each: G, mut done: F) -> LobbyState
    where
        F: FnMut(&LobbyState) -> bool,
        G: FnMut(&LobbyState),
    {
        let deadline = Instant::now() + WAIT;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let snapshot = timeout(remaining, self.next_snapshot())
                .await
                .expect("condition not reached before timeout");
            each(&snapshot);
            if done(&snapshot) {
                return snapshot;
            }
        }
    }

    async fn wait_until<F: FnMut(&LobbyState) -> bool>(&mut self, done: F) -> LobbyState {
        self.wait_for(|_| {}, done).await
    }
}

async fn read_json(reader: &mut BufReader<OwnedReadHalf>) -> Value {
    let mut line = String::new();
    let read = timeout(WAIT, reader.read_line(&mut line))
        .await
        .expect("timed out waiting for a line")
        .unwrap();
    assert!(read > 0, "server closed the connection");
    assert!(line.ends_with('\n'));
    serde_json::from_str(&line).unwrap()
}

/// PROTOCOL TESTS
mod protocol_tests {
    use super::*;

    /// The first line is a Welcome and ids are never reused
    #[tokio::test]
    async fn welcome_comes_first_with_fresh_ids() {
        let server = TestServer::start().await;

        let first = TestClient::connect(server.addr).await;
        let second = TestClient::connect(server.addr).await;
        assert!(first.id >= 1);
        assert!(second.id > first.id);

        drop(first);
        drop(second);
        let third = TestClient::connect(server.addr).await;
        assert!(third.id > 2);
    }

    /// Snapshot lines use the camelCase wire shape
    #[tokio::test]
    async fn snapshot_wire_format() {
        let server = TestServer::start().await;
        let mut client = TestClient::connect(server.addr).await;

        let raw = read_json(&mut client.reader).await;
        let players = raw["players"].as_array().unwrap();
        let me = players
            .iter()
            .find(|p| p["id"].as_u64() == Some(client.id as u64))
            .unwrap();

        assert_eq!(me["x"], json!(0));
        assert_eq!(me["y"], json!(0));
        assert_eq!(me["status"], json!("InLobby"));
        assert_eq!(me["name"], json!("Player"));
        assert_eq!(me["avatar"], json!("@"));
        assert_eq!(me["color"], json!("White"));
        assert!(raw["chatHistory"].is_array());
    }

    /// Garbage never costs the connection
    #[tokio::test]
    async fn malformed_lines_are_ignored() {
        let server = TestServer::start().await;
        let mut client = TestClient::connect(server.addr).await;

        client.send_raw("not json at all\n").await;
        client.send_raw("{}\n").await;
        client.send_raw("{\"foo\":1}\n").await;
        client.send_raw("\n").await;
        client.send(json!({"direction": "q"})).await;
        client.send(json!({"direction": "d"})).await;

        let id = client.id;
        client
            .wait_until(|s| s.players.iter().any(|p| p.id == id && p.x == 1))
            .await;
    }
}

/// MOVEMENT TESTS
mod movement_tests {
    use super::*;

    #[tokio::test]
    async fn moves_stay_within_the_grid() {
        let server = TestServer::start().await;
        let mut client = TestClient::connect(server.addr).await;

        for _ in 0..100 {
            client.send(json!({"direction": "w"})).await;
        }
        for _ in 0..30 {
            client.send(json!({"direction": "D"})).await;
        }
        for _ in 0..15 {
            client.send(json!({"direction": "s"})).await;
        }

        let id = client.id;
        let snapshot = client
            .wait_for(
                |s| {
                    for player in &s.players {
                        assert!((0..LOBBY_WIDTH).contains(&player.x));
                        assert!((0..LOBBY_HEIGHT).contains(&player.y));
                    }
                },
                |s| {
                    s.players
                        .iter()
                        .any(|p| p.id == id && p.x == LOBBY_WIDTH - 1 && p.y == LOBBY_HEIGHT - 1)
                },
            )
            .await;
        assert!(snapshot.players.iter().any(|p| p.id == id));
    }

    #[tokio::test]
    async fn other_players_see_moves() {
        let server = TestServer::start().await;
        let mut mover = TestClient::connect(server.addr).await;
        let mut watcher = TestClient::connect(server.addr).await;

        mover.send(json!({"direction": "s"})).await;
        mover.send(json!({"direction": "s"})).await;

        let id = mover.id;
        watcher
            .wait_until(|s| s.players.iter().any(|p| p.id == id && p.y == 2))
            .await;
    }
}

/// CHAT AND COMMAND TESTS
mod chat_tests {
    use super::*;

    #[tokio::test]
    async fn commands_update_the_sender() {
        let server = TestServer::start().await;
        let mut client = TestClient::connect(server.addr).await;
        let id = client.id;

        client.send(json!({"playerId": id, "message": "/color bLuE"})).await;
        client.send(json!({"playerId": id, "message": "/color unknown_color_xyz"})).await;
        client.send(json!({"playerId": id, "message": "/avatar #"})).await;
        client.send(json!({"playerId": id, "message": "/avatar \u{7}"})).await;
        client.send(json!({"playerId": id, "message": "/name Bob"})).await;
        client.send(json!({"playerId": id, "message": "hello"})).await;

        let snapshot = client
            .wait_until(|s| s.chat_history.iter().any(|e| e.message == "hello"))
            .await;

        let me = snapshot.players.iter().find(|p| p.id == id).unwrap();
        assert_eq!(me.color, PlayerColor::Blue);
        assert_eq!(me.avatar, '#');
        assert_eq!(me.name, "Bob");

        // Commands other than the rename never reach the log
        let messages: Vec<&str> = snapshot
            .chat_history
            .iter()
            .map(|e| e.message.as_str())
            .collect();
        assert_eq!(messages, vec!["renamed from Player to Bob", "hello"]);
        assert!(snapshot.chat_history.iter().all(|e| e.player_id == id));
    }

    #[tokio::test]
    async fn chat_is_attributed_to_the_sender() {
        let server = TestServer::start().await;
        let mut victim = TestClient::connect(server.addr).await;
        let mut spoofer = TestClient::connect(server.addr).await;

        spoofer
            .send(json!({"playerId": victim.id, "message": "it was me"}))
            .await;

        let spoofer_id = spoofer.id;
        let snapshot = victim
            .wait_until(|s| s.chat_history.iter().any(|e| e.message == "it was me"))
            .await;
        let entry = snapshot
            .chat_history
            .iter()
            .find(|e| e.message == "it was me")
            .unwrap();
        assert_eq!(entry.player_id, spoofer_id);
    }

    #[tokio::test]
    async fn snapshots_carry_the_last_ten_lines() {
        let server = TestServer::start().await;
        let mut client = TestClient::connect(server.addr).await;

        for n in 0..25 {
            client.send(json!({"message": format!("line {}", n)})).await;
        }

        let snapshot = client
            .wait_until(|s| s.chat_history.last().map(|e| e.message.as_str()) == Some("line 24"))
            .await;
        assert_eq!(snapshot.chat_history.len(), 10);
        assert_eq!(snapshot.chat_history[0].message, "line 15");
        assert_eq!(server.lobby.chat.lock().await.len(), 25);
    }
}

/// CONNECTION LIFECYCLE TESTS
mod lifecycle_tests {
    use super::*;

    #[tokio::test]
    async fn disconnected_player_leaves_the_broadcast() {
        let server = TestServer::start().await;
        let leaver = TestClient::connect(server.addr).await;
        let mut stayer = TestClient::connect(server.addr).await;

        let leaver_id = leaver.id;
        stayer
            .wait_until(|s| s.players.iter().any(|p| p.id == leaver_id))
            .await;

        drop(leaver);
        let dropped_at = Instant::now();

        stayer
            .wait_until(|s| s.players.iter().all(|p| p.id != leaver_id))
            .await;
        // EOF removes the player at once; the next tick carries the change
        let elapsed = dropped_at.elapsed();
        assert!(
            elapsed < TICK * 3,
            "departure took {:?} to reach the broadcast",
            elapsed
        );
        assert!(server.lobby.player(leaver_id).await.is_none());

        // Still served afterwards
        let snapshot = stayer.next_snapshot().await;
        assert_eq!(snapshot.players.len(), 1);
        assert_eq!(snapshot.players[0].id, stayer.id);
    }

    #[tokio::test]
    async fn snapshot_players_match_connections() {
        let server = TestServer::start().await;
        let mut clients = Vec::new();
        for _ in 0..5 {
            clients.push(TestClient::connect(server.addr).await);
        }
        let mut expected: Vec<u32> = clients.iter().map(|c| c.id).collect();
        expected.sort_unstable();

        let snapshot = clients[0]
            .wait_until(|s| s.players.len() == expected.len())
            .await;
        let ids: Vec<u32> = snapshot.players.iter().map(|p| p.id).collect();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn shutdown_closes_every_connection() {
        let server = Server::bind("127.0.0.1:0", TICK).await.unwrap();
        let addr = server.local_addr().unwrap();
        let lobby = server.lobby();
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let task = tokio::spawn(server.run_until(async {
            let _ = stop_rx.await;
        }));

        let mut client = TestClient::connect(addr).await;
        client.next_snapshot().await;

        stop_tx.send(()).unwrap();
        timeout(WAIT, task).await.unwrap().unwrap().unwrap();
        assert!(lobby.registry.read().await.is_empty());

        let closed = timeout(WAIT, async {
            let mut line = String::new();
            loop {
                line.clear();
                match client.reader.read_line(&mut line).await {
                    Ok(0) | Err(_) => break,
                    Ok(_) => continue,
                }
            }
        })
        .await;
        assert!(closed.is_ok());
    }
}

/// CLIENT LIBRARY TESTS
mod client_tests {
    use super::*;
    use client::network::{read_welcome, receive_loop, send_loop, SharedView, View};
    use client::rendering::Screen;
    use client::state::ClientState;
    use shared::{ClientMessage, Direction};
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn client_handshake_against_real_server() {
        let server = TestServer::start().await;
        let first = client::network::Client::connect(&server.addr.to_string())
            .await
            .unwrap();
        let second = client::network::Client::connect(&server.addr.to_string())
            .await
            .unwrap();
        assert!(second.player_id() > first.player_id());
    }

    /// Drives the client's receive and send loops against a real server
    #[tokio::test]
    async fn client_loops_track_server_state() {
        let server = TestServer::start().await;
        let stream = TcpStream::connect(server.addr).await.unwrap();
        let (reader, writer) = stream.into_split();
        let mut reader = BufReader::new(reader);
        let id = read_welcome(&mut reader).await.unwrap();

        let view: SharedView<Vec<u8>> = Arc::new(Mutex::new(View::new(
            ClientState::new(id),
            Screen::new(Vec::new()),
        )));
        let receiver = tokio::spawn(receive_loop(reader, Arc::clone(&view)));

        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let sender = tokio::spawn(send_loop(writer, rx));
        tx.send(ClientMessage::move_to(Direction::Right)).unwrap();
        tx.send(ClientMessage::chat("/name Ada")).unwrap();

        let deadline = Instant::now() + WAIT;
        loop {
            let done = {
                let view = view.lock().unwrap();
                view.state
                    .local_player()
                    .map_or(false, |p| p.x == 1 && p.name == "Ada")
            };
            if done {
                break;
            }
            assert!(Instant::now() < deadline, "client never saw its own move");
            tokio::time::sleep(TICK).await;
        }

        drop(tx);
        timeout(WAIT, sender).await.unwrap().unwrap().unwrap();
        receiver.abort();
    }
}
