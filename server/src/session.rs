//! Per-connection session handling
//!
//! Each accepted socket is split in two. The read half runs the session loop
//! on the accepting task: one line in, one state change applied. The write
//! half moves to a dedicated writer task that drains the connection's
//! outbound queue, so a slow or dead peer only ever stalls its own writer.

use crate::commands::{rename_notice, Command};
use crate::lobby::Lobby;
use crate::registry::{Connection, Registry};
use log::{debug, info, warn};
use shared::{encode_line, ClientMessage, Direction, Player, ProtocolError, Welcome};
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;

/// Longest inbound line buffered; anything longer is skipped as malformed
pub const MAX_LINE_BYTES: usize = 8 * 1024;

type OpenedSession = (u32, mpsc::Receiver<Arc<str>>, Arc<AtomicBool>);

/// Serves one accepted TCP connection until the peer goes away
pub async fn handle_connection(stream: TcpStream, addr: SocketAddr, lobby: Lobby) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!("Could not disable Nagle for {}: {}", addr, e);
    }

    let (reader, writer) = stream.into_split();
    match run_session(reader, writer, lobby).await {
        Ok(id) => info!("Session for player {} from {} ended", id, addr),
        Err(e) => warn!("Session from {} failed to start: {}", addr, e),
    }
}

/// Runs a full session over any byte stream pair
///
/// Returns the player id that was assigned once the session has ended and
/// its registry entries have been removed.
pub async fn run_session<R, W>(reader: R, writer: W, lobby: Lobby) -> Result<u32, ProtocolError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (id, outbound, closed) = open(&lobby).await?;
    // Detached: the writer exits on its own once the registry drops the queue
    let _writer = spawn_writer(id, writer, outbound, closed, Arc::clone(&lobby.registry));

    let session = Session::new(id, lobby.clone());
    session.read_loop(reader).await;

    lobby.remove_player(id).await;
    Ok(id)
}

/// Allocates an id, queues the Welcome line, and registers player + connection
///
/// All of this happens under one registry write lock, so the broadcaster can
/// never slip a snapshot in ahead of the Welcome.
async fn open(lobby: &Lobby) -> Result<OpenedSession, ProtocolError> {
    let mut registry = lobby.registry.write().await;
    let id = registry.allocate_id();
    let welcome = encode_line(&Welcome { player_id: id })?;

    let (connection, outbound) = Connection::new(id);
    connection.send(Arc::from(welcome));
    let closed = connection.closed_flag();
    registry.register(Player::new(id), connection);

    Ok((id, outbound, closed))
}

/// Drains a connection's queue onto the socket
///
/// A failed write unregisters the player and its connection; the error never
/// leaves this task.
pub fn spawn_writer<W>(
    id: u32,
    mut writer: W,
    mut outbound: mpsc::Receiver<Arc<str>>,
    closed: Arc<AtomicBool>,
    registry: Arc<RwLock<Registry>>,
) -> JoinHandle<()>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(line) = outbound.recv().await {
            if closed.load(Ordering::Acquire) {
                break;
            }

            let result = async {
                writer.write_all(line.as_bytes()).await?;
                writer.flush().await
            }
            .await;

            if let Err(e) = result {
                warn!("Write to player {} failed: {}", id, e);
                registry.write().await.unregister(id);
                break;
            }
        }

        let _ = writer.shutdown().await;
    })
}

/// The inbound side of one connection
pub struct Session {
    id: u32,
    lobby: Lobby,
}

impl Session {
    pub fn new(id: u32, lobby: Lobby) -> Self {
        Self { id, lobby }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// Reads newline-delimited messages until EOF, a read error, or removal
    ///
    /// Invalid UTF-8 is decoded lossily so a bad byte costs one message,
    /// never the connection. The same goes for a line over
    /// [`MAX_LINE_BYTES`]: its bytes are skipped up to the next newline.
    pub async fn read_loop<R: AsyncRead + Unpin>(&self, reader: R) {
        let mut reader = BufReader::new(reader);
        let mut buffer = Vec::new();

        loop {
            buffer.clear();
            let limit = MAX_LINE_BYTES as u64 + 1;
            match (&mut reader).take(limit).read_until(b'\n', &mut buffer).await {
                Ok(0) => break,
                Ok(_) if buffer.len() > MAX_LINE_BYTES && !buffer.ends_with(b"\n") => {
                    debug!("Dropping oversized line from player {}", self.id);
                    match discard_line(&mut reader).await {
                        Ok(true) => {}
                        Ok(false) => break,
                        Err(e) => {
                            debug!("Read from player {} failed: {}", self.id, e);
                            break;
                        }
                    }
                }
                Ok(_) => {
                    let text = String::from_utf8_lossy(&buffer);
                    let line = text.trim_end_matches(&['\r', '\n'][..]);
                    if !self.handle_line(line).await {
                        debug!("Player {} no longer registered, closing session", self.id);
                        break;
                    }
                }
                Err(e) => {
                    debug!("Read from player {} failed: {}", self.id, e);
                    break;
                }
            }
        }
    }

    /// Applies one inbound line; returns false once the player is gone
    pub async fn handle_line(&self, line: &str) -> bool {
        match ClientMessage::decode(line) {
            ClientMessage::Move(message) => self.handle_move(&message.direction).await,
            ClientMessage::Chat(message) => self.handle_chat(&message.message).await,
            ClientMessage::Unknown => {
                debug!("Ignoring malformed line from player {}", self.id);
                true
            }
        }
    }

    async fn handle_move(&self, direction: &str) -> bool {
        let mut registry = self.lobby.registry.write().await;
        let player = match registry.get_mut(self.id) {
            Some(player) => player,
            None => return false,
        };

        if let Some(direction) = Direction::parse(direction) {
            player.apply_move(direction);
        }
        true
    }

    /// Runs a chat line as a command or records it in the chat log
    ///
    /// The entry is always attributed to this session's player; whatever id
    /// the client put on the message is never consulted.
    async fn handle_chat(&self, message: &str) -> bool {
        let entry = {
            let mut registry = self.lobby.registry.write().await;
            let player = match registry.get_mut(self.id) {
                Some(player) => player,
                None => return false,
            };

            match Command::parse(message) {
                Command::SetAvatar(glyph) => {
                    player.avatar = glyph;
                    None
                }
                Command::SetColor(color) => {
                    player.color = color;
                    None
                }
                Command::Rename(name) => {
                    let old = std::mem::replace(&mut player.name, name);
                    info!("Player {} renamed from {} to {}", self.id, old, player.name);
                    Some(rename_notice(&old, &player.name))
                }
                Command::Ignored => None,
                Command::Say(text) => Some(text),
            }
        };

        if let Some(text) = entry {
            self.lobby.post_chat(self.id, text).await;
        }
        true
    }
}

/// Consumes input through the next newline; false if EOF came first
async fn discard_line<R: AsyncBufRead + Unpin>(reader: &mut R) -> io::Result<bool> {
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(false);
        }
        let (used, found) = match available.iter().position(|byte| *byte == b'\n') {
            Some(end) => (end + 1, true),
            None => (available.len(), false),
        };
        reader.consume(used);
        if found {
            return Ok(true);
        }
    }
}
