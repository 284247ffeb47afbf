use crate::input::InputAction;
use crate::rendering::{Screen, TerminalGuard};
use crate::state::ClientState;
use crossterm::event::{self, Event};
use log::{debug, error, info, warn};
use shared::{decode_line, ClientMessage, LobbyState, ProtocolError, Welcome};
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

/// Idle sleep of the input loop between keyboard polls
const INPUT_POLL: Duration = Duration::from_millis(5);

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("handshake failed: {0}")]
    Handshake(String),
}

/// Client state plus the screen it is drawn on
pub struct View<W: Write> {
    pub state: ClientState,
    screen: Screen<W>,
}

impl<W: Write> View<W> {
    pub fn new(state: ClientState, screen: Screen<W>) -> Self {
        Self { state, screen }
    }

    pub fn redraw(&mut self) -> io::Result<()> {
        let ops = self.state.render();
        self.screen.apply(&ops)
    }

    /// Clears the terminal and repaints everything, e.g. after a resize
    pub fn repaint(&mut self) -> io::Result<()> {
        self.state.invalidate();
        self.screen.clear()?;
        self.redraw()
    }

    pub fn screen(&self) -> &Screen<W> {
        &self.screen
    }
}

pub type SharedView<W> = Arc<Mutex<View<W>>>;

/// Locks the view, recovering from a panic on another thread mid-render
pub fn lock_view<W: Write>(view: &SharedView<W>) -> MutexGuard<'_, View<W>> {
    view.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Reads the first server line, which must be a Welcome
pub async fn read_welcome<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<u32, ClientError> {
    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        return Err(ClientError::Handshake(
            "server closed the connection".to_string(),
        ));
    }

    match decode_line::<Welcome>(&line) {
        Ok(welcome) => Ok(welcome.player_id),
        Err(e) => Err(ClientError::Handshake(format!(
            "expected a welcome line: {}",
            e
        ))),
    }
}

/// Stores each snapshot as the latest one and redraws, until EOF or a read error
pub async fn receive_loop<R, W>(mut reader: R, view: SharedView<W>)
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut buffer = Vec::new();

    loop {
        buffer.clear();
        match reader.read_until(b'\n', &mut buffer).await {
            Ok(0) => {
                info!("Server closed the connection");
                break;
            }
            Ok(_) => {
                let text = String::from_utf8_lossy(&buffer);
                let snapshot = match decode_line::<LobbyState>(&text) {
                    Ok(snapshot) => snapshot,
                    Err(e) => {
                        debug!("Ignoring unreadable line from server: {}", e);
                        continue;
                    }
                };

                let mut view = lock_view(&view);
                view.state.apply_snapshot(snapshot);
                if let Err(e) = view.redraw() {
                    error!("Render failed: {}", e);
                }
            }
            Err(e) => {
                warn!("Read from server failed: {}", e);
                break;
            }
        }
    }
}

/// Writes queued messages to the server; a write failure ends the loop
pub async fn send_loop<W: AsyncWrite + Unpin>(
    mut writer: W,
    mut outbound: mpsc::UnboundedReceiver<ClientMessage>,
) -> Result<(), ClientError> {
    while let Some(message) = outbound.recv().await {
        let line = message.encode()?;
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
    }
    let _ = writer.shutdown().await;
    Ok(())
}

/// Polls the keyboard until quit, a closed outbound queue, or `running` drops
pub fn input_loop<W: Write>(
    view: SharedView<W>,
    outbound: mpsc::UnboundedSender<ClientMessage>,
    running: Arc<AtomicBool>,
) -> Result<(), ClientError> {
    while running.load(Ordering::Acquire) {
        if !event::poll(INPUT_POLL)? {
            continue;
        }

        match event::read()? {
            Event::Key(key) => {
                let mut view = lock_view(&view);
                match view.state.handle_key(key) {
                    InputAction::None => {}
                    InputAction::Redraw => view.redraw()?,
                    InputAction::Send(message) => {
                        if outbound.send(message).is_err() {
                            break;
                        }
                        view.redraw()?;
                    }
                    InputAction::Quit => break,
                }
            }
            Event::Resize(_, _) => lock_view(&view).repaint()?,
            _ => {}
        }
    }
    Ok(())
}

/// A connected client that has completed the handshake
pub struct Client {
    player_id: u32,
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl Client {
    pub async fn connect(addr: &str) -> Result<Self, ClientError> {
        info!("Connecting to server at {}", addr);
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;

        let (reader, writer) = stream.into_split();
        let mut reader = BufReader::new(reader);
        let player_id = read_welcome(&mut reader).await?;
        info!("Connected! Player ID: {}", player_id);

        Ok(Client {
            player_id,
            reader,
            writer,
        })
    }

    pub fn player_id(&self) -> u32 {
        self.player_id
    }

    /// Takes over the terminal and runs until the user quits or the
    /// connection ends
    pub async fn run(self) -> Result<(), ClientError> {
        let _guard = TerminalGuard::enter()?;

        let mut screen = Screen::new(io::stdout());
        screen.set_title(&format!("Lobby | Player {}", self.player_id))?;
        screen.clear()?;

        let view = Arc::new(Mutex::new(View::new(ClientState::new(self.player_id), screen)));
        lock_view(&view).redraw()?;

        let running = Arc::new(AtomicBool::new(true));
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let mut receiver = tokio::spawn(receive_loop(self.reader, Arc::clone(&view)));
        let mut sender = tokio::spawn(send_loop(self.writer, outbound_rx));
        let mut input = {
            let view = Arc::clone(&view);
            let running = Arc::clone(&running);
            tokio::task::spawn_blocking(move || input_loop(view, outbound_tx, running))
        };

        let (result, input_done) = tokio::select! {
            _ = &mut receiver => (Ok(()), false),
            joined = &mut sender => (flatten(joined), false),
            joined = &mut input => (flatten(joined), true),
        };

        running.store(false, Ordering::Release);
        receiver.abort();
        sender.abort();
        if !input_done {
            let _ = input.await;
        }

        result
    }
}

fn flatten(joined: Result<Result<(), ClientError>, tokio::task::JoinError>) -> Result<(), ClientError> {
    match joined {
        Ok(result) => result,
        Err(e) => Err(ClientError::Io(io::Error::new(io::ErrorKind::Other, e))),
    }
}
