//! Terminal view of the lobby
//!
//! [`Renderer`] turns the latest snapshot and the local input state into a
//! list of [`DrawOp`]s. Only map cells that changed since the previous pass
//! are emitted; the chat pane and input line are small and redrawn whole.
//! [`Screen`] executes the ops with crossterm.

use crate::input::{InputManager, InputMode};
use crossterm::{
    cursor, execute, queue,
    style::{Color, Print, ResetColor, SetForegroundColor},
    terminal::{self, ClearType},
};
use shared::{LobbyState, PlayerColor, LOBBY_HEIGHT, LOBBY_WIDTH};
use std::collections::HashMap;
use std::io::{self, Write};

pub const MAP_WIDTH: usize = LOBBY_WIDTH as usize;
pub const MAP_HEIGHT: usize = LOBBY_HEIGHT as usize;
pub const CHAT_TOP: u16 = 11;
pub const CHAT_WIDTH: usize = 40;
pub const CHAT_HEIGHT: usize = 8;
pub const INPUT_ROW: u16 = 21;
pub const INPUT_VISIBLE: usize = 38;

const PROMPT: &str = "> ";
const EMPTY_CELL: Cell = Cell {
    glyph: '.',
    color: PlayerColor::DarkGray,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cell {
    pub glyph: char,
    pub color: PlayerColor,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrawOp {
    /// One map cell at grid coordinates
    Cell { x: u16, y: u16, cell: Cell },
    /// A full-width text row, padded with spaces so stale text is erased
    Line {
        row: u16,
        width: usize,
        text: String,
        color: PlayerColor,
    },
}

/// Builds draw ops, remembering the last map frame for diffing
#[derive(Debug, Default)]
pub struct Renderer {
    previous: Option<Vec<Cell>>,
}

impl Renderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forgets the previous frame so the next pass redraws the whole map
    pub fn invalidate(&mut self) {
        self.previous = None;
    }

    pub fn render(&mut self, snapshot: Option<&LobbyState>, input: &InputManager) -> Vec<DrawOp> {
        let frame = build_frame(snapshot);
        let mut ops = Vec::new();

        match &self.previous {
            Some(previous) => {
                for (index, (old, new)) in previous.iter().zip(frame.iter()).enumerate() {
                    if old != new {
                        ops.push(cell_op(index, *new));
                    }
                }
            }
            None => {
                ops.extend(frame.iter().enumerate().map(|(index, cell)| cell_op(index, *cell)));
            }
        }
        self.previous = Some(frame);

        ops.extend(chat_lines(snapshot));
        ops.push(input_line(input));
        ops
    }
}

fn cell_op(index: usize, cell: Cell) -> DrawOp {
    DrawOp::Cell {
        x: (index % MAP_WIDTH) as u16,
        y: (index / MAP_WIDTH) as u16,
        cell,
    }
}

/// Background grid with every in-bounds player drawn over it
///
/// Players arrive sorted by id, so on a shared cell the highest id wins on
/// every client.
fn build_frame(snapshot: Option<&LobbyState>) -> Vec<Cell> {
    let mut frame = vec![EMPTY_CELL; MAP_WIDTH * MAP_HEIGHT];

    if let Some(state) = snapshot {
        for player in state.players.iter().filter(|p| p.in_bounds()) {
            let index = player.y as usize * MAP_WIDTH + player.x as usize;
            frame[index] = Cell {
                glyph: printable(player.avatar),
                color: player.color,
            };
        }
    }

    frame
}

fn chat_lines(snapshot: Option<&LobbyState>) -> Vec<DrawOp> {
    let mut rows: Vec<(String, PlayerColor)> = Vec::with_capacity(CHAT_HEIGHT);

    if let Some(state) = snapshot {
        let senders: HashMap<u32, (&str, PlayerColor)> = state
            .players
            .iter()
            .map(|p| (p.id, (p.name.as_str(), p.color)))
            .collect();

        let skip = state.chat_history.len().saturating_sub(CHAT_HEIGHT);
        for entry in state.chat_history.iter().skip(skip) {
            let (text, color) = match senders.get(&entry.player_id) {
                Some((name, color)) => (format!("{}: {}", name, entry.message), *color),
                None => (
                    format!("#{}: {}", entry.player_id, entry.message),
                    PlayerColor::Gray,
                ),
            };
            rows.push((truncate(&sanitize(&text), CHAT_WIDTH), color));
        }
    }

    // Pad from the top so the newest line sits at the bottom of the pane
    let padding = CHAT_HEIGHT - rows.len();
    (0..CHAT_HEIGHT)
        .map(|slot| {
            let (text, color) = if slot < padding {
                (String::new(), PlayerColor::Gray)
            } else {
                rows[slot - padding].clone()
            };
            DrawOp::Line {
                row: CHAT_TOP + slot as u16,
                width: CHAT_WIDTH,
                text,
                color,
            }
        })
        .collect()
}

fn input_line(input: &InputManager) -> DrawOp {
    let buffer = input.buffer();
    let count = buffer.chars().count();
    let visible: String = buffer
        .chars()
        .skip(count.saturating_sub(INPUT_VISIBLE))
        .collect();

    let color = match input.mode() {
        InputMode::Move => PlayerColor::Green,
        InputMode::Chat => PlayerColor::Cyan,
    };

    DrawOp::Line {
        row: INPUT_ROW,
        width: PROMPT.len() + INPUT_VISIBLE,
        text: format!("{}{}", PROMPT, visible),
        color,
    }
}

/// Control characters would move the cursor or start escape sequences
fn printable(c: char) -> char {
    if c.is_control() {
        '?'
    } else {
        c
    }
}

fn sanitize(text: &str) -> String {
    text.chars().map(printable).collect()
}

fn truncate(text: &str, width: usize) -> String {
    text.chars().take(width).collect()
}

pub fn terminal_color(color: PlayerColor) -> Color {
    match color {
        PlayerColor::Black => Color::Black,
        PlayerColor::DarkBlue => Color::DarkBlue,
        PlayerColor::DarkGreen => Color::DarkGreen,
        PlayerColor::DarkCyan => Color::DarkCyan,
        PlayerColor::DarkRed => Color::DarkRed,
        PlayerColor::DarkMagenta => Color::DarkMagenta,
        PlayerColor::DarkYellow => Color::DarkYellow,
        PlayerColor::Gray => Color::Grey,
        PlayerColor::DarkGray => Color::DarkGrey,
        PlayerColor::Blue => Color::Blue,
        PlayerColor::Green => Color::Green,
        PlayerColor::Cyan => Color::Cyan,
        PlayerColor::Red => Color::Red,
        PlayerColor::Magenta => Color::Magenta,
        PlayerColor::Yellow => Color::Yellow,
        PlayerColor::White => Color::White,
    }
}

/// Executes draw ops against any writer; stdout in the binary
pub struct Screen<W: Write> {
    out: W,
}

impl<W: Write> Screen<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn clear(&mut self) -> io::Result<()> {
        queue!(self.out, terminal::Clear(ClearType::All))?;
        self.out.flush()
    }

    pub fn set_title(&mut self, title: &str) -> io::Result<()> {
        queue!(self.out, terminal::SetTitle(title))?;
        self.out.flush()
    }

    /// Queues every op, then flushes once
    pub fn apply(&mut self, ops: &[DrawOp]) -> io::Result<()> {
        for op in ops {
            match op {
                DrawOp::Cell { x, y, cell } => {
                    queue!(
                        self.out,
                        cursor::MoveTo(*x, *y),
                        SetForegroundColor(terminal_color(cell.color)),
                        Print(cell.glyph)
                    )?;
                }
                DrawOp::Line {
                    row,
                    width,
                    text,
                    color,
                } => {
                    queue!(
                        self.out,
                        cursor::MoveTo(0, *row),
                        SetForegroundColor(terminal_color(*color)),
                        Print(format!("{:<width$}", text, width = *width))
                    )?;
                }
            }
        }
        queue!(self.out, ResetColor)?;
        self.out.flush()
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }
}

/// Raw mode plus alternate screen for as long as the guard lives
///
/// Dropping it restores the terminal, including on early returns and panics
/// that unwind through the owner.
pub struct TerminalGuard;

impl TerminalGuard {
    pub fn enter() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        let guard = TerminalGuard;
        execute!(io::stdout(), terminal::EnterAlternateScreen, cursor::Hide)?;
        Ok(guard)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = execute!(
            io::stdout(),
            ResetColor,
            cursor::Show,
            terminal::LeaveAlternateScreen
        );
        let _ = terminal::disable_raw_mode();
    }
}
