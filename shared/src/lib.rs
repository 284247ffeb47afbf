use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const LOBBY_WIDTH: i32 = 20;
pub const LOBBY_HEIGHT: i32 = 10;
pub const CHAT_HISTORY_CAPACITY: usize = 1000;
pub const SNAPSHOT_CHAT_LEN: usize = 10;
pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_BROADCAST_INTERVAL_MS: u64 = 200;
pub const DEFAULT_AVATAR: char = '@';
pub const DEFAULT_NAME: &str = "Player";

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("message has no wire representation")]
    Unencodable,
}

/// Reserved for platform/game phases; every player is `InLobby` today.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayerStatus {
    #[default]
    InLobby,
    OnPlatform,
    InGame,
}

/// Named avatar colors. Clients map these onto whatever their display offers.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PlayerColor {
    Black,
    DarkBlue,
    DarkGreen,
    DarkCyan,
    DarkRed,
    DarkMagenta,
    DarkYellow,
    Gray,
    DarkGray,
    Blue,
    Green,
    Cyan,
    Red,
    Magenta,
    Yellow,
    #[default]
    White,
}

impl PlayerColor {
    pub const ALL: [PlayerColor; 16] = [
        PlayerColor::Black,
        PlayerColor::DarkBlue,
        PlayerColor::DarkGreen,
        PlayerColor::DarkCyan,
        PlayerColor::DarkRed,
        PlayerColor::DarkMagenta,
        PlayerColor::DarkYellow,
        PlayerColor::Gray,
        PlayerColor::DarkGray,
        PlayerColor::Blue,
        PlayerColor::Green,
        PlayerColor::Cyan,
        PlayerColor::Red,
        PlayerColor::Magenta,
        PlayerColor::Yellow,
        PlayerColor::White,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PlayerColor::Black => "Black",
            PlayerColor::DarkBlue => "DarkBlue",
            PlayerColor::DarkGreen => "DarkGreen",
            PlayerColor::DarkCyan => "DarkCyan",
            PlayerColor::DarkRed => "DarkRed",
            PlayerColor::DarkMagenta => "DarkMagenta",
            PlayerColor::DarkYellow => "DarkYellow",
            PlayerColor::Gray => "Gray",
            PlayerColor::DarkGray => "DarkGray",
            PlayerColor::Blue => "Blue",
            PlayerColor::Green => "Green",
            PlayerColor::Cyan => "Cyan",
            PlayerColor::Red => "Red",
            PlayerColor::Magenta => "Magenta",
            PlayerColor::Yellow => "Yellow",
            PlayerColor::White => "White",
        }
    }
}

impl fmt::Display for PlayerColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown color '{0}'")]
pub struct UnknownColor(pub String);

impl FromStr for PlayerColor {
    type Err = UnknownColor;

    /// Case-insensitive lookup over the palette names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PlayerColor::ALL
            .iter()
            .copied()
            .find(|color| color.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownColor(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Left,
    Down,
    Right,
}

impl Direction {
    /// Parses the w/a/s/d wire form, ignoring case.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "w" => Some(Direction::Up),
            "a" => Some(Direction::Left),
            "s" => Some(Direction::Down),
            "d" => Some(Direction::Right),
            _ => None,
        }
    }

    pub fn as_wire(self) -> &'static str {
        match self {
            Direction::Up => "w",
            Direction::Left => "a",
            Direction::Down => "s",
            Direction::Right => "d",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: u32,
    pub x: i32,
    pub y: i32,
    pub status: PlayerStatus,
    pub name: String,
    pub avatar: char,
    pub color: PlayerColor,
}

impl Player {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            x: 0,
            y: 0,
            status: PlayerStatus::InLobby,
            name: DEFAULT_NAME.to_string(),
            avatar: DEFAULT_AVATAR,
            color: PlayerColor::White,
        }
    }

    /// Steps one cell, staying inside the lobby grid.
    pub fn apply_move(&mut self, direction: Direction) {
        match direction {
            Direction::Up => self.y = (self.y - 1).max(0),
            Direction::Down => self.y = (self.y + 1).min(LOBBY_HEIGHT - 1),
            Direction::Left => self.x = (self.x - 1).max(0),
            Direction::Right => self.x = (self.x + 1).min(LOBBY_WIDTH - 1),
        }
    }

    pub fn in_bounds(&self) -> bool {
        (0..LOBBY_WIDTH).contains(&self.x) && (0..LOBBY_HEIGHT).contains(&self.y)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatEntry {
    pub player_id: u32,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Welcome {
    pub player_id: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct LobbyState {
    pub players: Vec<Player>,
    pub chat_history: Vec<ChatEntry>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct MoveMessage {
    pub direction: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Ignored by the server, which stamps the sender's own id.
    #[serde(default)]
    pub player_id: u32,
    pub message: String,
}

/// Client-to-server traffic, disambiguated by field presence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    Move(MoveMessage),
    Chat(ChatMessage),
    Unknown,
}

// Order matters: a line carrying `direction` is a move even if it also has `message`.
#[derive(Deserialize)]
#[serde(untagged)]
enum WireClientMessage {
    Move(MoveMessage),
    Chat(ChatMessage),
}

impl ClientMessage {
    pub fn move_to(direction: Direction) -> Self {
        ClientMessage::Move(MoveMessage {
            direction: direction.as_wire().to_string(),
        })
    }

    pub fn chat(message: impl Into<String>) -> Self {
        ClientMessage::Chat(ChatMessage {
            player_id: 0,
            message: message.into(),
        })
    }

    /// Decodes one line. Anything that is neither shape comes back as `Unknown`.
    pub fn decode(line: &str) -> Self {
        match serde_json::from_str::<WireClientMessage>(line) {
            Ok(WireClientMessage::Move(message)) => ClientMessage::Move(message),
            Ok(WireClientMessage::Chat(message)) => ClientMessage::Chat(message),
            Err(_) => ClientMessage::Unknown,
        }
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        match self {
            ClientMessage::Move(message) => encode_line(message),
            ClientMessage::Chat(message) => encode_line(message),
            ClientMessage::Unknown => Err(ProtocolError::Unencodable),
        }
    }
}

/// Serializes a message as a single newline-terminated line.
pub fn encode_line<T: Serialize>(message: &T) -> Result<String, ProtocolError> {
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    Ok(line)
}

pub fn decode_line<'a, T: Deserialize<'a>>(line: &'a str) -> Result<T, ProtocolError> {
    Ok(serde_json::from_str(line.trim_end_matches(&['\r', '\n'][..]))?)
}
