//! Chat line interpretation
//!
//! A chat line starting with one of the command prefixes mutates the sender's
//! player instead of being shown. The prefixes include their trailing space,
//! so a bare `/avatar` is ordinary chat.

use shared::PlayerColor;

const AVATAR_PREFIX: &str = "/avatar ";
const COLOR_PREFIX: &str = "/color ";
const NAME_PREFIX: &str = "/name ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    SetAvatar(char),
    SetColor(PlayerColor),
    Rename(String),
    /// A recognized command whose argument was rejected; nothing happens
    Ignored,
    /// Not a command: append to the chat log verbatim
    Say(String),
}

impl Command {
    pub fn parse(message: &str) -> Self {
        if message.starts_with(AVATAR_PREFIX) {
            // The glyph is the line's final character, whatever precedes it
            match message.chars().last() {
                Some(glyph) if !glyph.is_control() => Command::SetAvatar(glyph),
                _ => Command::Ignored,
            }
        } else if let Some(rest) = message.strip_prefix(COLOR_PREFIX) {
            match rest.trim().parse::<PlayerColor>() {
                Ok(color) => Command::SetColor(color),
                Err(_) => Command::Ignored,
            }
        } else if let Some(rest) = message.strip_prefix(NAME_PREFIX) {
            // Names are echoed into every client's chat pane
            let printable: String = rest.chars().filter(|c| !c.is_control()).collect();
            let name = printable.trim();
            if name.is_empty() {
                Command::Ignored
            } else {
                Command::Rename(name.to_string())
            }
        } else {
            Command::Say(message.to_string())
        }
    }
}

pub fn rename_notice(old: &str, new: &str) -> String {
    format!("renamed from {} to {}", old, new)
}
