//! Client-side view state shared between the receive task and the input loop

use crate::input::{InputAction, InputManager};
use crate::rendering::{DrawOp, Renderer};
use crossterm::event::KeyEvent;
use shared::{LobbyState, Player};

/// Everything a render pass depends on
///
/// Lives behind one mutex so a render never sees a snapshot and an input
/// buffer from different moments.
#[derive(Debug)]
pub struct ClientState {
    player_id: u32,
    latest: Option<LobbyState>,
    input: InputManager,
    renderer: Renderer,
}

impl ClientState {
    pub fn new(player_id: u32) -> Self {
        Self {
            player_id,
            latest: None,
            input: InputManager::new(),
            renderer: Renderer::new(),
        }
    }

    pub fn player_id(&self) -> u32 {
        self.player_id
    }

    /// Replaces the latest snapshot; an unrendered older one is simply lost
    pub fn apply_snapshot(&mut self, snapshot: LobbyState) {
        self.latest = Some(snapshot);
    }

    pub fn latest(&self) -> Option<&LobbyState> {
        self.latest.as_ref()
    }

    /// This client's own player in the latest snapshot
    pub fn local_player(&self) -> Option<&Player> {
        self.latest
            .as_ref()
            .and_then(|state| state.players.iter().find(|p| p.id == self.player_id))
    }

    pub fn input(&self) -> &InputManager {
        &self.input
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> InputAction {
        self.input.handle_key(key)
    }

    pub fn render(&mut self) -> Vec<DrawOp> {
        self.renderer.render(self.latest.as_ref(), &self.input)
    }

    pub fn invalidate(&mut self) {
        self.renderer.invalidate();
    }
}
