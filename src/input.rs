use std::collections::HashSet;

use glam::Vec2;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Identifier for a physical keyboard key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyCode {
    Named(NamedKey),
    Character(char),
}

/// Friendly names for the non-character keys the renderer listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NamedKey {
    Space,
    Escape,
}

const FORWARD: KeyCode = KeyCode::Character('W');
const BACK: KeyCode = KeyCode::Character('S');
const LEFT: KeyCode = KeyCode::Character('A');
const RIGHT: KeyCode = KeyCode::Character('D');
const UP: KeyCode = KeyCode::Named(NamedKey::Space);
const DOWN: KeyCode = KeyCode::Character('C');
const EXIT: KeyCode = KeyCode::Named(NamedKey::Escape);

/// The six directional inputs sampled once per frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Movement {
    pub forward: bool,
    pub back: bool,
    pub left: bool,
    pub right: bool,
    pub up: bool,
    pub down: bool,
}

impl Movement {
    pub fn is_idle(&self) -> bool {
        *self == Self::default()
    }
}

/// Thread-safe input snapshot shared between the event loop and the frame step.
#[derive(Debug, Default)]
pub struct InputState {
    keys: RwLock<HashSet<KeyCode>>,
    pointer_delta: RwLock<Vec2>,
    exit_requested: RwLock<bool>,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_key_down(&self, key: KeyCode) {
        if key == EXIT {
            self.request_exit();
        }
        self.keys.write().insert(key);
    }

    pub fn set_key_up(&self, key: KeyCode) {
        self.keys.write().remove(&key);
    }

    pub fn is_key_down(&self, key: KeyCode) -> bool {
        self.keys.read().contains(&key)
    }

    /// Accumulates raw pointer motion until the next frame drains it.
    ///
    /// `dy` is positive when the pointer moves up.
    pub fn add_pointer_delta(&self, dx: f32, dy: f32) {
        *self.pointer_delta.write() += Vec2::new(dx, dy);
    }

    /// Returns and clears the motion gathered since the last call.
    pub fn take_pointer_delta(&self) -> Vec2 {
        std::mem::take(&mut *self.pointer_delta.write())
    }

    pub fn request_exit(&self) {
        *self.exit_requested.write() = true;
    }

    pub fn exit_requested(&self) -> bool {
        *self.exit_requested.read()
    }

    /// Samples the directional keys (W/S/A/D/Space/C).
    pub fn movement(&self) -> Movement {
        let keys = self.keys.read();
        Movement {
            forward: keys.contains(&FORWARD),
            back: keys.contains(&BACK),
            left: keys.contains(&LEFT),
            right: keys.contains(&RIGHT),
            up: keys.contains(&UP),
            down: keys.contains(&DOWN),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn movement_reflects_held_keys() {
        let state = InputState::new();
        assert!(state.movement().is_idle());
        state.set_key_down(KeyCode::Character('W'));
        state.set_key_down(KeyCode::Named(NamedKey::Space));
        let movement = state.movement();
        assert!(movement.forward);
        assert!(movement.up);
        assert!(!movement.back);
        state.set_key_up(KeyCode::Character('W'));
        assert!(!state.movement().forward);
    }

    #[test]
    fn pointer_motion_accumulates_and_drains() {
        let state = InputState::new();
        state.add_pointer_delta(3.0, -1.0);
        state.add_pointer_delta(2.0, 4.0);
        assert_eq!(state.take_pointer_delta(), Vec2::new(5.0, 3.0));
        assert_eq!(state.take_pointer_delta(), Vec2::ZERO);
    }

    #[test]
    fn escape_requests_exit() {
        let state = InputState::new();
        assert!(!state.exit_requested());
        state.set_key_down(KeyCode::Named(NamedKey::Escape));
        assert!(state.exit_requested());
    }
}
