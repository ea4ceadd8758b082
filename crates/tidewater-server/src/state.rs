//! Server lifecycle state.
//!
//! ```text
//! Down ──start()──▶ Starting ──bound──▶ Up ──shutdown()──▶ Stopping ──drained──▶ Down
//!                      │  └──shutdown()──────────────────────▲
//!                      └──bind failed──▶ Down (final error set)
//! ```
//!
//! The state is read by the controlling thread and advanced by both
//! threads, so it lives in an atomic and every transition is a
//! compare-and-swap checked against the table above.

use std::sync::atomic::{AtomicU8, Ordering};

use tracing::debug;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Down = 0,
    Starting = 1,
    Up = 2,
    Stopping = 3,
}

impl ServerState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ServerState::Starting,
            2 => ServerState::Up,
            3 => ServerState::Stopping,
            _ => ServerState::Down,
        }
    }

    pub fn can_transition_to(self, next: ServerState) -> bool {
        use ServerState::*;
        matches!(
            (self, next),
            (Down, Starting)
                | (Starting, Up)
                | (Starting, Down)
                | (Starting, Stopping)
                | (Up, Stopping)
                | (Stopping, Down)
        )
    }
}

/// Atomically updated [`ServerState`].
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub fn new() -> Self {
        Self(AtomicU8::new(ServerState::Down as u8))
    }

    pub fn load(&self) -> ServerState {
        ServerState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Move from `from` to `to` if the current state is still `from`.
    ///
    /// Returns `false` when another thread got there first or the
    /// transition is not in the table.
    pub fn transition(&self, from: ServerState, to: ServerState) -> bool {
        if !from.can_transition_to(to) {
            return false;
        }
        let moved = self
            .0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if moved {
            debug!(from = ?from, to = ?to, "server state");
        }
        moved
    }
}
