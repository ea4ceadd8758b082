//! Per-request state machine.
//!
//! ```text
//! AwaitingHeaders → AwaitingBody → Dispatched → Responding → Closed
//!        └──────────────┴──────────────┴─────────────┴──────────▶ Closed
//! ```
//!
//! `Closed` is terminal and reachable from every phase. `Responding` is
//! only reachable from `Dispatched`.

use tracing::trace;

use crate::error::{AdapterError, AdapterResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPhase {
    AwaitingHeaders,
    AwaitingBody,
    Dispatched,
    Responding,
    Closed,
}

impl RequestPhase {
    pub fn can_transition_to(self, next: RequestPhase) -> bool {
        use RequestPhase::*;
        matches!(
            (self, next),
            (AwaitingHeaders, AwaitingBody)
                | (AwaitingBody, Dispatched)
                | (Dispatched, Responding)
                | (AwaitingHeaders | AwaitingBody | Dispatched | Responding, Closed)
        )
    }

    /// Move to `next`, rejecting transitions outside the table.
    pub fn advance(self, next: RequestPhase) -> AdapterResult<RequestPhase> {
        if !self.can_transition_to(next) {
            return Err(AdapterError::InvalidTransition {
                from: self,
                to: next,
            });
        }
        trace!(from = ?self, to = ?next, "request phase");
        Ok(next)
    }

    pub fn is_terminal(self) -> bool {
        self == RequestPhase::Closed
    }
}
