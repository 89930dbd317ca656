//! Engine lifecycle states
//!
//! ```text
//! Initializing ──Synced──▶ Ready ──shutdown──▶ Draining ──▶ Stopped
//!      │                                          ▲
//!      └────────────────shutdown──────────────────┘
//! ```
//!
//! The current state is published on a `tokio::sync::watch` channel so
//! observers can wait for readiness without touching the engine.

use tokio::sync::watch;

/// Lifecycle state of a [`HostsEngine`](super::HostsEngine)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    /// Watching, but the source has not finished its initial enumeration
    Initializing,
    /// The source reported its initial state as loaded
    Ready,
    /// Shutdown requested; no new events are accepted
    Draining,
    /// The run loop has returned
    Stopped,
}

impl LifecycleState {
    /// Whether moving to `next` is a legal transition
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Initializing, Ready)
                | (Initializing, Draining)
                | (Ready, Draining)
                | (Draining, Stopped)
        )
    }
}

/// Owner of the lifecycle state
#[derive(Debug)]
pub struct Lifecycle {
    tx: watch::Sender<LifecycleState>,
}

impl Lifecycle {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(LifecycleState::Initializing);
        Self { tx }
    }

    /// Subscribe to state changes
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.tx.subscribe()
    }

    /// Current state
    pub fn state(&self) -> LifecycleState {
        *self.tx.borrow()
    }

    /// Move to `next` if the transition is legal
    ///
    /// Returns whether the state changed.
    pub fn transition(&self, next: LifecycleState) -> bool {
        self.tx.send_if_modified(|state| {
            if state.can_transition_to(next) {
                *state = next;
                true
            } else {
                false
            }
        })
    }

    /// Enter `Ready`; true only for the first call
    pub fn mark_ready(&self) -> bool {
        self.transition(LifecycleState::Ready)
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// Wait until the engine leaves `Initializing`
///
/// Returns the state observed at that point: `Ready` on a successful
/// sync, `Draining`/`Stopped` if the engine stopped first. `None` means
/// the engine was dropped while still initializing.
pub async fn wait_until_settled(rx: &mut watch::Receiver<LifecycleState>) -> Option<LifecycleState> {
    rx.wait_for(|state| *state != LifecycleState::Initializing)
        .await
        .ok()
        .map(|state| *state)
}
