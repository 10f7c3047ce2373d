//! The shared action stream and the dispatcher that feeds it.

use log::{debug, warn};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use crate::actions::Action;
use crate::state::StateHandle;

pub const DEFAULT_BUS_CAPACITY: usize = 1024;

/// Multicast, ordered stream of actions. Every subscriber sees every action
/// published after it subscribed, in publish order.
#[derive(Debug, Clone)]
pub struct ActionBus {
    tx: broadcast::Sender<Action>,
}

impl ActionBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> ActionStream {
        ActionStream {
            rx: self.tx.subscribe(),
        }
    }

    /// Live subscriptions, epics included.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Publish without reducing. Hosts go through `Store::dispatch`; tests
    /// drive epics directly with this.
    pub fn publish(&self, action: Action) {
        if self.tx.send(action).is_err() {
            debug!("[bus] Published with no subscribers");
        }
    }
}

impl Default for ActionBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

pub struct ActionStream {
    rx: broadcast::Receiver<Action>,
}

impl ActionStream {
    /// Next action; `None` once the bus is gone.
    pub async fn next(&mut self) -> Option<Action> {
        loop {
            match self.rx.recv().await {
                Ok(action) => return Some(action),
                Err(RecvError::Lagged(skipped)) => {
                    warn!("[bus] Subscriber lagged, skipped {} actions", skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next action matching `pick`, mapped through it.
    pub async fn next_matching<T>(&mut self, mut pick: impl FnMut(&Action) -> Option<T>) -> Option<T> {
        while let Some(action) = self.next().await {
            if let Some(found) = pick(&action) {
                return Some(found);
            }
        }
        None
    }
}

/// Applies actions to state, then broadcasts them.
///
/// The state write lock is held across the publish so subscribers observe
/// actions in exactly the order they were reduced, and any state read made
/// while handling an action already reflects it.
#[derive(Debug, Clone)]
pub struct Store {
    state: StateHandle,
    bus: ActionBus,
}

impl Store {
    pub fn new(state: StateHandle, bus: ActionBus) -> Self {
        Self { state, bus }
    }

    pub fn dispatch(&self, action: Action) {
        self.dispatch_all([action]);
    }

    /// Reduce and publish `actions` in order under one write lock, so no
    /// other dispatch lands between them.
    pub fn dispatch_all(&self, actions: impl IntoIterator<Item = Action>) {
        let mut state = self.state.write();
        for action in actions {
            debug!("[store] {}", action.kind());
            state.reduce(&action);
            self.bus.publish(action);
        }
    }

    pub fn state(&self) -> &StateHandle {
        &self.state
    }

    pub fn bus(&self) -> &ActionBus {
        &self.bus
    }
}
