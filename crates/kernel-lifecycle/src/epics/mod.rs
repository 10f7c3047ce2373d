//! Coordinator processes ("epics").
//!
//! Each epic subscribes to the shared action stream before its task is
//! spawned, reacts to specific action kinds, and emits follow-up actions on
//! its output queue. Epics never touch state directly; they read snapshots
//! and let the store reduce what they emit.

use std::collections::VecDeque;

use log::debug;
use tokio::sync::mpsc;

use crate::actions::Action;
use crate::state::StateHandle;
use crate::store::ActionBus;

pub mod execution_state;
pub mod kernel_info;
pub mod launch;
pub mod loading;
pub mod restart;

pub use execution_state::spawn_watch_execution_state_epic;
pub use kernel_info::{acquire_kernel_info, spawn_acquire_kernel_info_epic};
pub use launch::{spawn_kill_kernel_epic, spawn_launch_kernel_epic, KernelLauncher, LaunchRequest};
pub use loading::{
    new_notebook, spawn_fetch_content_epic, spawn_launch_kernel_when_fetched_epic,
    spawn_launch_kernel_when_notebook_set_epic, spawn_new_notebook_epic, LoadingConfig,
    DEFAULT_FETCH_TIMEOUT,
};
pub use restart::{
    restart_kernel, spawn_restart_kernel_epic, RestartConfig, RestartOutcome, RestartRequest,
    DEFAULT_RESTART_TIMEOUT,
};

/// What every epic gets to work with.
#[derive(Debug, Clone)]
pub struct EpicContext {
    pub actions: ActionBus,
    pub state: StateHandle,
    output: mpsc::UnboundedSender<Vec<Action>>,
}

impl EpicContext {
    /// A context plus the queue its emissions land on.
    pub fn new(actions: ActionBus, state: StateHandle) -> (Self, EpicOutput) {
        let (output, rx) = mpsc::unbounded_channel();
        let ctx = Self {
            actions,
            state,
            output,
        };
        (
            ctx,
            EpicOutput {
                rx,
                pending: VecDeque::new(),
            },
        )
    }

    /// Emit a follow-up action. Dropped silently once the coordinator is gone.
    pub fn emit(&self, action: Action) {
        self.emit_all([action]);
    }

    /// Emit actions that must be dispatched back to back, with nothing
    /// reduced in between.
    pub fn emit_all(&self, actions: impl IntoIterator<Item = Action>) {
        let batch: Vec<Action> = actions.into_iter().collect();
        if batch.is_empty() {
            return;
        }
        if let Err(mpsc::error::SendError(dropped)) = self.output.send(batch) {
            for action in dropped {
                debug!("[epic] Output closed, dropping {}", action.kind());
            }
        }
    }
}

/// Receiving end of every epic's emissions.
#[derive(Debug)]
pub struct EpicOutput {
    rx: mpsc::UnboundedReceiver<Vec<Action>>,
    pending: VecDeque<Action>,
}

impl EpicOutput {
    /// Next batch, exactly as emitted. `None` once every context is gone.
    pub async fn recv_batch(&mut self) -> Option<Vec<Action>> {
        if !self.pending.is_empty() {
            return Some(self.pending.drain(..).collect());
        }
        self.rx.recv().await
    }

    /// Next single action, batches flattened.
    pub async fn recv(&mut self) -> Option<Action> {
        loop {
            if let Some(action) = self.pending.pop_front() {
                return Some(action);
            }
            self.pending.extend(self.rx.recv().await?);
        }
    }

    pub fn try_recv(&mut self) -> Result<Action, mpsc::error::TryRecvError> {
        loop {
            if let Some(action) = self.pending.pop_front() {
                return Ok(action);
            }
            self.pending.extend(self.rx.try_recv()?);
        }
    }
}
