//! Keeps each kernel record's status in step with what the kernel reports.
//!
//! Only the most recently launched kernel is tracked: a new launch cancels
//! the listener for the previous one.

use log::debug;
use tokio::task::{JoinHandle, JoinSet};

use crate::actions::Action;
use crate::channel::MessageStream;
use crate::epics::EpicContext;
use crate::refs::KernelRef;

pub fn spawn_watch_execution_state_epic(ctx: EpicContext) -> JoinHandle<()> {
    let mut actions = ctx.actions.subscribe();

    tokio::spawn(async move {
        // Holds at most one live listener; dropping the set on abort stops it.
        let mut listener = JoinSet::new();

        loop {
            tokio::select! {
                action = actions.next() => {
                    let Some(action) = action else { break };
                    let Action::LaunchKernelSuccessful { kernel, kernel_ref, .. } = action else {
                        continue;
                    };
                    listener.abort_all();
                    let messages = kernel.channel.subscribe();
                    listener.spawn(forward_status(ctx.clone(), kernel_ref, messages));
                }
                Some(_) = listener.join_next(), if !listener.is_empty() => {}
            }
        }

        listener.abort_all();
    })
}

async fn forward_status(ctx: EpicContext, kernel_ref: KernelRef, mut messages: MessageStream) {
    debug!("[execution-state] Tracking {}", kernel_ref);

    while let Some(next) = messages.next().await {
        let message = match next {
            Ok(message) => message,
            Err(e) => {
                debug!("[execution-state] Channel for {} failed: {}", kernel_ref, e);
                break;
            }
        };
        if let Some(state) = message.execution_state() {
            ctx.emit(Action::SetExecutionState {
                kernel_ref,
                kernel_status: state.to_string(),
            });
        }
    }

    debug!("[execution-state] Stopped tracking {}", kernel_ref);
}
