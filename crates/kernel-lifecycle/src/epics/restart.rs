//! Kernel restart orchestration.
//!
//! A restart kills the current kernel, launches a replacement under a fresh
//! `KernelRef`, and waits for that replacement to come up. Requests are
//! handled strictly one at a time in arrival order.

use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};

use crate::actions::{Action, OutputHandling};
use crate::epics::EpicContext;
use crate::error::RestartError;
use crate::notification::Notification;
use crate::refs::{default_kernel_ref_generator, ContentRef, KernelRef, KernelRefGenerator};

pub const DEFAULT_RESTART_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartRequest {
    pub kernel_ref: Option<KernelRef>,
    pub content_ref: ContentRef,
    pub output_handling: OutputHandling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartOutcome {
    /// Nothing to restart; the user was told to pick a kernel.
    Rejected,
    Succeeded { kernel_ref: KernelRef },
    TimedOut { kernel_ref: KernelRef },
    Failed { kernel_ref: KernelRef },
}

#[derive(Clone)]
pub struct RestartConfig {
    pub timeout: Duration,
    pub kernel_ref_generator: KernelRefGenerator,
}

impl Default for RestartConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_RESTART_TIMEOUT,
            kernel_ref_generator: default_kernel_ref_generator(),
        }
    }
}

impl std::fmt::Debug for RestartConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestartConfig")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

enum Ready {
    Launched,
    LaunchFailed(String),
}

/// Run one restart to completion.
pub async fn restart_kernel(
    ctx: &EpicContext,
    config: &RestartConfig,
    request: RestartRequest,
) -> RestartOutcome {
    let RestartRequest {
        kernel_ref,
        content_ref,
        output_handling,
    } = request;

    let old_kernel = kernel_ref.and_then(|kernel_ref| ctx.state.kernel(&kernel_ref));
    let (Some(old_ref), Some(old_kernel)) = (kernel_ref, old_kernel) else {
        warn!("[restart] No kernel to restart for {}", content_ref);
        ctx.emit(Action::AddNotification(Notification::error(
            "Failure to Restart",
            "Unable to restart kernel, please select a new kernel.",
        )));
        return RestartOutcome::Rejected;
    };

    let new_ref = (config.kernel_ref_generator)();
    let mut ready = ctx.actions.subscribe();

    let spec_name = if old_kernel.kernel_spec_name.is_empty() {
        "unknown"
    } else {
        old_kernel.kernel_spec_name.as_str()
    };
    info!("[restart] Restarting {} as {} ({})", old_ref, new_ref, spec_name);
    ctx.emit(Action::AddNotification(Notification::success(
        "Kernel Restarting...",
        format!("Kernel {} is restarting.", spec_name),
    )));
    ctx.emit(Action::KillKernel {
        kernel_ref: old_ref,
        restarting: true,
    });
    ctx.emit(Action::LaunchKernelByName {
        kernel_spec_name: old_kernel.kernel_spec_name.clone(),
        cwd: old_kernel.cwd.clone(),
        kernel_ref: new_ref,
        content_ref,
        select_next_kernel: true,
    });

    let waited = tokio::time::timeout(
        config.timeout,
        ready.next_matching(|action| match action {
            Action::LaunchKernelSuccessful { kernel_ref, .. } if *kernel_ref == new_ref => {
                Some(Ready::Launched)
            }
            Action::LaunchKernelFailed {
                kernel_ref, error, ..
            } if *kernel_ref == new_ref => Some(Ready::LaunchFailed(error.clone())),
            _ => None,
        }),
    )
    .await;

    let error = match waited {
        Ok(Some(Ready::Launched)) => {
            info!("[restart] {} is up", new_ref);
            ctx.emit(Action::RestartKernelSuccessful {
                kernel_ref: new_ref,
                content_ref,
            });
            if output_handling == OutputHandling::RunAll {
                ctx.emit(Action::ExecuteAllCells { content_ref });
            }
            return RestartOutcome::Succeeded { kernel_ref: new_ref };
        }
        Ok(Some(Ready::LaunchFailed(reason))) => RestartError::Launch(reason),
        Ok(None) => RestartError::EventStreamClosed,
        Err(_) => RestartError::Timeout(config.timeout),
    };

    warn!("[restart] Restart of {} failed: {}", old_ref, error);
    let outcome = match error {
        RestartError::Timeout(_) => RestartOutcome::TimedOut { kernel_ref: new_ref },
        _ => RestartOutcome::Failed { kernel_ref: new_ref },
    };
    ctx.emit(Action::RestartKernelFailed {
        error,
        kernel_ref: new_ref,
        content_ref,
    });
    outcome
}

/// Handle every `RestartKernel` in arrival order, one at a time.
pub fn spawn_restart_kernel_epic(ctx: EpicContext, config: RestartConfig) -> JoinHandle<()> {
    let mut actions = ctx.actions.subscribe();

    tokio::spawn(async move {
        let (queue_tx, mut queue_rx) = mpsc::unbounded_channel::<RestartRequest>();

        // Owned by this task; aborted with it.
        let mut forward = JoinSet::new();
        forward.spawn(async move {
            while let Some(action) = actions.next().await {
                if let Action::RestartKernel {
                    kernel_ref,
                    content_ref,
                    output_handling,
                } = action
                {
                    let request = RestartRequest {
                        kernel_ref,
                        content_ref,
                        output_handling,
                    };
                    if queue_tx.send(request).is_err() {
                        break;
                    }
                }
            }
        });

        while let Some(request) = queue_rx.recv().await {
            let outcome = restart_kernel(&ctx, &config, request).await;
            debug!("[restart] Request for {} finished: {:?}", request.content_ref, outcome);
        }

        forward.abort_all();
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::KernelChannel;
    use crate::kernel::LaunchedKernel;
    use crate::notification::NotificationLevel;
    use crate::state::StateHandle;
    use crate::store::{ActionBus, Store};

    fn launched(spec: &str) -> LaunchedKernel {
        let (channel, _side) = KernelChannel::pair(4);
        LaunchedKernel {
            channel,
            kernel_spec_name: spec.into(),
            cwd: "/work".into(),
        }
    }

    #[tokio::test]
    async fn test_restart_without_kernel_ref_is_rejected() {
        let (ctx, mut rx) = EpicContext::new(ActionBus::default(), StateHandle::default());

        let outcome = restart_kernel(
            &ctx,
            &RestartConfig::default(),
            RestartRequest {
                kernel_ref: None,
                content_ref: ContentRef::new(),
                output_handling: OutputHandling::None,
            },
        )
        .await;

        assert_eq!(outcome, RestartOutcome::Rejected);
        match rx.try_recv().unwrap() {
            Action::AddNotification(n) => {
                assert_eq!(n.title, "Failure to Restart");
                assert_eq!(n.level, NotificationLevel::Error);
            }
            other => panic!("unexpected {}", other.kind()),
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_restart_emits_kill_then_launch_with_new_ref() {
        let bus = ActionBus::default();
        let store = Store::new(StateHandle::default(), bus.clone());
        let (ctx, mut rx) = EpicContext::new(bus.clone(), store.state().clone());

        let old_ref = KernelRef::new();
        let content_ref = ContentRef::new();
        store.dispatch(Action::LaunchKernelSuccessful {
            kernel: launched("python3"),
            kernel_ref: old_ref,
            content_ref,
            select_next_kernel: true,
        });

        let new_ref = KernelRef::new();
        let config = RestartConfig {
            timeout: Duration::from_secs(5),
            kernel_ref_generator: std::sync::Arc::new(move || new_ref),
        };
        let restart = tokio::spawn({
            let ctx = ctx.clone();
            async move {
                restart_kernel(
                    &ctx,
                    &config,
                    RestartRequest {
                        kernel_ref: Some(old_ref),
                        content_ref,
                        output_handling: OutputHandling::RunAll,
                    },
                )
                .await
            }
        });

        assert!(matches!(rx.recv().await.unwrap(), Action::AddNotification(n) if n.message == "Kernel python3 is restarting."));
        assert!(matches!(
            rx.recv().await.unwrap(),
            Action::KillKernel { kernel_ref, restarting: true } if kernel_ref == old_ref
        ));
        match rx.recv().await.unwrap() {
            Action::LaunchKernelByName {
                kernel_spec_name,
                cwd,
                kernel_ref,
                select_next_kernel,
                ..
            } => {
                assert_eq!(kernel_spec_name, "python3");
                assert_eq!(cwd, "/work");
                assert_eq!(kernel_ref, new_ref);
                assert!(select_next_kernel);
            }
            other => panic!("unexpected {}", other.kind()),
        }

        store.dispatch(Action::LaunchKernelSuccessful {
            kernel: launched("python3"),
            kernel_ref: new_ref,
            content_ref,
            select_next_kernel: true,
        });

        assert_eq!(
            restart.await.unwrap(),
            RestartOutcome::Succeeded { kernel_ref: new_ref }
        );
        assert!(matches!(
            rx.recv().await.unwrap(),
            Action::RestartKernelSuccessful { kernel_ref, .. } if kernel_ref == new_ref
        ));
        assert!(matches!(
            rx.recv().await.unwrap(),
            Action::ExecuteAllCells { content_ref: c } if c == content_ref
        ));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_launch_failure_fails_restart() {
        let bus = ActionBus::default();
        let store = Store::new(StateHandle::default(), bus.clone());
        let (ctx, mut rx) = EpicContext::new(bus.clone(), store.state().clone());

        let old_ref = KernelRef::new();
        let content_ref = ContentRef::new();
        store.dispatch(Action::LaunchKernelSuccessful {
            kernel: launched(""),
            kernel_ref: old_ref,
            content_ref,
            select_next_kernel: true,
        });

        let new_ref = KernelRef::new();
        let config = RestartConfig {
            timeout: Duration::from_secs(5),
            kernel_ref_generator: std::sync::Arc::new(move || new_ref),
        };
        let restart = tokio::spawn({
            let ctx = ctx.clone();
            async move {
                restart_kernel(
                    &ctx,
                    &config,
                    RestartRequest {
                        kernel_ref: Some(old_ref),
                        content_ref,
                        output_handling: OutputHandling::None,
                    },
                )
                .await
            }
        });

        assert!(matches!(rx.recv().await.unwrap(), Action::AddNotification(n) if n.message == "Kernel unknown is restarting."));
        let _kill = rx.recv().await.unwrap();
        let _launch = rx.recv().await.unwrap();

        store.dispatch(Action::LaunchKernelFailed {
            error: "spawn failed".into(),
            kernel_ref: new_ref,
            content_ref,
        });

        assert_eq!(
            restart.await.unwrap(),
            RestartOutcome::Failed { kernel_ref: new_ref }
        );
        match rx.recv().await.unwrap() {
            Action::RestartKernelFailed { error, kernel_ref, .. } => {
                assert_eq!(error, RestartError::Launch("spawn failed".into()));
                assert_eq!(kernel_ref, new_ref);
            }
            other => panic!("unexpected {}", other.kind()),
        }
    }

    #[tokio::test]
    async fn test_abort_releases_bus_subscription() {
        let bus = ActionBus::default();
        let (ctx, _rx) = EpicContext::new(bus.clone(), StateHandle::default());
        let epic = spawn_restart_kernel_epic(ctx, RestartConfig::default());
        tokio::task::yield_now().await;
        assert_eq!(bus.subscriber_count(), 1);

        epic.abort();
        assert!(epic.await.unwrap_err().is_cancelled());
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
        assert_eq!(bus.subscriber_count(), 0);
    }
}
