//! Starting and stopping kernel processes through a pluggable launcher.

use std::sync::Arc;

use async_trait::async_trait;
use log::{error, info, warn};
use tokio::task::{JoinHandle, JoinSet};

use crate::actions::Action;
use crate::epics::EpicContext;
use crate::kernel::LaunchedKernel;
use crate::notification::Notification;
use crate::refs::KernelRef;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    pub kernel_ref: KernelRef,
    pub kernel_spec_name: String,
    pub cwd: String,
}

/// Starts kernel processes and stops them again.
///
/// The launcher owns whatever it needs to shut a kernel down (process
/// handles, connection files); the coordinator only knows the `KernelRef`.
#[async_trait]
pub trait KernelLauncher: Send + Sync {
    async fn launch(&self, request: LaunchRequest) -> anyhow::Result<LaunchedKernel>;

    async fn shutdown(&self, kernel_ref: KernelRef) -> anyhow::Result<()>;
}

/// Launch a kernel for every `LaunchKernelByName`. Launches run concurrently.
pub fn spawn_launch_kernel_epic(
    ctx: EpicContext,
    launcher: Arc<dyn KernelLauncher>,
) -> JoinHandle<()> {
    let mut actions = ctx.actions.subscribe();

    tokio::spawn(async move {
        let mut launches = JoinSet::new();

        loop {
            tokio::select! {
                action = actions.next() => {
                    let Some(action) = action else { break };
                    let Action::LaunchKernelByName {
                        kernel_spec_name,
                        cwd,
                        kernel_ref,
                        content_ref,
                        select_next_kernel,
                    } = action
                    else {
                        continue;
                    };

                    let ctx = ctx.clone();
                    let launcher = launcher.clone();
                    launches.spawn(async move {
                        info!("[launch] Starting {} for {} in {}", kernel_spec_name, kernel_ref, cwd);
                        let request = LaunchRequest {
                            kernel_ref,
                            kernel_spec_name: kernel_spec_name.clone(),
                            cwd,
                        };
                        match launcher.launch(request).await {
                            Ok(kernel) => ctx.emit(Action::LaunchKernelSuccessful {
                                kernel,
                                kernel_ref,
                                content_ref,
                                select_next_kernel,
                            }),
                            Err(e) => {
                                error!("[launch] Failed to start {}: {:#}", kernel_spec_name, e);
                                ctx.emit(Action::LaunchKernelFailed {
                                    error: format!("{:#}", e),
                                    kernel_ref,
                                    content_ref,
                                });
                                ctx.emit(Action::AddNotification(Notification::error(
                                    "Kernel Launch Failed",
                                    format!("Could not start kernel {}: {}", kernel_spec_name, e),
                                )));
                            }
                        }
                    });
                }
                Some(_) = launches.join_next(), if !launches.is_empty() => {}
            }
        }

        launches.abort_all();
    })
}

/// Shut the process down for every `KillKernel`.
pub fn spawn_kill_kernel_epic(
    ctx: EpicContext,
    launcher: Arc<dyn KernelLauncher>,
) -> JoinHandle<()> {
    let mut actions = ctx.actions.subscribe();

    tokio::spawn(async move {
        let mut kills = JoinSet::new();

        loop {
            tokio::select! {
                action = actions.next() => {
                    let Some(action) = action else { break };
                    let Action::KillKernel { kernel_ref, restarting } = action else {
                        continue;
                    };

                    let ctx = ctx.clone();
                    let launcher = launcher.clone();
                    kills.spawn(async move {
                        info!("[kill] Shutting down {} (restarting: {})", kernel_ref, restarting);
                        match launcher.shutdown(kernel_ref).await {
                            Ok(()) => ctx.emit(Action::KillKernelSuccessful { kernel_ref }),
                            Err(e) => {
                                warn!("[kill] Failed to shut down {}: {:#}", kernel_ref, e);
                                ctx.emit(Action::KillKernelFailed {
                                    error: format!("{:#}", e),
                                    kernel_ref,
                                });
                            }
                        }
                    });
                }
                Some(_) = kills.join_next(), if !kills.is_empty() => {}
            }
        }

        kills.abort_all();
    })
}
