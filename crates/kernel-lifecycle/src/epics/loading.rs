//! Loading content from disk, creating new notebooks, and launching the
//! kernel a notebook asks for.

use std::time::Duration;

use log::{debug, info, warn};
use tokio::task::{JoinHandle, JoinSet};

use crate::actions::{Action, NewKernelSpec};
use crate::content::{load_content, ContentModel};
use crate::epics::EpicContext;
use crate::error::FetchError;
use crate::notebook::{extract_new_kernel, CwdProvider, Notebook};
use crate::refs::{ContentRef, KernelRef};

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq)]
pub struct LoadingConfig {
    pub cwd_provider: CwdProvider,
    pub fetch_timeout: Duration,
}

impl Default for LoadingConfig {
    fn default() -> Self {
        Self {
            cwd_provider: CwdProvider::default(),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }
}

/// Load content for every `FetchContent`. A newer fetch cancels one still in
/// flight, so the last request wins.
pub fn spawn_fetch_content_epic(ctx: EpicContext, config: LoadingConfig) -> JoinHandle<()> {
    let mut actions = ctx.actions.subscribe();

    tokio::spawn(async move {
        let mut in_flight = JoinSet::new();

        loop {
            tokio::select! {
                action = actions.next() => {
                    let Some(action) = action else { break };
                    let Action::FetchContent { filepath, kernel_ref, content_ref } = action else {
                        continue;
                    };

                    let Some(filepath) = filepath.filter(|p| !p.is_empty()) else {
                        warn!("[loading] Fetch for {} has no path", content_ref);
                        ctx.emit(Action::FetchContentFailed {
                            filepath: None,
                            error: FetchError::MissingPath,
                            kernel_ref,
                            content_ref,
                        });
                        continue;
                    };

                    in_flight.abort_all();
                    in_flight.spawn(fetch(
                        ctx.clone(),
                        config.fetch_timeout,
                        filepath,
                        kernel_ref,
                        content_ref,
                    ));
                }
                Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
            }
        }

        in_flight.abort_all();
    })
}

async fn fetch(
    ctx: EpicContext,
    fetch_timeout: Duration,
    filepath: String,
    kernel_ref: KernelRef,
    content_ref: ContentRef,
) {
    debug!("[loading] Reading {}", filepath);
    let result = match tokio::time::timeout(fetch_timeout, load_content(&filepath)).await {
        Ok(result) => result,
        Err(_) => Err(FetchError::Timeout(fetch_timeout)),
    };

    match result {
        Ok(model) => {
            info!("[loading] Loaded {} ({})", filepath, model.kind());
            ctx.emit(Action::FetchContentFulfilled {
                filepath,
                model,
                kernel_ref,
                content_ref,
            });
        }
        Err(error) => {
            warn!("[loading] Failed to load {}: {}", filepath, error);
            ctx.emit(Action::FetchContentFailed {
                filepath: Some(filepath),
                error,
                kernel_ref,
                content_ref,
            });
        }
    }
}

/// Build the one-cell notebook a `NewNotebook` asks for.
pub fn new_notebook(kernel_spec: &NewKernelSpec) -> Notebook {
    let mut notebook = Notebook::monocell();
    if let Some(name) = kernel_spec.name.as_deref().filter(|n| !n.is_empty()) {
        notebook.set_metadata(&["kernel_info", "name"], name.into());
    }
    if let Some(spec) = &kernel_spec.spec {
        notebook.set_metadata(&["kernelspec"], spec.clone());
    }
    notebook
}

pub fn spawn_new_notebook_epic(ctx: EpicContext) -> JoinHandle<()> {
    let mut actions = ctx.actions.subscribe();

    tokio::spawn(async move {
        while let Some(action) = actions.next().await {
            let Action::NewNotebook {
                kernel_spec,
                kernel_ref,
                content_ref,
            } = action
            else {
                continue;
            };

            ctx.emit(Action::SetNotebook {
                filepath: None,
                notebook: new_notebook(&kernel_spec),
                kernel_ref,
                content_ref,
            });
        }
    })
}

/// Launch a kernel for every notebook that finishes loading. Other content
/// kinds need no kernel.
pub fn spawn_launch_kernel_when_fetched_epic(
    ctx: EpicContext,
    cwd_provider: CwdProvider,
) -> JoinHandle<()> {
    let mut actions = ctx.actions.subscribe();

    tokio::spawn(async move {
        while let Some(action) = actions.next().await {
            let Action::FetchContentFulfilled {
                kernel_ref,
                content_ref,
                ..
            } = action
            else {
                continue;
            };

            let Some(content) = ctx.state.content(&content_ref) else {
                debug!("[loading] {} vanished before launch", content_ref);
                continue;
            };
            let ContentModel::Notebook { notebook } = &content.model else {
                continue;
            };

            let new_kernel = extract_new_kernel(content.filepath.as_deref(), notebook, &cwd_provider);
            ctx.emit(Action::LaunchKernelByName {
                kernel_spec_name: new_kernel.kernel_spec_name,
                cwd: new_kernel.cwd,
                kernel_ref,
                content_ref,
                select_next_kernel: true,
            });
        }
    })
}

pub fn spawn_launch_kernel_when_notebook_set_epic(
    ctx: EpicContext,
    cwd_provider: CwdProvider,
) -> JoinHandle<()> {
    let mut actions = ctx.actions.subscribe();

    tokio::spawn(async move {
        while let Some(action) = actions.next().await {
            let Action::SetNotebook {
                filepath,
                notebook,
                kernel_ref,
                content_ref,
            } = action
            else {
                continue;
            };

            let new_kernel = extract_new_kernel(filepath.as_deref(), &notebook, &cwd_provider);
            ctx.emit(Action::LaunchKernelByName {
                kernel_spec_name: new_kernel.kernel_spec_name,
                cwd: new_kernel.cwd,
                kernel_ref,
                content_ref,
                select_next_kernel: true,
            });
        }
    })
}
