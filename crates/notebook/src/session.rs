//! Host-side flows that drive the coordinator: open a file, create a
//! notebook, restart its kernel, shut it down.

use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use kernel_lifecycle::{
    Action, ActionStream, ContentRef, Coordinator, KernelRecord, KernelRef, NewKernelSpec,
    OutputHandling,
};
use log::info;
use serde_json::json;

/// A piece of content and the kernel serving it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    pub content_ref: ContentRef,
    pub kernel_ref: KernelRef,
}

enum Waited<T> {
    Done(T),
    Failed(String),
}

async fn wait<T>(
    stream: &mut ActionStream,
    timeout: Duration,
    mut pick: impl FnMut(&Action) -> Option<Waited<T>>,
) -> Result<T> {
    let picked = tokio::time::timeout(timeout, stream.next_matching(|a| pick(a)))
        .await
        .map_err(|_| anyhow!("Timed out after {}s", timeout.as_secs()))?
        .ok_or_else(|| anyhow!("Coordinator stopped"))?;
    match picked {
        Waited::Done(value) => Ok(value),
        Waited::Failed(reason) => bail!(reason),
    }
}

/// Wait until `kernel_ref` has finished its handshake.
async fn wait_ready(stream: &mut ActionStream, kernel_ref: KernelRef, timeout: Duration) -> Result<()> {
    wait(stream, timeout, |a| match a {
        Action::SetKernelInfo { kernel_ref: k, .. } if *k == kernel_ref => Some(Waited::Done(())),
        Action::LaunchKernelFailed {
            kernel_ref: k,
            error,
            ..
        } if *k == kernel_ref => Some(Waited::Failed(error.clone())),
        _ => None,
    })
    .await
}

/// Load `path` and, for notebooks, wait for its kernel to be ready.
///
/// Returns `None` for content that needs no kernel.
pub async fn open(coordinator: &Coordinator, path: &str, timeout: Duration) -> Result<Option<Session>> {
    let content_ref = ContentRef::new();
    let kernel_ref = KernelRef::new();
    let mut stream = coordinator.subscribe();

    coordinator.dispatch(Action::FetchContent {
        filepath: Some(path.to_string()),
        kernel_ref,
        content_ref,
    });

    let is_notebook = wait(&mut stream, timeout, |a| match a {
        Action::FetchContentFulfilled {
            content_ref: c,
            model,
            ..
        } if *c == content_ref => Some(Waited::Done(model.as_notebook().is_some())),
        Action::FetchContentFailed {
            content_ref: c,
            error,
            ..
        } if *c == content_ref => Some(Waited::Failed(error.to_string())),
        _ => None,
    })
    .await?;

    if !is_notebook {
        info!("[session] {} has no kernel", path);
        return Ok(None);
    }

    wait_ready(&mut stream, kernel_ref, timeout).await?;
    Ok(Some(Session {
        content_ref,
        kernel_ref,
    }))
}

/// Create an in-memory notebook for `kernel_name` and wait for its kernel.
pub async fn new_notebook(
    coordinator: &Coordinator,
    kernel_name: &str,
    timeout: Duration,
) -> Result<Session> {
    let session = Session {
        content_ref: ContentRef::new(),
        kernel_ref: KernelRef::new(),
    };
    let mut stream = coordinator.subscribe();

    coordinator.dispatch(Action::NewNotebook {
        kernel_spec: NewKernelSpec {
            name: Some(kernel_name.to_string()),
            spec: Some(json!({ "name": kernel_name, "display_name": kernel_name })),
        },
        kernel_ref: session.kernel_ref,
        content_ref: session.content_ref,
    });

    wait_ready(&mut stream, session.kernel_ref, timeout).await?;
    Ok(session)
}

/// Restart the kernel serving `session` and return the session with its new
/// kernel.
pub async fn restart(
    coordinator: &Coordinator,
    session: Session,
    output_handling: OutputHandling,
    timeout: Duration,
) -> Result<Session> {
    let mut stream = coordinator.subscribe();
    coordinator.dispatch(Action::RestartKernel {
        kernel_ref: Some(session.kernel_ref),
        content_ref: session.content_ref,
        output_handling,
    });

    let content_ref = session.content_ref;
    let kernel_ref = wait(&mut stream, timeout, |a| match a {
        Action::RestartKernelSuccessful {
            kernel_ref,
            content_ref: c,
        } if *c == content_ref => Some(Waited::Done(*kernel_ref)),
        Action::RestartKernelFailed {
            error,
            content_ref: c,
            ..
        } if *c == content_ref => Some(Waited::Failed(error.to_string())),
        Action::AddNotification(n) if n.title == "Failure to Restart" => {
            Some(Waited::Failed(n.message.clone()))
        }
        _ => None,
    })
    .await?;

    Ok(Session {
        content_ref,
        kernel_ref,
    })
}

/// Kill the session's kernel and wait for the process to be gone.
pub async fn shutdown(coordinator: &Coordinator, session: Session, timeout: Duration) -> Result<()> {
    let mut stream = coordinator.subscribe();
    coordinator.dispatch(Action::KillKernel {
        kernel_ref: session.kernel_ref,
        restarting: false,
    });

    wait(&mut stream, timeout, |a| match a {
        Action::KillKernelSuccessful { kernel_ref } if *kernel_ref == session.kernel_ref => {
            Some(Waited::Done(()))
        }
        Action::KillKernelFailed { kernel_ref, error } if *kernel_ref == session.kernel_ref => {
            Some(Waited::Failed(error.clone()))
        }
        _ => None,
    })
    .await
}

/// One-line summary of a kernel for the terminal.
pub fn describe(kernel: &KernelRecord) -> String {
    let language = kernel
        .info
        .as_ref()
        .map(|info| format!("{} {}", info.language_name, info.language_version))
        .unwrap_or_else(|| "unknown language".to_string());
    format!(
        "{} ({}) [{}] in {} - {}",
        kernel.kernel_spec_name,
        language.trim(),
        kernel.status,
        kernel.cwd,
        kernel.kernel_ref
    )
}
