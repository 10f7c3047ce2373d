//! Host flows against a coordinator backed by in-memory kernels.
//!
//! Tests that change XDG_CONFIG_HOME are marked with `#[serial]`.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use kernel_lifecycle::message::{KERNEL_INFO_REPLY, KERNEL_INFO_REQUEST, STATUS};
use kernel_lifecycle::{
    Coordinator, KernelChannel, KernelLauncher, KernelRef, KernelSide, LaunchRequest,
    LaunchedKernel, LogNotificationSink, OutputHandling, ProtocolMessage,
};
use notebook::settings::{load_settings, save_settings, settings_path};
use notebook::{HostEnvironment, Settings};
use serde_json::json;
use serial_test::serial;
use tempfile::TempDir;

const WAIT: Duration = Duration::from_secs(5);

#[derive(Default)]
struct FakeLauncher {
    fail: bool,
    launched: Mutex<Vec<LaunchRequest>>,
    stopped: Mutex<Vec<KernelRef>>,
}

#[async_trait]
impl KernelLauncher for FakeLauncher {
    async fn launch(&self, request: LaunchRequest) -> anyhow::Result<LaunchedKernel> {
        self.launched.lock().unwrap().push(request.clone());
        if self.fail {
            anyhow::bail!("No such kernel: {}", request.kernel_spec_name);
        }
        let (channel, side) = KernelChannel::pair(64);
        tokio::spawn(answer_kernel_info(side));
        Ok(LaunchedKernel {
            channel,
            kernel_spec_name: request.kernel_spec_name,
            cwd: request.cwd,
        })
    }

    async fn shutdown(&self, kernel_ref: KernelRef) -> anyhow::Result<()> {
        self.stopped.lock().unwrap().push(kernel_ref);
        Ok(())
    }
}

async fn answer_kernel_info(mut side: KernelSide) {
    while let Some(request) = side.outbound.recv().await {
        if request.header_type != KERNEL_INFO_REQUEST {
            continue;
        }
        tokio::task::yield_now().await;
        side.inbound.deliver(ProtocolMessage::child_of(
            &request,
            KERNEL_INFO_REPLY,
            json!({
                "implementation": "fake",
                "language_info": {"name": "python", "version": "3.12"}
            }),
        ));
        side.inbound.deliver(ProtocolMessage::child_of(
            &request,
            STATUS,
            json!({"execution_state": "idle"}),
        ));
    }
}

fn start(launcher: FakeLauncher) -> (Coordinator, Arc<FakeLauncher>) {
    let launcher = Arc::new(launcher);
    let coordinator = Coordinator::start(
        Settings::default().coordinator_config(),
        launcher.clone(),
        Arc::new(LogNotificationSink),
    );
    (coordinator, launcher)
}

#[tokio::test]
async fn test_open_notebook_returns_ready_session() {
    let (coordinator, launcher) = start(FakeLauncher::default());
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("report.ipynb");
    std::fs::write(
        &path,
        json!({
            "cells": [],
            "metadata": {"kernelspec": {"name": "python3", "display_name": "Python 3"}},
            "nbformat": 4,
            "nbformat_minor": 5
        })
        .to_string(),
    )
    .unwrap();

    let session = notebook::open(&coordinator, path.to_str().unwrap(), WAIT)
        .await
        .unwrap()
        .expect("notebooks get a kernel");

    let kernel = coordinator.state().kernel(&session.kernel_ref).unwrap();
    assert_eq!(kernel.kernel_spec_name, "python3");
    assert_eq!(kernel.cwd, dir.path().to_str().unwrap());
    assert!(notebook::describe(&kernel).starts_with("python3 (python 3.12)"));
    assert_eq!(launcher.launched.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_open_plain_file_has_no_kernel() {
    let (coordinator, launcher) = start(FakeLauncher::default());
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("notes.txt");
    std::fs::write(&path, "hello").unwrap();

    let session = notebook::open(&coordinator, path.to_str().unwrap(), WAIT)
        .await
        .unwrap();

    assert!(session.is_none());
    assert!(launcher.launched.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_open_missing_file_fails() {
    let (coordinator, _launcher) = start(FakeLauncher::default());
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("absent.ipynb");

    let result = notebook::open(&coordinator, path.to_str().unwrap(), WAIT).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_new_notebook_reports_launch_failure() {
    let (coordinator, _launcher) = start(FakeLauncher {
        fail: true,
        ..Default::default()
    });

    let err = notebook::new_notebook(&coordinator, "julia-1.10", WAIT)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("julia-1.10"));
}

#[tokio::test]
async fn test_restart_then_shutdown() {
    let (coordinator, launcher) = start(FakeLauncher::default());

    let session = notebook::new_notebook(&coordinator, "python3", WAIT)
        .await
        .unwrap();
    let restarted = notebook::restart(&coordinator, session, OutputHandling::None, WAIT)
        .await
        .unwrap();

    assert_eq!(restarted.content_ref, session.content_ref);
    assert_ne!(restarted.kernel_ref, session.kernel_ref);
    let content = coordinator.state().content(&session.content_ref).unwrap();
    assert_eq!(content.kernel_ref, Some(restarted.kernel_ref));

    notebook::shutdown(&coordinator, restarted, WAIT)
        .await
        .unwrap();
    assert_eq!(
        *launcher.stopped.lock().unwrap(),
        vec![session.kernel_ref, restarted.kernel_ref]
    );
    assert!(coordinator.state().kernel(&restarted.kernel_ref).is_none());
}

#[tokio::test]
async fn test_restart_unknown_kernel_fails() {
    let (coordinator, _launcher) = start(FakeLauncher::default());
    let session = notebook::Session {
        content_ref: Default::default(),
        kernel_ref: KernelRef::new(),
    };

    let err = notebook::restart(&coordinator, session, OutputHandling::RunAll, WAIT)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Unable to restart kernel"));
}

#[cfg(target_os = "linux")]
#[test]
#[serial]
fn test_settings_follow_config_home() {
    let dir = TempDir::new().unwrap();
    let original = std::env::var("XDG_CONFIG_HOME").ok();
    std::env::set_var("XDG_CONFIG_HOME", dir.path());

    let path = settings_path();
    let saved = Settings {
        host: HostEnvironment::Server,
        ..Default::default()
    };
    save_settings(&saved).unwrap();
    let loaded = load_settings();

    match original {
        Some(value) => std::env::set_var("XDG_CONFIG_HOME", value),
        None => std::env::remove_var("XDG_CONFIG_HOME"),
    }

    assert_eq!(path, dir.path().join("nteract").join("settings.json"));
    assert_eq!(loaded, saved);
}
