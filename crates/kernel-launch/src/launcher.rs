//! Kernel processes over ZeroMQ, discovered through installed kernelspecs.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use jupyter_protocol::{ConnectionInfo, JupyterMessage, KernelInfoRequest, ShutdownRequest};
use kernel_lifecycle::channel::{InboundSender, OutboundReceiver, DEFAULT_CHANNEL_CAPACITY};
use kernel_lifecycle::{KernelChannel, KernelLauncher, KernelRef, LaunchRequest, LaunchedKernel};
use log::{debug, error, info, warn};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::message::{from_jupyter, to_jupyter};

/// How long a new kernel gets to answer its first `kernel_info_request`.
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(30);

struct RunningKernel {
    connection_info: ConnectionInfo,
    connection_file: PathBuf,
    session_id: String,
    tasks: Vec<JoinHandle<()>>,
    inbound: Option<InboundSender>,
    process: tokio::process::Child,
    #[cfg(unix)]
    process_group_id: Option<i32>,
}

/// Launches kernels from installed kernelspecs and bridges their iopub and
/// shell sockets onto a `KernelChannel`.
pub struct ZmqKernelLauncher {
    channel_capacity: usize,
    startup_timeout: Duration,
    running: Mutex<HashMap<KernelRef, RunningKernel>>,
}

impl Default for ZmqKernelLauncher {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY, DEFAULT_STARTUP_TIMEOUT)
    }
}

impl ZmqKernelLauncher {
    pub fn new(channel_capacity: usize, startup_timeout: Duration) -> Self {
        Self {
            channel_capacity,
            startup_timeout,
            running: Mutex::new(HashMap::new()),
        }
    }

    /// Number of kernel processes this launcher still owns.
    pub fn running_count(&self) -> usize {
        self.running.lock().map(|r| r.len()).unwrap_or_default()
    }

    async fn start(&self, request: &LaunchRequest) -> Result<(RunningKernel, LaunchedKernel)> {
        let kernelspec = runtimelib::find_kernelspec(&request.kernel_spec_name).await?;

        let ip = IpAddr::V4(Ipv4Addr::LOCALHOST);
        let ports = runtimelib::peek_ports(ip, 5).await?;
        let connection_info = loopback_connection(ip, &ports, &request.kernel_spec_name)?;

        let runtime_dir = runtimelib::dirs::runtime_dir();
        tokio::fs::create_dir_all(&runtime_dir).await?;

        let kernel_id: String =
            petname::petname(2, "-").unwrap_or_else(|| Uuid::new_v4().to_string());
        let connection_file = runtime_dir.join(format!("nteract-kernel-{}.json", kernel_id));
        tokio::fs::write(
            &connection_file,
            serde_json::to_string_pretty(&connection_info)?,
        )
        .await?;

        info!(
            "[kernel-launch] Starting {} in {} at {:?}",
            request.kernel_spec_name, request.cwd, connection_file
        );

        let mut cmd =
            kernelspec.command(&connection_file, Some(Stdio::null()), Some(Stdio::null()))?;
        cmd.current_dir(&request.cwd);

        #[cfg(unix)]
        cmd.process_group(0);

        let process = cmd.kill_on_drop(true).spawn()?;

        let mut running = RunningKernel {
            connection_info,
            connection_file,
            session_id: Uuid::new_v4().to_string(),
            tasks: Vec::new(),
            inbound: None,
            #[cfg(unix)]
            process_group_id: process.id().map(|pid| pid as i32),
            process,
        };

        match self.connect(&mut running).await {
            Ok(channel) => {
                info!("[kernel-launch] Kernel {} is alive", kernel_id);
                let launched = LaunchedKernel {
                    channel,
                    kernel_spec_name: request.kernel_spec_name.clone(),
                    cwd: request.cwd.clone(),
                };
                Ok((running, launched))
            }
            Err(e) => {
                error!("[kernel-launch] Kernel {} failed to come up: {}", kernel_id, e);
                stop(running).await;
                Err(e)
            }
        }
    }

    /// Open iopub and shell, check the kernel answers, then start bridging.
    async fn connect(&self, running: &mut RunningKernel) -> Result<KernelChannel> {
        tokio::time::sleep(Duration::from_millis(500)).await;

        let ci = &running.connection_info;
        let mut iopub =
            runtimelib::create_client_iopub_connection(ci, "", &running.session_id).await?;

        let identity = runtimelib::peer_identity_for_session(&running.session_id)?;
        let mut shell = runtimelib::create_client_shell_connection_with_identity(
            ci,
            &running.session_id,
            identity,
        )
        .await?;

        let request: JupyterMessage = KernelInfoRequest::default().into();
        shell.send(request).await?;
        let reply = tokio::time::timeout(self.startup_timeout, shell.read())
            .await
            .map_err(|_| {
                anyhow!(
                    "Kernel did not answer kernel_info within {}s",
                    self.startup_timeout.as_secs()
                )
            })?
            .map_err(|e| anyhow!("Kernel did not answer kernel_info: {}", e))?;
        debug!("[kernel-launch] Liveness check got {}", reply.header.msg_type);

        let (channel, side) = KernelChannel::pair(self.channel_capacity);
        let closer = side.inbound.clone();
        let (mut shell_writer, mut shell_reader) = shell.split();

        let inbound = side.inbound.clone();
        let iopub_task = tokio::spawn(async move {
            loop {
                match iopub.read().await {
                    Ok(message) => deliver(&inbound, &message),
                    Err(e) => {
                        error!("[kernel-launch] iopub read error: {}", e);
                        inbound.close(Some(e.to_string()));
                        break;
                    }
                }
            }
        });

        let inbound = side.inbound;
        let shell_reader_task = tokio::spawn(async move {
            loop {
                match shell_reader.read().await {
                    Ok(message) => deliver(&inbound, &message),
                    Err(e) => {
                        error!("[kernel-launch] shell read error: {}", e);
                        inbound.close(Some(e.to_string()));
                        break;
                    }
                }
            }
        });

        let mut outbound: OutboundReceiver = side.outbound;
        let shell_writer_task = tokio::spawn(async move {
            while let Some(message) = outbound.recv().await {
                let wire = match to_jupyter(&message) {
                    Ok(wire) => wire,
                    Err(e) => {
                        warn!("[kernel-launch] Dropping {}: {}", message.header_type, e);
                        continue;
                    }
                };
                if let Err(e) = shell_writer.send(wire).await {
                    error!("[kernel-launch] shell send error: {}", e);
                    break;
                }
            }
        });

        running.tasks = vec![iopub_task, shell_reader_task, shell_writer_task];
        running.inbound = Some(closer);
        Ok(channel)
    }
}

/// Connection info for a kernel listening on `ports` (stdin, control, hb,
/// shell, iopub) at `ip`, signed with a fresh key.
fn loopback_connection(ip: IpAddr, ports: &[u16], kernel_name: &str) -> Result<ConnectionInfo> {
    let &[stdin_port, control_port, hb_port, shell_port, iopub_port] = ports else {
        return Err(anyhow!("Expected 5 ports, got {}", ports.len()));
    };
    Ok(ConnectionInfo {
        transport: jupyter_protocol::connection_info::Transport::TCP,
        ip: ip.to_string(),
        stdin_port,
        control_port,
        hb_port,
        shell_port,
        iopub_port,
        signature_scheme: "hmac-sha256".to_string(),
        key: Uuid::new_v4().to_string(),
        kernel_name: Some(kernel_name.to_string()),
    })
}

fn deliver(inbound: &InboundSender, message: &JupyterMessage) {
    match from_jupyter(message) {
        Ok(message) => inbound.deliver(message),
        Err(e) => warn!(
            "[kernel-launch] Skipping {}: {}",
            message.header.msg_type, e
        ),
    }
}

/// Ask the kernel to shut down, then make sure its process group is gone.
async fn stop(mut running: RunningKernel) {
    for task in running.tasks.drain(..) {
        task.abort();
    }
    if let Some(inbound) = running.inbound.take() {
        inbound.close(None);
    }

    match runtimelib::create_client_control_connection(
        &running.connection_info,
        &running.session_id,
    )
    .await
    {
        Ok(mut control) => {
            let request: JupyterMessage = ShutdownRequest { restart: false }.into();
            if let Err(e) = control.send(request).await {
                debug!("[kernel-launch] shutdown_request not delivered: {}", e);
            }
        }
        Err(e) => debug!("[kernel-launch] No control connection: {}", e),
    }

    #[cfg(unix)]
    if let Some(pgid) = running.process_group_id.take() {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;
        if let Err(e) = killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
            if e != nix::errno::Errno::ESRCH {
                error!("[kernel-launch] Failed to kill process group {}: {}", pgid, e);
            }
        }
    }

    if let Err(e) = running.process.start_kill() {
        debug!("[kernel-launch] Process already gone: {}", e);
    }

    if let Err(e) = tokio::fs::remove_file(&running.connection_file).await {
        debug!(
            "[kernel-launch] Could not remove {:?}: {}",
            running.connection_file, e
        );
    }
}

#[async_trait]
impl KernelLauncher for ZmqKernelLauncher {
    async fn launch(&self, request: LaunchRequest) -> Result<LaunchedKernel> {
        let (running, launched) = self.start(&request).await?;
        let replaced = self
            .running
            .lock()
            .map_err(|_| anyhow!("Kernel table poisoned"))?
            .insert(request.kernel_ref, running);
        if let Some(previous) = replaced {
            warn!("[kernel-launch] {} launched twice, stopping the older kernel", request.kernel_ref);
            stop(previous).await;
        }
        Ok(launched)
    }

    async fn shutdown(&self, kernel_ref: KernelRef) -> Result<()> {
        let running = self
            .running
            .lock()
            .map_err(|_| anyhow!("Kernel table poisoned"))?
            .remove(&kernel_ref)
            .ok_or_else(|| anyhow!("No running kernel for {}", kernel_ref))?;

        info!("[kernel-launch] Shutting down {}", kernel_ref);
        stop(running).await;
        Ok(())
    }
}
