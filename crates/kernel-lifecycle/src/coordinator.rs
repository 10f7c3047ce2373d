//! Runtime that owns the store and every epic.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use tokio::task::JoinHandle;

use crate::actions::Action;
use crate::channel::DEFAULT_CHANNEL_CAPACITY;
use crate::epics::{
    spawn_acquire_kernel_info_epic, spawn_fetch_content_epic, spawn_kill_kernel_epic,
    spawn_launch_kernel_epic, spawn_launch_kernel_when_fetched_epic,
    spawn_launch_kernel_when_notebook_set_epic, spawn_new_notebook_epic,
    spawn_restart_kernel_epic, spawn_watch_execution_state_epic, EpicContext, KernelLauncher,
    LoadingConfig, RestartConfig, DEFAULT_FETCH_TIMEOUT, DEFAULT_RESTART_TIMEOUT,
};
use crate::notebook::CwdProvider;
use crate::notification::NotificationSink;
use crate::refs::{default_kernel_ref_generator, KernelRefGenerator};
use crate::state::StateHandle;
use crate::store::{ActionBus, ActionStream, Store, DEFAULT_BUS_CAPACITY};

/// Configuration for the coordinator.
#[derive(Clone)]
pub struct CoordinatorConfig {
    /// How long a restarted kernel has to report a successful launch.
    pub restart_timeout: Duration,
    /// How long reading content from disk may take.
    pub fetch_timeout: Duration,
    /// Buffered actions per subscriber before it starts skipping.
    pub bus_capacity: usize,
    /// Buffered inbound messages per kernel channel subscriber. Passed on to
    /// launchers; the coordinator itself never creates channels.
    pub channel_capacity: usize,
    /// Working directory for kernels whose content has no path.
    pub cwd_provider: CwdProvider,
    /// Mints refs for restarted kernels.
    pub kernel_ref_generator: KernelRefGenerator,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            restart_timeout: DEFAULT_RESTART_TIMEOUT,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            bus_capacity: DEFAULT_BUS_CAPACITY,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            cwd_provider: CwdProvider::default(),
            kernel_ref_generator: default_kernel_ref_generator(),
        }
    }
}

impl std::fmt::Debug for CoordinatorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoordinatorConfig")
            .field("restart_timeout", &self.restart_timeout)
            .field("fetch_timeout", &self.fetch_timeout)
            .field("bus_capacity", &self.bus_capacity)
            .field("channel_capacity", &self.channel_capacity)
            .field("cwd_provider", &self.cwd_provider)
            .finish_non_exhaustive()
    }
}

pub struct Coordinator {
    store: Store,
    tasks: Vec<JoinHandle<()>>,
}

impl Coordinator {
    /// Build the store and spawn every epic. Must be called inside a tokio
    /// runtime.
    pub fn start(
        config: CoordinatorConfig,
        launcher: Arc<dyn KernelLauncher>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        let store = Store::new(StateHandle::default(), ActionBus::new(config.bus_capacity));
        let (ctx, mut output) = EpicContext::new(store.bus().clone(), store.state().clone());

        let mut notifications = store.bus().subscribe();
        let notifier = tokio::spawn(async move {
            while let Some(action) = notifications.next().await {
                if let Action::AddNotification(notification) = action {
                    sink.add_notification(&notification);
                }
            }
        });

        let loading = LoadingConfig {
            cwd_provider: config.cwd_provider.clone(),
            fetch_timeout: config.fetch_timeout,
        };
        let restart = RestartConfig {
            timeout: config.restart_timeout,
            kernel_ref_generator: config.kernel_ref_generator.clone(),
        };

        let mut tasks = vec![
            notifier,
            spawn_watch_execution_state_epic(ctx.clone()),
            spawn_acquire_kernel_info_epic(ctx.clone()),
            spawn_launch_kernel_epic(ctx.clone(), launcher.clone()),
            spawn_kill_kernel_epic(ctx.clone(), launcher),
            spawn_fetch_content_epic(ctx.clone(), loading),
            spawn_new_notebook_epic(ctx.clone()),
            spawn_launch_kernel_when_fetched_epic(ctx.clone(), config.cwd_provider.clone()),
            spawn_launch_kernel_when_notebook_set_epic(ctx.clone(), config.cwd_provider),
            spawn_restart_kernel_epic(ctx, restart),
        ];

        let pump_store = store.clone();
        tasks.push(tokio::spawn(async move {
            while let Some(batch) = output.recv_batch().await {
                pump_store.dispatch_all(batch);
            }
            debug!("[coordinator] Output pump stopped");
        }));

        info!("[coordinator] Started {} tasks", tasks.len());
        Self { store, tasks }
    }

    /// Feed an action from the host into the store.
    pub fn dispatch(&self, action: Action) {
        self.store.dispatch(action);
    }

    pub fn state(&self) -> &StateHandle {
        self.store.state()
    }

    /// Observe every action from now on, including those epics emit.
    pub fn subscribe(&self) -> ActionStream {
        self.store.bus().subscribe()
    }

    /// Stop every epic. In-flight launches and restarts are abandoned.
    pub fn shutdown(self) {
        for task in &self.tasks {
            task.abort();
        }
        info!("[coordinator] Shut down");
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}
