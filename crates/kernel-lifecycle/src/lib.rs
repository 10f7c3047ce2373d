//! Event-driven kernel lifecycle coordination for notebook clients.
//!
//! Everything happens on one ordered action stream. The host dispatches
//! actions (open a file, restart a kernel) into a [`Coordinator`]; the
//! coordinator's epics react by launching kernels, performing the
//! `kernel_info` handshake, tracking execution state, and orchestrating
//! restarts, emitting follow-up actions that the store reduces into the
//! kernel and content registries.
//!
//! Kernel processes are started by a [`KernelLauncher`] supplied by the host.

pub mod actions;
pub mod channel;
pub mod content;
pub mod coordinator;
pub mod epics;
pub mod error;
pub mod kernel;
pub mod message;
pub mod notebook;
pub mod notification;
pub mod refs;
pub mod state;
pub mod store;

pub use actions::{Action, NewKernelSpec, OutputHandling};
pub use channel::{KernelChannel, KernelSide, MessageStream};
pub use content::{ContentModel, ContentRecord};
pub use coordinator::{Coordinator, CoordinatorConfig};
pub use epics::{KernelLauncher, LaunchRequest};
pub use error::{ChannelError, FetchError, RestartError};
pub use kernel::{KernelInfo, KernelRecord, KernelStatus, LaunchedKernel};
pub use message::ProtocolMessage;
pub use notebook::{extract_new_kernel, CwdProvider, NewKernel, Notebook};
pub use notification::{LogNotificationSink, Notification, NotificationLevel, NotificationSink};
pub use refs::{ContentRef, KernelRef, KernelRefGenerator};
pub use state::{AppState, StateHandle};
pub use store::{ActionBus, ActionStream, Store};
