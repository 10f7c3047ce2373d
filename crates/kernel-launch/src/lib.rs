//! Kernel launching for nteract.
//!
//! [`ZmqKernelLauncher`] finds an installed kernelspec, writes a connection
//! file to the Jupyter runtime directory, spawns the kernel in the requested
//! working directory, and bridges its iopub and shell sockets onto a
//! [`kernel_lifecycle::KernelChannel`].
//!
//! ```ignore
//! use std::sync::Arc;
//! use kernel_launch::ZmqKernelLauncher;
//! use kernel_lifecycle::{Coordinator, CoordinatorConfig, LogNotificationSink};
//!
//! let coordinator = Coordinator::start(
//!     CoordinatorConfig::default(),
//!     Arc::new(ZmqKernelLauncher::default()),
//!     Arc::new(LogNotificationSink),
//! );
//! ```

pub mod launcher;
pub mod message;

pub use launcher::{ZmqKernelLauncher, DEFAULT_STARTUP_TIMEOUT};
pub use message::{from_jupyter, to_jupyter, ConversionError};
