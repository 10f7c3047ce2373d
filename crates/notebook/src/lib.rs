//! Terminal host for nteract kernel lifecycles.
//!
//! Wires a [`kernel_lifecycle::Coordinator`] to the ZeroMQ launcher and
//! exposes the flows the CLI drives: open a file, create a notebook, restart
//! or shut down its kernel.

pub mod session;
pub mod settings;

pub use session::{describe, new_notebook, open, restart, shutdown, Session};
pub use settings::{load_settings, save_settings, settings_path, HostEnvironment, Settings};
