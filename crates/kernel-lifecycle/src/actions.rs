//! Actions flowing through the shared event stream.
//!
//! Inbound actions come from the host (UI, file loading, launcher); the
//! coordinator's epics react to them and emit follow-up actions.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::content::ContentModel;
use crate::error::{FetchError, RestartError};
use crate::kernel::{KernelInfo, LaunchedKernel};
use crate::notebook::Notebook;
use crate::notification::Notification;
use crate::refs::{ContentRef, KernelRef};

/// What to do with existing outputs once a restarted kernel is ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputHandling {
    #[default]
    None,
    #[serde(rename = "Clear Only")]
    ClearOnly,
    #[serde(rename = "Run All")]
    RunAll,
}

/// Kernelspec requested for a brand new notebook.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewKernelSpec {
    pub name: Option<String>,
    /// Full kernelspec object written to `metadata.kernelspec`.
    pub spec: Option<Value>,
}

#[derive(Debug, Clone)]
pub enum Action {
    FetchContent {
        filepath: Option<String>,
        kernel_ref: KernelRef,
        content_ref: ContentRef,
    },
    FetchContentFulfilled {
        filepath: String,
        model: ContentModel,
        kernel_ref: KernelRef,
        content_ref: ContentRef,
    },
    FetchContentFailed {
        filepath: Option<String>,
        error: FetchError,
        kernel_ref: KernelRef,
        content_ref: ContentRef,
    },
    NewNotebook {
        kernel_spec: NewKernelSpec,
        kernel_ref: KernelRef,
        content_ref: ContentRef,
    },
    SetNotebook {
        filepath: Option<String>,
        notebook: Notebook,
        kernel_ref: KernelRef,
        content_ref: ContentRef,
    },
    LaunchKernelByName {
        kernel_spec_name: String,
        cwd: String,
        kernel_ref: KernelRef,
        content_ref: ContentRef,
        select_next_kernel: bool,
    },
    LaunchKernelSuccessful {
        kernel: LaunchedKernel,
        kernel_ref: KernelRef,
        content_ref: ContentRef,
        select_next_kernel: bool,
    },
    LaunchKernelFailed {
        error: String,
        kernel_ref: KernelRef,
        content_ref: ContentRef,
    },
    SetExecutionState {
        kernel_ref: KernelRef,
        kernel_status: String,
    },
    SetLanguageInfo {
        kernel_ref: KernelRef,
        content_ref: ContentRef,
        lang_info: Value,
    },
    SetKernelInfo {
        kernel_ref: KernelRef,
        info: KernelInfo,
    },
    RestartKernel {
        kernel_ref: Option<KernelRef>,
        content_ref: ContentRef,
        output_handling: OutputHandling,
    },
    RestartKernelSuccessful {
        kernel_ref: KernelRef,
        content_ref: ContentRef,
    },
    RestartKernelFailed {
        error: RestartError,
        kernel_ref: KernelRef,
        content_ref: ContentRef,
    },
    KillKernel {
        kernel_ref: KernelRef,
        restarting: bool,
    },
    KillKernelSuccessful {
        kernel_ref: KernelRef,
    },
    KillKernelFailed {
        error: String,
        kernel_ref: KernelRef,
    },
    ExecuteAllCells {
        content_ref: ContentRef,
    },
    AddNotification(Notification),
}

impl Action {
    /// Stable action type name, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Action::FetchContent { .. } => "FETCH_CONTENT",
            Action::FetchContentFulfilled { .. } => "FETCH_CONTENT_FULFILLED",
            Action::FetchContentFailed { .. } => "FETCH_CONTENT_FAILED",
            Action::NewNotebook { .. } => "NEW_NOTEBOOK",
            Action::SetNotebook { .. } => "SET_NOTEBOOK",
            Action::LaunchKernelByName { .. } => "LAUNCH_KERNEL_BY_NAME",
            Action::LaunchKernelSuccessful { .. } => "LAUNCH_KERNEL_SUCCESSFUL",
            Action::LaunchKernelFailed { .. } => "LAUNCH_KERNEL_FAILED",
            Action::SetExecutionState { .. } => "SET_EXECUTION_STATE",
            Action::SetLanguageInfo { .. } => "SET_LANGUAGE_INFO",
            Action::SetKernelInfo { .. } => "SET_KERNEL_INFO",
            Action::RestartKernel { .. } => "RESTART_KERNEL",
            Action::RestartKernelSuccessful { .. } => "RESTART_KERNEL_SUCCESSFUL",
            Action::RestartKernelFailed { .. } => "RESTART_KERNEL_FAILED",
            Action::KillKernel { .. } => "KILL_KERNEL",
            Action::KillKernelSuccessful { .. } => "KILL_KERNEL_SUCCESSFUL",
            Action::KillKernelFailed { .. } => "KILL_KERNEL_FAILED",
            Action::ExecuteAllCells { .. } => "EXECUTE_ALL_CELLS",
            Action::AddNotification(_) => "ADD_NOTIFICATION",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_handling_serde_names() {
        assert_eq!(
            serde_json::to_string(&OutputHandling::RunAll).unwrap(),
            "\"Run All\""
        );
        assert_eq!(
            serde_json::to_string(&OutputHandling::ClearOnly).unwrap(),
            "\"Clear Only\""
        );
        assert_eq!(
            serde_json::from_str::<OutputHandling>("\"None\"").unwrap(),
            OutputHandling::None
        );
    }

    #[test]
    fn test_kind_names() {
        let action = Action::KillKernel {
            kernel_ref: KernelRef::new(),
            restarting: true,
        };
        assert_eq!(action.kind(), "KILL_KERNEL");

        let action = Action::ExecuteAllCells {
            content_ref: ContentRef::new(),
        };
        assert_eq!(action.kind(), "EXECUTE_ALL_CELLS");
    }
}
