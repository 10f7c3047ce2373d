//! Kernel and content registries and the reducer that mutates them.
//!
//! `AppState::reduce` is the only mutation path. Epics read snapshots through
//! a `StateHandle` and change state by emitting actions.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use log::{debug, warn};

use crate::actions::Action;
use crate::content::{ContentModel, ContentRecord};
use crate::kernel::{KernelRecord, KernelStatus};
use crate::refs::{ContentRef, KernelRef};

#[derive(Debug, Default, Clone)]
pub struct AppState {
    kernels: HashMap<KernelRef, KernelRecord>,
    contents: HashMap<ContentRef, ContentRecord>,
}

impl AppState {
    pub fn kernel(&self, kernel_ref: &KernelRef) -> Option<&KernelRecord> {
        self.kernels.get(kernel_ref)
    }

    pub fn content(&self, content_ref: &ContentRef) -> Option<&ContentRecord> {
        self.contents.get(content_ref)
    }

    pub fn kernel_count(&self) -> usize {
        self.kernels.len()
    }

    /// Kernel currently bound to a piece of content.
    pub fn kernel_for_content(&self, content_ref: &ContentRef) -> Option<&KernelRecord> {
        self.content(content_ref)
            .and_then(|c| c.kernel_ref.as_ref())
            .and_then(|k| self.kernel(k))
    }

    pub fn reduce(&mut self, action: &Action) {
        match action {
            Action::FetchContentFulfilled {
                filepath,
                model,
                content_ref,
                ..
            } => {
                self.insert_content(*content_ref, Some(filepath.clone()), model.clone());
            }
            Action::SetNotebook {
                filepath,
                notebook,
                content_ref,
                ..
            } => {
                self.insert_content(
                    *content_ref,
                    filepath.clone(),
                    ContentModel::Notebook {
                        notebook: notebook.clone(),
                    },
                );
            }
            Action::LaunchKernelSuccessful {
                kernel,
                kernel_ref,
                content_ref,
                select_next_kernel,
            } => {
                match self.kernels.get_mut(kernel_ref) {
                    Some(record) => {
                        warn!("[state] {} launched again, keeping its kernel info", kernel_ref);
                        record.channel = kernel.channel.clone();
                        record.kernel_spec_name = kernel.kernel_spec_name.clone();
                        record.cwd = kernel.cwd.clone();
                        record.status = KernelStatus::Starting;
                    }
                    None => {
                        self.kernels
                            .insert(*kernel_ref, KernelRecord::new(*kernel_ref, kernel.clone()));
                    }
                }
                if *select_next_kernel {
                    if let Some(content) = self.contents.get_mut(content_ref) {
                        content.kernel_ref = Some(*kernel_ref);
                    }
                }
            }
            Action::SetExecutionState {
                kernel_ref,
                kernel_status,
            } => match self.kernels.get_mut(kernel_ref) {
                Some(record) => {
                    record.status = KernelStatus::from_execution_state(kernel_status);
                }
                None => debug!("[state] Status for unknown kernel {}", kernel_ref),
            },
            Action::SetKernelInfo { kernel_ref, info } => {
                if let Some(record) = self.kernels.get_mut(kernel_ref) {
                    if record.info.is_none() {
                        record.info = Some(info.clone());
                    } else {
                        warn!("[state] Ignoring second kernel info for {}", kernel_ref);
                    }
                }
            }
            Action::KillKernel { kernel_ref, .. } => {
                self.kernels.remove(kernel_ref);
                for content in self.contents.values_mut() {
                    if content.kernel_ref.as_ref() == Some(kernel_ref) {
                        content.kernel_ref = None;
                    }
                }
            }
            _ => {}
        }
    }

    fn insert_content(
        &mut self,
        content_ref: ContentRef,
        filepath: Option<String>,
        model: ContentModel,
    ) {
        // Reloading content keeps its kernel binding.
        let kernel_ref = self
            .contents
            .get(&content_ref)
            .and_then(|existing| existing.kernel_ref);
        self.contents.insert(
            content_ref,
            ContentRecord {
                content_ref,
                filepath,
                model,
                kernel_ref,
            },
        );
    }
}

/// Shared, read-only view of the registries for epics.
#[derive(Debug, Clone, Default)]
pub struct StateHandle {
    inner: Arc<RwLock<AppState>>,
}

impl StateHandle {
    pub fn new(state: AppState) -> Self {
        Self {
            inner: Arc::new(RwLock::new(state)),
        }
    }

    /// Run `f` against the current state.
    pub fn read<T>(&self, f: impl FnOnce(&AppState) -> T) -> T {
        let guard = self.inner.read().unwrap_or_else(|e| e.into_inner());
        f(&guard)
    }

    pub fn kernel(&self, kernel_ref: &KernelRef) -> Option<KernelRecord> {
        self.read(|s| s.kernel(kernel_ref).cloned())
    }

    pub fn content(&self, content_ref: &ContentRef) -> Option<ContentRecord> {
        self.read(|s| s.content(content_ref).cloned())
    }

    pub(crate) fn write(&self) -> std::sync::RwLockWriteGuard<'_, AppState> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}
