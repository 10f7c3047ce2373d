//! Notebook documents and kernel selection for freshly loaded content.
//!
//! Only the metadata keys needed to pick a kernel are interpreted; the rest
//! of the document is carried as opaque JSON.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Kernelspec used when a notebook names neither a kernelspec nor a language.
pub const DEFAULT_KERNEL_SPEC_NAME: &str = "python3";

/// A parsed notebook document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Notebook(Value);

impl Notebook {
    pub fn from_value(value: Value) -> Self {
        Self(value)
    }

    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text).map(Self)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// A new notebook with a single empty code cell.
    pub fn monocell() -> Self {
        Self(json!({
            "cells": [{
                "cell_type": "code",
                "execution_count": null,
                "metadata": {},
                "outputs": [],
                "source": ""
            }],
            "metadata": {},
            "nbformat": 4,
            "nbformat_minor": 4
        }))
    }

    /// Non-empty string at `metadata.<path>`.
    pub fn metadata_str(&self, path: &[&str]) -> Option<&str> {
        let mut node = self.0.get("metadata")?;
        for key in path {
            node = node.get(key)?;
        }
        node.as_str().filter(|s| !s.is_empty())
    }

    /// Set `metadata.<path>`, creating intermediate objects as needed.
    pub fn set_metadata(&mut self, path: &[&str], value: Value) {
        let Some((last, parents)) = path.split_last() else {
            return;
        };
        if !self.0.is_object() {
            self.0 = json!({});
        }
        let mut node = &mut self.0;
        let mut keys = vec!["metadata"];
        keys.extend(parents.iter().copied());
        for key in keys {
            let Some(obj) = node.as_object_mut() else {
                return;
            };
            node = obj.entry(key.to_string()).or_insert_with(|| json!({}));
            if !node.is_object() {
                *node = json!({});
            }
        }
        if let Some(obj) = node.as_object_mut() {
            obj.insert(last.to_string(), value);
        }
    }

    /// Kernelspec name the notebook asks for, falling back from
    /// `kernelspec.name` to `language_info.name` to `python3`.
    pub fn kernel_spec_name(&self) -> &str {
        self.metadata_str(&["kernelspec", "name"])
            .or_else(|| self.metadata_str(&["language_info", "name"]))
            .unwrap_or(DEFAULT_KERNEL_SPEC_NAME)
    }
}

/// Where kernels start when the content has no filepath.
///
/// Desktop hosts launch in the process working directory; server hosts in
/// the root of the served tree.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CwdProvider {
    #[default]
    ProcessDir,
    Root,
    Fixed(PathBuf),
}

impl CwdProvider {
    pub fn default_cwd(&self) -> String {
        match self {
            CwdProvider::ProcessDir => std::env::current_dir()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_else(|_| ".".to_string()),
            CwdProvider::Root => "/".to_string(),
            CwdProvider::Fixed(path) => path.to_string_lossy().into_owned(),
        }
    }
}

/// Kernel a piece of content implies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewKernel {
    pub cwd: String,
    pub kernel_spec_name: String,
}

/// Determine which kernel to launch for a notebook and where.
pub fn extract_new_kernel(
    filepath: Option<&str>,
    notebook: &Notebook,
    cwd_provider: &CwdProvider,
) -> NewKernel {
    let cwd = filepath
        .filter(|p| !p.is_empty())
        .map(parent_dir)
        .unwrap_or_else(|| cwd_provider.default_cwd());

    NewKernel {
        cwd,
        kernel_spec_name: notebook.kernel_spec_name().to_string(),
    }
}

/// Directory containing `filepath`; a bare filename lives in `"."`.
fn parent_dir(filepath: &str) -> String {
    match Path::new(filepath).parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_string_lossy().into_owned(),
        _ if filepath.starts_with('/') => "/".to_string(),
        _ => ".".to_string(),
    }
}
