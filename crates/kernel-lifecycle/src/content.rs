//! Loaded content and its projection from the filesystem.

use std::path::Path;

use serde::Serialize;

use crate::error::FetchError;
use crate::notebook::Notebook;
use crate::refs::{ContentRef, KernelRef};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentModel {
    Notebook { notebook: Notebook },
    File { text: String },
    Directory { entries: Vec<String> },
}

impl ContentModel {
    pub fn as_notebook(&self) -> Option<&Notebook> {
        match self {
            ContentModel::Notebook { notebook } => Some(notebook),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ContentModel::Notebook { .. } => "notebook",
            ContentModel::File { .. } => "file",
            ContentModel::Directory { .. } => "directory",
        }
    }
}

/// One entry in the content registry.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentRecord {
    pub content_ref: ContentRef,
    pub filepath: Option<String>,
    pub model: ContentModel,
    /// Kernel currently serving this content, once one is confirmed running.
    pub kernel_ref: Option<KernelRef>,
}

/// Read `filepath` and project it onto a content model: directories list
/// their entries, `.ipynb` files parse as notebooks, anything else is text.
pub async fn load_content(filepath: &str) -> Result<ContentModel, FetchError> {
    let path = Path::new(filepath);
    let metadata = tokio::fs::metadata(path).await?;

    if metadata.is_dir() {
        let mut entries = Vec::new();
        let mut dir = tokio::fs::read_dir(path).await?;
        while let Some(entry) = dir.next_entry().await? {
            entries.push(entry.file_name().to_string_lossy().into_owned());
        }
        entries.sort();
        return Ok(ContentModel::Directory { entries });
    }

    if !metadata.is_file() {
        return Err(FetchError::Unsupported(filepath.to_string()));
    }

    let text = tokio::fs::read_to_string(path).await?;
    if path.extension().and_then(|e| e.to_str()) == Some("ipynb") {
        let notebook = Notebook::parse(&text).map_err(|e| FetchError::Parse(e.to_string()))?;
        Ok(ContentModel::Notebook { notebook })
    } else {
        Ok(ContentModel::File { text })
    }
}
