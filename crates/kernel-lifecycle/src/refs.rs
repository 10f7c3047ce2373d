//! Opaque identifiers for kernels and content.
//!
//! Refs decouple UI state from kernel identity: a restart swaps the kernel a
//! content points at by minting a new `KernelRef` rather than reusing one.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies one kernel instance for its whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KernelRef(Uuid);

impl KernelRef {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for KernelRef {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for KernelRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "kernel:{}", self.0)
    }
}

/// Identifies one loaded document (notebook, file, or directory listing).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentRef(Uuid);

impl ContentRef {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }
}

impl Default for ContentRef {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ContentRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "content:{}", self.0)
    }
}

/// Mints kernel refs for replacement kernels. Swapped out in tests for a
/// deterministic sequence.
pub type KernelRefGenerator = Arc<dyn Fn() -> KernelRef + Send + Sync>;

/// The generator used outside of tests: a fresh random ref per call.
pub fn default_kernel_ref_generator() -> KernelRefGenerator {
    Arc::new(KernelRef::new)
}
