use bytes::Bytes;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::error::Warning;
use crate::fileset::VirtualFileSet;
use crate::handle::{Handle, HandleStore};

pub type PackageId = u64;

static NEXT_PACKAGE_ID: AtomicU64 = AtomicU64::new(1);

/// A resolved upload. Owns every handle minted while resolving it and
/// revokes them when removed or dropped.
#[derive(Debug)]
pub struct Package {
    id: PackageId,
    name: String,
    entry: Handle,
    handles: Vec<Handle>,
    file_count: usize,
    total_bytes: u64,
    visible: bool,
    warnings: Vec<Warning>,
    resolved_utc: String,
    store: Arc<HandleStore>,
}

impl Package {
    pub(crate) fn new(
        name: String,
        entry: Handle,
        handles: Vec<Handle>,
        files: &VirtualFileSet,
        warnings: Vec<Warning>,
        store: Arc<HandleStore>,
    ) -> Self {
        Self {
            id: NEXT_PACKAGE_ID.fetch_add(1, Ordering::Relaxed),
            name,
            entry,
            handles,
            file_count: files.len(),
            total_bytes: files.total_bytes(),
            visible: true,
            warnings,
            resolved_utc: chrono::Utc::now().to_rfc3339(),
            store,
        }
    }

    pub fn id(&self) -> PackageId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn entry(&self) -> &Handle {
        &self.entry
    }

    /// Address the renderer loads the tileset from.
    pub fn entry_address(&self) -> &str {
        self.entry.address()
    }

    /// Rewritten entry manifest, while the package is alive.
    pub fn entry_document(&self) -> Option<Bytes> {
        self.store.dereference(self.entry.address())
    }

    /// Every handle this package minted, the entry included.
    pub fn handles(&self) -> &[Handle] {
        &self.handles
    }

    pub fn file_count(&self) -> usize {
        self.file_count
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    pub fn toggle_visible(&mut self) -> bool {
        self.visible = !self.visible;
        self.visible
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn resolved_utc(&self) -> &str {
        &self.resolved_utc
    }

    /// Revoke all handles. Returns how many were released.
    pub fn remove(mut self) -> usize {
        self.release()
    }

    fn release(&mut self) -> usize {
        let handles = std::mem::take(&mut self.handles);
        let released = self.store.revoke_all(&handles);
        if released > 0 {
            debug!(package = %self.name, released, "released package handles");
        }
        released
    }
}

impl Drop for Package {
    fn drop(&mut self) {
        self.release();
    }
}
