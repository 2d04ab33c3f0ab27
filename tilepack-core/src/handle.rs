//! Addressable handles over resolved bytes.
//!
//! A [`HandleStore`] plays the part of the browser's object-URL table: it
//! binds bytes to an opaque `blob:` address until the handle is revoked.
//! Handles go `Minted -> Revoked` and never come back; revoking twice is a
//! no-op. A [`MintScope`] records every handle minted during one package
//! resolution so a failure can revoke exactly those.

use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HandleKind {
    /// A rewritten manifest document.
    Manifest,
    /// Original bytes of a binary payload.
    Payload,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Handle {
    address: String,
    kind: HandleKind,
    source: String,
    digest: blake3::Hash,
    size: u64,
}

impl Handle {
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn kind(&self) -> HandleKind {
        self.kind
    }

    /// Canonical package path this handle was resolved from.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn digest(&self) -> &blake3::Hash {
        &self.digest
    }

    pub fn size(&self) -> u64 {
        self.size
    }
}

pub struct HandleStore {
    origin: String,
    next_id: AtomicU64,
    live: Mutex<HashMap<String, Bytes>>,
}

impl HandleStore {
    pub fn new(origin: impl Into<String>) -> Self {
        Self { origin: origin.into(), next_id: AtomicU64::new(1), live: Mutex::new(HashMap::new()) }
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Bind `content` to a fresh address. Every call yields a distinct
    /// address, even for identical bytes.
    pub fn mint(&self, content: Bytes, kind: HandleKind, source: &str) -> Handle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let digest = blake3::hash(&content);
        let address = format!("blob:{}/{:08x}-{}", self.origin, id, &digest.to_hex()[..16]);
        let size = content.len() as u64;
        self.live.lock().insert(address.clone(), content);
        debug!(%address, source, ?kind, size, "minted handle");
        Handle { address, kind, source: source.to_string(), digest, size }
    }

    /// Bytes bound to `address`, or `None` once it has been revoked.
    pub fn dereference(&self, address: &str) -> Option<Bytes> {
        self.live.lock().get(address).cloned()
    }

    pub fn is_live(&self, handle: &Handle) -> bool {
        self.live.lock().contains_key(&handle.address)
    }

    pub fn live_count(&self) -> usize {
        self.live.lock().len()
    }

    /// Release one handle. Returns false if it was already revoked.
    pub fn revoke(&self, handle: &Handle) -> bool {
        let removed = self.live.lock().remove(&handle.address).is_some();
        if !removed {
            debug!(address = %handle.address, "handle already revoked");
        }
        removed
    }

    /// Release every handle in `handles`, skipping ones already revoked.
    /// Returns how many were actually released.
    pub fn revoke_all(&self, handles: &[Handle]) -> usize {
        let mut live = self.live.lock();
        let mut released = 0;
        for h in handles {
            if live.remove(&h.address).is_some() {
                released += 1;
            } else {
                debug!(address = %h.address, "handle already revoked");
            }
        }
        released
    }
}

impl fmt::Debug for HandleStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleStore")
            .field("origin", &self.origin)
            .field("live", &self.live_count())
            .finish()
    }
}

/// Handles minted on behalf of one package resolution. Unless committed,
/// dropping the scope revokes everything it minted.
pub struct MintScope {
    store: Arc<HandleStore>,
    minted: Vec<Handle>,
    committed: bool,
}

impl MintScope {
    pub fn new(store: Arc<HandleStore>) -> Self {
        Self { store, minted: Vec::new(), committed: false }
    }

    pub fn mint(&mut self, content: Bytes, kind: HandleKind, source: &str) -> Handle {
        let handle = self.store.mint(content, kind, source);
        self.minted.push(handle.clone());
        handle
    }

    pub fn minted(&self) -> &[Handle] {
        &self.minted
    }

    pub fn store(&self) -> &Arc<HandleStore> {
        &self.store
    }

    /// Hand ownership of the minted handles to the caller.
    pub fn commit(mut self) -> Vec<Handle> {
        self.committed = true;
        std::mem::take(&mut self.minted)
    }

    /// Revoke everything minted so far. Returns how many were released.
    pub fn rollback(mut self) -> usize {
        self.committed = true;
        let minted = std::mem::take(&mut self.minted);
        self.store.revoke_all(&minted)
    }
}

impl Drop for MintScope {
    fn drop(&mut self) {
        if !self.committed && !self.minted.is_empty() {
            let released = self.store.revoke_all(&self.minted);
            warn!(released, "mint scope dropped without commit, revoked its handles");
        }
    }
}
