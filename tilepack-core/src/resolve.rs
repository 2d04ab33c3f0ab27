//! Package resolution.
//!
//! One [`Resolver`] handles one package. It walks the entry manifest, and for
//! every reference either mints a handle over a payload or recurses into a
//! child manifest. Both go through a single cache keyed by canonical path:
//! a path is minted at most once, a manifest that is still being rewritten
//! is marked in flight, and meeting an in-flight path again is a cycle.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::config::ResolverConfig;
use crate::error::{Error, Result, Warning, WarningKind};
use crate::fileset::{VirtualFile, VirtualFileSet};
use crate::handle::{Handle, HandleKind, HandleStore, MintScope};
use crate::manifest;
use crate::package::Package;
use crate::path_safety::{base_dir, is_external, resolve_reference};

enum Slot {
    InFlight,
    Resolved(Handle),
    Absent,
}

/// Pick the entry manifest: the shallowest entry candidate, ties broken by
/// path order.
pub fn locate_entry<'f>(
    files: &'f VirtualFileSet,
    config: &ResolverConfig,
) -> Option<&'f VirtualFile> {
    files
        .iter()
        .filter(|f| config.is_entry_candidate(f.name()))
        .min_by(|a, b| a.depth().cmp(&b.depth()).then_with(|| a.rel_path.cmp(&b.rel_path)))
}

/// Resolve a whole package. On any fatal error every handle minted along the
/// way is revoked before the error is returned.
#[instrument(skip_all, fields(package = %name, files = files.len()))]
pub fn resolve_package(
    files: &VirtualFileSet,
    name: &str,
    store: &Arc<HandleStore>,
    config: &ResolverConfig,
) -> Result<Package> {
    let entry =
        locate_entry(files, config).ok_or_else(|| Error::NoManifestFound(name.to_string()))?;
    info!(entry = %entry.rel_path, "found entry manifest");

    let mut resolver = Resolver::new(files, config, MintScope::new(Arc::clone(store)));
    match resolver.resolve_entry(entry) {
        Ok(entry_handle) => {
            let (handles, warnings) = resolver.finish();
            info!(handles = handles.len(), warnings = warnings.len(), "package resolved");
            Ok(Package::new(
                name.to_string(),
                entry_handle,
                handles,
                files,
                warnings,
                Arc::clone(store),
            ))
        }
        Err(e) => {
            let released = resolver.rollback();
            warn!(error = %e, released, "package resolution failed, handles revoked");
            Err(e)
        }
    }
}

pub struct Resolver<'a> {
    files: &'a VirtualFileSet,
    config: &'a ResolverConfig,
    scope: MintScope,
    cache: HashMap<String, Slot>,
    chain: Vec<String>,
    warnings: Vec<Warning>,
}

impl<'a> Resolver<'a> {
    pub fn new(files: &'a VirtualFileSet, config: &'a ResolverConfig, scope: MintScope) -> Self {
        Self {
            files,
            config,
            scope,
            cache: HashMap::new(),
            chain: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Rewrite the entry manifest. Unlike a child, a malformed entry is fatal.
    pub fn resolve_entry(&mut self, entry: &VirtualFile) -> Result<Handle> {
        self.enter_manifest(&entry.rel_path, &entry.content)
    }

    /// Resolve a child manifest by canonical path. A missing or unparsable
    /// child is recorded as a warning and yields `None`; a cycle is fatal.
    pub fn resolve_child(&mut self, path: &str, referrer: &str) -> Result<Option<Handle>> {
        match self.cache.get(path) {
            Some(Slot::Resolved(h)) => return Ok(Some(h.clone())),
            Some(Slot::Absent) => return Ok(None),
            Some(Slot::InFlight) => return Err(self.cycle_error(path)),
            None => {}
        }
        let files = self.files;
        let Some(file) = files.get(path) else {
            self.warn(WarningKind::MissingReference, path, referrer);
            self.cache.insert(path.to_string(), Slot::Absent);
            return Ok(None);
        };
        match self.enter_manifest(path, &file.content) {
            Ok(h) => Ok(Some(h)),
            Err(Error::MalformedManifest { source, .. }) => {
                self.warn(WarningKind::MalformedManifest(source.to_string()), path, referrer);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Parse `raw` as the manifest at `path`, rewrite every reference relative
    /// to its directory, and mint a handle over the result.
    pub fn resolve_manifest(&mut self, path: &str, raw: &[u8]) -> Result<Handle> {
        let mut doc = manifest::parse(path, raw)?;
        let base = base_dir(path);
        let visited = manifest::rewrite_references(&mut doc, &mut |reference: &str| {
            self.rewrite_reference(base, reference, path)
        })?;
        let rewritten = manifest::serialize(path, &doc)?;
        debug!(path, references = visited, "rewrote manifest");
        Ok(self.scope.mint(rewritten, HandleKind::Manifest, path))
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn minted(&self) -> &[Handle] {
        self.scope.minted()
    }

    /// Keep every minted handle; the caller now owns them.
    pub fn finish(self) -> (Vec<Handle>, Vec<Warning>) {
        let Resolver { scope, warnings, .. } = self;
        (scope.commit(), warnings)
    }

    /// Revoke every minted handle. Returns how many were released.
    pub fn rollback(self) -> usize {
        self.scope.rollback()
    }

    fn enter_manifest(&mut self, path: &str, raw: &[u8]) -> Result<Handle> {
        self.cache.insert(path.to_string(), Slot::InFlight);
        self.chain.push(path.to_string());
        let result = self.resolve_manifest(path, raw);
        self.chain.pop();
        let slot = match &result {
            Ok(h) => Slot::Resolved(h.clone()),
            Err(_) => Slot::Absent,
        };
        self.cache.insert(path.to_string(), slot);
        result
    }

    fn rewrite_reference(
        &mut self,
        base: &str,
        reference: &str,
        referrer: &str,
    ) -> Result<Option<String>> {
        if is_external(reference) {
            debug!(referrer, reference, "leaving external reference untouched");
            return Ok(None);
        }
        let path = match resolve_reference(base, reference) {
            Ok(path) => path,
            Err(e) => {
                self.warn(WarningKind::UnresolvableReference(e.to_string()), reference, referrer);
                return Ok(Some(self.config.absent_marker.clone()));
            }
        };
        let handle = if self.config.is_manifest(&path) {
            self.resolve_child(&path, referrer)?
        } else {
            self.resolve_payload(&path, referrer)
        };
        Ok(Some(match handle {
            Some(h) => h.address().to_string(),
            None => self.config.absent_marker.clone(),
        }))
    }

    fn resolve_payload(&mut self, path: &str, referrer: &str) -> Option<Handle> {
        match self.cache.get(path) {
            Some(Slot::Resolved(h)) => return Some(h.clone()),
            Some(Slot::Absent) => return None,
            Some(Slot::InFlight) | None => {}
        }
        let files = self.files;
        match files.get(path) {
            Some(file) => {
                let h = self.scope.mint(file.content.clone(), HandleKind::Payload, path);
                self.cache.insert(path.to_string(), Slot::Resolved(h.clone()));
                Some(h)
            }
            None => {
                self.warn(WarningKind::MissingReference, path, referrer);
                self.cache.insert(path.to_string(), Slot::Absent);
                None
            }
        }
    }

    fn cycle_error(&self, path: &str) -> Error {
        let start = self.chain.iter().position(|p| p == path).unwrap_or(0);
        let mut chain: Vec<String> = self.chain[start..].to_vec();
        chain.push(path.to_string());
        Error::CyclicReference { chain }
    }

    fn warn(&mut self, kind: WarningKind, target: &str, referrer: &str) {
        let warning = Warning { kind, target: target.to_string(), referrer: referrer.to_string() };
        warn!("{}", warning);
        self.warnings.push(warning);
    }
}
