use bytes::Bytes;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info};

use crate::config::ResolverConfig;
use crate::error::Result;
use crate::fileset::VirtualFileSet;
use crate::handle::HandleStore;
use crate::package::{Package, PackageId};
use crate::resolve::resolve_package;

/// Result of loading one top-level folder of a batch.
#[derive(Debug)]
pub struct LoadOutcome {
    pub folder: String,
    pub result: Result<PackageId>,
}

/// The set of packages currently loaded, keyed by id.
pub struct Library {
    config: ResolverConfig,
    store: Arc<HandleStore>,
    packages: BTreeMap<PackageId, Package>,
}

impl Library {
    pub fn new(config: ResolverConfig) -> Self {
        let store = Arc::new(HandleStore::new(config.handle_origin.clone()));
        Self::with_store(config, store)
    }

    pub fn with_store(config: ResolverConfig, store: Arc<HandleStore>) -> Self {
        Self { config, store, packages: BTreeMap::new() }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<HandleStore> {
        &self.store
    }

    /// Index an uploaded batch and load each top-level folder as its own
    /// package. Only a bad batch (duplicate or invalid paths) fails as a
    /// whole; per-folder failures are reported in the outcomes.
    pub fn load_batch<I, P, C>(&mut self, files: I) -> Result<Vec<LoadOutcome>>
    where
        I: IntoIterator<Item = (P, C)>,
        P: AsRef<str>,
        C: Into<Bytes>,
    {
        let set = VirtualFileSet::new(files)?;
        Ok(self.load_file_set(&set))
    }

    /// Folders resolve in parallel; none of them sees another's state.
    pub fn load_file_set(&mut self, set: &VirtualFileSet) -> Vec<LoadOutcome> {
        let groups = set.group_by_top_folder(&self.config.loose_folder);
        let store = &self.store;
        let config = &self.config;
        let resolved: Vec<(String, Result<Package>)> = groups
            .into_par_iter()
            .map(|(folder, files)| {
                let result = resolve_package(&files, &folder, store, config);
                (folder, result)
            })
            .collect();

        let mut outcomes = Vec::with_capacity(resolved.len());
        for (folder, result) in resolved {
            let result = match result {
                Ok(package) => {
                    let id = package.id();
                    info!(folder = %folder, id, entry = %package.entry_address(), "loaded package");
                    self.packages.insert(id, package);
                    Ok(id)
                }
                Err(e) => {
                    error!(folder = %folder, error = %e, "failed to load folder");
                    Err(e)
                }
            };
            outcomes.push(LoadOutcome { folder, result });
        }
        outcomes
    }

    pub fn get(&self, id: PackageId) -> Option<&Package> {
        self.packages.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Package> {
        self.packages.values()
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Drop a package and revoke its handles. Returns how many handles were
    /// released, or `None` for an unknown id.
    pub fn remove(&mut self, id: PackageId) -> Option<usize> {
        let package = self.packages.remove(&id)?;
        let name = package.name().to_string();
        let released = package.remove();
        info!(id, package = %name, released, "removed package");
        Some(released)
    }

    pub fn set_visible(&mut self, id: PackageId, visible: bool) -> bool {
        match self.packages.get_mut(&id) {
            Some(p) => {
                p.set_visible(visible);
                true
            }
            None => false,
        }
    }

    /// Flip visibility. Returns the new state.
    pub fn toggle_visible(&mut self, id: PackageId) -> Option<bool> {
        self.packages.get_mut(&id).map(Package::toggle_visible)
    }

    pub fn rename(&mut self, id: PackageId, name: impl Into<String>) -> bool {
        match self.packages.get_mut(&id) {
            Some(p) => {
                p.rename(name);
                true
            }
            None => false,
        }
    }
}
