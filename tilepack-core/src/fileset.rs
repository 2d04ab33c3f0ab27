use bytes::Bytes;
use std::collections::btree_map::{self, BTreeMap};

use crate::error::{Error, Result};
use crate::path_safety::validate_upload_path;

#[derive(Clone, Debug)]
pub struct VirtualFile {
    pub rel_path: String,
    pub content: Bytes,
}

impl VirtualFile {
    pub fn size(&self) -> u64 {
        self.content.len() as u64
    }

    /// Final path segment.
    pub fn name(&self) -> &str {
        self.rel_path.rsplit('/').next().unwrap_or(&self.rel_path)
    }

    /// Number of `/`-separated segments.
    pub fn depth(&self) -> usize {
        self.rel_path.split('/').count()
    }
}

/// Uploaded files keyed by their package-relative path. Immutable once built.
#[derive(Clone, Debug, Default)]
pub struct VirtualFileSet {
    files: BTreeMap<String, VirtualFile>,
}

impl VirtualFileSet {
    /// Build a file set from `(relative path, content)` pairs. The same path
    /// appearing twice is a [`Error::DuplicatePath`]; there is no last-wins.
    pub fn new<I, P, C>(files: I) -> Result<Self>
    where
        I: IntoIterator<Item = (P, C)>,
        P: AsRef<str>,
        C: Into<Bytes>,
    {
        let mut map = BTreeMap::new();
        for (raw, content) in files {
            let raw = raw.as_ref();
            let rel_path = validate_upload_path(raw)
                .map_err(|reason| Error::InvalidPath { path: raw.to_string(), reason })?;
            match map.entry(rel_path) {
                btree_map::Entry::Occupied(e) => return Err(Error::DuplicatePath(e.key().clone())),
                btree_map::Entry::Vacant(e) => {
                    let rel_path = e.key().clone();
                    e.insert(VirtualFile { rel_path, content: content.into() });
                }
            }
        }
        Ok(Self { files: map })
    }

    pub fn get(&self, rel_path: &str) -> Option<&VirtualFile> {
        self.files.get(rel_path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn total_bytes(&self) -> u64 {
        self.files.values().map(VirtualFile::size).sum()
    }

    /// Files in lexical path order.
    pub fn iter(&self) -> impl Iterator<Item = &VirtualFile> {
        self.files.values()
    }

    /// Split the set by first path segment, one subset per uploaded folder.
    /// Files that are not inside any folder land under `loose_folder`.
    pub fn group_by_top_folder(&self, loose_folder: &str) -> BTreeMap<String, VirtualFileSet> {
        let mut groups: BTreeMap<String, VirtualFileSet> = BTreeMap::new();
        for (path, file) in &self.files {
            let folder = match path.split_once('/') {
                Some((top, _)) => top,
                None => loose_folder,
            };
            groups
                .entry(folder.to_string())
                .or_default()
                .files
                .insert(path.clone(), file.clone());
        }
        groups
    }
}
