//! Filesystem-backed entries.
//!
//! # Responsibilities
//! - Render an [`EntryPath`] below a store root into facet paths
//! - Read, stage, commit and delete the data facet
//! - List children and remove whole branches
//!
//! # Design Decisions
//! - Staging goes to `<P>data-tmp` next to the target so the commit rename
//!   never crosses a filesystem boundary
//! - A writer dropped without commit leaves the staged file behind; it is
//!   invisible to readers and to [`Entry::children`]

use std::collections::BTreeSet;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;

use super::error::StoreError;
use super::path::EntryPath;

const DATA: &str = "data";
const STAGING: &str = "data-tmp";
const DIR: &str = "dir";
const META: &str = "meta";

/// An addressable node of the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Entry {
    /// Store root, always ending with `/`.
    root: Arc<str>,
    path: EntryPath,
}

impl Entry {
    /// The root entry of a store living in `dir`.
    pub fn root(dir: impl AsRef<Path>) -> Self {
        let mut root = dir.as_ref().to_string_lossy().into_owned();
        if !root.ends_with('/') {
            root.push('/');
        }
        Self {
            root: Arc::from(root),
            path: EntryPath::root(),
        }
    }

    fn with_path(&self, path: EntryPath) -> Self {
        Self {
            root: Arc::clone(&self.root),
            path,
        }
    }

    pub fn path(&self) -> &EntryPath {
        &self.path
    }

    pub fn level(&self) -> usize {
        self.path.level()
    }

    pub fn name(&self) -> &str {
        self.path.name()
    }

    pub fn is_container(&self) -> bool {
        self.path.is_container()
    }

    /// The canonical prefix all facets of this entry hang off.
    pub fn dot_path(&self) -> String {
        self.path.render(&self.root)
    }

    pub fn child(&self, name: &str) -> Self {
        self.with_path(self.path.child(name))
    }

    pub fn parameters(&self) -> Self {
        self.with_path(self.path.parameters())
    }

    pub fn parent(&self, force: bool) -> Option<Self> {
        self.path.parent(force).map(|p| self.with_path(p))
    }

    pub fn dir(&self) -> Self {
        self.with_path(self.path.dir())
    }

    pub fn file(&self) -> Self {
        self.with_path(self.path.file())
    }

    /// URL path of this entry relative to the site root `site`.
    pub fn url_path_under(&self, site: &Entry) -> Option<String> {
        self.path.url_path_under(&site.path)
    }

    /// Location of the content blob.
    pub fn data_path(&self) -> PathBuf {
        PathBuf::from(self.dot_path() + DATA)
    }

    fn staging_path(&self) -> PathBuf {
        PathBuf::from(self.dot_path() + STAGING)
    }

    /// Directory holding the facets of the children.
    pub fn children_path(&self) -> PathBuf {
        let dot = self.dot_path();
        if dot.ends_with('/') {
            PathBuf::from(dot)
        } else {
            PathBuf::from(dot + DIR + "/")
        }
    }

    /// True iff the data facet is present.
    pub async fn exists(&self) -> bool {
        fs::metadata(self.data_path())
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
    }

    /// True iff the children directory is present.
    pub async fn dir_exists(&self) -> bool {
        fs::metadata(self.children_path())
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    pub async fn open(&self) -> Result<File, StoreError> {
        let path = self.data_path();
        File::open(&path)
            .await
            .map_err(|e| StoreError::from_io(path, e))
    }

    pub async fn read(&self) -> Result<Vec<u8>, StoreError> {
        let path = self.data_path();
        fs::read(&path)
            .await
            .map_err(|e| StoreError::from_io(path, e))
    }

    /// Stage a new version of the data facet.
    pub async fn create(&self) -> Result<EntryWriter, StoreError> {
        let staging = self.staging_path();
        if let Some(parent) = staging.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::from_io(parent, e))?;
        }
        let file = File::create(&staging)
            .await
            .map_err(|e| StoreError::from_io(&staging, e))?;

        Ok(EntryWriter {
            file,
            staging,
            target: self.data_path(),
        })
    }

    /// Replace the data facet with `bytes` and commit.
    pub async fn write(&self, bytes: &[u8]) -> Result<(), StoreError> {
        let mut writer = self.create().await?;
        writer.write_all(bytes).await?;
        writer.commit().await
    }

    /// Remove the data facet. Absence is not an error.
    pub async fn delete(&self) -> Result<(), StoreError> {
        let path = self.data_path();
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::from_io(path, e)),
        }
    }

    /// Direct children in lexicographic order, one per logical name.
    pub async fn children(&self) -> Result<Vec<Entry>, StoreError> {
        let dir = self.children_path();
        let mut read_dir = match fs::read_dir(&dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::from_io(dir, e)),
        };

        let mut names = BTreeSet::new();
        loop {
            let item = read_dir
                .next_entry()
                .await
                .map_err(|e| StoreError::from_io(&dir, e))?;
            let Some(item) = item else { break };

            let file_name = item.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            if let Some(base) = child_base(file_name) {
                names.insert(base.to_string());
            }
        }

        Ok(names
            .into_iter()
            .map(|name| self.with_path(self.path.literal_child(name)))
            .collect())
    }

    /// Remove data, every metadata facet and the whole children subtree.
    ///
    /// The store root directory itself is emptied, never removed.
    pub async fn delete_all(&self) -> Result<(), StoreError> {
        self.delete().await?;

        let dot = self.dot_path();
        let (facet_dir, base) = match dot.rfind('/') {
            Some(i) => (&dot[..=i], &dot[i + 1..]),
            None => ("", dot.as_str()),
        };
        let meta_prefix = format!("{base}{META}");

        match fs::read_dir(facet_dir).await {
            Ok(mut read_dir) => loop {
                let item = read_dir
                    .next_entry()
                    .await
                    .map_err(|e| StoreError::from_io(facet_dir, e))?;
                let Some(item) = item else { break };

                let file_name = item.file_name();
                let Some(rest) = file_name
                    .to_str()
                    .and_then(|n| n.strip_prefix(meta_prefix.as_str()))
                else {
                    continue;
                };
                if rest.is_empty() || rest.contains('.') {
                    continue;
                }
                remove_any(&item.path()).await?;
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(StoreError::from_io(facet_dir, e)),
        }

        let children = self.children_path();
        if self.path.is_root() {
            empty_dir(&children).await
        } else {
            remove_any(&children).await
        }
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.dot_path())
    }
}

/// Scoped writer over the staging file of an entry.
#[derive(Debug)]
pub struct EntryWriter {
    file: File,
    staging: PathBuf,
    target: PathBuf,
}

impl EntryWriter {
    pub async fn write_all(&mut self, bytes: &[u8]) -> Result<(), StoreError> {
        self.file
            .write_all(bytes)
            .await
            .map_err(|e| StoreError::from_io(&self.staging, e))
    }

    /// Make the staged bytes the entry's data in one rename.
    pub async fn commit(mut self) -> Result<(), StoreError> {
        self.file
            .flush()
            .await
            .map_err(|e| StoreError::from_io(&self.staging, e))?;
        self.file
            .sync_all()
            .await
            .map_err(|e| StoreError::from_io(&self.staging, e))?;
        drop(self.file);

        fs::rename(&self.staging, &self.target)
            .await
            .map_err(|e| StoreError::from_io(&self.target, e))
    }
}

/// Logical child name for an on-disk name, if it is a child facet.
fn child_base(file_name: &str) -> Option<&str> {
    let (base, facet) = file_name.rsplit_once('.')?;
    if base.is_empty() || base == "." || base == ".." {
        return None;
    }
    if facet == DATA || facet == DIR || facet.starts_with(META) {
        Some(base)
    } else {
        None
    }
}

async fn remove_any(path: &Path) -> Result<(), StoreError> {
    let meta = match fs::symlink_metadata(path).await {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(StoreError::from_io(path, e)),
    };
    let result = if meta.is_dir() {
        fs::remove_dir_all(path).await
    } else {
        fs::remove_file(path).await
    };
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StoreError::from_io(path, e)),
    }
}

async fn empty_dir(dir: &Path) -> Result<(), StoreError> {
    let mut read_dir = match fs::read_dir(dir).await {
        Ok(rd) => rd,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(StoreError::from_io(dir, e)),
    };
    while let Some(item) = read_dir
        .next_entry()
        .await
        .map_err(|e| StoreError::from_io(dir, e))?
    {
        remove_any(&item.path()).await?;
    }
    Ok(())
}
