use super::{DirEntry, EntryKind, FileSystem};
use anyhow::{anyhow, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// In-memory [`FileSystem`] for tests
///
/// Relative paths are resolved against the mock root (`/mock` unless
/// [`MockFileSystem::with_root`] is used). Parent directories are created
/// implicitly when a file is added.
pub struct MockFileSystem {
    entries: RwLock<BTreeMap<PathBuf, Option<String>>>,
    root: PathBuf,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::with_root(PathBuf::from("/mock"))
    }

    pub fn with_root(root: PathBuf) -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(root.clone(), None);
        Self {
            entries: RwLock::new(entries),
            root,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn add_file(&self, path: impl AsRef<Path>, content: &str) {
        let path = self.resolve(path.as_ref());
        let mut entries = self.entries.write().unwrap();
        if let Some(parent) = path.parent() {
            Self::insert_dirs(&mut entries, parent);
        }
        entries.insert(path, Some(content.to_string()));
    }

    pub fn add_dir(&self, path: impl AsRef<Path>) {
        let path = self.resolve(path.as_ref());
        let mut entries = self.entries.write().unwrap();
        Self::insert_dirs(&mut entries, &path);
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    fn insert_dirs(entries: &mut BTreeMap<PathBuf, Option<String>>, path: &Path) {
        for ancestor in path.ancestors() {
            entries.entry(ancestor.to_path_buf()).or_insert(None);
        }
    }
}

impl Default for MockFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSystem for MockFileSystem {
    fn is_file(&self, path: &Path) -> bool {
        matches!(
            self.entries.read().unwrap().get(&self.resolve(path)),
            Some(Some(_))
        )
    }

    fn is_dir(&self, path: &Path) -> bool {
        matches!(
            self.entries.read().unwrap().get(&self.resolve(path)),
            Some(None)
        )
    }

    fn read_to_string(&self, path: &Path) -> Result<String> {
        let path = self.resolve(path);
        match self.entries.read().unwrap().get(&path) {
            Some(Some(content)) => Ok(content.clone()),
            Some(None) => Err(anyhow!("Not a file: {:?}", path)),
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<DirEntry>> {
        let dir = self.resolve(path);
        let entries = self.entries.read().unwrap();
        if !matches!(entries.get(&dir), Some(None)) {
            return Err(anyhow!("Directory not found: {:?}", dir));
        }

        Ok(entries
            .iter()
            .filter(|(p, _)| p.parent() == Some(dir.as_path()))
            .map(|(p, content)| DirEntry {
                path: p.clone(),
                name: p
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default(),
                kind: if content.is_some() {
                    EntryKind::File
                } else {
                    EntryKind::Directory
                },
            })
            .collect())
    }
}
