use std::collections::BTreeMap;
use std::io;
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use crate::{DirEntry, Metadata, ReadDir, VfsBackend};

/// In-memory filesystem that can be used as a `FileStateCache` backend.
///
/// Clones share the same underlying tree, so a test can keep one handle to
/// mutate "disk" while the cache owns another. Every write bumps a global
/// revision which stands in for the modification time.
#[derive(Debug, Clone, Default)]
pub struct InMemoryFs {
    inner: Arc<Mutex<InMemoryFsInner>>,
}

impl InMemoryFs {
    /// Create a new empty `InMemoryFs`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes a file, creating every missing parent directory.
    pub fn write_file<P: AsRef<Path>, C: AsRef<[u8]>>(&self, path: P, contents: C) {
        let mut inner = self.inner.lock().unwrap();
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            inner.create_dir_all(parent);
        }

        inner.revision += 1;
        let entry = Entry::File {
            len: contents.as_ref().len() as u64,
            revision: inner.revision,
        };
        inner.entries.insert(path.to_path_buf(), entry);
    }

    pub fn create_dir_all<P: AsRef<Path>>(&self, path: P) {
        self.inner.lock().unwrap().create_dir_all(path.as_ref());
    }

    /// Removes `path` and everything below it. Missing paths are ignored.
    pub fn remove<P: AsRef<Path>>(&self, path: P) {
        let mut inner = self.inner.lock().unwrap();
        for doomed in inner.subtree(path.as_ref()) {
            inner.entries.remove(&doomed);
        }
    }

    /// Moves `from` and everything below it to `to`.
    pub fn rename<P: AsRef<Path>, Q: AsRef<Path>>(&self, from: P, to: Q) -> io::Result<()> {
        let (from, to) = (from.as_ref(), to.as_ref());
        let mut inner = self.inner.lock().unwrap();

        let moved = inner.subtree(from);
        if moved.is_empty() {
            return not_found(from);
        }

        if let Some(parent) = to.parent() {
            inner.create_dir_all(parent);
        }

        for old in moved {
            if let Some(entry) = inner.entries.remove(&old) {
                let suffix = old.strip_prefix(from).unwrap_or(Path::new(""));
                let new = if suffix.as_os_str().is_empty() {
                    to.to_path_buf()
                } else {
                    to.join(suffix)
                };
                inner.entries.insert(new, entry);
            }
        }

        Ok(())
    }
}

#[derive(Debug, Default)]
struct InMemoryFsInner {
    entries: BTreeMap<PathBuf, Entry>,
    revision: u64,
}

impl InMemoryFsInner {
    fn create_dir_all(&mut self, path: &Path) {
        for ancestor in path.ancestors() {
            if ancestor.as_os_str().is_empty() {
                continue;
            }
            self.entries
                .entry(ancestor.to_path_buf())
                .or_insert(Entry::Dir);
        }
    }

    /// Error for a path with no entry. Like a real disk, a path that runs
    /// through a file is `NotADirectory` rather than `NotFound`.
    fn missing<T>(&self, path: &Path) -> io::Result<T> {
        let through_file = path
            .ancestors()
            .skip(1)
            .any(|ancestor| matches!(self.entries.get(ancestor), Some(Entry::File { .. })));

        if through_file {
            not_a_directory(path)
        } else {
            not_found(path)
        }
    }

    fn subtree(&self, root: &Path) -> Vec<PathBuf> {
        self.entries
            .range::<Path, _>((Bound::Included(root), Bound::Unbounded))
            .map(|(path, _)| path)
            .take_while(|path| path.starts_with(root))
            .cloned()
            .collect()
    }
}

#[derive(Debug, Clone, Copy)]
enum Entry {
    File { len: u64, revision: u64 },
    Dir,
}

impl VfsBackend for InMemoryFs {
    fn metadata(&mut self, path: &Path) -> io::Result<Metadata> {
        let inner = self.inner.lock().unwrap();

        match inner.entries.get(path) {
            Some(Entry::File { len, revision }) => Ok(Metadata {
                is_file: true,
                len: *len,
                modified: Some(SystemTime::UNIX_EPOCH + Duration::from_secs(*revision)),
            }),
            Some(Entry::Dir) => Ok(Metadata {
                is_file: false,
                len: 0,
                modified: None,
            }),
            None => inner.missing(path),
        }
    }

    fn read_dir(&mut self, path: &Path) -> io::Result<ReadDir> {
        let inner = self.inner.lock().unwrap();

        match inner.entries.get(path) {
            Some(Entry::Dir) => {
                let children: Vec<PathBuf> = inner
                    .subtree(path)
                    .into_iter()
                    .filter(|child| child.parent() == Some(path))
                    .collect();

                Ok(ReadDir {
                    inner: Box::new(children.into_iter().map(|path| Ok(DirEntry { path }))),
                })
            }
            Some(Entry::File { .. }) => not_a_directory(path),
            None => inner.missing(path),
        }
    }
}

fn not_found<T>(path: &Path) -> io::Result<T> {
    Err(io::Error::new(
        io::ErrorKind::NotFound,
        format!("path {} not found", path.display()),
    ))
}

fn not_a_directory<T>(path: &Path) -> io::Result<T> {
    Err(io::Error::new(
        io::ErrorKind::NotADirectory,
        format!("{} is not a directory", path.display()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_creates_parents() {
        let mut fs = InMemoryFs::new();
        fs.write_file("/a/b/c.txt", "hi");

        assert!(fs.metadata(Path::new("/a")).unwrap().is_dir());
        assert!(fs.metadata(Path::new("/a/b")).unwrap().is_dir());
        assert_eq!(fs.metadata(Path::new("/a/b/c.txt")).unwrap().len(), 2);
    }

    #[test]
    fn rewrite_changes_modified() {
        let mut fs = InMemoryFs::new();
        fs.write_file("/f", "one");
        let first = fs.metadata(Path::new("/f")).unwrap().modified();
        fs.write_file("/f", "two");
        let second = fs.metadata(Path::new("/f")).unwrap().modified();

        assert_ne!(first, second);
    }

    #[test]
    fn read_dir_lists_immediate_children() {
        let mut fs = InMemoryFs::new();
        fs.write_file("/d/x", "");
        fs.write_file("/d/sub/y", "");
        fs.write_file("/d-other", "");

        let children: Vec<PathBuf> = fs
            .read_dir(Path::new("/d"))
            .unwrap()
            .map(|entry| entry.unwrap().path().to_path_buf())
            .collect();

        assert_eq!(children, vec![PathBuf::from("/d/sub"), PathBuf::from("/d/x")]);
    }

    #[test]
    fn rename_moves_subtree() {
        let mut fs = InMemoryFs::new();
        fs.write_file("/old/inner/file", "data");
        fs.rename("/old", "/new").unwrap();

        assert_eq!(
            fs.metadata(Path::new("/old")).unwrap_err().kind(),
            io::ErrorKind::NotFound
        );
        assert!(fs.metadata(Path::new("/new/inner/file")).unwrap().is_file());
    }

    #[test]
    fn clones_share_state() {
        let fs = InMemoryFs::new();
        let mut other = fs.clone();
        fs.write_file("/shared", "x");

        assert!(other.metadata(Path::new("/shared")).is_ok());
        fs.remove("/shared");
        assert!(other.metadata(Path::new("/shared")).is_err());
    }

    #[test]
    fn path_under_a_file_is_not_a_directory() {
        let mut fs = InMemoryFs::new();
        fs.write_file("/d/child.txt", "");
        fs.remove("/d");
        fs.write_file("/d", "now a file");

        let kind = |result: io::Result<Metadata>| result.unwrap_err().kind();
        assert_eq!(
            kind(fs.metadata(Path::new("/d/child.txt"))),
            io::ErrorKind::NotADirectory
        );
        assert_eq!(
            kind(fs.metadata(Path::new("/elsewhere/child.txt"))),
            io::ErrorKind::NotFound
        );
        assert_eq!(
            fs.read_dir(Path::new("/d")).err().map(|err| err.kind()),
            Some(io::ErrorKind::NotADirectory)
        );
    }
}
