/*!
A cache of file states (existence, kind and content signature) backed by a
configurable filesystem backend.

statefs never watches the filesystem. Entries are only recomputed when a caller
asks for a path to be refreshed, which makes the cache suitable for on-demand
reconciliation after an external tool (a version control client, for example)
has changed files behind the process's back.

## Backends
* `StdBackend`, which uses `std::fs` through `fs-err`
* `NoopBackend`, which always throws errors
* `InMemoryFs`, a shared in-memory filesystem useful for testing

## Concurrency
Any number of threads may read the cache at once. Refreshing takes the backend
lock and then, separately, the entry write lock; callers that need a batch of
refreshes to never interleave with another batch must serialize those batches
themselves.
*/

mod in_memory_fs;
mod noop_backend;
mod std_backend;

use std::collections::BTreeMap;
use std::io;
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock, RwLockReadGuard};
use std::time::SystemTime;

use serde::Serialize;

pub use in_memory_fs::InMemoryFs;
pub use noop_backend::NoopBackend;
pub use std_backend::StdBackend;

mod sealed {
    use super::*;

    /// Sealing trait for VfsBackend.
    pub trait Sealed {}

    impl Sealed for NoopBackend {}
    impl Sealed for StdBackend {}
    impl Sealed for InMemoryFs {}
}

/// Trait that transforms `io::Result<T>` into `io::Result<Option<T>>`.
///
/// `Ok(None)` takes the place of IO errors that mean nothing exists at the
/// path: `NotFound`, and `NotADirectory` for paths that run through a file.
pub trait IoResultExt<T> {
    fn with_not_found(self) -> io::Result<Option<T>>;
}

impl<T> IoResultExt<T> for io::Result<T> {
    fn with_not_found(self) -> io::Result<Option<T>> {
        match self {
            Ok(v) => Ok(Some(v)),
            Err(err) => {
                if matches!(
                    err.kind(),
                    io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
                ) {
                    Ok(None)
                } else {
                    Err(err)
                }
            }
        }
    }
}

/// Backend that can be used to create a `FileStateCache`.
///
/// This trait is sealed and cannot not be implemented outside this crate.
pub trait VfsBackend: sealed::Sealed + Send + 'static {
    fn metadata(&mut self, path: &Path) -> io::Result<Metadata>;
    fn read_dir(&mut self, path: &Path) -> io::Result<ReadDir>;
}

/// Equivalent to [`std::fs::DirEntry`][std::fs::DirEntry].
///
/// [std::fs::DirEntry]: https://doc.rust-lang.org/stable/std/fs/struct.DirEntry.html
pub struct DirEntry {
    pub(crate) path: PathBuf,
}

impl DirEntry {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Equivalent to [`std::fs::ReadDir`][std::fs::ReadDir].
///
/// [std::fs::ReadDir]: https://doc.rust-lang.org/stable/std/fs/struct.ReadDir.html
pub struct ReadDir {
    pub(crate) inner: Box<dyn Iterator<Item = io::Result<DirEntry>>>,
}

impl Iterator for ReadDir {
    type Item = io::Result<DirEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

/// Equivalent to [`std::fs::Metadata`][std::fs::Metadata], trimmed down to
/// what the cache records.
///
/// [std::fs::Metadata]: https://doc.rust-lang.org/stable/std/fs/struct.Metadata.html
#[derive(Debug, Clone)]
pub struct Metadata {
    pub(crate) is_file: bool,
    pub(crate) len: u64,
    pub(crate) modified: Option<SystemTime>,
}

impl Metadata {
    pub fn is_file(&self) -> bool {
        self.is_file
    }

    pub fn is_dir(&self) -> bool {
        !self.is_file
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn modified(&self) -> Option<SystemTime> {
        self.modified
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FileKind {
    File,
    Directory,
}

/// Cheap stand-in for file contents. Two signatures that differ mean the
/// contents changed; equal signatures are only a strong hint that they didn't.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Signature {
    pub len: u64,
    pub modified: Option<SystemTime>,
}

/// The cached state of one path that existed the last time it was refreshed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileState {
    path: PathBuf,
    kind: FileKind,
    signature: Signature,
}

impl FileState {
    fn from_metadata(path: &Path, metadata: &Metadata) -> Self {
        Self {
            path: path.to_path_buf(),
            kind: if metadata.is_file() {
                FileKind::File
            } else {
                FileKind::Directory
            },
            signature: Signature {
                len: metadata.len(),
                modified: metadata.modified(),
            },
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> FileKind {
        self.kind
    }

    pub fn is_dir(&self) -> bool {
        self.kind == FileKind::Directory
    }

    pub fn signature(&self) -> Signature {
        self.signature
    }
}

type Entries = BTreeMap<PathBuf, FileState>;

/// A cache of file states with a configurable backend.
///
/// Entries are keyed by path. `Path`'s ordering is component-wise, so a
/// directory sorts directly before all of its descendants and a range scan
/// starting at a path yields its subtree in depth-first order.
pub struct FileStateCache {
    backend: Mutex<Box<dyn VfsBackend>>,
    entries: RwLock<Entries>,
    refreshes: AtomicU64,
}

impl FileStateCache {
    /// Creates a new `FileStateCache` with the default backend, `StdBackend`.
    pub fn new_default() -> Self {
        Self::new(StdBackend::new())
    }

    /// Creates a new, empty `FileStateCache` with the given backend.
    pub fn new<B: VfsBackend>(backend: B) -> Self {
        Self {
            backend: Mutex::new(Box::new(backend)),
            entries: RwLock::new(BTreeMap::new()),
            refreshes: AtomicU64::new(0),
        }
    }

    /// Takes a read guard over the cached entries. Refreshes block until the
    /// guard is dropped, so keep it short-lived.
    pub fn read(&self) -> CacheReadGuard<'_> {
        CacheReadGuard {
            entries: self.entries.read().unwrap(),
        }
    }

    /// Returns the cached state for `path` without touching the backend.
    pub fn get<P: AsRef<Path>>(&self, path: P) -> Option<FileState> {
        self.read().get(path)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of node refreshes performed since creation.
    pub fn refresh_count(&self) -> u64 {
        self.refreshes.load(Ordering::Relaxed)
    }

    /// Recomputes the cached state of exactly one path from the backend.
    /// No other entry is touched.
    ///
    /// * If nothing exists at the path, its entry is removed and `Ok(None)` is
    ///   returned. Cached descendants stay until they are refreshed
    ///   themselves.
    /// * Otherwise its entry is inserted or replaced. Paths that were never
    ///   cached are discovered this way.
    pub fn refresh_node<P: AsRef<Path>>(&self, path: P) -> io::Result<Option<FileState>> {
        let path = path.as_ref();
        self.refreshes.fetch_add(1, Ordering::Relaxed);

        let metadata = self
            .backend
            .lock()
            .unwrap()
            .metadata(path)
            .with_not_found()?;
        let mut entries = self.entries.write().unwrap();

        match metadata {
            Some(metadata) => {
                let state = FileState::from_metadata(path, &metadata);
                if entries.get(path) != Some(&state) {
                    log::trace!("Refreshed {} ({:?})", path.display(), state.kind());
                }
                entries.insert(path.to_path_buf(), state.clone());
                Ok(Some(state))
            }
            None => {
                if entries.remove(path).is_some() {
                    log::trace!("Dropped missing path {}", path.display());
                }
                Ok(None)
            }
        }
    }

    /// Caches `root` and everything the backend lists below it.
    ///
    /// `include` is asked about every path below `root`; a rejected directory
    /// is skipped along with its contents. Returns how many paths ended up
    /// cached.
    pub fn scan<P, F>(&self, root: P, mut include: F) -> io::Result<usize>
    where
        P: AsRef<Path>,
        F: FnMut(&Path) -> bool,
    {
        let mut pending = vec![root.as_ref().to_path_buf()];
        let mut cached = 0;

        while let Some(path) = pending.pop() {
            let Some(state) = self.refresh_node(&path)? else {
                continue;
            };
            cached += 1;

            if !state.is_dir() {
                continue;
            }

            let listing = self.backend.lock().unwrap().read_dir(&path).with_not_found()?;
            if let Some(listing) = listing {
                for entry in listing {
                    let child = entry?.path;
                    if include(&child) {
                        pending.push(child);
                    }
                }
            }
        }

        Ok(cached)
    }
}

/// A read-locked view of a [`FileStateCache`], created by
/// [`FileStateCache::read`].
pub struct CacheReadGuard<'a> {
    entries: RwLockReadGuard<'a, Entries>,
}

impl CacheReadGuard<'_> {
    pub fn get<P: AsRef<Path>>(&self, path: P) -> Option<FileState> {
        self.entries.get(path.as_ref()).cloned()
    }

    pub fn contains<P: AsRef<Path>>(&self, path: P) -> bool {
        self.entries.contains_key(path.as_ref())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns `root` followed by every cached descendant, parents before
    /// children. Empty if `root` itself isn't cached.
    pub fn subtree<P: AsRef<Path>>(&self, root: P) -> Vec<PathBuf> {
        let root = root.as_ref();
        if !self.entries.contains_key(root) {
            return Vec::new();
        }

        subtree_keys(&self.entries, root).cloned().collect()
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.entries.keys().map(PathBuf::as_path)
    }
}

fn subtree_keys<'a>(entries: &'a Entries, root: &'a Path) -> impl Iterator<Item = &'a PathBuf> {
    entries
        .range::<Path, _>((Bound::Included(root), Bound::Unbounded))
        .map(|(path, _)| path)
        .take_while(move |path| path.starts_with(root))
}

#[cfg(test)]
mod test {
    use super::*;
    use std::time::Duration;

    fn tree() -> (InMemoryFs, FileStateCache) {
        let fs = InMemoryFs::new();
        fs.write_file("/root/a/one.txt", "one");
        fs.write_file("/root/a/two.txt", "two");
        fs.write_file("/root/b.txt", "b");
        let cache = FileStateCache::new(fs.clone());
        (fs, cache)
    }

    fn refresh_all(cache: &FileStateCache, paths: &[&str]) {
        for path in paths {
            cache.refresh_node(path).unwrap();
        }
    }

    #[test]
    fn refresh_discovers_uncached_path() {
        let (_fs, cache) = tree();
        assert!(cache.is_empty());

        let state = cache.refresh_node("/root/b.txt").unwrap().unwrap();
        assert_eq!(state.kind(), FileKind::File);
        assert_eq!(state.signature().len, 1);
        assert_eq!(cache.get("/root/b.txt"), Some(state));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn refresh_missing_path_is_none() {
        let (_fs, cache) = tree();
        assert_eq!(cache.refresh_node("/nowhere").unwrap(), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn refresh_of_deleted_directory_drops_only_its_entry() {
        let (fs, cache) = tree();
        refresh_all(&cache, &["/root", "/root/a", "/root/a/one.txt", "/root/a/two.txt"]);

        fs.remove("/root/a");
        assert_eq!(cache.refresh_node("/root/a").unwrap(), None);

        let guard = cache.read();
        assert!(guard.contains("/root"));
        assert!(!guard.contains("/root/a"));
        assert!(guard.contains("/root/a/one.txt"));
        assert!(guard.contains("/root/a/two.txt"));
    }

    #[test]
    fn directory_refresh_leaves_children_alone() {
        let (fs, cache) = tree();
        refresh_all(&cache, &["/root/a", "/root/a/one.txt", "/root/a/two.txt"]);
        let len_before = cache.len();

        fs.remove("/root/a/one.txt");
        fs.write_file("/root/a/three.txt", "three");
        cache.refresh_node("/root/a").unwrap();

        let guard = cache.read();
        assert_eq!(guard.len(), len_before);
        assert!(guard.contains("/root/a/one.txt"));
        assert!(!guard.contains("/root/a/three.txt"));
    }

    #[test]
    fn shallow_refresh_does_not_touch_children_signatures() {
        let (fs, cache) = tree();
        refresh_all(&cache, &["/root/a", "/root/a/one.txt"]);
        let before = cache.get("/root/a/one.txt").unwrap();

        fs.write_file("/root/a/one.txt", "changed contents");
        cache.refresh_node("/root/a").unwrap();
        assert_eq!(cache.get("/root/a/one.txt").unwrap(), before);

        cache.refresh_node("/root/a/one.txt").unwrap();
        assert_ne!(cache.get("/root/a/one.txt").unwrap(), before);
    }

    #[test]
    fn path_below_a_replaced_directory_is_a_miss() {
        let (fs, cache) = tree();
        refresh_all(&cache, &["/root/a", "/root/a/one.txt"]);

        fs.remove("/root/a");
        fs.write_file("/root/a", "now a file");
        let state = cache.refresh_node("/root/a").unwrap().unwrap();
        assert_eq!(state.kind(), FileKind::File);
        assert!(cache.read().contains("/root/a/one.txt"));

        assert_eq!(cache.refresh_node("/root/a/one.txt").unwrap(), None);
        assert!(!cache.read().contains("/root/a/one.txt"));
    }

    #[test]
    fn not_a_directory_counts_as_not_found() {
        let err: io::Result<()> = Err(io::Error::from(io::ErrorKind::NotADirectory));
        assert_eq!(err.with_not_found().unwrap(), None);

        let err: io::Result<()> = Err(io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(err.with_not_found().is_err());
    }

    #[test]
    fn scan_caches_whole_tree() {
        let (_fs, cache) = tree();
        let cached = cache.scan("/root", |_| true).unwrap();

        assert_eq!(cached, 5);
        assert_eq!(
            cache.read().subtree("/root"),
            vec![
                PathBuf::from("/root"),
                PathBuf::from("/root/a"),
                PathBuf::from("/root/a/one.txt"),
                PathBuf::from("/root/a/two.txt"),
                PathBuf::from("/root/b.txt"),
            ]
        );
    }

    #[test]
    fn scan_skips_rejected_directories() {
        let (_fs, cache) = tree();
        let cached = cache
            .scan("/root", |path| path != Path::new("/root/a"))
            .unwrap();

        assert_eq!(cached, 2);
        assert!(!cache.read().contains("/root/a"));
        assert!(!cache.read().contains("/root/a/one.txt"));
        assert!(cache.read().contains("/root/b.txt"));
    }

    #[test]
    fn scan_of_missing_root_caches_nothing() {
        let (_fs, cache) = tree();
        assert_eq!(cache.scan("/elsewhere", |_| true).unwrap(), 0);
        assert!(cache.is_empty());
    }

    #[test]
    fn subtree_is_depth_first_and_bounded() {
        let fs = InMemoryFs::new();
        fs.write_file("/r/a/x", "");
        fs.write_file("/r/a/y/z", "");
        fs.write_file("/r/a-b", "");
        fs.write_file("/r/b", "");
        let cache = FileStateCache::new(fs);
        refresh_all(&cache, &["/r/b", "/r/a-b", "/r/a/y/z", "/r/a/y", "/r/a/x", "/r/a"]);

        let subtree = cache.read().subtree("/r/a");
        assert_eq!(
            subtree,
            vec![
                PathBuf::from("/r/a"),
                PathBuf::from("/r/a/x"),
                PathBuf::from("/r/a/y"),
                PathBuf::from("/r/a/y/z"),
            ]
        );
    }

    #[test]
    fn subtree_of_uncached_root_is_empty() {
        let (_fs, cache) = tree();
        cache.refresh_node("/root/a/one.txt").unwrap();
        assert!(cache.read().subtree("/root/a").is_empty());
    }

    #[test]
    fn refresh_count_tracks_every_call() {
        let (_fs, cache) = tree();
        refresh_all(&cache, &["/root", "/missing", "/root"]);
        assert_eq!(cache.refresh_count(), 3);
    }

    #[test]
    fn backend_errors_propagate() {
        let cache = FileStateCache::new(NoopBackend::new());
        let err = cache.refresh_node("/anything").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Other);
    }

    #[test]
    fn std_backend_tracks_real_files() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("file.txt");
        fs_err::write(&file_path, "hello").unwrap();

        let cache = FileStateCache::new(StdBackend::new());
        let first = cache.refresh_node(&file_path).unwrap().unwrap();
        assert_eq!(first.signature().len, 5);

        fs_err::write(&file_path, "hello world").unwrap();
        let later = SystemTime::now() + Duration::from_secs(10);
        filetime::set_file_mtime(&file_path, filetime::FileTime::from_system_time(later)).unwrap();

        let second = cache.refresh_node(&file_path).unwrap().unwrap();
        assert_eq!(second.signature().len, 11);
        assert_ne!(first.signature(), second.signature());

        fs_err::remove_file(&file_path).unwrap();
        assert_eq!(cache.refresh_node(&file_path).unwrap(), None);
        assert_eq!(cache.get(&file_path), None);
    }

    #[test]
    fn std_backend_path_through_a_file_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("plain.txt");
        fs_err::write(&file_path, "plain").unwrap();

        let cache = FileStateCache::new(StdBackend::new());
        assert_eq!(cache.refresh_node(file_path.join("child")).unwrap(), None);
    }

    #[test]
    fn concurrent_readers_during_refresh() {
        use std::sync::Arc;

        let fs = InMemoryFs::new();
        for i in 0..50 {
            fs.write_file(format!("/dir/file_{i}.txt"), format!("content_{i}"));
        }
        let cache = Arc::new(FileStateCache::new(fs));
        cache.refresh_node("/dir").unwrap();

        let handles: Vec<_> = (0..50)
            .map(|i| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    let path = format!("/dir/file_{i}.txt");
                    cache.refresh_node(&path).unwrap();
                    assert!(cache.read().contains("/dir"));
                    assert!(cache.get(&path).is_some(), "File {i} missing after refresh");
                })
            })
            .collect();

        for h in handles {
            h.join().expect("Thread panicked");
        }
        assert_eq!(cache.read().subtree("/dir").len(), 51);
    }
}
