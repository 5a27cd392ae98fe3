use std::io;
use std::path::Path;

use crate::{DirEntry, Metadata, ReadDir, VfsBackend};

/// `VfsBackend` that uses `std::fs` through `fs-err`.
#[derive(Debug, Default)]
pub struct StdBackend {
    _private: (),
}

impl StdBackend {
    pub fn new() -> StdBackend {
        Self { _private: () }
    }
}

impl VfsBackend for StdBackend {
    fn metadata(&mut self, path: &Path) -> io::Result<Metadata> {
        let inner = fs_err::metadata(path)?;

        Ok(Metadata {
            is_file: !inner.is_dir(),
            len: inner.len(),
            modified: inner.modified().ok(),
        })
    }

    fn read_dir(&mut self, path: &Path) -> io::Result<ReadDir> {
        let entries: Result<Vec<_>, _> = fs_err::read_dir(path)?.collect();
        let mut entries = entries?;

        entries.sort_by_cached_key(|entry| entry.file_name());

        let inner = entries
            .into_iter()
            .map(|entry| Ok(DirEntry { path: entry.path() }));

        Ok(ReadDir {
            inner: Box::new(inner),
        })
    }
}
