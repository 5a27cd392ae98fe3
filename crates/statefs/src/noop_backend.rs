use std::io;
use std::path::Path;

use crate::{Metadata, ReadDir, VfsBackend};

/// `VfsBackend` that errors on every operation.
#[non_exhaustive]
#[derive(Debug, Default)]
pub struct NoopBackend;

impl NoopBackend {
    pub fn new() -> Self {
        Self
    }
}

impl VfsBackend for NoopBackend {
    fn metadata(&mut self, _path: &Path) -> io::Result<Metadata> {
        Err(io::Error::other("NoopBackend doesn't do anything"))
    }

    fn read_dir(&mut self, _path: &Path) -> io::Result<ReadDir> {
        Err(io::Error::other("NoopBackend doesn't do anything"))
    }
}
