//! Point and subtree refreshes of the file-state cache.
//!
//! These only mutate the cache; they don't serialize themselves against other
//! passes. Batch callers run them through a [`RefreshCoordinator`].
//!
//! [`RefreshCoordinator`]: crate::RefreshCoordinator

use std::path::Path;

use statefs::{FileState, FileStateCache};

use crate::ReconcileError;

/// Refreshes exactly `path`, discovering it if the cache has never seen it.
/// Returns `None` when nothing exists there.
pub fn refresh_path(
    cache: &FileStateCache,
    path: &Path,
) -> Result<Option<FileState>, ReconcileError> {
    cache
        .refresh_node(path)
        .map_err(|source| ReconcileError::refresh(path, source))
}

/// Refreshes `root` and hands back its cached state, for callers that need
/// to use a file they just created straight away.
pub fn find_created_file(
    cache: &FileStateCache,
    root: &Path,
) -> Result<Option<FileState>, ReconcileError> {
    refresh_path(cache, root)?;
    Ok(cache.get(root))
}

/// Refreshes `root` and every cached descendant, one node at a time.
///
/// `root` is resolved against the cache only. If it was never cached there is
/// nothing stale below it and this does nothing. Nodes are refreshed parents
/// first and each one individually, so descendants of a deleted or replaced
/// directory are dropped as they are visited. Returns how many nodes were
/// visited.
pub fn refresh_subtree(cache: &FileStateCache, root: &Path) -> Result<usize, ReconcileError> {
    let nodes = cache.read().subtree(root);

    if nodes.is_empty() {
        log::trace!("{} is not cached, skipping subtree refresh", root.display());
        return Ok(0);
    }

    for node in &nodes {
        refresh_path(cache, node)?;
    }

    log::trace!(
        "Refreshed {} nodes under {}",
        nodes.len(),
        root.display()
    );
    Ok(nodes.len())
}
