//! Batch entry points that bring the file-state cache back in sync with disk.

use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::Serialize;
use statefs::{FileState, FileStateCache};

use crate::{
    change::ChangeRecord,
    classify::{classify, RefreshKind},
    coordinator::RefreshCoordinator,
    progress::{NoProgress, ProgressReporter, ProgressSink},
    refresh::{find_created_file, refresh_path, refresh_subtree},
    update_group::{GroupId, UpdatedFiles},
    ReconcileError,
};

/// Summary of one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    /// Units the pass was sized for up front.
    pub units: usize,
    /// Units actually processed.
    pub processed: usize,
}

/// Runs reconciliation passes against a shared cache.
///
/// Clones share the cache, the coordinator and the progress sink. Every
/// reconciler that touches the same cache must share one coordinator, or
/// passes may interleave.
#[derive(Clone)]
pub struct Reconciler {
    cache: Arc<FileStateCache>,
    coordinator: Arc<RefreshCoordinator>,
    progress: Arc<dyn ProgressSink>,
}

impl Reconciler {
    /// Creates a reconciler with its own coordinator thread.
    pub fn new(cache: Arc<FileStateCache>) -> io::Result<Self> {
        let coordinator = Arc::new(RefreshCoordinator::start()?);
        Ok(Self::with_coordinator(cache, coordinator))
    }

    pub fn with_coordinator(
        cache: Arc<FileStateCache>,
        coordinator: Arc<RefreshCoordinator>,
    ) -> Self {
        Self {
            cache,
            coordinator,
            progress: NoProgress::shared(),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn cache(&self) -> &Arc<FileStateCache> {
        &self.cache
    }

    /// Reconciles every file named by a grouped update result.
    ///
    /// Files removed from the repository get a subtree refresh and are handled
    /// before everything else; all other files get a point refresh. One unit
    /// per file.
    pub fn update_all_changed(
        &self,
        updated: &UpdatedFiles,
    ) -> Result<ReconcileReport, ReconcileError> {
        self.progress.set_indeterminate(false);

        let units = updated.file_count();
        let entries: Vec<(GroupId, PathBuf)> = updated
            .iter_deleted_on_server_first()
            .map(|(group, path)| (group, path.to_path_buf()))
            .collect();

        log::debug!("Reconciling {} files from grouped update", units);

        let cache = Arc::clone(&self.cache);
        let sink = Arc::clone(&self.progress);

        self.coordinator.run_exclusive(&*self.progress, move || {
            let mut reporter = ProgressReporter::new(units as f64, sink);

            for (group, path) in &entries {
                if group.is_removed_from_repository() {
                    refresh_subtree(&cache, path)?;
                } else {
                    refresh_path(&cache, path)?;
                }
                reporter.report_one(&format!("Refreshing {}", path.display()));
            }

            Ok(ReconcileReport {
                units,
                processed: reporter.done(),
            })
        })
    }

    /// Reconciles a flat list of change records, in list order.
    ///
    /// One unit per record, even when a record expands into a subtree
    /// refresh that touches many nodes.
    pub fn update_changes(
        &self,
        changes: &[ChangeRecord],
    ) -> Result<ReconcileReport, ReconcileError> {
        self.progress.set_indeterminate(false);

        let units = changes.len();
        let changes = changes.to_vec();

        log::debug!("Reconciling {} change records", units);

        let cache = Arc::clone(&self.cache);
        let sink = Arc::clone(&self.progress);

        self.coordinator.run_exclusive(&*self.progress, move || {
            let mut reporter = ProgressReporter::new(units as f64, sink);

            for change in &changes {
                let plan = classify(change);

                match &plan.before {
                    Some((path, RefreshKind::Subtree)) => {
                        refresh_subtree(&cache, path)?;
                    }
                    Some((path, RefreshKind::Point)) => {
                        refresh_path(&cache, path)?;
                    }
                    None => {}
                }
                if let Some(path) = &plan.after {
                    refresh_path(&cache, path)?;
                }

                reporter.report_one(&format!("Refreshing: {}", change));
            }

            Ok(ReconcileReport {
                units,
                processed: reporter.done(),
            })
        })
    }

    /// Refreshes one path outside of any batch and returns its state.
    pub fn refresh_path(&self, path: &Path) -> Result<Option<FileState>, ReconcileError> {
        refresh_path(&self.cache, path)
    }

    /// Refreshes a freshly created path and returns its cached state.
    pub fn find_created_file(&self, path: &Path) -> Result<Option<FileState>, ReconcileError> {
        find_created_file(&self.cache, path)
    }
}
