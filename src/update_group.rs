//! Grouped results of an update or checkout: files bucketed by what happened
//! to them.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// The fixed set of group identifiers an update result can use.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum GroupId {
    Unknown,
    ChangedOnServer,
    LocallyAdded,
    LocallyRemoved,
    Updated,
    Created,
    RemovedFromRepository,
    Restored,
    Modified,
    Skipped,
    Merged,
    MergedWithConflict,
    MergedWithTreeConflict,
    MergedWithPropertyConflict,
    Switched,
}

impl GroupId {
    /// Files in these groups vanished from the repository, so everything the
    /// cache knows below them may be stale.
    pub fn is_removed_from_repository(self) -> bool {
        self == GroupId::RemovedFromRepository
    }
}

/// A nested group. Child groups hold files only and never nest further.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ChildGroup {
    pub id: GroupId,
    #[serde(default)]
    pub files: Vec<PathBuf>,
}

impl ChildGroup {
    pub fn new(id: GroupId) -> Self {
        Self {
            id,
            files: Vec::new(),
        }
    }

    pub fn with_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.files.push(path.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileGroup {
    pub id: GroupId,
    #[serde(default)]
    pub files: Vec<PathBuf>,
    #[serde(default)]
    pub children: Vec<ChildGroup>,
}

impl FileGroup {
    pub fn new(id: GroupId) -> Self {
        Self {
            id,
            files: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.files.push(path.into());
        self
    }

    pub fn with_child(mut self, child: ChildGroup) -> Self {
        self.children.push(child);
        self
    }

    pub fn immediate_files_len(&self) -> usize {
        self.files.len()
    }
}

/// Every group produced by one update, in the order the update reported them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatedFiles {
    #[serde(default)]
    pub groups: Vec<FileGroup>,
}

impl UpdatedFiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_group(mut self, group: FileGroup) -> Self {
        self.groups.push(group);
        self
    }

    pub fn top_level_groups(&self) -> &[FileGroup] {
        &self.groups
    }

    pub fn group(&self, id: GroupId) -> Option<&FileGroup> {
        self.groups.iter().find(|group| group.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.file_count() == 0
    }

    /// Immediate files of every top-level group plus immediate files of their
    /// direct children.
    pub fn file_count(&self) -> usize {
        self.groups
            .iter()
            .map(|group| {
                group.immediate_files_len()
                    + group
                        .children
                        .iter()
                        .map(|child| child.files.len())
                        .sum::<usize>()
            })
            .sum()
    }

    /// Flattens every group into `(group, path)` pairs, computed once.
    ///
    /// Files removed from the repository come first, wherever they sit in the
    /// hierarchy, so their subtrees are invalidated before anything else is
    /// refreshed. Within each phase groups keep their reported order and a
    /// group's children are visited before its own files.
    pub fn iter_deleted_on_server_first(&self) -> impl Iterator<Item = (GroupId, &Path)> + '_ {
        let mut removed = Vec::new();
        let mut rest = Vec::new();

        for group in &self.groups {
            let nodes = group
                .children
                .iter()
                .map(|child| (child.id, &child.files))
                .chain(std::iter::once((group.id, &group.files)));

            for (id, files) in nodes {
                let bucket = if id.is_removed_from_repository() {
                    &mut removed
                } else {
                    &mut rest
                };
                bucket.extend(files.iter().map(|path| (id, path.as_path())));
            }
        }

        removed.into_iter().chain(rest)
    }

    /// Makes every relative path absolute against `root`.
    pub fn resolve_against(&mut self, root: &Path) {
        let resolve = |files: &mut Vec<PathBuf>| {
            for path in files.iter_mut() {
                if path.is_relative() {
                    *path = root.join(&*path);
                }
            }
        };

        for group in &mut self.groups {
            resolve(&mut group.files);
            for child in &mut group.children {
                resolve(&mut child.files);
            }
        }
    }
}
