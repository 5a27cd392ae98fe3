//! Change records produced by a version control client: one logical file on
//! either side of a revision boundary.

use std::{
    fmt,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A path on one side of a change, plus the revision it was taken at.
///
/// `revision` is `None` for the working copy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
}

impl Location {
    pub fn working<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            revision: None,
        }
    }

    pub fn at_revision<P: Into<PathBuf>, R: Into<String>>(path: P, revision: R) -> Self {
        Self {
            path: path.into(),
            revision: Some(revision.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn resolve_against(&mut self, root: &Path) {
        if self.path.is_relative() {
            self.path = root.join(&self.path);
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.revision {
            Some(revision) => write!(f, "{}@{}", self.path.display(), revision),
            None => write!(f, "{}", self.path.display()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    New,
    Deleted,
    Moved,
    Modification,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChangeRecordError {
    #[error("A change record needs a before location, an after location, or both")]
    Empty,
}

/// One logical change to one file. Immutable once built; at least one of
/// `before` and `after` is always present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawChangeRecord")]
pub struct ChangeRecord {
    before: Option<Location>,
    after: Option<Location>,
    moved: bool,
    renamed: bool,
    replaced: bool,
}

impl ChangeRecord {
    pub fn new(
        before: Option<Location>,
        after: Option<Location>,
    ) -> Result<Self, ChangeRecordError> {
        if before.is_none() && after.is_none() {
            return Err(ChangeRecordError::Empty);
        }

        Ok(Self {
            before,
            after,
            moved: false,
            renamed: false,
            replaced: false,
        })
    }

    pub fn added(after: Location) -> Self {
        Self::from_sides(None, Some(after))
    }

    pub fn deleted(before: Location) -> Self {
        Self::from_sides(Some(before), None)
    }

    pub fn modified(before: Location, after: Location) -> Self {
        Self::from_sides(Some(before), Some(after))
    }

    /// Builds a change between two existing locations, deriving the move and
    /// rename flags from their paths: a different parent directory is a move,
    /// the same parent with a different name is a rename.
    pub fn between(before: Location, after: Location) -> Self {
        let same_parent = before.path.parent() == after.path.parent();
        let same_name = before.path.file_name() == after.path.file_name();

        Self {
            moved: !same_parent,
            renamed: same_parent && !same_name,
            ..Self::modified(before, after)
        }
    }

    fn from_sides(before: Option<Location>, after: Option<Location>) -> Self {
        Self {
            before,
            after,
            moved: false,
            renamed: false,
            replaced: false,
        }
    }

    pub fn with_moved(mut self, moved: bool) -> Self {
        self.moved = moved;
        self
    }

    pub fn with_renamed(mut self, renamed: bool) -> Self {
        self.renamed = renamed;
        self
    }

    pub fn with_replaced(mut self, replaced: bool) -> Self {
        self.replaced = replaced;
        self
    }

    pub fn before(&self) -> Option<&Location> {
        self.before.as_ref()
    }

    pub fn after(&self) -> Option<&Location> {
        self.after.as_ref()
    }

    pub fn is_moved(&self) -> bool {
        self.moved
    }

    pub fn is_renamed(&self) -> bool {
        self.renamed
    }

    pub fn is_replaced(&self) -> bool {
        self.replaced
    }

    pub fn kind(&self) -> ChangeKind {
        match (&self.before, &self.after) {
            (None, _) => ChangeKind::New,
            (_, None) => ChangeKind::Deleted,
            (Some(before), Some(after)) => {
                if self.moved || self.renamed || before.path != after.path {
                    ChangeKind::Moved
                } else {
                    ChangeKind::Modification
                }
            }
        }
    }

    /// Makes relative paths on both sides absolute against `root`.
    pub fn resolve_against(&mut self, root: &Path) {
        if let Some(before) = &mut self.before {
            before.resolve_against(root);
        }
        if let Some(after) = &mut self.after {
            after.resolve_against(root);
        }
    }
}

impl fmt::Display for ChangeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.kind(), &self.before, &self.after) {
            (ChangeKind::New, _, Some(after)) => write!(f, "A: {}", after),
            (ChangeKind::Deleted, Some(before), _) => write!(f, "D: {}", before),
            (ChangeKind::Moved, Some(before), Some(after)) => {
                write!(f, "M: {} -> {}", before, after)
            }
            (_, _, Some(after)) => write!(f, "M: {}", after),
            (_, Some(before), None) => write!(f, "M: {}", before),
            (_, None, None) => Ok(()),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawChangeRecord {
    #[serde(default)]
    before: Option<Location>,
    #[serde(default)]
    after: Option<Location>,
    #[serde(default)]
    moved: bool,
    #[serde(default)]
    renamed: bool,
    #[serde(default)]
    replaced: bool,
}

impl TryFrom<RawChangeRecord> for ChangeRecord {
    type Error = ChangeRecordError;

    fn try_from(raw: RawChangeRecord) -> Result<Self, Self::Error> {
        Ok(ChangeRecord::new(raw.before, raw.after)?
            .with_moved(raw.moved)
            .with_renamed(raw.renamed)
            .with_replaced(raw.replaced))
    }
}
