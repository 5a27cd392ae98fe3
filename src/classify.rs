//! Decides how much of the cache a single change record invalidates.

use std::path::PathBuf;

use crate::change::ChangeRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshKind {
    /// Refresh exactly one node.
    Point,
    /// Refresh the node and every cached descendant, one node at a time.
    Subtree,
}

/// What a reconciliation pass has to do for one change record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshPlan {
    pub before: Option<(PathBuf, RefreshKind)>,
    /// Always a point refresh.
    pub after: Option<PathBuf>,
}

/// A move, rename, replacement or deletion can orphan or shadow entries
/// below the old location, so the before side gets a subtree refresh. A plain
/// edit only needs the node itself. The after side is skipped when it is
/// equal (path and revision) to the before side.
pub fn classify(change: &ChangeRecord) -> RefreshPlan {
    let before = change.before().map(|before| {
        let kind = if change.is_moved()
            || change.is_renamed()
            || change.is_replaced()
            || change.after().is_none()
        {
            RefreshKind::Subtree
        } else {
            RefreshKind::Point
        };
        (before.path.clone(), kind)
    });

    let after = change
        .after()
        .filter(|after| change.before() != Some(*after))
        .map(|after| after.path.clone());

    RefreshPlan { before, after }
}
