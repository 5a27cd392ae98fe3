//! Brings a cached file-state tree back in line with disk after a version
//! control operation changed files behind the process's back.
//!
//! Everything funnels through [`Reconciler`], which runs each pass on a single
//! [`RefreshCoordinator`] thread and blocks the caller until the pass is done.

pub mod change;
pub mod classify;
pub mod cli;
pub mod config;
pub mod coordinator;
mod error;
pub mod logging;
pub mod progress;
pub mod reconcile;
pub mod refresh;
pub mod update_group;

pub use change::{ChangeKind, ChangeRecord, ChangeRecordError, Location};
pub use classify::{classify, RefreshKind, RefreshPlan};
pub use config::Config;
pub use coordinator::RefreshCoordinator;
pub use error::{ConfigSource, InputSource, ReconcileError};
pub use progress::{LogProgress, NoProgress, ProgressReporter, ProgressSink};
pub use reconcile::{ReconcileReport, Reconciler};
pub use update_group::{ChildGroup, FileGroup, GroupId, UpdatedFiles};
