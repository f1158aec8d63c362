//! Change detection between a known build and the remote's report.
//!
//! Two independent predicates gate the reconciler's side effects:
//!
//! 1. [`transitioned_to_failed`]: gates the failure alert.
//! 2. [`changed`]: gates persist + push.
//!
//! Both compare the previous snapshot with the *update* the remote just
//! reported, not with the merged result. A field the update omits is never
//! a difference.

use std::fmt;

use monitor_core::{BuildSnapshot, BuildUpdate};

/// A snapshot field that takes part in change detection. `id` and `user`
/// never do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackedField {
    Status,
    Branch,
    IsInvalid,
    CommitSha,
    FinishedAtTime,
}

impl TrackedField {
    pub fn all() -> &'static [TrackedField] {
        &[
            TrackedField::Status,
            TrackedField::Branch,
            TrackedField::IsInvalid,
            TrackedField::CommitSha,
            TrackedField::FinishedAtTime,
        ]
    }

    /// Whether `update` reports a value for this field that differs from `previous`.
    pub fn differs(self, previous: &BuildSnapshot, update: &BuildUpdate) -> bool {
        match self {
            TrackedField::Status => reported_differs(update.status.as_ref(), &previous.status),
            TrackedField::Branch => reported_differs(update.branch.as_ref(), &previous.branch),
            TrackedField::IsInvalid => {
                reported_differs(update.is_invalid.as_ref(), &previous.is_invalid)
            }
            TrackedField::CommitSha => {
                reported_differs(update.commit_sha.as_ref(), &previous.commit_sha)
            }
            TrackedField::FinishedAtTime => reported_differs(
                update.finished_at_time.as_ref(),
                &previous.finished_at_time,
            ),
        }
    }
}

impl fmt::Display for TrackedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackedField::Status => write!(f, "status"),
            TrackedField::Branch => write!(f, "branch"),
            TrackedField::IsInvalid => write!(f, "isInvalid"),
            TrackedField::CommitSha => write!(f, "commitSha"),
            TrackedField::FinishedAtTime => write!(f, "finishedAtTime"),
        }
    }
}

/// True iff the previous status lacks `"failed"` and the reported status holds it.
pub fn transitioned_to_failed(previous: &BuildSnapshot, update: &BuildUpdate) -> bool {
    !previous.status.is_failed()
        && update
            .status
            .as_ref()
            .map(|status| status.is_failed())
            .unwrap_or(false)
}

/// True iff any tracked field reported by `update` differs from `previous`.
pub fn changed(previous: &BuildSnapshot, update: &BuildUpdate) -> bool {
    TrackedField::all()
        .iter()
        .any(|field| field.differs(previous, update))
}

/// The tracked fields that differ, in declaration order.
pub fn changed_fields(previous: &BuildSnapshot, update: &BuildUpdate) -> Vec<TrackedField> {
    TrackedField::all()
        .iter()
        .copied()
        .filter(|field| field.differs(previous, update))
        .collect()
}

fn reported_differs<T: PartialEq>(reported: Option<&T>, known: &T) -> bool {
    match reported {
        Some(value) => value != known,
        None => false,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
