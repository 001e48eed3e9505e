//! Interactive confirmation hooks.
//!
//! The reconcilers never talk to a terminal; they hand a [`ProposedChange`]
//! or [`ProposedDeletion`] to a [`Confirmer`] and act on the [`Decision`].
//! Calls are serialized by the caller, so implementations may assume only
//! one prompt is in flight at a time.

use crate::diff::DiffLine;

/// Answer to a confirmation prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Decline,
    ApplyOnce,
    /// Apply this change and every later one in the run without asking.
    ApplyAll,
}

impl Decision {
    pub fn approves(self) -> bool {
        !matches!(self, Decision::Decline)
    }
}

/// A pending overwrite, local (pull) or remote (push).
#[derive(Debug, Clone)]
pub struct ProposedChange {
    /// Ledger key of the file being changed.
    pub path: String,
    pub lines: Vec<DiffLine>,
    pub before: Vec<u8>,
    pub after: Vec<u8>,
    /// Where the change is going, e.g. `"pull"` or `"push support/bot/main"`.
    pub context: String,
}

/// A pending remote skill deletion.
#[derive(Debug, Clone)]
pub struct ProposedDeletion {
    pub path: String,
    pub skill_idn: String,
    pub skill_id: String,
    pub context: String,
}

pub trait Confirmer: Send + Sync {
    fn confirm_change(&self, change: &ProposedChange) -> Decision;
    fn confirm_delete(&self, deletion: &ProposedDeletion) -> Decision;
}

/// Declines everything. Used when no terminal is attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeclineAll;

impl Confirmer for DeclineAll {
    fn confirm_change(&self, _change: &ProposedChange) -> Decision {
        Decision::Decline
    }

    fn confirm_delete(&self, _deletion: &ProposedDeletion) -> Decision {
        Decision::Decline
    }
}
