//! # flowsync-sync
//!
//! Hash-based two-way synchronization between a local flow tree and the
//! remote platform.
//!
//! - [`pull::pull`] reconciles remote state into the tree
//! - [`SkillSyncService::push`] reconciles the tree into the platform
//! - [`pipeline::merge`] runs both under one lock
//! - [`status::check`] reports local changes offline
//!
//! The remote side is reached only through the [`Platform`] trait and the
//! operator only through the [`Confirmer`] trait.

pub mod confirm;
pub mod diff;
pub mod error;
pub mod hash_store;
pub mod lock;
pub mod pipeline;
pub mod pool;
pub mod pull;
pub mod push;
pub mod reconcile;
pub mod remote;
pub mod snapshot;
pub mod status;
pub mod workspace;

pub use confirm::{Confirmer, DeclineAll, Decision, ProposedChange, ProposedDeletion};
pub use error::SyncError;
pub use lock::WorkspaceLock;
pub use pipeline::MergeReport;
pub use pull::{PullOptions, PullReport};
pub use push::{PushOptions, PushReport, SkillSyncService};
pub use remote::{
    NewSkill, Platform, RemoteAgent, RemoteError, RemoteFlow, RemoteProject, RemoteSkill,
};
pub use status::{FileState, StatusEntry, StatusReport};
pub use workspace::Workspace;
