//! flowsync core library — entity map types, persistence, metadata, config.
//!
//! - [`types`] — entity map and metadata records
//! - [`project_map`] — load / save of the per-customer entity map
//! - [`metadata`] — `*.meta.yaml` and generated `flows.yaml`
//! - [`paths`] — workspace layout and ledger-key normalization
//! - [`config`] — `flowsync.yaml`
//! - [`error`] — [`CoreError`]

pub mod config;
pub mod error;
pub mod metadata;
pub mod paths;
pub mod project_map;
pub mod types;

pub use error::CoreError;
pub use types::{
    AgentEntry, CustomerIdn, FlowEntry, FlowEvent, FlowKey, FlowMeta, ModelRef, ProjectEntry,
    ProjectMap, SkillInfo, SkillMeta, SkillParameter, StateField,
};
