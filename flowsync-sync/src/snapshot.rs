//! Per-run cache of each flow's remote skill listing.
//!
//! The first lookup in a flow lists its skills once and indexes them by
//! remote id and by lowercase IDN. An update, creation or deletion in a flow
//! invalidates that flow's entry, so a later lookup in the same run re-lists
//! instead of reading a snapshot that predates the mutation. A miss falls
//! back to fetching the skill by id and, on success, stores the result in
//! the flow's entry.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::SyncError;
use crate::remote::{Platform, RemoteError, RemoteSkill};

#[derive(Debug, Default, Clone)]
pub struct FlowSnapshot {
    by_id: HashMap<String, RemoteSkill>,
    /// Lowercase IDN → remote id.
    by_idn: HashMap<String, String>,
}

impl FlowSnapshot {
    pub fn from_skills(skills: Vec<RemoteSkill>) -> Self {
        let mut snapshot = Self::default();
        for skill in skills {
            snapshot.insert(skill);
        }
        snapshot
    }

    pub fn insert(&mut self, skill: RemoteSkill) {
        self.by_idn
            .insert(skill.idn.to_lowercase(), skill.id.clone());
        self.by_id.insert(skill.id.clone(), skill);
    }

    /// By id first, then by case-insensitive IDN.
    pub fn find(&self, id: &str, idn: &str) -> Option<&RemoteSkill> {
        if let Some(skill) = self.by_id.get(id) {
            return Some(skill);
        }
        self.by_idn
            .get(&idn.to_lowercase())
            .and_then(|id| self.by_id.get(id))
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

type Slot = Arc<Mutex<Option<FlowSnapshot>>>;

/// Flow id → snapshot. The outer lock only guards the slot table; each
/// flow's slot has its own lock, held across that flow's listing call.
#[derive(Debug, Default)]
pub struct FlowSnapshotCache {
    slots: Mutex<HashMap<String, Slot>>,
}

impl FlowSnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    async fn slot(&self, flow_id: &str) -> Slot {
        let mut slots = self.slots.lock().await;
        slots.entry(flow_id.to_string()).or_default().clone()
    }

    /// Find a remote skill of `flow_id`. `Ok(None)` means the platform no
    /// longer has it.
    pub async fn lookup(
        &self,
        platform: &dyn Platform,
        flow_id: &str,
        skill_id: &str,
        skill_idn: &str,
    ) -> Result<Option<RemoteSkill>, SyncError> {
        let slot = self.slot(flow_id).await;
        {
            let mut guard = slot.lock().await;
            if guard.is_none() {
                let skills = platform.list_flow_skills(flow_id).await?;
                tracing::debug!(flow = %flow_id, skills = skills.len(), "flow snapshot listed");
                *guard = Some(FlowSnapshot::from_skills(skills));
            }
            if let Some(skill) = guard.as_ref().and_then(|s| s.find(skill_id, skill_idn)) {
                return Ok(Some(skill.clone()));
            }
        }

        if skill_id.is_empty() {
            return Ok(None);
        }
        match platform.get_skill(skill_id).await {
            Ok(skill) => {
                self.remember(flow_id, skill.clone()).await;
                Ok(Some(skill))
            }
            Err(RemoteError::NotFound { .. }) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Store `skill` in the flow's entry, creating the entry if needed.
    pub async fn remember(&self, flow_id: &str, skill: RemoteSkill) {
        let slot = self.slot(flow_id).await;
        let mut guard = slot.lock().await;
        guard.get_or_insert_with(FlowSnapshot::default).insert(skill);
    }

    pub async fn invalidate(&self, flow_id: &str) {
        self.slots.lock().await.remove(flow_id);
    }

    #[cfg(test)]
    async fn is_cached(&self, flow_id: &str) -> bool {
        let slot = match self.slots.lock().await.get(flow_id) {
            Some(slot) => slot.clone(),
            None => return false,
        };
        let cached = slot.lock().await.is_some();
        cached
    }
}
