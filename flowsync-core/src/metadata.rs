//! YAML metadata documents.
//!
//! Skill and flow `*.meta.yaml` files are parsed and rendered here, along
//! with the generated per-project `flows.yaml`. The project document is a
//! pure function of the entity map: it is never hand-edited and is rewritten
//! whenever a project's skill set changes.

use std::path::Path;

use serde::Serialize;

use crate::error::CoreError;
use crate::types::{
    FlowEvent, FlowMeta, ModelRef, ProjectEntry, SkillMeta, SkillParameter, StateField,
};

pub fn render_skill_meta(meta: &SkillMeta) -> Result<String, CoreError> {
    Ok(serde_yaml::to_string(meta)?)
}

pub fn parse_skill_meta(path: &Path, contents: &str) -> Result<SkillMeta, CoreError> {
    serde_yaml::from_str(contents).map_err(|e| CoreError::Parse {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

pub fn render_flow_meta(meta: &FlowMeta) -> Result<String, CoreError> {
    Ok(serde_yaml::to_string(meta)?)
}

pub fn parse_flow_meta(path: &Path, contents: &str) -> Result<FlowMeta, CoreError> {
    serde_yaml::from_str(contents).map_err(|e| CoreError::Parse {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

#[derive(Serialize)]
struct ProjectFlowsDoc<'a> {
    project: &'a str,
    flows: Vec<FlowDoc<'a>>,
}

#[derive(Serialize)]
struct FlowDoc<'a> {
    agent: &'a str,
    idn: &'a str,
    title: &'a str,
    runner_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a ModelRef>,
    skills: Vec<SkillDoc<'a>>,
    events: &'a [FlowEvent],
    state_fields: &'a [StateField],
}

#[derive(Serialize)]
struct SkillDoc<'a> {
    idn: &'a str,
    title: &'a str,
    runner_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a ModelRef>,
    parameters: &'a [SkillParameter],
    path: &'a str,
}

/// Render a project's `flows.yaml` from its map entry.
///
/// Output order follows the map's sorted keys, so equal entity state always
/// renders byte-identical documents. `updated_at` is deliberately absent.
pub fn render_project_flows(project: &ProjectEntry) -> Result<String, CoreError> {
    let mut flows = Vec::new();
    for (agent_idn, agent) in &project.agents {
        for (flow_idn, flow) in &agent.flows {
            flows.push(FlowDoc {
                agent: agent_idn,
                idn: flow_idn,
                title: &flow.title,
                runner_type: &flow.runner_type,
                model: flow.model.as_ref(),
                skills: flow
                    .skills
                    .values()
                    .map(|s| SkillDoc {
                        idn: &s.idn,
                        title: &s.title,
                        runner_type: &s.runner_type,
                        model: s.model.as_ref(),
                        parameters: &s.parameters,
                        path: &s.path,
                    })
                    .collect(),
                events: &flow.events,
                state_fields: &flow.state_fields,
            });
        }
    }
    let doc = ProjectFlowsDoc {
        project: &project.idn,
        flows,
    };
    Ok(serde_yaml::to_string(&doc)?)
}
