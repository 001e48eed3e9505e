//! HTTP implementation of [`Platform`].
//!
//! `ureq` is blocking, so every call runs on tokio's blocking pool. Requests
//! carry the customer's API key as a bearer token; bodies are JSON.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use flowsync_core::config::CustomerConfig;
use flowsync_core::{FlowEvent, StateField};
use flowsync_sync::{
    NewSkill, Platform, RemoteAgent, RemoteError, RemoteProject, RemoteSkill,
};

#[derive(Clone)]
pub struct HttpPlatform {
    agent: ureq::Agent,
    base_url: String,
    api_key: String,
}

/// Response body of every create endpoint.
#[derive(Deserialize)]
struct Created {
    id: String,
}

impl HttpPlatform {
    pub fn new(base_url: &str, api_key: impl Into<String>, timeout: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    /// Build a client for `customer`, reading its API key from the
    /// environment variable the config names.
    pub fn from_config(customer: &CustomerConfig, timeout_secs: u64) -> Result<Self> {
        let api_key = std::env::var(&customer.api_key_env).with_context(|| {
            format!(
                "API key for customer '{}' not found; set ${}",
                customer.idn, customer.api_key_env
            )
        })?;
        Ok(Self::new(
            &customer.base_url,
            api_key,
            Duration::from_secs(timeout_secs),
        ))
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{endpoint}", self.base_url)
    }

    async fn call<T>(
        &self,
        method: &'static str,
        endpoint: String,
        body: Option<Value>,
    ) -> Result<T, RemoteError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let client = self.clone();
        let task_endpoint = endpoint.clone();
        tokio::task::spawn_blocking(move || client.call_blocking(method, &task_endpoint, body))
            .await
            .map_err(|e| RemoteError::Transport {
                endpoint,
                message: e.to_string(),
            })?
    }

    fn call_blocking<T: DeserializeOwned>(
        &self,
        method: &str,
        endpoint: &str,
        body: Option<Value>,
    ) -> Result<T, RemoteError> {
        tracing::debug!(method, endpoint, "request");
        let request = self
            .agent
            .request(method, &self.url(endpoint))
            .set("Authorization", &format!("Bearer {}", self.api_key))
            .set("Accept", "application/json");
        let sent = match body {
            Some(body) => request.send_json(body),
            None => request.call(),
        };
        let response = match sent {
            Ok(response) => response,
            Err(ureq::Error::Status(status, response)) => {
                return Err(RemoteError::Http {
                    endpoint: endpoint.to_string(),
                    status,
                    message: response.into_string().unwrap_or_default(),
                });
            }
            Err(ureq::Error::Transport(transport)) => {
                return Err(RemoteError::Transport {
                    endpoint: endpoint.to_string(),
                    message: transport.to_string(),
                });
            }
        };
        let text = response.into_string().map_err(|e| RemoteError::Decode {
            endpoint: endpoint.to_string(),
            message: e.to_string(),
        })?;
        decode_body(endpoint, &text)
    }
}

/// Decode a JSON body; an empty body decodes as `null` so unit responses
/// (`204 No Content`) succeed.
fn decode_body<T: DeserializeOwned>(endpoint: &str, text: &str) -> Result<T, RemoteError> {
    let text = if text.trim().is_empty() { "null" } else { text };
    serde_json::from_str(text).map_err(|e| RemoteError::Decode {
        endpoint: endpoint.to_string(),
        message: e.to_string(),
    })
}

fn json<T: serde::Serialize>(endpoint: &str, value: &T) -> Result<Value, RemoteError> {
    serde_json::to_value(value).map_err(|e| RemoteError::Decode {
        endpoint: endpoint.to_string(),
        message: e.to_string(),
    })
}

#[async_trait]
impl Platform for HttpPlatform {
    async fn list_projects(&self) -> Result<Vec<RemoteProject>, RemoteError> {
        self.call("GET", "/api/v1/designer/projects".to_string(), None)
            .await
    }

    async fn list_agents(&self, project_id: &str) -> Result<Vec<RemoteAgent>, RemoteError> {
        self.call(
            "GET",
            format!("/api/v1/bff/agents/list?project_id={project_id}"),
            None,
        )
        .await
    }

    async fn list_flow_skills(&self, flow_id: &str) -> Result<Vec<RemoteSkill>, RemoteError> {
        self.call("GET", format!("/api/v1/designer/flows/{flow_id}/skills"), None)
            .await
    }

    async fn get_skill(&self, skill_id: &str) -> Result<RemoteSkill, RemoteError> {
        match self
            .call("GET", format!("/api/v1/designer/skills/{skill_id}"), None)
            .await
        {
            Err(RemoteError::Http { status: 404, .. }) => Err(RemoteError::NotFound {
                kind: "skill",
                id: skill_id.to_string(),
            }),
            other => other,
        }
    }

    async fn create_skill(&self, flow_id: &str, skill: &NewSkill) -> Result<String, RemoteError> {
        let endpoint = format!("/api/v1/designer/flows/{flow_id}/skills");
        let body = json(&endpoint, skill)?;
        let created: Created = self.call("POST", endpoint, Some(body)).await?;
        Ok(created.id)
    }

    async fn update_skill(&self, skill: &RemoteSkill) -> Result<(), RemoteError> {
        let endpoint = format!("/api/v1/designer/flows/skills/{}", skill.id);
        let body = json(&endpoint, skill)?;
        self.call::<Value>("PUT", endpoint, Some(body)).await?;
        Ok(())
    }

    async fn delete_skill(&self, skill_id: &str) -> Result<(), RemoteError> {
        self.call::<Value>(
            "DELETE",
            format!("/api/v1/designer/flows/skills/{skill_id}"),
            None,
        )
        .await?;
        Ok(())
    }

    async fn list_flow_events(&self, flow_id: &str) -> Result<Vec<FlowEvent>, RemoteError> {
        self.call("GET", format!("/api/v1/designer/flows/{flow_id}/events"), None)
            .await
    }

    async fn list_flow_states(&self, flow_id: &str) -> Result<Vec<StateField>, RemoteError> {
        self.call("GET", format!("/api/v1/designer/flows/{flow_id}/states"), None)
            .await
    }

    async fn create_flow_event(
        &self,
        flow_id: &str,
        event: &FlowEvent,
    ) -> Result<String, RemoteError> {
        let endpoint = format!("/api/v1/designer/flows/{flow_id}/events");
        let body = json(&endpoint, event)?;
        let created: Created = self.call("POST", endpoint, Some(body)).await?;
        Ok(created.id)
    }

    async fn create_flow_state(
        &self,
        flow_id: &str,
        state: &StateField,
    ) -> Result<String, RemoteError> {
        let endpoint = format!("/api/v1/designer/flows/{flow_id}/states");
        let body = json(&endpoint, state)?;
        let created: Created = self.call("POST", endpoint, Some(body)).await?;
        Ok(created.id)
    }

    async fn publish_flow(&self, flow_id: &str) -> Result<(), RemoteError> {
        self.call::<Value>(
            "POST",
            format!("/api/v1/designer/flows/{flow_id}/publish"),
            Some(Value::Object(Default::default())),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_dropped() {
        let platform = HttpPlatform::new("https://app.example.com/", "k", Duration::from_secs(1));
        assert_eq!(
            platform.url("/api/v1/designer/projects"),
            "https://app.example.com/api/v1/designer/projects"
        );
    }

    #[test]
    fn empty_body_decodes_as_unit() {
        decode_body::<()>("/publish", "").unwrap();
        let value: Value = decode_body("/delete", "  \n").unwrap();
        assert!(value.is_null());
    }

    #[test]
    fn create_response_yields_id() {
        let created: Created = decode_body("/skills", r#"{"id":"s-9","extra":1}"#).unwrap();
        assert_eq!(created.id, "s-9");
    }

    #[test]
    fn malformed_body_is_a_decode_error() {
        let err = decode_body::<Vec<RemoteProject>>("/projects", "{not json").unwrap_err();
        assert!(matches!(err, RemoteError::Decode { ref endpoint, .. } if endpoint == "/projects"));
    }

    #[test]
    fn skills_decode_with_missing_optional_fields() {
        let skills: Vec<RemoteSkill> = decode_body(
            "/skills",
            r#"[{"id":"s-1","idn":"greet","runner_type":"nsl","prompt_script":"hi"}]"#,
        )
        .unwrap();
        assert_eq!(skills[0].idn, "greet");
        assert!(skills[0].parameters.is_empty());
        assert!(skills[0].model.is_none());
    }

    #[test]
    fn missing_api_key_names_the_variable() {
        let customer = CustomerConfig {
            idn: "acme".to_string(),
            base_url: "http://localhost".to_string(),
            api_key_env: "FLOWSYNC_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
        };
        let err = HttpPlatform::from_config(&customer, 5).err().unwrap();
        assert!(err.to_string().contains("FLOWSYNC_TEST_KEY_THAT_IS_NEVER_SET"));
    }
}
