//! HTTP-callback [`AgentHandler`]: wakes an agent by POSTing to its
//! configured URL. The agent process itself is an external collaborator
//! (LLM provider adapters, tool wrappers, etc. are all out of scope
//! here) — this is just the thin client that reaches it.

use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;

use agentmesh_domain::RunStatus;
use agentmesh_scheduler::{AgentHandler, CancelToken, RunOutcome};

const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct WebhookAgentHandler {
    client: reqwest::Client,
    url_template: String,
}

impl WebhookAgentHandler {
    pub fn new(url_template: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client builder");
        Self {
            client,
            url_template: url_template.into(),
        }
    }

    fn url_for(&self, agent_id: &str) -> String {
        self.url_template.replace("{agent_id}", agent_id)
    }
}

#[derive(Debug, Deserialize)]
struct CallbackResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

fn parse_status(s: &str) -> RunStatus {
    match s {
        "ok_empty" | "ok-empty" => RunStatus::OkEmpty,
        "ok_token" | "ok-token" => RunStatus::OkToken,
        "alert" => RunStatus::Alert,
        "error" => RunStatus::Error,
        _ => RunStatus::Ok,
    }
}

#[async_trait::async_trait]
impl AgentHandler for WebhookAgentHandler {
    async fn run(&self, agent_id: &str, cancel: CancelToken) -> RunOutcome {
        let url = self.url_for(agent_id);
        let request = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "agent_id": agent_id, "fired_at": Utc::now() }))
            .send();

        let watch_cancel = async {
            loop {
                if cancel.is_cancelled() {
                    return;
                }
                tokio::time::sleep(CANCEL_POLL_INTERVAL).await;
            }
        };

        tokio::select! {
            result = request => Self::interpret(agent_id, result).await,
            _ = watch_cancel => RunOutcome::cancelled(),
        }
    }
}

impl WebhookAgentHandler {
    async fn interpret(agent_id: &str, result: reqwest::Result<reqwest::Response>) -> RunOutcome {
        let response = match result {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(agent_id, error = %e, "agent callback request failed");
                return RunOutcome::error(format!("callback request failed: {e}"));
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return RunOutcome::error(format!("callback returned {status}: {body}"));
        }

        match response.json::<CallbackResponse>().await {
            Ok(body) => RunOutcome {
                status: body.status.as_deref().map(parse_status).unwrap_or(RunStatus::Ok),
                message: body.message,
            },
            Err(_) => RunOutcome::ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_template_substitutes_agent_id() {
        let handler = WebhookAgentHandler::new("http://x/agents/{agent_id}/invoke", Duration::from_secs(1));
        assert_eq!(handler.url_for("a-1"), "http://x/agents/a-1/invoke");
    }

    #[test]
    fn parse_status_maps_known_values() {
        assert_eq!(parse_status("ok_empty"), RunStatus::OkEmpty);
        assert_eq!(parse_status("alert"), RunStatus::Alert);
        assert_eq!(parse_status("bogus"), RunStatus::Ok);
    }
}
