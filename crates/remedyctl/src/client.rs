//! HTTP client for the remedy daemon.

use anyhow::{anyhow, Context, Result};
use remedy_common::{
    ApplyRequest, ChangeEvent, EvidencePack, FeedbackRequest, FeedbackResponse, FixPreview,
    Incident, RemediationPlan,
};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Default daemon address when neither --addr nor REMEDY_ADDR is set.
pub const DEFAULT_ADDR: &str = "http://127.0.0.1:7710";

pub struct RemedyClient {
    base: String,
    http: reqwest::Client,
}

impl RemedyClient {
    pub fn new(addr: Option<String>) -> Self {
        let base = addr
            .or_else(|| std::env::var("REMEDY_ADDR").ok())
            .unwrap_or_else(|| DEFAULT_ADDR.to_string());
        Self {
            base: base.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base, path);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("daemon unreachable at {}", self.base))?;
        Self::decode(response).await
    }

    async fn post_json<T: DeserializeOwned>(&self, path: &str, body: &Value) -> Result<T> {
        let url = format!("{}{}", self.base, path);
        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .with_context(|| format!("daemon unreachable at {}", self.base))?;
        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            // The daemon surfaces workflow errors as plain text or a
            // JSON body; either way the message is what matters.
            return Err(anyhow!("{}: {}", status, body.trim()));
        }
        serde_json::from_str(&body).with_context(|| "unexpected response shape from daemon")
    }

    pub async fn incidents(&self) -> Result<Vec<Incident>> {
        self.get_json("/v1/incidents").await
    }

    pub async fn evidence(&self, incident: &str, lookback: Option<u32>) -> Result<EvidencePack> {
        let path = match lookback {
            Some(minutes) => format!("/v1/incidents/{}/evidence?lookback={}", incident, minutes),
            None => format!("/v1/incidents/{}/evidence", incident),
        };
        self.get_json(&path).await
    }

    pub async fn changes(&self, incident: &str, lookback: Option<u32>) -> Result<Vec<ChangeEvent>> {
        let path = match lookback {
            Some(minutes) => format!("/v1/incidents/{}/changes?lookback={}", incident, minutes),
            None => format!("/v1/incidents/{}/changes", incident),
        };
        self.get_json(&path).await
    }

    pub async fn fixes(&self, incident: &str) -> Result<RemediationPlan> {
        self.get_json(&format!("/v1/incidents/{}/fixes", incident)).await
    }

    /// `fix` may be a full fix id or a bare runbook id.
    pub async fn preview(&self, incident: &str, fix: &str) -> Result<FixPreview> {
        let body = if fix.starts_with("fix-") {
            serde_json::json!({ "fixId": fix })
        } else {
            serde_json::json!({ "runbookId": fix })
        };
        self.post_json(&format!("/v1/incidents/{}/fix-preview", incident), &body)
            .await
    }

    pub async fn apply(&self, incident: &str, request: &ApplyRequest) -> Result<Value> {
        let body = serde_json::to_value(request)?;
        self.post_json(&format!("/v1/incidents/{}/fix-apply", incident), &body)
            .await
    }

    pub async fn post_check(&self, incident: &str, execution: &str) -> Result<Value> {
        let body = serde_json::json!({ "executionId": execution });
        self.post_json(&format!("/v1/incidents/{}/post-check", incident), &body)
            .await
    }

    pub async fn feedback(
        &self,
        incident: &str,
        request: &FeedbackRequest,
    ) -> Result<FeedbackResponse> {
        let body = serde_json::to_value(request)?;
        self.post_json(&format!("/v1/incidents/{}/feedback", incident), &body)
            .await
    }
}
