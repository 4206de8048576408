//! Short-lived HTTP calls: everything a viewer does besides watching.

use reqwest::Response;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use hive_core::wire::{Ack, ErrorBody, SendMessageRequest, SetRunningRequest};
use hive_core::{AgentId, PoolState};

/// Failures surfaced by [`ApiClient`].
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The request never produced a server response.
    #[error("http transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server answered with a structured error body.
    #[error("{code}: {message}")]
    Api {
        /// Machine-readable code from the server.
        code: String,
        /// Human-readable message from the server.
        message: String,
    },
}

/// Client for the server's HTTP control surface.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    /// Client against `base_url` (e.g. `http://127.0.0.1:4710`).
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            let _ = base_url.pop();
        }
        Self {
            http: reqwest::Client::new(),
            base_url,
        }
    }

    /// Hand `text` to an agent as its next prompt.
    pub async fn send_message(
        &self,
        agent_id: AgentId,
        text: impl Into<String>,
    ) -> Result<(), ClientError> {
        let body = SendMessageRequest { text: text.into() };
        let _: Ack = self
            .post_json(&format!("/agents/{agent_id}/message"), &body)
            .await?;
        Ok(())
    }

    /// Interrupt the agent's in-flight turn, if any.
    pub async fn interrupt(&self, agent_id: AgentId) -> Result<(), ClientError> {
        let url = format!("{}/agents/{agent_id}/interrupt", self.base_url);
        debug!(%url, "POST");
        let response = self.http.post(url).send().await?;
        let _: Ack = Self::decode(response).await?;
        Ok(())
    }

    /// Set the pool-wide running flag.
    pub async fn set_running(&self, running: bool) -> Result<(), ClientError> {
        let _: Ack = self
            .post_json("/running", &SetRunningRequest { running })
            .await?;
        Ok(())
    }

    /// Fetch a point-in-time pool snapshot.
    pub async fn fetch_pool(&self) -> Result<PoolState, ClientError> {
        let url = format!("{}/pool", self.base_url);
        debug!(%url, "GET");
        let response = self.http.get(url).send().await?;
        Self::decode(response).await
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        let url = format!("{}{path}", self.base_url);
        debug!(%url, "POST");
        let response = self.http.post(url).json(body).send().await?;
        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }
        // Prefer the server's structured body; fall back to the bare
        // status for proxies answering with plain text.
        match response.json::<ErrorBody>().await {
            Ok(body) => Err(ClientError::Api {
                code: body.code,
                message: body.message,
            }),
            Err(_) => Err(ClientError::Api {
                code: "http_error".into(),
                message: format!("unexpected status {status}"),
            }),
        }
    }
}
