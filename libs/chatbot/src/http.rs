use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::ChatbotBackend;

#[derive(Deserialize)]
struct StartResponse {
    conversation_id: String,
}

#[derive(Deserialize)]
struct TurnResponse {
    #[serde(default)]
    reply: Option<String>,
}

/// Generic HTTP chatbot backend speaking a small JSON conversation API.
///
/// Concrete integrations that follow this shape (typebot-style flow engines,
/// helpdesk inboxes) can be registered directly; anything more exotic gets
/// its own [`ChatbotBackend`](crate::ChatbotBackend) implementation.
pub struct HttpChatbotBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpChatbotBackend {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .context("build chatbot http client")?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        builder
    }
}

#[async_trait]
impl ChatbotBackend for HttpChatbotBackend {
    async fn start_conversation(
        &self,
        instance: &str,
        participant: &str,
        message: &str,
    ) -> Result<String> {
        let response = self
            .request(reqwest::Method::POST, "/conversations")
            .json(&json!({
                "instance": instance,
                "participant": participant,
                "message": message,
            }))
            .send()
            .await
            .context("start conversation request")?
            .error_for_status()
            .context("start conversation status")?;
        let body: StartResponse = response
            .json()
            .await
            .context("decode start conversation response")?;
        Ok(body.conversation_id)
    }

    async fn continue_conversation(
        &self,
        external_ref: &str,
        message: &str,
    ) -> Result<Option<String>> {
        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/conversations/{external_ref}/messages"),
            )
            .json(&json!({ "message": message }))
            .send()
            .await
            .context("continue conversation request")?
            .error_for_status()
            .context("continue conversation status")?;
        let body: TurnResponse = response
            .json()
            .await
            .context("decode conversation turn response")?;
        Ok(body.reply)
    }

    async fn close_conversation(&self, external_ref: &str) -> Result<()> {
        self.request(
            reqwest::Method::DELETE,
            &format!("/conversations/{external_ref}"),
        )
        .send()
        .await
        .context("close conversation request")?
        .error_for_status()
        .context("close conversation status")?;
        Ok(())
    }
}
