//! HTTP binding of the backend contract

use super::error::classify_rejection;
use super::types::{Envelope, SessionRequest};
use super::{BackendError, Conversation, Message};
use crate::runtime::ChatBackend;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

/// Bearer token for the admin API; supplied explicitly, never read from
/// ambient state.
#[derive(Clone)]
pub struct AdminToken(String);

impl AdminToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl std::fmt::Debug for AdminToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AdminToken(..)")
    }
}

/// Backend reached over the admin REST API
pub struct HttpBackend {
    client: Client,
    base_url: Url,
    token: Option<AdminToken>,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl HttpBackend {
    pub fn new(
        base_url: &str,
        token: Option<AdminToken>,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| BackendError::invalid_request(format!("Invalid API URL {base_url:?}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(BackendError::invalid_request(format!(
                "API URL {base_url} cannot carry a path"
            )));
        }

        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, BackendError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| BackendError::invalid_request("API URL cannot carry a path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(AdminToken(token)) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn get_list<T: DeserializeOwned>(&self, url: Url) -> Result<Vec<T>, BackendError> {
        let response = self.authorize(self.client.get(url)).send().await?;
        let envelope: Envelope<Vec<T>> = read_envelope(response).await?;
        Ok(envelope.data.unwrap_or_default())
    }

    async fn post_session(
        &self,
        action: &str,
        phone: &str,
        message: Option<&str>,
    ) -> Result<(), BackendError> {
        let url = self.endpoint(&["api", "admin", "chat-support", action])?;
        let body = SessionRequest {
            phone_number: phone,
            message,
        };
        let response = self
            .authorize(self.client.post(url))
            .json(&body)
            .send()
            .await?;
        let _: Envelope<serde_json::Value> = read_envelope(response).await?;
        Ok(())
    }
}

/// Read a response body, turning every non-success signal into a classified
/// error.
async fn read_envelope<T: DeserializeOwned>(response: Response) -> Result<Envelope<T>, BackendError> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        let message = serde_json::from_str::<ErrorBody>(&body)
            .ok()
            .and_then(|b| b.message.or(b.error))
            .unwrap_or_else(|| format!("HTTP {status}"));
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(BackendError::auth(message));
        }
        return Err(classify_rejection(status.as_u16(), message));
    }

    let envelope: Envelope<T> = serde_json::from_str(&body)
        .map_err(|e| BackendError::decode(format!("Malformed response: {e}")))?;
    if !envelope.is_success() {
        let message = envelope
            .message
            .clone()
            .unwrap_or_else(|| format!("Request rejected ({})", envelope.status));
        return Err(classify_rejection(status.as_u16(), message));
    }
    Ok(envelope)
}

#[async_trait]
impl ChatBackend for HttpBackend {
    async fn list_conversations(&self) -> Result<Vec<Conversation>, BackendError> {
        let url = self.endpoint(&["api", "admin", "conversations"])?;
        self.get_list(url).await
    }

    async fn list_messages(&self, phone: &str) -> Result<Vec<Message>, BackendError> {
        let url = self.endpoint(&["api", "admin", "conversations", phone, "messages"])?;
        self.get_list(url).await
    }

    async fn start_chat_support(
        &self,
        phone: &str,
        greeting: Option<&str>,
    ) -> Result<(), BackendError> {
        self.post_session("start", phone, greeting).await
    }

    async fn send_chat_support_message(
        &self,
        phone: &str,
        text: &str,
    ) -> Result<(), BackendError> {
        self.post_session("send", phone, Some(text)).await
    }

    async fn end_chat_support(
        &self,
        phone: &str,
        farewell: Option<&str>,
    ) -> Result<(), BackendError> {
        self.post_session("end", phone, farewell).await
    }
}
