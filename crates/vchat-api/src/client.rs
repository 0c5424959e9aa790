//! HTTP transport for guest and registered sessions

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{StatusCode, header};
use tokio_stream::Stream;

use crate::{
    auth::{self, RefreshResponse, TokenStore},
    endpoints,
    error::{Error, Result},
    retry::RetryConfig,
    types::{
        ConversationId, ConversationList, ConversationSummary, GuestSendBody, HistoryResponse,
        Message, PinState, RawSendResponse, RegisteredSendBody, SendRequest, SendResponse,
        StreamId, parse_timestamp,
    },
};

/// Raw body of a stream response, one item per network read
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>>> + Send>>;

/// Default timeout for REST calls; stream bodies are never timed out
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Whether requests carry user credentials
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    Guest,
    Registered,
}

/// Transport used by the conversation controller
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Session mode of this backend
    fn mode(&self) -> SessionMode;

    /// Submit a user turn and obtain the stream handle for the answer
    async fn send_message(&self, request: &SendRequest) -> Result<SendResponse>;

    /// Open the incremental response body for `stream_id`
    async fn open_stream(&self, stream_id: &StreamId) -> Result<ByteStream>;

    /// Load the stored messages of a conversation, oldest first
    async fn fetch_history(&self, id: &ConversationId) -> Result<Vec<Message>>;
}

/// reqwest-backed chat backend
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    tokens: Option<Arc<dyn TokenStore>>,
    retry: RetryConfig,
    request_timeout: Option<Duration>,
}

impl HttpBackend {
    /// Backend for an anonymous session; never sends credentials
    pub fn guest(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            tokens: None,
            retry: RetryConfig::default(),
            request_timeout: Some(DEFAULT_REQUEST_TIMEOUT),
        }
    }

    /// Backend for a signed-in session
    pub fn registered(base_url: impl Into<String>, tokens: Arc<dyn TokenStore>) -> Self {
        Self {
            tokens: Some(tokens),
            ..Self::guest(base_url)
        }
    }

    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Timeout for REST calls; `None` disables it
    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        endpoints::join(&self.base_url, path)
    }

    fn require_registered(&self) -> Result<&Arc<dyn TokenStore>> {
        self.tokens.as_ref().ok_or(Error::Unauthorized)
    }

    /// Send one REST request, attaching the access token when registered.
    async fn dispatch<F>(&self, build: &F) -> Result<reqwest::Response>
    where
        F: Fn(&reqwest::Client) -> reqwest::RequestBuilder + Sync,
    {
        let mut request = build(&self.client);
        if let Some(timeout) = self.request_timeout {
            request = request.timeout(timeout);
        }
        if let Some(token) = self.tokens.as_ref().and_then(|t| t.access_token()) {
            request = request.header(header::AUTHORIZATION, auth::bearer(&token));
        }
        Ok(request.send().await?)
    }

    /// Send a REST request; on 401 refresh the access token once and retry.
    async fn execute<F>(&self, build: F) -> Result<reqwest::Response>
    where
        F: Fn(&reqwest::Client) -> reqwest::RequestBuilder + Sync,
    {
        let response = self.dispatch(&build).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return check(response).await;
        }

        let Some(tokens) = self.tokens.as_ref() else {
            return check(response).await;
        };

        tracing::debug!("Request unauthorized, refreshing access token");
        self.refresh_access_token(tokens.as_ref()).await?;
        check(self.dispatch(&build).await?).await
    }

    /// Exchange the refresh token for a new access token.
    ///
    /// Any failure clears the stored credentials.
    async fn refresh_access_token(&self, tokens: &dyn TokenStore) -> Result<()> {
        let Some(refresh_token) = tokens.refresh_token() else {
            tracing::warn!("No refresh token available, clearing credentials");
            tokens.clear()?;
            return Err(Error::SessionExpired);
        };

        match self.request_refresh(&refresh_token).await {
            Ok(access_token) => {
                tokens.set_access_token(&access_token)?;
                tracing::info!("Access token refreshed");
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Token refresh failed: {}", e);
                tokens.clear()?;
                Err(Error::SessionExpired)
            }
        }
    }

    async fn request_refresh(&self, refresh_token: &str) -> Result<String> {
        let mut request = self
            .client
            .post(self.url(endpoints::AUTH_REFRESH))
            .header(header::AUTHORIZATION, auth::bearer(refresh_token))
            .json(&serde_json::json!({}));
        if let Some(timeout) = self.request_timeout {
            request = request.timeout(timeout);
        }

        let response = check(request.send().await?).await?;
        let body: RefreshResponse = response.json().await?;
        Ok(body.data.access_token)
    }

    async fn send_guest(&self, request: &SendRequest) -> Result<SendResponse> {
        let url = self.url(endpoints::SEND_MESSAGE);
        let body = GuestSendBody {
            messages: &request.messages,
        };
        let response = self.execute(|c| c.post(&url).json(&body)).await?;
        let raw: RawSendResponse = response.json().await?;
        raw.into_response()
    }

    async fn send_registered(&self, request: &SendRequest) -> Result<SendResponse> {
        let url = self.url(endpoints::SEND_MESSAGE);
        let body = RegisteredSendBody {
            content: request.latest_user_text().unwrap_or_default(),
            conversation_id: request.conversation_id.as_ref(),
        };

        let mut attempt = 0;
        loop {
            let result = match self.execute(|c| c.post(&url).json(&body)).await {
                Ok(response) => response.json::<RawSendResponse>().await.map_err(Error::from),
                Err(e) => Err(e),
            };

            match result {
                Err(e) if e.is_retryable() && attempt < self.retry.max_retries => {
                    let delay = self.retry.delay_for_attempt(attempt);
                    attempt += 1;
                    tracing::warn!(
                        "Send failed ({}), retrying in {:?} (attempt {}/{})",
                        e,
                        delay,
                        attempt,
                        self.retry.max_retries
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
                Ok(raw) => return raw.into_response(),
            }
        }
    }

    /// Conversations of the signed-in user
    pub async fn list_conversations(&self) -> Result<Vec<ConversationSummary>> {
        self.require_registered()?;
        let url = self.url(endpoints::CONVERSATIONS);
        let response = self.execute(|c| c.get(&url)).await?;
        let list: ConversationList = response.json().await?;
        Ok(list.conversations)
    }

    /// Create an empty conversation
    pub async fn create_conversation(&self, title: &str) -> Result<ConversationSummary> {
        self.require_registered()?;
        let url = self.url(endpoints::CONVERSATIONS);
        let body = serde_json::json!({ "title": title });
        let response = self.execute(|c| c.post(&url).json(&body)).await?;
        Ok(response.json().await?)
    }

    pub async fn rename_conversation(
        &self,
        id: &ConversationId,
        title: &str,
    ) -> Result<ConversationSummary> {
        self.require_registered()?;
        let url = self.url(&endpoints::rename_conversation(id));
        let body = serde_json::json!({ "title": title });
        let response = self.execute(|c| c.patch(&url).json(&body)).await?;
        Ok(response.json().await?)
    }

    /// Pin or unpin a conversation
    pub async fn set_pinned(&self, id: &ConversationId, pinned: bool) -> Result<PinState> {
        self.require_registered()?;
        let url = self.url(&endpoints::pin_conversation(id));
        let body = serde_json::json!({ "pinned": pinned });
        let response = self.execute(|c| c.patch(&url).json(&body)).await?;
        Ok(response.json().await?)
    }

    pub async fn delete_conversation(&self, id: &ConversationId) -> Result<()> {
        self.require_registered()?;
        let url = self.url(&endpoints::conversation(id));
        self.execute(|c| c.delete(&url)).await?;
        Ok(())
    }
}

#[async_trait]
impl ChatBackend for HttpBackend {
    fn mode(&self) -> SessionMode {
        if self.tokens.is_some() {
            SessionMode::Registered
        } else {
            SessionMode::Guest
        }
    }

    async fn send_message(&self, request: &SendRequest) -> Result<SendResponse> {
        match self.mode() {
            SessionMode::Guest => self.send_guest(request).await,
            SessionMode::Registered => self.send_registered(request).await,
        }
    }

    async fn open_stream(&self, stream_id: &StreamId) -> Result<ByteStream> {
        let mut request = self
            .client
            .get(self.url(&endpoints::stream(stream_id)))
            .header(header::ACCEPT, "text/event-stream");
        if let Some(token) = self.tokens.as_ref().and_then(|t| t.access_token()) {
            request = request.header(header::AUTHORIZATION, auth::bearer(&token));
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::StreamStatus(status.as_u16()));
        }

        tracing::debug!("Stream {} connected", stream_id);
        Ok(Box::pin(
            response
                .bytes_stream()
                .map(|read| read.map(|bytes| bytes.to_vec()).map_err(Error::from)),
        ))
    }

    async fn fetch_history(&self, id: &ConversationId) -> Result<Vec<Message>> {
        self.require_registered()?;
        let url = self.url(&endpoints::history(id));
        let response = self.execute(|c| c.get(&url)).await?;
        let mut history: HistoryResponse = response.json().await?;

        history
            .messages
            .sort_by_key(|m| m.timestamp.as_deref().and_then(parse_timestamp));
        Ok(history
            .messages
            .into_iter()
            .map(|m| m.into_message())
            .collect())
    }
}

/// Turn a non-success response into an API error
async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    Err(Error::api(status.as_u16(), text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MemoryTokenStore;

    #[test]
    fn test_mode_follows_credentials() {
        assert_eq!(HttpBackend::guest("http://x").mode(), SessionMode::Guest);
        let tokens = Arc::new(MemoryTokenStore::new("a", None));
        assert_eq!(
            HttpBackend::registered("http://x", tokens).mode(),
            SessionMode::Registered
        );
    }

    #[tokio::test]
    async fn test_guest_cannot_use_conversation_operations() {
        let backend = HttpBackend::guest("http://127.0.0.1:9");
        assert!(matches!(
            backend.list_conversations().await,
            Err(Error::Unauthorized)
        ));
        assert!(matches!(
            backend.fetch_history(&ConversationId::new("1")).await,
            Err(Error::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn test_refresh_without_refresh_token_clears_credentials() {
        let tokens = Arc::new(MemoryTokenStore::new("stale", None));
        let backend = HttpBackend::registered("http://127.0.0.1:9", tokens.clone());
        let result = backend.refresh_access_token(tokens.as_ref()).await;
        assert!(matches!(result, Err(Error::SessionExpired)));
        assert!(tokens.access_token().is_none());
    }
}
