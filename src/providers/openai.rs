use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use log::{debug, trace, error, info};
use parking_lot::RwLock;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::config::ServiceConfig;
use crate::error::{Error, Result};
use crate::prompt::Prompt;
use crate::transport::Transport;

const MAX_IDLE_CONNECTIONS: usize = 5;
const MAX_ERROR_BODY_CHARS: usize = 200;

// ===== Message Types =====

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage
{   pub role: String
  , #[serde(default)]
    pub content: Option<String>
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest<'a>
{   pub model: &'a str
  , pub messages: Vec<ChatMessage>
  , pub temperature: f32
  , pub top_p: f32
  , pub max_tokens: u32
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse
{   pub choices: Vec<Choice>
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice
{   pub message: ChatMessage
  , #[serde(default)]
    pub finish_reason: Option<String>
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelsResponse
{   #[serde(default)]
    pub data: Vec<ModelData>
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelData
{   pub id: String
}

// ===== OpenAI-compatible transport =====

/// Chat-completions transport for OpenAI-compatible providers
/// (OpenAI, OpenRouter and similar).
///
/// The pooled HTTP client is created by [`Transport::start`] and dropped
/// by [`Transport::close`]; a `send` before `start` starts it lazily.
pub struct OpenAiTransport
{   config: Arc<ServiceConfig>
  , http_client: RwLock<Option<reqwest::Client>>
}

impl OpenAiTransport
{   pub fn new(config: Arc<ServiceConfig>) -> Self
    {   debug!("Creating OpenAiTransport for {}", config.base_url());
        OpenAiTransport
        {   config
          , http_client: RwLock::new(None)
        }
    }

    pub fn is_started(&self) -> bool
    {   self.http_client.read().is_some()
    }

    fn ensure_client(&self) -> Result<reqwest::Client>
    {   if let Some(client) = self.http_client.read().as_ref()
        {   return Ok(client.clone());
        }

        let mut slot = self.http_client.write();
        if let Some(client) = slot.as_ref()
        {   return Ok(client.clone());
        }
        let client = reqwest::Client::builder()
          .timeout(self.config.timeout())
          .pool_max_idle_per_host(MAX_IDLE_CONNECTIONS)
          .build()
          .map_err(|e| {
            error!("Failed to build HTTP client: {}", e);
            Error::Transport(format!("failed to build HTTP client: {}", e))
          })?;
        debug!("HTTP client initialized");
        *slot = Some(client.clone());
        Ok(client)
    }

    fn authorized(
      &self
    , builder: reqwest::RequestBuilder
    ) -> reqwest::RequestBuilder
    {   let mut builder = builder.bearer_auth(self.config.api_key());
        if let Some(site_url) = self.config.site_url()
        {   builder = builder.header("HTTP-Referer", site_url);
        }
        if let Some(app_name) = self.config.app_name()
        {   builder = builder.header("X-Title", app_name);
        }
        builder
    }

    /// Run one exchange under the configured hard deadline, returning
    /// the body of a successful response.
    async fn exchange(
      &self
    , builder: reqwest::RequestBuilder
    ) -> Result<String>
    {   let timeout = self.config.timeout();
        let call = async {
          let response = builder.send().await.map_err(map_request_error)?;
          let status = response.status();
          trace!("Provider response status: {}", status);

          if !status.is_success()
          {   let retry_after = retry_after(response.headers());
              let body = response.text().await.unwrap_or_default();
              let err = classify_status(status, retry_after, &body);
              error!("Provider error: {}", err);
              return Err(err);
          }
          response.text().await.map_err(map_request_error)
        };

        tokio::time::timeout(timeout, call)
          .await
          .map_err(|_| {
            error!("No provider response within {:?}", timeout);
            Error::Timeout(format!("no response within {:?}", timeout))
          })?
    }

    /// Model identifiers the credential can use.
    pub async fn list_models(&self) -> Result<Vec<String>>
    {   let client = self.ensure_client()?;
        let url = format!("{}/models", self.config.base_url());
        let body = self.exchange(self.authorized(client.get(url))).await?;

        let models: ModelsResponse = serde_json::from_str(&body).map_err(|e| {
          error!("Parse error: {}", e);
          Error::Model(format!("unexpected models response: {}", e))
        })?;
        let names: Vec<String> = models.data.into_iter().map(|m| m.id).collect();
        debug!("Retrieved {} models", names.len());
        Ok(names)
    }
}

#[async_trait]
impl Transport for OpenAiTransport
{   async fn send(&self, prompt: &Prompt) -> Result<String>
    {   let client = self.ensure_client()?;
        let request = ChatRequest
        {   model: self.config.model()
          , messages: vec![
              ChatMessage
              {   role: "system".to_string()
                , content: Some(prompt.system.clone())
              }
            , ChatMessage
              {   role: "user".to_string()
                , content: Some(prompt.user.clone())
              }
            ]
          , temperature: self.config.temperature()
          , top_p: self.config.top_p()
          , max_tokens: self.config.max_tokens()
        };
        debug!("Sending chat completion with model: {}", request.model);
        trace!("Chat request: {:?}", request);

        let url = format!("{}/chat/completions", self.config.base_url());
        let body = self
          .exchange(self.authorized(client.post(url)).json(&request))
          .await?;
        extract_content(&body)
    }

    async fn probe(&self) -> Result<()>
    {   self.list_models().await.map(|_| ())
    }

    fn start(&self) -> Result<()>
    {   self.ensure_client().map(|_| ())
    }

    fn close(&self)
    {   if self.http_client.write().take().is_some()
        {   info!("HTTP client closed");
        }
    }
}

fn map_request_error(e: reqwest::Error) -> Error
{   if e.is_timeout()
    {   error!("Request timed out: {}", e);
        Error::Timeout(e.to_string())
    } else
    {   error!("Network error: {}", e);
        Error::Transport(format!("network error: {}", e))
    }
}

/// Map a non-success status to its error kind.
pub fn classify_status(
  status: StatusCode
, retry_after: Option<Duration>
, body: &str
) -> Error
{   let message = provider_message(status, body);
    match status.as_u16()
    {   401 | 403 => Error::Authentication(message)
      , 402 => Error::QuotaExceeded(message)
      , 429 => Error::rate_limit(message, retry_after)
      , 400..=499 => Error::Model(message)
      , _ => Error::Transport(format!("HTTP {}: {}", status.as_u16(), message))
    }
}

/// Provider's `error.message` if present, else a bounded copy of the body.
fn provider_message(status: StatusCode, body: &str) -> String
{   let parsed = serde_json::from_str::<serde_json::Value>(body).ok();
    let from_json = parsed.as_ref().and_then(|value| {
      let error = value.get("error")?;
      error
        .get("message")
        .and_then(serde_json::Value::as_str)
        .or_else(|| error.as_str())
        .map(str::to_string)
    });
    if let Some(message) = from_json
    {   return message;
    }

    let body = body.trim();
    if body.is_empty()
    {   format!("HTTP {}", status.as_u16())
    } else
    {   body.chars().take(MAX_ERROR_BODY_CHARS).collect()
    }
}

/// `Retry-After` in delta-seconds; HTTP-date values are ignored.
fn retry_after(headers: &HeaderMap) -> Option<Duration>
{   let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    let secs: f64 = raw.parse().ok()?;
    Duration::try_from_secs_f64(secs).ok()
}

fn extract_content(body: &str) -> Result<String>
{   let response: ChatResponse = serde_json::from_str(body).map_err(|e| {
      error!("Parse error: {}", e);
      Error::Model(format!("unexpected chat completion response: {}", e))
    })?;

    let choice = response.choices.into_iter().next().ok_or_else(|| {
      error!("No choices in response");
      Error::Model("API response contained no choices".to_string())
    })?;
    if let Some(reason) = &choice.finish_reason
    {   trace!("Finish reason: {}", reason);
    }

    choice.message.content
      .filter(|content| !content.trim().is_empty())
      .ok_or_else(|| {
        error!("Empty message content in response");
        Error::Model("API response contained an empty message".to_string())
      })
}

#[cfg(test)]
mod tests
{   use super::*;
    use crate::error::ErrorKind;
    use reqwest::header::HeaderValue;

    #[test]
    fn status_codes_map_to_error_kinds()
    {   let kind = |code: u16| {
          classify_status(StatusCode::from_u16(code).unwrap(), None, "").kind()
        };
        assert_eq!(kind(401), ErrorKind::Authentication);
        assert_eq!(kind(403), ErrorKind::Authentication);
        assert_eq!(kind(402), ErrorKind::QuotaExceeded);
        assert_eq!(kind(429), ErrorKind::RateLimit);
        assert_eq!(kind(400), ErrorKind::Model);
        assert_eq!(kind(404), ErrorKind::Model);
        assert_eq!(kind(422), ErrorKind::Model);
        assert_eq!(kind(500), ErrorKind::Transport);
        assert_eq!(kind(503), ErrorKind::Transport);
        assert_eq!(kind(302), ErrorKind::Transport);
    }

    #[test]
    fn provider_message_is_extracted()
    {   let body = r#"{"error":{"message":"Invalid API key","type":"auth"}}"#;
        assert_eq!(
          classify_status(StatusCode::UNAUTHORIZED, None, body),
          Error::Authentication("Invalid API key".to_string())
        );
        assert_eq!(
          classify_status(StatusCode::BAD_REQUEST, None, "plain words"),
          Error::Model("plain words".to_string())
        );
        assert_eq!(
          classify_status(StatusCode::PAYMENT_REQUIRED, None, ""),
          Error::QuotaExceeded("HTTP 402".to_string())
        );
    }

    #[test]
    fn rate_limit_carries_hint()
    {   let err = classify_status(
          StatusCode::TOO_MANY_REQUESTS
        , Some(Duration::from_secs(12))
        , ""
        );
        assert_eq!(err.retry_after(), Some(Duration::from_secs(12)));
    }

    #[test]
    fn retry_after_accepts_delta_seconds_only()
    {   let mut headers = HeaderMap::new();
        assert_eq!(retry_after(&headers), None);

        headers.insert(RETRY_AFTER, HeaderValue::from_static("5"));
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(5)));

        headers.insert(RETRY_AFTER, HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"));
        assert_eq!(retry_after(&headers), None);

        headers.insert(RETRY_AFTER, HeaderValue::from_static("-1"));
        assert_eq!(retry_after(&headers), None);
    }

    #[test]
    fn content_is_taken_from_first_choice()
    {   let body = r#"{"choices":[{"message":{"role":"assistant","content":"[]"},"finish_reason":"stop"}]}"#;
        assert_eq!(extract_content(body), Ok("[]".to_string()));
    }

    #[test]
    fn unusable_success_bodies_are_model_errors()
    {   for body in [
          r#"{"choices":[]}"#
        , r#"{"choices":[{"message":{"role":"assistant","content":null}}]}"#
        , r#"{"choices":[{"message":{"role":"assistant","content":"  "}}]}"#
        , "<html>gateway</html>"
        ]
        {   assert!(matches!(extract_content(body), Err(Error::Model(_))), "{}", body);
        }
    }
}
