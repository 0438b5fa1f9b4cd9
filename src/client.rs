use std::ops::Deref;
use std::sync::Arc;
use chrono::Utc;
use log::{debug, error, info, warn};
use tokio::time::Instant;

use crate::cache::{CacheKey, ResultCache};
use crate::config::ServiceConfig;
use crate::error::{Error, Result};
use crate::parser::parse_suggestions;
use crate::prompt::build_prompt;
use crate::providers::OpenAiTransport;
use crate::request::{GenerationRequest, NameSuggestion};
use crate::retry::RetryPolicy;
use crate::transport::Transport;
use crate::{HealthState, HealthStatus};

/// Pet name generation client.
///
/// Composes prompt building, a retrying transport, response parsing and
/// the result cache behind one call. Construct it once and share it by
/// reference (or `Arc`); every method takes `&self`.
///
/// Construction opens nothing. Use [`start`](Self::start) and
/// [`close`](Self::close), or [`session`](Self::session) to have close
/// run on every exit path.
pub struct NameGenerator<T = OpenAiTransport>
{   config: Arc<ServiceConfig>
  , transport: T
  , retry: RetryPolicy
  , cache: Option<ResultCache>
}

impl NameGenerator<OpenAiTransport>
{   /// Client backed by the OpenAI-compatible HTTP transport.
    pub fn new(config: impl Into<Arc<ServiceConfig>>) -> Self
    {   let config = config.into();
        let transport = OpenAiTransport::new(config.clone());
        NameGenerator::with_transport(config, transport)
    }

    /// Client configured from the process environment.
    pub fn from_env() -> Result<Self>
    {   Ok(NameGenerator::new(ServiceConfig::from_env()?))
    }
}

impl<T: Transport> NameGenerator<T>
{   pub fn with_transport(
      config: impl Into<Arc<ServiceConfig>>
    , transport: T
    ) -> Self
    {   let config = config.into();
        info!(
          "Name generator initialized for {} environment with model {}",
          config.environment(),
          config.model()
        );
        NameGenerator
        {   retry: RetryPolicy::from_config(&config)
          , config
          , transport
          , cache: Some(ResultCache::default())
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self
    {   self.retry = retry;
        self
    }

    pub fn with_cache(mut self, cache: ResultCache) -> Self
    {   self.cache = Some(cache);
        self
    }

    pub fn without_cache(mut self) -> Self
    {   self.cache = None;
        self
    }

    pub fn config(&self) -> &ServiceConfig
    {   &self.config
    }

    pub fn transport(&self) -> &T
    {   &self.transport
    }

    pub fn cache_len(&self) -> usize
    {   self.cache.as_ref().map_or(0, ResultCache::len)
    }

    /// Acquire transport resources. Idempotent.
    pub fn start(&self) -> Result<()>
    {   debug!("Starting name generator");
        self.transport.start()
    }

    /// Release transport resources. Idempotent.
    pub fn close(&self)
    {   debug!("Closing name generator");
        self.transport.close();
    }

    /// Start and return a guard that closes on drop.
    pub fn session(&self) -> Result<Session<'_, T>>
    {   self.start()?;
        Ok(Session { generator: self })
    }

    /// Generate up to `num_names` suggestions.
    ///
    /// Input is validated before anything else; an empty `animal` or a
    /// count outside `1..=10` fails with [`Error::InvalidInput`] without
    /// touching the network. Provider and parse errors come back with
    /// their kind intact.
    pub async fn generate_pet_names<S: AsRef<str>>(
      &self
    , animal: &str
    , traits: &[S]
    , theme: Option<&str>
    , num_names: usize
    ) -> Result<Vec<NameSuggestion>>
    {   let request = GenerationRequest::new(animal, traits, theme, num_names)?;
        self.generate_with_deadline(&request, None).await
    }

    /// As [`generate_pet_names`](Self::generate_pet_names), abandoning
    /// retries with [`Error::Timeout`] once `deadline` passes.
    pub async fn generate_pet_names_with_deadline<S: AsRef<str>>(
      &self
    , animal: &str
    , traits: &[S]
    , theme: Option<&str>
    , num_names: usize
    , deadline: Instant
    ) -> Result<Vec<NameSuggestion>>
    {   let request = GenerationRequest::new(animal, traits, theme, num_names)?;
        self.generate_with_deadline(&request, Some(deadline)).await
    }

    pub async fn generate(
      &self
    , request: &GenerationRequest
    ) -> Result<Vec<NameSuggestion>>
    {   self.generate_with_deadline(request, None).await
    }

    pub async fn generate_with_deadline(
      &self
    , request: &GenerationRequest
    , deadline: Option<Instant>
    ) -> Result<Vec<NameSuggestion>>
    {   let key = CacheKey::from(request);
        if let Some(hit) = self.cache.as_ref().and_then(|cache| cache.get(&key))
        {   debug!("Cache hit for {} ({} names)", request.animal(), hit.len());
            return Ok(hit);
        }

        let prompt = build_prompt(request);
        info!(
          "Generating {} names for {} with traits: {:?}",
          request.num_names(),
          request.animal(),
          request.traits()
        );

        let raw = self.retry
          .execute_with_deadline(|_| self.transport.send(&prompt), deadline)
          .await
          .map_err(|e| {
            error!("Failed to generate pet names: {}", e);
            e
          })?;
        let suggestions = parse_suggestions(&raw, request.num_names())?;

        if let Some(cache) = &self.cache
        {   cache.put(key, suggestions.clone());
        }
        info!("Successfully generated {} names", suggestions.len());
        Ok(suggestions)
    }

    /// Probe the provider. Never fails: problems are reported in the
    /// returned status.
    pub async fn health_check(&self) -> HealthStatus
    {   let timeout = self.config.timeout();
        let outcome = tokio::time::timeout(timeout, self.transport.probe())
          .await
          .unwrap_or_else(|_| {
            Err(Error::Timeout(format!("health probe exceeded {:?}", timeout)))
          });

        let (status, message) = match outcome
        {   Ok(()) => (HealthState::Healthy, None)
          , Err(e) if e.is_transient() => {
              warn!("Health check degraded: {}", e);
              (HealthState::Degraded, Some(e.to_string()))
            }
          , Err(e) => {
              error!("Health check failed: {}", e);
              (HealthState::Unhealthy, Some(e.to_string()))
            }
        };

        HealthStatus
        {   status
          , checked_at: Utc::now()
          , message
          , model: self.config.model().to_string()
          , environment: self.config.environment()
          , cache_size: self.cache_len()
        }
    }
}

/// Started client that closes itself when dropped.
pub struct Session<'a, T: Transport>
{   generator: &'a NameGenerator<T>
}

impl<T: Transport> Deref for Session<'_, T>
{   type Target = NameGenerator<T>;

    fn deref(&self) -> &Self::Target
    {   self.generator
    }
}

impl<T: Transport> Drop for Session<'_, T>
{   fn drop(&mut self)
    {   self.generator.close();
    }
}
