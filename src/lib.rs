pub mod error;
pub mod config;
pub mod logging;
pub mod request;
pub mod prompt;
pub mod transport;
pub mod providers;
pub mod retry;
pub mod parser;
pub mod cache;
pub mod client;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use cache::{CacheKey, ResultCache};
pub use client::{NameGenerator, Session};
pub use config::{Environment, ServiceConfig, ServiceConfigBuilder};
pub use error::{Error, ErrorKind, Result};
pub use prompt::{build_prompt, Prompt};
pub use providers::OpenAiTransport;
pub use request::{GenerationRequest, NameSuggestion};
pub use retry::RetryPolicy;
pub use transport::Transport;

/*

pawname: async client that asks an OpenAI-compatible chat model for pet
names. One call in, typed suggestions or a typed error out. The REST
layer, the UI and secret storage live elsewhere and only see
NameGenerator.

pawname/
├── Cargo.toml
├── src/
│   ├── lib.rs          # Re-exports and health types
│   ├── error.rs        # Error taxonomy (kind, transient, http status)
│   ├── config.rs       # ServiceConfig, builder, env loading
│   ├── logging.rs      # env_logger setup per environment
│   ├── request.rs      # GenerationRequest / NameSuggestion, sanitising
│   ├── prompt.rs       # Prompt builder (pure)
│   ├── transport.rs    # Transport trait
│   ├── providers/
│   │   ├── mod.rs
│   │   └── openai.rs   # reqwest chat-completions transport
│   ├── retry.rs        # RetryPolicy: backoff, jitter, deadlines
│   ├── parser.rs       # Model output -> suggestions
│   ├── cache.rs        # LRU + TTL result cache
│   └── client.rs       # NameGenerator facade, Session guard
└── tests/              # Stub-transport and wiremock integration tests

generate flow:
  validate -> cache.get -> build_prompt -> retry(transport.send)
           -> parse_suggestions -> cache.put

*/

/// PAWNAME STRUCTURES:

/// Coarse health of the provider connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState
{   /// Probe succeeded
    Healthy
  , /// Probe hit a transient failure (timeout, rate limit, network)
    Degraded
  , /// Probe hit a failure retrying will not fix (credential, quota)
    Unhealthy
}

/// Result of [`NameGenerator::health_check`]; recomputed on each call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus
{   pub status: HealthState
  , pub checked_at: DateTime<Utc>
  , pub message: Option<String>
  , pub model: String
  , pub environment: Environment
  , pub cache_size: usize
}

impl HealthStatus
{   pub fn is_healthy(&self) -> bool
    {   self.status == HealthState::Healthy
    }
}
