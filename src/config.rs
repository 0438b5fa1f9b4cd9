//! Service configuration, resolved once at startup

use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MAX_TOKENS: u32 = 1000;
pub const DEFAULT_TEMPERATURE: f32 = 0.8;
pub const DEFAULT_TOP_P: f32 = 0.9;
pub const DEFAULT_TIMEOUT_SECS: f64 = 30.0;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const MAX_TOKENS_LIMIT: u32 = 4096;

pub const ENV_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_MODEL: &str = "OPENAI_MODEL";
pub const ENV_MAX_TOKENS: &str = "OPENAI_MAX_TOKENS";
pub const ENV_TEMPERATURE: &str = "OPENAI_TEMPERATURE";
pub const ENV_TOP_P: &str = "OPENAI_TOP_P";
pub const ENV_TIMEOUT: &str = "OPENAI_TIMEOUT";
pub const ENV_MAX_RETRIES: &str = "OPENAI_MAX_RETRIES";
pub const ENV_BASE_URL: &str = "OPENAI_BASE_URL";
pub const ENV_ENVIRONMENT: &str = "ENVIRONMENT";
pub const ENV_SITE_URL: &str = "OPENAI_SITE_URL";
pub const ENV_APP_NAME: &str = "OPENAI_APP_NAME";

/// Deployment environment tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment
{   Development
  , Staging
  , #[default]
    Production
}

impl Environment
{   pub fn as_str(&self) -> &'static str
    {   match self
        {   Environment::Development => "development"
          , Environment::Staging => "staging"
          , Environment::Production => "production"
        }
    }
}

impl fmt::Display for Environment
{   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {   f.write_str(self.as_str())
    }
}

impl FromStr for Environment
{   type Err = Error;

    fn from_str(s: &str) -> Result<Self>
    {   match s.trim().to_ascii_lowercase().as_str()
        {   "development" | "dev" => Ok(Environment::Development)
          , "staging" => Ok(Environment::Staging)
          , "production" | "prod" => Ok(Environment::Production)
          , other => Err(Error::Configuration(
              format!("unknown environment: {}", other)
            ))
        }
    }
}

/// Immutable service settings.
///
/// Built through [`ServiceConfigBuilder`] or [`ServiceConfig::from_env`];
/// every value is validated at construction, so readers never re-check.
#[derive(Clone)]
pub struct ServiceConfig
{   api_key: String
  , model: String
  , max_tokens: u32
  , temperature: f32
  , top_p: f32
  , timeout: Duration
  , max_retries: u32
  , base_url: String
  , environment: Environment
  , site_url: Option<String>
  , app_name: Option<String>
}

impl ServiceConfig
{   pub fn builder(api_key: impl Into<String>) -> ServiceConfigBuilder
    {   ServiceConfigBuilder::new(api_key)
    }

    /// Resolve settings from the process environment.
    pub fn from_env() -> Result<Self>
    {   Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve settings through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
      F: Fn(&str) -> Option<String>
    {   let get = |key: &str| {
          lookup(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
        };

        let api_key = get(ENV_API_KEY).ok_or_else(|| {
          Error::Configuration(format!(
            "{} environment variable is required",
            ENV_API_KEY
          ))
        })?;

        let mut builder = ServiceConfigBuilder::new(api_key);
        if let Some(model) = get(ENV_MODEL)
        {   builder = builder.model(model);
        }
        if let Some(raw) = get(ENV_MAX_TOKENS)
        {   builder = builder.max_tokens(parse_setting(ENV_MAX_TOKENS, &raw)?);
        }
        if let Some(raw) = get(ENV_TEMPERATURE)
        {   builder = builder.temperature(parse_setting(ENV_TEMPERATURE, &raw)?);
        }
        if let Some(raw) = get(ENV_TOP_P)
        {   builder = builder.top_p(parse_setting(ENV_TOP_P, &raw)?);
        }
        if let Some(raw) = get(ENV_TIMEOUT)
        {   builder = builder.timeout_secs(parse_setting(ENV_TIMEOUT, &raw)?);
        }
        if let Some(raw) = get(ENV_MAX_RETRIES)
        {   builder = builder.max_retries(parse_setting(ENV_MAX_RETRIES, &raw)?);
        }
        if let Some(url) = get(ENV_BASE_URL)
        {   builder = builder.base_url(url);
        }
        if let Some(raw) = get(ENV_ENVIRONMENT)
        {   // Unknown tags fall back to production.
            let environment = raw.parse().unwrap_or_else(|_| {
              debug!("Unrecognised environment {:?}, using production", raw);
              Environment::Production
            });
            builder = builder.environment(environment);
        }
        if let Some(site_url) = get(ENV_SITE_URL)
        {   builder = builder.site_url(site_url);
        }
        if let Some(app_name) = get(ENV_APP_NAME)
        {   builder = builder.app_name(app_name);
        }
        builder.build()
    }

    pub fn api_key(&self) -> &str { &self.api_key }
    pub fn model(&self) -> &str { &self.model }
    pub fn max_tokens(&self) -> u32 { self.max_tokens }
    pub fn temperature(&self) -> f32 { self.temperature }
    pub fn top_p(&self) -> f32 { self.top_p }
    pub fn timeout(&self) -> Duration { self.timeout }
    pub fn max_retries(&self) -> u32 { self.max_retries }
    pub fn base_url(&self) -> &str { &self.base_url }
    pub fn environment(&self) -> Environment { self.environment }
    pub fn site_url(&self) -> Option<&str> { self.site_url.as_deref() }
    pub fn app_name(&self) -> Option<&str> { self.app_name.as_deref() }
}

impl fmt::Debug for ServiceConfig
{   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {   f.debug_struct("ServiceConfig")
          .field("api_key", &"<redacted>")
          .field("model", &self.model)
          .field("max_tokens", &self.max_tokens)
          .field("temperature", &self.temperature)
          .field("top_p", &self.top_p)
          .field("timeout", &self.timeout)
          .field("max_retries", &self.max_retries)
          .field("base_url", &self.base_url)
          .field("environment", &self.environment)
          .field("site_url", &self.site_url)
          .field("app_name", &self.app_name)
          .finish()
    }
}

/// Builder for [`ServiceConfig`]; unset options keep their defaults.
#[derive(Clone)]
pub struct ServiceConfigBuilder
{   api_key: String
  , model: String
  , max_tokens: u32
  , temperature: f32
  , top_p: f32
  , timeout_secs: f64
  , max_retries: u32
  , base_url: String
  , environment: Environment
  , site_url: Option<String>
  , app_name: Option<String>
}

impl ServiceConfigBuilder
{   pub fn new(api_key: impl Into<String>) -> Self
    {   ServiceConfigBuilder
        {   api_key: api_key.into()
          , model: DEFAULT_MODEL.to_string()
          , max_tokens: DEFAULT_MAX_TOKENS
          , temperature: DEFAULT_TEMPERATURE
          , top_p: DEFAULT_TOP_P
          , timeout_secs: DEFAULT_TIMEOUT_SECS
          , max_retries: DEFAULT_MAX_RETRIES
          , base_url: DEFAULT_BASE_URL.to_string()
          , environment: Environment::default()
          , site_url: None
          , app_name: None
        }
    }

    pub fn model(mut self, model: impl Into<String>) -> Self
    {   self.model = model.into();
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self
    {   self.max_tokens = max_tokens;
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self
    {   self.temperature = temperature;
        self
    }

    pub fn top_p(mut self, top_p: f32) -> Self
    {   self.top_p = top_p;
        self
    }

    pub fn timeout_secs(mut self, timeout_secs: f64) -> Self
    {   self.timeout_secs = timeout_secs;
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self
    {   self.max_retries = max_retries;
        self
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self
    {   self.base_url = base_url.into();
        self
    }

    pub fn environment(mut self, environment: Environment) -> Self
    {   self.environment = environment;
        self
    }

    pub fn site_url(mut self, site_url: impl Into<String>) -> Self
    {   self.site_url = Some(site_url.into());
        self
    }

    pub fn app_name(mut self, app_name: impl Into<String>) -> Self
    {   self.app_name = Some(app_name.into());
        self
    }

    /// Validate and freeze. Out-of-domain values are rejected, not clamped.
    pub fn build(self) -> Result<ServiceConfig>
    {   let api_key = self.api_key.trim().to_string();
        if api_key.is_empty()
        {   return Err(Error::Configuration(
              "API key is required".to_string()
            ));
        }

        let model = self.model.trim().to_string();
        if model.is_empty()
        {   return Err(Error::Configuration(
              "model must not be empty".to_string()
            ));
        }

        if self.max_tokens < 1 || self.max_tokens > MAX_TOKENS_LIMIT
        {   return Err(Error::Configuration(format!(
              "max_tokens must be between 1 and {}, got {}",
              MAX_TOKENS_LIMIT, self.max_tokens
            )));
        }

        if !(0.0..=2.0).contains(&self.temperature)
        {   return Err(Error::Configuration(format!(
              "temperature must be between 0 and 2, got {}",
              self.temperature
            )));
        }

        if !(0.0..=1.0).contains(&self.top_p)
        {   return Err(Error::Configuration(format!(
              "top_p must be between 0 and 1, got {}",
              self.top_p
            )));
        }

        let timeout = Duration::try_from_secs_f64(self.timeout_secs)
          .ok()
          .filter(|t| !t.is_zero())
          .ok_or_else(|| {
            Error::Configuration(format!(
              "timeout must be a positive number of seconds, got {}",
              self.timeout_secs
            ))
          })?;

        if self.max_retries < 1
        {   return Err(Error::Configuration(
              "max_retries must be at least 1".to_string()
            ));
        }

        let base_url = self.base_url.trim().trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://"))
        {   return Err(Error::Configuration(format!(
              "base_url must be an http(s) URL, got {:?}",
              base_url
            )));
        }

        let config = ServiceConfig
        {   api_key
          , model
          , max_tokens: self.max_tokens
          , temperature: self.temperature
          , top_p: self.top_p
          , timeout
          , max_retries: self.max_retries
          , base_url
          , environment: self.environment
          , site_url: self.site_url.filter(|s| !s.trim().is_empty())
          , app_name: self.app_name.filter(|s| !s.trim().is_empty())
        };
        debug!("Resolved configuration: {:?}", config);
        Ok(config)
    }
}

fn parse_setting<T: FromStr>(key: &str, raw: &str) -> Result<T>
{   raw.parse().map_err(|_| {
      Error::Configuration(format!("{} has invalid value {:?}", key, raw))
    })
}
