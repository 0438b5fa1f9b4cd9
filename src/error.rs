use std::time::Duration;

/// Error type for name generation.
/// Implements Clone so a cached or retried failure can be handed back
/// to the caller unchanged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error
{   /// Caller input rejected before any network activity
    #[error("Invalid input: {0}")]
    InvalidInput(String)
  , /// Settings could not be resolved at construction
    #[error("Configuration error: {0}")]
    Configuration(String)
  , /// Provider rejected the credential (401/403)
    #[error("Authentication failed: {0}")]
    Authentication(String)
  , /// Provider rate limit hit (429), with its Retry-After hint if sent
    #[error("Rate limit exceeded: {message}")]
    RateLimit
    {   message: String
      , retry_after: Option<Duration>
    }
  , /// Quota or billing rejection (402)
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String)
  , /// Malformed request or unusable model output
    #[error("Model error: {0}")]
    Model(String)
  , /// Connection failure or unexpected provider status
    #[error("Transport error: {0}")]
    Transport(String)
  , /// Request or overall deadline elapsed
    #[error("Request timed out: {0}")]
    Timeout(String)
}

/// Fieldless mirror of [`Error`] for callers that only branch on kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind
{   InvalidInput
  , Configuration
  , Authentication
  , RateLimit
  , QuotaExceeded
  , Model
  , Transport
  , Timeout
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error
{   pub fn kind(&self) -> ErrorKind
    {   match self
        {   Error::InvalidInput(_) => ErrorKind::InvalidInput
          , Error::Configuration(_) => ErrorKind::Configuration
          , Error::Authentication(_) => ErrorKind::Authentication
          , Error::RateLimit { .. } => ErrorKind::RateLimit
          , Error::QuotaExceeded(_) => ErrorKind::QuotaExceeded
          , Error::Model(_) => ErrorKind::Model
          , Error::Transport(_) => ErrorKind::Transport
          , Error::Timeout(_) => ErrorKind::Timeout
        }
    }

    /// Whether a retry might succeed: timeouts, rate limits and
    /// generic transport failures.
    pub fn is_transient(&self) -> bool
    {   matches!(
          self.kind(),
          ErrorKind::RateLimit | ErrorKind::Timeout | ErrorKind::Transport
        )
    }

    /// Provider supplied wait before the next attempt, if any.
    pub fn retry_after(&self) -> Option<Duration>
    {   match self
        {   Error::RateLimit { retry_after, .. } => *retry_after
          , _ => None
        }
    }

    /// Suggested status code for an HTTP layer exposing this service.
    pub fn http_status(&self) -> u16
    {   match self.kind()
        {   ErrorKind::InvalidInput | ErrorKind::Model => 400
          , ErrorKind::Authentication => 401
          , ErrorKind::QuotaExceeded => 402
          , ErrorKind::RateLimit => 429
          , ErrorKind::Configuration
          | ErrorKind::Transport
          | ErrorKind::Timeout => 500
        }
    }

    pub(crate) fn rate_limit(
      message: impl Into<String>
    , retry_after: Option<Duration>
    ) -> Self
    {   Error::RateLimit
        {   message: message.into()
          , retry_after
        }
    }
}

#[cfg(test)]
mod tests
{   use super::*;

    #[test]
    fn transient_kinds_are_rate_limit_timeout_and_transport()
    {   assert!(Error::rate_limit("slow down", None).is_transient());
        assert!(Error::Timeout("30s".into()).is_transient());
        assert!(Error::Transport("reset".into()).is_transient());

        assert!(!Error::Authentication("bad key".into()).is_transient());
        assert!(!Error::QuotaExceeded("billing".into()).is_transient());
        assert!(!Error::Model("bad request".into()).is_transient());
        assert!(!Error::InvalidInput("empty".into()).is_transient());
    }

    #[test]
    fn http_status_follows_error_kind()
    {   assert_eq!(Error::Authentication("x".into()).http_status(), 401);
        assert_eq!(Error::rate_limit("x", None).http_status(), 429);
        assert_eq!(Error::QuotaExceeded("x".into()).http_status(), 402);
        assert_eq!(Error::Model("x".into()).http_status(), 400);
        assert_eq!(Error::InvalidInput("x".into()).http_status(), 400);
        assert_eq!(Error::Transport("x".into()).http_status(), 500);
        assert_eq!(Error::Timeout("x".into()).http_status(), 500);
    }

    #[test]
    fn retry_after_only_on_rate_limit()
    {   let hint = Some(Duration::from_secs(7));
        assert_eq!(Error::rate_limit("x", hint).retry_after(), hint);
        assert_eq!(Error::Transport("x".into()).retry_after(), None);
    }

    #[test]
    fn display_keeps_provider_message()
    {   let err = Error::rate_limit("try again later", None);
        assert_eq!(err.to_string(), "Rate limit exceeded: try again later");
    }
}
