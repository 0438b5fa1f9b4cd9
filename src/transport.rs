//! Transport seam between the client and a model provider

use async_trait::async_trait;

use crate::error::Result;
use crate::prompt::Prompt;

/// One network exchange with a model provider.
///
/// Implementations make exactly one call per `send` and never retry;
/// failures are classified into [`crate::Error`] kinds so the retry
/// policy can decide what happens next.
#[async_trait]
pub trait Transport: Send + Sync
{   /// Send a prompt and return the model's raw message content.
    async fn send(&self, prompt: &Prompt) -> Result<String>;

    /// Cheap reachability and credential check used by health checks.
    async fn probe(&self) -> Result<()>;

    /// Acquire pooled resources. Must be idempotent.
    fn start(&self) -> Result<()>
    {   Ok(())
    }

    /// Release pooled resources. Must be idempotent.
    fn close(&self) {}
}
