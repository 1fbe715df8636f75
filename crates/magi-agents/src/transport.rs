use std::time::Duration;

use magi_models::{Message, ProviderResponse, ToolDescriptor};
use tracing::warn;

use crate::providers::{ChatProvider, ProviderError};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(30),
        }
    }
}

/// Sends a turn to a provider, retrying only on rate limiting (HTTP 429).
///
/// Any other failure, and the last rate-limit failure once attempts run out,
/// is returned unchanged.
#[derive(Debug, Clone, Default)]
pub struct RetryingTransport {
    policy: RetryPolicy,
}

impl RetryingTransport {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub async fn send(
        &self,
        provider: &dyn ChatProvider,
        conversation: &[Message],
        tools: &[ToolDescriptor],
    ) -> Result<ProviderResponse, ProviderError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match provider.complete(conversation, tools).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_rate_limited() && attempt < max_attempts => {
                    warn!(
                        vendor = provider.vendor(),
                        attempt,
                        max_attempts,
                        delay_secs = self.policy.delay.as_secs_f64(),
                        "Rate limited, retrying"
                    );
                    tokio::time::sleep(self.policy.delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
