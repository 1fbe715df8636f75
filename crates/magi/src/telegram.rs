use std::time::Duration;

use async_trait::async_trait;
use magi_agents::{CollaboratorError, Notifier};
use reqwest::Client;
use serde_json::json;

/// Sends plain-text messages through a Telegram bot.
pub struct TelegramNotifier {
    client: Client,
    endpoint: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(
        api_url: &str,
        bot_token: &str,
        chat_id: &str,
        timeout: Duration,
    ) -> Result<Self, CollaboratorError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/bot{bot_token}/sendMessage", api_url.trim_end_matches('/')),
            chat_id: chat_id.to_string(),
        })
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, text: &str) -> Result<(), CollaboratorError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&json!({ "chat_id": self.chat_id, "text": text }))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CollaboratorError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}
