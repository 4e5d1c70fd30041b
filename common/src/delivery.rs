// Delivery collaborators: Telegram Bot API and a log-only dry run.

use crate::errors::DeliveryError;
use crate::retry::{ExponentialBackoff, RetryStrategy};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, instrument, warn};

pub const DEFAULT_TELEGRAM_API: &str = "https://api.telegram.org";

/// Where a payload goes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Destination {
    pub chat_id: String,
}

impl Destination {
    pub fn new(chat_id: impl Into<String>) -> Self {
        Self {
            chat_id: chat_id.into(),
        }
    }
}

/// A rendered message ready to send
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Payload {
    Text { text: String },
    Poll { question: String, options: Vec<String> },
}

/// Delivery sends a payload to a destination and reports the outcome
#[async_trait]
pub trait Delivery: Send + Sync {
    async fn deliver(
        &self,
        destination: &Destination,
        payload: &Payload,
    ) -> Result<(), DeliveryError>;
}

#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Telegram Bot API delivery with bounded retries on transient failures
pub struct TelegramDelivery {
    client: Client,
    api_base_url: String,
    bot_token: String,
    retry: Arc<dyn RetryStrategy>,
}

impl TelegramDelivery {
    /// Create a new TelegramDelivery with the specified timeout
    pub fn new(
        api_base_url: impl Into<String>,
        bot_token: impl Into<String>,
        timeout_seconds: u64,
    ) -> Result<Self, DeliveryError> {
        let bot_token = bot_token.into();
        if bot_token.is_empty() {
            return Err(DeliveryError::InvalidConfiguration(
                "bot token cannot be empty".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| {
                DeliveryError::RequestFailed(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            api_base_url: api_base_url.into().trim_end_matches('/').to_string(),
            bot_token,
            retry: Arc::new(ExponentialBackoff::new()),
        })
    }

    pub fn with_retry(mut self, retry: Arc<dyn RetryStrategy>) -> Self {
        self.retry = retry;
        self
    }

    fn request_for(
        destination: &Destination,
        payload: &Payload,
    ) -> (&'static str, serde_json::Value) {
        match payload {
            Payload::Text { text } => (
                "sendMessage",
                json!({ "chat_id": destination.chat_id, "text": text }),
            ),
            Payload::Poll { question, options } => (
                "sendPoll",
                json!({
                    "chat_id": destination.chat_id,
                    "question": question,
                    "options": options.iter().map(|o| json!({ "text": o })).collect::<Vec<_>>(),
                    "is_anonymous": false,
                }),
            ),
        }
    }

    async fn send_once(&self, method: &str, body: &serde_json::Value) -> Result<(), DeliveryError> {
        let url = format!("{}/bot{}/{}", self.api_base_url, self.bot_token, method);
        let response = self.client.post(url).json(body).send().await?;
        let status = response.status();

        // Rate limits and server errors are worth another attempt
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(DeliveryError::RequestFailed(format!(
                "{} returned status {}",
                method, status
            )));
        }

        let parsed: TelegramResponse = response
            .json()
            .await
            .map_err(|e| DeliveryError::RequestFailed(format!("Invalid response body: {}", e)))?;

        if parsed.ok {
            Ok(())
        } else {
            Err(DeliveryError::Rejected(
                parsed
                    .description
                    .unwrap_or_else(|| format!("{} rejected with status {}", method, status)),
            ))
        }
    }
}

#[async_trait]
impl Delivery for TelegramDelivery {
    #[instrument(skip(self, payload), fields(chat_id = %destination.chat_id))]
    async fn deliver(
        &self,
        destination: &Destination,
        payload: &Payload,
    ) -> Result<(), DeliveryError> {
        let (method, body) = Self::request_for(destination, payload);
        let mut attempt = 0;

        loop {
            match self.send_once(method, &body).await {
                Ok(()) => {
                    info!(method, attempts = attempt + 1, "Payload delivered");
                    return Ok(());
                }
                Err(e @ DeliveryError::Rejected(_)) => return Err(e),
                Err(e) => match self.retry.next_delay(attempt) {
                    Some(delay) => {
                        warn!(
                            error = %e,
                            attempt = attempt + 1,
                            retry_delay_ms = delay.as_millis() as u64,
                            "Delivery failed, retrying"
                        );
                        sleep(delay).await;
                        attempt += 1;
                    }
                    None => {
                        warn!(
                            error = %e,
                            attempts = attempt + 1,
                            "Delivery failed after all retries"
                        );
                        return Err(DeliveryError::MaxRetriesExceeded(self.retry.max_retries()));
                    }
                },
            }
        }
    }
}

/// Dry-run delivery that only logs what would be sent
pub struct LogDelivery;

#[async_trait]
impl Delivery for LogDelivery {
    async fn deliver(
        &self,
        destination: &Destination,
        payload: &Payload,
    ) -> Result<(), DeliveryError> {
        match payload {
            Payload::Text { text } => {
                info!(chat_id = %destination.chat_id, text = %text, "Dry run: message");
            }
            Payload::Poll { question, options } => {
                info!(
                    chat_id = %destination.chat_id,
                    question = %question,
                    options = ?options,
                    "Dry run: poll"
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::FixedDelay;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn delivery(server: &MockServer) -> TelegramDelivery {
        TelegramDelivery::new(server.uri(), "TOKEN", 5)
            .unwrap()
            .with_retry(Arc::new(FixedDelay::new(Duration::from_millis(1), 2)))
    }

    #[tokio::test]
    async fn test_text_uses_send_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botTOKEN/sendMessage"))
            .and(body_partial_json(json!({ "chat_id": "42", "text": "hello" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
            .expect(1)
            .mount(&server)
            .await;

        let payload = Payload::Text {
            text: "hello".to_string(),
        };
        delivery(&server)
            .deliver(&Destination::new("42"), &payload)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_poll_uses_send_poll() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botTOKEN/sendPoll"))
            .and(body_partial_json(json!({
                "chat_id": "-100",
                "question": "Coming?",
                "options": [{ "text": "Yes" }, { "text": "No" }],
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
            .expect(1)
            .mount(&server)
            .await;

        let payload = Payload::Poll {
            question: "Coming?".to_string(),
            options: vec!["Yes".to_string(), "No".to_string()],
        };
        delivery(&server)
            .deliver(&Destination::new("-100"), &payload)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_rejection_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "ok": false,
                "description": "Bad Request: chat not found",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let payload = Payload::Text {
            text: "hello".to_string(),
        };
        let err = delivery(&server)
            .deliver(&Destination::new("0"), &payload)
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::Rejected(ref d) if d.contains("chat not found")));
    }

    #[tokio::test]
    async fn test_server_errors_exhaust_retries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502))
            .expect(3)
            .mount(&server)
            .await;

        let payload = Payload::Text {
            text: "hello".to_string(),
        };
        let err = delivery(&server)
            .deliver(&Destination::new("42"), &payload)
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::MaxRetriesExceeded(2)));
    }

    #[test]
    fn test_empty_token_rejected() {
        assert!(matches!(
            TelegramDelivery::new(DEFAULT_TELEGRAM_API, "", 5),
            Err(DeliveryError::InvalidConfiguration(_))
        ));
    }

    #[tokio::test]
    async fn test_log_delivery_always_succeeds() {
        let payload = Payload::Poll {
            question: "Coming?".to_string(),
            options: vec!["Yes".to_string()],
        };
        assert!(LogDelivery
            .deliver(&Destination::new("1"), &payload)
            .await
            .is_ok());
    }
}
