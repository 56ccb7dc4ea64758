//! Notification transport
//!
//! Typed webhook payloads and the delivery seam. [`RocketChatWebhook`]
//! posts messages to a Rocket.Chat incoming webhook.

use crate::error::{MessageError, TransportError};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

/// Default request timeout for webhook delivery
pub const DEFAULT_WEBHOOK_TIMEOUT: Duration = Duration::from_secs(30);

/// Single attachment block of a webhook message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attachment {
    title: String,
    text: String,
    color: String,
}

impl Attachment {
    /// Create attachment; the title must not be blank
    pub fn new(
        title: impl Into<String>,
        text: impl Into<String>,
        color: impl Into<String>,
    ) -> Result<Self, MessageError> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(MessageError::EmptyTitle);
        }
        Ok(Self {
            title,
            text: text.into(),
            color: color.into(),
        })
    }

    /// Attachment title
    #[inline]
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Attachment body
    #[inline]
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Attachment color
    #[inline]
    #[must_use]
    pub fn color(&self) -> &str {
        &self.color
    }
}

/// Incoming-webhook message
///
/// Serializes to `{"channel", "username", "attachments"}`. `@name` channels
/// are direct messages; anything else is passed through as an opaque target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookMessage {
    channel: String,
    #[serde(rename = "username")]
    sender: String,
    attachments: Vec<Attachment>,
}

impl WebhookMessage {
    /// Direct message to a user
    pub fn direct(
        username: &str,
        sender: impl Into<String>,
        attachment: Attachment,
    ) -> Result<Self, MessageError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(MessageError::EmptyUsername);
        }
        Self::to_channel(format!("@{username}"), sender, attachment)
    }

    /// Message to an arbitrary channel or target
    pub fn to_channel(
        channel: impl Into<String>,
        sender: impl Into<String>,
        attachment: Attachment,
    ) -> Result<Self, MessageError> {
        let channel = channel.into();
        if channel.trim().is_empty() {
            return Err(MessageError::EmptyChannel);
        }
        Ok(Self {
            channel,
            sender: sender.into(),
            attachments: vec![attachment],
        })
    }

    /// Target channel
    #[inline]
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Sender display name
    #[inline]
    #[must_use]
    pub fn sender(&self) -> &str {
        &self.sender
    }

    /// Attachments in order
    #[inline]
    #[must_use]
    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    /// Body of the first attachment
    #[must_use]
    pub fn text(&self) -> &str {
        self.attachments.first().map_or("", Attachment::text)
    }

    /// Payload as pretty JSON, for logs
    #[must_use]
    pub fn to_pretty_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| format!("{self:?}"))
    }
}

/// Delivery seam between the checker and the chat server
#[async_trait]
pub trait NotificationTransport: Send + Sync {
    /// Deliver one message
    async fn send(&self, message: &WebhookMessage) -> Result<(), TransportError>;
}

/// Webhook transport configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookConfig {
    /// Incoming webhook URL
    pub url: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl WebhookConfig {
    /// Create config with the default timeout
    #[inline]
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: DEFAULT_WEBHOOK_TIMEOUT,
        }
    }

    /// With request timeout
    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Rocket.Chat incoming-webhook client
#[derive(Debug, Clone)]
pub struct RocketChatWebhook {
    client: reqwest::Client,
    url: String,
}

impl RocketChatWebhook {
    /// Build the HTTP client for a webhook
    pub fn new(config: WebhookConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("rc2fa/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            url: config.url,
        })
    }
}

#[async_trait]
impl NotificationTransport for RocketChatWebhook {
    async fn send(&self, message: &WebhookMessage) -> Result<(), TransportError> {
        tracing::debug!("Posting webhook message to {}", message.channel());
        let response = self.client.post(&self.url).json(message).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Rejected {
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}
