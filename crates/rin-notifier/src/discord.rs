//! Discord webhook delivery.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use rin_core::CouponMessage;
use serde::Serialize;

use crate::format::expires_label;
use crate::sink::{DeliveryError, MessageSink};

pub const BOT_NAME: &str = "RinKokonoe Coupon Bot";
const EMBED_COLOR: u32 = 0x00_c8_ff;

#[derive(Debug, Serialize)]
pub struct WebhookPayload {
    pub content: String,
    pub username: &'static str,
    pub embeds: Vec<Embed>,
}

#[derive(Debug, Serialize)]
pub struct Embed {
    pub title: String,
    pub url: String,
    pub description: String,
    pub fields: Vec<EmbedField>,
    pub color: u32,
    pub timestamp: String,
    pub footer: EmbedFooter,
}

#[derive(Debug, Serialize)]
pub struct EmbedField {
    pub name: &'static str,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Serialize)]
pub struct EmbedFooter {
    pub text: &'static str,
}

/// Build the webhook body for one coupon.
#[must_use]
pub fn build_payload(message: &CouponMessage, now: DateTime<Utc>) -> WebhookPayload {
    let field = |name, value| EmbedField {
        name,
        value,
        inline: true,
    };

    let mut fields = Vec::with_capacity(4);
    if let Some(discount) = message.discount {
        fields.push(field("Discount", format!("{discount}%")));
    }
    fields.push(field("Code", message.code.clone()));
    fields.push(field("Source", message.source.clone()));
    if let Some(expiry) = message.expiry {
        fields.push(field("Expires", expires_label(expiry, now)));
    }

    WebhookPayload {
        content: message.name.clone(),
        username: BOT_NAME,
        embeds: vec![Embed {
            title: format!("✅ {} AI Coupon", message.name),
            url: message.url.clone(),
            description: message.description.clone(),
            fields,
            color: EMBED_COLOR,
            timestamp: now.to_rfc3339(),
            footer: EmbedFooter { text: BOT_NAME },
        }],
    }
}

/// Posts coupons to a Discord channel through an incoming webhook.
#[derive(Clone)]
pub struct DiscordWebhookSink {
    client: Client,
    webhook_url: String,
}

impl DiscordWebhookSink {
    /// # Errors
    ///
    /// Returns [`reqwest::Error`] if the HTTP client cannot be constructed.
    pub fn new(webhook_url: &str, timeout_secs: u64) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(BOT_NAME)
            .build()?;
        Ok(Self {
            client,
            webhook_url: webhook_url.to_string(),
        })
    }
}

impl std::fmt::Debug for DiscordWebhookSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The webhook URL embeds its secret token.
        f.debug_struct("DiscordWebhookSink")
            .field("webhook_url", &"[redacted]")
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl MessageSink for DiscordWebhookSink {
    async fn send(&self, message: &CouponMessage) -> Result<(), DeliveryError> {
        let payload = build_payload(message, Utc::now());
        let response = self
            .client
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| DeliveryError::Transient(e.without_url().to_string()))?;

        classify_status(response.status())
    }
}

fn classify_status(status: StatusCode) -> Result<(), DeliveryError> {
    if status.is_success() {
        Ok(())
    } else if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        Err(DeliveryError::Transient(format!("webhook returned {status}")))
    } else {
        Err(DeliveryError::Rejected(format!("webhook returned {status}")))
    }
}
