// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Operator notifications (Discord webhook embeds).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;

pub const COLOR_BLUE: u32 = 0x3498db;
pub const COLOR_RED: u32 = 0xe74c3c;
pub const COLOR_ORANGE: u32 = 0xe67e22;

/// A structured message, rendered as a Discord embed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub description: String,
    pub fields: Vec<NotificationField>,
    pub color: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

impl Notification {
    pub fn new(title: impl Into<String>, color: u32) -> Self {
        Self {
            title: title.into(),
            url: None,
            description: String::new(),
            fields: Vec::new(),
            color,
            timestamp: None,
            footer: None,
        }
    }

    /// Operator-facing failure notice.
    pub fn error(message: impl Into<String>) -> Self {
        let mut n = Self::new("Error", COLOR_RED);
        n.description = message.into();
        n
    }

    /// Operator-facing warning notice.
    pub fn warning(message: impl Into<String>) -> Self {
        let mut n = Self::new("Warning", COLOR_ORANGE);
        n.description = message.into();
        n
    }

    pub fn inline_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push(NotificationField {
            name: name.into(),
            value: value.into(),
            inline: true,
        });
        self
    }

    /// Discord embed JSON.
    fn to_embed(&self) -> serde_json::Value {
        let mut embed = json!({
            "title": self.title,
            "description": self.description,
            "color": self.color,
            "fields": self.fields,
        });
        if let Some(url) = &self.url {
            embed["url"] = json!(url);
        }
        if let Some(ts) = self.timestamp {
            embed["timestamp"] = json!(crate::time_utils::format_utc_rfc3339(ts));
        }
        if let Some(footer) = &self.footer {
            embed["footer"] = json!({ "text": footer });
        }
        embed
    }
}

/// Pluggable notification delivery.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, notification: &Notification) -> anyhow::Result<()>;
}

/// Deliver without letting a failure reach the caller.
pub async fn send_best_effort(sink: &dyn NotificationSink, notification: &Notification) {
    if let Err(e) = sink.send(notification).await {
        tracing::warn!(
            error = %e,
            title = %notification.title,
            "Failed to deliver notification"
        );
    }
}

/// Discord incoming webhook sink.
pub struct DiscordWebhook {
    webhook_url: String,
    http: reqwest::Client,
}

impl DiscordWebhook {
    pub fn new(webhook_url: String) -> Self {
        Self {
            webhook_url,
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl NotificationSink for DiscordWebhook {
    async fn send(&self, notification: &Notification) -> anyhow::Result<()> {
        let payload = json!({
            "content": "",
            "embeds": [notification.to_embed()],
        });

        let resp = self
            .http
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            tracing::warn!(status = %status, body = %body, "Discord webhook returned non-success");
            anyhow::bail!("Discord webhook returned {status}");
        }

        Ok(())
    }
}

/// Used when no webhook is configured.
pub struct NoopSink;

#[async_trait]
impl NotificationSink for NoopSink {
    async fn send(&self, notification: &Notification) -> anyhow::Result<()> {
        tracing::debug!(title = %notification.title, "No webhook configured, dropping notification");
        Ok(())
    }
}
