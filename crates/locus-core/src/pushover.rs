//! Pushover notification client.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::{Client, StatusCode};
use tracing::{info, warn};

use crate::error::Result;
use crate::http::{build_client, require};
use crate::traits::{Notification, Notifier, NotifyStatus};

/// Default messages endpoint.
pub const PUSHOVER_API_URL: &str = "https://api.pushover.net/1/messages.json";

/// Title of the morning weather notification.
pub const WEATHER_TITLE: &str = "Weather Forecast";

/// Client for the Pushover messages API.
#[derive(Debug, Clone)]
pub struct PushoverClient {
    client: Client,
    url: String,
    token: String,
    user: String,
}

impl PushoverClient {
    pub fn new(token: &str, user: &str) -> Result<Self> {
        Ok(Self {
            client: build_client()?,
            url: PUSHOVER_API_URL.to_string(),
            token: require(token, "PUSHOVER_WEATHER_API_TOKEN")?,
            user: require(user, "PUSHOVER_USER_KEY")?,
        })
    }

    /// Point the client at a different endpoint.
    pub fn with_url(mut self, url: &str) -> Self {
        self.url = url.to_string();
        self
    }

    fn form(&self, notification: &Notification) -> Vec<(&'static str, String)> {
        let mut form = vec![
            ("token", self.token.clone()),
            ("user", self.user.clone()),
            ("title", notification.title.clone()),
            ("message", notification.message.clone()),
            ("priority", notification.priority.to_string()),
        ];
        if let Some(attachment) = &notification.attachment {
            form.push(("attachment_base64", STANDARD.encode(&attachment.bytes)));
            form.push(("attachment_type", attachment.mime_type.clone()));
        }
        form
    }
}

/// Body of the weather notification for a city.
pub fn weather_notification(city: &str, message: &str) -> Notification {
    Notification::new(WEATHER_TITLE, &format!("{city} Weather:\n{message}"))
}

#[async_trait]
impl Notifier for PushoverClient {
    async fn send(&self, notification: &Notification) -> Result<NotifyStatus> {
        let response = self
            .client
            .post(&self.url)
            .form(&self.form(notification))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::OK {
            info!("Notification '{}' delivered", notification.title);
            Ok(NotifyStatus::Success)
        } else {
            let body = response.text().await.unwrap_or_default();
            warn!("Notification rejected with HTTP {}: {}", status.as_u16(), body);
            Ok(NotifyStatus::Failure)
        }
    }
}
