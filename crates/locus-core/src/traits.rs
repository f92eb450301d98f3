//! Trait abstractions for the external services.
//!
//! Each job in the service depends on these traits rather than on the HTTP
//! clients, so the same code runs against the real APIs and against the
//! mocks in [`crate::mock`].

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Serialize;

use locus_types::DeviceReading;

use crate::error::Result;
use crate::weather::RawForecast;

/// Source of current device locations.
#[async_trait]
pub trait LocationSource: Send + Sync {
    /// Latest reading of every tracked device, keyed by device id.
    async fn current_locations(&self) -> Result<BTreeMap<String, DeviceReading>>;
}

/// Source of multi-day forecasts.
#[async_trait]
pub trait WeatherSource: Send + Sync {
    /// Raw 3-hourly forecast for a coordinate.
    async fn forecast(&self, latitude: f64, longitude: f64) -> Result<RawForecast>;
}

/// Text-generation service.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Complete a prompt. The reply is returned as-is.
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Push-notification service.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a notification.
    ///
    /// A rejected notification is reported as [`NotifyStatus::Failure`];
    /// only transport problems are errors.
    async fn send(&self, notification: &Notification) -> Result<NotifyStatus>;
}

/// A push notification.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub title: String,
    pub message: String,
    pub priority: i8,
    pub attachment: Option<Attachment>,
}

impl Notification {
    /// Notification with normal priority and no attachment.
    pub fn new(title: &str, message: &str) -> Self {
        Self {
            title: title.to_string(),
            message: message.to_string(),
            priority: 0,
            attachment: None,
        }
    }

    /// Attach an image.
    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }
}

/// Binary attachment sent alongside a notification.
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

/// Outcome of a notification send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifyStatus {
    Success,
    Failure,
}

impl NotifyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotifyStatus::Success => "success",
            NotifyStatus::Failure => "failure",
        }
    }
}
