//! External service handles used by the jobs.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use locus_core::{
    FollowMeeClient, LocationSource, Notification, Notifier, NotifyStatus, OpenAiClient,
    OpenWeatherClient, PushoverClient, RawForecast, TextGenerator, WeatherSource,
};
use locus_types::DeviceReading;

use crate::config::{Config, Secrets};

/// The four collaborators a job talks to.
#[derive(Clone)]
pub struct Services {
    pub location: Arc<dyn LocationSource>,
    pub weather: Arc<dyn WeatherSource>,
    pub text: Arc<dyn TextGenerator>,
    pub notifier: Arc<dyn Notifier>,
}

impl Services {
    /// Build the real clients.
    ///
    /// A client whose credentials are missing is replaced by a stand-in that
    /// fails with [`locus_core::Error::MissingCredential`] when used, so the
    /// service still starts and only the job that needs it fails.
    pub fn from_secrets(secrets: &Secrets, config: &Config) -> Self {
        let location: Arc<dyn LocationSource> =
            match FollowMeeClient::new(&secrets.followmee_api_key, &secrets.followmee_username) {
                Ok(client) => Arc::new(client),
                Err(e) => unconfigured(e),
            };
        let weather: Arc<dyn WeatherSource> =
            match OpenWeatherClient::new(&secrets.openweathermap_api_key) {
                Ok(client) => Arc::new(client),
                Err(e) => unconfigured(e),
            };
        let text: Arc<dyn TextGenerator> = match OpenAiClient::new(&secrets.openai_api_key) {
            Ok(client) => Arc::new(client.with_model(&config.weather.model)),
            Err(e) => unconfigured(e),
        };
        let notifier: Arc<dyn Notifier> =
            match PushoverClient::new(&secrets.pushover_token, &secrets.pushover_user) {
                Ok(client) => Arc::new(client),
                Err(e) => unconfigured(e),
            };

        Self {
            location,
            weather,
            text,
            notifier,
        }
    }
}

fn unconfigured(error: locus_core::Error) -> Arc<Unconfigured> {
    let name = match error {
        locus_core::Error::MissingCredential(name) => name,
        _ => "credentials",
    };
    warn!("{} is not set; the jobs that need it will fail", name);
    Arc::new(Unconfigured(name))
}

/// Stand-in for a client that could not be built.
#[derive(Debug, Clone, Copy)]
pub struct Unconfigured(pub &'static str);

impl Unconfigured {
    fn error(&self) -> locus_core::Error {
        locus_core::Error::MissingCredential(self.0)
    }
}

#[async_trait]
impl LocationSource for Unconfigured {
    async fn current_locations(&self) -> locus_core::Result<BTreeMap<String, DeviceReading>> {
        Err(self.error())
    }
}

#[async_trait]
impl WeatherSource for Unconfigured {
    async fn forecast(&self, _latitude: f64, _longitude: f64) -> locus_core::Result<RawForecast> {
        Err(self.error())
    }
}

#[async_trait]
impl TextGenerator for Unconfigured {
    async fn complete(&self, _prompt: &str) -> locus_core::Result<String> {
        Err(self.error())
    }
}

#[async_trait]
impl Notifier for Unconfigured {
    async fn send(&self, _notification: &Notification) -> locus_core::Result<NotifyStatus> {
        Err(self.error())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_secrets_fail_on_use() {
        let services = Services::from_secrets(&Secrets::default(), &Config::default());

        let err = services.location.current_locations().await.unwrap_err();
        assert!(matches!(
            err,
            locus_core::Error::MissingCredential("FOLLOWMEE_API_KEY")
        ));

        let err = services.weather.forecast(1.0, 2.0).await.unwrap_err();
        assert!(err.to_string().contains("OPENWEATHERMAP_API_KEY"));

        let err = services.text.complete("hi").await.unwrap_err();
        assert!(err.to_string().contains("OPENAI_API_KEY"));

        let err = services
            .notifier
            .send(&Notification::new("t", "m"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("PUSHOVER_WEATHER_API_TOKEN"));
    }

    #[tokio::test]
    async fn test_partial_secrets() {
        let secrets = Secrets {
            followmee_api_key: "key".to_string(),
            ..Default::default()
        };
        let services = Services::from_secrets(&secrets, &Config::default());
        let err = services.location.current_locations().await.unwrap_err();
        assert!(err.to_string().contains("FOLLOWMEE_USERNAME"));
    }
}
