//! Service clients for Locus.
//!
//! This crate talks to the four external services the tracker depends on,
//! each behind a trait so jobs can run against mocks:
//!
//! | Trait | Client | Service |
//! |-------|--------|---------|
//! | [`LocationSource`] | [`FollowMeeClient`] | FollowMee device tracking |
//! | [`WeatherSource`] | [`OpenWeatherClient`] | OpenWeatherMap 5-day forecast |
//! | [`TextGenerator`] | [`OpenAiClient`] | OpenAI chat completions |
//! | [`Notifier`] | [`PushoverClient`] | Pushover push notifications |
//!
//! It also normalises forecasts ([`parse_forecast`]) and composes the
//! morning message ([`compose_message`]).
//!
//! # Example
//!
//! ```no_run
//! use locus_core::{LocationSource, FollowMeeClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), locus_core::Error> {
//!     let client = FollowMeeClient::new("api-key", "username")?;
//!     for (device, reading) in client.current_locations().await? {
//!         println!("{device}: {} {}", reading.latitude, reading.longitude);
//!     }
//!     Ok(())
//! }
//! ```

pub mod compose;
pub mod error;
pub mod followmee;
mod http;
pub mod mock;
pub mod openai;
pub mod pushover;
pub mod traits;
pub mod weather;

pub use compose::{build_prompt, compose_message, format_weather, plain_message};
pub use error::{Error, Result};
pub use followmee::FollowMeeClient;
pub use mock::{MockLocationSource, MockNotifier, MockTextGenerator, MockWeatherSource};
pub use openai::OpenAiClient;
pub use pushover::{PushoverClient, weather_notification};
pub use traits::{
    Attachment, LocationSource, Notification, Notifier, NotifyStatus, TextGenerator,
    WeatherSource,
};
pub use weather::{Forecast, OpenWeatherClient, RawForecast, parse_forecast};

// Re-export the shared data model.
pub use locus_types;
