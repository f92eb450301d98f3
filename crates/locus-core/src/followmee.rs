//! FollowMee tracking API client.
//!
//! Only the `currentforalldevices` function is used: it returns the latest
//! fix of every device on the account in a `Data` array.

use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, warn};

use locus_types::DeviceReading;

use crate::error::Result;
use crate::http::{build_client, decode_json, require};
use crate::traits::LocationSource;

/// Default endpoint of the tracks API.
pub const FOLLOWMEE_API_URL: &str = "https://www.followmee.com/api/tracks.aspx";

const SERVICE: &str = "FollowMee";

/// Client for the FollowMee tracks API.
#[derive(Debug, Clone)]
pub struct FollowMeeClient {
    client: Client,
    url: String,
    key: String,
    username: String,
}

#[derive(Deserialize)]
struct TracksResponse {
    #[serde(rename = "Data")]
    data: Vec<DeviceReading>,
}

impl FollowMeeClient {
    /// Create a client for an account.
    pub fn new(key: &str, username: &str) -> Result<Self> {
        Ok(Self {
            client: build_client()?,
            url: FOLLOWMEE_API_URL.to_string(),
            key: require(key, "FOLLOWMEE_API_KEY")?,
            username: require(username, "FOLLOWMEE_USERNAME")?,
        })
    }

    /// Point the client at a different endpoint.
    pub fn with_url(mut self, url: &str) -> Self {
        self.url = url.to_string();
        self
    }
}

#[async_trait]
impl LocationSource for FollowMeeClient {
    async fn current_locations(&self) -> Result<BTreeMap<String, DeviceReading>> {
        debug!("Requesting current locations for {}", self.username);

        let response = self
            .client
            .get(&self.url)
            .query(&[
                ("key", self.key.as_str()),
                ("username", self.username.as_str()),
                ("output", "json"),
                ("function", "currentforalldevices"),
            ])
            .send()
            .await?;

        let tracks: TracksResponse = decode_json(SERVICE, response).await?;

        let mut output = BTreeMap::new();
        for reading in tracks.data {
            if reading.device_id.is_empty() {
                warn!("Skipping location without a device id ({})", reading.date);
                continue;
            }
            let reading = reading.without_redundant_fields();
            output.insert(reading.device_id.clone(), reading);
        }

        info!("Fetched current location for {} device(s)", output.len());
        Ok(output)
    }
}
