//! Shared HTTP plumbing for the service clients.

use std::time::Duration;

use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{Error, Result};

/// Request timeout applied to every client.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Build the reqwest client used by all service clients.
pub(crate) fn build_client() -> Result<Client> {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .user_agent(concat!("locus/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(Error::Request)
}

/// Check the status and decode a JSON body.
pub(crate) async fn decode_json<T: DeserializeOwned>(
    service: &'static str,
    response: Response,
) -> Result<T> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(Error::Api {
            service,
            status: status.as_u16(),
            message: truncate(&body, 200),
        });
    }

    debug!("{} responded with {} bytes", service, body.len());
    serde_json::from_str(&body).map_err(|e| Error::invalid(service, e.to_string()))
}

pub(crate) fn require(value: &str, name: &'static str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        Err(Error::MissingCredential(name))
    } else {
        Ok(value.to_string())
    }
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_rejects_blank() {
        assert!(matches!(
            require("  ", "SOME_KEY"),
            Err(Error::MissingCredential("SOME_KEY"))
        ));
        assert_eq!(require(" abc ", "SOME_KEY").unwrap(), "abc");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdef", 3), "abc...");
    }
}
