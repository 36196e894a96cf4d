//! Shared HTTP client for plex.tv and media servers.
//!
//! [`Client`] wraps `reqwest::Client` with:
//! * a rate limiter, so that polling loops cannot flood a server
//! * the `X-Plex-*` headers that identify this player on every request
//! * timeouts tuned for LAN addresses that hang instead of refusing
//!
//! # Example
//!
//! ```rust
//! use plexer::http::Client;
//!
//! let client = Client::new(&config)?;
//! let sections: Response<Section> = client.json(client.get(url)).await?;
//! ```

use std::{fmt, num::NonZeroU32, time::Duration};

use governor::{DefaultDirectRateLimiter, Quota};
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue, ACCEPT},
    Method, Url,
};
use serde::de::DeserializeOwned;

use crate::{
    config::Config,
    error::{Error, Result},
    protocol,
};

pub struct Client {
    /// Bypasses the rate limiter. Audio streams use this so that they are
    /// never held up behind API calls.
    pub unlimited: reqwest::Client,

    limiter: DefaultDirectRateLimiter,
}

impl Client {
    /// Requests allowed per second. Probing all candidates of a server
    /// goes out in one burst of at most this many.
    const REQUESTS_PER_SECOND: u32 = 20;

    const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

    /// Kept well below the resolver's probe timeout.
    const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

    const READ_TIMEOUT: Duration = Duration::from_secs(15);

    /// Creates a client that identifies itself as described by `config`.
    ///
    /// # Errors
    ///
    /// Returns error if a configuration value is not a valid header value,
    /// or the TLS backend cannot be initialized.
    pub fn new(config: &Config) -> Result<Self> {
        let inner = reqwest::Client::builder()
            .default_headers(Self::headers(config)?)
            .user_agent(&config.user_agent)
            .connect_timeout(Self::CONNECT_TIMEOUT)
            .read_timeout(Self::READ_TIMEOUT)
            .pool_idle_timeout(Self::IDLE_TIMEOUT)
            .build()?;

        let burst = NonZeroU32::new(Self::REQUESTS_PER_SECOND)
            .ok_or_else(|| Error::internal("rate limit of zero requests"))?;

        Ok(Self {
            unlimited: inner,
            limiter: governor::RateLimiter::direct(Quota::per_second(burst)),
        })
    }

    /// The identification headers Plex expects from every client.
    ///
    /// # Errors
    ///
    /// Returns error if a configuration value is not a valid header value.
    pub fn headers(config: &Config) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let pairs = [
            ("x-plex-product", config.app_name.clone()),
            ("x-plex-version", config.app_version.clone()),
            ("x-plex-client-identifier", config.client_id.to_string()),
            ("x-plex-platform", config.os_name.clone()),
            ("x-plex-platform-version", config.os_version.clone()),
            ("x-plex-device-name", config.device_name.clone()),
        ];
        for (name, value) in pairs {
            headers.insert(
                HeaderName::from_static(name),
                HeaderValue::from_str(&value)?,
            );
        }

        Ok(headers)
    }

    #[must_use]
    pub fn request(&self, method: Method, url: Url) -> reqwest::Request {
        reqwest::Request::new(method, url)
    }

    #[must_use]
    pub fn get(&self, url: Url) -> reqwest::Request {
        self.request(Method::GET, url)
    }

    #[must_use]
    pub fn post(&self, url: Url) -> reqwest::Request {
        self.request(Method::POST, url)
    }

    /// Sends `request` once the rate limiter allows it.
    ///
    /// # Errors
    ///
    /// Returns error if the request could not be sent or no response came
    /// back. Error statuses are not errors here.
    pub async fn execute(&self, request: reqwest::Request) -> Result<reqwest::Response> {
        self.limiter.until_ready().await;
        Ok(self.unlimited.execute(request).await?)
    }

    /// Executes a request and parses a successful response body as JSON.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails, the server responds with an
    /// error status, or the body is not the expected JSON.
    pub async fn json<T>(&self, request: reqwest::Request) -> Result<T>
    where
        T: DeserializeOwned + fmt::Debug,
    {
        let origin = format!("{} {}", request.method(), request.url().path());

        let response = self.execute(request).await?.error_for_status()?;
        let body = response.text().await?;
        protocol::json(&body, &origin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_identify_the_client() {
        let config = Config::new();
        let headers = Client::headers(&config).unwrap();

        assert_eq!(headers[ACCEPT], "application/json");
        assert_eq!(headers["x-plex-product"], config.app_name.as_str());
        assert_eq!(
            headers["x-plex-client-identifier"],
            config.client_id.to_string().as_str()
        );
        assert!(!headers.contains_key("x-plex-token"));
    }
}
