//! plex.tv account service.
//!
//! Pairing works without the user typing a password into this client:
//!
//! 1. [`Account::create_pin`] asks plex.tv for a short code.
//! 2. The user enters the code at <https://plex.tv/link> while signed in.
//! 3. [`Account::wait_for_token`] polls the PIN until plex.tv attaches an
//!    access token to it, or the PIN expires.
//!
//! With the token, [`Account::servers`] lists the media servers the account
//! can reach, each with its candidate addresses for the
//! [`Resolver`](crate::resolver::Resolver).

use std::{sync::Arc, time::Duration};

use reqwest::header::HeaderValue;
use thiserror::Error;
use url::Url;

use crate::{
    error::{Error, Result},
    http::Client as HttpClient,
    protocol::account::{Pin, Resource},
    token::AuthToken,
};

#[derive(Debug, Error)]
pub enum PairingError {
    #[error("code {code} expired before it was entered")]
    Expired { code: String },
}

impl From<PairingError> for Error {
    fn from(e: PairingError) -> Self {
        Self::deadline_exceeded(e)
    }
}

pub struct Account {
    http_client: Arc<HttpClient>,
    base: Url,
}

impl Account {
    /// The plex.tv API.
    pub const BASE_URL: &'static str = "https://plex.tv/api/v2/";

    /// Time between checks whether a PIN was claimed.
    pub const POLL_INTERVAL: Duration = Duration::from_secs(2);

    /// Creates an account client for plex.tv.
    ///
    /// # Errors
    ///
    /// Returns error if the base URL is invalid.
    pub fn new(http_client: Arc<HttpClient>) -> Result<Self> {
        Self::with_base(http_client, Self::BASE_URL)
    }

    /// Creates an account client for the API at `base`.
    ///
    /// # Errors
    ///
    /// Returns error if `base` is not a valid URL.
    pub fn with_base(http_client: Arc<HttpClient>, base: &str) -> Result<Self> {
        Ok(Self {
            http_client,
            base: Url::parse(base)?,
        })
    }

    /// Requests a new pairing code.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the response cannot be parsed.
    pub async fn create_pin(&self) -> Result<Pin> {
        let mut url = self.base.join("pins")?;
        url.query_pairs_mut().append_pair("strong", "false");

        let pin: Pin = self.http_client.json(self.http_client.post(url)).await?;
        debug!("pairing code {} valid for {:?}", pin.code, pin.expires_in);
        Ok(pin)
    }

    /// Fetches the current state of a PIN.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the response cannot be parsed.
    pub async fn check_pin(&self, id: u64) -> Result<Pin> {
        let url = self.base.join(&format!("pins/{id}"))?;
        self.http_client.json(self.http_client.get(url)).await
    }

    /// Polls `pin` until the user claimed it.
    ///
    /// Failed checks are logged and retried; only expiry ends the wait.
    ///
    /// # Errors
    ///
    /// Returns `DeadlineExceeded` if the PIN expires first.
    pub async fn wait_for_token(&self, pin: &Pin) -> Result<AuthToken> {
        let deadline = tokio::time::Instant::now() + pin.expires_in;
        let mut interval = tokio::time::interval(Self::POLL_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = tokio::time::sleep_until(deadline) => {
                    return Err(PairingError::Expired { code: pin.code.clone() }.into());
                }

                _ = interval.tick() => {
                    match self.check_pin(pin.id).await {
                        Ok(crate::protocol::account::Pin { auth_token: Some(token), .. }) => {
                            info!("paired with plex.tv");
                            return Ok(token);
                        }
                        Ok(_) => trace!("code {} not claimed yet", pin.code),
                        Err(e) => warn!("failed to check pairing code: {e}"),
                    }
                }
            }
        }
    }

    /// Lists the media servers available to the account.
    ///
    /// # Errors
    ///
    /// Returns `Unauthenticated` if the token was rejected, or another error
    /// if the request fails or the response cannot be parsed.
    pub async fn servers(&self, token: &AuthToken) -> Result<Vec<Resource>> {
        let mut url = self.base.join("resources")?;
        url.query_pairs_mut()
            .append_pair("includeHttps", "1")
            .append_pair("provides", "server");

        let mut request = self.http_client.get(url);
        let mut token_header = HeaderValue::from_str(token.as_str())?;
        token_header.set_sensitive(true);
        request.headers_mut().insert("x-plex-token", token_header);

        let resources: Vec<Resource> = self.http_client.json(request).await?;
        let servers: Vec<_> = resources
            .into_iter()
            .filter(Resource::is_server)
            .collect();
        debug!("account has {} servers", servers.len());
        Ok(servers)
    }
}
