//! Wire types for the Plex APIs.
//!
//! * [`account`] - plex.tv: pairing PINs and the server directory
//! * [`library`] - media server: sections, artists, albums, tracks, hubs
//!
//! Media servers wrap every response in a `MediaContainer` envelope:
//!
//! ```json
//! {
//!     "MediaContainer": {
//!         "size": 2,
//!         "Directory": [...],
//!         "Metadata": [...],
//!         "Hub": [...]
//!     }
//! }
//! ```
//!
//! Which of the arrays is present depends on the endpoint. Missing arrays
//! deserialize as empty.

pub mod account;
pub mod library;

use std::fmt::Debug;

use serde::Deserialize;

use crate::error::Result;

/// Top-level envelope of a media server response.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Response<T> {
    #[serde(rename = "MediaContainer")]
    pub container: MediaContainer<T>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct MediaContainer<T> {
    #[serde(default)]
    pub size: u64,

    /// Total number of items on the server, for paginated requests.
    #[serde(default, rename = "totalSize")]
    pub total_size: Option<u64>,

    #[serde(default = "Vec::new", rename = "Directory")]
    pub directory: Vec<T>,

    #[serde(default = "Vec::new", rename = "Metadata")]
    pub metadata: Vec<T>,

    #[serde(default = "Vec::new", rename = "Hub")]
    pub hub: Vec<Hub<T>>,
}

/// One group of search results.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hub<T> {
    #[serde(default)]
    pub title: String,

    #[serde(default, rename = "type")]
    pub typ: String,

    #[serde(default)]
    pub hub_identifier: String,

    #[serde(default = "Vec::new", rename = "Metadata")]
    pub metadata: Vec<T>,
}

impl<T> Response<T> {
    /// Consumes the envelope, returning the `Directory` entries.
    #[must_use]
    pub fn into_directory(self) -> Vec<T> {
        self.container.directory
    }

    /// Consumes the envelope, returning the `Metadata` entries.
    #[must_use]
    pub fn into_metadata(self) -> Vec<T> {
        self.container.metadata
    }

    /// Consumes the envelope, returning the metadata of all hubs in order.
    #[must_use]
    pub fn into_hub_metadata(self) -> Vec<T> {
        self.container
            .hub
            .into_iter()
            .flat_map(|hub| hub.metadata)
            .collect()
    }
}

/// Parses a response body as JSON and logs the result.
///
/// Successful parses are logged at trace level. On failure, the body is
/// logged as generic JSON if it is JSON at all, so that mismatches between
/// the wire format and these types can be diagnosed.
///
/// # Errors
///
/// Returns error if the body is not valid JSON or does not match `T`.
pub fn json<T>(body: &str, origin: &str) -> Result<T>
where
    T: for<'de> Deserialize<'de> + Debug,
{
    match serde_json::from_str(body) {
        Ok(result) => {
            trace!("{origin}: {result:#?}");
            Ok(result)
        }
        Err(e) => {
            if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
                debug!("{origin}: unexpected response: {json:#?}");
            } else {
                error!("{origin}: failed parsing response ({e})");
                trace!("{body}");
            }
            Err(e.into())
        }
    }
}
