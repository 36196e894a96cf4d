//! Media server client.
//!
//! All requests are `GET`s relative to the base address of a resolved
//! [`Connection`], authenticated by an `X-Plex-Token` query parameter. Listings
//! of a library section go through `/library/sections/{id}/all`, selecting the
//! kind of item by its numeric type:
//!
//! | Type | Items   |
//! |------|---------|
//! | 8    | artists |
//! | 9    | albums  |
//! | 10   | tracks  |

use std::{fmt, future::Future, sync::Arc};

use serde::de::DeserializeOwned;
use url::Url;

use crate::{
    error::Result,
    http::Client as HttpClient,
    protocol::{
        library::{Album, Artist, Item, Section, Track},
        Response,
    },
    resolver::Connection,
};

/// Catalog queries needed by connection resolution and continuation.
///
/// [`MediaServer`] is the implementation that talks HTTP. The seam exists so
/// that probing and shuffling can be driven without a network.
pub trait Library: Send + Sync + 'static {
    /// Lists the library sections of the server at `connection`.
    ///
    /// This doubles as the reachability probe during resolution.
    fn libraries(&self, connection: &Connection)
        -> impl Future<Output = Result<Vec<Section>>> + Send;

    /// Picks up to `limit` random tracks from `section`.
    fn random_tracks(
        &self,
        connection: &Connection,
        section: &str,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<Track>>> + Send;
}

/// A window into a paginated listing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Page {
    pub start: usize,
    pub size: usize,
}

impl Page {
    pub const DEFAULT_SIZE: usize = 50;

    #[must_use]
    pub fn new(start: usize, size: usize) -> Self {
        Self { start, size }
    }

    /// The page after this one.
    #[must_use]
    pub fn next(self) -> Self {
        Self {
            start: self.start + self.size,
            size: self.size,
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(0, Self::DEFAULT_SIZE)
    }
}

impl fmt::Display for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.start + self.size)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Kind {
    Artist = 8,
    Album = 9,
    Track = 10,
}

impl Kind {
    fn param(self) -> String {
        (self as u8).to_string()
    }
}

/// HTTP client for the media server API.
#[derive(Clone)]
pub struct MediaServer {
    http_client: Arc<HttpClient>,
}

impl MediaServer {
    const SEARCH_LIMIT: usize = 20;

    /// Creates a media server client sharing `http_client` with other
    /// services.
    #[must_use]
    pub fn new(http_client: Arc<HttpClient>) -> Self {
        Self { http_client }
    }

    /// Builds an authenticated URL to `path` on the server.
    ///
    /// Parameters with empty values are left out.
    ///
    /// # Errors
    ///
    /// Returns error if `path` cannot be joined onto the base address.
    pub fn url(connection: &Connection, path: &str, params: &[(&str, &str)]) -> Result<Url> {
        let mut url = connection.base.join(path)?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("X-Plex-Token", connection.token.as_str());
            for (key, value) in params.iter().filter(|(_, value)| !value.is_empty()) {
                query.append_pair(key, value);
            }
        }
        Ok(url)
    }

    /// URL from which the audio of `part_key` can be streamed.
    ///
    /// # Errors
    ///
    /// Returns error if `part_key` cannot be joined onto the base address.
    pub fn stream_url(connection: &Connection, part_key: &str) -> Result<Url> {
        Self::url(connection, part_key, &[])
    }

    /// URL of a scaled rendition of the artwork at `path`.
    ///
    /// # Errors
    ///
    /// Returns error if the base address cannot hold the transcoder path.
    pub fn transcode_url(
        connection: &Connection,
        path: &str,
        width: u32,
        height: u32,
    ) -> Result<Url> {
        Self::url(
            connection,
            "/photo/:/transcode",
            &[
                ("url", path),
                ("width", &width.to_string()),
                ("height", &height.to_string()),
                ("minSize", "1"),
                ("upscale", "1"),
            ],
        )
    }

    async fn fetch<T>(
        &self,
        connection: &Connection,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<Response<T>>
    where
        T: DeserializeOwned + fmt::Debug,
    {
        let url = Self::url(connection, path, params)?;
        let request = self.http_client.get(url);
        self.http_client.json(request).await
    }

    async fn list<T>(
        &self,
        connection: &Connection,
        section: &str,
        kind: Kind,
        page: Page,
        title: Option<&str>,
    ) -> Result<Vec<T>>
    where
        T: DeserializeOwned + fmt::Debug,
    {
        let path = format!("/library/sections/{section}/all");
        let kind = kind.param();
        let start = page.start.to_string();
        let size = page.size.to_string();
        let params = [
            ("type", kind.as_str()),
            ("sort", "titleSort"),
            ("X-Plex-Container-Start", start.as_str()),
            ("X-Plex-Container-Size", size.as_str()),
            ("title", title.unwrap_or_default()),
        ];
        let response = self.fetch(connection, &path, &params).await?;
        Ok(response.into_metadata())
    }

    /// Lists the library sections, music and otherwise.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the response cannot be parsed.
    pub async fn sections(&self, connection: &Connection) -> Result<Vec<Section>> {
        let response = self
            .fetch::<Section>(connection, "/library/sections", &[])
            .await?;
        Ok(response.into_directory())
    }

    /// Lists artists in `section` by name, optionally filtered by `title`.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the response cannot be parsed.
    pub async fn artists(
        &self,
        connection: &Connection,
        section: &str,
        page: Page,
        title: Option<&str>,
    ) -> Result<Vec<Artist>> {
        self.list(connection, section, Kind::Artist, page, title)
            .await
    }

    /// Lists albums in `section` by title, optionally filtered by `title`.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the response cannot be parsed.
    pub async fn albums(
        &self,
        connection: &Connection,
        section: &str,
        page: Page,
        title: Option<&str>,
    ) -> Result<Vec<Album>> {
        self.list(connection, section, Kind::Album, page, title)
            .await
    }

    /// Lists tracks in `section` by title, optionally filtered by `title`.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the response cannot be parsed.
    pub async fn tracks(
        &self,
        connection: &Connection,
        section: &str,
        page: Page,
        title: Option<&str>,
    ) -> Result<Vec<Track>> {
        self.list(connection, section, Kind::Track, page, title)
            .await
    }

    /// Lists the albums of `artist`, newest first.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the response cannot be parsed.
    pub async fn artist_albums(
        &self,
        connection: &Connection,
        section: &str,
        artist: &str,
        page: Page,
    ) -> Result<Vec<Album>> {
        let path = format!("/library/sections/{section}/all");
        let kind = Kind::Album.param();
        let start = page.start.to_string();
        let size = page.size.to_string();
        let params = [
            ("type", kind.as_str()),
            ("artist.id", artist),
            ("sort", "year:desc"),
            ("X-Plex-Container-Start", start.as_str()),
            ("X-Plex-Container-Size", size.as_str()),
        ];
        let response = self.fetch(connection, &path, &params).await?;
        Ok(response.into_metadata())
    }

    /// Lists every track of `artist` across all of their albums.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the response cannot be parsed.
    pub async fn artist_tracks(&self, connection: &Connection, artist: &str) -> Result<Vec<Track>> {
        let path = format!("/library/metadata/{artist}/allLeaves");
        let response = self.fetch(connection, &path, &[]).await?;
        Ok(response.into_metadata())
    }

    /// Lists the tracks of `album` in track order.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the response cannot be parsed.
    pub async fn album_tracks(
        &self,
        connection: &Connection,
        section: &str,
        album: &str,
    ) -> Result<Vec<Track>> {
        let path = format!("/library/sections/{section}/all");
        let kind = Kind::Track.param();
        let params = [
            ("type", kind.as_str()),
            ("album.id", album),
            ("sort", "index"),
        ];
        let response = self.fetch(connection, &path, &params).await?;
        Ok(response.into_metadata())
    }

    /// Searches the whole server. Results of all hubs are returned in hub
    /// order; non-music results show up as [`Item::Other`].
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the response cannot be parsed.
    pub async fn search(&self, connection: &Connection, query: &str) -> Result<Vec<Item>> {
        let limit = Self::SEARCH_LIMIT.to_string();
        let params = [("query", query), ("limit", limit.as_str())];
        let response = self.fetch(connection, "/hubs/search", &params).await?;
        Ok(response.into_hub_metadata())
    }
}

impl Library for MediaServer {
    async fn libraries(&self, connection: &Connection) -> Result<Vec<Section>> {
        self.sections(connection).await
    }

    async fn random_tracks(
        &self,
        connection: &Connection,
        section: &str,
        limit: usize,
    ) -> Result<Vec<Track>> {
        let path = format!("/library/sections/{section}/all");
        let kind = Kind::Track.param();
        let limit = limit.to_string();
        let params = [
            ("type", kind.as_str()),
            ("sort", "random"),
            ("limit", limit.as_str()),
        ];
        let response = self.fetch(connection, &path, &params).await?;
        Ok(response.into_metadata())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection() -> Connection {
        Connection {
            base: Url::parse("https://10-0-0-2.abc.plex.direct:32400").unwrap(),
            token: "tok".parse().unwrap(),
            name: "Living Room".to_owned(),
        }
    }

    #[test]
    fn url_skips_empty_params() {
        let url = MediaServer::url(
            &connection(),
            "/library/sections/1/all",
            &[("type", "8"), ("title", "")],
        )
        .unwrap();
        assert_eq!(
            url.as_str(),
            "https://10-0-0-2.abc.plex.direct:32400/library/sections/1/all?X-Plex-Token=tok&type=8"
        );
    }

    #[test]
    fn stream_url_keeps_part_path() {
        let url = MediaServer::stream_url(&connection(), "/library/parts/100/file.flac").unwrap();
        assert_eq!(url.path(), "/library/parts/100/file.flac");
        assert_eq!(url.query(), Some("X-Plex-Token=tok"));
    }

    #[test]
    fn transcode_url_encodes_source_path() {
        let url =
            MediaServer::transcode_url(&connection(), "/library/metadata/1/thumb/99", 300, 300)
                .unwrap();
        assert_eq!(url.path(), "/photo/:/transcode");
        let query: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(query.contains(&("url".to_owned(), "/library/metadata/1/thumb/99".to_owned())));
        assert!(query.contains(&("width".to_owned(), "300".to_owned())));
        assert!(query.contains(&("minSize".to_owned(), "1".to_owned())));
        assert!(query.contains(&("upscale".to_owned(), "1".to_owned())));
    }

    #[test]
    fn pages_advance_by_size() {
        let page = Page::default();
        assert_eq!(page.next(), Page::new(50, 50));
        assert_eq!(page.next().to_string(), "50..100");
    }
}
