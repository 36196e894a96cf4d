//! Media server library types.
//!
//! # Wire Format
//!
//! Track metadata, as found in `MediaContainer.Metadata`:
//! ```json
//! {
//!     "ratingKey": "1234",
//!     "key": "/library/metadata/1234",
//!     "type": "track",
//!     "title": "Song",
//!     "parentTitle": "Album",
//!     "grandparentTitle": "Artist",
//!     "index": 3,
//!     "parentIndex": 1,
//!     "duration": 215000,
//!     "librarySectionID": 5,
//!     "Media": [
//!         {
//!             "id": 99,
//!             "duration": 215000,
//!             "audioCodec": "flac",
//!             "container": "flac",
//!             "Part": [{"id": 100, "key": "/library/parts/100/file.flac", "size": 31337}]
//!         }
//!     ]
//! }
//! ```
//!
//! Durations are milliseconds on the wire.

use std::{fmt, time::Duration};

use serde::Deserialize;
use serde_with::{serde_as, DurationMilliSeconds};

/// A library section, e.g. "Music".
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize)]
pub struct Section {
    /// Section identifier used in `/library/sections/{key}/...` paths.
    pub key: String,

    pub title: String,

    /// `artist` for music libraries, `movie` or `show` for video ones.
    #[serde(rename = "type")]
    pub typ: String,

    #[serde(default)]
    pub thumb: Option<String>,

    #[serde(default)]
    pub art: Option<String>,
}

impl Section {
    /// Whether this section holds music.
    #[must_use]
    pub fn is_music(&self) -> bool {
        self.typ == "artist"
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artist {
    pub rating_key: String,
    pub key: String,
    pub title: String,

    #[serde(default)]
    pub summary: Option<String>,

    #[serde(default)]
    pub thumb: Option<String>,

    #[serde(default, rename = "librarySectionID")]
    pub library_section_id: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Album {
    pub rating_key: String,
    pub key: String,
    pub title: String,

    /// Artist id.
    #[serde(default)]
    pub parent_rating_key: Option<String>,

    /// Artist name.
    #[serde(default)]
    pub parent_title: Option<String>,

    #[serde(default)]
    pub year: Option<u32>,

    #[serde(default)]
    pub thumb: Option<String>,

    #[serde(default, rename = "librarySectionID")]
    pub library_section_id: Option<u64>,
}

#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub rating_key: String,
    pub key: String,
    pub title: String,

    /// Album title.
    #[serde(default)]
    pub parent_title: Option<String>,

    /// Artist name.
    #[serde(default)]
    pub grandparent_title: Option<String>,

    /// Track artist, when it differs from the album artist.
    #[serde(default)]
    pub original_title: Option<String>,

    /// Track number.
    #[serde(default)]
    pub index: Option<u32>,

    /// Disc number.
    #[serde(default)]
    pub parent_index: Option<u32>,

    #[serde(default)]
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    pub duration: Option<Duration>,

    #[serde(default)]
    pub thumb: Option<String>,

    #[serde(default)]
    pub parent_thumb: Option<String>,

    #[serde(default, rename = "librarySectionID")]
    pub library_section_id: Option<u64>,

    #[serde(default, rename = "Media")]
    pub media: Vec<Media>,
}

impl Track {
    /// Key of the first media part, which is what gets streamed.
    #[must_use]
    pub fn part_key(&self) -> Option<&str> {
        self.media
            .first()
            .and_then(|media| media.parts.first())
            .map(|part| part.key.as_str())
    }

    /// Artist to display: the track artist if set, else the album artist.
    #[must_use]
    pub fn artist(&self) -> Option<&str> {
        self.original_title
            .as_deref()
            .or(self.grandparent_title.as_deref())
    }

    /// Artwork path: the track's own, else the album's.
    #[must_use]
    pub fn artwork(&self) -> Option<&str> {
        self.thumb.as_deref().or(self.parent_thumb.as_deref())
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.artist() {
            Some(artist) => write!(f, "{}: \"{artist} - {}\"", self.rating_key, self.title),
            None => write!(f, "{}: \"{}\"", self.rating_key, self.title),
        }
    }
}

#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Media {
    pub id: u64,

    #[serde(default)]
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    pub duration: Option<Duration>,

    /// In kbps.
    #[serde(default)]
    pub bitrate: Option<u32>,

    #[serde(default)]
    pub audio_codec: Option<String>,

    #[serde(default)]
    pub container: Option<String>,

    #[serde(default, rename = "Part")]
    pub parts: Vec<Part>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    pub id: u64,

    /// Path of the file on the server, relative to its base address.
    pub key: String,

    #[serde(default)]
    pub size: Option<u64>,

    #[serde(default)]
    pub container: Option<String>,
}

/// A search result or any other metadata item of mixed type.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Item {
    Artist(Artist),
    Album(Album),
    Track(Track),

    /// Anything that is not music, such as movies in a mixed search.
    #[serde(other)]
    Other,
}

impl Item {
    #[must_use]
    pub fn title(&self) -> Option<&str> {
        match self {
            Self::Artist(artist) => Some(&artist.title),
            Self::Album(album) => Some(&album.title),
            Self::Track(track) => Some(&track.title),
            Self::Other => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Response;

    const TRACKS: &str = r#"{"MediaContainer":{"size":1,"Metadata":[{
        "ratingKey": "1234",
        "key": "/library/metadata/1234",
        "type": "track",
        "title": "Song",
        "parentTitle": "Album",
        "grandparentTitle": "Artist",
        "index": 3,
        "duration": 215000,
        "librarySectionID": 5,
        "Media": [{"id": 99, "duration": 215000, "audioCodec": "flac",
                   "Part": [{"id": 100, "key": "/library/parts/100/file.flac"}]}]
    }]}}"#;

    #[test]
    fn parses_track_with_media() {
        let response: Response<Track> = serde_json::from_str(TRACKS).unwrap();
        let track = &response.container.metadata[0];

        assert_eq!(track.duration, Some(Duration::from_millis(215_000)));
        assert_eq!(track.part_key(), Some("/library/parts/100/file.flac"));
        assert_eq!(track.artist(), Some("Artist"));
        assert_eq!(track.library_section_id, Some(5));
        assert_eq!(track.to_string(), "1234: \"Artist - Song\"");
    }

    #[test]
    fn track_without_media_has_no_part() {
        let track: Track =
            serde_json::from_str(r#"{"ratingKey":"1","key":"/k","title":"Bare"}"#).unwrap();
        assert_eq!(track.part_key(), None);
        assert_eq!(track.duration, None);
    }

    #[test]
    fn mixed_items_keep_their_type() {
        let items: Vec<Item> = serde_json::from_str(
            r#"[
                {"type":"artist","ratingKey":"1","key":"/a","title":"Band"},
                {"type":"album","ratingKey":"2","key":"/b","title":"Record","year":1999},
                {"type":"movie","ratingKey":"3","key":"/c","title":"Film"}
            ]"#,
        )
        .unwrap();

        assert!(matches!(&items[0], Item::Artist(artist) if artist.title == "Band"));
        assert!(matches!(&items[1], Item::Album(album) if album.year == Some(1999)));
        assert_eq!(items[2], Item::Other);
    }
}
