//! The play queue.
//!
//! A [`Queue`] is an ordered list of [`QueueItem`]s, a cursor pointing at the
//! item that is playing (or would be), and the intent to play. It is the one
//! place that decides what plays; the [`Session`](crate::session::Session)
//! follows it, and smart shuffle only ever appends to it.
//!
//! Every mutation keeps the cursor on the same logical item where that item
//! still exists:
//!
//! ```text
//! [A, B, C, D]  cursor 2 (C)
//! reorder(0, 3)
//! [B, C, D, A]  cursor 1 (C)
//! ```
//!
//! An empty queue never has a cursor. A non-empty queue may lack one when
//! items were appended while it was empty: nothing plays until the user
//! picks an item.

use std::fmt;

use thiserror::Error;
use url::Url;

use crate::{
    error::{self, Result},
    protocol::library::Track,
    resolver::Connection,
    server::MediaServer,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("index {index} is out of range for queue of {len}")]
    IndexOutOfRange { index: usize, len: usize },
}

impl From<QueueError> for error::Error {
    fn from(e: QueueError) -> Self {
        Self::out_of_range(e)
    }
}

/// Identifies one entry in the queue. The same track queued twice gets two
/// different ids.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ItemId(uuid::Uuid);

impl ItemId {
    /// Generates a random version 4 id from a fast, non-cryptographic
    /// generator. Ids only need to be unique within this process.
    #[must_use]
    pub fn random() -> Self {
        let random_bytes = fastrand::u128(..).to_ne_bytes();
        Self(uuid::Builder::from_random_bytes(random_bytes).into_uuid())
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A track in the queue, together with the server to stream it from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueueItem {
    pub id: ItemId,
    pub track: Track,
    pub connection: Connection,
}

impl QueueItem {
    #[must_use]
    pub fn new(track: Track, connection: Connection) -> Self {
        Self {
            id: ItemId::random(),
            track,
            connection,
        }
    }

    /// Wraps each of `tracks` for queueing, all from the same server.
    #[must_use]
    pub fn from_tracks<I>(tracks: I, connection: &Connection) -> Vec<Self>
    where
        I: IntoIterator<Item = Track>,
    {
        tracks
            .into_iter()
            .map(|track| Self::new(track, connection.clone()))
            .collect()
    }

    /// The URL to stream this item from.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the track has no media part, or an error if the
    /// part does not make a valid URL.
    pub fn stream_url(&self) -> Result<Url> {
        let part_key = self.track.part_key().ok_or_else(|| {
            error::Error::not_found(format!("track {} has no playable media", self.track))
        })?;
        MediaServer::stream_url(&self.connection, part_key)
    }
}

impl fmt::Display for QueueItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.track.fmt(f)
    }
}

#[derive(Clone, Debug, Default)]
pub struct Queue {
    items: Vec<QueueItem>,
    cursor: Option<usize>,
    playing: bool,
}

impl Queue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn items(&self) -> &[QueueItem] {
        &self.items
    }

    #[must_use]
    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    /// The item under the cursor.
    #[must_use]
    pub fn current(&self) -> Option<&QueueItem> {
        self.cursor.and_then(|cursor| self.items.get(cursor))
    }

    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Sets the intent to play. A queue without a current item, empty or
    /// not, can never be playing.
    pub fn set_playing(&mut self, playing: bool) {
        self.playing = playing && self.current().is_some();
    }

    fn check(&self, index: usize) -> std::result::Result<(), QueueError> {
        if index < self.items.len() {
            Ok(())
        } else {
            Err(QueueError::IndexOutOfRange {
                index,
                len: self.items.len(),
            })
        }
    }

    /// Replaces all items. The cursor moves to the first item, if any.
    pub fn set_all(&mut self, items: Vec<QueueItem>) {
        self.items = items;
        if self.items.is_empty() {
            self.cursor = None;
            self.playing = false;
        } else {
            self.cursor = Some(0);
        }
    }

    /// Adds items at the end, leaving the cursor alone.
    pub fn append(&mut self, items: Vec<QueueItem>) {
        self.items.extend(items);
    }

    /// Adds items right after the current one, so that they play next.
    ///
    /// On an empty queue this starts playing the new items from the first.
    pub fn insert_after_current(&mut self, items: Vec<QueueItem>) {
        if items.is_empty() {
            return;
        }

        if self.items.is_empty() {
            self.set_all(items);
            self.playing = true;
            return;
        }

        let at = self.cursor.map_or(0, |cursor| cursor + 1);
        self.items.splice(at..at, items);
    }

    /// Removes the item at `index`.
    ///
    /// Removing the current item moves playback on to the item that took its
    /// place, or to the new last item if it was last. Removing the only item
    /// stops playback.
    ///
    /// # Errors
    ///
    /// Returns `IndexOutOfRange` if `index` is not in the queue.
    pub fn remove(&mut self, index: usize) -> std::result::Result<QueueItem, QueueError> {
        self.check(index)?;
        let removed = self.items.remove(index);

        if let Some(cursor) = self.cursor {
            if index < cursor {
                self.cursor = Some(cursor - 1);
            } else if index == cursor {
                if self.items.is_empty() {
                    self.cursor = None;
                    self.playing = false;
                } else if index == self.items.len() {
                    self.cursor = Some(cursor - 1);
                }
            }
        } else if self.items.is_empty() {
            self.playing = false;
        }

        Ok(removed)
    }

    /// Moves the item at `from` to `to`.
    ///
    /// # Errors
    ///
    /// Returns `IndexOutOfRange` if either index is not in the queue.
    pub fn reorder(&mut self, from: usize, to: usize) -> std::result::Result<(), QueueError> {
        self.check(from)?;
        self.check(to)?;

        let item = self.items.remove(from);
        self.items.insert(to, item);

        if let Some(cursor) = self.cursor {
            self.cursor = Some(if cursor == from {
                to
            } else if from < cursor && cursor <= to {
                cursor - 1
            } else if to <= cursor && cursor < from {
                cursor + 1
            } else {
                cursor
            });
        }

        Ok(())
    }

    /// Empties the queue and stops playback.
    pub fn clear(&mut self) {
        self.items.clear();
        self.cursor = None;
        self.playing = false;
    }

    /// Makes the item at `index` current and plays it.
    ///
    /// # Errors
    ///
    /// Returns `IndexOutOfRange` if `index` is not in the queue.
    pub fn jump_to(&mut self, index: usize) -> std::result::Result<(), QueueError> {
        self.check(index)?;
        self.cursor = Some(index);
        self.playing = true;
        Ok(())
    }

    /// Moves to the next item. At the last item playback stops instead and
    /// the cursor stays put.
    ///
    /// Returns whether the cursor moved.
    pub fn advance(&mut self) -> bool {
        match self.cursor {
            Some(cursor) if cursor + 1 < self.items.len() => {
                self.cursor = Some(cursor + 1);
                true
            }
            _ => {
                self.playing = false;
                false
            }
        }
    }

    /// Moves to the previous item.
    ///
    /// Returns whether the cursor moved. When it did not, the caller should
    /// restart the current item from the beginning.
    pub fn retreat(&mut self) -> bool {
        match self.cursor {
            Some(cursor) if cursor > 0 => {
                self.cursor = Some(cursor - 1);
                true
            }
            _ => false,
        }
    }
}
