//! Smart shuffle.
//!
//! "Shuffle all" fills the queue with random tracks from a library section
//! and keeps it filled: whenever the cursor comes within [`LOOKAHEAD`] items
//! of the end, another [`BATCH_SIZE`] random tracks are fetched and appended.
//! The queue never runs dry while shuffle is on.
//!
//! Fetches run as background tasks and deliver their tracks as [`Batch`]es on
//! a channel, which the [`Player`](crate::player::Player) applies in its own
//! loop. Nothing stops two fetches from being in flight at once; each one
//! that completes is appended.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::{
    protocol::library::Track,
    queue::Queue,
    resolver::Connection,
    server::Library,
};

/// Number of tracks fetched at a time.
pub const BATCH_SIZE: usize = 10;

/// How close to the end of the queue the cursor may come before more tracks
/// are fetched.
pub const LOOKAHEAD: usize = 3;

/// The library section to shuffle from.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Source {
    pub connection: Connection,
    pub section: String,
}

/// Random tracks fetched in the background.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Batch {
    pub tracks: Vec<Track>,
    pub connection: Connection,

    /// `Some` for the first batch of a "shuffle all", which replaces the
    /// queue if nothing else replaced it since. `None` for batches to
    /// append.
    pub start: Option<u64>,
}

pub struct SmartShuffle<L> {
    library: Arc<L>,
    enabled: bool,

    /// Cursor, queue length and flag at the last evaluation.
    observed: Option<(Option<usize>, usize, bool)>,

    batch_tx: mpsc::UnboundedSender<Batch>,
    batch_rx: mpsc::UnboundedReceiver<Batch>,
}

impl<L: Library> SmartShuffle<L> {
    #[must_use]
    pub fn new(library: Arc<L>) -> Self {
        let (batch_tx, batch_rx) = mpsc::unbounded_channel();
        Self {
            library,
            enabled: false,
            observed: None,
            batch_tx,
            batch_rx,
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        if enabled != self.enabled {
            debug!("smart shuffle {}", if enabled { "on" } else { "off" });
            self.enabled = enabled;
        }
    }

    /// Whether a queue in this state needs more tracks.
    #[must_use]
    pub fn wants_more(&self, queue: &Queue) -> bool {
        self.enabled
            && queue
                .cursor()
                .is_some_and(|cursor| cursor + LOOKAHEAD >= queue.len())
    }

    /// Re-evaluates the queue after a change, fetching more tracks if it is
    /// running out.
    ///
    /// Nothing happens unless the cursor, the queue length or the flag
    /// changed since the last call. Returns whether a fetch was started.
    pub fn on_queue_changed(&mut self, queue: &Queue, source: Option<&Source>) -> bool {
        let observed = (queue.cursor(), queue.len(), self.enabled);
        if self.observed == Some(observed) {
            return false;
        }
        self.observed = Some(observed);

        if !self.wants_more(queue) {
            return false;
        }

        let Some(source) = source else {
            warn!("smart shuffle has no library to pick from");
            return false;
        };

        trace!(
            "cursor at {:?} of {}, fetching more tracks",
            queue.cursor(),
            queue.len()
        );
        self.fetch(source, None);
        true
    }

    /// Fetches the first batch of a new shuffle. `generation` identifies the
    /// queue contents the batch is meant to replace.
    pub fn start(&mut self, source: &Source, generation: u64) {
        self.fetch(source, Some(generation));
    }

    fn fetch(&self, source: &Source, start: Option<u64>) {
        let library = Arc::clone(&self.library);
        let batch_tx = self.batch_tx.clone();
        let source = source.clone();

        tokio::spawn(async move {
            match library
                .random_tracks(&source.connection, &source.section, BATCH_SIZE)
                .await
            {
                Ok(tracks) => {
                    debug!("fetched {} random tracks", tracks.len());
                    let batch = Batch {
                        tracks,
                        connection: source.connection,
                        start,
                    };
                    if batch_tx.send(batch).is_err() {
                        trace!("player went away before random tracks arrived");
                    }
                }
                Err(e) => warn!("failed to fetch random tracks: {e}"),
            }
        });
    }

    /// Waits for the next fetched batch.
    pub async fn next_batch(&mut self) -> Option<Batch> {
        self.batch_rx.recv().await
    }
}
