//! Events emitted by the player.
//!
//! A front end subscribes to these to redraw what it shows, instead of
//! polling the player. Events carry no data: on receipt, read the state
//! of interest from the [`Player`](crate::player::Player) or its
//! [`Status`](crate::player::Status).
//!
//! ```rust
//! let (event_tx, mut event_rx) = tokio::sync::mpsc::unbounded_channel();
//! player.register(event_tx);
//!
//! while let Some(event) = event_rx.recv().await {
//!     if event == Event::PlaybackFailed {
//!         eprintln!("could not play this one");
//!     }
//! }
//! ```

/// Significant state changes of the player.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Event {
    /// Playback has started or resumed.
    Play,

    /// Playback has paused, or stopped at the end of the queue.
    Pause,

    /// A different queue item became current, or none is current any more.
    TrackChanged,

    /// Items were added, removed or moved.
    QueueChanged,

    /// The current item could not be loaded or started. Toggling play
    /// retries it.
    PlaybackFailed,

    /// A server connection became the source for browsing and shuffling.
    Connected,

    /// The player let go of its server connection.
    Disconnected,
}
