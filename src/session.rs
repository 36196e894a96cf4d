//! Playback session.
//!
//! A [`Session`] keeps one [`Output`] in step with a [`Queue`]: whenever the
//! queue changes, [`Session::sync`] loads, starts, pauses or unloads so that
//! the output plays what the queue says should play. The session never
//! changes the queue; it reports the natural end of an item from
//! [`Session::tick`] and leaves it to the caller to advance.
//!
//! ```text
//!          current item changed            loaded
//!  Idle ─────────────────────────> Loading ──────> Active
//!   ^                                 │              │
//!   │         load failed             │              │
//!   ├─────────────────────────────────┘              │
//!   │         no current item                        │
//!   └────────────────────────────────────────────────┘
//! ```

use std::time::Duration;

use tokio::sync::mpsc;

use crate::{
    events::Event,
    output::Output,
    queue::{ItemId, Queue, QueueItem},
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum State {
    /// Nothing is loaded.
    #[default]
    Idle,
    /// A source is being opened.
    Loading,
    /// A source is loaded, playing or paused.
    Active,
}

pub struct Session<O> {
    output: O,
    state: State,

    /// Queue item the output was last asked to load, whether or not that
    /// worked.
    item: Option<ItemId>,

    /// Last play intent seen on the queue.
    intent: bool,

    playing: bool,
    ended: bool,
    failed: bool,

    elapsed: Duration,
    duration: Option<Duration>,

    event_tx: Option<mpsc::UnboundedSender<Event>>,
}

impl<O: Output> Session<O> {
    #[must_use]
    pub fn new(output: O) -> Self {
        Self {
            output,
            state: State::Idle,
            item: None,
            intent: false,
            playing: false,
            ended: false,
            failed: false,
            elapsed: Duration::ZERO,
            duration: None,
            event_tx: None,
        }
    }

    /// Sends events of this session to `event_tx`.
    pub fn register(&mut self, event_tx: mpsc::UnboundedSender<Event>) {
        self.event_tx = Some(event_tx);
    }

    fn notify(&self, event: Event) {
        if let Some(event_tx) = &self.event_tx {
            if let Err(e) = event_tx.send(event) {
                error!("failed to send event: {e}");
            }
        }
    }

    #[must_use]
    pub fn state(&self) -> State {
        self.state
    }

    /// Whether audio is coming out.
    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Whether the current item could not be loaded or started.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.failed
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Total duration of the loaded item. Comes from the media if it tells,
    /// else from the track metadata.
    #[must_use]
    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    #[must_use]
    pub fn output(&self) -> &O {
        &self.output
    }

    /// Brings the output in line with `queue`.
    ///
    /// * A different current item is loaded from the start, and started if
    ///   the queue is playing. Items are told apart by their queue id, not by
    ///   their stream URL, so moving between two copies of the same track
    ///   reloads it from the start.
    /// * No current item unloads the output.
    /// * A change of play intent starts or pauses the loaded item. Starting an
    ///   item that had ended or failed loads it again.
    pub async fn sync(&mut self, queue: &Queue) {
        let intent = queue.is_playing();

        let Some(item) = queue.current() else {
            self.intent = intent;
            if self.item.is_some() {
                self.unload();
                self.notify(Event::TrackChanged);
            }
            return;
        };

        if self.item != Some(item.id) {
            self.intent = intent;
            self.notify(Event::TrackChanged);
            self.load(item).await;
            return;
        }

        if intent != self.intent {
            self.intent = intent;
            if !intent {
                self.pause();
            } else if self.ended || self.failed || self.state == State::Idle {
                self.load(item).await;
            } else {
                self.start();
            }
        }
    }

    /// Forgets the loaded item so that the next [`sync`](Self::sync) loads it
    /// afresh.
    pub fn invalidate(&mut self) {
        self.item = None;
    }

    /// Plays the current item of `queue` from the start.
    pub async fn restart(&mut self, queue: &Queue) {
        let Some(item) = queue.current() else {
            return;
        };

        if self.item != Some(item.id) || self.ended || self.failed || self.state != State::Active
        {
            self.intent = queue.is_playing();
            self.load(item).await;
        } else {
            self.seek(Duration::ZERO);
        }
    }

    async fn load(&mut self, item: &QueueItem) {
        self.state = State::Loading;
        self.item = Some(item.id);
        self.elapsed = Duration::ZERO;
        self.duration = item.track.duration;
        self.ended = false;
        self.failed = false;
        if self.playing {
            self.playing = false;
            self.output.pause();
        }

        debug!("loading {item}");
        let result = match item.stream_url() {
            Ok(url) => self.output.load(url).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(duration) => {
                if duration.is_some() {
                    self.duration = duration;
                }
                self.state = State::Active;
                if self.intent {
                    info!("playing {item}");
                    self.start();
                }
            }
            Err(e) => {
                error!("failed to load {item}: {e}");
                self.state = State::Idle;
                self.fail();
            }
        }
    }

    fn start(&mut self) {
        match self.output.play() {
            Ok(()) => {
                if !self.playing {
                    self.playing = true;
                    self.notify(Event::Play);
                }
            }
            Err(e) => {
                error!("failed to start playback: {e}");
                self.fail();
            }
        }
    }

    fn pause(&mut self) {
        self.output.pause();
        if self.playing {
            self.playing = false;
            self.notify(Event::Pause);
        }
    }

    fn fail(&mut self) {
        self.failed = true;
        self.playing = false;
        self.notify(Event::PlaybackFailed);
    }

    fn unload(&mut self) {
        debug!("unloading");
        self.output.stop();
        if self.playing {
            self.playing = false;
            self.notify(Event::Pause);
        }

        self.state = State::Idle;
        self.item = None;
        self.elapsed = Duration::ZERO;
        self.duration = None;
        self.ended = false;
        self.failed = false;
    }

    /// Stops and drops whatever is loaded.
    pub fn stop(&mut self) {
        self.unload();
        self.intent = false;
    }

    /// Moves the playback position. Ignored when nothing is loaded.
    pub fn seek(&mut self, position: Duration) {
        if self.state != State::Active {
            trace!("ignoring seek without a loaded source");
            return;
        }

        let position = self
            .duration
            .map_or(position, |duration| position.min(duration));
        match self.output.seek(position) {
            Ok(()) => self.elapsed = position,
            Err(e) => warn!("failed to seek to {position:?}: {e}"),
        }
    }

    /// Samples progress of the loaded item.
    ///
    /// Returns `true` exactly once per load, when the item has played to its
    /// natural end.
    pub fn tick(&mut self) -> bool {
        if self.state != State::Active {
            return false;
        }

        self.elapsed = self.output.position();
        if self.playing && !self.ended && self.output.is_drained() {
            debug!("reached end of item");
            self.ended = true;
            if let Some(duration) = self.duration {
                self.elapsed = duration;
            }
            return true;
        }

        false
    }
}
