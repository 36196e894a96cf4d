//! The player.
//!
//! [`Player`] owns all playback state: the [`Queue`], the [`Session`] that
//! follows it, [`SmartShuffle`] and the library section it shuffles from.
//! Front ends drive it by sending [`Command`]s and learn about changes from
//! [`Event`]s.
//!
//! Everything happens in [`Player::run`], one command at a time. After each
//! change to the queue the session and smart shuffle re-evaluate it, in that
//! order. A ticker samples playback progress and advances the queue when an
//! item has played to its end.
//!
//! # Example
//!
//! ```rust
//! let (command_tx, command_rx) = tokio::sync::mpsc::unbounded_channel();
//! let mut player = Player::new(output, library);
//! player.connect(source);
//!
//! command_tx.send(Command::ShuffleAll)?;
//! player.run(command_rx).await;
//! ```

use std::{sync::Arc, time::Duration};

use tokio::{
    sync::{mpsc, oneshot},
    time::MissedTickBehavior,
};

use crate::{
    error::{Error, Result},
    events::Event,
    output::Output,
    protocol::library::Track,
    queue::{Queue, QueueError, QueueItem},
    server::Library,
    session::{Session, State},
    shuffle::{Batch, SmartShuffle, Source},
};

/// Requests to the player.
#[derive(Debug)]
pub enum Command {
    /// Replaces the queue with `tracks` and plays from `start`. Turns smart
    /// shuffle off.
    PlayTracks { tracks: Vec<Track>, start: usize },

    /// Adds tracks at the end of the queue, or right after the current item
    /// if `next`. On an empty queue they start playing.
    Enqueue { tracks: Vec<Track>, next: bool },

    /// Replaces the queue with random tracks of the source section and keeps
    /// adding more.
    ShuffleAll,

    /// Stops topping up the queue with random tracks. Only
    /// [`ShuffleAll`](Self::ShuffleAll) turns smart shuffle on.
    DisableShuffle,

    TogglePlay,
    Play,
    Pause,
    Next,
    Previous,
    JumpTo(usize),
    Remove(usize),
    Reorder { from: usize, to: usize },
    Clear,
    Seek(Duration),

    /// Makes `Source` the section to play from.
    Connect(Source),

    /// Lets go of the source and stops playback. Queued items are kept if
    /// `retain_queue`.
    Disconnect { retain_queue: bool },

    /// Replies with a snapshot of the player state.
    Status(oneshot::Sender<Status>),
}

/// Snapshot of the player state.
#[derive(Clone, Debug)]
pub struct Status {
    pub queue: Queue,
    pub state: State,
    pub playing: bool,
    pub elapsed: Duration,
    pub duration: Option<Duration>,
    pub shuffle: bool,
    pub source: Option<Source>,
}

pub struct Player<O, L> {
    queue: Queue,
    session: Session<O>,
    shuffle: SmartShuffle<L>,
    source: Option<Source>,

    /// Bumped whenever the queue is replaced or cleared, so that a "shuffle
    /// all" that completes late does not overwrite what came after it.
    generation: u64,

    event_tx: Option<mpsc::UnboundedSender<Event>>,
}

impl<O: Output, L: Library> Player<O, L> {
    /// Interval at which playback progress is sampled.
    pub const PROGRESS_INTERVAL: Duration = Duration::from_millis(250);

    #[must_use]
    pub fn new(output: O, library: Arc<L>) -> Self {
        Self {
            queue: Queue::new(),
            session: Session::new(output),
            shuffle: SmartShuffle::new(library),
            source: None,
            generation: 0,
            event_tx: None,
        }
    }

    /// Sends player events to `event_tx`.
    pub fn register(&mut self, event_tx: mpsc::UnboundedSender<Event>) {
        self.session.register(event_tx.clone());
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
    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    #[must_use]
    pub fn session(&self) -> &Session<O> {
        &self.session
    }

    #[must_use]
    pub fn status(&self) -> Status {
        Status {
            queue: self.queue.clone(),
            state: self.session.state(),
            playing: self.session.is_playing(),
            elapsed: self.session.elapsed(),
            duration: self.session.duration(),
            shuffle: self.shuffle.is_enabled(),
            source: self.source.clone(),
        }
    }

    /// Makes `source` the section to play from.
    pub fn connect(&mut self, source: Source) {
        info!(
            "playing from section {} of {}",
            source.section, source.connection
        );
        self.source = Some(source);
        self.notify(Event::Connected);
    }

    /// Lets go of the source and stops audio. Queued items stay if
    /// `retain_queue`, but do not play.
    pub async fn disconnect(&mut self, retain_queue: bool) {
        self.source = None;
        self.shuffle.set_enabled(false);
        if retain_queue {
            self.queue.set_playing(false);
        } else {
            self.replace_queue(Vec::new());
        }
        self.sync().await;
        self.notify(Event::Disconnected);
    }

    fn require_source(&self) -> Result<&Source> {
        self.source
            .as_ref()
            .ok_or_else(|| Error::failed_precondition("not connected to a server"))
    }

    fn replace_queue(&mut self, items: Vec<QueueItem>) {
        self.generation += 1;
        self.queue.set_all(items);
    }

    /// Lets the session and smart shuffle catch up with the queue.
    async fn sync(&mut self) {
        self.session.sync(&self.queue).await;
        self.shuffle
            .on_queue_changed(&self.queue, self.source.as_ref());
    }

    /// Applies one command.
    ///
    /// # Errors
    ///
    /// Returns error if the command refers to an index that is not in the
    /// queue, or needs a source while there is none.
    pub async fn handle(&mut self, command: Command) -> Result<()> {
        trace!("{command:?}");

        match command {
            Command::PlayTracks { tracks, start } => {
                let source = self.require_source()?;
                let items = QueueItem::from_tracks(tracks, &source.connection);
                if start >= items.len() {
                    return Err(QueueError::IndexOutOfRange {
                        index: start,
                        len: items.len(),
                    }
                    .into());
                }

                self.shuffle.set_enabled(false);
                self.replace_queue(items);
                self.queue.jump_to(start)?;
                self.notify(Event::QueueChanged);
            }

            Command::Enqueue { tracks, next } => {
                let source = self.require_source()?;
                let items = QueueItem::from_tracks(tracks, &source.connection);
                if items.is_empty() {
                    return Ok(());
                }

                if self.queue.is_empty() {
                    self.generation += 1;
                    self.queue.insert_after_current(items);
                } else if next {
                    self.queue.insert_after_current(items);
                } else {
                    self.queue.append(items);
                }
                self.notify(Event::QueueChanged);
            }

            Command::ShuffleAll => {
                let source = self.require_source()?.clone();
                self.shuffle.start(&source, self.generation);
            }

            Command::DisableShuffle => self.shuffle.set_enabled(false),

            Command::TogglePlay => {
                let playing = !self.queue.is_playing();
                self.set_playing(playing);
            }
            Command::Play => self.set_playing(true),
            Command::Pause => self.set_playing(false),

            Command::Next => {
                self.queue.advance();
            }

            Command::Previous => {
                if !self.queue.retreat() {
                    self.session.restart(&self.queue).await;
                }
            }

            Command::JumpTo(index) => self.queue.jump_to(index)?,

            Command::Remove(index) => {
                let removed = self.queue.remove(index)?;
                debug!("removed {removed}");
                self.notify(Event::QueueChanged);
            }

            Command::Reorder { from, to } => {
                self.queue.reorder(from, to)?;
                self.notify(Event::QueueChanged);
            }

            Command::Clear => {
                self.replace_queue(Vec::new());
                self.notify(Event::QueueChanged);
            }

            Command::Seek(position) => self.session.seek(position),

            Command::Connect(source) => self.connect(source),

            Command::Disconnect { retain_queue } => {
                self.disconnect(retain_queue).await;
                return Ok(());
            }

            Command::Status(reply_tx) => {
                if reply_tx.send(self.status()).is_err() {
                    trace!("status requested but not awaited");
                }
                return Ok(());
            }
        }

        self.sync().await;
        Ok(())
    }

    fn set_playing(&mut self, playing: bool) {
        // Asking to play what failed to play is asking to try again.
        if playing && self.session.is_failed() && self.queue.is_playing() {
            self.session.invalidate();
        }
        self.queue.set_playing(playing);
    }

    /// Applies fetched random tracks.
    async fn apply(&mut self, batch: Batch) {
        let items = QueueItem::from_tracks(batch.tracks, &batch.connection);

        match batch.start {
            Some(generation) if generation != self.generation => {
                debug!("discarding shuffle for a queue that was replaced since");
                return;
            }
            Some(_) => {
                if items.is_empty() {
                    warn!("library returned no tracks to shuffle");
                    return;
                }
                self.replace_queue(items);
                self.queue.set_playing(true);
                self.shuffle.set_enabled(true);
            }
            None => self.queue.append(items),
        }

        self.notify(Event::QueueChanged);
        self.sync().await;
    }

    /// Samples playback progress, moving on when the current item ended.
    async fn tick(&mut self) {
        if self.session.tick() {
            self.queue.advance();
            self.sync().await;
        }
    }

    /// Runs the player until `commands` closes, then stops playback.
    pub async fn run(&mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        let mut ticker = tokio::time::interval(Self::PROGRESS_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                command = commands.recv() => {
                    let Some(command) = command else {
                        break;
                    };
                    if let Err(e) = self.handle(command).await {
                        error!("{e}");
                    }
                }

                Some(batch) = self.shuffle.next_batch() => self.apply(batch).await,

                _ = ticker.tick() => self.tick().await,
            }
        }

        debug!("stopping player");
        self.session.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        shuffle::BATCH_SIZE,
        testing::{connection, track, FakeLibrary, FakeOutput},
    };

    fn source() -> Source {
        Source {
            connection: connection(),
            section: "5".to_owned(),
        }
    }

    fn player() -> (Player<FakeOutput, FakeLibrary>, Arc<FakeLibrary>) {
        let library = Arc::new(FakeLibrary::default());
        let mut player = Player::new(FakeOutput::default(), Arc::clone(&library));
        player.connect(source());
        (player, library)
    }

    fn tracks(titles: &[&str]) -> Vec<Track> {
        titles.iter().map(|title| track(title)).collect()
    }

    fn current(player: &Player<FakeOutput, FakeLibrary>) -> Option<&str> {
        player
            .queue()
            .current()
            .map(|item| item.track.title.as_str())
    }

    async fn shuffled(player: &mut Player<FakeOutput, FakeLibrary>) {
        player.handle(Command::ShuffleAll).await.unwrap();
        let batch = player.shuffle.next_batch().await.unwrap();
        player.apply(batch).await;
    }

    #[tokio::test]
    async fn play_tracks_starts_at_index() {
        let (mut player, _) = player();
        player
            .handle(Command::PlayTracks {
                tracks: tracks(&["A", "B", "C"]),
                start: 1,
            })
            .await
            .unwrap();

        assert_eq!(current(&player), Some("B"));
        assert!(player.session().is_playing());
        assert!(player
            .session()
            .output()
            .loaded()
            .unwrap()
            .path()
            .ends_with("/B.flac"));
    }

    #[tokio::test]
    async fn play_tracks_rejects_bad_start() {
        let (mut player, _) = player();
        let err = player
            .handle(Command::PlayTracks {
                tracks: tracks(&["A"]),
                start: 1,
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::OutOfRange);
        assert!(player.queue().is_empty());
    }

    #[tokio::test]
    async fn commands_need_a_source() {
        let library = Arc::new(FakeLibrary::default());
        let mut player = Player::new(FakeOutput::default(), library);
        let err = player
            .handle(Command::Enqueue {
                tracks: tracks(&["A"]),
                next: false,
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::FailedPrecondition);
    }

    #[tokio::test]
    async fn enqueue_on_empty_queue_plays() {
        let (mut player, _) = player();
        player
            .handle(Command::Enqueue {
                tracks: tracks(&["A", "B"]),
                next: false,
            })
            .await
            .unwrap();

        assert_eq!(current(&player), Some("A"));
        assert!(player.queue().is_playing());
        assert!(player.session().is_playing());
    }

    #[tokio::test]
    async fn enqueue_next_plays_after_current() {
        let (mut player, _) = player();
        player
            .handle(Command::PlayTracks {
                tracks: tracks(&["A", "B"]),
                start: 0,
            })
            .await
            .unwrap();
        player
            .handle(Command::Enqueue {
                tracks: tracks(&["X"]),
                next: true,
            })
            .await
            .unwrap();

        let titles: Vec<_> = player
            .queue()
            .items()
            .iter()
            .map(|item| item.track.title.as_str())
            .collect();
        assert_eq!(titles, ["A", "X", "B"]);
        assert_eq!(player.session().output().loads(), 1);
    }

    #[tokio::test]
    async fn natural_end_advances() {
        let (mut player, _) = player();
        player
            .handle(Command::PlayTracks {
                tracks: tracks(&["A", "B"]),
                start: 0,
            })
            .await
            .unwrap();

        player.session().output().finish();
        player.tick().await;
        assert_eq!(current(&player), Some("B"));
        assert!(player.session().is_playing());

        player.session().output().finish();
        player.tick().await;
        assert_eq!(current(&player), Some("B"));
        assert!(!player.queue().is_playing());
        assert!(!player.session().is_playing());
    }

    #[tokio::test]
    async fn previous_at_start_restarts() {
        let (mut player, _) = player();
        player
            .handle(Command::PlayTracks {
                tracks: tracks(&["A", "B"]),
                start: 0,
            })
            .await
            .unwrap();
        player
            .handle(Command::Seek(Duration::from_secs(60)))
            .await
            .unwrap();
        assert_eq!(player.session().elapsed(), Duration::from_secs(60));

        player.handle(Command::Previous).await.unwrap();
        assert_eq!(current(&player), Some("A"));
        assert_eq!(player.session().elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn removing_current_plays_successor() {
        let (mut player, _) = player();
        player
            .handle(Command::PlayTracks {
                tracks: tracks(&["A", "B", "C"]),
                start: 1,
            })
            .await
            .unwrap();
        player.handle(Command::Remove(1)).await.unwrap();

        assert_eq!(current(&player), Some("C"));
        assert!(player
            .session()
            .output()
            .loaded()
            .unwrap()
            .path()
            .ends_with("/C.flac"));
    }

    #[tokio::test]
    async fn removing_sole_item_stops() {
        let (mut player, _) = player();
        player
            .handle(Command::PlayTracks {
                tracks: tracks(&["A"]),
                start: 0,
            })
            .await
            .unwrap();
        player.handle(Command::Remove(0)).await.unwrap();

        assert_eq!(player.queue().cursor(), None);
        assert!(!player.queue().is_playing());
        assert_eq!(player.session().state(), State::Idle);
    }

    #[tokio::test]
    async fn shuffle_all_fills_queue_and_plays() {
        let (mut player, library) = player();
        shuffled(&mut player).await;

        assert_eq!(player.queue().len(), BATCH_SIZE);
        assert_eq!(player.queue().cursor(), Some(0));
        assert!(player.queue().is_playing());
        assert!(player.status().shuffle);
        assert_eq!(library.random_calls(), 1);
    }

    #[tokio::test]
    async fn shuffle_continues_near_end() {
        let (mut player, library) = player();
        shuffled(&mut player).await;

        player.handle(Command::JumpTo(6)).await.unwrap();
        tokio::task::yield_now().await;
        assert_eq!(library.random_calls(), 1);

        player.handle(Command::JumpTo(7)).await.unwrap();
        let batch = player.shuffle.next_batch().await.unwrap();
        player.apply(batch).await;

        assert_eq!(library.random_calls(), 2);
        assert_eq!(player.queue().len(), 2 * BATCH_SIZE);
        assert_eq!(player.queue().cursor(), Some(7));
    }

    #[tokio::test]
    async fn shuffle_continues_when_playback_advances() {
        let (mut player, library) = player();
        shuffled(&mut player).await;
        player.handle(Command::JumpTo(6)).await.unwrap();
        tokio::task::yield_now().await;
        assert_eq!(library.random_calls(), 1);

        player.session().output().finish();
        player.tick().await;
        assert_eq!(player.queue().cursor(), Some(7));

        let batch = player.shuffle.next_batch().await.unwrap();
        player.apply(batch).await;
        tokio::task::yield_now().await;
        assert_eq!(library.random_calls(), 2);
        assert_eq!(player.queue().len(), 2 * BATCH_SIZE);
    }

    #[tokio::test]
    async fn played_tracks_never_get_random_tracks() {
        let (mut player, library) = player();
        player
            .handle(Command::PlayTracks {
                tracks: tracks(&["A", "B", "C"]),
                start: 0,
            })
            .await
            .unwrap();
        player.handle(Command::Next).await.unwrap();
        player.handle(Command::Next).await.unwrap();
        player.handle(Command::DisableShuffle).await.unwrap();
        tokio::task::yield_now().await;

        assert!(!player.status().shuffle);
        assert_eq!(library.random_calls(), 0);
        assert_eq!(player.queue().len(), 3);
    }

    #[tokio::test]
    async fn disabling_shuffle_stops_continuation() {
        let (mut player, library) = player();
        shuffled(&mut player).await;
        player.handle(Command::DisableShuffle).await.unwrap();
        player.handle(Command::JumpTo(9)).await.unwrap();
        tokio::task::yield_now().await;

        assert!(!player.status().shuffle);
        assert_eq!(library.random_calls(), 1);
    }

    #[tokio::test]
    async fn play_after_late_batch_on_cleared_queue_stays_stopped() {
        let (mut player, _) = player();
        shuffled(&mut player).await;
        player.handle(Command::JumpTo(9)).await.unwrap();
        player.handle(Command::Clear).await.unwrap();
        let batch = player.shuffle.next_batch().await.unwrap();
        player.apply(batch).await;

        player.handle(Command::Play).await.unwrap();
        assert!(!player.queue().is_playing());
        assert_eq!(player.queue().cursor(), None);
        assert_eq!(player.session().state(), State::Idle);
    }

    #[tokio::test]
    async fn playing_tracks_turns_shuffle_off() {
        let (mut player, _) = player();
        shuffled(&mut player).await;

        player
            .handle(Command::PlayTracks {
                tracks: tracks(&["A"]),
                start: 0,
            })
            .await
            .unwrap();
        assert!(!player.status().shuffle);
    }

    #[tokio::test]
    async fn late_shuffle_start_does_not_replace_newer_queue() {
        let (mut player, _) = player();
        player.handle(Command::ShuffleAll).await.unwrap();
        player
            .handle(Command::PlayTracks {
                tracks: tracks(&["A"]),
                start: 0,
            })
            .await
            .unwrap();

        let batch = player.shuffle.next_batch().await.unwrap();
        player.apply(batch).await;
        assert_eq!(player.queue().len(), 1);
        assert_eq!(current(&player), Some("A"));
    }

    #[tokio::test]
    async fn continuation_after_clear_still_appends() {
        let (mut player, _) = player();
        shuffled(&mut player).await;
        player.handle(Command::JumpTo(9)).await.unwrap();
        player.handle(Command::Clear).await.unwrap();

        let batch = player.shuffle.next_batch().await.unwrap();
        player.apply(batch).await;
        assert_eq!(player.queue().len(), BATCH_SIZE);
        assert_eq!(player.queue().cursor(), None);
    }

    #[tokio::test]
    async fn failed_load_is_retried_on_play() {
        let (mut player, _) = player();
        player.session().output().fail_loads(true);
        player
            .handle(Command::PlayTracks {
                tracks: tracks(&["A"]),
                start: 0,
            })
            .await
            .unwrap();
        assert!(player.session().is_failed());
        assert_eq!(player.queue().cursor(), Some(0));

        player.session().output().fail_loads(false);
        player.handle(Command::Play).await.unwrap();
        assert!(player.session().is_playing());
        assert_eq!(player.session().output().loads(), 2);
    }

    #[tokio::test]
    async fn disconnect_keeps_queue_on_request() {
        let (mut player, _) = player();
        player
            .handle(Command::PlayTracks {
                tracks: tracks(&["A", "B"]),
                start: 0,
            })
            .await
            .unwrap();

        player
            .handle(Command::Disconnect { retain_queue: true })
            .await
            .unwrap();
        assert_eq!(player.queue().len(), 2);
        assert!(!player.session().is_playing());
        assert!(player.status().source.is_none());

        player
            .handle(Command::Disconnect {
                retain_queue: false,
            })
            .await
            .unwrap();
        assert!(player.queue().is_empty());
        assert_eq!(player.session().state(), State::Idle);
    }

    #[tokio::test]
    async fn status_is_sent_on_request() {
        let (mut player, _) = player();
        let (reply_tx, reply_rx) = oneshot::channel();
        player.handle(Command::Status(reply_tx)).await.unwrap();
        let status = reply_rx.await.unwrap();
        assert!(status.queue.is_empty());
        assert_eq!(status.source, Some(source()));
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_when_commands_close() {
        let (mut player, _) = player();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        command_tx
            .send(Command::PlayTracks {
                tracks: tracks(&["A"]),
                start: 0,
            })
            .unwrap();
        drop(command_tx);

        player.run(command_rx).await;
        assert_eq!(player.queue().len(), 1);
        assert_eq!(player.session().state(), State::Idle);
    }
}
