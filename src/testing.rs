//! Fakes for unit tests.

use std::{
    cell::RefCell,
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use url::Url;

use crate::{
    error::{Error, Result},
    output::Output,
    protocol::library::{Section, Track},
    queue::QueueItem,
    resolver::Connection,
    server::Library,
};

pub fn connection() -> Connection {
    Connection {
        base: Url::parse("https://10-0-0-2.abc123.plex.direct:32400").unwrap(),
        token: "server-token".parse().unwrap(),
        name: "Living Room".to_owned(),
    }
}

pub fn track(title: &str) -> Track {
    serde_json::from_value(serde_json::json!({
        "ratingKey": title,
        "key": format!("/library/metadata/{title}"),
        "title": title,
        "grandparentTitle": "Artist",
        "duration": 215_000,
        "Media": [{"id": 1, "Part": [{"id": 1, "key": format!("/library/parts/1/{title}.flac")}]}],
    }))
    .unwrap()
}

pub fn item(title: &str) -> QueueItem {
    QueueItem::new(track(title), connection())
}

/// How a fake server answers a library listing.
#[derive(Clone, Copy, Debug)]
pub enum Probe {
    Ok(Duration),
    Fail(Duration),
    Hang,
}

#[derive(Default)]
pub struct FakeLibrary {
    probes: HashMap<Url, Probe>,
    probed: Mutex<Vec<Url>>,
    random_calls: AtomicUsize,
    random_fails: AtomicBool,
    sections: Mutex<Vec<String>>,
}

impl FakeLibrary {
    #[must_use]
    pub fn with_probe(mut self, uri: &str, probe: Probe) -> Self {
        self.probes.insert(Url::parse(uri).unwrap(), probe);
        self
    }

    pub fn probed(&self) -> Vec<Url> {
        self.probed.lock().unwrap().clone()
    }

    pub fn random_calls(&self) -> usize {
        self.random_calls.load(Ordering::SeqCst)
    }

    /// Sections asked for random tracks, in order.
    pub fn random_sections(&self) -> Vec<String> {
        self.sections.lock().unwrap().clone()
    }

    pub fn fail_random(&self, fail: bool) {
        self.random_fails.store(fail, Ordering::SeqCst);
    }
}

impl Library for FakeLibrary {
    async fn libraries(&self, connection: &Connection) -> Result<Vec<Section>> {
        self.probed.lock().unwrap().push(connection.base.clone());

        let probe = self.probes.get(&connection.base).copied();
        match probe {
            Some(Probe::Ok(delay)) => {
                tokio::time::sleep(delay).await;
                Ok(vec![Section {
                    key: "1".to_owned(),
                    title: "Music".to_owned(),
                    typ: "artist".to_owned(),
                    thumb: None,
                    art: None,
                }])
            }
            Some(Probe::Fail(delay)) => {
                tokio::time::sleep(delay).await;
                Err(Error::unavailable("connection refused"))
            }
            Some(Probe::Hang) => std::future::pending().await,
            None => Err(Error::unavailable("unknown host")),
        }
    }

    async fn random_tracks(
        &self,
        _connection: &Connection,
        section: &str,
        limit: usize,
    ) -> Result<Vec<Track>> {
        let call = self.random_calls.fetch_add(1, Ordering::SeqCst);
        self.sections.lock().unwrap().push(section.to_owned());

        if self.random_fails.load(Ordering::SeqCst) {
            return Err(Error::unavailable("server went away"));
        }

        Ok((0..limit)
            .map(|n| track(&format!("random-{call}-{n}")))
            .collect())
    }
}

#[derive(Default)]
struct OutputState {
    loaded: Option<Url>,
    loads: usize,
    playing: bool,
    position: Duration,
    drained: bool,
    fail_loads: bool,
    duration: Option<Duration>,
}

/// Audio output that plays nothing. State is shared through `&self` so that
/// tests can poke at it while a session owns it.
#[derive(Default)]
pub struct FakeOutput {
    state: RefCell<OutputState>,
}

impl FakeOutput {
    pub fn loads(&self) -> usize {
        self.state.borrow().loads
    }

    pub fn loaded(&self) -> Option<Url> {
        self.state.borrow().loaded.clone()
    }

    pub fn is_playing(&self) -> bool {
        self.state.borrow().playing
    }

    /// Plays the loaded media to its end.
    pub fn finish(&self) {
        let mut state = self.state.borrow_mut();
        state.drained = true;
        state.playing = false;
    }

    pub fn fail_loads(&self, fail: bool) {
        self.state.borrow_mut().fail_loads = fail;
    }

    pub fn report_duration(&self, duration: Option<Duration>) {
        self.state.borrow_mut().duration = duration;
    }
}

impl Output for FakeOutput {
    async fn load(&mut self, url: Url) -> Result<Option<Duration>> {
        let mut state = self.state.borrow_mut();
        state.loads += 1;
        state.playing = false;
        state.position = Duration::ZERO;
        state.drained = false;

        if state.fail_loads {
            state.loaded = None;
            return Err(Error::unavailable("stream refused"));
        }

        state.loaded = Some(url);
        Ok(state.duration)
    }

    fn play(&mut self) -> Result<()> {
        self.state.borrow_mut().playing = true;
        Ok(())
    }

    fn pause(&mut self) {
        self.state.borrow_mut().playing = false;
    }

    fn stop(&mut self) {
        let mut state = self.state.borrow_mut();
        state.loaded = None;
        state.playing = false;
        state.position = Duration::ZERO;
    }

    fn seek(&mut self, position: Duration) -> Result<()> {
        self.state.borrow_mut().position = position;
        Ok(())
    }

    fn position(&self) -> Duration {
        self.state.borrow().position
    }

    fn is_drained(&self) -> bool {
        self.state.borrow().drained
    }
}
