//! Audio output.
//!
//! The [`Output`] trait is the playback primitive the
//! [`Session`](crate::session::Session) drives: load one source, start and
//! pause it, seek in it, and tell where it is. Decoding is up to the
//! implementation.
//!
//! [`RodioOutput`] plays through the default audio device. Sources are
//! streamed over HTTP into a temporary file while they play, so that seeking
//! backwards does not need the network.

use std::{future::Future, time::Duration};

use rodio::Source;
use stream_download::{
    http::HttpStream, source::SourceStream, storage::temp::TempStorageProvider, Settings,
    StreamDownload,
};
use url::Url;

use crate::{error::Result, http::Client as HttpClient};

pub trait Output {
    /// Replaces whatever was loaded with the media at `url`, paused at its
    /// start.
    ///
    /// Returns the total duration if the media tells.
    fn load(&mut self, url: Url) -> impl Future<Output = Result<Option<Duration>>>;

    /// Starts or resumes playback of the loaded media.
    ///
    /// # Errors
    ///
    /// Returns error if the device refuses to start.
    fn play(&mut self) -> Result<()>;

    fn pause(&mut self);

    /// Drops the loaded media.
    fn stop(&mut self);

    /// # Errors
    ///
    /// Returns error if the media cannot seek to `position`.
    fn seek(&mut self, position: Duration) -> Result<()>;

    /// Playback position in the loaded media.
    fn position(&self) -> Duration;

    /// Whether the loaded media has played to its end.
    fn is_drained(&self) -> bool;
}

/// Output to the default audio device.
///
/// The underlying stream is tied to the thread that opened it, so this type
/// is not `Send`. Run it on the task that created it.
pub struct RodioOutput {
    http_client: reqwest::Client,
    sink: rodio::Sink,
    _stream: rodio::OutputStream,
}

impl RodioOutput {
    /// Bytes to buffer before decoding starts.
    const PREFETCH_BYTES: u64 = 128 * 1024;

    /// Opens the default audio device.
    ///
    /// # Errors
    ///
    /// Returns error if there is no audio device or it cannot be opened.
    pub fn new(http_client: &HttpClient) -> Result<Self> {
        let (stream, handle) = rodio::OutputStream::try_default()?;
        let sink = rodio::Sink::try_new(&handle)?;
        sink.pause();

        Ok(Self {
            http_client: http_client.unlimited.clone(),
            sink,
            _stream: stream,
        })
    }
}

impl Output for RodioOutput {
    async fn load(&mut self, url: Url) -> Result<Option<Duration>> {
        self.sink.clear();

        let stream = HttpStream::new(self.http_client.clone(), url).await?;
        if let Some(file_size) = stream.content_length() {
            debug!("streaming {file_size} bytes");
        }

        let download = StreamDownload::from_stream(
            stream,
            TempStorageProvider::default(),
            Settings::default().prefetch_bytes(Self::PREFETCH_BYTES),
        )
        .await?;

        // Probing the format reads from the download, which blocks until
        // enough of it has arrived.
        let decoder = tokio::task::spawn_blocking(move || rodio::Decoder::new(download)).await??;

        let duration = decoder.total_duration();
        self.sink.append(decoder);
        Ok(duration)
    }

    fn play(&mut self) -> Result<()> {
        self.sink.play();
        Ok(())
    }

    fn pause(&mut self) {
        self.sink.pause();
    }

    fn stop(&mut self) {
        self.sink.clear();
    }

    fn seek(&mut self, position: Duration) -> Result<()> {
        self.sink.try_seek(position).map_err(Into::into)
    }

    fn position(&self) -> Duration {
        self.sink.get_pos()
    }

    fn is_drained(&self) -> bool {
        self.sink.empty()
    }
}
