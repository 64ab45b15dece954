//! Frame source adapters.
//!
//! A resolved stream reference (HTTP URL, `file://` URL or plain path) is
//! opened as a byte stream and re-chunked into fixed-size transport frames.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{stream::BoxStream, StreamExt, TryStreamExt};
use std::{io, path::PathBuf, time::Duration};
use tokio_util::io::ReaderStream;
use tracing::{debug, info};
use url::Url;

use crate::{error::PipelineError, track::Track};

/// Sequence of fixed-size frames for one track.
#[async_trait]
pub trait FrameSource: Send {
    /// Next frame, or `None` once the stream is exhausted.
    async fn next_frame(&mut self) -> io::Result<Option<Bytes>>;
}

/// Opens the frame source for a track.
#[async_trait]
pub trait SourceOpener: Send + Sync {
    async fn open(&self, track: &Track) -> Result<Box<dyn FrameSource>, PipelineError>;
}

/// Splits arbitrary chunks into frames of exactly `frame_size` bytes.
#[derive(Debug)]
pub struct Framer {
    frame_size: usize,
    buffer: BytesMut,
}

impl Framer {
    pub fn new(frame_size: usize) -> Self {
        Self {
            frame_size,
            buffer: BytesMut::with_capacity(frame_size * 2),
        }
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    pub fn pop_frame(&mut self) -> Option<Bytes> {
        (self.buffer.len() >= self.frame_size).then(|| self.buffer.split_to(self.frame_size).freeze())
    }

    /// Flushes the trailing partial frame, padded with silence.
    pub fn finish(&mut self) -> Option<Bytes> {
        if self.buffer.is_empty() {
            return None;
        }
        let mut last = self.buffer.split();
        last.resize(self.frame_size, 0);
        Some(last.freeze())
    }
}

/// Frames read from any chunked byte stream.
pub struct FramedSource {
    chunks: BoxStream<'static, io::Result<Bytes>>,
    framer: Framer,
    exhausted: bool,
}

impl FramedSource {
    pub fn new(chunks: BoxStream<'static, io::Result<Bytes>>, frame_size: usize) -> Self {
        Self {
            chunks,
            framer: Framer::new(frame_size),
            exhausted: false,
        }
    }
}

#[async_trait]
impl FrameSource for FramedSource {
    async fn next_frame(&mut self) -> io::Result<Option<Bytes>> {
        loop {
            if let Some(frame) = self.framer.pop_frame() {
                return Ok(Some(frame));
            }
            if self.exhausted {
                return Ok(self.framer.finish());
            }
            match self.chunks.next().await {
                Some(chunk) => self.framer.push(&chunk?),
                None => self.exhausted = true,
            }
        }
    }
}

/// Where a stream reference points to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamLocation {
    Http(Url),
    File(PathBuf),
}

impl StreamLocation {
    pub fn parse(reference: &str) -> Result<Self, PipelineError> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(PipelineError::Source("track has no stream reference".into()));
        }

        match Url::parse(reference) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(Self::Http(url)),
            Ok(url) if url.scheme() == "file" => url
                .to_file_path()
                .map(Self::File)
                .map_err(|_| PipelineError::Source(format!("invalid file URL {reference}"))),
            // Las letras de unidad de Windows se parsean como esquema de una letra
            Ok(url) if url.scheme().len() > 1 => Err(PipelineError::Source(format!(
                "unsupported stream scheme '{}'",
                url.scheme()
            ))),
            _ => Ok(Self::File(PathBuf::from(reference))),
        }
    }
}

/// Opens HTTP streams and local files.
#[derive(Clone)]
pub struct StreamOpener {
    client: reqwest::Client,
    frame_size: usize,
    chunk_size: usize,
}

impl StreamOpener {
    pub fn new(frame_size: usize, chunk_size: usize, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .user_agent(concat!("open-radio/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            frame_size,
            chunk_size,
        })
    }

    async fn open_http(&self, url: Url) -> Result<FramedSource, PipelineError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| PipelineError::Source(format!("GET {url}: {e}")))?;

        debug!("Stream HTTP abierto: {} ({:?} bytes)", url, response.content_length());
        let chunks = response.bytes_stream().map_err(io::Error::other).boxed();
        Ok(FramedSource::new(chunks, self.frame_size))
    }

    async fn open_file(&self, path: PathBuf) -> Result<FramedSource, PipelineError> {
        let file = tokio::fs::File::open(&path)
            .await
            .map_err(|e| PipelineError::Source(format!("open {}: {e}", path.display())))?;

        let chunks = ReaderStream::with_capacity(file, self.chunk_size).boxed();
        Ok(FramedSource::new(chunks, self.frame_size))
    }
}

#[async_trait]
impl SourceOpener for StreamOpener {
    async fn open(&self, track: &Track) -> Result<Box<dyn FrameSource>, PipelineError> {
        let source = match StreamLocation::parse(track.stream_url())? {
            StreamLocation::Http(url) => self.open_http(url).await?,
            StreamLocation::File(path) => self.open_file(path).await?,
        };
        info!("🎧 Transmitiendo {}", track);
        Ok(Box::new(source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::{Service, TrackId};
    use futures::stream;
    use pretty_assertions::assert_eq;

    async fn drain(source: &mut dyn FrameSource) -> Vec<Bytes> {
        let mut frames = Vec::new();
        while let Some(frame) = source.next_frame().await.unwrap() {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn test_framer_pads_last_frame() {
        let mut framer = Framer::new(4);
        framer.push(&[1, 2, 3]);
        assert_eq!(framer.pop_frame(), None);
        framer.push(&[4, 5, 6]);

        assert_eq!(framer.pop_frame(), Some(Bytes::from_static(&[1, 2, 3, 4])));
        assert_eq!(framer.pop_frame(), None);
        assert_eq!(framer.finish(), Some(Bytes::from_static(&[5, 6, 0, 0])));
        assert_eq!(framer.finish(), None);
    }

    #[tokio::test]
    async fn test_framed_source_rechunks_stream() {
        let chunks = stream::iter(vec![
            Ok(Bytes::from_static(b"abcde")),
            Ok(Bytes::from_static(b"fg")),
            Ok(Bytes::from_static(b"hijkl")),
        ])
        .boxed();
        let mut source = FramedSource::new(chunks, 4);

        let frames = drain(&mut source).await;

        assert_eq!(
            frames,
            vec![
                Bytes::from_static(b"abcd"),
                Bytes::from_static(b"efgh"),
                Bytes::from_static(b"ijkl"),
            ]
        );
    }

    #[tokio::test]
    async fn test_framed_source_surfaces_read_errors() {
        let chunks = stream::iter(vec![
            Ok(Bytes::from_static(b"ab")),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
        ])
        .boxed();
        let mut source = FramedSource::new(chunks, 4);

        let err = source.next_frame().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
    }

    #[test]
    fn test_stream_location_parsing() {
        assert!(matches!(
            StreamLocation::parse("https://cdn.example.com/a.pcm"),
            Ok(StreamLocation::Http(_))
        ));
        assert_eq!(
            StreamLocation::parse("/music/a.pcm").unwrap(),
            StreamLocation::File(PathBuf::from("/music/a.pcm"))
        );
        assert_eq!(
            StreamLocation::parse("file:///music/a.pcm").unwrap(),
            StreamLocation::File(PathBuf::from("/music/a.pcm"))
        );
        assert!(StreamLocation::parse("").is_err());
        assert!(StreamLocation::parse("rtmp://live.example.com/x").is_err());
    }

    #[tokio::test]
    async fn test_opens_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.pcm");
        tokio::fs::write(&path, vec![7u8; 10]).await.unwrap();

        let track = Track::new(TrackId::new(Service::Local, "tone"), "tone", "")
            .with_stream_url(path.display().to_string());
        let opener = StreamOpener::new(4, 3, Duration::from_secs(1)).unwrap();

        let mut source = opener.open(&track).await.unwrap();
        let frames = drain(source.as_mut()).await;

        assert_eq!(frames.len(), 3);
        assert_eq!(frames[2], Bytes::from_static(&[7, 7, 0, 0]));
    }

    #[tokio::test]
    async fn test_missing_file_is_source_error() {
        let track = Track::new(TrackId::new(Service::Local, "nope"), "nope", "")
            .with_stream_url("/definitely/not/here.pcm");
        let opener = StreamOpener::new(4, 4, Duration::from_secs(1)).unwrap();

        let err = opener.open(&track).await.err().unwrap();
        assert!(matches!(err, PipelineError::Source(_)));
    }
}
