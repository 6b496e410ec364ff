//! Decoded frames and the sources that yield them.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, bounded};
use image::RgbImage;

use crate::error::SourceError;

/// One decoded frame. Cloning shares the raster.
#[derive(Debug, Clone)]
pub struct Frame {
    pub index: u64,
    pub image: Arc<RgbImage>,
}

impl Frame {
    pub fn new(index: u64, image: RgbImage) -> Self {
        Self {
            index,
            image: Arc::new(image),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Sequential, forward-only frame producer.
///
/// Frames must come out in strictly increasing index order; `Ok(None)`
/// marks the end of the stream.
pub trait FrameSource: Send {
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError>;

    /// Total number of frames, when known up front.
    fn len_hint(&self) -> Option<u64> {
        None
    }
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        (**self).next_frame()
    }

    fn len_hint(&self) -> Option<u64> {
        (**self).len_hint()
    }
}

/// Frames already held in memory.
#[derive(Debug, Default)]
pub struct MemorySource {
    frames: std::collections::VecDeque<Frame>,
    total: u64,
}

impl MemorySource {
    pub fn new(frames: impl IntoIterator<Item = Frame>) -> Self {
        let frames: std::collections::VecDeque<Frame> = frames.into_iter().collect();
        let total = frames.len() as u64;
        Self { frames, total }
    }

    /// Number the images 1, 2, 3, ...
    pub fn from_images(images: impl IntoIterator<Item = RgbImage>) -> Self {
        Self::new(
            images
                .into_iter()
                .enumerate()
                .map(|(i, image)| Frame::new(i as u64 + 1, image)),
        )
    }
}

impl FrameSource for MemorySource {
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        Ok(self.frames.pop_front())
    }

    fn len_hint(&self) -> Option<u64> {
        Some(self.total)
    }
}

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// A directory of already-decoded frame images, read in file-name order
/// and numbered from 1.
#[derive(Debug)]
pub struct ImageSequenceSource {
    paths: Vec<PathBuf>,
    cursor: usize,
}

impl ImageSequenceSource {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, SourceError> {
        let dir = dir.as_ref();
        let read = std::fs::read_dir(dir).map_err(|source| SourceError::Open {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut paths = Vec::new();
        for entry in read {
            let entry = entry.map_err(|source| SourceError::Open {
                path: dir.to_path_buf(),
                source,
            })?;
            let path = entry.path();
            let is_image = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()));
            if is_image && path.is_file() {
                paths.push(path);
            }
        }
        paths.sort();

        tracing::info!(dir = %dir.display(), frames = paths.len(), "opened image sequence");
        Ok(Self { paths, cursor: 0 })
    }
}

impl FrameSource for ImageSequenceSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        let Some(path) = self.paths.get(self.cursor) else {
            return Ok(None);
        };
        let image = image::open(path)
            .map_err(|source| SourceError::Decode {
                path: path.clone(),
                source,
            })?
            .into_rgb8();
        self.cursor += 1;
        Ok(Some(Frame::new(self.cursor as u64, image)))
    }

    fn len_hint(&self) -> Option<u64> {
        Some(self.paths.len() as u64)
    }
}

/// What the consumer side of a [`FrameStream`] sees.
#[derive(Debug)]
pub(crate) enum StreamEvent {
    Frame(Frame),
    End,
    TimedOut,
    Failed(SourceError),
}

/// Decodes on a dedicated thread, a bounded number of frames ahead.
pub(crate) struct FrameStream {
    rx: Receiver<Result<Option<Frame>, SourceError>>,
    finished: bool,
}

impl FrameStream {
    pub(crate) fn spawn<S>(mut source: S, prefetch: usize) -> Result<Self, SourceError>
    where
        S: FrameSource + 'static,
    {
        let (tx, rx) = bounded(prefetch.max(1));
        thread::Builder::new()
            .name("frame-decode".into())
            .spawn(move || {
                loop {
                    let item = source.next_frame();
                    let last = !matches!(item, Ok(Some(_)));
                    if tx.send(item).is_err() || last {
                        break;
                    }
                }
            })
            .map_err(SourceError::Thread)?;
        Ok(Self {
            rx,
            finished: false,
        })
    }

    pub(crate) fn next(&mut self, timeout: Option<Duration>) -> StreamEvent {
        if self.finished {
            return StreamEvent::End;
        }
        let item = match timeout {
            Some(timeout) => match self.rx.recv_timeout(timeout) {
                Ok(item) => item,
                Err(RecvTimeoutError::Timeout) => return StreamEvent::TimedOut,
                Err(RecvTimeoutError::Disconnected) => Err(SourceError::Disconnected),
            },
            None => self.rx.recv().unwrap_or(Err(SourceError::Disconnected)),
        };
        match item {
            Ok(Some(frame)) => StreamEvent::Frame(frame),
            Ok(None) => {
                self.finished = true;
                StreamEvent::End
            }
            Err(err) => {
                self.finished = true;
                StreamEvent::Failed(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SlowSource {
        delay: Duration,
        remaining: u64,
    }

    impl FrameSource for SlowSource {
        fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
            if self.remaining == 0 {
                return Ok(None);
            }
            thread::sleep(self.delay);
            self.remaining -= 1;
            Ok(Some(Frame::new(1, RgbImage::new(1, 1))))
        }
    }

    #[test]
    fn test_memory_source_numbers_from_one() {
        let mut source = MemorySource::from_images(vec![RgbImage::new(2, 2); 3]);
        assert_eq!(source.len_hint(), Some(3));
        let indices: Vec<u64> = std::iter::from_fn(|| source.next_frame().unwrap())
            .map(|f| f.index)
            .collect();
        assert_eq!(indices, vec![1, 2, 3]);
    }

    #[test]
    fn test_stream_yields_then_ends() {
        let source = MemorySource::from_images(vec![RgbImage::new(2, 2); 2]);
        let mut stream = FrameStream::spawn(source, 1).unwrap();
        assert!(matches!(stream.next(None), StreamEvent::Frame(f) if f.index == 1));
        assert!(matches!(stream.next(None), StreamEvent::Frame(f) if f.index == 2));
        assert!(matches!(stream.next(None), StreamEvent::End));
        assert!(matches!(stream.next(None), StreamEvent::End));
    }

    #[test]
    fn test_stream_timeout_is_not_terminal() {
        let source = SlowSource {
            delay: Duration::from_millis(200),
            remaining: 1,
        };
        let mut stream = FrameStream::spawn(source, 1).unwrap();
        assert!(matches!(
            stream.next(Some(Duration::from_millis(5))),
            StreamEvent::TimedOut
        ));
        assert!(matches!(
            stream.next(Some(Duration::from_secs(5))),
            StreamEvent::Frame(_)
        ));
    }

    #[test]
    fn test_image_sequence_missing_dir() {
        let err = ImageSequenceSource::open("/definitely/not/here").unwrap_err();
        assert!(matches!(err, SourceError::Open { .. }));
    }

    #[test]
    fn test_image_sequence_reads_sorted_pngs() {
        let dir = tempfile::tempdir().unwrap();
        for (name, shade) in [("b.png", 20u8), ("a.png", 10u8)] {
            RgbImage::from_pixel(3, 2, image::Rgb([shade, 0, 0]))
                .save(dir.path().join(name))
                .unwrap();
        }
        std::fs::write(dir.path().join("notes.txt"), "skip me").unwrap();

        let mut source = ImageSequenceSource::open(dir.path()).unwrap();
        assert_eq!(source.len_hint(), Some(2));
        let first = source.next_frame().unwrap().unwrap();
        assert_eq!(first.index, 1);
        assert_eq!(first.image.get_pixel(0, 0)[0], 10);
        let second = source.next_frame().unwrap().unwrap();
        assert_eq!(second.index, 2);
        assert!(source.next_frame().unwrap().is_none());
    }
}
