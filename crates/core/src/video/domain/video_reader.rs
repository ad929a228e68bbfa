use std::path::Path;

use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;

/// Decoded frame or the error that stopped decoding.
pub type FrameResult = Result<Frame, Box<dyn std::error::Error>>;

/// Video decoding capability.
///
/// A reader may serve several runs one after another, but each
/// `open`/`close` cycle belongs to exactly one run.
pub trait VideoReader: Send {
    /// Opens the container and prepares the best video stream.
    fn open(&mut self, path: &Path) -> Result<VideoMetadata, Box<dyn std::error::Error>>;

    /// Frames in decode order. A decode failure is yielded as `Err`;
    /// iteration ends at end of stream.
    fn frames(&mut self) -> Box<dyn Iterator<Item = FrameResult> + '_>;

    /// Releases decoder and file handles. Must tolerate repeated calls.
    fn close(&mut self);
}

/// An opened reader that is closed when this guard goes out of scope.
///
/// Closing happens exactly once, whichever way the owning scope is left.
pub struct OpenedVideo<'a> {
    reader: &'a mut dyn VideoReader,
    metadata: VideoMetadata,
}

impl<'a> OpenedVideo<'a> {
    /// Opens `path`. On failure the reader is still closed before returning,
    /// since implementations may have acquired partial state.
    pub fn open(
        reader: &'a mut dyn VideoReader,
        path: &Path,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        match reader.open(path) {
            Ok(metadata) => Ok(Self { reader, metadata }),
            Err(e) => {
                reader.close();
                Err(e)
            }
        }
    }

    pub fn metadata(&self) -> &VideoMetadata {
        &self.metadata
    }

    pub fn frames(&mut self) -> Box<dyn Iterator<Item = FrameResult> + '_> {
        self.reader.frames()
    }
}

impl Drop for OpenedVideo<'_> {
    fn drop(&mut self) {
        self.reader.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingReader {
        fail_open: bool,
        closes: Arc<AtomicUsize>,
    }

    impl VideoReader for CountingReader {
        fn open(&mut self, _path: &Path) -> Result<VideoMetadata, Box<dyn std::error::Error>> {
            if self.fail_open {
                return Err("cannot open".into());
            }
            Ok(VideoMetadata {
                width: 4,
                height: 4,
                fps: 30.0,
                total_frames: 1,
                codec: String::new(),
                source_path: None,
                rotation: 0,
            })
        }

        fn frames(&mut self) -> Box<dyn Iterator<Item = FrameResult> + '_> {
            Box::new(std::iter::once(Ok(Frame::new(vec![0; 16], 4, 4, 1, 0))))
        }

        fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn reader(fail_open: bool) -> (CountingReader, Arc<AtomicUsize>) {
        let closes = Arc::new(AtomicUsize::new(0));
        (
            CountingReader {
                fail_open,
                closes: closes.clone(),
            },
            closes,
        )
    }

    #[test]
    fn test_guard_closes_on_drop() {
        let (mut r, closes) = reader(false);
        {
            let mut video = OpenedVideo::open(&mut r, Path::new("a.mp4")).unwrap();
            assert_eq!(video.metadata().width, 4);
            assert_eq!(video.frames().count(), 1);
            assert_eq!(closes.load(Ordering::SeqCst), 0);
        }
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_open_closes_once() {
        let (mut r, closes) = reader(true);
        assert!(OpenedVideo::open(&mut r, Path::new("a.mp4")).is_err());
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_guard_closes_during_unwind() {
        let (mut r, closes) = reader(false);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _video = OpenedVideo::open(&mut r, Path::new("a.mp4")).unwrap();
            panic!("detector blew up");
        }));
        assert!(result.is_err());
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }
}
