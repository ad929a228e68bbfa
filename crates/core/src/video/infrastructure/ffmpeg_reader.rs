use std::path::Path;

use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;
use crate::video::domain::video_reader::{FrameResult, VideoReader};

/// Decodes video frames via ffmpeg-next (libavformat + libavcodec).
///
/// Each decoded frame is converted to RGB24. Container rotation metadata is
/// read into [`VideoMetadata::rotation`] but not applied to the pixels.
pub struct FfmpegReader {
    input_ctx: Option<ffmpeg_next::format::context::Input>,
    video_stream_index: usize,
}

// Safety: FfmpegReader is only used from a single thread at a time.
// The raw pointers inside ffmpeg types are not shared across threads.
unsafe impl Send for FfmpegReader {}

impl FfmpegReader {
    pub fn new() -> Self {
        Self {
            input_ctx: None,
            video_stream_index: 0,
        }
    }

    fn frame_iter(&mut self) -> Result<FfmpegFrameIter<'_>, Box<dyn std::error::Error>> {
        let ictx = self
            .input_ctx
            .as_mut()
            .ok_or("FfmpegReader: not opened")?;

        let stream = ictx
            .stream(self.video_stream_index)
            .ok_or("FfmpegReader: video stream disappeared")?;
        let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())?;
        let decoder = codec_ctx.decoder().video()?;

        let width = decoder.width();
        let height = decoder.height();

        let scaler = ffmpeg_next::software::scaling::Context::get(
            decoder.format(),
            width,
            height,
            ffmpeg_next::format::Pixel::RGB24,
            width,
            height,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )?;

        Ok(FfmpegFrameIter {
            ictx,
            decoder,
            scaler,
            width,
            height,
            video_stream_index: self.video_stream_index,
            frame_index: 0,
            flushing: false,
            done: false,
        })
    }
}

impl Default for FfmpegReader {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoReader for FfmpegReader {
    fn open(&mut self, path: &Path) -> Result<VideoMetadata, Box<dyn std::error::Error>> {
        ffmpeg_next::init()?;

        let ictx = ffmpeg_next::format::input(path)?;

        let stream = ictx
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or("No video stream found")?;

        let video_stream_index = stream.index();
        let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())?;
        let decoder = codec_ctx.decoder().video()?;

        let rate = stream.rate();
        let fps = if rate.denominator() != 0 {
            rate.numerator() as f64 / rate.denominator() as f64
        } else {
            0.0
        };

        let metadata = VideoMetadata {
            width: decoder.width(),
            height: decoder.height(),
            fps,
            total_frames: stream.frames().max(0) as usize,
            codec: decoder
                .codec()
                .map(|c| c.name().to_string())
                .unwrap_or_default(),
            source_path: Some(path.to_path_buf()),
            rotation: extract_rotation(&stream),
        };

        self.video_stream_index = video_stream_index;
        self.input_ctx = Some(ictx);

        Ok(metadata)
    }

    fn frames(&mut self) -> Box<dyn Iterator<Item = FrameResult> + '_> {
        match self.frame_iter() {
            Ok(iter) => Box::new(iter),
            Err(e) => Box::new(std::iter::once(Err(e))),
        }
    }

    fn close(&mut self) {
        self.input_ctx = None;
    }
}

/// Lazy iterator that decodes one frame at a time.
///
/// Stops after the first demuxer, decoder or scaler error so a broken
/// stream is never resumed or silently skipped.
struct FfmpegFrameIter<'a> {
    ictx: &'a mut ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::decoder::Video,
    scaler: ffmpeg_next::software::scaling::Context,
    width: u32,
    height: u32,
    video_stream_index: usize,
    frame_index: usize,
    flushing: bool,
    done: bool,
}

/// How an ffmpeg send/receive/read call ended.
#[derive(Debug, PartialEq)]
enum Step {
    Ready,
    /// EAGAIN: more input is needed before output is available.
    Pending,
    End,
    Failed(ffmpeg_next::Error),
}

fn classify(result: Result<(), ffmpeg_next::Error>) -> Step {
    match result {
        Ok(()) => Step::Ready,
        Err(ffmpeg_next::Error::Other { errno }) if errno == ffmpeg_next::util::error::EAGAIN => {
            Step::Pending
        }
        Err(ffmpeg_next::Error::Eof) => Step::End,
        Err(e) => Step::Failed(e),
    }
}

impl FfmpegFrameIter<'_> {
    fn try_receive(&mut self) -> Option<FrameResult> {
        let mut decoded = ffmpeg_next::util::frame::video::Video::empty();
        match classify(self.decoder.receive_frame(&mut decoded)) {
            Step::Ready => {}
            Step::Pending | Step::End => return None,
            Step::Failed(e) => {
                let index = self.frame_index;
                return self.fail(format!("decoder error at frame {index}: {e}").into());
            }
        }

        let mut rgb_frame = ffmpeg_next::util::frame::video::Video::empty();
        if let Err(e) = self.scaler.run(&decoded, &mut rgb_frame) {
            return self.fail(Box::new(e));
        }

        let pixels = extract_rgb_pixels(&rgb_frame, self.width, self.height);
        let frame = Frame::new(pixels, self.width, self.height, 3, self.frame_index);
        self.frame_index += 1;
        Some(Ok(frame))
    }

    fn fail(&mut self, e: Box<dyn std::error::Error>) -> Option<FrameResult> {
        self.done = true;
        Some(Err(e))
    }

    fn flush(&mut self) -> Option<FrameResult> {
        if let Err(e) = self.decoder.send_eof() {
            return self.fail(Box::new(e));
        }
        self.flushing = true;
        let result = self.try_receive();
        if result.is_none() {
            self.done = true;
        }
        result
    }
}

impl Iterator for FfmpegFrameIter<'_> {
    type Item = FrameResult;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        if let Some(result) = self.try_receive() {
            return Some(result);
        }

        if self.flushing {
            self.done = true;
            return None;
        }

        loop {
            let index = self.frame_index;
            let mut packet = ffmpeg_next::Packet::empty();
            match classify(packet.read(self.ictx)) {
                Step::Ready => {}
                Step::End => return self.flush(),
                Step::Pending => {
                    return self.fail(format!("demuxer stalled near frame {index}").into());
                }
                Step::Failed(e) => {
                    return self.fail(format!("read failed near frame {index}: {e}").into());
                }
            }

            if packet.stream() != self.video_stream_index {
                continue;
            }

            if let Err(e) = self.decoder.send_packet(&packet) {
                return self.fail(format!("decode failed near frame {index}: {e}").into());
            }

            if let Some(result) = self.try_receive() {
                return Some(result);
            }
        }
    }
}

/// Extracts the rotation angle from a video stream.
///
/// Tries stream side data (DisplayMatrix) first, then falls back to the
/// `"rotate"` metadata tag. Returns 0, 90, 180, or 270.
fn extract_rotation(stream: &ffmpeg_next::format::stream::Stream) -> i32 {
    for side_data in stream.side_data() {
        if side_data.kind() == ffmpeg_next::codec::packet::side_data::Type::DisplayMatrix {
            if let Some(angle) = parse_display_matrix(side_data.data()) {
                return normalize_rotation(angle);
            }
        }
    }

    stream
        .metadata()
        .get("rotate")
        .and_then(|s| s.parse::<i32>().ok())
        .map(normalize_rotation)
        .unwrap_or(0)
}

/// Rotation in degrees from a 3x3 display matrix (9 x i32 LE, 16.16
/// fixed-point). Negated because the matrix stores the display transform,
/// the inverse of the capture rotation.
fn parse_display_matrix(data: &[u8]) -> Option<i32> {
    if data.len() < 36 {
        return None;
    }

    let m00 = i32::from_le_bytes(data[0..4].try_into().ok()?) as f64 / 65536.0;
    let m10 = i32::from_le_bytes(data[4..8].try_into().ok()?) as f64 / 65536.0;

    let angle_deg = -m10.atan2(m00).to_degrees().round() as i32;
    Some(angle_deg)
}

/// Snaps an angle to the nearest quarter turn in `0..360`.
fn normalize_rotation(angle: i32) -> i32 {
    match angle.rem_euclid(360) {
        0..=44 | 316..=359 => 0,
        45..=134 => 90,
        135..=224 => 180,
        _ => 270,
    }
}

/// Copies an ffmpeg RGB24 frame into a tightly packed buffer, dropping the
/// per-row stride padding.
fn extract_rgb_pixels(
    rgb_frame: &ffmpeg_next::util::frame::video::Video,
    width: u32,
    height: u32,
) -> Vec<u8> {
    let stride = rgb_frame.stride(0);
    let data = rgb_frame.data(0);
    let row_bytes = width as usize * 3;

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let row_start = row * stride;
        pixels.extend_from_slice(&data[row_start..row_start + row_bytes]);
    }
    pixels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::domain::face_detector::FaceDetector;
    use crate::liveness::domain::liveness_config::LivenessConfig;
    use crate::liveness::domain::liveness_verdict::{LivenessVerdict, STILL_MESSAGE};
    use crate::pipeline::check_liveness_use_case::check_liveness;
    use crate::shared::bounding_box::BoundingBox;
    use rstest::rstest;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn create_test_video(path: &Path, num_frames: usize, width: u32, height: u32, fps: i32) {
        ffmpeg_next::init().unwrap();

        let mut octx = ffmpeg_next::format::output(path).unwrap();

        let global_header = octx
            .format()
            .flags()
            .contains(ffmpeg_next::format::Flags::GLOBAL_HEADER);

        let codec = ffmpeg_next::encoder::find(ffmpeg_next::codec::Id::MPEG4).unwrap();
        let mut ost = octx.add_stream(Some(codec)).unwrap();

        let mut encoder_ctx = ffmpeg_next::codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()
            .unwrap();

        encoder_ctx.set_width(width);
        encoder_ctx.set_height(height);
        encoder_ctx.set_format(ffmpeg_next::format::Pixel::YUV420P);
        encoder_ctx.set_time_base(ffmpeg_next::Rational(1, fps));
        encoder_ctx.set_frame_rate(Some(ffmpeg_next::Rational(fps, 1)));

        if global_header {
            encoder_ctx.set_flags(ffmpeg_next::codec::Flags::GLOBAL_HEADER);
        }

        let mut encoder = encoder_ctx
            .open_with(ffmpeg_next::Dictionary::new())
            .unwrap();
        ost.set_parameters(&encoder);

        octx.write_header().unwrap();

        let ost_time_base = octx.stream(0).unwrap().time_base();

        let mut scaler = ffmpeg_next::software::scaling::Context::get(
            ffmpeg_next::format::Pixel::RGB24,
            width,
            height,
            ffmpeg_next::format::Pixel::YUV420P,
            width,
            height,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )
        .unwrap();

        for i in 0..num_frames {
            let mut rgb_frame = ffmpeg_next::util::frame::video::Video::new(
                ffmpeg_next::format::Pixel::RGB24,
                width,
                height,
            );
            let stride = rgb_frame.stride(0);
            let data = rgb_frame.data_mut(0);
            let value = ((i * 40) % 256) as u8;
            for row in 0..height as usize {
                for col in 0..width as usize {
                    let offset = row * stride + col * 3;
                    data[offset..offset + 3].fill(value);
                }
            }

            let mut yuv_frame = ffmpeg_next::util::frame::video::Video::empty();
            scaler.run(&rgb_frame, &mut yuv_frame).unwrap();
            yuv_frame.set_pts(Some(i as i64));

            encoder.send_frame(&yuv_frame).unwrap();

            let mut encoded = ffmpeg_next::Packet::empty();
            while encoder.receive_packet(&mut encoded).is_ok() {
                encoded.set_stream(0);
                encoded.rescale_ts(ffmpeg_next::Rational(1, fps), ost_time_base);
                encoded.write_interleaved(&mut octx).unwrap();
            }
        }

        encoder.send_eof().unwrap();
        let mut encoded = ffmpeg_next::Packet::empty();
        while encoder.receive_packet(&mut encoded).is_ok() {
            encoded.set_stream(0);
            encoded.rescale_ts(ffmpeg_next::Rational(1, fps), ost_time_base);
            encoded.write_interleaved(&mut octx).unwrap();
        }

        octx.write_trailer().unwrap();
    }

    fn test_video_path(dir: &Path) -> PathBuf {
        dir.join("selfie.mp4")
    }

    #[test]
    fn test_open_returns_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = test_video_path(dir.path());
        create_test_video(&path, 5, 160, 120, 30);

        let mut reader = FfmpegReader::new();
        let meta = reader.open(&path).unwrap();
        assert_eq!(meta.width, 160);
        assert_eq!(meta.height, 120);
        assert!(meta.fps > 0.0);
        assert_eq!(meta.rotation, 0);
        assert_eq!(meta.source_path, Some(path));
    }

    #[test]
    fn test_open_nonexistent_fails() {
        let mut reader = FfmpegReader::new();
        assert!(reader.open(Path::new("/nonexistent/selfie.mp4")).is_err());
    }

    #[test]
    fn test_open_non_video_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.mp4");
        std::fs::write(&path, b"definitely not a video container").unwrap();

        let mut reader = FfmpegReader::new();
        assert!(reader.open(&path).is_err());
    }

    #[test]
    fn test_frames_yields_every_frame_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = test_video_path(dir.path());
        create_test_video(&path, 5, 160, 120, 30);

        let mut reader = FfmpegReader::new();
        reader.open(&path).unwrap();

        let frames: Vec<Frame> = reader.frames().map(|f| f.unwrap()).collect();
        assert_eq!(frames.len(), 5);
        for (i, frame) in frames.iter().enumerate() {
            assert_eq!(frame.index(), i);
            assert_eq!(frame.channels(), 3);
            assert_eq!(frame.data().len(), 160 * 120 * 3);
        }
    }

    #[test]
    fn test_frames_without_open_returns_error() {
        let mut reader = FfmpegReader::new();
        let mut frames = reader.frames();
        assert!(frames.next().unwrap().is_err());
        assert!(frames.next().is_none());
    }

    #[test]
    fn test_frames_after_close_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = test_video_path(dir.path());
        create_test_video(&path, 2, 64, 48, 30);

        let mut reader = FfmpegReader::new();
        reader.open(&path).unwrap();
        reader.close();
        assert!(reader.frames().next().unwrap().is_err());
    }

    #[test]
    fn test_parse_display_matrix_quarter_turn() {
        let mut data = vec![0u8; 36];
        let m10: i32 = 65536; // sin(90°) = 1
        data[4..8].copy_from_slice(&m10.to_le_bytes());

        let normalized = normalize_rotation(parse_display_matrix(&data).unwrap());
        assert!(
            normalized == 90 || normalized == 270,
            "Expected 90 or 270, got {normalized}"
        );
    }

    #[test]
    fn test_parse_display_matrix_identity() {
        let mut data = vec![0u8; 36];
        data[0..4].copy_from_slice(&65536i32.to_le_bytes());
        assert_eq!(normalize_rotation(parse_display_matrix(&data).unwrap()), 0);
    }

    #[test]
    fn test_parse_display_matrix_too_short() {
        assert!(parse_display_matrix(&[0u8; 20]).is_none());
    }

    #[test]
    fn test_normalize_rotation() {
        assert_eq!(normalize_rotation(0), 0);
        assert_eq!(normalize_rotation(90), 90);
        assert_eq!(normalize_rotation(180), 180);
        assert_eq!(normalize_rotation(270), 270);
        assert_eq!(normalize_rotation(360), 0);
        assert_eq!(normalize_rotation(-90), 270);
        assert_eq!(normalize_rotation(44), 0);
        assert_eq!(normalize_rotation(45), 90);
        assert_eq!(normalize_rotation(315), 270);
        assert_eq!(normalize_rotation(316), 0);
    }

    #[test]
    fn test_classify_again_is_pending() {
        let again = ffmpeg_next::Error::Other {
            errno: ffmpeg_next::util::error::EAGAIN,
        };
        assert_eq!(classify(Err(again)), Step::Pending);
    }

    #[test]
    fn test_classify_eof_ends_stream() {
        assert_eq!(classify(Err(ffmpeg_next::Error::Eof)), Step::End);
        assert_eq!(classify(Ok(())), Step::Ready);
    }

    #[rstest]
    #[case::io(ffmpeg_next::Error::Other { errno: ffmpeg_next::util::error::EIO })]
    #[case::invalid_data(ffmpeg_next::Error::InvalidData)]
    #[case::exit(ffmpeg_next::Error::Exit)]
    fn test_classify_real_errors_fail(#[case] error: ffmpeg_next::Error) {
        assert_eq!(classify(Err(error)), Step::Failed(error));
    }

    #[test]
    fn test_frames_end_after_last_frame() {
        let dir = tempfile::tempdir().unwrap();
        let path = test_video_path(dir.path());
        create_test_video(&path, 3, 64, 48, 30);

        let mut reader = FfmpegReader::new();
        reader.open(&path).unwrap();
        let mut frames = reader.frames();
        for _ in 0..3 {
            assert!(frames.next().unwrap().is_ok());
        }
        assert!(frames.next().is_none());
        assert!(frames.next().is_none());
    }

    // --- Through the liveness check ---

    struct CountingReader {
        inner: FfmpegReader,
        closes: Arc<AtomicUsize>,
    }

    impl VideoReader for CountingReader {
        fn open(&mut self, path: &Path) -> Result<VideoMetadata, Box<dyn std::error::Error>> {
            self.inner.open(path)
        }

        fn frames(&mut self) -> Box<dyn Iterator<Item = FrameResult> + '_> {
            self.inner.frames()
        }

        fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
            self.inner.close();
        }
    }

    struct CenterFaceDetector;

    impl FaceDetector for CenterFaceDetector {
        fn detect(&mut self, frame: &Frame) -> Result<Vec<BoundingBox>, Box<dyn std::error::Error>> {
            let (w, h) = (frame.width() as i32, frame.height() as i32);
            Ok(vec![BoundingBox::new(w / 4, h / 4, w / 2, h / 2)])
        }
    }

    fn check(path: &Path) -> (LivenessVerdict, usize) {
        let closes = Arc::new(AtomicUsize::new(0));
        let reader = CountingReader {
            inner: FfmpegReader::new(),
            closes: closes.clone(),
        };
        let verdict = check_liveness(
            path,
            Box::new(reader),
            Box::new(CenterFaceDetector),
            LivenessConfig::default(),
        );
        (verdict, closes.load(Ordering::SeqCst))
    }

    #[test]
    fn test_liveness_check_reads_whole_clip() {
        let dir = tempfile::tempdir().unwrap();
        let path = test_video_path(dir.path());
        create_test_video(&path, 6, 64, 48, 30);

        let (verdict, closes) = check(&path);

        assert_eq!(
            verdict,
            LivenessVerdict::Success {
                is_alive: false,
                max_movement_pixels: 0.0,
                message: STILL_MESSAGE.to_string(),
                debug: "Processed 6 frames. Found faces in 6 frames.".to_string(),
            }
        );
        assert_eq!(closes, 1);
    }

    #[test]
    fn test_liveness_check_of_truncated_clip_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = test_video_path(dir.path());
        create_test_video(&path, 6, 64, 48, 30);
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();

        let (verdict, closes) = check(&path);

        assert_eq!(verdict.status(), "error");
        assert_eq!(closes, 1);
    }

    #[test]
    fn test_close_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = test_video_path(dir.path());
        create_test_video(&path, 1, 160, 120, 30);

        let mut reader = FfmpegReader::new();
        reader.open(&path).unwrap();
        reader.close();
        reader.close();
    }
}
