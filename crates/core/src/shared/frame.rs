use image::{imageops, GrayImage, RgbImage};
use ndarray::ArrayView3;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FrameError {
    #[error("unsupported channel count: {0} (expected 1 or 3)")]
    UnsupportedChannels(u8),
    #[error("frame buffer does not match {width}x{height}x{channels}")]
    BufferSize { width: u32, height: u32, channels: u8 },
}

/// Quarter-turn applied to a frame before re-running detection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rotation {
    Clockwise90,
    CounterClockwise90,
}

/// A single decoded video frame: contiguous bytes in row-major order.
///
/// The decoder hands out 3-channel RGB; detection works on 1-channel
/// grayscale derived via [`Frame::to_grayscale`].
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
    index: usize,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8, index: usize) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * (channels as usize),
            "data length must equal width * height * channels"
        );
        Self {
            data,
            width,
            height,
            channels,
            index,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn is_grayscale(&self) -> bool {
        self.channels == 1
    }

    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(self.shape(), &self.data)
            .expect("Frame data length must match dimensions")
    }

    /// Single-channel luma copy of this frame. Grayscale frames are cloned.
    pub fn to_grayscale(&self) -> Result<Frame, FrameError> {
        match self.channels {
            1 => Ok(self.clone()),
            3 => {
                let rgb = RgbImage::from_raw(self.width, self.height, self.data.clone())
                    .ok_or_else(|| self.buffer_error())?;
                let gray = imageops::grayscale(&rgb);
                Ok(self.with_pixels(gray.into_raw(), self.width, self.height, 1))
            }
            other => Err(FrameError::UnsupportedChannels(other)),
        }
    }

    /// Rotated copy; width and height swap, the sequence index is kept.
    pub fn rotated(&self, rotation: Rotation) -> Result<Frame, FrameError> {
        let (w, h) = (self.height, self.width);
        match self.channels {
            1 => {
                let img = GrayImage::from_raw(self.width, self.height, self.data.clone())
                    .ok_or_else(|| self.buffer_error())?;
                let out = match rotation {
                    Rotation::Clockwise90 => imageops::rotate90(&img),
                    Rotation::CounterClockwise90 => imageops::rotate270(&img),
                };
                Ok(self.with_pixels(out.into_raw(), w, h, 1))
            }
            3 => {
                let img = RgbImage::from_raw(self.width, self.height, self.data.clone())
                    .ok_or_else(|| self.buffer_error())?;
                let out = match rotation {
                    Rotation::Clockwise90 => imageops::rotate90(&img),
                    Rotation::CounterClockwise90 => imageops::rotate270(&img),
                };
                Ok(self.with_pixels(out.into_raw(), w, h, 3))
            }
            other => Err(FrameError::UnsupportedChannels(other)),
        }
    }

    fn with_pixels(&self, data: Vec<u8>, width: u32, height: u32, channels: u8) -> Frame {
        Frame::new(data, width, height, channels, self.index)
    }

    fn buffer_error(&self) -> FrameError {
        FrameError::BufferSize {
            width: self.width,
            height: self.height,
            channels: self.channels,
        }
    }

    fn shape(&self) -> (usize, usize, usize) {
        (
            self.height as usize,
            self.width as usize,
            self.channels as usize,
        )
    }
}
