//! Synthetic frame source for running without a camera

use std::thread;
use std::time::{Duration, Instant};

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{imageops, ImageBuffer, Rgb, RgbImage};

use crate::capture::frame::Frame;
use crate::capture::source::{FrameSource, SourceProvider};
use crate::{CaptureConfig, SourceError};

#[derive(Debug, Default, Clone, Copy)]
pub struct PatternProvider;

impl SourceProvider for PatternProvider {
    fn open(&self, config: &CaptureConfig) -> Result<Box<dyn FrameSource>, SourceError> {
        Ok(Box::new(PatternSource::new(config)))
    }
}

/// Moving diagonal gradient, paced at the configured frame rate
pub struct PatternSource {
    width: u32,
    height: u32,
    hflip: bool,
    vflip: bool,
    quality: u8,
    interval: Duration,
    next_due: Option<Instant>,
    tick: u32,
}

impl PatternSource {
    pub fn new(config: &CaptureConfig) -> Self {
        Self {
            width: config.width,
            height: config.height,
            hflip: config.hflip,
            vflip: config.vflip,
            quality: config.jpeg_quality,
            interval: Duration::from_secs(1) / config.fps.max(1),
            next_due: None,
            tick: 0,
        }
    }

    fn render(&self) -> RgbImage {
        let shift = self.tick.wrapping_mul(4);
        let mut img: RgbImage = ImageBuffer::from_fn(self.width, self.height, |x, y| {
            Rgb([
                (x.wrapping_add(shift) % 256) as u8,
                (y.wrapping_add(shift) % 256) as u8,
                ((x + y) / 2 % 256) as u8,
            ])
        });
        if self.hflip {
            imageops::flip_horizontal_in_place(&mut img);
        }
        if self.vflip {
            imageops::flip_vertical_in_place(&mut img);
        }
        img
    }
}

impl FrameSource for PatternSource {
    fn next_frame(&mut self) -> Result<Frame, SourceError> {
        if let Some(due) = self.next_due {
            let now = Instant::now();
            if due > now {
                thread::sleep(due - now);
            }
        }
        self.next_due = Some(Instant::now() + self.interval);

        let img = self.render();
        self.tick = self.tick.wrapping_add(1);
        let data = encode_jpeg(img.as_raw(), self.width, self.height, self.quality)?;
        Ok(Frame { data })
    }
}

/// Encode packed RGB24 pixels as a baseline JPEG
pub fn encode_jpeg(rgb: &[u8], width: u32, height: u32, quality: u8) -> Result<Bytes, SourceError> {
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100))
        .encode(rgb, width, height, image::ExtendedColorType::Rgb8)
        .map_err(|e| SourceError::Encode(e.to_string()))?;
    Ok(Bytes::from(out))
}
