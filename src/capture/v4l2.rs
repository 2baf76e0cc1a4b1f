//! V4L2 capture streaming JPEG frames through mmap buffers

use bytes::Bytes;
use tracing::{debug, info, instrument, warn};
use v4l::buffer::Type;
use v4l::capability::Flags as CapFlags;
use v4l::control::{Control, Value};
use v4l::io::traits::CaptureStream;
use v4l::prelude::MmapStream;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use crate::capture::frame::{Frame, PixelFormat};
use crate::capture::pattern::encode_jpeg;
use crate::capture::source::{FrameSource, SourceProvider};
use crate::utils::{self, FoundDevice};
use crate::{CaptureConfig, SourceError};

const V4L2_CID_HFLIP: u32 = 0x0098_0914;
const V4L2_CID_VFLIP: u32 = 0x0098_0915;

/// Opens a [`V4l2Capture`] per generation
#[derive(Debug, Default, Clone, Copy)]
pub struct V4l2Provider;

impl SourceProvider for V4l2Provider {
    fn open(&self, config: &CaptureConfig) -> Result<Box<dyn FrameSource>, SourceError> {
        let device = if config.device.is_empty() {
            utils::auto_detect_device()?
        } else {
            FoundDevice::new(config.device.clone(), config.format)
        };

        let mut capture = V4l2Capture::new(config, device)?;
        capture.start_stream()?;
        Ok(Box::new(capture))
    }
}

/// Camera handle owning the device and its stream
pub struct V4l2Capture {
    // Field order matters: the stream must be dropped before the device.
    stream: Option<MmapStream<'static>>,
    device: Box<Device>,
    width: u32,
    height: u32,
    /// Bytes per line as reported by the driver
    stride: u32,
    format: PixelFormat,
    buffer_count: u32,
    jpeg_quality: u8,
}

impl V4l2Capture {
    /// Open and configure the device without starting the stream
    pub fn new(config: &CaptureConfig, found: FoundDevice) -> Result<Self, SourceError> {
        info!("Initializing V4L2 capture: {:?}", found);

        let device = Device::with_path(&found.path)?;

        let caps = device.query_caps()?;
        info!("Device: {} ({})", caps.card, caps.driver);

        if !caps.capabilities.contains(CapFlags::VIDEO_CAPTURE) {
            return Err(SourceError::Unsupported(format!(
                "{} does not support video capture",
                found.path
            )));
        }

        let mut fmt = device.format()?;
        fmt.width = config.width;
        fmt.height = config.height;
        fmt.fourcc = match found.format {
            PixelFormat::Mjpeg => FourCC::new(b"MJPG"),
            PixelFormat::Yuyv4 => FourCC::new(b"YUYV"),
        };

        let applied = device.set_format(&fmt)?;
        if applied.width != config.width || applied.height != config.height {
            warn!(
                "Driver adjusted resolution to {}x{} (requested {}x{})",
                applied.width, applied.height, config.width, config.height
            );
        }

        let format = format_from_fourcc(applied.fourcc)?;
        if format != found.format {
            warn!(
                "Driver negotiated {:?} instead of the requested {:?}",
                format, found.format
            );
        }

        set_flip(&device, V4L2_CID_HFLIP, config.hflip, "horizontal");
        set_flip(&device, V4L2_CID_VFLIP, config.vflip, "vertical");

        Ok(Self {
            stream: None,
            device: Box::new(device),
            width: applied.width,
            height: applied.height,
            stride: applied.stride,
            format,
            buffer_count: config.buffer_count,
            jpeg_quality: config.jpeg_quality,
        })
    }

    /// Start streaming with memory-mapped buffers
    pub fn start_stream(&mut self) -> Result<(), SourceError> {
        let stream = MmapStream::with_buffers(&self.device, Type::VideoCapture, self.buffer_count)?;

        self.stream = Some(stream);
        info!("Capture stream started with {} buffers", self.buffer_count);
        Ok(())
    }
}

impl FrameSource for V4l2Capture {
    #[instrument(skip(self), level = "trace")]
    fn next_frame(&mut self) -> Result<Frame, SourceError> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| SourceError::Unsupported("stream not started".into()))?;

        let (buf, meta) = stream.next()?;
        let used = (meta.bytesused as usize).min(buf.len());

        let data = match self.format {
            PixelFormat::Mjpeg => Bytes::copy_from_slice(&buf[..used]),
            PixelFormat::Yuyv4 => {
                let rgb = yuyv_to_rgb(&buf[..used], self.width, self.height, self.stride)?;
                encode_jpeg(&rgb, self.width, self.height, self.jpeg_quality)?
            }
        };

        Ok(Frame { data })
    }
}

fn set_flip(device: &Device, id: u32, enabled: bool, label: &str) {
    let control = Control {
        id,
        value: Value::Boolean(enabled),
    };
    match device.set_control(control) {
        Ok(()) => debug!("{} flip set to {}", label, enabled),
        Err(e) if enabled => warn!("Driver rejected {} flip: {}", label, e),
        Err(_) => {}
    }
}

/// Map the driver's negotiated FourCC onto a format we can forward
pub fn format_from_fourcc(fourcc: FourCC) -> Result<PixelFormat, SourceError> {
    if fourcc == FourCC::new(b"MJPG") {
        Ok(PixelFormat::Mjpeg)
    } else if fourcc == FourCC::new(b"YUYV") {
        Ok(PixelFormat::Yuyv4)
    } else {
        Err(SourceError::Unsupported(format!(
            "driver negotiated pixel format {}",
            fourcc
        )))
    }
}

/// Convert packed YUYV 4:2:2 into RGB24 (BT.601).
///
/// Rows are `stride` bytes apart; a stride below `width * 2` (some drivers
/// report 0) means tightly packed rows.
pub fn yuyv_to_rgb(
    data: &[u8],
    width: u32,
    height: u32,
    stride: u32,
) -> Result<Vec<u8>, SourceError> {
    let row_bytes = width as usize * 2;
    let stride = (stride as usize).max(row_bytes);
    let rows = height as usize;
    let needed = match rows {
        0 => 0,
        n => (n - 1) * stride + row_bytes,
    };
    if data.len() < needed {
        return Err(SourceError::Encode(format!(
            "short YUYV buffer: {} bytes for {}x{} (stride {})",
            data.len(),
            width,
            height,
            stride
        )));
    }

    let mut rgb = Vec::with_capacity(rows * width as usize * 3);
    for row in 0..rows {
        let start = row * stride;
        for chunk in data[start..start + row_bytes].chunks_exact(4) {
            let (y0, u, y1, v) = (chunk[0], chunk[1], chunk[2], chunk[3]);
            for y in [y0, y1] {
                let c = y as f32 - 16.0;
                let d = u as f32 - 128.0;
                let e = v as f32 - 128.0;
                rgb.push((1.164 * c + 1.596 * e).clamp(0.0, 255.0) as u8);
                rgb.push((1.164 * c - 0.392 * d - 0.813 * e).clamp(0.0, 255.0) as u8);
                rgb.push((1.164 * c + 2.017 * d).clamp(0.0, 255.0) as u8);
            }
        }
    }
    Ok(rgb)
}
