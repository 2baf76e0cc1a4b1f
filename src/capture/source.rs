//! Seams between the capture loop and whatever produces frames

use crate::capture::{Frame, PatternProvider, V4l2Provider};
use crate::{CaptureConfig, SourceError, SourceKind};

/// An opened, exclusively owned frame source.
///
/// Resources are released when the value is dropped.
pub trait FrameSource {
    /// Block until the next frame is available
    fn next_frame(&mut self) -> Result<Frame, SourceError>;
}

/// Opens and configures a [`FrameSource`] for one generation
pub trait SourceProvider {
    fn open(&self, config: &CaptureConfig) -> Result<Box<dyn FrameSource>, SourceError>;
}

impl<F: FrameSource + ?Sized> FrameSource for Box<F> {
    fn next_frame(&mut self) -> Result<Frame, SourceError> {
        (**self).next_frame()
    }
}

/// Picks the provider named by `capture.source`
#[derive(Debug, Default, Clone, Copy)]
pub struct DeviceSources;

impl SourceProvider for DeviceSources {
    fn open(&self, config: &CaptureConfig) -> Result<Box<dyn FrameSource>, SourceError> {
        match config.source {
            SourceKind::V4l2 => V4l2Provider.open(config),
            SourceKind::Pattern => PatternProvider.open(config),
        }
    }
}
