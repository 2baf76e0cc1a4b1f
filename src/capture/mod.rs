pub mod capture_loop;
pub mod frame;
pub mod pattern;
pub mod source;
pub mod v4l2;

pub use capture_loop::{CaptureLoop, CaptureReport, StopReason};
pub use frame::Frame;
pub use frame::PixelFormat;
pub use pattern::PatternProvider;
pub use source::{DeviceSources, FrameSource, SourceProvider};
pub use v4l2::{V4l2Capture, V4l2Provider};
