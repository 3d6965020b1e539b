use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::buffer::DType;
use crate::geometry::{CropRegion, ScalingFactor};
use crate::handle::Direction;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// How serious a failure reported by `libturbojpeg` was.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The operation completed but the stream was suspect (corrupt data, premature end).
    Warning,
    /// The operation could not complete.
    Fatal,
}

/// Diagnostic captured from a handle right after a native call failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeError {
    /// Text from `tjGetErrorStr2`, verbatim.
    pub message: String,
    pub severity: Severity,
}

impl fmt::Display for NativeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Error produced by the safe wrappers around `libturbojpeg`.
///
/// Everything except [`Error::LibraryLoad`], [`Error::Initialization`], [`Error::MalformedStream`]
/// and the three native-failure variants is raised before any codec work starts.
#[derive(Debug, Error)]
pub enum Error {
    #[error("could not load libturbojpeg (tried {tried:?}): {message}")]
    LibraryLoad { tried: Vec<PathBuf>, message: String },

    #[error("failed to create {direction} handle: {message}")]
    Initialization { direction: Direction, message: String },

    #[error("invalid {kind} value {value}")]
    InvalidFormat { kind: &'static str, value: i32 },

    #[error("quality {0} is outside 1..=100")]
    InvalidQuality(i32),

    #[error("scaling factor {requested} is not supported (available: {available:?})")]
    UnsupportedScalingFactor {
        requested: ScalingFactor,
        available: Vec<ScalingFactor>,
    },

    #[error("crop region {region} is not aligned to the {mcu_width}x{mcu_height} MCU grid")]
    InvalidCropAlignment {
        region: CropRegion,
        mcu_width: u32,
        mcu_height: u32,
    },

    #[error("crop region {region} does not fit in a {image_width}x{image_height} image")]
    CropOutOfBounds {
        region: CropRegion,
        image_width: u32,
        image_height: u32,
    },

    #[error("{what}: expected {expected}, got {actual}")]
    BufferSizeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("unsupported buffer shape {shape:?}: {reason}")]
    Shape { shape: Vec<usize>, reason: String },

    #[error("unsupported element type {0}, expected u8")]
    UnsupportedDtype(DType),

    #[error("buffer with strides {strides:?} cannot be read as packed rows")]
    NonContiguousBuffer { strides: Vec<isize> },

    #[error("malformed JPEG stream: {0}")]
    MalformedStream(String),

    #[error("decompression failed: {0}")]
    Decode(NativeError),

    #[error("compression failed: {0}")]
    Encode(NativeError),

    #[error("lossless transform failed: {0}")]
    Transform(NativeError),
}

impl Error {
    pub(crate) fn shape(shape: &[usize], reason: impl Into<String>) -> Self {
        Self::Shape {
            shape: shape.to_vec(),
            reason: reason.into(),
        }
    }

    /// The native diagnostic, when the failure came from the codec itself.
    pub fn native(&self) -> Option<&NativeError> {
        match self {
            Self::Decode(err) | Self::Encode(err) | Self::Transform(err) => Some(err),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_message_is_carried_verbatim() {
        let err = Error::Decode(NativeError {
            message: "Premature end of JPEG file".into(),
            severity: Severity::Fatal,
        });
        assert_eq!(
            err.to_string(),
            "decompression failed: Premature end of JPEG file"
        );
        assert_eq!(err.native().map(|e| e.severity), Some(Severity::Fatal));
        assert!(Error::InvalidQuality(0).native().is_none());
    }

    #[test]
    fn crop_errors_name_the_region() {
        let err = Error::InvalidCropAlignment {
            region: CropRegion::new(5, 5, 64, 64),
            mcu_width: 16,
            mcu_height: 16,
        };
        assert_eq!(
            err.to_string(),
            "crop region 64x64+5+5 is not aligned to the 16x16 MCU grid"
        );
    }
}
