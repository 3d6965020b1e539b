//! Safe Rust bindings for [`libjpeg-turbo`](https://libjpeg-turbo.org)'s TurboJPEG API,
//! built around strided `ndarray` pixel buffers.
//!
//! The library is loaded at runtime, so nothing is linked at build time. A single
//! [`TurboJpeg`] owns one native handle per direction and exposes:
//! - [`TurboJpeg::decode`] / [`TurboJpeg::decode_into`] to turn a JPEG stream into a
//!   `(height, width, channels)` `u8` array, optionally downscaled by a supported
//!   [`ScalingFactor`].
//! - [`TurboJpeg::encode`] / [`TurboJpeg::encode_into`] to compress any [`PixelSource`].
//! - [`TurboJpeg::crop`], [`TurboJpeg::crop_multiple`] and [`TurboJpeg::transform`] for
//!   lossless, MCU-aligned operations that never touch pixel data.
//!
//! Outputs are either [`ImageBuffer::Owned`]/[`Compressed::Owned`] when the crate
//! allocated them, or borrow the caller's buffer when one was supplied.
//!
//! ```no_run
//! use tjarray::{DecodeOptions, EncodeOptions, TurboJpeg};
//!
//! # fn main() -> tjarray::Result<()> {
//! let mut tj = TurboJpeg::new()?;
//! let jpeg = std::fs::read("input.jpg").unwrap();
//! let image = tj.decode(&jpeg, &DecodeOptions::default())?.into_owned();
//! let again = tj.encode(image.array(), &EncodeOptions::default())?;
//! # let _ = again;
//! # Ok(())
//! # }
//! ```

/// Raw function table for the TurboJPEG C API. Most users should favor the safe wrappers
/// re-exported from this crate.
pub use tjarray_sys as sys;

mod buffer;
mod client;
mod config;
mod decoder;
mod encoder;
mod error;
mod format;
mod geometry;
mod handle;
mod transform;

pub use buffer::{
    BorrowedImage, BufferLayout, Compressed, ContiguityPolicy, DType, Element, ImageBuffer,
    ImageView, ImageViewMut, OwnedImage, PixelSink, PixelSource,
};
pub use client::TurboJpeg;
pub use config::{Config, LIBRARY_ENV, LibrarySource};
pub use decoder::{DecodeFlags, DecodeOptions};
pub use encoder::{EncodeFlags, EncodeOptions};
pub use error::{Error, NativeError, Result, Severity};
pub use format::{
    Colorspace, PixelFormat, SubsamplingMode, TransformOp, validate_pixel_format,
    validate_subsampling,
};
pub use geometry::{
    CropRegion, HeaderInfo, ParseScalingFactorError, ScaledGeometry, ScalingCatalog,
    ScalingFactor,
};
pub use handle::Direction;
pub use transform::{TransformOptions, TransformSpec};
