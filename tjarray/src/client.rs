use std::ffi::{c_int, c_ulong};
use std::sync::Arc;

use crate::buffer::ContiguityPolicy;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::format::{Colorspace, SubsamplingMode};
use crate::geometry::{HeaderInfo, ScalingCatalog, ScalingFactor};
use crate::handle::{Direction, Handle};
use crate::sys;

/// A libturbojpeg client: one handle per direction plus the codec's scaling table.
///
/// Every operation takes `&mut self`; use one client per thread (the type is `Send`, not `Sync`).
pub struct TurboJpeg {
    pub(crate) decompressor: Handle,
    pub(crate) compressor: Handle,
    pub(crate) transformer: Handle,
    pub(crate) scaling: ScalingCatalog,
    pub(crate) contiguity: ContiguityPolicy,
    api: Arc<sys::TurboJpegApi>,
}

impl TurboJpeg {
    /// Load the library from the default search locations.
    pub fn new() -> Result<Self> {
        Self::with_config(&Config::default())
    }

    pub fn with_config(config: &Config) -> Result<Self> {
        let api = config.library.load()?;
        Self::with_api(api, config.contiguity)
    }

    /// Build a client over an already loaded library.
    pub fn with_api(api: Arc<sys::TurboJpegApi>, contiguity: ContiguityPolicy) -> Result<Self> {
        let scaling = ScalingCatalog::query(&api)?;
        Ok(Self {
            decompressor: Handle::acquire(&api, Direction::Decompress)?,
            compressor: Handle::acquire(&api, Direction::Compress)?,
            transformer: Handle::acquire(&api, Direction::Transform)?,
            scaling,
            contiguity,
            api,
        })
    }

    /// The loaded library, for building further clients.
    pub fn api(&self) -> &Arc<sys::TurboJpegApi> {
        &self.api
    }

    pub fn contiguity(&self) -> ContiguityPolicy {
        self.contiguity
    }

    pub fn scaling_catalog(&self) -> &ScalingCatalog {
        &self.scaling
    }

    /// Scaling factors usable when decoding a stream with `mode`.
    pub fn scaling_factors(&self, mode: Option<SubsamplingMode>) -> &[ScalingFactor] {
        self.scaling.available(mode)
    }

    /// Read dimensions, subsampling and colour space without decoding.
    pub fn read_header(&mut self, jpeg: &[u8]) -> Result<HeaderInfo> {
        let len = stream_len(jpeg)?;
        let (mut width, mut height, mut subsamp, mut colorspace): (c_int, c_int, c_int, c_int) =
            (0, 0, 0, 0);
        let status = unsafe {
            (self.decompressor.api().tjDecompressHeader3)(
                self.decompressor.as_raw(),
                jpeg.as_ptr(),
                len,
                &mut width,
                &mut height,
                &mut subsamp,
                &mut colorspace,
            )
        };
        if status != 0 {
            return Err(Error::MalformedStream(
                self.decompressor.last_error().message,
            ));
        }
        if width <= 0 || height <= 0 {
            return Err(Error::MalformedStream(format!(
                "header reports {width}x{height}"
            )));
        }
        let colorspace = Colorspace::try_from(colorspace)
            .map_err(|_| Error::MalformedStream(format!("unknown colorspace {colorspace}")))?;
        Ok(HeaderInfo {
            width: width as u32,
            height: height as u32,
            subsampling: SubsamplingMode::try_from(subsamp).ok(),
            colorspace,
        })
    }

    /// Worst-case compressed size for an image, as reported by `tjBufSize`.
    pub fn buffer_size(
        &self,
        width: usize,
        height: usize,
        subsampling: SubsamplingMode,
    ) -> Result<usize> {
        let shape = [height, width];
        let size = unsafe {
            (self.api.tjBufSize)(
                crate::buffer::native_int(width, &shape)?,
                crate::buffer::native_int(height, &shape)?,
                subsampling.as_raw(),
            )
        };
        // tjBufSize signals failure with (unsigned long)-1.
        if size == c_ulong::MAX || size == 0 {
            return Err(Error::shape(&shape, "codec cannot size this image"));
        }
        usize::try_from(size).map_err(|_| Error::shape(&shape, "compressed size overflows usize"))
    }
}

/// Checked length of a compressed stream, rejecting input that cannot be a JPEG without asking
/// the codec.
pub(crate) fn stream_len(jpeg: &[u8]) -> Result<c_ulong> {
    if jpeg.len() < 2 || jpeg[0] != 0xFF || jpeg[1] != 0xD8 {
        return Err(Error::MalformedStream(
            "missing start-of-image marker".to_string(),
        ));
    }
    c_ulong::try_from(jpeg.len())
        .map_err(|_| Error::MalformedStream("stream exceeds the codec's size limit".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_must_start_with_soi() {
        for bad in [&[][..], &[0xFF][..], &[0x89, 0x50, 0x4E, 0x47][..], &[0xFF, 0xD9][..]] {
            assert!(matches!(stream_len(bad), Err(Error::MalformedStream(_))));
        }
        assert_eq!(stream_len(&[0xFF, 0xD8, 0xFF]).unwrap(), 3);
    }
}
