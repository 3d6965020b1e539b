use std::ffi::c_int;

use tracing::trace;

use crate::buffer::{self, ImageBuffer, PixelSink};
use crate::client::{TurboJpeg, stream_len};
use crate::error::{Error, Result};
use crate::format::PixelFormat;
use crate::geometry::ScalingFactor;
use crate::sys;

/// Decoder speed/accuracy trade-offs, mapped to `TJFLAG_*`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeFlags {
    /// Nearest-neighbour chroma upsampling instead of fancy upsampling.
    pub fast_upsample: bool,
    pub fast_dct: bool,
    pub accurate_dct: bool,
    /// Write the image bottom row first.
    pub bottom_up: bool,
    /// Fail progressive streams with more than 500 scans.
    pub limit_scans: bool,
}

impl DecodeFlags {
    pub(crate) fn bits(self) -> c_int {
        let mut bits = 0;
        if self.fast_upsample {
            bits |= sys::TJFLAG_FASTUPSAMPLE;
        }
        if self.fast_dct {
            bits |= sys::TJFLAG_FASTDCT;
        }
        if self.accurate_dct {
            bits |= sys::TJFLAG_ACCURATEDCT;
        }
        if self.bottom_up {
            bits |= sys::TJFLAG_BOTTOMUP;
        }
        if self.limit_scans {
            bits |= sys::TJFLAG_LIMITSCANS;
        }
        bits
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOptions {
    pub pixel_format: PixelFormat,
    /// `None` decodes at full size.
    pub scaling: Option<ScalingFactor>,
    pub flags: DecodeFlags,
    /// Fail on recoverable stream damage instead of logging it.
    pub stop_on_warning: bool,
}

impl DecodeOptions {
    pub fn new(pixel_format: PixelFormat) -> Self {
        Self {
            pixel_format,
            scaling: None,
            flags: DecodeFlags::default(),
            stop_on_warning: false,
        }
    }

    pub fn scaling(mut self, factor: ScalingFactor) -> Self {
        self.scaling = Some(factor);
        self
    }

    pub fn flags(mut self, flags: DecodeFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn stop_on_warning(mut self, enable: bool) -> Self {
        self.stop_on_warning = enable;
        self
    }
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self::new(PixelFormat::Rgb)
    }
}

impl TurboJpeg {
    /// Decode into a newly allocated array owned by the result.
    pub fn decode(&mut self, jpeg: &[u8], opts: &DecodeOptions) -> Result<ImageBuffer<'static>> {
        self.decode_with(jpeg, opts, None)
    }

    /// Decode into caller memory. `dst` must already have the output shape
    /// `(height, width, channels)` for the chosen pixel format and scaling factor.
    pub fn decode_into<'a>(
        &mut self,
        jpeg: &[u8],
        opts: &DecodeOptions,
        dst: &'a mut dyn PixelSink,
    ) -> Result<ImageBuffer<'a>> {
        self.decode_with(jpeg, opts, Some(dst))
    }

    fn decode_with<'a>(
        &mut self,
        jpeg: &[u8],
        opts: &DecodeOptions,
        dst: Option<&'a mut dyn PixelSink>,
    ) -> Result<ImageBuffer<'a>> {
        // The scaling table does not depend on the stream, so an unsupported factor is rejected
        // before the codec sees any input.
        self.scaling.check(None, opts.scaling)?;
        let len = stream_len(jpeg)?;
        let header = self.read_header(jpeg)?;
        let geometry =
            self.scaling
                .resolve(header.width, header.height, header.subsampling, opts.scaling)?;
        let mut target = buffer::plan_destination(
            geometry.width,
            geometry.height,
            opts.pixel_format,
            dst,
            self.contiguity,
        )?;

        let shape = [
            geometry.height as usize,
            geometry.width as usize,
            opts.pixel_format.channel_count(),
        ];
        let width = buffer::native_int(geometry.width as usize, &shape)?;
        let height = buffer::native_int(geometry.height as usize, &shape)?;
        let pitch = buffer::native_int(target.pitch(), &shape)?;
        let mut flags = opts.flags.bits();
        if opts.stop_on_warning {
            flags |= sys::TJFLAG_STOPONWARNING;
        }

        trace!(
            width,
            height,
            pitch,
            format = %opts.pixel_format,
            factor = %geometry.factor,
            owned = target.is_owned(),
            "tjDecompress2"
        );
        let status = unsafe {
            (self.decompressor.api().tjDecompress2)(
                self.decompressor.as_raw(),
                jpeg.as_ptr(),
                len,
                target.as_mut_ptr(),
                width,
                pitch,
                height,
                opts.pixel_format.as_raw(),
                flags,
            )
        };
        self.decompressor
            .check(status, opts.stop_on_warning, Error::Decode)?;
        // SAFETY: tjDecompress2 succeeded, so every row of the planned geometry was written.
        unsafe { target.finish() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_bits() {
        assert_eq!(DecodeFlags::default().bits(), 0);
        let flags = DecodeFlags {
            fast_upsample: true,
            fast_dct: true,
            accurate_dct: false,
            bottom_up: true,
            limit_scans: false,
        };
        assert_eq!(
            flags.bits(),
            sys::TJFLAG_FASTUPSAMPLE | sys::TJFLAG_FASTDCT | sys::TJFLAG_BOTTOMUP
        );
        let limited = DecodeFlags {
            limit_scans: true,
            ..DecodeFlags::default()
        };
        assert_eq!(limited.bits(), sys::TJFLAG_LIMITSCANS);
    }

    #[test]
    fn options_builder() {
        let opts = DecodeOptions::new(PixelFormat::Bgr)
            .scaling(ScalingFactor::new(1, 2))
            .stop_on_warning(true);
        assert_eq!(opts.pixel_format, PixelFormat::Bgr);
        assert_eq!(opts.scaling, Some(ScalingFactor::new(1, 2)));
        assert!(opts.stop_on_warning);
        assert_eq!(DecodeOptions::default().pixel_format, PixelFormat::Rgb);
    }
}
