use std::ffi::{c_int, c_ulong};

use bytes::Bytes;
use tracing::trace;

use crate::buffer::{self, Compressed, OutputBuffer, PixelSource};
use crate::client::TurboJpeg;
use crate::error::{Error, Result};
use crate::format::{PixelFormat, SubsamplingMode};
use crate::sys;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncodeFlags {
    /// Emit a progressive JPEG.
    pub progressive: bool,
    pub fast_dct: bool,
    pub accurate_dct: bool,
    /// Source rows are stored bottom row first.
    pub bottom_up: bool,
}

impl EncodeFlags {
    pub(crate) fn bits(self) -> c_int {
        let mut bits = 0;
        if self.progressive {
            bits |= sys::TJFLAG_PROGRESSIVE;
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
        bits
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeOptions {
    /// 1 (worst) to 100 (best).
    pub quality: i32,
    pub pixel_format: PixelFormat,
    pub subsampling: SubsamplingMode,
    pub flags: EncodeFlags,
}

impl EncodeOptions {
    pub fn new(quality: i32, pixel_format: PixelFormat, subsampling: SubsamplingMode) -> Self {
        Self {
            quality,
            pixel_format,
            subsampling,
            flags: EncodeFlags::default(),
        }
    }

    pub fn flags(mut self, flags: EncodeFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=100).contains(&self.quality) {
            return Err(Error::InvalidQuality(self.quality));
        }
        Ok(())
    }
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self::new(85, PixelFormat::Rgb, SubsamplingMode::S420)
    }
}

impl TurboJpeg {
    /// Compress `src` into newly allocated bytes of exactly the compressed length.
    pub fn encode(&mut self, src: &dyn PixelSource, opts: &EncodeOptions) -> Result<Bytes> {
        self.encode_with(src, opts, None).map(Compressed::into_bytes)
    }

    /// Compress `src` into `dst`, which must hold at least [`TurboJpeg::buffer_size`] bytes.
    /// The result borrows the written prefix of `dst`.
    pub fn encode_into<'a>(
        &mut self,
        src: &dyn PixelSource,
        opts: &EncodeOptions,
        dst: &'a mut [u8],
    ) -> Result<Compressed<'a>> {
        self.encode_with(src, opts, Some(dst))
    }

    fn encode_with<'a>(
        &mut self,
        src: &dyn PixelSource,
        opts: &EncodeOptions,
        dst: Option<&'a mut [u8]>,
    ) -> Result<Compressed<'a>> {
        opts.validate()?;
        let source = buffer::resolve_source(src, opts.pixel_format, self.contiguity)?;
        let max_size = self.buffer_size(source.width, source.height, opts.subsampling)?;
        let mut out = buffer::plan_output(dst, max_size)?;
        let len = self.compress(&source, opts, &mut out)?;
        // SAFETY: compress wrote `len <= capacity` bytes into `out`.
        Ok(unsafe { out.finish(len) })
    }

    fn compress(
        &mut self,
        source: &buffer::SourceImage<'_>,
        opts: &EncodeOptions,
        out: &mut OutputBuffer<'_>,
    ) -> Result<usize> {
        let shape = [
            source.height,
            source.width,
            opts.pixel_format.channel_count(),
        ];
        let width = buffer::native_int(source.width, &shape)?;
        let height = buffer::native_int(source.height, &shape)?;
        let pitch = buffer::native_int(source.pitch, &shape)?;
        let mut jpeg_buf = out.as_mut_ptr();
        let mut jpeg_size: c_ulong = 0;

        trace!(
            width,
            height,
            pitch,
            quality = opts.quality,
            format = %opts.pixel_format,
            subsampling = %opts.subsampling,
            copied = source.is_copied(),
            "tjCompress2"
        );
        // NOREALLOC: the codec writes into `out`, which holds at least tjBufSize bytes.
        let status = unsafe {
            (self.compressor.api().tjCompress2)(
                self.compressor.as_raw(),
                source.as_ptr(),
                width,
                pitch,
                height,
                opts.pixel_format.as_raw(),
                &mut jpeg_buf,
                &mut jpeg_size,
                opts.subsampling.as_raw(),
                opts.quality,
                opts.flags.bits() | sys::TJFLAG_NOREALLOC,
            )
        };
        self.compressor.check(status, false, Error::Encode)?;

        let len = usize::try_from(jpeg_size).unwrap_or(usize::MAX);
        if len > out.capacity() {
            return Err(Error::BufferSizeMismatch {
                what: "compressed size",
                expected: out.capacity(),
                actual: len,
            });
        }
        Ok(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_bounds() {
        for quality in [0, 101, -5, i32::MAX] {
            let opts = EncodeOptions::new(quality, PixelFormat::Rgb, SubsamplingMode::S444);
            assert!(matches!(opts.validate(), Err(Error::InvalidQuality(q)) if q == quality));
        }
        for quality in [1, 50, 100] {
            EncodeOptions::new(quality, PixelFormat::Rgb, SubsamplingMode::S444)
                .validate()
                .unwrap();
        }
    }

    #[test]
    fn flag_bits() {
        let flags = EncodeFlags {
            progressive: true,
            accurate_dct: true,
            ..EncodeFlags::default()
        };
        assert_eq!(
            flags.bits(),
            sys::TJFLAG_PROGRESSIVE | sys::TJFLAG_ACCURATEDCT
        );
    }
}
