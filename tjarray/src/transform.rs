use std::ffi::{c_int, c_uchar, c_ulong};

use bytes::Bytes;
use tracing::trace;

use crate::client::{TurboJpeg, stream_len};
use crate::decoder::DecodeOptions;
use crate::encoder::EncodeOptions;
use crate::error::{Error, Result};
use crate::format::{Colorspace, PixelFormat, SubsamplingMode, TransformOp};
use crate::geometry::{CropRegion, HeaderInfo, ScalingFactor};
use crate::sys;

/// Extra behaviour of a lossless transform, mapped to `TJXOPT_*`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransformOptions {
    /// Fail instead of leaving partial MCUs untransformed at the edges.
    pub perfect: bool,
    /// Drop partial MCUs at the edges that cannot be transformed.
    pub trim: bool,
    /// Keep only the luminance channel.
    pub gray: bool,
    pub progressive: bool,
    /// Do not copy APPn/COM markers from the source.
    pub copy_none: bool,
    /// Check that the transform is possible without producing a stream. The output is empty.
    pub no_output: bool,
}

impl TransformOptions {
    fn bits(self) -> c_int {
        let mut bits = 0;
        if self.perfect {
            bits |= sys::TJXOPT_PERFECT;
        }
        if self.trim {
            bits |= sys::TJXOPT_TRIM;
        }
        if self.gray {
            bits |= sys::TJXOPT_GRAY;
        }
        if self.progressive {
            bits |= sys::TJXOPT_PROGRESSIVE;
        }
        if self.copy_none {
            bits |= sys::TJXOPT_COPYNONE;
        }
        if self.no_output {
            bits |= sys::TJXOPT_NOOUTPUT;
        }
        bits
    }
}

/// One output of `tjTransform`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransformSpec {
    pub op: TransformOp,
    /// Region of the transformed image to keep.
    pub crop: Option<CropRegion>,
    pub options: TransformOptions,
}

impl TransformSpec {
    pub fn crop(region: CropRegion) -> Self {
        Self {
            crop: Some(region),
            ..Self::default()
        }
    }

    pub fn op(op: TransformOp) -> Self {
        Self {
            op,
            ..Self::default()
        }
    }

    fn to_native(self) -> Result<sys::tjtransform> {
        let mut native = sys::tjtransform {
            op: self.op.as_raw(),
            options: self.options.bits(),
            ..sys::tjtransform::default()
        };
        if let Some(region) = self.crop {
            native.r = region.to_native()?;
            native.options |= sys::TJXOPT_CROP;
        }
        Ok(native)
    }
}

/// Frees buffers `tjTransform` allocated, including on the error path.
struct NativeBuffers<'a> {
    api: &'a sys::TurboJpegApi,
    ptrs: Vec<*mut c_uchar>,
}

impl Drop for NativeBuffers<'_> {
    fn drop(&mut self) {
        for ptr in self.ptrs.iter().copied().filter(|p| !p.is_null()) {
            unsafe { (self.api.tjFree)(ptr) };
        }
    }
}

impl TurboJpeg {
    /// Losslessly cut `region` out of `jpeg` without re-encoding.
    pub fn crop(&mut self, jpeg: &[u8], region: CropRegion) -> Result<Bytes> {
        self.transform(jpeg, &TransformSpec::crop(region))
    }

    /// Several lossless crops of the same stream in one pass.
    pub fn crop_multiple(&mut self, jpeg: &[u8], regions: &[CropRegion]) -> Result<Vec<Bytes>> {
        let specs: Vec<_> = regions.iter().copied().map(TransformSpec::crop).collect();
        self.transform_many(jpeg, &specs)
    }

    pub fn transform(&mut self, jpeg: &[u8], spec: &TransformSpec) -> Result<Bytes> {
        let mut outputs = self.transform_many(jpeg, std::slice::from_ref(spec))?;
        outputs
            .pop()
            .ok_or_else(|| Error::MalformedStream("transform produced no output".to_string()))
    }

    /// Apply each spec to `jpeg`, returning one stream per spec. Either all succeed or none do.
    pub fn transform_many(&mut self, jpeg: &[u8], specs: &[TransformSpec]) -> Result<Vec<Bytes>> {
        if specs.is_empty() {
            return Ok(Vec::new());
        }
        let len = stream_len(jpeg)?;
        let header = self.read_header(jpeg)?;
        let mut natives = Vec::with_capacity(specs.len());
        for spec in specs {
            if let Some(region) = spec.crop {
                let output = if spec.options.gray {
                    Some(SubsamplingMode::Gray)
                } else {
                    header.subsampling
                };
                region.validate_against(&header, spec.op, output)?;
            }
            natives.push(spec.to_native()?);
        }
        let count = c_int::try_from(specs.len())
            .map_err(|_| Error::shape(&[specs.len()], "too many transforms for one call"))?;

        let mut buffers = NativeBuffers {
            api: self.transformer.api(),
            ptrs: vec![std::ptr::null_mut(); specs.len()],
        };
        let mut sizes: Vec<c_ulong> = vec![0; specs.len()];
        trace!(count, width = header.width, height = header.height, "tjTransform");
        let status = unsafe {
            (buffers.api.tjTransform)(
                self.transformer.as_raw(),
                jpeg.as_ptr(),
                len,
                count,
                buffers.ptrs.as_mut_ptr(),
                sizes.as_mut_ptr(),
                natives.as_mut_ptr(),
                0,
            )
        };
        self.transformer.check(status, false, Error::Transform)?;

        let outputs = buffers
            .ptrs
            .iter()
            .zip(&sizes)
            .map(|(&ptr, &size)| {
                if ptr.is_null() {
                    return Bytes::new();
                }
                // SAFETY: tjTransform allocated `size` bytes at `ptr`; freed when `buffers` drops.
                Bytes::copy_from_slice(unsafe { std::slice::from_raw_parts(ptr, size as usize) })
            })
            .collect();
        Ok(outputs)
    }

    /// Decode at `factor` and re-encode at `quality`, keeping the source's subsampling.
    pub fn rescale(&mut self, jpeg: &[u8], factor: ScalingFactor, quality: i32) -> Result<Bytes> {
        let header = self.read_header(jpeg)?;
        let pixel_format = rescale_format(&header);
        let encode = EncodeOptions::new(
            quality,
            pixel_format,
            header.subsampling.unwrap_or(SubsamplingMode::S444),
        );
        encode.validate()?;

        let image = self
            .decode(jpeg, &DecodeOptions::new(pixel_format).scaling(factor))?
            .into_owned();
        self.encode(image.array(), &encode)
    }
}

/// Pixel format that carries every component of the source through a decode.
fn rescale_format(header: &HeaderInfo) -> PixelFormat {
    match (header.colorspace, header.subsampling) {
        (Colorspace::Cmyk | Colorspace::Ycck, _) => PixelFormat::Cmyk,
        (_, Some(SubsamplingMode::Gray)) => PixelFormat::Gray,
        _ => PixelFormat::Rgb,
    }
}
