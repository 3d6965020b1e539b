//! Header metadata, decode-time scaling and crop-region validation.

use std::ffi::c_int;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::format::{Colorspace, SubsamplingMode, TransformOp};
use crate::handle::Direction;
use crate::sys;

/// What `tjDecompressHeader3` reports about a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderInfo {
    pub width: u32,
    pub height: u32,
    /// `None` when the stream uses a sampling layout libjpeg-turbo cannot classify.
    pub subsampling: Option<SubsamplingMode>,
    pub colorspace: Colorspace,
}

impl HeaderInfo {
    /// MCU size of the stream, if its subsampling is known.
    pub fn mcu_size(&self) -> Option<(u32, u32)> {
        self.subsampling.map(SubsamplingMode::mcu_size)
    }
}

/// A rational shrink ratio applied while decompressing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScalingFactor {
    pub num: u32,
    pub denom: u32,
}

impl ScalingFactor {
    pub const UNSCALED: Self = Self::new(1, 1);

    pub const fn new(num: u32, denom: u32) -> Self {
        Self { num, denom }
    }

    /// Scaled size of one dimension, rounded up the way `TJSCALED` does.
    pub fn scale(self, dim: u32) -> u32 {
        let num = u64::from(self.num);
        let denom = u64::from(self.denom.max(1));
        ((u64::from(dim) * num + denom - 1) / denom) as u32
    }

    /// Whether both factors denote the same ratio, e.g. `2/4` and `1/2`.
    pub fn same_ratio(self, other: Self) -> bool {
        self.denom != 0
            && other.denom != 0
            && u64::from(self.num) * u64::from(other.denom)
                == u64::from(other.num) * u64::from(self.denom)
    }
}

impl fmt::Display for ScalingFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.denom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("expected a scaling factor like `1/2`, got `{0}`")]
pub struct ParseScalingFactorError(String);

impl FromStr for ScalingFactor {
    type Err = ParseScalingFactorError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let err = || ParseScalingFactorError(s.to_string());
        let (num, denom) = s.split_once('/').ok_or_else(err)?;
        let num = num.trim().parse().map_err(|_| err())?;
        let denom: u32 = denom.trim().parse().map_err(|_| err())?;
        if num == 0 || denom == 0 {
            return Err(err());
        }
        Ok(Self::new(num, denom))
    }
}

/// Output size chosen for a decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScaledGeometry {
    pub width: u32,
    pub height: u32,
    pub factor: ScalingFactor,
}

/// Scaling factors the loaded codec supports, queried once per client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScalingCatalog {
    factors: Vec<ScalingFactor>,
}

impl ScalingCatalog {
    pub fn new(factors: Vec<ScalingFactor>) -> Self {
        Self { factors }
    }

    pub(crate) fn query(api: &sys::TurboJpegApi) -> Result<Self> {
        let mut count: c_int = 0;
        // SAFETY: returns a pointer to a static table of `count` entries, or null.
        let ptr = unsafe { (api.tjGetScalingFactors)(&mut count) };
        let raw = if ptr.is_null() || count <= 0 {
            &[][..]
        } else {
            // SAFETY: non-null and `count` entries long per the call above.
            unsafe { std::slice::from_raw_parts(ptr, count as usize) }
        };
        Self::from_native(raw)
    }

    fn from_native(raw: &[sys::tjscalingfactor]) -> Result<Self> {
        let factors: Vec<_> = raw
            .iter()
            .filter(|sf| sf.num > 0 && sf.denom > 0)
            .map(|sf| ScalingFactor::new(sf.num as u32, sf.denom as u32))
            .collect();
        if factors.is_empty() {
            return Err(Error::Initialization {
                direction: Direction::Decompress,
                message: "codec reported no scaling factors".to_string(),
            });
        }
        Ok(Self { factors })
    }

    /// Factors available for streams with the given subsampling.
    ///
    /// libjpeg-turbo reports a single table for every mode, so the mode only matters for
    /// streams it cannot classify (`None`), which get the same table.
    pub fn available(&self, _mode: Option<SubsamplingMode>) -> &[ScalingFactor] {
        &self.factors
    }

    /// Rejects factors outside the catalog; `None` always passes.
    pub fn check(
        &self,
        mode: Option<SubsamplingMode>,
        requested: Option<ScalingFactor>,
    ) -> Result<ScalingFactor> {
        let Some(requested) = requested else {
            return Ok(ScalingFactor::UNSCALED);
        };
        let available = self.available(mode);
        available
            .iter()
            .copied()
            .find(|sf| sf.same_ratio(requested))
            .ok_or_else(|| Error::UnsupportedScalingFactor {
                requested,
                available: available.to_vec(),
            })
    }

    pub fn resolve(
        &self,
        width: u32,
        height: u32,
        mode: Option<SubsamplingMode>,
        requested: Option<ScalingFactor>,
    ) -> Result<ScaledGeometry> {
        let factor = self.check(mode, requested)?;
        Ok(ScaledGeometry {
            width: factor.scale(width),
            height: factor.scale(height),
            factor,
        })
    }
}

/// A rectangle in pixel coordinates of the (transformed) image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CropRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRegion {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Check the region against a stream for a lossless crop.
    ///
    /// The region is relative to the image after `op` has been applied, so axis-swapping ops
    /// swap both the image size and the MCU grid. Width and height must be whole MCUs unless the
    /// region runs to the right or bottom edge.
    pub fn validate(&self, header: &HeaderInfo, op: TransformOp) -> Result<()> {
        self.validate_against(header, op, header.subsampling)
    }

    /// Like [`validate`](Self::validate), but aligned to the MCU grid of `subsampling`, the
    /// layout the output is written with. Gray output uses the 8x8 grid whatever the source.
    pub fn validate_against(
        &self,
        header: &HeaderInfo,
        op: TransformOp,
        subsampling: Option<SubsamplingMode>,
    ) -> Result<()> {
        let (mut image_width, mut image_height) = (header.width, header.height);
        if op.swaps_axes() {
            std::mem::swap(&mut image_width, &mut image_height);
        }

        let right = u64::from(self.x) + u64::from(self.width);
        let bottom = u64::from(self.y) + u64::from(self.height);
        if self.width == 0
            || self.height == 0
            || right > u64::from(image_width)
            || bottom > u64::from(image_height)
        {
            return Err(Error::CropOutOfBounds {
                region: *self,
                image_width,
                image_height,
            });
        }

        let (mut mcu_width, mut mcu_height) =
            subsampling.map(SubsamplingMode::mcu_size).ok_or_else(|| {
                Error::MalformedStream("cannot crop a stream with unknown subsampling".to_string())
            })?;
        if op.swaps_axes() {
            std::mem::swap(&mut mcu_width, &mut mcu_height);
        }

        let width_ok = self.width % mcu_width == 0 || right == u64::from(image_width);
        let height_ok = self.height % mcu_height == 0 || bottom == u64::from(image_height);
        if self.x % mcu_width != 0 || self.y % mcu_height != 0 || !width_ok || !height_ok {
            return Err(Error::InvalidCropAlignment {
                region: *self,
                mcu_width,
                mcu_height,
            });
        }
        Ok(())
    }

    pub(crate) fn to_native(self) -> Result<sys::tjregion> {
        let field = |v: u32| {
            c_int::try_from(v).map_err(|_| Error::CropOutOfBounds {
                region: self,
                image_width: c_int::MAX as u32,
                image_height: c_int::MAX as u32,
            })
        };
        Ok(sys::tjregion {
            x: field(self.x)?,
            y: field(self.y)?,
            w: field(self.width)?,
            h: field(self.height)?,
        })
    }
}

impl fmt::Display for CropRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}+{}+{}", self.width, self.height, self.x, self.y)
    }
}
