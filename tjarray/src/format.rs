//! Pixel formats, chrominance subsampling modes, colour spaces and lossless transform ops.
//!
//! The native API takes plain integers for all of these. Inside the crate they are closed
//! enums; raw integers coming from outside go through `TryFrom<i32>`, which rejects unknown
//! codes instead of letting them index the native lookup tables.

use std::ffi::c_int;
use std::fmt;

use crate::error::{Error, Result};
use crate::sys;

macro_rules! native_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $kind:literal {
            $($(#[$vmeta:meta])* $variant:ident = $code:path => $label:literal,)*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(i32)]
        pub enum $name {
            $($(#[$vmeta])* $variant = $code,)*
        }

        impl $name {
            /// Every variant, in native code order.
            pub const ALL: &'static [$name] = &[$($name::$variant,)*];

            /// Native integer code.
            pub const fn as_raw(self) -> c_int {
                self as c_int
            }

            pub const fn name(self) -> &'static str {
                match self {
                    $($name::$variant => $label,)*
                }
            }
        }

        impl TryFrom<i32> for $name {
            type Error = Error;

            fn try_from(value: i32) -> Result<Self> {
                match value {
                    $(v if v == $code => Ok($name::$variant),)*
                    _ => Err(Error::InvalidFormat { kind: $kind, value }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.name())
            }
        }
    };
}

native_enum! {
    /// Channel order of an uncompressed pixel buffer.
    PixelFormat, "pixel format" {
        Rgb = sys::TJPF_RGB => "RGB",
        Bgr = sys::TJPF_BGR => "BGR",
        /// RGB with an unused fourth byte.
        Rgbx = sys::TJPF_RGBX => "RGBX",
        Bgrx = sys::TJPF_BGRX => "BGRX",
        Xbgr = sys::TJPF_XBGR => "XBGR",
        Xrgb = sys::TJPF_XRGB => "XRGB",
        Gray = sys::TJPF_GRAY => "GRAY",
        /// Like `Rgbx`, but the fourth byte is filled with 0xFF on decode.
        Rgba = sys::TJPF_RGBA => "RGBA",
        Bgra = sys::TJPF_BGRA => "BGRA",
        Abgr = sys::TJPF_ABGR => "ABGR",
        Argb = sys::TJPF_ARGB => "ARGB",
        /// Only valid for JPEGs stored as CMYK or YCCK.
        Cmyk = sys::TJPF_CMYK => "CMYK",
    }
}

impl PixelFormat {
    /// Bytes per pixel. Never zero.
    pub const fn channel_count(self) -> usize {
        sys::tjPixelSize[self as usize] as usize
    }
}

native_enum! {
    /// Chrominance subsampling of a JPEG stream.
    SubsamplingMode, "subsampling mode" {
        S444 = sys::TJSAMP_444 => "4:4:4",
        S422 = sys::TJSAMP_422 => "4:2:2",
        S420 = sys::TJSAMP_420 => "4:2:0",
        /// Luminance only.
        Gray = sys::TJSAMP_GRAY => "gray",
        S440 = sys::TJSAMP_440 => "4:4:0",
        S411 = sys::TJSAMP_411 => "4:1:1",
        S441 = sys::TJSAMP_441 => "4:4:1",
    }
}

impl SubsamplingMode {
    /// Size of the minimum coded unit in pixels, `(width, height)`.
    pub const fn mcu_size(self) -> (u32, u32) {
        (
            sys::tjMCUWidth[self as usize] as u32,
            sys::tjMCUHeight[self as usize] as u32,
        )
    }
}

native_enum! {
    /// Colour space a JPEG stream was stored in.
    Colorspace, "colorspace" {
        Rgb = sys::TJCS_RGB => "RGB",
        YCbCr = sys::TJCS_YCbCr => "YCbCr",
        Gray = sys::TJCS_GRAY => "gray",
        Cmyk = sys::TJCS_CMYK => "CMYK",
        Ycck = sys::TJCS_YCCK => "YCCK",
    }
}

native_enum! {
    /// Lossless block-level transform applied by `tjTransform`.
    #[derive(Default)]
    TransformOp, "transform op" {
        #[default]
        None = sys::TJXOP_NONE => "none",
        HFlip = sys::TJXOP_HFLIP => "hflip",
        VFlip = sys::TJXOP_VFLIP => "vflip",
        Transpose = sys::TJXOP_TRANSPOSE => "transpose",
        Transverse = sys::TJXOP_TRANSVERSE => "transverse",
        Rot90 = sys::TJXOP_ROT90 => "rot90",
        Rot180 = sys::TJXOP_ROT180 => "rot180",
        Rot270 = sys::TJXOP_ROT270 => "rot270",
    }
}

impl TransformOp {
    /// Whether the op exchanges the image's width and height.
    pub const fn swaps_axes(self) -> bool {
        matches!(
            self,
            Self::Transpose | Self::Transverse | Self::Rot90 | Self::Rot270
        )
    }
}

pub fn validate_pixel_format(value: i32) -> bool {
    PixelFormat::try_from(value).is_ok()
}

pub fn validate_subsampling(value: i32) -> bool {
    SubsamplingMode::try_from(value).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_counts_are_fixed_and_non_zero() {
        let counts: Vec<usize> = PixelFormat::ALL.iter().map(|f| f.channel_count()).collect();
        assert_eq!(counts, [3, 3, 4, 4, 4, 4, 1, 4, 4, 4, 4, 4]);
        assert_eq!(PixelFormat::ALL.len(), sys::TJ_NUMPF as usize);
    }

    #[test]
    fn raw_codes_round_trip() {
        for &fmt in PixelFormat::ALL {
            assert_eq!(PixelFormat::try_from(fmt.as_raw()).unwrap(), fmt);
        }
        for &mode in SubsamplingMode::ALL {
            assert_eq!(SubsamplingMode::try_from(mode.as_raw()).unwrap(), mode);
        }
        for &cs in Colorspace::ALL {
            assert_eq!(Colorspace::try_from(cs.as_raw()).unwrap(), cs);
        }
    }

    #[test]
    fn unknown_codes_are_rejected() {
        for value in [-1, 12, 255, i32::MAX] {
            assert!(!validate_pixel_format(value));
        }
        assert!(!validate_subsampling(sys::TJSAMP_UNKNOWN));
        assert!(!validate_subsampling(7));
        assert!(validate_subsampling(sys::TJSAMP_441));

        let err = PixelFormat::try_from(42).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidFormat {
                kind: "pixel format",
                value: 42
            }
        ));
        assert!(matches!(
            TransformOp::try_from(8),
            Err(Error::InvalidFormat { kind: "transform op", .. })
        ));
    }

    #[test]
    fn mcu_sizes_follow_subsampling() {
        assert_eq!(SubsamplingMode::S444.mcu_size(), (8, 8));
        assert_eq!(SubsamplingMode::S422.mcu_size(), (16, 8));
        assert_eq!(SubsamplingMode::S420.mcu_size(), (16, 16));
        assert_eq!(SubsamplingMode::Gray.mcu_size(), (8, 8));
        assert_eq!(SubsamplingMode::S440.mcu_size(), (8, 16));
        assert_eq!(SubsamplingMode::S411.mcu_size(), (32, 8));
        assert_eq!(SubsamplingMode::S441.mcu_size(), (8, 32));
    }

    #[test]
    fn axis_swapping_ops() {
        let swapping: Vec<_> = TransformOp::ALL
            .iter()
            .filter(|op| op.swaps_axes())
            .map(|op| op.name())
            .collect();
        assert_eq!(swapping, ["transpose", "transverse", "rot90", "rot270"]);
        assert_eq!(TransformOp::default(), TransformOp::None);
    }
}
