//! Raw bindings to the libjpeg-turbo TurboJPEG C API.
//!
//! The shared library is opened at runtime with [`libloading`] so the caller decides which
//! `libturbojpeg` gets used. Every symbol is resolved up front in [`TurboJpegApi::load`]; a
//! missing symbol fails the load instead of surfacing later as a crash.
//!
//! Names follow `turbojpeg.h` so the upstream documentation applies unchanged.
#![allow(non_camel_case_types, non_snake_case, non_upper_case_globals)]

use std::ffi::{OsStr, c_char, c_int, c_short, c_uchar, c_ulong, c_void};
use std::fmt;
use std::path::{Path, PathBuf};

use libloading::Library;

pub type tjhandle = *mut c_void;

/// Number of pixel formats known to the bindings.
pub const TJ_NUMPF: c_int = 12;
pub const TJPF_RGB: c_int = 0;
pub const TJPF_BGR: c_int = 1;
pub const TJPF_RGBX: c_int = 2;
pub const TJPF_BGRX: c_int = 3;
pub const TJPF_XBGR: c_int = 4;
pub const TJPF_XRGB: c_int = 5;
pub const TJPF_GRAY: c_int = 6;
pub const TJPF_RGBA: c_int = 7;
pub const TJPF_BGRA: c_int = 8;
pub const TJPF_ABGR: c_int = 9;
pub const TJPF_ARGB: c_int = 10;
pub const TJPF_CMYK: c_int = 11;

/// Pixel size in bytes, indexed by pixel format.
pub const tjPixelSize: [c_int; TJ_NUMPF as usize] = [3, 3, 4, 4, 4, 4, 1, 4, 4, 4, 4, 4];

/// Number of chrominance subsampling options known to the bindings.
pub const TJ_NUMSAMP: c_int = 7;
/// Returned by libjpeg-turbo 3.x for sampling layouts it cannot classify.
pub const TJSAMP_UNKNOWN: c_int = -1;
pub const TJSAMP_444: c_int = 0;
pub const TJSAMP_422: c_int = 1;
pub const TJSAMP_420: c_int = 2;
pub const TJSAMP_GRAY: c_int = 3;
pub const TJSAMP_440: c_int = 4;
pub const TJSAMP_411: c_int = 5;
pub const TJSAMP_441: c_int = 6;

/// MCU block width in pixels, indexed by subsampling option.
pub const tjMCUWidth: [c_int; TJ_NUMSAMP as usize] = [8, 16, 16, 8, 8, 32, 8];
/// MCU block height in pixels, indexed by subsampling option.
pub const tjMCUHeight: [c_int; TJ_NUMSAMP as usize] = [8, 8, 16, 8, 16, 8, 32];

pub const TJ_NUMCS: c_int = 5;
pub const TJCS_RGB: c_int = 0;
pub const TJCS_YCbCr: c_int = 1;
pub const TJCS_GRAY: c_int = 2;
pub const TJCS_CMYK: c_int = 3;
pub const TJCS_YCCK: c_int = 4;

pub const TJFLAG_BOTTOMUP: c_int = 2;
pub const TJFLAG_FASTUPSAMPLE: c_int = 256;
pub const TJFLAG_NOREALLOC: c_int = 1024;
pub const TJFLAG_FASTDCT: c_int = 2048;
pub const TJFLAG_ACCURATEDCT: c_int = 4096;
pub const TJFLAG_STOPONWARNING: c_int = 8192;
pub const TJFLAG_PROGRESSIVE: c_int = 16384;
pub const TJFLAG_LIMITSCANS: c_int = 32768;

pub const TJ_NUMERR: c_int = 2;
pub const TJERR_WARNING: c_int = 0;
pub const TJERR_FATAL: c_int = 1;

pub const TJ_NUMXOP: c_int = 8;
pub const TJXOP_NONE: c_int = 0;
pub const TJXOP_HFLIP: c_int = 1;
pub const TJXOP_VFLIP: c_int = 2;
pub const TJXOP_TRANSPOSE: c_int = 3;
pub const TJXOP_TRANSVERSE: c_int = 4;
pub const TJXOP_ROT90: c_int = 5;
pub const TJXOP_ROT180: c_int = 6;
pub const TJXOP_ROT270: c_int = 7;

pub const TJXOPT_PERFECT: c_int = 1;
pub const TJXOPT_TRIM: c_int = 2;
pub const TJXOPT_CROP: c_int = 4;
pub const TJXOPT_GRAY: c_int = 8;
pub const TJXOPT_NOOUTPUT: c_int = 16;
pub const TJXOPT_PROGRESSIVE: c_int = 32;
pub const TJXOPT_COPYNONE: c_int = 64;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct tjscalingfactor {
    pub num: c_int,
    pub denom: c_int,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct tjregion {
    pub x: c_int,
    pub y: c_int,
    pub w: c_int,
    pub h: c_int,
}

pub type tjCustomFilter = Option<
    unsafe extern "C" fn(
        coeffs: *mut c_short,
        arrayRegion: tjregion,
        planeRegion: tjregion,
        componentIndex: c_int,
        transformIndex: c_int,
        transform: *mut tjtransform,
    ) -> c_int,
>;

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct tjtransform {
    pub r: tjregion,
    pub op: c_int,
    pub options: c_int,
    pub data: *mut c_void,
    pub customFilter: tjCustomFilter,
}

impl Default for tjtransform {
    fn default() -> Self {
        Self {
            r: tjregion::default(),
            op: TJXOP_NONE,
            options: 0,
            data: std::ptr::null_mut(),
            customFilter: None,
        }
    }
}

macro_rules! turbojpeg_api {
    ($($name:ident: fn($($arg:ident: $ty:ty),* $(,)?) -> $ret:ty;)*) => {
        /// Function table resolved from a loaded `libturbojpeg`.
        ///
        /// The table keeps the library mapped for as long as it lives, so the function
        /// pointers stay valid for the lifetime of the value.
        pub struct TurboJpegApi {
            $(pub $name: unsafe extern "C" fn($($arg: $ty),*) -> $ret,)*
            path: PathBuf,
            _lib: Library,
        }

        impl TurboJpegApi {
            /// Open `path` and resolve every TurboJPEG symbol the bindings use.
            ///
            /// # Safety
            /// Loading a shared library runs its initialisers. The caller must make sure
            /// `path` names a genuine libjpeg-turbo build exporting the TurboJPEG 2.x API.
            pub unsafe fn load(path: impl AsRef<OsStr>) -> Result<Self, libloading::Error> {
                let path = path.as_ref();
                let lib = unsafe { Library::new(path)? };
                $(
                    let $name = unsafe {
                        *lib.get::<unsafe extern "C" fn($($ty),*) -> $ret>(
                            concat!(stringify!($name), "\0").as_bytes(),
                        )?
                    };
                )*
                Ok(Self {
                    $($name,)*
                    path: PathBuf::from(path),
                    _lib: lib,
                })
            }
        }
    };
}

turbojpeg_api! {
    tjInitCompress: fn() -> tjhandle;
    tjInitDecompress: fn() -> tjhandle;
    tjInitTransform: fn() -> tjhandle;
    tjDestroy: fn(handle: tjhandle) -> c_int;
    tjGetErrorStr2: fn(handle: tjhandle) -> *mut c_char;
    tjGetErrorCode: fn(handle: tjhandle) -> c_int;
    tjGetScalingFactors: fn(numScalingFactors: *mut c_int) -> *mut tjscalingfactor;
    tjBufSize: fn(width: c_int, height: c_int, jpegSubsamp: c_int) -> c_ulong;
    tjDecompressHeader3: fn(
        handle: tjhandle,
        jpegBuf: *const c_uchar,
        jpegSize: c_ulong,
        width: *mut c_int,
        height: *mut c_int,
        jpegSubsamp: *mut c_int,
        jpegColorspace: *mut c_int,
    ) -> c_int;
    tjDecompress2: fn(
        handle: tjhandle,
        jpegBuf: *const c_uchar,
        jpegSize: c_ulong,
        dstBuf: *mut c_uchar,
        width: c_int,
        pitch: c_int,
        height: c_int,
        pixelFormat: c_int,
        flags: c_int,
    ) -> c_int;
    tjCompress2: fn(
        handle: tjhandle,
        srcBuf: *const c_uchar,
        width: c_int,
        pitch: c_int,
        height: c_int,
        pixelFormat: c_int,
        jpegBuf: *mut *mut c_uchar,
        jpegSize: *mut c_ulong,
        jpegSubsamp: c_int,
        jpegQual: c_int,
        flags: c_int,
    ) -> c_int;
    tjTransform: fn(
        handle: tjhandle,
        jpegBuf: *const c_uchar,
        jpegSize: c_ulong,
        n: c_int,
        dstBufs: *mut *mut c_uchar,
        dstSizes: *mut c_ulong,
        transforms: *mut tjtransform,
        flags: c_int,
    ) -> c_int;
    tjFree: fn(buffer: *mut c_uchar) -> ();
}

impl TurboJpegApi {
    /// Path the library was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Debug for TurboJpegApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TurboJpegApi")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tables_cover_every_enumerated_value() {
        assert_eq!(tjPixelSize.len(), TJ_NUMPF as usize);
        assert_eq!(tjMCUWidth.len(), TJ_NUMSAMP as usize);
        assert_eq!(tjMCUHeight.len(), TJ_NUMSAMP as usize);
        assert_eq!(tjPixelSize[TJPF_GRAY as usize], 1);
        assert_eq!(tjMCUWidth[TJSAMP_420 as usize], 16);
        assert_eq!(tjMCUHeight[TJSAMP_420 as usize], 16);
    }

    #[test]
    fn load_reports_missing_library() {
        let err = unsafe { TurboJpegApi::load("/nonexistent/libturbojpeg.so.0") };
        assert!(err.is_err());
    }
}
