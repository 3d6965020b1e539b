use std::ffi::{CStr, c_int};
use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{Error, NativeError, Result, Severity};
use crate::sys;

/// Which native instance a [`Handle`] wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Decompress,
    Compress,
    Transform,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Decompress => "decompress",
            Self::Compress => "compress",
            Self::Transform => "transform",
        })
    }
}

/// One initialised `tjhandle`, destroyed exactly once on drop.
///
/// Not internally synchronised: every call goes through `&mut` on the owning client.
pub(crate) struct Handle {
    raw: NonNull<std::ffi::c_void>,
    direction: Direction,
    api: Arc<sys::TurboJpegApi>,
}

// SAFETY: a tjhandle carries no thread affinity; it only must not be used concurrently,
// which `Handle` being `!Sync` rules out.
unsafe impl Send for Handle {}

impl Handle {
    pub(crate) fn acquire(api: &Arc<sys::TurboJpegApi>, direction: Direction) -> Result<Self> {
        let ptr = unsafe {
            match direction {
                Direction::Decompress => (api.tjInitDecompress)(),
                Direction::Compress => (api.tjInitCompress)(),
                Direction::Transform => (api.tjInitTransform)(),
            }
        };
        match NonNull::new(ptr) {
            Some(raw) => {
                debug!(%direction, "created turbojpeg handle");
                Ok(Self {
                    raw,
                    direction,
                    api: Arc::clone(api),
                })
            }
            None => Err(Error::Initialization {
                direction,
                // A null handle has no state of its own; the library keeps the reason globally.
                message: error_string(api, std::ptr::null_mut()),
            }),
        }
    }

    pub(crate) fn as_raw(&self) -> sys::tjhandle {
        self.raw.as_ptr()
    }

    pub(crate) fn api(&self) -> &sys::TurboJpegApi {
        &self.api
    }

    /// Diagnostic for the most recent failure on this handle.
    ///
    /// Only meaningful right after a call returned `-1`; any later call overwrites it.
    pub(crate) fn last_error(&self) -> NativeError {
        let code = unsafe { (self.api.tjGetErrorCode)(self.as_raw()) };
        NativeError {
            message: error_string(&self.api, self.as_raw()),
            severity: if code == sys::TJERR_WARNING {
                Severity::Warning
            } else {
                Severity::Fatal
            },
        }
    }

    /// Turn a native status into a `Result`.
    ///
    /// Warnings pass (and are logged) unless `stop_on_warning` is set.
    pub(crate) fn check(
        &self,
        status: c_int,
        stop_on_warning: bool,
        wrap: fn(NativeError) -> Error,
    ) -> Result<()> {
        if status == 0 {
            return Ok(());
        }
        let err = self.last_error();
        if err.severity == Severity::Warning && !stop_on_warning {
            warn!(direction = %self.direction, message = %err.message, "turbojpeg warning");
            return Ok(());
        }
        Err(wrap(err))
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        let status = unsafe { (self.api.tjDestroy)(self.as_raw()) };
        debug!(direction = %self.direction, status, "destroyed turbojpeg handle");
    }
}

fn error_string(api: &sys::TurboJpegApi, handle: sys::tjhandle) -> String {
    let ptr = unsafe { (api.tjGetErrorStr2)(handle) };
    if ptr.is_null() {
        return "unknown error".to_string();
    }
    // SAFETY: the library returns a NUL-terminated string it owns.
    unsafe { CStr::from_ptr(ptr) }
        .to_string_lossy()
        .into_owned()
}
