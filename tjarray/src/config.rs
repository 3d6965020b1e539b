//! Client configuration and libturbojpeg discovery.

use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::buffer::ContiguityPolicy;
use crate::error::{Error, Result};
use crate::sys::TurboJpegApi;

/// Environment variable read by [`Config::from_env`].
pub const LIBRARY_ENV: &str = "TJARRAY_LIBRARY";

#[cfg(target_os = "windows")]
const LIBRARY_NAMES: &[&str] = &["turbojpeg.dll"];
#[cfg(target_os = "macos")]
const LIBRARY_NAMES: &[&str] = &["libturbojpeg.0.dylib", "libturbojpeg.dylib"];
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
const LIBRARY_NAMES: &[&str] = &["libturbojpeg.so.0", "libturbojpeg.so"];

#[cfg(target_os = "windows")]
const SEARCH_DIRS: &[&str] = &["C:/libjpeg-turbo64/bin", "C:/libjpeg-turbo/bin"];
#[cfg(target_os = "macos")]
const SEARCH_DIRS: &[&str] = &[
    "/opt/homebrew/opt/jpeg-turbo/lib",
    "/usr/local/opt/jpeg-turbo/lib",
    "/opt/libjpeg-turbo/lib64",
];
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
const SEARCH_DIRS: &[&str] = &[
    "/usr/lib/x86_64-linux-gnu",
    "/usr/lib/aarch64-linux-gnu",
    "/usr/lib64",
    "/usr/lib",
    "/opt/libjpeg-turbo/lib64",
    "/usr/local/lib",
];

/// Where to find `libturbojpeg`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LibrarySource {
    /// Exactly this file.
    Path(PathBuf),
    /// Each directory in order with the platform's library names, then the system loader path.
    Search(Vec<PathBuf>),
}

impl LibrarySource {
    /// Directories where libjpeg-turbo packages usually install on this platform.
    pub fn default_search() -> Self {
        Self::Search(SEARCH_DIRS.iter().map(PathBuf::from).collect())
    }

    /// Candidate files in the order they will be tried.
    pub fn candidates(&self) -> Vec<PathBuf> {
        match self {
            Self::Path(path) => vec![path.clone()],
            Self::Search(dirs) => dirs
                .iter()
                .flat_map(|dir| LIBRARY_NAMES.iter().map(move |name| dir.join(name)))
                .chain(LIBRARY_NAMES.iter().map(PathBuf::from))
                .collect(),
        }
    }

    /// Open the first candidate that loads.
    pub fn load(&self) -> Result<Arc<TurboJpegApi>> {
        let candidates = self.candidates();
        let mut last_err = String::from("no candidates");
        for candidate in &candidates {
            // Bare names go to the system loader; skip paths that plainly do not exist.
            if candidate.components().count() > 1 && !candidate.exists() {
                continue;
            }
            // SAFETY: candidates are libturbojpeg builds by name; see `TurboJpegApi::load`.
            match unsafe { TurboJpegApi::load(candidate) } {
                Ok(api) => {
                    debug!(path = %candidate.display(), "loaded libturbojpeg");
                    return Ok(Arc::new(api));
                }
                Err(err) => {
                    debug!(path = %candidate.display(), error = %err, "could not load libturbojpeg");
                    last_err = err.to_string();
                }
            }
        }
        Err(Error::LibraryLoad {
            tried: candidates,
            message: last_err,
        })
    }
}

impl Default for LibrarySource {
    fn default() -> Self {
        Self::default_search()
    }
}

/// Settings fixed for the lifetime of a [`TurboJpeg`](crate::TurboJpeg) client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub library: LibrarySource,
    /// Handling of array-likes whose pixels are not packed.
    pub contiguity: ContiguityPolicy,
}

impl Config {
    pub fn with_library_path(path: impl Into<PathBuf>) -> Self {
        Self {
            library: LibrarySource::Path(path.into()),
            ..Self::default()
        }
    }

    pub fn contiguity(mut self, policy: ContiguityPolicy) -> Self {
        self.contiguity = policy;
        self
    }

    /// Default configuration, with the library path taken from `TJARRAY_LIBRARY` when set.
    pub fn from_env() -> Self {
        match env::var_os(LIBRARY_ENV) {
            Some(path) if !path.is_empty() => Self::with_library_path(Path::new(&path)),
            _ => Self::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_path_is_the_only_candidate() {
        let source = LibrarySource::Path(PathBuf::from("/opt/tj/libturbojpeg.so.0"));
        assert_eq!(
            source.candidates(),
            vec![PathBuf::from("/opt/tj/libturbojpeg.so.0")]
        );
    }

    #[test]
    fn search_tries_directories_then_loader_path() {
        let source = LibrarySource::Search(vec![PathBuf::from("/a"), PathBuf::from("/b")]);
        let candidates = source.candidates();
        assert_eq!(candidates.len(), 3 * LIBRARY_NAMES.len());
        assert_eq!(candidates[0], Path::new("/a").join(LIBRARY_NAMES[0]));
        assert_eq!(
            candidates[LIBRARY_NAMES.len()],
            Path::new("/b").join(LIBRARY_NAMES[0])
        );
        assert_eq!(
            candidates.last().unwrap(),
            &PathBuf::from(LIBRARY_NAMES[LIBRARY_NAMES.len() - 1])
        );
    }

    #[test]
    fn missing_library_is_a_load_error() {
        let source = LibrarySource::Path(PathBuf::from("/nonexistent/libturbojpeg.so.0"));
        match source.load() {
            Err(Error::LibraryLoad { tried, .. }) => assert_eq!(tried.len(), 1),
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn builder_keeps_library_choice() {
        let config = Config::with_library_path("/x/libturbojpeg.so").contiguity(ContiguityPolicy::Copy);
        assert_eq!(
            config.library,
            LibrarySource::Path(PathBuf::from("/x/libturbojpeg.so"))
        );
        assert_eq!(config.contiguity, ContiguityPolicy::Copy);
        assert_eq!(Config::default().contiguity, ContiguityPolicy::Reject);
    }
}
