#![allow(dead_code)]

use ndarray::Array3;
use tjarray::{Config, EncodeOptions, PixelFormat, SubsamplingMode, TurboJpeg};

/// A client over the library named by `TJARRAY_LIBRARY`, or the default search path.
///
/// Returns `None` when no libturbojpeg can be loaded so the codec tests are skipped instead of
/// failing on machines without it.
pub fn client() -> Option<TurboJpeg> {
    match TurboJpeg::with_config(&Config::from_env()) {
        Ok(tj) => Some(tj),
        Err(err) => {
            eprintln!("skipping: {err}");
            None
        }
    }
}

pub fn solid(height: usize, width: usize, rgb: [u8; 3]) -> Array3<u8> {
    Array3::from_shape_fn((height, width, 3), |(_, _, c)| rgb[c])
}

/// Smooth horizontal/vertical ramps, which survive lossy compression well.
pub fn gradient(height: usize, width: usize) -> Array3<u8> {
    Array3::from_shape_fn((height, width, 3), |(y, x, c)| match c {
        0 => (x * 255 / (width - 1).max(1)) as u8,
        1 => (y * 255 / (height - 1).max(1)) as u8,
        _ => 128,
    })
}

pub fn encode_gradient(
    tj: &mut TurboJpeg,
    height: usize,
    width: usize,
    subsampling: SubsamplingMode,
) -> bytes::Bytes {
    tj.encode(
        &gradient(height, width),
        &EncodeOptions::new(90, PixelFormat::Rgb, subsampling),
    )
    .expect("encode gradient")
}

pub fn max_abs_diff(a: &[u8], b: &[u8]) -> u8 {
    a.iter()
        .zip(b)
        .map(|(&x, &y)| x.abs_diff(y))
        .max()
        .unwrap_or(0)
}
