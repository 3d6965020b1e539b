mod common;

use anyhow::Result;
use ndarray::{Array3, s};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tjarray::{
    ContiguityPolicy, DecodeOptions, EncodeFlags, EncodeOptions, Error, ImageBuffer, PixelFormat,
    ScalingFactor, SubsamplingMode, TurboJpeg,
};

use common::{client, encode_gradient, gradient, max_abs_diff, solid};

#[test]
fn round_trip_keeps_shape_and_pixels() -> Result<()> {
    let Some(mut tj) = client() else { return Ok(()) };
    let src = gradient(48, 64);
    let jpeg = tj.encode(&src, &EncodeOptions::new(95, PixelFormat::Rgb, SubsamplingMode::S444))?;
    assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);

    let decoded = tj.decode(&jpeg, &DecodeOptions::default())?;
    assert!(decoded.is_owned());
    let img = decoded.into_owned();
    assert_eq!(img.array().shape(), &[48, 64, 3]);
    assert!(max_abs_diff(img.as_bytes(), src.as_slice().unwrap()) <= 16);
    Ok(())
}

#[test]
fn solid_red_survives_422() -> Result<()> {
    let Some(mut tj) = client() else { return Ok(()) };
    let src = solid(100, 100, [255, 0, 0]);
    let jpeg = tj.encode(&src, &EncodeOptions::new(90, PixelFormat::Rgb, SubsamplingMode::S422))?;

    let header = tj.read_header(&jpeg)?;
    assert_eq!((header.width, header.height), (100, 100));
    assert_eq!(header.subsampling, Some(SubsamplingMode::S422));

    let img = tj.decode(&jpeg, &DecodeOptions::default())?.into_owned();
    for px in img.array().rows() {
        assert!(px[0] >= 245, "red channel {}", px[0]);
        assert!(px[1] <= 10 && px[2] <= 10, "pixel {px:?}");
    }
    Ok(())
}

#[test]
fn quality_must_be_within_bounds() -> Result<()> {
    let Some(mut tj) = client() else { return Ok(()) };
    let src = solid(16, 16, [10, 20, 30]);
    for quality in [0, 101] {
        let opts = EncodeOptions::new(quality, PixelFormat::Rgb, SubsamplingMode::S420);
        assert!(matches!(tj.encode(&src, &opts), Err(Error::InvalidQuality(q)) if q == quality));
    }
    for quality in [1, 100] {
        let opts = EncodeOptions::new(quality, PixelFormat::Rgb, SubsamplingMode::S420);
        tj.encode(&src, &opts)?;
    }
    Ok(())
}

#[test]
fn source_must_match_pixel_format() -> Result<()> {
    let Some(mut tj) = client() else { return Ok(()) };
    let rgba = Array3::<u8>::zeros((8, 8, 4));
    let err = tj.encode(&rgba, &EncodeOptions::default()).unwrap_err();
    assert!(matches!(err, Error::Shape { ref shape, .. } if shape == &[8, 8, 4]));

    let floats = Array3::<f32>::zeros((8, 8, 3));
    assert!(matches!(
        tj.encode(&floats, &EncodeOptions::default()),
        Err(Error::UnsupportedDtype(tjarray::DType::F32))
    ));

    let flat = ndarray::Array2::<u8>::zeros((8, 24));
    assert!(matches!(
        tj.encode(&flat, &EncodeOptions::default()),
        Err(Error::Shape { .. })
    ));
    Ok(())
}

#[test]
fn unsupported_scale_is_rejected_before_decoding() -> Result<()> {
    let Some(mut tj) = client() else { return Ok(()) };
    let opts = DecodeOptions::default().scaling(ScalingFactor::new(3, 7));
    match tj.decode(b"definitely not a jpeg", &opts) {
        Err(Error::UnsupportedScalingFactor { requested, available }) => {
            assert_eq!(requested, ScalingFactor::new(3, 7));
            assert!(available.contains(&ScalingFactor::new(1, 2)));
        }
        other => panic!("unexpected result {other:?}"),
    }
    assert!(matches!(
        tj.decode(b"definitely not a jpeg", &DecodeOptions::default()),
        Err(Error::MalformedStream(_))
    ));
    Ok(())
}

#[test]
fn scaled_decode_uses_rational_factors() -> Result<()> {
    let Some(mut tj) = client() else { return Ok(()) };
    let jpeg = encode_gradient(&mut tj, 240, 320, SubsamplingMode::S420);
    assert!(tj.scaling_factors(None).contains(&ScalingFactor::new(1, 2)));

    for factor in [ScalingFactor::new(1, 2), ScalingFactor::new(2, 4)] {
        let img = tj.decode(&jpeg, &DecodeOptions::default().scaling(factor))?;
        assert_eq!((img.width(), img.height()), (160, 120));
    }
    let img = tj.decode(&jpeg, &DecodeOptions::default().scaling(ScalingFactor::new(1, 8)))?;
    assert_eq!((img.width(), img.height()), (40, 30));
    Ok(())
}

#[test]
fn gray_output_from_color_stream() -> Result<()> {
    let Some(mut tj) = client() else { return Ok(()) };
    let jpeg = encode_gradient(&mut tj, 32, 32, SubsamplingMode::S444);
    let img = tj.decode(&jpeg, &DecodeOptions::new(PixelFormat::Gray))?;
    assert_eq!(img.channels(), 1);
    assert_eq!(img.pixel_format(), PixelFormat::Gray);
    Ok(())
}

#[test]
fn decode_into_writes_caller_memory() -> Result<()> {
    let Some(mut tj) = client() else { return Ok(()) };
    let jpeg = encode_gradient(&mut tj, 24, 40, SubsamplingMode::S420);
    let expected = tj.decode(&jpeg, &DecodeOptions::default())?.into_owned();

    let mut dst = Array3::<u8>::zeros((24, 40, 3));
    {
        let out = tj.decode_into(&jpeg, &DecodeOptions::default(), &mut dst)?;
        let ImageBuffer::Borrowed(view) = &out else {
            panic!("expected the caller's buffer back");
        };
        assert_eq!(view.strides(), [120, 3, 1]);
        assert_eq!(out.get(0, 0, 0), expected.array().get((0, 0, 0)).copied());
    }
    assert_eq!(dst, expected.array().to_owned());
    Ok(())
}

#[test]
fn decode_into_rejects_wrong_shape() -> Result<()> {
    let Some(mut tj) = client() else { return Ok(()) };
    let jpeg = encode_gradient(&mut tj, 24, 40, SubsamplingMode::S420);
    let mut dst = Array3::<u8>::zeros((24, 41, 3));
    assert!(matches!(
        tj.decode_into(&jpeg, &DecodeOptions::default(), &mut dst),
        Err(Error::BufferSizeMismatch {
            what: "destination width",
            expected: 40,
            actual: 41
        })
    ));
    Ok(())
}

#[test]
fn strided_destination_follows_contiguity_policy() -> Result<()> {
    let Some(mut tj) = client() else { return Ok(()) };
    let jpeg = encode_gradient(&mut tj, 16, 16, SubsamplingMode::S444);
    let expected = tj.decode(&jpeg, &DecodeOptions::default())?.into_owned();

    let mut backing = Array3::<u8>::zeros((16, 32, 3));
    {
        let mut every_other = backing.slice_mut(s![.., ..;2, ..]);
        assert!(matches!(
            tj.decode_into(&jpeg, &DecodeOptions::default(), &mut every_other),
            Err(Error::NonContiguousBuffer { .. })
        ));
    }

    let mut copying = TurboJpeg::with_api(tj.api().clone(), ContiguityPolicy::Copy)?;
    {
        let mut every_other = backing.slice_mut(s![.., ..;2, ..]);
        let out = copying.decode_into(&jpeg, &DecodeOptions::default(), &mut every_other)?;
        assert!(!out.is_owned());
    }
    assert_eq!(backing.slice(s![.., ..;2, ..]), expected.array().view());
    assert!(backing.slice(s![.., 1..;2, ..]).iter().all(|&v| v == 0));
    Ok(())
}

#[test]
fn strided_source_encodes_like_packed_copy() -> Result<()> {
    let Some(tj) = client() else { return Ok(()) };
    let mut copying = TurboJpeg::with_api(tj.api().clone(), ContiguityPolicy::Copy)?;
    let wide = gradient(16, 32);
    let strided = wide.slice(s![.., ..;2, ..]);
    let opts = EncodeOptions::new(80, PixelFormat::Rgb, SubsamplingMode::S444);

    let mut rejecting = tj;
    assert!(matches!(
        rejecting.encode(&strided, &opts),
        Err(Error::NonContiguousBuffer { .. })
    ));
    let from_strided = copying.encode(&strided, &opts)?;
    let from_packed = copying.encode(&strided.to_owned(), &opts)?;
    assert_eq!(from_strided, from_packed);
    Ok(())
}

#[test]
fn padded_rows_are_encoded_without_copy() -> Result<()> {
    let Some(mut tj) = client() else { return Ok(()) };
    let wide = gradient(16, 24);
    // Every row is 72 bytes apart but only the first 16 pixels are part of the image.
    let padded = wide.slice(s![.., ..16, ..]);
    let from_padded = tj.encode(&padded, &EncodeOptions::default())?;
    let from_packed = tj.encode(&padded.to_owned(), &EncodeOptions::default())?;
    assert_eq!(from_padded, from_packed);
    Ok(())
}

#[test]
fn encode_into_borrows_the_written_prefix() -> Result<()> {
    let Some(mut tj) = client() else { return Ok(()) };
    let src = gradient(32, 32);
    let opts = EncodeOptions::new(75, PixelFormat::Rgb, SubsamplingMode::S420);
    let owned = tj.encode(&src, &opts)?;

    let mut buf = vec![0u8; tj.buffer_size(32, 32, SubsamplingMode::S420)?];
    assert!(buf.len() >= owned.len());
    let out = tj.encode_into(&src, &opts, &mut buf)?;
    assert!(!out.is_owned());
    assert_eq!(&*out, &owned[..]);

    let mut small = vec![0u8; 16];
    assert!(matches!(
        tj.encode_into(&src, &opts, &mut small),
        Err(Error::BufferSizeMismatch {
            what: "output capacity",
            ..
        })
    ));
    Ok(())
}

#[test]
fn progressive_streams_decode() -> Result<()> {
    let Some(mut tj) = client() else { return Ok(()) };
    let opts = EncodeOptions::default().flags(EncodeFlags {
        progressive: true,
        ..EncodeFlags::default()
    });
    let jpeg = tj.encode(&gradient(40, 40), &opts)?;
    let img = tj.decode(&jpeg, &DecodeOptions::default())?;
    assert_eq!((img.width(), img.height()), (40, 40));
    Ok(())
}

#[test]
fn random_noise_with_odd_dimensions() -> Result<()> {
    let Some(mut tj) = client() else { return Ok(()) };
    let mut rng = SmallRng::seed_from_u64(7);
    let src = Array3::from_shape_simple_fn((37, 53, 3), || rng.r#gen::<u8>());

    for subsampling in [SubsamplingMode::S444, SubsamplingMode::S420, SubsamplingMode::S411] {
        let opts = EncodeOptions::new(100, PixelFormat::Rgb, subsampling);
        let jpeg = tj.encode(&src, &opts)?;
        assert!(jpeg.len() <= tj.buffer_size(53, 37, subsampling)?);
        let img = tj.decode(&jpeg, &DecodeOptions::default())?;
        assert_eq!((img.height(), img.width(), img.channels()), (37, 53, 3));
    }
    Ok(())
}

#[test]
fn truncated_stream_warns_unless_stopped() -> Result<()> {
    let Some(mut tj) = client() else { return Ok(()) };
    let jpeg = encode_gradient(&mut tj, 256, 256, SubsamplingMode::S420);
    let truncated = &jpeg[..jpeg.len() - jpeg.len() / 4];

    let img = tj.decode(truncated, &DecodeOptions::default())?;
    assert_eq!((img.width(), img.height()), (256, 256));

    let err = tj
        .decode(truncated, &DecodeOptions::default().stop_on_warning(true))
        .unwrap_err();
    assert!(matches!(err, Error::Decode(_)));
    assert!(err.native().is_some());
    Ok(())
}
