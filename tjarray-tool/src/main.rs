use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tjarray::{
    Config, DecodeFlags, DecodeOptions, EncodeFlags, EncodeOptions, ImageView, PixelFormat,
    SubsamplingMode, TransformOptions, TransformSpec, TurboJpeg,
};
use tracing::info;

mod cli;
mod ppm;

fn main() -> Result<()> {
    let args = cli::Cli::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(if args.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    let config = match &args.library {
        Some(path) => Config::with_library_path(path),
        None => Config::from_env(),
    };
    let mut tj = TurboJpeg::with_config(&config)?;
    run(&mut tj, args.command)
}

fn run(tj: &mut TurboJpeg, cmd: cli::Command) -> Result<()> {
    match cmd {
        cli::Command::Info(args) => info_cmd(tj, &args),
        cli::Command::Decode(args) => decode_cmd(tj, &args),
        cli::Command::Encode(args) => encode_cmd(tj, &args),
        cli::Command::Crop(args) => crop_cmd(tj, &args),
        cli::Command::Transform(args) => transform_cmd(tj, &args),
        cli::Command::Rescale(args) => rescale_cmd(tj, &args),
    }
}

fn read(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("failed to read {}", path.display()))
}

fn write(path: &Path, bytes: &[u8]) -> Result<()> {
    fs::write(path, bytes).with_context(|| format!("failed to write {}", path.display()))?;
    info!(path = %path.display(), bytes = bytes.len(), "wrote output");
    Ok(())
}

fn info_cmd(tj: &mut TurboJpeg, args: &cli::InfoArgs) -> Result<()> {
    let jpeg = read(&args.input)?;
    let header = tj
        .read_header(&jpeg)
        .with_context(|| format!("{} is not a readable JPEG", args.input.display()))?;
    println!("size:        {}x{}", header.width, header.height);
    match header.subsampling {
        Some(mode) => {
            let (w, h) = mode.mcu_size();
            println!("subsampling: {mode} (MCU {w}x{h})");
        }
        None => println!("subsampling: unknown"),
    }
    println!("colorspace:  {}", header.colorspace);
    let scaled: Vec<String> = tj
        .scaling_factors(header.subsampling)
        .iter()
        .map(|sf| {
            format!(
                "{sf} ({}x{})",
                sf.scale(header.width),
                sf.scale(header.height)
            )
        })
        .collect();
    println!("scaling:     {}", scaled.join(", "));
    Ok(())
}

fn decode_cmd(tj: &mut TurboJpeg, args: &cli::DecodeArgs) -> Result<()> {
    let jpeg = read(&args.input)?;
    let format = if args.gray {
        PixelFormat::Gray
    } else {
        PixelFormat::Rgb
    };
    let mut opts = DecodeOptions::new(format)
        .flags(DecodeFlags {
            fast_dct: args.fast_dct,
            fast_upsample: args.fast_upsample,
            ..DecodeFlags::default()
        })
        .stop_on_warning(args.strict);
    if let Some(factor) = args.scale {
        opts = opts.scaling(factor);
    }

    let image = tj
        .decode(&jpeg, &opts)
        .with_context(|| format!("failed to decode {}", args.input.display()))?
        .into_owned();
    let pnm = ppm::encode(
        image.width(),
        image.height(),
        image.channels(),
        image.as_bytes(),
    )?;
    write(&args.out, &pnm)
}

fn encode_cmd(tj: &mut TurboJpeg, args: &cli::EncodeArgs) -> Result<()> {
    let pnm = ppm::decode(&read(&args.input)?)
        .with_context(|| format!("failed to parse {}", args.input.display()))?;
    let (format, subsampling) = if pnm.channels == 1 {
        (PixelFormat::Gray, SubsamplingMode::Gray)
    } else {
        (PixelFormat::Rgb, args.subsampling.into())
    };
    let view = ImageView::new(&pnm.data, pnm.width, pnm.height, pnm.channels)?;
    let opts = EncodeOptions::new(args.quality, format, subsampling).flags(EncodeFlags {
        progressive: args.progressive,
        accurate_dct: args.accurate_dct,
        ..EncodeFlags::default()
    });
    let jpeg = tj.encode(&view, &opts)?;
    write(&args.out, &jpeg)
}

fn crop_cmd(tj: &mut TurboJpeg, args: &cli::CropArgs) -> Result<()> {
    let jpeg = read(&args.input)?;
    let outputs = tj.crop_multiple(&jpeg, &args.regions)?;
    if let [single] = outputs.as_slice() {
        return write(&args.out, single);
    }
    for (index, out) in outputs.iter().enumerate() {
        write(&numbered(&args.out, index + 1), out)?;
    }
    Ok(())
}

fn transform_cmd(tj: &mut TurboJpeg, args: &cli::TransformArgs) -> Result<()> {
    let jpeg = read(&args.input)?;
    let spec = TransformSpec {
        op: args.op.into(),
        crop: args.crop,
        options: TransformOptions {
            perfect: args.perfect,
            trim: args.trim,
            gray: args.gray,
            progressive: args.progressive,
            copy_none: args.strip,
            ..TransformOptions::default()
        },
    };
    let out = tj.transform(&jpeg, &spec)?;
    write(&args.out, &out)
}

fn rescale_cmd(tj: &mut TurboJpeg, args: &cli::RescaleArgs) -> Result<()> {
    let jpeg = read(&args.input)?;
    let out = tj.rescale(&jpeg, args.scale, args.quality)?;
    write(&args.out, &out)
}

/// `out.jpg` -> `out-2.jpg`.
fn numbered(path: &Path, index: usize) -> PathBuf {
    let mut name = path
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_else(|| OsString::from("crop"));
    name.push(format!("-{index}"));
    if let Some(ext) = path.extension() {
        name.push(".");
        name.push(ext);
    }
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbered_outputs_keep_extension() {
        assert_eq!(numbered(Path::new("dir/out.jpg"), 2), PathBuf::from("dir/out-2.jpg"));
        assert_eq!(numbered(Path::new("out"), 1), PathBuf::from("out-1"));
    }
}
