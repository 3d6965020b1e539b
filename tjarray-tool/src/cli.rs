use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum, builder::ValueHint};
use tjarray::{CropRegion, ScalingFactor, SubsamplingMode, TransformOp};

/// Command-line arguments for the tjarray tool.
#[derive(Parser, Debug)]
#[command(
    name = "tjarray",
    about = "Inspect, decode, encode and losslessly transform JPEGs with libjpeg-turbo.",
    author,
    version,
    arg_required_else_help = true
)]
pub struct Cli {
    /// libturbojpeg shared library to load (defaults to $TJARRAY_LIBRARY, then the usual locations)
    #[arg(long, global = true, value_hint = ValueHint::FilePath, value_name = "FILE")]
    pub library: Option<PathBuf>,

    /// Log handle lifetimes and native calls
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print dimensions, subsampling and colour space of a JPEG
    Info(InfoArgs),
    /// Decode a JPEG to PPM (RGB) or PGM (gray)
    Decode(DecodeArgs),
    /// Encode a PPM or PGM image as JPEG
    Encode(EncodeArgs),
    /// Cut MCU-aligned regions out of a JPEG without re-encoding
    Crop(CropArgs),
    /// Rotate, flip or transpose a JPEG without re-encoding
    Transform(TransformArgs),
    /// Decode at a reduced size and re-encode
    Rescale(RescaleArgs),
}

#[derive(Args, Debug)]
pub struct InfoArgs {
    #[arg(value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub input: PathBuf,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    #[arg(value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub input: PathBuf,

    /// Output PPM/PGM path
    #[arg(long, short = 'o', value_hint = ValueHint::FilePath, value_name = "FILE")]
    pub out: PathBuf,

    /// Decode-time scaling factor, e.g. 1/2
    #[arg(long, value_name = "N/D")]
    pub scale: Option<ScalingFactor>,

    /// Decode to a single luminance channel
    #[arg(long)]
    pub gray: bool,

    #[arg(long)]
    pub fast_dct: bool,

    #[arg(long)]
    pub fast_upsample: bool,

    /// Fail on corrupt or truncated data instead of warning
    #[arg(long)]
    pub strict: bool,
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    #[arg(value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub input: PathBuf,

    /// Output JPEG path
    #[arg(long, short = 'o', value_hint = ValueHint::FilePath, value_name = "FILE")]
    pub out: PathBuf,

    /// JPEG quality (1-100)
    #[arg(
        long,
        short = 'q',
        default_value_t = 85,
        value_parser = clap::value_parser!(i32).range(1..=100)
    )]
    pub quality: i32,

    /// Chroma subsampling (ignored for PGM input)
    #[arg(long, value_enum, default_value_t = Subsampling::S420)]
    pub subsampling: Subsampling,

    #[arg(long)]
    pub progressive: bool,

    #[arg(long)]
    pub accurate_dct: bool,
}

#[derive(Args, Debug)]
pub struct CropArgs {
    #[arg(value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub input: PathBuf,

    /// Region as WxH+X+Y; repeat for several outputs
    #[arg(long = "region", short = 'r', value_name = "WxH+X+Y", value_parser = parse_region, required = true)]
    pub regions: Vec<CropRegion>,

    /// Output path; with several regions, `-N` is appended to the file stem
    #[arg(long, short = 'o', value_hint = ValueHint::FilePath, value_name = "FILE")]
    pub out: PathBuf,
}

#[derive(Args, Debug)]
pub struct TransformArgs {
    #[arg(value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub input: PathBuf,

    #[arg(long, short = 'o', value_hint = ValueHint::FilePath, value_name = "FILE")]
    pub out: PathBuf,

    #[arg(long, value_enum, default_value_t = Op::None)]
    pub op: Op,

    /// Region of the transformed image to keep, as WxH+X+Y
    #[arg(long, value_name = "WxH+X+Y", value_parser = parse_region)]
    pub crop: Option<CropRegion>,

    /// Drop edge blocks that cannot be transformed
    #[arg(long, conflicts_with = "perfect")]
    pub trim: bool,

    /// Fail if edge blocks cannot be transformed
    #[arg(long)]
    pub perfect: bool,

    /// Keep only luminance
    #[arg(long)]
    pub gray: bool,

    #[arg(long)]
    pub progressive: bool,

    /// Do not copy metadata markers
    #[arg(long)]
    pub strip: bool,
}

#[derive(Args, Debug)]
pub struct RescaleArgs {
    #[arg(value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub input: PathBuf,

    #[arg(long, short = 'o', value_hint = ValueHint::FilePath, value_name = "FILE")]
    pub out: PathBuf,

    /// Scaling factor, e.g. 1/4
    #[arg(long, value_name = "N/D")]
    pub scale: ScalingFactor,

    #[arg(
        long,
        short = 'q',
        default_value_t = 85,
        value_parser = clap::value_parser!(i32).range(1..=100)
    )]
    pub quality: i32,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subsampling {
    #[value(name = "444")]
    S444,
    #[value(name = "422")]
    S422,
    #[value(name = "420")]
    S420,
    Gray,
    #[value(name = "440")]
    S440,
    #[value(name = "411")]
    S411,
    #[value(name = "441")]
    S441,
}

impl From<Subsampling> for SubsamplingMode {
    fn from(value: Subsampling) -> Self {
        match value {
            Subsampling::S444 => Self::S444,
            Subsampling::S422 => Self::S422,
            Subsampling::S420 => Self::S420,
            Subsampling::Gray => Self::Gray,
            Subsampling::S440 => Self::S440,
            Subsampling::S411 => Self::S411,
            Subsampling::S441 => Self::S441,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    None,
    Hflip,
    Vflip,
    Transpose,
    Transverse,
    Rot90,
    Rot180,
    Rot270,
}

impl From<Op> for TransformOp {
    fn from(value: Op) -> Self {
        match value {
            Op::None => Self::None,
            Op::Hflip => Self::HFlip,
            Op::Vflip => Self::VFlip,
            Op::Transpose => Self::Transpose,
            Op::Transverse => Self::Transverse,
            Op::Rot90 => Self::Rot90,
            Op::Rot180 => Self::Rot180,
            Op::Rot270 => Self::Rot270,
        }
    }
}

/// Parse `WxH+X+Y`, the same notation the region is displayed in.
pub fn parse_region(s: &str) -> Result<CropRegion, String> {
    let err = || format!("expected WxH+X+Y, got `{s}`");
    let (size, offset) = s.split_once('+').ok_or_else(err)?;
    let (w, h) = size.split_once('x').ok_or_else(err)?;
    let (x, y) = offset.split_once('+').ok_or_else(err)?;
    let num = |v: &str| v.trim().parse::<u32>().map_err(|_| err());
    Ok(CropRegion::new(num(x)?, num(y)?, num(w)?, num(h)?))
}
