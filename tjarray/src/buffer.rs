//! Buffer negotiation between array-likes and the native codec.
//!
//! Array-likes are seen through two capability traits, [`PixelSource`] and [`PixelSink`], which
//! report dtype/shape/strides and hand out a raw data pointer. `ndarray` arrays and the crate's
//! own [`ImageView`]/[`ImageViewMut`] implement both. The negotiator decides whether that memory
//! can be handed to `libturbojpeg` as-is (packed pixels, any row pitch), needs a packed copy
//! (allowed by [`ContiguityPolicy::Copy`]), or must be rejected.

use std::fmt;
use std::marker::PhantomData;
use std::ops::Deref;

use bytes::Bytes;
use ndarray::{ArcArray, ArrayBase, Data, DataMut, Dimension, Ix3};

use crate::error::{Error, Result};
use crate::format::PixelFormat;

/// Element type tag of an array-like.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    F32,
    F64,
}

impl DType {
    pub const fn size(self) -> usize {
        match self {
            Self::U8 | Self::I8 => 1,
            Self::U16 | Self::I16 => 2,
            Self::U32 | Self::I32 | Self::F32 => 4,
            Self::U64 | Self::I64 | Self::F64 => 8,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::U8 => "u8",
            Self::I8 => "i8",
            Self::U16 => "u16",
            Self::I16 => "i16",
            Self::U32 => "u32",
            Self::I32 => "i32",
            Self::U64 => "u64",
            Self::I64 => "i64",
            Self::F32 => "f32",
            Self::F64 => "f64",
        })
    }
}

/// Scalar types an array-like may hold. Only `u8` is accepted by the codec; the others exist
/// so mismatches are reported as [`Error::UnsupportedDtype`] instead of failing to compile.
pub trait Element: Copy + 'static {
    const DTYPE: DType;
}

macro_rules! impl_element {
    ($($ty:ty => $dtype:ident),* $(,)?) => {
        $(impl Element for $ty {
            const DTYPE: DType = DType::$dtype;
        })*
    };
}

impl_element! {
    u8 => U8, i8 => I8, u16 => U16, i16 => I16, u32 => U32,
    i32 => I32, u64 => U64, i64 => I64, f32 => F32, f64 => F64,
}

/// Dtype, shape and strides (in elements) of an array-like.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferLayout {
    pub dtype: DType,
    pub shape: Vec<usize>,
    pub strides: Vec<isize>,
}

/// What to do with a buffer whose pixels are not packed (`strides[1] == channels`,
/// `strides[2] == 1`, non-negative row stride).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ContiguityPolicy {
    /// Fail with [`Error::NonContiguousBuffer`].
    #[default]
    Reject,
    /// Go through a packed scratch copy: gather before encoding, scatter after decoding.
    Copy,
}

/// Read access to a dtype-tagged, strided buffer.
///
/// # Safety
/// `data_ptr` must point at the element with index `[0, 0, ..]`, and for every in-bounds index
/// the element at `sum(index[i] * strides[i])` elements from it must be readable for as long as
/// `self` is borrowed.
pub unsafe trait PixelSource {
    fn buffer_layout(&self) -> BufferLayout;
    fn data_ptr(&self) -> *const u8;
}

/// Write access to a dtype-tagged, strided buffer.
///
/// # Safety
/// As for [`PixelSource`], with every addressed element also writable and not aliased elsewhere
/// while `self` is mutably borrowed. Callers fetch `data_mut_ptr` before `buffer_layout`, since
/// getting mutable access may relocate shared storage.
pub unsafe trait PixelSink: PixelSource {
    fn data_mut_ptr(&mut self) -> *mut u8;
}

unsafe impl<A, S, D> PixelSource for ArrayBase<S, D>
where
    A: Element,
    S: Data<Elem = A>,
    D: Dimension,
{
    fn buffer_layout(&self) -> BufferLayout {
        BufferLayout {
            dtype: A::DTYPE,
            shape: self.shape().to_vec(),
            strides: self.strides().to_vec(),
        }
    }

    fn data_ptr(&self) -> *const u8 {
        self.as_ptr().cast()
    }
}

unsafe impl<A, S, D> PixelSink for ArrayBase<S, D>
where
    A: Element,
    S: DataMut<Elem = A>,
    D: Dimension,
{
    fn data_mut_ptr(&mut self) -> *mut u8 {
        self.as_mut_ptr().cast()
    }
}

fn required_len(width: usize, height: usize, channels: usize, row_stride: usize) -> Result<usize> {
    let shape = [height, width, channels];
    if channels == 0 {
        return Err(Error::shape(&shape, "channel count must be non-zero"));
    }
    let row = width
        .checked_mul(channels)
        .ok_or_else(|| Error::shape(&shape, "row size overflows usize"))?;
    if row_stride < row {
        return Err(Error::BufferSizeMismatch {
            what: "row stride",
            expected: row,
            actual: row_stride,
        });
    }
    if height == 0 {
        return Ok(0);
    }
    (height - 1)
        .checked_mul(row_stride)
        .and_then(|v| v.checked_add(row))
        .ok_or_else(|| Error::shape(&shape, "buffer size overflows usize"))
}

/// Read-only packed `u8` image over a byte slice, rows `row_stride` bytes apart.
#[derive(Debug, Clone, Copy)]
pub struct ImageView<'a> {
    data: &'a [u8],
    width: usize,
    height: usize,
    channels: usize,
    row_stride: usize,
}

impl<'a> ImageView<'a> {
    pub fn new(data: &'a [u8], width: usize, height: usize, channels: usize) -> Result<Self> {
        let row = width
            .checked_mul(channels)
            .ok_or_else(|| Error::shape(&[height, width, channels], "row size overflows usize"))?;
        Self::with_row_stride(data, width, height, channels, row)
    }

    pub fn with_row_stride(
        data: &'a [u8],
        width: usize,
        height: usize,
        channels: usize,
        row_stride: usize,
    ) -> Result<Self> {
        let expected = required_len(width, height, channels, row_stride)?;
        if data.len() < expected {
            return Err(Error::BufferSizeMismatch {
                what: "image buffer length",
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            channels,
            row_stride,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn row_stride(&self) -> usize {
        self.row_stride
    }

    pub fn row(&self, y: usize) -> Option<&'a [u8]> {
        if y >= self.height {
            return None;
        }
        let start = y * self.row_stride;
        self.data.get(start..start + self.width * self.channels)
    }
}

unsafe impl PixelSource for ImageView<'_> {
    fn buffer_layout(&self) -> BufferLayout {
        BufferLayout {
            dtype: DType::U8,
            shape: vec![self.height, self.width, self.channels],
            strides: vec![self.row_stride as isize, self.channels as isize, 1],
        }
    }

    fn data_ptr(&self) -> *const u8 {
        self.data.as_ptr()
    }
}

/// Writable counterpart of [`ImageView`], typically a decode destination.
#[derive(Debug)]
pub struct ImageViewMut<'a> {
    data: &'a mut [u8],
    width: usize,
    height: usize,
    channels: usize,
    row_stride: usize,
}

impl<'a> ImageViewMut<'a> {
    pub fn new(data: &'a mut [u8], width: usize, height: usize, channels: usize) -> Result<Self> {
        let row = width
            .checked_mul(channels)
            .ok_or_else(|| Error::shape(&[height, width, channels], "row size overflows usize"))?;
        Self::with_row_stride(data, width, height, channels, row)
    }

    pub fn with_row_stride(
        data: &'a mut [u8],
        width: usize,
        height: usize,
        channels: usize,
        row_stride: usize,
    ) -> Result<Self> {
        let expected = required_len(width, height, channels, row_stride)?;
        if data.len() < expected {
            return Err(Error::BufferSizeMismatch {
                what: "image buffer length",
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            channels,
            row_stride,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn row_stride(&self) -> usize {
        self.row_stride
    }

    pub fn as_view(&self) -> ImageView<'_> {
        ImageView {
            data: self.data,
            width: self.width,
            height: self.height,
            channels: self.channels,
            row_stride: self.row_stride,
        }
    }
}

unsafe impl PixelSource for ImageViewMut<'_> {
    fn buffer_layout(&self) -> BufferLayout {
        self.as_view().buffer_layout()
    }

    fn data_ptr(&self) -> *const u8 {
        self.data.as_ptr()
    }
}

unsafe impl PixelSink for ImageViewMut<'_> {
    fn data_mut_ptr(&mut self) -> *mut u8 {
        self.data.as_mut_ptr()
    }
}

/// Decoded pixels owned by the crate's caller through a reference-counted array.
///
/// The array is backed directly by the allocation the codec wrote into; the last clone of the
/// array frees it.
#[derive(Debug, Clone)]
pub struct OwnedImage {
    array: ArcArray<u8, Ix3>,
    format: PixelFormat,
}

impl OwnedImage {
    pub fn width(&self) -> usize {
        self.array.shape()[1]
    }

    pub fn height(&self) -> usize {
        self.array.shape()[0]
    }

    pub fn channels(&self) -> usize {
        self.array.shape()[2]
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.format
    }

    pub fn array(&self) -> &ArcArray<u8, Ix3> {
        &self.array
    }

    pub fn into_array(self) -> ArcArray<u8, Ix3> {
        self.array
    }

    /// Packed pixel bytes, row-major.
    pub fn as_bytes(&self) -> &[u8] {
        self.array.as_slice().unwrap_or_default()
    }
}

/// Caller memory a decode wrote into. Holds the caller's mutable borrow.
pub struct BorrowedImage<'a> {
    ptr: *mut u8,
    width: usize,
    height: usize,
    channels: usize,
    strides: [isize; 3],
    format: PixelFormat,
    _marker: PhantomData<&'a mut [u8]>,
}

impl BorrowedImage<'_> {
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.format
    }

    /// Strides in bytes, `(row, pixel, channel)`.
    pub fn strides(&self) -> [isize; 3] {
        self.strides
    }

    fn offset(&self, y: usize, x: usize, c: usize) -> isize {
        y as isize * self.strides[0] + x as isize * self.strides[1] + c as isize * self.strides[2]
    }

    pub fn get(&self, y: usize, x: usize, c: usize) -> Option<u8> {
        if y >= self.height || x >= self.width || c >= self.channels {
            return None;
        }
        // SAFETY: in-bounds index of the sink this view was planned from.
        Some(unsafe { *self.ptr.offset(self.offset(y, x, c)) })
    }

    /// Copy into a freshly allocated packed image.
    pub fn to_owned(&self) -> OwnedImage {
        let array = ArcArray::from_shape_fn((self.height, self.width, self.channels), |(y, x, c)| {
            // SAFETY: in-bounds index, see `get`.
            unsafe { *self.ptr.offset(self.offset(y, x, c)) }
        });
        OwnedImage {
            array,
            format: self.format,
        }
    }

    fn scatter_from(&mut self, packed: &[u8]) {
        let mut src = packed.iter();
        for y in 0..self.height {
            for x in 0..self.width {
                for c in 0..self.channels {
                    let Some(&value) = src.next() else { return };
                    // SAFETY: in-bounds index of a writable sink.
                    unsafe { *self.ptr.offset(self.offset(y, x, c)) = value };
                }
            }
        }
    }
}

impl fmt::Debug for BorrowedImage<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BorrowedImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("channels", &self.channels)
            .field("strides", &self.strides)
            .field("format", &self.format)
            .finish()
    }
}

/// Result of a decode: either the caller's own buffer or a newly owned array.
#[derive(Debug)]
pub enum ImageBuffer<'a> {
    Borrowed(BorrowedImage<'a>),
    Owned(OwnedImage),
}

impl ImageBuffer<'_> {
    pub fn width(&self) -> usize {
        match self {
            Self::Borrowed(img) => img.width(),
            Self::Owned(img) => img.width(),
        }
    }

    pub fn height(&self) -> usize {
        match self {
            Self::Borrowed(img) => img.height(),
            Self::Owned(img) => img.height(),
        }
    }

    pub fn channels(&self) -> usize {
        match self {
            Self::Borrowed(img) => img.channels(),
            Self::Owned(img) => img.channels(),
        }
    }

    pub fn pixel_format(&self) -> PixelFormat {
        match self {
            Self::Borrowed(img) => img.pixel_format(),
            Self::Owned(img) => img.pixel_format(),
        }
    }

    pub fn is_owned(&self) -> bool {
        matches!(self, Self::Owned(_))
    }

    pub fn get(&self, y: usize, x: usize, c: usize) -> Option<u8> {
        match self {
            Self::Borrowed(img) => img.get(y, x, c),
            Self::Owned(img) => img.array().get((y, x, c)).copied(),
        }
    }

    /// The owned image, copying out of caller memory for the borrowed flavour.
    pub fn into_owned(self) -> OwnedImage {
        match self {
            Self::Borrowed(img) => img.to_owned(),
            Self::Owned(img) => img,
        }
    }
}

/// Compressed output: a prefix of the caller's buffer, or an owned immutable byte string.
#[derive(Debug, Clone)]
pub enum Compressed<'a> {
    Borrowed(&'a [u8]),
    Owned(Bytes),
}

impl Compressed<'_> {
    pub fn is_owned(&self) -> bool {
        matches!(self, Self::Owned(_))
    }

    /// Owned bytes; copies only for the borrowed flavour.
    pub fn into_bytes(self) -> Bytes {
        match self {
            Self::Borrowed(slice) => Bytes::copy_from_slice(slice),
            Self::Owned(bytes) => bytes,
        }
    }
}

impl Deref for Compressed<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            Self::Borrowed(slice) => slice,
            Self::Owned(bytes) => bytes,
        }
    }
}

/// Validated `(height, width, channels)` of a `u8` image for `format`.
fn check_image(layout: &BufferLayout, format: PixelFormat) -> Result<(usize, usize, usize)> {
    if layout.dtype != DType::U8 {
        return Err(Error::UnsupportedDtype(layout.dtype));
    }
    let &[height, width, channels] = layout.shape.as_slice() else {
        return Err(Error::shape(
            &layout.shape,
            "expected rank 3 (height, width, channels)",
        ));
    };
    if channels != format.channel_count() {
        return Err(Error::shape(
            &layout.shape,
            format!("{format} needs {} channels", format.channel_count()),
        ));
    }
    if height == 0 || width == 0 {
        return Err(Error::shape(&layout.shape, "image is empty"));
    }
    Ok((height, width, channels))
}

fn strides3(layout: &BufferLayout) -> [isize; 3] {
    [layout.strides[0], layout.strides[1], layout.strides[2]]
}

/// Row pitch in bytes when the pixels are packed, `None` when they are not. Rows that overlap
/// (a stride shorter than one packed row, as in a broadcast) count as not packed.
fn packed_pitch(height: usize, width: usize, channels: usize, strides: [isize; 3]) -> Option<usize> {
    let row = width * channels;
    let pixels_packed = width <= 1 || strides[1] == channels as isize;
    let channels_packed = channels <= 1 || strides[2] == 1;
    if !pixels_packed || !channels_packed {
        return None;
    }
    if height <= 1 {
        return Some(row);
    }
    let pitch = usize::try_from(strides[0]).ok()?;
    (pitch >= row).then_some(pitch)
}

#[derive(Debug)]
enum Target<'a> {
    Owned(Vec<u8>),
    Direct { view: BorrowedImage<'a>, pitch: usize },
    Scatter { scratch: Vec<u8>, view: BorrowedImage<'a> },
}

/// Where a decode writes, planned before the native call.
#[derive(Debug)]
pub(crate) struct DecodeTarget<'a> {
    width: usize,
    height: usize,
    format: PixelFormat,
    target: Target<'a>,
}

pub(crate) fn plan_destination<'a>(
    width: u32,
    height: u32,
    format: PixelFormat,
    dst: Option<&'a mut dyn PixelSink>,
    policy: ContiguityPolicy,
) -> Result<DecodeTarget<'a>> {
    let (width, height) = (width as usize, height as usize);
    let channels = format.channel_count();
    let packed_len = height
        .checked_mul(width)
        .and_then(|v| v.checked_mul(channels))
        .ok_or_else(|| Error::shape(&[height, width, channels], "image size overflows usize"))?;

    let Some(dst) = dst else {
        return Ok(DecodeTarget {
            width,
            height,
            format,
            target: Target::Owned(Vec::with_capacity(packed_len)),
        });
    };

    let ptr = dst.data_mut_ptr();
    let layout = dst.buffer_layout();
    let (dst_height, dst_width, _) = check_image(&layout, format)?;
    if dst_height != height {
        return Err(Error::BufferSizeMismatch {
            what: "destination height",
            expected: height,
            actual: dst_height,
        });
    }
    if dst_width != width {
        return Err(Error::BufferSizeMismatch {
            what: "destination width",
            expected: width,
            actual: dst_width,
        });
    }

    let strides = strides3(&layout);
    let view = BorrowedImage {
        ptr,
        width,
        height,
        channels,
        strides,
        format,
        _marker: PhantomData,
    };
    let target = match (packed_pitch(height, width, channels, strides), policy) {
        (Some(pitch), _) => Target::Direct { view, pitch },
        (None, ContiguityPolicy::Copy) => Target::Scatter {
            scratch: Vec::with_capacity(packed_len),
            view,
        },
        (None, ContiguityPolicy::Reject) => {
            return Err(Error::NonContiguousBuffer {
                strides: layout.strides,
            });
        }
    };
    Ok(DecodeTarget {
        width,
        height,
        format,
        target,
    })
}

impl<'a> DecodeTarget<'a> {
    /// Memory the codec writes into.
    pub(crate) fn as_mut_ptr(&mut self) -> *mut u8 {
        match &mut self.target {
            Target::Owned(buf) | Target::Scatter { scratch: buf, .. } => buf.as_mut_ptr(),
            Target::Direct { view, .. } => view.ptr,
        }
    }

    /// Bytes between row starts in the memory returned by `as_mut_ptr`.
    pub(crate) fn pitch(&self) -> usize {
        match &self.target {
            Target::Direct { pitch, .. } => *pitch,
            _ => self.width * self.format.channel_count(),
        }
    }

    pub(crate) fn is_owned(&self) -> bool {
        matches!(self.target, Target::Owned(_))
    }

    /// Wrap the written memory as the caller-facing buffer.
    ///
    /// # Safety
    /// Every pixel of the planned geometry must have been written through `as_mut_ptr`.
    pub(crate) unsafe fn finish(self) -> Result<ImageBuffer<'a>> {
        let packed_len = self.height * self.width * self.format.channel_count();
        match self.target {
            Target::Owned(mut buf) => {
                unsafe { buf.set_len(packed_len) };
                let shape = (self.height, self.width, self.format.channel_count());
                let array = ArcArray::from_shape_vec(shape, buf)
                    .map_err(|e| Error::shape(&[shape.0, shape.1, shape.2], e.to_string()))?;
                Ok(ImageBuffer::Owned(OwnedImage {
                    array,
                    format: self.format,
                }))
            }
            Target::Direct { view, .. } => Ok(ImageBuffer::Borrowed(view)),
            Target::Scatter {
                mut scratch,
                mut view,
            } => {
                unsafe { scratch.set_len(packed_len) };
                view.scatter_from(&scratch);
                Ok(ImageBuffer::Borrowed(view))
            }
        }
    }
}

enum SourceData {
    Borrowed(*const u8),
    Copied(Vec<u8>),
}

/// Pixels ready to be read by the codec as packed rows.
pub(crate) struct SourceImage<'a> {
    data: SourceData,
    pub(crate) width: usize,
    pub(crate) height: usize,
    pub(crate) pitch: usize,
    _marker: PhantomData<&'a [u8]>,
}

impl SourceImage<'_> {
    pub(crate) fn as_ptr(&self) -> *const u8 {
        match &self.data {
            SourceData::Borrowed(ptr) => *ptr,
            SourceData::Copied(buf) => buf.as_ptr(),
        }
    }

    pub(crate) fn is_copied(&self) -> bool {
        matches!(self.data, SourceData::Copied(_))
    }
}

pub(crate) fn resolve_source<'a>(
    src: &'a dyn PixelSource,
    format: PixelFormat,
    policy: ContiguityPolicy,
) -> Result<SourceImage<'a>> {
    let layout = src.buffer_layout();
    let (height, width, channels) = check_image(&layout, format)?;
    let strides = strides3(&layout);
    let ptr = src.data_ptr();

    let (data, pitch) = match (packed_pitch(height, width, channels, strides), policy) {
        (Some(pitch), _) => (SourceData::Borrowed(ptr), pitch),
        (None, ContiguityPolicy::Copy) => {
            let mut packed = Vec::with_capacity(height * width * channels);
            for y in 0..height {
                for x in 0..width {
                    for c in 0..channels {
                        let offset =
                            y as isize * strides[0] + x as isize * strides[1] + c as isize * strides[2];
                        // SAFETY: in-bounds index per the `PixelSource` contract.
                        packed.push(unsafe { *ptr.offset(offset) });
                    }
                }
            }
            (SourceData::Copied(packed), width * channels)
        }
        (None, ContiguityPolicy::Reject) => {
            return Err(Error::NonContiguousBuffer {
                strides: layout.strides,
            });
        }
    };
    Ok(SourceImage {
        data,
        width,
        height,
        pitch,
        _marker: PhantomData,
    })
}

/// Where compressed bytes go, sized for the codec's worst case.
pub(crate) enum OutputBuffer<'a> {
    Borrowed(&'a mut [u8]),
    Owned(Vec<u8>),
}

pub(crate) fn plan_output(dst: Option<&mut [u8]>, max_size: usize) -> Result<OutputBuffer<'_>> {
    match dst {
        Some(dst) if dst.len() < max_size => Err(Error::BufferSizeMismatch {
            what: "output capacity",
            expected: max_size,
            actual: dst.len(),
        }),
        Some(dst) => Ok(OutputBuffer::Borrowed(dst)),
        None => Ok(OutputBuffer::Owned(Vec::with_capacity(max_size))),
    }
}

impl<'a> OutputBuffer<'a> {
    pub(crate) fn as_mut_ptr(&mut self) -> *mut u8 {
        match self {
            Self::Borrowed(buf) => buf.as_mut_ptr(),
            Self::Owned(buf) => buf.as_mut_ptr(),
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        match self {
            Self::Borrowed(buf) => buf.len(),
            Self::Owned(buf) => buf.capacity(),
        }
    }

    /// Keep exactly the `len` bytes the codec reported.
    ///
    /// # Safety
    /// The first `len` bytes must have been written, and `len <= capacity()`.
    pub(crate) unsafe fn finish(self, len: usize) -> Compressed<'a> {
        match self {
            Self::Borrowed(buf) => {
                let buf: &'a [u8] = buf;
                Compressed::Borrowed(&buf[..len])
            }
            Self::Owned(mut buf) => {
                unsafe { buf.set_len(len) };
                Compressed::Owned(Bytes::from(buf))
            }
        }
    }
}

/// Convert a size to the native `int`, reporting overflow as a shape problem.
pub(crate) fn native_int(value: usize, shape: &[usize]) -> Result<std::ffi::c_int> {
    std::ffi::c_int::try_from(value)
        .map_err(|_| Error::shape(shape, "dimension exceeds the codec's int range"))
}
