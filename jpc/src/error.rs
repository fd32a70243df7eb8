use std::io;

use thiserror::Error;

use crate::decoder::DecoderState;
use crate::marker::MarkerSymbol;

fn symbol(marker: &MarkerSymbol) -> String {
    format!("0x{:0>2X}{:0>2X}", marker[0], marker[1])
}

/// Structural problems found while reading marker segments.
///
/// Used for the main header and, wrapped in [`TileError::MalformedTilePart`],
/// for tile-part headers.
#[derive(Debug, Error)]
pub enum HeaderError {
    #[error("marker {} error {error:?}", symbol(.marker))]
    MarkerError { marker: MarkerSymbol, error: String },

    #[error("missing marker {}", symbol(.marker))]
    MarkerMissing { marker: MarkerSymbol },

    #[error("unexpected marker {} at byte offset {offset}", symbol(.marker))]
    MarkerUnexpected { marker: MarkerSymbol, offset: u64 },

    #[error(
        "marker {} at byte offset {offset} declares length {length} but {remaining} bytes remain",
        symbol(.marker)
    )]
    SegmentLength {
        marker: MarkerSymbol,
        offset: u64,
        length: u16,
        remaining: u64,
    },

    #[error("marker {} at byte offset {offset} is shorter than its fields", symbol(.marker))]
    SegmentTooShort { marker: MarkerSymbol, offset: u64 },

    #[error("codestream truncated at byte offset {offset}")]
    Truncated { offset: u64 },

    // Anything but running out of data.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("empty image area: Xsiz = {width}, Ysiz = {height}, XOsiz = {x_offset}, YOsiz = {y_offset}")]
    EmptyImage {
        width: u32,
        height: u32,
        x_offset: u32,
        y_offset: u32,
    },

    #[error("tile size must be non-zero: XTsiz = {tile_width}, YTsiz = {tile_height}")]
    EmptyTile { tile_width: u32, tile_height: u32 },

    // 0 ≤ XTOsiz ≤ XOsiz, 0 ≤ YTOsiz ≤ YOsiz
    #[error(
        "tile grid offset overflow: XOSiz = {image_horizontal_offset}, YOsiz = {image_vertical_offset}, XTOsiz = {tile_horizontal_offset}, YTOsiz = {tile_vertical_offset}"
    )]
    TileGridOffsetOverflow {
        tile_horizontal_offset: u32,
        tile_vertical_offset: u32,
        image_horizontal_offset: u32,
        image_vertical_offset: u32,
    },

    // XTsiz + XTOsiz > XOsiz, YTsiz + YTOsiz > YOsiz
    #[error(
        "tile size overflow: XOSiz = {image_horizontal_offset}, YOsiz = {image_vertical_offset}, XTOsiz = {tile_horizontal_offset}, YTOsiz = {tile_vertical_offset}, XTsize = {reference_tile_width}, YTsize = {reference_tile_height}"
    )]
    TileSizeOverflow {
        image_horizontal_offset: u32,
        image_vertical_offset: u32,
        tile_horizontal_offset: u32,
        tile_vertical_offset: u32,
        reference_tile_width: u32,
        reference_tile_height: u32,
    },

    #[error("component count {count} outside 1..={max}")]
    ComponentCount { count: u16, max: u16 },

    #[error("component {component} bit depth {depth} outside 1..={max}")]
    BitDepth { component: u16, depth: u8, max: u8 },

    #[error("component {component} has a zero sub-sampling factor")]
    Subsampling { component: u16 },

    #[error("tile count {count} exceeds 65535")]
    TooManyTiles { count: u64 },

    #[error("image holds {samples} samples, limit is {max}")]
    ImageTooLarge { samples: u64, max: u64 },

    #[error("marker {} refers to component {component} of {no_components}", symbol(.marker))]
    ComponentIndex {
        marker: MarkerSymbol,
        component: u16,
        no_components: u16,
    },
}

/// Failure reported by the entropy/wavelet collaborator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("payload holds {actual} bytes, expected {expected}")]
    PayloadLength { expected: usize, actual: usize },

    #[error("component {component} precision {precision} outside 1..=31 bits")]
    Precision { component: usize, precision: u8 },

    #[error("component {component} sample {value} does not fit {precision} bits")]
    SampleOutOfRange {
        component: usize,
        value: i64,
        precision: u8,
    },

    #[error("component {component} has {actual} samples, expected {expected}")]
    SampleCount {
        component: usize,
        expected: usize,
        actual: usize,
    },

    #[error("{actual} components reconstructed, expected {expected}")]
    ComponentCount { expected: usize, actual: usize },

    #[error("unsupported coding parameters: {0}")]
    Unsupported(String),

    #[error("corrupt entropy-coded data: {0}")]
    Corrupt(String),
}

/// Why a single tile could not be decoded.
#[derive(Debug, Error)]
pub enum TileError {
    #[error("tile index out of range (total tiles {total_tiles})")]
    IndexOutOfRange { total_tiles: u32 },

    #[error("no tile-part found")]
    MissingTilePart,

    #[error("found {found} of {expected} tile-parts")]
    IncompleteTile { found: usize, expected: u8 },

    #[error("tile-part {found} found where tile-part {expected} was expected")]
    TilePartOrder { expected: usize, found: u8 },

    #[error("tile-part declares {declared} bytes but only {available} are available")]
    Truncated { declared: u64, available: u64 },

    #[error("malformed tile-part header: {0}")]
    MalformedTilePart(HeaderError),

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl From<HeaderError> for TileError {
    fn from(error: HeaderError) -> TileError {
        match error {
            HeaderError::Io(e) => TileError::Io(e),
            other => TileError::MalformedTilePart(other),
        }
    }
}

#[derive(Debug, Error)]
#[error("failed to decode tile {tile_index}: {reason}")]
pub struct TileDecodeError {
    pub tile_index: u32,
    pub reason: TileError,
}

impl TileDecodeError {
    pub fn new(tile_index: u32, reason: impl Into<TileError>) -> TileDecodeError {
        TileDecodeError {
            tile_index,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("tile index {tile_index} out of range (total tiles {total_tiles})")]
pub struct TileIndexOutOfRange {
    pub tile_index: u32,
    pub total_tiles: u32,
}

/// Rejected writes into the [`ImageBuffer`](crate::ImageBuffer).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ImageError {
    #[error("tile {tile_index} was already written")]
    TileAlreadyWritten { tile_index: u32 },

    #[error("tile {tile_index} out of range (total tiles {total_tiles})")]
    TileOutOfRange { tile_index: u32, total_tiles: u32 },

    #[error("tile carries {actual} components, image has {expected}")]
    ComponentMismatch { expected: usize, actual: usize },

    #[error("component {component} region ({x0}, {y0})-({x1}, {y1}) lies outside the component")]
    OutOfBounds {
        component: usize,
        x0: u32,
        y0: u32,
        x1: u32,
        y1: u32,
    },

    #[error("component {component} carries {actual} samples for a region of {expected}")]
    SampleCount {
        component: usize,
        expected: usize,
        actual: usize,
    },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("max_components must be at least 1")]
    NoComponents,

    #[error("max_bit_depth {0} outside 1..=31")]
    BitDepth(u8),

    #[error("max_image_samples must be at least 1")]
    NoSamples,
}

/// Top level error returned by the [`Decoder`](crate::Decoder) facade.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("malformed header: {0}")]
    MalformedHeader(HeaderError),

    #[error(transparent)]
    Tile(#[from] TileDecodeError),

    #[error(transparent)]
    TileIndex(#[from] TileIndexOutOfRange),

    #[error("image buffer: {0}")]
    Image(#[from] ImageError),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("{operation} is not allowed in state {state:?}")]
    InvalidState {
        operation: &'static str,
        state: DecoderState,
    },
}

impl From<HeaderError> for DecodeError {
    fn from(error: HeaderError) -> DecodeError {
        match error {
            HeaderError::Io(e) => DecodeError::Io(e),
            other => DecodeError::MalformedHeader(other),
        }
    }
}
