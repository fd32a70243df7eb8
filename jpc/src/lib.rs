//! Tiled JPEG 2000 codestream decoding.
//!
//! The [`Decoder`] reads the main header of a codestream (ITU-T T.800 /
//! ISO/IEC 15444-1 Annex A), divides the image into tiles (Annex B) and
//! decodes them one at a time into an [`ImageBuffer`]. Turning the compressed
//! data of a tile back into samples is left to a [`TileCodec`].

mod codec;
mod decoder;
mod error;
mod event;
mod header;
mod image;
mod marker;
mod segment;
mod stream;
mod tile;
mod tile_decoder;

pub use codec::{
    ComponentCodingParameters, ComponentGeometry, TileCodec, TileCodingParameters, TileGeometry,
    UncompressedCodec,
};
pub use decoder::{Decoder, DecoderConfig, DecoderState, Outcome, TileProgress};
pub use error::{
    CodecError, ConfigError, DecodeError, HeaderError, ImageError, TileDecodeError, TileError,
    TileIndexOutOfRange,
};
pub use event::{EventHandler, LogEvents, NoopEvents};
pub use header::{parse_header, ComponentInfo, Header, SkippedSegment, TileGridInfo};
pub use image::{ComponentBuffer, ImageBuffer};
pub use marker::{
    read_marker, read_marker_segment, MarkerKind, MarkerSegment, MarkerSymbol, MARKER_SYMBOL_CAP,
    MARKER_SYMBOL_COC, MARKER_SYMBOL_COD, MARKER_SYMBOL_COM, MARKER_SYMBOL_CRG, MARKER_SYMBOL_EOC,
    MARKER_SYMBOL_EPH, MARKER_SYMBOL_PLM, MARKER_SYMBOL_PLT, MARKER_SYMBOL_POC, MARKER_SYMBOL_PPM,
    MARKER_SYMBOL_PPT, MARKER_SYMBOL_QCC, MARKER_SYMBOL_QCD, MARKER_SYMBOL_RGN, MARKER_SYMBOL_SIZ,
    MARKER_SYMBOL_SOC, MARKER_SYMBOL_SOD, MARKER_SYMBOL_SOP, MARKER_SYMBOL_SOT, MARKER_SYMBOL_TLM,
};
pub use segment::{
    CodingStyleComponentSegment, CodingStyleMarkerSegment, CodingStyleParameters,
    CommentMarkerSegment, CommentRegistrationValue, ImageAndTileSizeMarkerSegment,
    MultipleComponentTransformation, PrecinctSize, ProgressionOrder, QuantizationComponentSegment,
    QuantizationDefaultMarkerSegment, QuantizationParameters, QuantizationStyle,
    StartOfTileSegment, TilePartLength, TilePartLengthsSegment, TransformationFilter,
};
pub use stream::ByteStream;
pub use tile::{Rect, TilePartition};
pub use tile_decoder::{
    TileComponent, TileData, TileDecodeResult, TileDecoder, TilePartHeader, TilePartLocation,
    TilePayload,
};
