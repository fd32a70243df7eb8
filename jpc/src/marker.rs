use log::debug;
use std::io;

use crate::error::HeaderError;
use crate::stream::ByteStream;

pub type MarkerSymbol = [u8; 2];

// Delimiting markers and marker segments
pub const MARKER_SYMBOL_SOC: MarkerSymbol = [255, 79]; // Start of code stream
pub const MARKER_SYMBOL_SOT: MarkerSymbol = [255, 144]; // Start of tile-part
pub const MARKER_SYMBOL_SOD: MarkerSymbol = [255, 147]; // Start of data
pub const MARKER_SYMBOL_EOC: MarkerSymbol = [255, 217]; // End of codestream

// Fixed information marker segments
pub const MARKER_SYMBOL_SIZ: MarkerSymbol = [255, 81]; // Image and tile size
pub const MARKER_SYMBOL_CAP: MarkerSymbol = [255, 80]; // Extended capabilities

// Functional marker segments
pub const MARKER_SYMBOL_COD: MarkerSymbol = [255, 82]; // Coding style default
pub const MARKER_SYMBOL_COC: MarkerSymbol = [255, 83]; // Coding style component
pub const MARKER_SYMBOL_RGN: MarkerSymbol = [255, 94]; // Region-of-interest
pub const MARKER_SYMBOL_QCD: MarkerSymbol = [255, 92]; // Quantization default
pub const MARKER_SYMBOL_QCC: MarkerSymbol = [255, 93]; // Quantization component
pub const MARKER_SYMBOL_POC: MarkerSymbol = [255, 95]; // Progression order change

// Pointer marker segments
pub const MARKER_SYMBOL_TLM: MarkerSymbol = [255, 85]; // Tile-part lengths
pub const MARKER_SYMBOL_PLM: MarkerSymbol = [255, 87]; // Packet length, main header
pub const MARKER_SYMBOL_PLT: MarkerSymbol = [255, 88]; // Packet length, tile-part header
pub const MARKER_SYMBOL_PPM: MarkerSymbol = [255, 96]; // Packed packet headers, main header
pub const MARKER_SYMBOL_PPT: MarkerSymbol = [255, 97]; // Packed packet headers, tile-part header

// In bit stream markers and marker segments
pub const MARKER_SYMBOL_SOP: MarkerSymbol = [255, 145]; // Start of packet
pub const MARKER_SYMBOL_EPH: MarkerSymbol = [255, 146]; // End of packet header

// Informational marker segments
pub const MARKER_SYMBOL_CRG: MarkerSymbol = [255, 99]; // Component registration
pub const MARKER_SYMBOL_COM: MarkerSymbol = [255, 100]; // Comment

/// Every marker the codestream parser knows how to dispatch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerKind {
    StartOfCodestream,
    Capabilities,
    ImageAndTileSize,
    CodingStyleDefault,
    CodingStyleComponent,
    TilePartLengths,
    PacketLengthMain,
    PacketLengthTile,
    QuantizationDefault,
    QuantizationComponent,
    RegionOfInterest,
    ProgressionOrderChange,
    PackedPacketHeadersMain,
    PackedPacketHeadersTile,
    ComponentRegistration,
    Comment,
    StartOfTilePart,
    StartOfPacket,
    EndOfPacketHeader,
    StartOfData,
    EndOfCodestream,
    Unknown(MarkerSymbol),
}

impl MarkerKind {
    pub fn new(symbol: MarkerSymbol) -> MarkerKind {
        match symbol {
            MARKER_SYMBOL_SOC => MarkerKind::StartOfCodestream,
            MARKER_SYMBOL_CAP => MarkerKind::Capabilities,
            MARKER_SYMBOL_SIZ => MarkerKind::ImageAndTileSize,
            MARKER_SYMBOL_COD => MarkerKind::CodingStyleDefault,
            MARKER_SYMBOL_COC => MarkerKind::CodingStyleComponent,
            MARKER_SYMBOL_TLM => MarkerKind::TilePartLengths,
            MARKER_SYMBOL_PLM => MarkerKind::PacketLengthMain,
            MARKER_SYMBOL_PLT => MarkerKind::PacketLengthTile,
            MARKER_SYMBOL_QCD => MarkerKind::QuantizationDefault,
            MARKER_SYMBOL_QCC => MarkerKind::QuantizationComponent,
            MARKER_SYMBOL_RGN => MarkerKind::RegionOfInterest,
            MARKER_SYMBOL_POC => MarkerKind::ProgressionOrderChange,
            MARKER_SYMBOL_PPM => MarkerKind::PackedPacketHeadersMain,
            MARKER_SYMBOL_PPT => MarkerKind::PackedPacketHeadersTile,
            MARKER_SYMBOL_CRG => MarkerKind::ComponentRegistration,
            MARKER_SYMBOL_COM => MarkerKind::Comment,
            MARKER_SYMBOL_SOT => MarkerKind::StartOfTilePart,
            MARKER_SYMBOL_SOP => MarkerKind::StartOfPacket,
            MARKER_SYMBOL_EPH => MarkerKind::EndOfPacketHeader,
            MARKER_SYMBOL_SOD => MarkerKind::StartOfData,
            MARKER_SYMBOL_EOC => MarkerKind::EndOfCodestream,
            _ => MarkerKind::Unknown(symbol),
        }
    }

    pub fn symbol(&self) -> MarkerSymbol {
        match self {
            MarkerKind::StartOfCodestream => MARKER_SYMBOL_SOC,
            MarkerKind::Capabilities => MARKER_SYMBOL_CAP,
            MarkerKind::ImageAndTileSize => MARKER_SYMBOL_SIZ,
            MarkerKind::CodingStyleDefault => MARKER_SYMBOL_COD,
            MarkerKind::CodingStyleComponent => MARKER_SYMBOL_COC,
            MarkerKind::TilePartLengths => MARKER_SYMBOL_TLM,
            MarkerKind::PacketLengthMain => MARKER_SYMBOL_PLM,
            MarkerKind::PacketLengthTile => MARKER_SYMBOL_PLT,
            MarkerKind::QuantizationDefault => MARKER_SYMBOL_QCD,
            MarkerKind::QuantizationComponent => MARKER_SYMBOL_QCC,
            MarkerKind::RegionOfInterest => MARKER_SYMBOL_RGN,
            MarkerKind::ProgressionOrderChange => MARKER_SYMBOL_POC,
            MarkerKind::PackedPacketHeadersMain => MARKER_SYMBOL_PPM,
            MarkerKind::PackedPacketHeadersTile => MARKER_SYMBOL_PPT,
            MarkerKind::ComponentRegistration => MARKER_SYMBOL_CRG,
            MarkerKind::Comment => MARKER_SYMBOL_COM,
            MarkerKind::StartOfTilePart => MARKER_SYMBOL_SOT,
            MarkerKind::StartOfPacket => MARKER_SYMBOL_SOP,
            MarkerKind::EndOfPacketHeader => MARKER_SYMBOL_EPH,
            MarkerKind::StartOfData => MARKER_SYMBOL_SOD,
            MarkerKind::EndOfCodestream => MARKER_SYMBOL_EOC,
            MarkerKind::Unknown(symbol) => *symbol,
        }
    }

    /// Whether a length-prefixed segment follows the marker.
    ///
    /// Delimiting markers carry no segment, and neither do the reserved codes
    /// 0xFF30 to 0xFF3F (A.1.3).
    pub fn has_segment(&self) -> bool {
        match self {
            MarkerKind::StartOfCodestream
            | MarkerKind::StartOfData
            | MarkerKind::EndOfCodestream
            | MarkerKind::EndOfPacketHeader => false,
            MarkerKind::Unknown([0xFF, code]) => !(0x30..=0x3F).contains(code),
            _ => true,
        }
    }
}

/// A marker segment as it sits in the stream.
#[derive(Debug)]
pub struct MarkerSegment {
    pub kind: MarkerKind,

    // Byte offset of the marker itself.
    pub offset: u64,

    // Length of marker segment in bytes (not including the marker).
    pub length: u16,

    pub payload: Vec<u8>,
}

impl MarkerSegment {
    pub fn reader(&self) -> io::Cursor<&[u8]> {
        io::Cursor::new(self.payload.as_slice())
    }

    /// Maps a short read inside the payload to a header error.
    pub fn too_short(&self) -> HeaderError {
        HeaderError::SegmentTooShort {
            marker: self.kind.symbol(),
            offset: self.offset,
        }
    }
}

/// Reads the length and payload of the segment following `kind`, with the
/// stream positioned right after the marker.
///
/// A length below 2 or one reaching past the end of the stream is rejected
/// before anything is allocated.
pub fn read_marker_segment(
    stream: &mut ByteStream,
    kind: MarkerKind,
) -> Result<MarkerSegment, HeaderError> {
    let offset = position(stream)?.saturating_sub(2);

    let length = u16::from_be_bytes(read_or_truncated(stream, |s| s.read_array::<2>())?);
    let remaining = stream.remaining()?;

    if length < 2 || (length as u64 - 2) > remaining {
        return Err(HeaderError::SegmentLength {
            marker: kind.symbol(),
            offset,
            length,
            remaining,
        });
    }

    let payload = read_or_truncated(stream, |s| s.read(length as usize - 2))?;
    debug!(
        "{:?} segment at byte offset {} with length {}",
        kind, offset, length
    );

    Ok(MarkerSegment {
        kind,
        offset,
        length,
        payload,
    })
}

/// Reads the next two bytes as a marker.
pub fn read_marker(stream: &mut ByteStream) -> Result<MarkerKind, HeaderError> {
    let symbol = read_or_truncated(stream, |s| s.read_array::<2>())?;
    Ok(MarkerKind::new(symbol))
}

fn position(stream: &mut ByteStream) -> Result<u64, HeaderError> {
    Ok(stream.position()?)
}

/// Running out of data is a truncated codestream, any other failure is
/// passed on as is.
fn read_or_truncated<T>(
    stream: &mut ByteStream,
    read: impl FnOnce(&mut ByteStream) -> io::Result<T>,
) -> Result<T, HeaderError> {
    let offset = position(stream)?;
    read(stream).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => HeaderError::Truncated { offset },
        _ => HeaderError::Io(e),
    })
}
