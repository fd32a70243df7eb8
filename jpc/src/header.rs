use log::{debug, info};

use crate::decoder::DecoderConfig;
use crate::error::{DecodeError, HeaderError};
use crate::event::EventHandler;
use crate::marker::{
    read_marker, read_marker_segment, MarkerKind, MarkerSymbol, MARKER_SYMBOL_COC,
    MARKER_SYMBOL_COD, MARKER_SYMBOL_QCC, MARKER_SYMBOL_QCD,
};
use crate::segment::{
    CodingStyleComponentSegment, CodingStyleMarkerSegment, CodingStyleParameters,
    CommentMarkerSegment, ImageAndTileSizeMarkerSegment, QuantizationComponentSegment,
    QuantizationDefaultMarkerSegment, QuantizationParameters, TilePartLengthsSegment,
};
use crate::stream::ByteStream;
use crate::tile::ceil_div;

// Isot is 16 bits wide.
const MAX_TILES: u64 = 65535;

/// Per-component sample format from SIZ.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentInfo {
    pub precision: u8,
    pub signed: bool,
    pub dx: u8,
    pub dy: u8,
}

/// A main-header segment that was recognised but not interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkippedSegment {
    pub marker: MarkerSymbol,
    pub offset: u64,
    pub length: u16,
}

/// Main header of a codestream, immutable once parsed.
#[derive(Debug, Clone)]
pub struct Header {
    // SIZ (Required)
    image_and_tile_size_marker_segment: ImageAndTileSizeMarkerSegment,

    // COD (Required)
    coding_style_marker_segment: CodingStyleMarkerSegment,

    // COC (Optional, no more than one per component)
    coding_style_component_segments: Vec<CodingStyleComponentSegment>,

    // QCD (Required)
    quantization_default_marker_segment: QuantizationDefaultMarkerSegment,

    // QCC (Optional, no more than one per component)
    quantization_component_segments: Vec<QuantizationComponentSegment>,

    // TLM (Optional, repeatable)
    tile_part_lengths_segments: Vec<TilePartLengthsSegment>,

    // COM (Optional, repeatable)
    comment_marker_segments: Vec<CommentMarkerSegment>,

    // RGN, POC, PLM, PPM, CRG and CAP
    skipped_segments: Vec<SkippedSegment>,

    components: Vec<ComponentInfo>,
}

impl Header {
    pub fn image_and_tile_size_marker_segment(&self) -> &ImageAndTileSizeMarkerSegment {
        &self.image_and_tile_size_marker_segment
    }

    pub fn coding_style_marker_segment(&self) -> &CodingStyleMarkerSegment {
        &self.coding_style_marker_segment
    }

    /// Coding style component (COC) segments
    ///
    /// If present, the values in these segments override the COD coding style
    /// for a specific component. These values can in turn be overridden for
    /// specific tile parts.
    ///
    /// See ITU-T T.800 or ISO/IEC 15444-1:2019 Section A.6.2.
    pub fn coding_style_component_segments(&self) -> &[CodingStyleComponentSegment] {
        &self.coding_style_component_segments
    }

    pub fn quantization_default_marker_segment(&self) -> &QuantizationDefaultMarkerSegment {
        &self.quantization_default_marker_segment
    }

    /// Quantization component (QCC) segments
    ///
    /// See ITU-T T.800 or ISO/IEC 15444-1:2019 Section A.6.5.
    pub fn quantization_component_segments(&self) -> &[QuantizationComponentSegment] {
        &self.quantization_component_segments
    }

    /// Tile-part lengths (TLM) segments
    ///
    /// See ITU-T T.800 or ISO/IEC 15444-1:2019 Section A.7.1.
    pub fn tile_part_lengths_segments(&self) -> &[TilePartLengthsSegment] {
        &self.tile_part_lengths_segments
    }

    pub fn comment_marker_segments(&self) -> &[CommentMarkerSegment] {
        &self.comment_marker_segments
    }

    pub fn skipped_segments(&self) -> &[SkippedSegment] {
        &self.skipped_segments
    }

    /// Width of the image area, `Xsiz - XOsiz`.
    pub fn width(&self) -> u32 {
        let siz = &self.image_and_tile_size_marker_segment;
        siz.reference_grid_width() - siz.image_horizontal_offset()
    }

    /// Height of the image area, `Ysiz - YOsiz`.
    pub fn height(&self) -> u32 {
        let siz = &self.image_and_tile_size_marker_segment;
        siz.reference_grid_height() - siz.image_vertical_offset()
    }

    pub fn x_offset(&self) -> u32 {
        self.image_and_tile_size_marker_segment.image_horizontal_offset()
    }

    pub fn y_offset(&self) -> u32 {
        self.image_and_tile_size_marker_segment.image_vertical_offset()
    }

    pub fn reference_grid_width(&self) -> u32 {
        self.image_and_tile_size_marker_segment.reference_grid_width()
    }

    pub fn reference_grid_height(&self) -> u32 {
        self.image_and_tile_size_marker_segment.reference_grid_height()
    }

    pub fn tile_width(&self) -> u32 {
        self.image_and_tile_size_marker_segment.reference_tile_width()
    }

    pub fn tile_height(&self) -> u32 {
        self.image_and_tile_size_marker_segment.reference_tile_height()
    }

    pub fn tile_x_offset(&self) -> u32 {
        self.image_and_tile_size_marker_segment.tile_horizontal_offset()
    }

    pub fn tile_y_offset(&self) -> u32 {
        self.image_and_tile_size_marker_segment.tile_vertical_offset()
    }

    pub fn no_components(&self) -> u16 {
        self.components.len() as u16
    }

    pub fn components(&self) -> &[ComponentInfo] {
        &self.components
    }

    pub fn component(&self, c: usize) -> Option<&ComponentInfo> {
        self.components.get(c)
    }

    /// Width of component `c` on its own sample grid,
    /// `ceil(Xsiz / XRsiz) - ceil(XOsiz / XRsiz)`.
    pub fn component_width(&self, c: usize) -> Option<u32> {
        self.components.get(c).map(|info| {
            let dx = info.dx as u32;
            ceil_div(self.reference_grid_width(), dx) - ceil_div(self.x_offset(), dx)
        })
    }

    pub fn component_height(&self, c: usize) -> Option<u32> {
        self.components.get(c).map(|info| {
            let dy = info.dy as u32;
            ceil_div(self.reference_grid_height(), dy) - ceil_div(self.y_offset(), dy)
        })
    }

    /// Coding style of component `c` from the main header, COC over COD.
    pub fn coding_style(&self, c: u16) -> &CodingStyleParameters {
        self.coding_style_component_segments
            .iter()
            .rev()
            .find(|coc| coc.component_index() == c)
            .map(|coc| coc.coding_style_parameters())
            .unwrap_or_else(|| self.coding_style_marker_segment.coding_style_parameters())
    }

    /// Quantization of component `c` from the main header, QCC over QCD.
    pub fn quantization(&self, c: u16) -> &QuantizationParameters {
        self.quantization_component_segments
            .iter()
            .rev()
            .find(|qcc| qcc.component_index() == c)
            .map(|qcc| qcc.parameters())
            .unwrap_or_else(|| self.quantization_default_marker_segment.parameters())
    }
}

/// Tile grid facts gathered while parsing the main header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileGridInfo {
    pub tiles_x: u32,
    pub tiles_y: u32,

    // Byte offset of the SOC marker.
    pub codestream_offset: u64,

    // Byte offset of the first SOT marker.
    pub first_tile_part_offset: u64,
}

impl TileGridInfo {
    pub fn total_tiles(&self) -> u32 {
        self.tiles_x * self.tiles_y
    }
}

fn validate_siz(
    siz: &ImageAndTileSizeMarkerSegment,
    config: &DecoderConfig,
) -> Result<(u32, u32, Vec<ComponentInfo>), HeaderError> {
    let no_components = siz.no_components();
    if no_components == 0 || no_components > config.max_components {
        return Err(HeaderError::ComponentCount {
            count: no_components,
            max: config.max_components,
        });
    }

    if siz.reference_grid_width() <= siz.image_horizontal_offset()
        || siz.reference_grid_height() <= siz.image_vertical_offset()
    {
        return Err(HeaderError::EmptyImage {
            width: siz.reference_grid_width(),
            height: siz.reference_grid_height(),
            x_offset: siz.image_horizontal_offset(),
            y_offset: siz.image_vertical_offset(),
        });
    }

    if siz.reference_tile_width() == 0 || siz.reference_tile_height() == 0 {
        return Err(HeaderError::EmptyTile {
            tile_width: siz.reference_tile_width(),
            tile_height: siz.reference_tile_height(),
        });
    }

    // The tile grid offsets (XTOsiz, YTOsiz) are constrained to be no
    // greater than the image area offsets.
    // 0 ≤ XTOsiz ≤ XOsiz
    // 0 ≤ YTOsiz ≤ YOsiz
    if siz.tile_horizontal_offset() > siz.image_horizontal_offset()
        || siz.tile_vertical_offset() > siz.image_vertical_offset()
    {
        return Err(HeaderError::TileGridOffsetOverflow {
            tile_horizontal_offset: siz.tile_horizontal_offset(),
            image_horizontal_offset: siz.image_horizontal_offset(),
            tile_vertical_offset: siz.tile_vertical_offset(),
            image_vertical_offset: siz.image_vertical_offset(),
        });
    }

    // The first tile (tile 0) must contain at least one reference grid point
    // from the image area.
    // XTsiz + XTOsiz > XOsiz
    // YTsiz + YTOsiz > YOsiz
    if (siz.reference_tile_width() as u64 + siz.tile_horizontal_offset() as u64)
        <= siz.image_horizontal_offset() as u64
        || (siz.reference_tile_height() as u64 + siz.tile_vertical_offset() as u64)
            <= siz.image_vertical_offset() as u64
    {
        return Err(HeaderError::TileSizeOverflow {
            reference_tile_width: siz.reference_tile_width(),
            tile_horizontal_offset: siz.tile_horizontal_offset(),
            image_horizontal_offset: siz.image_horizontal_offset(),
            reference_tile_height: siz.reference_tile_height(),
            tile_vertical_offset: siz.tile_vertical_offset(),
            image_vertical_offset: siz.image_vertical_offset(),
        });
    }

    let tiles_x = ceil_div(
        siz.reference_grid_width() - siz.tile_horizontal_offset(),
        siz.reference_tile_width(),
    );
    let tiles_y = ceil_div(
        siz.reference_grid_height() - siz.tile_vertical_offset(),
        siz.reference_tile_height(),
    );
    let count = tiles_x as u64 * tiles_y as u64;
    if count > MAX_TILES {
        return Err(HeaderError::TooManyTiles { count });
    }

    let mut components = Vec::with_capacity(no_components as usize);
    let mut samples: u64 = 0;
    for c in 0..no_components {
        let i = c as usize;
        let info = ComponentInfo {
            precision: siz.precision(i).unwrap_or_default(),
            signed: siz.values_are_signed(i).unwrap_or_default(),
            dx: siz.horizontal_separation(i).unwrap_or_default(),
            dy: siz.vertical_separation(i).unwrap_or_default(),
        };

        if info.precision == 0 || info.precision > config.max_bit_depth {
            return Err(HeaderError::BitDepth {
                component: c,
                depth: info.precision,
                max: config.max_bit_depth,
            });
        }
        if info.dx == 0 || info.dy == 0 {
            return Err(HeaderError::Subsampling { component: c });
        }

        let width = ceil_div(siz.reference_grid_width(), info.dx as u32)
            - ceil_div(siz.image_horizontal_offset(), info.dx as u32);
        let height = ceil_div(siz.reference_grid_height(), info.dy as u32)
            - ceil_div(siz.image_vertical_offset(), info.dy as u32);
        samples += width as u64 * height as u64;

        components.push(info);
    }

    if samples > config.max_image_samples {
        return Err(HeaderError::ImageTooLarge {
            samples,
            max: config.max_image_samples,
        });
    }

    Ok((tiles_x, tiles_y, components))
}

/// Rejects a second COC or QCC for the same component within one header.
pub(crate) fn one_per_component(
    marker: MarkerSymbol,
    components: impl Iterator<Item = u16>,
) -> Result<(), HeaderError> {
    let mut seen = Vec::new();
    for component in components {
        if seen.contains(&component) {
            return Err(HeaderError::MarkerError {
                marker,
                error: format!("more than one segment for component {}", component),
            });
        }
        seen.push(component);
    }
    Ok(())
}

// A.3 - Construction of the main header
/// Parses the main header starting at the stream's current position.
///
/// On success the stream is left positioned at the first SOT marker.
pub fn parse_header(
    stream: &mut ByteStream,
    config: &DecoderConfig,
    events: &dyn EventHandler,
) -> Result<(Header, TileGridInfo), DecodeError> {
    let codestream_offset = stream.position()?;

    // SOC (Required as the first marker)
    let marker = read_marker(stream)?;
    if marker != MarkerKind::StartOfCodestream {
        return Err(HeaderError::MarkerUnexpected {
            marker: marker.symbol(),
            offset: codestream_offset,
        }
        .into());
    }
    info!("SOC at byte offset {}", codestream_offset);

    // SIZ (Required as the second marker segment)
    let marker = read_marker(stream)?;
    if marker != MarkerKind::ImageAndTileSize {
        return Err(HeaderError::MarkerUnexpected {
            marker: marker.symbol(),
            offset: codestream_offset + 2,
        }
        .into());
    }
    let segment = read_marker_segment(stream, marker)?;
    let siz = ImageAndTileSizeMarkerSegment::decode(&segment)?;
    info!("SIZ at byte offset {}", segment.offset);

    let (tiles_x, tiles_y, components) = validate_siz(&siz, config)?;
    let no_components = siz.no_components();

    let mut cod = None;
    let mut qcd = None;
    let mut cocs = Vec::new();
    let mut qccs = Vec::new();
    let mut tlms = Vec::new();
    let mut comments = Vec::new();
    let mut skipped = Vec::new();

    let first_tile_part_offset = loop {
        let offset = stream.position()?;
        let marker = read_marker(stream)?;

        match marker {
            // COD (Required)
            MarkerKind::CodingStyleDefault => {
                let segment = read_marker_segment(stream, marker)?;
                info!("COD at byte offset {}", offset);
                cod = Some(CodingStyleMarkerSegment::decode(&segment)?);
            }

            // COC (Optional, no more than one COC per component)
            MarkerKind::CodingStyleComponent => {
                let segment = read_marker_segment(stream, marker)?;
                info!("COC at byte offset {}", offset);
                cocs.push(CodingStyleComponentSegment::decode(&segment, no_components)?);
            }

            // QCD (Required)
            MarkerKind::QuantizationDefault => {
                let segment = read_marker_segment(stream, marker)?;
                info!("QCD at byte offset {}", offset);
                qcd = Some(QuantizationDefaultMarkerSegment::decode(&segment)?);
            }

            // QCC (Optional, no more than one QCC per component)
            MarkerKind::QuantizationComponent => {
                let segment = read_marker_segment(stream, marker)?;
                info!("QCC at byte offset {}", offset);
                qccs.push(QuantizationComponentSegment::decode(&segment, no_components)?);
            }

            // TLM (Optional)
            MarkerKind::TilePartLengths => {
                let segment = read_marker_segment(stream, marker)?;
                info!("TLM at byte offset {}", offset);
                tlms.push(TilePartLengthsSegment::decode(&segment)?);
            }

            // COM (Optional)
            MarkerKind::Comment => {
                let segment = read_marker_segment(stream, marker)?;
                info!("COM at byte offset {}", offset);
                let comment = CommentMarkerSegment::decode(&segment)?;
                if let Ok(text) = comment.comment_utf8() {
                    debug!("comment {:?}", text);
                }
                comments.push(comment);
            }

            MarkerKind::RegionOfInterest
            | MarkerKind::ProgressionOrderChange
            | MarkerKind::PacketLengthMain
            | MarkerKind::PackedPacketHeadersMain
            | MarkerKind::ComponentRegistration
            | MarkerKind::Capabilities => {
                let segment = read_marker_segment(stream, marker)?;
                info!("{:?} at byte offset {}, skipped", marker, offset);
                skipped.push(SkippedSegment {
                    marker: marker.symbol(),
                    offset,
                    length: segment.length,
                });
            }

            // Start of tile bit-stream
            MarkerKind::StartOfTilePart => {
                stream.seek(offset)?;
                break offset;
            }

            MarkerKind::Unknown([0xFF, _]) => {
                let message = if marker.has_segment() {
                    let segment = read_marker_segment(stream, marker)?;
                    format!(
                        "skipping unknown marker {:?} at byte offset {} ({} bytes)",
                        marker.symbol(),
                        offset,
                        segment.length
                    )
                } else {
                    format!(
                        "skipping unknown marker {:?} at byte offset {}",
                        marker.symbol(),
                        offset
                    )
                };
                events.on_warning(&message);
            }

            _ => {
                return Err(HeaderError::MarkerUnexpected {
                    marker: marker.symbol(),
                    offset,
                }
                .into());
            }
        }
    };

    // Required
    let cod = cod.ok_or(HeaderError::MarkerMissing {
        marker: MARKER_SYMBOL_COD,
    })?;
    let qcd = qcd.ok_or(HeaderError::MarkerMissing {
        marker: MARKER_SYMBOL_QCD,
    })?;

    // A.6.2, A.6.5
    // No more than one per any given component may be present in either the
    // main or tile-part headers
    one_per_component(MARKER_SYMBOL_COC, cocs.iter().map(|coc| coc.component_index()))?;
    one_per_component(MARKER_SYMBOL_QCC, qccs.iter().map(|qcc| qcc.component_index()))?;

    let header = Header {
        image_and_tile_size_marker_segment: siz,
        coding_style_marker_segment: cod,
        coding_style_component_segments: cocs,
        quantization_default_marker_segment: qcd,
        quantization_component_segments: qccs,
        tile_part_lengths_segments: tlms,
        comment_marker_segments: comments,
        skipped_segments: skipped,
        components,
    };

    let grid = TileGridInfo {
        tiles_x,
        tiles_y,
        codestream_offset,
        first_tile_part_offset,
    };

    Ok((header, grid))
}
