use std::sync::Arc;

use log::{debug, info};

use crate::codec::{
    ComponentCodingParameters, ComponentGeometry, TileCodec, TileCodingParameters, TileGeometry,
};
use crate::error::{CodecError, HeaderError, TileDecodeError, TileError};
use crate::header::{one_per_component, Header, TileGridInfo};
use crate::marker::{
    read_marker, read_marker_segment, MarkerKind, MARKER_SYMBOL_COC, MARKER_SYMBOL_EOC,
    MARKER_SYMBOL_QCC, MARKER_SYMBOL_SOT,
};
use crate::segment::{
    CodingStyleComponentSegment, CodingStyleMarkerSegment, QuantizationComponentSegment,
    QuantizationDefaultMarkerSegment, StartOfTileSegment,
};
use crate::stream::ByteStream;
use crate::tile::{Rect, TilePartition};

/// Overrides carried by the header of a tile's first tile-part.
#[derive(Debug, Default, Clone)]
pub struct TilePartHeader {
    // COD (Optional)
    pub coding_style_marker_segment: Option<CodingStyleMarkerSegment>,

    // COC (Optional, no more than one per component)
    pub coding_style_component_segments: Vec<CodingStyleComponentSegment>,

    // QCD (Optional)
    pub quantization_default_marker_segment: Option<QuantizationDefaultMarkerSegment>,

    // QCC (Optional, no more than one per component)
    pub quantization_component_segments: Vec<QuantizationComponentSegment>,
}

/// Where one tile-part sits in the codestream.
#[derive(Debug, Clone)]
pub struct TilePartLocation {
    pub tile_index: u32,

    // TPsot
    pub tile_part_index: u8,

    // TNsot, 0 when not specified
    pub no_tile_parts: u8,

    pub sot_offset: u64,

    // First byte after SOD.
    pub data_offset: u64,
    pub data_length: u64,

    // Psot, 0 when the data runs to the end of the codestream
    pub declared_length: u64,

    // Psot reaches past the end of the stream.
    pub truncated: bool,

    pub header: TilePartHeader,
}

/// Samples of one component of a decoded tile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileComponent {
    // On the component's sample grid.
    pub rect: Rect,
    pub samples: Vec<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileData {
    pub tile_index: u32,
    pub rect: Rect,
    pub components: Vec<TileComponent>,
}

#[derive(Debug)]
pub enum TileDecodeResult {
    Decoded(TileData),
    Failed(TileDecodeError),
}

impl TileDecodeResult {
    pub fn into_result(self) -> Result<TileData, TileDecodeError> {
        match self {
            TileDecodeResult::Decoded(data) => Ok(data),
            TileDecodeResult::Failed(error) => Err(error),
        }
    }
}

/// Everything needed to reconstruct a tile without touching the stream.
#[derive(Debug, Clone)]
pub struct TilePayload {
    pub data: Vec<u8>,
    pub params: TileCodingParameters,
    pub geometry: TileGeometry,
}

/// Locates tile-parts and hands their data to a [`TileCodec`].
///
/// Tile-parts are indexed lazily: the SOT scan only runs as far as the
/// requested tile needs, and every tile-part seen on the way is remembered.
pub struct TileDecoder {
    codec: Arc<dyn TileCodec>,
    partition: TilePartition,

    // Tile index to tile-parts in codestream order.
    parts: Vec<Vec<TilePartLocation>>,

    // Offset of the next unscanned SOT, None once EOC or the end is reached.
    next_sot: Option<u64>,
}

impl std::fmt::Debug for TileDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("TileDecoder")
            .field("partition", &self.partition)
            .field("next_sot", &self.next_sot)
            .finish()
    }
}

impl TileDecoder {
    pub fn new(codec: Arc<dyn TileCodec>, header: &Header, grid: &TileGridInfo) -> TileDecoder {
        let partition = TilePartition::from_header(header);
        TileDecoder {
            codec,
            parts: vec![Vec::new(); partition.total_tiles() as usize],
            partition,
            next_sot: Some(grid.first_tile_part_offset),
        }
    }

    pub fn partition(&self) -> &TilePartition {
        &self.partition
    }

    /// Tile-parts of `tile_index` found so far.
    pub fn tile_parts(&self, tile_index: u32) -> &[TilePartLocation] {
        self.parts
            .get(tile_index as usize)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    fn expected_parts(&self, tile_index: u32) -> Option<u8> {
        self.tile_parts(tile_index)
            .iter()
            .map(|part| part.no_tile_parts)
            .find(|n| *n != 0)
    }

    fn is_complete(&self, tile_index: u32) -> bool {
        match self.expected_parts(tile_index) {
            Some(n) => self.tile_parts(tile_index).len() >= n as usize,
            None => false,
        }
    }

    fn scan(
        &mut self,
        stream: &mut ByteStream,
        header: &Header,
        tile_index: u32,
    ) -> Result<(), TileError> {
        while !self.is_complete(tile_index) {
            let offset = match self.next_sot {
                Some(offset) if offset + 2 <= stream.len() => offset,
                _ => {
                    self.next_sot = None;
                    break;
                }
            };

            stream.seek(offset)?;
            match read_marker(stream)? {
                MarkerKind::StartOfTilePart => {}
                MarkerKind::EndOfCodestream => {
                    debug!("EOC at byte offset {}", offset);
                    self.next_sot = None;
                    break;
                }
                other => {
                    return Err(HeaderError::MarkerUnexpected {
                        marker: other.symbol(),
                        offset,
                    }
                    .into());
                }
            }

            let location = self.read_tile_part(stream, header, offset)?;
            self.next_sot = if location.truncated || location.declared_length == 0 {
                None
            } else {
                Some(location.sot_offset + location.declared_length)
            };

            let i = location.tile_index as usize;
            self.parts[i].push(location);
        }

        Ok(())
    }

    // A.4 – Construction of the tile-part header
    fn read_tile_part(
        &self,
        stream: &mut ByteStream,
        header: &Header,
        sot_offset: u64,
    ) -> Result<TilePartLocation, TileError> {
        let segment = read_marker_segment(stream, MarkerKind::StartOfTilePart)?;
        let sot = StartOfTileSegment::decode(&segment)?;
        info!(
            "SOT at byte offset {}: tile {}, part {} of {}, length {}",
            sot_offset,
            sot.tile_index(),
            sot.tile_part_index(),
            sot.no_tile_parts(),
            sot.tile_length()
        );

        if sot.tile_index() as u32 >= self.partition.total_tiles() {
            return Err(HeaderError::MarkerError {
                marker: MARKER_SYMBOL_SOT,
                error: format!(
                    "tile index {} out of range (total tiles {})",
                    sot.tile_index(),
                    self.partition.total_tiles()
                ),
            }
            .into());
        }
        if sot.no_tile_parts() != 0 && sot.tile_part_index() >= sot.no_tile_parts() {
            return Err(HeaderError::MarkerError {
                marker: MARKER_SYMBOL_SOT,
                error: format!(
                    "tile-part index {} not below tile-part count {}",
                    sot.tile_part_index(),
                    sot.no_tile_parts()
                ),
            }
            .into());
        }

        let no_components = header.no_components();
        let first = sot.tile_part_index() == 0;
        let mut tile_part_header = TilePartHeader::default();
        let mut coc_components = Vec::new();
        let mut qcc_components = Vec::new();

        loop {
            let offset = stream.position()?;
            let marker = read_marker(stream)?;

            match marker {
                // COD, COC, QCD and QCC may only appear in the first tile-part.
                MarkerKind::CodingStyleDefault => {
                    let segment = read_marker_segment(stream, marker)?;
                    let cod = CodingStyleMarkerSegment::decode(&segment)?;
                    if first {
                        tile_part_header.coding_style_marker_segment = Some(cod);
                    }
                }
                MarkerKind::CodingStyleComponent => {
                    let segment = read_marker_segment(stream, marker)?;
                    let coc = CodingStyleComponentSegment::decode(&segment, no_components)?;
                    coc_components.push(coc.component_index());
                    if first {
                        tile_part_header.coding_style_component_segments.push(coc);
                    }
                }
                MarkerKind::QuantizationDefault => {
                    let segment = read_marker_segment(stream, marker)?;
                    let qcd = QuantizationDefaultMarkerSegment::decode(&segment)?;
                    if first {
                        tile_part_header.quantization_default_marker_segment = Some(qcd);
                    }
                }
                MarkerKind::QuantizationComponent => {
                    let segment = read_marker_segment(stream, marker)?;
                    let qcc = QuantizationComponentSegment::decode(&segment, no_components)?;
                    qcc_components.push(qcc.component_index());
                    if first {
                        tile_part_header.quantization_component_segments.push(qcc);
                    }
                }

                MarkerKind::PacketLengthTile
                | MarkerKind::PackedPacketHeadersTile
                | MarkerKind::Comment
                | MarkerKind::RegionOfInterest
                | MarkerKind::ProgressionOrderChange => {
                    read_marker_segment(stream, marker)?;
                    debug!("{:?} at byte offset {}, skipped", marker, offset);
                }

                MarkerKind::StartOfData => break,

                MarkerKind::Unknown([0xFF, _]) if marker.has_segment() => {
                    read_marker_segment(stream, marker)?;
                    debug!(
                        "unknown marker {:?} at byte offset {}, skipped",
                        marker.symbol(),
                        offset
                    );
                }

                _ => {
                    return Err(HeaderError::MarkerUnexpected {
                        marker: marker.symbol(),
                        offset,
                    }
                    .into());
                }
            }
        }

        one_per_component(MARKER_SYMBOL_COC, coc_components.into_iter())?;
        one_per_component(MARKER_SYMBOL_QCC, qcc_components.into_iter())?;

        let data_offset = stream.position()?;
        let declared_length = sot.tile_length() as u64;
        let mut truncated = false;

        let data_end = if declared_length == 0 {
            // The last tile-part runs to EOC.
            let end = stream.len();
            if end >= data_offset + 2 {
                stream.seek(end - 2)?;
                let trailer = stream.read_array::<2>()?;
                if trailer == MARKER_SYMBOL_EOC {
                    end - 2
                } else {
                    end
                }
            } else {
                end
            }
        } else {
            let end = sot_offset + declared_length;
            if end < data_offset {
                return Err(HeaderError::MarkerError {
                    marker: MARKER_SYMBOL_SOT,
                    error: format!(
                        "Psot {} ends inside the tile-part header at byte offset {}",
                        declared_length, data_offset
                    ),
                }
                .into());
            }
            if end > stream.len() {
                truncated = true;
                stream.len()
            } else {
                end
            }
        };

        Ok(TilePartLocation {
            tile_index: sot.tile_index() as u32,
            tile_part_index: sot.tile_part_index(),
            no_tile_parts: sot.no_tile_parts(),
            sot_offset,
            data_offset,
            data_length: data_end - data_offset,
            declared_length,
            truncated,
            header: tile_part_header,
        })
    }

    fn resolve_parameters(
        &self,
        header: &Header,
        tile_header: &TilePartHeader,
    ) -> TileCodingParameters {
        let cod = tile_header
            .coding_style_marker_segment
            .as_ref()
            .unwrap_or_else(|| header.coding_style_marker_segment());

        let components = (0..header.no_components())
            .map(|c| {
                // Tile-part COC > tile-part COD > main COC > main COD
                let coding_style = tile_header
                    .coding_style_component_segments
                    .iter()
                    .rev()
                    .find(|coc| coc.component_index() == c)
                    .map(|coc| coc.coding_style_parameters())
                    .or_else(|| {
                        tile_header
                            .coding_style_marker_segment
                            .as_ref()
                            .map(|cod| cod.coding_style_parameters())
                    })
                    .unwrap_or_else(|| header.coding_style(c));

                // Tile-part QCC > tile-part QCD > main QCC > main QCD
                let quantization = tile_header
                    .quantization_component_segments
                    .iter()
                    .rev()
                    .find(|qcc| qcc.component_index() == c)
                    .map(|qcc| qcc.parameters())
                    .or_else(|| {
                        tile_header
                            .quantization_default_marker_segment
                            .as_ref()
                            .map(|qcd| qcd.parameters())
                    })
                    .unwrap_or_else(|| header.quantization(c));

                ComponentCodingParameters {
                    coding_style: coding_style.clone(),
                    quantization: quantization.clone(),
                }
            })
            .collect();

        TileCodingParameters {
            coding_style: cod.coding_style(),
            progression_order: cod.progression_order(),
            no_layers: cod.no_layers(),
            multiple_component_transformation: cod.multiple_component_transformation(),
            components,
        }
    }

    pub fn geometry(&self, header: &Header, tile_index: u32) -> Result<TileGeometry, TileError> {
        let rect = self
            .partition
            .bounds(tile_index)
            .map_err(|e| TileError::IndexOutOfRange {
                total_tiles: e.total_tiles,
            })?;

        Ok(TileGeometry {
            tile_index,
            rect,
            components: header
                .components()
                .iter()
                .map(|info| ComponentGeometry {
                    rect: rect.component_rect(info.dx, info.dy),
                    precision: info.precision,
                    signed: info.signed,
                })
                .collect(),
        })
    }

    /// Collects the compressed data of a tile, scanning further into the
    /// codestream when needed.
    pub fn read_payload(
        &mut self,
        stream: &mut ByteStream,
        header: &Header,
        tile_index: u32,
    ) -> Result<TilePayload, TileError> {
        let geometry = self.geometry(header, tile_index)?;
        self.scan(stream, header, tile_index)?;

        let parts = self.tile_parts(tile_index);
        let first = parts.first().ok_or(TileError::MissingTilePart)?;

        // Tile-parts of a tile appear in TPsot order.
        for (expected, part) in parts.iter().enumerate() {
            if part.tile_part_index as usize != expected {
                return Err(TileError::TilePartOrder {
                    expected,
                    found: part.tile_part_index,
                });
            }
        }

        if let Some(part) = parts.iter().find(|part| part.truncated) {
            return Err(TileError::Truncated {
                declared: part.declared_length,
                available: stream.len().saturating_sub(part.sot_offset),
            });
        }

        if let Some(expected) = self.expected_parts(tile_index) {
            if parts.len() < expected as usize {
                return Err(TileError::IncompleteTile {
                    found: parts.len(),
                    expected,
                });
            }
        }

        let params = self.resolve_parameters(header, &first.header);

        let capacity: usize = parts.iter().map(|part| part.data_length as usize).sum();
        let mut data = Vec::with_capacity(capacity);
        for part in parts {
            stream.seek(part.data_offset)?;
            data.extend(stream.read(part.data_length as usize)?);
        }

        debug!(
            "tile {}: {} bytes in {} tile-parts",
            tile_index,
            data.len(),
            parts.len()
        );

        Ok(TilePayload {
            data,
            params,
            geometry,
        })
    }

    /// Runs the codec over a payload and checks what it returns.
    pub fn reconstruct(&self, payload: &TilePayload) -> Result<TileData, TileError> {
        let geometry = &payload.geometry;
        let samples = self
            .codec
            .decode_tile_payload(&payload.data, &payload.params, geometry)?;

        if samples.len() != geometry.components.len() {
            return Err(CodecError::ComponentCount {
                expected: geometry.components.len(),
                actual: samples.len(),
            }
            .into());
        }

        let components = samples
            .into_iter()
            .zip(&geometry.components)
            .enumerate()
            .map(|(c, (samples, component))| {
                if samples.len() != component.rect.area() {
                    return Err(CodecError::SampleCount {
                        component: c,
                        expected: component.rect.area(),
                        actual: samples.len(),
                    });
                }
                Ok(TileComponent {
                    rect: component.rect,
                    samples,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(TileData {
            tile_index: geometry.tile_index,
            rect: geometry.rect,
            components,
        })
    }

    pub fn decode(
        &mut self,
        stream: &mut ByteStream,
        header: &Header,
        tile_index: u32,
    ) -> TileDecodeResult {
        let result = self
            .read_payload(stream, header, tile_index)
            .and_then(|payload| self.reconstruct(&payload));

        match result {
            Ok(data) => TileDecodeResult::Decoded(data),
            Err(reason) => TileDecodeResult::Failed(TileDecodeError::new(tile_index, reason)),
        }
    }
}
