use std::io::{self, Read};
use std::str;

use crate::error::HeaderError;
use crate::marker::{MarkerSegment, MARKER_SYMBOL_COC, MARKER_SYMBOL_COD, MARKER_SYMBOL_SOT};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressionOrder {
    // 0000 0000 Layer-resolution level-component-position progression
    LRLCPP,

    // 0000 0001 Resolution level-layer-component-position progression
    RLLCPP,

    // 0000 0010 Resolution level-position-component-layer progression
    RLPCLP,

    // 0000 0011 Position-component-resolution level-layer progression
    PCRLLP,

    // 0000 0100 Component-position-resolution level-layer progression
    CPRLLP,

    // All other values reserved
    Reserved { value: u8 },
}

impl ProgressionOrder {
    fn new(value: u8) -> ProgressionOrder {
        match value {
            0b0000_0000 => ProgressionOrder::LRLCPP,
            0b0000_0001 => ProgressionOrder::RLLCPP,
            0b0000_0010 => ProgressionOrder::RLPCLP,
            0b0000_0011 => ProgressionOrder::PCRLLP,
            0b0000_0100 => ProgressionOrder::CPRLLP,
            _ => ProgressionOrder::Reserved { value },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultipleComponentTransformation {
    // No multiple component transformation specified.
    None,

    // Component transformation used on components 0, 1, 2 for coding efficiency.
    // Irreversible component transformation used with the 9-7 irreversible filter.
    // Reversible component transformation used with the 5-3 reversible filter.
    Multiple,

    // All other values reserved
    Reserved { value: u8 },
}

impl MultipleComponentTransformation {
    fn new(value: u8) -> MultipleComponentTransformation {
        match value {
            0 => MultipleComponentTransformation::None,
            1 => MultipleComponentTransformation::Multiple,
            _ => MultipleComponentTransformation::Reserved { value },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformationFilter {
    // 9-7 irreversible filter
    Irreversible,

    // 5-3 reversible filter
    Reversible,

    // All other values reserved
    Reserved { value: u8 },
}

impl TransformationFilter {
    fn new(value: u8) -> TransformationFilter {
        match value {
            0 => TransformationFilter::Irreversible,
            1 => TransformationFilter::Reversible,
            _ => TransformationFilter::Reserved { value },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantizationStyle {
    No { guard: u8 },
    ScalarDerived { guard: u8 },
    ScalarExpounded { guard: u8 },
    Reserved { value: u8 },
}

impl QuantizationStyle {
    fn new(byte: u8) -> QuantizationStyle {
        // 000x xxxx to 111x xxxx, Number of guard bits: 0 to 7
        let guard = byte >> 5;

        match byte & 0b0001_1111 {
            // No quantization
            0b0000_0000 => QuantizationStyle::No { guard },
            // Scalar derived (values signalled for NLLL subband only).
            0b0000_0001 => QuantizationStyle::ScalarDerived { guard },
            // Scalar expounded (values signalled for each subband). There are
            // as many step sizes signalled as there are subbands.
            0b0000_0010 => QuantizationStyle::ScalarExpounded { guard },

            _ => QuantizationStyle::Reserved { value: byte },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentRegistrationValue {
    // General use (binary values)
    Binary,

    // General use (ISO 8859-15:1999 (Latin) values)
    Latin,

    // All other values reserved
    Reserved { value: [u8; 2] },
}

impl CommentRegistrationValue {
    fn new(value: [u8; 2]) -> CommentRegistrationValue {
        match u16::from_be_bytes(value) {
            // See ISO/IEC 15444-1:2019 Table A.44
            0 => CommentRegistrationValue::Binary,
            1 => CommentRegistrationValue::Latin,
            _ => CommentRegistrationValue::Reserved { value },
        }
    }
}

#[derive(Debug, Default, Clone)]
struct ComponentSize {
    // Ssiz: Precision (depth) in bits and sign of the component samples.
    precision: [u8; 1],

    // XRsiz: Horizontal separation with respect to the reference grid.
    horizontal_separation: [u8; 1],

    // YRsiz: Vertical separation with respect to the reference grid.
    vertical_separation: [u8; 1],
}

// A.5.1
//
// Image and tile size (SIZ)
//
// Function: Provides information about the uncompressed image such as the
// width and height of the reference grid, the width and height of the tiles,
// the number of components, component bit depth, and the separation of
// component samples with respect to the reference grid.
#[derive(Debug, Default, Clone)]
pub struct ImageAndTileSizeMarkerSegment {
    offset: u64,
    length: u16,

    // Rsiz: Denotes capabilities that a decoder needs to properly decode the
    // codestream.
    decoder_capabilities: [u8; 2],

    // XSiz: Width of the reference grid.
    reference_grid_width: [u8; 4],

    // YSiz: Height of the reference grid.
    reference_grid_height: [u8; 4],

    // XOsiz: Horizontal offset from the origin of the reference grid to the
    // left side of the image area.
    image_horizontal_offset: [u8; 4],

    // YOsiz: Vertical offset from the origin of the reference grid to the top
    // side of the image area.
    image_vertical_offset: [u8; 4],

    // XTsiz: Width of one reference tile with respect to the reference grid.
    reference_tile_width: [u8; 4],

    // YTsiz: Height of one reference tile with respect to the reference grid.
    reference_tile_height: [u8; 4],

    // XTOsiz: Horizontal offset from the origin of the reference grid to the
    // left side of the first tile.
    tile_horizontal_offset: [u8; 4],

    // YTOsiz: Vertical offset from the origin of the reference grid to the
    // top side of the first tile.
    tile_vertical_offset: [u8; 4],

    // Csiz: Number of components in the image.
    no_components: [u8; 2],

    // One entry per component, in component index order.
    components: Vec<ComponentSize>,
}

impl ImageAndTileSizeMarkerSegment {
    pub(crate) fn decode(segment: &MarkerSegment) -> Result<Self, HeaderError> {
        let mut siz = ImageAndTileSizeMarkerSegment {
            offset: segment.offset,
            length: segment.length,
            ..Default::default()
        };
        siz.read_fields(&mut segment.reader())
            .map_err(|_| segment.too_short())?;
        Ok(siz)
    }

    fn read_fields<R: Read>(&mut self, reader: &mut R) -> io::Result<()> {
        reader.read_exact(&mut self.decoder_capabilities)?;
        reader.read_exact(&mut self.reference_grid_width)?;
        reader.read_exact(&mut self.reference_grid_height)?;
        reader.read_exact(&mut self.image_horizontal_offset)?;
        reader.read_exact(&mut self.image_vertical_offset)?;
        reader.read_exact(&mut self.reference_tile_width)?;
        reader.read_exact(&mut self.reference_tile_height)?;
        reader.read_exact(&mut self.tile_horizontal_offset)?;
        reader.read_exact(&mut self.tile_vertical_offset)?;
        reader.read_exact(&mut self.no_components)?;

        // The payload length bounds the allocation, not Csiz.
        for _ in 0..self.no_components() {
            let mut component = ComponentSize::default();
            reader.read_exact(&mut component.precision)?;
            reader.read_exact(&mut component.horizontal_separation)?;
            reader.read_exact(&mut component.vertical_separation)?;
            self.components.push(component);
        }

        Ok(())
    }

    pub fn length(&self) -> u16 {
        self.length
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn decoder_capabilities(&self) -> u16 {
        u16::from_be_bytes(self.decoder_capabilities)
    }

    pub fn reference_grid_width(&self) -> u32 {
        u32::from_be_bytes(self.reference_grid_width)
    }
    pub fn reference_grid_height(&self) -> u32 {
        u32::from_be_bytes(self.reference_grid_height)
    }

    pub fn image_horizontal_offset(&self) -> u32 {
        u32::from_be_bytes(self.image_horizontal_offset)
    }
    pub fn image_vertical_offset(&self) -> u32 {
        u32::from_be_bytes(self.image_vertical_offset)
    }

    pub fn reference_tile_width(&self) -> u32 {
        u32::from_be_bytes(self.reference_tile_width)
    }
    pub fn reference_tile_height(&self) -> u32 {
        u32::from_be_bytes(self.reference_tile_height)
    }

    pub fn tile_horizontal_offset(&self) -> u32 {
        u32::from_be_bytes(self.tile_horizontal_offset)
    }
    pub fn tile_vertical_offset(&self) -> u32 {
        u32::from_be_bytes(self.tile_vertical_offset)
    }

    pub fn no_components(&self) -> u16 {
        u16::from_be_bytes(self.no_components)
    }

    // ISO/IEC 15444-1:2019 Table A.11, component bit depth is value + 1.
    pub fn precision(&self, i: usize) -> Option<u8> {
        self.components
            .get(i)
            .map(|c| (c.precision[0] & 0x7f) + 1)
    }

    pub fn values_are_signed(&self, i: usize) -> Option<bool> {
        self.components
            .get(i)
            .map(|c| c.precision[0] & 0x80 == 0x80)
    }

    pub fn horizontal_separation(&self, i: usize) -> Option<u8> {
        self.components.get(i).map(|c| c.horizontal_separation[0])
    }

    pub fn vertical_separation(&self, i: usize) -> Option<u8> {
        self.components.get(i).map(|c| c.vertical_separation[0])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrecinctSize {
    value: u8,
}

impl PrecinctSize {
    // 4 LSBs are the precinct width exponent, PPx = value
    pub fn width_exponent(&self) -> u8 {
        self.value & 0x0F
    }

    // 4 MSBs are the precinct height exponent PPy = value
    pub fn height_exponent(&self) -> u8 {
        self.value >> 4
    }
}

// A.12 – Coding style default parameter values
#[derive(Debug, Default, Clone)]
pub struct CodingStyleParameters {
    // Coding style (Scod or Scoc) the parameters were read under.
    coding_style: [u8; 1],

    // Number of decomposition levels, N_L, Zero implies no transformation
    no_decomposition_levels: [u8; 1],

    // Code-block width exponent offset value, xcb
    code_block_width: [u8; 1],

    // Code-block height exponent offset value, ycb
    code_block_height: [u8; 1],

    // Style of the code-block coding passes
    code_block_style: [u8; 1],

    // Wavelet transformation used.
    transformation: [u8; 1],

    // If Scod or Scoc = xxxx xxx0, this parameter is not present; otherwise
    // this indicates precinct width and height.
    precinct_size: Vec<u8>,
}

impl CodingStyleParameters {
    fn read_fields<R: Read>(&mut self, reader: &mut R, coding_style: u8) -> io::Result<()> {
        self.coding_style = [coding_style];

        reader.read_exact(&mut self.no_decomposition_levels)?;
        reader.read_exact(&mut self.code_block_width)?;
        reader.read_exact(&mut self.code_block_height)?;
        reader.read_exact(&mut self.code_block_style)?;
        reader.read_exact(&mut self.transformation)?;

        if self.has_defined_precinct_size() {
            // The first parameter (8 bits) corresponds to the N_L LL sub-band.
            // Each successive parameter corresponds to each successive
            // resolution level in order.
            self.precinct_size = vec![0; self.no_decomposition_levels() as usize + 1];
            reader.read_exact(&mut self.precinct_size)?;
        }

        Ok(())
    }

    // A.18: code-block exponents are 2..=10 each, and xcb + ycb <= 12.
    fn validate(&self) -> Result<(), String> {
        if self.no_decomposition_levels() > 32 {
            return Err(format!(
                "{} decomposition levels exceed 32",
                self.no_decomposition_levels()
            ));
        }

        let xcb = self.code_block_width[0] as u32 + 2;
        let ycb = self.code_block_height[0] as u32 + 2;
        if xcb > 10 || ycb > 10 || xcb + ycb > 12 {
            return Err(format!(
                "code-block exponents xcb = {} and ycb = {} out of range",
                xcb, ycb
            ));
        }

        Ok(())
    }

    pub fn no_decomposition_levels(&self) -> u8 {
        self.no_decomposition_levels[0]
    }

    // Code-block width and height exponent offset value xcb = value + 2 or
    // ycb = value + 2.
    pub fn code_block_width(&self) -> u16 {
        1 << ((self.code_block_width[0] & 0b0000_1111) + 2)
    }

    pub fn code_block_height(&self) -> u16 {
        1 << ((self.code_block_height[0] & 0b0000_1111) + 2)
    }

    pub fn code_block_style(&self) -> u8 {
        self.code_block_style[0]
    }

    pub fn transformation(&self) -> TransformationFilter {
        TransformationFilter::new(self.transformation[0])
    }

    pub fn has_defined_precinct_size(&self) -> bool {
        self.coding_style[0] & 0b0000_0001 == 1
    }

    /// Precinct sizes from the lowest resolution level up.
    ///
    /// Without explicit sizes every resolution level uses PPx = 15, PPy = 15.
    pub fn precinct_sizes(&self) -> Vec<PrecinctSize> {
        if !self.has_defined_precinct_size() {
            return vec![PrecinctSize { value: 0xFF }; self.no_decomposition_levels() as usize + 1];
        }

        self.precinct_size
            .iter()
            .map(|value| PrecinctSize { value: *value })
            .collect()
    }
}

// A.6.1
//
// Coding style default (COD)
//
// Function: Describes the coding style, number of decomposition levels,
// and layering that is the default used for compressing all components of
// an image (if in the main header) or a tile (if in the tile-part header).
//
// The parameter values can be overridden for an individual component by a
// COC marker segment in either the main or tile-part header.
#[derive(Debug, Default, Clone)]
pub struct CodingStyleMarkerSegment {
    offset: u64,

    length: u16,

    coding_style: [u8; 1],

    // Progression order
    progression_order: [u8; 1],

    // Number of layers
    no_layers: [u8; 2],

    // Multiple component transformation
    multiple_component_transformation: [u8; 1],

    coding_style_parameters: CodingStyleParameters,
}

impl CodingStyleMarkerSegment {
    pub(crate) fn decode(segment: &MarkerSegment) -> Result<Self, HeaderError> {
        let mut cod = CodingStyleMarkerSegment {
            offset: segment.offset,
            length: segment.length,
            ..Default::default()
        };
        cod.read_fields(&mut segment.reader())
            .map_err(|_| segment.too_short())?;

        cod.coding_style_parameters
            .validate()
            .map_err(|error| HeaderError::MarkerError {
                marker: MARKER_SYMBOL_COD,
                error,
            })?;
        if cod.no_layers() == 0 {
            return Err(HeaderError::MarkerError {
                marker: MARKER_SYMBOL_COD,
                error: "number of layers is zero".to_owned(),
            });
        }

        Ok(cod)
    }

    fn read_fields<R: Read>(&mut self, reader: &mut R) -> io::Result<()> {
        reader.read_exact(&mut self.coding_style)?;
        reader.read_exact(&mut self.progression_order)?;
        reader.read_exact(&mut self.no_layers)?;
        reader.read_exact(&mut self.multiple_component_transformation)?;

        self.coding_style_parameters
            .read_fields(reader, self.coding_style[0])
    }

    pub fn length(&self) -> u16 {
        self.length
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn coding_style(&self) -> u8 {
        self.coding_style[0]
    }

    // xxxx xx1x SOP marker segments may be used
    pub fn uses_start_of_packet(&self) -> bool {
        self.coding_style[0] & 0b0000_0010 != 0
    }

    // xxxx x1xx EPH marker may be used
    pub fn uses_end_of_packet_header(&self) -> bool {
        self.coding_style[0] & 0b0000_0100 != 0
    }

    pub fn progression_order(&self) -> ProgressionOrder {
        ProgressionOrder::new(self.progression_order[0])
    }

    pub fn no_layers(&self) -> u16 {
        u16::from_be_bytes(self.no_layers)
    }

    pub fn multiple_component_transformation(&self) -> MultipleComponentTransformation {
        MultipleComponentTransformation::new(self.multiple_component_transformation[0])
    }

    pub fn coding_style_parameters(&self) -> &CodingStyleParameters {
        &self.coding_style_parameters
    }
}

// Component indices are 8 bits when Csiz < 257, 16 bits otherwise.
fn read_component_index<R: Read>(reader: &mut R, no_components: u16) -> io::Result<u16> {
    if no_components < 257 {
        let mut buffer: [u8; 1] = [0; 1];
        reader.read_exact(&mut buffer)?;
        Ok(buffer[0] as u16)
    } else {
        let mut buffer: [u8; 2] = [0; 2];
        reader.read_exact(&mut buffer)?;
        Ok(u16::from_be_bytes(buffer))
    }
}

// A.6.2
//
// Coding style component (COC)
//
// Function: Describes the coding style, number of decomposition levels, and
// layering used for compressing a particular component.
#[derive(Debug, Default, Clone)]
pub struct CodingStyleComponentSegment {
    offset: u64,

    length: u16,

    // Ccoc: The index of the component to which this marker segment relates.
    index: u16,

    // Scoc: Coding style for this component
    coding_style: [u8; 1],

    // SPcoc: Parameters for coding style designated in Scoc.
    coding_style_parameters: CodingStyleParameters,
}

impl CodingStyleComponentSegment {
    pub(crate) fn decode(segment: &MarkerSegment, no_components: u16) -> Result<Self, HeaderError> {
        let mut coc = CodingStyleComponentSegment {
            offset: segment.offset,
            length: segment.length,
            ..Default::default()
        };

        coc.read_fields(&mut segment.reader(), no_components)
            .map_err(|_| segment.too_short())?;

        if coc.index >= no_components {
            return Err(HeaderError::ComponentIndex {
                marker: MARKER_SYMBOL_COC,
                component: coc.index,
                no_components,
            });
        }
        coc.coding_style_parameters
            .validate()
            .map_err(|error| HeaderError::MarkerError {
                marker: MARKER_SYMBOL_COC,
                error,
            })?;

        Ok(coc)
    }

    fn read_fields<R: Read>(&mut self, reader: &mut R, no_components: u16) -> io::Result<()> {
        self.index = read_component_index(reader, no_components)?;
        reader.read_exact(&mut self.coding_style)?;
        self.coding_style_parameters
            .read_fields(reader, self.coding_style[0])
    }

    pub fn length(&self) -> u16 {
        self.length
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn component_index(&self) -> u16 {
        self.index
    }

    pub fn coding_style_parameters(&self) -> &CodingStyleParameters {
        &self.coding_style_parameters
    }
}

#[derive(Debug, Clone)]
enum QuantizationValue {
    Reversible { value: [u8; 1] },
    Irreversible { value: [u8; 2] },
}

impl QuantizationValue {
    fn value(&self) -> u16 {
        match self {
            QuantizationValue::Reversible { value } => value[0] as u16,
            QuantizationValue::Irreversible { value } => u16::from_be_bytes(*value),
        }
    }

    fn exponent(&self) -> u8 {
        match self {
            QuantizationValue::Reversible { value } => value[0] >> 3,
            QuantizationValue::Irreversible { value } => value[0] >> 3,
        }
    }

    // Lower 11 bits; reversible values carry no mantissa.
    fn mantissa(&self) -> u16 {
        match self {
            QuantizationValue::Reversible { .. } => 0,
            QuantizationValue::Irreversible { value } => {
                u16::from_be_bytes([value[0] & 0b0000_0111, value[1]])
            }
        }
    }
}

/// Sqcx plus the SPqcx values shared by QCD and QCC.
#[derive(Debug, Default, Clone)]
pub struct QuantizationParameters {
    quantization_style: [u8; 1],
    values: Vec<QuantizationValue>,
}

impl QuantizationParameters {
    fn read_fields<R: Read>(&mut self, reader: &mut R, available: usize) -> io::Result<()> {
        reader.read_exact(&mut self.quantization_style)?;

        // One byte per sub-band without quantization, two otherwise. The
        // number of values follows from the segment length.
        match self.quantization_style() {
            QuantizationStyle::No { .. } => {
                for _ in 0..available.saturating_sub(1) {
                    let mut value: [u8; 1] = [0; 1];
                    reader.read_exact(&mut value)?;
                    self.values.push(QuantizationValue::Reversible { value });
                }
            }
            _ => {
                for _ in 0..available.saturating_sub(1) / 2 {
                    let mut value: [u8; 2] = [0; 2];
                    reader.read_exact(&mut value)?;
                    self.values.push(QuantizationValue::Irreversible { value });
                }
            }
        }

        Ok(())
    }

    pub fn quantization_style_u8(&self) -> u8 {
        self.quantization_style[0]
    }

    pub fn quantization_style(&self) -> QuantizationStyle {
        QuantizationStyle::new(self.quantization_style[0])
    }

    pub fn guard_bits(&self) -> u8 {
        self.quantization_style[0] >> 5
    }

    pub fn quantization_values(&self) -> Vec<u16> {
        self.values.iter().map(|v| v.value()).collect()
    }

    pub fn quantization_exponents(&self) -> Vec<u8> {
        self.values.iter().map(|v| v.exponent()).collect()
    }

    pub fn quantization_mantissas(&self) -> Vec<u16> {
        self.values.iter().map(|v| v.mantissa()).collect()
    }
}

// A.6.4
//
// Quantization default (QCD)
//
// Function: Describes the quantization default used for compressing all
// components not defined by a QCC marker segment. The parameter values can be
// overridden for an individual component by a QCC marker segment in either the
// main or tile-part header.
#[derive(Debug, Default, Clone)]
pub struct QuantizationDefaultMarkerSegment {
    offset: u64,

    // Length of marker segment in bytes (not including the marker).
    length: u16,

    parameters: QuantizationParameters,
}

impl QuantizationDefaultMarkerSegment {
    pub(crate) fn decode(segment: &MarkerSegment) -> Result<Self, HeaderError> {
        let mut qcd = QuantizationDefaultMarkerSegment {
            offset: segment.offset,
            length: segment.length,
            ..Default::default()
        };
        qcd.parameters
            .read_fields(&mut segment.reader(), segment.payload.len())
            .map_err(|_| segment.too_short())?;
        Ok(qcd)
    }

    pub fn length(&self) -> u16 {
        self.length
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn parameters(&self) -> &QuantizationParameters {
        &self.parameters
    }

    pub fn quantization_style(&self) -> QuantizationStyle {
        self.parameters.quantization_style()
    }

    pub fn quantization_exponents(&self) -> Vec<u8> {
        self.parameters.quantization_exponents()
    }
}

// A.6.5
//
// Quantization component (QCC)
//
// Function: Describes the quantization used for compressing a particular
// component.
#[derive(Debug, Default, Clone)]
pub struct QuantizationComponentSegment {
    offset: u64,

    length: u16,

    // Cqcc: The index of the component to which this marker segment relates.
    index: u16,

    parameters: QuantizationParameters,
}

impl QuantizationComponentSegment {
    pub(crate) fn decode(segment: &MarkerSegment, no_components: u16) -> Result<Self, HeaderError> {
        let mut qcc = QuantizationComponentSegment {
            offset: segment.offset,
            length: segment.length,
            ..Default::default()
        };

        let index_size = if no_components < 257 { 1 } else { 2 };
        let mut reader = segment.reader();
        qcc.index = read_component_index(&mut reader, no_components)
            .map_err(|_| segment.too_short())?;
        qcc.parameters
            .read_fields(&mut reader, segment.payload.len().saturating_sub(index_size))
            .map_err(|_| segment.too_short())?;

        if qcc.index >= no_components {
            return Err(HeaderError::ComponentIndex {
                marker: segment.kind.symbol(),
                component: qcc.index,
                no_components,
            });
        }

        Ok(qcc)
    }

    pub fn length(&self) -> u16 {
        self.length
    }

    pub fn component_index(&self) -> u16 {
        self.index
    }

    pub fn parameters(&self) -> &QuantizationParameters {
        &self.parameters
    }
}

// A.4.2
//
// Start of tile-part (SOT)
//
// Function: Marks the beginning of a tile-part, the index of its tile, and the
// index of its tile-part. The tile-parts of a given tile shall appear in order
// (see TPsot) in the codestream. However, tile-parts from other tiles may be
// interleaved in the codestream. Therefore, the tile-parts from a given tile
// may not appear contiguously in the codestream.
#[derive(Debug, Default, Clone)]
pub struct StartOfTileSegment {
    offset: u64,
    length: u16,

    // Isot: Tile index.
    //
    // This number refers to the tiles in raster order starting at the number 0
    tile_index: [u8; 2],

    // Psot: Length, in bytes, from the beginning of the first byte of this SOT
    // marker segment of the tile-part to the end of the data of that tile-part.
    //
    // Only the last tile-part in the codestream may contain a 0 for Psot.
    //
    // If the Psot is 0, this tile-part is assumed to contain all data until the
    // EOC marker.
    tile_length: [u8; 4],

    // TPsot: Tile-part index.
    //
    // If there is only one tile-part for a tile then this value is zero.
    tile_part_index: [u8; 1],

    // TNsot: Number of tile-parts of a tile in the codestream.
    //
    // Two values are allowed: the correct number of tile-parts for that tile
    // and zero. A zero value indicates that the number of tile-parts of this
    // tile is not specified in this tile-part.
    no_tile_parts: [u8; 1],
}

impl StartOfTileSegment {
    pub(crate) fn decode(segment: &MarkerSegment) -> Result<Self, HeaderError> {
        // Lsot is fixed at 10.
        if segment.length != 10 {
            return Err(HeaderError::MarkerError {
                marker: MARKER_SYMBOL_SOT,
                error: format!("Lsot is {}, expected 10", segment.length),
            });
        }

        let mut sot = StartOfTileSegment {
            offset: segment.offset,
            length: segment.length,
            ..Default::default()
        };

        sot.read_fields(&mut segment.reader())
            .map_err(|_| segment.too_short())?;

        Ok(sot)
    }

    fn read_fields<R: Read>(&mut self, reader: &mut R) -> io::Result<()> {
        reader.read_exact(&mut self.tile_index)?;
        reader.read_exact(&mut self.tile_length)?;
        reader.read_exact(&mut self.tile_part_index)?;
        reader.read_exact(&mut self.no_tile_parts)
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn tile_index(&self) -> u16 {
        u16::from_be_bytes(self.tile_index)
    }

    pub fn tile_length(&self) -> u32 {
        u32::from_be_bytes(self.tile_length)
    }

    pub fn tile_part_index(&self) -> u8 {
        self.tile_part_index[0]
    }

    pub fn no_tile_parts(&self) -> u8 {
        self.no_tile_parts[0]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TilePartLength {
    // Ttlm^i: Tile index of the ith tile-part. Absent when Stlm says so, in
    // which case tile-parts are in tile index order, one per tile.
    pub tile_index: Option<u16>,

    // Ptlm^i: Length in bytes, from the beginning of the SOT marker of the ith
    // tile-part to the end of the bit stream data for that tile-part.
    pub tile_length: u32,
}

// A.7.1
//
// Tile-part lengths (TLM)
//
// Function: Describes the length of every tile-part in the codestream. Each
// tile-part's length is measured from the first byte of the SOT marker segment
// to the end of the bit-stream data of that tile-part.
#[derive(Debug, Default, Clone)]
pub struct TilePartLengthsSegment {
    offset: u64,

    // Ltlm: Length of marker segment in bytes (not including the marker).
    length: u16,

    // Ztlm: Index of this marker segment relative to all other TLM marker
    // segments present in the current header.
    index: [u8; 1],

    // Stlm: Size of the Ttlm and Ptlm parameters
    parameter_sizes: [u8; 1],

    tile_part_lengths: Vec<TilePartLength>,
}

impl TilePartLengthsSegment {
    pub(crate) fn decode(segment: &MarkerSegment) -> Result<Self, HeaderError> {
        let mut tlm = TilePartLengthsSegment {
            offset: segment.offset,
            length: segment.length,
            ..Default::default()
        };

        let mut reader = segment.reader();
        reader
            .read_exact(&mut tlm.index)
            .and_then(|_| reader.read_exact(&mut tlm.parameter_sizes))
            .map_err(|_| segment.too_short())?;

        // Stlm = 0 ST SP 0000: ST in bits 5-4, SP in bit 6.
        let ttlm_size = ((tlm.parameter_sizes[0] >> 4) & 0b11) as usize;
        let ptlm_size = if tlm.parameter_sizes[0] & 0b0100_0000 != 0 { 4 } else { 2 };
        if ttlm_size == 3 {
            return Err(HeaderError::MarkerError {
                marker: segment.kind.symbol(),
                error: format!("reserved Stlm value {:#04x}", tlm.parameter_sizes[0]),
            });
        }

        let entry_size = ttlm_size + ptlm_size;
        let entries = (segment.payload.len() - 2) / entry_size;
        if (segment.payload.len() - 2) % entry_size != 0 {
            return Err(segment.too_short());
        }

        for _ in 0..entries {
            let tile_index = match ttlm_size {
                0 => None,
                1 => {
                    let mut buffer = [0; 1];
                    reader.read_exact(&mut buffer).map_err(|_| segment.too_short())?;
                    Some(buffer[0] as u16)
                }
                _ => {
                    let mut buffer = [0; 2];
                    reader.read_exact(&mut buffer).map_err(|_| segment.too_short())?;
                    Some(u16::from_be_bytes(buffer))
                }
            };

            let tile_length = if ptlm_size == 2 {
                let mut buffer = [0; 2];
                reader.read_exact(&mut buffer).map_err(|_| segment.too_short())?;
                u16::from_be_bytes(buffer) as u32
            } else {
                let mut buffer = [0; 4];
                reader.read_exact(&mut buffer).map_err(|_| segment.too_short())?;
                u32::from_be_bytes(buffer)
            };

            tlm.tile_part_lengths.push(TilePartLength {
                tile_index,
                tile_length,
            });
        }

        Ok(tlm)
    }

    pub fn index(&self) -> u8 {
        self.index[0]
    }

    pub fn tile_part_lengths(&self) -> &[TilePartLength] {
        &self.tile_part_lengths
    }
}

// A.9.2
//
// Comment (COM)
//
// Allows unstructured data in the main and tile-part header.
#[derive(Debug, Default, Clone)]
pub struct CommentMarkerSegment {
    // RCom: Registration value of the marker segment
    registration_value: [u8; 2],

    // Ccomi: Byte of unstructured data
    comment: Vec<u8>,
}

impl CommentMarkerSegment {
    pub(crate) fn decode(segment: &MarkerSegment) -> Result<Self, HeaderError> {
        let mut com = CommentMarkerSegment::default();

        let mut reader = segment.reader();
        reader
            .read_exact(&mut com.registration_value)
            .map_err(|_| segment.too_short())?;
        reader
            .read_to_end(&mut com.comment)
            .map_err(|_| segment.too_short())?;

        Ok(com)
    }

    pub fn registration_value(&self) -> CommentRegistrationValue {
        CommentRegistrationValue::new(self.registration_value)
    }

    pub fn comment_utf8(&self) -> Result<&str, str::Utf8Error> {
        str::from_utf8(&self.comment)
    }
}
