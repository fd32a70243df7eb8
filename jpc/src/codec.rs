use crate::error::CodecError;
use crate::segment::{
    CodingStyleParameters, MultipleComponentTransformation, ProgressionOrder,
    QuantizationParameters,
};
use crate::tile::Rect;

/// Coding and quantization in effect for one component of one tile.
#[derive(Debug, Clone)]
pub struct ComponentCodingParameters {
    pub coding_style: CodingStyleParameters,
    pub quantization: QuantizationParameters,
}

/// Coding parameters resolved for a single tile.
///
/// Tile-part header segments take precedence over main header segments, and
/// component segments (COC, QCC) over default segments (COD, QCD).
#[derive(Debug, Clone)]
pub struct TileCodingParameters {
    // Scod
    pub coding_style: u8,
    pub progression_order: ProgressionOrder,
    pub no_layers: u16,
    pub multiple_component_transformation: MultipleComponentTransformation,
    pub components: Vec<ComponentCodingParameters>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentGeometry {
    // On the component's sample grid.
    pub rect: Rect,
    pub precision: u8,
    pub signed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileGeometry {
    pub tile_index: u32,

    // On the reference grid.
    pub rect: Rect,
    pub components: Vec<ComponentGeometry>,
}

/// Turns the compressed data of one tile back into samples.
///
/// Implementations return one sample vector per component, each holding the
/// component rectangle in raster order. They must be deterministic: the same
/// payload and parameters always reconstruct the same samples.
pub trait TileCodec: Send + Sync {
    fn decode_tile_payload(
        &self,
        payload: &[u8],
        params: &TileCodingParameters,
        geometry: &TileGeometry,
    ) -> Result<Vec<Vec<i32>>, CodecError>;
}

/// Codec for tiles whose payload is the raw samples.
///
/// Components follow each other in index order, each in raster order, with
/// every sample stored big-endian in `ceil(precision / 8)` bytes. Signed
/// components use two's complement.
#[derive(Debug, Default, Clone, Copy)]
pub struct UncompressedCodec;

impl UncompressedCodec {
    pub fn bytes_per_sample(precision: u8) -> usize {
        (precision as usize).div_ceil(8)
    }

    /// Size in bytes of the payload expected for `geometry`.
    pub fn payload_length(geometry: &TileGeometry) -> usize {
        geometry
            .components
            .iter()
            .map(|c| c.rect.area() * Self::bytes_per_sample(c.precision))
            .sum()
    }
}

fn sample_range(precision: u8, signed: bool) -> (i64, i64) {
    if signed {
        (-(1i64 << (precision - 1)), (1i64 << (precision - 1)) - 1)
    } else {
        (0, (1i64 << precision) - 1)
    }
}

impl TileCodec for UncompressedCodec {
    fn decode_tile_payload(
        &self,
        payload: &[u8],
        _params: &TileCodingParameters,
        geometry: &TileGeometry,
    ) -> Result<Vec<Vec<i32>>, CodecError> {
        let expected = Self::payload_length(geometry);
        if payload.len() != expected {
            return Err(CodecError::PayloadLength {
                expected,
                actual: payload.len(),
            });
        }

        // Samples are held as i32.
        if let Some((c, component)) = geometry
            .components
            .iter()
            .enumerate()
            .find(|(_, component)| component.precision == 0 || component.precision > 31)
        {
            return Err(CodecError::Precision {
                component: c,
                precision: component.precision,
            });
        }

        let mut position = 0;
        let mut components = Vec::with_capacity(geometry.components.len());
        for (c, component) in geometry.components.iter().enumerate() {
            let size = Self::bytes_per_sample(component.precision);
            let (min, max) = sample_range(component.precision, component.signed);
            let area = component.rect.area();

            let mut samples = Vec::with_capacity(area);
            for chunk in payload[position..position + area * size].chunks_exact(size) {
                let raw = chunk.iter().fold(0i64, |value, byte| (value << 8) | *byte as i64);
                let value = if component.signed && raw >= 1i64 << (size * 8 - 1) {
                    raw - (1i64 << (size * 8))
                } else {
                    raw
                };

                if value < min || value > max {
                    return Err(CodecError::SampleOutOfRange {
                        component: c,
                        value,
                        precision: component.precision,
                    });
                }
                samples.push(value as i32);
            }

            position += area * size;
            components.push(samples);
        }

        Ok(components)
    }
}
