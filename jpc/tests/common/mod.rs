#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use jpc::EventHandler;

pub const SOC: [u8; 2] = [0xFF, 0x4F];
pub const SIZ: [u8; 2] = [0xFF, 0x51];
pub const COD: [u8; 2] = [0xFF, 0x52];
pub const COC: [u8; 2] = [0xFF, 0x53];
pub const TLM: [u8; 2] = [0xFF, 0x55];
pub const QCD: [u8; 2] = [0xFF, 0x5C];
pub const QCC: [u8; 2] = [0xFF, 0x5D];
pub const CRG: [u8; 2] = [0xFF, 0x63];
pub const COM: [u8; 2] = [0xFF, 0x64];
pub const SOT: [u8; 2] = [0xFF, 0x90];
pub const SOD: [u8; 2] = [0xFF, 0x93];
pub const EOC: [u8; 2] = [0xFF, 0xD9];

/// Marker followed by its length-prefixed payload.
pub fn segment(marker: [u8; 2], payload: &[u8]) -> Vec<u8> {
    let mut bytes = marker.to_vec();
    bytes.extend(((payload.len() + 2) as u16).to_be_bytes());
    bytes.extend(payload);
    bytes
}

/// COD with no decomposition, 64x64 code-blocks and the 5-3 filter.
pub fn cod_payload(no_layers: u16) -> Vec<u8> {
    let mut payload = vec![0, 0];
    payload.extend(no_layers.to_be_bytes());
    payload.extend([0, 0, 4, 4, 0, 1]);
    payload
}

/// QCD without quantization, 2 guard bits.
pub fn qcd_payload() -> Vec<u8> {
    vec![0b0100_0000, 0x48]
}

/// SOT segment, SOD, then `data`, with Psot covering all of it unless given.
pub fn tile_part(
    tile_index: u16,
    tile_part_index: u8,
    no_tile_parts: u8,
    header_segments: &[u8],
    data: &[u8],
    psot: Option<u32>,
) -> Vec<u8> {
    let length = 12 + header_segments.len() + 2 + data.len();
    let mut bytes = SOT.to_vec();
    bytes.extend(10u16.to_be_bytes());
    bytes.extend(tile_index.to_be_bytes());
    bytes.extend(psot.unwrap_or(length as u32).to_be_bytes());
    bytes.push(tile_part_index);
    bytes.push(no_tile_parts);
    bytes.extend(header_segments);
    bytes.extend(SOD);
    bytes.extend(data);
    bytes
}

#[derive(Debug, Clone, Copy)]
pub struct Component {
    pub precision: u8,
    pub signed: bool,
    pub dx: u8,
    pub dy: u8,
}

fn ceil_div(a: u32, b: u32) -> u32 {
    (a + b - 1) / b
}

/// Builds small codestreams whose tiles carry raw samples.
#[derive(Debug, Clone)]
pub struct CodestreamBuilder {
    pub width: u32,
    pub height: u32,
    pub x_offset: u32,
    pub y_offset: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    pub tile_x_offset: u32,
    pub tile_y_offset: u32,
    pub components: Vec<Component>,
    pub cod: bool,
    pub qcd: bool,
    pub extra_segments: Vec<u8>,
}

impl CodestreamBuilder {
    /// One unsigned 8-bit component, no offsets.
    pub fn new(width: u32, height: u32, tile_width: u32, tile_height: u32) -> CodestreamBuilder {
        CodestreamBuilder {
            width,
            height,
            x_offset: 0,
            y_offset: 0,
            tile_width,
            tile_height,
            tile_x_offset: 0,
            tile_y_offset: 0,
            components: vec![Component {
                precision: 8,
                signed: false,
                dx: 1,
                dy: 1,
            }],
            cod: true,
            qcd: true,
            extra_segments: Vec::new(),
        }
    }

    pub fn components(mut self, components: Vec<Component>) -> CodestreamBuilder {
        self.components = components;
        self
    }

    pub fn offsets(mut self, x: u32, y: u32, tile_x: u32, tile_y: u32) -> CodestreamBuilder {
        self.x_offset = x;
        self.y_offset = y;
        self.tile_x_offset = tile_x;
        self.tile_y_offset = tile_y;
        self
    }

    pub fn without_cod(mut self) -> CodestreamBuilder {
        self.cod = false;
        self
    }

    pub fn without_qcd(mut self) -> CodestreamBuilder {
        self.qcd = false;
        self
    }

    /// Appends a raw segment to the main header after QCD.
    pub fn main_segment(mut self, marker: [u8; 2], payload: &[u8]) -> CodestreamBuilder {
        self.extra_segments.extend(segment(marker, payload));
        self
    }

    pub fn siz_payload(&self) -> Vec<u8> {
        let mut payload = vec![0, 0];
        for value in [
            self.width,
            self.height,
            self.x_offset,
            self.y_offset,
            self.tile_width,
            self.tile_height,
            self.tile_x_offset,
            self.tile_y_offset,
        ] {
            payload.extend(value.to_be_bytes());
        }
        payload.extend((self.components.len() as u16).to_be_bytes());
        for component in &self.components {
            let sign = if component.signed { 0x80 } else { 0 };
            payload.push(sign | (component.precision - 1));
            payload.push(component.dx);
            payload.push(component.dy);
        }
        payload
    }

    /// SOC through the last main header segment.
    pub fn main_header(&self) -> Vec<u8> {
        let mut bytes = SOC.to_vec();
        bytes.extend(segment(SIZ, &self.siz_payload()));
        if self.cod {
            bytes.extend(segment(COD, &cod_payload(1)));
        }
        if self.qcd {
            bytes.extend(segment(QCD, &qcd_payload()));
        }
        bytes.extend(&self.extra_segments);
        bytes
    }

    pub fn tiles_x(&self) -> u32 {
        ceil_div(self.width - self.tile_x_offset, self.tile_width)
    }

    pub fn tiles_y(&self) -> u32 {
        ceil_div(self.height - self.tile_y_offset, self.tile_height)
    }

    pub fn total_tiles(&self) -> u32 {
        self.tiles_x() * self.tiles_y()
    }

    /// Reference grid rectangle `(x0, y0, x1, y1)` of tile `i`.
    pub fn tile_rect(&self, i: u32) -> (u32, u32, u32, u32) {
        let p = i % self.tiles_x();
        let q = i / self.tiles_x();
        let x0 = (self.tile_x_offset + p * self.tile_width).max(self.x_offset);
        let y0 = (self.tile_y_offset + q * self.tile_height).max(self.y_offset);
        let x1 = (self.tile_x_offset + (p + 1) * self.tile_width).min(self.width);
        let y1 = (self.tile_y_offset + (q + 1) * self.tile_height).min(self.height);
        (x0, y0, x1, y1)
    }

    /// Sample value at absolute component grid position `(x, y)`.
    pub fn sample(&self, c: usize, x: u32, y: u32) -> i32 {
        let component = self.components[c];
        let bits = component.precision.min(16) as u32;
        let value = ((c as u32 * 31 + x * 7 + y * 3) % (1 << bits)) as i32;
        if component.signed {
            value - (1 << (bits - 1))
        } else {
            value
        }
    }

    /// Raw big-endian samples of tile `i`, components in order.
    pub fn tile_payload(&self, i: u32) -> Vec<u8> {
        let (x0, y0, x1, y1) = self.tile_rect(i);
        let mut bytes = Vec::new();
        for (c, component) in self.components.iter().enumerate() {
            let dx = component.dx as u32;
            let dy = component.dy as u32;
            let size = (component.precision as usize + 7) / 8;
            for y in ceil_div(y0, dy)..ceil_div(y1, dy) {
                for x in ceil_div(x0, dx)..ceil_div(x1, dx) {
                    let value = self.sample(c, x, y) as i64 as u64;
                    let be = value.to_be_bytes();
                    bytes.extend(&be[8 - size..]);
                }
            }
        }
        bytes
    }

    /// Every tile as a single tile-part, in raster order, followed by EOC.
    pub fn build(&self) -> Vec<u8> {
        let mut bytes = self.main_header();
        for i in 0..self.total_tiles() {
            bytes.extend(tile_part(i as u16, 0, 1, &[], &self.tile_payload(i), None));
        }
        bytes.extend(EOC);
        bytes
    }
}

/// Collects events so tests can inspect them.
#[derive(Debug, Default, Clone)]
pub struct RecordingEvents {
    pub infos: Arc<Mutex<Vec<String>>>,
    pub warnings: Arc<Mutex<Vec<String>>>,
    pub errors: Arc<Mutex<Vec<String>>>,
}

impl EventHandler for RecordingEvents {
    fn on_info(&self, message: &str) {
        self.infos.lock().unwrap().push(message.to_owned());
    }

    fn on_warning(&self, message: &str) {
        self.warnings.lock().unwrap().push(message.to_owned());
    }

    fn on_error(&self, message: &str) {
        self.errors.lock().unwrap().push(message.to_owned());
    }
}
