use crate::error::ImageError;
use crate::header::Header;
use crate::tile::{ceil_div, TilePartition};
use crate::tile_decoder::TileData;

/// Samples of one image component on its own sample grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentBuffer {
    // Origin of the component on its sample grid, ceil(XOsiz / XRsiz).
    x0: u32,
    y0: u32,

    width: u32,
    height: u32,

    dx: u8,
    dy: u8,
    precision: u8,
    signed: bool,

    // Allocated when the first tile is written.
    samples: Vec<i32>,
}

impl ComponentBuffer {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn x0(&self) -> u32 {
        self.x0
    }

    pub fn y0(&self) -> u32 {
        self.y0
    }

    pub fn dx(&self) -> u8 {
        self.dx
    }

    pub fn dy(&self) -> u8 {
        self.dy
    }

    pub fn precision(&self) -> u8 {
        self.precision
    }

    pub fn signed(&self) -> bool {
        self.signed
    }

    /// Samples in raster order, `width * height` of them, or none before
    /// any tile has been written.
    pub fn samples(&self) -> &[i32] {
        &self.samples
    }

    /// Sample at `(x, y)` relative to the component origin. Samples of tiles
    /// not yet written read as 0.
    pub fn get(&self, x: u32, y: u32) -> Option<i32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = y as usize * self.width as usize + x as usize;
        Some(self.samples.get(i).copied().unwrap_or(0))
    }

    fn allocate(&mut self) {
        if self.samples.is_empty() {
            self.samples = vec![0; self.width as usize * self.height as usize];
        }
    }
}

/// Reconstructed image, filled tile by tile.
#[derive(Debug, Clone)]
pub struct ImageBuffer {
    components: Vec<ComponentBuffer>,
    written: Vec<bool>,
}

impl ImageBuffer {
    pub fn new(header: &Header) -> ImageBuffer {
        let components = header
            .components()
            .iter()
            .map(|info| {
                let dx = info.dx as u32;
                let dy = info.dy as u32;
                let x0 = ceil_div(header.x_offset(), dx);
                let y0 = ceil_div(header.y_offset(), dy);
                let width = ceil_div(header.reference_grid_width(), dx) - x0;
                let height = ceil_div(header.reference_grid_height(), dy) - y0;

                ComponentBuffer {
                    x0,
                    y0,
                    width,
                    height,
                    dx: info.dx,
                    dy: info.dy,
                    precision: info.precision,
                    signed: info.signed,
                    samples: Vec::new(),
                }
            })
            .collect();

        let total_tiles = TilePartition::from_header(header).total_tiles();
        ImageBuffer {
            components,
            written: vec![false; total_tiles as usize],
        }
    }

    pub fn components(&self) -> &[ComponentBuffer] {
        &self.components
    }

    pub fn component(&self, c: usize) -> Option<&ComponentBuffer> {
        self.components.get(c)
    }

    pub fn get(&self, c: usize, x: u32, y: u32) -> Option<i32> {
        self.components.get(c).and_then(|component| component.get(x, y))
    }

    pub fn is_tile_written(&self, tile_index: u32) -> bool {
        self.written
            .get(tile_index as usize)
            .copied()
            .unwrap_or(false)
    }

    pub fn tiles_written(&self) -> usize {
        self.written.iter().filter(|w| **w).count()
    }

    pub fn is_complete(&self) -> bool {
        self.written.iter().all(|w| *w)
    }

    /// Copies the samples of a decoded tile into place.
    ///
    /// Nothing is written unless every component of the tile fits.
    pub fn write_tile(&mut self, tile: &TileData) -> Result<(), ImageError> {
        let total_tiles = self.written.len() as u32;
        let written = self
            .written
            .get(tile.tile_index as usize)
            .copied()
            .ok_or(ImageError::TileOutOfRange {
                tile_index: tile.tile_index,
                total_tiles,
            })?;
        if written {
            return Err(ImageError::TileAlreadyWritten {
                tile_index: tile.tile_index,
            });
        }

        if tile.components.len() != self.components.len() {
            return Err(ImageError::ComponentMismatch {
                expected: self.components.len(),
                actual: tile.components.len(),
            });
        }

        for (c, (source, target)) in tile.components.iter().zip(&self.components).enumerate() {
            let rect = source.rect;
            if rect.x0 < target.x0
                || rect.y0 < target.y0
                || rect.x1 > target.x0 + target.width
                || rect.y1 > target.y0 + target.height
                || rect.x0 > rect.x1
                || rect.y0 > rect.y1
            {
                return Err(ImageError::OutOfBounds {
                    component: c,
                    x0: rect.x0,
                    y0: rect.y0,
                    x1: rect.x1,
                    y1: rect.y1,
                });
            }
            if source.samples.len() != rect.area() {
                return Err(ImageError::SampleCount {
                    component: c,
                    expected: rect.area(),
                    actual: source.samples.len(),
                });
            }
        }

        for (source, target) in tile.components.iter().zip(self.components.iter_mut()) {
            let rect = source.rect;
            let width = rect.width() as usize;
            if width == 0 {
                continue;
            }
            target.allocate();

            for (row, line) in source.samples.chunks_exact(width).enumerate() {
                let y = (rect.y0 - target.y0) as usize + row;
                let start = y * target.width as usize + (rect.x0 - target.x0) as usize;
                target.samples[start..start + width].copy_from_slice(line);
            }
        }

        self.written[tile.tile_index as usize] = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile::Rect;
    use crate::tile_decoder::TileComponent;

    fn buffer(width: u32, height: u32, tiles: usize) -> ImageBuffer {
        ImageBuffer {
            components: vec![ComponentBuffer {
                x0: 0,
                y0: 0,
                width,
                height,
                dx: 1,
                dy: 1,
                precision: 8,
                signed: false,
                samples: Vec::new(),
            }],
            written: vec![false; tiles],
        }
    }

    #[test]
    fn test_planes_allocated_on_first_write() {
        let mut image = buffer(4, 2, 2);
        assert!(image.components()[0].samples().is_empty());
        assert_eq!(image.get(0, 3, 1), Some(0));
        assert_eq!(image.get(0, 4, 1), None);

        let tile = TileData {
            tile_index: 1,
            rect: Rect::new(2, 0, 4, 2),
            components: vec![TileComponent {
                rect: Rect::new(2, 0, 4, 2),
                samples: vec![1, 2, 3, 4],
            }],
        };
        image.write_tile(&tile).unwrap();

        assert_eq!(image.components()[0].samples(), &[0, 0, 1, 2, 0, 0, 3, 4]);
        assert_eq!(image.get(0, 3, 1), Some(4));
        assert!(image.is_tile_written(1));
        assert!(!image.is_complete());
    }
}
