use crate::error::TileIndexOutOfRange;
use crate::header::Header;

/// `ceil(a / b)` without overflowing `a + b - 1`.
pub(crate) fn ceil_div(a: u32, b: u32) -> u32 {
    ((a as u64 + b as u64 - 1) / b as u64) as u32
}

/// Half-open rectangle `[x0, x1) × [y0, y1)`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rect {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl Rect {
    pub fn new(x0: u32, y0: u32, x1: u32, y1: u32) -> Rect {
        Rect { x0, y0, x1, y1 }
    }

    pub fn width(&self) -> u32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> u32 {
        self.y1 - self.y0
    }

    pub fn area(&self) -> usize {
        self.width() as usize * self.height() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.x0 >= self.x1 || self.y0 >= self.y1
    }

    /// Maps a reference grid rectangle onto a component's sample grid.
    ///
    /// B-12: `tcx0 = ceil(tx0 / XRsiz)`, `tcx1 = ceil(tx1 / XRsiz)`, and
    /// likewise vertically.
    pub fn component_rect(&self, dx: u8, dy: u8) -> Rect {
        let dx = dx as u32;
        let dy = dy as u32;
        Rect {
            x0: ceil_div(self.x0, dx),
            y0: ceil_div(self.y0, dy),
            x1: ceil_div(self.x1, dx),
            y1: ceil_div(self.y1, dy),
        }
    }
}

// B.3 Division of the image into tiles and tile-components
//
// The reference grid is partitioned into a regular array of rectangles
// anchored at (XTOsiz, YTOsiz). Tiles are numbered in raster order and clipped
// to the image area.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TilePartition {
    tiles_x: u32,
    tiles_y: u32,

    image_x0: u32,
    image_y0: u32,
    image_x1: u32,
    image_y1: u32,

    tile_x_offset: u32,
    tile_y_offset: u32,
    tile_width: u32,
    tile_height: u32,
}

impl TilePartition {
    pub fn from_header(header: &Header) -> TilePartition {
        // B-5, numtiles = ceil((Xsiz − XTOsiz) / XTsiz) · ceil((Ysiz − YTOsiz) / YTsiz)
        TilePartition {
            tiles_x: ceil_div(
                header.reference_grid_width() - header.tile_x_offset(),
                header.tile_width(),
            ),
            tiles_y: ceil_div(
                header.reference_grid_height() - header.tile_y_offset(),
                header.tile_height(),
            ),
            image_x0: header.x_offset(),
            image_y0: header.y_offset(),
            image_x1: header.reference_grid_width(),
            image_y1: header.reference_grid_height(),
            tile_x_offset: header.tile_x_offset(),
            tile_y_offset: header.tile_y_offset(),
            tile_width: header.tile_width(),
            tile_height: header.tile_height(),
        }
    }

    pub fn tiles_x(&self) -> u32 {
        self.tiles_x
    }

    pub fn tiles_y(&self) -> u32 {
        self.tiles_y
    }

    pub fn total_tiles(&self) -> u32 {
        self.tiles_x * self.tiles_y
    }

    /// Horizontal and vertical position `(p, q)` of tile `i` in the grid.
    pub fn position(&self, i: u32) -> Result<(u32, u32), TileIndexOutOfRange> {
        if i >= self.total_tiles() {
            return Err(TileIndexOutOfRange {
                tile_index: i,
                total_tiles: self.total_tiles(),
            });
        }
        Ok((i % self.tiles_x, i / self.tiles_x))
    }

    /// Reference grid rectangle of tile `i`, B-7 to B-10.
    pub fn bounds(&self, i: u32) -> Result<Rect, TileIndexOutOfRange> {
        let (p, q) = self.position(i)?;

        let x0 = self.tile_x_offset as u64 + p as u64 * self.tile_width as u64;
        let y0 = self.tile_y_offset as u64 + q as u64 * self.tile_height as u64;
        let x1 = x0 + self.tile_width as u64;
        let y1 = y0 + self.tile_height as u64;

        Ok(Rect {
            x0: x0.max(self.image_x0 as u64) as u32,
            y0: y0.max(self.image_y0 as u64) as u32,
            x1: x1.min(self.image_x1 as u64) as u32,
            y1: y1.min(self.image_y1 as u64) as u32,
        })
    }

    /// Every tile with its rectangle, in raster order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, Rect)> + '_ {
        (0..self.total_tiles()).filter_map(move |i| self.bounds(i).ok().map(|rect| (i, rect)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partition(width: u32, height: u32, tile_width: u32, tile_height: u32) -> TilePartition {
        TilePartition {
            tiles_x: ceil_div(width, tile_width),
            tiles_y: ceil_div(height, tile_height),
            image_x0: 0,
            image_y0: 0,
            image_x1: width,
            image_y1: height,
            tile_x_offset: 0,
            tile_y_offset: 0,
            tile_width,
            tile_height,
        }
    }

    #[test]
    fn test_ceil_div() {
        assert_eq!(ceil_div(0, 3), 0);
        assert_eq!(ceil_div(7, 2), 4);
        assert_eq!(ceil_div(8, 2), 4);
        assert_eq!(ceil_div(u32::MAX, u32::MAX), 1);
    }

    #[test]
    fn test_even_grid() {
        let tiles = partition(512, 512, 256, 256);
        assert_eq!((tiles.tiles_x(), tiles.tiles_y()), (2, 2));
        assert_eq!(tiles.total_tiles(), 4);
        assert_eq!(tiles.bounds(0).unwrap(), Rect::new(0, 0, 256, 256));
        assert_eq!(tiles.bounds(3).unwrap(), Rect::new(256, 256, 512, 512));
    }

    #[test]
    fn test_clipped_edge_tile() {
        let tiles = partition(300, 200, 256, 256);
        assert_eq!((tiles.tiles_x(), tiles.tiles_y()), (2, 1));
        assert_eq!(tiles.bounds(1).unwrap(), Rect::new(256, 0, 300, 200));
        assert_eq!(
            tiles.bounds(2),
            Err(TileIndexOutOfRange {
                tile_index: 2,
                total_tiles: 2
            })
        );
    }

    #[test]
    fn test_tiles_cover_image_once() {
        let tiles = partition(97, 61, 16, 20);
        let mut covered = vec![0u8; 97 * 61];
        for (_, rect) in tiles.iter() {
            for y in rect.y0..rect.y1 {
                for x in rect.x0..rect.x1 {
                    covered[(y * 97 + x) as usize] += 1;
                }
            }
        }
        assert!(covered.iter().all(|&n| n == 1));
    }

    #[test]
    fn test_raster_order() {
        let tiles = partition(97, 61, 16, 20);
        let rects: Vec<Rect> = tiles.iter().map(|(_, rect)| rect).collect();
        assert_eq!(rects.len() as u32, tiles.total_tiles());
        for (i, pair) in rects.windows(2).enumerate() {
            assert!(pair[0].y0 <= pair[1].y0);
            if (i as u32 + 1) % tiles.tiles_x() != 0 {
                assert!(pair[0].x0 < pair[1].x0);
            }
        }
    }

    #[test]
    fn test_component_rect_rounds_up() {
        let rect = Rect::new(3, 5, 11, 8);
        assert_eq!(rect.component_rect(2, 2), Rect::new(2, 3, 6, 4));
        assert_eq!(rect.component_rect(1, 1), rect);
    }
}
