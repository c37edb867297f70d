use std::iter::FusedIterator;

use crate::geometry::{ScreenBlock, ScreenPoint, ScreenSize};

pub trait ScreenBlockExt {
    fn from_size(size: ScreenSize) -> Self;
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn area(&self) -> u32;
    fn internal_points(&self) -> InternalPoints;
    fn tile_ordering(&self, tile_size: u32) -> Vec<ScreenBlock>;
}

impl ScreenBlockExt for ScreenBlock {
    /// Block starting at the origin. Max corner is exclusive.
    fn from_size(size: ScreenSize) -> Self {
        ScreenBlock::new(ScreenPoint::origin(), ScreenPoint::from(size))
    }

    fn width(&self) -> u32 {
        self.max.x.saturating_sub(self.min.x)
    }

    fn height(&self) -> u32 {
        self.max.y.saturating_sub(self.min.y)
    }

    fn area(&self) -> u32 {
        self.width() * self.height()
    }

    /// Create an iterator over coordinates (x, y) pairs inside the block,
    /// in C order (x changes first, then y)
    fn internal_points(&self) -> InternalPoints {
        if self.area() == 0 {
            InternalPoints::empty()
        } else {
            InternalPoints {
                min_x: self.min.x,
                max: self.max,
                cursor: self.min,
            }
        }
    }

    /// Splits the block into tiles of `tile_size` squared pixels (clipped at the right and
    /// bottom edge), ordered from the center outwards.
    /// Tile size must be non zero.
    fn tile_ordering(&self, tile_size: u32) -> Vec<ScreenBlock> {
        assert!(tile_size > 0);

        let columns = self.width().div_ceil(tile_size);
        let rows = self.height().div_ceil(tile_size);
        let center = (
            (columns as f32 - 1.0) / 2.0,
            (rows as f32 - 1.0) / 2.0,
        );

        let mut tiles: Vec<(u32, u32)> = (0..rows)
            .flat_map(|row| (0..columns).map(move |column| (column, row)))
            .collect();
        // Square rings around the center, stable sort keeps row order within a ring
        tiles.sort_by(|a, b| {
            let ring = |(column, row): &(u32, u32)| {
                (*column as f32 - center.0)
                    .abs()
                    .max((*row as f32 - center.1).abs())
            };
            ring(a).total_cmp(&ring(b))
        });

        tiles
            .into_iter()
            .map(|(column, row)| {
                let min = ScreenPoint::new(
                    self.min.x + column * tile_size,
                    self.min.y + row * tile_size,
                );
                let max = ScreenPoint::new(
                    (min.x + tile_size).min(self.max.x),
                    (min.y + tile_size).min(self.max.y),
                );
                ScreenBlock::new(min, max)
            })
            .collect()
    }
}

#[derive(Copy, Clone, Debug)]
pub struct InternalPoints {
    min_x: u32,
    max: ScreenPoint,

    cursor: ScreenPoint,
}

impl InternalPoints {
    // Construct an iterator over internal points that returns no points
    fn empty() -> Self {
        InternalPoints {
            min_x: 1,
            max: ScreenPoint::origin(),

            cursor: ScreenPoint::origin(),
        }
    }
}

impl Iterator for InternalPoints {
    type Item = ScreenPoint;

    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = self.len();
        (len, Some(len))
    }

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor.y >= self.max.y {
            return None;
        }

        let ret = self.cursor;

        debug_assert!(self.cursor.x < self.max.x);
        self.cursor.x += 1;
        if self.cursor.x >= self.max.x {
            self.cursor.x = self.min_x;
            self.cursor.y += 1;
        }

        Some(ret)
    }
}

impl ExactSizeIterator for InternalPoints {
    fn len(&self) -> usize {
        if self.cursor.y >= self.max.y {
            0
        } else {
            let row_width = (self.max.x - self.min_x) as usize;
            let whole_rows = (self.max.y - self.cursor.y - 1) as usize;
            let current_row = (self.max.x - self.cursor.x) as usize;
            whole_rows * row_width + current_row
        }
    }
}

impl FusedIterator for InternalPoints {}
