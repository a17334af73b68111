use serde::Serialize;

use crate::bytes::{reverse_bits, slice};
use crate::layout::*;
use crate::table::{direct_base, Entity};
use crate::{RepackError, Result};

/// An 8x8 two-bit-per-pixel tile bitmap from the graphics region.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Pattern {
    pub id: usize,
    pub pixels: [u8; PATTERN_LEN],
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flip {
    Horizontal,
    Vertical,
    Both,
}

impl Pattern {
    pub(crate) fn decode(chr: &[u8], id: usize) -> Result<Self> {
        let base = direct_base(0, id, PATTERN_LEN);
        let mut pixels = [0; PATTERN_LEN];
        pixels.copy_from_slice(slice(chr, base, PATTERN_LEN, "pattern")?);
        Ok(Pattern { id, pixels })
    }

    /// Colour index (0-3) of the pixel at row `y`, column `x`.
    pub fn pixel_at(&self, y: usize, x: usize) -> u8 {
        let bit = 7 - x;
        let low = self.pixels[y] >> bit & 1;
        let high = self.pixels[y | 8] >> bit & 1;
        high << 1 | low
    }

    pub fn flipped(&self, flip: Flip) -> Pattern {
        let mut pixels = self.pixels;
        if matches!(flip, Flip::Horizontal | Flip::Both) {
            for row in pixels.iter_mut() {
                *row = reverse_bits(*row);
            }
        }
        if matches!(flip, Flip::Vertical | Flip::Both) {
            pixels[..8].reverse();
            pixels[8..].reverse();
        }
        Pattern {
            id: self.id,
            pixels,
        }
    }

    pub(crate) fn write(&self, chr: &mut [u8]) {
        let base = direct_base(0, self.id, PATTERN_LEN);
        chr[base..base + PATTERN_LEN].copy_from_slice(&self.pixels);
    }
}

impl Entity for Pattern {
    const KIND: &'static str = "pattern";

    fn id(&self) -> usize {
        self.id
    }
}

/// Four colours, stored in the unused tail of a screen page.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Palette {
    pub id: usize,
    #[serde(skip)]
    pub base: usize,
    pub colors: [u8; 4],
}

impl Palette {
    pub(crate) fn decode(prg: &[u8], id: usize) -> Result<Self> {
        let base = 0x40f0 | (id & 0xfc) << 6 | (id & 3) << 2;
        let mut colors = [0; 4];
        colors.copy_from_slice(slice(prg, base, 4, "palette")?);
        Ok(Palette { id, base, colors })
    }

    pub fn color(&self, index: usize) -> u8 {
        self.colors[index] & 0x3f
    }

    pub(crate) fn write(&self, prg: &mut [u8]) {
        prg[self.base..self.base + 4].copy_from_slice(&self.colors);
    }
}

impl Entity for Palette {
    const KIND: &'static str = "palette";

    fn id(&self) -> usize {
        self.id
    }
}

/// A 16x15 grid of metatile ids.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Screen {
    pub id: usize,
    #[serde(skip)]
    pub base: usize,
    pub tiles: [[u8; SCREEN_COLUMNS]; SCREEN_ROWS],
}

impl Screen {
    pub(crate) fn decode(prg: &[u8], id: usize) -> Result<Self> {
        let page = if id > 0xff { id + 0x40 } else { id };
        let base = page << 8;
        let bytes = slice(prg, base, SCREEN_ROWS * SCREEN_COLUMNS, "screen")?;
        let mut tiles = [[0; SCREEN_COLUMNS]; SCREEN_ROWS];
        for (row, chunk) in tiles.iter_mut().zip(bytes.chunks(SCREEN_COLUMNS)) {
            row.copy_from_slice(chunk);
        }
        Ok(Screen { id, base, tiles })
    }

    pub(crate) fn write(&self, prg: &mut [u8]) {
        for (y, row) in self.tiles.iter().enumerate() {
            let start = self.base + y * SCREEN_COLUMNS;
            prg[start..start + SCREEN_COLUMNS].copy_from_slice(row);
        }
    }
}

impl Entity for Screen {
    const KIND: &'static str = "screen";

    fn id(&self) -> usize {
        self.id
    }
}

/// Set on a tile whose appearance switches to its alternate when the
/// location's flag is set.
pub const ALTERNATIVE: u8 = 0x08;

/// Per-metatile terrain flags.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TileEffects {
    pub id: usize,
    #[serde(skip)]
    pub base: usize,
    pub effects: Vec<u8>,
}

impl TileEffects {
    pub(crate) fn decode(prg: &[u8], id: usize) -> Result<Self> {
        let base = (id << 8) & 0x1fff | 0x1_2000;
        Ok(TileEffects {
            id,
            base,
            effects: slice(prg, base, 0x100, "tile effects")?.to_vec(),
        })
    }

    pub(crate) fn write(&self, prg: &mut [u8]) -> Result<()> {
        if self.effects.len() != 0x100 {
            return Err(RepackError::FixedSizeChanged {
                kind: Self::KIND,
                id: self.id,
                expected: 0x100,
                actual: self.effects.len(),
            });
        }
        prg[self.base..self.base + 0x100].copy_from_slice(&self.effects);
        Ok(())
    }
}

impl Entity for TileEffects {
    const KIND: &'static str = "tile effects";

    fn id(&self) -> usize {
        self.id
    }
}

/// Metatile definitions: four 256-entry quadrant tables of tile pattern ids,
/// a 2-bit palette attribute per metatile, and the flag-dependent alternates
/// for the first 32 metatiles.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Tileset {
    pub id: usize,
    #[serde(skip)]
    tile_base: usize,
    #[serde(skip)]
    attr_base: usize,
    #[serde(skip)]
    alternates_base: usize,
    pub tiles: [Vec<u8>; 4],
    pub attrs: Vec<u8>,
    pub alternates: [u8; ALTERNATE_TILES],
}

impl Tileset {
    pub(crate) fn decode(prg: &[u8], id: usize) -> Result<Self> {
        let index = (id & 0x3f) >> 2;
        let tile_base = TILESET_TILES + index * 0x400;
        let attr_base = TILESET_ATTRS + index * 0x40;
        let alternates_base = TILESET_ALTERNATES + index * ALTERNATE_TILES;

        let mut tiles: [Vec<u8>; 4] = Default::default();
        for (quadrant, entries) in tiles.iter_mut().enumerate() {
            *entries = slice(prg, tile_base + quadrant * 0x100, 0x100, "tileset tiles")?.to_vec();
        }
        let packed = slice(prg, attr_base, 0x40, "tileset attributes")?;
        let attrs = (0..0x100)
            .map(|i| packed[i >> 2] >> ((i & 3) << 1) & 3)
            .collect();
        let mut alternates = [0; ALTERNATE_TILES];
        alternates.copy_from_slice(slice(
            prg,
            alternates_base,
            ALTERNATE_TILES,
            "tileset alternates",
        )?);

        Ok(Tileset {
            id,
            tile_base,
            attr_base,
            alternates_base,
            tiles,
            attrs,
            alternates,
        })
    }

    /// Drops the flag-dependent alternate of `tile`, so it always shows its
    /// unflagged appearance.
    ///
    /// The tile and its alternate must agree on the [`ALTERNATIVE`] effect
    /// bit; when they do not, the reorganization is refused.
    pub fn unflag(&mut self, effects: &mut TileEffects, tile: usize) -> Result<()> {
        let target = *self.alternates.get(tile).ok_or(RepackError::MissingLookup {
            kind: "alternate tile",
            id: tile,
        })? as usize;
        if target == tile {
            return Ok(());
        }

        let source_flag = effects.effects[tile] & ALTERNATIVE;
        let target_flag = effects.effects[target] & ALTERNATIVE;
        if source_flag != target_flag {
            return Err(RepackError::AlternateMismatch {
                tileset: self.id,
                tile,
            });
        }

        self.alternates[tile] = tile as u8;
        effects.effects[tile] &= !ALTERNATIVE;
        Ok(())
    }

    pub(crate) fn write(&self, prg: &mut [u8]) -> Result<()> {
        if let Some(quadrant) = self.tiles.iter().find(|q| q.len() != 0x100) {
            return Err(RepackError::FixedSizeChanged {
                kind: Self::KIND,
                id: self.id,
                expected: 0x100,
                actual: quadrant.len(),
            });
        }
        if self.attrs.len() != 0x100 {
            return Err(RepackError::FixedSizeChanged {
                kind: Self::KIND,
                id: self.id,
                expected: 0x100,
                actual: self.attrs.len(),
            });
        }

        for (quadrant, tiles) in self.tiles.iter().enumerate() {
            let start = self.tile_base + quadrant * 0x100;
            prg[start..start + 0x100].copy_from_slice(tiles);
        }
        for (i, group) in self.attrs.chunks(4).enumerate() {
            prg[self.attr_base + i] = group
                .iter()
                .enumerate()
                .fold(0, |packed, (j, attr)| packed | (attr & 3) << (j << 1));
        }
        prg[self.alternates_base..self.alternates_base + ALTERNATE_TILES]
            .copy_from_slice(&self.alternates);
        Ok(())
    }
}

impl Entity for Tileset {
    const KIND: &'static str = "tileset";

    fn id(&self) -> usize {
        self.id
    }
}
