use flate2::Crc;
use log::debug;
use serde::Serialize;

use crate::condition::MessageId;
use crate::graphics::{Palette, Pattern, Screen, TileEffects, Tileset};
use crate::item_get::ItemGet;
use crate::layout::*;
use crate::location::Location;
use crate::messages::Messages;
use crate::npc::Npc;
use crate::objects::ObjectData;
use crate::table::{Entity, Table};
use crate::trigger::Trigger;
use crate::{RepackError, Result};

/// Whether to check the whole-file CRC32 before decoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Integrity {
    Expect(u32),
    Skip,
}

pub fn crc32(bytes: &[u8]) -> u32 {
    let mut crc = Crc::new();
    crc.update(bytes);
    crc.sum()
}

pub(crate) fn prg_mut(image: &mut [u8]) -> &mut [u8] {
    &mut image[HEADER_LEN..HEADER_LEN + PRG_LEN]
}

pub(crate) fn chr_mut(image: &mut [u8]) -> &mut [u8] {
    &mut image[HEADER_LEN + PRG_LEN..]
}

#[derive(Clone, Debug, Serialize)]
pub struct Rom {
    #[serde(skip)]
    pub(crate) image: Vec<u8>,
    #[serde(skip)]
    pub patterns: Table<Pattern>,
    pub palettes: Table<Palette>,
    pub screens: Table<Screen>,
    pub tilesets: Table<Tileset>,
    pub tile_effects: Table<TileEffects>,
    pub locations: Table<Location>,
    pub objects: Table<ObjectData>,
    pub npcs: Table<Npc>,
    pub item_gets: Table<ItemGet>,
    pub triggers: Table<Trigger>,
    pub messages: Messages,
}

impl Rom {
    /// Decodes every table of `image`.
    pub fn load(image: Vec<u8>, integrity: Integrity) -> Result<Rom> {
        if image.len() != IMAGE_LEN {
            return Err(RepackError::decode(
                "image",
                format!("expected {IMAGE_LEN:#x} bytes, found {:#x}", image.len()),
            ));
        }
        if let Integrity::Expect(expected) = integrity {
            let actual = crc32(&image);
            if actual != expected {
                return Err(RepackError::Integrity { expected, actual });
            }
        }

        let prg = &image[HEADER_LEN..HEADER_LEN + PRG_LEN];
        let chr = &image[HEADER_LEN + PRG_LEN..];
        // Both loads must agree on the page, which is either the shipped one
        // or the one a previous commit moved the table to.
        let pages = OBJECT_TABLE_REFS.map(|operand| prg[operand]);
        let object_table = match pages {
            [OBJECT_TABLE_PAGE, OBJECT_TABLE_PAGE] => OBJECT_TABLE,
            [OBJECT_TABLE_RELOCATED_PAGE, OBJECT_TABLE_RELOCATED_PAGE] => OBJECT_TABLE_RELOCATED,
            [first, second] => {
                return Err(RepackError::decode(
                    "object table",
                    format!("unexpected operand pages {first:#04x} and {second:#04x}"),
                ))
            }
        };
        debug!("object table at {object_table:#x}");

        let patterns = Table::decode(0, 1, PATTERN_COUNT, |id| Pattern::decode(chr, id))?;
        let palettes = Table::decode(0, 1, PALETTE_COUNT, |id| Palette::decode(prg, id))?;
        let screens = Table::decode(0, 1, SCREEN_COUNT, |id| Screen::decode(prg, id))?;
        let tilesets = Table::decode(FIRST_TILESET, 4, TILESET_COUNT, |id| {
            Tileset::decode(prg, id)
        })?;
        let tile_effects = Table::decode(FIRST_TILE_EFFECTS, 1, TILE_EFFECTS_COUNT, |id| {
            TileEffects::decode(prg, id)
        })?;
        let locations = Table::decode(0, 1, LOCATION_COUNT, |id| Location::decode(prg, id))?;
        let objects = Table::decode(0, 1, OBJECT_COUNT, |id| {
            ObjectData::decode(prg, object_table, id)
        })?;
        let npcs = Table::decode(0, 1, NPC_COUNT, |id| Npc::decode(prg, id))?;
        let item_gets = Table::decode(0, 1, ITEM_GET_COUNT, |id| ItemGet::decode(prg, id))?;
        let triggers = Table::decode(FIRST_TRIGGER, 1, TRIGGER_COUNT, |id| {
            Trigger::decode(prg, id)
        })?;
        let messages = Messages::decode(prg)?;

        Ok(Rom {
            image,
            patterns,
            palettes,
            screens,
            tilesets,
            tile_effects,
            locations,
            objects,
            npcs,
            item_gets,
            triggers,
            messages,
        })
    }

    pub fn image(&self) -> &[u8] {
        &self.image
    }

    pub fn into_image(self) -> Vec<u8> {
        self.image
    }

    pub fn prg(&self) -> &[u8] {
        &self.image[HEADER_LEN..HEADER_LEN + PRG_LEN]
    }

    pub fn chr(&self) -> &[u8] {
        &self.image[HEADER_LEN + PRG_LEN..]
    }

    /// Ids of the used locations drawn with `tileset`.
    pub fn locations_using_tileset(&self, tileset: usize) -> Vec<usize> {
        self.locations
            .iter()
            .filter(|l| l.used && l.tileset as usize == tileset)
            .map(|l| l.id)
            .collect()
    }

    /// Ids of the locations whose sprite setup places `npc`.
    pub fn locations_spawning_npc(&self, npc: usize) -> Vec<usize> {
        self.locations
            .iter()
            .filter(|l| {
                l.npc_data.as_ref().map_or(false, |data| {
                    data.spawns
                        .iter()
                        .any(|s| s.is_npc() && s.id as usize == npc)
                })
            })
            .map(|l| l.id)
            .collect()
    }

    /// The acquisition record granting `item`.
    pub fn item_get_for_item(&self, item: u8) -> Result<&ItemGet> {
        self.item_gets
            .iter()
            .find(|g| g.used && g.item == item)
            .ok_or(RepackError::MissingLookup {
                kind: "item get for item",
                id: item as usize,
            })
    }

    pub fn message(&self, id: MessageId) -> Result<&[u8]> {
        self.messages.get(id)
    }

    /// Drops the flag-dependent alternate of `tile` in the tileset drawn by
    /// `location`, updating the tile effects it is paired with.
    pub fn unflag_tile(&mut self, location: usize, tile: usize) -> Result<()> {
        let location = self.locations.get(location)?;
        let (tileset, effects) = (location.tileset as usize, location.tile_effects as usize);
        let effects = self.tile_effects.get_mut(effects)?;
        self.tilesets.get_mut(tileset)?.unflag(effects, tile)
    }

    /// Pretty JSON of every decoded record except raw patterns.
    pub fn dump_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Records whose field values differ from `other`'s, as `kind id`.
    pub fn diff_records(&self, other: &Rom) -> Vec<String> {
        let mut diffs = Vec::new();
        diff_table(&self.patterns, &other.patterns, &mut diffs);
        diff_table(&self.palettes, &other.palettes, &mut diffs);
        diff_table(&self.screens, &other.screens, &mut diffs);
        diff_table(&self.tilesets, &other.tilesets, &mut diffs);
        diff_table(&self.tile_effects, &other.tile_effects, &mut diffs);
        diff_table(&self.locations, &other.locations, &mut diffs);
        diff_table(&self.objects, &other.objects, &mut diffs);
        diff_table(&self.npcs, &other.npcs, &mut diffs);
        diff_table(&self.item_gets, &other.item_gets, &mut diffs);
        diff_table(&self.triggers, &other.triggers, &mut diffs);
        diff_table(&self.messages.parts, &other.messages.parts, &mut diffs);
        diffs
    }
}

fn diff_table<T: Entity + PartialEq>(ours: &Table<T>, theirs: &Table<T>, diffs: &mut Vec<String>) {
    if ours.len() != theirs.len() {
        diffs.push(format!("{} count {} != {}", T::KIND, ours.len(), theirs.len()));
        return;
    }
    for (a, b) in ours.iter().zip(theirs) {
        if a != b {
            diffs.push(format!("{} {:#x}", T::KIND, a.id()));
        }
    }
}
