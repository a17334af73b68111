use log::warn;
use serde::Serialize;

use crate::bytes::{
    byte, check_bounds, encode_pointer, read_pointer, read_terminated_list, read_word_le, slice,
    Sentinel,
};
use crate::layout::*;
use crate::table::Entity;
use crate::writer::Writer;
use crate::{RepackError, Result};

/// Exit terminator written by the original image; entrance count and pit
/// presence then follow from sub-block adjacency.
const ORIGINAL_EXITS_END: u8 = 0xff;
const EXITS_END: u8 = 0x80;
const EXITS_END_PITS: u8 = 0x40;
const EXITS_END_COUNT: u8 = 0x1f;

const LAYOUT_HEADER_LEN: usize = 5;
const NPC_DATA_HEADER_LEN: usize = 5;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Entrance {
    pub y: u16,
    pub x: u16,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Exit {
    pub x: u8,
    pub y: u8,
    pub dest: u8,
    pub entrance: u8,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Flag {
    pub flag: u8,
    pub yx: u8,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Pit {
    pub from_screen: u8,
    pub to_screen: u8,
    pub to_y: u8,
    pub to_x: u8,
}

/// One placed object, npc, chest or trigger.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Spawn {
    pub y: u8,
    pub x: u8,
    pub kind: u8,
    pub id: u8,
}

impl Spawn {
    pub fn spawn_type(&self) -> u8 {
        self.kind & 0x07
    }

    pub fn is_monster(&self) -> bool {
        self.spawn_type() == 0
    }

    pub fn is_npc(&self) -> bool {
        self.spawn_type() == 1
    }

    pub fn is_chest(&self) -> bool {
        self.spawn_type() == 2 && self.id < 0x80
    }

    pub fn is_trigger(&self) -> bool {
        self.spawn_type() == 2 && self.id >= 0x80
    }

    pub fn is_wall(&self) -> bool {
        self.spawn_type() == 3
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct NpcData {
    pub sprite_palettes: [u8; 2],
    pub sprite_patterns: [u8; 2],
    pub spawns: Vec<Spawn>,
}

impl NpcData {
    fn decode(prg: &[u8], id: usize) -> Result<Option<Self>> {
        let stored = read_word_le(prg, NPC_DATA_TABLE + 2 * id)?;
        if stored == 0 {
            return Ok(None);
        }
        let base = check_bounds(
            "npc data",
            stored as usize + NPC_DATA_BANK,
            NPC_DATA_START,
            NPC_DATA_LIMIT,
        )?;
        let header = slice(prg, base, NPC_DATA_HEADER_LEN, "npc data")?;
        let (spawns, _) = read_terminated_list(
            prg,
            base + NPC_DATA_HEADER_LEN,
            4,
            Sentinel::Record(&[0xff]),
            NPC_DATA_LIMIT,
        )
        .collect_terminated("spawn list")?;

        Ok(Some(NpcData {
            sprite_palettes: [header[1], header[2]],
            sprite_patterns: [header[3], header[4]],
            spawns: spawns
                .into_iter()
                .map(|r| Spawn {
                    y: r[0],
                    x: r[1],
                    kind: r[2],
                    id: r[3],
                })
                .collect(),
        }))
    }

    fn encode(&self) -> Vec<u8> {
        let mut out = vec![
            0,
            self.sprite_palettes[0],
            self.sprite_palettes[1],
            self.sprite_patterns[0],
            self.sprite_patterns[1],
        ];
        for spawn in &self.spawns {
            out.extend_from_slice(&[spawn.y, spawn.x, spawn.kind, spawn.id]);
        }
        out.push(0xff);
        out
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Location {
    pub id: usize,
    pub used: bool,
    pub bgm: u8,
    pub animation: u8,
    pub extended: u8,
    /// Screen bytes, row-major. Width and height are implied by the grid.
    pub screens: Vec<Vec<u8>>,
    pub tile_palettes: [u8; 3],
    pub tileset: u8,
    pub tile_effects: u8,
    pub tile_patterns: [u8; 2],
    pub entrances: Vec<Entrance>,
    pub exits: Vec<Exit>,
    pub flags: Vec<Flag>,
    pub pits: Option<Vec<Pit>>,
    pub npc_data: Option<NpcData>,
}

impl Location {
    pub(crate) fn decode(prg: &[u8], id: usize) -> Result<Self> {
        let stored = read_word_le(prg, MAP_DATA_TABLE + 2 * id)?;
        if stored == 0 {
            return Ok(Location {
                id,
                ..Location::default()
            });
        }

        let block = check_bounds(
            "location pointer block",
            stored as usize + MAP_DATA_BANK,
            LOCATION_BANK_START,
            LOCATION_DATA_END,
        )?;
        let pointer = |slot: usize| {
            let address = read_pointer(prg, block + 2 * slot, MAP_DATA_BANK)?;
            check_bounds(
                "location sub-block",
                address,
                LOCATION_BANK_START,
                LOCATION_DATA_END,
            )
        };
        let layout_at = pointer(0)?;
        let graphics_at = pointer(1)?;
        let entrances_at = pointer(2)?;
        let exits_at = pointer(3)?;
        let flags_at = pointer(4)?;

        let (exit_records, exits_end) =
            read_terminated_list(prg, exits_at, 4, Sentinel::HighBit, LOCATION_DATA_END)
                .collect_terminated("exit list")?;
        // The byte ending the exit list doubles as metadata. The shipped image
        // always stores 0xff there, and the entrance count is implied by the
        // gap between the entrance and exit lists, with pits present unless
        // the layout directly follows a ten-byte pointer block. Repacked locations
        // store 0x80 | pits << 6 | entrance count instead.
        let marker = byte(prg, exits_end, "exit list")?;
        let (entrance_count, has_pits) = if marker == ORIGINAL_EXITS_END {
            let span = exits_at.checked_sub(entrances_at).ok_or_else(|| {
                RepackError::decode(
                    "entrance list",
                    format!("location {id:#04x} stores exits before entrances"),
                )
            })?;
            (span / 4, layout_at != block + 10)
        } else if marker & !(EXITS_END | EXITS_END_PITS | EXITS_END_COUNT) != 0 {
            return Err(RepackError::decode(
                "exit list",
                format!("location {id:#04x} has terminator {marker:#04x}"),
            ));
        } else {
            (
                (marker & EXITS_END_COUNT) as usize,
                marker & EXITS_END_PITS != 0,
            )
        };

        let header = slice(prg, layout_at, LAYOUT_HEADER_LEN, "layout")?;
        let width = header[1] as usize + 1;
        let height = header[2] as usize + 1;
        let grid_start = layout_at + LAYOUT_HEADER_LEN;
        if grid_start + width * height > LOCATION_DATA_END {
            return Err(RepackError::decode(
                "layout",
                format!("location {id:#04x} grid of {width}x{height} runs past {LOCATION_DATA_END:#x}"),
            ));
        }
        let screens = slice(prg, grid_start, width * height, "layout")?
            .chunks(width)
            .map(<[u8]>::to_vec)
            .collect();

        let graphics = slice(prg, graphics_at, 7, "graphics")?;
        let entrances = slice(prg, entrances_at, 4 * entrance_count, "entrance list")?
            .chunks(4)
            .map(|r| Entrance {
                y: u16::from_le_bytes([r[0], r[1]]),
                x: u16::from_le_bytes([r[2], r[3]]),
            })
            .collect();

        let (flag_records, _) = read_terminated_list(
            prg,
            flags_at,
            2,
            Sentinel::Record(&[0xff]),
            LOCATION_DATA_END,
        )
        .collect_terminated("flag list")?;

        let pits = if has_pits {
            let (records, _) = read_terminated_list(
                prg,
                pointer(5)?,
                4,
                Sentinel::Record(&[0xff]),
                LOCATION_DATA_END,
            )
            .collect_terminated("pit list")?;
            Some(
                records
                    .into_iter()
                    .map(|r| Pit {
                        from_screen: r[0],
                        to_screen: r[1],
                        to_y: r[2],
                        to_x: r[3],
                    })
                    .collect(),
            )
        } else {
            None
        };

        let mut location = Location {
            id,
            used: true,
            bgm: header[0],
            animation: header[3],
            extended: header[4],
            screens,
            tile_palettes: [graphics[0], graphics[1], graphics[2]],
            tileset: graphics[3],
            tile_effects: graphics[4],
            tile_patterns: [graphics[5], graphics[6]],
            entrances,
            exits: exit_records
                .into_iter()
                .map(|r| Exit {
                    x: r[0],
                    y: r[1],
                    dest: r[2],
                    entrance: r[3],
                })
                .collect(),
            flags: flag_records
                .into_iter()
                .map(|r| Flag {
                    flag: r[0],
                    yx: r[1],
                })
                .collect(),
            pits,
            npc_data: NpcData::decode(prg, id)?,
        };
        location.apply_corrections();
        Ok(location)
    }

    fn apply_corrections(&mut self) {
        for &(location, row, column, value) in LAYOUT_CORRECTIONS {
            if location != self.id {
                continue;
            }
            match self.screens.get_mut(row).and_then(|r| r.get_mut(column)) {
                Some(cell) => *cell = value,
                None => warn!(
                    "location {:#04x}: correction at ({row}, {column}) is outside its {}x{} grid",
                    self.id,
                    self.width(),
                    self.height()
                ),
            }
        }
    }

    pub fn width(&self) -> usize {
        self.screens.first().map_or(0, Vec::len)
    }

    pub fn height(&self) -> usize {
        self.screens.len()
    }

    /// Screen id shown at a grid cell.
    pub fn screen_id(&self, row: usize, column: usize) -> Option<usize> {
        let b = *self.screens.get(row)?.get(column)? as usize;
        Some(if self.extended != 0 { 0x100 | b } else { b })
    }

    fn encode_layout(&self) -> Result<Vec<u8>> {
        let (width, height) = (self.width(), self.height());
        if !(1..=0x100).contains(&width) || !(1..=0x100).contains(&height) {
            return Err(RepackError::encode(
                "layout",
                format!("location {:#04x} has a {width}x{height} grid", self.id),
            ));
        }
        if self.screens.iter().any(|row| row.len() != width) {
            return Err(RepackError::encode(
                "layout",
                format!("location {:#04x} has ragged rows", self.id),
            ));
        }

        let mut out = vec![
            self.bgm,
            (width - 1) as u8,
            (height - 1) as u8,
            self.animation,
            self.extended,
        ];
        for row in &self.screens {
            out.extend_from_slice(row);
        }
        Ok(out)
    }

    fn encode_graphics(&self) -> Vec<u8> {
        let [p0, p1, p2] = self.tile_palettes;
        let [t0, t1] = self.tile_patterns;
        vec![p0, p1, p2, self.tileset, self.tile_effects, t0, t1]
    }

    fn encode_entrances(&self) -> Vec<u8> {
        self.entrances
            .iter()
            .flat_map(|e| {
                let [y0, y1] = e.y.to_le_bytes();
                let [x0, x1] = e.x.to_le_bytes();
                [y0, y1, x0, x1]
            })
            .collect()
    }

    /// Exits followed by a terminator recording the entrance count and
    /// whether a pit list follows.
    fn encode_exits(&self) -> Result<Vec<u8>> {
        if self.entrances.len() > EXITS_END_COUNT as usize {
            return Err(RepackError::encode(
                "entrance list",
                format!(
                    "location {:#04x} has {} entrances, at most {} fit",
                    self.id,
                    self.entrances.len(),
                    EXITS_END_COUNT
                ),
            ));
        }
        if let Some(exit) = self.exits.iter().find(|e| e.x & 0x80 != 0) {
            return Err(RepackError::encode(
                "exit list",
                format!("location {:#04x} has exit at x {:#04x}", self.id, exit.x),
            ));
        }

        let mut out = Vec::with_capacity(4 * self.exits.len() + 1);
        for exit in &self.exits {
            out.extend_from_slice(&[exit.x, exit.y, exit.dest, exit.entrance]);
        }
        let pits = if self.pits.is_some() { EXITS_END_PITS } else { 0 };
        out.push(EXITS_END | pits | self.entrances.len() as u8);
        Ok(out)
    }

    fn encode_flags(&self) -> Vec<u8> {
        let mut out: Vec<u8> = self.flags.iter().flat_map(|f| [f.flag, f.yx]).collect();
        out.push(0xff);
        out
    }

    fn encode_pits(pits: &[Pit]) -> Vec<u8> {
        let mut out: Vec<u8> = pits
            .iter()
            .flat_map(|p| [p.from_screen, p.to_screen, p.to_y, p.to_x])
            .collect();
        out.push(0xff);
        out
    }

    /// Queues this location's sub-blocks, pointer block and sprite setup.
    pub(crate) fn submit<'a>(
        &self,
        locations: &mut Writer<'a>,
        npc_data: &mut Writer<'a>,
    ) -> Result<()> {
        let id = self.id;
        let mut members = vec![
            self.encode_layout()?,
            self.encode_graphics(),
            self.encode_entrances(),
            self.encode_exits()?,
            self.encode_flags(),
        ];
        if let Some(pits) = &self.pits {
            members.push(Self::encode_pits(pits));
        }

        locations.submit_group(&format!("location {id:#04x}"), members, move |addresses, pass| {
            let mut block = Vec::with_capacity(2 * addresses.len());
            for &address in addresses {
                block.extend_from_slice(&encode_pointer(address, MAP_DATA_BANK)?);
            }
            pass.submit(
                &format!("location {id:#04x} pointers"),
                block,
                move |address, pass| pass.write_pointer(MAP_DATA_TABLE + 2 * id, address, MAP_DATA_BANK),
            );
            Ok(())
        });

        match &self.npc_data {
            Some(data) => npc_data.submit(
                &format!("location {id:#04x} npc data"),
                data.encode(),
                move |address, pass| pass.write_pointer(NPC_DATA_TABLE + 2 * id, address, NPC_DATA_BANK),
            ),
            None => npc_data.patch(NPC_DATA_TABLE + 2 * id, vec![0, 0]),
        }
        Ok(())
    }
}

impl Entity for Location {
    const KIND: &'static str = "location";

    fn id(&self) -> usize {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_image, ImageBuilder};

    fn commit(locations: &[&Location], prg: &mut [u8]) {
        let mut location_writer = Writer::new("locations", LOCATION_DATA_START, LOCATION_DATA_END);
        let mut npc_writer = Writer::new("npc data", NPC_DATA_START, NPC_DATA_END);
        for location in locations {
            location.submit(&mut location_writer, &mut npc_writer).unwrap();
        }
        location_writer.finalize().unwrap();
        npc_writer.finalize().unwrap();
        location_writer.commit(prg).unwrap();
        npc_writer.commit(prg).unwrap();
    }

    #[test]
    fn decodes_original_encoding() {
        let image = sample_image();
        let location = Location::decode(image.prg(), 0x00).unwrap();

        assert!(location.used);
        assert_eq!(location.bgm, 0x11);
        assert_eq!(location.animation, 0x02);
        assert_eq!((location.width(), location.height()), (2, 2));
        assert_eq!(location.screens, vec![vec![0x01, 0x02], vec![0x03, 0x04]]);
        assert_eq!(location.tileset, 0x84);
        assert_eq!(location.tile_effects, 0xb4);
        assert_eq!(
            location.entrances,
            vec![
                Entrance { y: 0x10, x: 0x20 },
                Entrance { y: 0x130, x: 0x140 }
            ]
        );
        assert_eq!(
            location.exits,
            vec![Exit {
                x: 0x02,
                y: 0x01,
                dest: 0x05,
                entrance: 0x00
            }]
        );
        assert_eq!(location.flags, vec![Flag { flag: 0x2c, yx: 0x11 }]);
        assert_eq!(location.pits, None);

        let npc_data = location.npc_data.unwrap();
        assert_eq!(npc_data.sprite_palettes, [0x20, 0x21]);
        assert_eq!(npc_data.spawns.len(), 2);
        assert!(npc_data.spawns[0].is_npc());
        assert!(npc_data.spawns[1].is_monster());
    }

    #[test]
    fn pits_follow_from_block_length() {
        let image = sample_image();
        let location = Location::decode(image.prg(), 0x01).unwrap();
        assert_eq!(
            location.pits,
            Some(vec![Pit {
                from_screen: 0x00,
                to_screen: 0x01,
                to_y: 0x40,
                to_x: 0x50
            }])
        );
        assert_eq!(location.entrances.len(), 2);
        assert_eq!(location.npc_data, None);
    }

    #[test]
    fn unused_location_has_zero_pointer() {
        let image = ImageBuilder::new();
        let location = Location::decode(image.prg(), 0x33).unwrap();
        assert!(!location.used);
        assert!(location.screens.is_empty());
    }

    #[test]
    fn corrections_apply_after_decode() {
        let image = sample_image();
        let location = Location::decode(image.prg(), 0x14).unwrap();
        assert_eq!(location.screens, vec![vec![0x01, 0x02], vec![0x80, 0x04]]);
        assert_eq!(location.screen_id(1, 0), Some(0x80));

        let mut extended = location.clone();
        extended.extended = 1;
        assert_eq!(extended.screen_id(0, 1), Some(0x102));
        assert_eq!(extended.screen_id(2, 0), None);
    }

    #[test]
    fn out_of_bounds_pointer_is_inconsistent() {
        let mut image = ImageBuilder::new();
        image.pointer(MAP_DATA_TABLE, 0x1_8000, MAP_DATA_BANK);
        let err = Location::decode(image.prg(), 0).unwrap_err();
        assert!(matches!(err, RepackError::DecodeInconsistency { .. }));
    }

    #[test]
    fn write_back_round_trips_through_pointer_block() {
        let image = sample_image();
        let originals: Vec<Location> = [0x00, 0x01, 0x14]
            .into_iter()
            .map(|id| Location::decode(image.prg(), id).unwrap())
            .collect();

        let mut edited = originals.clone();
        edited[0].entrances.push(Entrance { y: 0x99, x: 0x88 });
        edited[0].pits = Some(Vec::new());
        edited[1].pits = None;
        edited[1].npc_data = Some(NpcData::default());
        edited[2].screens[0][0] = 0x7e;

        let mut prg = image.prg().to_vec();
        prg[LOCATION_DATA_START..LOCATION_DATA_END].fill(0xee);
        commit(&edited.iter().collect::<Vec<_>>(), &mut prg);

        for location in &edited {
            assert_eq!(&Location::decode(&prg, location.id).unwrap(), location);
        }
    }

    #[test]
    fn identical_sub_blocks_are_shared() {
        let image = sample_image();
        let a = Location::decode(image.prg(), 0x00).unwrap();
        let mut b = a.clone();
        b.id = 0x02;

        let mut prg = image.prg().to_vec();
        commit(&[&a, &b], &mut prg);
        assert_eq!(
            read_word_le(&prg, MAP_DATA_TABLE).unwrap(),
            read_word_le(&prg, MAP_DATA_TABLE + 4).unwrap()
        );
        assert_eq!(
            read_word_le(&prg, NPC_DATA_TABLE).unwrap(),
            read_word_le(&prg, NPC_DATA_TABLE + 4).unwrap()
        );
    }

    #[test]
    fn rejects_unencodable_records() {
        let image = sample_image();
        let mut location = Location::decode(image.prg(), 0x00).unwrap();
        location.screens[1].push(0x05);
        assert!(location.encode_layout().is_err());

        location.screens.clear();
        assert!(location.encode_layout().is_err());

        location.entrances = vec![Entrance::default(); 0x20];
        assert!(location.encode_exits().is_err());
    }
}
