use crate::bytes::write_pointer;
use crate::layout::*;

pub(crate) struct ImageBuilder {
    image: Vec<u8>,
}

impl ImageBuilder {
    pub fn new() -> Self {
        let mut image = vec![0; IMAGE_LEN];
        image[..4].copy_from_slice(b"NES\x1a");
        for operand in OBJECT_TABLE_REFS {
            image[HEADER_LEN + operand] = OBJECT_TABLE_PAGE;
        }
        ImageBuilder { image }
    }

    pub fn prg(&self) -> &[u8] {
        &self.image[HEADER_LEN..HEADER_LEN + PRG_LEN]
    }

    pub fn chr_mut(&mut self) -> &mut [u8] {
        &mut self.image[HEADER_LEN + PRG_LEN..]
    }

    /// Writes `bytes` at a program-region offset.
    pub fn put(&mut self, address: usize, bytes: &[u8]) -> &mut Self {
        let start = HEADER_LEN + address;
        self.image[start..start + bytes.len()].copy_from_slice(bytes);
        self
    }

    pub fn pointer(&mut self, slot: usize, address: usize, bank_offset: usize) -> &mut Self {
        let prg = &mut self.image[HEADER_LEN..HEADER_LEN + PRG_LEN];
        write_pointer(prg, slot, address, bank_offset).unwrap();
        self
    }

    pub fn build(&self) -> Vec<u8> {
        self.image.clone()
    }

    /// Lays out a 2x2 location at `at` using the original exit terminator.
    /// Returns the first free address after it.
    pub fn location(&mut self, id: usize, at: usize, pits: bool) -> usize {
        let block_len = if pits { 12 } else { 10 };
        let layout = at + block_len;
        let graphics = layout + 9;
        let entrances = graphics + 7;
        let exits = entrances + 8;
        let flags = exits + 5;
        let pit_list = flags + 3;
        let end = if pits { pit_list + 5 } else { pit_list };

        self.put(layout, &[0x11, 1, 1, 0x02, 0, 0x01, 0x02, 0x03, 0x04])
            .put(graphics, &[0x1a, 0x1b, 0x1c, 0x84, 0xb4, 0x01, 0x02])
            .put(entrances, &[0x10, 0x00, 0x20, 0x00, 0x30, 0x01, 0x40, 0x01])
            .put(exits, &[0x02, 0x01, 0x05, 0x00, 0xff])
            .put(flags, &[0x2c, 0x11, 0xff]);
        if pits {
            self.put(pit_list, &[0x00, 0x01, 0x40, 0x50, 0xff]);
        }

        let mut slots = vec![layout, graphics, entrances, exits, flags];
        if pits {
            slots.push(pit_list);
        }
        for (i, address) in slots.into_iter().enumerate() {
            self.pointer(at + 2 * i, address, MAP_DATA_BANK);
        }
        self.pointer(MAP_DATA_TABLE + 2 * id, at, MAP_DATA_BANK);
        end
    }

    /// Sprite setup spawning npc 0x10 and monster 0x40.
    pub fn npc_data(&mut self, id: usize, at: usize) -> usize {
        let bytes = [
            0x00, 0x20, 0x21, 0x30, 0x31, //
            0x05, 0x06, 0x01, 0x10, //
            0x07, 0x08, 0x00, 0x40, //
            0xff,
        ];
        self.put(at, &bytes);
        self.pointer(NPC_DATA_TABLE + 2 * id, at, NPC_DATA_BANK);
        at + bytes.len()
    }
}

pub(crate) const OBJECT_DATA: usize = OBJECT_TABLE + 2 * OBJECT_COUNT;
pub(crate) const SAMPLE_OBJECT: [u8; 10] = [
    0x2a, // sound
    0b1000_0010,
    0x33,
    0x80, // slots 0 and 6
    0b1110_0000,
    0x40,
    0x05,
    0x06, // slots 8 to 10
    0x00,
    0x00,
];

/// An image exercising every variable-length table kind.
pub(crate) fn sample_image() -> ImageBuilder {
    let mut builder = ImageBuilder::new();

    let next = builder.location(0x00, LOCATION_DATA_START, false);
    let next = builder.location(0x01, next, true);
    builder.location(0x14, next, false);
    let next = builder.npc_data(0x00, NPC_DATA_START);
    builder.npc_data(0x14, next);

    // Objects 0x40 and 0x41 share an encoding, 0x42 stores an explicit zero.
    builder
        .put(OBJECT_DATA, &SAMPLE_OBJECT)
        .put(OBJECT_DATA + 10, &[0x00, 0x00, 0b1100_0000, 0x07, 0x00, 0x00, 0x00])
        .pointer(OBJECT_TABLE + 2 * 0x40, OBJECT_DATA, OBJECT_BANK)
        .pointer(OBJECT_TABLE + 2 * 0x41, OBJECT_DATA, OBJECT_BANK)
        .pointer(OBJECT_TABLE + 2 * 0x42, OBJECT_DATA + 10, OBJECT_BANK);

    // Trigger 0x80: conditions [5, !12], message 3:1, flags [0x20].
    // Trigger 0x87 is blacklisted and points at garbage.
    builder
        .put(
            TRIGGER_START,
            &[0x00, 0x05, 0xa0, 0x0c, 0x00, 0x61, 0x80, 0x20],
        )
        .pointer(TRIGGER_TABLE, TRIGGER_START, TRIGGER_BANK)
        .put(TRIGGER_START + 8, &[0x12, 0x34, 0x56])
        .pointer(TRIGGER_TABLE + 2 * 7, TRIGGER_START + 8, TRIGGER_BANK);

    // Npc 0x10 appears in location 0x00 unless flag 0x21 is set.
    builder
        .put(0x80f0 | (0x10 & 0xfc) << 6, &[0x01, 0x02, 0x03, 0xfe])
        .put(NPC_SPAWN_START, &[0x00, 0xa0, 0x21, 0xff])
        .pointer(NPC_SPAWN_TABLE + 2 * 0x10, NPC_SPAWN_START, NPC_BANK)
        .put(
            NPC_DIALOG_START,
            &[
                // global: flag 0x2a clear -> 0:2
                0xa0, 0x2a, 0x00, 0x02, //
                // location 0x00: flag 0x30 -> 1:0, update 0x07, then flags 0x31, !0x32
                0x00, 0x40, 0x30, 0x00, 0x20, 0x07, 0x40, 0x31, 0x20, 0x32, //
                // last record: flag 0 -> 1:1
                0x80, 0x00, 0x00, 0x21, 0x00, //
                0xff,
            ],
        )
        .pointer(NPC_DIALOG_TABLE + 2 * 0x10, NPC_DIALOG_START, NPC_BANK);
    // Blacklisted npc with a garbage spawn pointer.
    builder.pointer(NPC_SPAWN_TABLE + 2 * 0x31, 0x1_c000, NPC_BANK);

    // Item gets 0 and 1 grant items 0x05 and 0x06.
    let item_gets = ITEM_GET_TABLE + 2 * ITEM_GET_COUNT;
    builder
        .put(item_gets, &[0x05, 0x01, 0x80, 0x45])
        .put(item_gets + 4, &[0x06, 0x02, 0x00, 0x46, 0xa0, 0x47])
        .pointer(ITEM_GET_TABLE, item_gets, ITEM_GET_BANK)
        .pointer(ITEM_GET_TABLE + 2, item_gets + 4, ITEM_GET_BANK);

    // Two message parts: three messages, then two.
    let tables = MESSAGE_PARTS_TABLE + 2 * MESSAGE_PART_COUNT;
    let bodies = tables + 10;
    builder
        .pointer(MESSAGE_PARTS_TABLE, tables, MESSAGE_BANK)
        .pointer(MESSAGE_PARTS_TABLE + 2, tables + 6, MESSAGE_BANK)
        .put(bodies, b"HI\0YO\0HI\0OK\0\0");
    for (i, offset) in [0, 3, 6, 9, 12].into_iter().enumerate() {
        builder.pointer(tables + 2 * i, bodies + offset, MESSAGE_BANK);
    }

    builder
}
