/// Whole-file CRC32 of the only supported image.
pub const EXPECTED_CRC32: u32 = 0x1bd3_9032;

pub const HEADER_LEN: usize = 0x10;
pub const PRG_LEN: usize = 0x4_0000;
pub const CHR_LEN: usize = 0x2_0000;
pub const IMAGE_LEN: usize = HEADER_LEN + PRG_LEN + CHR_LEN;

// Graphics.
pub const PATTERN_LEN: usize = 16;
pub const PATTERN_COUNT: usize = CHR_LEN / PATTERN_LEN;
pub const PALETTE_COUNT: usize = 0x100;
pub const SCREEN_COUNT: usize = 0x103;
pub const SCREEN_ROWS: usize = 15;
pub const SCREEN_COLUMNS: usize = 16;
pub const TILESET_COUNT: usize = 12;
pub const FIRST_TILESET: usize = 0x80;
pub const TILESET_TILES: usize = 0x1_0000;
pub const TILESET_ATTRS: usize = 0x1_3000;
pub const TILESET_ALTERNATES: usize = 0x1_3e00;
pub const ALTERNATE_TILES: usize = 0x20;
pub const TILE_EFFECTS_COUNT: usize = 11;
pub const FIRST_TILE_EFFECTS: usize = 0xb3;

// Locations.
pub const LOCATION_COUNT: usize = 0x100;
pub const MAP_DATA_TABLE: usize = 0x1_4300;
pub const MAP_DATA_BANK: usize = 0xc000;
pub const LOCATION_BANK_START: usize = 0x1_4000;
pub const LOCATION_DATA_START: usize = 0x1_4500;
pub const LOCATION_DATA_END: usize = 0x1_8000;

/// Static (location, row, column, value) fixes for known bad layout cells.
pub const LAYOUT_CORRECTIONS: &[(usize, usize, usize, u8)] = &[
    (0x14, 1, 0, 0x80),
    (0x52, 0, 2, 0x7f),
    (0xcb, 2, 1, 0x80),
];

// Npc data (per-location sprite setup and spawns) and object data.
pub const NPC_DATA_TABLE: usize = 0x1_9201;
pub const NPC_DATA_BANK: usize = 0x1_0000;
pub const NPC_DATA_START: usize = 0x1_9401;
pub const NPC_DATA_END: usize = OBJECT_TABLE_RELOCATED;
pub const NPC_DATA_LIMIT: usize = 0x1_c000;

pub const OBJECT_COUNT: usize = 0x100;
pub const OBJECT_TABLE: usize = 0x1_ac00;
pub const OBJECT_TABLE_RELOCATED: usize = 0x1_be00;
pub const OBJECT_BANK: usize = 0x1_0000;
/// Operand high bytes of the two loads that index the object table.
pub const OBJECT_TABLE_REFS: [usize; 2] = [0x3_c273, 0x3_c278];
pub const OBJECT_TABLE_PAGE: u8 = 0xac;
pub const OBJECT_TABLE_RELOCATED_PAGE: u8 = 0xbe;

// Npcs.
pub const NPC_COUNT: usize = 0xcd;
pub const NPC_SPAWN_TABLE: usize = 0x1_c5e0;
pub const NPC_SPAWN_START: usize = 0x1_c77a;
pub const NPC_SPAWN_END: usize = 0x1_c95d;
pub const NPC_DIALOG_TABLE: usize = 0x1_c95d;
pub const NPC_DIALOG_START: usize = 0x1_caf7;
pub const NPC_DIALOG_END: usize = 0x1_dd66;
pub const NPC_BANK: usize = 0x1_4000;
pub const UNUSED_NPCS: &[usize] = &[
    0x31, 0x3c, 0x6a, 0x73, 0x82, 0x86, 0x87, 0x89, 0x8a, 0x8b, 0x8c, 0xcb, 0xcc,
];

// Item acquisition.
pub const ITEM_GET_COUNT: usize = 0x71;
pub const ITEM_GET_TABLE: usize = 0x1_dd66;
pub const ITEM_GET_BANK: usize = 0x1_4000;

// Triggers.
pub const TRIGGER_COUNT: usize = 0x43;
pub const FIRST_TRIGGER: usize = 0x80;
pub const TRIGGER_TABLE: usize = 0x1_e17a;
pub const TRIGGER_BANK: usize = 0x1_4000;
pub const TRIGGER_START: usize = 0x1_e200;
pub const TRIGGER_END: usize = 0x1_e3c0;
pub const UNUSED_TRIGGERS: &[usize] = &[
    0x87, 0x88, 0x89, 0x8f, 0x93, 0x96, 0x98, 0x9b, 0x9e, 0xb6, 0xb7, 0xbf, 0xc0,
];

// Messages.
pub const MESSAGE_PARTS_TABLE: usize = 0x2_8000;
pub const MESSAGE_PART_COUNT: usize = 0x18;
pub const MESSAGE_BANK: usize = 0x2_0000;
pub const MESSAGES_PER_PART: usize = 0x20;
pub const MESSAGES_END: usize = 0x2_c000;
