use serde::Serialize;

use crate::bytes::{byte, check_bounds, pop_count, slice};
use crate::layout::*;
use crate::table::{pointer_base, Entity};
use crate::Result;

pub const SLOT_COUNT: usize = 32;

/// Where some of a stat's bits live: `(slot & mask) >> right_shift`
/// contributes bits starting at `left_shift`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Source {
    pub slot: usize,
    pub mask: u8,
    pub right_shift: u32,
    pub left_shift: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ObjectData {
    pub id: usize,
    pub used: bool,
    pub sound: u8,
    pub slots: [u8; SLOT_COUNT],
}

impl ObjectData {
    /// Decodes object `id` through the pointer table at `table`.
    pub(crate) fn decode(prg: &[u8], table: usize, id: usize) -> Result<Self> {
        let mut object = ObjectData {
            id,
            used: false,
            sound: 0,
            slots: [0; SLOT_COUNT],
        };
        let base = pointer_base(prg, table, id, OBJECT_BANK)?;
        if base == OBJECT_BANK {
            return Ok(object);
        }

        let mut offset = check_bounds("object data", base, NPC_DATA_START, NPC_DATA_LIMIT)?;
        object.used = true;
        object.sound = byte(prg, offset, "object data")?;
        offset += 1;
        // Four mask bytes, each followed by the values of its set bits, MSB
        // first. A clear bit is a zero slot and takes no byte.
        for group in 0..SLOT_COUNT / 8 {
            let mask = byte(prg, offset, "object data")?;
            let values = slice(prg, offset + 1, pop_count(mask) as usize, "object data")?;
            offset += 1 + values.len();

            let mut values = values.iter();
            for bit in 0..8 {
                if mask & (0x80 >> bit) != 0 {
                    if let Some(&value) = values.next() {
                        object.slots[group * 8 + bit] = value;
                    }
                }
            }
        }
        Ok(object)
    }

    /// Re-encodes with a mask bit for every nonzero slot only.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![self.sound];
        for group in self.slots.chunks(8) {
            let mask = group
                .iter()
                .enumerate()
                .filter(|(_, &value)| value != 0)
                .fold(0u8, |mask, (bit, _)| mask | 0x80 >> bit);
            out.push(mask);
            out.extend(group.iter().copied().filter(|&value| value != 0));
        }
        out
    }

    fn read_sources(&self, sources: &[Source]) -> u32 {
        sources.iter().fold(0, |value, source| {
            let bits = ((self.slots[source.slot] & source.mask) >> source.right_shift) as u32;
            value | bits << source.left_shift
        })
    }

    fn write_sources(&mut self, sources: &[Source], value: u32) {
        for source in sources {
            let width = source.mask >> source.right_shift;
            let bits = (value >> source.left_shift) as u8 & width;
            let slot = &mut self.slots[source.slot];
            *slot = *slot & !source.mask | bits << source.right_shift;
        }
    }

    /// Looks a stat up by name.
    pub fn field(&self, name: &str) -> Option<u32> {
        OBJECT_FIELDS
            .iter()
            .find(|(field, _)| *field == name)
            .map(|(_, sources)| self.read_sources(sources))
    }

    pub fn set_field(&mut self, name: &str, value: u32) -> bool {
        match OBJECT_FIELDS.iter().find(|(field, _)| *field == name) {
            Some((_, sources)) => {
                self.write_sources(sources, value);
                true
            }
            None => false,
        }
    }
}

macro_rules! object_fields {
    ($($name:ident, $setter:ident => [$(($slot:expr, $mask:expr, $right:expr, $left:expr)),+ $(,)?];)*) => {
        /// Every named stat with the slots it is assembled from.
        pub const OBJECT_FIELDS: &[(&str, &[Source])] = &[
            $((stringify!($name), &[$(Source {
                slot: $slot,
                mask: $mask,
                right_shift: $right,
                left_shift: $left,
            }),+])),*
        ];

        impl ObjectData {
            $(
                pub fn $name(&self) -> u32 {
                    self.read_sources(&[$(Source {
                        slot: $slot,
                        mask: $mask,
                        right_shift: $right,
                        left_shift: $left,
                    }),+])
                }

                pub fn $setter(&mut self, value: u32) {
                    self.write_sources(&[$(Source {
                        slot: $slot,
                        mask: $mask,
                        right_shift: $right,
                        left_shift: $left,
                    }),+], value)
                }
            )*
        }
    };
}

object_fields! {
    metasprite, set_metasprite => [(0, 0xff, 0, 0)];
    collision_plane, set_collision_plane => [(2, 0xf0, 4, 0)];
    hitbox, set_hitbox => [(6, 0x0f, 0, 0)];
    hp, set_hp => [(8, 0xff, 0, 0), (6, 0x80, 7, 8)];
    atk, set_atk => [(9, 0xff, 0, 0)];
    def, set_def => [(10, 0xff, 0, 0)];
    level, set_level => [(11, 0x1f, 0, 0)];
    poison, set_poison => [(11, 0x80, 7, 0)];
    child, set_child => [(12, 0xff, 0, 0)];
    elements, set_elements => [(13, 0x0f, 0, 0)];
    gold_drop, set_gold_drop => [(13, 0xf0, 4, 0)];
    exp_reward, set_exp_reward => [(14, 0xff, 0, 0), (15, 0x03, 0, 8)];
    action, set_action => [(16, 0xff, 0, 0)];
    replacement, set_replacement => [(17, 0xff, 0, 0)];
    status_effect, set_status_effect => [(19, 0x0f, 0, 0)];
    terrain_susceptibility, set_terrain_susceptibility => [(20, 0x7f, 0, 0)];
    immobile, set_immobile => [(20, 0x80, 7, 0)];
}

impl Entity for ObjectData {
    const KIND: &'static str = "object";

    fn id(&self) -> usize {
        self.id
    }
}
