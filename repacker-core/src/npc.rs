use serde::Serialize;

use crate::bytes::{byte, check_bounds, read_word_be, read_word_le, signed_byte, slice};
use crate::condition::{
    push_condition_list, read_condition_list, Condition, MessageId, GLOBAL_ID_MASK, ID_MASK, LAST,
    MORE,
};
use crate::layout::*;
use crate::table::Entity;
use crate::writer::Writer;
use crate::{RepackError, Result};

const LOCATIONS_END: u8 = 0xff;

/// The conditions under which an npc appears in one location.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SpawnCondition {
    pub location: u8,
    pub conditions: Vec<Condition>,
}

/// Dialog shown anywhere the npc appears.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct GlobalDialog {
    pub condition: Condition,
    pub message: MessageId,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LocalDialog {
    pub condition: Condition,
    pub message: MessageId,
    pub update: u8,
    /// Flags set once the message has been shown.
    pub flags: Vec<Condition>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LocalDialogs {
    pub location: u8,
    pub dialogs: Vec<LocalDialog>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Dialog {
    pub global: Vec<GlobalDialog>,
    pub local: Vec<LocalDialogs>,
}

impl Dialog {
    fn decode(prg: &[u8], start: usize) -> Result<Self> {
        let mut dialog = Dialog::default();
        let mut offset = start;
        loop {
            let word = read_word_be(prg, offset)?;
            let message = read_word_be(prg, offset + 2)?;
            offset += 4;
            if dialog.global.is_empty() && word == LAST && message == 0 {
                break;
            }
            dialog.global.push(GlobalDialog {
                condition: Condition::from_word(word, GLOBAL_ID_MASK),
                message: MessageId::from_word(message),
            });
            if word & LAST != 0 {
                break;
            }
            if offset >= NPC_DIALOG_END {
                return Err(RepackError::decode(
                    "global dialog",
                    format!("list at {start:#x} is not terminated"),
                ));
            }
        }

        loop {
            let location = byte(prg, offset, "local dialog")?;
            offset += 1;
            if location == LOCATIONS_END {
                break;
            }
            let mut dialogs = Vec::new();
            loop {
                if offset + 5 > NPC_DIALOG_END {
                    return Err(RepackError::decode(
                        "local dialog",
                        format!("list at {start:#x} is not terminated"),
                    ));
                }
                let word = read_word_be(prg, offset)?;
                let message = MessageId::read(prg, offset + 2)?;
                let update = byte(prg, offset + 4, "local dialog")?;
                offset += 5;

                let mut flags = Vec::new();
                let mut more = word & MORE != 0;
                while more {
                    let flag = read_word_be(prg, offset)?;
                    offset += 2;
                    flags.push(Condition::from_word(flag, ID_MASK));
                    more = flag & MORE != 0;
                }

                dialogs.push(LocalDialog {
                    condition: Condition::from_word(word, ID_MASK),
                    message,
                    update,
                    flags,
                });
                if word & LAST != 0 {
                    break;
                }
            }
            dialog.local.push(LocalDialogs { location, dialogs });
        }
        Ok(dialog)
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        if self.global.is_empty() {
            out.extend_from_slice(&[0x80, 0x00, 0x00, 0x00]);
        }
        for (i, global) in self.global.iter().enumerate() {
            let last = if i + 1 == self.global.len() { LAST } else { 0 };
            let word = global.condition.to_word(GLOBAL_ID_MASK)? | last;
            let message = global.message.to_word()?;
            if i == 0 && word == LAST && message == 0 {
                return Err(RepackError::encode(
                    "global dialog",
                    "a lone flag 0 record reads back as an empty list",
                ));
            }
            out.extend_from_slice(&word.to_be_bytes());
            out.extend_from_slice(&message.to_be_bytes());
        }

        for local in &self.local {
            if local.location == LOCATIONS_END || local.dialogs.is_empty() {
                return Err(RepackError::encode(
                    "local dialog",
                    format!("location {:#04x} with {} records", local.location, local.dialogs.len()),
                ));
            }
            out.push(local.location);
            for (i, dialog) in local.dialogs.iter().enumerate() {
                let mut word = dialog.condition.to_word(ID_MASK)?;
                if i + 1 == local.dialogs.len() {
                    word |= LAST;
                }
                if !dialog.flags.is_empty() {
                    word |= MORE;
                }
                out.extend_from_slice(&word.to_be_bytes());
                dialog.message.push(&mut out)?;
                out.push(dialog.update);
                for (j, flag) in dialog.flags.iter().enumerate() {
                    let more = if j + 1 < dialog.flags.len() { MORE } else { 0 };
                    out.extend_from_slice(&(flag.to_word(ID_MASK)? | more).to_be_bytes());
                }
            }
        }
        out.push(LOCATIONS_END);
        Ok(out)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Npc {
    pub id: usize,
    /// Set when either payload is present. Commit clears it for an npc left
    /// with neither, since both pointer slots are then zero.
    pub used: bool,
    #[serde(skip)]
    base: usize,
    pub data: [u8; 4],
    pub spawn_conditions: Option<Vec<SpawnCondition>>,
    pub dialog: Option<Dialog>,
}

impl Npc {
    pub(crate) fn decode(prg: &[u8], id: usize) -> Result<Self> {
        // Four npcs share each 0x100-byte page, 4 bytes apart from 0x80f0.
        let base = 0x80f0 | (id & 0xfc) << 6 | (id & 3) << 2;
        let mut data = [0; 4];
        data.copy_from_slice(slice(prg, base, 4, "npc data")?);
        let mut npc = Npc {
            id,
            used: false,
            base,
            data,
            spawn_conditions: None,
            dialog: None,
        };
        if UNUSED_NPCS.contains(&id) {
            return Ok(npc);
        }

        let spawns = read_word_le(prg, NPC_SPAWN_TABLE + 2 * id)?;
        if spawns != 0 {
            let start = check_bounds(
                "spawn conditions",
                spawns as usize + NPC_BANK,
                NPC_SPAWN_START,
                NPC_SPAWN_END,
            )?;
            npc.spawn_conditions = Some(decode_spawn_conditions(prg, start)?);
        }

        let dialog = read_word_le(prg, NPC_DIALOG_TABLE + 2 * id)?;
        if dialog != 0 {
            let start = check_bounds(
                "dialog",
                dialog as usize + NPC_BANK,
                NPC_DIALOG_START,
                NPC_DIALOG_END,
            )?;
            npc.dialog = Some(Dialog::decode(prg, start)?);
        }

        npc.used = npc.spawn_conditions.is_some() || npc.dialog.is_some();
        Ok(npc)
    }

    /// Signed adjustment held in the last data byte.
    pub fn offset(&self) -> i8 {
        signed_byte(self.data[3])
    }

    /// Locations with an explicit spawn condition list.
    pub fn spawn_locations(&self) -> impl Iterator<Item = u8> + '_ {
        self.spawn_conditions
            .iter()
            .flatten()
            .map(|spawn| spawn.location)
    }

    pub(crate) fn write_data(&self, prg: &mut [u8]) {
        prg[self.base..self.base + 4].copy_from_slice(&self.data);
    }

    pub(crate) fn submit<'a>(
        &self,
        spawns: &mut Writer<'a>,
        dialogs: &mut Writer<'a>,
    ) -> Result<()> {
        let spawn_slot = NPC_SPAWN_TABLE + 2 * self.id;
        match &self.spawn_conditions {
            Some(conditions) => spawns.submit(
                &format!("npc {:#04x} spawns", self.id),
                encode_spawn_conditions(conditions)?,
                move |address, pass| pass.write_pointer(spawn_slot, address, NPC_BANK),
            ),
            None => spawns.patch(spawn_slot, vec![0, 0]),
        }

        let dialog_slot = NPC_DIALOG_TABLE + 2 * self.id;
        match &self.dialog {
            Some(dialog) => dialogs.submit(
                &format!("npc {:#04x} dialog", self.id),
                dialog.encode()?,
                move |address, pass| pass.write_pointer(dialog_slot, address, NPC_BANK),
            ),
            None => dialogs.patch(dialog_slot, vec![0, 0]),
        }
        Ok(())
    }
}

fn decode_spawn_conditions(prg: &[u8], start: usize) -> Result<Vec<SpawnCondition>> {
    let mut spawns = Vec::new();
    let mut offset = start;
    loop {
        let location = byte(prg, offset, "spawn conditions")?;
        if location == LOCATIONS_END {
            return Ok(spawns);
        }
        let (conditions, next) = read_condition_list(prg, offset + 1, ID_MASK, NPC_SPAWN_END)?;
        spawns.push(SpawnCondition {
            location,
            conditions,
        });
        offset = next;
    }
}

fn encode_spawn_conditions(spawns: &[SpawnCondition]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for spawn in spawns {
        if spawn.location == LOCATIONS_END {
            return Err(RepackError::encode(
                "spawn conditions",
                "location 0xff ends the list",
            ));
        }
        out.push(spawn.location);
        push_condition_list(&mut out, &spawn.conditions, ID_MASK)?;
    }
    out.push(LOCATIONS_END);
    Ok(out)
}

impl Entity for Npc {
    const KIND: &'static str = "npc";

    fn id(&self) -> usize {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_image;

    #[test]
    fn decodes_spawns_and_dialog() {
        let image = sample_image();
        let npc = Npc::decode(image.prg(), 0x10).unwrap();
        assert!(npc.used);
        assert_eq!(npc.data, [0x01, 0x02, 0x03, 0xfe]);
        assert_eq!(npc.offset(), -2);
        assert_eq!(
            npc.spawn_conditions,
            Some(vec![SpawnCondition {
                location: 0x00,
                conditions: vec![Condition::clear(0x21)],
            }])
        );
        assert_eq!(npc.spawn_locations().collect::<Vec<_>>(), vec![0x00]);

        let dialog = npc.dialog.as_ref().unwrap();
        assert_eq!(
            dialog.global,
            vec![GlobalDialog {
                condition: Condition::clear(0x2a),
                message: MessageId::new(0, 2),
            }]
        );
        assert_eq!(dialog.local.len(), 1);
        let records = &dialog.local[0].dialogs;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].condition, Condition::set(0x30));
        assert_eq!(records[0].message, MessageId::new(1, 0));
        assert_eq!(records[0].update, 0x07);
        assert_eq!(
            records[0].flags,
            vec![Condition::set(0x31), Condition::clear(0x32)]
        );
        assert!(records[1].flags.is_empty());
        assert_eq!(records[1].message, MessageId::new(1, 1));
    }

    #[test]
    fn dialog_encoding_matches_original_bytes() {
        let image = sample_image();
        let npc = Npc::decode(image.prg(), 0x10).unwrap();
        let encoded = npc.dialog.unwrap().encode().unwrap();
        assert_eq!(
            encoded,
            image.prg()[NPC_DIALOG_START..NPC_DIALOG_START + encoded.len()]
        );
        assert_eq!(*encoded.last().unwrap(), LOCATIONS_END);
    }

    #[test]
    fn empty_global_dialog_uses_placeholder_record() {
        let dialog = Dialog::default();
        assert_eq!(dialog.encode().unwrap(), vec![0x80, 0x00, 0x00, 0x00, 0xff]);
        assert_eq!(Dialog::decode(&dialog.encode().unwrap(), 0).unwrap(), dialog);

        let ambiguous = Dialog {
            global: vec![GlobalDialog {
                condition: Condition::set(0),
                message: MessageId::default(),
            }],
            local: Vec::new(),
        };
        assert!(ambiguous.encode().is_err());
    }

    #[test]
    fn blacklisted_npc_is_unused() {
        let image = sample_image();
        let npc = Npc::decode(image.prg(), 0x31).unwrap();
        assert!(!npc.used);
        assert_eq!(npc.spawn_conditions, None);
        assert!(!Npc::decode(image.prg(), 0x11).unwrap().used);
    }

    #[test]
    fn submit_round_trips() {
        let image = sample_image();
        let mut npc = Npc::decode(image.prg(), 0x10).unwrap();
        npc.spawn_conditions = Some(vec![
            SpawnCondition {
                location: 0x01,
                conditions: Vec::new(),
            },
            SpawnCondition {
                location: 0x14,
                conditions: vec![Condition::set(0x100), Condition::clear(0x101)],
            },
        ]);
        npc.dialog = None;

        let mut prg = image.prg().to_vec();
        let mut spawns = Writer::new("spawns", NPC_SPAWN_START, NPC_SPAWN_END);
        let mut dialogs = Writer::new("dialog", NPC_DIALOG_START, NPC_DIALOG_END);
        npc.submit(&mut spawns, &mut dialogs).unwrap();
        spawns.finalize().unwrap();
        dialogs.finalize().unwrap();
        spawns.commit(&mut prg).unwrap();
        dialogs.commit(&mut prg).unwrap();

        assert_eq!(read_word_le(&prg, NPC_DIALOG_TABLE + 0x20).unwrap(), 0);
        assert_eq!(Npc::decode(&prg, 0x10).unwrap(), npc);
    }
}
