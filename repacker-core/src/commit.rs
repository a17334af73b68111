use std::collections::hash_map::Entry;
use std::collections::HashMap;

use log::info;
use serde::Serialize;

use crate::layout::*;
use crate::objects::ObjectData;
use crate::rom::{chr_mut, prg_mut, Rom};
use crate::table::Table;
use crate::writer::Writer;
use crate::Result;

/// How full one allocator region ended up.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RegionReport {
    pub name: &'static str,
    pub requests: usize,
    pub used: usize,
    pub capacity: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CommitReport {
    pub regions: Vec<RegionReport>,
}

impl CommitReport {
    fn finish(&mut self, mut writer: Writer<'_>, prg: &mut [u8]) -> Result<()> {
        writer.finalize()?;
        let name = writer.region();
        let requests = writer.placements().len();
        let capacity = writer.end() - writer.start();
        let used = writer.commit(prg)?;
        self.regions.push(RegionReport {
            name,
            requests,
            used,
            capacity,
        });
        Ok(())
    }
}

impl Rom {
    /// Re-serializes every record into the image.
    ///
    /// On failure the image is left partially written; reload from the
    /// original bytes before trying again.
    pub fn commit(&mut self) -> Result<CommitReport> {
        let mut report = CommitReport::default();
        // The shipped object table sits inside the npc data region; it has to
        // be above NPC_DATA_END before that region is repacked.
        relocate_object_table(prg_mut(&mut self.image));

        let mut locations = Writer::new("locations", LOCATION_DATA_START, LOCATION_DATA_END);
        let mut npc_data = Writer::new("npc data", NPC_DATA_START, NPC_DATA_END);
        for location in self.locations.iter().filter(|l| l.used) {
            location.submit(&mut locations, &mut npc_data)?;
        }
        submit_objects(&self.objects, &mut npc_data);
        report.finish(locations, prg_mut(&mut self.image))?;
        report.finish(npc_data, prg_mut(&mut self.image))?;

        let mut triggers = Writer::new("triggers", TRIGGER_START, TRIGGER_END);
        for trigger in self.triggers.iter().filter(|t| t.used) {
            trigger.submit(&mut triggers)?;
        }
        let mut spawns = Writer::new("npc spawns", NPC_SPAWN_START, NPC_SPAWN_END);
        let mut dialogs = Writer::new("npc dialog", NPC_DIALOG_START, NPC_DIALOG_END);
        for npc in self.npcs.iter().filter(|n| n.used) {
            npc.submit(&mut spawns, &mut dialogs)?;
        }
        // Two zero slots read back as an unused npc.
        for npc in self.npcs.iter_mut() {
            npc.used &= npc.spawn_conditions.is_some() || npc.dialog.is_some();
        }
        let mut messages = Writer::new("messages", self.messages.bodies_start(), MESSAGES_END);
        self.messages.submit(&mut messages)?;
        for writer in [triggers, spawns, dialogs, messages] {
            report.finish(writer, prg_mut(&mut self.image))?;
        }

        let prg = prg_mut(&mut self.image);
        for screen in &self.screens {
            screen.write(prg);
        }
        for palette in &self.palettes {
            palette.write(prg);
        }
        for tileset in &self.tilesets {
            tileset.write(prg)?;
        }
        for effects in &self.tile_effects {
            effects.write(prg)?;
        }
        for npc in &self.npcs {
            npc.write_data(prg);
        }
        for item_get in self.item_gets.iter().filter(|g| g.used) {
            item_get.write(prg)?;
        }
        let chr = chr_mut(&mut self.image);
        for pattern in &self.patterns {
            pattern.write(chr);
        }

        info!(
            "committed {} bytes across {} regions",
            report.regions.iter().map(|r| r.used).sum::<usize>(),
            report.regions.len()
        );
        Ok(report)
    }
}

/// Moves the object pointer table to the top of the npc data bank and points
/// the code that indexes it at the new page. Already relocated images are
/// left alone.
fn relocate_object_table(prg: &mut [u8]) {
    if prg[OBJECT_TABLE_REFS[0]] == OBJECT_TABLE_RELOCATED_PAGE {
        return;
    }
    prg.copy_within(
        OBJECT_TABLE..OBJECT_TABLE + 2 * OBJECT_COUNT,
        OBJECT_TABLE_RELOCATED,
    );
    for operand in OBJECT_TABLE_REFS {
        prg[operand] = OBJECT_TABLE_RELOCATED_PAGE;
    }
}

/// Submits each distinct object encoding once, in first-seen order, with a
/// continuation pointing every object that shares it at the same bytes.
fn submit_objects(objects: &Table<ObjectData>, writer: &mut Writer<'_>) {
    let mut encodings: Vec<(Vec<u8>, Vec<usize>)> = Vec::new();
    let mut index: HashMap<Vec<u8>, usize> = HashMap::new();
    for object in objects.iter().filter(|o| o.used) {
        match index.entry(object.encode()) {
            Entry::Occupied(entry) => encodings[*entry.get()].1.push(object.id),
            Entry::Vacant(entry) => {
                encodings.push((entry.key().clone(), vec![object.id]));
                entry.insert(encodings.len() - 1);
            }
        }
    }

    for (bytes, ids) in encodings {
        writer.submit(&format!("object {:#04x}", ids[0]), bytes, move |address, pass| {
            for id in ids {
                pass.write_pointer(OBJECT_TABLE_RELOCATED + 2 * id, address, OBJECT_BANK)?;
            }
            Ok(())
        });
    }
}
