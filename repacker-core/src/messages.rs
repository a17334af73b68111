use serde::Serialize;

use crate::bytes::{check_bounds, read_word_le};
use crate::condition::MessageId;
use crate::layout::*;
use crate::table::{Entity, Table};
use crate::writer::Writer;
use crate::{RepackError, Result};

const TABLES_START: usize = MESSAGE_PARTS_TABLE + 2 * MESSAGE_PART_COUNT;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MessagePart {
    pub id: usize,
    #[serde(skip)]
    table: Option<usize>,
    /// Bodies without their terminator; `None` for a zero pointer.
    pub messages: Vec<Option<Vec<u8>>>,
}

impl Entity for MessagePart {
    const KIND: &'static str = "message part";

    fn id(&self) -> usize {
        self.id
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Messages {
    pub parts: Table<MessagePart>,
    #[serde(skip)]
    tables_end: usize,
}

impl Messages {
    pub(crate) fn decode(prg: &[u8]) -> Result<Self> {
        let mut tables = Vec::with_capacity(MESSAGE_PART_COUNT);
        for part in 0..MESSAGE_PART_COUNT {
            let stored = read_word_le(prg, MESSAGE_PARTS_TABLE + 2 * part)?;
            tables.push(match stored {
                0 => None,
                _ => Some(check_bounds(
                    "message table",
                    stored as usize + MESSAGE_BANK,
                    TABLES_START,
                    MESSAGES_END,
                )?),
            });
        }

        // Table sizes are only implied by where the next table begins. The
        // highest table runs until the first body, a zero entry or the cap.
        let mut order: Vec<usize> = (0..MESSAGE_PART_COUNT)
            .filter(|&part| tables[part].is_some())
            .collect();
        order.sort_by_key(|&part| tables[part]);

        let mut parts: Vec<MessagePart> = (0..MESSAGE_PART_COUNT)
            .map(|id| MessagePart {
                id,
                table: tables[id],
                messages: Vec::new(),
            })
            .collect();
        let mut first_body = MESSAGES_END;
        let mut tables_end = TABLES_START;

        for &part in &order {
            let Some(table) = tables[part] else { continue };
            let next = tables.iter().flatten().filter(|&&t| t > table).min().copied();
            let mut messages = Vec::new();
            for index in 0..MESSAGES_PER_PART {
                let slot = table + 2 * index;
                match next {
                    Some(next) if slot >= next => break,
                    None if slot >= first_body => break,
                    _ => {}
                }
                let stored = read_word_le(prg, slot)?;
                if stored == 0 {
                    if next.is_none() {
                        break;
                    }
                    messages.push(None);
                    continue;
                }
                let body = check_bounds(
                    "message",
                    stored as usize + MESSAGE_BANK,
                    TABLES_START,
                    MESSAGES_END,
                )?;
                first_body = first_body.min(body);
                messages.push(Some(read_body(prg, body)?));
            }
            tables_end = tables_end.max(table + 2 * messages.len());
            parts[part].messages = messages;
        }

        Ok(Messages {
            parts: Table::new(0, 1, parts),
            tables_end,
        })
    }

    /// First address available to repacked bodies.
    pub fn bodies_start(&self) -> usize {
        self.tables_end
    }

    pub fn get(&self, id: MessageId) -> Result<&[u8]> {
        self.parts
            .get(id.part as usize)?
            .messages
            .get(id.index as usize)
            .and_then(Option::as_deref)
            .ok_or(RepackError::MissingLookup {
                kind: "message",
                id: (id.part as usize) << 5 | id.index as usize,
            })
    }

    /// Replaces the body of an existing message.
    pub fn set(&mut self, id: MessageId, body: Vec<u8>) -> Result<()> {
        let slot = self
            .parts
            .get_mut(id.part as usize)?
            .messages
            .get_mut(id.index as usize)
            .ok_or(RepackError::MissingLookup {
                kind: "message",
                id: (id.part as usize) << 5 | id.index as usize,
            })?;
        *slot = Some(body);
        Ok(())
    }

    pub(crate) fn submit(&self, writer: &mut Writer<'_>) -> Result<()> {
        // Pointer tables stay put; only bodies go through the writer.
        for part in &self.parts {
            let Some(table) = part.table else { continue };
            for (index, message) in part.messages.iter().enumerate() {
                let slot = table + 2 * index;
                let Some(body) = message else {
                    writer.patch(slot, vec![0, 0]);
                    continue;
                };
                if body.contains(&0) {
                    return Err(RepackError::encode(
                        "message",
                        format!("{:#04x}:{index:#04x} contains a terminator", part.id),
                    ));
                }
                let mut bytes = body.clone();
                bytes.push(0);
                writer.submit(
                    &format!("message {:#04x}:{index:#04x}", part.id),
                    bytes,
                    move |address, pass| pass.write_pointer(slot, address, MESSAGE_BANK),
                );
            }
        }
        Ok(())
    }
}

fn read_body(prg: &[u8], start: usize) -> Result<Vec<u8>> {
    let tail = prg.get(start..MESSAGES_END).unwrap_or_default();
    match tail.iter().position(|&b| b == 0) {
        Some(len) => Ok(tail[..len].to_vec()),
        None => Err(RepackError::decode(
            "message",
            format!("body at {start:#x} is not terminated before {MESSAGES_END:#x}"),
        )),
    }
}
