use serde::{Deserialize, Serialize};

use crate::bytes::{push_word_be, read_word_be};
use crate::{RepackError, Result};

// Condition words are big-endian. Local dialog reuses MORE to announce
// follow-up flag words.
pub const LAST: u16 = 0x8000;
pub const MORE: u16 = 0x4000;
pub const NEGATE: u16 = 0x2000;
pub const ID_MASK: u16 = 0x0fff;
pub const GLOBAL_ID_MASK: u16 = 0x03ff;

/// A flag test: "flag `id` is set", or with `negate`, "is clear".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Condition {
    pub id: u16,
    pub negate: bool,
}

impl Condition {
    pub const fn set(id: u16) -> Self {
        Condition { id, negate: false }
    }

    pub const fn clear(id: u16) -> Self {
        Condition { id, negate: true }
    }

    /// Signed logical form: a negated flag is the complement of its id.
    /// "Clear flag 12" is therefore `from_signed(!12)`, i.e. `-13`, not `-12`.
    pub fn from_signed(value: i32) -> Self {
        if value < 0 {
            Condition::clear(!value as u16)
        } else {
            Condition::set(value as u16)
        }
    }

    pub fn to_signed(self) -> i32 {
        if self.negate {
            !(self.id as i32)
        } else {
            self.id as i32
        }
    }

    pub(crate) fn from_word(word: u16, id_mask: u16) -> Self {
        Condition {
            id: word & id_mask,
            negate: word & NEGATE != 0,
        }
    }

    /// The word for this condition, without any list-control bits.
    pub(crate) fn to_word(self, id_mask: u16) -> Result<u16> {
        if self.id & !id_mask != 0 {
            return Err(RepackError::encode(
                "condition",
                format!("flag {:#x} exceeds {:#x}", self.id, id_mask),
            ));
        }
        Ok(self.id | if self.negate { NEGATE } else { 0 })
    }
}

/// Reads condition words up to and including the one with the last bit.
///
/// A list consisting only of the bare word `0x8000` is empty. Returns the
/// conditions and the offset just past the list.
pub(crate) fn read_condition_list(
    bytes: &[u8],
    start: usize,
    id_mask: u16,
    limit: usize,
) -> Result<(Vec<Condition>, usize)> {
    let mut conditions = Vec::new();
    let mut offset = start;
    loop {
        if offset + 2 > limit {
            return Err(RepackError::decode(
                "condition list",
                format!("list at {start:#x} is not terminated before {limit:#x}"),
            ));
        }
        let word = read_word_be(bytes, offset)?;
        offset += 2;
        if word == LAST && conditions.is_empty() {
            return Ok((conditions, offset));
        }
        conditions.push(Condition::from_word(word, id_mask));
        if word & LAST != 0 {
            return Ok((conditions, offset));
        }
    }
}

pub(crate) fn push_condition_list(
    out: &mut Vec<u8>,
    conditions: &[Condition],
    id_mask: u16,
) -> Result<()> {
    if conditions.is_empty() {
        push_word_be(out, LAST);
        return Ok(());
    }
    // A lone "flag 0 set" would be the bare LAST word, which reads back empty.
    if conditions == [Condition::set(0)] {
        return Err(RepackError::encode(
            "condition list",
            "a single set flag 0 is indistinguishable from an empty list",
        ));
    }
    for (i, condition) in conditions.iter().enumerate() {
        let last = if i + 1 == conditions.len() { LAST } else { 0 };
        push_word_be(out, condition.to_word(id_mask)? | last);
    }
    Ok(())
}

/// Reference to a message: `action:5 | part:6 | index:5`, big-endian.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId {
    pub action: u8,
    pub part: u8,
    pub index: u8,
}

impl MessageId {
    pub fn new(part: u8, index: u8) -> Self {
        MessageId {
            action: 0,
            part,
            index,
        }
    }

    pub fn from_word(word: u16) -> Self {
        MessageId {
            action: (word >> 11) as u8,
            part: ((word >> 5) & 0x3f) as u8,
            index: (word & 0x1f) as u8,
        }
    }

    pub fn to_word(self) -> Result<u16> {
        if self.action > 0x1f || self.part > 0x3f || self.index > 0x1f {
            return Err(RepackError::encode(
                "message reference",
                format!(
                    "action {:#x}, part {:#x}, index {:#x} do not fit 5/6/5 bits",
                    self.action, self.part, self.index
                ),
            ));
        }
        Ok((self.action as u16) << 11 | (self.part as u16) << 5 | self.index as u16)
    }

    pub(crate) fn read(bytes: &[u8], offset: usize) -> Result<Self> {
        Ok(MessageId::from_word(read_word_be(bytes, offset)?))
    }

    pub(crate) fn push(self, out: &mut Vec<u8>) -> Result<()> {
        push_word_be(out, self.to_word()?);
        Ok(())
    }
}
