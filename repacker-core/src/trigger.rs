use serde::Serialize;

use crate::bytes::check_bounds;
use crate::condition::{push_condition_list, read_condition_list, Condition, MessageId, ID_MASK};
use crate::layout::*;
use crate::table::{pointer_base, Entity};
use crate::writer::Writer;
use crate::Result;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Trigger {
    pub id: usize,
    pub used: bool,
    pub conditions: Vec<Condition>,
    pub message: MessageId,
    pub flags: Vec<Condition>,
}

impl Trigger {
    fn slot(id: usize) -> usize {
        TRIGGER_TABLE + 2 * (id - FIRST_TRIGGER)
    }

    /// Blacklisted ids keep a pointer to leftover bytes and decode as unused.
    pub(crate) fn decode(prg: &[u8], id: usize) -> Result<Self> {
        let base = pointer_base(prg, TRIGGER_TABLE, id - FIRST_TRIGGER, TRIGGER_BANK)?;
        // A zero pointer lands exactly on the bank offset.
        if base == TRIGGER_BANK || UNUSED_TRIGGERS.contains(&id) {
            return Ok(Trigger {
                id,
                ..Trigger::default()
            });
        }

        let start = check_bounds("trigger", base, TRIGGER_START, TRIGGER_END)?;
        let (conditions, offset) = read_condition_list(prg, start, ID_MASK, TRIGGER_END)?;
        let message = MessageId::read(prg, offset)?;
        let (flags, _) = read_condition_list(prg, offset + 2, ID_MASK, TRIGGER_END)?;
        Ok(Trigger {
            id,
            used: true,
            conditions,
            message,
            flags,
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        push_condition_list(&mut out, &self.conditions, ID_MASK)?;
        self.message.push(&mut out)?;
        push_condition_list(&mut out, &self.flags, ID_MASK)?;
        Ok(out)
    }

    pub(crate) fn submit(&self, writer: &mut Writer<'_>) -> Result<()> {
        let slot = Self::slot(self.id);
        writer.submit(
            &format!("trigger {:#04x}", self.id),
            self.encode()?,
            move |address, pass| pass.write_pointer(slot, address, TRIGGER_BANK),
        );
        Ok(())
    }
}

impl Entity for Trigger {
    const KIND: &'static str = "trigger";

    fn id(&self) -> usize {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytes::read_word_le;
    use crate::testing::sample_image;
    use crate::RepackError;

    #[test]
    fn encodes_conditions_message_and_flags() {
        let trigger = Trigger {
            id: 0x80,
            used: true,
            conditions: vec![Condition::set(5), Condition::clear(12)],
            message: MessageId::new(3, 1),
            flags: Vec::new(),
        };
        assert_eq!(
            trigger.encode().unwrap(),
            vec![0x00, 0x05, 0xa0, 0x0c, 0x00, 0x61, 0x80, 0x00]
        );
    }

    #[test]
    fn lone_flag_zero_cannot_be_written() {
        let image = sample_image();
        let mut trigger = Trigger::decode(image.prg(), 0x80).unwrap();
        trigger.flags = vec![Condition::set(0)];
        assert!(matches!(trigger.encode(), Err(RepackError::Encode { .. })));
        let mut writer = Writer::new("triggers", TRIGGER_START, TRIGGER_END);
        assert!(trigger.submit(&mut writer).is_err());
    }

    #[test]
    fn decodes_sample_and_skips_blacklisted() {
        let image = sample_image();
        let trigger = Trigger::decode(image.prg(), 0x80).unwrap();
        assert!(trigger.used);
        assert_eq!(
            trigger.conditions,
            vec![Condition::set(5), Condition::clear(12)]
        );
        assert_eq!(trigger.message, MessageId::new(3, 1));
        assert_eq!(trigger.flags, vec![Condition::set(0x20)]);
        assert_eq!(trigger.encode().unwrap(), image.prg()[TRIGGER_START..TRIGGER_START + 8]);

        assert!(!Trigger::decode(image.prg(), 0x87).unwrap().used);
        assert!(!Trigger::decode(image.prg(), 0x81).unwrap().used);
    }

    #[test]
    fn submit_patches_slot() {
        let image = sample_image();
        let mut trigger = Trigger::decode(image.prg(), 0x80).unwrap();
        trigger.flags.push(Condition::clear(0x21));

        let mut prg = image.prg().to_vec();
        let mut writer = Writer::new("triggers", TRIGGER_START + 0x10, TRIGGER_END);
        trigger.submit(&mut writer).unwrap();
        writer.finalize().unwrap();
        writer.commit(&mut prg).unwrap();

        assert_eq!(
            read_word_le(&prg, TRIGGER_TABLE).unwrap() as usize + TRIGGER_BANK,
            TRIGGER_START + 0x10
        );
        assert_eq!(Trigger::decode(&prg, 0x80).unwrap(), trigger);
    }
}
