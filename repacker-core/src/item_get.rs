use serde::Serialize;

use crate::bytes::{check_bounds, slice};
use crate::condition::{push_condition_list, read_condition_list, Condition, ID_MASK};
use crate::layout::*;
use crate::table::{pointer_base, Entity};
use crate::{RepackError, Result};

const PAYLOADS_START: usize = ITEM_GET_TABLE + 2 * ITEM_GET_COUNT;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ItemGet {
    pub id: usize,
    pub used: bool,
    #[serde(skip)]
    base: usize,
    #[serde(skip)]
    len: usize,
    pub item: u8,
    pub action: u8,
    pub flags: Vec<Condition>,
}

impl ItemGet {
    pub(crate) fn decode(prg: &[u8], id: usize) -> Result<Self> {
        let base = pointer_base(prg, ITEM_GET_TABLE, id, ITEM_GET_BANK)?;
        if base == ITEM_GET_BANK {
            return Ok(ItemGet {
                id,
                ..ItemGet::default()
            });
        }

        let base = check_bounds("item get", base, PAYLOADS_START, TRIGGER_TABLE)?;
        let header = slice(prg, base, 2, "item get")?;
        let (flags, end) = read_condition_list(prg, base + 2, ID_MASK, TRIGGER_TABLE)?;
        Ok(ItemGet {
            id,
            used: true,
            base,
            len: end - base,
            item: header[0],
            action: header[1],
            flags,
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = vec![self.item, self.action];
        push_condition_list(&mut out, &self.flags, ID_MASK)?;
        Ok(out)
    }

    /// Overwrites the original payload, which must keep its length.
    pub(crate) fn write(&self, prg: &mut [u8]) -> Result<()> {
        let encoded = self.encode()?;
        if encoded.len() != self.len {
            return Err(RepackError::FixedSizeChanged {
                kind: Self::KIND,
                id: self.id,
                expected: self.len,
                actual: encoded.len(),
            });
        }
        prg[self.base..self.base + self.len].copy_from_slice(&encoded);
        Ok(())
    }
}

impl Entity for ItemGet {
    const KIND: &'static str = "item get";

    fn id(&self) -> usize {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_image;

    #[test]
    fn decodes_item_and_flags() {
        let image = sample_image();
        let first = ItemGet::decode(image.prg(), 0).unwrap();
        assert_eq!((first.item, first.action), (0x05, 0x01));
        assert_eq!(first.flags, vec![Condition::set(0x45)]);

        let second = ItemGet::decode(image.prg(), 1).unwrap();
        assert_eq!(
            second.flags,
            vec![Condition::set(0x46), Condition::clear(0x47)]
        );
        assert!(!ItemGet::decode(image.prg(), 2).unwrap().used);
    }

    #[test]
    fn writes_in_place_and_rejects_growth() {
        let image = sample_image();
        let mut prg = image.prg().to_vec();
        let mut item_get = ItemGet::decode(&prg, 1).unwrap();
        item_get.item = 0x33;
        item_get.flags[1] = Condition::set(0x48);
        item_get.write(&mut prg).unwrap();
        assert_eq!(ItemGet::decode(&prg, 1).unwrap(), item_get);
        assert_eq!(ItemGet::decode(&prg, 0).unwrap().item, 0x05);

        item_get.flags.push(Condition::set(0x49));
        assert!(matches!(
            item_get.write(&mut prg),
            Err(RepackError::FixedSizeChanged {
                kind: "item get",
                id: 1,
                expected: 6,
                actual: 8
            })
        ));
    }
}
