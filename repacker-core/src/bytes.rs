use std::iter::FusedIterator;

use crate::{RepackError, Result};

/// Reads a little-endian word without any bank adjustment.
pub fn read_word_le(bytes: &[u8], offset: usize) -> Result<u16> {
    let pair = slice(bytes, offset, 2, "pointer")?;
    Ok(u16::from_le_bytes([pair[0], pair[1]]))
}

/// Reads a big-endian word, as used by condition and message words.
pub fn read_word_be(bytes: &[u8], offset: usize) -> Result<u16> {
    let pair = slice(bytes, offset, 2, "word")?;
    Ok(u16::from_be_bytes([pair[0], pair[1]]))
}

pub fn push_word_be(out: &mut Vec<u8>, word: u16) {
    out.extend_from_slice(&word.to_be_bytes());
}

/// Reads the pointer stored at `offset` and adds `bank_offset`, yielding a
/// flat offset into the program region.
pub fn read_pointer(bytes: &[u8], offset: usize, bank_offset: usize) -> Result<usize> {
    Ok(read_word_le(bytes, offset)? as usize + bank_offset)
}

/// Inverse of [`read_pointer`]: the two stored bytes for `address`.
pub fn encode_pointer(address: usize, bank_offset: usize) -> Result<[u8; 2]> {
    let stored = address
        .checked_sub(bank_offset)
        .filter(|stored| *stored <= 0xffff)
        .ok_or_else(|| {
            RepackError::encode(
                "pointer",
                format!("{address:#x} is not addressable from bank {bank_offset:#x}"),
            )
        })?;
    Ok((stored as u16).to_le_bytes())
}

pub fn write_pointer(
    bytes: &mut [u8],
    offset: usize,
    address: usize,
    bank_offset: usize,
) -> Result<()> {
    let encoded = encode_pointer(address, bank_offset)?;
    let len = bytes.len();
    let slot = bytes.get_mut(offset..offset + 2).ok_or_else(|| {
        RepackError::encode("pointer slot", format!("{offset:#x} is beyond {len:#x}"))
    })?;
    slot.copy_from_slice(&encoded);
    Ok(())
}

/// Bounds-checked byte read.
pub fn byte(bytes: &[u8], offset: usize, what: &str) -> Result<u8> {
    bytes.get(offset).copied().ok_or_else(|| {
        RepackError::decode(what, format!("offset {offset:#x} is beyond {:#x}", bytes.len()))
    })
}

/// Bounds-checked slice read.
pub fn slice<'a>(bytes: &'a [u8], offset: usize, len: usize, what: &str) -> Result<&'a [u8]> {
    offset
        .checked_add(len)
        .and_then(|end| bytes.get(offset..end))
        .ok_or_else(|| {
            RepackError::decode(
                what,
                format!("{len} bytes at {offset:#x} run past {:#x}", bytes.len()),
            )
        })
}

/// Fails unless `address` lies in `[start, end)`.
pub fn check_bounds(what: &str, address: usize, start: usize, end: usize) -> Result<usize> {
    if (start..end).contains(&address) {
        Ok(address)
    } else {
        Err(RepackError::decode(
            what,
            format!("pointer {address:#x} outside [{start:#x}, {end:#x})"),
        ))
    }
}

/// Two's complement view of a coordinate offset byte.
pub fn signed_byte(b: u8) -> i8 {
    b as i8
}

/// Mirrors a row of eight pixels.
pub fn reverse_bits(b: u8) -> u8 {
    b.reverse_bits()
}

pub fn pop_count(b: u8) -> u32 {
    b.count_ones()
}

/// How a terminated list marks its end.
#[derive(Clone, Copy, Debug)]
pub enum Sentinel<'s> {
    /// The record begins with these bytes. A single byte only tests the
    /// leading byte, a full-width pattern tests the whole record.
    Record(&'s [u8]),
    /// The leading byte has its high bit set.
    HighBit,
}

impl Sentinel<'_> {
    fn len(&self) -> usize {
        match self {
            Sentinel::Record(pattern) => pattern.len().max(1),
            Sentinel::HighBit => 1,
        }
    }

    fn matches(&self, lead: &[u8]) -> bool {
        match self {
            Sentinel::Record(pattern) => lead.starts_with(pattern),
            Sentinel::HighBit => lead.first().map_or(false, |b| b & 0x80 != 0),
        }
    }
}

/// Lazily walks fixed-width records up to a sentinel.
///
/// The iterator stops at the first record matching the sentinel (which is not
/// yielded) or as soon as the next record would cross `hard_limit`. Once it is
/// exhausted, [`TerminatedList::terminator`] tells the two cases apart.
#[derive(Clone, Debug)]
pub struct TerminatedList<'a> {
    bytes: &'a [u8],
    position: usize,
    width: usize,
    sentinel: Sentinel<'a>,
    limit: usize,
    terminator: Option<usize>,
    done: bool,
}

pub fn read_terminated_list<'a>(
    bytes: &'a [u8],
    start: usize,
    width: usize,
    sentinel: Sentinel<'a>,
    hard_limit: usize,
) -> TerminatedList<'a> {
    TerminatedList {
        bytes,
        position: start,
        width,
        sentinel,
        limit: hard_limit.min(bytes.len()),
        terminator: None,
        done: width == 0,
    }
}

impl<'a> TerminatedList<'a> {
    /// Offset of the sentinel, if the walk ended on one.
    pub fn terminator(&self) -> Option<usize> {
        self.terminator
    }

    /// Drains the list, failing if it ran into the hard limit instead of a
    /// sentinel. Returns the records and the sentinel's offset.
    pub fn collect_terminated(mut self, what: &str) -> Result<(Vec<&'a [u8]>, usize)> {
        let start = self.position;
        let records: Vec<&'a [u8]> = self.by_ref().collect();
        match self.terminator {
            Some(end) => Ok((records, end)),
            None => Err(RepackError::decode(
                what,
                format!(
                    "list at {start:#x} has no terminator before {:#x}",
                    self.limit
                ),
            )),
        }
    }
}

impl<'a> Iterator for TerminatedList<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<&'a [u8]> {
        if self.done {
            return None;
        }

        let lead_end = self.position + self.sentinel.len();
        if lead_end <= self.limit && self.sentinel.matches(&self.bytes[self.position..lead_end]) {
            self.terminator = Some(self.position);
            self.done = true;
            return None;
        }

        if self.position + self.width > self.limit {
            self.done = true;
            return None;
        }

        let record = &self.bytes[self.position..self.position + self.width];
        self.position += self.width;
        Some(record)
    }
}

impl FusedIterator for TerminatedList<'_> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminated_list_stops_at_full_record_sentinel() {
        let bytes = [5, 12, 9, 3, 0xff, 0xff, 7, 7];
        let records: Vec<&[u8]> =
            read_terminated_list(&bytes, 0, 2, Sentinel::Record(&[0xff, 0xff]), bytes.len())
                .collect();
        assert_eq!(records, vec![&[5u8, 12][..], &[9, 3][..]]);
    }

    #[test]
    fn terminated_list_reports_sentinel_offset() {
        let bytes = [1, 2, 3, 4, 0xff];
        let (records, end) = read_terminated_list(&bytes, 0, 4, Sentinel::Record(&[0xff]), 5)
            .collect_terminated("test list")
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(end, 4);
    }

    #[test]
    fn terminated_list_respects_hard_limit() {
        let bytes = [1, 2, 3, 4, 5, 6];
        let mut list = read_terminated_list(&bytes, 0, 4, Sentinel::Record(&[0xff]), 6);
        assert_eq!(list.next(), Some(&bytes[0..4]));
        assert_eq!(list.next(), None);
        assert_eq!(list.terminator(), None);
        assert_eq!(list.next(), None);

        let err = read_terminated_list(&bytes, 0, 4, Sentinel::Record(&[0xff]), 6)
            .collect_terminated("test list")
            .unwrap_err();
        assert!(matches!(err, RepackError::DecodeInconsistency { .. }));
    }

    #[test]
    fn high_bit_sentinel_checks_lead_byte_only() {
        let bytes = [0x10, 0x80, 0x20, 0x30, 0x85];
        let (records, end) = read_terminated_list(&bytes, 0, 4, Sentinel::HighBit, 5)
            .collect_terminated("exits")
            .unwrap();
        assert_eq!(records, vec![&bytes[0..4]]);
        assert_eq!(end, 4);
    }

    #[test]
    fn pointers_apply_bank_offset() {
        let bytes = [0x00, 0x34, 0x12];
        assert_eq!(read_pointer(&bytes, 1, 0xc000).unwrap(), 0xd234);
        assert_eq!(encode_pointer(0xd234, 0xc000).unwrap(), [0x34, 0x12]);
        assert_eq!(read_pointer(&bytes, 1, 0x1_c000).unwrap(), 0x1_d234);
        assert_eq!(encode_pointer(0x1_d234, 0x1_c000).unwrap(), [0x34, 0x12]);
        assert!(encode_pointer(0xbfff, 0xc000).is_err());
        assert!(encode_pointer(0x2_0000, 0x1000).is_err());
        assert!(read_pointer(&bytes, 2, 0).is_err());
    }

    #[test]
    fn write_pointer_stores_low_then_high() {
        let mut bytes = [0u8; 4];
        write_pointer(&mut bytes, 1, 0x1_9abc, 0x1_0000).unwrap();
        assert_eq!(bytes, [0, 0xbc, 0x9a, 0]);
        assert!(write_pointer(&mut bytes, 3, 0x1_9abc, 0x1_0000).is_err());
    }

    #[test]
    fn bit_helpers() {
        assert_eq!(signed_byte(0x7f), 127);
        assert_eq!(signed_byte(0x80), -128);
        assert_eq!(signed_byte(0xfe), -2);
        assert_eq!(reverse_bits(0b1000_0110), 0b0110_0001);
        assert_eq!(pop_count(0b1011_0001), 4);
    }
}
