use std::ops::Index;

use serde::Serialize;

use crate::bytes::read_pointer;
use crate::{RepackError, Result};

/// Capability shared by every decoded record kind.
pub trait Entity {
    /// Human readable kind, used in lookup errors.
    const KIND: &'static str;

    fn id(&self) -> usize;
}

/// Base address of a direct-indexed record.
pub fn direct_base(table_start: usize, id: usize, record_size: usize) -> usize {
    table_start + id * record_size
}

/// Base address of a pointer-indirected record.
pub fn pointer_base(prg: &[u8], table: usize, index: usize, bank_offset: usize) -> Result<usize> {
    read_pointer(prg, table + 2 * index, bank_offset)
}

/// An arena column: every record of one kind, addressed by id.
///
/// Ids do not always start at zero (tilesets are numbered `0x80, 0x84, ...`),
/// so the table remembers the first id and the stride between ids.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Table<T> {
    #[serde(skip)]
    first: usize,
    #[serde(skip)]
    stride: usize,
    entries: Vec<T>,
}

impl<T: Entity> Table<T> {
    pub fn new(first: usize, stride: usize, entries: Vec<T>) -> Self {
        debug_assert!(stride > 0);
        debug_assert!(entries
            .iter()
            .enumerate()
            .all(|(i, e)| e.id() == first + i * stride));
        Table {
            first,
            stride,
            entries,
        }
    }

    /// Decodes `count` records with ids `first, first + stride, ...`.
    pub fn decode(
        first: usize,
        stride: usize,
        count: usize,
        mut decode: impl FnMut(usize) -> Result<T>,
    ) -> Result<Self> {
        let entries = (0..count)
            .map(|i| decode(first + i * stride))
            .collect::<Result<Vec<T>>>()?;
        Ok(Table::new(first, stride, entries))
    }

    fn position(&self, id: usize) -> Option<usize> {
        let offset = id.checked_sub(self.first)?;
        if offset % self.stride != 0 {
            return None;
        }
        let index = offset / self.stride;
        (index < self.entries.len()).then_some(index)
    }

    pub fn get(&self, id: usize) -> Result<&T> {
        self.position(id)
            .map(|i| &self.entries[i])
            .ok_or(RepackError::MissingLookup { kind: T::KIND, id })
    }

    pub fn get_mut(&mut self, id: usize) -> Result<&mut T> {
        match self.position(id) {
            Some(i) => Ok(&mut self.entries[i]),
            None => Err(RepackError::MissingLookup { kind: T::KIND, id }),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.entries.iter_mut()
    }
}

impl<T: Entity> Index<usize> for Table<T> {
    type Output = T;

    fn index(&self, id: usize) -> &T {
        match self.position(id) {
            Some(i) => &self.entries[i],
            None => panic!("no {} with id {id:#x}", T::KIND),
        }
    }
}

impl<'t, T> IntoIterator for &'t Table<T> {
    type Item = &'t T;
    type IntoIter = std::slice::Iter<'t, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
