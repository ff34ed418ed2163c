//! Bounded table of open files.
//!
//! A handle is the index of the slot holding the file. When every slot is
//! occupied further opens are rejected; an occupied slot is never reused
//! before it is closed. Each slot belongs to the session that opened it and
//! only that session may use or close it.

use thiserror::Error;

use crate::protocol::{FileHandle, OpenMode};
use crate::server::SessionId;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HandleError {
    #[error("handle table full ({capacity} open)")]
    Full { capacity: usize },

    #[error("{0} is not open")]
    Unknown(FileHandle),

    #[error("{0} belongs to another session")]
    NotOwner(FileHandle),

    #[error("{handle} was opened for {opened:?}, not {requested:?}")]
    WrongMode {
        handle: FileHandle,
        opened: OpenMode,
        requested: OpenMode,
    },
}

#[derive(Debug)]
pub struct Slot<R> {
    pub owner: SessionId,
    pub name: String,
    pub mode: OpenMode,
    pub resource: R,
}

#[derive(Debug)]
pub struct HandleTable<R> {
    slots: Vec<Option<Slot<R>>>,
}

impl<R> HandleTable<R> {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Binds `resource` to the lowest free slot, owned by `owner`.
    pub fn insert(
        &mut self,
        owner: SessionId,
        name: impl Into<String>,
        mode: OpenMode,
        resource: R,
    ) -> Result<FileHandle, HandleError> {
        let index = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(HandleError::Full {
                capacity: self.capacity(),
            })?;
        self.slots[index] = Some(Slot {
            owner,
            name: name.into(),
            mode,
            resource,
        });
        Ok(FileHandle::new(index as u32))
    }

    /// Looks up a slot held by `owner` and checks it was opened with `mode`.
    pub fn get_mut(
        &mut self,
        owner: SessionId,
        handle: FileHandle,
        mode: OpenMode,
    ) -> Result<&mut Slot<R>, HandleError> {
        let slot = self
            .slots
            .get_mut(handle.raw() as usize)
            .and_then(Option::as_mut)
            .ok_or(HandleError::Unknown(handle))?;
        if slot.owner != owner {
            return Err(HandleError::NotOwner(handle));
        }
        if slot.mode != mode {
            return Err(HandleError::WrongMode {
                handle,
                opened: slot.mode,
                requested: mode,
            });
        }
        Ok(slot)
    }

    pub fn remove(&mut self, owner: SessionId, handle: FileHandle) -> Result<Slot<R>, HandleError> {
        let index = handle.raw() as usize;
        match self.slots.get(index).and_then(Option::as_ref) {
            None => return Err(HandleError::Unknown(handle)),
            Some(slot) if slot.owner != owner => return Err(HandleError::NotOwner(handle)),
            Some(_) => {}
        }
        self.slots[index].take().ok_or(HandleError::Unknown(handle))
    }

    /// Empties every slot held by `owner`.
    pub fn release(&mut self, owner: SessionId) -> Vec<(FileHandle, Slot<R>)> {
        let mut released = Vec::new();
        for (index, entry) in self.slots.iter_mut().enumerate() {
            if entry.as_ref().is_some_and(|slot| slot.owner == owner) {
                if let Some(slot) = entry.take() {
                    released.push((FileHandle::new(index as u32), slot));
                }
            }
        }
        released
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: SessionId = SessionId::LOCAL;

    #[test]
    fn single_slot_rejects_second_open() {
        let mut table = HandleTable::new(1);
        let first = table.insert(A, "a", OpenMode::Read, 1).unwrap();
        assert_eq!(first.raw(), 0);

        assert_eq!(
            table.insert(A, "b", OpenMode::Write, 2),
            Err(HandleError::Full { capacity: 1 })
        );
        // The first occupant is untouched.
        assert_eq!(table.get_mut(A, first, OpenMode::Read).unwrap().resource, 1);
    }

    #[test]
    fn closed_slot_is_reassigned() {
        let mut table = HandleTable::new(1);
        let h = table.insert(A, "a", OpenMode::Read, ()).unwrap();
        table.remove(A, h).unwrap();
        assert!(table.is_empty());
        assert_eq!(table.insert(A, "b", OpenMode::Write, ()).unwrap(), h);
    }

    #[test]
    fn mode_mismatch_is_rejected() {
        let mut table = HandleTable::new(2);
        let h = table.insert(A, "a", OpenMode::Write, ()).unwrap();
        assert_eq!(
            table.get_mut(A, h, OpenMode::Read).unwrap_err(),
            HandleError::WrongMode {
                handle: h,
                opened: OpenMode::Write,
                requested: OpenMode::Read,
            }
        );
    }

    #[test]
    fn double_remove_and_out_of_range_are_unknown() {
        let mut table = HandleTable::new(2);
        let h = table.insert(A, "a", OpenMode::Read, ()).unwrap();
        table.remove(A, h).unwrap();
        assert_eq!(table.remove(A, h).unwrap_err(), HandleError::Unknown(h));

        let far = FileHandle::new(99);
        assert_eq!(
            table.get_mut(A, far, OpenMode::Read).unwrap_err(),
            HandleError::Unknown(far)
        );
        assert_eq!(table.remove(A, far).unwrap_err(), HandleError::Unknown(far));
    }

    #[test]
    fn lowest_free_slot_wins() {
        let mut table = HandleTable::new(3);
        let a = table.insert(A, "a", OpenMode::Read, ()).unwrap();
        let b = table.insert(A, "b", OpenMode::Read, ()).unwrap();
        table.remove(A, a).unwrap();
        assert_eq!(table.insert(A, "c", OpenMode::Read, ()).unwrap(), a);
        assert_eq!(b.raw(), 1);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn other_sessions_cannot_touch_a_slot() {
        let b = SessionId::new(7);
        let mut table = HandleTable::new(2);
        let h = table.insert(A, "a", OpenMode::Read, 5).unwrap();

        assert_eq!(
            table.get_mut(b, h, OpenMode::Read).unwrap_err(),
            HandleError::NotOwner(h)
        );
        assert_eq!(table.remove(b, h).unwrap_err(), HandleError::NotOwner(h));
        assert_eq!(table.get_mut(A, h, OpenMode::Read).unwrap().resource, 5);
    }

    #[test]
    fn release_frees_only_the_owners_slots() {
        let b = SessionId::new(7);
        let mut table = HandleTable::new(3);
        let a1 = table.insert(A, "a1", OpenMode::Read, ()).unwrap();
        let b1 = table.insert(b, "b1", OpenMode::Write, ()).unwrap();
        let a2 = table.insert(A, "a2", OpenMode::Write, ()).unwrap();

        let released: Vec<FileHandle> = table.release(A).into_iter().map(|(h, _)| h).collect();
        assert_eq!(released, vec![a1, a2]);
        assert_eq!(table.len(), 1);
        assert!(table.get_mut(b, b1, OpenMode::Write).is_ok());
        assert!(table.release(A).is_empty());
    }
}
