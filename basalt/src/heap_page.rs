//! The heap page layout and slot management.
//!
//! A heap page is `PAGE_SIZE` bytes on disk: an 8-byte header (slot count
//! and used count, both little-endian i32) followed by the occupied tuples
//! densely packed, zero padded to the page size. Because only occupied
//! tuples are written, slot numbers are not preserved across flush/reload;
//! reloaded tuples take slots `0..num_used`. That is safe here: dirty pages
//! are never evicted, and recovery installs full page images.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{DbError, Result};
use crate::transaction::TransactionId;
use crate::tuple::{HeapRid, Rid, Tuple, TupleDesc};
use crate::PAGE_SIZE;

/// Bytes of page header preceding the tuple area.
pub const PAGE_HEADER_SIZE: usize = 8;

/// In-memory view of one heap page.
#[derive(Debug, Clone)]
pub struct HeapPage {
    desc: TupleDesc,
    slots: Vec<Option<Tuple>>,
    num_used: usize,
    dirty: Option<TransactionId>,
    before_image: Vec<u8>,
    page_no: usize,
}

impl HeapPage {
    /// Number of tuple slots a page of this schema holds.
    pub fn num_slots_for(desc: &TupleDesc) -> usize {
        (PAGE_SIZE - PAGE_HEADER_SIZE) / desc.bytes_per_tuple()
    }

    /// Construct an empty page.
    pub fn new(desc: &TupleDesc, page_no: usize) -> HeapPage {
        let num_slots = Self::num_slots_for(desc);
        let mut page = HeapPage {
            desc: desc.clone(),
            slots: vec![None; num_slots],
            num_used: 0,
            dirty: None,
            before_image: Vec::new(),
            page_no,
        };
        page.set_before_image();
        page
    }

    pub fn page_no(&self) -> usize {
        self.page_no
    }

    pub fn descriptor(&self) -> &TupleDesc {
        &self.desc
    }

    pub fn num_slots(&self) -> usize {
        self.slots.len()
    }

    pub fn num_used(&self) -> usize {
        self.num_used
    }

    pub fn num_empty_slots(&self) -> usize {
        self.slots.len() - self.num_used
    }

    /// Place the tuple in the lowest-indexed empty slot and stamp its rid.
    pub fn insert(&mut self, tuple: &Tuple) -> Result<Rid> {
        for (slot_no, slot) in self.slots.iter_mut().enumerate() {
            if slot.is_none() {
                let rid = Rid::Heap(HeapRid {
                    page_no: self.page_no,
                    slot_no,
                });
                let mut stored = tuple.clone();
                stored.rid = Some(rid);
                *slot = Some(stored);
                self.num_used += 1;
                return Ok(rid);
            }
        }
        Err(DbError::PageFull)
    }

    /// Clear the slot the rid addresses. Sibling slots keep their numbers.
    pub fn delete(&mut self, rid: Rid) -> Result<()> {
        let Rid::Heap(heap_rid) = rid;
        if heap_rid.page_no != self.page_no {
            return Err(DbError::TupleNotFound(format!(
                "rid addresses page {} but this is page {}",
                heap_rid.page_no, self.page_no
            )));
        }
        if heap_rid.slot_no >= self.slots.len() {
            return Err(DbError::TupleNotFound(format!(
                "slot {} does not exist",
                heap_rid.slot_no
            )));
        }
        match self.slots[heap_rid.slot_no].take() {
            Some(_) => {
                self.num_used -= 1;
                Ok(())
            }
            None => Err(DbError::TupleNotFound(format!(
                "slot {} is already empty",
                heap_rid.slot_no
            ))),
        }
    }

    pub fn tuple_at(&self, slot_no: usize) -> Option<&Tuple> {
        self.slots.get(slot_no).and_then(|slot| slot.as_ref())
    }

    /// Occupied tuples in ascending slot order, rids set.
    pub fn tuples(&self) -> impl Iterator<Item = &Tuple> {
        self.slots.iter().filter_map(|slot| slot.as_ref())
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.is_some()
    }

    /// The transaction that dirtied this page, if any.
    pub fn dirtied_by(&self) -> Option<TransactionId> {
        self.dirty
    }

    pub fn set_dirty(&mut self, tid: TransactionId) {
        self.dirty = Some(tid);
    }

    pub fn set_clean(&mut self) {
        self.dirty = None;
    }

    /// Snapshot the current serialization as the page's last clean state.
    /// The WAL commit path reads it back to build update records.
    pub fn set_before_image(&mut self) {
        self.before_image = self.to_bytes();
    }

    /// Decode the stored before-image into a page.
    pub fn before_image(&self) -> Result<HeapPage> {
        HeapPage::from_bytes(&self.desc, self.page_no, &self.before_image)
    }

    /// Serialize to exactly `PAGE_SIZE` bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(PAGE_SIZE);
        buf.put_i32_le(self.slots.len() as i32);
        buf.put_i32_le(self.num_used as i32);
        for tuple in self.tuples() {
            tuple.write_to(&mut buf);
        }
        buf.resize(PAGE_SIZE, 0);
        buf.to_vec()
    }

    /// Parse a page image. The header must agree with the schema-derived
    /// slot capacity and carry a plausible used count.
    pub fn from_bytes(desc: &TupleDesc, page_no: usize, data: &[u8]) -> Result<HeapPage> {
        if data.len() < PAGE_HEADER_SIZE {
            return Err(DbError::MalformedData(
                "page image shorter than its header".to_string(),
            ));
        }
        let mut cursor = data;
        let num_slots = cursor.get_i32_le();
        let num_used = cursor.get_i32_le();

        let expected_slots = Self::num_slots_for(desc);
        if num_slots < 0 || num_slots as usize != expected_slots {
            return Err(DbError::MalformedData(format!(
                "page header claims {} slots, schema allows {}",
                num_slots, expected_slots
            )));
        }
        if num_used < 0 || num_used as usize > expected_slots {
            return Err(DbError::MalformedData(format!(
                "page header claims {} used slots of {}",
                num_used, expected_slots
            )));
        }

        let mut slots = vec![None; expected_slots];
        for (slot_no, slot) in slots.iter_mut().enumerate().take(num_used as usize) {
            let mut tuple = Tuple::read_from(&mut cursor, desc)?;
            tuple.rid = Some(Rid::Heap(HeapRid { page_no, slot_no }));
            *slot = Some(tuple);
        }

        let mut page = HeapPage {
            desc: desc.clone(),
            slots,
            num_used: num_used as usize,
            dirty: None,
            before_image: Vec::new(),
            page_no,
        };
        page.set_before_image();
        Ok(page)
    }
}
