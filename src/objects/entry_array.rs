//! `entry_array_object_t`: a fixed-capacity, linked chunk of entry offsets.
//! Both the global per-file array (rooted at `Header::entry_array_offset`)
//! and each Data object's per-field array (rooted at
//! `DataObject::entry_array_offset`) use this same shape.

use deku::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, DekuRead, DekuWrite)]
#[deku(endian = "little")]
pub struct EntryArrayObjectHeader {
    pub next_entry_array_offset: u64,
}

pub const ENTRY_ARRAY_HEADER_SIZE: u64 = 8;
pub const ENTRY_ARRAY_ITEM_SIZE: u64 = 8;

/// First growth step allocates room for 4 items; subsequent growths double
/// (or grow enough to hold the newly-needed index, whichever is larger).
pub const ENTRY_ARRAY_INITIAL_ITEMS: u64 = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryArrayObject {
    pub offset: u64,
    pub next_entry_array_offset: u64,
    pub items: Vec<u64>,
}
