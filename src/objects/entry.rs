//! `entry_object_t`: one log entry, referencing the Data objects that make
//! up its fields via a trailing array of `(object_offset, hash)` pairs.

use deku::prelude::*;

use crate::deku_helpers::{reader_id128, reader_realtime, writer_id128, writer_realtime};

#[derive(Debug, Clone, Copy, PartialEq, Eq, DekuRead, DekuWrite)]
#[deku(endian = "little")]
pub struct EntryItem {
    pub object_offset: u64,
    pub hash: u64,
}

pub const ENTRY_ITEM_SIZE: u64 = 16;

/// The fixed-size portion of an Entry object, immediately after the
/// 16-byte object header. A variable-length run of [`EntryItem`] follows.
#[derive(Debug, Clone, PartialEq, Eq, DekuRead, DekuWrite)]
#[deku(endian = "little")]
pub struct EntryObjectHeader {
    pub seqnum: u64,
    #[deku(reader = "reader_realtime(deku::reader)", writer = "writer_realtime(deku::writer, realtime)")]
    pub realtime: jiff::Timestamp,
    pub monotonic: u64,
    #[deku(reader = "reader_id128(deku::reader)", writer = "writer_id128(deku::writer, boot_id)")]
    pub boot_id: u128,
    pub xor_hash: u64,
}

pub const ENTRY_OBJECT_HEADER_SIZE: u64 = 48;

#[derive(Debug, Clone, PartialEq)]
pub struct EntryObject {
    pub offset: u64,
    pub seqnum: u64,
    pub realtime: jiff::Timestamp,
    pub monotonic: u64,
    pub boot_id: u128,
    pub xor_hash: u64,
    pub items: Vec<EntryItem>,
}

impl EntryObject {
    /// True if any item in this entry references a Data object with the
    /// given content hash (the "doomed set" test used to decide whether an
    /// entry carries a field/value pair a caller asked to remove).
    pub fn has_item_hash(&self, hash: u64) -> bool {
        self.items.iter().any(|item| item.hash == hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn has_item_hash_finds_matching_item() {
        let entry = EntryObject {
            offset: 0,
            seqnum: 1,
            realtime: jiff::Timestamp::new(0, 0).unwrap(),
            monotonic: 0,
            boot_id: 0,
            xor_hash: 0,
            items: vec![
                EntryItem { object_offset: 64, hash: 0xaa },
                EntryItem { object_offset: 128, hash: 0xbb },
            ],
        };
        assert!(entry.has_item_hash(0xbb));
        assert!(!entry.has_item_hash(0xcc));
    }
}
