//! The data and field hash tables: fixed-size arrays of `hash_item_t`
//! buckets (`head_hash_offset`/`tail_hash_offset`) that root the hash
//! chains for Data and Field objects respectively.

use deku::prelude::*;

/// Default bucket count for the data hash table
/// (`DEFAULT_DATA_HASH_TABLE_SIZE / sizeof(hash_item_t)`).
pub const DEFAULT_DATA_HASH_TABLE_BUCKETS: u64 = 2047;

/// Default bucket count for the field hash table
/// (`DEFAULT_FIELD_HASH_TABLE_SIZE / sizeof(hash_item_t)`).
pub const DEFAULT_FIELD_HASH_TABLE_BUCKETS: u64 = 333;

pub const HASH_ITEM_SIZE: u64 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, DekuRead, DekuWrite)]
#[deku(endian = "little")]
pub struct HashItem {
    pub head_hash_offset: u64,
    pub tail_hash_offset: u64,
}

impl HashItem {
    pub const EMPTY: HashItem = HashItem {
        head_hash_offset: 0,
        tail_hash_offset: 0,
    };

    pub fn is_empty(&self) -> bool {
        self.head_hash_offset == 0 && self.tail_hash_offset == 0
    }
}

/// A decoded data/field hash table: its arena offset and its buckets, in
/// bucket-index order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashTable {
    pub offset: u64,
    pub buckets: Vec<HashItem>,
}

impl HashTable {
    pub fn bucket_count(&self) -> u64 {
        self.buckets.len() as u64
    }

    pub fn bucket_for_hash(&self, hash: u64) -> u64 {
        hash % self.bucket_count()
    }
}
