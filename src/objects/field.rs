//! `field_object_t`: a deduplicated field *name* (everything before the
//! `=` in one or more Data payloads), the head of a list of Data objects
//! sharing that name.

use deku::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, DekuRead, DekuWrite)]
#[deku(endian = "little")]
pub struct FieldObjectHeader {
    pub hash: u64,
    pub next_hash_offset: u64,
    pub head_data_offset: u64,
}

pub const FIELD_OBJECT_HEADER_SIZE: u64 = 24;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldObject {
    pub offset: u64,
    pub hash: u64,
    pub next_hash_offset: u64,
    pub head_data_offset: u64,
    pub payload: Vec<u8>,
}

impl FieldObject {
    pub fn name_eq_ignore_ascii_case(&self, name: &[u8]) -> bool {
        self.payload.eq_ignore_ascii_case(name)
    }
}
