//! `tag_object_t`: a Forward Secure Sealing checkpoint. This crate never
//! produces these and refuses to operate on a file that requires verifying
//! them (see `Header::is_sealed`).

use deku::prelude::*;

pub const TAG_LENGTH: usize = 32;

#[derive(Debug, Clone, DekuRead, DekuWrite)]
#[deku(endian = "little")]
pub struct TagObjectHeader {
    pub seqnum: u64,
    pub epoch: u64,
    #[deku(count = "32")]
    pub tag: Vec<u8>,
}

pub const TAG_OBJECT_HEADER_SIZE: u64 = 16 + 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagObject {
    pub offset: u64,
    pub seqnum: u64,
    pub epoch: u64,
    pub tag: [u8; TAG_LENGTH],
}
