//! The fixed-position file header (`header_contents_t` in the original
//! implementation): signature, flags, identifiers, and the running
//! counters the rebuilder must recompute from scratch.

use deku::prelude::*;
use flagset::{flags, FlagSet};

use crate::deku_helpers::{reader_id128, writer_id128};

pub const SIGNATURE: [u8; 8] = *b"LPKSHHRH";

/// Every header this crate reads or writes carries at least this many bytes:
/// signature through `tail_entry_monotonic`.
pub const MIN_HEADER_SIZE: u64 = 208;

/// The largest header shape this crate knows about: `MIN_HEADER_SIZE` plus
/// the five extended counters (`n_data` .. `field_hash_chain_depth`).
pub const MAX_HEADER_SIZE: u64 = 256;

flags! {
    pub enum IncompatibleFlag: u32 {
        CompressedXz = 1 << 0,
        CompressedLz4 = 1 << 1,
        KeyedHash = 1 << 2,
        CompressedZstd = 1 << 3,
    }
}

flags! {
    pub enum CompatibleFlag: u32 {
        Sealed = 1 << 0,
    }
}

fn reader_flagset<R: std::io::Read + std::io::Seek, T: flagset::Flags<Type = u32>>(
    reader: &mut deku::reader::Reader<R>,
) -> Result<FlagSet<T>, DekuError> {
    let raw = u32::from_reader_with_ctx(reader, deku::ctx::Endian::Little)?;
    Ok(FlagSet::new_truncated(raw))
}

fn writer_flagset<W: std::io::Write + std::io::Seek, T: flagset::Flags<Type = u32>>(
    writer: &mut deku::writer::Writer<W>,
    flags: &FlagSet<T>,
) -> Result<(), DekuError> {
    flags.bits().to_writer(writer, deku::ctx::Endian::Little)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, DekuRead, DekuWrite)]
#[deku(id_type = "u8")]
pub enum State {
    #[deku(id = "0")]
    Offline,
    #[deku(id = "1")]
    Online,
    #[deku(id = "2")]
    Archived,
}

/// The on-disk file header.
///
/// `header_size` gates the extended counters the same way
/// `JOURNAL_HEADER_CONTAINS` does in the original: a reader must tolerate a
/// shorter header written by an older writer and leave the trailing fields
/// `None`, not zero.
#[derive(Debug, Clone, PartialEq, Eq, DekuRead, DekuWrite)]
#[deku(endian = "little", magic = b"LPKSHHRH")]
pub struct Header {
    #[deku(reader = "reader_flagset(deku::reader)", writer = "writer_flagset(deku::writer, compatible_flags)")]
    pub compatible_flags: FlagSet<CompatibleFlag>,
    #[deku(reader = "reader_flagset(deku::reader)", writer = "writer_flagset(deku::writer, incompatible_flags)")]
    pub incompatible_flags: FlagSet<IncompatibleFlag>,
    pub state: State,
    #[deku(pad_bytes_after = "7")]
    pub _reserved: (),
    #[deku(reader = "reader_id128(deku::reader)", writer = "writer_id128(deku::writer, file_id)")]
    pub file_id: u128,
    #[deku(reader = "reader_id128(deku::reader)", writer = "writer_id128(deku::writer, machine_id)")]
    pub machine_id: u128,
    #[deku(reader = "reader_id128(deku::reader)", writer = "writer_id128(deku::writer, boot_id)")]
    pub boot_id: u128,
    #[deku(reader = "reader_id128(deku::reader)", writer = "writer_id128(deku::writer, seqnum_id)")]
    pub seqnum_id: u128,
    pub header_size: u64,
    pub arena_size: u64,
    pub data_hash_table_offset: u64,
    pub data_hash_table_size: u64,
    pub field_hash_table_offset: u64,
    pub field_hash_table_size: u64,
    pub tail_object_offset: u64,
    pub n_objects: u64,
    pub n_entries: u64,
    pub tail_entry_seqnum: u64,
    pub head_entry_seqnum: u64,
    pub entry_array_offset: u64,
    pub head_entry_realtime: u64,
    pub tail_entry_realtime: u64,
    pub tail_entry_monotonic: u64,

    #[deku(cond = "*header_size >= 216")]
    pub n_data: Option<u64>,
    #[deku(cond = "*header_size >= 224")]
    pub n_fields: Option<u64>,
    #[deku(cond = "*header_size >= 232")]
    pub n_tags: Option<u64>,
    #[deku(cond = "*header_size >= 240")]
    pub n_entry_arrays: Option<u64>,
    #[deku(cond = "*header_size >= 248")]
    pub data_hash_chain_depth: Option<u64>,
    #[deku(cond = "*header_size >= 256")]
    pub field_hash_chain_depth: Option<u64>,
}

impl Header {
    pub fn is_sealed(&self) -> bool {
        self.compatible_flags.contains(CompatibleFlag::Sealed)
    }

    pub fn uses_keyed_hash(&self) -> bool {
        self.incompatible_flags.contains(IncompatibleFlag::KeyedHash)
    }

    pub fn declares_compression(&self) -> bool {
        self.incompatible_flags.contains(IncompatibleFlag::CompressedXz)
            || self.incompatible_flags.contains(IncompatibleFlag::CompressedLz4)
            || self.incompatible_flags.contains(IncompatibleFlag::CompressedZstd)
    }
}
