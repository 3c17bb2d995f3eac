//! The 16-byte object header shared by every arena object
//! (`object_header_t` in the original implementation), and the type/
//! compression tags it carries.

use deku::prelude::*;

pub const OBJECT_HEADER_SIZE: u64 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, DekuRead, DekuWrite)]
#[deku(id_type = "u8")]
pub enum ObjectType {
    #[deku(id = "0")]
    Unused,
    #[deku(id = "1")]
    Data,
    #[deku(id = "2")]
    Field,
    #[deku(id = "3")]
    Entry,
    #[deku(id = "4")]
    DataHashTable,
    #[deku(id = "5")]
    FieldHashTable,
    #[deku(id = "6")]
    EntryArray,
    #[deku(id = "7")]
    Tag,
    #[deku(id_pat = "_")]
    Unknown(u8),
}

/// Only `Data` objects interpret the object-header flags byte; it names the
/// compression applied to that object's payload. Every other object type
/// must have this byte zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataCompression {
    None,
    Xz,
    Lz4,
    Zstd,
}

impl DataCompression {
    pub fn from_flags(flags: u8) -> Option<Self> {
        match flags & 0b111 {
            0 => Some(Self::None),
            0b001 => Some(Self::Xz),
            0b010 => Some(Self::Lz4),
            0b100 => Some(Self::Zstd),
            _ => None,
        }
    }

    pub fn to_flags(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Xz => 0b001,
            Self::Lz4 => 0b010,
            Self::Zstd => 0b100,
        }
    }

    pub fn is_compressed(self) -> bool {
        !matches!(self, Self::None)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, DekuRead, DekuWrite)]
#[deku(endian = "little")]
pub struct ObjectHeader {
    pub object_type: ObjectType,
    pub flags: u8,
    #[deku(pad_bytes_after = "6")]
    pub _reserved: (),
    pub size: u64,
}

impl ObjectHeader {
    /// Bytes available to the payload beyond this 16-byte header.
    pub fn payload_size(&self) -> Option<u64> {
        self.size.checked_sub(OBJECT_HEADER_SIZE)
    }

    pub fn compression(&self) -> Option<DataCompression> {
        DataCompression::from_flags(self.flags)
    }
}
