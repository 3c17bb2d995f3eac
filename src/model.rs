//! The in-memory form of a parsed journal: the header plus every decoded
//! object, indexed for O(1) lookup by offset. Entries reference Data
//! objects by offset, which in turn is looked up through `objects`, so
//! nothing here holds a raw pointer into the arena that a later rebuild
//! could invalidate.

use std::collections::BTreeMap;

use crate::header::Header;
use crate::objects::{DataObject, EntryObject, FieldObject, Object, TagObject};
use crate::objects::entry_array::EntryArrayObject;
use crate::tables::HashTable;

/// A fully decoded journal file: header, every arena object keyed by its
/// byte offset, and the two hash tables.
#[derive(Debug, Clone)]
pub struct ParsedJournal {
    pub header: Header,
    pub objects: BTreeMap<u64, Object>,
    pub entry_arrays: BTreeMap<u64, EntryArrayObject>,
    pub data_hash_table: HashTable,
    pub field_hash_table: HashTable,
    /// The total byte length of the source file this was parsed from.
    pub file_size: u64,
}

impl ParsedJournal {
    pub fn data_at(&self, offset: u64) -> Option<&DataObject> {
        match self.objects.get(&offset) {
            Some(Object::Data(d)) => Some(d),
            _ => None,
        }
    }

    pub fn field_at(&self, offset: u64) -> Option<&FieldObject> {
        match self.objects.get(&offset) {
            Some(Object::Field(f)) => Some(f),
            _ => None,
        }
    }

    pub fn entry_at(&self, offset: u64) -> Option<&EntryObject> {
        match self.objects.get(&offset) {
            Some(Object::Entry(e)) => Some(e),
            _ => None,
        }
    }

    pub fn tag_at(&self, offset: u64) -> Option<&TagObject> {
        match self.objects.get(&offset) {
            Some(Object::Tag(t)) => Some(t),
            _ => None,
        }
    }

    /// Every Entry object, in ascending offset order (equivalently, the
    /// order they were appended, since the arena is append-only).
    pub fn entries(&self) -> impl Iterator<Item = &EntryObject> {
        self.objects.values().filter_map(|o| match o {
            Object::Entry(e) => Some(e),
            _ => None,
        })
    }

    pub fn data_objects(&self) -> impl Iterator<Item = &DataObject> {
        self.objects.values().filter_map(|o| match o {
            Object::Data(d) => Some(d),
            _ => None,
        })
    }

    pub fn field_objects(&self) -> impl Iterator<Item = &FieldObject> {
        self.objects.values().filter_map(|o| match o {
            Object::Field(f) => Some(f),
            _ => None,
        })
    }

    pub fn tag_objects(&self) -> impl Iterator<Item = &TagObject> {
        self.objects.values().filter_map(|o| match o {
            Object::Tag(t) => Some(t),
            _ => None,
        })
    }
}
