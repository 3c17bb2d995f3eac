//! Decodes a whole journal file into a [`ParsedJournal`]. Synchronous and
//! single-pass: the header is decoded first, then the arena is walked
//! strictly forward from `header_size` to `tail_object_offset`, one object
//! at a time.

use deku::DekuContainerRead;
use std::collections::BTreeMap;

use crate::error::ParseError;
use crate::header::Header;
use crate::model::ParsedJournal;
use crate::objects::common::{ObjectHeader, ObjectType, OBJECT_HEADER_SIZE};
use crate::objects::data::{DataObject, DataObjectHeader, DATA_OBJECT_HEADER_SIZE};
use crate::objects::entry::{EntryItem, EntryObject, EntryObjectHeader, ENTRY_ITEM_SIZE, ENTRY_OBJECT_HEADER_SIZE};
use crate::objects::entry_array::{EntryArrayObject, EntryArrayObjectHeader, ENTRY_ARRAY_HEADER_SIZE, ENTRY_ARRAY_ITEM_SIZE};
use crate::objects::field::{FieldObject, FieldObjectHeader, FIELD_OBJECT_HEADER_SIZE};
use crate::objects::tag::{TagObject, TagObjectHeader, TAG_LENGTH};
use crate::objects::Object;
use crate::tables::{HashItem, HashTable};

fn read_u64_le(bytes: &[u8], offset: usize, field: &'static str, file_size: u64) -> Result<u64, ParseError> {
    bytes
        .get(offset..offset + 8)
        .map(|s| u64::from_le_bytes(s.try_into().unwrap()))
        .ok_or(ParseError::BadOffset {
            field,
            offset: offset as u64,
            size: 8,
            file_size,
        })
}

fn checked_range(bytes: &[u8], offset: u64, len: u64, field: &'static str) -> Result<&[u8], ParseError> {
    let file_size = bytes.len() as u64;
    let end = offset.checked_add(len).ok_or(ParseError::BadOffset {
        field,
        offset,
        size: len,
        file_size,
    })?;
    if offset % 8 != 0 || end > file_size {
        return Err(ParseError::BadOffset {
            field,
            offset,
            size: len,
            file_size,
        });
    }
    Ok(&bytes[offset as usize..end as usize])
}

/// Decode the whole file into its header plus fully-enumerated arena
/// objects.
pub fn parse(bytes: &[u8]) -> Result<ParsedJournal, ParseError> {
    let file_size = bytes.len() as u64;

    let (_, header) = Header::from_bytes((bytes, 0)).map_err(|_| ParseError::BadMagic)?;

    if header.header_size < crate::header::MIN_HEADER_SIZE
        || (header.header_size as usize) > bytes.len()
    {
        return Err(ParseError::TruncatedHeader {
            file_size,
            header_size: header.header_size,
        });
    }

    let mut objects = BTreeMap::new();
    let mut entry_arrays = BTreeMap::new();

    let mut p = header.header_size;
    while header.tail_object_offset != 0 && p <= header.tail_object_offset {
        let obj_header_bytes = checked_range(bytes, p, OBJECT_HEADER_SIZE, "object_header")?;
        let (_, obj_header) = ObjectHeader::from_bytes((obj_header_bytes, 0))
            .map_err(|e| ParseError::Malformed { offset: p, reason: e.to_string() })?;

        let total_size = obj_header.size;
        let whole = checked_range(bytes, p, total_size, "object_body")?;
        let body = &whole[OBJECT_HEADER_SIZE as usize..];

        tracing::trace!(offset = p, ?obj_header.object_type, size = total_size, "decoding object");

        match obj_header.object_type {
            ObjectType::Data => {
                if obj_header.compression().map(|c| c.is_compressed()).unwrap_or(true) {
                    return Err(ParseError::UnsupportedCompression { offset: p });
                }
                let (_, hdr) = DataObjectHeader::from_bytes((body, 0))
                    .map_err(|e| ParseError::Malformed { offset: p, reason: e.to_string() })?;
                let payload = body[DATA_OBJECT_HEADER_SIZE as usize..].to_vec();
                objects.insert(
                    p,
                    Object::Data(DataObject {
                        offset: p,
                        hash: hdr.hash,
                        next_hash_offset: hdr.next_hash_offset,
                        next_field_offset: hdr.next_field_offset,
                        entry_offset: hdr.entry_offset,
                        entry_array_offset: hdr.entry_array_offset,
                        n_entries: hdr.n_entries,
                        payload,
                    }),
                );
            }
            ObjectType::Field => {
                let (_, hdr) = FieldObjectHeader::from_bytes((body, 0))
                    .map_err(|e| ParseError::Malformed { offset: p, reason: e.to_string() })?;
                let payload = body[FIELD_OBJECT_HEADER_SIZE as usize..].to_vec();
                objects.insert(
                    p,
                    Object::Field(FieldObject {
                        offset: p,
                        hash: hdr.hash,
                        next_hash_offset: hdr.next_hash_offset,
                        head_data_offset: hdr.head_data_offset,
                        payload,
                    }),
                );
            }
            ObjectType::Entry => {
                let (_, hdr) = EntryObjectHeader::from_bytes((body, 0))
                    .map_err(|e| ParseError::Malformed { offset: p, reason: e.to_string() })?;
                let item_bytes = &body[ENTRY_OBJECT_HEADER_SIZE as usize..];
                if item_bytes.len() as u64 % ENTRY_ITEM_SIZE != 0 {
                    return Err(ParseError::Malformed {
                        offset: p,
                        reason: "entry item array is not a whole number of items".into(),
                    });
                }
                let mut items = Vec::with_capacity(item_bytes.len() / ENTRY_ITEM_SIZE as usize);
                for chunk in item_bytes.chunks_exact(ENTRY_ITEM_SIZE as usize) {
                    let (_, item) = EntryItem::from_bytes((chunk, 0))
                        .map_err(|e| ParseError::Malformed { offset: p, reason: e.to_string() })?;
                    items.push(item);
                }
                objects.insert(
                    p,
                    Object::Entry(EntryObject {
                        offset: p,
                        seqnum: hdr.seqnum,
                        realtime: hdr.realtime,
                        monotonic: hdr.monotonic,
                        boot_id: hdr.boot_id,
                        xor_hash: hdr.xor_hash,
                        items,
                    }),
                );
            }
            ObjectType::Tag => {
                let (_, hdr) = TagObjectHeader::from_bytes((body, 0))
                    .map_err(|e| ParseError::Malformed { offset: p, reason: e.to_string() })?;
                let mut tag = [0u8; TAG_LENGTH];
                tag.copy_from_slice(&hdr.tag);
                objects.insert(
                    p,
                    Object::Tag(TagObject {
                        offset: p,
                        seqnum: hdr.seqnum,
                        epoch: hdr.epoch,
                        tag,
                    }),
                );
            }
            ObjectType::EntryArray => {
                let (_, hdr) = EntryArrayObjectHeader::from_bytes((body, 0))
                    .map_err(|e| ParseError::Malformed { offset: p, reason: e.to_string() })?;
                let item_bytes = &body[ENTRY_ARRAY_HEADER_SIZE as usize..];
                if item_bytes.len() as u64 % ENTRY_ARRAY_ITEM_SIZE != 0 {
                    return Err(ParseError::Malformed {
                        offset: p,
                        reason: "entry array item list is not a whole number of items".into(),
                    });
                }
                let items = item_bytes
                    .chunks_exact(ENTRY_ARRAY_ITEM_SIZE as usize)
                    .map(|c| u64::from_le_bytes(c.try_into().unwrap()))
                    .collect();
                entry_arrays.insert(
                    p,
                    EntryArrayObject {
                        offset: p,
                        next_entry_array_offset: hdr.next_entry_array_offset,
                        items,
                    },
                );
            }
            ObjectType::DataHashTable | ObjectType::FieldHashTable => {
                // handled separately below via header.{data,field}_hash_table_offset
            }
            ObjectType::Unused => {}
            ObjectType::Unknown(raw) => {
                return Err(ParseError::Malformed {
                    offset: p,
                    reason: format!("unknown object type {raw}"),
                });
            }
        }

        if total_size == 0 {
            return Err(ParseError::Malformed {
                offset: p,
                reason: "zero-size object".into(),
            });
        }
        if p == header.tail_object_offset {
            break;
        }
        p += align8(total_size);
    }

    let data_hash_table = read_hash_table(bytes, header.data_hash_table_offset, header.data_hash_table_size, "data_hash_table")?;
    let field_hash_table = read_hash_table(bytes, header.field_hash_table_offset, header.field_hash_table_size, "field_hash_table")?;

    Ok(ParsedJournal {
        header,
        objects,
        entry_arrays,
        data_hash_table,
        field_hash_table,
        file_size,
    })
}

fn align8(x: u64) -> u64 {
    (x + 7) & !7
}

fn read_hash_table(bytes: &[u8], offset: u64, size: u64, field: &'static str) -> Result<HashTable, ParseError> {
    let whole = checked_range(bytes, offset, size, field)?;
    let body = &whole[OBJECT_HEADER_SIZE as usize..];
    if body.len() % 16 != 0 {
        return Err(ParseError::Malformed {
            offset,
            reason: format!("{field} is not a whole number of buckets"),
        });
    }
    let buckets = body
        .chunks_exact(16)
        .map(|chunk| HashItem {
            head_hash_offset: read_u64_le(chunk, 0, field, bytes.len() as u64).unwrap_or(0),
            tail_hash_offset: read_u64_le(chunk, 8, field, bytes.len() as u64).unwrap_or(0),
        })
        .collect();
    Ok(HashTable { offset, buckets })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_truncated_file() {
        let bytes = vec![0u8; 4];
        assert!(matches!(parse(&bytes), Err(ParseError::BadMagic)));
    }
}
