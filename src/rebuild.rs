//! Rebuilds a byte-exact arena from a filtered entry set.
//!
//! The arena lives in a growable `Vec<u8>` rather than a memory-mapped
//! file, but every offset/growth/linking rule is the one
//! `output_journal_t` uses: objects are appended strictly forward from the
//! tail, hash tables are walked and spliced in place, and nothing here
//! holds a reference across a growth — every access goes back through
//! `self.arena` by offset.

use crate::error::RebuildError;
use crate::filter::FilteredJournal;
use crate::hashing::hash_data;
use crate::header::{CompatibleFlag, IncompatibleFlag, State, MIN_HEADER_SIZE};
use crate::model::ParsedJournal;
use crate::objects::common::{ObjectType, OBJECT_HEADER_SIZE};
use crate::objects::data::DATA_OBJECT_HEADER_SIZE;
use crate::objects::entry::{ENTRY_ITEM_SIZE, ENTRY_OBJECT_HEADER_SIZE};
use crate::objects::entry_array::{ENTRY_ARRAY_HEADER_SIZE, ENTRY_ARRAY_INITIAL_ITEMS, ENTRY_ARRAY_ITEM_SIZE};
use crate::objects::field::FIELD_OBJECT_HEADER_SIZE;
use crate::tables::{DEFAULT_DATA_HASH_TABLE_BUCKETS, DEFAULT_FIELD_HASH_TABLE_BUCKETS, HASH_ITEM_SIZE};

const PAGE_SIZE: u64 = 4096;
const FILE_SIZE_INCREASE: u64 = 8 * 1024 * 1024;

fn page_align(x: u64) -> u64 {
    (x + PAGE_SIZE - 1) & !(PAGE_SIZE - 1)
}

fn align8(x: u64) -> u64 {
    (x + 7) & !7
}

fn div_round_up(a: u64, b: u64) -> u64 {
    (a + b - 1) / b
}

/// Locate the field name immediately preceding the first `=` in a
/// `field=value` payload by walking backward from `=` over printable ASCII
/// bytes, rather than the original's strip-one-byte-and-retry loop against
/// an existing field table.
fn split_field_value(payload: &[u8]) -> Option<&[u8]> {
    let eq = payload.iter().position(|&b| b == b'=')?;
    let mut start = eq;
    while start > 0 {
        let c = payload[start - 1];
        if c.is_ascii_graphic() {
            start -= 1;
        } else {
            break;
        }
    }
    if start == eq {
        None
    } else {
        Some(&payload[start..eq])
    }
}

pub struct Rebuilder {
    arena: Vec<u8>,
    header_size: u64,
    tail_object_offset: u64,
    n_objects: u64,

    data_hash_table_offset: u64,
    data_hash_table_size: u64,
    field_hash_table_offset: u64,
    field_hash_table_size: u64,
    data_hash_chain_depth: u64,
    field_hash_chain_depth: u64,
    n_data: u64,
    n_fields: u64,
    n_entry_arrays: u64,

    entry_array_offset: u64,
    n_entries: u64,
    tail_entry_seqnum: u64,
    head_entry_seqnum: u64,
    head_entry_realtime: u64,
    tail_entry_realtime: u64,
    tail_entry_monotonic: u64,

    keyed_hash: bool,
    file_id: u128,
    machine_id: u128,
    boot_id: u128,
    seqnum_id: u128,
}

impl Rebuilder {
    fn new(source: &ParsedJournal) -> Self {
        Rebuilder {
            arena: vec![0u8; MIN_HEADER_SIZE as usize],
            header_size: MIN_HEADER_SIZE,
            tail_object_offset: 0,
            n_objects: 0,
            data_hash_table_offset: 0,
            data_hash_table_size: 0,
            field_hash_table_offset: 0,
            field_hash_table_size: 0,
            data_hash_chain_depth: 0,
            field_hash_chain_depth: 0,
            n_data: 0,
            n_fields: 0,
            n_entry_arrays: 0,
            entry_array_offset: 0,
            n_entries: 0,
            tail_entry_seqnum: 0,
            head_entry_seqnum: 0,
            head_entry_realtime: 0,
            tail_entry_realtime: 0,
            tail_entry_monotonic: 0,
            keyed_hash: source.header.uses_keyed_hash(),
            file_id: source.header.file_id,
            machine_id: source.header.machine_id,
            boot_id: source.header.boot_id,
            seqnum_id: source.header.seqnum_id,
        }
    }

    fn hash(&self, data: &[u8]) -> u64 {
        hash_data(data, self.keyed_hash, self.file_id)
    }

    fn read_u64(&self, offset: u64) -> u64 {
        u64::from_le_bytes(self.arena[offset as usize..offset as usize + 8].try_into().unwrap())
    }

    fn write_u64(&mut self, offset: u64, value: u64) {
        self.arena[offset as usize..offset as usize + 8].copy_from_slice(&value.to_le_bytes());
    }

    fn write_bytes(&mut self, offset: u64, bytes: &[u8]) {
        self.arena[offset as usize..offset as usize + bytes.len()].copy_from_slice(bytes);
    }

    fn read_bytes(&self, offset: u64, len: u64) -> &[u8] {
        &self.arena[offset as usize..(offset + len) as usize]
    }

    fn allocate(&mut self, offset: u64, size: u64) -> Result<(), RebuildError> {
        let old_size = self.arena.len() as u64;
        let mut new_size = page_align(offset + size).max(self.header_size);
        if new_size <= old_size {
            return Ok(());
        }
        new_size = div_round_up(new_size, FILE_SIZE_INCREASE) * FILE_SIZE_INCREASE;
        if new_size > (i64::MAX as u64) {
            return Err(RebuildError::AllocationFailure { requested: new_size });
        }
        self.arena.resize(new_size as usize, 0);
        Ok(())
    }

    fn append_object(&mut self, object_type: ObjectType, size: u64) -> Result<u64, RebuildError> {
        if size < OBJECT_HEADER_SIZE {
            return Err(RebuildError::InternalInvariantBroken(
                "object size smaller than its own header".into(),
            ));
        }
        let mut p = self.tail_object_offset;
        if p == 0 {
            p = self.header_size;
        } else {
            let tail_size = self.read_u64(p + 8);
            p = p
                .checked_add(align8(tail_size))
                .ok_or(RebuildError::OverflowInArithmetic("tail object offset"))?;
        }

        self.allocate(p, size)?;

        let raw_type = match object_type {
            ObjectType::Unused => 0,
            ObjectType::Data => 1,
            ObjectType::Field => 2,
            ObjectType::Entry => 3,
            ObjectType::DataHashTable => 4,
            ObjectType::FieldHashTable => 5,
            ObjectType::EntryArray => 6,
            ObjectType::Tag => 7,
            ObjectType::Unknown(n) => n,
        };
        self.arena[p as usize] = raw_type;
        self.arena[p as usize + 1] = 0;
        self.write_u64(p + 8, size);

        self.tail_object_offset = p;
        self.n_objects += 1;
        Ok(p)
    }

    fn setup_data_hash_table(&mut self) -> Result<(), RebuildError> {
        let bucket_bytes = DEFAULT_DATA_HASH_TABLE_BUCKETS * HASH_ITEM_SIZE;
        let offset = self.append_object(ObjectType::DataHashTable, OBJECT_HEADER_SIZE + bucket_bytes)?;
        self.data_hash_table_offset = offset + OBJECT_HEADER_SIZE;
        self.data_hash_table_size = bucket_bytes;
        Ok(())
    }

    fn setup_field_hash_table(&mut self) -> Result<(), RebuildError> {
        let bucket_bytes = DEFAULT_FIELD_HASH_TABLE_BUCKETS * HASH_ITEM_SIZE;
        let offset = self.append_object(ObjectType::FieldHashTable, OBJECT_HEADER_SIZE + bucket_bytes)?;
        self.field_hash_table_offset = offset + OBJECT_HEADER_SIZE;
        self.field_hash_table_size = bucket_bytes;
        Ok(())
    }

    fn find_field_with_hash(&self, hash: u64, name: &[u8]) -> u64 {
        let buckets = self.field_hash_table_size / HASH_ITEM_SIZE;
        let bucket = hash % buckets;
        let bucket_offset = self.field_hash_table_offset + bucket * HASH_ITEM_SIZE;
        let mut p = self.read_u64(bucket_offset);
        while p != 0 {
            let obj_size = self.read_u64(p + 8);
            let obj_hash = self.read_u64(p + OBJECT_HEADER_SIZE);
            let payload_len = obj_size - OBJECT_HEADER_SIZE - FIELD_OBJECT_HEADER_SIZE;
            let payload = self.read_bytes(p + OBJECT_HEADER_SIZE + FIELD_OBJECT_HEADER_SIZE, payload_len);
            if obj_hash == hash && payload == name {
                return p;
            }
            p = self.read_u64(p + OBJECT_HEADER_SIZE + 8);
        }
        0
    }

    fn find_data_with_hash(&self, hash: u64, payload: &[u8]) -> u64 {
        let buckets = self.data_hash_table_size / HASH_ITEM_SIZE;
        let bucket = hash % buckets;
        let bucket_offset = self.data_hash_table_offset + bucket * HASH_ITEM_SIZE;
        let mut p = self.read_u64(bucket_offset);
        while p != 0 {
            let obj_size = self.read_u64(p + 8);
            let obj_hash = self.read_u64(p + OBJECT_HEADER_SIZE);
            let payload_len = obj_size - OBJECT_HEADER_SIZE - DATA_OBJECT_HEADER_SIZE;
            let existing = self.read_bytes(p + OBJECT_HEADER_SIZE + DATA_OBJECT_HEADER_SIZE, payload_len);
            if obj_hash == hash && existing == payload {
                return p;
            }
            p = self.read_u64(p + OBJECT_HEADER_SIZE + 8);
        }
        0
    }

    fn link_data(&mut self, offset: u64, hash: u64) {
        let buckets = self.data_hash_table_size / HASH_ITEM_SIZE;
        let bucket = hash % buckets;
        let bucket_offset = self.data_hash_table_offset + bucket * HASH_ITEM_SIZE;
        let tail = self.read_u64(bucket_offset + 8);
        if tail == 0 {
            self.write_u64(bucket_offset, offset);
        } else {
            self.write_u64(tail + OBJECT_HEADER_SIZE + 8, offset);
        }
        self.write_u64(bucket_offset + 8, offset);
        self.n_data += 1;
    }

    fn link_field(&mut self, offset: u64, hash: u64) {
        let buckets = self.field_hash_table_size / HASH_ITEM_SIZE;
        let bucket = hash % buckets;
        let bucket_offset = self.field_hash_table_offset + bucket * HASH_ITEM_SIZE;
        let tail = self.read_u64(bucket_offset + 8);
        if tail == 0 {
            self.write_u64(bucket_offset, offset);
        } else {
            self.write_u64(tail + OBJECT_HEADER_SIZE + 8, offset);
        }
        self.write_u64(bucket_offset + 8, offset);
        self.n_fields += 1;
    }

    fn append_field(&mut self, name: &[u8]) -> Result<u64, RebuildError> {
        let hash = self.hash(name);
        let existing = self.find_field_with_hash(hash, name);
        if existing != 0 {
            return Ok(existing);
        }

        let size = OBJECT_HEADER_SIZE + FIELD_OBJECT_HEADER_SIZE + name.len() as u64;
        let offset = self.append_object(ObjectType::Field, size)?;
        self.write_u64(offset + OBJECT_HEADER_SIZE, hash);
        self.write_u64(offset + OBJECT_HEADER_SIZE + 8, 0);
        self.write_u64(offset + OBJECT_HEADER_SIZE + 16, 0);
        self.write_bytes(offset + OBJECT_HEADER_SIZE + FIELD_OBJECT_HEADER_SIZE, name);
        self.link_field(offset, hash);
        Ok(offset)
    }

    fn append_data(&mut self, payload: &[u8]) -> Result<(u64, u64), RebuildError> {
        let hash = self.hash(payload);
        let existing = self.find_data_with_hash(hash, payload);
        if existing != 0 {
            return Ok((existing, hash));
        }

        let size = OBJECT_HEADER_SIZE + DATA_OBJECT_HEADER_SIZE + payload.len() as u64;
        let offset = self.append_object(ObjectType::Data, size)?;
        self.write_u64(offset + OBJECT_HEADER_SIZE, hash);
        for field_offset in [8u64, 16, 24, 32, 40] {
            self.write_u64(offset + OBJECT_HEADER_SIZE + field_offset, 0);
        }
        self.write_bytes(offset + OBJECT_HEADER_SIZE + DATA_OBJECT_HEADER_SIZE, payload);
        self.link_data(offset, hash);

        let field_name = split_field_value(payload)
            .ok_or_else(|| RebuildError::MissingField(String::from_utf8_lossy(payload).into_owned()))?;
        let field_offset = self.append_field(field_name)?;
        let old_head = self.read_u64(field_offset + OBJECT_HEADER_SIZE + 16);
        self.write_u64(offset + OBJECT_HEADER_SIZE + 16, old_head);
        self.write_u64(field_offset + OBJECT_HEADER_SIZE + 16, offset);

        Ok((offset, hash))
    }

    /// Append one entry into a linked array rooted at `first` (either the
    /// global `entry_array_offset` or a per-Data `entry_array_offset`),
    /// with `idx` the zero-based position to place `p` at.
    fn link_into_array(&mut self, first: u64, idx: u64, p: u64) -> Result<u64, RebuildError> {
        let hidx = idx;
        let mut i = idx;
        let mut a = first;
        let mut ap = 0u64;
        let mut last_n = 0u64;

        while a != 0 {
            let size = self.read_u64(a + 8);
            let n = (size - OBJECT_HEADER_SIZE - ENTRY_ARRAY_HEADER_SIZE) / ENTRY_ARRAY_ITEM_SIZE;
            if i < n {
                self.write_u64(a + OBJECT_HEADER_SIZE + ENTRY_ARRAY_HEADER_SIZE + i * ENTRY_ARRAY_ITEM_SIZE, p);
                return Ok(first);
            }
            i -= n;
            ap = a;
            last_n = n;
            a = self.read_u64(a + OBJECT_HEADER_SIZE);
        }

        let n = if hidx > last_n {
            (hidx + 1) * 2
        } else {
            last_n * 2
        }
        .max(ENTRY_ARRAY_INITIAL_ITEMS);

        let size = OBJECT_HEADER_SIZE + ENTRY_ARRAY_HEADER_SIZE + n * ENTRY_ARRAY_ITEM_SIZE;
        let q = self.append_object(ObjectType::EntryArray, size)?;
        self.write_u64(q + OBJECT_HEADER_SIZE, 0);
        self.write_u64(q + OBJECT_HEADER_SIZE + ENTRY_ARRAY_HEADER_SIZE + i * ENTRY_ARRAY_ITEM_SIZE, p);

        let new_first = if ap == 0 {
            q
        } else {
            self.write_u64(ap + OBJECT_HEADER_SIZE, q);
            first
        };
        self.n_entry_arrays += 1;
        Ok(new_first)
    }

    fn link_entry_into_global_array(&mut self, p: u64) -> Result<(), RebuildError> {
        let hidx = self.n_entries;
        self.entry_array_offset = self.link_into_array(self.entry_array_offset, hidx, p)?;
        self.n_entries = hidx + 1;
        Ok(())
    }

    /// The first entry referencing a Data object is recorded directly in
    /// that object's `entry_offset`; only the second and later ones go into
    /// its per-Data EntryArray chain.
    fn link_entry_into_data(&mut self, data_offset: u64, entry_offset: u64) -> Result<(), RebuildError> {
        let n_entries_field = data_offset + OBJECT_HEADER_SIZE + 40;
        let hidx = self.read_u64(n_entries_field);

        if hidx == 0 {
            self.write_u64(data_offset + OBJECT_HEADER_SIZE + 24, entry_offset);
        } else {
            let array_first_field = data_offset + OBJECT_HEADER_SIZE + 32;
            let first = self.read_u64(array_first_field);
            let new_first = self.link_into_array(first, hidx - 1, entry_offset)?;
            self.write_u64(array_first_field, new_first);
        }
        self.write_u64(n_entries_field, hidx + 1);
        Ok(())
    }

    fn entry_seqnum(&mut self) -> u64 {
        let r = self.tail_entry_seqnum + 1;
        self.tail_entry_seqnum = r;
        if self.head_entry_seqnum == 0 {
            self.head_entry_seqnum = r;
        }
        r
    }

    fn append_entry(
        &mut self,
        realtime_micros: u64,
        monotonic: u64,
        boot_id: u128,
        xor_hash: u64,
        data_offsets_and_hashes: &[(u64, u64)],
    ) -> Result<(), RebuildError> {
        let n_items = data_offsets_and_hashes.len().max(1) as u64;
        let size = OBJECT_HEADER_SIZE + ENTRY_OBJECT_HEADER_SIZE + n_items * ENTRY_ITEM_SIZE;
        let offset = self.append_object(ObjectType::Entry, size)?;

        let seqnum = self.entry_seqnum();
        self.write_u64(offset + OBJECT_HEADER_SIZE, seqnum);
        self.write_u64(offset + OBJECT_HEADER_SIZE + 8, realtime_micros);
        self.write_u64(offset + OBJECT_HEADER_SIZE + 16, monotonic);
        self.write_u64(offset + OBJECT_HEADER_SIZE + 24, (boot_id & u128::from(u64::MAX)) as u64);
        self.write_u64(offset + OBJECT_HEADER_SIZE + 32, (boot_id >> 64) as u64);
        self.write_u64(offset + OBJECT_HEADER_SIZE + 40, xor_hash);

        let items_base = offset + OBJECT_HEADER_SIZE + ENTRY_OBJECT_HEADER_SIZE;
        for (idx, &(data_offset, hash)) in data_offsets_and_hashes.iter().enumerate() {
            let item_offset = items_base + idx as u64 * ENTRY_ITEM_SIZE;
            self.write_u64(item_offset, data_offset);
            self.write_u64(item_offset + 8, hash);
        }

        if self.head_entry_realtime == 0 {
            self.head_entry_realtime = realtime_micros;
        }
        self.tail_entry_realtime = realtime_micros;
        self.tail_entry_monotonic = monotonic;

        self.link_entry_into_global_array(offset)?;
        for &(data_offset, _) in data_offsets_and_hashes {
            self.link_entry_into_data(data_offset, offset)?;
        }

        Ok(())
    }

    fn write_header(&mut self, compatible: flagset::FlagSet<CompatibleFlag>, incompatible: flagset::FlagSet<IncompatibleFlag>) {
        self.arena[0..8].copy_from_slice(&crate::header::SIGNATURE);
        self.write_u64_at_u32_pair(8, compatible.bits());
        self.write_u64_at_u32_pair(12, incompatible.bits());
        self.arena[16] = State::Archived as u8;
        for b in &mut self.arena[17..24] {
            *b = 0;
        }
        self.write_id128(24, self.file_id);
        self.write_id128(40, self.machine_id);
        self.write_id128(56, self.boot_id);
        self.write_id128(72, self.seqnum_id);
        self.write_u64(88, self.header_size);
        self.write_u64(96, self.arena.len() as u64 - self.header_size);
        self.write_u64(104, self.data_hash_table_offset);
        self.write_u64(112, self.data_hash_table_size);
        self.write_u64(120, self.field_hash_table_offset);
        self.write_u64(128, self.field_hash_table_size);
        self.write_u64(136, self.tail_object_offset);
        self.write_u64(144, self.n_objects);
        self.write_u64(152, self.n_entries);
        self.write_u64(160, self.tail_entry_seqnum);
        self.write_u64(168, self.head_entry_seqnum);
        self.write_u64(176, self.entry_array_offset);
        self.write_u64(184, self.head_entry_realtime);
        self.write_u64(192, self.tail_entry_realtime);
        self.write_u64(200, self.tail_entry_monotonic);
        if self.header_size >= 256 {
            self.write_u64(208, self.n_data);
            self.write_u64(216, self.n_fields);
            self.write_u64(224, 0); // n_tags: this crate never writes Tag objects
            self.write_u64(232, self.n_entry_arrays);
            self.write_u64(240, self.data_hash_chain_depth);
            self.write_u64(248, self.field_hash_chain_depth);
        }
    }

    fn write_u64_at_u32_pair(&mut self, offset: u64, value: u32) {
        self.arena[offset as usize..offset as usize + 4].copy_from_slice(&value.to_le_bytes());
    }

    fn write_id128(&mut self, offset: u64, id: u128) {
        let lo = (id & u128::from(u64::MAX)) as u64;
        let hi = (id >> 64) as u64;
        self.write_u64(offset, lo);
        self.write_u64(offset + 8, hi);
    }
}

/// Rebuild a filtered journal into a byte-exact arena. Refuses to operate
/// on a sealed source file: Forward Secure Sealing tags would be
/// invalidated by any edit and this crate never re-signs them.
pub fn rebuild(source: &ParsedJournal, filtered: &FilteredJournal) -> Result<Vec<u8>, RebuildError> {
    if source.header.is_sealed() {
        return Err(RebuildError::SealedJournal);
    }

    let mut builder = Rebuilder::new(source);
    builder.allocate(0, builder.header_size)?;
    builder.tail_object_offset = 0;

    builder.setup_data_hash_table()?;
    builder.setup_field_hash_table()?;

    let mut entries: Vec<_> = filtered.surviving_entries.iter().collect();
    entries.sort_by_key(|e| e.seqnum);

    for entry in entries {
        let mut item_refs = Vec::with_capacity(entry.items.len());
        for item in &entry.items {
            let data = source.data_at(item.object_offset).ok_or_else(|| {
                RebuildError::InternalInvariantBroken(format!(
                    "entry references a Data object at {} that no longer exists",
                    item.object_offset
                ))
            })?;
            let (new_offset, new_hash) = builder.append_data(&data.payload)?;
            item_refs.push((new_offset, new_hash));
        }

        builder.append_entry(
            crate::deku_helpers::timestamp_to_micros(entry.realtime),
            entry.monotonic,
            entry.boot_id,
            entry.xor_hash,
            &item_refs,
        )?;
    }

    // `allocate` grows in whole FILE_SIZE_INCREASE steps; trim the unused
    // tail back to the real end of the last written object before the
    // header records `arena_size`, the way the original truncates the file
    // on close.
    let last_size = builder.read_u64(builder.tail_object_offset + 8);
    let used = align8(builder.tail_object_offset + last_size);
    builder.arena.truncate(used as usize);

    let incompatible = if builder.keyed_hash {
        flagset::FlagSet::from(IncompatibleFlag::KeyedHash)
    } else {
        flagset::FlagSet::default()
    };
    builder.write_header(flagset::FlagSet::default(), incompatible);

    Ok(builder.arena)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_field_value_finds_printable_key() {
        assert_eq!(split_field_value(b"MESSAGE=hello"), Some(&b"MESSAGE"[..]));
        assert_eq!(split_field_value(b"\x01\x02MESSAGE=hello"), Some(&b"MESSAGE"[..]));
        assert_eq!(split_field_value(b"noequals"), None);
        assert_eq!(split_field_value(b"=novalue"), None);
    }

    #[test]
    fn page_align_rounds_up_to_page() {
        assert_eq!(page_align(1), PAGE_SIZE);
        assert_eq!(page_align(PAGE_SIZE), PAGE_SIZE);
        assert_eq!(page_align(PAGE_SIZE + 1), 2 * PAGE_SIZE);
    }
}
