//! Property tests over small randomly generated journals: every rebuild
//! must reparse, and reparsing must satisfy every structural invariant
//! `verify` checks.

use std::collections::BTreeMap;

use proptest::prelude::*;

use journal_zap::filter::{filter, FilterSpec, Policy};
use journal_zap::header::{Header, State};
use journal_zap::model::ParsedJournal;
use journal_zap::objects::{DataObject, EntryArrayObject, EntryItem, EntryObject, Object};
use journal_zap::rebuild::rebuild;
use journal_zap::reader::parse;
use journal_zap::tables::{HashItem, HashTable, DEFAULT_DATA_HASH_TABLE_BUCKETS, DEFAULT_FIELD_HASH_TABLE_BUCKETS};
use journal_zap::verifier::verify;

fn empty_table(buckets: u64) -> HashTable {
    HashTable {
        offset: 0,
        buckets: vec![HashItem::EMPTY; buckets as usize],
    }
}

fn journal_of(values: &[String]) -> ParsedJournal {
    let mut header = Header {
        compatible_flags: Default::default(),
        incompatible_flags: Default::default(),
        state: State::Archived,
        _reserved: (),
        file_id: 0x42,
        machine_id: 0x43,
        boot_id: 0x44,
        seqnum_id: 0x45,
        header_size: 208,
        arena_size: 0,
        data_hash_table_offset: 0,
        data_hash_table_size: 0,
        field_hash_table_offset: 0,
        field_hash_table_size: 0,
        tail_object_offset: 0,
        n_objects: 0,
        n_entries: values.len() as u64,
        tail_entry_seqnum: 0,
        head_entry_seqnum: 0,
        entry_array_offset: 0,
        head_entry_realtime: 0,
        tail_entry_realtime: 0,
        tail_entry_monotonic: 0,
        n_data: None,
        n_fields: None,
        n_tags: None,
        n_entry_arrays: None,
        data_hash_chain_depth: None,
        field_hash_chain_depth: None,
    };

    let mut objects = BTreeMap::new();
    let mut entry_arrays = BTreeMap::new();
    let mut next_offset = 1000u64;
    let mut entry_offsets = Vec::new();
    let mut head_realtime = 0u64;
    let mut tail_realtime = 0u64;
    let mut tail_monotonic = 0u64;

    for (i, value) in values.iter().enumerate() {
        let payload = format!("MESSAGE={value}");
        let data_offset = next_offset;
        next_offset += 100;
        let entry_offset = next_offset;
        next_offset += 100;
        let hash = journal_zap::hashing::hash_data(payload.as_bytes(), false, header.file_id);
        let seqnum = (i + 1) as u64;
        let realtime_micros = (1_700_000_000 + seqnum) * 1_000_000;

        objects.insert(
            data_offset,
            Object::Data(DataObject {
                offset: data_offset,
                hash,
                next_hash_offset: 0,
                next_field_offset: 0,
                entry_offset,
                entry_array_offset: 0,
                n_entries: 1,
                payload: payload.into_bytes(),
            }),
        );
        objects.insert(
            entry_offset,
            Object::Entry(EntryObject {
                offset: entry_offset,
                seqnum,
                realtime: jiff::Timestamp::new(1_700_000_000 + seqnum as i64, 0).unwrap(),
                monotonic: seqnum,
                boot_id: header.boot_id,
                xor_hash: hash,
                items: vec![EntryItem { object_offset: data_offset, hash }],
            }),
        );

        if entry_offsets.is_empty() {
            head_realtime = realtime_micros;
        }
        tail_realtime = realtime_micros;
        tail_monotonic = seqnum;
        entry_offsets.push(entry_offset);
    }

    if !entry_offsets.is_empty() {
        let array_offset = next_offset;
        entry_arrays.insert(
            array_offset,
            EntryArrayObject {
                offset: array_offset,
                next_entry_array_offset: 0,
                items: entry_offsets,
            },
        );
        header.entry_array_offset = array_offset;
        header.head_entry_seqnum = 1;
        header.tail_entry_seqnum = values.len() as u64;
        header.head_entry_realtime = head_realtime;
        header.tail_entry_realtime = tail_realtime;
        header.tail_entry_monotonic = tail_monotonic;
    }

    ParsedJournal {
        header,
        objects,
        entry_arrays,
        data_hash_table: empty_table(DEFAULT_DATA_HASH_TABLE_BUCKETS),
        field_hash_table: empty_table(DEFAULT_FIELD_HASH_TABLE_BUCKETS),
        file_size: 0,
    }
}

fn no_op_filter() -> FilterSpec<'static> {
    FilterSpec {
        field_names: vec![],
        field_values: vec![],
        policy: Policy::default(),
        confirm: None,
    }
}

proptest! {
    /// Any small set of distinct entries survives an unfiltered rebuild and
    /// reparses into a journal that satisfies every structural invariant.
    #[test]
    fn rebuild_of_unfiltered_journal_is_always_valid(
        values in prop::collection::vec("[a-zA-Z0-9]{1,12}", 0..8)
            .prop_map(|mut v| { v.sort(); v.dedup(); v })
    ) {
        let journal = journal_of(&values);
        let filtered = filter(&journal, no_op_filter()).unwrap();
        let bytes = rebuild(&journal, &filtered).unwrap();
        let rebuilt = parse(&bytes).unwrap();
        verify(&rebuilt).unwrap();

        prop_assert_eq!(rebuilt.entries().count(), values.len());
        for offset in rebuilt.data_objects().map(|d| d.offset) {
            prop_assert_eq!(offset % 8, 0);
        }
    }

    /// Removing entries by field value keeps exactly the entries that
    /// didn't carry that value, under xor-hash identity.
    #[test]
    fn filtering_by_value_keeps_only_non_matching_entries(
        values in prop::collection::vec("[a-zA-Z0-9]{1,12}", 1..8)
            .prop_map(|mut v| { v.sort(); v.dedup(); v }),
        needle_index in 0usize..8,
    ) {
        prop_assume!(!values.is_empty());
        let needle = values[needle_index % values.len()].clone();

        let journal = journal_of(&values);
        let expected_kept = values.iter().filter(|v| **v != needle).count();

        let spec = FilterSpec {
            field_names: vec![],
            field_values: vec![needle],
            policy: Policy::default(),
            confirm: None,
        };
        let filtered = filter(&journal, spec).unwrap();
        prop_assert_eq!(filtered.surviving_entries.len(), expected_kept);

        let bytes = rebuild(&journal, &filtered).unwrap();
        let rebuilt = parse(&bytes).unwrap();
        verify(&rebuilt).unwrap();
        prop_assert_eq!(rebuilt.entries().count(), expected_kept);
    }
}
