//! End-to-end scenarios over the parse -> filter -> rebuild -> verify
//! pipeline, built from synthetic in-memory journals rather than captured
//! binary fixtures.

use std::collections::BTreeMap;

use journal_zap::filter::{filter, FilterSpec, Policy};
use journal_zap::header::{CompatibleFlag, Header, IncompatibleFlag, State};
use journal_zap::model::ParsedJournal;
use journal_zap::objects::{DataObject, EntryArrayObject, EntryItem, EntryObject, FieldObject, Object};
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

/// A header shape with no objects at all, matching an archive that has just
/// been created and never appended to.
fn empty_header() -> Header {
    Header {
        compatible_flags: Default::default(),
        incompatible_flags: Default::default(),
        state: State::Archived,
        _reserved: (),
        file_id: 0x1111_2222_3333_4444_5555_6666_7777_8888,
        machine_id: 0xaaaa,
        boot_id: 0xbbbb,
        seqnum_id: 0xcccc,
        header_size: 208,
        arena_size: 0,
        data_hash_table_offset: 0,
        data_hash_table_size: 0,
        field_hash_table_offset: 0,
        field_hash_table_size: 0,
        tail_object_offset: 0,
        n_objects: 0,
        n_entries: 0,
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
    }
}

/// Build a synthetic source journal out of `(field_name, value)` payloads,
/// one entry per payload, each with a single Data item. Offsets are
/// synthetic but unique and internally consistent: each Entry's item
/// references the Data object's offset, and `ParsedJournal::data_at`
/// resolves purely from the `objects` map, so nothing else needs to agree
/// with real arena geometry for these tests.
fn synthetic_journal(payloads: &[&str], keyed: bool) -> ParsedJournal {
    let mut header = empty_header();
    if keyed {
        header.incompatible_flags |= IncompatibleFlag::KeyedHash;
    }

    let mut objects = BTreeMap::new();
    let mut entry_arrays = BTreeMap::new();
    let mut next_offset = 1000u64;
    let mut entry_offsets = Vec::new();
    let mut head_realtime = 0u64;
    let mut tail_realtime = 0u64;
    let mut tail_monotonic = 0u64;

    for (i, payload) in payloads.iter().enumerate() {
        let data_offset = next_offset;
        next_offset += 100;
        let entry_offset = next_offset;
        next_offset += 100;
        let hash = journal_zap::hashing::hash_data(payload.as_bytes(), keyed, header.file_id);

        objects.insert(
            data_offset,
            Object::Data(DataObject {
                offset: data_offset,
                hash,
                next_hash_offset: 0,
                next_field_offset: 0,
                // Only one Entry ever references this Data object: the
                // fast path records it directly, with no per-Data
                // EntryArray chain needed.
                entry_offset,
                entry_array_offset: 0,
                n_entries: 1,
                payload: payload.as_bytes().to_vec(),
            }),
        );

        let seqnum = (i + 1) as u64;
        let realtime = jiff::Timestamp::new(1_700_000_000 + seqnum as i64, 0).unwrap();
        let realtime_micros = (1_700_000_000 + seqnum) * 1_000_000;
        let monotonic = seqnum * 1000;
        objects.insert(
            entry_offset,
            Object::Entry(EntryObject {
                offset: entry_offset,
                seqnum,
                realtime,
                monotonic,
                boot_id: header.boot_id,
                xor_hash: hash,
                items: vec![EntryItem {
                    object_offset: data_offset,
                    hash,
                }],
            }),
        );

        if entry_offsets.is_empty() {
            head_realtime = realtime_micros;
        }
        tail_realtime = realtime_micros;
        tail_monotonic = monotonic;
        entry_offsets.push(entry_offset);
    }

    header.n_entries = payloads.len() as u64;

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
        header.tail_entry_seqnum = payloads.len() as u64;
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

#[test]
fn scenario_1_minimal_journal_rebuilds_to_empty_arena() {
    let journal = synthetic_journal(&[], false);

    let filtered = filter(
        &journal,
        FilterSpec {
            field_names: vec![],
            field_values: vec![],
            policy: Policy::default(),
            confirm: None,
        },
    )
    .unwrap();
    assert_eq!(filtered.surviving_entries.len(), 0);

    let bytes = rebuild(&journal, &filtered).unwrap();
    let rebuilt = parse(&bytes).unwrap();
    verify(&rebuilt).unwrap();

    assert_eq!(rebuilt.header.n_entries, 0);
    assert_eq!(rebuilt.entries().count(), 0);
}

#[test]
fn scenario_2_filter_by_value_removes_one_of_three() {
    let journal = synthetic_journal(&["MESSAGE=hello-A", "MESSAGE=hello-B", "MESSAGE=hello-C"], false);

    let filtered = filter(
        &journal,
        FilterSpec {
            field_names: vec![],
            field_values: vec!["hello-B".to_string()],
            policy: Policy::default(),
            confirm: None,
        },
    )
    .unwrap();
    assert_eq!(filtered.surviving_entries.len(), 2);
    assert_eq!(filtered.removed_count, 1);

    let bytes = rebuild(&journal, &filtered).unwrap();
    let rebuilt = parse(&bytes).unwrap();
    verify(&rebuilt).unwrap();

    let mut seqnums: Vec<u64> = rebuilt.entries().map(|e| e.seqnum).collect();
    seqnums.sort();
    assert_eq!(seqnums, vec![1, 2]);

    let fields: Vec<&FieldObject> = rebuilt.field_objects().collect();
    assert_eq!(fields.len(), 1);
    assert_eq!(fields[0].payload, b"MESSAGE");

    assert_eq!(rebuilt.data_objects().count(), 2);
}

#[test]
fn scenario_3_keyed_hash_preserves_file_id_and_hashes() {
    let journal = synthetic_journal(&["MESSAGE=alpha"], true);
    let original_hash = journal.data_objects().next().unwrap().hash;

    let filtered = filter(
        &journal,
        FilterSpec {
            field_names: vec![],
            field_values: vec![],
            policy: Policy::default(),
            confirm: None,
        },
    )
    .unwrap();

    let bytes = rebuild(&journal, &filtered).unwrap();
    let rebuilt = parse(&bytes).unwrap();
    verify(&rebuilt).unwrap();

    assert!(rebuilt.header.uses_keyed_hash());
    assert_eq!(rebuilt.header.file_id, journal.header.file_id);
    assert_eq!(rebuilt.data_objects().next().unwrap().hash, original_hash);
}

#[test]
fn scenario_4_zstd_bit_without_compressed_objects_is_cleared_on_rebuild() {
    let mut journal = synthetic_journal(&["MESSAGE=plain"], false);
    journal.header.incompatible_flags |= IncompatibleFlag::CompressedZstd;

    let filtered = filter(
        &journal,
        FilterSpec {
            field_names: vec![],
            field_values: vec![],
            policy: Policy::default(),
            confirm: None,
        },
    )
    .unwrap();

    let bytes = rebuild(&journal, &filtered).unwrap();
    let rebuilt = parse(&bytes).unwrap();
    verify(&rebuilt).unwrap();

    assert!(!rebuilt.header.declares_compression());
}

#[test]
fn scenario_5_header_entry_count_mismatch_is_rejected() {
    let mut journal = synthetic_journal(&["MESSAGE=only-one"], false);
    journal.header.n_entries = 2;

    let err = verify(&journal).unwrap_err();
    assert!(matches!(err, journal_zap::error::VerifyError::CountMismatch { .. }));
}

#[test]
fn scenario_6_hash_chain_cycle_is_rejected() {
    let mut journal = synthetic_journal(&["MESSAGE=cyclic"], false);
    let offset = journal.data_objects().next().unwrap().offset;
    let hash = journal.data_objects().next().unwrap().hash;

    if let Some(Object::Data(d)) = journal.objects.get_mut(&offset) {
        d.next_hash_offset = offset; // points at itself: an immediate cycle
    }
    let bucket = hash % DEFAULT_DATA_HASH_TABLE_BUCKETS;
    journal.data_hash_table.buckets[bucket as usize] = HashItem {
        head_hash_offset: offset,
        tail_hash_offset: offset,
    };

    let err = verify(&journal).unwrap_err();
    assert!(matches!(err, journal_zap::error::VerifyError::ChainCycle { .. }));
}

#[test]
fn rebuild_is_idempotent() {
    let journal = synthetic_journal(&["MESSAGE=one", "MESSAGE=two"], false);
    let spec = || FilterSpec {
        field_names: vec![],
        field_values: vec![],
        policy: Policy::default(),
        confirm: None,
    };

    let first_bytes = rebuild(&journal, &filter(&journal, spec()).unwrap()).unwrap();
    let reparsed = parse(&first_bytes).unwrap();
    let second_bytes = rebuild(&reparsed, &filter(&reparsed, spec()).unwrap()).unwrap();

    assert_eq!(first_bytes, second_bytes);
}

#[test]
fn sealed_journal_refuses_rebuild_and_verify() {
    let mut journal = synthetic_journal(&["MESSAGE=sealed"], false);
    journal.header.compatible_flags |= CompatibleFlag::Sealed;

    assert!(matches!(
        verify(&journal),
        Err(journal_zap::error::VerifyError::UnsupportedFeature(_))
    ));

    let filtered = filter(
        &journal,
        FilterSpec {
            field_names: vec![],
            field_values: vec![],
            policy: Policy::default(),
            confirm: None,
        },
    )
    .unwrap();
    assert!(matches!(
        rebuild(&journal, &filtered),
        Err(journal_zap::error::RebuildError::SealedJournal)
    ));
}

#[test]
fn unresolvable_field_filter_is_a_user_error() {
    let journal = synthetic_journal(&["MESSAGE=hi"], false);
    let err = filter(
        &journal,
        FilterSpec {
            field_names: vec!["NOSUCHFIELD".to_string()],
            field_values: vec![],
            policy: Policy::default(),
            confirm: None,
        },
    )
    .unwrap_err();
    assert!(matches!(err, journal_zap::error::UserError::NoSuchField(_)));
}
