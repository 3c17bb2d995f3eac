//! Resolves caller-supplied field names/values to content hashes, finds
//! every entry carrying one of those hashes, and decides (optionally with
//! a confirmation callback) which of those entries survive into the
//! rebuilt file.

use crate::error::UserError;
use crate::model::ParsedJournal;
use crate::objects::EntryObject;

/// What to do with entries that matched one of the resolved criteria.
/// Mirrors the independent `-p`/`-P`/`-c` flags: printing and confirming
/// are presentation concerns, not separate deletion policies — every
/// matched entry is removed unless a confirmation callback declines it.
#[derive(Debug, Clone, Copy, Default)]
pub struct Policy {
    pub print_all: bool,
    pub print_matches: bool,
    pub confirm_matches: bool,
}

pub struct FilterSpec<'a> {
    pub field_names: Vec<String>,
    pub field_values: Vec<String>,
    pub policy: Policy,
    /// Invoked once per matched entry when `policy.confirm_matches` is set.
    /// Returning `true` deletes the entry, `false` keeps it. Unused
    /// otherwise.
    pub confirm: Option<&'a mut dyn FnMut(&EntryObject) -> bool>,
}

pub struct FilteredJournal {
    pub surviving_entries: Vec<EntryObject>,
    pub removed_count: usize,
}

/// Case-insensitive equality between a Field object's payload and a
/// caller-supplied field name (`input_journal_t::has_field`).
fn resolve_field_hash(journal: &ParsedJournal, name: &str) -> Option<u64> {
    journal
        .field_objects()
        .find(|f| f.payload.eq_ignore_ascii_case(name.as_bytes()))
        .map(|f| f.hash)
}

/// Case-insensitive substring search over every Data payload
/// (`input_journal_t::has_field_value`/`get_field_value_hash`): slide the
/// needle across the payload one byte at a time and compare prefixes.
fn resolve_field_value_hash(journal: &ParsedJournal, value: &str) -> Option<u64> {
    let needle = value.as_bytes();
    if needle.is_empty() {
        return None;
    }
    journal
        .data_objects()
        .find(|d| {
            d.payload.len() >= needle.len()
                && d.payload.windows(needle.len()).any(|w| w.eq_ignore_ascii_case(needle))
        })
        .map(|d| d.hash)
}

/// Resolve every field name/value in `spec` to a content hash, then find
/// every entry whose item list references one of those hashes, then apply
/// the deletion policy. Entries are returned in their original order.
pub fn filter(journal: &ParsedJournal, mut spec: FilterSpec<'_>) -> Result<FilteredJournal, UserError> {
    let mut hashes = Vec::with_capacity(spec.field_names.len() + spec.field_values.len());

    for name in &spec.field_names {
        match resolve_field_hash(journal, name) {
            Some(h) => hashes.push(h),
            None => return Err(UserError::NoSuchField(name.clone())),
        }
    }
    for value in &spec.field_values {
        match resolve_field_value_hash(journal, value) {
            Some(h) => hashes.push(h),
            None => return Err(UserError::NoSuchFieldValue(value.clone())),
        }
    }

    let doomed_xor_hashes: std::collections::HashSet<u64> = journal
        .entries()
        .filter(|e| hashes.iter().any(|h| e.has_item_hash(*h)))
        .map(|e| e.xor_hash)
        .collect();

    let mut surviving = Vec::new();
    let mut removed = 0usize;

    for entry in journal.entries() {
        if spec.policy.print_all {
            tracing::info!(seqnum = entry.seqnum, "entry");
        }

        if doomed_xor_hashes.contains(&entry.xor_hash) {
            let delete = if spec.policy.confirm_matches {
                match spec.confirm.as_deref_mut() {
                    Some(confirm) => confirm(entry),
                    None => true,
                }
            } else {
                true
            };

            if delete {
                if spec.policy.print_matches && !spec.policy.confirm_matches {
                    tracing::info!(seqnum = entry.seqnum, "match");
                }
                removed += 1;
                continue;
            }
        }

        surviving.push(entry.clone());
    }

    Ok(FilteredJournal {
        surviving_entries: surviving,
        removed_count: removed,
    })
}
