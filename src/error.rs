//! Typed failures for each pipeline stage (reader, verifier, rebuilder, filter).

use thiserror::Error;

/// Failures while decoding a journal file into a [`crate::model::ParsedJournal`].
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("not a journal file: bad magic signature")]
    BadMagic,

    #[error("header is truncated: file is {file_size} bytes, header claims {header_size}")]
    TruncatedHeader { file_size: u64, header_size: u64 },

    #[error("offset {offset} in field {field} is misaligned or out of range (size {size}, file size {file_size})")]
    BadOffset {
        field: &'static str,
        offset: u64,
        size: u64,
        file_size: u64,
    },

    #[error("object at offset {offset} declares an unsupported compression flag")]
    UnsupportedCompression { offset: u64 },

    #[error("failed to decode object at offset {offset}: {reason}")]
    Malformed { offset: u64, reason: String },

    #[error(transparent)]
    Verify(#[from] VerifyError),
}

/// Failures while checking the structural invariants of a [`crate::model::ParsedJournal`].
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("object at offset {offset} has an invalid shape: {reason}")]
    ShapeViolation { offset: u64, reason: String },

    #[error("offset {offset} is not 8-byte aligned or exceeds the file size")]
    OffsetMisalignment { offset: u64 },

    #[error("count mismatch for {what}: header says {header}, enumeration found {found}")]
    CountMismatch {
        what: &'static str,
        header: u64,
        found: u64,
    },

    #[error("hash chain cycle detected: offset {next} does not follow offset {current}")]
    ChainCycle { current: u64, next: u64 },

    #[error("object at offset {offset} with hash {hash:#x} is not reachable from bucket {bucket}")]
    BucketMismatch { offset: u64, hash: u64, bucket: u64 },

    #[error("entry array is not strictly increasing at offset {offset}")]
    UnsortedArray { offset: u64 },

    #[error("tag objects present without the SEALED compatible flag set")]
    SealedFlagInconsistency,

    #[error("feature used by this file is not supported: {0}")]
    UnsupportedFeature(&'static str),

    #[error("data object at offset {offset} hash {declared:#x} does not match recomputed hash {computed:#x}")]
    ChecksumMismatch {
        offset: u64,
        declared: u64,
        computed: u64,
    },
}

/// Failures while rebuilding an arena from a filtered entry set.
#[derive(Debug, Error)]
pub enum RebuildError {
    #[error("failed to grow the arena to {requested} bytes")]
    AllocationFailure { requested: u64 },

    #[error("arithmetic overflow while computing {0}")]
    OverflowInArithmetic(&'static str),

    #[error("entry references a field that cannot be located: {0:?}")]
    MissingField(String),

    #[error("the rebuilt arena fails its own invariants: {0}")]
    InternalInvariantBroken(String),

    #[error("refusing to rebuild a sealed (forward-secure-sealed) journal")]
    SealedJournal,
}

/// Failures surfaced by the filter driver when caller-supplied criteria don't match anything.
#[derive(Debug, Error)]
pub enum UserError {
    #[error("no such field: {0:?}")]
    NoSuchField(String),

    #[error("no such field value: {0:?}")]
    NoSuchFieldValue(String),
}

/// The union of every error a full `parse -> filter -> rebuild` pipeline run can produce.
#[derive(Debug, Error)]
pub enum JournalError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Verify(#[from] VerifyError),

    #[error(transparent)]
    Rebuild(#[from] RebuildError),

    #[error(transparent)]
    User(#[from] UserError),
}
