//! Custom deku `reader`/`writer` functions for on-disk shapes that don't map
//! onto a primitive deku reads directly: 128-bit identifiers stored as two
//! little-endian `u64` limbs, and microsecond timestamps exposed as
//! [`jiff::Timestamp`].

use deku::ctx::Endian;
use deku::reader::Reader;
use deku::writer::Writer;
use deku::{DekuError, DekuReader, DekuWriter};
use std::io::{Read, Seek, Write};

/// Read a 128-bit identifier stored as `[lo: u64, hi: u64]`, little-endian.
pub(crate) fn reader_id128<R: Read + Seek>(reader: &mut Reader<R>) -> Result<u128, DekuError> {
    let lo = u64::from_reader_with_ctx(reader, Endian::Little)?;
    let hi = u64::from_reader_with_ctx(reader, Endian::Little)?;
    Ok((u128::from(hi) << 64) | u128::from(lo))
}

pub(crate) fn writer_id128<W: Write + Seek>(
    writer: &mut Writer<W>,
    id: &u128,
) -> Result<(), DekuError> {
    let lo = (*id & u128::from(u64::MAX)) as u64;
    let hi = (*id >> 64) as u64;
    lo.to_writer(writer, Endian::Little)?;
    hi.to_writer(writer, Endian::Little)?;
    Ok(())
}

/// Read a microsecond-since-epoch `u64` as a [`jiff::Timestamp`].
pub(crate) fn reader_realtime<R: Read + Seek>(
    reader: &mut Reader<R>,
) -> Result<jiff::Timestamp, DekuError> {
    let micros = u64::from_reader_with_ctx(reader, Endian::Little)?;
    micros_to_timestamp(micros)
}

pub(crate) fn writer_realtime<W: Write + Seek>(
    writer: &mut Writer<W>,
    ts: &jiff::Timestamp,
) -> Result<(), DekuError> {
    timestamp_to_micros(*ts).to_writer(writer, Endian::Little)
}

pub(crate) fn micros_to_timestamp(micros: u64) -> Result<jiff::Timestamp, DekuError> {
    let secs = (micros / 1_000_000) as i64;
    let subsec_nanos = ((micros % 1_000_000) * 1_000) as i32;
    jiff::Timestamp::new(secs, subsec_nanos)
        .map_err(|e| DekuError::Parse(format!("invalid realtime timestamp: {e}").into()))
}

pub(crate) fn timestamp_to_micros(ts: jiff::Timestamp) -> u64 {
    let secs = ts.as_second();
    let nanos = ts.subsec_nanosecond();
    (secs as u64).wrapping_mul(1_000_000) + (nanos as u64 / 1_000)
}
