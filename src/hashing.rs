//! Content addressing for Data and Field objects: Jenkins' `lookup3`
//! (unkeyed) or SipHash-2-4 keyed by the file's `file_id`, selected by the
//! header's `KeyedHash` incompatible flag — matching
//! `journal_base_t::hash_data`.

use siphasher::sip::SipHasher24;
use std::hash::Hasher;

const INITVAL: u32 = 0;

fn rot(x: u32, k: u32) -> u32 {
    x.rotate_left(k)
}

fn mix(a: &mut u32, b: &mut u32, c: &mut u32) {
    *a = a.wrapping_sub(*c);
    *a ^= rot(*c, 4);
    *c = c.wrapping_add(*b);
    *b = b.wrapping_sub(*a);
    *b ^= rot(*a, 6);
    *a = a.wrapping_add(*c);
    *c = c.wrapping_sub(*b);
    *c ^= rot(*b, 8);
    *b = b.wrapping_add(*a);
    *a = a.wrapping_sub(*c);
    *a ^= rot(*c, 16);
    *c = c.wrapping_add(*b);
    *b = b.wrapping_sub(*a);
    *b ^= rot(*a, 19);
    *a = a.wrapping_add(*c);
    *c = c.wrapping_sub(*b);
    *c ^= rot(*b, 4);
    *b = b.wrapping_add(*a);
}

fn final_mix(a: &mut u32, b: &mut u32, c: &mut u32) {
    *c ^= *b;
    *c = c.wrapping_sub(rot(*b, 14));
    *a ^= *c;
    *a = a.wrapping_sub(rot(*c, 11));
    *b ^= *a;
    *b = b.wrapping_sub(rot(*a, 25));
    *c ^= *b;
    *c = c.wrapping_sub(rot(*b, 16));
    *a ^= *c;
    *a = a.wrapping_sub(rot(*c, 4));
    *b ^= *a;
    *b = b.wrapping_sub(rot(*a, 14));
    *c ^= *b;
    *c = c.wrapping_sub(rot(*b, 24));
}

/// Bob Jenkins' `hashlittle2`: returns `(pc, pb)`, the two 32-bit hashes for
/// the price of one. Byte-oriented; matches the aligned fast path's output
/// for all inputs, little-endian or not.
fn hashlittle2(key: &[u8], initval_pc: u32, initval_pb: u32) -> (u32, u32) {
    let mut a: u32 = 0xdeadbeefu32
        .wrapping_add(key.len() as u32)
        .wrapping_add(initval_pc);
    let mut b = a;
    let mut c = a.wrapping_add(initval_pb);

    let mut chunks = key.chunks_exact(12);
    for chunk in &mut chunks {
        a = a.wrapping_add(u32::from_le_bytes(chunk[0..4].try_into().unwrap()));
        b = b.wrapping_add(u32::from_le_bytes(chunk[4..8].try_into().unwrap()));
        c = c.wrapping_add(u32::from_le_bytes(chunk[8..12].try_into().unwrap()));
        mix(&mut a, &mut b, &mut c);
    }

    let rest = chunks.remainder();
    let mut buf = [0u8; 12];
    buf[..rest.len()].copy_from_slice(rest);
    a = a.wrapping_add(u32::from_le_bytes(buf[0..4].try_into().unwrap()));
    b = b.wrapping_add(u32::from_le_bytes(buf[4..8].try_into().unwrap()));
    c = c.wrapping_add(u32::from_le_bytes(buf[8..12].try_into().unwrap()));
    if !rest.is_empty() {
        final_mix(&mut a, &mut b, &mut c);
    }

    (c, b)
}

/// Unkeyed Jenkins hash of a Data/Field payload, combined into 64 bits as
/// `(pc << 32) | pb`.
pub fn jenkins_hash64(data: &[u8]) -> u64 {
    let (pc, pb) = hashlittle2(data, INITVAL, INITVAL);
    (u64::from(pc) << 32) | u64::from(pb)
}

/// SipHash-2-4 of a Data/Field payload, keyed by the file's 16-byte
/// `file_id` (low 8 bytes = k0, high 8 bytes = k1).
pub fn siphash64(data: &[u8], file_id: u128) -> u64 {
    let k0 = (file_id & u128::from(u64::MAX)) as u64;
    let k1 = (file_id >> 64) as u64;
    let mut hasher = SipHasher24::new_with_keys(k0, k1);
    hasher.write(data);
    hasher.finish()
}

/// Dispatch on the header's `KeyedHash` flag, matching
/// `journal_base_t::hash_data`.
pub fn hash_data(data: &[u8], keyed: bool, file_id: u128) -> u64 {
    if keyed {
        siphash64(data, file_id)
    } else {
        jenkins_hash64(data)
    }
}
