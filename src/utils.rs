//! Bit-array and byte-order helpers shared by the on-disk codecs.
//!
//! Every bit array in the dictionary formats is **MSB-first**: bit `i` of a
//! buffer lives in byte `i / 8` at position `7 - i % 8`. The helpers here work
//! on plain byte slices with a starting bit offset and a value width of
//! `1..=32` bits, so the same code serves word records, permutation arrays and
//! the phrase-boundary cache.

use crate::error::{RkError, RkResult};

#[inline]
fn low_mask(width: u32) -> u64 {
    (1u64 << width) - 1
}

/// Number of bits needed to store the values `0..n` (ceil(log2(n))), with
/// `bits_for(0) == bits_for(1) == 0`.
///
/// ```
/// use yomi_renbun::utils::bits_for;
/// assert_eq!(bits_for(1), 0);
/// assert_eq!(bits_for(2), 1);
/// assert_eq!(bits_for(5), 3);
/// assert_eq!(bits_for(8), 3);
/// assert_eq!(bits_for(9), 4);
/// ```
#[inline]
pub fn bits_for(n: usize) -> u32 {
    if n <= 1 {
        0
    } else {
        usize::BITS - (n - 1).leading_zeros()
    }
}

/// Width of one permutation-array entry for a record with `candidates`
/// candidates: `ceil(log2(candidates + 1)) + 1`. The extra low bit is the
/// "used" flag.
#[inline]
pub fn permutation_width(candidates: usize) -> u32 {
    bits_for(candidates + 1) + 1
}

/// Bytes needed to hold `count` values of `width` bits.
#[inline]
pub fn packed_len(count: usize, width: u32) -> usize {
    (count * width as usize + 7) / 8
}

/// Reads one `width`-bit value starting at `bit_off`.
///
/// # Panics
/// Panics if the range is outside `buf` or `width` is not in `1..=32`.
pub fn get_bits(buf: &[u8], bit_off: usize, width: u32) -> u32 {
    assert!((1..=32).contains(&width), "bit width {width} out of range");
    let first = bit_off / 8;
    let last = (bit_off + width as usize - 1) / 8;
    let mut window: u64 = 0;
    for &b in &buf[first..=last] {
        window = (window << 8) | u64::from(b);
    }
    let total = (last - first + 1) * 8;
    let shift = total - bit_off % 8 - width as usize;
    ((window >> shift) & low_mask(width)) as u32
}

/// Writes one `width`-bit value starting at `bit_off`; bits of `value` above
/// `width` are ignored.
///
/// # Panics
/// Panics if the range is outside `buf` or `width` is not in `1..=32`.
pub fn set_bits(buf: &mut [u8], bit_off: usize, width: u32, value: u32) {
    assert!((1..=32).contains(&width), "bit width {width} out of range");
    let first = bit_off / 8;
    let last = (bit_off + width as usize - 1) / 8;
    let mut window: u64 = 0;
    for &b in &buf[first..=last] {
        window = (window << 8) | u64::from(b);
    }
    let total = (last - first + 1) * 8;
    let shift = total - bit_off % 8 - width as usize;
    let mask = low_mask(width) << shift;
    window = (window & !mask) | ((u64::from(value) << shift) & mask);
    for slot in buf[first..=last].iter_mut().rev() {
        *slot = (window & 0xff) as u8;
        window >>= 8;
    }
}

fn check_range(len: usize, bit_off: usize, width: u32, count: usize) -> RkResult<()> {
    if !(1..=32).contains(&width) {
        return Err(RkError::invalid(format!("bit width {width} out of range 1..=32")));
    }
    let end = bit_off + count * width as usize;
    if end > len * 8 {
        return Err(RkError::invalid(format!(
            "bit range {bit_off}..{end} exceeds buffer of {len} bytes"
        )));
    }
    Ok(())
}

/// Packs `values` as consecutive `width`-bit fields starting at `bit_off`.
///
/// Returns the number of bits written. The destination must be pre-sized;
/// a range that does not fit is an [`RkError::InvalidArgument`].
///
/// ```
/// use yomi_renbun::utils::{pack_bits, unpack_bits};
/// let mut buf = [0u8; 4];
/// pack_bits(&mut buf, 3, 5, &[1, 31, 7]).unwrap();
/// assert_eq!(unpack_bits(&buf, 3, 5, 3).unwrap(), vec![1, 31, 7]);
/// ```
pub fn pack_bits(dst: &mut [u8], bit_off: usize, width: u32, values: &[u32]) -> RkResult<usize> {
    check_range(dst.len(), bit_off, width, values.len())?;
    for (i, &v) in values.iter().enumerate() {
        set_bits(dst, bit_off + i * width as usize, width, v);
    }
    Ok(values.len() * width as usize)
}

/// Inverse of [`pack_bits`].
pub fn unpack_bits(src: &[u8], bit_off: usize, width: u32, count: usize) -> RkResult<Vec<u32>> {
    check_range(src.len(), bit_off, width, count)?;
    Ok((0..count)
        .map(|i| get_bits(src, bit_off + i * width as usize, width))
        .collect())
}

/// Copies `nbits` bits inside `buf` from `src_bit` to `dst_bit`.
///
/// Overlapping ranges are handled like `memmove`: the copy walks forward when
/// moving towards lower offsets and backward otherwise.
pub fn copy_bits(buf: &mut [u8], dst_bit: usize, src_bit: usize, nbits: usize) -> RkResult<()> {
    let limit = buf.len() * 8;
    if src_bit + nbits > limit || dst_bit + nbits > limit {
        return Err(RkError::invalid(format!(
            "bit copy of {nbits} bits ({src_bit} -> {dst_bit}) exceeds {limit} bits"
        )));
    }
    if nbits == 0 || dst_bit == src_bit {
        return Ok(());
    }
    const CHUNK: usize = 32;
    if dst_bit < src_bit {
        let mut done = 0;
        while done < nbits {
            let w = CHUNK.min(nbits - done);
            let v = get_bits(buf, src_bit + done, w as u32);
            set_bits(buf, dst_bit + done, w as u32, v);
            done += w;
        }
    } else {
        let mut left = nbits;
        while left > 0 {
            let w = CHUNK.min(left);
            left -= w;
            let v = get_bits(buf, src_bit + left, w as u32);
            set_bits(buf, dst_bit + left, w as u32, v);
        }
    }
    Ok(())
}

/// Iterates lengths present in a 64-bit length mask in **descending order**,
/// stopping early when the callback returns `true`.
///
/// Bit `n` stands for length `n + 1`; bit 63 is a cap bucket meaning "some
/// length of 64 or more". When `cap_here > 64` and the cap bit is set, every
/// length from `cap_here` down to 64 is offered first.
///
/// ```
/// use yomi_renbun::utils::for_each_len_desc;
/// let mask = (1u64 << 0) | (1u64 << 2);
/// let mut seen = Vec::new();
/// for_each_len_desc(mask, 5, |len| { seen.push(len); false });
/// assert_eq!(seen, vec![3, 1]);
/// ```
#[inline]
pub fn for_each_len_desc(mask: u64, cap_here: usize, mut f: impl FnMut(usize) -> bool) {
    if mask == 0 || cap_here == 0 {
        return;
    }
    const CAP_BIT: u64 = 1u64 << 63;
    if cap_here > 64 && (mask & CAP_BIT) != 0 {
        for len in (64..=cap_here).rev() {
            if f(len) {
                return;
            }
        }
    }
    let limit = cap_here.min(64);
    let range_mask = 1u64.wrapping_shl(limit as u32).wrapping_sub(1);
    let range_mask = if limit == 64 { u64::MAX } else { range_mask };
    let mut m = mask & range_mask & if cap_here > 64 { !CAP_BIT } else { !0 };
    while m != 0 {
        let bit = 63 - m.leading_zeros() as usize;
        if f(bit + 1) {
            return;
        }
        m &= !(1u64 << bit);
    }
}

/// Length-mask bit for a phrase length (lengths of 64 and above share bit 63).
#[inline]
pub fn len_bit(len: usize) -> u64 {
    debug_assert!(len > 0);
    1u64 << (len.min(64) - 1)
}

#[inline]
pub fn read_u16(b: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([b[at], b[at + 1]])
}

#[inline]
pub fn read_u24(b: &[u8], at: usize) -> u32 {
    (u32::from(b[at]) << 16) | (u32::from(b[at + 1]) << 8) | u32::from(b[at + 2])
}

#[inline]
pub fn read_u32(b: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([b[at], b[at + 1], b[at + 2], b[at + 3]])
}

#[inline]
pub fn put_u16(b: &mut [u8], at: usize, v: u16) {
    b[at..at + 2].copy_from_slice(&v.to_be_bytes());
}

#[inline]
pub fn put_u24(b: &mut [u8], at: usize, v: u32) {
    debug_assert!(v < (1 << 24));
    b[at] = (v >> 16) as u8;
    b[at + 1] = (v >> 8) as u8;
    b[at + 2] = v as u8;
}

#[inline]
pub fn put_u32(b: &mut [u8], at: usize, v: u32) {
    b[at..at + 4].copy_from_slice(&v.to_be_bytes());
}

/// Converts a BMP `char` to its on-disk code unit.
#[inline]
pub fn char_to_unit(c: char) -> RkResult<u16> {
    u16::try_from(c as u32)
        .map_err(|_| RkError::invalid(format!("character {c:?} is outside the BMP")))
}

/// Converts an on-disk code unit back to a `char`; lone surrogates are a
/// format error.
#[inline]
pub fn unit_to_char(u: u16) -> RkResult<char> {
    char::from_u32(u32::from(u)).ok_or_else(|| RkError::parse(format!("invalid code unit {u:#06x}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widths_follow_log2() {
        assert_eq!(permutation_width(1), 2);
        assert_eq!(permutation_width(2), 3);
        assert_eq!(permutation_width(3), 3);
        assert_eq!(permutation_width(7), 4);
        assert_eq!(permutation_width(8), 5);
    }

    #[test]
    fn pack_unpack_various_offsets_and_widths() {
        for width in [1u32, 3, 7, 8, 13, 24, 31, 32] {
            for off in [0usize, 1, 5, 8, 11] {
                let max = if width == 32 { u32::MAX } else { (1u32 << width) - 1 };
                let values: Vec<u32> = (0..9u32).map(|i| (i.wrapping_mul(2_654_435_761)) & max).collect();
                let mut buf = vec![0u8; packed_len(values.len(), width) + 2];
                pack_bits(&mut buf, off, width, &values).unwrap();
                assert_eq!(unpack_bits(&buf, off, width, values.len()).unwrap(), values);
            }
        }
    }

    #[test]
    fn set_bits_leaves_neighbours_alone() {
        let mut buf = [0xffu8; 3];
        set_bits(&mut buf, 5, 6, 0);
        assert_eq!(buf, [0b1111_1000, 0b0001_1111, 0xff]);
    }

    #[test]
    fn pack_rejects_short_destination() {
        let mut buf = [0u8; 1];
        assert!(pack_bits(&mut buf, 4, 3, &[1, 2]).is_err());
        assert!(pack_bits(&mut buf, 0, 0, &[1]).is_err());
    }

    #[test]
    fn copy_bits_overlapping_both_directions() {
        let width = 3;
        let mut buf = vec![0u8; 4];
        pack_bits(&mut buf, 0, width, &[0, 1, 2, 3, 4, 5, 6]).unwrap();
        // shift entries 0..3 up by one slot
        copy_bits(&mut buf, 3, 0, 9).unwrap();
        assert_eq!(unpack_bits(&buf, 0, width, 7).unwrap(), vec![0, 0, 1, 2, 4, 5, 6]);
        // and back down
        copy_bits(&mut buf, 0, 3, 9).unwrap();
        assert_eq!(unpack_bits(&buf, 0, width, 7).unwrap(), vec![0, 1, 2, 2, 4, 5, 6]);
    }

    #[test]
    fn copy_bits_long_ranges() {
        let mut buf: Vec<u8> = (0..32u8).collect();
        let orig = buf.clone();
        copy_bits(&mut buf, 8, 0, 200).unwrap();
        assert_eq!(&buf[1..26], &orig[0..25]);
    }

    #[test]
    fn len_mask_iteration_with_cap() {
        let mask = len_bit(1) | len_bit(70);
        let mut seen = Vec::new();
        for_each_len_desc(mask, 66, |l| {
            seen.push(l);
            false
        });
        assert_eq!(seen, vec![66, 65, 64, 1]);
    }

    #[test]
    fn unit_conversion_rejects_astral() {
        assert_eq!(char_to_unit('あ').unwrap(), 0x3042);
        assert!(char_to_unit('𠀋').is_err());
        assert!(unit_to_char(0xd800).is_err());
    }
}
