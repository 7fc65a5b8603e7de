//! Byte-level diff codec for equal-length buffers.
//!
//! A delta is a stream of alternating runs. It always opens with an equal run
//! (bytes kept from the old buffer, possibly zero of them), followed by a
//! different run (a length and that many literal bytes from the new buffer),
//! then another equal run, and so on. Run lengths are unsigned LEB128. The
//! stream ends right after the run that reaches the end of the buffer.
//!
//! An equal run of one or two bytes sandwiched between differences is folded
//! into the different run; splitting it would cost more header bytes than it
//! saves.

/// Longest equal run that is folded into a surrounding different run.
const MAX_FOLDED_EQUAL_RUN: usize = 2;

/// Comparison stride for the equal-run fast path.
const WORD: usize = 8;

/// Appends `value` as an unsigned LEB128 varint.
pub fn store_uleb(out: &mut Vec<u8>, mut value: usize) {
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

/// Decodes an unsigned LEB128 varint from the front of `data`.
///
/// Returns the value and the number of bytes consumed. Panics on truncated
/// input; deltas are produced in-process, so a malformed stream is a bug.
pub fn load_uleb(data: &[u8]) -> (usize, usize) {
    let mut value = 0usize;
    let mut shift = 0u32;
    for (idx, &byte) in data.iter().enumerate() {
        assert!(shift < usize::BITS, "LEB128 value overflows usize");
        value |= usize::from(byte & 0x7F) << shift;
        if byte & 0x80 == 0 {
            return (value, idx + 1);
        }
        shift += 7;
    }
    panic!("truncated LEB128 value in delta stream");
}

/// Length of the common prefix of `old` and `new`.
fn equal_run(old: &[u8], new: &[u8]) -> usize {
    let mut idx = 0;
    while idx + WORD <= old.len() && old[idx..idx + WORD] == new[idx..idx + WORD] {
        idx += WORD;
    }
    idx + old[idx..]
        .iter()
        .zip(&new[idx..])
        .take_while(|(a, b)| a == b)
        .count()
}

/// Length of the different run starting at index 0, where `old[0] != new[0]`.
fn different_run(old: &[u8], new: &[u8]) -> usize {
    let len = old.len();
    let mut idx = 1;
    loop {
        while idx < len && old[idx] != new[idx] {
            idx += 1;
        }
        if idx == len {
            return len;
        }
        let equal = old[idx..]
            .iter()
            .zip(&new[idx..])
            .take(MAX_FOLDED_EQUAL_RUN + 1)
            .take_while(|(a, b)| a == b)
            .count();
        if equal <= MAX_FOLDED_EQUAL_RUN && idx + equal < len {
            // Short equal run with more differences right behind it.
            idx += equal;
            continue;
        }
        return idx;
    }
}

/// Encodes the difference between two equal-length buffers.
///
/// # Panics
///
/// Panics when `old` and `new` differ in length.
pub fn calc_delta(old: &[u8], new: &[u8]) -> Vec<u8> {
    assert_eq!(
        old.len(),
        new.len(),
        "delta buffers must have equal length"
    );
    let len = old.len();
    let mut out = Vec::new();
    let mut pos = 0;
    loop {
        let equal = equal_run(&old[pos..], &new[pos..]);
        store_uleb(&mut out, equal);
        pos += equal;
        if pos == len {
            break;
        }

        let different = different_run(&old[pos..], &new[pos..]);
        store_uleb(&mut out, different);
        out.extend_from_slice(&new[pos..pos + different]);
        pos += different;
        if pos == len {
            break;
        }
    }
    out
}

/// Patches `buf` in place with a delta produced by [`calc_delta`].
///
/// `buf` must hold the `old` buffer the delta was computed against; on
/// return it holds `new`.
///
/// # Panics
///
/// Panics when the delta does not describe exactly `buf.len()` bytes.
pub fn apply_delta_in_place(buf: &mut [u8], delta: &[u8]) {
    let len = buf.len();
    let mut pos = 0;
    let mut cursor = 0;
    loop {
        let (equal, used) = load_uleb(&delta[cursor..]);
        cursor += used;
        pos += equal;
        assert!(pos <= len, "delta overruns buffer of {len} bytes");
        if pos == len {
            break;
        }

        let (different, used) = load_uleb(&delta[cursor..]);
        cursor += used;
        assert!(
            pos + different <= len,
            "delta overruns buffer of {len} bytes"
        );
        buf[pos..pos + different].copy_from_slice(&delta[cursor..cursor + different]);
        cursor += different;
        pos += different;
        if pos == len {
            break;
        }
    }
    assert_eq!(cursor, delta.len(), "delta has trailing bytes");
}
