//! Byte-sequence search used by the frame assembler.
//!
//! Searches run over a snapshot of the receive ring and are bounded by a
//! maximum number of matches so that a single `run()` call has a known worst
//! case, whatever the line throws at it.

use heapless::Vec as BoundedVec;

/// Upper bound on delimiter matches recorded in one scan
pub const MAX_SCAN_DEPTH: usize = 16;

/// Offsets of delimiter matches found in one scan
pub type Matches = BoundedVec<usize, MAX_SCAN_DEPTH>;

/// Check whether `data` starts with `pattern`
///
/// An empty pattern never matches.
#[inline]
pub fn matches_at(pattern: &[u8], data: &[u8]) -> bool {
    !pattern.is_empty() && data.len() >= pattern.len() && data[..pattern.len()] == *pattern
}

/// Record the offsets of non-overlapping occurrences of `pattern` in `data`
///
/// The scan goes left to right and resumes after the end of each match. It
/// stops once `max_depth` offsets are recorded (0 means no limit) or `out` is
/// full. Returns `true` when it stopped before reaching the end of `data`.
pub fn find_matches<E: Extend<usize>>(
    pattern: &[u8],
    data: &[u8],
    max_depth: usize,
    out: &mut E,
) -> bool {
    if pattern.is_empty() {
        return false;
    }

    let mut found = 0;
    let mut offset = 0;
    while offset + pattern.len() <= data.len() {
        if max_depth != 0 && found == max_depth {
            return true;
        }
        if matches_at(pattern, &data[offset..]) {
            out.extend(core::iter::once(offset));
            found += 1;
            offset += pattern.len();
        } else {
            offset += 1;
        }
    }
    false
}

/// Record the offsets of non-escaped occurrences of a delimiter
///
/// Escaped occurrences are skipped and do not count towards `max_depth`
/// (clamped to [`MAX_SCAN_DEPTH`], 0 meaning the clamp). The returned flag is
/// `true` when at least one more delimiter follows the last recorded one.
pub fn find_delimiters(
    pattern: &[u8],
    data: &[u8],
    max_depth: usize,
    escapes: &[usize],
    escape_len: usize,
) -> (Matches, bool) {
    let depth = match max_depth {
        0 => MAX_SCAN_DEPTH,
        depth => depth.min(MAX_SCAN_DEPTH),
    };
    let mut out = Matches::new();
    if pattern.is_empty() {
        return (out, false);
    }

    let mut offset = 0;
    while offset + pattern.len() <= data.len() {
        if !matches_at(pattern, &data[offset..]) {
            offset += 1;
            continue;
        }
        if !is_escaped(offset, escapes, escape_len) {
            if out.len() == depth {
                return (out, true);
            }
            // cannot fail, depth <= MAX_SCAN_DEPTH
            let _ = out.push(offset);
        }
        offset += pattern.len();
    }
    (out, false)
}

/// Check whether an escape occurrence ends exactly at `offset`
///
/// `escapes` must be sorted.
#[inline]
pub fn is_escaped(offset: usize, escapes: &[usize], escape_len: usize) -> bool {
    escape_len != 0
        && offset
            .checked_sub(escape_len)
            .is_some_and(|start| escapes.binary_search(&start).is_ok())
}

/// Keep only escape occurrences that are not themselves escaped
///
/// In `\\\\[` the second escape is a literal, so it must not turn the `[`
/// into a literal as well. `escapes` must be sorted.
pub fn effective_escapes(escapes: &mut alloc::vec::Vec<usize>, escape_len: usize) {
    let mut last_kept: Option<usize> = None;
    escapes.retain(|&offset| {
        let escaped = last_kept.is_some_and(|kept| kept + escape_len == offset);
        if escaped {
            // the escaped occurrence is a literal; the next one may escape again
            last_kept = None;
            false
        } else {
            last_kept = Some(offset);
            true
        }
    });
}

/// Remove offsets directly preceded by an escape sequence
///
/// An offset is escaped when an escape occurrence ends exactly where it
/// starts, i.e. `offset == escape + escape_len`. Both lists must be sorted.
pub fn exclude_escaped(offsets: &mut Matches, escapes: &[usize], escape_len: usize) {
    if escapes.is_empty() || escape_len == 0 {
        return;
    }
    offsets.retain(|&offset| !is_escaped(offset, escapes, escape_len));
}
