//! Escaping of delimiter sequences inside frame payloads.
//!
//! On the way out, every payload position that begins one of the special
//! sequences (escape, start, end) is prefixed with the escape sequence. On the
//! way in, an escape followed by a special sequence collapses to that
//! sequence. Both directions try the special sequences in the same order so
//! that one undoes the other.

use alloc::vec::Vec;

use crate::pattern::matches_at;

/// First special sequence found at the start of `data`
fn special_at<'s>(data: &[u8], specials: &[&'s [u8]]) -> Option<&'s [u8]> {
    specials.iter().copied().find(|s| matches_at(s, data))
}

/// Append `payload` to `out`, escaping every occurrence of a special sequence
///
/// With an empty escape sequence the payload is copied unchanged.
pub fn escape_into(out: &mut Vec<u8>, payload: &[u8], escape: &[u8], specials: &[&[u8]]) {
    if escape.is_empty() {
        out.extend_from_slice(payload);
        return;
    }

    let mut i = 0;
    while i < payload.len() {
        match special_at(&payload[i..], specials) {
            Some(special) => {
                out.extend_from_slice(escape);
                out.extend_from_slice(special);
                i += special.len();
            }
            None => {
                out.push(payload[i]);
                i += 1;
            }
        }
    }
}

/// Append `content` to `out`, collapsing escaped special sequences
///
/// An escape sequence that is not followed by a special sequence is kept as
/// is.
pub fn unescape_into(out: &mut Vec<u8>, content: &[u8], escape: &[u8], specials: &[&[u8]]) {
    if escape.is_empty() {
        out.extend_from_slice(content);
        return;
    }

    let mut i = 0;
    while i < content.len() {
        if matches_at(escape, &content[i..]) {
            if let Some(special) = special_at(&content[i + escape.len()..], specials) {
                out.extend_from_slice(special);
                i += escape.len() + special.len();
                continue;
            }
        }
        out.push(content[i]);
        i += 1;
    }
}
