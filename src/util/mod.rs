//! Utility functions
//!
//! String and hashing helpers shared by the engine and the embedding layer.
//! Engine strings are stored as UTF-8 but indexed in UTF-16 code units, which
//! is what script code observes through `length`, `charAt` and friends.

pub mod dtoa;

/// Returns true for characters ECMAScript treats as white space or line terminators
#[inline]
pub fn is_js_whitespace(c: char) -> bool {
    matches!(
        c,
        '\u{0009}' | '\u{000B}' | '\u{000C}' | ' ' | '\u{00A0}' | '\u{FEFF}' | '\n' | '\r'
            | '\u{2028}' | '\u{2029}'
    ) || (c.is_whitespace() && c as u32 > 0x7f)
}

/// Number of UTF-16 code units needed to encode `s`
#[inline]
pub fn utf16_len(s: &str) -> usize {
    if s.is_ascii() {
        s.len()
    } else {
        s.chars().map(char::len_utf16).sum()
    }
}

/// Encode a string as UTF-16 code units
pub fn to_utf16(s: &str) -> Vec<u16> {
    s.encode_utf16().collect()
}

/// Decode UTF-16 code units, replacing unpaired surrogates with U+FFFD
pub fn from_utf16_lossy(units: &[u16]) -> String {
    String::from_utf16_lossy(units)
}

/// Convert a UTF-16 index into a byte offset of `s`
///
/// Indices past the end clamp to `s.len()`. An index that falls inside a
/// surrogate pair rounds down to the start of the character.
pub fn utf16_to_byte_offset(s: &str, index: usize) -> usize {
    if s.is_ascii() {
        return index.min(s.len());
    }
    let mut units = 0;
    for (offset, c) in s.char_indices() {
        let next = units + c.len_utf16();
        if next > index {
            return offset;
        }
        units = next;
    }
    s.len()
}

/// Convert a byte offset of `s` into a UTF-16 index
pub fn byte_to_utf16_offset(s: &str, offset: usize) -> usize {
    if s.is_ascii() {
        return offset.min(s.len());
    }
    utf16_len(&s[..offset.min(s.len())])
}

/// FNV-1a hash, stable across builds
///
/// Used to tie serialized script data to the exact source it was produced
/// from.
pub fn fnv1a64(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    let mut hash = OFFSET;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf16_len() {
        assert_eq!(utf16_len("hello"), 5);
        assert_eq!(utf16_len("中文"), 2);
        assert_eq!(utf16_len("a😀"), 3);
    }

    #[test]
    fn test_offsets() {
        let s = "a😀b";
        assert_eq!(utf16_to_byte_offset(s, 0), 0);
        assert_eq!(utf16_to_byte_offset(s, 1), 1);
        assert_eq!(utf16_to_byte_offset(s, 3), 5);
        assert_eq!(utf16_to_byte_offset(s, 99), s.len());
        assert_eq!(byte_to_utf16_offset(s, 5), 3);
    }

    #[test]
    fn test_whitespace() {
        assert!(is_js_whitespace(' '));
        assert!(is_js_whitespace('\u{00A0}'));
        assert!(is_js_whitespace('\u{2028}'));
        assert!(!is_js_whitespace('a'));
    }

    #[test]
    fn test_fnv_is_stable() {
        assert_eq!(fnv1a64(b""), 0xcbf2_9ce4_8422_2325);
        assert_ne!(fnv1a64(b"a"), fnv1a64(b"b"));
    }
}
