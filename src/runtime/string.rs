//! JavaScript string representation
//!
//! Strings are immutable, reference counted and stored as UTF-8. Script code
//! sees UTF-16 code units, so the index-based operations here convert on the
//! fly, with an ASCII fast path where byte and unit offsets coincide.

use std::borrow::Borrow;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::util::{self, utf16_len};

/// JavaScript string
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JSString(Arc<str>);

impl JSString {
    /// Create a string from a `&str`
    #[inline]
    pub fn new(s: &str) -> Self {
        JSString(Arc::from(s))
    }

    /// Get the UTF-8 contents
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Length in UTF-16 code units, as reported by `length`
    #[inline]
    pub fn len_utf16(&self) -> usize {
        utf16_len(&self.0)
    }

    /// Code unit at a UTF-16 index
    pub fn char_code_at(&self, index: usize) -> Option<u16> {
        if self.0.is_ascii() {
            return self.0.as_bytes().get(index).map(|b| *b as u16);
        }
        self.0.encode_utf16().nth(index)
    }

    /// Substring between two UTF-16 indices (clamped, `start <= end`)
    pub fn substring(&self, start: usize, end: usize) -> JSString {
        let len = self.len_utf16();
        let end = end.min(len);
        let start = start.min(end);
        if self.0.is_ascii() {
            return JSString::new(&self.0[start..end]);
        }
        let units: Vec<u16> = self.0.encode_utf16().skip(start).take(end - start).collect();
        JSString::from(util::from_utf16_lossy(&units))
    }

    /// Find `needle` at or after UTF-16 index `from`
    pub fn index_of(&self, needle: &str, from: usize) -> Option<usize> {
        let start = util::utf16_to_byte_offset(&self.0, from);
        let found = self.0[start..].find(needle)?;
        Some(util::byte_to_utf16_offset(&self.0, start + found))
    }

    /// Find the last `needle` that starts at or before UTF-16 index `from`
    pub fn last_index_of(&self, needle: &str, from: usize) -> Option<usize> {
        let limit = util::utf16_to_byte_offset(&self.0, from);
        let end = (limit + needle.len()).min(self.0.len());
        let end = (0..=end).rev().find(|i| self.0.is_char_boundary(*i)).unwrap_or(0);
        let found = self.0[..end].rfind(needle)?;
        Some(util::byte_to_utf16_offset(&self.0, found))
    }

    /// Concatenate two strings
    pub fn concat(&self, other: &JSString) -> JSString {
        if other.0.is_empty() {
            return self.clone();
        }
        if self.0.is_empty() {
            return other.clone();
        }
        let mut s = String::with_capacity(self.0.len() + other.0.len());
        s.push_str(&self.0);
        s.push_str(&other.0);
        JSString::from(s)
    }

    /// Interpret the string as an array index (`"0"` .. `"4294967294"`)
    ///
    /// Only canonical spellings qualify: `"01"` and `"1.0"` are plain names.
    pub fn as_array_index(&self) -> Option<u32> {
        let s = self.as_str();
        if s.is_empty() || s.len() > 10 || (s.len() > 1 && s.starts_with('0')) {
            return None;
        }
        if !s.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let n: u64 = s.parse().ok()?;
        (n < u32::MAX as u64).then_some(n as u32)
    }
}

impl Deref for JSString {
    type Target = str;

    #[inline]
    fn deref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for JSString {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for JSString {
    fn from(s: &str) -> Self {
        JSString::new(s)
    }
}

impl From<String> for JSString {
    fn from(s: String) -> Self {
        JSString(Arc::from(s))
    }
}

impl fmt::Display for JSString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for JSString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf16_indexing() {
        let s = JSString::new("a😀中");
        assert_eq!(s.len_utf16(), 4);
        assert_eq!(s.char_code_at(0), Some(b'a' as u16));
        assert_eq!(s.char_code_at(1), Some(0xD83D));
        assert_eq!(s.substring(3, 4).as_str(), "中");
        assert_eq!(s.substring(1, 3).as_str(), "😀");
    }

    #[test]
    fn test_index_of() {
        let s = JSString::new("中文字段中文");
        assert_eq!(s.index_of("文", 0), Some(1));
        assert_eq!(s.index_of("文", 2), Some(5));
        assert_eq!(s.last_index_of("中", 6), Some(4));
        assert_eq!(s.index_of("x", 0), None);
    }

    #[test]
    fn test_array_index() {
        assert_eq!(JSString::new("0").as_array_index(), Some(0));
        assert_eq!(JSString::new("42").as_array_index(), Some(42));
        assert_eq!(JSString::new("01").as_array_index(), None);
        assert_eq!(JSString::new("4294967295").as_array_index(), None);
        assert_eq!(JSString::new("-1").as_array_index(), None);
    }

    #[test]
    fn test_concat() {
        let a = JSString::new("Hello ");
        let b = JSString::new("World!");
        assert_eq!(a.concat(&b).as_str(), "Hello World!");
    }
}
