//! JavaScript Array implementation
//!
//! Arrays use "no-hole" semantics: every element from index 0 to length-1
//! is defined. Elisions and writes past the end fill the gap with
//! `undefined`, and a write too far past the end is rejected instead of
//! allocating a huge dense buffer.

use crate::runtime::JSValue;

/// Maximum array length (2^30 - 1)
pub const MAX_ARRAY_LENGTH: u32 = (1 << 30) - 1;

/// Largest gap a single write may open past the current end
pub const MAX_ARRAY_GROWTH: u32 = 1 << 24;

/// JavaScript Array
#[derive(Debug, Clone, Default)]
pub struct JSArray {
    elements: Vec<JSValue>,
}

impl JSArray {
    /// Create a new empty array
    pub fn new() -> Self {
        JSArray { elements: Vec::new() }
    }

    /// Create an array with specified length, filled with undefined
    ///
    /// Returns `None` if the length cannot be represented.
    pub fn with_length(length: u32) -> Option<Self> {
        if length > MAX_ARRAY_LENGTH || length > MAX_ARRAY_GROWTH {
            return None;
        }
        Some(JSArray {
            elements: vec![JSValue::Undefined; length as usize],
        })
    }

    /// Create an array from a vector of values
    pub fn from_values(values: Vec<JSValue>) -> Self {
        JSArray { elements: values }
    }

    /// Get the array length
    #[inline]
    pub fn len(&self) -> u32 {
        self.elements.len() as u32
    }

    /// Check if the array is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Get an element at the specified index
    #[inline]
    pub fn get(&self, index: u32) -> Option<&JSValue> {
        self.elements.get(index as usize)
    }

    /// Set an element at the specified index
    ///
    /// If index >= length, the array is extended with undefined values.
    /// Returns false if the write would exceed the length limits.
    pub fn set(&mut self, index: u32, value: JSValue) -> bool {
        let len = self.len();
        if index >= MAX_ARRAY_LENGTH || index > len.saturating_add(MAX_ARRAY_GROWTH) {
            return false;
        }
        if index >= len {
            self.elements.resize(index as usize, JSValue::Undefined);
            self.elements.push(value);
        } else {
            self.elements[index as usize] = value;
        }
        true
    }

    /// Push a value onto the end of the array
    #[inline]
    pub fn push(&mut self, value: JSValue) -> bool {
        if self.len() >= MAX_ARRAY_LENGTH {
            return false;
        }
        self.elements.push(value);
        true
    }

    /// Pop a value from the end of the array
    #[inline]
    pub fn pop(&mut self) -> Option<JSValue> {
        self.elements.pop()
    }

    /// Remove the first element
    pub fn shift(&mut self) -> Option<JSValue> {
        if self.elements.is_empty() {
            return None;
        }
        Some(self.elements.remove(0))
    }

    /// Insert values at the beginning of the array
    pub fn unshift(&mut self, values: &[JSValue]) -> bool {
        if self.elements.len() + values.len() > MAX_ARRAY_LENGTH as usize {
            return false;
        }
        self.elements.splice(0..0, values.iter().cloned());
        true
    }

    /// Set the length of the array
    ///
    /// Extends with undefined or truncates.
    pub fn set_length(&mut self, length: u32) -> bool {
        let len = self.len();
        if length > MAX_ARRAY_LENGTH || length > len.saturating_add(MAX_ARRAY_GROWTH) {
            return false;
        }
        self.elements.resize(length as usize, JSValue::Undefined);
        true
    }

    /// Remove `delete_count` elements at `start` and insert `items` there
    ///
    /// `start` and `delete_count` must already be clamped to the length.
    /// Returns the removed elements.
    pub fn splice(&mut self, start: usize, delete_count: usize, items: Vec<JSValue>) -> Vec<JSValue> {
        let end = (start + delete_count).min(self.elements.len());
        self.elements.splice(start..end, items).collect()
    }

    /// Reverse the array in place
    pub fn reverse(&mut self) {
        self.elements.reverse();
    }

    /// Borrow the elements
    #[inline]
    pub fn as_slice(&self) -> &[JSValue] {
        &self.elements
    }

    /// Take the elements out, leaving the array empty
    pub fn take(&mut self) -> Vec<JSValue> {
        std::mem::take(&mut self.elements)
    }

    /// Get an iterator over the elements
    pub fn iter(&self) -> impl Iterator<Item = &JSValue> + '_ {
        self.elements.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new() {
        let arr = JSArray::new();
        assert!(arr.is_empty());
        assert_eq!(arr.len(), 0);
    }

    #[test]
    fn test_with_length() {
        let arr = JSArray::with_length(5).unwrap();
        assert_eq!(arr.len(), 5);
        assert!(arr.get(0).unwrap().is_undefined());
        assert!(JSArray::with_length(MAX_ARRAY_LENGTH + 1).is_none());
    }

    #[test]
    fn test_set_fills_gap() {
        let mut arr = JSArray::new();
        assert!(arr.set(3, JSValue::Number(1.0)));
        assert_eq!(arr.len(), 4);
        assert!(arr.get(1).unwrap().is_undefined());
        assert!(!arr.set(MAX_ARRAY_GROWTH + 10, JSValue::Null));
        assert_eq!(arr.len(), 4);
    }

    #[test]
    fn test_push_pop_shift_unshift() {
        let mut arr = JSArray::new();
        arr.push(JSValue::Number(1.0));
        arr.push(JSValue::Number(2.0));
        arr.unshift(&[JSValue::Number(0.0)]);
        assert_eq!(arr.len(), 3);
        assert_eq!(arr.shift().and_then(|v| v.as_number()), Some(0.0));
        assert_eq!(arr.pop().and_then(|v| v.as_number()), Some(2.0));
        assert_eq!(arr.len(), 1);
    }

    #[test]
    fn test_splice() {
        let mut arr = JSArray::from_values((0..5).map(|i| JSValue::Number(i as f64)).collect());
        let removed = arr.splice(1, 2, vec![JSValue::Null]);
        assert_eq!(removed.len(), 2);
        assert_eq!(arr.len(), 4);
        assert!(arr.get(1).unwrap().is_null());
        assert_eq!(arr.get(2).and_then(|v| v.as_number()), Some(3.0));
    }

    #[test]
    fn test_set_length() {
        let mut arr = JSArray::from_values(vec![JSValue::Null; 4]);
        assert!(arr.set_length(2));
        assert_eq!(arr.len(), 2);
        assert!(arr.set_length(6));
        assert!(arr.get(5).unwrap().is_undefined());
    }
}
