//! Property table and operations
//!
//! JavaScript objects store properties in a hash table for fast lookup.
//! Entries are kept in insertion order so enumeration matches the language
//! rules; deleted entries become tombstones that are dropped the next time
//! the table is rebuilt.

use std::fmt;
use std::ops::BitOr;

use crate::gc::ObjectId;
use crate::runtime::{JSString, JSValue};
use crate::util::dtoa::number_to_string;
use crate::util::fnv1a64;

/// A property key: array index or string
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    Index(u32),
    String(JSString),
}

impl PropertyKey {
    /// Canonicalize a string key (`"3"` becomes an index)
    pub fn from_string(s: JSString) -> Self {
        match s.as_array_index() {
            Some(index) => PropertyKey::Index(index),
            None => PropertyKey::String(s),
        }
    }

    /// Key for a numeric property access
    pub fn from_number(n: f64) -> Self {
        if n >= 0.0 && n < u32::MAX as f64 && n.fract() == 0.0 {
            PropertyKey::Index(n as u32)
        } else {
            PropertyKey::String(JSString::from(number_to_string(n)))
        }
    }

    #[inline]
    pub fn as_index(&self) -> Option<u32> {
        match self {
            PropertyKey::Index(i) => Some(*i),
            PropertyKey::String(_) => None,
        }
    }

    /// Whether this is the string key `name`
    #[inline]
    pub fn is(&self, name: &str) -> bool {
        matches!(self, PropertyKey::String(s) if s.as_str() == name)
    }

    /// The key as a script-visible string
    pub fn to_js_string(&self) -> JSString {
        match self {
            PropertyKey::Index(i) => JSString::from(i.to_string()),
            PropertyKey::String(s) => s.clone(),
        }
    }

    /// Hash a property key
    #[inline]
    fn hash(&self) -> u32 {
        match self {
            PropertyKey::Index(i) => {
                // Mix bits for better distribution
                let mut h = *i;
                h ^= h >> 16;
                h = h.wrapping_mul(0x85eb_ca6b);
                h ^= h >> 13;
                h = h.wrapping_mul(0xc2b2_ae35);
                h ^= h >> 16;
                h
            }
            PropertyKey::String(s) => {
                let h = fnv1a64(s.as_bytes());
                (h ^ (h >> 32)) as u32
            }
        }
    }
}

impl From<&str> for PropertyKey {
    fn from(s: &str) -> Self {
        PropertyKey::from_string(JSString::from(s))
    }
}

impl From<JSString> for PropertyKey {
    fn from(s: JSString) -> Self {
        PropertyKey::from_string(s)
    }
}

impl From<u32> for PropertyKey {
    fn from(i: u32) -> Self {
        if i == u32::MAX {
            PropertyKey::String(JSString::from(i.to_string()))
        } else {
            PropertyKey::Index(i)
        }
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyKey::Index(i) => write!(f, "{}", i),
            PropertyKey::String(s) => f.write_str(s),
        }
    }
}

impl fmt::Debug for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyKey::Index(i) => write!(f, "{}", i),
            PropertyKey::String(s) => write!(f, "{:?}", s),
        }
    }
}

/// Property attribute bits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct PropertyFlags(u8);

impl PropertyFlags {
    pub const NONE: PropertyFlags = PropertyFlags(0);
    pub const READ_ONLY: PropertyFlags = PropertyFlags(1);
    pub const DONT_ENUM: PropertyFlags = PropertyFlags(2);
    pub const DONT_DELETE: PropertyFlags = PropertyFlags(4);

    /// Build from raw bits, ignoring unknown ones
    #[inline]
    pub const fn from_bits(bits: u8) -> Self {
        PropertyFlags(bits & 7)
    }

    #[inline]
    pub const fn bits(self) -> u8 {
        self.0
    }

    #[inline]
    pub const fn contains(self, other: PropertyFlags) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub fn is_enumerable(self) -> bool {
        !self.contains(PropertyFlags::DONT_ENUM)
    }
}

impl BitOr for PropertyFlags {
    type Output = PropertyFlags;

    fn bitor(self, rhs: PropertyFlags) -> PropertyFlags {
        PropertyFlags(self.0 | rhs.0)
    }
}

/// Accessor installed by a host template
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostAccessor {
    /// Owning object template id
    pub template: u64,
    /// Accessor slot within the template
    pub index: u32,
}

/// Property storage
#[derive(Debug, Clone)]
pub enum PropertySlot {
    Data(JSValue),
    Accessor {
        getter: Option<ObjectId>,
        setter: Option<ObjectId>,
    },
    Host(HostAccessor),
}

/// A property in an object's property table
#[derive(Debug, Clone)]
pub struct Property {
    pub slot: PropertySlot,
    pub flags: PropertyFlags,
}

impl Property {
    #[inline]
    pub fn data(value: JSValue, flags: PropertyFlags) -> Self {
        Property {
            slot: PropertySlot::Data(value),
            flags,
        }
    }
}

#[derive(Debug)]
struct Entry {
    key: PropertyKey,
    /// `None` once deleted
    property: Option<Property>,
    /// Next entry in the hash chain, 1-based (0 = end of chain)
    hash_next: u32,
}

/// Property table structure
///
/// - entries[]: properties in insertion order, including tombstones
/// - hash_table[hash_size]: 1-based indices of chain heads (0 = empty)
#[derive(Debug)]
pub struct PropertyTable {
    /// Number of live properties
    prop_count: u32,
    /// Hash table mask (size - 1)
    hash_mask: u32,
    entries: Vec<Entry>,
    hash_table: Vec<u32>,
}

impl PropertyTable {
    /// Minimum hash table size
    const MIN_HASH_SIZE: usize = 4;

    /// Maximum load factor before resize
    const MAX_LOAD_FACTOR: f64 = 0.75;

    /// Create a new empty property table
    pub fn new() -> Self {
        PropertyTable {
            prop_count: 0,
            hash_mask: (Self::MIN_HASH_SIZE - 1) as u32,
            entries: Vec::new(),
            hash_table: vec![0; Self::MIN_HASH_SIZE],
        }
    }

    /// Get the number of properties
    #[inline]
    pub fn len(&self) -> usize {
        self.prop_count as usize
    }

    /// Check if the table is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.prop_count == 0
    }

    /// Find a live property by key, returning its entry index
    fn find(&self, key: &PropertyKey) -> Option<usize> {
        if self.prop_count == 0 {
            return None;
        }
        let mut idx = self.hash_table[(key.hash() & self.hash_mask) as usize];
        while idx != 0 {
            let entry = &self.entries[(idx - 1) as usize];
            if entry.property.is_some() && entry.key == *key {
                return Some((idx - 1) as usize);
            }
            idx = entry.hash_next;
        }
        None
    }

    /// Get a property by key
    pub fn get(&self, key: &PropertyKey) -> Option<&Property> {
        self.find(key).and_then(|idx| self.entries[idx].property.as_ref())
    }

    /// Get a mutable property reference by key
    pub fn get_mut(&mut self, key: &PropertyKey) -> Option<&mut Property> {
        let idx = self.find(key)?;
        self.entries[idx].property.as_mut()
    }

    /// Check if a property exists
    #[inline]
    pub fn has(&self, key: &PropertyKey) -> bool {
        self.find(key).is_some()
    }

    /// Insert or replace a property
    ///
    /// Returns true if this was a new property. A replaced property keeps
    /// its position in enumeration order.
    pub fn insert(&mut self, key: PropertyKey, property: Property) -> bool {
        if let Some(idx) = self.find(&key) {
            self.entries[idx].property = Some(property);
            return false;
        }

        let load = (self.entries.len() + 1) as f64 / (self.hash_mask + 1) as f64;
        if load > Self::MAX_LOAD_FACTOR {
            self.rebuild();
        }

        let bucket = (key.hash() & self.hash_mask) as usize;
        self.entries.push(Entry {
            key,
            property: Some(property),
            hash_next: self.hash_table[bucket],
        });
        self.hash_table[bucket] = self.entries.len() as u32;
        self.prop_count += 1;
        true
    }

    /// Delete a property by key, returning it if it existed
    pub fn remove(&mut self, key: &PropertyKey) -> Option<Property> {
        let idx = self.find(key)?;
        self.prop_count -= 1;
        self.entries[idx].property.take()
    }

    /// Drop tombstones and resize the hash table
    fn rebuild(&mut self) {
        self.entries.retain(|e| e.property.is_some());
        let wanted = ((self.entries.len() + 1) * 2).next_power_of_two();
        let new_size = wanted.max(Self::MIN_HASH_SIZE);
        self.hash_mask = (new_size - 1) as u32;
        self.hash_table = vec![0; new_size];

        for i in 0..self.entries.len() {
            let bucket = (self.entries[i].key.hash() & self.hash_mask) as usize;
            self.entries[i].hash_next = self.hash_table[bucket];
            self.hash_table[bucket] = (i + 1) as u32;
        }
    }

    /// Iterate over live properties in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&PropertyKey, &Property)> {
        self.entries
            .iter()
            .filter_map(|e| e.property.as_ref().map(|p| (&e.key, p)))
    }

    /// Iterate over all property keys
    pub fn keys(&self) -> impl Iterator<Item = &PropertyKey> + '_ {
        self.iter().map(|(k, _)| k)
    }
}

impl Default for PropertyTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(n: f64) -> Property {
        Property::data(JSValue::Number(n), PropertyFlags::NONE)
    }

    #[test]
    fn test_property_table_basic() {
        let mut table = PropertyTable::new();
        assert!(table.is_empty());

        assert!(table.insert("x".into(), data(1.0)));
        assert!(table.insert("y".into(), data(2.0)));
        assert!(!table.insert("x".into(), data(3.0)));
        assert_eq!(table.len(), 2);

        match &table.get(&"x".into()).unwrap().slot {
            PropertySlot::Data(JSValue::Number(n)) => assert_eq!(*n, 3.0),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_insertion_order_survives_resize_and_delete() {
        let mut table = PropertyTable::new();
        for i in 0..50 {
            table.insert(PropertyKey::from(format!("k{}", i).as_str()), data(i as f64));
        }
        assert!(table.remove(&"k10".into()).is_some());
        assert!(table.remove(&"k10".into()).is_none());
        table.insert("k10".into(), data(10.0));
        for i in 50..100 {
            table.insert(PropertyKey::from(format!("k{}", i).as_str()), data(i as f64));
        }

        let keys: Vec<String> = table.keys().map(|k| k.to_string()).collect();
        assert_eq!(keys.len(), 100);
        assert_eq!(keys[0], "k0");
        assert_eq!(keys[9], "k9");
        assert_eq!(keys[10], "k11");
        assert_eq!(keys[49], "k10");
        assert!(table.has(&"k99".into()));
    }

    #[test]
    fn test_key_canonicalization() {
        assert_eq!(PropertyKey::from("7"), PropertyKey::Index(7));
        assert_eq!(PropertyKey::from_number(7.0), PropertyKey::Index(7));
        assert_eq!(
            PropertyKey::from_number(1.5),
            PropertyKey::String(JSString::from("1.5"))
        );
        assert_eq!(
            PropertyKey::from_number(-1.0),
            PropertyKey::String(JSString::from("-1"))
        );
        assert!(PropertyKey::from("length").is("length"));
    }

    #[test]
    fn test_flags() {
        let flags = PropertyFlags::READ_ONLY | PropertyFlags::DONT_ENUM;
        assert_eq!(flags.bits(), 3);
        assert!(flags.contains(PropertyFlags::READ_ONLY));
        assert!(!flags.is_enumerable());
        assert!(!flags.contains(PropertyFlags::DONT_DELETE));
        assert_eq!(PropertyFlags::from_bits(0xff).bits(), 7);
    }
}
