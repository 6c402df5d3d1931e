//! BYML (binary YAML) document parsing and serialization.
//!
//! BYML is a tagged tree container used by first-party titles for
//! configuration and map data. A document is a tree of scalars and
//! containers backed by two interned, sorted string tables (one for
//! dictionary keys, one for string values).
//!
//! ## Layout
//! ```text
//! [0x00] Magic "BY" (big endian) or "YB" (little endian)
//! [0x02] Version                       (u16)
//! [0x04] Hash key table offset, or 0   (u32)
//! [0x08] String table offset, or 0     (u32)
//! [0x0C] Root node offset, or 0        (u32)
//! ```
//!
//! Container cells are 4 bytes. Small scalars are stored inline; containers,
//! 64-bit scalars and byte blobs are stored out-of-line behind an offset,
//! with identical payloads deduplicated.
//!
//! # Example
//!
//! ```
//! use veles_byml::Byml;
//!
//! let mut map = veles_byml::Map::new();
//! map.insert("answer".into(), Byml::I32(42));
//! let doc = Byml::Map(map);
//! let bytes = doc.to_binary(false, 2).unwrap();
//! assert_eq!(Byml::from_binary(&bytes).unwrap(), doc);
//! ```

use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

mod error;
mod parse;
mod writer;

pub use error::{Error, Result};

/// Dictionary container: string keys, emitted in sorted order.
pub type Map = BTreeMap<String, Byml>;
/// Container keyed by 32-bit values.
pub type Hash32 = BTreeMap<u32, Byml>;
/// Container keyed by 64-bit values.
pub type Hash64 = BTreeMap<u64, Byml>;

/// A byte blob with an alignment requirement.
///
/// On the wire the payload is stored so that the data (which begins 8 bytes
/// after the size/alignment prefix) lands on an `align` boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileData {
    pub data: Vec<u8>,
    pub align: u32,
}

/// A BYML document node.
///
/// Large variants hold their payloads on the heap so the enum itself stays
/// small; equality and hashing are structural. Floats compare and hash by
/// their bit pattern, which keeps payload deduplication exact and makes the
/// type usable as a hash map key.
#[derive(Debug, Clone, Default)]
pub enum Byml {
    #[default]
    Null,
    String(String),
    Binary(Vec<u8>),
    File(FileData),
    Array(Vec<Byml>),
    Map(Map),
    Hash32(Hash32),
    Hash64(Hash64),
    Bool(bool),
    I32(i32),
    Float(f32),
    U32(u32),
    I64(i64),
    U64(u64),
    Double(f64),
}

impl PartialEq for Byml {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Byml::Null, Byml::Null) => true,
            (Byml::String(a), Byml::String(b)) => a == b,
            (Byml::Binary(a), Byml::Binary(b)) => a == b,
            (Byml::File(a), Byml::File(b)) => a == b,
            (Byml::Array(a), Byml::Array(b)) => a == b,
            (Byml::Map(a), Byml::Map(b)) => a == b,
            (Byml::Hash32(a), Byml::Hash32(b)) => a == b,
            (Byml::Hash64(a), Byml::Hash64(b)) => a == b,
            (Byml::Bool(a), Byml::Bool(b)) => a == b,
            (Byml::I32(a), Byml::I32(b)) => a == b,
            (Byml::Float(a), Byml::Float(b)) => a.to_bits() == b.to_bits(),
            (Byml::U32(a), Byml::U32(b)) => a == b,
            (Byml::I64(a), Byml::I64(b)) => a == b,
            (Byml::U64(a), Byml::U64(b)) => a == b,
            (Byml::Double(a), Byml::Double(b)) => a.to_bits() == b.to_bits(),
            _ => false,
        }
    }
}

impl Eq for Byml {}

impl Hash for Byml {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Byml::Null => {}
            Byml::String(s) => s.hash(state),
            Byml::Binary(b) => b.hash(state),
            Byml::File(f) => f.hash(state),
            Byml::Array(a) => a.hash(state),
            Byml::Map(m) => m.hash(state),
            Byml::Hash32(m) => m.hash(state),
            Byml::Hash64(m) => m.hash(state),
            Byml::Bool(v) => v.hash(state),
            Byml::I32(v) => v.hash(state),
            Byml::Float(v) => v.to_bits().hash(state),
            Byml::U32(v) => v.hash(state),
            Byml::I64(v) => v.hash(state),
            Byml::U64(v) => v.hash(state),
            Byml::Double(v) => v.to_bits().hash(state),
        }
    }
}

impl Byml {
    /// Load a document from binary data.
    pub fn from_binary(data: &[u8]) -> Result<Byml> {
        parse::Parser::new(data)?.parse()
    }

    /// Serialize the document with the given endianness and format version.
    ///
    /// The root must be null or a container. Versions 1..=10 are accepted;
    /// node kinds introduced by version 4 (`Hash32`, `Hash64`, `Binary`,
    /// `File`) are rejected when targeting an older version.
    pub fn to_binary(&self, big_endian: bool, version: u16) -> Result<Vec<u8>> {
        writer::to_binary(self, big_endian, version)
    }

    /// Human-readable name of this node's kind, used in error messages.
    pub const fn type_name(&self) -> &'static str {
        match self {
            Byml::Null => "Null",
            Byml::String(_) => "String",
            Byml::Binary(_) => "Binary",
            Byml::File(_) => "File",
            Byml::Array(_) => "Array",
            Byml::Map(_) => "Map",
            Byml::Hash32(_) => "Hash32",
            Byml::Hash64(_) => "Hash64",
            Byml::Bool(_) => "Bool",
            Byml::I32(_) => "Int",
            Byml::Float(_) => "Float",
            Byml::U32(_) => "UInt",
            Byml::I64(_) => "Int64",
            Byml::U64(_) => "UInt64",
            Byml::Double(_) => "Double",
        }
    }

    /// Check if this node is null.
    #[inline]
    pub const fn is_null(&self) -> bool {
        matches!(self, Byml::Null)
    }

    /// Check if this node is a container.
    #[inline]
    pub const fn is_container(&self) -> bool {
        matches!(
            self,
            Byml::Array(_) | Byml::Map(_) | Byml::Hash32(_) | Byml::Hash64(_)
        )
    }

    fn type_error(&self, expected: &'static str) -> Error {
        Error::TypeError(format!("expected {expected}, got {}", self.type_name()))
    }

    /// Get the value as a bool.
    pub fn as_bool(&self) -> Result<bool> {
        match self {
            Byml::Bool(v) => Ok(*v),
            _ => Err(self.type_error("Bool")),
        }
    }

    /// Get the value as an i32.
    ///
    /// `UInt` values are reinterpreted bit-for-bit, mirroring the behavior of
    /// the games' own accessors.
    pub fn as_i32(&self) -> Result<i32> {
        match self {
            Byml::I32(v) => Ok(*v),
            Byml::U32(v) => Ok(*v as i32),
            _ => Err(self.type_error("Int or UInt")),
        }
    }

    /// Get the value as a u32. Negative `Int` values are rejected.
    pub fn as_u32(&self) -> Result<u32> {
        match self {
            Byml::U32(v) => Ok(*v),
            Byml::I32(v) if *v >= 0 => Ok(*v as u32),
            Byml::I32(_) => Err(Error::TypeError(
                "expected a non-negative integer value".into(),
            )),
            _ => Err(self.type_error("Int or UInt")),
        }
    }

    /// Get the value as an i64, widening 32-bit integers.
    pub fn as_i64(&self) -> Result<i64> {
        match self {
            Byml::I32(v) => Ok(*v as i64),
            Byml::U32(v) => Ok(*v as i64),
            Byml::I64(v) => Ok(*v),
            _ => Err(self.type_error("Int, UInt or Int64")),
        }
    }

    /// Get the value as a u64, widening 32-bit integers. Negative values are
    /// rejected.
    pub fn as_u64(&self) -> Result<u64> {
        match self {
            Byml::U32(v) => Ok(*v as u64),
            Byml::U64(v) => Ok(*v),
            Byml::I32(v) if *v >= 0 => Ok(*v as u64),
            Byml::I64(v) if *v >= 0 => Ok(*v as u64),
            Byml::I32(_) | Byml::I64(_) => Err(Error::TypeError(
                "expected a non-negative integer value".into(),
            )),
            _ => Err(self.type_error("Int, UInt, Int64 or UInt64")),
        }
    }

    /// Get the value as an f32. No integer coercion is performed.
    pub fn as_f32(&self) -> Result<f32> {
        match self {
            Byml::Float(v) => Ok(*v),
            _ => Err(self.type_error("Float")),
        }
    }

    /// Get the value as an f64. No integer or f32 coercion is performed.
    pub fn as_f64(&self) -> Result<f64> {
        match self {
            Byml::Double(v) => Ok(*v),
            _ => Err(self.type_error("Double")),
        }
    }

    /// Get the value as a string slice.
    pub fn as_str(&self) -> Result<&str> {
        match self {
            Byml::String(s) => Ok(s),
            _ => Err(self.type_error("String")),
        }
    }

    /// Get the value as a binary blob.
    pub fn as_binary(&self) -> Result<&[u8]> {
        match self {
            Byml::Binary(b) => Ok(b),
            _ => Err(self.type_error("Binary")),
        }
    }

    /// Get the value as an aligned file blob.
    pub fn as_file(&self) -> Result<&FileData> {
        match self {
            Byml::File(f) => Ok(f),
            _ => Err(self.type_error("File")),
        }
    }

    /// Get the value as an array.
    pub fn as_array(&self) -> Result<&[Byml]> {
        match self {
            Byml::Array(a) => Ok(a),
            _ => Err(self.type_error("Array")),
        }
    }

    /// Get the value as a dictionary.
    pub fn as_map(&self) -> Result<&Map> {
        match self {
            Byml::Map(m) => Ok(m),
            _ => Err(self.type_error("Map")),
        }
    }

    /// Get the value as a 32-bit-keyed container.
    pub fn as_hash32(&self) -> Result<&Hash32> {
        match self {
            Byml::Hash32(m) => Ok(m),
            _ => Err(self.type_error("Hash32")),
        }
    }

    /// Get the value as a 64-bit-keyed container.
    pub fn as_hash64(&self) -> Result<&Hash64> {
        match self {
            Byml::Hash64(m) => Ok(m),
            _ => Err(self.type_error("Hash64")),
        }
    }

    /// Look up an entry in a dictionary node. Returns `None` for missing keys
    /// and for non-dictionary nodes.
    pub fn get(&self, key: &str) -> Option<&Byml> {
        match self {
            Byml::Map(m) => m.get(key),
            _ => None,
        }
    }

    /// Mutable variant of [`Byml::get`].
    pub fn get_mut(&mut self, key: &str) -> Option<&mut Byml> {
        match self {
            Byml::Map(m) => m.get_mut(key),
            _ => None,
        }
    }

    /// Get the value as a mutable array.
    pub fn as_array_mut(&mut self) -> Result<&mut Vec<Byml>> {
        match self {
            Byml::Array(a) => Ok(a),
            _ => Err(self.type_error("Array")),
        }
    }

    /// Get the value as a mutable dictionary.
    pub fn as_map_mut(&mut self) -> Result<&mut Map> {
        match self {
            Byml::Map(m) => Ok(m),
            _ => Err(self.type_error("Map")),
        }
    }

    /// Get the value as a mutable 32-bit-keyed container.
    pub fn as_hash32_mut(&mut self) -> Result<&mut Hash32> {
        match self {
            Byml::Hash32(m) => Ok(m),
            _ => Err(self.type_error("Hash32")),
        }
    }

    /// Get the value as a mutable 64-bit-keyed container.
    pub fn as_hash64_mut(&mut self) -> Result<&mut Hash64> {
        match self {
            Byml::Hash64(m) => Ok(m),
            _ => Err(self.type_error("Hash64")),
        }
    }

    /// Number of children for containers, or `None` for scalars.
    pub fn len(&self) -> Option<usize> {
        match self {
            Byml::Array(a) => Some(a.len()),
            Byml::Map(m) => Some(m.len()),
            Byml::Hash32(m) => Some(m.len()),
            Byml::Hash64(m) => Some(m.len()),
            _ => None,
        }
    }
}

impl std::fmt::Display for Byml {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Byml::Null => write!(f, "null"),
            Byml::String(s) => write!(f, "{s:?}"),
            Byml::Binary(b) => write!(f, "Binary[{}]", b.len()),
            Byml::File(file) => write!(f, "File[{}, align {:#x}]", file.data.len(), file.align),
            Byml::Array(a) => write!(f, "Array[{}]", a.len()),
            Byml::Map(m) => write!(f, "Map[{}]", m.len()),
            Byml::Hash32(m) => write!(f, "Hash32[{}]", m.len()),
            Byml::Hash64(m) => write!(f, "Hash64[{}]", m.len()),
            Byml::Bool(v) => write!(f, "{v}"),
            Byml::I32(v) => write!(f, "{v}"),
            Byml::Float(v) => write!(f, "{v}"),
            Byml::U32(v) => write!(f, "{v}"),
            Byml::I64(v) => write!(f, "{v}"),
            Byml::U64(v) => write!(f, "{v}"),
            Byml::Double(v) => write!(f, "{v}"),
        }
    }
}

impl From<&str> for Byml {
    fn from(s: &str) -> Self {
        Byml::String(s.to_string())
    }
}

impl From<String> for Byml {
    fn from(s: String) -> Self {
        Byml::String(s)
    }
}

impl From<bool> for Byml {
    fn from(v: bool) -> Self {
        Byml::Bool(v)
    }
}

impl From<i32> for Byml {
    fn from(v: i32) -> Self {
        Byml::I32(v)
    }
}

impl From<u32> for Byml {
    fn from(v: u32) -> Self {
        Byml::U32(v)
    }
}

impl From<f32> for Byml {
    fn from(v: f32) -> Self {
        Byml::Float(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_getter_coercions() {
        assert_eq!(Byml::I32(-1).as_i32().unwrap(), -1);
        // UInt reinterprets bits.
        assert_eq!(Byml::U32(0xFFFF_FFFF).as_i32().unwrap(), -1);
        assert_eq!(Byml::I32(5).as_u32().unwrap(), 5);
        assert!(Byml::I32(-5).as_u32().is_err());
        assert_eq!(Byml::U32(7).as_i64().unwrap(), 7);
        assert_eq!(Byml::I32(-3).as_i64().unwrap(), -3);
        assert_eq!(Byml::I64(1 << 40).as_i64().unwrap(), 1 << 40);
        assert_eq!(Byml::U32(9).as_u64().unwrap(), 9);
        assert!(Byml::I64(-1).as_u64().is_err());
        assert_eq!(Byml::U64(u64::MAX).as_u64().unwrap(), u64::MAX);
    }

    #[test]
    fn test_no_implicit_float_conversions() {
        assert!(Byml::I32(1).as_f32().is_err());
        assert!(Byml::U32(1).as_f64().is_err());
        assert!(Byml::Float(1.0).as_f64().is_err());
        assert!(Byml::Double(1.0).as_f32().is_err());
        assert_eq!(Byml::Float(1.5).as_f32().unwrap(), 1.5);
        assert_eq!(Byml::Double(2.5).as_f64().unwrap(), 2.5);
    }

    #[test]
    fn test_long_getters_reject_wrong_kind() {
        assert!(Byml::U64(1).as_i64().is_err());
        assert!(Byml::String("1".into()).as_i32().is_err());
        assert!(Byml::Null.as_bool().is_err());
    }

    #[test]
    fn test_structural_equality_and_hash() {
        use std::collections::hash_map::DefaultHasher;
        let a = Byml::Array(vec![Byml::Float(1.0), Byml::I32(2)]);
        let b = Byml::Array(vec![Byml::Float(1.0), Byml::I32(2)]);
        assert_eq!(a, b);

        let hash = |v: &Byml| {
            let mut h = DefaultHasher::new();
            v.hash(&mut h);
            h.finish()
        };
        assert_eq!(hash(&a), hash(&b));
        assert_ne!(Byml::Float(0.0), Byml::Float(-0.0));
    }

    #[test]
    fn test_map_lookup() {
        let mut map = Map::new();
        map.insert("k".into(), Byml::Bool(true));
        let doc = Byml::Map(map);
        assert_eq!(doc.get("k"), Some(&Byml::Bool(true)));
        assert_eq!(doc.get("missing"), None);
        assert_eq!(Byml::Null.get("k"), None);
    }

    #[test]
    fn test_mutable_accessors() {
        let mut doc = Byml::Array(vec![Byml::I32(1)]);
        doc.as_array_mut().unwrap().push(Byml::I32(2));
        assert_eq!(doc.len(), Some(2));
        assert!(doc.as_map_mut().is_err());

        let mut doc = Byml::Map(Map::new());
        doc.as_map_mut()
            .unwrap()
            .insert("k".into(), Byml::U32(3));
        if let Some(v) = doc.get_mut("k") {
            *v = Byml::U32(4);
        }
        assert_eq!(doc.get("k"), Some(&Byml::U32(4)));
    }

    #[test]
    fn test_display() {
        assert_eq!(Byml::Null.to_string(), "null");
        assert_eq!(Byml::I32(-3).to_string(), "-3");
        assert_eq!(Byml::String("hi".into()).to_string(), "\"hi\"");
        assert_eq!(Byml::Array(vec![Byml::Null]).to_string(), "Array[1]");
        assert_eq!(
            Byml::File(FileData { data: vec![0; 4], align: 0x20 }).to_string(),
            "File[4, align 0x20]"
        );
    }
}
