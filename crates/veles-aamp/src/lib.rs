//! AAMP (binary parameter archive) parsing and serialization.
//!
//! A parameter archive is a tree of hash-keyed parameter lists, parameter
//! objects and typed parameters, used by first-party titles for actor and
//! engine configuration. Names are stored only as CRC-32 hashes; the
//! [`NameTable`] can recover the original strings for known hashes.
//!
//! ## Layout (version 2, little endian)
//! ```text
//! [0x00] Header (0x30 bytes)
//! [0x30] Data type string (e.g. "xml"), null-terminated, 4-byte aligned
//! [....] Parameter list headers        (0x0C bytes each)
//! [....] Parameter object headers      (0x08 bytes each)
//! [....] Parameter headers             (0x08 bytes each)
//! [....] Data section    (non-string parameter payloads, deduplicated)
//! [....] String section  (string parameter payloads, deduplicated)
//! ```
//!
//! All offsets between structures are compact: relative to the referencing
//! structure and scaled down by 4. List/object offsets are 16-bit, parameter
//! data offsets 24-bit.
//!
//! # Example
//!
//! ```
//! use veles_aamp::{Parameter, ParameterIO};
//!
//! let mut pio = ParameterIO::new("xml");
//! pio.objects
//!     .entry("TestContent".into())
//!     .or_default()
//!     .params
//!     .insert("Bool_0".into(), Parameter::Bool(true));
//! let bytes = pio.to_binary().unwrap();
//! assert_eq!(ParameterIO::from_binary(&bytes).unwrap(), pio);
//! ```

use std::hash::BuildHasherDefault;
use std::ops::{Deref, DerefMut};

use indexmap::IndexMap;
use rustc_hash::FxHasher;

mod error;
mod names;
mod parse;
mod writer;

pub use error::{Error, Result};
pub use names::{default_name_table, Name, NameTable};

type FxIndexMap<K, V> = IndexMap<K, V, BuildHasherDefault<FxHasher>>;

/// Insertion-ordered map of parameters.
pub type ParameterMap = FxIndexMap<Name, Parameter>;
/// Insertion-ordered map of parameter objects.
pub type ParameterObjectMap = FxIndexMap<Name, ParameterObject>;
/// Insertion-ordered map of parameter lists.
pub type ParameterListMap = FxIndexMap<Name, ParameterList>;

/// 2D float vector.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vector2f {
    pub x: f32,
    pub y: f32,
}

/// 3D float vector.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vector3f {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// 4D float vector.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vector4f {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub t: f32,
}

/// RGBA color.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Color4f {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

/// Quaternion.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Quatf {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
}

/// Response curve (0x80 bytes on the wire: two u32 fields and 30 floats).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Curve {
    pub a: u32,
    pub b: u32,
    pub floats: [f32; 30],
}

impl Default for Curve {
    fn default() -> Self {
        Self {
            a: 0,
            b: 0,
            floats: [0.0; 30],
        }
    }
}

/// A string with inline, fixed-size storage. Longer input is truncated.
#[derive(Clone, Copy)]
pub struct FixedString<const N: usize> {
    len: usize,
    data: [u8; N],
}

impl<const N: usize> FixedString<N> {
    /// View the stored bytes as a string slice.
    pub fn as_str(&self) -> &str {
        // The constructor only ever copies in valid UTF-8 up to a char
        // boundary.
        std::str::from_utf8(&self.data[..self.len]).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl<const N: usize> Default for FixedString<N> {
    fn default() -> Self {
        Self {
            len: 0,
            data: [0; N],
        }
    }
}

impl<const N: usize> From<&str> for FixedString<N> {
    fn from(s: &str) -> Self {
        let mut len = s.len().min(N);
        // Never cut a UTF-8 sequence in half.
        while len > 0 && !s.is_char_boundary(len) {
            len -= 1;
        }
        let mut data = [0; N];
        data[..len].copy_from_slice(&s.as_bytes()[..len]);
        Self { len, data }
    }
}

impl<const N: usize> PartialEq for FixedString<N> {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl<const N: usize> Eq for FixedString<N> {}

impl<const N: usize> std::fmt::Debug for FixedString<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FixedString<{N}>({:?})", self.as_str())
    }
}

/// On-wire parameter type byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ParameterType {
    Bool = 0,
    F32,
    Int,
    Vec2,
    Vec3,
    Vec4,
    Color,
    String32,
    String64,
    Curve1,
    Curve2,
    Curve3,
    Curve4,
    BufferInt,
    BufferF32,
    String256,
    Quat,
    U32,
    BufferU32,
    BufferBinary,
    StringRef,
}

impl ParameterType {
    pub(crate) fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => ParameterType::Bool,
            1 => ParameterType::F32,
            2 => ParameterType::Int,
            3 => ParameterType::Vec2,
            4 => ParameterType::Vec3,
            5 => ParameterType::Vec4,
            6 => ParameterType::Color,
            7 => ParameterType::String32,
            8 => ParameterType::String64,
            9 => ParameterType::Curve1,
            10 => ParameterType::Curve2,
            11 => ParameterType::Curve3,
            12 => ParameterType::Curve4,
            13 => ParameterType::BufferInt,
            14 => ParameterType::BufferF32,
            15 => ParameterType::String256,
            16 => ParameterType::Quat,
            17 => ParameterType::U32,
            18 => ParameterType::BufferU32,
            19 => ParameterType::BufferBinary,
            20 => ParameterType::StringRef,
            _ => return None,
        })
    }

    /// Whether parameters of this type store their payload in the string
    /// section.
    pub const fn is_string(self) -> bool {
        matches!(
            self,
            ParameterType::String32
                | ParameterType::String64
                | ParameterType::String256
                | ParameterType::StringRef
        )
    }

    /// Whether parameters of this type carry a length-prefixed buffer.
    pub const fn is_buffer(self) -> bool {
        matches!(
            self,
            ParameterType::BufferInt
                | ParameterType::BufferF32
                | ParameterType::BufferU32
                | ParameterType::BufferBinary
        )
    }
}

/// A typed parameter value.
///
/// Large variants are boxed so the enum stays compact; note that the name is
/// not stored here but in the owning [`ParameterMap`].
#[derive(Debug, Clone, PartialEq)]
pub enum Parameter {
    Bool(bool),
    F32(f32),
    Int(i32),
    Vec2(Vector2f),
    Vec3(Vector3f),
    Vec4(Vector4f),
    Color(Color4f),
    String32(Box<FixedString<32>>),
    String64(Box<FixedString<64>>),
    Curve1(Box<[Curve; 1]>),
    Curve2(Box<[Curve; 2]>),
    Curve3(Box<[Curve; 3]>),
    Curve4(Box<[Curve; 4]>),
    BufferInt(Vec<i32>),
    BufferF32(Vec<f32>),
    String256(Box<FixedString<256>>),
    Quat(Quatf),
    U32(u32),
    BufferU32(Vec<u32>),
    BufferBinary(Vec<u8>),
    StringRef(String),
}

impl Parameter {
    /// The on-wire type of this parameter.
    pub const fn get_type(&self) -> ParameterType {
        match self {
            Parameter::Bool(_) => ParameterType::Bool,
            Parameter::F32(_) => ParameterType::F32,
            Parameter::Int(_) => ParameterType::Int,
            Parameter::Vec2(_) => ParameterType::Vec2,
            Parameter::Vec3(_) => ParameterType::Vec3,
            Parameter::Vec4(_) => ParameterType::Vec4,
            Parameter::Color(_) => ParameterType::Color,
            Parameter::String32(_) => ParameterType::String32,
            Parameter::String64(_) => ParameterType::String64,
            Parameter::Curve1(_) => ParameterType::Curve1,
            Parameter::Curve2(_) => ParameterType::Curve2,
            Parameter::Curve3(_) => ParameterType::Curve3,
            Parameter::Curve4(_) => ParameterType::Curve4,
            Parameter::BufferInt(_) => ParameterType::BufferInt,
            Parameter::BufferF32(_) => ParameterType::BufferF32,
            Parameter::String256(_) => ParameterType::String256,
            Parameter::Quat(_) => ParameterType::Quat,
            Parameter::U32(_) => ParameterType::U32,
            Parameter::BufferU32(_) => ParameterType::BufferU32,
            Parameter::BufferBinary(_) => ParameterType::BufferBinary,
            Parameter::StringRef(_) => ParameterType::StringRef,
        }
    }

    fn type_error(&self, expected: &'static str) -> Error {
        Error::TypeError(format!(
            "expected {expected}, got {:?}",
            self.get_type()
        ))
    }

    /// Get the value as a bool.
    pub fn as_bool(&self) -> Result<bool> {
        match self {
            Parameter::Bool(v) => Ok(*v),
            _ => Err(self.type_error("Bool")),
        }
    }

    /// Get the value as an f32.
    pub fn as_f32(&self) -> Result<f32> {
        match self {
            Parameter::F32(v) => Ok(*v),
            _ => Err(self.type_error("F32")),
        }
    }

    /// Get the value as an i32.
    pub fn as_i32(&self) -> Result<i32> {
        match self {
            Parameter::Int(v) => Ok(*v),
            _ => Err(self.type_error("Int")),
        }
    }

    /// Get the value as a u32.
    pub fn as_u32(&self) -> Result<u32> {
        match self {
            Parameter::U32(v) => Ok(*v),
            _ => Err(self.type_error("U32")),
        }
    }

    /// Get the value of any string-typed parameter as a string slice.
    pub fn as_str(&self) -> Result<&str> {
        match self {
            Parameter::String32(s) => Ok(s.as_str()),
            Parameter::String64(s) => Ok(s.as_str()),
            Parameter::String256(s) => Ok(s.as_str()),
            Parameter::StringRef(s) => Ok(s),
            _ => Err(self.type_error("a string parameter")),
        }
    }

    pub(crate) fn str_value(&self) -> Option<&str> {
        self.as_str().ok()
    }
}

impl From<bool> for Parameter {
    fn from(v: bool) -> Self {
        Parameter::Bool(v)
    }
}

impl From<f32> for Parameter {
    fn from(v: f32) -> Self {
        Parameter::F32(v)
    }
}

impl From<i32> for Parameter {
    fn from(v: i32) -> Self {
        Parameter::Int(v)
    }
}

impl From<u32> for Parameter {
    fn from(v: u32) -> Self {
        Parameter::U32(v)
    }
}

impl From<&str> for Parameter {
    fn from(v: &str) -> Self {
        Parameter::StringRef(v.to_string())
    }
}

impl From<String> for Parameter {
    fn from(v: String) -> Self {
        Parameter::StringRef(v)
    }
}

impl From<Vec<i32>> for Parameter {
    fn from(v: Vec<i32>) -> Self {
        Parameter::BufferInt(v)
    }
}

impl From<Vec<f32>> for Parameter {
    fn from(v: Vec<f32>) -> Self {
        Parameter::BufferF32(v)
    }
}

impl From<Vec<u32>> for Parameter {
    fn from(v: Vec<u32>) -> Self {
        Parameter::BufferU32(v)
    }
}

impl From<Vec<u8>> for Parameter {
    fn from(v: Vec<u8>) -> Self {
        Parameter::BufferBinary(v)
    }
}

/// A parameter object: an ordered dictionary of parameters.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParameterObject {
    pub params: ParameterMap,
}

impl ParameterObject {
    /// Look up a parameter by name, hash or string.
    pub fn get(&self, name: impl Into<Name>) -> Option<&Parameter> {
        self.params.get(&name.into())
    }
}

/// A parameter list: ordered dictionaries of objects and child lists.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParameterList {
    pub objects: ParameterObjectMap,
    pub lists: ParameterListMap,
}

impl ParameterList {
    /// Look up a child object by name, hash or string.
    pub fn object(&self, name: impl Into<Name>) -> Option<&ParameterObject> {
        self.objects.get(&name.into())
    }

    /// Mutable variant of [`ParameterList::object`].
    pub fn object_mut(&mut self, name: impl Into<Name>) -> Option<&mut ParameterObject> {
        self.objects.get_mut(&name.into())
    }

    /// Look up a child list by name, hash or string.
    pub fn list(&self, name: impl Into<Name>) -> Option<&ParameterList> {
        self.lists.get(&name.into())
    }

    /// Mutable variant of [`ParameterList::list`].
    pub fn list_mut(&mut self, name: impl Into<Name>) -> Option<&mut ParameterList> {
        self.lists.get_mut(&name.into())
    }

    /// Whether the list holds no objects and no child lists.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty() && self.lists.is_empty()
    }
}

/// The root of a parameter archive.
///
/// Dereferences to its root [`ParameterList`], which always serializes under
/// the `param_root` key.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParameterIO {
    /// Data version (not the archive format version). Typically 0.
    pub version: u32,
    /// Data type identifier. Typically "xml".
    pub data_type: String,
    /// Root parameter list.
    pub param_root: ParameterList,
}

impl ParameterIO {
    /// Hash of the root list key, `param_root`.
    pub const ROOT_KEY: Name = Name::ROOT;

    /// Create an empty archive with the given data type identifier.
    pub fn new(data_type: impl Into<String>) -> Self {
        Self {
            version: 0,
            data_type: data_type.into(),
            param_root: ParameterList::default(),
        }
    }

    /// Load a parameter archive from binary data.
    pub fn from_binary(data: &[u8]) -> Result<ParameterIO> {
        parse::Parser::new(data)?.parse()
    }

    /// Serialize the archive. The output layout is deterministic.
    pub fn to_binary(&self) -> Result<Vec<u8>> {
        writer::to_binary(self)
    }
}

impl Deref for ParameterIO {
    type Target = ParameterList;

    fn deref(&self) -> &ParameterList {
        &self.param_root
    }
}

impl DerefMut for ParameterIO {
    fn deref_mut(&mut self) -> &mut ParameterList {
        &mut self.param_root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_string_truncates() {
        let s = FixedString::<4>::from("abcdef");
        assert_eq!(s.as_str(), "abcd");
        let s = FixedString::<4>::from("ab");
        assert_eq!(s.as_str(), "ab");
        // Truncation respects char boundaries.
        let s = FixedString::<4>::from("aéé");
        assert_eq!(s.as_str(), "aé");
    }

    #[test]
    fn test_parameter_type_codes() {
        assert_eq!(ParameterType::from_u8(0), Some(ParameterType::Bool));
        assert_eq!(ParameterType::from_u8(16), Some(ParameterType::Quat));
        assert_eq!(ParameterType::from_u8(20), Some(ParameterType::StringRef));
        assert_eq!(ParameterType::from_u8(21), None);
        assert!(ParameterType::String32.is_string());
        assert!(ParameterType::BufferBinary.is_buffer());
        assert!(!ParameterType::Bool.is_string());
    }

    #[test]
    fn test_parameter_getters() {
        assert_eq!(Parameter::Bool(true).as_bool().unwrap(), true);
        assert!(Parameter::Bool(true).as_f32().is_err());
        assert_eq!(
            Parameter::StringRef("abc".into()).as_str().unwrap(),
            "abc"
        );
        assert_eq!(
            Parameter::String32(Box::new("abc".into())).as_str().unwrap(),
            "abc"
        );
        assert!(Parameter::Int(1).as_str().is_err());
    }

    #[test]
    fn test_lookup_by_name_hash_or_string() {
        let mut pio = ParameterIO::new("xml");
        let mut object = ParameterObject::default();
        object.params.insert("Bool_0".into(), Parameter::Bool(true));
        pio.objects.insert("TestContent".into(), object);

        assert!(pio.object("TestContent").is_some());
        assert!(pio.object(Name::from_hash(0xD90E_664F)).is_some());
        assert!(pio
            .object("TestContent")
            .unwrap()
            .get("Bool_0")
            .is_some());
        assert!(pio.object("Missing").is_none());
    }

    #[test]
    fn test_parameter_is_compact() {
        assert!(std::mem::size_of::<Parameter>() <= 32);
    }

    #[test]
    fn test_parameter_from_impls() {
        assert_eq!(Parameter::from(true), Parameter::Bool(true));
        assert_eq!(Parameter::from(1.5f32), Parameter::F32(1.5));
        assert_eq!(Parameter::from(-2i32), Parameter::Int(-2));
        assert_eq!(Parameter::from(3u32), Parameter::U32(3));
        assert_eq!(
            Parameter::from("name"),
            Parameter::StringRef("name".into())
        );
        assert_eq!(
            Parameter::from(vec![1i32, 2]),
            Parameter::BufferInt(vec![1, 2])
        );
    }

    #[test]
    fn test_mutable_lookup() {
        let mut pio = ParameterIO::new("xml");
        let mut child = ParameterList::default();
        child
            .objects
            .insert("Obj".into(), ParameterObject::default());
        pio.lists.insert("Child".into(), child);

        pio.list_mut("Child")
            .unwrap()
            .object_mut("Obj")
            .unwrap()
            .params
            .insert("P".into(), 7i32.into());
        assert_eq!(
            pio.list("Child").unwrap().object("Obj").unwrap().get("P"),
            Some(&Parameter::Int(7))
        );
        assert!(pio.list_mut("Missing").is_none());
        assert!(!pio.param_root.is_empty());
    }
}
