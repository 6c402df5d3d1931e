//! BYML binary parser.

use veles_common::{BinaryReader, Endian};

use crate::{Byml, Error, FileData, Hash32, Hash64, Map, Result};

/// On-wire node type bytes.
pub(crate) mod node_type {
    pub const HASH32: u8 = 0x20;
    pub const HASH64: u8 = 0x21;
    pub const STRING: u8 = 0xA0;
    pub const BINARY: u8 = 0xA1;
    pub const FILE: u8 = 0xA2;
    pub const ARRAY: u8 = 0xC0;
    pub const MAP: u8 = 0xC1;
    pub const STRING_TABLE: u8 = 0xC2;
    pub const PATH_ARRAY: u8 = 0xC3;
    pub const REMAPPED_MAP: u8 = 0xC4;
    pub const RELOCATED_STRING_TABLE: u8 = 0xC5;
    pub const MONO_TYPED_ARRAY: u8 = 0xC8;
    pub const BOOL: u8 = 0xD0;
    pub const INT: u8 = 0xD1;
    pub const FLOAT: u8 = 0xD2;
    pub const UINT: u8 = 0xD3;
    pub const INT64: u8 = 0xD4;
    pub const UINT64: u8 = 0xD5;
    pub const DOUBLE: u8 = 0xD6;
    pub const NULL: u8 = 0xFF;

    pub const fn is_container(t: u8) -> bool {
        matches!(t, ARRAY | MAP | HASH32 | HASH64)
    }

    pub const fn is_long(t: u8) -> bool {
        matches!(t, INT64 | UINT64 | DOUBLE)
    }

    /// Node kinds that are valid BYML but outside what this codec handles.
    pub const fn is_unsupported(t: u8) -> bool {
        matches!(t, PATH_ARRAY | REMAPPED_MAP | MONO_TYPED_ARRAY)
    }
}

const fn is_valid_version(version: u16) -> bool {
    1 <= version && version <= 10
}

/// Resolves string table entries by index.
///
/// A table is a `0xC2` node header (type byte plus 24-bit count) followed by
/// `count + 1` offsets relative to the table base, then the null-terminated
/// strings themselves. A `0xC5` header instead carries a 64-bit offset that
/// re-bases the string data.
struct StringTableParser {
    /// Base the string offsets are relative to.
    base: usize,
    /// Offset of the first entry of the offset array.
    entries: usize,
    size: u32,
}

impl StringTableParser {
    fn new(reader: &mut BinaryReader<'_>, offset: u32) -> Result<Option<Self>> {
        if offset == 0 {
            return Ok(None);
        }
        let offset = offset as usize;
        let ty = reader.read_u8_at(offset)?;
        let size = reader.read_u24()?;
        match ty {
            node_type::STRING_TABLE => Ok(Some(Self {
                base: offset,
                entries: offset + 4,
                size,
            })),
            node_type::RELOCATED_STRING_TABLE => {
                let base = reader.read_u64()?;
                let base = usize::try_from(base)
                    .ok()
                    .filter(|&b| b < reader.len())
                    .ok_or(Error::InvalidData("string table relocation out of bounds"))?;
                Ok(Some(Self {
                    base,
                    entries: offset + 12,
                    size,
                }))
            }
            _ => Err(Error::InvalidData("invalid string table")),
        }
    }

    fn get_string(&self, reader: &mut BinaryReader<'_>, index: u32) -> Result<String> {
        if index >= self.size {
            return Err(Error::InvalidData("string table index out of range"));
        }
        let rel = reader.read_u32_at(self.entries + 4 * index as usize)?;
        // Safe even for the last entry: the offset array has size + 1 elements.
        let next_rel = reader.read_u32()?;
        if next_rel < rel {
            return Err(Error::InvalidData("string table offsets are not monotonic"));
        }
        let max_len = (next_rel - rel) as usize;
        let s = reader.read_cstr_at(self.base + rel as usize, Some(max_len))?;
        Ok(s.to_string())
    }
}

pub(crate) struct Parser<'a> {
    reader: BinaryReader<'a>,
    hash_key_table: Option<StringTableParser>,
    string_table: Option<StringTableParser>,
    root_offset: u32,
}

impl<'a> Parser<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Result<Self> {
        if data.len() < 0x10 {
            return Err(Error::InvalidData("invalid header"));
        }

        let endian = match &data[0..2] {
            b"BY" => Endian::Big,
            b"YB" => Endian::Little,
            _ => return Err(Error::InvalidData("invalid magic")),
        };
        let mut reader = BinaryReader::new(data, endian);
        reader.seek(2);
        let version = reader.read_u16()?;
        if !is_valid_version(version) {
            return Err(Error::InvalidData("unexpected version"));
        }

        let hash_key_table_offset = reader.read_u32_at(0x04)?;
        let string_table_offset = reader.read_u32_at(0x08)?;
        let root_offset = reader.read_u32_at(0x0C)?;

        let hash_key_table = StringTableParser::new(&mut reader, hash_key_table_offset)?;
        let string_table = StringTableParser::new(&mut reader, string_table_offset)?;

        Ok(Self {
            reader,
            hash_key_table,
            string_table,
            root_offset,
        })
    }

    pub(crate) fn parse(mut self) -> Result<Byml> {
        if self.root_offset == 0 {
            return Ok(Byml::Null);
        }
        self.parse_container_node(self.root_offset)
    }

    fn hash_key(&mut self, index: u32) -> Result<String> {
        let table = self
            .hash_key_table
            .as_ref()
            .ok_or(Error::InvalidData("missing hash key table"))?;
        table.get_string(&mut self.reader, index)
    }

    fn string(&mut self, index: u32) -> Result<String> {
        let table = self
            .string_table
            .as_ref()
            .ok_or(Error::InvalidData("missing string table"))?;
        table.get_string(&mut self.reader, index)
    }

    /// Decode a non-container value from a 4-byte cell.
    fn parse_value_node(&mut self, cell_offset: usize, ty: u8) -> Result<Byml> {
        let raw = self.reader.read_u32_at(cell_offset)?;

        match ty {
            node_type::STRING => Ok(Byml::String(self.string(raw)?)),
            node_type::BOOL => Ok(Byml::Bool(raw != 0)),
            node_type::INT => Ok(Byml::I32(raw as i32)),
            node_type::FLOAT => Ok(Byml::Float(f32::from_bits(raw))),
            node_type::UINT => Ok(Byml::U32(raw)),
            node_type::INT64 => Ok(Byml::I64(self.read_long(raw)? as i64)),
            node_type::UINT64 => Ok(Byml::U64(self.read_long(raw)?)),
            node_type::DOUBLE => Ok(Byml::Double(f64::from_bits(self.read_long(raw)?))),
            node_type::BINARY => {
                let (data, _) = self.read_blob(raw, false)?;
                Ok(Byml::Binary(data))
            }
            node_type::FILE => {
                let (data, align) = self.read_blob(raw, true)?;
                Ok(Byml::File(FileData { data, align }))
            }
            node_type::NULL => Ok(Byml::Null),
            t if node_type::is_unsupported(t) => {
                Err(Error::Unsupported("unsupported node type"))
            }
            _ => Err(Error::InvalidData("unknown node type")),
        }
    }

    /// 64-bit payload referenced by a value cell.
    fn read_long(&mut self, offset: u32) -> Result<u64> {
        self.reader.seek(offset as usize);
        Ok(self.reader.read_u64()?)
    }

    /// `[size: u32] ([align: u32]) [bytes]` payload referenced by a value cell.
    fn read_blob(&mut self, offset: u32, with_align: bool) -> Result<(Vec<u8>, u32)> {
        self.reader.seek(offset as usize);
        let size = self.reader.read_u32()? as usize;
        let align = if with_align { self.reader.read_u32()? } else { 0 };
        let bytes = self.reader.read_bytes(size)?;
        Ok((bytes.to_vec(), align))
    }

    fn parse_container_child(&mut self, cell_offset: usize, ty: u8) -> Result<Byml> {
        if node_type::is_container(ty) {
            let offset = self.reader.read_u32_at(cell_offset)?;
            return self.parse_container_node(offset);
        }
        self.parse_value_node(cell_offset, ty)
    }

    fn parse_array_node(&mut self, offset: usize, size: u32) -> Result<Byml> {
        let size = size as usize;
        let values_offset = offset + 4 + veles_common::align_up(size, 4);
        let mut result = Vec::with_capacity(size.min(0x10000));
        for i in 0..size {
            let ty = self.reader.read_u8_at(offset + 4 + i)?;
            result.push(self.parse_container_child(values_offset + 4 * i, ty)?);
        }
        Ok(Byml::Array(result))
    }

    fn parse_map_node(&mut self, offset: usize, size: u32) -> Result<Byml> {
        let mut result = Map::new();
        for i in 0..size as usize {
            let entry_offset = offset + 4 + 8 * i;
            let key_index = self.reader.read_u24_at(entry_offset)?;
            let ty = self.reader.read_u8_at(entry_offset + 3)?;
            let key = self.hash_key(key_index)?;
            result.insert(key, self.parse_container_child(entry_offset + 4, ty)?);
        }
        Ok(Byml::Map(result))
    }

    fn parse_hash32_node(&mut self, offset: usize, size: u32) -> Result<Byml> {
        let size = size as usize;
        let types_offset = offset + 4 + 8 * size;
        let mut result = Hash32::new();
        for i in 0..size {
            let entry_offset = offset + 4 + 8 * i;
            let key = self.reader.read_u32_at(entry_offset)?;
            let ty = self.reader.read_u8_at(types_offset + i)?;
            result.insert(key, self.parse_container_child(entry_offset + 4, ty)?);
        }
        Ok(Byml::Hash32(result))
    }

    fn parse_hash64_node(&mut self, offset: usize, size: u32) -> Result<Byml> {
        let size = size as usize;
        let types_offset = offset + 4 + 12 * size;
        let mut result = Hash64::new();
        for i in 0..size {
            let entry_offset = offset + 4 + 12 * i;
            self.reader.seek(entry_offset);
            let key = self.reader.read_u64()?;
            let ty = self.reader.read_u8_at(types_offset + i)?;
            result.insert(key, self.parse_container_child(entry_offset + 8, ty)?);
        }
        Ok(Byml::Hash64(result))
    }

    fn parse_container_node(&mut self, offset: u32) -> Result<Byml> {
        let offset = offset as usize;
        let ty = self.reader.read_u8_at(offset)?;
        let size = self.reader.read_u24()?;

        match ty {
            node_type::ARRAY => self.parse_array_node(offset, size),
            node_type::MAP => self.parse_map_node(offset, size),
            node_type::HASH32 => self.parse_hash32_node(offset, size),
            node_type::HASH64 => self.parse_hash64_node(offset, size),
            t if node_type::is_unsupported(t) => {
                Err(Error::Unsupported("unsupported container node type"))
            }
            _ => Err(Error::InvalidData("container node must be an array or map")),
        }
    }
}
