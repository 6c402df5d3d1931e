//! BYML binary serialization.

use rustc_hash::FxHashMap;
use veles_common::{align_up, BinaryWriter, Endian};

use crate::parse::node_type;
use crate::{Byml, Error, Result};

const fn wire_type(node: &Byml) -> u8 {
    match node {
        Byml::Null => node_type::NULL,
        Byml::String(_) => node_type::STRING,
        Byml::Binary(_) => node_type::BINARY,
        Byml::File(_) => node_type::FILE,
        Byml::Array(_) => node_type::ARRAY,
        Byml::Map(_) => node_type::MAP,
        Byml::Hash32(_) => node_type::HASH32,
        Byml::Hash64(_) => node_type::HASH64,
        Byml::Bool(_) => node_type::BOOL,
        Byml::I32(_) => node_type::INT,
        Byml::Float(_) => node_type::FLOAT,
        Byml::U32(_) => node_type::UINT,
        Byml::I64(_) => node_type::INT64,
        Byml::U64(_) => node_type::UINT64,
        Byml::Double(_) => node_type::DOUBLE,
    }
}

const fn is_non_inline(node: &Byml) -> bool {
    matches!(
        node,
        Byml::Array(_)
            | Byml::Map(_)
            | Byml::Hash32(_)
            | Byml::Hash64(_)
            | Byml::I64(_)
            | Byml::U64(_)
            | Byml::Double(_)
            | Byml::Binary(_)
            | Byml::File(_)
    )
}

/// Interned, sorted string table under construction.
#[derive(Default)]
struct StringTableBuilder<'a> {
    map: FxHashMap<&'a str, u32>,
    sorted: Vec<&'a str>,
}

impl<'a> StringTableBuilder<'a> {
    fn add(&mut self, s: &'a str) {
        self.map.insert(s, 0);
    }

    /// Sort the collected strings and assign indices.
    fn build(&mut self) {
        self.sorted = self.map.keys().copied().collect();
        self.sorted.sort_unstable();
        for (i, s) in self.sorted.iter().enumerate() {
            *self.map.get_mut(s).unwrap() = i as u32;
        }
    }

    fn index(&self, s: &str) -> u32 {
        self.map[s]
    }

    fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

struct WriteContext<'a> {
    writer: BinaryWriter,
    version: u16,
    hash_key_table: StringTableBuilder<'a>,
    string_table: StringTableBuilder<'a>,
    /// Offsets of already-written non-inline payloads, keyed by value. This
    /// is what deduplicates identical payloads across the document.
    written_nodes: FxHashMap<&'a Byml, u32>,
}

impl<'a> WriteContext<'a> {
    fn new(root: &'a Byml, endian: Endian, version: u16) -> Result<Self> {
        let mut ctx = Self {
            writer: BinaryWriter::new(endian),
            version,
            hash_key_table: StringTableBuilder::default(),
            string_table: StringTableBuilder::default(),
            written_nodes: FxHashMap::default(),
        };
        ctx.collect(root)?;
        ctx.hash_key_table.build();
        ctx.string_table.build();
        Ok(ctx)
    }

    /// Gather both string tables and check that every node is representable
    /// at the target version.
    fn collect(&mut self, node: &'a Byml) -> Result<()> {
        if self.version < 4
            && matches!(
                node,
                Byml::Hash32(_) | Byml::Hash64(_) | Byml::Binary(_) | Byml::File(_)
            )
        {
            return Err(Error::InvalidData(
                "node kind is not representable before version 4",
            ));
        }
        match node {
            Byml::String(s) => self.string_table.add(s),
            Byml::Array(array) => {
                for value in array {
                    self.collect(value)?;
                }
            }
            Byml::Map(map) => {
                for (key, value) in map {
                    self.hash_key_table.add(key);
                    self.collect(value)?;
                }
            }
            Byml::Hash32(map) => {
                for value in map.values() {
                    self.collect(value)?;
                }
            }
            Byml::Hash64(map) => {
                for value in map.values() {
                    self.collect(value)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Write the inline 4-byte form of a value, or the 8-byte payload of a
    /// long scalar.
    fn write_value_node(&mut self, node: &Byml) -> Result<()> {
        match node {
            Byml::Null => self.writer.write_u32(0),
            Byml::String(s) => {
                let index = self.string_table.index(s);
                self.writer.write_u32(index);
            }
            Byml::Bool(v) => self.writer.write_u32(*v as u32),
            Byml::I32(v) => self.writer.write_i32(*v),
            Byml::Float(v) => self.writer.write_f32(*v),
            Byml::U32(v) => self.writer.write_u32(*v),
            Byml::I64(v) => self.writer.write_i64(*v),
            Byml::U64(v) => self.writer.write_u64(*v),
            Byml::Double(v) => self.writer.write_f64(*v),
            _ => return Err(Error::InvalidData("unexpected value node type")),
        }
        Ok(())
    }

    fn write_container_node(&mut self, node: &'a Byml) -> Result<()> {
        // Cells whose payloads are written after the container body.
        let mut non_inline_nodes: Vec<(usize, &'a Byml)> = Vec::new();

        macro_rules! write_cell {
            ($item:expr) => {{
                let item = $item;
                if is_non_inline(item) {
                    non_inline_nodes.push((self.writer.position(), item));
                    self.writer.write_u32(0);
                } else {
                    self.write_value_node(item)?;
                }
            }};
        }

        match node {
            Byml::Array(array) => {
                self.writer.write_u8(node_type::ARRAY);
                self.writer.write_u24(array.len() as u32)?;
                for item in array {
                    self.writer.write_u8(wire_type(item));
                }
                self.writer.align_up(4);
                for item in array {
                    write_cell!(item);
                }
            }
            Byml::Map(map) => {
                self.writer.write_u8(node_type::MAP);
                self.writer.write_u24(map.len() as u32)?;
                for (key, value) in map {
                    self.writer.write_u24(self.hash_key_table.index(key))?;
                    self.writer.write_u8(wire_type(value));
                    write_cell!(value);
                }
            }
            Byml::Hash32(map) => {
                self.writer.write_u8(node_type::HASH32);
                self.writer.write_u24(map.len() as u32)?;
                for (key, value) in map {
                    self.writer.write_u32(*key);
                    write_cell!(value);
                }
                for value in map.values() {
                    self.writer.write_u8(wire_type(value));
                }
                self.writer.align_up(4);
            }
            Byml::Hash64(map) => {
                self.writer.write_u8(node_type::HASH64);
                self.writer.write_u24(map.len() as u32)?;
                for (key, value) in map {
                    self.writer.write_u64(*key);
                    write_cell!(value);
                }
                for value in map.values() {
                    self.writer.write_u8(wire_type(value));
                }
                self.writer.align_up(4);
            }
            _ => return Err(Error::InvalidData("invalid container node type")),
        }

        for (cell_offset, child) in non_inline_nodes {
            if let Some(&offset) = self.written_nodes.get(child) {
                // Already written; reuse the payload.
                self.writer
                    .run_at(cell_offset, |w, _| w.write_u32(offset));
                continue;
            }

            if let Byml::File(file) = child {
                // The data begins 8 bytes into the payload and must land on
                // the requested boundary.
                if file.align > 1 {
                    let target =
                        align_up(self.writer.position() + 8, file.align as usize) - 8;
                    self.writer.seek(target);
                }
            }

            let offset = self.writer.position() as u32;
            self.writer
                .run_at(cell_offset, |w, _| w.write_u32(offset));
            self.written_nodes.insert(child, offset);

            match child {
                Byml::I64(_) | Byml::U64(_) | Byml::Double(_) => {
                    self.write_value_node(child)?;
                }
                Byml::Binary(data) => {
                    self.writer.write_u32(data.len() as u32);
                    self.writer.write_bytes(data);
                    self.writer.align_up(4);
                }
                Byml::File(file) => {
                    self.writer.write_u32(file.data.len() as u32);
                    self.writer.write_u32(file.align);
                    self.writer.write_bytes(&file.data);
                    self.writer.align_up(4);
                }
                _ => self.write_container_node(child)?,
            }
        }
        Ok(())
    }
}

/// Emit a sorted string table node: type byte, 24-bit count, `count + 1`
/// offsets relative to the node start, then the strings.
fn write_string_table(writer: &mut BinaryWriter, strings: &[&str]) -> Result<()> {
    let base = writer.position();
    writer.write_u8(node_type::STRING_TABLE);
    writer.write_u24(strings.len() as u32)?;

    let offset_table_offset = writer.position();
    writer.seek(offset_table_offset + 4 * (strings.len() + 1));

    for (i, s) in strings.iter().enumerate() {
        writer.write_offset_at_u32(offset_table_offset + 4 * i, base);
        writer.write_cstr(s);
    }
    writer.write_offset_at_u32(offset_table_offset + 4 * strings.len(), base);
    writer.align_up(4);
    Ok(())
}

pub(crate) fn to_binary(root: &Byml, big_endian: bool, version: u16) -> Result<Vec<u8>> {
    if !(1..=10).contains(&version) {
        return Err(Error::InvalidData("invalid version"));
    }
    if !root.is_null() && !root.is_container() {
        return Err(Error::InvalidData("document root must be null or a container"));
    }

    let endian = if big_endian { Endian::Big } else { Endian::Little };
    let mut ctx = WriteContext::new(root, endian, version)?;

    ctx.writer
        .write_bytes(if big_endian { b"BY" } else { b"YB" });
    ctx.writer.write_u16(version);
    ctx.writer.write_u32(0); // Hash key table offset.
    ctx.writer.write_u32(0); // String table offset.
    ctx.writer.write_u32(0); // Root node offset.

    if root.is_null() {
        return Ok(ctx.writer.finish());
    }

    if !ctx.hash_key_table.is_empty() {
        ctx.writer.write_offset_at_u32(0x04, 0);
        write_string_table(&mut ctx.writer, &ctx.hash_key_table.sorted)?;
    }
    if !ctx.string_table.is_empty() {
        ctx.writer.write_offset_at_u32(0x08, 0);
        write_string_table(&mut ctx.writer, &ctx.string_table.sorted)?;
    }

    ctx.writer.write_offset_at_u32(0x0C, 0);
    ctx.write_container_node(root)?;
    ctx.writer.align_up(4);
    ctx.writer.grow_to_cursor();
    Ok(ctx.writer.finish())
}
