//! AAMP binary serialization.
//!
//! The output layout is deterministic and matches the layout produced by the
//! original tooling, including its parameter data ordering quirks; some
//! titles hash their archives, so byte-level stability matters.

use rustc_hash::FxHashMap;
use veles_common::{BinaryWriter, Endian, U24Le};
use zerocopy::IntoBytes;

use crate::parse::{
    ResHeader, ResParameter, ResParameterList, ResParameterObj, FLAG_LITTLE_ENDIAN, FLAG_UTF8,
    HEADER_SIZE, RES_LIST_LISTS_OFFSET, RES_LIST_OBJECTS_OFFSET, RES_OBJ_PARAMS_OFFSET,
    RES_PARAMETER_DATA_OFFSET,
};
use crate::{Error, Name, Parameter, ParameterIO, ParameterList, ParameterObject, Result};

/// Maximum distance a 24-bit, 4-scaled data offset can express.
const MAX_DATA_DISTANCE: usize = (1 << 24) * 4;

/// Stable address of a structure inside the borrowed parameter tree, used to
/// find its header offset again across the separate emission passes.
#[inline]
fn addr<T>(value: &T) -> usize {
    value as *const T as *const () as usize
}

struct WriteContext<'a> {
    writer: BinaryWriter,
    num_lists: u32,
    num_objects: u32,
    num_parameters: u32,
    /// Parameters whose payloads go to the data section, in emission order.
    parameters_to_write: Vec<&'a Parameter>,
    /// Parameters whose payloads go to the string section, in emission order.
    string_parameters_to_write: Vec<&'a Parameter>,
    /// Where each list/object/parameter header was written.
    offsets: FxHashMap<usize, usize>,
    string_offsets: FxHashMap<&'a str, usize>,
}

impl<'a> WriteContext<'a> {
    fn new() -> Self {
        Self {
            writer: BinaryWriter::new(Endian::Little),
            num_lists: 0,
            num_objects: 0,
            num_parameters: 0,
            parameters_to_write: Vec::new(),
            string_parameters_to_write: Vec::new(),
            offsets: FxHashMap::default(),
            string_offsets: FxHashMap::default(),
        }
    }

    fn write_lists(&mut self, pio: &'a ParameterIO) -> Result<()> {
        self.write_list_header(Name::ROOT, &pio.param_root)?;
        self.write_child_lists(&pio.param_root)
    }

    fn write_child_lists(&mut self, list: &'a ParameterList) -> Result<()> {
        self.patch_parent_offset(addr(list), RES_LIST_LISTS_OFFSET)?;
        for (name, child) in &list.lists {
            self.write_list_header(*name, child)?;
        }
        for child in list.lists.values() {
            self.write_child_lists(child)?;
        }
        Ok(())
    }

    fn write_objects(&mut self, list: &'a ParameterList) -> Result<()> {
        // DFS over the parameter tree; objects are handled before lists.
        self.patch_parent_offset(addr(list), RES_LIST_OBJECTS_OFFSET)?;
        for (name, object) in &list.objects {
            self.write_object_header(*name, object)?;
        }
        for child in list.lists.values() {
            self.write_objects(child)?;
        }
        Ok(())
    }

    fn write_parameters(&mut self, list: &'a ParameterList) -> Result<()> {
        // DFS over the parameter tree; objects are handled after lists.
        for child in list.lists.values() {
            self.write_parameters(child)?;
        }
        for object in list.objects.values() {
            self.patch_parent_offset(addr(object), RES_OBJ_PARAMS_OFFSET)?;
            for (name, param) in &object.params {
                self.write_parameter_header(*name, param)?;
            }
        }
        Ok(())
    }

    /// Queue every parameter in the order its payload is serialized.
    ///
    /// The order used by the original tooling is not document order: the root
    /// list's first seven objects are processed up front, then recursion into
    /// child lists interleaves one parent object before every even-indexed
    /// child list, and any remaining objects follow. Archives whose root
    /// object map starts with `DemoAIActionIdx` (AIProgram documents) skip
    /// the up-front processing entirely.
    fn collect_parameters(&mut self, list: &'a ParameterList, process_top_objects_first: bool) {
        let objects: Vec<&'a ParameterObject> = list.objects.values().collect();
        let mut next_object = 0;

        let is_aiprog = list
            .objects
            .keys()
            .next()
            .is_some_and(|&name| name == Name::from("DemoAIActionIdx"));

        let mut process_one =
            |next_object: &mut usize, ctx: &mut Self| {
                for param in objects[*next_object].params.values() {
                    if param.get_type().is_string() {
                        ctx.string_parameters_to_write.push(param);
                    } else {
                        ctx.parameters_to_write.push(param);
                    }
                }
                *next_object += 1;
            };

        if process_top_objects_first && !is_aiprog {
            for _ in 0..7 {
                if next_object < objects.len() {
                    process_one(&mut next_object, self);
                }
            }
        }

        for (i, child) in list.lists.values().enumerate() {
            if !is_aiprog && i % 2 == 0 && next_object < objects.len() {
                process_one(&mut next_object, self);
            }
            self.collect_parameters(child, false);
        }

        while next_object < objects.len() {
            process_one(&mut next_object, self);
        }
    }

    fn write_data_section(&mut self) -> Result<()> {
        let lookup_start = self.writer.position();
        let params = std::mem::take(&mut self.parameters_to_write);
        for param in &params {
            self.write_parameter_data(param, lookup_start)?;
        }
        self.writer.align_up(4);
        Ok(())
    }

    fn write_string_section(&mut self) -> Result<()> {
        let params = std::mem::take(&mut self.string_parameters_to_write);
        for param in params {
            self.write_string(param)?;
        }
        self.writer.align_up(4);
        Ok(())
    }

    fn write_parameter_data(&mut self, param: &Parameter, lookup_start: usize) -> Result<()> {
        // Serialize to a scratch buffer first so existing identical data can
        // be reused.
        let mut scratch = BinaryWriter::new(Endian::Little);
        write_payload(&mut scratch, param);
        let blob = scratch.finish();

        let parent_offset = self.offsets[&addr(param)];
        let prefix = if param.get_type().is_buffer() { 4 } else { 0 };

        // Scan the data section on 4-byte boundaries for an identical run,
        // within the window the 24-bit scaled offset can reach.
        let mut data_offset = self.writer.position() + prefix;
        let mut found = false;
        let mut offset = lookup_start;
        while offset + blob.len() <= self.writer.len()
            && offset + prefix - parent_offset < MAX_DATA_DISTANCE
        {
            if &self.writer.buffer()[offset..offset + blob.len()] == blob.as_slice() {
                data_offset = offset + prefix;
                found = true;
                break;
            }
            offset += 4;
        }

        self.patch_data_offset(parent_offset, data_offset)?;

        if !found {
            self.writer.write_bytes(&blob);
            self.writer.align_up(4);
        }
        Ok(())
    }

    fn write_string(&mut self, param: &'a Parameter) -> Result<()> {
        let parent_offset = self.offsets[&addr(param)];
        let string = param
            .str_value()
            .ok_or(Error::InvalidData("string section received a non-string"))?;

        let data_offset = match self.string_offsets.get(string) {
            Some(&offset) => offset,
            None => {
                let offset = self.writer.position();
                self.string_offsets.insert(string, offset);
                self.writer.write_cstr(string);
                self.writer.align_up(4);
                offset
            }
        };
        self.patch_data_offset(parent_offset, data_offset)
    }

    fn write_list_header(&mut self, name: Name, list: &'a ParameterList) -> Result<()> {
        self.offsets.insert(addr(list), self.writer.position());
        self.num_lists += 1;
        let res = ResParameterList {
            name_crc32: name.hash().into(),
            lists_rel_offset: 0.into(),
            num_lists: count_u16(list.lists.len(), "too many child lists")?.into(),
            objects_rel_offset: 0.into(),
            num_objects: count_u16(list.objects.len(), "too many objects")?.into(),
        };
        self.writer.write_bytes(res.as_bytes());
        Ok(())
    }

    fn write_object_header(&mut self, name: Name, object: &'a ParameterObject) -> Result<()> {
        self.offsets.insert(addr(object), self.writer.position());
        self.num_objects += 1;
        let res = ResParameterObj {
            name_crc32: name.hash().into(),
            params_rel_offset: 0.into(),
            num_params: count_u16(object.params.len(), "too many parameters")?.into(),
        };
        self.writer.write_bytes(res.as_bytes());
        Ok(())
    }

    fn write_parameter_header(&mut self, name: Name, param: &'a Parameter) -> Result<()> {
        self.offsets.insert(addr(param), self.writer.position());
        self.num_parameters += 1;
        let res = ResParameter {
            name_crc32: name.hash().into(),
            data_rel_offset: U24Le::new(0),
            type_: param.get_type() as u8,
        };
        self.writer.write_bytes(res.as_bytes());
        Ok(())
    }

    /// Patch a 16-bit compact offset in `parent`'s header with the current
    /// position.
    fn patch_parent_offset(&mut self, parent: usize, field_offset: usize) -> Result<()> {
        let parent_offset = self.offsets[&parent];
        self.writer
            .write_scaled_offset_at_u16(parent_offset + field_offset, parent_offset, 4)?;
        Ok(())
    }

    /// Patch the 24-bit compact data offset in a parameter header.
    fn patch_data_offset(&mut self, parent_offset: usize, data_offset: usize) -> Result<()> {
        let distance = data_offset - parent_offset;
        if distance % 4 != 0 || distance >= MAX_DATA_DISTANCE {
            return Err(Error::InvalidData("parameter data offset is not representable"));
        }
        self.writer
            .run_at(parent_offset + RES_PARAMETER_DATA_OFFSET, |w, _| {
                w.write_bytes(U24Le::new((distance / 4) as u32).as_bytes());
            });
        Ok(())
    }
}

fn count_u16(len: usize, message: &'static str) -> Result<u16> {
    u16::try_from(len).map_err(|_| Error::InvalidData(message))
}

/// Serialize a non-string parameter payload.
fn write_payload(writer: &mut BinaryWriter, param: &Parameter) {
    fn write_buffer<T: Copy>(
        writer: &mut BinaryWriter,
        items: &[T],
        mut write: impl FnMut(&mut BinaryWriter, T),
    ) {
        writer.write_u32(items.len() as u32);
        for &item in items {
            write(writer, item);
        }
    }

    fn write_curves(writer: &mut BinaryWriter, curves: &[crate::Curve]) {
        for curve in curves {
            writer.write_u32(curve.a);
            writer.write_u32(curve.b);
            for f in curve.floats {
                writer.write_f32(f);
            }
        }
    }

    match param {
        Parameter::Bool(v) => writer.write_u32(*v as u32),
        Parameter::F32(v) => writer.write_f32(*v),
        Parameter::Int(v) => writer.write_i32(*v),
        Parameter::U32(v) => writer.write_u32(*v),
        Parameter::Vec2(v) => {
            writer.write_f32(v.x);
            writer.write_f32(v.y);
        }
        Parameter::Vec3(v) => {
            writer.write_f32(v.x);
            writer.write_f32(v.y);
            writer.write_f32(v.z);
        }
        Parameter::Vec4(v) => {
            writer.write_f32(v.x);
            writer.write_f32(v.y);
            writer.write_f32(v.z);
            writer.write_f32(v.t);
        }
        Parameter::Color(v) => {
            writer.write_f32(v.r);
            writer.write_f32(v.g);
            writer.write_f32(v.b);
            writer.write_f32(v.a);
        }
        Parameter::Quat(v) => {
            writer.write_f32(v.a);
            writer.write_f32(v.b);
            writer.write_f32(v.c);
            writer.write_f32(v.d);
        }
        Parameter::Curve1(c) => write_curves(writer, c.as_slice()),
        Parameter::Curve2(c) => write_curves(writer, c.as_slice()),
        Parameter::Curve3(c) => write_curves(writer, c.as_slice()),
        Parameter::Curve4(c) => write_curves(writer, c.as_slice()),
        Parameter::BufferInt(v) => write_buffer(writer, v, |w, x| w.write_i32(x)),
        Parameter::BufferF32(v) => write_buffer(writer, v, |w, x| w.write_f32(x)),
        Parameter::BufferU32(v) => write_buffer(writer, v, |w, x| w.write_u32(x)),
        Parameter::BufferBinary(v) => write_buffer(writer, v, |w, x| w.write_u8(x)),
        Parameter::String32(_)
        | Parameter::String64(_)
        | Parameter::String256(_)
        | Parameter::StringRef(_) => {
            unreachable!("string parameters are serialized into the string section")
        }
    }
}

pub(crate) fn to_binary(pio: &ParameterIO) -> Result<Vec<u8>> {
    let mut ctx = WriteContext::new();
    ctx.writer.seek(HEADER_SIZE);
    ctx.writer.write_cstr(&pio.data_type);
    ctx.writer.align_up(4);
    let offset_to_pio = ctx.writer.position();

    ctx.write_lists(pio)?;
    ctx.write_objects(&pio.param_root)?;
    ctx.collect_parameters(&pio.param_root, true);
    ctx.write_parameters(&pio.param_root)?;

    let data_section_begin = ctx.writer.position();
    ctx.write_data_section()?;

    let string_section_begin = ctx.writer.position();
    ctx.write_string_section()?;

    let unk_section_begin = ctx.writer.position();
    ctx.writer.align_up(4);
    ctx.writer.grow_to_cursor();
    let file_size = ctx.writer.position();

    let header = ResHeader {
        magic: *b"AAMP",
        version: 2.into(),
        flags: (FLAG_LITTLE_ENDIAN | FLAG_UTF8).into(),
        file_size: (file_size as u32).into(),
        pio_version: pio.version.into(),
        offset_to_pio: ((offset_to_pio - HEADER_SIZE) as u32).into(),
        num_lists: ctx.num_lists.into(),
        num_objects: ctx.num_objects.into(),
        num_parameters: ctx.num_parameters.into(),
        data_section_size: ((string_section_begin - data_section_begin) as u32).into(),
        string_section_size: ((unk_section_begin - string_section_begin) as u32).into(),
        unk_section_size: 0.into(),
    };
    ctx.writer.run_at(0, |w, _| w.write_bytes(header.as_bytes()));
    Ok(ctx.writer.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Color4f, Curve, FixedString, Vector3f};

    fn object_with(params: &[(&str, Parameter)]) -> ParameterObject {
        let mut object = ParameterObject::default();
        for (name, param) in params {
            object.params.insert((*name).into(), param.clone());
        }
        object
    }

    #[test]
    fn test_empty_pio_roundtrip() {
        let pio = ParameterIO::new("xml");
        let bytes = pio.to_binary().unwrap();
        assert_eq!(&bytes[0..4], b"AAMP");
        assert_eq!(ParameterIO::from_binary(&bytes).unwrap(), pio);
    }

    #[test]
    fn test_scalar_parameters_roundtrip() {
        let mut pio = ParameterIO::new("xml");
        pio.version = 3;
        let object = object_with(&[
            ("Bool_0", Parameter::Bool(true)),
            ("F32_0", Parameter::F32(0.25)),
            ("Int_0", Parameter::Int(-7)),
            ("U32_0", Parameter::U32(0xCAFE_F00D)),
            (
                "Vec3_0",
                Parameter::Vec3(Vector3f { x: 1.0, y: 2.0, z: 3.0 }),
            ),
            (
                "Color_0",
                Parameter::Color(Color4f { r: 1.0, g: 0.5, b: 0.25, a: 1.0 }),
            ),
        ]);
        pio.objects.insert("TestContent".into(), object);

        let parsed = ParameterIO::from_binary(&pio.to_binary().unwrap()).unwrap();
        assert_eq!(parsed, pio);
        assert_eq!(parsed.version, 3);
        assert_eq!(parsed.data_type, "xml");
    }

    #[test]
    fn test_string_parameters_roundtrip_and_dedup() {
        let mut pio = ParameterIO::new("xml");
        let object = object_with(&[
            ("A", Parameter::StringRef("shared".into())),
            ("B", Parameter::StringRef("shared".into())),
            ("C", Parameter::String32(Box::new(FixedString::from("shared")))),
            ("D", Parameter::String64(Box::new(FixedString::from("other")))),
        ]);
        pio.objects.insert("Strings".into(), object);

        let bytes = pio.to_binary().unwrap();
        // "shared" appears once; "other" once.
        let count = bytes
            .windows(b"shared\0".len())
            .filter(|w| *w == b"shared\0")
            .count();
        assert_eq!(count, 1);
        assert_eq!(ParameterIO::from_binary(&bytes).unwrap(), pio);
    }

    #[test]
    fn test_buffer_payloads_are_deduplicated() {
        let mut pio = ParameterIO::new("xml");
        let object = object_with(&[
            ("Buf_0", Parameter::BufferInt(vec![1, 2, 3])),
            ("Buf_1", Parameter::BufferInt(vec![1, 2, 3])),
        ]);
        pio.objects.insert("Buffers".into(), object);

        let bytes = pio.to_binary().unwrap();

        // One data blob: [count = 3][1][2][3].
        let blob: Vec<u8> = [3i32, 1, 2, 3]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        let count = bytes.windows(blob.len()).filter(|w| *w == blob).count();
        assert_eq!(count, 1);

        let parsed = ParameterIO::from_binary(&bytes).unwrap();
        assert_eq!(parsed, pio);
    }

    #[test]
    fn test_identical_scalars_share_data() {
        let mut pio = ParameterIO::new("xml");
        let object = object_with(&[
            ("A", Parameter::Int(0x0101_0101)),
            ("B", Parameter::Int(0x0101_0101)),
        ]);
        pio.objects.insert("Dup".into(), object);

        let bytes = pio.to_binary().unwrap();
        // Layout: header (0x30), "xml\0" (4), root list (0xC), object (8),
        // then the two parameter headers at 0x48 and 0x50.
        let data_offset = |header: usize| {
            let rel = u32::from_le_bytes([
                bytes[header + 4],
                bytes[header + 5],
                bytes[header + 6],
                0,
            ]) as usize;
            header + rel * 4
        };
        assert_eq!(data_offset(0x48), data_offset(0x50));
        assert_eq!(ParameterIO::from_binary(&bytes).unwrap(), pio);
    }

    #[test]
    fn test_curve_and_buffer_roundtrip() {
        let mut curve = Curve::default();
        curve.a = 1;
        curve.b = 2;
        curve.floats[0] = 0.5;
        curve.floats[29] = -1.5;

        let mut pio = ParameterIO::new("xml");
        let object = object_with(&[
            ("Curve_0", Parameter::Curve2(Box::new([curve, Curve::default()]))),
            ("F32Buf", Parameter::BufferF32(vec![0.1, 0.2])),
            ("U32Buf", Parameter::BufferU32(vec![9, 8, 7])),
            ("BinBuf", Parameter::BufferBinary(vec![0xDE, 0xAD, 0xBE])),
            ("Empty", Parameter::BufferInt(Vec::new())),
        ]);
        pio.objects.insert("Data".into(), object);

        assert_eq!(
            ParameterIO::from_binary(&pio.to_binary().unwrap()).unwrap(),
            pio
        );
    }

    #[test]
    fn test_nested_lists_preserve_insertion_order() {
        let mut pio = ParameterIO::new("xml");
        for list_name in ["Zeta", "Alpha", "Mid"] {
            let mut child = ParameterList::default();
            for obj_name in ["B", "A"] {
                child.objects.insert(
                    obj_name.into(),
                    object_with(&[("V", Parameter::U32(1))]),
                );
            }
            pio.lists.insert(list_name.into(), child);
        }

        let parsed = ParameterIO::from_binary(&pio.to_binary().unwrap()).unwrap();
        assert_eq!(parsed, pio);
        let keys: Vec<Name> = parsed.lists.keys().copied().collect();
        assert_eq!(
            keys,
            vec![Name::from("Zeta"), Name::from("Alpha"), Name::from("Mid")]
        );
        let obj_keys: Vec<Name> = parsed.lists[&Name::from("Zeta")]
            .objects
            .keys()
            .copied()
            .collect();
        assert_eq!(obj_keys, vec![Name::from("B"), Name::from("A")]);
    }

    #[test]
    fn test_deep_tree_roundtrip() {
        let mut pio = ParameterIO::new("xml");
        let mut level3 = ParameterList::default();
        level3
            .objects
            .insert("Leaf".into(), object_with(&[("P", Parameter::F32(9.0))]));
        let mut level2 = ParameterList::default();
        level2.lists.insert("L3".into(), level3);
        level2
            .objects
            .insert("Mid".into(), object_with(&[("Q", Parameter::Int(3))]));
        let mut level1 = ParameterList::default();
        level1.lists.insert("L2".into(), level2);
        pio.lists.insert("L1".into(), level1);
        pio.objects
            .insert("Root".into(), object_with(&[("R", Parameter::Bool(false))]));

        assert_eq!(
            ParameterIO::from_binary(&pio.to_binary().unwrap()).unwrap(),
            pio
        );
    }

    #[test]
    fn test_collection_order_interleaves_objects_and_lists() {
        // At a non-root list, one local object is processed before each
        // even-indexed child list; remaining objects trail.
        let mut child = ParameterList::default();
        for (i, name) in ["O0", "O1", "O2"].iter().enumerate() {
            child
                .objects
                .insert((*name).into(), object_with(&[("P", Parameter::U32(10 + i as u32))]));
        }
        for (i, name) in ["C0", "C1", "C2"].iter().enumerate() {
            let mut grandchild = ParameterList::default();
            grandchild
                .objects
                .insert("G".into(), object_with(&[("P", Parameter::U32(20 + i as u32))]));
            child.lists.insert((*name).into(), grandchild);
        }

        let mut pio = ParameterIO::new("xml");
        pio.lists.insert("Child".into(), child);

        let mut ctx = WriteContext::new();
        ctx.collect_parameters(&pio.param_root, true);
        let order: Vec<u32> = ctx
            .parameters_to_write
            .iter()
            .map(|p| p.as_u32().unwrap())
            .collect();
        // O0 before C0's subtree, O1 before C2's subtree, then O2 trails.
        assert_eq!(order, vec![10, 20, 21, 11, 22, 12]);
    }

    #[test]
    fn test_collection_order_processes_seven_root_objects_first() {
        // At the root list, up to seven objects are queued before any child
        // list; the eighth interleaves with the first (even-indexed) child.
        let mut pio = ParameterIO::new("xml");
        for i in 0..9u32 {
            pio.objects.insert(
                format!("R{i}").as_str().into(),
                object_with(&[("P", Parameter::U32(i))]),
            );
        }
        for (i, name) in ["C0", "C1"].iter().enumerate() {
            let mut child = ParameterList::default();
            child.objects.insert(
                "G".into(),
                object_with(&[("P", Parameter::U32(100 + i as u32))]),
            );
            pio.lists.insert((*name).into(), child);
        }

        let mut ctx = WriteContext::new();
        ctx.collect_parameters(&pio.param_root, true);
        let order: Vec<u32> = ctx
            .parameters_to_write
            .iter()
            .map(|p| p.as_u32().unwrap())
            .collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4, 5, 6, 7, 100, 101, 8]);
    }

    #[test]
    fn test_aiprog_defers_root_objects() {
        // When the root object map starts with DemoAIActionIdx, root objects
        // are processed after all child lists.
        let mut pio = ParameterIO::new("xml");
        pio.objects.insert(
            "DemoAIActionIdx".into(),
            object_with(&[("Marker", Parameter::U32(0xAAAA_0001))]),
        );
        let mut child = ParameterList::default();
        child
            .objects
            .insert("AI_0".into(), object_with(&[("Deep", Parameter::U32(0xBBBB_0002))]));
        pio.lists.insert("AI".into(), child);

        let mut ctx = WriteContext::new();
        ctx.collect_parameters(&pio.param_root, true);
        assert_eq!(ctx.parameters_to_write.len(), 2);
        assert_eq!(ctx.parameters_to_write[0].as_u32().unwrap(), 0xBBBB_0002);
        assert_eq!(ctx.parameters_to_write[1].as_u32().unwrap(), 0xAAAA_0001);

        let bytes = pio.to_binary().unwrap();
        assert_eq!(ParameterIO::from_binary(&bytes).unwrap(), pio);
    }

    #[test]
    fn test_deterministic_output() {
        let mut pio = ParameterIO::new("xml");
        pio.objects.insert(
            "Obj".into(),
            object_with(&[
                ("S", Parameter::StringRef("v".into())),
                ("N", Parameter::Int(1)),
            ]),
        );
        let first = pio.to_binary().unwrap();
        let second = ParameterIO::from_binary(&first).unwrap().to_binary().unwrap();
        assert_eq!(first, second);
    }
}
