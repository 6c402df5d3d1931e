//! AAMP binary parser.

use veles_common::{BinaryReader, Endian, U24Le};
use zerocopy::little_endian::{U16 as LU16, U32 as LU32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::{
    Curve, Error, Name, Parameter, ParameterIO, ParameterList, ParameterObject, ParameterType,
    Quatf, Result, Vector2f, Vector3f, Vector4f,
};

pub(crate) const HEADER_SIZE: usize = 0x30;
pub(crate) const FLAG_LITTLE_ENDIAN: u32 = 1 << 0;
pub(crate) const FLAG_UTF8: u32 = 1 << 1;

/// Archive header (0x30 bytes, always little endian).
#[derive(Debug, Clone, Copy, Default)]
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub(crate) struct ResHeader {
    pub magic: [u8; 4],
    pub version: LU32,
    pub flags: LU32,
    pub file_size: LU32,
    pub pio_version: LU32,
    /// Offset to the root parameter list, relative to the end of the header.
    pub offset_to_pio: LU32,
    /// Number of lists (including the root).
    pub num_lists: LU32,
    pub num_objects: LU32,
    pub num_parameters: LU32,
    pub data_section_size: LU32,
    pub string_section_size: LU32,
    pub unk_section_size: LU32,
}

/// List header: compact relative offsets are 16-bit and scaled by 4.
#[derive(Debug, Clone, Copy, Default)]
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub(crate) struct ResParameterList {
    pub name_crc32: LU32,
    pub lists_rel_offset: LU16,
    pub num_lists: LU16,
    pub objects_rel_offset: LU16,
    pub num_objects: LU16,
}

/// Object header.
#[derive(Debug, Clone, Copy, Default)]
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub(crate) struct ResParameterObj {
    pub name_crc32: LU32,
    pub params_rel_offset: LU16,
    pub num_params: LU16,
}

/// Parameter header: the data offset is 24-bit and scaled by 4.
#[derive(Debug, Clone, Copy, Default)]
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub(crate) struct ResParameter {
    pub name_crc32: LU32,
    pub data_rel_offset: U24Le,
    pub type_: u8,
}

/// Byte offset of `data_rel_offset` within [`ResParameter`].
pub(crate) const RES_PARAMETER_DATA_OFFSET: usize = 4;
/// Byte offset of `lists_rel_offset` within [`ResParameterList`].
pub(crate) const RES_LIST_LISTS_OFFSET: usize = 4;
/// Byte offset of `objects_rel_offset` within [`ResParameterList`].
pub(crate) const RES_LIST_OBJECTS_OFFSET: usize = 8;
/// Byte offset of `params_rel_offset` within [`ResParameterObj`].
pub(crate) const RES_OBJ_PARAMS_OFFSET: usize = 4;

pub(crate) struct Parser<'a> {
    reader: BinaryReader<'a>,
}

impl<'a> Parser<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(Error::InvalidData("invalid header"));
        }
        let mut reader = BinaryReader::new(data, Endian::Little);
        let header: ResHeader = reader.read_struct()?;

        if &header.magic != b"AAMP" {
            return Err(Error::InvalidData("invalid magic"));
        }
        if header.version.get() != 2 {
            return Err(Error::Unsupported(
                "only version 2 parameter archives are supported",
            ));
        }
        let flags = header.flags.get();
        if flags & FLAG_LITTLE_ENDIAN == 0 {
            return Err(Error::Unsupported(
                "only little endian parameter archives are supported",
            ));
        }
        if flags & FLAG_UTF8 == 0 {
            return Err(Error::Unsupported(
                "only UTF-8 parameter archives are supported",
            ));
        }
        Ok(Self { reader })
    }

    pub(crate) fn parse(mut self) -> Result<ParameterIO> {
        let header: ResHeader = self.reader.read_struct_at(0)?;
        let root_offset = HEADER_SIZE + header.offset_to_pio.get() as usize;
        let (root_name, root) = self.parse_list(root_offset, 0)?;
        if root_name != Name::ROOT {
            return Err(Error::InvalidData("no param_root"));
        }
        let data_type = self.reader.read_cstr_at(HEADER_SIZE, None)?.to_string();
        Ok(ParameterIO {
            version: header.pio_version.get(),
            data_type,
            param_root: root,
        })
    }

    fn parse_list(&mut self, offset: usize, depth: u32) -> Result<(Name, ParameterList)> {
        // A list's children always live at or after its own offset, so a
        // malformed archive can make the tree self-referential.
        if depth > 256 {
            return Err(Error::InvalidData("parameter list nesting too deep"));
        }
        let info: ResParameterList = self.reader.read_struct_at(offset)?;
        let lists_offset = offset + info.lists_rel_offset.get() as usize * 4;
        let objects_offset = offset + info.objects_rel_offset.get() as usize * 4;

        let mut list = ParameterList::default();
        for i in 0..info.num_lists.get() as usize {
            let (name, child) = self.parse_list(lists_offset + 0x0C * i, depth + 1)?;
            list.lists.insert(name, child);
        }
        for i in 0..info.num_objects.get() as usize {
            let (name, object) = self.parse_object(objects_offset + 8 * i)?;
            list.objects.insert(name, object);
        }
        Ok((Name::from_hash(info.name_crc32.get()), list))
    }

    fn parse_object(&mut self, offset: usize) -> Result<(Name, ParameterObject)> {
        let info: ResParameterObj = self.reader.read_struct_at(offset)?;
        let params_offset = offset + info.params_rel_offset.get() as usize * 4;

        let mut object = ParameterObject::default();
        for i in 0..info.num_params.get() as usize {
            let (name, param) = self.parse_parameter(params_offset + 8 * i)?;
            object.params.insert(name, param);
        }
        Ok((Name::from_hash(info.name_crc32.get()), object))
    }

    fn parse_parameter(&mut self, offset: usize) -> Result<(Name, Parameter)> {
        let info: ResParameter = self.reader.read_struct_at(offset)?;
        let name = Name::from_hash(info.name_crc32.get());
        let data_offset = offset + info.data_rel_offset.get() as usize * 4;
        let ty = ParameterType::from_u8(info.type_)
            .ok_or(Error::InvalidData("unexpected parameter type"))?;

        self.reader.seek(data_offset);
        let param = match ty {
            ParameterType::Bool => Parameter::Bool(self.reader.read_u32()? != 0),
            ParameterType::F32 => Parameter::F32(self.reader.read_f32()?),
            ParameterType::Int => Parameter::Int(self.reader.read_i32()?),
            ParameterType::U32 => Parameter::U32(self.reader.read_u32()?),
            ParameterType::Vec2 => Parameter::Vec2(Vector2f {
                x: self.reader.read_f32()?,
                y: self.reader.read_f32()?,
            }),
            ParameterType::Vec3 => Parameter::Vec3(Vector3f {
                x: self.reader.read_f32()?,
                y: self.reader.read_f32()?,
                z: self.reader.read_f32()?,
            }),
            ParameterType::Vec4 => Parameter::Vec4(Vector4f {
                x: self.reader.read_f32()?,
                y: self.reader.read_f32()?,
                z: self.reader.read_f32()?,
                t: self.reader.read_f32()?,
            }),
            ParameterType::Color => Parameter::Color(crate::Color4f {
                r: self.reader.read_f32()?,
                g: self.reader.read_f32()?,
                b: self.reader.read_f32()?,
                a: self.reader.read_f32()?,
            }),
            ParameterType::Quat => Parameter::Quat(Quatf {
                a: self.reader.read_f32()?,
                b: self.reader.read_f32()?,
                c: self.reader.read_f32()?,
                d: self.reader.read_f32()?,
            }),
            ParameterType::String32 => Parameter::String32(Box::new(
                self.reader.read_cstr_at(data_offset, Some(32))?.into(),
            )),
            ParameterType::String64 => Parameter::String64(Box::new(
                self.reader.read_cstr_at(data_offset, Some(64))?.into(),
            )),
            ParameterType::String256 => Parameter::String256(Box::new(
                self.reader.read_cstr_at(data_offset, Some(256))?.into(),
            )),
            ParameterType::StringRef => {
                Parameter::StringRef(self.reader.read_cstr_at(data_offset, None)?.to_string())
            }
            ParameterType::Curve1 => Parameter::Curve1(Box::new([self.read_curve()?])),
            ParameterType::Curve2 => {
                Parameter::Curve2(Box::new([self.read_curve()?, self.read_curve()?]))
            }
            ParameterType::Curve3 => Parameter::Curve3(Box::new([
                self.read_curve()?,
                self.read_curve()?,
                self.read_curve()?,
            ])),
            ParameterType::Curve4 => Parameter::Curve4(Box::new([
                self.read_curve()?,
                self.read_curve()?,
                self.read_curve()?,
                self.read_curve()?,
            ])),
            ParameterType::BufferInt => {
                Parameter::BufferInt(self.read_buffer(data_offset, |r| r.read_i32())?)
            }
            ParameterType::BufferF32 => {
                Parameter::BufferF32(self.read_buffer(data_offset, |r| r.read_f32())?)
            }
            ParameterType::BufferU32 => {
                Parameter::BufferU32(self.read_buffer(data_offset, |r| r.read_u32())?)
            }
            ParameterType::BufferBinary => {
                Parameter::BufferBinary(self.read_buffer(data_offset, |r| r.read_u8())?)
            }
        };
        Ok((name, param))
    }

    fn read_curve(&mut self) -> Result<Curve> {
        let a = self.reader.read_u32()?;
        let b = self.reader.read_u32()?;
        let mut floats = [0.0f32; 30];
        for f in &mut floats {
            *f = self.reader.read_f32()?;
        }
        Ok(Curve { a, b, floats })
    }

    /// Read a length-prefixed buffer. The u32 length sits 4 bytes before the
    /// parameter's data offset.
    fn read_buffer<T>(
        &mut self,
        data_offset: usize,
        read: impl Fn(&mut BinaryReader<'a>) -> veles_common::Result<T>,
    ) -> Result<Vec<T>> {
        let Some(len_offset) = data_offset.checked_sub(4) else {
            return Err(Error::InvalidData("buffer length offset underflows"));
        };
        let size = self.reader.read_u32_at(len_offset)? as usize;
        if size > self.reader.remaining() {
            return Err(Error::InvalidData("buffer length exceeds remaining data"));
        }
        let mut buffer = Vec::with_capacity(size);
        for _ in 0..size {
            buffer.push(read(&mut self.reader)?);
        }
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_res_struct_sizes() {
        assert_eq!(std::mem::size_of::<ResHeader>(), 0x30);
        assert_eq!(std::mem::size_of::<ResParameterList>(), 0x0C);
        assert_eq!(std::mem::size_of::<ResParameterObj>(), 8);
        assert_eq!(std::mem::size_of::<ResParameter>(), 8);
    }

    #[test]
    fn test_rejects_bad_magic() {
        let data = [0u8; HEADER_SIZE];
        assert!(matches!(
            ParameterIO::from_binary(&data),
            Err(Error::InvalidData("invalid magic"))
        ));
    }

    #[test]
    fn test_rejects_truncated() {
        assert!(ParameterIO::from_binary(b"AAMP").is_err());
    }

    #[test]
    fn test_rejects_version_1() {
        let mut header = ResHeader::default();
        header.magic = *b"AAMP";
        header.version = 1.into();
        header.flags = (FLAG_LITTLE_ENDIAN | FLAG_UTF8).into();
        assert!(matches!(
            ParameterIO::from_binary(header.as_bytes()),
            Err(Error::Unsupported(_))
        ));
    }

    #[test]
    fn test_rejects_big_endian_flag() {
        let mut header = ResHeader::default();
        header.magic = *b"AAMP";
        header.version = 2.into();
        header.flags = FLAG_UTF8.into();
        assert!(matches!(
            ParameterIO::from_binary(header.as_bytes()),
            Err(Error::Unsupported(_))
        ));
    }

    #[test]
    fn test_rejects_missing_param_root() {
        // A header pointing at a list whose name is not param_root.
        let mut data = Vec::new();
        let mut header = ResHeader::default();
        header.magic = *b"AAMP";
        header.version = 2.into();
        header.flags = (FLAG_LITTLE_ENDIAN | FLAG_UTF8).into();
        header.offset_to_pio = 4.into();
        data.extend_from_slice(header.as_bytes());
        data.extend_from_slice(b"xml\0");
        let list = ResParameterList::default();
        data.extend_from_slice(list.as_bytes());
        assert!(matches!(
            ParameterIO::from_binary(&data),
            Err(Error::InvalidData("no param_root"))
        ));
    }

    #[test]
    fn test_rejects_unknown_parameter_type() {
        let mut data = Vec::new();
        let mut header = ResHeader::default();
        header.magic = *b"AAMP";
        header.version = 2.into();
        header.flags = (FLAG_LITTLE_ENDIAN | FLAG_UTF8).into();
        header.offset_to_pio = 4.into();
        data.extend_from_slice(header.as_bytes());
        data.extend_from_slice(b"xml\0");
        // Root list with one object holding one parameter of type 0xFF.
        let mut list = ResParameterList::default();
        list.name_crc32 = Name::ROOT.hash().into();
        list.objects_rel_offset = 3.into(); // 12 bytes / 4
        list.num_objects = 1.into();
        data.extend_from_slice(list.as_bytes());
        let mut obj = ResParameterObj::default();
        obj.name_crc32 = 0x1234.into();
        obj.params_rel_offset = 2.into(); // 8 bytes / 4
        obj.num_params = 1.into();
        data.extend_from_slice(obj.as_bytes());
        let mut param = ResParameter::default();
        param.name_crc32 = 0x5678.into();
        param.type_ = 0xFF;
        data.extend_from_slice(param.as_bytes());
        assert!(matches!(
            ParameterIO::from_binary(&data),
            Err(Error::InvalidData("unexpected parameter type"))
        ));
    }
}
