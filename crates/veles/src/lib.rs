//! Veles - Nintendo EAD/EPD container and parameter format library.
//!
//! This crate provides a unified interface to the Veles library ecosystem
//! for reading, writing and round-tripping the binary formats used by
//! first-party titles.
//!
//! # Crates
//!
//! - [`veles_common`] - Common utilities (binary reading/writing, CRC-32, 24-bit ints)
//! - [`veles_byml`] - BYML tagged-tree documents
//! - [`veles_aamp`] - AAMP binary parameter archives
//! - [`veles_sarc`] - SARC name-hashed archives
//! - [`veles_yaz0`] - Yaz0 compression
//!
//! The codec layers are independent: a SARC may carry Yaz0-compressed BYML
//! or AAMP files, but composing them (as well as layering schemes such as
//! the Grezzo datasheet relocation format) is left to the caller.
//!
//! # Example
//!
//! ```no_run
//! use veles::prelude::*;
//!
//! let buffer = std::fs::read("Enemy_Lizalfos.sbactorpack")?;
//! let data = yaz0::decompress(&buffer)?;
//!
//! let sarc = Sarc::new(&data)?;
//! if let Some(file) = sarc.get_by_name("Actor/ActorLink/Enemy_Lizalfos.bxml") {
//!     let pio = ParameterIO::from_binary(file.data)?;
//!     println!("data type: {}", pio.data_type);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

// Re-export all sub-crates
pub use veles_aamp as aamp;
pub use veles_byml as byml;
pub use veles_common as common;
pub use veles_sarc as sarc;
pub use veles_yaz0 as yaz0;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use veles_aamp::{Name, Parameter, ParameterIO, ParameterList, ParameterObject};
    pub use veles_byml::Byml;
    pub use veles_common::{crc, BinaryReader, BinaryWriter, Endian};
    pub use veles_sarc::{Sarc, SarcWriter};
    pub use veles_yaz0 as yaz0;
}

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    /// Layers compose: a Yaz0-compressed SARC carrying a BYML document and a
    /// parameter archive survives a full round trip.
    #[test]
    fn test_compose_layers() {
        let mut map = byml::Map::new();
        map.insert("Level".into(), byml::Byml::I32(4));
        let doc = byml::Byml::Map(map);

        let mut pio = aamp::ParameterIO::new("xml");
        pio.objects
            .entry("General".into())
            .or_default()
            .params
            .insert("Life".into(), aamp::Parameter::Int(100));

        let mut writer = sarc::SarcWriter::new(common::Endian::Little, sarc::Mode::New);
        writer
            .files
            .insert("config.byml".into(), doc.to_binary(false, 2).unwrap());
        writer
            .files
            .insert("actor.bxml".into(), pio.to_binary().unwrap());
        let (_, archive) = writer.write().unwrap();

        let compressed = yaz0::compress(&archive, 0, 7);
        let decompressed = yaz0::decompress(&compressed).unwrap();
        assert_eq!(decompressed, archive);

        let sarc = sarc::Sarc::new(&decompressed).unwrap();
        let parsed_doc =
            byml::Byml::from_binary(sarc.get_by_name("config.byml").unwrap().data).unwrap();
        assert_eq!(parsed_doc, doc);
        let parsed_pio =
            aamp::ParameterIO::from_binary(sarc.get_by_name("actor.bxml").unwrap().data).unwrap();
        assert_eq!(parsed_pio, pio);
    }
}
