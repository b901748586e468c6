//! Hand-built ZIP fixtures.

#![allow(dead_code)]

use byteorder::{LittleEndian, WriteBytesExt};
use flate2::Crc;
use flate2::write::DeflateEncoder;
use std::io::Write;
use std::path::{Path, PathBuf};

/// 2021-01-01
pub const DOS_DATE: u16 = 0x5221;
/// 12:00:00
pub const DOS_TIME: u16 = 0x6000;

struct Entry {
    name: String,
    data: Vec<u8>,
    deflate: bool,
    directory: bool,
    method: Option<u16>,
}

#[derive(Default)]
pub struct ZipBuilder {
    entries: Vec<Entry>,
    prefix: Vec<u8>,
    zip64_sentinel: bool,
    comment: Vec<u8>,
}

impl ZipBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stored(mut self, name: &str, data: &[u8]) -> Self {
        self.entries.push(Entry {
            name: name.to_string(),
            data: data.to_vec(),
            deflate: false,
            directory: false,
            method: None,
        });
        self
    }

    pub fn deflated(mut self, name: &str, data: &[u8]) -> Self {
        self.entries.push(Entry {
            name: name.to_string(),
            data: data.to_vec(),
            deflate: true,
            directory: false,
            method: None,
        });
        self
    }

    pub fn dir(mut self, name: &str) -> Self {
        self.entries.push(Entry {
            name: name.to_string(),
            data: Vec::new(),
            deflate: false,
            directory: true,
            method: None,
        });
        self
    }

    /// Entry whose payload is written as is under an arbitrary method code.
    pub fn raw(mut self, name: &str, method: u16, data: &[u8]) -> Self {
        self.entries.push(Entry {
            name: name.to_string(),
            data: data.to_vec(),
            deflate: false,
            directory: false,
            method: Some(method),
        });
        self
    }

    /// Bytes placed before the archive, like a self-extractor stub.
    pub fn prefix(mut self, bytes: &[u8]) -> Self {
        self.prefix = bytes.to_vec();
        self
    }

    /// Mark the EOCD entry count with the ZIP64 sentinel.
    pub fn zip64_sentinel(mut self) -> Self {
        self.zip64_sentinel = true;
        self
    }

    pub fn comment(mut self, comment: &[u8]) -> Self {
        self.comment = comment.to_vec();
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut body = Vec::new();
        let mut central = Vec::new();

        for entry in &self.entries {
            let mut crc = Crc::new();
            crc.update(&entry.data);
            let payload = if entry.deflate {
                let mut enc = DeflateEncoder::new(Vec::new(), flate2::Compression::default());
                enc.write_all(&entry.data).unwrap();
                enc.finish().unwrap()
            } else {
                entry.data.clone()
            };
            let method = entry
                .method
                .unwrap_or(if entry.deflate { 8 } else { 0 });
            let offset = body.len() as u32;
            let name = entry.name.as_bytes();

            body.extend_from_slice(b"PK\x03\x04");
            body.write_u16::<LittleEndian>(20).unwrap();
            body.write_u16::<LittleEndian>(0x0800).unwrap();
            body.write_u16::<LittleEndian>(method).unwrap();
            body.write_u16::<LittleEndian>(DOS_TIME).unwrap();
            body.write_u16::<LittleEndian>(DOS_DATE).unwrap();
            body.write_u32::<LittleEndian>(crc.sum()).unwrap();
            body.write_u32::<LittleEndian>(payload.len() as u32).unwrap();
            body.write_u32::<LittleEndian>(entry.data.len() as u32).unwrap();
            body.write_u16::<LittleEndian>(name.len() as u16).unwrap();
            body.write_u16::<LittleEndian>(0).unwrap();
            body.extend_from_slice(name);
            body.extend_from_slice(&payload);

            central.extend_from_slice(b"PK\x01\x02");
            central.write_u16::<LittleEndian>(20).unwrap();
            central.write_u16::<LittleEndian>(20).unwrap();
            central.write_u16::<LittleEndian>(0x0800).unwrap();
            central.write_u16::<LittleEndian>(method).unwrap();
            central.write_u16::<LittleEndian>(DOS_TIME).unwrap();
            central.write_u16::<LittleEndian>(DOS_DATE).unwrap();
            central.write_u32::<LittleEndian>(crc.sum()).unwrap();
            central.write_u32::<LittleEndian>(payload.len() as u32).unwrap();
            central.write_u32::<LittleEndian>(entry.data.len() as u32).unwrap();
            central.write_u16::<LittleEndian>(name.len() as u16).unwrap();
            central.write_u16::<LittleEndian>(0).unwrap();
            central.write_u16::<LittleEndian>(0).unwrap();
            central.write_u16::<LittleEndian>(0).unwrap();
            central.write_u16::<LittleEndian>(0).unwrap();
            central
                .write_u32::<LittleEndian>(if entry.directory { 0x10 } else { 0 })
                .unwrap();
            central.write_u32::<LittleEndian>(offset).unwrap();
            central.extend_from_slice(name);
        }

        let count = if self.zip64_sentinel {
            0xFFFF
        } else {
            self.entries.len() as u16
        };
        let mut out = self.prefix.clone();
        out.extend_from_slice(&body);
        out.extend_from_slice(&central);
        out.extend_from_slice(b"PK\x05\x06");
        out.write_u16::<LittleEndian>(0).unwrap();
        out.write_u16::<LittleEndian>(0).unwrap();
        out.write_u16::<LittleEndian>(count).unwrap();
        out.write_u16::<LittleEndian>(count).unwrap();
        out.write_u32::<LittleEndian>(central.len() as u32).unwrap();
        out.write_u32::<LittleEndian>(body.len() as u32).unwrap();
        out.write_u16::<LittleEndian>(self.comment.len() as u16).unwrap();
        out.extend_from_slice(&self.comment);
        out
    }

    pub fn write_to(&self, dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, self.build()).unwrap();
        path
    }
}

/// `docs/`, `docs/a.txt` (100 bytes, stored) and `b.bin` (200 bytes, deflated).
pub fn sample_archive() -> ZipBuilder {
    ZipBuilder::new()
        .dir("docs/")
        .stored("docs/a.txt", &[b'a'; 100])
        .deflated("b.bin", &[7u8; 200])
}

/// Non-trivial payload that does not compress to nothing.
pub fn patterned(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}
