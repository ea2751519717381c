// src/deploy/archive.rs

//! Component archives
//!
//! A compressed component is published as `<component>.zip`, holding its
//! files at their package-relative paths. The component's compression field
//! picks the method applied to every entry:
//! - `store`: no compression (method 0)
//! - `deflate` / `zip`: deflate (method 8)
//! - `lzma`: LZMA with an end-of-stream marker (method 14)
//! - `bzip2`: bzip2 (method 12)
//!
//! An empty field or `None` means the files are published as-is. Anything
//! else is rejected.
//!
//! Entries carry a fixed timestamp, so unchanged inputs produce identical
//! archives. Entries and archives are limited to 4 GiB and 65535 entries
//! (no zip64).

use crate::error::{Error, Result};
use bzip2::write::BzEncoder;
use flate2::Compression as DeflateLevel;
use flate2::Crc;
use flate2::write::DeflateEncoder;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use xz2::stream::{LzmaOptions, Stream};
use xz2::write::XzEncoder;

/// LZMA preset used for `lzma` components
const LZMA_PRESET: u32 = 6;

const LOCAL_HEADER_SIGNATURE: u32 = 0x0403_4b50;
const CENTRAL_HEADER_SIGNATURE: u32 = 0x0201_4b50;
const END_OF_CENTRAL_DIRECTORY_SIGNATURE: u32 = 0x0605_4b50;

/// 1980-01-01 00:00, the earliest DOS timestamp
const DOS_DATE: u16 = (1 << 5) | 1;
const DOS_TIME: u16 = 0;

const FLAG_LZMA_EOS: u16 = 1 << 1;
const FLAG_UTF8: u16 = 1 << 11;

/// A `.lzma` stream starts with 5 property bytes and an 8-byte size
const LZMA_ALONE_HEADER: usize = 13;
const LZMA_PROPERTIES: usize = 5;
/// LZMA SDK version recorded in front of zip LZMA entries
const LZMA_SDK_VERSION: [u8; 2] = [9, 20];

/// Compression method applied to a compressed component
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Store,
    Deflate,
    Lzma,
    Bzip2,
}

impl ArchiveFormat {
    /// Resolve a component's compression field
    ///
    /// Returns `Ok(None)` for raw components.
    pub fn from_compression(component: &str, compression: &str) -> Result<Option<Self>> {
        let value = compression.trim();
        if is_raw(value) {
            return Ok(None);
        }

        match value.to_ascii_lowercase().as_str() {
            "store" => Ok(Some(ArchiveFormat::Store)),
            "deflate" | "zip" => Ok(Some(ArchiveFormat::Deflate)),
            "lzma" => Ok(Some(ArchiveFormat::Lzma)),
            "bzip2" => Ok(Some(ArchiveFormat::Bzip2)),
            _ => Err(Error::UnknownCompression {
                component: component.to_string(),
                compression: compression.to_string(),
            }),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ArchiveFormat::Store => "store",
            ArchiveFormat::Deflate => "deflate",
            ArchiveFormat::Lzma => "lzma",
            ArchiveFormat::Bzip2 => "bzip2",
        }
    }

    /// Zip compression method number
    pub fn method(&self) -> u16 {
        match self {
            ArchiveFormat::Store => 0,
            ArchiveFormat::Deflate => 8,
            ArchiveFormat::Bzip2 => 12,
            ArchiveFormat::Lzma => 14,
        }
    }

    fn version_needed(&self) -> u16 {
        match self {
            ArchiveFormat::Store | ArchiveFormat::Deflate => 20,
            ArchiveFormat::Bzip2 => 46,
            ArchiveFormat::Lzma => 63,
        }
    }

    fn flags(&self) -> u16 {
        match self {
            ArchiveFormat::Lzma => FLAG_UTF8 | FLAG_LZMA_EOS,
            _ => FLAG_UTF8,
        }
    }

    /// Write an archive of `paths` (relative to `source_dir`) to `output`
    pub fn build(&self, source_dir: &Path, paths: &[&str], output: &Path) -> Result<()> {
        self.write(source_dir, paths, output)
            .map_err(|e| Error::Archive {
                path: output.to_path_buf(),
                reason: e.to_string(),
            })
    }

    fn write(&self, source_dir: &Path, paths: &[&str], output: &Path) -> io::Result<()> {
        let entry_count = u16::try_from(paths.len())
            .map_err(|_| io::Error::other("too many entries for a zip archive"))?;

        let mut out = BufWriter::new(File::create(output)?);
        let mut central = Vec::new();
        let mut offset: u64 = 0;

        for path in paths {
            let data = fs::read(source_dir.join(path))?;
            let mut crc = Crc::new();
            crc.update(&data);
            let compressed = self.compress(&data)?;

            let entry = Entry {
                name: path.as_bytes(),
                crc: crc.sum(),
                compressed_size: to_u32(compressed.len() as u64)?,
                size: to_u32(data.len() as u64)?,
                offset: to_u32(offset)?,
            };

            let header = self.local_header(&entry);
            out.write_all(&header)?;
            out.write_all(&compressed)?;
            offset += (header.len() + compressed.len()) as u64;

            self.central_header(&entry, &mut central);
        }

        let central_offset = to_u32(offset)?;
        out.write_all(&central)?;

        let mut end = Vec::with_capacity(22);
        put_u32(&mut end, END_OF_CENTRAL_DIRECTORY_SIGNATURE);
        put_u16(&mut end, 0); // this disk
        put_u16(&mut end, 0); // central directory disk
        put_u16(&mut end, entry_count);
        put_u16(&mut end, entry_count);
        put_u32(&mut end, to_u32(central.len() as u64)?);
        put_u32(&mut end, central_offset);
        put_u16(&mut end, 0); // comment length
        out.write_all(&end)?;

        let file = out.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()
    }

    fn compress(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        match self {
            ArchiveFormat::Store => Ok(data.to_vec()),
            ArchiveFormat::Deflate => {
                let mut encoder = DeflateEncoder::new(Vec::new(), DeflateLevel::default());
                encoder.write_all(data)?;
                encoder.finish()
            }
            ArchiveFormat::Bzip2 => {
                let mut encoder = BzEncoder::new(Vec::new(), bzip2::Compression::default());
                encoder.write_all(data)?;
                encoder.finish()
            }
            ArchiveFormat::Lzma => compress_lzma(data),
        }
    }

    fn local_header(&self, entry: &Entry) -> Vec<u8> {
        let mut header = Vec::with_capacity(30 + entry.name.len());
        put_u32(&mut header, LOCAL_HEADER_SIGNATURE);
        put_u16(&mut header, self.version_needed());
        self.put_entry_fields(&mut header, entry);
        put_u16(&mut header, 0); // extra field length
        header.extend_from_slice(entry.name);
        header
    }

    fn central_header(&self, entry: &Entry, central: &mut Vec<u8>) {
        put_u32(central, CENTRAL_HEADER_SIGNATURE);
        put_u16(central, self.version_needed()); // made by (MS-DOS)
        put_u16(central, self.version_needed());
        self.put_entry_fields(central, entry);
        put_u16(central, 0); // extra field length
        put_u16(central, 0); // comment length
        put_u16(central, 0); // disk number
        put_u16(central, 0); // internal attributes
        put_u32(central, 0); // external attributes
        put_u32(central, entry.offset);
        central.extend_from_slice(entry.name);
    }

    /// Fields shared by local and central headers, up to the name length
    fn put_entry_fields(&self, buf: &mut Vec<u8>, entry: &Entry) {
        put_u16(buf, self.flags());
        put_u16(buf, self.method());
        put_u16(buf, DOS_TIME);
        put_u16(buf, DOS_DATE);
        put_u32(buf, entry.crc);
        put_u32(buf, entry.compressed_size);
        put_u32(buf, entry.size);
        put_u16(buf, entry.name.len() as u16);
    }
}

/// Archive file name published for `component`
pub fn archive_name(component: &str) -> String {
    format!("{}.zip", component)
}

/// Whether a compression field means "no archive"
pub fn is_raw(compression: &str) -> bool {
    let value = compression.trim();
    value.is_empty() || value.eq_ignore_ascii_case("none")
}

struct Entry<'a> {
    name: &'a [u8],
    crc: u32,
    compressed_size: u32,
    size: u32,
    offset: u32,
}

/// LZMA entry data: SDK version, properties size, properties, raw stream
///
/// liblzma's `.lzma` encoder always ends its stream with a marker, which
/// is what `FLAG_LZMA_EOS` announces.
fn compress_lzma(data: &[u8]) -> io::Result<Vec<u8>> {
    let options = LzmaOptions::new_preset(LZMA_PRESET)?;
    let stream = Stream::new_lzma_encoder(&options)?;
    let mut encoder = XzEncoder::new_stream(Vec::new(), stream);
    encoder.write_all(data)?;
    let alone = encoder.finish()?;

    if alone.len() < LZMA_ALONE_HEADER {
        return Err(io::Error::other("truncated LZMA stream"));
    }

    let mut entry = Vec::with_capacity(4 + alone.len());
    entry.extend_from_slice(&LZMA_SDK_VERSION);
    put_u16(&mut entry, LZMA_PROPERTIES as u16);
    entry.extend_from_slice(&alone[..LZMA_PROPERTIES]);
    entry.extend_from_slice(&alone[LZMA_ALONE_HEADER..]);
    Ok(entry)
}

fn to_u32(value: u64) -> io::Result<u32> {
    u32::try_from(value).map_err(|_| io::Error::other("archive exceeds 4 GiB"))
}

fn put_u16(buf: &mut Vec<u8>, value: u16) {
    buf.extend_from_slice(&value.to_le_bytes());
}

fn put_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_le_bytes());
}
