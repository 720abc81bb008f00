// src/formats/d88.rs

use crate::media_types::{self, MEDIA_1DD};
use byteorder::{LittleEndian, ReadBytesExt};
use std::fs::File;
use std::io::{self, Cursor, Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Offset of the media type byte in the D88 header.
pub const MEDIA_TYPE_OFFSET: usize = 0x1B;

const DISK_NAME_LEN: usize = 17; // 16 characters plus NUL
const FIXED_HEADER_LEN: usize = 0x20;
const TRACK_TABLE_OFFSET: usize = 0x20;
const MAX_TRACKS: usize = 164;

const WRITE_PROTECT_OFF: u8 = 0x00;
const WRITE_PROTECT_ON: u8 = 0x10;

#[derive(Debug, Error)]
pub enum D88Error {
    #[error("{}: not found or not a regular file", .0.display())]
    NotFound(PathBuf),
    #[error("{}: permission denied", .0.display())]
    PermissionDenied(PathBuf),
    #[error("file is {len} bytes, too short to patch the media type at offset 0x1B (need at least 28)")]
    OutOfRange { len: usize },
    #[error("file is {len} bytes, too short for a D88 header (need at least 32)")]
    TruncatedHeader { len: usize },
    #[error("not a D88 image: {reason}")]
    NotAD88 { reason: String },
    #[error("validation failed: {0}")]
    Validation(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Maps open/create failures onto the error taxonomy, keeping the path.
pub fn classify_io(err: io::Error, path: &Path) -> D88Error {
    match err.kind() {
        io::ErrorKind::NotFound => D88Error::NotFound(path.to_path_buf()),
        io::ErrorKind::PermissionDenied => D88Error::PermissionDenied(path.to_path_buf()),
        _ => D88Error::Io(err),
    }
}

pub struct D88Handler {
    data: Vec<u8>,
}

struct D88Header {
    name: String,
    write_protect: u8,
    media_type: u8,
    disk_size: u32,
}

impl D88Handler {
    pub fn new(data: Vec<u8>) -> Self {
        D88Handler { data }
    }

    fn parse_header(&self) -> Result<D88Header, D88Error> {
        if self.data.len() < FIXED_HEADER_LEN {
            return Err(D88Error::TruncatedHeader { len: self.data.len() });
        }
        let mut cursor = Cursor::new(&self.data);
        let mut name_bytes = [0u8; DISK_NAME_LEN];
        cursor.read_exact(&mut name_bytes)?;
        let name_end = name_bytes.iter().position(|&b| b == 0).unwrap_or(DISK_NAME_LEN);
        let name = String::from_utf8_lossy(&name_bytes[..name_end]).into_owned();

        cursor.set_position(0x1A); // skip reserved bytes
        let write_protect = cursor.read_u8()?;
        let media_type = cursor.read_u8()?;
        let disk_size = cursor.read_u32::<LittleEndian>()?;

        Ok(D88Header { name, write_protect, media_type, disk_size })
    }

    /// Track offset table entries, up to the start of the first track's data.
    fn track_offsets(&self) -> Result<Vec<u32>, D88Error> {
        let mut table_end = std::cmp::min(
            self.data.len(),
            TRACK_TABLE_OFFSET + 4 * MAX_TRACKS,
        ) as u64;
        let mut cursor = Cursor::new(&self.data);
        cursor.set_position(TRACK_TABLE_OFFSET as u64);

        let mut offsets = Vec::new();
        while cursor.position() + 4 <= table_end {
            let offset = cursor.read_u32::<LittleEndian>()?;
            if offset != 0 && (offset as u64) < table_end {
                table_end = offset as u64;
            }
            offsets.push(offset);
        }
        Ok(offsets)
    }

    pub fn display(&self, ascii: bool) -> Result<String, D88Error> {
        let header = self.parse_header()?;
        let offsets = self.track_offsets()?;
        let mut output = Vec::new();

        if ascii {
            let header_hex: Vec<String> = self.data[..FIXED_HEADER_LEN]
                .iter()
                .map(|b| format!("{:02X}", b))
                .collect();
            let header_ascii: String = self.data[..FIXED_HEADER_LEN]
                .iter()
                .map(|&b| if b >= 32 && b <= 126 { b as char } else { '.' })
                .collect();
            output.push(format!("Header Hex: {}", header_hex.join(" ")));
            output.push(format!("Header ASCII: {}", header_ascii));
        }

        output.push("D88 Disk Image (.d88)".to_string());
        output.push(format!("File Size: {} bytes", self.data.len()));
        let shown_name = if header.name.is_empty() { "(none)" } else { header.name.as_str() };
        output.push(format!("Disk Name: {}", shown_name));
        output.push(format!(
            "Write Protect: {} (0x{:02X})",
            match header.write_protect {
                WRITE_PROTECT_OFF => "off",
                WRITE_PROTECT_ON => "on",
                _ => "invalid",
            },
            header.write_protect
        ));
        output.push(format!(
            "Media Type: {} (0x{:02X})",
            media_types::lookup(header.media_type).map(|m| m.name).unwrap_or("Unknown"),
            header.media_type
        ));
        output.push(format!("Disk Size Field: {} bytes", header.disk_size));

        let populated = offsets.iter().filter(|&&o| o != 0).count();
        output.push(format!("Tracks ({} populated):", populated));
        for (i, &offset) in offsets.iter().enumerate() {
            if offset != 0 {
                output.push(format!("  Track {}: Offset 0x{:06X}", i, offset));
            }
        }

        Ok(output.join("\n"))
    }

    /// Sanity-checks the fixed header before patching. Opt-in; plain
    /// conversion stays format-agnostic.
    pub fn check_header(&self) -> Result<(), D88Error> {
        let header = self.parse_header()?;
        if media_types::lookup(header.media_type).is_none() {
            return Err(D88Error::NotAD88 {
                reason: format!("unknown media type code 0x{:02X}", header.media_type),
            });
        }
        if header.write_protect != WRITE_PROTECT_OFF && header.write_protect != WRITE_PROTECT_ON {
            return Err(D88Error::NotAD88 {
                reason: format!("unexpected write protect flag 0x{:02X}", header.write_protect),
            });
        }
        // Multi-disk archives store a size smaller than the file, so only
        // the upper bound is checked.
        if header.disk_size == 0 || header.disk_size as usize > self.data.len() {
            return Err(D88Error::NotAD88 {
                reason: format!(
                    "disk size field {} does not fit file of {} bytes",
                    header.disk_size,
                    self.data.len()
                ),
            });
        }
        Ok(())
    }

    /// Patches the media type to 1DD and writes the whole image to
    /// `output_path`. Returns the media type byte found before patching.
    pub fn convert(&mut self, output_path: &Path, verbose: bool, validate: bool) -> Result<u8, D88Error> {
        if self.data.len() <= MEDIA_TYPE_OFFSET {
            return Err(D88Error::OutOfRange { len: self.data.len() });
        }
        let old_media_type = self.data[MEDIA_TYPE_OFFSET];
        self.data[MEDIA_TYPE_OFFSET] = MEDIA_1DD.code;
        println!("Converting media type {:#x} to {:#x}", old_media_type, MEDIA_1DD.code);

        if verbose {
            println!(
                "Media type: {} -> {}",
                media_types::name_for(old_media_type),
                MEDIA_1DD.name
            );
            println!("Writing {} bytes to {}", self.data.len(), output_path.display());
        }

        let mut file = File::create(output_path).map_err(|e| classify_io(e, output_path))?;
        file.write_all(&self.data)?;

        if validate {
            let mut output_file = File::open(output_path).map_err(|e| classify_io(e, output_path))?;
            let mut output_data = Vec::new();
            output_file.read_to_end(&mut output_data)?;
            if output_data.len() != self.data.len() {
                return Err(D88Error::Validation(format!(
                    "output size {} does not match patched image size {}",
                    output_data.len(),
                    self.data.len()
                )));
            }
            if output_data != self.data {
                return Err(D88Error::Validation(
                    "output contents do not match patched image".to_string(),
                ));
            }
            println!("Validation passed: output matches patched image");
        }

        Ok(old_media_type)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}
