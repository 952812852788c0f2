//! The `.wapp` container: header, eight directories, CRC-32C trailer.
//!
//! # Layout
//! ```text
//! [header: 88 bytes][SCRIPT][IMAGE][LAYOUT][UNKNOWN_1][DISPLAY_NAME][CONFIG][UNKNOWN_2][APP_INFO][crc32c: u32 LE]
//!             ^-- checksummed region starts at 0x0C and ends before the trailer
//! ```
//!
//! A container is either parsed from a complete buffer or built with
//! [`WappFile::new`] and filled with [`WappFile::add_entry`]. Any mutation marks
//! it dirty; offsets, `content_size` and the checksum are recomputed once by
//! [`WappFile::finalize`] before metadata is read or the file is written.

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use log::{debug, warn};
use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Write};
use thiserror::Error;

use crate::checksum;
use crate::directory::{Content, Directory, DirectoryError, DirectoryKind};
use crate::header::{
    Header, CHECKSUM_SIZE, CONTENT_OFFSET, DIRECTORY_OFFSET_FIELDS, FILE_VERSION, HEADER_SIZE, MAGIC,
};
use crate::meta::{AppMeta, AppType, AppVersion, WappMeta};

#[derive(Error, Debug)]
pub enum WappError {
    #[error("Wrong file, magic check failed (found {found:#06x})")]
    MagicMismatch { found: u16 },
    #[error("Wrong file, {len} bytes is too short for a container")]
    Truncated { len: usize },
    #[error("Wrong file, file size check failed: header declares {declared} content bytes, file has {actual}")]
    SizeMismatch { declared: u32, actual: usize },
    #[error("Corrupt container, checksum failed: stored {stored:#010x}, computed {computed:#010x}")]
    ChecksumMismatch { stored: u32, computed: u32 },
    #[error("First directory has no content start")]
    ZeroFirstOffset,
    #[error("Offset {offset:#x} of {kind} directory is out of range")]
    OffsetOutOfRange { kind: DirectoryKind, offset: u32 },
    #[error("{kind} directory: {source}")]
    Directory { kind: DirectoryKind, source: DirectoryError },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Conditions reported during parsing that do not stop it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseWarning {
    UnsupportedVersion { found: u16 },
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseWarning::UnsupportedVersion { found } => write!(
                f,
                "file version is {found} while version {FILE_VERSION} is supported, it may be wrongly parsed"
            ),
        }
    }
}

// ── WappFile ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct WappFile {
    header:      Header,
    directories: [Directory; 8],
    crc32:       u32,
    dirty:       bool,
    warnings:    Vec<ParseWarning>,
}

fn empty_directories() -> [Directory; 8] {
    DirectoryKind::ORDER.map(Directory::new)
}

impl WappFile {
    // ── Constructors ─────────────────────────────────────────────────────────

    /// Empty container with the given type and version and one DISPLAY_NAME
    /// entry per `display_name` pair.
    pub fn new(
        app_type: AppType,
        app_version: AppVersion,
        display_name: Option<&BTreeMap<String, String>>,
    ) -> Result<Self, WappError> {
        let mut wapp = Self {
            header:      Header::new(app_type.code(), app_version.0),
            directories: empty_directories(),
            crc32:       checksum::INITIAL,
            dirty:       true,
            warnings:    Vec::new(),
        };
        for (key, value) in display_name.into_iter().flatten() {
            wapp.add_entry(DirectoryKind::DisplayName, key, value.as_bytes())?;
        }
        wapp.finalize();
        Ok(wapp)
    }

    pub fn from_meta(meta: &AppMeta) -> Result<Self, WappError> {
        Self::new(meta.app_type, meta.version, Some(&meta.display_name))
    }

    /// Parse and verify a complete container.
    pub fn parse(bytes: &[u8]) -> Result<Self, WappError> {
        let found = if bytes.len() >= 2 { LittleEndian::read_u16(bytes) } else { 0 };
        if found != MAGIC {
            return Err(WappError::MagicMismatch { found });
        }
        if bytes.len() < HEADER_SIZE + CHECKSUM_SIZE {
            return Err(WappError::Truncated { len: bytes.len() });
        }

        let header = Header::read(&bytes[..HEADER_SIZE])?;
        if header.content_size as u64 + (CONTENT_OFFSET + CHECKSUM_SIZE) as u64 != bytes.len() as u64 {
            return Err(WappError::SizeMismatch { declared: header.content_size, actual: bytes.len() });
        }

        let end = bytes.len() - CHECKSUM_SIZE;
        let stored = LittleEndian::read_u32(&bytes[end..]);
        let computed = checksum::crc32c(&bytes[CONTENT_OFFSET..end]);
        if stored != computed {
            return Err(WappError::ChecksumMismatch { stored, computed });
        }

        let mut warnings = Vec::new();
        if header.file_version != FILE_VERSION {
            let warning = ParseWarning::UnsupportedVersion { found: header.file_version };
            warn!("{warning}");
            warnings.push(warning);
        }

        let bounds = resolve_offsets(&header, end)?;
        let mut directories = empty_directories();
        for kind in DirectoryKind::ORDER {
            let (start, stop) = (bounds[kind.index()], bounds[kind.index() + 1]);
            let dir = Directory::from_bytes(kind, bytes[start..stop].to_vec());
            if let Some(err) = dir.entries().find_map(Result::err) {
                return Err(WappError::Directory { kind, source: err });
            }
            debug!("{kind}: {} bytes at {start:#x}", dir.len());
            directories[kind.index()] = dir;
        }

        Ok(Self { header, directories, crc32: stored, dirty: false, warnings })
    }

    // ── Mutation ─────────────────────────────────────────────────────────────

    pub fn add_entry(&mut self, kind: DirectoryKind, name: &str, content: &[u8]) -> Result<(), WappError> {
        self.directories[kind.index()]
            .push(name, content)
            .map_err(|source| WappError::Directory { kind, source })?;
        self.dirty = true;
        Ok(())
    }

    pub fn clear_directory(&mut self, kind: DirectoryKind) {
        let dir = &mut self.directories[kind.index()];
        if !dir.is_empty() {
            dir.clear();
            self.dirty = true;
        }
    }

    /// Recompute directory offsets, `content_size` and the checksum.
    pub fn finalize(&mut self) {
        if !self.dirty {
            return;
        }

        let mut offset = HEADER_SIZE;
        for kind in DirectoryKind::ORDER {
            self.header.set_directory_offset(kind, offset as u32);
            offset += self.directories[kind.index()].len();
        }
        self.header.content_size = (offset - CONTENT_OFFSET) as u32;

        let header_bytes = self.header.to_bytes();
        let mut crc = checksum::fold(checksum::INITIAL, &header_bytes[CONTENT_OFFSET..]);
        for kind in DirectoryKind::ORDER {
            crc = checksum::fold(crc, self.directories[kind.index()].as_bytes());
        }
        self.crc32 = crc;
        self.dirty = false;
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    pub fn directory(&self, kind: DirectoryKind) -> &Directory {
        &self.directories[kind.index()]
    }

    pub fn directories(&self) -> impl Iterator<Item = &Directory> {
        self.directories.iter()
    }

    pub fn warnings(&self) -> &[ParseWarning] {
        &self.warnings
    }

    pub fn header(&mut self) -> &Header {
        self.finalize();
        &self.header
    }

    pub fn meta(&mut self) -> WappMeta {
        self.finalize();

        // Entries were validated on parse or encoded by us.
        let display_name = self
            .directory(DirectoryKind::DisplayName)
            .entries()
            .filter_map(Result::ok)
            .map(|e| {
                let value = match e.content {
                    Content::Text(s)   => s.to_owned(),
                    Content::Binary(b) => String::from_utf8_lossy(b).into_owned(),
                };
                (e.name.to_owned(), value)
            })
            .collect();

        WappMeta {
            file_version: self.header.file_version,
            content_size: self.header.content_size,
            app_type:     AppType::from(self.header.app_type),
            app_version:  AppVersion(self.header.app_version),
            crc32:        self.crc32,
            display_name,
        }
    }

    // ── Serialization ────────────────────────────────────────────────────────

    pub fn write<W: Write>(&mut self, mut writer: W) -> Result<(), WappError> {
        self.finalize();
        self.header.write(&mut writer)?;
        for dir in &self.directories {
            writer.write_all(dir.as_bytes())?;
        }
        writer.write_u32::<LittleEndian>(self.crc32)?;
        Ok(())
    }

    pub fn to_bytes(&mut self) -> Vec<u8> {
        self.finalize();
        let mut out = Vec::with_capacity(HEADER_SIZE + self.header.content_size as usize + CHECKSUM_SIZE);
        out.extend_from_slice(&self.header.to_bytes());
        for dir in &self.directories {
            out.extend_from_slice(dir.as_bytes());
        }
        out.extend_from_slice(&self.crc32.to_le_bytes());
        out
    }
}

/// Directory boundaries: eight starts plus the end of the last directory.
///
/// A zero offset means the directory is absent: it starts where the previous
/// directory ends, which is the next resolved start, so it is empty and its
/// neighbours keep their bytes.
fn resolve_offsets(header: &Header, end: usize) -> Result<[usize; 9], WappError> {
    let mut bounds = [0usize; 9];
    bounds[8] = end;

    for (slot, (_, kind)) in DIRECTORY_OFFSET_FIELDS.iter().enumerate().rev() {
        let raw = header.directory_offset(*kind);
        bounds[slot] = match (raw, slot) {
            (0, 0) => return Err(WappError::ZeroFirstOffset),
            (0, _) => bounds[slot + 1],
            (offset, _) => offset as usize,
        };
    }

    // Starts must lie between the header and the trailer and never run backwards.
    for (slot, (_, kind)) in DIRECTORY_OFFSET_FIELDS.iter().enumerate() {
        let start = bounds[slot];
        let lower = if slot == 0 { HEADER_SIZE } else { bounds[slot - 1] };
        if start < lower || start > end {
            return Err(WappError::OffsetOutOfRange {
                kind: *kind,
                offset: header.directory_offset(*kind),
            });
        }
    }
    Ok(bounds)
}

impl fmt::Display for WappFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut wapp = self.clone();
        let meta = wapp.meta();

        writeln!(f, "File version: {}", meta.file_version)?;
        writeln!(f, "File content size: {}", meta.content_size)?;
        writeln!(f, "File content crc32: {:#x}", meta.crc32)?;
        writeln!(f, "Application type: {}", meta.app_type)?;
        writeln!(f, "Application version: {}", meta.app_version)?;
        if let Some(name) = meta.display_name.get(crate::meta::DISPLAY_NAME_KEY) {
            writeln!(f, "Display name: {name}")?;
        }

        for dir in wapp.directories().filter(|d| !d.is_empty()) {
            write!(f, "\n{}:\n{dir}", dir.kind())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> WappFile {
        let names = BTreeMap::from([
            ("display_name".to_owned(), "Clock".to_owned()),
            ("theme_class".to_owned(), "dark".to_owned()),
        ]);
        let mut wapp = WappFile::new(AppType::Watchface, AppVersion([1, 2, 3]), Some(&names)).unwrap();
        wapp.add_entry(DirectoryKind::Script, "app.bin", &[1, 2, 3, 4]).unwrap();
        wapp.add_entry(DirectoryKind::Layout, "main", b"{}").unwrap();
        wapp
    }

    #[test]
    fn build_parse_round_trip() {
        let mut wapp = sample();
        let bytes = wapp.to_bytes();

        let mut parsed = WappFile::parse(&bytes).unwrap();
        assert!(parsed.warnings().is_empty());
        assert_eq!(parsed.meta(), wapp.meta());
        assert_eq!(parsed.to_bytes(), bytes);
    }

    #[test]
    fn empty_container_layout() {
        let mut wapp = WappFile::new(AppType::Application, AppVersion([0, 0, 1]), None).unwrap();
        let bytes = wapp.to_bytes();
        assert_eq!(bytes.len(), HEADER_SIZE + CHECKSUM_SIZE);

        let header = wapp.header().clone();
        assert_eq!(header.content_size as usize, HEADER_SIZE - CONTENT_OFFSET);
        for kind in DirectoryKind::ORDER {
            assert_eq!(header.directory_offset(kind) as usize, HEADER_SIZE);
        }
        assert_eq!(wapp.meta().crc32, checksum::crc32c(&bytes[CONTENT_OFFSET..HEADER_SIZE]));
    }

    #[test]
    fn write_matches_to_bytes() {
        let mut wapp = sample();
        let mut streamed = Vec::new();
        wapp.write(&mut streamed).unwrap();
        assert_eq!(streamed, wapp.to_bytes());
    }

    #[test]
    fn offsets_are_cumulative() {
        let mut wapp = sample();
        let script = wapp.directory(DirectoryKind::Script).len() as u32;
        let layout = wapp.directory(DirectoryKind::Layout).len() as u32;
        let header = wapp.header().clone();
        let base = HEADER_SIZE as u32;

        assert_eq!(header.directory_offset(DirectoryKind::Script), base);
        assert_eq!(header.directory_offset(DirectoryKind::Image), base + script);
        assert_eq!(header.directory_offset(DirectoryKind::Layout), base + script);
        assert_eq!(header.directory_offset(DirectoryKind::Unknown1), base + script + layout);
    }

    #[test]
    fn incremental_checksum_matches_one_pass() {
        let mut wapp = sample();
        let bytes = wapp.to_bytes();
        let end = bytes.len() - CHECKSUM_SIZE;
        assert_eq!(wapp.meta().crc32, checksum::crc32c(&bytes[CONTENT_OFFSET..end]));
    }

    #[test]
    fn mutation_marks_dirty() {
        let mut wapp = sample();
        let before = wapp.meta();
        wapp.add_entry(DirectoryKind::AppInfo, "info", &[0xAA]).unwrap();
        let after = wapp.meta();
        assert_eq!(after.content_size, before.content_size + 1 + 4 + 1 + 2 + 1);
        assert_ne!(after.crc32, before.crc32);

        wapp.clear_directory(DirectoryKind::AppInfo);
        assert_eq!(wapp.meta(), before);
    }

    #[test]
    fn magic_mismatch() {
        let mut bytes = sample().to_bytes();
        bytes[0] = 0;
        assert!(matches!(WappFile::parse(&bytes), Err(WappError::MagicMismatch { .. })));
        assert!(matches!(WappFile::parse(&[]), Err(WappError::MagicMismatch { found: 0 })));
    }

    #[test]
    fn size_mismatch() {
        let mut bytes = sample().to_bytes();
        bytes.push(0);
        assert!(matches!(WappFile::parse(&bytes), Err(WappError::SizeMismatch { .. })));
    }

    #[test]
    fn short_buffer() {
        let bytes = [0xFE, 0x15, 3, 0];
        assert!(matches!(WappFile::parse(&bytes), Err(WappError::Truncated { len: 4 })));
    }

    #[test]
    fn checksum_mismatch() {
        let mut bytes = sample().to_bytes();
        bytes[HEADER_SIZE + 2] ^= 0xFF;
        assert!(matches!(WappFile::parse(&bytes), Err(WappError::ChecksumMismatch { .. })));
    }

    #[test]
    fn preamble_is_not_checksummed() {
        let mut bytes = sample().to_bytes();
        bytes[0x04] = 0x7F;
        assert!(WappFile::parse(&bytes).is_ok());
    }
}
