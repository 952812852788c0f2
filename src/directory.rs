//! Directory kinds and the entry codec used inside every directory.
//!
//! An entry on disk is:
//!
//! ```text
//! u8   name_len            name bytes + 1 (terminator)
//! [u8] name                UTF-8, NUL-terminated
//! u16  size   (LE)         content bytes (+1 in text directories)
//! [u8] content             (+ NUL in text directories)
//! ```
//!
//! Entries are packed back to back with no padding or count; a directory ends
//! where the next one starts.

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use log::warn;
use std::fmt;
use std::io::{self, Write};
use thiserror::Error;

/// Longest encodable name: `u8::MAX` minus the terminator.
pub const MAX_NAME_LEN: usize = 0xFE;
/// Largest value the `u16` size field can carry.
pub const MAX_CONTENT_SIZE: usize = u16::MAX as usize;

// ── DirectoryKind ────────────────────────────────────────────────────────────

/// The eight directories of a container. Declaration order is the on-disk
/// order and the order the checksum walks them in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DirectoryKind {
    Script,
    Image,
    Layout,
    Unknown1,
    DisplayName,
    Config,
    Unknown2,
    AppInfo,
}

impl DirectoryKind {
    pub const ORDER: [DirectoryKind; 8] = [
        DirectoryKind::Script,
        DirectoryKind::Image,
        DirectoryKind::Layout,
        DirectoryKind::Unknown1,
        DirectoryKind::DisplayName,
        DirectoryKind::Config,
        DirectoryKind::Unknown2,
        DirectoryKind::AppInfo,
    ];

    /// Position in [`DirectoryKind::ORDER`].
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Text directories hold NUL-terminated UTF-8 content.
    pub fn is_text(self) -> bool {
        matches!(
            self,
            DirectoryKind::Layout | DirectoryKind::DisplayName | DirectoryKind::Config
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            DirectoryKind::Script      => "SCRIPT",
            DirectoryKind::Image       => "IMAGE",
            DirectoryKind::Layout      => "LAYOUT",
            DirectoryKind::Unknown1    => "UNKNOWN_1",
            DirectoryKind::DisplayName => "DISPLAY_NAME",
            DirectoryKind::Config      => "CONFIG",
            DirectoryKind::Unknown2    => "UNKNOWN_2",
            DirectoryKind::AppInfo     => "APP_INFO",
        }
    }

    /// Lower-case name, used for extraction sub-directories.
    pub fn dir_name(self) -> &'static str {
        match self {
            DirectoryKind::Script      => "script",
            DirectoryKind::Image       => "image",
            DirectoryKind::Layout      => "layout",
            DirectoryKind::Unknown1    => "unknown_1",
            DirectoryKind::DisplayName => "display_name",
            DirectoryKind::Config      => "config",
            DirectoryKind::Unknown2    => "unknown_2",
            DirectoryKind::AppInfo     => "app_info",
        }
    }
}

impl fmt::Display for DirectoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ── Errors ───────────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("Truncated entry at offset {offset}: need {needed} bytes, {available} left")]
    TruncatedEntry { offset: usize, needed: usize, available: usize },
    #[error("Entry at offset {offset} has a zero-length name field")]
    InvalidNameLength { offset: usize },
    #[error("Entry at offset {offset} is not valid UTF-8")]
    InvalidUtf8 { offset: usize },
    #[error("Content of '{name}' is too large: {size} bytes (max 65535)")]
    ContentTooLarge { name: String, size: usize },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

// ── Entry ────────────────────────────────────────────────────────────────────

/// Entry payload, borrowed from the directory buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Content<'a> {
    Binary(&'a [u8]),
    /// Text with the terminator stripped.
    Text(&'a str),
}

impl<'a> Content<'a> {
    pub fn as_bytes(&self) -> &'a [u8] {
        match *self {
            Content::Binary(b) => b,
            Content::Text(s)   => s.as_bytes(),
        }
    }

    pub fn as_text(&self) -> Option<&'a str> {
        match *self {
            Content::Text(s)   => Some(s),
            Content::Binary(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry<'a> {
    pub name:    &'a str,
    /// Size field as stored, including the terminator in text directories.
    pub size:    u16,
    pub content: Content<'a>,
}

impl fmt::Display for Entry<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>5} {}", self.size, self.name)
    }
}

// ── Encoding ─────────────────────────────────────────────────────────────────

/// Cut `name` to at most [`MAX_NAME_LEN`] bytes without splitting a UTF-8
/// sequence.
pub fn truncate_name(name: &str) -> &str {
    let bytes = name.as_bytes();
    if bytes.len() <= MAX_NAME_LEN {
        return name;
    }
    let mut cut = MAX_NAME_LEN;
    while cut > 0 && bytes[cut] & 0xC0 == 0x80 {
        cut -= 1;
    }
    warn!("file name too long, trimming to {cut} bytes: {name}");
    &name[..cut]
}

/// Write one entry. Nothing is written if the content does not fit.
pub fn encode_entry<W: Write>(
    mut writer: W,
    name: &str,
    content: &[u8],
    text: bool,
) -> Result<(), DirectoryError> {
    let size = content.len() + usize::from(text);
    if size > MAX_CONTENT_SIZE {
        return Err(DirectoryError::ContentTooLarge { name: name.to_owned(), size });
    }
    let name = truncate_name(name).as_bytes();

    writer.write_u8(name.len() as u8 + 1)?;
    writer.write_all(name)?;
    writer.write_u8(0)?;
    writer.write_u16::<LittleEndian>(size as u16)?;
    writer.write_all(content)?;
    if text {
        writer.write_u8(0)?;
    }
    Ok(())
}

// ── Decoding ─────────────────────────────────────────────────────────────────

/// Lazily decode the entries of a directory buffer.
pub fn decode_entries(buf: &[u8], text: bool) -> Entries<'_> {
    Entries { buf, pos: 0, text, failed: false }
}

/// Iterator over a directory buffer. Stops after the first error.
#[derive(Debug, Clone)]
pub struct Entries<'a> {
    buf:    &'a [u8],
    pos:    usize,
    text:   bool,
    failed: bool,
}

impl<'a> Entries<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], DirectoryError> {
        let available = self.buf.len() - self.pos;
        if n > available {
            return Err(DirectoryError::TruncatedEntry { offset: self.pos, needed: n, available });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn next_entry(&mut self) -> Result<Entry<'a>, DirectoryError> {
        let start = self.pos;

        let name_len = self.take(1)?[0] as usize;
        if name_len == 0 {
            return Err(DirectoryError::InvalidNameLength { offset: start });
        }
        let name_field = self.take(name_len)?;
        let name = std::str::from_utf8(&name_field[..name_len - 1])
            .map_err(|_| DirectoryError::InvalidUtf8 { offset: start })?;

        let size = LittleEndian::read_u16(self.take(2)?);
        let raw = self.take(size as usize)?;

        let content = if self.text {
            let body = raw.split_last().map_or(raw, |(_, rest)| rest);
            Content::Text(
                std::str::from_utf8(body).map_err(|_| DirectoryError::InvalidUtf8 { offset: start })?,
            )
        } else {
            Content::Binary(raw)
        };

        Ok(Entry { name, size, content })
    }
}

impl<'a> Iterator for Entries<'a> {
    type Item = Result<Entry<'a>, DirectoryError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pos >= self.buf.len() {
            return None;
        }
        let item = self.next_entry();
        self.failed = item.is_err();
        Some(item)
    }
}

// ── Directory ────────────────────────────────────────────────────────────────

/// Encoded entries of one directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directory {
    kind: DirectoryKind,
    buf:  Vec<u8>,
}

impl Directory {
    pub fn new(kind: DirectoryKind) -> Self {
        Self { kind, buf: Vec::new() }
    }

    pub(crate) fn from_bytes(kind: DirectoryKind, buf: Vec<u8>) -> Self {
        Self { kind, buf }
    }

    pub fn kind(&self) -> DirectoryKind { self.kind }
    pub fn is_text(&self) -> bool { self.kind.is_text() }
    pub fn is_empty(&self) -> bool { self.buf.is_empty() }
    pub fn len(&self) -> usize { self.buf.len() }
    pub fn as_bytes(&self) -> &[u8] { &self.buf }

    /// Restartable: each call decodes from the start of the buffer.
    pub fn entries(&self) -> Entries<'_> {
        decode_entries(&self.buf, self.is_text())
    }

    pub(crate) fn push(&mut self, name: &str, content: &[u8]) -> Result<(), DirectoryError> {
        let text = self.is_text();
        encode_entry(&mut self.buf, name, content, text)
    }

    pub(crate) fn clear(&mut self) {
        self.buf.clear();
    }
}

impl fmt::Display for Directory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in self.entries() {
            match entry {
                Ok(e)  => writeln!(f, " {e}")?,
                Err(e) => writeln!(f, " <{e}>")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(name: &str, content: &[u8], text: bool) -> Vec<u8> {
        let mut out = Vec::new();
        encode_entry(&mut out, name, content, text).unwrap();
        out
    }

    #[test]
    fn binary_entry_layout() {
        let bytes = encode("app", &[0xDE, 0xAD], false);
        assert_eq!(bytes, [4, b'a', b'p', b'p', 0, 2, 0, 0xDE, 0xAD]);
    }

    #[test]
    fn text_entry_counts_terminator() {
        let bytes = encode("k", b"hi", true);
        assert_eq!(bytes, [2, b'k', 0, 3, 0, b'h', b'i', 0]);

        let entry = decode_entries(&bytes, true).next().unwrap().unwrap();
        assert_eq!(entry.name, "k");
        assert_eq!(entry.size, 3);
        assert_eq!(entry.content, Content::Text("hi"));
    }

    #[test]
    fn long_ascii_name_cut_at_254() {
        let name = "a".repeat(300);
        let bytes = encode(&name, b"", false);
        assert_eq!(bytes[0] as usize, MAX_NAME_LEN + 1);
        assert_eq!(bytes[MAX_NAME_LEN + 1], 0);
    }

    #[test]
    fn truncation_backs_off_to_char_boundary() {
        // 253 ASCII bytes then a 3-byte char straddling byte 254.
        let name = format!("{}€{}", "a".repeat(253), "b".repeat(44));
        assert_eq!(name.len(), 300);
        let cut = truncate_name(&name);
        assert_eq!(cut.len(), 253);
        assert!(cut.chars().all(|c| c == 'a'));

        let bytes = encode(&name, b"x", false);
        let entry = decode_entries(&bytes, false).next().unwrap().unwrap();
        assert_eq!(entry.name, cut);
    }

    #[test]
    fn truncation_keeps_char_ending_at_boundary() {
        // Two-byte chars: 127 of them end exactly at byte 254.
        let name = "é".repeat(150);
        let cut = truncate_name(&name);
        assert_eq!(cut.len(), 254);
        assert_eq!(cut.chars().count(), 127);
    }

    #[test]
    fn content_too_large_writes_nothing() {
        let mut out = Vec::new();
        let big = vec![0u8; MAX_CONTENT_SIZE];
        let err = encode_entry(&mut out, "big", &big, true).unwrap_err();
        assert!(matches!(err, DirectoryError::ContentTooLarge { size, .. } if size == MAX_CONTENT_SIZE + 1));
        assert!(out.is_empty());

        encode_entry(&mut out, "big", &big, false).unwrap();
    }

    #[test]
    fn decode_multiple_and_restart() {
        let mut dir = Directory::new(DirectoryKind::Script);
        dir.push("one", b"1").unwrap();
        dir.push("two", b"22").unwrap();

        for _ in 0..2 {
            let names: Vec<_> = dir.entries().map(|e| e.unwrap().name).collect();
            assert_eq!(names, ["one", "two"]);
        }
    }

    #[test]
    fn truncated_size_field_is_error() {
        let mut bytes = encode("name", b"abcdef", false);
        bytes.truncate(bytes.len() - 3);
        let mut it = decode_entries(&bytes, false);
        assert!(matches!(it.next(), Some(Err(DirectoryError::TruncatedEntry { .. }))));
        assert!(it.next().is_none());
    }

    #[test]
    fn name_running_past_end_is_error() {
        let bytes = [10u8, b'a', b'b'];
        let err = decode_entries(&bytes, false).next().unwrap().unwrap_err();
        assert!(matches!(err, DirectoryError::TruncatedEntry { offset: 1, needed: 10, available: 2 }));
    }

    #[test]
    fn zero_name_length_is_error() {
        let bytes = [0u8, 0, 0];
        let err = decode_entries(&bytes, false).next().unwrap().unwrap_err();
        assert!(matches!(err, DirectoryError::InvalidNameLength { offset: 0 }));
    }

    #[test]
    fn text_directories() {
        let text: Vec<_> = DirectoryKind::ORDER.iter().filter(|k| k.is_text()).collect();
        assert_eq!(text, [&DirectoryKind::Layout, &DirectoryKind::DisplayName, &DirectoryKind::Config]);
    }

    #[test]
    fn order_matches_index() {
        for (i, kind) in DirectoryKind::ORDER.iter().enumerate() {
            assert_eq!(kind.index(), i);
        }
    }
}
