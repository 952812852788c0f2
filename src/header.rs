use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use std::io::{self, Read, Write};
use crate::directory::DirectoryKind;

pub const MAGIC: u16 = 0x15FE;
pub const FILE_VERSION: u16 = 3;
pub const HEADER_SIZE: usize = 0x58;
/// Start of the checksummed region; `content_size` counts from here.
pub const CONTENT_OFFSET: usize = 0x0C;
pub const CHECKSUM_SIZE: usize = 4;

/// Byte position of each directory-offset field, joined to its kind.
pub const DIRECTORY_OFFSET_FIELDS: [(usize, DirectoryKind); 8] = [
    (0x18, DirectoryKind::Script),
    (0x1C, DirectoryKind::Image),
    (0x20, DirectoryKind::Layout),
    (0x24, DirectoryKind::Unknown1),
    (0x28, DirectoryKind::DisplayName),
    (0x2C, DirectoryKind::Config),
    (0x30, DirectoryKind::Unknown2),
    (0x34, DirectoryKind::AppInfo),
];

/// Fixed 88-byte container header.
///
/// ```text
/// 0x00 u16  magic          0x15FE
/// 0x02 u16  file_version   3
/// 0x04 [4]  reserved
/// 0x08 u32  content_size
/// 0x0C u8   app_type
/// 0x0D [3]  app_version
/// 0x10 [8]  reserved
/// 0x18 u32  directory offsets x8
/// 0x38 [32] reserved
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub magic: u16,
    pub file_version: u16,
    pub reserved_04: [u8; 4],
    pub content_size: u32,
    pub app_type: u8,
    pub app_version: [u8; 3],
    pub reserved_10: [u8; 8],
    /// Indexed by field slot, see [`DIRECTORY_OFFSET_FIELDS`].
    pub directory_offsets: [u32; 8],
    pub reserved_38: [u8; 32],
}

impl Header {
    pub fn new(app_type: u8, app_version: [u8; 3]) -> Self {
        Self {
            magic: MAGIC,
            file_version: FILE_VERSION,
            reserved_04: [0; 4],
            content_size: 0,
            app_type,
            app_version,
            reserved_10: [0; 8],
            directory_offsets: [0; 8],
            reserved_38: [0; 32],
        }
    }

    /// Field slot holding the start offset of `kind`. Offset fields follow
    /// directory order.
    #[inline]
    fn slot(kind: DirectoryKind) -> usize {
        kind.index()
    }

    pub fn directory_offset(&self, kind: DirectoryKind) -> u32 {
        self.directory_offsets[Self::slot(kind)]
    }

    pub fn set_directory_offset(&mut self, kind: DirectoryKind, offset: u32) {
        self.directory_offsets[Self::slot(kind)] = offset;
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_all(&self.to_bytes())
    }

    /// Serialize into a fixed-size buffer.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        LittleEndian::write_u16(&mut buf[0x00..0x02], self.magic);
        LittleEndian::write_u16(&mut buf[0x02..0x04], self.file_version);
        buf[0x04..0x08].copy_from_slice(&self.reserved_04);
        LittleEndian::write_u32(&mut buf[0x08..0x0C], self.content_size);
        buf[0x0C] = self.app_type;
        buf[0x0D..0x10].copy_from_slice(&self.app_version);
        buf[0x10..0x18].copy_from_slice(&self.reserved_10);
        for (offset, (pos, _)) in self.directory_offsets.iter().zip(DIRECTORY_OFFSET_FIELDS) {
            LittleEndian::write_u32(&mut buf[pos..pos + 4], *offset);
        }
        buf[0x38..HEADER_SIZE].copy_from_slice(&self.reserved_38);
        buf
    }

    /// Read the raw fields. Validation (magic, size, version) is left to the
    /// container, which knows the total buffer length.
    pub fn read<R: Read>(mut reader: R) -> io::Result<Self> {
        let magic = reader.read_u16::<LittleEndian>()?;
        let file_version = reader.read_u16::<LittleEndian>()?;
        let mut reserved_04 = [0u8; 4];
        reader.read_exact(&mut reserved_04)?;
        let content_size = reader.read_u32::<LittleEndian>()?;
        let app_type = reader.read_u8()?;
        let mut app_version = [0u8; 3];
        reader.read_exact(&mut app_version)?;
        let mut reserved_10 = [0u8; 8];
        reader.read_exact(&mut reserved_10)?;
        let mut directory_offsets = [0u32; 8];
        reader.read_u32_into::<LittleEndian>(&mut directory_offsets)?;
        let mut reserved_38 = [0u8; 32];
        reader.read_exact(&mut reserved_38)?;
        Ok(Self {
            magic,
            file_version,
            reserved_04,
            content_size,
            app_type,
            app_version,
            reserved_10,
            directory_offsets,
            reserved_38,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_positions() {
        let mut header = Header::new(2, [1, 2, 3]);
        header.content_size = 0x1122_3344;
        header.set_directory_offset(DirectoryKind::DisplayName, 0xAABB_CCDD);

        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), HEADER_SIZE);
        assert_eq!(&bytes[0x00..0x02], &[0xFE, 0x15]);
        assert_eq!(&bytes[0x02..0x04], &[3, 0]);
        assert_eq!(&bytes[0x08..0x0C], &[0x44, 0x33, 0x22, 0x11]);
        assert_eq!(bytes[0x0C], 2);
        assert_eq!(&bytes[0x0D..0x10], &[1, 2, 3]);
        assert_eq!(&bytes[0x28..0x2C], &[0xDD, 0xCC, 0xBB, 0xAA]);
    }

    #[test]
    fn write_matches_to_bytes() {
        let mut header = Header::new(2, [4, 5, 6]);
        header.reserved_10 = [0xEE; 8];
        header.set_directory_offset(DirectoryKind::AppInfo, 0x1234);
        let mut streamed = Vec::new();
        header.write(&mut streamed).unwrap();
        assert_eq!(streamed, header.to_bytes());
        assert_eq!(&streamed[0x34..0x38], &[0x34, 0x12, 0, 0]);
    }

    #[test]
    fn read_back_preserves_reserved_bytes() {
        let mut header = Header::new(1, [0, 0, 1]);
        header.reserved_04 = [9, 8, 7, 6];
        header.reserved_38[31] = 0x5A;
        let parsed = Header::read(&header.to_bytes()[..]).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn offset_fields_follow_directory_order() {
        for (slot, (pos, kind)) in DIRECTORY_OFFSET_FIELDS.iter().enumerate() {
            assert_eq!(*pos, 0x18 + slot * 4);
            assert_eq!(kind.index(), slot);
        }
    }
}
