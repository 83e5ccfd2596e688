use zerocopy::byteorder::little_endian::{U16, U32};
use zerocopy::{AsBytes, FromBytes, FromZeroes};

use crate::error::{Error, Result};
use crate::superblock::InodeNumber;
use crate::transmute::cast_bytes_ref_offset;

/// See <https://www.nongnu.org/ext2-doc/ext2.html#linked-directory-entry-structure>
#[repr(C)]
#[derive(Debug, Clone, FromZeroes, FromBytes, AsBytes)]
struct DirectoryEntryHeader {
    inode: U32,
    rec_len: U16,
    name_len: u8,
    raw_file_type: u8,
}

const HEADER_SIZE: usize = core::mem::size_of::<DirectoryEntryHeader>();

/// From: <https://www.nongnu.org/ext2-doc/ext2.html#ifdir-rec-len>
///
/// The directory entries must be aligned on 4 bytes boundaries and there
/// cannot be any directory entry spanning multiple data blocks.
fn required_space(name_len: usize) -> usize {
    (HEADER_SIZE + name_len).next_multiple_of(4)
}

/// One record of a linked directory, decoded and owned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    inode: InodeNumber,
    rec_len: u16,
    raw_file_type: u8,
    name: String,
}

impl DirectoryEntry {
    /// Entry with the smallest record length that holds `name`.
    pub fn new(inode: InodeNumber, name: &str, file_type: DirectoryEntryFileType) -> Result<Self> {
        if name.len() > usize::from(u8::MAX) {
            return Err(Error::InvalidArgument(
                "directory entry names are at most 255 bytes",
            ));
        }
        Ok(Self {
            inode,
            rec_len: required_space(name.len()) as u16,
            raw_file_type: file_type as u8,
            name: name.to_string(),
        })
    }

    /// Stretches the record, e.g. to cover the rest of a block.
    pub fn with_record_length(mut self, rec_len: u16) -> Result<Self> {
        if usize::from(rec_len) < self.required_space() || rec_len % 4 != 0 {
            return Err(Error::InvalidArgument(
                "record length must be aligned and hold the name",
            ));
        }
        self.rec_len = rec_len;
        Ok(self)
    }

    /// Decodes the record starting at `offset`. The whole record, including
    /// the slack after the name, must lie inside `bytes`.
    pub fn parse(bytes: &[u8], offset: usize) -> Result<Self> {
        let header: &DirectoryEntryHeader =
            cast_bytes_ref_offset(bytes, offset, "directory entry header")?;
        let rec_len = usize::from(header.rec_len.get());
        let name_len = usize::from(header.name_len);

        if rec_len == 0 {
            return Err(Error::corrupt(format!(
                "directory entry at offset {offset} has a zero record length"
            )));
        }
        if rec_len < HEADER_SIZE + name_len {
            return Err(Error::corrupt(format!(
                "directory entry at offset {offset} has record length {rec_len}, \
                 too short for a {name_len} byte name"
            )));
        }
        if offset + rec_len > bytes.len() {
            return Err(Error::corrupt(format!(
                "directory entry at offset {offset} with record length {rec_len} \
                 runs past the end of the directory ({} bytes)",
                bytes.len()
            )));
        }

        let name_start = offset + HEADER_SIZE;
        let name = String::from_utf8_lossy(&bytes[name_start..name_start + name_len]);

        Ok(Self {
            inode: InodeNumber(header.inode.get()),
            rec_len: header.rec_len.get(),
            raw_file_type: header.raw_file_type,
            name: name.into_owned(),
        })
    }

    /// On-disk form, `rec_len` bytes long with zeroed slack.
    pub fn to_bytes(&self) -> Vec<u8> {
        let header = DirectoryEntryHeader {
            inode: U32::new(self.inode.0),
            rec_len: U16::new(self.rec_len),
            name_len: self.name.len() as u8,
            raw_file_type: self.raw_file_type,
        };
        let mut bytes = vec![0; usize::from(self.rec_len)];
        bytes[..HEADER_SIZE].copy_from_slice(header.as_bytes());
        bytes[HEADER_SIZE..HEADER_SIZE + self.name.len()].copy_from_slice(self.name.as_bytes());
        bytes
    }

    pub fn inode_number(&self) -> InodeNumber {
        self.inode
    }

    pub fn record_length(&self) -> u16 {
        self.rec_len
    }

    pub fn required_space(&self) -> usize {
        required_space(self.name.len())
    }

    pub fn raw_file_type(&self) -> u8 {
        self.raw_file_type
    }

    pub fn file_type(&self) -> DirectoryEntryFileType {
        self.raw_file_type.into()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Inode 0 marks a deleted (or never used) record.
    pub fn is_in_use(&self) -> bool {
        self.inode.0 != 0
    }

    pub fn is_file(&self) -> bool {
        self.file_type() == DirectoryEntryFileType::RegularFile
    }

    pub fn is_dir(&self) -> bool {
        self.file_type() == DirectoryEntryFileType::Directory
    }
}

/// Walks the records of a directory's data, skipping unused ones. Stops
/// after the first malformed record.
#[derive(Debug)]
pub struct DirectoryEntries<'a> {
    bytes: &'a [u8],
    offset: usize,
    failed: bool,
}

impl<'a> DirectoryEntries<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            offset: 0,
            failed: false,
        }
    }
}

impl Iterator for DirectoryEntries<'_> {
    type Item = Result<DirectoryEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.failed && self.offset < self.bytes.len() {
            let entry = match DirectoryEntry::parse(self.bytes, self.offset) {
                Ok(entry) => entry,
                Err(err) => {
                    self.failed = true;
                    return Some(Err(err));
                }
            };
            self.offset += usize::from(entry.record_length());
            if entry.is_in_use() {
                return Some(Ok(entry));
            }
        }
        None
    }
}

#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DirectoryEntryFileType {
    Unknown = 0,
    RegularFile = 1,
    Directory = 2,
    CharacterDevice = 3,
    BlockDevice = 4,
    Fifo = 5,
    Socket = 6,
    SymbolicLink = 7,
}

impl From<u8> for DirectoryEntryFileType {
    fn from(raw: u8) -> Self {
        match raw {
            1 => Self::RegularFile,
            2 => Self::Directory,
            3 => Self::CharacterDevice,
            4 => Self::BlockDevice,
            5 => Self::Fifo,
            6 => Self::Socket,
            7 => Self::SymbolicLink,
            _ => Self::Unknown,
        }
    }
}
