use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};

use crate::directory::DirectoryEntry;
use crate::error::{Error, Result};
use crate::inode::{Inode, InodeFileType, InodeMode};
use crate::path::FilePath;
use crate::superblock::InodeNumber;
use crate::volume::Volume;

/// Longest single read a handle accepts, in bytes.
pub const MAX_READ_LENGTH: u64 = i32::MAX as u64 - 1;

/// An open file or directory on a [`Volume`], with a read cursor.
///
/// The inode is loaded once at open time. The handle borrows the volume, so
/// it cannot outlive it.
#[derive(Debug)]
pub struct Ext2File<'v, R = File> {
    volume: &'v Volume<R>,
    path: FilePath,
    inode: Inode,
    position: u64,
}

impl<'v, R: Read + Seek> Ext2File<'v, R> {
    /// Opens `path`, resolved from the root of `volume`.
    pub fn open(volume: &'v Volume<R>, path: &str) -> Result<Self> {
        let inode = volume.navigate(path)?;
        let path = FilePath::parse(path).unwrap_or_else(FilePath::root);
        let path = FilePath::root().join(&path);
        log::trace!("opened {path} (inode {})", inode.number());
        Ok(Self {
            volume,
            path,
            inode,
            position: 0,
        })
    }

    /// Opens `name` relative to this handle's path. `name` may hold several
    /// components; `.` and `..` are resolved lexically first.
    pub fn open_child(&self, name: &str) -> Result<Self> {
        let child = FilePath::parse(name).ok_or(Error::InvalidArgument("empty child name"))?;
        let path = self.path.join(&child).normalize();
        Self::open(self.volume, &path.to_string())
    }

    pub fn is_directory(&self) -> bool {
        self.inode.is_dir()
    }

    pub fn is_regular_file(&self) -> bool {
        self.inode.is_file()
    }

    /// Entries of this directory, including `.` and `..`, in on-disk order.
    pub fn entries(&self) -> Result<Vec<DirectoryEntry>> {
        if !self.is_directory() {
            return Err(Error::InvalidOperation("listing entries of a non-directory"));
        }
        self.inode.entries(self.volume)
    }

    /// Moves the cursor. Positions past the end are allowed; reading from
    /// there fails.
    pub fn seek(&mut self, position: i64) -> Result<u64> {
        let position =
            u64::try_from(position).map_err(|_| Error::InvalidArgument("negative seek position"))?;
        self.position = position;
        Ok(position)
    }

    /// Reads exactly `length` bytes at the cursor and advances it.
    pub fn read(&mut self, length: u64) -> Result<Vec<u8>> {
        self.read_at(self.position, length)
    }

    /// Reads exactly `length` bytes at `start`. On success the cursor moves
    /// to `start + length`; on failure it stays put.
    pub fn read_at(&mut self, start: u64, length: u64) -> Result<Vec<u8>> {
        if length > MAX_READ_LENGTH {
            return Err(Error::InvalidArgument(
                "read length must be below 2^31 - 1 bytes",
            ));
        }

        let size = self.size();
        if start.checked_add(length).map_or(true, |end| end > size) {
            return Err(Error::OutOfBounds {
                offset: start,
                length,
                size,
            });
        }

        let data = self.inode.read(self.volume, start, length as u32)?;
        self.position = start + length;
        Ok(data)
    }

    /// The whole file from the beginning, leaving the cursor at the end.
    pub fn read_all(&mut self) -> Result<Vec<u8>> {
        self.read_at(0, self.size())
    }
}

impl<R> Ext2File<'_, R> {
    pub fn path(&self) -> &FilePath {
        &self.path
    }

    /// Last path component, or `/` for the root.
    pub fn file_name(&self) -> &str {
        self.path.file_name().unwrap_or("/")
    }

    /// `None` for the root.
    pub fn parent_path(&self) -> Option<FilePath> {
        self.path.parent()
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn inode(&self) -> &Inode {
        &self.inode
    }

    pub fn inode_number(&self) -> InodeNumber {
        self.inode.number()
    }

    pub fn file_type(&self) -> InodeFileType {
        self.inode.file_type()
    }

    pub fn size(&self) -> u64 {
        self.inode.size()
    }

    pub fn mode(&self) -> InodeMode {
        self.inode.mode()
    }

    pub fn uid(&self) -> u16 {
        self.inode.uid()
    }

    pub fn gid(&self) -> u16 {
        self.inode.gid()
    }

    pub fn hard_links(&self) -> u16 {
        self.inode.links_count()
    }

    pub fn access_time(&self) -> u32 {
        self.inode.access_time()
    }

    pub fn creation_time(&self) -> u32 {
        self.inode.creation_time()
    }

    pub fn modified_time(&self) -> u32 {
        self.inode.modified_time()
    }

    pub fn deleted_time(&self) -> u32 {
        self.inode.deleted_time()
    }
}

/// Streaming access. Unlike [`Ext2File::read`], short reads at the end of the
/// file are fine here.
impl<R: Read + Seek> Read for Ext2File<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.size().saturating_sub(self.position);
        let length = (buf.len() as u64).min(remaining).min(MAX_READ_LENGTH);
        if length == 0 {
            return Ok(0);
        }

        let data = self.inode.read(self.volume, self.position, length as u32)?;
        buf[..data.len()].copy_from_slice(&data);
        self.position += data.len() as u64;
        Ok(data.len())
    }
}

impl<R: Read + Seek> Seek for Ext2File<'_, R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => self.size().checked_add_signed(delta),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
        };
        let Some(target) = target else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek to a negative or overflowing position",
            ));
        };
        self.position = target;
        Ok(target)
    }
}
