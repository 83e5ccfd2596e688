use bitflags::bitflags;
use zerocopy::byteorder::little_endian::{U16, U32};
use zerocopy::{AsBytes, FromBytes, FromZeroes};

use crate::block_map::{resolve_block, BlockPointers, NUM_DIRECT_BLOCKS};
use crate::directory::{DirectoryEntries, DirectoryEntry};
use crate::error::{Error, Result};
use crate::superblock::{BlockAddress, InodeNumber};
use crate::transmute::cast_bytes_ref_offset;
use crate::volume::BlockReader;

/// See <https://www.nongnu.org/ext2-doc/ext2.html#inode-table>
///
/// Only the first 128 bytes are described; larger inode records carry extra
/// fields we don't read.
#[repr(C)]
#[derive(Debug, Clone, FromZeroes, FromBytes, AsBytes)]
struct RawInode {
    mode: U16,
    uid: U16,
    size_low: U32,
    atime: U32,
    ctime: U32,
    mtime: U32,
    dtime: U32,
    gid: U16,
    links_count: U16,
    blocks: U32,
    flags: U32,
    osd1: U32,
    direct_blocks: [U32; NUM_DIRECT_BLOCKS],
    singly_indirect_block: U32,
    doubly_indirect_block: U32,
    triply_indirect_block: U32,
    generation: U32,
    file_acl: U32,
    /// High 32 bits of file size. This is dir_acl in revision 0.
    size_high: U32,
    faddr: U32,
    osd2: [u8; 12],
}

/// A decoded inode. This is a snapshot of the on-disk record; reading its
/// data goes through whatever [`BlockReader`] it is handed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inode {
    number: InodeNumber,
    mode: InodeMode,
    uid: u16,
    gid: u16,
    atime: u32,
    ctime: u32,
    mtime: u32,
    dtime: u32,
    links_count: u16,
    size: u64,
    blocks: BlockPointers,
}

impl Inode {
    /// Decodes an inode record. `has_64bit_sizes` is false on revision 0
    /// images, where the upper size field means something else.
    pub fn parse(number: InodeNumber, bytes: &[u8], has_64bit_sizes: bool) -> Result<Self> {
        let raw: &RawInode = cast_bytes_ref_offset(bytes, 0, "inode")?;

        let size_high = if has_64bit_sizes {
            u64::from(raw.size_high.get())
        } else {
            0
        };

        let mut direct = [BlockAddress(0); NUM_DIRECT_BLOCKS];
        for (dst, src) in direct.iter_mut().zip(raw.direct_blocks.iter()) {
            *dst = BlockAddress(src.get());
        }

        Ok(Self {
            number,
            mode: InodeMode::from_bits_retain(raw.mode.get()),
            uid: raw.uid.get(),
            gid: raw.gid.get(),
            atime: raw.atime.get(),
            ctime: raw.ctime.get(),
            mtime: raw.mtime.get(),
            dtime: raw.dtime.get(),
            links_count: raw.links_count.get(),
            size: (size_high << 32) | u64::from(raw.size_low.get()),
            blocks: BlockPointers {
                direct,
                singly_indirect: BlockAddress(raw.singly_indirect_block.get()),
                doubly_indirect: BlockAddress(raw.doubly_indirect_block.get()),
                triply_indirect: BlockAddress(raw.triply_indirect_block.get()),
            },
        })
    }

    pub fn number(&self) -> InodeNumber {
        self.number
    }

    pub fn mode(&self) -> InodeMode {
        self.mode
    }

    pub fn file_type(&self) -> InodeFileType {
        self.mode.file_type()
    }

    pub fn is_dir(&self) -> bool {
        self.file_type() == InodeFileType::Directory
    }

    pub fn is_file(&self) -> bool {
        self.file_type() == InodeFileType::RegularFile
    }

    pub fn uid(&self) -> u16 {
        self.uid
    }

    pub fn gid(&self) -> u16 {
        self.gid
    }

    pub fn access_time(&self) -> u32 {
        self.atime
    }

    pub fn creation_time(&self) -> u32 {
        self.ctime
    }

    pub fn modified_time(&self) -> u32 {
        self.mtime
    }

    pub fn deleted_time(&self) -> u32 {
        self.dtime
    }

    pub fn links_count(&self) -> u16 {
        self.links_count
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn block_pointers(&self) -> &BlockPointers {
        &self.blocks
    }

    /// Physical block backing logical block `logical`, or `None` for a hole.
    pub fn resolve_block<B: BlockReader + ?Sized>(
        &self,
        reader: &B,
        logical: u64,
    ) -> Result<Option<BlockAddress>> {
        let pointers_per_block = reader.block_size().pointers_per_block();
        resolve_block(logical, &self.blocks, pointers_per_block, |block, index| {
            reader.read_block_pointer(block, index)
        })
    }

    /// Reads up to `length` bytes starting at byte `start`. The range is
    /// clamped to the file size, so fewer bytes (or none) may come back.
    /// Holes read as zeroes.
    pub fn read<B: BlockReader + ?Sized>(
        &self,
        reader: &B,
        start: u64,
        length: u32,
    ) -> Result<Vec<u8>> {
        let length = u64::from(length).min(self.size.saturating_sub(start));
        let mut data = vec![0; length as usize];

        let block_size = reader.block_size().bytes();
        let mut logical = start / block_size;
        let mut block_offset = (start % block_size) as usize;
        let mut filled = 0;
        while filled < data.len() {
            let chunk = (block_size as usize - block_offset).min(data.len() - filled);
            if let Some(physical) = self.resolve_block(reader, logical)? {
                reader.read_block_bytes(physical, block_offset, &mut data[filled..filled + chunk])?;
            }
            filled += chunk;
            logical += 1;
            block_offset = 0;
        }

        log::trace!(
            "read {} bytes at offset {start} of inode {}",
            data.len(),
            self.number
        );
        Ok(data)
    }

    /// Lists a directory. Deleted entries (inode 0) are skipped; everything
    /// else comes back in on-disk order.
    pub fn entries<B: BlockReader + ?Sized>(&self, reader: &B) -> Result<Vec<DirectoryEntry>> {
        if !self.is_dir() {
            return Err(Error::InvalidOperation(
                "directory entries requested from a non-directory inode",
            ));
        }

        // A directory can't be larger than the disk holding it.
        let capacity = u64::from(reader.block_count()) * reader.block_size().bytes();
        let length = u32::try_from(self.size)
            .ok()
            .filter(|_| self.size <= capacity)
            .ok_or_else(|| {
                Error::corrupt(format!(
                    "directory inode {} claims {} bytes on a {capacity} byte volume",
                    self.number, self.size
                ))
            })?;
        let data = self.read(reader, 0, length)?;
        DirectoryEntries::new(&data).collect()
    }
}

/// File format part of [`InodeMode`]. Formats are a 4-bit value, not a set of
/// flags: a socket (0xC000) contains the directory bit (0x4000).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum InodeFileType {
    Fifo,
    CharacterDevice,
    Directory,
    BlockDevice,
    RegularFile,
    SymbolicLink,
    Socket,
    Unknown,
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    /// <https://www.nongnu.org/ext2-doc/ext2.html#i-mode>
    pub struct InodeMode: u16 {
        // Access rights

        /// Others execute
        const IXOTH = 0x001;

        /// Others write
        const IWOTH = 0x002;

        /// Others read
        const IROTH = 0x004;

        /// Group execute
        const IXGRP = 0x008;

        /// Group write
        const IWGRP = 0x010;

        /// Group read
        const IRGRP = 0x020;

        /// User execute
        const IXUSR = 0x040;

        /// User write
        const IWUSR = 0x080;

        /// User read
        const IRUSR = 0x100;

        // Process execution user/group override

        /// Sticky bit
        const ISVTX = 0x200;

        /// Set process group id
        const ISGID = 0x400;

        /// Set process user id
        const ISUID = 0x800;

        // File format

        /// FIFO
        const IFIFO = 0x1000;

        /// Character device
        const IFCHR = 0x2000;

        /// Directory
        const IFDIR = 0x4000;

        /// Block device
        const IFBLK = 0x6000;

        /// Regular file
        const IFREG = 0x8000;

        /// Symbolic link
        const IFLNK = 0xA000;

        /// Socket
        const IFSOCK = 0xC000;
    }
}

impl InodeMode {
    const FORMAT_MASK: u16 = 0xF000;

    pub fn file_type(self) -> InodeFileType {
        match self.bits() & Self::FORMAT_MASK {
            0x1000 => InodeFileType::Fifo,
            0x2000 => InodeFileType::CharacterDevice,
            0x4000 => InodeFileType::Directory,
            0x6000 => InodeFileType::BlockDevice,
            0x8000 => InodeFileType::RegularFile,
            0xA000 => InodeFileType::SymbolicLink,
            0xC000 => InodeFileType::Socket,
            _ => InodeFileType::Unknown,
        }
    }

    /// Permission bits only, e.g. `0o755`.
    pub fn permissions(self) -> u16 {
        self.bits() & 0o7777
    }

    /// `ls -l` style rendering, e.g. `drwxr-xr-x`.
    pub fn to_mode_string(self) -> String {
        let type_char = match self.file_type() {
            InodeFileType::RegularFile => '-',
            InodeFileType::Directory => 'd',
            InodeFileType::BlockDevice => 'b',
            InodeFileType::CharacterDevice => 'c',
            InodeFileType::SymbolicLink => 'l',
            InodeFileType::Fifo => 'p',
            InodeFileType::Socket => 's',
            InodeFileType::Unknown => '?',
        };

        let triad = |read: Self, write: Self, exec: Self, special: Self, special_char: char| {
            let exec_char = match (self.contains(exec), self.contains(special)) {
                (true, true) => special_char,
                (false, true) => special_char.to_ascii_uppercase(),
                (true, false) => 'x',
                (false, false) => '-',
            };
            [
                if self.contains(read) { 'r' } else { '-' },
                if self.contains(write) { 'w' } else { '-' },
                exec_char,
            ]
        };

        let mut s = String::with_capacity(10);
        s.push(type_char);
        s.extend(triad(Self::IRUSR, Self::IWUSR, Self::IXUSR, Self::ISUID, 's'));
        s.extend(triad(Self::IRGRP, Self::IWGRP, Self::IXGRP, Self::ISGID, 's'));
        s.extend(triad(Self::IROTH, Self::IWOTH, Self::IXOTH, Self::ISVTX, 't'));
        s
    }
}
