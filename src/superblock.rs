use std::borrow::Cow;
use std::fmt;
use std::ops::Add;

use bitflags::bitflags;
use zerocopy::byteorder::little_endian::{U16, U32};
use zerocopy::{AsBytes, FromBytes, FromZeroes};

use crate::error::{Error, Result};
use crate::strings::CStringBytes;
use crate::transmute::cast_bytes_ref_offset;

/// See <https://www.nongnu.org/ext2-doc/ext2.html#superblock>
#[repr(C)]
#[derive(Debug, Clone, FromZeroes, FromBytes, AsBytes)]
pub struct Superblock {
    inodes_count: U32,
    blocks_count: U32,
    reserved_blocks_count: U32,
    free_blocks_count: U32,
    free_inodes_count: U32,
    first_data_block: U32,
    log_block_size: U32,
    log_frag_size: U32,
    blocks_per_group: U32,
    frags_per_group: U32,
    inodes_per_group: U32,
    mount_time: U32,
    write_time: U32,
    mount_count: U16,
    max_mount_count: U16,
    magic: U16,
    state: U16,
    errors: U16,
    minor_rev_level: U16,
    lastcheck: U32,
    checkinterval: U32,
    creator_os: U32,
    rev_level: U32,
    def_resuid: U16,
    def_resgid: U16,

    // EXT2_DYNAMIC_REV Specific
    first_ino: U32,
    inode_size: U16,
    block_group_nr: U16,
    feature_compat: U32,
    feature_incompat: U32,
    feature_ro_compat: U32,
    uuid: UUID,
    volume_name: CStringBytes<[u8; 16]>,
    last_mounted: CStringBytes<[u8; 64]>,
    algo_bitmap: U32,

    // Performance Hints
    prealloc_blocks: u8,
    prealloc_dir_blocks: u8,
    padding1: U16,

    // Journaling Support
    journal_uuid: UUID,
    journal_inum: U32,
    journal_dev: U32,
    last_orphan: U32,

    // Directory Indexing Support
    hash_seed: [U32; 4],
    def_hash_version: u8,
    padding2: [u8; 3],

    // Other options
    default_mount_options: U32,
    first_meta_bg: U32,
}

impl Superblock {
    /// The superblock is always located at byte offset 1024 from the beginning of
    /// the file, block device or partition formatted with Ext2 and later variants
    /// (Ext3, Ext4).
    pub const OFFSET_BYTES: OffsetBytes = OffsetBytes(1024);

    /// The superblock occupies a full 1KiB regardless of the block size.
    pub const SIZE_BYTES: usize = 1024;

    /// 16bit value identifying the file system as Ext2. The value is currently
    /// fixed to EXT2_SUPER_MAGIC of value 0xEF53.
    /// <https://www.nongnu.org/ext2-doc/ext2.html#s-magic>
    pub const MAGIC: u16 = 0xEF53;

    /// Revision 0 images have no `inode_size` field; every inode is 128 bytes.
    pub const GOOD_OLD_INODE_SIZE: u16 = 128;

    /// Largest `log_block_size` we accept (64KiB blocks).
    const MAX_LOG_BLOCK_SIZE: u32 = 6;

    /// Decodes the superblock from the 1024 bytes found at
    /// [`Superblock::OFFSET_BYTES`]. Only fails if `bytes` is too short.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        cast_bytes_ref_offset::<Self>(bytes, 0, "superblock").cloned()
    }

    /// Checks the fields the rest of the crate divides by or shifts with.
    pub fn validate(&self) -> Result<()> {
        if !self.magic_valid() {
            return Err(Error::corrupt(format!(
                "bad superblock magic {:#06X}, expected {:#06X}",
                self.magic(),
                Self::MAGIC
            )));
        }
        if self.log_block_size.get() > Self::MAX_LOG_BLOCK_SIZE {
            return Err(Error::corrupt(format!(
                "unsupported log block size {}",
                self.log_block_size.get()
            )));
        }
        if self.blocks_per_group.get() == 0 || self.inodes_per_group.get() == 0 {
            return Err(Error::corrupt("block group geometry has a zero count"));
        }
        // Each group's bitmaps are a single block.
        let bits_per_block = u64::from(u32::from(self.block_size())) * 8;
        if u64::from(self.blocks_per_group.get()) > bits_per_block
            || u64::from(self.inodes_per_group.get()) > bits_per_block
        {
            return Err(Error::corrupt(format!(
                "{} blocks and {} inodes per group do not fit one bitmap block",
                self.blocks_per_group.get(),
                self.inodes_per_group.get()
            )));
        }
        if self.first_data_block.get() >= self.blocks_count() {
            return Err(Error::corrupt(format!(
                "first data block {} outside a volume of {} blocks",
                self.first_data_block.get(),
                self.blocks_count()
            )));
        }
        let groups_by_inodes = self.inodes_count().div_ceil(self.inodes_per_group()) as usize;
        if groups_by_inodes != self.num_block_groups() {
            return Err(Error::corrupt(format!(
                "{} block groups by block count but {groups_by_inodes} by inode count",
                self.num_block_groups()
            )));
        }
        Ok(())
    }

    pub fn magic(&self) -> u16 {
        self.magic.get()
    }

    pub fn magic_valid(&self) -> bool {
        self.magic() == Self::MAGIC
    }

    pub fn inodes_count(&self) -> u32 {
        self.inodes_count.get()
    }

    pub fn blocks_count(&self) -> u32 {
        self.blocks_count.get()
    }

    pub fn blocks_per_group(&self) -> u32 {
        self.blocks_per_group.get()
    }

    pub fn inodes_per_group(&self) -> u32 {
        self.inodes_per_group.get()
    }

    pub fn first_data_block(&self) -> BlockAddress {
        BlockAddress(self.first_data_block.get())
    }

    pub fn rev_level(&self) -> u32 {
        self.rev_level.get()
    }

    pub fn volume_label(&self) -> Cow<'_, str> {
        self.volume_name.as_str()
    }

    pub fn last_mounted(&self) -> Cow<'_, str> {
        self.last_mounted.as_str()
    }

    pub fn uuid(&self) -> UUID {
        self.uuid
    }

    pub fn feature_compat(&self) -> FeatureCompatFlags {
        FeatureCompatFlags::from_bits_retain(self.feature_compat.get())
    }

    pub fn feature_incompat(&self) -> FeatureIncompatFlags {
        FeatureIncompatFlags::from_bits_retain(self.feature_incompat.get())
    }

    pub fn feature_ro_compat(&self) -> FeatureReadOnlyCompatFlags {
        FeatureReadOnlyCompatFlags::from_bits_retain(self.feature_ro_compat.get())
    }

    /// The block size is computed using this 32bit value as the number of bits
    /// to shift left the value 1024. This value may only be non-negative.
    ///
    /// ```text
    /// block size = 1024 << s_log_block_size;
    /// ```
    ///
    /// Common block sizes include 1KiB, 2KiB, 4KiB and 8Kib. A field that
    /// shifts the size out of range falls back to 1KiB; `validate` rejects it.
    pub fn block_size(&self) -> BlockSize {
        match 1024_u32.checked_shl(self.log_block_size.get()) {
            Some(size) if size != 0 => BlockSize(size),
            _ => BlockSize::MIN,
        }
    }

    /// Size of one on-disk inode record.
    pub fn inode_size(&self) -> u16 {
        match (self.rev_level(), self.inode_size.get()) {
            (0, _) | (_, 0) => Self::GOOD_OLD_INODE_SIZE,
            (_, size) => size,
        }
    }

    /// Revision 0 has no upper 32 bits of file size (the field is `dir_acl`).
    pub fn has_64bit_file_sizes(&self) -> bool {
        self.rev_level() != 0
    }

    /// The block descriptor table is usually right after the superblock, but
    /// the location is `first_data_block + 1`.
    pub fn block_descriptor_table_start_block(&self) -> Result<BlockAddress> {
        self.first_data_block()
            .checked_add(1)
            .ok_or_else(|| Error::corrupt("block descriptor table is past the last block"))
    }

    pub fn num_block_groups(&self) -> usize {
        let num_blocks = self.blocks_count() as usize;
        let blocks_per_group = self.blocks_per_group() as usize;
        num_blocks.div_ceil(blocks_per_group)
    }

    /// Total size of the volume in bytes.
    pub fn capacity(&self) -> u64 {
        u64::from(self.blocks_count()) * self.block_size().bytes()
    }

    /// Index for the block group containing the inode.
    pub fn inode_location(&self, inode_number: InodeNumber) -> (BlockGroupIndex, LocalInodeIndex) {
        let inode_index = inode_number.0 - 1;
        let block_group_index = BlockGroupIndex(inode_index / self.inodes_per_group());
        let local_inode_index = LocalInodeIndex(inode_index % self.inodes_per_group());
        (block_group_index, local_inode_index)
    }

    /// See <https://www.nongnu.org/ext2-doc/ext2.html#inode-table>
    ///
    /// Byte offset of an inode record, given the first block of its group's
    /// inode table.
    pub fn inode_offset(
        &self,
        table_address: BlockAddress,
        local_inode_index: LocalInodeIndex,
    ) -> OffsetBytes {
        let table_start = self.block_address_bytes(table_address);
        let offset_in_table = u64::from(self.inode_size()) * u64::from(local_inode_index.0);
        table_start + OffsetBytes(offset_in_table)
    }

    pub fn block_address_bytes(&self, address: BlockAddress) -> OffsetBytes {
        OffsetBytes(u64::from(address.0) * self.block_size().bytes())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BlockSize(u32);

impl BlockSize {
    pub const MIN: Self = Self(1024);

    pub fn bytes(self) -> u64 {
        u64::from(self.0)
    }

    /// How many 32-bit block addresses fit into one indirect block.
    pub fn pointers_per_block(self) -> u32 {
        self.0 / 4
    }
}

impl From<BlockSize> for u32 {
    fn from(value: BlockSize) -> Self {
        value.0
    }
}

impl From<BlockSize> for usize {
    fn from(value: BlockSize) -> Self {
        value.0 as Self
    }
}

/// Address of a block in the filesystem. Zero means "no block" wherever a
/// block address is stored on disk.
#[repr(transparent)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockAddress(pub u32);

impl BlockAddress {
    pub fn is_hole(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, rhs: u32) -> Option<Self> {
        self.0.checked_add(rhs).map(Self)
    }
}

/// Address in bytes from the start of the disk.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct OffsetBytes(pub u64);

impl Add<Self> for OffsetBytes {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

/// "Global" inode number within the filesystem. Numbering starts at 1.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct InodeNumber(pub u32);

impl fmt::Display for InodeNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The root directory of the filesystem is always inode 2.
pub const ROOT_DIRECTORY: InodeNumber = InodeNumber(2);

/// A `LocalInodeIndex` is an inode's index within a block group.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LocalInodeIndex(pub u32);

/// Index for a given block group.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BlockGroupIndex(pub u32);

bitflags! {
    /// <https://www.nongnu.org/ext2-doc/ext2.html#s-feature-compat>
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct FeatureCompatFlags: u32 {
        /// Block pre-allocation for new directories
        const DIR_PREALLOC = 0x0001;

        const IMAGIC_INODES = 0x0002;

        /// An Ext3 journal exists
        const HAS_JOURNAL = 0x0004;

        /// Extended inode attributes are present
        const EXT_ATTR = 0x0008;

        /// Reserved descriptor table blocks for online growth
        const RESIZE_INODE = 0x0010;

        /// Directory indexing (HTree)
        const DIR_INDEX = 0x0020;
    }
}

bitflags! {
    /// <https://www.nongnu.org/ext2-doc/ext2.html#s-feature-incompat>
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct FeatureIncompatFlags: u32 {
        /// Disk/File compression is used
        const COMPRESSION = 0x0001;
        const FILETYPE = 0x0002;
        const RECOVER = 0x0004;
        const JOURNAL_DEV = 0x0008;
        const META_BG = 0x0010;
    }
}

bitflags! {
    /// <https://www.nongnu.org/ext2-doc/ext2.html#s-feature-ro-compat>
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct FeatureReadOnlyCompatFlags: u32 {
        /// Sparse Superblock
        const SPARSE_SUPER = 0x0001;

        /// Filesystem uses a 64bit file size
        const LARGE_FILE = 0x0002;

        /// Binary tree sorted directory files
        const BTREE_DIR = 0x0004;
    }
}

#[derive(Copy, Clone, PartialEq, Eq, FromZeroes, FromBytes, AsBytes)]
#[repr(transparent)]
pub struct UUID(pub [u8; 16]);

impl fmt::Debug for UUID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UUID({self})")
    }
}

impl fmt::Display for UUID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if matches!(i, 4 | 6 | 8 | 10) {
                write!(f, "-")?;
            }
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}
