use zerocopy::byteorder::little_endian::{U16, U32};
use zerocopy::{AsBytes, FromBytes, FromZeroes};

use crate::error::Result;
use crate::superblock::{BlockAddress, LocalInodeIndex};
use crate::transmute::cast_bytes_ref_offset;

/// See <https://www.nongnu.org/ext2-doc/ext2.html#block-group-descriptor-structure>
#[repr(C)]
#[derive(Debug, Clone, FromZeroes, FromBytes, AsBytes)]
pub struct BlockGroupDescriptor {
    block_bitmap: U32,
    inode_bitmap: U32,
    inode_table: U32,
    free_blocks_count: U16,
    free_inodes_count: U16,
    used_dirs_count: U16,
    _pad: U16,
    _reserved: [u8; 12],
}

impl BlockGroupDescriptor {
    pub const SIZE_BYTES: usize = core::mem::size_of::<Self>();

    /// Decodes the `index`th descriptor of a descriptor table.
    pub fn parse(table: &[u8], index: usize) -> Result<Self> {
        cast_bytes_ref_offset::<Self>(table, index * Self::SIZE_BYTES, "block group descriptor")
            .cloned()
    }

    pub fn block_bitmap(&self) -> BlockAddress {
        BlockAddress(self.block_bitmap.get())
    }

    pub fn inode_bitmap(&self) -> BlockAddress {
        BlockAddress(self.inode_bitmap.get())
    }

    /// First block of this group's inode table.
    pub fn inode_table(&self) -> BlockAddress {
        BlockAddress(self.inode_table.get())
    }

    pub fn free_blocks_count(&self) -> u16 {
        self.free_blocks_count.get()
    }

    pub fn free_inodes_count(&self) -> u16 {
        self.free_inodes_count.get()
    }

    pub fn used_dirs_count(&self) -> u16 {
        self.used_dirs_count.get()
    }
}

/// See <https://www.nongnu.org/ext2-doc/ext2.html#inode-bitmap>
#[derive(Debug)]
pub struct InodeBitmap<'a>(pub &'a [u8]);

impl InodeBitmap<'_> {
    ///  Each bit represents an inode in the group's inode table, 1 meaning
    ///  "used". The first inode of the group is bit 0 of byte 0, the 8th is
    ///  bit 7 (most significant bit) of byte 0 and the 9th is bit 0 of byte 1.
    ///  Since inode numbers start from 1 rather than 0, the first bit in the
    ///  first block group's inode bitmap represent inode number 1.
    pub fn is_used(&self, local_index: LocalInodeIndex) -> Option<bool> {
        let index = local_index.0 / 8;
        let byte = self.0.get(index as usize)?;
        let bit = local_index.0 % 8;
        let mask = 1 << bit;
        Some(byte & mask != 0)
    }
}
