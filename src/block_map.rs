//! Mapping of a file's logical block numbers to physical blocks.
//!
//! An inode addresses its data through 12 direct pointers followed by a
//! singly, a doubly and a triply indirect pointer. Each indirect block is an
//! array of `block_size / 4` little-endian block addresses. A zero address at
//! any level is a hole: every logical block below it reads as zeroes.
//!
//! See <https://www.nongnu.org/ext2-doc/ext2.html#i-block>

use crate::error::{Error, Result};
use crate::superblock::BlockAddress;

pub const NUM_DIRECT_BLOCKS: usize = 12;

/// The 15 block pointers stored in an inode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockPointers {
    pub direct: [BlockAddress; NUM_DIRECT_BLOCKS],
    pub singly_indirect: BlockAddress,
    pub doubly_indirect: BlockAddress,
    pub triply_indirect: BlockAddress,
}

/// Where a logical block sits in the addressing tree. The indices are the
/// positions to look up at each level, outermost first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockPath {
    Direct(u32),
    Singly(u32),
    Doubly(u32, u32),
    Triply(u32, u32, u32),
}

impl BlockPath {
    /// Decomposes a logical block number. Returns `None` when the number lies
    /// past what triple indirection can address.
    pub fn locate(logical: u64, pointers_per_block: u32) -> Option<Self> {
        let p = u64::from(pointers_per_block);
        let direct = NUM_DIRECT_BLOCKS as u64;

        let mut n = logical;
        if n < direct {
            return Some(Self::Direct(n as u32));
        }
        n -= direct;
        if n < p {
            return Some(Self::Singly(n as u32));
        }
        n -= p;
        if n < p * p {
            return Some(Self::Doubly((n / p) as u32, (n % p) as u32));
        }
        n -= p * p;
        if n < p * p * p {
            return Some(Self::Triply(
                (n / (p * p)) as u32,
                ((n % (p * p)) / p) as u32,
                (n % p) as u32,
            ));
        }
        None
    }

    /// Inverse of [`BlockPath::locate`].
    pub fn logical_block(self, pointers_per_block: u32) -> u64 {
        let p = u64::from(pointers_per_block);
        let direct = NUM_DIRECT_BLOCKS as u64;
        match self {
            Self::Direct(i) => u64::from(i),
            Self::Singly(i) => direct + u64::from(i),
            Self::Doubly(i, j) => direct + p + u64::from(i) * p + u64::from(j),
            Self::Triply(i, j, k) => {
                direct + p + p * p + u64::from(i) * p * p + u64::from(j) * p + u64::from(k)
            }
        }
    }
}

/// Number of logical blocks a file can address with the given geometry.
pub fn max_logical_blocks(pointers_per_block: u32) -> u64 {
    let p = u64::from(pointers_per_block);
    NUM_DIRECT_BLOCKS as u64 + p + p * p + p * p * p
}

/// Resolves a logical block to a physical block, or `None` for a hole.
///
/// `read_pointer(block, index)` must return the `index`th address stored in
/// indirect block `block`. It is never called with a zero block.
pub fn resolve_block<F>(
    logical: u64,
    pointers: &BlockPointers,
    pointers_per_block: u32,
    mut read_pointer: F,
) -> Result<Option<BlockAddress>>
where
    F: FnMut(BlockAddress, u32) -> Result<BlockAddress>,
{
    let Some(path) = BlockPath::locate(logical, pointers_per_block) else {
        return Err(Error::corrupt(format!(
            "logical block {logical} is beyond the triply indirect range"
        )));
    };

    let (root, indices, depth) = match path {
        BlockPath::Direct(i) => (pointers.direct[i as usize], [0; 3], 0),
        BlockPath::Singly(i) => (pointers.singly_indirect, [i, 0, 0], 1),
        BlockPath::Doubly(i, j) => (pointers.doubly_indirect, [i, j, 0], 2),
        BlockPath::Triply(i, j, k) => (pointers.triply_indirect, [i, j, k], 3),
    };

    let mut block = root;
    for &index in &indices[..depth] {
        if block.is_hole() {
            return Ok(None);
        }
        block = read_pointer(block, index)?;
    }

    Ok((!block.is_hole()).then_some(block))
}
