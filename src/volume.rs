use std::borrow::Cow;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use spin::Mutex;

use crate::block_group::{BlockGroupDescriptor, InodeBitmap};
use crate::error::{Error, Result};
use crate::inode::Inode;
use crate::path::FilePath;
use crate::superblock::{
    BlockAddress, BlockSize, InodeNumber, OffsetBytes, Superblock, ROOT_DIRECTORY,
};

/// Something that knows how to read blocks from the disk backing the
/// filesystem.
pub trait BlockReader {
    fn block_size(&self) -> BlockSize;

    /// Number of blocks on the disk. Addresses at or past it are invalid.
    fn block_count(&self) -> u32;

    /// Fills `buf` from `block`, starting `offset` bytes into the block.
    fn read_block_bytes(&self, block: BlockAddress, offset: usize, buf: &mut [u8]) -> Result<()>;

    /// The `index`th address stored in indirect block `block`.
    fn read_block_pointer(&self, block: BlockAddress, index: u32) -> Result<BlockAddress> {
        let mut raw = [0; 4];
        self.read_block_bytes(block, index as usize * raw.len(), &mut raw)?;
        Ok(BlockAddress(u32::from_le_bytes(raw)))
    }
}

/// An opened ext2 image. Decoded metadata lives here; file data is read on
/// demand through the shared source.
///
/// Every read is a seek followed by a read under one lock, so a `Volume` can
/// be shared between threads.
#[derive(Debug)]
pub struct Volume<R = File> {
    source: Mutex<R>,
    superblock: Superblock,
    block_group_descriptors: Vec<BlockGroupDescriptor>,
}

impl Volume<File> {
    /// Opens the image file at `path` read-only.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        log::debug!("opening ext2 image {}", path.display());
        let file = File::open(path)?;
        Self::from_reader(file)
    }
}

impl<R: Read + Seek> Volume<R> {
    /// Decodes the superblock and the block group descriptor table from
    /// `source`.
    pub fn from_reader(mut source: R) -> Result<Self> {
        let mut buf = vec![0; Superblock::SIZE_BYTES];
        read_exact_at(&mut source, Superblock::OFFSET_BYTES, &mut buf)?;
        let superblock = Superblock::parse(&buf)?;
        superblock.validate()?;

        let num_groups = superblock.num_block_groups();
        let table_start =
            superblock.block_address_bytes(superblock.block_descriptor_table_start_block()?);
        let table_length = num_groups as u64 * BlockGroupDescriptor::SIZE_BYTES as u64;
        let image_length = source.seek(SeekFrom::End(0))?;
        if table_start.0.saturating_add(table_length) > image_length {
            return Err(Error::corrupt(format!(
                "{num_groups} block group descriptors at byte {} overrun a {image_length} byte image",
                table_start.0
            )));
        }
        let mut table = vec![0; num_groups * BlockGroupDescriptor::SIZE_BYTES];
        read_exact_at(&mut source, table_start, &mut table)?;
        let block_group_descriptors = (0..num_groups)
            .map(|index| BlockGroupDescriptor::parse(&table, index))
            .collect::<Result<Vec<_>>>()?;

        log::debug!(
            "ext2 volume {:?}: {} blocks of {} bytes, {} inodes, {} block groups",
            superblock.volume_label(),
            superblock.blocks_count(),
            superblock.block_size().bytes(),
            superblock.inodes_count(),
            num_groups,
        );

        Ok(Self {
            source: Mutex::new(source),
            superblock,
            block_group_descriptors,
        })
    }

    /// Reads `buf.len()` bytes at absolute byte `offset` of the image.
    pub fn read_at(&self, offset: OffsetBytes, buf: &mut [u8]) -> Result<()> {
        let mut source = self.source.lock();
        read_exact_at(&mut *source, offset, buf)
    }

    /// Loads inode `number`. Numbers start at 1.
    pub fn get_inode(&self, number: InodeNumber) -> Result<Inode> {
        if number.0 == 0 || number.0 > self.superblock.inodes_count() {
            return Err(Error::corrupt(format!(
                "inode {number} outside 1..={}",
                self.superblock.inodes_count()
            )));
        }

        let (group, local_index) = self.superblock.inode_location(number);
        let descriptor = self.block_group_descriptor(group.0)?;
        let offset = self
            .superblock
            .inode_offset(descriptor.inode_table(), local_index);

        let mut buf = vec![0; usize::from(self.superblock.inode_size())];
        self.read_at(offset, &mut buf)?;
        log::trace!("loaded inode {number} from byte {}", offset.0);
        Inode::parse(number, &buf, self.superblock.has_64bit_file_sizes())
    }

    /// Whether the inode bitmap of the inode's group marks it used.
    pub fn is_inode_allocated(&self, number: InodeNumber) -> Result<bool> {
        if number.0 == 0 || number.0 > self.superblock.inodes_count() {
            return Ok(false);
        }

        let (group, local_index) = self.superblock.inode_location(number);
        let descriptor = self.block_group_descriptor(group.0)?;
        let mut bitmap = vec![0; usize::from(self.block_size())];
        self.read_block_bytes(descriptor.inode_bitmap(), 0, &mut bitmap)?;
        InodeBitmap(&bitmap).is_used(local_index).ok_or_else(|| {
            Error::corrupt(format!("inode {number} is past the end of its bitmap"))
        })
    }

    pub fn root(&self) -> Result<Inode> {
        let root = self.get_inode(ROOT_DIRECTORY)?;
        if !root.is_dir() {
            return Err(Error::corrupt("root inode is not a directory"));
        }
        Ok(root)
    }

    /// Resolves `path` from the root directory. Empty components are
    /// ignored, and `.` and `..` are looked up as the on-disk entries they
    /// are. When a directory holds the same name twice, the last entry wins.
    pub fn navigate(&self, path: &str) -> Result<Inode> {
        let file_path = FilePath::parse(path).unwrap_or_else(FilePath::root);
        let mut current = self.root()?;
        let mut components = file_path.components().peekable();

        while let Some(component) = components.next() {
            log::trace!("looking up {component:?} in inode {}", current.number());
            let entry = current
                .entries(self)?
                .into_iter()
                .filter(|entry| entry.name() == component)
                .last()
                .ok_or_else(|| Error::not_found(path))?;
            let next = self.get_inode(entry.inode_number())?;

            if components.peek().is_some() && !next.is_dir() {
                return Err(Error::not_found(path));
            }
            current = next;
        }

        Ok(current)
    }

    fn block_group_descriptor(&self, group: u32) -> Result<&BlockGroupDescriptor> {
        self.block_group_descriptors
            .get(group as usize)
            .ok_or_else(|| Error::corrupt(format!("block group {group} does not exist")))
    }

    fn check_block(&self, block: BlockAddress) -> Result<()> {
        if block.0 >= self.superblock.blocks_count() {
            return Err(Error::corrupt(format!(
                "block {} outside the volume ({} blocks)",
                block.0,
                self.superblock.blocks_count()
            )));
        }
        Ok(())
    }

    /// Consumes the volume and closes the image.
    pub fn close(self) {
        log::debug!("closing ext2 volume {:?}", self.label());
    }
}

impl<R> Volume<R> {
    pub fn superblock(&self) -> &Superblock {
        &self.superblock
    }

    pub fn block_group_descriptors(&self) -> &[BlockGroupDescriptor] {
        &self.block_group_descriptors
    }

    pub fn label(&self) -> Cow<'_, str> {
        self.superblock.volume_label()
    }

    pub fn block_count(&self) -> u32 {
        self.superblock.blocks_count()
    }

    pub fn inodes_count(&self) -> u32 {
        self.superblock.inodes_count()
    }

    pub fn block_size(&self) -> BlockSize {
        self.superblock.block_size()
    }

    /// Total size in bytes: block count times block size.
    pub fn capacity(&self) -> u64 {
        self.superblock.capacity()
    }

    pub fn magic(&self) -> u16 {
        self.superblock.magic()
    }

    /// Gives back the underlying image.
    pub fn into_inner(self) -> R {
        self.source.into_inner()
    }
}

impl<R: Read + Seek> BlockReader for Volume<R> {
    fn block_size(&self) -> BlockSize {
        self.superblock.block_size()
    }

    fn block_count(&self) -> u32 {
        self.superblock.blocks_count()
    }

    fn read_block_bytes(&self, block: BlockAddress, offset: usize, buf: &mut [u8]) -> Result<()> {
        self.check_block(block)?;
        debug_assert!(offset + buf.len() <= usize::from(self.superblock.block_size()));
        let start = self.superblock.block_address_bytes(block) + OffsetBytes(offset as u64);
        self.read_at(start, buf)
    }
}

fn read_exact_at<R: Read + Seek + ?Sized>(
    source: &mut R,
    offset: OffsetBytes,
    buf: &mut [u8],
) -> Result<()> {
    source.seek(SeekFrom::Start(offset.0))?;
    source.read_exact(buf)?;
    Ok(())
}
