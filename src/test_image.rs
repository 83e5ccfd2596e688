//! In-memory ext2 images for tests.
//!
//! Images have a single block group and 1 KiB blocks unless built with
//! [`ImageBuilder::with_block_size`]. Files are laid out by
//! computing pointer slots directly, so the images exercise the block mapping
//! code rather than mirror it. Missing blocks stay holes, which keeps files at
//! triple indirection cheap.

use std::collections::HashMap;
use std::io::Cursor;

use crate::volume::Volume;

pub(crate) const BLOCK_SIZE: usize = 1024;

const BLOCKS_PER_GROUP: u32 = 8192;
const INODES_PER_GROUP: u32 = 256;
const INODE_SIZE: usize = 128;
const FIRST_FREE_INODE: u32 = 11;

const MODE_DIR: u16 = 0o40755;
const MODE_FILE: u16 = 0o100644;
const FILE_TYPE_REGULAR: u8 = 1;
const FILE_TYPE_DIR: u8 = 2;

pub(crate) const ROOT_CTIME: u32 = 1_415_188_180;
pub(crate) const ROOT_ATIME: u32 = 1_415_188_273;
const FILE_TIME: u32 = 1_415_190_000;

pub(crate) const BIG_DIR_ENTRIES: usize = 60;
pub(crate) const TWO_CITIES_LINE: &str =
    "It was the best of times, it was the worst of times,\n";

/// Where the fixed metadata of an image sits. The descriptor table, both
/// bitmaps and the inode table follow the superblock's block in that order.
#[derive(Debug, Copy, Clone)]
pub(crate) struct Layout {
    block_size: usize,
}

impl Layout {
    /// With 1 KiB blocks the superblock fills block 1; otherwise it sits
    /// inside block 0.
    pub(crate) fn first_data_block(self) -> u32 {
        u32::from(self.block_size == 1024)
    }

    pub(crate) fn descriptor_table_block(self) -> u32 {
        self.first_data_block() + 1
    }

    fn block_bitmap_block(self) -> u32 {
        self.first_data_block() + 2
    }

    fn inode_bitmap_block(self) -> u32 {
        self.first_data_block() + 3
    }

    pub(crate) fn inode_table_block(self) -> u32 {
        self.first_data_block() + 4
    }

    fn first_free_block(self) -> u32 {
        let table_blocks = INODES_PER_GROUP as usize * INODE_SIZE / self.block_size;
        self.inode_table_block() + table_blocks as u32
    }

    fn pointers_per_block(self) -> u64 {
        (self.block_size / 4) as u64
    }

    /// Byte offset of an inode record in a built image.
    pub(crate) fn inode_offset(self, inode: u32) -> usize {
        self.inode_table_block() as usize * self.block_size + (inode as usize - 1) * INODE_SIZE
    }

    /// First data block of a directory in a built image.
    pub(crate) fn directory_block(self, image: &[u8], directory: u32) -> usize {
        read_u32(image, self.inode_offset(directory) + 40) as usize
    }
}

struct PendingEntry {
    inode: u32,
    name: String,
    file_type: u8,
}

pub(crate) struct ImageBuilder {
    layout: Layout,
    image: Vec<u8>,
    next_block: u32,
    next_inode: u32,
    directories: Vec<(u32, Vec<PendingEntry>)>,
}

impl ImageBuilder {
    pub(crate) const ROOT: u32 = 2;

    /// Root directory with `lost+found`, like a fresh `mke2fs`.
    pub(crate) fn new() -> Self {
        Self::with_block_size(BLOCK_SIZE)
    }

    pub(crate) fn with_block_size(block_size: usize) -> Self {
        assert!(
            block_size.is_power_of_two() && (1024..=65536).contains(&block_size),
            "unsupported block size {block_size}"
        );
        let layout = Layout { block_size };
        let first_free_block = layout.first_free_block();
        let mut builder = Self {
            layout,
            image: vec![0; first_free_block as usize * block_size],
            next_block: first_free_block,
            next_inode: FIRST_FREE_INODE,
            directories: Vec::new(),
        };
        builder.write_inode_header(Self::ROOT, MODE_DIR, ROOT_ATIME, ROOT_CTIME);
        builder.directories.push((
            Self::ROOT,
            vec![
                pending(Self::ROOT, ".", FILE_TYPE_DIR),
                pending(Self::ROOT, "..", FILE_TYPE_DIR),
            ],
        ));
        builder.mkdir_with_mode(Self::ROOT, "lost+found", 0o40700);
        builder
    }

    pub(crate) fn layout(&self) -> Layout {
        self.layout
    }

    pub(crate) fn mkdir(&mut self, parent: u32, name: &str) -> u32 {
        self.mkdir_with_mode(parent, name, MODE_DIR)
    }

    fn mkdir_with_mode(&mut self, parent: u32, name: &str, mode: u16) -> u32 {
        let inode = self.alloc_inode();
        self.write_inode_header(inode, mode, FILE_TIME, FILE_TIME);
        self.directories.push((
            inode,
            vec![
                pending(inode, ".", FILE_TYPE_DIR),
                pending(parent, "..", FILE_TYPE_DIR),
            ],
        ));
        self.add_raw_entry(parent, inode, name, FILE_TYPE_DIR);
        inode
    }

    pub(crate) fn add_file(&mut self, parent: u32, name: &str, data: &[u8]) -> u32 {
        self.add_file_with_extents(parent, name, data.len() as u64, &[(0, data)])
    }

    /// File of `size` bytes whose only allocated data is `tail`, at the end.
    pub(crate) fn add_sparse_file(&mut self, parent: u32, name: &str, size: u64, tail: &[u8]) -> u32 {
        let offset = size - tail.len() as u64;
        self.add_file_with_extents(parent, name, size, &[(offset, tail)])
    }

    /// File of `size` bytes with data written at the given byte offsets.
    /// Blocks no extent touches are left as holes.
    pub(crate) fn add_file_with_extents(
        &mut self,
        parent: u32,
        name: &str,
        size: u64,
        extents: &[(u64, &[u8])],
    ) -> u32 {
        let inode = self.alloc_inode();
        self.write_inode_header(inode, MODE_FILE, FILE_TIME, FILE_TIME);
        self.set_size(inode, size);

        let block_size = self.layout.block_size;
        for &(offset, data) in extents {
            let mut written = 0;
            while written < data.len() {
                let position = offset + written as u64;
                let within = (position % block_size as u64) as usize;
                let chunk = (block_size - within).min(data.len() - written);
                let block = self.data_block(inode, position / block_size as u64);
                let start = block as usize * block_size + within;
                self.image[start..start + chunk].copy_from_slice(&data[written..written + chunk]);
                written += chunk;
            }
        }

        self.add_raw_entry(parent, inode, name, FILE_TYPE_REGULAR);
        inode
    }

    /// Appends an entry without creating anything it points at. Inode 0
    /// makes a deleted entry.
    pub(crate) fn add_raw_entry(&mut self, directory: u32, inode: u32, name: &str, file_type: u8) {
        let (_, entries) = self
            .directories
            .iter_mut()
            .find(|(number, _)| *number == directory)
            .expect("entries can only be added to directories");
        entries.push(pending(inode, name, file_type));
    }

    pub(crate) fn build(mut self) -> Vec<u8> {
        let directories = std::mem::take(&mut self.directories);

        let mut links: HashMap<u32, u16> = HashMap::new();
        for (_, entries) in &directories {
            for entry in entries.iter().filter(|entry| entry.inode != 0) {
                *links.entry(entry.inode).or_default() += 1;
            }
        }

        let block_size = self.layout.block_size;
        for (directory, entries) in &directories {
            let blocks = layout_directory(entries, block_size);
            for (logical, bytes) in blocks.iter().enumerate() {
                let block = self.data_block(*directory, logical as u64) as usize;
                self.image[block * block_size..(block + 1) * block_size].copy_from_slice(bytes);
            }
            self.set_size(*directory, (blocks.len() * block_size) as u64);
        }

        for (inode, count) in links {
            if inode < self.next_inode {
                let offset = self.layout.inode_offset(inode) + 26;
                write_u16(&mut self.image, offset, count);
            }
        }

        self.write_metadata(directories.len() as u16);
        self.image
    }

    pub(crate) fn build_volume(self) -> Volume<Cursor<Vec<u8>>> {
        Volume::from_reader(Cursor::new(self.build())).expect("test image should open")
    }

    fn alloc_inode(&mut self) -> u32 {
        let inode = self.next_inode;
        assert!(inode <= INODES_PER_GROUP, "test image is out of inodes");
        self.next_inode += 1;
        inode
    }

    fn alloc_block(&mut self) -> u32 {
        let block = self.next_block;
        self.next_block += 1;
        self.image
            .resize(self.next_block as usize * self.layout.block_size, 0);
        block
    }

    fn write_inode_header(&mut self, inode: u32, mode: u16, atime: u32, ctime: u32) {
        let base = self.layout.inode_offset(inode);
        write_u16(&mut self.image, base, mode);
        write_u32(&mut self.image, base + 8, atime);
        write_u32(&mut self.image, base + 12, ctime);
        write_u32(&mut self.image, base + 16, ctime);
    }

    fn set_size(&mut self, inode: u32, size: u64) {
        let base = self.layout.inode_offset(inode);
        write_u32(&mut self.image, base + 4, size as u32);
        write_u32(&mut self.image, base + 108, (size >> 32) as u32);
    }

    /// Physical block for a file's logical block, allocating it and any
    /// indirect blocks on the way.
    fn data_block(&mut self, inode: u32, logical: u64) -> u32 {
        let p = self.layout.pointers_per_block();
        let pointers = self.layout.inode_offset(inode) + 40;

        let (root_slot, indices) = if logical < 12 {
            (pointers + 4 * logical as usize, vec![])
        } else if logical < 12 + p {
            (pointers + 48, vec![logical - 12])
        } else if logical < 12 + p + p * p {
            let n = logical - 12 - p;
            (pointers + 52, vec![n / p, n % p])
        } else {
            let n = logical - 12 - p - p * p;
            assert!(n < p * p * p, "logical block {logical} is too large");
            (pointers + 56, vec![n / (p * p), (n / p) % p, n % p])
        };

        let mut slot = root_slot;
        for index in indices {
            let block = self.ensure_pointer(slot);
            slot = block as usize * self.layout.block_size + index as usize * 4;
        }
        self.ensure_pointer(slot)
    }

    fn ensure_pointer(&mut self, slot: usize) -> u32 {
        let current = read_u32(&self.image, slot);
        if current != 0 {
            return current;
        }
        let block = self.alloc_block();
        write_u32(&mut self.image, slot, block);
        block
    }

    fn write_metadata(&mut self, used_dirs: u16) {
        let blocks_count = self.next_block;
        assert!(blocks_count <= BLOCKS_PER_GROUP, "test image outgrew one block group");
        let free_inodes = INODES_PER_GROUP - (self.next_inode - 1);
        let layout = self.layout;
        let block_size = layout.block_size;
        let first_data_block = layout.first_data_block();

        let sb = 1024;
        let image = &mut self.image;
        write_u32(image, sb, INODES_PER_GROUP);
        write_u32(image, sb + 4, blocks_count);
        write_u32(image, sb + 16, free_inodes);
        write_u32(image, sb + 20, first_data_block);
        write_u32(image, sb + 24, (block_size / 1024).trailing_zeros());
        write_u32(image, sb + 32, BLOCKS_PER_GROUP);
        write_u32(image, sb + 36, BLOCKS_PER_GROUP);
        write_u32(image, sb + 40, INODES_PER_GROUP);
        write_u16(image, sb + 56, 0xEF53);
        write_u16(image, sb + 58, 1);
        write_u32(image, sb + 76, 1);
        write_u32(image, sb + 84, FIRST_FREE_INODE);
        write_u16(image, sb + 88, INODE_SIZE as u16);
        write_u32(image, sb + 96, 0x0002);
        write_u32(image, sb + 100, 0x0003);
        image[sb + 104..sb + 120].copy_from_slice(&[0x5C; 16]);
        image[sb + 120..sb + 136].copy_from_slice(b"SCC211 OS Module");

        let bgd = layout.descriptor_table_block() as usize * block_size;
        write_u32(image, bgd, layout.block_bitmap_block());
        write_u32(image, bgd + 4, layout.inode_bitmap_block());
        write_u32(image, bgd + 8, layout.inode_table_block());
        write_u16(image, bgd + 14, free_inodes as u16);
        write_u16(image, bgd + 16, used_dirs);

        let block_bitmap = layout.block_bitmap_block() as usize * block_size;
        for block in first_data_block..blocks_count {
            set_bit(image, block_bitmap, (block - first_data_block) as usize);
        }
        let inode_bitmap = layout.inode_bitmap_block() as usize * block_size;
        for inode in 1..self.next_inode as usize {
            set_bit(image, inode_bitmap, inode - 1);
        }
    }
}

/// Root holds `files` (one file per indirection level boundary), a
/// multi-block `big-dir`, a text file and a nested `deep` tree.
pub(crate) fn fixture() -> ImageBuilder {
    let block = BLOCK_SIZE as u64;
    let p = block / 4;
    let singly_end = (12 + p) * block;
    let doubly_end = singly_end + p * p * block;
    let triply_end = doubly_end + p * p * p * block;

    let mut builder = ImageBuilder::new();
    let root = ImageBuilder::ROOT;

    let files = builder.mkdir(root, "files");
    builder.add_file(files, "dir-s", b"Direct start\n");
    builder.add_file(files, "dir-e", &filled(12 * block, b"Direct end\n"));
    builder.add_file(files, "ind-s", &filled(12 * block + 15, b"Indirect start\n"));
    builder.add_file(files, "ind-e", &filled(singly_end, b"Indirect end\n"));
    builder.add_sparse_file(files, "dbl-ind-s", singly_end + 22, b"Double indirect start\n");
    builder.add_sparse_file(files, "dbl-ind-e", doubly_end, b"Double indirect end\n");
    builder.add_sparse_file(files, "trpl-ind-s", doubly_end + 22, b"Triple indirect start\n");
    builder.add_sparse_file(files, "trpl-ind-e", triply_end, b"Triple indirect end\n");

    let big = builder.mkdir(root, "big-dir");
    for i in 0..BIG_DIR_ENTRIES {
        builder.add_file(big, &format!("entry-number-{i:02}"), b"");
    }

    builder.add_file(root, "two-cities", TWO_CITIES_LINE.repeat(100).as_bytes());

    let deep = builder.mkdir(root, "deep");
    let a = builder.mkdir(deep, "a");
    let b = builder.mkdir(a, "b");
    let c = builder.mkdir(b, "c");
    builder.add_file(c, "file", b"deep file\n");

    builder
}

/// `size` bytes of filler ending in `tail`.
fn filled(size: u64, tail: &[u8]) -> Vec<u8> {
    let mut data: Vec<u8> = (0..size).map(|i| b'a' + (i % 26) as u8).collect();
    let start = data.len() - tail.len();
    data[start..].copy_from_slice(tail);
    data
}

fn pending(inode: u32, name: &str, file_type: u8) -> PendingEntry {
    PendingEntry {
        inode,
        name: name.to_string(),
        file_type,
    }
}

/// Packs entries into blocks. The last record of each block is stretched to
/// the block's end.
fn layout_directory(entries: &[PendingEntry], block_size: usize) -> Vec<Vec<u8>> {
    let finish = |block: &mut Vec<u8>, last_start: usize| {
        let rec_len = (block_size - last_start) as u16;
        write_u16(block, last_start + 4, rec_len);
        block.resize(block_size, 0);
    };

    let mut blocks = Vec::new();
    let mut current: Vec<u8> = Vec::new();
    let mut last_start = 0;
    for entry in entries {
        let needed = (8 + entry.name.len()).next_multiple_of(4);
        if current.len() + needed > block_size {
            finish(&mut current, last_start);
            blocks.push(std::mem::take(&mut current));
        }

        last_start = current.len();
        current.resize(last_start + needed, 0);
        write_u32(&mut current, last_start, entry.inode);
        write_u16(&mut current, last_start + 4, needed as u16);
        current[last_start + 6] = entry.name.len() as u8;
        current[last_start + 7] = entry.file_type;
        current[last_start + 8..last_start + 8 + entry.name.len()]
            .copy_from_slice(entry.name.as_bytes());
    }
    finish(&mut current, last_start);
    blocks.push(current);
    blocks
}

fn set_bit(image: &mut [u8], base: usize, bit: usize) {
    image[base + bit / 8] |= 1 << (bit % 8);
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    let mut raw = [0; 4];
    raw.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_le_bytes(raw)
}

fn write_u16(bytes: &mut [u8], offset: usize, value: u16) {
    bytes[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

fn write_u32(bytes: &mut [u8], offset: usize, value: u32) {
    bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixture_stays_small() {
        let image = fixture().build();
        assert_eq!(image.len() % BLOCK_SIZE, 0);
        assert!(image.len() < 1024 * 1024, "image is {} bytes", image.len());
        assert_eq!(read_u32(&image, 1024 + 4) as usize, image.len() / BLOCK_SIZE);
    }

    #[test]
    fn directories_fill_whole_blocks() {
        let entries: Vec<PendingEntry> = (0..100)
            .map(|i| pending(20 + i, &format!("name-{i:03}"), FILE_TYPE_REGULAR))
            .collect();
        let blocks = layout_directory(&entries, BLOCK_SIZE);
        assert_eq!(blocks.len(), 2);
        assert!(blocks.iter().all(|block| block.len() == BLOCK_SIZE));

        let blocks = layout_directory(&entries, 4096);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].len(), 4096);
    }

    #[test]
    fn metadata_moves_with_block_size() {
        let small = ImageBuilder::new().layout();
        assert_eq!(small.first_data_block(), 1);
        assert_eq!(small.descriptor_table_block(), 2);
        assert_eq!(small.first_free_block(), 5 + 32);

        let builder = ImageBuilder::with_block_size(4096);
        let large = builder.layout();
        assert_eq!(large.first_data_block(), 0);
        assert_eq!(large.descriptor_table_block(), 1);
        assert_eq!(large.first_free_block(), 4 + 8);

        let image = builder.build();
        assert_eq!(image.len() % 4096, 0);
        assert_eq!(read_u32(&image, 1024 + 20), 0);
        assert_eq!(read_u32(&image, 1024 + 24), 2);
        assert_eq!(read_u32(&image, 4096 + 8), large.inode_table_block());
    }
}
