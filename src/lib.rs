//! Read-only access to ext2 filesystem images.
//!
//! Open an image with [`Volume::open`], then resolve paths with
//! [`Ext2File::open`] to list directories and read file contents.
//!
//! # Resources
//!
//! - <https://wiki.osdev.org/Ext2>
//! - <https://www.nongnu.org/ext2-doc/ext2.html>
//! - <https://en.wikipedia.org/wiki/Ext2>
//! - <https://git.kernel.org/pub/scm/utils/util-linux/util-linux.git/tree/libblkid/src/superblocks/ext.c>
//! - "CHAPTER 18: The Ext2 and Ext3 Filesystems" in "Understanding the Linux Kernel - Bovet (3rd ed, 2005)"

#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cargo_common_metadata,
    clippy::doc_markdown,
    clippy::implicit_hasher,
    clippy::implicit_return,
    clippy::missing_const_for_fn,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::multiple_crate_versions,
    clippy::must_use_candidate,
    clippy::new_without_default,
    clippy::redundant_pub_crate,
    clippy::suboptimal_flops,
    clippy::wildcard_imports
)]

pub mod block_group;
pub mod block_map;
pub mod directory;
mod error;
pub mod file;
pub mod format;
pub mod inode;
pub mod path;
mod strings;
pub mod superblock;
mod transmute;
pub mod volume;

#[cfg(test)]
mod test_image;

pub use block_group::*;
pub use block_map::*;
pub use directory::*;
pub use error::*;
pub use file::*;
pub use inode::*;
pub use path::*;
pub use superblock::*;
pub use volume::*;
