//! On-disk layout: the authoritative contract for how SOFS structures are
//! laid out in bytes. Every multi-byte field is little-endian; all
//! serialization here is identity with the in-memory struct, per §6.

use std::fmt;

use bincode::{
	de::Decoder,
	enc::Encoder,
	error::{DecodeError, EncodeError},
	Decode, Encode,
};

/// Size in bytes of a device block. A fixed power of two.
pub const BLOCK_SIZE: u64 = 512;

/// Number of blocks that make up a data cluster.
pub const BLOCKS_PER_CLUSTER: u64 = 4;

/// Size in bytes of a data cluster.
pub const CLUSTER_SIZE: u64 = BLOCK_SIZE * BLOCKS_PER_CLUSTER;

/// Size in bytes of the header every data cluster carries (`prev`, `next`,
/// `stat`, each a `u32`).
pub const CLUSTER_HEADER_SIZE: u64 = 12;

/// Bytes of a data cluster's payload (everything after [`CLUSTER_HEADER_SIZE`]).
pub const BSLPC: u64 = CLUSTER_SIZE - CLUSTER_HEADER_SIZE;

/// Size in bytes of one on-disk inode record.
pub const INODE_SIZE: u64 = 64;

/// Inodes per inode-table block.
pub const IPB: u64 = BLOCK_SIZE / INODE_SIZE;

/// Maximum length of a path component (not counting the NUL terminator).
pub const MAX_NAME: usize = 59;

/// Size in bytes of one on-disk directory entry (`name[MAX_NAME+1]` + `nInode`).
pub const DIRENTRY_SIZE: u64 = (MAX_NAME as u64 + 1) + 4;

/// Directory entries that fit in one cluster's payload.
pub const DPC: u64 = BSLPC / DIRENTRY_SIZE;

/// Logical-cluster references that fit in one indirect-reference cluster.
pub const RPC: u64 = BSLPC / 4;

/// Number of direct references carried directly inside an inode.
pub const N_DIRECT: usize = 6;

/// Highest logical file-cluster position addressable through an inode's
/// direct, single-indirect and double-indirect references.
pub const MAX_FILE_CLUSTERS: u64 = N_DIRECT as u64 + RPC + RPC * RPC;

/// Maximum length of an absolute path, not counting the NUL terminator.
pub const MAX_PATH: usize = 1023;

/// Maximum of symlinks followed while resolving one path, before `ELOOP`.
pub const SYMLOOP_MAX: u32 = 8;

/// Capacity, in logical cluster numbers, of each of the superblock's two
/// bounded free-cluster caches.
pub const DZONE_CACHE_SIZE: usize = 50;

/// Size in bytes of the volume-name field in the superblock.
pub const PARTITION_NAME_SIZE: usize = 20;

/// Current on-disk format version.
pub const VERSION_NUMBER: u16 = 0x0100;

/// Magic number of a committed, fully formatted image.
pub const MAGIC_NUMBER: u32 = 0x5346_5332; // "SFS2"

/// Magic number written while a format is still in progress.
pub const MAGIC_FORMATTING: u32 = 0xFFFF;

/// `mStat` value meaning "properly unmounted" / clean.
pub const MSTAT_PRU: u8 = 0;

/// `mStat` value meaning "dirty" (mounted, or not cleanly unmounted).
pub const MSTAT_DIRTY: u8 = 1;

/// Sentinel meaning "no inode" -- the all-ones 32-bit word.
pub const NULL_INODE: u32 = u32::MAX;

/// Sentinel meaning "no cluster" -- the all-ones 32-bit word.
pub const NULL_CLUSTER: u32 = u32::MAX;

/// Convenience alias for an inode number as stored on disk.
pub type InodeNum = u32;

/// Convenience alias for a logical cluster number as stored on disk.
pub type ClusterNum = u32;

/// Index of the always-present root directory inode.
pub const ROOT_INODE: InodeNum = 0;

/// Logical cluster number of the root directory's content.
pub const ROOT_CLUSTER: ClusterNum = 0;

// Mode bits. Top bits classify the inode's type; the free flag lives in the
// high bit; the low nine bits are a conventional rwxrwxrwx permission mask.
pub const INODE_FREE: u16 = 0x8000;
pub const INODE_TYPE_MASK: u16 = 0x7000;
pub const INODE_DIR: u16 = 0x1000;
pub const INODE_FILE: u16 = 0x2000;
pub const INODE_SYMLINK: u16 = 0x3000;

pub const INODE_RD_USR: u16 = 0o400;
pub const INODE_WR_USR: u16 = 0o200;
pub const INODE_EX_USR: u16 = 0o100;
pub const INODE_RD_GRP: u16 = 0o040;
pub const INODE_WR_GRP: u16 = 0o020;
pub const INODE_EX_GRP: u16 = 0o010;
pub const INODE_RD_OTH: u16 = 0o004;
pub const INODE_WR_OTH: u16 = 0o002;
pub const INODE_EX_OTH: u16 = 0o001;

pub const INODE_PERM_MASK: u16 = 0o777;

/// Access mask used by [`crate::Sofs::access_granted`].
pub const OP_READ: u8 = 4;
pub const OP_WRITE: u8 = 2;
pub const OP_EXEC: u8 = 1;

/// The type of file an inode describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InodeType {
	Directory,
	RegularFile,
	Symlink,
}

impl InodeType {
	pub(crate) fn mode_bits(self) -> u16 {
		match self {
			Self::Directory => INODE_DIR,
			Self::RegularFile => INODE_FILE,
			Self::Symlink => INODE_SYMLINK,
		}
	}

	pub(crate) fn from_mode(mode: u16) -> Option<Self> {
		match mode & INODE_TYPE_MASK {
			INODE_DIR => Some(Self::Directory),
			INODE_FILE => Some(Self::RegularFile),
			INODE_SYMLINK => Some(Self::Symlink),
			_ => None,
		}
	}
}

impl fmt::Display for InodeType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			Self::Directory => "directory",
			Self::RegularFile => "regular file",
			Self::Symlink => "symlink",
		};
		f.write_str(s)
	}
}

/// The two operation families used against a single directory entry slot:
/// ADD creates new content, ATTACH grafts existing (already initialized)
/// content; REM soft-removes (recoverable), DETACH hard-removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOp {
	Add,
	Attach,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemOp {
	Rem,
	Detach,
}

/// The five operations [`crate::Sofs::handle_file_cluster`] understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterOp {
	Get,
	Alloc,
	Free,
	FreeClean,
	Clean,
}

/// Superblock (on-disk, block 0).
#[derive(Debug, Clone)]
pub struct Superblock {
	pub magic: u32,
	pub version: u16,
	pub name: [u8; PARTITION_NAME_SIZE],
	pub n_total: u32,
	pub m_stat: u8,

	pub i_table_start: u32,
	pub i_table_size: u32,
	pub i_total: u32,
	pub i_free: u32,
	pub i_head: InodeNum,
	pub i_tail: InodeNum,

	pub d_zone_start: u32,
	pub d_zone_total: u32,
	pub d_zone_free: u32,
	pub d_head: ClusterNum,
	pub d_tail: ClusterNum,

	/// Stack of cached logical cluster numbers ready to hand out.
	/// `retriev_idx == DZONE_CACHE_SIZE` means the cache is empty.
	pub d_zone_retriev_idx: u32,
	pub d_zone_retriev_cache: [ClusterNum; DZONE_CACHE_SIZE],

	/// Logical cluster numbers waiting to be spliced back into the free
	/// chain. `insert_idx` counts filled slots from index 0 upward.
	pub d_zone_insert_idx: u32,
	pub d_zone_insert_cache: [ClusterNum; DZONE_CACHE_SIZE],
}

impl Superblock {
	/// Physical block holding the first inode of table block `i`.
	pub fn inode_table_block(&self, i: u64) -> u64 {
		self.i_table_start as u64 + i
	}

	/// Physical byte offset of inode `inr`.
	pub fn inode_offset(&self, inr: InodeNum) -> u64 {
		let inr = inr as u64;
		let block = self.i_table_start as u64 + inr / IPB;
		block * BLOCK_SIZE + (inr % IPB) * INODE_SIZE
	}

	/// Physical byte offset of logical data cluster `c`.
	pub fn cluster_offset(&self, c: ClusterNum) -> u64 {
		(self.d_zone_start as u64 + c as u64 * BLOCKS_PER_CLUSTER) * BLOCK_SIZE
	}

	pub fn name_str(&self) -> &str {
		let len = self.name.iter().position(|&b| b == 0).unwrap_or(self.name.len());
		std::str::from_utf8(&self.name[..len]).unwrap_or("")
	}

	pub fn set_name(&mut self, name: &str) {
		self.name = [0u8; PARTITION_NAME_SIZE];
		let bytes = name.as_bytes();
		let n = bytes.len().min(PARTITION_NAME_SIZE - 1);
		self.name[..n].copy_from_slice(&bytes[..n]);
	}
}

impl Encode for Superblock {
	fn encode<E: Encoder>(&self, e: &mut E) -> Result<(), EncodeError> {
		self.magic.encode(e)?;
		self.version.encode(e)?;
		for b in &self.name {
			b.encode(e)?;
		}
		self.n_total.encode(e)?;
		self.m_stat.encode(e)?;
		self.i_table_start.encode(e)?;
		self.i_table_size.encode(e)?;
		self.i_total.encode(e)?;
		self.i_free.encode(e)?;
		self.i_head.encode(e)?;
		self.i_tail.encode(e)?;
		self.d_zone_start.encode(e)?;
		self.d_zone_total.encode(e)?;
		self.d_zone_free.encode(e)?;
		self.d_head.encode(e)?;
		self.d_tail.encode(e)?;
		self.d_zone_retriev_idx.encode(e)?;
		for x in &self.d_zone_retriev_cache {
			x.encode(e)?;
		}
		self.d_zone_insert_idx.encode(e)?;
		for x in &self.d_zone_insert_cache {
			x.encode(e)?;
		}
		Ok(())
	}
}

impl Decode for Superblock {
	fn decode<D: Decoder>(d: &mut D) -> Result<Self, DecodeError> {
		let magic = u32::decode(d)?;
		let version = u16::decode(d)?;
		let mut name = [0u8; PARTITION_NAME_SIZE];
		for b in &mut name {
			*b = u8::decode(d)?;
		}
		let n_total = u32::decode(d)?;
		let m_stat = u8::decode(d)?;
		let i_table_start = u32::decode(d)?;
		let i_table_size = u32::decode(d)?;
		let i_total = u32::decode(d)?;
		let i_free = u32::decode(d)?;
		let i_head = u32::decode(d)?;
		let i_tail = u32::decode(d)?;
		let d_zone_start = u32::decode(d)?;
		let d_zone_total = u32::decode(d)?;
		let d_zone_free = u32::decode(d)?;
		let d_head = u32::decode(d)?;
		let d_tail = u32::decode(d)?;
		let d_zone_retriev_idx = u32::decode(d)?;
		let mut d_zone_retriev_cache = [0u32; DZONE_CACHE_SIZE];
		for x in &mut d_zone_retriev_cache {
			*x = u32::decode(d)?;
		}
		let d_zone_insert_idx = u32::decode(d)?;
		let mut d_zone_insert_cache = [0u32; DZONE_CACHE_SIZE];
		for x in &mut d_zone_insert_cache {
			*x = u32::decode(d)?;
		}
		Ok(Self {
			magic,
			version,
			name,
			n_total,
			m_stat,
			i_table_start,
			i_table_size,
			i_total,
			i_free,
			i_head,
			i_tail,
			d_zone_start,
			d_zone_total,
			d_zone_free,
			d_head,
			d_tail,
			d_zone_retriev_idx,
			d_zone_retriev_cache,
			d_zone_insert_idx,
			d_zone_insert_cache,
		})
	}
}

/// Inode (on-disk, `INODE_SIZE` bytes).
///
/// `time_a`/`time_b` are a tagged union: while the inode is in use they
/// hold `aTime`/`mTime`; while the inode is free-dirty they hold the
/// `next`/`prev` links of the free-inode list. The tag is the inode's
/// `mode` free flag, not anything stored separately, so the raw record
/// needs no special-cased (de)serialization -- see [`Inode::next`] and
/// friends for the interpretation.
#[derive(Debug, Clone, Encode, Decode)]
pub struct Inode {
	pub mode: u16,
	pub ref_count: u16,
	pub owner: u32,
	pub group: u32,
	pub size: u64,
	pub clu_count: u32,
	pub d: [ClusterNum; N_DIRECT],
	pub i1: ClusterNum,
	pub i2: ClusterNum,
	pub time_a: u32,
	pub time_b: u32,
}

impl Inode {
	pub fn is_free(&self) -> bool {
		self.mode & INODE_FREE != 0
	}

	pub fn kind(&self) -> Option<InodeType> {
		if self.is_free() {
			None
		} else {
			InodeType::from_mode(self.mode)
		}
	}

	pub fn perm(&self) -> u16 {
		self.mode & INODE_PERM_MASK
	}

	/// `aTime`, valid only while the inode is in use.
	pub fn atime(&self) -> u32 {
		self.time_a
	}

	/// `mTime`, valid only while the inode is in use.
	pub fn mtime(&self) -> u32 {
		self.time_b
	}

	pub fn set_atime(&mut self, t: u32) {
		self.time_a = t;
	}

	pub fn set_mtime(&mut self, t: u32) {
		self.time_b = t;
	}

	/// `next` link of the free-inode list, valid only while free.
	pub fn free_next(&self) -> InodeNum {
		self.time_a
	}

	pub fn set_free_next(&mut self, v: InodeNum) {
		self.time_a = v;
	}

	/// `prev` link of the free-inode list, valid only while free.
	pub fn free_prev(&self) -> InodeNum {
		self.time_b
	}

	pub fn set_free_prev(&mut self, v: InodeNum) {
		self.time_b = v;
	}
}

/// A data cluster's header: the doubly-linked chain link used both when
/// free (the free-cluster chain) and when in use (the file's own
/// data-cluster chain), plus `stat`, the owning inode number.
#[derive(Debug, Clone, Copy, Encode, Decode)]
pub struct ClusterHeader {
	pub prev: ClusterNum,
	pub next: ClusterNum,
	pub stat: InodeNum,
}

/// One directory entry record (on-disk, `DIRENTRY_SIZE` bytes).
#[derive(Debug, Clone)]
pub struct DirEntry {
	pub name: [u8; MAX_NAME + 1],
	pub n_inode: InodeNum,
}

impl DirEntry {
	pub fn empty() -> Self {
		Self {
			name: [0u8; MAX_NAME + 1],
			n_inode: NULL_INODE,
		}
	}

	/// An entry is empty (free-and-clean) when both the first and last
	/// bytes of `name` are NUL and `n_inode` is `NULL_INODE`.
	pub fn is_empty_slot(&self) -> bool {
		self.name[0] == 0 && self.name[MAX_NAME] == 0 && self.n_inode == NULL_INODE
	}

	/// A "removed" entry has had the first and last bytes of its name
	/// exchanged (soft/recoverable removal, see §4.7 REM).
	pub fn is_removed(&self) -> bool {
		self.name[0] == 0 && self.name[MAX_NAME] != 0
	}

	pub fn name_str(&self) -> &str {
		let len = self.name.iter().position(|&b| b == 0).unwrap_or(self.name.len());
		std::str::from_utf8(&self.name[..len]).unwrap_or("")
	}

	pub fn set_name(&mut self, name: &str) {
		self.name = [0u8; MAX_NAME + 1];
		let bytes = name.as_bytes();
		self.name[..bytes.len()].copy_from_slice(bytes);
	}

	pub fn soft_remove(&mut self) {
		self.name[MAX_NAME] = self.name[0];
		self.name[0] = 0;
	}
}

impl Encode for DirEntry {
	fn encode<E: Encoder>(&self, e: &mut E) -> Result<(), EncodeError> {
		for b in &self.name {
			b.encode(e)?;
		}
		self.n_inode.encode(e)?;
		Ok(())
	}
}

impl Decode for DirEntry {
	fn decode<D: Decoder>(d: &mut D) -> Result<Self, DecodeError> {
		let mut name = [0u8; MAX_NAME + 1];
		for b in &mut name {
			*b = u8::decode(d)?;
		}
		let n_inode = u32::decode(d)?;
		Ok(Self { name, n_inode })
	}
}
