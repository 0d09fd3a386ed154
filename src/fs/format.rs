//! §4.1 Formatter.

use log::info;

use super::{now, Sofs};
use crate::{
	blockreader::{Backend, BlockReader},
	data::{
		ClusterHeader, DirEntry, Inode, Superblock, BLOCK_SIZE, DPC, DZONE_CACHE_SIZE, INODE_DIR, IPB, MAGIC_FORMATTING,
		MAGIC_NUMBER, MSTAT_PRU, NULL_CLUSTER, NULL_INODE, PARTITION_NAME_SIZE, VERSION_NUMBER,
	},
	decoder::Decoder,
	Result,
};

/// Parameters accepted by the format tool surface (§6): volume name, an
/// optional inode-count override, and whether free-cluster payloads are
/// zeroed.
#[derive(Debug, Clone)]
pub struct FormatOptions {
	pub name: String,
	pub inode_count: Option<u32>,
	pub zero_mode: bool,
}

impl Default for FormatOptions {
	fn default() -> Self {
		Self { name: "SOFS14".to_string(), inode_count: None, zero_mode: false }
	}
}

impl<R: Backend> Sofs<R> {
	/// Formats `backend` (which must already be sized to a whole number of
	/// blocks) and returns it opened read-write. Mirrors `mkfs_sofs14`:
	/// lays out the superblock, inode table and root directory, then runs
	/// [`Sofs::check_all`] before handing back the open volume.
	pub fn format(backend: R, n_total_blocks: u32, opts: &FormatOptions) -> Result<Self> {
		let mut dec = Decoder::new(BlockReader::new(backend, true));

		let ipb = IPB as u32;
		let mut i_total = match opts.inode_count {
			Some(0) | None => n_total_blocks / 8,
			Some(n) => n,
		};
		i_total = i_total.div_ceil(ipb).max(1) * ipb;
		let i_blk_total = i_total / ipb;

		let bpc = crate::data::BLOCKS_PER_CLUSTER as u32;
		let n_clust_total = (n_total_blocks - 1 - i_blk_total) / bpc;

		let i_table_start = 1u32;
		let d_zone_start = i_table_start + i_blk_total;

		let mut name = [0u8; PARTITION_NAME_SIZE];
		let bytes = opts.name.as_bytes();
		let n = bytes.len().min(PARTITION_NAME_SIZE - 1);
		name[..n].copy_from_slice(&bytes[..n]);

		let mut sb = Superblock {
			magic: MAGIC_FORMATTING,
			version: VERSION_NUMBER,
			name,
			n_total: n_total_blocks,
			m_stat: MSTAT_PRU,
			i_table_start,
			i_table_size: i_blk_total,
			i_total,
			i_free: i_total - 1,
			i_head: if i_total > 1 { 1 } else { NULL_INODE },
			i_tail: if i_total > 1 { i_total - 1 } else { NULL_INODE },
			d_zone_start,
			d_zone_total: n_clust_total,
			d_zone_free: n_clust_total.saturating_sub(1),
			d_head: if n_clust_total > 1 { 1 } else { NULL_CLUSTER },
			d_tail: if n_clust_total > 1 { n_clust_total - 1 } else { NULL_CLUSTER },
			d_zone_retriev_idx: DZONE_CACHE_SIZE as u32,
			d_zone_retriev_cache: [NULL_CLUSTER; DZONE_CACHE_SIZE],
			d_zone_insert_idx: 0,
			d_zone_insert_cache: [NULL_CLUSTER; DZONE_CACHE_SIZE],
		};
		dec.encode_at(0, &sb)?;

		let t = now();
		let root = Inode {
			mode: INODE_DIR | 0o777,
			ref_count: 2,
			owner: 0,
			group: 0,
			size: DPC as u64 * crate::data::DIRENTRY_SIZE,
			clu_count: 1,
			d: {
				let mut d = [NULL_CLUSTER; crate::data::N_DIRECT];
				d[0] = 0;
				d
			},
			i1: NULL_CLUSTER,
			i2: NULL_CLUSTER,
			time_a: t,
			time_b: t,
		};
		dec.encode_at(sb.inode_offset(0), &root)?;

		for i in 1..i_total {
			let free = Inode {
				mode: crate::data::INODE_FREE,
				ref_count: 0,
				owner: 0,
				group: 0,
				size: 0,
				clu_count: 0,
				d: [NULL_CLUSTER; crate::data::N_DIRECT],
				i1: NULL_CLUSTER,
				i2: NULL_CLUSTER,
				time_a: if i == 1 { NULL_INODE } else { i - 1 },
				time_b: if i + 1 == i_total { NULL_INODE } else { i + 1 },
			};
			dec.encode_at(sb.inode_offset(i), &free)?;
		}

		let mut dot = DirEntry::empty();
		dot.set_name(".");
		dot.n_inode = 0;
		let mut dotdot = DirEntry::empty();
		dotdot.set_name("..");
		dotdot.n_inode = 0;
		let cluster0_off = sb.cluster_offset(0);
		dec.encode_at(cluster0_off, &ClusterHeader { prev: NULL_CLUSTER, next: NULL_CLUSTER, stat: 0 })?;
		dec.encode_at(cluster0_off + crate::data::CLUSTER_HEADER_SIZE, &dot)?;
		dec.encode_at(cluster0_off + crate::data::CLUSTER_HEADER_SIZE + crate::data::DIRENTRY_SIZE, &dotdot)?;
		for idx in 2..DPC as u64 {
			dec.encode_at(
				cluster0_off + crate::data::CLUSTER_HEADER_SIZE + idx * crate::data::DIRENTRY_SIZE,
				&DirEntry::empty(),
			)?;
		}

		for c in 1..n_clust_total {
			let hdr = ClusterHeader {
				prev: if c == 1 { NULL_CLUSTER } else { c - 1 },
				next: if c + 1 == n_clust_total { NULL_CLUSTER } else { c + 1 },
				stat: NULL_INODE,
			};
			let off = sb.cluster_offset(c);
			dec.encode_at(off, &hdr)?;
			if opts.zero_mode {
				let zeros = vec![0u8; BLOCK_SIZE as usize * crate::data::BLOCKS_PER_CLUSTER as usize - crate::data::CLUSTER_HEADER_SIZE as usize];
				dec.fill_at(off + crate::data::CLUSTER_HEADER_SIZE, &zeros)?;
			}
		}

		sb.magic = MAGIC_NUMBER;
		dec.encode_at(0, &sb)?;

		let mut sofs = Self { dec, sb };
		sofs.check_all()?;
		info!(
			"format(): nTotal={n_total_blocks} iTotal={i_total} dZoneTotal={n_clust_total} name={:?}",
			opts.name
		);
		Ok(sofs)
	}

	/// Formats `backend` and immediately discards the handle; used by the
	/// `mkfs` binary, which only needs the side effect.
	pub fn format_into(backend: R, n_total_blocks: u32, opts: &FormatOptions) -> Result<()> {
		Self::format(backend, n_total_blocks, opts)?;
		Ok(())
	}
}
