//! §4.8 Consistency checks: five predicates used defensively across the
//! core. [`Sofs::check_all`] runs the structural, whole-volume ones after
//! formatting; the per-inode/per-cluster predicates are exposed for the
//! higher layers (and tests) to call against a specific object.

use super::Sofs;
use crate::{
	blockreader::Backend,
	data::{InodeType, Superblock, DPC, DZONE_CACHE_SIZE, MAGIC_NUMBER, NULL_CLUSTER, NULL_INODE},
	error::err,
	InodeNum, Result,
};

/// `QCheckSuperBlock`.
pub(crate) fn check_super_block(sb: &Superblock) -> Result<()> {
	if sb.magic != MAGIC_NUMBER {
		return Err(err!(LibBad));
	}
	if sb.i_free == 0 && (sb.i_head != NULL_INODE || sb.i_tail != NULL_INODE) {
		return Err(err!(LibBad));
	}
	if sb.i_free != 0 && (sb.i_head == NULL_INODE || sb.i_tail == NULL_INODE) {
		return Err(err!(LibBad));
	}
	if sb.d_zone_retriev_idx as usize > DZONE_CACHE_SIZE {
		return Err(err!(DcMInval));
	}
	if sb.d_zone_insert_idx as usize > DZONE_CACHE_SIZE {
		return Err(err!(DcMInval));
	}
	Ok(())
}

/// `QCheckInT`: the free-inode list is acyclic, terminates in `NULL_INODE`
/// at both ends, and has exactly `iFree` members.
pub(crate) fn check_int<R: Backend>(sofs: &mut Sofs<R>, sb: &Superblock) -> Result<()> {
	let mut count = 0u32;
	let mut cur = sb.i_head;
	let mut prev = NULL_INODE;
	while cur != NULL_INODE {
		if count > sb.i_total {
			return Err(err!(LibBad));
		}
		let inode = sofs.read_inode(cur)?;
		if !inode.is_free() {
			return Err(err!(FdInInval));
		}
		if inode.free_prev() != prev {
			return Err(err!(LibBad));
		}
		prev = cur;
		cur = inode.free_next();
		count += 1;
	}
	if count != sb.i_free {
		return Err(err!(LibBad));
	}
	if sb.i_free > 0 && prev != sb.i_tail {
		return Err(err!(LibBad));
	}
	Ok(())
}

/// `QCheckDZ`: `dZoneFree` equals the insertion cache's fill count plus the
/// on-disk chain length plus the retrieval cache's remaining slots.
pub(crate) fn check_dz<R: Backend>(sofs: &mut Sofs<R>, sb: &Superblock) -> Result<()> {
	let insert_count = sb.d_zone_insert_idx;
	let retriev_count = DZONE_CACHE_SIZE as u32 - sb.d_zone_retriev_idx;

	let mut chain_count = 0u32;
	let mut cur = sb.d_head;
	let mut prev = NULL_CLUSTER;
	while cur != NULL_CLUSTER {
		if chain_count > sb.d_zone_total {
			return Err(err!(LibBad));
		}
		let hdr = sofs.read_cluster_header(cur)?;
		if hdr.prev != prev {
			return Err(err!(LibBad));
		}
		prev = cur;
		cur = hdr.next;
		chain_count += 1;
	}
	if sb.d_zone_total > 0 && chain_count > 0 && prev != sb.d_tail {
		return Err(err!(LibBad));
	}

	if insert_count + chain_count + retriev_count != sb.d_zone_free {
		return Err(err!(DcMInval));
	}
	Ok(())
}

/// `QCheckInodeIU`: an in-use inode names exactly one legal type and has
/// the free flag clear.
pub(crate) fn check_inode_iu<R: Backend>(sofs: &mut Sofs<R>, nr: InodeNum) -> Result<()> {
	let inode = sofs.read_inode(nr)?;
	if inode.is_free() {
		return Err(err!(IuInInval));
	}
	if inode.kind().is_none() {
		return Err(err!(IuInInval));
	}
	Ok(())
}

/// `QCheckDirCont`: a directory's first two entries are `.` and `..`.
pub(crate) fn check_dir_cont<R: Backend>(sofs: &mut Sofs<R>, nr: InodeNum) -> Result<()> {
	let inode = sofs.read_inode(nr)?;
	if inode.kind() != Some(InodeType::Directory) {
		return Err(err!(DirInval));
	}
	if inode.clu_count == 0 || inode.size != inode.clu_count as u64 * DPC as u64 * crate::data::DIRENTRY_SIZE {
		return Err(err!(DirInval));
	}
	Ok(())
}
