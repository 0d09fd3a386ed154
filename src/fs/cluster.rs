//! File-cluster index: §4.4 HandleFileCluster plus AttachLogicalCluster and
//! CleanLogicalCluster, the leaves every higher layer (sweep, read/write,
//! directories) ultimately calls through.

use log::trace;

use super::Sofs;
use crate::{
	blockreader::Backend,
	data::{ClusterHeader, ClusterNum, ClusterOp, InodeNum, N_DIRECT, NULL_CLUSTER, NULL_INODE, RPC},
	error::err,
	Result,
};

/// Which level of the index a logical position falls into.
enum Level {
	Direct(usize),
	Single { p1: usize },
	Double { p2: usize, p1: usize },
}

fn classify(clust_ind: u32) -> Level {
	let clust_ind = clust_ind as u64;
	let n_direct = N_DIRECT as u64;
	if clust_ind < n_direct {
		Level::Direct(clust_ind as usize)
	} else if clust_ind < n_direct + RPC {
		Level::Single { p1: (clust_ind - n_direct) as usize }
	} else {
		let rem = clust_ind - n_direct - RPC;
		Level::Double { p2: (rem / RPC) as usize, p1: (rem % RPC) as usize }
	}
}

impl<R: Backend> Sofs<R> {
	pub(super) fn read_ref(&mut self, c: ClusterNum, slot: usize) -> Result<ClusterNum> {
		let off = self.sb.cluster_offset(c) + crate::data::CLUSTER_HEADER_SIZE + (slot as u64) * 4;
		let mut buf = [0u8; 4];
		self.dec.read_at(off, &mut buf)?;
		Ok(u32::from_le_bytes(buf))
	}

	pub(super) fn write_ref(&mut self, c: ClusterNum, slot: usize, val: ClusterNum) -> Result<()> {
		let off = self.sb.cluster_offset(c) + crate::data::CLUSTER_HEADER_SIZE + (slot as u64) * 4;
		self.dec.fill_at(off, &val.to_le_bytes())?;
		Ok(())
	}

	/// True iff every one of the `RPC` reference slots in cluster `c` is
	/// `NULL_CLUSTER`.
	fn index_cluster_is_empty(&mut self, c: ClusterNum) -> Result<bool> {
		for i in 0..RPC as usize {
			if self.read_ref(c, i)? != NULL_CLUSTER {
				return Ok(false);
			}
		}
		Ok(true)
	}

	/// Allocate and zero-initialize a fresh index (single/double-indirect
	/// reference) cluster owned by `nr`.
	fn alloc_index_cluster(&mut self, nr: InodeNum) -> Result<ClusterNum> {
		let c = self.alloc_cluster(nr)?;
		for i in 0..RPC as usize {
			self.write_ref(c, i, NULL_CLUSTER)?;
		}
		Ok(c)
	}

	/// Applies `op` at leaf reference slot `s` (the table in §4.4), where
	/// `s` is the current contents of that slot. Returns the slot's new
	/// contents, the value to report to the caller, and the `cluCount`
	/// delta.
	fn apply_leaf(&mut self, nr: InodeNum, clust_ind: u32, op: ClusterOp, s: ClusterNum) -> Result<(ClusterNum, Option<ClusterNum>, i64)> {
		use ClusterOp::*;
		match op {
			Get => Ok((s, if s == NULL_CLUSTER { None } else { Some(s) }, 0)),
			Alloc => {
				if s != NULL_CLUSTER {
					return Err(err!(DcArdyIl));
				}
				let c = self.alloc_cluster(nr)?;
				self.attach_logical_cluster(nr, clust_ind, c)?;
				Ok((c, Some(c), 1))
			}
			Free => {
				if s == NULL_CLUSTER {
					return Err(err!(DcNotIl));
				}
				self.free_cluster(s, false)?;
				Ok((s, None, 0))
			}
			FreeClean => {
				if s == NULL_CLUSTER {
					return Err(err!(DcNotIl));
				}
				self.free_cluster(s, true)?;
				Ok((NULL_CLUSTER, None, -1))
			}
			Clean => {
				if s == NULL_CLUSTER {
					return Err(err!(DcNotIl));
				}
				self.clean_logical_cluster(nr, s)?;
				Ok((NULL_CLUSTER, None, -1))
			}
		}
	}

	/// `HandleFileCluster`.
	pub fn handle_file_cluster(&mut self, nr: InodeNum, clust_ind: u32, op: ClusterOp) -> Result<Option<ClusterNum>> {
		if clust_ind as u64 >= crate::data::MAX_FILE_CLUSTERS {
			return Err(err!(FBig));
		}
		let in_use = !matches!(op, ClusterOp::Clean);
		let mut inode = if in_use {
			self.read_inode_checked(nr, true)?
		} else {
			let i = self.read_inode(nr)?;
			if !i.is_free() {
				return Err(err!(FdInInval));
			}
			i
		};

		let result = match classify(clust_ind) {
			Level::Direct(i) => {
				let s = inode.d[i];
				let (new_s, res, delta) = self.apply_leaf(nr, clust_ind, op, s)?;
				inode.d[i] = new_s;
				inode.clu_count = (inode.clu_count as i64 + delta).max(0) as u32;
				res
			}
			Level::Single { p1 } => {
				if inode.i1 == NULL_CLUSTER {
					if matches!(op, ClusterOp::Get) {
						// GET is a pure lookup over an index that doesn't
						// exist yet: nothing was read or mutated, so there
						// is nothing to write back and no timestamp to bump.
						return Ok(None);
					}
					if !matches!(op, ClusterOp::Alloc) {
						return Err(err!(DcNotIl));
					}
					inode.i1 = self.alloc_index_cluster(nr)?;
					inode.clu_count += 1;
					// Persist immediately: AttachLogicalCluster below may need
					// to find this index cluster via a recursive GET before
					// this call's final write_inode_checked runs.
					self.write_inode(nr, &inode)?;
				}
				let idx = inode.i1;
				let s = self.read_ref(idx, p1)?;
				let (new_s, res, delta) = self.apply_leaf(nr, clust_ind, op, s)?;
				self.write_ref(idx, p1, new_s)?;
				inode.clu_count = (inode.clu_count as i64 + delta).max(0) as u32;

				if matches!(op, ClusterOp::FreeClean | ClusterOp::Clean) && self.index_cluster_is_empty(idx)? {
					self.free_cluster(idx, true)?;
					inode.i1 = NULL_CLUSTER;
					inode.clu_count = inode.clu_count.saturating_sub(1);
				}
				res
			}
			Level::Double { p2, p1 } => {
				if inode.i2 == NULL_CLUSTER {
					if matches!(op, ClusterOp::Get) {
						// GET is a pure lookup over an index that doesn't
						// exist yet: nothing was read or mutated, so there
						// is nothing to write back and no timestamp to bump.
						return Ok(None);
					}
					if !matches!(op, ClusterOp::Alloc) {
						return Err(err!(DcNotIl));
					}
					inode.i2 = self.alloc_index_cluster(nr)?;
					inode.clu_count += 1;
					self.write_inode(nr, &inode)?;
				}
				let outer = inode.i2;
				let mut inner = self.read_ref(outer, p2)?;
				if inner == NULL_CLUSTER {
					if matches!(op, ClusterOp::Get) {
						// GET is a pure lookup over an index that doesn't
						// exist yet: nothing was read or mutated, so there
						// is nothing to write back and no timestamp to bump.
						return Ok(None);
					}
					if !matches!(op, ClusterOp::Alloc) {
						return Err(err!(DcNotIl));
					}
					inner = self.alloc_index_cluster(nr)?;
					self.write_ref(outer, p2, inner)?;
					inode.clu_count += 1;
					self.write_inode(nr, &inode)?;
				}

				let s = self.read_ref(inner, p1)?;
				let (new_s, res, delta) = self.apply_leaf(nr, clust_ind, op, s)?;
				self.write_ref(inner, p1, new_s)?;
				inode.clu_count = (inode.clu_count as i64 + delta).max(0) as u32;

				if matches!(op, ClusterOp::FreeClean | ClusterOp::Clean) && self.index_cluster_is_empty(inner)? {
					self.free_cluster(inner, true)?;
					self.write_ref(outer, p2, NULL_CLUSTER)?;
					inode.clu_count = inode.clu_count.saturating_sub(1);

					if self.index_cluster_is_empty(outer)? {
						self.free_cluster(outer, true)?;
						inode.i2 = NULL_CLUSTER;
						inode.clu_count = inode.clu_count.saturating_sub(1);
					}
				}
				res
			}
		};

		// GET never mutates inode.d[]/i1/i2/cluCount (apply_leaf's GET arm
		// returns the slot unchanged with a zero cluCount delta), so skip
		// the writeback rather than bump mTime/aTime on a pure read.
		if !matches!(op, ClusterOp::Get) {
			self.write_inode_checked(nr, inode, in_use)?;
		}
		trace!("handle_file_cluster({nr}, {clust_ind}, {op:?}) = {result:?}");
		Ok(result)
	}

	/// `AttachLogicalCluster`: splices the freshly allocated cluster
	/// `n_lclust` into the file's doubly-linked data-cluster chain at
	/// logical position `clust_ind`.
	pub(crate) fn attach_logical_cluster(&mut self, nr: InodeNum, clust_ind: u32, n_lclust: ClusterNum) -> Result<()> {
		let hdr = self.read_cluster_header(n_lclust)?;
		if hdr.stat != nr {
			return Err(err!(WgInodeNb));
		}

		let prev = if clust_ind == 0 {
			NULL_CLUSTER
		} else {
			self.handle_file_cluster(nr, clust_ind - 1, ClusterOp::Get)?.unwrap_or(NULL_CLUSTER)
		};
		let next = if clust_ind as u64 + 1 >= crate::data::MAX_FILE_CLUSTERS {
			NULL_CLUSTER
		} else {
			self.handle_file_cluster(nr, clust_ind + 1, ClusterOp::Get)?.unwrap_or(NULL_CLUSTER)
		};

		self.write_cluster_header(n_lclust, &ClusterHeader { prev, next, stat: nr })?;

		if prev != NULL_CLUSTER {
			let mut h = self.read_cluster_header(prev)?;
			h.next = n_lclust;
			self.write_cluster_header(prev, &h)?;
		}
		if next != NULL_CLUSTER {
			let mut h = self.read_cluster_header(next)?;
			h.prev = n_lclust;
			self.write_cluster_header(next, &h)?;
		}
		Ok(())
	}

	/// `CleanLogicalCluster`: dissociates `n_lclust` from `nr` without
	/// touching the free-chain links, which some §4.2 structure already
	/// owns.
	pub(crate) fn clean_logical_cluster(&mut self, nr: InodeNum, n_lclust: ClusterNum) -> Result<()> {
		let mut hdr = self.read_cluster_header(n_lclust)?;
		if hdr.stat != nr {
			return Err(err!(WgInodeNb));
		}
		hdr.stat = NULL_INODE;
		self.write_cluster_header(n_lclust, &hdr)?;
		Ok(())
	}
}
