//! §4.5 HandleFileClusters: applies FREE / FREE_CLEAN / CLEAN to every
//! allocated position at or beyond a starting index, outside-in so that the
//! §4.4 empty-subtree reclamation fires as each index cluster empties out.

use super::Sofs;
use crate::{
	blockreader::Backend,
	data::{ClusterOp, InodeNum, N_DIRECT, NULL_CLUSTER, RPC},
	Result,
};

pub(crate) fn handle_file_clusters<R: Backend>(sofs: &mut Sofs<R>, nr: InodeNum, op: ClusterOp, start_idx: u32) -> Result<()> {
	debug_assert!(matches!(op, ClusterOp::Free | ClusterOp::FreeClean | ClusterOp::Clean));

	let n_direct = N_DIRECT as u64;
	let double_start = n_direct + RPC;

	// Outer (double-indirect) subtree.
	let lo = (start_idx as u64).max(double_start);
	let hi = (n_direct + RPC + RPC * RPC).min(crate::data::MAX_FILE_CLUSTERS);
	if lo < hi {
		let inode = sofs.read_inode(nr)?;
		if inode.i2 != NULL_CLUSTER {
			let outer = inode.i2;
			let p2_lo = ((lo - double_start) / RPC) as usize;
			let p2_hi = (((hi - 1) - double_start) / RPC) as usize;
			for p2 in p2_lo..=p2_hi {
				let inner = sofs.read_ref(outer, p2)?;
				if inner == NULL_CLUSTER {
					continue;
				}
				for p1 in 0..RPC as usize {
					let clust_ind = double_start + (p2 as u64) * RPC + p1 as u64;
					if clust_ind < lo || clust_ind >= hi {
						continue;
					}
					let s = sofs.read_ref(inner, p1)?;
					if s == NULL_CLUSTER {
						continue;
					}
					sofs.handle_file_cluster(nr, clust_ind as u32, op)?;
				}
			}
		}
	}

	// Single-indirect subtree.
	let lo = (start_idx as u64).max(n_direct);
	let hi = double_start.min(crate::data::MAX_FILE_CLUSTERS);
	if lo < hi {
		let inode = sofs.read_inode(nr)?;
		if inode.i1 != NULL_CLUSTER {
			let idx = inode.i1;
			for p1 in (lo - n_direct)..(hi - n_direct) {
				let s = sofs.read_ref(idx, p1 as usize)?;
				if s == NULL_CLUSTER {
					continue;
				}
				sofs.handle_file_cluster(nr, (n_direct + p1) as u32, op)?;
			}
		}
	}

	// Direct references.
	let lo = start_idx as u64;
	let hi = n_direct;
	if lo < hi {
		let inode = sofs.read_inode(nr)?;
		for i in lo..hi {
			if inode.d[i as usize] == NULL_CLUSTER {
				continue;
			}
			sofs.handle_file_cluster(nr, i as u32, op)?;
		}
	}

	Ok(())
}
