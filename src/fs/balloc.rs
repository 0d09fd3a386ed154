//! Superblock free-cluster caches: §4.2 Replenish/Deplete and the
//! alloc/free/clean entry points built on top of them.

use log::trace;

use super::Sofs;
use crate::{
	blockreader::Backend,
	data::{ClusterHeader, ClusterNum, DZONE_CACHE_SIZE, NULL_CLUSTER, NULL_INODE},
	error::err,
	InodeNum, Result,
};

impl<R: Backend> Sofs<R> {
	/// Replenish the retrieval cache from the on-disk free chain, invoking
	/// Deplete once if the chain runs dry first.
	fn replenish(&mut self) -> Result<()> {
		debug_assert_eq!(self.sb.d_zone_retriev_idx as usize, DZONE_CACHE_SIZE, "replenish called on a non-empty cache");
		if self.sb.d_zone_free == 0 {
			return Ok(());
		}

		let nctt = self.sb.d_zone_free.min(DZONE_CACHE_SIZE as u32) as usize;
		let mut taken = 0usize;
		let mut cur = self.sb.d_head;

		while taken < nctt {
			if cur == NULL_CLUSTER {
				self.sb.d_head = NULL_CLUSTER;
				self.sb.d_tail = NULL_CLUSTER;
				self.deplete()?;
				cur = self.sb.d_head;
				if cur == NULL_CLUSTER {
					break;
				}
				continue;
			}

			let h = self.read_cluster_header(cur)?;
			let slot = DZONE_CACHE_SIZE - nctt + taken;
			self.sb.d_zone_retriev_cache[slot] = cur;

			let next = h.next;
			let mut h = h;
			h.prev = NULL_CLUSTER;
			h.next = NULL_CLUSTER;
			self.write_cluster_header(cur, &h)?;

			taken += 1;
			cur = next;
		}

		self.sb.d_zone_retriev_idx = (DZONE_CACHE_SIZE - taken) as u32;
		self.sb.d_head = cur;
		if cur == NULL_CLUSTER {
			self.sb.d_tail = NULL_CLUSTER;
		} else {
			let mut h = self.read_cluster_header(cur)?;
			h.prev = NULL_CLUSTER;
			self.write_cluster_header(cur, &h)?;
		}

		trace!("replenish(); took {taken} cluster(s), dHead={}", self.sb.d_head);
		Ok(())
	}

	/// Splice the insertion cache onto the tail of the on-disk free chain.
	fn deplete(&mut self) -> Result<()> {
		let n = self.sb.d_zone_insert_idx as usize;
		if n == 0 {
			return Ok(());
		}

		let cache = self.sb.d_zone_insert_cache;
		let old_tail = self.sb.d_tail;

		if old_tail != NULL_CLUSTER {
			let mut tail_hdr = self.read_cluster_header(old_tail)?;
			tail_hdr.next = cache[0];
			self.write_cluster_header(old_tail, &tail_hdr)?;
		}

		for i in 0..n {
			let prev = if i == 0 { old_tail } else { cache[i - 1] };
			let next = if i + 1 == n { NULL_CLUSTER } else { cache[i + 1] };
			let mut hdr = self.read_cluster_header(cache[i])?;
			hdr.prev = prev;
			hdr.next = next;
			self.write_cluster_header(cache[i], &hdr)?;
		}

		self.sb.d_tail = cache[n - 1];
		if self.sb.d_head == NULL_CLUSTER {
			self.sb.d_head = cache[0];
		}

		self.sb.d_zone_insert_cache = [NULL_CLUSTER; DZONE_CACHE_SIZE];
		self.sb.d_zone_insert_idx = 0;

		trace!("deplete(); spliced {n} cluster(s), dTail={}", self.sb.d_tail);
		Ok(())
	}

	/// Pop a free cluster off the retrieval cache (replenishing first if
	/// needed), dissociate it from its previous owner and hand it out.
	pub(crate) fn alloc_cluster(&mut self, owner: InodeNum) -> Result<ClusterNum> {
		if self.sb.d_zone_free == 0 {
			return Err(err!(NoSpc));
		}
		if self.sb.d_zone_retriev_idx as usize == DZONE_CACHE_SIZE {
			self.replenish()?;
		}
		let idx = self.sb.d_zone_retriev_idx as usize;
		let c = self.sb.d_zone_retriev_cache[idx];
		self.sb.d_zone_retriev_cache[idx] = NULL_CLUSTER;
		self.sb.d_zone_retriev_idx += 1;
		self.sb.d_zone_free -= 1;

		let hdr = ClusterHeader { prev: NULL_CLUSTER, next: NULL_CLUSTER, stat: owner };
		self.write_cluster_header(c, &hdr)?;
		self.write_sb()?;
		trace!("alloc_cluster(owner={owner}) = {c}");
		Ok(c)
	}

	/// Push `c` onto the insertion cache (depleting first if full). If
	/// `clean` the cluster's `stat` is reset to [`NULL_INODE`] immediately;
	/// otherwise it is left dirty-free with its previous owner recorded.
	pub(crate) fn free_cluster(&mut self, c: ClusterNum, clean: bool) -> Result<()> {
		if self.sb.d_zone_insert_idx as usize == DZONE_CACHE_SIZE {
			self.deplete()?;
		}
		if clean {
			let mut hdr = self.read_cluster_header(c)?;
			hdr.stat = NULL_INODE;
			self.write_cluster_header(c, &hdr)?;
		}
		let idx = self.sb.d_zone_insert_idx as usize;
		self.sb.d_zone_insert_cache[idx] = c;
		self.sb.d_zone_insert_idx += 1;
		self.sb.d_zone_free += 1;
		self.write_sb()?;
		trace!("free_cluster({c}, clean={clean})");
		Ok(())
	}
}

#[cfg(test)]
mod t {
	use std::io::Cursor;

	use super::*;
	use crate::fs::format::FormatOptions;

	fn fresh() -> Sofs<Cursor<Vec<u8>>> {
		let dev = Cursor::new(vec![0u8; 1000 * 512]);
		let opts = FormatOptions { name: "t".into(), inode_count: Some(128), zero_mode: false };
		Sofs::format(dev, 1000, &opts).unwrap()
	}

	#[test]
	fn replenish_on_full_cache_is_noop() {
		let mut fs = fresh();
		// The retrieval cache starts empty (idx == DZONE_CACHE_SIZE); force
		// one fill, then call replenish again while it still has entries.
		fs.replenish().unwrap();
		let idx_before = fs.sb.d_zone_retriev_idx;
		// Cache is not empty, so a second call must not be invoked per the
		// precondition; instead verify alloc_cluster doesn't re-replenish
		// needlessly.
		let _ = fs.alloc_cluster(0).unwrap();
		assert!(fs.sb.d_zone_retriev_idx >= idx_before);
	}

	#[test]
	fn deplete_on_empty_insertion_cache_is_noop() {
		let mut fs = fresh();
		let before = fs.sb.clone();
		fs.deplete().unwrap();
		assert_eq!(fs.sb.d_zone_insert_idx, before.d_zone_insert_idx);
		assert_eq!(fs.sb.d_tail, before.d_tail);
	}

	#[test]
	fn alloc_free_round_trip_preserves_free_count() {
		let mut fs = fresh();
		let before = fs.sb.d_zone_free;
		let c = fs.alloc_cluster(0).unwrap();
		assert_eq!(fs.sb.d_zone_free, before - 1);
		fs.free_cluster(c, true).unwrap();
		assert_eq!(fs.sb.d_zone_free, before);
	}
}
