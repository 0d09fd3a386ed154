//! Inode layer: §4.3 AllocInode/FreeInode/CleanInode/AccessGranted, plus the
//! ReadInode/WriteInode liveness-checked accessors (the bulk of those live
//! on [`Sofs`] itself since every other module needs them too).

use log::trace;

use super::{now, Caller, Sofs};
use crate::{
	blockreader::Backend,
	data::{
		ClusterOp, InodeType, NULL_CLUSTER, INODE_EX_GRP, INODE_EX_OTH, INODE_EX_USR, INODE_RD_GRP, INODE_RD_OTH,
		INODE_RD_USR, INODE_WR_GRP, INODE_WR_OTH, INODE_WR_USR, OP_EXEC, OP_READ, OP_WRITE,
	},
	error::err,
	fs::sweep,
	InodeNum, Result,
};

impl<R: Backend> Sofs<R> {
	/// `AllocInode`.
	pub fn alloc_inode(&mut self, kind: InodeType, caller: Caller) -> Result<InodeNum> {
		if self.sb.i_free == 0 {
			return Err(err!(NoSpc));
		}
		let nr = self.sb.i_head;
		let mut inode = self.read_inode(nr)?;
		if !inode.is_free() {
			return Err(err!(FInInval));
		}
		if inode.clu_count != 0 || inode.i1 != NULL_CLUSTER || inode.i2 != NULL_CLUSTER {
			self.clean_inode(nr)?;
			inode = self.read_inode(nr)?;
		}

		let new_head = inode.free_next();

		inode.mode = kind.mode_bits();
		inode.owner = caller.uid;
		inode.group = caller.gid;
		inode.ref_count = 0;
		inode.size = 0;
		inode.clu_count = 0;
		inode.i1 = NULL_CLUSTER;
		inode.i2 = NULL_CLUSTER;
		inode.d = [NULL_CLUSTER; crate::data::N_DIRECT];
		let t = now();
		inode.set_atime(t);
		inode.set_mtime(t);
		self.write_inode(nr, &inode)?;

		if self.sb.i_free == 1 {
			self.sb.i_head = crate::data::NULL_INODE;
			self.sb.i_tail = crate::data::NULL_INODE;
		} else {
			self.sb.i_head = new_head;
			let mut head = self.read_inode(new_head)?;
			head.set_free_prev(crate::data::NULL_INODE);
			self.write_inode(new_head, &head)?;
		}
		self.sb.i_free -= 1;
		self.write_sb()?;

		trace!("alloc_inode(kind={kind}) = {nr}");
		Ok(nr)
	}

	/// `FreeInode`.
	pub fn free_inode(&mut self, nr: InodeNum) -> Result<()> {
		if nr == crate::data::ROOT_INODE {
			return Err(err!(Inval));
		}
		let mut inode = self.read_inode_checked(nr, true)?;
		if inode.ref_count != 0 {
			return Err(err!(IuInInval));
		}

		inode.mode |= crate::data::INODE_FREE;
		if self.sb.i_free == 0 {
			inode.set_free_prev(crate::data::NULL_INODE);
			inode.set_free_next(crate::data::NULL_INODE);
			self.sb.i_head = nr;
			self.sb.i_tail = nr;
		} else {
			let old_tail = self.sb.i_tail;
			inode.set_free_prev(old_tail);
			inode.set_free_next(crate::data::NULL_INODE);
			let mut tail = self.read_inode(old_tail)?;
			tail.set_free_next(nr);
			self.write_inode(old_tail, &tail)?;
			self.sb.i_tail = nr;
		}
		self.write_inode(nr, &inode)?;
		self.sb.i_free += 1;
		self.write_sb()?;

		trace!("free_inode({nr})");
		Ok(())
	}

	/// `CleanInode`: sweeps the file-cluster index back to all-NULL and
	/// zeroes `cluCount`. Idempotent on an already-clean free-dirty inode
	/// (the sweep over an empty index is a no-op).
	pub fn clean_inode(&mut self, nr: InodeNum) -> Result<()> {
		let inode = self.read_inode(nr)?;
		if !inode.is_free() {
			return Err(err!(FdInInval));
		}
		sweep::handle_file_clusters(self, nr, ClusterOp::Clean, 0)?;
		trace!("clean_inode({nr})");
		Ok(())
	}

	/// `AccessGranted`.
	pub fn access_granted(&mut self, nr: InodeNum, op_mask: u8, caller: Caller) -> Result<()> {
		let inode = self.read_inode_checked(nr, true)?;
		if caller.root {
			if op_mask & OP_EXEC != 0 {
				let any_x = inode.mode & (INODE_EX_USR | INODE_EX_GRP | INODE_EX_OTH) != 0;
				if !any_x {
					return Err(err!(Access));
				}
			}
			return Ok(());
		}

		let (r, w, x) = if caller.uid == inode.owner {
			(INODE_RD_USR, INODE_WR_USR, INODE_EX_USR)
		} else if caller.gid == inode.group {
			(INODE_RD_GRP, INODE_WR_GRP, INODE_EX_GRP)
		} else {
			(INODE_RD_OTH, INODE_WR_OTH, INODE_EX_OTH)
		};

		if op_mask & OP_READ != 0 && inode.mode & r == 0 {
			return Err(err!(Access));
		}
		if op_mask & OP_WRITE != 0 && inode.mode & w == 0 {
			return Err(err!(Access));
		}
		if op_mask & OP_EXEC != 0 && inode.mode & x == 0 {
			return Err(err!(Access));
		}
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

	/// The free-inode list's head has NULL_INODE as its prev link and the
	/// tail has NULL_INODE as its next link (Open Question 9a).
	#[test]
	fn free_inode_list_terminates_at_both_ends() {
		let mut fs = fresh();
		let head = fs.sb.i_head;
		let tail = fs.sb.i_tail;
		let head_inode = fs.read_inode(head).unwrap();
		let tail_inode = fs.read_inode(tail).unwrap();
		assert_eq!(head_inode.free_prev(), crate::data::NULL_INODE);
		assert_eq!(tail_inode.free_next(), crate::data::NULL_INODE);
	}

	#[test]
	fn alloc_then_free_recycles() {
		let mut fs = fresh();
		let free_before = fs.sb.i_free;
		let nr = fs.alloc_inode(InodeType::RegularFile, Caller::new(0, 0)).unwrap();
		assert_eq!(fs.sb.i_free, free_before - 1);

		let mut inode = fs.read_inode(nr).unwrap();
		inode.ref_count = 0;
		fs.write_inode(nr, &inode).unwrap();
		fs.free_inode(nr).unwrap();
		assert_eq!(fs.sb.i_free, free_before);
	}
}
