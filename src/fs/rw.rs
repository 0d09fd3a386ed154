//! §4.6 File cluster read/write: zero-fill on read of sparse positions,
//! auto-allocate on write.

use log::trace;

use super::Sofs;
use crate::{
	blockreader::Backend,
	data::{ClusterOp, BSLPC},
	error::err,
	InodeNum, Result,
};

impl<R: Backend> Sofs<R> {
	/// `ReadFileCluster`: `out` must be exactly `BSLPC` bytes.
	pub fn read_file_cluster(&mut self, nr: InodeNum, clust_ind: u32, out: &mut [u8]) -> Result<()> {
		if out.len() != BSLPC as usize {
			return Err(err!(Inval));
		}
		let inode = self.read_inode_checked(nr, true)?;
		if inode.kind().is_none() {
			return Err(err!(IuInInval));
		}

		match self.handle_file_cluster(nr, clust_ind, ClusterOp::Get)? {
			Some(c) => self.read_cluster_payload(c, out)?,
			None => out.fill(0),
		}
		trace!("read_file_cluster({nr}, {clust_ind})");
		Ok(())
	}

	/// `WriteFileCluster`: allocates the position on first write; `buf`
	/// must be exactly `BSLPC` bytes.
	pub fn write_file_cluster(&mut self, nr: InodeNum, clust_ind: u32, buf: &[u8]) -> Result<()> {
		if buf.len() != BSLPC as usize {
			return Err(err!(Inval));
		}
		let inode = self.read_inode_checked(nr, true)?;
		if inode.kind().is_none() {
			return Err(err!(IuInInval));
		}

		let c = match self.handle_file_cluster(nr, clust_ind, ClusterOp::Get)? {
			Some(c) => c,
			None => self.handle_file_cluster(nr, clust_ind, ClusterOp::Alloc)?.expect("ALLOC always yields a cluster"),
		};
		self.write_cluster_payload(c, buf)?;

		let mut inode = self.read_inode(nr)?;
		let end = (clust_ind as u64 + 1) * BSLPC;
		if end > inode.size {
			inode.size = end;
			self.write_inode_checked(nr, inode, true)?;
		}

		trace!("write_file_cluster({nr}, {clust_ind})");
		Ok(())
	}
}
