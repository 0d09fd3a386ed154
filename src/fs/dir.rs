//! §4.7 Directory operations: lookup by name and by absolute path, add /
//! attach, remove / detach, rename.

use log::trace;

use super::{Caller, Sofs};
use crate::{
	blockreader::Backend,
	data::{AddOp, ClusterOp, DirEntry, InodeType, RemOp, DIRENTRY_SIZE, DPC, OP_EXEC, OP_WRITE, ROOT_INODE},
	error::err,
	InodeNum, Result,
};

/// Result of scanning a directory's entries for `name`.
enum Lookup {
	Found { n_inode: InodeNum, idx: u32 },
	NotFound { free_idx: u32 },
}

fn validate_name(name: &str) -> Result<()> {
	if name.is_empty() || name.len() > crate::data::MAX_NAME || name.contains('/') {
		return Err(err!(NameTooLong));
	}
	Ok(())
}

impl<R: Backend> Sofs<R> {
	fn dir_entry_offset(&mut self, dir_nr: InodeNum, idx: u32, alloc: bool) -> Result<u64> {
		let cpos = idx / DPC as u32;
		let off_in_cluster = (idx % DPC as u32) as u64 * DIRENTRY_SIZE;
		let op = if alloc { ClusterOp::Alloc } else { ClusterOp::Get };
		let c = self.handle_file_cluster(dir_nr, cpos, op)?.ok_or_else(|| err!(DirInval))?;
		Ok(self.sb.cluster_offset(c) + crate::data::CLUSTER_HEADER_SIZE + off_in_cluster)
	}

	fn read_dir_entry(&mut self, dir_nr: InodeNum, idx: u32) -> Result<DirEntry> {
		let off = self.dir_entry_offset(dir_nr, idx, false)?;
		Ok(self.dec.decode_at(off)?)
	}

	fn write_dir_entry(&mut self, dir_nr: InodeNum, idx: u32, entry: &DirEntry, alloc: bool) -> Result<()> {
		let off = self.dir_entry_offset(dir_nr, idx, alloc)?;
		self.dec.encode_at(off, entry)?;
		Ok(())
	}

	fn find_entry(&mut self, dir_nr: InodeNum, name: &str) -> Result<Lookup> {
		validate_name(name)?;
		let inode = self.read_inode_checked(dir_nr, true)?;
		if inode.kind() != Some(InodeType::Directory) {
			return Err(err!(NotDir));
		}

		let n_slots = inode.clu_count as u32 * DPC as u32;
		let mut free_idx = None;
		for idx in 0..n_slots {
			let entry = self.read_dir_entry(dir_nr, idx)?;
			if entry.is_empty_slot() {
				if free_idx.is_none() {
					free_idx = Some(idx);
				}
				continue;
			}
			if entry.is_removed() {
				continue;
			}
			if entry.name_str() == name {
				return Ok(Lookup::Found { n_inode: entry.n_inode, idx });
			}
		}

		Ok(Lookup::NotFound { free_idx: free_idx.unwrap_or(n_slots) })
	}

	/// `GetDirEntryByName`.
	pub fn get_dir_entry_by_name(&mut self, dir_nr: InodeNum, name: &str, caller: Caller) -> Result<InodeNum> {
		self.access_granted(dir_nr, OP_EXEC, caller)?;
		match self.find_entry(dir_nr, name)? {
			Lookup::Found { n_inode, .. } => Ok(n_inode),
			Lookup::NotFound { .. } => Err(err!(NoEnt)),
		}
	}

	/// `GetDirEntryByPath`: returns `(parent_inode, entry_inode)`. For `"/"`
	/// itself, both are [`ROOT_INODE`].
	pub fn get_dir_entry_by_path(&mut self, path: &str, caller: Caller) -> Result<(InodeNum, InodeNum)> {
		if path.is_empty() {
			return Err(err!(Inval));
		}
		if path.len() > crate::data::MAX_PATH {
			return Err(err!(NameTooLong));
		}
		if !path.starts_with('/') {
			return Err(err!(RelPath));
		}
		if path == "/" {
			return Ok((ROOT_INODE, ROOT_INODE));
		}

		let mut symlinks = 0u32;
		let mut cur = ROOT_INODE;
		let comps = path.trim_start_matches('/').split('/').collect::<Vec<_>>();

		for (i, comp) in comps.iter().enumerate() {
			if comp.is_empty() {
				return Err(err!(Inval));
			}
			let is_last = i + 1 == comps.len();

			let kind = self.read_inode_checked(cur, true)?.kind().ok_or_else(|| err!(IuInInval))?;
			if kind != InodeType::Directory {
				return Err(err!(NotDir));
			}

			let next = self.get_dir_entry_by_name(cur, comp, caller)?;

			if !is_last {
				let next_kind = self.read_inode_checked(next, true)?.kind().ok_or_else(|| err!(IuInInval))?;
				if next_kind == InodeType::Symlink {
					symlinks += 1;
					if symlinks > crate::data::SYMLOOP_MAX {
						return Err(err!(Loop));
					}
				}
				cur = next;
			} else {
				return Ok((cur, next));
			}
		}
		unreachable!("empty component list already rejected as Inval")
	}

	/// `AddAttDirEntry`.
	pub fn add_att_dir_entry(&mut self, dir_nr: InodeNum, name: &str, ent_nr: InodeNum, op: AddOp, caller: Caller) -> Result<()> {
		validate_name(name)?;
		self.access_granted(dir_nr, OP_WRITE | OP_EXEC, caller)?;

		let mut dir = self.read_inode_checked(dir_nr, true)?;
		if dir.kind() != Some(InodeType::Directory) {
			return Err(err!(NotDir));
		}
		if dir.ref_count >= 65534 {
			return Err(err!(MLink));
		}

		let free_idx = match self.find_entry(dir_nr, name)? {
			Lookup::Found { .. } => return Err(err!(Exist)),
			Lookup::NotFound { free_idx } => free_idx,
		};

		let ent_kind = self.read_inode_checked(ent_nr, true)?.kind().ok_or_else(|| err!(IuInInval))?;
		let is_subdir = ent_kind == InodeType::Directory;

		if is_subdir {
			// init_dir_content allocates ent's content cluster via
			// handle_file_cluster, which writes ent's d[]/cluCount back to
			// disk; re-read before layering the refCount/size bump on top,
			// or this write would clobber that allocation.
			self.init_dir_content(ent_nr, dir_nr, matches!(op, AddOp::Add))?;
			let mut ent = self.read_inode_checked(ent_nr, true)?;
			ent.ref_count += 2;
			ent.size = DPC as u64 * DIRENTRY_SIZE;
			self.write_inode_checked(ent_nr, ent, true)?;
		} else {
			let mut ent = self.read_inode_checked(ent_nr, true)?;
			ent.ref_count += 1;
			self.write_inode_checked(ent_nr, ent, true)?;
		}

		let n_slots = dir.clu_count as u32 * DPC as u32;
		let is_new_cluster = free_idx >= n_slots;
		let mut entry = DirEntry::empty();
		entry.set_name(name);
		entry.n_inode = ent_nr;
		self.write_dir_entry(dir_nr, free_idx, &entry, is_new_cluster)?;

		// write_dir_entry(.., is_new_cluster=true) allocates dir's new
		// content cluster via handle_file_cluster, which writes dir's
		// d[]/i1/i2/cluCount back to disk; re-read before stamping the
		// refCount/size deltas, or this write would clobber that allocation.
		if is_new_cluster {
			dir = self.read_inode_checked(dir_nr, true)?;
			let cluster_base = (free_idx / DPC as u32) * DPC as u32;
			for idx in cluster_base..(cluster_base + DPC as u32) {
				if idx == free_idx {
					continue;
				}
				self.write_dir_entry(dir_nr, idx, &DirEntry::empty(), false)?;
			}
			dir.size += DPC as u64 * DIRENTRY_SIZE;
		}
		if is_subdir {
			dir.ref_count += 1;
		}
		self.write_inode_checked(dir_nr, dir, true)?;

		trace!("add_att_dir_entry({dir_nr}, {name:?}, {ent_nr}, {op:?})");
		Ok(())
	}

	/// Initializes (ADD) or rewrites (ATTACH) a directory's `.`/`..` entries.
	fn init_dir_content(&mut self, dir_nr: InodeNum, parent_nr: InodeNum, fresh: bool) -> Result<()> {
		let mut dot = DirEntry::empty();
		dot.set_name(".");
		dot.n_inode = dir_nr;
		let mut dotdot = DirEntry::empty();
		dotdot.set_name("..");
		dotdot.n_inode = parent_nr;

		self.write_dir_entry(dir_nr, 0, &dot, fresh)?;
		self.write_dir_entry(dir_nr, 1, &dotdot, false)?;

		if fresh {
			for idx in 2..DPC as u32 {
				self.write_dir_entry(dir_nr, idx, &DirEntry::empty(), false)?;
			}
		}
		Ok(())
	}

	/// `RemDetachDirEntry`.
	pub fn rem_detach_dir_entry(&mut self, dir_nr: InodeNum, name: &str, op: RemOp, caller: Caller) -> Result<()> {
		validate_name(name)?;
		self.access_granted(dir_nr, OP_WRITE | OP_EXEC, caller)?;

		let mut dir = self.read_inode_checked(dir_nr, true)?;
		if dir.kind() != Some(InodeType::Directory) {
			return Err(err!(NotDir));
		}

		let (ent_nr, idx) = match self.find_entry(dir_nr, name)? {
			Lookup::Found { n_inode, idx } => (n_inode, idx),
			Lookup::NotFound { .. } => return Err(err!(NoEnt)),
		};

		let mut ent = self.read_inode_checked(ent_nr, true)?;
		let ent_kind = ent.kind().ok_or_else(|| err!(IuInInval))?;
		let is_dir = ent_kind == InodeType::Directory;

		if matches!(op, RemOp::Rem) && is_dir && !self.dir_is_empty(ent_nr)? {
			return Err(err!(NotEmpty));
		}

		let mut entry = self.read_dir_entry(dir_nr, idx)?;
		match op {
			RemOp::Rem => entry.soft_remove(),
			RemOp::Detach => entry = DirEntry::empty(),
		}
		self.write_dir_entry(dir_nr, idx, &entry, false)?;

		if is_dir {
			ent.ref_count = ent.ref_count.saturating_sub(2);
			dir.ref_count = dir.ref_count.saturating_sub(1);
		} else {
			ent.ref_count = ent.ref_count.saturating_sub(1);
		}

		let free_entry = matches!(op, RemOp::Rem) && ent.ref_count == 0;
		self.write_inode_checked(ent_nr, ent, true)?;
		self.write_inode_checked(dir_nr, dir, true)?;

		if free_entry {
			super::sweep::handle_file_clusters(self, ent_nr, ClusterOp::Free, 0)?;
			self.free_inode(ent_nr)?;
		}

		trace!("rem_detach_dir_entry({dir_nr}, {name:?}, {op:?})");
		Ok(())
	}

	fn dir_is_empty(&mut self, dir_nr: InodeNum) -> Result<bool> {
		let dir = self.read_inode_checked(dir_nr, true)?;
		let n_slots = dir.clu_count as u32 * DPC as u32;
		for idx in 2..n_slots {
			let entry = self.read_dir_entry(dir_nr, idx)?;
			if !entry.is_empty_slot() && !entry.is_removed() {
				return Ok(false);
			}
		}
		Ok(true)
	}

	/// `RenameDirEntry`.
	pub fn rename_dir_entry(&mut self, dir_nr: InodeNum, old_name: &str, new_name: &str, caller: Caller) -> Result<()> {
		validate_name(old_name)?;
		validate_name(new_name)?;
		self.access_granted(dir_nr, OP_WRITE | OP_EXEC, caller)?;

		let dir = self.read_inode_checked(dir_nr, true)?;
		if dir.kind() != Some(InodeType::Directory) {
			return Err(err!(NotDir));
		}

		let idx = match self.find_entry(dir_nr, old_name)? {
			Lookup::Found { idx, .. } => idx,
			Lookup::NotFound { .. } => return Err(err!(NoEnt)),
		};
		if let Lookup::Found { .. } = self.find_entry(dir_nr, new_name)? {
			return Err(err!(Exist));
		}

		let mut entry = self.read_dir_entry(dir_nr, idx)?;
		entry.name = [0u8; crate::data::MAX_NAME + 1];
		entry.set_name(new_name);
		self.write_dir_entry(dir_nr, idx, &entry, false)?;

		self.write_inode_checked(dir_nr, dir, true)?;
		trace!("rename_dir_entry({dir_nr}, {old_name:?} -> {new_name:?})");
		Ok(())
	}
}
