use std::io::{self, BufRead, Read, Result as IoResult, Seek, SeekFrom, Write};

use crate::data::BLOCK_SIZE;

/// Any backend a [`BlockReader`] can sit on top of: a real device file, or
/// an in-memory `Cursor<Vec<u8>>` for tests.
pub trait Backend: Read + Write + Seek {}

impl<T: Read + Write + Seek> Backend for T {}

/// Block-level abstraction layer.
///
/// `BlockReader` maps random-access reads and writes onto whole-block
/// operations on the backend, keeping exactly one block buffered at a
/// time -- the single cached block that stands in for the superblock, the
/// currently touched inode block, or the currently touched data cluster
/// block, whichever the core last addressed (§5).
pub struct BlockReader<T: Backend> {
	inner: T,
	block: Vec<u8>,
	idx: usize,
	dirty: bool,
	rw: bool,
}

impl<T: Backend> BlockReader<T> {
	pub fn new(inner: T, rw: bool) -> Self {
		let bs = BLOCK_SIZE as usize;
		Self {
			inner,
			block: vec![0u8; bs],
			idx: bs,
			dirty: false,
			rw,
		}
	}

	pub fn write_enabled(&self) -> bool {
		self.rw
	}

	pub fn into_inner(mut self) -> IoResult<T> {
		self.flush()?;
		Ok(self.inner)
	}

	fn refill(&mut self) -> IoResult<()> {
		if self.dirty {
			panic!("BUG: cannot refill a dirty BlockReader");
		}

		self.block.fill(0u8);
		let mut num = 0;
		while num < self.block.len() {
			match self.inner.read(&mut self.block[num..])? {
				0 => break,
				n => num += n,
			}
		}
		self.idx = 0;
		Ok(())
	}

	fn buffered(&self) -> usize {
		self.block.len() - self.idx
	}

	fn refill_if_empty(&mut self) -> IoResult<()> {
		if self.buffered() == 0 {
			self.refill()?;
		}
		Ok(())
	}

	pub fn blksize(&self) -> usize {
		self.block.len()
	}
}

impl<T: Backend> Read for BlockReader<T> {
	fn read(&mut self, buf: &mut [u8]) -> IoResult<usize> {
		self.refill_if_empty()?;
		let num = buf.len().min(self.buffered());
		buf[0..num].copy_from_slice(&self.block[self.idx..(self.idx + num)]);
		self.idx += num;
		Ok(num)
	}
}

impl<T: Backend> Write for BlockReader<T> {
	fn write(&mut self, buf: &[u8]) -> IoResult<usize> {
		if !self.rw {
			panic!("BUG: BlockReader::write() called on a read-only medium");
		}
		self.refill_if_empty()?;
		let num = buf.len().min(self.buffered());
		self.block[self.idx..(self.idx + num)].copy_from_slice(&buf[0..num]);
		self.idx += num;
		self.dirty = true;
		self.flush()?;
		Ok(num)
	}

	fn flush(&mut self) -> IoResult<()> {
		if !self.dirty {
			return Ok(());
		}

		self.inner.seek(SeekFrom::Current(-(self.block.len() as i64)))?;

		let mut num = 0;
		while num < self.block.len() {
			match self.inner.write(&self.block[num..])? {
				0 => break,
				n => num += n,
			}
		}
		if num < self.block.len() {
			return Err(io::Error::new(io::ErrorKind::WriteZero, "short write"));
		}
		self.dirty = false;
		Ok(())
	}
}

impl<T: Backend> BufRead for BlockReader<T> {
	fn fill_buf(&mut self) -> IoResult<&[u8]> {
		self.refill_if_empty()?;
		Ok(&self.block[self.idx..])
	}

	fn consume(&mut self, amt: usize) {
		self.idx += amt;
	}
}

impl<T: Backend> Seek for BlockReader<T> {
	fn seek(&mut self, pos: SeekFrom) -> IoResult<u64> {
		let bs = self.blksize() as u64;
		match pos {
			SeekFrom::Start(pos) => {
				self.flush()?;
				let real = self.inner.seek(SeekFrom::Start(pos / bs * bs))?;
				let rem = pos - real;
				assert!(rem < bs);

				self.refill()?;
				self.idx = rem as usize;

				Ok(real + rem)
			}
			SeekFrom::Current(offset) => {
				let cur = self.stream_position()?;
				let newidx = offset + self.idx as i64;
				if newidx >= 0 && newidx < self.blksize() as i64 {
					self.idx = newidx as usize;
					Ok(cur.wrapping_add(offset as u64))
				} else if (cur as i64) + offset < 0 {
					Err(io::Error::from_raw_os_error(libc::EINVAL))
				} else {
					self.seek(SeekFrom::Start((cur as i64 + offset) as u64))
				}
			}
			SeekFrom::End(_) => unimplemented!("SeekFrom::End on a fixed-size device is not needed"),
		}
	}
}

#[cfg(test)]
mod t {
	use std::io::Cursor;

	use super::*;

	fn harness(rw: bool) -> BlockReader<Cursor<Vec<u8>>> {
		let buf = vec![0u8; (BLOCK_SIZE as usize) * 16];
		BlockReader::new(Cursor::new(buf), rw)
	}

	#[test]
	fn simple_write_read() {
		let mut br = harness(true);
		let bs = br.blksize();
		let pos = bs + (bs >> 2);
		let buf = vec![0x55u8; bs];
		br.seek(SeekFrom::Start(pos as u64)).unwrap();
		br.write_all(&buf).unwrap();

		let mut out = vec![0u8; bs];
		br.seek(SeekFrom::Start(pos as u64)).unwrap();
		br.read_exact(&mut out).unwrap();
		assert_eq!(out, buf);
	}

	#[test]
	fn seek_current_roundtrips() {
		let mut br = harness(false);
		let bs = br.blksize();
		let pos = bs + (bs >> 2);
		br.seek(SeekFrom::Start(pos as u64)).unwrap();
		let after = br.seek(SeekFrom::Current(0)).unwrap();
		assert_eq!(pos as u64, after);
	}
}
