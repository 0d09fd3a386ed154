use std::io::{BufRead, Error, ErrorKind, Result, Seek, SeekFrom, Write};

use bincode::{
	config::{Configuration, Fixint, LittleEndian, NoLimit},
	Decode, Encode,
};

/// The crate's single wire format: little-endian, fixed-width integers, no
/// length prefixes or varints. There is exactly one on-disk byte order,
/// unlike the teacher's UFS which has to sniff the superblock's magic number
/// to tell big-endian volumes from little-endian ones.
const CONFIG: Configuration<LittleEndian, Fixint, NoLimit> = bincode::config::standard()
	.with_fixed_int_encoding()
	.with_little_endian();

fn decode_err(_: impl std::fmt::Debug) -> Error {
	Error::new(ErrorKind::InvalidData, "failed to decode")
}

fn encode_err(_: impl std::fmt::Debug) -> Error {
	Error::new(ErrorKind::InvalidInput, "failed to encode")
}

/// Thin wrapper pairing a backend with the crate's bincode configuration.
///
/// `Decoder` is generic over any `T` implementing the I/O traits it needs,
/// so the same type serves read-only inspection tools (`BufRead`) and the
/// read-write core (`BufRead + Write + Seek`).
pub struct Decoder<T> {
	inner: T,
}

impl<T: BufRead> Decoder<T> {
	pub fn new(inner: T) -> Self {
		Self { inner }
	}

	pub fn inner(&self) -> &T {
		&self.inner
	}

	pub fn inner_mut(&mut self) -> &mut T {
		&mut self.inner
	}

	pub fn into_inner(self) -> T {
		self.inner
	}

	pub fn decode<X: Decode>(&mut self) -> Result<X> {
		bincode::decode_from_reader(&mut self.inner, CONFIG).map_err(decode_err)
	}

	pub fn read(&mut self, buf: &mut [u8]) -> Result<()> {
		self.inner.read_exact(buf)
	}
}

impl<T: BufRead + Write> Decoder<T> {
	pub fn encode<X: Encode>(&mut self, val: &X) -> Result<()> {
		bincode::encode_into_std_write(val, &mut self.inner, CONFIG)
			.map(|_| ())
			.map_err(encode_err)
	}

	pub fn fill(&mut self, buf: &[u8]) -> Result<()> {
		self.inner.write_all(buf)
	}
}

impl<T: BufRead + Seek> Decoder<T> {
	pub fn read_at(&mut self, pos: u64, buf: &mut [u8]) -> Result<()> {
		self.seek(pos)?;
		self.read(buf)
	}

	pub fn decode_at<X: Decode>(&mut self, pos: u64) -> Result<X> {
		self.seek(pos)?;
		self.decode()
	}

	pub fn seek(&mut self, pos: u64) -> Result<()> {
		self.inner.seek(SeekFrom::Start(pos))?;
		Ok(())
	}

	pub fn seek_relative(&mut self, off: i64) -> Result<()> {
		self.inner.seek_relative(off)
	}

	pub fn align_to(&mut self, align: u64) -> Result<()> {
		assert_eq!(align.count_ones(), 1);
		let pos = self.inner.stream_position()?;
		let new_pos = (pos + align - 1) & !(align - 1);
		self.seek(new_pos)
	}

	pub fn pos(&mut self) -> Result<u64> {
		self.inner.stream_position()
	}
}

impl<T: BufRead + Write + Seek> Decoder<T> {
	pub fn encode_at<X: Encode>(&mut self, pos: u64, val: &X) -> Result<()> {
		self.seek(pos)?;
		self.encode(val)
	}

	pub fn fill_at(&mut self, pos: u64, buf: &[u8]) -> Result<()> {
		self.seek(pos)?;
		self.fill(buf)
	}
}

#[cfg(test)]
mod t {
	use std::io::Cursor;

	use super::*;
	use crate::data::ClusterHeader;

	// `Cursor<Vec<u8>>` implements `BufRead` directly, so it satisfies every
	// bound `Decoder` needs without an extra `BufReader` layer (which only
	// implements `Read`, not `Write`).
	fn harness() -> Decoder<Cursor<Vec<u8>>> {
		Decoder::new(Cursor::new(vec![0u8; 4096]))
	}

	#[test]
	fn encode_decode_roundtrip() {
		let mut d = harness();
		let ch = ClusterHeader {
			prev: 1,
			next: 2,
			stat: 3,
		};
		d.encode_at(128, &ch).unwrap();
		let back: ClusterHeader = d.decode_at(128).unwrap();
		assert_eq!(ch.prev, back.prev);
		assert_eq!(ch.next, back.next);
		assert_eq!(ch.stat, back.stat);
	}

	#[test]
	fn align_to_rounds_up() {
		let mut d = harness();
		d.seek(513).unwrap();
		d.align_to(512).unwrap();
		assert_eq!(d.pos().unwrap(), 1024);
	}
}
