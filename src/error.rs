use std::{fmt, io};

/// A single enumerated error type for every operation in the crate.
///
/// POSIX-flavored variants carry the matching `libc` errno so that
/// [`Error::raw_os_error`] and the `From<Error> for io::Error` conversion
/// preserve numeric parity with the C tool this crate's wire format is
/// compatible with. The `*Inval`/`Dc*`/`LibBad` variants are SOFS-specific
/// structural-consistency errors that have no POSIX equivalent; they map to
/// `EIO` once turned into an `io::Error` but keep their precise meaning for
/// callers that match on the enum directly.
#[derive(Debug)]
pub enum Error {
	/// Invalid argument.
	Inval,
	/// Name exceeds `MAX_NAME` or path exceeds `MAX_PATH`.
	NameTooLong,
	/// A relative path was given where an absolute one is required.
	RelPath,
	/// An intermediate path component is not a directory.
	NotDir,
	/// Directory is not empty.
	NotEmpty,
	/// Directory entry already exists.
	Exist,
	/// No such directory entry.
	NoEnt,
	/// Too many symlinks were followed while resolving a path.
	Loop,
	/// Directory's link count would overflow.
	MLink,
	/// Requested cluster index exceeds `MAX_FILE_CLUSTERS`.
	FBig,
	/// Permission denied.
	Access,
	/// Operation not permitted.
	Perm,
	/// No free inodes or no free data clusters.
	NoSpc,

	/// An in-use inode is structurally inconsistent.
	IuInInval,
	/// A free-dirty inode is structurally inconsistent.
	FdInInval,
	/// A free-clean inode is structurally inconsistent.
	FInInval,
	/// An inode's data-cluster list is structurally inconsistent.
	LdcInInval,
	/// A data-cluster header is structurally inconsistent.
	DcInval,
	/// The referenced data cluster is already in the file's cluster list (ALLOC).
	DcArdyIl,
	/// The referenced data cluster is not in the file's cluster list.
	DcNotIl,
	/// The referenced data cluster was never allocated.
	DcNAlInval,
	/// The data cluster's `stat` names a different inode than expected.
	WgInodeNb,
	/// Directory content is structurally inconsistent.
	DirInval,
	/// A directory entry is structurally inconsistent.
	DeInval,
	/// A data-cluster cache (insertion/retrieval) is structurally inconsistent.
	DcMInval,
	/// An internal invariant of the lower storage layer was violated.
	LibBad,

	/// Any other I/O failure from the underlying backend.
	Io(io::Error),
}

impl Error {
	/// The `libc` errno this error corresponds to, if any.
	///
	/// SOFS-specific structural errors have no real errno; they report
	/// `EIO`, matching how the original tool's exit diagnostics treated
	/// "should never happen" consistency failures.
	pub fn raw_os_error(&self) -> i32 {
		match self {
			Self::Inval => libc::EINVAL,
			Self::NameTooLong => libc::ENAMETOOLONG,
			Self::RelPath => libc::EINVAL,
			Self::NotDir => libc::ENOTDIR,
			Self::NotEmpty => libc::ENOTEMPTY,
			Self::Exist => libc::EEXIST,
			Self::NoEnt => libc::ENOENT,
			Self::Loop => libc::ELOOP,
			Self::MLink => libc::EMLINK,
			Self::FBig => libc::EFBIG,
			Self::Access => libc::EACCES,
			Self::Perm => libc::EPERM,
			Self::NoSpc => libc::ENOSPC,
			Self::Io(e) => e.raw_os_error().unwrap_or(libc::EIO),
			_ => libc::EIO,
		}
	}
}

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Inval => write!(f, "invalid argument"),
			Self::NameTooLong => write!(f, "name or path too long"),
			Self::RelPath => write!(f, "relative path where absolute path is required"),
			Self::NotDir => write!(f, "not a directory"),
			Self::NotEmpty => write!(f, "directory not empty"),
			Self::Exist => write!(f, "entry already exists"),
			Self::NoEnt => write!(f, "no such entry"),
			Self::Loop => write!(f, "too many levels of symbolic links"),
			Self::MLink => write!(f, "too many links"),
			Self::FBig => write!(f, "file cluster index out of range"),
			Self::Access => write!(f, "permission denied"),
			Self::Perm => write!(f, "operation not permitted"),
			Self::NoSpc => write!(f, "no space left on device"),
			Self::IuInInval => write!(f, "in-use inode is inconsistent"),
			Self::FdInInval => write!(f, "free-dirty inode is inconsistent"),
			Self::FInInval => write!(f, "free-clean inode is inconsistent"),
			Self::LdcInInval => write!(f, "inode's data cluster list is inconsistent"),
			Self::DcInval => write!(f, "data cluster header is inconsistent"),
			Self::DcArdyIl => write!(f, "data cluster is already in the file's cluster list"),
			Self::DcNotIl => write!(f, "data cluster is not in the file's cluster list"),
			Self::DcNAlInval => write!(f, "data cluster was never allocated"),
			Self::WgInodeNb => write!(f, "data cluster's owner does not match"),
			Self::DirInval => write!(f, "directory content is inconsistent"),
			Self::DeInval => write!(f, "directory entry is inconsistent"),
			Self::DcMInval => write!(f, "data cluster cache is inconsistent"),
			Self::LibBad => write!(f, "internal storage invariant violated"),
			Self::Io(e) => write!(f, "{e}"),
		}
	}
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
	fn from(e: io::Error) -> Self {
		Self::Io(e)
	}
}

impl From<Error> for io::Error {
	fn from(e: Error) -> Self {
		match e {
			Error::Io(e) => e,
			e => io::Error::from_raw_os_error(e.raw_os_error()),
		}
	}
}

/// (INTERNAL) Shorthand for constructing a leaf variant of [`Error`].
macro_rules! err {
	($name:ident) => {
		$crate::error::Error::$name
	};
}

pub(crate) use err;
