//! SOFS: a small UNIX-style file system over a fixed-size block device.
//!
//! The core of this crate is [`Sofs`], a handle over an open block device
//! (any `Read + Write + Seek` backend) that exposes the on-disk metadata
//! engine described by the on-disk layout in [`data`]: the superblock and
//! its free-cluster caches, inode allocation, the three-level file-cluster
//! index, and directory operations.

mod blockreader;
pub mod data;
mod decoder;
mod error;
mod fs;

pub use crate::{
	blockreader::Backend,
	data::{AddOp, ClusterNum, ClusterOp, InodeNum, InodeType, RemOp, MAX_NAME, MAX_PATH, NULL_CLUSTER, NULL_INODE},
	error::Error,
	fs::{format::FormatOptions, Caller, Sofs},
};

/// Convenience alias used throughout the crate's public API.
pub type Result<T> = std::result::Result<T, Error>;
