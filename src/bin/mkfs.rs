use std::{
	fs::OpenOptions,
	io::{Seek, SeekFrom},
	path::PathBuf,
};

use anyhow::{bail, Context, Result};
use clap::Parser;
use clap_verbosity_flag::{Verbosity, WarnLevel};
use sofs::{FormatOptions, Sofs};

/// Format a device as a SOFS volume.
#[derive(Parser)]
#[command(name = "mkfs-sofs", version, about)]
struct Cli {
	/// Volume name
	#[arg(short = 'n', long, default_value = "SOFS14")]
	name: String,

	/// Number of inodes to allocate (default: nTotal/8, rounded up)
	#[arg(short = 'i', long)]
	inodes: Option<u32>,

	/// Zero the payload of every free data cluster
	#[arg(short = 'z', long)]
	zero: bool,

	/// Path to the device to format
	device: PathBuf,

	#[command(flatten)]
	verbose: Verbosity<WarnLevel>,
}

fn main() -> Result<()> {
	let cli = Cli::parse();
	env_logger::builder().filter_level(cli.verbose.log_level_filter()).init();
	// `-q` (or more) drops the verbosity below the WarnLevel default; reuse
	// that instead of a second, clashing `-q` flag.
	let quiet = cli.verbose.log_level_filter() < log::LevelFilter::Warn;

	let mut file = OpenOptions::new()
		.read(true)
		.write(true)
		.open(&cli.device)
		.with_context(|| format!("opening {}", cli.device.display()))?;
	let n_bytes = file.seek(SeekFrom::End(0)).with_context(|| "seeking to end of device")?;
	file.seek(SeekFrom::Start(0))?;

	if n_bytes % sofs::data::BLOCK_SIZE != 0 {
		bail!("device size ({n_bytes} bytes) is not a multiple of the block size ({} bytes)", sofs::data::BLOCK_SIZE);
	}
	let n_total_blocks = (n_bytes / sofs::data::BLOCK_SIZE) as u32;

	let opts = FormatOptions { name: cli.name, inode_count: cli.inodes, zero_mode: cli.zero };
	if !quiet {
		println!("formatting {} ({n_total_blocks} blocks) as {:?}", cli.device.display(), opts.name);
	}

	let sofs = Sofs::format(file, n_total_blocks, &opts).with_context(|| "formatting volume")?;
	if !quiet {
		let sb = sofs.superblock();
		println!(
			"done: iTotal={} iFree={} dZoneTotal={} dZoneFree={}",
			sb.i_total, sb.i_free, sb.d_zone_total, sb.d_zone_free
		);
	}

	Ok(())
}
