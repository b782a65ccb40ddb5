use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use libsquash::{SquashError, SquashFs};

/// extract a file or directory tree from a squashfs image
#[derive(Parser)]
#[command(author, version, name = "squash-extract", max_term_width = 98)]
struct Args {
    /// Squashfs file
    image: PathBuf,

    /// File or directory inside the image
    path: String,

    /// Extraction destination
    dest: PathBuf,
}

fn run(args: &Args) -> Result<(), SquashError> {
    let image = SquashFs::open(&args.image)?;

    let inode_ref = image.lookup_path(&args.path)?;
    let inode = image.read_inode(inode_ref)?;
    if inode.is_dir() {
        image.extract_directory(&args.path, &args.dest)
    } else {
        image.extract_file(&args.path, &args.dest)
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("squash-extract: {}: {e}", args.path);
            ExitCode::FAILURE
        }
    }
}
