use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use libsquash::{InodeId, SquashError, SquashFs};

/// list a directory inside a squashfs image
#[derive(Parser)]
#[command(author, version, name = "squash-ls", max_term_width = 98)]
struct Args {
    /// Squashfs file
    image: PathBuf,

    /// Directory inside the image
    #[arg(default_value = "/")]
    path: String,
}

fn type_marker(kind: InodeId) -> char {
    match kind {
        InodeId::BasicDirectory | InodeId::ExtendedDirectory => 'd',
        InodeId::BasicFile | InodeId::ExtendedFile => '-',
        InodeId::BasicSymlink | InodeId::ExtendedSymlink => 'l',
        InodeId::BasicBlockDevice | InodeId::ExtendedBlockDevice => 'b',
        InodeId::BasicCharacterDevice | InodeId::ExtendedCharacterDevice => 'c',
        InodeId::BasicFifo | InodeId::ExtendedFifo => 'p',
        InodeId::BasicSocket | InodeId::ExtendedSocket => 's',
    }
}

fn run(args: &Args) -> Result<(), SquashError> {
    let image = SquashFs::open(&args.image)?;

    let inode_ref = image.lookup_path(&args.path)?;
    let inode = image.read_inode(inode_ref)?;
    let dir = image.opendir(&inode)?;
    for entry in &dir {
        println!(
            "{} {:>8} {}",
            type_marker(entry.kind),
            entry.inode_number,
            entry.name()
        );
    }
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("squash-ls: {}: {e}", args.path);
            ExitCode::FAILURE
        }
    }
}
