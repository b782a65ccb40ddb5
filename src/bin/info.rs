use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use libsquash::{compression_name, SquashFs, NOT_SET};

/// print superblock information of a squashfs image
#[derive(Parser)]
#[command(author, version, name = "squash-info", max_term_width = 98)]
struct Args {
    /// Squashfs file
    image: PathBuf,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let image = match SquashFs::open(&args.image) {
        Ok(image) => image,
        Err(e) => {
            eprintln!("squash-info: {}: {e}", args.image.display());
            return ExitCode::FAILURE;
        }
    };

    let superblock = image.superblock();
    println!("magic:                {:#010x}", superblock.magic);
    println!(
        "version:              {}.{}",
        superblock.version_major, superblock.version_minor
    );
    println!(
        "compression:          {} ({})",
        compression_name(superblock.compression),
        superblock.compression
    );
    println!("inodes:               {}", superblock.inode_count);
    println!("mod time:             {}", superblock.mod_time);
    println!(
        "block size:           {:#x} (log {})",
        superblock.block_size, superblock.block_log
    );
    println!("fragments:            {}", superblock.frag_count);
    println!("ids:                  {}", superblock.id_count);
    println!("bytes used:           {:#x}", superblock.bytes_used);
    println!("root inode:           {:#018x}", superblock.root_inode);
    println!("inode table:          {:#x}", superblock.inode_table);
    println!("directory table:      {:#x}", superblock.dir_table);
    if superblock.frag_table != NOT_SET {
        println!("fragment table:       {:#x}", superblock.frag_table);
    }
    if superblock.export_table != NOT_SET {
        println!("export table:         {:#x}", superblock.export_table);
    }

    // flag lines
    if superblock.inodes_uncompressed() {
        println!("flag: inodes uncompressed");
    }
    if superblock.data_block_stored_uncompressed() {
        println!("flag: data blocks stored uncompressed");
    }
    if superblock.fragments_stored_uncompressed() {
        println!("flag: fragments stored uncompressed");
    }
    if superblock.fragments_are_not_used() {
        println!("flag: fragments are not used");
    }
    if superblock.fragments_are_always_generated() {
        println!("flag: fragments are always generated");
    }
    if superblock.data_has_been_deduplicated() {
        println!("flag: data has been deduplicated");
    }
    if superblock.nfs_export_table_exists() {
        println!("flag: nfs export table exists");
    }
    if superblock.xattrs_are_stored_uncompressed() {
        println!("flag: xattrs are stored uncompressed");
    }
    if superblock.compressor_options_are_present() {
        println!("flag: compressor options are present");
    }

    ExitCode::SUCCESS
}
