mod common;

use std::fs;

use common::*;
use test_log::test;

/// Image with `/hello.txt`, `/dir/a.txt` and `/link -> hello.txt`
fn tree_image() -> Vec<u8> {
    let mut builder = ImageBuilder::new();

    let frag_index = builder.add_fragment(b"hello", false);
    let hello = builder.add_inode(&file_inode(2, 0, frag_index, 0, 5, &[]));

    let content = test_bytes(BLOCK_SIZE as usize + 100, 3);
    let (start, size0) = builder.add_block_deflate(&content[..BLOCK_SIZE as usize]);
    let tail_index = builder.add_fragment(&content[BLOCK_SIZE as usize..], false);
    let a = builder.add_inode(&file_inode(
        3,
        start as u32,
        tail_index,
        0,
        content.len() as u32,
        &[size0],
    ));

    let sub_listing = listing(
        3,
        &[Entry {
            inode_ref: a,
            inode_number: 3,
            t: 2,
            name: b"a.txt",
        }],
    );
    let (sub_block, sub_offset) = builder.add_listing(&sub_listing);
    let subdir = builder.add_inode(&dir_inode(4, sub_listing.len() as u32, sub_block, sub_offset, 1));

    let link = builder.add_inode(&symlink_inode(5, b"hello.txt"));

    let root_listing = listing(
        1,
        &[
            Entry {
                inode_ref: subdir,
                inode_number: 4,
                t: 1,
                name: b"dir",
            },
            Entry {
                inode_ref: hello,
                inode_number: 2,
                t: 2,
                name: b"hello.txt",
            },
            Entry {
                inode_ref: link,
                inode_number: 5,
                t: 3,
                name: b"link",
            },
        ],
    );
    let (block_index, block_offset) = builder.add_listing(&root_listing);
    let root = builder.add_inode(&dir_inode(1, root_listing.len() as u32, block_index, block_offset, 1));
    builder.build(root)
}

#[test]
fn test_extract_single_file() {
    let fs_handle = open(tree_image());
    let out = tempfile::tempdir().unwrap();

    // parent directories are created on demand
    let dest = out.path().join("made/up/dirs/hello.txt");
    fs_handle.extract_file("/hello.txt", &dest).unwrap();
    assert_eq!(fs::read(&dest).unwrap(), b"hello");
}

#[test]
fn test_extract_file_errors() {
    let fs_handle = open(tree_image());
    let out = tempfile::tempdir().unwrap();

    let err = fs_handle.extract_file("/missing", out.path().join("x"));
    assert!(matches!(err, Err(libsquash::SquashError::NotFound)));

    // a directory is not a file
    let err = fs_handle.extract_file("/dir", out.path().join("y"));
    assert!(matches!(err, Err(libsquash::SquashError::NotAFile)));

    // and a file is not a directory
    let err = fs_handle.extract_directory("/hello.txt", out.path().join("z"));
    assert!(matches!(err, Err(libsquash::SquashError::NotADirectory)));
}

#[test]
fn test_extract_tree() {
    let fs_handle = open(tree_image());
    let out = tempfile::tempdir().unwrap();
    let dest = out.path().join("root");

    fs_handle.extract_directory("/", &dest).unwrap();

    assert_eq!(fs::read(dest.join("hello.txt")).unwrap(), b"hello");
    let expected = test_bytes(BLOCK_SIZE as usize + 100, 3);
    assert_eq!(fs::read(dest.join("dir/a.txt")).unwrap(), expected);

    #[cfg(unix)]
    {
        let link = dest.join("link");
        assert!(link.symlink_metadata().unwrap().is_symlink());
        assert_eq!(
            fs::read_link(&link).unwrap().as_os_str(),
            std::ffi::OsStr::new("hello.txt")
        );
        // the link resolves inside the extracted tree
        assert_eq!(fs::read(&link).unwrap(), b"hello");
    }
}

#[test]
fn test_extract_subtree() {
    let fs_handle = open(tree_image());
    let out = tempfile::tempdir().unwrap();
    let dest = out.path().join("sub");

    fs_handle.extract_directory("/dir", &dest).unwrap();
    let expected = test_bytes(BLOCK_SIZE as usize + 100, 3);
    assert_eq!(fs::read(dest.join("a.txt")).unwrap(), expected);
    assert!(!dest.join("hello.txt").exists());
}
