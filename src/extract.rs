//! Extraction to the host filesystem

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{Read, Seek, Write};
use std::path::Path;

use tracing::{debug, instrument};

use crate::dir::DirEntry;
use crate::error::SquashError;
use crate::inode::{Inode, InodeRef};
use crate::path::VisitedInodes;
use crate::squashfs::SquashFs;

fn entry_file_name(entry: &DirEntry) -> OsString {
    #[cfg(unix)]
    {
        use std::os::unix::ffi::OsStrExt;
        std::ffi::OsStr::from_bytes(&entry.name).to_os_string()
    }
    #[cfg(not(unix))]
    {
        OsString::from(entry.name().into_owned())
    }
}

#[cfg(unix)]
fn write_symlink(inode: &Inode, target: &Path) -> Result<(), SquashError> {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let Some(link) = inode.symlink_target() else {
        return Ok(());
    };
    if target.exists() {
        fs::remove_file(target)?;
    }
    std::os::unix::fs::symlink(OsStr::from_bytes(link), target)?;
    Ok(())
}

#[cfg(not(unix))]
fn write_symlink(_inode: &Inode, _target: &Path) -> Result<(), SquashError> {
    Ok(())
}

impl<R: Read + Seek> SquashFs<R> {
    /// Extract the regular file at `path` (raw bytes, '/'-separated) to
    /// `output_path`, creating parent directories as needed.
    #[instrument(skip_all)]
    pub fn extract_file<P: AsRef<Path>>(
        &self,
        path: impl AsRef<[u8]>,
        output_path: P,
    ) -> Result<(), SquashError> {
        let inode_ref = self.lookup_path(path)?;
        let inode = self.read_inode(inode_ref)?;
        self.write_file(&inode, output_path.as_ref())
    }

    fn write_file(&self, inode: &Inode, output_path: &Path) -> Result<(), SquashError> {
        if !inode.is_file() {
            return Err(SquashError::NotAFile);
        }
        let file_size = inode.file_size()?;
        debug!("writing {} bytes to {}", file_size, output_path.display());

        if let Some(parent) = output_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut out = File::create(output_path)?;

        let mut buf = vec![0u8; self.superblock().block_size as usize];
        let mut offset = 0u64;
        while offset < file_size {
            let want = (file_size - offset).min(buf.len() as u64) as usize;
            let n = self.read_file(inode, offset, &mut buf[..want])?;
            if n == 0 {
                return Err(SquashError::CorruptedOrInvalidSquashfs);
            }
            out.write_all(&buf[..n])?;
            offset += n as u64;
        }
        Ok(())
    }

    /// Extract the directory subtree at `path` (raw bytes,
    /// '/'-separated) into `output_dir`.
    ///
    /// Directories and files are recreated; symlinks are recreated on
    /// unix; device, fifo and socket nodes are skipped. An inode already
    /// visited on this walk (a cycle in a malformed image) is skipped
    /// rather than failed, so such images stay extractable.
    #[instrument(skip_all)]
    pub fn extract_directory<P: AsRef<Path>>(
        &self,
        path: impl AsRef<[u8]>,
        output_dir: P,
    ) -> Result<(), SquashError> {
        let inode_ref = self.lookup_path(path)?;
        let mut visited = VisitedInodes::with_capacity(16);
        self.extract_dir_recursive(inode_ref, output_dir.as_ref(), &mut visited)
    }

    fn extract_dir_recursive(
        &self,
        inode_ref: InodeRef,
        output_dir: &Path,
        visited: &mut VisitedInodes,
    ) -> Result<(), SquashError> {
        if visited.contains(inode_ref) {
            debug!("already visited {inode_ref:?}, skipping");
            return Ok(());
        }
        visited.insert(inode_ref);

        let inode = self.read_inode(inode_ref)?;
        if !inode.is_dir() {
            return Err(SquashError::NotADirectory);
        }
        fs::create_dir_all(output_dir)?;

        let dir = self.opendir(&inode)?;
        for entry in &dir {
            let target = output_dir.join(entry_file_name(entry));
            let entry_inode = self.read_inode(entry.inode_ref)?;
            if entry_inode.is_dir() {
                self.extract_dir_recursive(entry.inode_ref, &target, visited)?;
            } else if entry_inode.is_file() {
                self.write_file(&entry_inode, &target)?;
            } else if entry_inode.is_symlink() {
                write_symlink(&entry_inode, &target)?;
            }
        }
        Ok(())
    }
}
