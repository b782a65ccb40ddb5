//! Path resolution

use std::io::{Read, Seek};

use tracing::{instrument, trace};

use crate::error::SquashError;
use crate::inode::InodeRef;
use crate::squashfs::SquashFs;

/// Longest accepted path component, in bytes
const MAX_COMPONENT_LEN: usize = 1023;

/// Inode references seen along a traversal, used to detect cycles in
/// malformed images. Append-only; membership is a linear scan, which is
/// fine at directory-tree depths.
#[derive(Debug, Default)]
pub(crate) struct VisitedInodes {
    refs: Vec<InodeRef>,
}

impl VisitedInodes {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            refs: Vec::with_capacity(capacity),
        }
    }

    pub fn contains(&self, inode_ref: InodeRef) -> bool {
        self.refs.contains(&inode_ref)
    }

    pub fn insert(&mut self, inode_ref: InodeRef) {
        self.refs.push(inode_ref);
    }
}

impl<R: Read + Seek> SquashFs<R> {
    /// Resolve a '/'-separated path to an inode reference.
    ///
    /// Paths are raw bytes, so entry names that are not valid UTF-8
    /// still resolve. The empty path and "/" resolve to the root
    /// directory. Repeated separators are collapsed. Components are
    /// matched byte-for-byte against entry names; symlinks are not
    /// followed. A component whose target was already seen on this walk
    /// fails with [`SquashError::CycleDetected`].
    #[instrument(skip_all)]
    pub fn lookup_path(&self, path: impl AsRef<[u8]>) -> Result<InodeRef, SquashError> {
        let mut current = self.root_inode_ref();
        let mut visited = VisitedInodes::with_capacity(16);
        visited.insert(current);

        let components = path.as_ref().split(|&b| b == b'/').filter(|c| !c.is_empty());
        for component in components {
            if component.len() > MAX_COMPONENT_LEN {
                return Err(SquashError::NameTooLong);
            }

            let inode = self.read_inode(current)?;
            if !inode.is_dir() {
                return Err(SquashError::NotADirectory);
            }

            let dir = self.opendir(&inode)?;
            let entry = dir
                .iter()
                .find(|entry| entry.name == component)
                .ok_or(SquashError::NotFound)?;

            if visited.contains(entry.inode_ref) {
                return Err(SquashError::CycleDetected);
            }
            visited.insert(entry.inode_ref);
            trace!(
                "{} -> {:?}",
                String::from_utf8_lossy(component),
                entry.inode_ref
            );
            current = entry.inode_ref;
        }

        Ok(current)
    }
}
