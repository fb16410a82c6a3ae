//! Memory-mapped file partitioner
//!
//! A single contiguous view is capped at [`MAX_VIEW_SIZE`], so the file is
//! mapped in super-blocks. Blocks are built from whole parts of the
//! file-wide layout: a block boundary is always a part boundary, and the
//! emitted parts do not depend on the block size.

use super::policy::{Boundaries, PartRange, PartitionPolicy, MAX_VIEW_SIZE, ONE_G, ONE_M};
use super::SplitError;
use bytes::Bytes;
use memmap2::{Mmap, MmapOptions};
use std::fmt;
use std::fs::File;
use std::io;
use std::ops::{Deref, Range};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Default super-block size
pub const DEFAULT_BLOCK_SIZE: u64 = ONE_G;

/// Splits one file into [`Part`]s
#[derive(Debug)]
pub struct FilePartitioner {
    path: Arc<PathBuf>,
    file: Arc<File>,
    size: u64,
    policy: PartitionPolicy,
    block_size: u64,
}

impl FilePartitioner {
    /// Open `path` for splitting
    ///
    /// The file is opened and sized here, so an unreadable source is
    /// reported before any part is produced.
    pub fn open<P: AsRef<Path>>(path: P, policy: PartitionPolicy) -> Result<Self, SplitError> {
        let path = path.as_ref().to_path_buf();
        let unreadable = |source: io::Error| SplitError::Unreadable {
            path: path.clone(),
            source,
        };

        let file = File::open(&path).map_err(unreadable)?;
        let metadata = file.metadata().map_err(unreadable)?;
        if !metadata.is_file() {
            return Err(unreadable(io::Error::new(
                io::ErrorKind::InvalidInput,
                "not a regular file",
            )));
        }

        Ok(Self {
            path: Arc::new(path),
            file: Arc::new(file),
            size: metadata.len(),
            policy,
            block_size: DEFAULT_BLOCK_SIZE.max(policy.max_part_len()),
        })
    }

    /// Open with a 1MiB small-tail threshold
    pub fn from_file<P: AsRef<Path>>(path: P, part_size: u64) -> Result<Self, SplitError> {
        Self::open(path, PartitionPolicy::new(part_size, ONE_M)?)
    }

    /// Override the super-block size
    ///
    /// Must fit the longest possible part and stay below [`MAX_VIEW_SIZE`].
    pub fn with_block_size(mut self, block_size: u64) -> Result<Self, SplitError> {
        if block_size < self.policy.max_part_len() || block_size >= MAX_VIEW_SIZE {
            return Err(SplitError::InvalidPolicy(format!(
                "block size {} must be in [{}, {})",
                block_size,
                self.policy.max_part_len(),
                MAX_VIEW_SIZE
            )));
        }
        self.block_size = block_size;
        Ok(self)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Source file size in bytes
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn policy(&self) -> PartitionPolicy {
        self.policy
    }

    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    pub fn part_count(&self) -> usize {
        self.policy.part_count(self.size)
    }

    /// Part layout without mapping anything
    pub fn boundaries(&self) -> Boundaries {
        self.policy.boundaries(self.size)
    }

    /// Iterate over the parts, starting from part 1 on every call
    pub fn parts(&self) -> Parts {
        Parts {
            path: self.path.clone(),
            file: self.file.clone(),
            boundaries: self.boundaries(),
            block_size: self.block_size,
            block: None,
            failed: false,
        }
    }
}

struct Block {
    map: Arc<Mmap>,
    start: u64,
    end: u64,
}

/// Iterator over the parts of a file
///
/// Blocks are mapped lazily as the iterator reaches them. After a mapping
/// error the iterator is exhausted.
pub struct Parts {
    path: Arc<PathBuf>,
    file: Arc<File>,
    boundaries: Boundaries,
    block_size: u64,
    block: Option<Block>,
    failed: bool,
}

impl Parts {
    fn map_block(&self, first: PartRange) -> Result<Block, SplitError> {
        let start = first.offset;
        let mut end = first.end();
        for range in self.boundaries.clone() {
            if range.end() - start > self.block_size {
                break;
            }
            end = range.end();
        }

        // SAFETY: the map is read-only and the source is not modified by this
        // process while parts are alive.
        let map = unsafe {
            MmapOptions::new()
                .offset(start)
                .len((end - start) as usize)
                .map(&*self.file)
        }
        .map_err(|source| SplitError::Map {
            path: self.path.to_path_buf(),
            offset: start,
            source,
        })?;

        tracing::debug!(
            path = %self.path.display(),
            offset = start,
            len = end - start,
            "Mapped block"
        );

        Ok(Block {
            map: Arc::new(map),
            start,
            end,
        })
    }
}

impl Iterator for Parts {
    type Item = Result<Part, SplitError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        let range = self.boundaries.next()?;

        let needs_block = match &self.block {
            Some(block) => range.offset >= block.end,
            None => true,
        };
        if needs_block {
            // drop our handle first; parts still in flight keep the old block alive
            self.block = None;
            match self.map_block(range) {
                Ok(block) => self.block = Some(block),
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }

        let block = self.block.as_ref()?;
        Some(Ok(Part {
            part_number: range.part_number,
            offset: range.offset,
            view: PartView {
                map: block.map.clone(),
                offset: (range.offset - block.start) as usize,
                len: range.len as usize,
            },
        }))
    }
}

/// Read-only view of a byte range inside a shared mapping
///
/// The mapping is released when the last view over it is dropped.
#[derive(Clone)]
pub struct PartView {
    map: Arc<Mmap>,
    offset: usize,
    len: usize,
}

impl PartView {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.map[self.offset..self.offset + self.len]
    }

    /// Zero-copy `Bytes` over the view, keeping the mapping alive
    pub fn to_bytes(&self) -> Bytes {
        Bytes::from_owner(self.clone())
    }
}

impl Deref for PartView {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl AsRef<[u8]> for PartView {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl fmt::Debug for PartView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartView")
            .field("offset", &self.offset)
            .field("len", &self.len)
            .finish()
    }
}

/// One numbered part of the source file
#[derive(Debug, Clone)]
pub struct Part {
    part_number: u32,
    offset: u64,
    view: PartView,
}

impl Part {
    /// 1-based part number
    pub fn part_number(&self) -> u32 {
        self.part_number
    }

    /// Offset of the part within the source file
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn len(&self) -> usize {
        self.view.len()
    }

    pub fn is_empty(&self) -> bool {
        self.view.is_empty()
    }

    /// Byte range covered in the source file
    pub fn range(&self) -> Range<u64> {
        self.offset..self.offset + self.view.len() as u64
    }

    pub fn view(&self) -> &PartView {
        &self.view
    }

    pub fn bytes(&self) -> Bytes {
        self.view.to_bytes()
    }
}
