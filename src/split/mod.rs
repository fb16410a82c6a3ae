//! File splitting module
//!
//! Splits very large files into numbered, contiguous parts backed by
//! read-only memory maps, ready to be processed (uploaded) independently.
//!
//! # Example
//!
//! ```no_run
//! use multipart_uploadr::split::{FilePartitioner, SIZE_16M};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // parts of ~16MiB, trailing parts up to 1MiB are merged into the last part
//! let partitioner = FilePartitioner::from_file("large.bin", SIZE_16M)?;
//!
//! for part in partitioner.parts() {
//!     let part = part?;
//!     println!("part {} has {} bytes", part.part_number(), part.len());
//! }
//! # Ok(())
//! # }
//! ```

mod partitioner;
mod policy;

pub use partitioner::{FilePartitioner, Part, PartView, Parts, DEFAULT_BLOCK_SIZE};
pub use policy::{
    Boundaries, PartRange, PartitionPolicy, MAX_VIEW_SIZE, ONE_G, ONE_K, ONE_M, SIZE_100M,
    SIZE_16M, SIZE_32M, SIZE_5M, SIZE_64M, SIZE_8M, TWO_G,
};

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// File splitting errors
#[derive(Error, Debug)]
pub enum SplitError {
    #[error("Invalid partition policy: {0}")]
    InvalidPolicy(String),

    #[error("File not readable: {}: {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to map {} at offset {offset}: {source}", .path.display())]
    Map {
        path: PathBuf,
        offset: u64,
        #[source]
        source: io::Error,
    },
}
