//! Part sizing policy

use super::SplitError;

pub const ONE_K: u64 = 1024;
pub const ONE_M: u64 = ONE_K * ONE_K;
pub const ONE_G: u64 = ONE_M * ONE_K;
pub const TWO_G: u64 = 2 * ONE_G;

pub const SIZE_5M: u64 = 5 * ONE_M;
pub const SIZE_8M: u64 = 8 * ONE_M;
pub const SIZE_16M: u64 = 16 * ONE_M;
pub const SIZE_32M: u64 = 32 * ONE_M;
pub const SIZE_64M: u64 = 64 * ONE_M;
pub const SIZE_100M: u64 = 100 * ONE_M;

/// Ceiling for a single contiguous view (part or mapped block)
pub const MAX_VIEW_SIZE: u64 = TWO_G;

/// How a file is cut into parts
///
/// Parts are `part_size` bytes long, except that a trailing remainder of at
/// most `small_tail_threshold` bytes is absorbed by the part before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionPolicy {
    part_size: u64,
    small_tail_threshold: u64,
}

impl PartitionPolicy {
    /// Create a policy; `part_size + small_tail_threshold` must stay below [`MAX_VIEW_SIZE`]
    pub fn new(part_size: u64, small_tail_threshold: u64) -> Result<Self, SplitError> {
        if part_size == 0 {
            return Err(SplitError::InvalidPolicy(
                "part_size must be greater than zero".into(),
            ));
        }

        match part_size.checked_add(small_tail_threshold) {
            Some(max) if max < MAX_VIEW_SIZE => Ok(Self {
                part_size,
                small_tail_threshold,
            }),
            _ => Err(SplitError::InvalidPolicy(format!(
                "part_size + small_tail_threshold must be below {} bytes (got {} + {})",
                MAX_VIEW_SIZE, part_size, small_tail_threshold
            ))),
        }
    }

    /// Policy with the default 1MiB small-tail threshold
    pub fn with_part_size(part_size: u64) -> Result<Self, SplitError> {
        Self::new(part_size, ONE_M)
    }

    pub fn part_size(&self) -> u64 {
        self.part_size
    }

    pub fn small_tail_threshold(&self) -> u64 {
        self.small_tail_threshold
    }

    /// Longest part this policy can produce
    pub fn max_part_len(&self) -> u64 {
        self.part_size + self.small_tail_threshold
    }

    /// Length of the part starting at `offset` in a file of `size` bytes
    pub fn part_len(&self, size: u64, offset: u64) -> u64 {
        let length = self.part_size.min(size - offset);
        let remaining = size - (offset + length);
        // no tiny trailing parts
        if remaining > 0 && remaining <= self.small_tail_threshold {
            length + remaining
        } else {
            length
        }
    }

    /// Part layout of a file of `size` bytes
    pub fn boundaries(&self, size: u64) -> Boundaries {
        Boundaries {
            policy: *self,
            size,
            offset: 0,
            next_part_number: Some(1),
        }
    }

    /// Number of parts for a file of `size` bytes
    ///
    /// Part `k` is the last one once at most `small_tail_threshold` bytes
    /// remain after it, so the count is the smallest `k >= 1` with
    /// `k * part_size >= size - small_tail_threshold`. Saturates at `usize::MAX`.
    pub fn part_count(&self, size: u64) -> usize {
        if size == 0 {
            return 0;
        }
        let count = size
            .saturating_sub(self.small_tail_threshold)
            .div_ceil(self.part_size)
            .max(1);
        usize::try_from(count).unwrap_or(usize::MAX)
    }
}

/// Byte range of one part within the source file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartRange {
    pub part_number: u32,
    pub offset: u64,
    pub len: u64,
}

impl PartRange {
    pub fn end(&self) -> u64 {
        self.offset + self.len
    }
}

/// Iterator over the part ranges of a file, in order
///
/// Ends after part number `u32::MAX` even if bytes remain.
#[derive(Debug, Clone)]
pub struct Boundaries {
    policy: PartitionPolicy,
    size: u64,
    offset: u64,
    next_part_number: Option<u32>,
}

impl Iterator for Boundaries {
    type Item = PartRange;

    fn next(&mut self) -> Option<PartRange> {
        if self.offset >= self.size {
            return None;
        }
        let part_number = self.next_part_number?;

        let len = self.policy.part_len(self.size, self.offset);
        let range = PartRange {
            part_number,
            offset: self.offset,
            len,
        };

        self.offset += len;
        self.next_part_number = part_number.checked_add(1);
        Some(range)
    }
}
