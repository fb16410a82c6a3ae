//! File Partitioner Integration Tests
//!
//! ## Test Coverage
//!
//! - Documented partition scenarios (tail kept vs tail merged)
//! - Parts cover the file exactly once, numbered from 1
//! - Part layout does not depend on the super-block size
//! - Part views hold the file's bytes

#[cfg(test)]
mod tests {
    use multipart_uploadr::split::{FilePartitioner, PartitionPolicy, SplitError};
    use proptest::prelude::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn patterned(size: usize) -> Vec<u8> {
        (0..size).map(|i| (i % 251) as u8).collect()
    }

    fn temp_file(content: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content).unwrap();
        file.flush().unwrap();
        file
    }

    fn part_lengths(partitioner: &FilePartitioner) -> Vec<usize> {
        partitioner.parts().map(|p| p.unwrap().len()).collect()
    }

    // ========================================================================
    // TEST: Documented scenarios
    // ========================================================================

    #[test]
    fn test_tail_above_threshold_is_its_own_part() {
        let file = temp_file(&patterned(10_000));
        let partitioner =
            FilePartitioner::open(file.path(), PartitionPolicy::new(3000, 500).unwrap()).unwrap();

        assert_eq!(part_lengths(&partitioner), vec![3000, 3000, 3000, 1000]);
        assert_eq!(partitioner.part_count(), 4);
    }

    #[test]
    fn test_tail_within_threshold_is_merged() {
        let file = temp_file(&patterned(10_000));
        let partitioner =
            FilePartitioner::open(file.path(), PartitionPolicy::new(3000, 1500).unwrap()).unwrap();

        assert_eq!(part_lengths(&partitioner), vec![3000, 3000, 4000]);
    }

    #[test]
    fn test_file_smaller_than_part_size_is_one_part() {
        let file = temp_file(&patterned(1234));
        let partitioner =
            FilePartitioner::open(file.path(), PartitionPolicy::new(4096, 0).unwrap()).unwrap();

        let parts: Vec<_> = partitioner.parts().map(|p| p.unwrap()).collect();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].part_number(), 1);
        assert_eq!(parts[0].len(), 1234);
    }

    #[test]
    fn test_empty_file_has_no_parts() {
        let file = temp_file(&[]);
        let partitioner =
            FilePartitioner::open(file.path(), PartitionPolicy::new(4096, 0).unwrap()).unwrap();

        assert_eq!(partitioner.part_count(), 0);
        assert!(partitioner.parts().next().is_none());
    }

    #[test]
    fn test_missing_file_fails_at_construction() {
        let result = FilePartitioner::from_file("/nonexistent/large.bin", 4096);
        assert!(matches!(result, Err(SplitError::Unreadable { .. })));
    }

    // ========================================================================
    // TEST: Views
    // ========================================================================

    #[test]
    fn test_parts_concatenate_to_file() {
        let content = patterned(50_000);
        let file = temp_file(&content);
        let partitioner = FilePartitioner::open(file.path(), PartitionPolicy::new(7000, 900).unwrap())
            .unwrap()
            .with_block_size(16_000)
            .unwrap();

        let mut joined = Vec::with_capacity(content.len());
        for part in partitioner.parts() {
            let part = part.unwrap();
            assert_eq!(part.offset() as usize, joined.len());
            joined.extend_from_slice(part.view().as_slice());
        }

        assert_eq!(joined, content);
    }

    #[test]
    fn test_bytes_match_view() {
        let content = patterned(20_000);
        let file = temp_file(&content);
        let partitioner = FilePartitioner::from_file(file.path(), 6000).unwrap();

        for part in partitioner.parts() {
            let part = part.unwrap();
            let range = part.range();
            assert_eq!(
                &part.bytes()[..],
                &content[range.start as usize..range.end as usize]
            );
        }
    }

    // ========================================================================
    // TEST: Properties
    // ========================================================================

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_parts_cover_file(
            size in 0u64..200_000,
            part_size in 1u64..50_000,
            threshold in 0u64..20_000,
        ) {
            let policy = PartitionPolicy::new(part_size, threshold).unwrap();
            let ranges: Vec<_> = policy.boundaries(size).collect();

            let mut offset = 0;
            for (i, range) in ranges.iter().enumerate() {
                prop_assert_eq!(range.part_number as usize, i + 1);
                prop_assert_eq!(range.offset, offset);
                prop_assert!(range.len > 0);
                prop_assert!(range.len <= part_size + threshold);
                if i + 1 < ranges.len() {
                    prop_assert_eq!(range.len, part_size);
                }
                offset = range.end();
            }
            prop_assert_eq!(offset, size);
            prop_assert_eq!(policy.part_count(size), ranges.len());

            if size > 0 && size <= part_size {
                prop_assert_eq!(ranges.len(), 1);
            }
            if let Some(last) = ranges.last() {
                // a short last part only exists when it is above the threshold
                if ranges.len() > 1 && last.len < part_size {
                    prop_assert!(last.len > threshold);
                }
            }
        }

        #[test]
        fn prop_layout_independent_of_block_size(
            size in 1usize..60_000,
            part_size in 100u64..8_000,
            threshold in 0u64..2_000,
            extra in 0u64..30_000,
        ) {
            let file = temp_file(&patterned(size));
            let policy = PartitionPolicy::new(part_size, threshold).unwrap();

            let default = FilePartitioner::open(file.path(), policy).unwrap();
            let small = FilePartitioner::open(file.path(), policy)
                .unwrap()
                .with_block_size(policy.max_part_len() + extra)
                .unwrap();

            let layout = |p: &FilePartitioner| -> Vec<(u32, u64, usize)> {
                p.parts()
                    .map(|part| {
                        let part = part.unwrap();
                        (part.part_number(), part.offset(), part.len())
                    })
                    .collect()
            };

            prop_assert_eq!(layout(&default), layout(&small));
        }
    }
}
