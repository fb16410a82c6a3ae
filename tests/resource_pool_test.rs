//! Resource Pool Integration Tests
//!
//! ## Test Coverage
//!
//! - No instance is leased to two holders at once under contention
//! - Instances are reset when a lease ends in an error
//! - Digest pool checksums stay correct when shared between threads

#[cfg(test)]
mod tests {
    use multipart_uploadr::pool::{ChecksumAlgorithm, DigestPool, ResetError, ResourcePool};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Scratch {
        busy: AtomicBool,
        dirty: bool,
    }

    fn scratch_pool(capacity: usize, resets: Arc<AtomicUsize>) -> ResourcePool<Scratch> {
        ResourcePool::new(capacity, || Scratch {
            busy: AtomicBool::new(false),
            dirty: false,
        })
        .with_reset(move |scratch| {
            resets.fetch_add(1, Ordering::SeqCst);
            scratch.dirty = false;
            Ok(())
        })
    }

    // ========================================================================
    // TEST: Exclusivity
    // ========================================================================

    #[test]
    fn test_lease_is_exclusive_under_contention() {
        let pool = scratch_pool(4, Arc::new(AtomicUsize::new(0)));

        std::thread::scope(|s| {
            for _ in 0..16 {
                s.spawn(|| {
                    for _ in 0..500 {
                        let mut scratch = pool.lease();
                        assert!(
                            !scratch.busy.swap(true, Ordering::SeqCst),
                            "instance leased twice"
                        );
                        assert!(!scratch.dirty, "instance not reset");
                        scratch.dirty = true;
                        std::thread::yield_now();
                        scratch.busy.store(false, Ordering::SeqCst);
                    }
                });
            }
        });

        let stats = pool.stats();
        assert_eq!(stats.created + stats.reused, 16 * 500);
        assert!(stats.idle <= 4);
    }

    // ========================================================================
    // TEST: Reset on failure
    // ========================================================================

    #[test]
    fn test_failed_action_still_resets() {
        let resets = Arc::new(AtomicUsize::new(0));
        let pool = scratch_pool(2, resets.clone());

        let result: Result<(), &str> = pool.with_lease(|scratch| {
            scratch.dirty = true;
            Err("upload failed")
        });

        assert!(result.is_err());
        assert_eq!(resets.load(Ordering::SeqCst), 1);
        assert_eq!(pool.idle_count(), 1);
        assert!(!pool.lease().dirty);
    }

    #[test]
    fn test_panicking_action_still_resets() {
        let resets = Arc::new(AtomicUsize::new(0));
        let pool = scratch_pool(2, resets.clone());

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            pool.with_lease(|scratch| {
                scratch.dirty = true;
                panic!("action panicked");
            })
        }));

        assert!(outcome.is_err());
        assert_eq!(resets.load(Ordering::SeqCst), 1);
        assert_eq!(pool.idle_count(), 1);
    }

    #[test]
    fn test_failed_reset_discards_instance() {
        let pool = ResourcePool::new(2, Vec::<u8>::new)
            .with_reset(|_| Err(ResetError::new("cannot reset")));

        pool.with_lease(|buf| buf.push(1));

        assert_eq!(pool.idle_count(), 0);
        assert_eq!(pool.stats().discarded, 1);
        assert!(pool.lease().is_empty());
    }

    // ========================================================================
    // TEST: Digest pool
    // ========================================================================

    #[test]
    fn test_digest_pool_shared_between_threads() {
        let pool = DigestPool::new(ChecksumAlgorithm::Md5, 2);

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..100 {
                        assert_eq!(
                            pool.checksum(b"hello").to_hex(),
                            "5d41402abc4b2a76b9719d911017c592"
                        );
                        assert_eq!(
                            pool.checksum(b"").to_hex(),
                            "d41d8cd98f00b204e9800998ecf8427e"
                        );
                    }
                });
            }
        });

        assert!(pool.pool().idle_count() <= 2);
    }
}
