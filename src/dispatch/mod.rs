//! Concurrent part dispatch
//!
//! Runs a per-part async callback over every part of a file on a tokio
//! runtime, with at most `max_concurrency` callbacks outstanding.
//!
//! # Failure handling
//!
//! - The first failure (error, panic, or split error) is kept in a [`FailureSlot`]
//! - No new parts are spawned after it, and spawned parts that have not
//!   started skip their callback
//! - Callbacks already running are left to finish; their views stay valid
//! - The failure is returned once every task has drained
//!
//! # Example
//!
//! ```no_run
//! use multipart_uploadr::dispatch::PartDispatcher;
//! use multipart_uploadr::split::{FilePartitioner, SIZE_32M};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let partitioner = FilePartitioner::from_file("large.bin", SIZE_32M)?;
//! let dispatcher = PartDispatcher::current(16);
//!
//! let parts = dispatcher
//!     .dispatch(partitioner.parts(), |part| async move {
//!         println!("processing part {}", part.part_number());
//!         Ok::<_, std::io::Error>(())
//!     })
//!     .await?;
//! println!("{} parts processed", parts);
//! # Ok(())
//! # }
//! ```

mod failure;

pub use failure::FailureSlot;

use crate::split::{Part, SplitError};
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::JoinSet;

/// Dispatch errors
#[derive(Error, Debug)]
pub enum DispatchError<E> {
    #[error("Splitting source failed: {0}")]
    Split(#[from] SplitError),

    #[error("Part {part_number} failed: {source}")]
    Part {
        part_number: u32,
        #[source]
        source: E,
    },

    #[error("Part {part_number} panicked")]
    Panicked { part_number: u32 },

    #[error("Part task failed: {0}")]
    Join(String),
}

impl<E> DispatchError<E> {
    /// Part number of the failing part, when known
    pub fn part_number(&self) -> Option<u32> {
        match self {
            DispatchError::Part { part_number, .. } | DispatchError::Panicked { part_number } => {
                Some(*part_number)
            }
            DispatchError::Split(_) | DispatchError::Join(_) => None,
        }
    }
}

/// Runs part callbacks on a tokio runtime
#[derive(Debug, Clone)]
pub struct PartDispatcher {
    handle: Handle,
    max_concurrency: usize,
}

impl PartDispatcher {
    /// Dispatch onto `handle` with at most `max_concurrency` outstanding callbacks
    pub fn new(handle: Handle, max_concurrency: usize) -> Self {
        Self {
            handle,
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Dispatch onto the current runtime
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn current(max_concurrency: usize) -> Self {
        Self::new(Handle::current(), max_concurrency)
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Invoke `callback` once per part and wait for all of them
    ///
    /// Returns the number of parts dispatched, or the first failure.
    /// Invocation and completion order across parts is unspecified.
    pub async fn dispatch<I, F, Fut, E>(
        &self,
        parts: I,
        callback: F,
    ) -> Result<usize, DispatchError<E>>
    where
        I: IntoIterator<Item = Result<Part, SplitError>>,
        F: Fn(Part) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Send + 'static,
    {
        let callback = Arc::new(callback);
        let slot = Arc::new(FailureSlot::new());
        let mut tasks = JoinSet::new();
        let mut dispatched = 0usize;

        for part in parts {
            let part = match part {
                Ok(part) => part,
                Err(e) => {
                    slot.record(DispatchError::Split(e));
                    break;
                }
            };

            while tasks.len() >= self.max_concurrency {
                Self::reap(&mut tasks, &slot).await;
            }
            if slot.is_failed() {
                break;
            }

            dispatched += 1;
            let part_number = part.part_number();
            let callback = callback.clone();
            let slot = slot.clone();

            tasks.spawn_on(
                async move {
                    if slot.is_failed() {
                        tracing::debug!(part_number, "Skipping part after earlier failure");
                        return;
                    }

                    let outcome = AssertUnwindSafe(async move { callback(part).await })
                        .catch_unwind()
                        .await;

                    let failure = match outcome {
                        Ok(Ok(())) => return,
                        Ok(Err(source)) => DispatchError::Part {
                            part_number,
                            source,
                        },
                        Err(_) => DispatchError::Panicked { part_number },
                    };
                    if slot.record(failure) {
                        tracing::warn!(part_number, "Part failed, no further parts will start");
                    }
                },
                &self.handle,
            );
        }

        while !tasks.is_empty() {
            Self::reap(&mut tasks, &slot).await;
        }

        match slot.take() {
            Some(failure) => Err(failure),
            None => Ok(dispatched),
        }
    }

    async fn reap<E>(tasks: &mut JoinSet<()>, slot: &FailureSlot<DispatchError<E>>) {
        if let Some(Err(e)) = tasks.join_next().await {
            slot.record(DispatchError::Join(e.to_string()));
        }
    }
}
