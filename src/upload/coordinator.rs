//! Multipart upload coordinator

use super::progress::{self, ProgressReporter};
use super::{
    PartError, UploadError, UploadOutcome, UploadSettings, UploadState, MAX_PARTS, MIN_PART_SIZE,
};
use crate::dispatch::PartDispatcher;
use crate::pool::DigestPool;
use crate::s3::{CompletionToken, Destination, MultipartProtocol, PartTransfer};
use crate::split::{FilePartitioner, Part};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

/// Uploads files as multipart uploads
///
/// One coordinator can run several uploads; they share the digest pool.
pub struct UploadCoordinator {
    protocol: Arc<dyn MultipartProtocol>,
    transfer: Arc<dyn PartTransfer>,
    settings: UploadSettings,
    digests: Arc<DigestPool>,
}

impl UploadCoordinator {
    pub fn new(
        protocol: Arc<dyn MultipartProtocol>,
        transfer: Arc<dyn PartTransfer>,
        settings: UploadSettings,
    ) -> Self {
        let digests = Arc::new(DigestPool::new(settings.checksum, settings.pool_capacity));
        Self {
            protocol,
            transfer,
            settings,
            digests,
        }
    }

    pub fn settings(&self) -> &UploadSettings {
        &self.settings
    }

    pub fn digests(&self) -> &DigestPool {
        &self.digests
    }

    /// Upload `path` to `destination`
    ///
    /// Nothing remote is touched when the file cannot be split. Once the
    /// upload is opened, any part or commit failure aborts it and the first
    /// failure is returned.
    #[tracing::instrument(
        name = "upload.file",
        skip(self, path, content_type),
        fields(
            path = %path.display(),
            destination = %destination,
            upload_id = tracing::field::Empty
        ),
        err
    )]
    pub async fn upload_file(
        &self,
        path: &Path,
        destination: &Destination,
        content_type: &str,
    ) -> Result<UploadOutcome, UploadError> {
        let start = Instant::now();

        let policy = self.settings.policy().map_err(UploadError::Configuration)?;
        let partitioner = FilePartitioner::open(path, policy).map_err(UploadError::Configuration)?;

        let total_bytes = partitioner.size();
        let part_count = partitioner.part_count();
        if part_count == 0 {
            return Err(UploadError::EmptySource {
                path: path.to_path_buf(),
            });
        }
        if part_count > MAX_PARTS {
            return Err(UploadError::TooManyParts {
                parts: part_count,
                max: MAX_PARTS,
            });
        }
        if part_count > 1 && policy.part_size() < MIN_PART_SIZE {
            tracing::warn!(
                part_size = policy.part_size(),
                min = MIN_PART_SIZE,
                "Part size below the S3 minimum, the store may reject the commit"
            );
        }

        let upload_id = self
            .protocol
            .open(destination, content_type)
            .await
            .map_err(UploadError::Open)?;
        tracing::Span::current().record("upload_id", upload_id.as_str());

        let mut cleanup = AbortOnDrop::new(self.protocol.clone(), destination, &upload_id);
        let mut state = UploadState::Preparing;
        tracing::info!(
            %upload_id,
            parts = part_count,
            bytes = total_bytes,
            "Multipart upload opened"
        );

        let (reporter, collector) =
            progress::track(part_count, total_bytes, self.settings.progress_interval);
        let session = Arc::new(PartSession {
            protocol: self.protocol.clone(),
            transfer: self.transfer.clone(),
            destination: destination.clone(),
            upload_id: upload_id.clone(),
            digests: self.digests.clone(),
            admission: Semaphore::new(self.settings.max_concurrent_transfers.max(1)),
            presign_validity: self.settings.presign_validity,
            tokens: Mutex::new(Vec::with_capacity(part_count)),
            progress: reporter,
        });

        transition(&mut state, UploadState::InFlight, &upload_id);
        let dispatcher = PartDispatcher::current(self.settings.dispatch_concurrency);
        let callback_session = session.clone();
        let dispatched = dispatcher
            .dispatch(partitioner.parts(), move |part| {
                let session = callback_session.clone();
                async move { session.upload_part(part).await }
            })
            .await;

        // every part task has drained, so this is the last session handle
        let mut tokens = std::mem::take(&mut *session.tokens.lock());
        drop(session);
        let progress = collector.finish().await;

        if let Err(source) = dispatched {
            if let Some(part_number) = source.part_number() {
                tracing::error!(%upload_id, part_number, error = %source, "Part upload failed");
            }
            self.abort(destination, &upload_id, &mut state).await;
            cleanup.disarm();
            return Err(UploadError::Part { upload_id, source });
        }

        tokens.sort_by_key(|token| token.part_number);
        if !is_complete(&tokens, part_count) {
            let actual = tokens.len();
            self.abort(destination, &upload_id, &mut state).await;
            cleanup.disarm();
            return Err(UploadError::IncompleteParts {
                upload_id,
                expected: part_count,
                actual,
            });
        }

        if let Err(source) = self.protocol.complete(destination, &upload_id, &tokens).await {
            self.abort(destination, &upload_id, &mut state).await;
            cleanup.disarm();
            return Err(UploadError::Commit { upload_id, source });
        }

        cleanup.disarm();
        transition(&mut state, UploadState::Completed, &upload_id);
        crate::metrics::record_multipart_upload_success(tokens.len());

        Ok(UploadOutcome {
            upload_id,
            destination: destination.clone(),
            parts: tokens,
            total_bytes,
            elapsed: start.elapsed(),
            progress,
        })
    }

    /// Best-effort abort; a failed abort is logged and otherwise ignored
    async fn abort(&self, destination: &Destination, upload_id: &str, state: &mut UploadState) {
        if let Err(e) = self.protocol.abort(destination, upload_id).await {
            tracing::warn!(upload_id, error = %e, "Failed to abort multipart upload");
            crate::metrics::record_error("abort");
        }
        transition(state, UploadState::Aborted, upload_id);
        crate::metrics::record_multipart_upload_failure();
    }
}

impl std::fmt::Debug for UploadCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadCoordinator")
            .field("settings", &self.settings)
            .field("digests", &self.digests)
            .finish_non_exhaustive()
    }
}

fn transition(state: &mut UploadState, next: UploadState, upload_id: &str) {
    debug_assert!(
        state.can_transition_to(next),
        "invalid upload transition {} -> {}",
        state,
        next
    );
    tracing::debug!(upload_id, from = %state, to = %next, "Upload state changed");
    *state = next;
}

/// Tokens sorted by part number cover exactly `1..=expected`
fn is_complete(tokens: &[CompletionToken], expected: usize) -> bool {
    tokens.len() == expected
        && tokens
            .iter()
            .enumerate()
            .all(|(i, token)| token.part_number as usize == i + 1)
}

/// Closes the admission gate when dropped armed
///
/// Dropped armed on a part error, a panic, or when the part task is
/// cancelled. Dropped before the part's permit, so no waiter is admitted
/// in between.
struct CloseOnFailure<'a> {
    admission: &'a Semaphore,
    armed: bool,
}

impl<'a> CloseOnFailure<'a> {
    fn new(admission: &'a Semaphore) -> Self {
        Self {
            admission,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for CloseOnFailure<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.admission.close();
        }
    }
}

/// Aborts the remote upload if the upload future is dropped mid-flight
struct AbortOnDrop {
    protocol: Arc<dyn MultipartProtocol>,
    destination: Destination,
    upload_id: String,
    armed: bool,
}

impl AbortOnDrop {
    fn new(
        protocol: Arc<dyn MultipartProtocol>,
        destination: &Destination,
        upload_id: &str,
    ) -> Self {
        Self {
            protocol,
            destination: destination.clone(),
            upload_id: upload_id.to_string(),
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(
                upload_id = %self.upload_id,
                "Upload dropped outside a runtime, multipart upload left open"
            );
            return;
        };

        tracing::warn!(upload_id = %self.upload_id, "Upload dropped, aborting multipart upload");
        let protocol = self.protocol.clone();
        let destination = self.destination.clone();
        let upload_id = std::mem::take(&mut self.upload_id);
        handle.spawn(async move {
            if let Err(e) = protocol.abort(&destination, &upload_id).await {
                tracing::warn!(%upload_id, error = %e, "Failed to abort multipart upload");
                crate::metrics::record_error("abort");
            }
            crate::metrics::record_multipart_upload_failure();
        });
    }
}

/// State shared by the part tasks of one upload
struct PartSession {
    protocol: Arc<dyn MultipartProtocol>,
    transfer: Arc<dyn PartTransfer>,
    destination: Destination,
    upload_id: String,
    digests: Arc<DigestPool>,
    admission: Semaphore,
    presign_validity: Duration,
    tokens: Mutex<Vec<CompletionToken>>,
    progress: ProgressReporter,
}

impl PartSession {
    async fn upload_part(&self, part: Part) -> Result<(), PartError> {
        let part_number = part.part_number();
        // closed once any part fails; waiters skip instead of transferring
        let Ok(_permit) = self.admission.acquire().await else {
            tracing::debug!(part_number, "Skipping part, upload is failing");
            return Ok(());
        };
        let mut admission = CloseOnFailure::new(&self.admission);

        let bytes = part.len() as u64;
        let start = Instant::now();
        self.progress.part_started(part_number);

        match self.transfer_part(part).await {
            Ok(token) => {
                admission.disarm();
                self.tokens.lock().push(token);
                self.progress.part_completed(part_number, bytes);
                crate::metrics::record_part_success(bytes, start.elapsed().as_secs_f64());
                tracing::debug!(part_number, bytes, "Part uploaded");
                Ok(())
            }
            Err(e) => {
                crate::metrics::record_part_failure(start.elapsed().as_secs_f64());
                Err(e)
            }
        }
    }

    async fn transfer_part(&self, part: Part) -> Result<CompletionToken, PartError> {
        let part_number = part.part_number();

        let digests = self.digests.clone();
        let view = part.view().clone();
        let checksum = tokio::task::spawn_blocking(move || digests.checksum(&view))
            .await
            .map_err(|e| PartError::Checksum(e.to_string()))?;

        let target = self
            .protocol
            .presign_part_upload(
                &self.destination,
                &self.upload_id,
                part_number,
                &checksum,
                self.presign_validity,
            )
            .await
            .map_err(PartError::Presign)?;

        let etag = self
            .transfer
            .put(&target, &checksum, part.bytes())
            .await
            .map_err(PartError::Transfer)?;

        Ok(CompletionToken {
            part_number,
            etag,
            checksum,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Checksum, ChecksumAlgorithm};

    fn token(part_number: u32) -> CompletionToken {
        CompletionToken {
            part_number,
            etag: format!("\"etag-{}\"", part_number),
            checksum: Checksum::new(ChecksumAlgorithm::Md5, vec![0u8; 16]),
        }
    }

    #[test]
    fn test_is_complete() {
        assert!(is_complete(&[token(1), token(2), token(3)], 3));
        assert!(!is_complete(&[token(1), token(3)], 3));
        assert!(!is_complete(&[token(1), token(3)], 2));
        assert!(!is_complete(&[token(1), token(1)], 2));
        assert!(is_complete(&[], 0));
    }

    #[test]
    fn test_transition_updates_state() {
        let mut state = UploadState::Preparing;
        transition(&mut state, UploadState::InFlight, "upload-1");
        assert_eq!(state, UploadState::InFlight);
    }
}
