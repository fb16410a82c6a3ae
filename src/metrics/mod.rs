//! Metrics module
//!
//! Provides Prometheus metrics for part uploads and the digest pool.

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_histogram, register_histogram_vec, Counter,
    CounterVec, Encoder, Histogram, HistogramVec, TextEncoder,
};
use std::path::Path;

lazy_static! {
    // Part metrics
    pub static ref PARTS_TOTAL: CounterVec = register_counter_vec!(
        "mpu_parts_total",
        "Total number of part uploads",
        &["status"]
    ).unwrap();

    pub static ref PART_BYTES_TOTAL: Counter = register_counter!(
        "mpu_part_bytes_total",
        "Total part bytes uploaded"
    ).unwrap();

    pub static ref PART_DURATION: HistogramVec = register_histogram_vec!(
        "mpu_part_duration_seconds",
        "Part upload duration in seconds",
        &["status"],
        vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0]
    ).unwrap();

    // Multipart metrics
    pub static ref MULTIPART_UPLOADS: CounterVec = register_counter_vec!(
        "mpu_multipart_uploads_total",
        "Total multipart uploads",
        &["status"]
    ).unwrap();

    pub static ref MULTIPART_PARTS: Histogram = register_histogram!(
        "mpu_multipart_parts",
        "Number of parts per multipart upload",
        vec![1.0, 5.0, 10.0, 50.0, 100.0, 500.0, 1000.0, 10000.0]
    ).unwrap();

    // Pool metrics
    pub static ref DIGESTS_CREATED: CounterVec = register_counter_vec!(
        "mpu_digests_created_total",
        "Digest instances built because the pool was empty",
        &["algorithm"]
    ).unwrap();

    // Error metrics
    pub static ref ERRORS_TOTAL: CounterVec = register_counter_vec!(
        "mpu_errors_total",
        "Total errors",
        &["type"]
    ).unwrap();
}

/// Record a part uploaded successfully
pub fn record_part_success(bytes: u64, duration_secs: f64) {
    PARTS_TOTAL.with_label_values(&["success"]).inc();
    PART_BYTES_TOTAL.inc_by(bytes as f64);
    PART_DURATION
        .with_label_values(&["success"])
        .observe(duration_secs);
}

/// Record a failed part upload
pub fn record_part_failure(duration_secs: f64) {
    PARTS_TOTAL.with_label_values(&["failure"]).inc();
    PART_DURATION
        .with_label_values(&["failure"])
        .observe(duration_secs);
}

/// Record a successful multipart upload
pub fn record_multipart_upload_success(parts_count: usize) {
    MULTIPART_UPLOADS.with_label_values(&["success"]).inc();
    MULTIPART_PARTS.observe(parts_count as f64);
}

/// Record an aborted multipart upload
pub fn record_multipart_upload_failure() {
    MULTIPART_UPLOADS.with_label_values(&["failure"]).inc();
}

/// Record a digest instance built by the pool factory
pub fn record_digest_created(algorithm: &str) {
    DIGESTS_CREATED.with_label_values(&[algorithm]).inc();
}

/// Record an error
pub fn record_error(error_type: &str) {
    ERRORS_TOTAL.with_label_values(&[error_type]).inc();
}

/// Render all registered metrics in the Prometheus text format
pub fn gather_text() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Write all registered metrics to `path`
///
/// The file is written next to its final name and renamed into place so a
/// collector never reads a partial file.
pub fn write_textfile(path: &Path) -> std::io::Result<()> {
    let tmp = path.with_extension("prom.tmp");
    std::fs::write(&tmp, gather_text())?;
    std::fs::rename(&tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_part_success() {
        record_part_success(1024, 0.5);
        assert!(gather_text().contains("mpu_part_bytes_total"));
    }

    #[test]
    fn test_record_multipart_upload_failure() {
        record_multipart_upload_failure();
        assert!(gather_text().contains("mpu_multipart_uploads_total"));
    }

    #[test]
    fn test_write_textfile() {
        record_error("test");
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("uploadr.prom");

        write_textfile(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("mpu_errors_total"));
    }
}
