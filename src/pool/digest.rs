//! Pooled part checksums
//!
//! Digest accumulators are stateful and not meant to be shared, so each part
//! leases one from a [`DigestPool`], feeds it the part bytes, and hands it
//! back reset.

use super::ResourcePool;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use md5::Md5;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Default number of idle digest instances retained
pub const DEFAULT_POOL_CAPACITY: usize = 256;

/// Checksum algorithm sent along with every part
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgorithm {
    /// `Content-MD5`, understood by every S3-compatible store
    #[default]
    Md5,
    /// `x-amz-checksum-sha256`
    Sha256,
}

impl ChecksumAlgorithm {
    /// HTTP header carrying the checksum on the part upload
    pub fn header_name(&self) -> &'static str {
        match self {
            ChecksumAlgorithm::Md5 => "content-md5",
            ChecksumAlgorithm::Sha256 => "x-amz-checksum-sha256",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChecksumAlgorithm::Md5 => "md5",
            ChecksumAlgorithm::Sha256 => "sha256",
        }
    }
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resettable update-then-finalize digest
pub enum PartDigest {
    Md5(Md5),
    Sha256(Sha256),
}

impl PartDigest {
    pub fn new(algorithm: ChecksumAlgorithm) -> Self {
        match algorithm {
            ChecksumAlgorithm::Md5 => PartDigest::Md5(Md5::new()),
            ChecksumAlgorithm::Sha256 => PartDigest::Sha256(Sha256::new()),
        }
    }

    pub fn algorithm(&self) -> ChecksumAlgorithm {
        match self {
            PartDigest::Md5(_) => ChecksumAlgorithm::Md5,
            PartDigest::Sha256(_) => ChecksumAlgorithm::Sha256,
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        match self {
            PartDigest::Md5(d) => Digest::update(d, data),
            PartDigest::Sha256(d) => Digest::update(d, data),
        }
    }

    /// Produce the digest and leave the accumulator empty
    pub fn finalize_reset(&mut self) -> Vec<u8> {
        match self {
            PartDigest::Md5(d) => d.finalize_reset().to_vec(),
            PartDigest::Sha256(d) => d.finalize_reset().to_vec(),
        }
    }

    pub fn reset(&mut self) {
        match self {
            PartDigest::Md5(d) => Digest::reset(d),
            PartDigest::Sha256(d) => Digest::reset(d),
        }
    }
}

impl fmt::Debug for PartDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PartDigest").field(&self.algorithm()).finish()
    }
}

/// Checksum of one part
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checksum {
    algorithm: ChecksumAlgorithm,
    digest: Vec<u8>,
}

impl Checksum {
    pub fn new(algorithm: ChecksumAlgorithm, digest: Vec<u8>) -> Self {
        Self { algorithm, digest }
    }

    pub fn algorithm(&self) -> ChecksumAlgorithm {
        self.algorithm
    }

    pub fn digest(&self) -> &[u8] {
        &self.digest
    }

    /// Base64 form, as sent in the checksum header
    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.digest)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.digest)
    }

    pub fn header_name(&self) -> &'static str {
        self.algorithm.header_name()
    }
}

/// Pool of digest accumulators for one algorithm
#[derive(Debug)]
pub struct DigestPool {
    algorithm: ChecksumAlgorithm,
    pool: ResourcePool<PartDigest>,
}

impl DigestPool {
    pub fn new(algorithm: ChecksumAlgorithm, capacity: usize) -> Self {
        let pool = ResourcePool::new(capacity, move || {
            crate::metrics::record_digest_created(algorithm.as_str());
            PartDigest::new(algorithm)
        })
        .with_reset(|digest| {
            digest.reset();
            Ok(())
        });

        Self { algorithm, pool }
    }

    pub fn algorithm(&self) -> ChecksumAlgorithm {
        self.algorithm
    }

    /// Checksum `data` with a leased digest
    pub fn checksum(&self, data: &[u8]) -> Checksum {
        self.pool.with_lease(|digest| {
            digest.update(data);
            Checksum::new(self.algorithm, digest.finalize_reset())
        })
    }

    pub fn pool(&self) -> &ResourcePool<PartDigest> {
        &self.pool
    }
}
