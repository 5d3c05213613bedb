//! Incremental content hashing for file streams.
//!
//! A [`DigestPipeline`] fans one byte sequence out to any number of
//! independent hash computations. Decoders feed it chunk by chunk as bytes
//! pass through; the finalized hex digests are attached to the file's
//! metadata only when its stream ends, never partially.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use digest::DynDigest;
use md5::Md5;
use sha1::Sha1;
use sha2::Sha256;
use thiserror::Error;

/// A hash algorithm the engine can compute incrementally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Md5,
    Sha1,
    Sha256,
}

impl HashAlgorithm {
    /// The algorithm's name as used for digest map keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            HashAlgorithm::Md5 => "md5",
            HashAlgorithm::Sha1 => "sha1",
            HashAlgorithm::Sha256 => "sha256",
        }
    }

    fn hasher(&self) -> Box<dyn DynDigest + Send> {
        match self {
            HashAlgorithm::Md5 => Box::new(Md5::default()),
            HashAlgorithm::Sha1 => Box::new(Sha1::default()),
            HashAlgorithm::Sha256 => Box::new(Sha256::default()),
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A hash algorithm name the engine does not support.
#[derive(Debug, Error)]
#[error("unknown hash algorithm: {0}")]
pub struct UnknownAlgorithm(String);

impl FromStr for HashAlgorithm {
    type Err = UnknownAlgorithm;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "md5" => Ok(HashAlgorithm::Md5),
            "sha1" => Ok(HashAlgorithm::Sha1),
            "sha256" => Ok(HashAlgorithm::Sha256),
            _ => Err(UnknownAlgorithm(s.to_string())),
        }
    }
}

/// Independent incremental digests over one byte sequence.
pub struct DigestPipeline {
    entries: Vec<(HashAlgorithm, Box<dyn DynDigest + Send>)>,
}

impl DigestPipeline {
    /// Creates one hasher per requested algorithm. Duplicates collapse into
    /// a single computation.
    pub fn new(algorithms: &[HashAlgorithm]) -> Self {
        let mut entries: Vec<(HashAlgorithm, Box<dyn DynDigest + Send>)> = Vec::with_capacity(algorithms.len());
        for algorithm in algorithms {
            if entries.iter().any(|(existing, _)| existing == algorithm) {
                continue;
            }
            entries.push((*algorithm, algorithm.hasher()));
        }
        Self { entries }
    }

    /// Feeds one chunk to every hasher.
    pub fn update(&mut self, bytes: &[u8]) {
        for (_, hasher) in &mut self.entries {
            hasher.update(bytes);
        }
    }

    /// Finalizes all digests into an algorithm-name → hex map.
    pub fn finalize(self) -> HashMap<String, String> {
        self.entries
            .into_iter()
            .map(|(algorithm, hasher)| (algorithm.as_str().to_string(), hex::encode(hasher.finalize())))
            .collect()
    }
}

impl fmt::Debug for DigestPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let algorithms: Vec<_> = self.entries.iter().map(|(algorithm, _)| algorithm).collect();
        f.debug_struct("DigestPipeline").field("algorithms", &algorithms).finish()
    }
}
