//! Compressed record files
//!
//! File layout before compression: a sequence of frames, each a little-endian
//! `u32` length followed by one encoded [`Example`]. The whole file is
//! compressed with one scheme for the entire corpus.

use bytes::Bytes;
use run_core::{DomainPairKey, Error, Result, Split};
use std::sync::Arc;
use storage::StorageBackend;
use tracing::{debug, info, instrument};

use crate::naming::NamingPolicy;
use crate::record::{Example, Tensor};

/// zstd level used for every record file
pub const COMPRESSION_LEVEL: i32 = 3;

/// Outcome of writing one record file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteSummary {
    pub file_name: String,
    pub records: usize,
    pub size_bytes: u64,
}

/// Writes (input, label, domain) sequences into record files
pub struct RecordWriter {
    storage: Arc<dyn StorageBackend>,
    policy: NamingPolicy,
}

impl RecordWriter {
    pub fn new(storage: Arc<dyn StorageBackend>, policy: NamingPolicy) -> Self {
        Self { storage, policy }
    }

    pub fn policy(&self) -> &NamingPolicy {
        &self.policy
    }

    /// Write the split of `dataset_name` prepared for `pair`, named by the policy
    pub async fn write_split(
        &self,
        pair: &DomainPairKey,
        dataset_name: &str,
        split: Split,
        x: &[Tensor],
        y: &[Tensor],
        domain: &[Tensor],
    ) -> Result<WriteSummary> {
        let file_name = self.policy.file_name_for(pair, dataset_name, split)?;
        self.write(&file_name, x, y, domain).await
    }

    /// Write one record per index of the three parallel sequences.
    ///
    /// # Errors
    /// `ShapeMismatch` if the sequences differ in length; nothing is written.
    #[instrument(skip(self, x, y, domain), fields(records = x.len()))]
    pub async fn write(
        &self,
        file_name: &str,
        x: &[Tensor],
        y: &[Tensor],
        domain: &[Tensor],
    ) -> Result<WriteSummary> {
        if x.len() != y.len() || x.len() != domain.len() {
            return Err(Error::ShapeMismatch {
                inputs: x.len(),
                labels: y.len(),
                domains: domain.len(),
            });
        }

        let mut framed = Vec::new();
        for ((xi, yi), di) in x.iter().zip(y).zip(domain) {
            let example = Example::new(xi, yi, di)?.to_bytes()?;
            framed.extend_from_slice(&frame_len(example.len())?.to_le_bytes());
            framed.extend_from_slice(&example);
        }

        let compressed = zstd::encode_all(&framed[..], COMPRESSION_LEVEL)
            .map_err(|e| Error::persistence(format!("Failed to compress {}: {}", file_name, e)))?;
        debug!(
            file_name,
            raw_bytes = framed.len(),
            compressed_bytes = compressed.len(),
            "Encoded record file"
        );

        let size_bytes = self.storage.write(file_name, Bytes::from(compressed)).await?;
        info!(file_name, records = x.len(), size_bytes, "Record file written");

        Ok(WriteSummary {
            file_name: file_name.to_string(),
            records: x.len(),
            size_bytes,
        })
    }
}

/// Length prefix for one framed example
fn frame_len(len: usize) -> Result<u32> {
    u32::try_from(len)
        .map_err(|_| Error::Serialization(format!("record of {} bytes exceeds the frame limit", len)))
}

/// Reads record files written by [`RecordWriter`]
pub struct RecordReader {
    storage: Arc<dyn StorageBackend>,
}

impl RecordReader {
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self { storage }
    }

    /// All examples of a record file, in write order
    pub async fn read(&self, file_name: &str) -> Result<Vec<Example>> {
        let compressed = self.storage.read(file_name).await?;
        let framed = zstd::decode_all(&compressed[..])
            .map_err(|e| Error::Serialization(format!("Failed to decompress {}: {}", file_name, e)))?;

        let mut examples = Vec::new();
        let mut pos = 0;
        while pos < framed.len() {
            let len_end = pos + 4;
            let len_bytes: [u8; 4] = framed
                .get(pos..len_end)
                .and_then(|b| b.try_into().ok())
                .ok_or_else(|| Error::Serialization(format!("Truncated frame in {}", file_name)))?;
            let end = len_end + u32::from_le_bytes(len_bytes) as usize;
            let body = framed
                .get(len_end..end)
                .ok_or_else(|| Error::Serialization(format!("Truncated record in {}", file_name)))?;
            examples.push(Example::from_bytes(body)?);
            pos = end;
        }

        Ok(examples)
    }
}
