//! Checkpoint file format and staged writer

use bytes::Bytes;
use chrono::{DateTime, SubsecRound, Utc};
use run_core::{CheckpointRecord, CheckpointSlot, Error, Result, SeqNo, Step};
use std::collections::HashMap;
use std::sync::Arc;
use storage::StorageBackend;
use tracing::{debug, error, info, instrument, warn};

/// Request to write a checkpoint
#[derive(Debug, Clone)]
pub struct WriteRequest {
    /// Append-order ordinal
    pub seq: SeqNo,

    /// Completed training steps
    pub step: Step,

    /// Validation score, if any
    pub validation_score: Option<f64>,

    /// Opaque trainable state
    pub data: Bytes,

    /// Additional metadata
    pub metadata: HashMap<String, String>,
}

/// Checkpoint file header
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointHeader {
    pub magic: [u8; 4],
    pub version: u32,
    pub seq: SeqNo,
    pub step: Step,
    pub validation_score: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub compressed: bool,
    pub data_size: u64,
    pub metadata_json: String,
}

/// Magic bytes for checkpoint files
pub const CHECKPOINT_MAGIC: [u8; 4] = *b"CKPT";

/// Checkpoint format version
pub const CHECKPOINT_VERSION: u32 = 2;

/// File name prefix shared by both slots
const FILE_PREFIX: &str = "ckpt-";

/// Encodes checkpoints and publishes them through a storage backend
pub struct CheckpointWriter {
    storage: Arc<dyn StorageBackend>,
    compression: bool,
    compression_level: i32,
}

impl CheckpointWriter {
    /// Create a new writer
    pub fn new(storage: Arc<dyn StorageBackend>, compression: bool, compression_level: i32) -> Self {
        Self {
            storage,
            compression,
            compression_level,
        }
    }

    /// Path of checkpoint `seq` in `slot`. Zero padding keeps lexical order equal
    /// to append order.
    pub fn path_for(slot: CheckpointSlot, seq: SeqNo) -> String {
        format!("{}{}{:010}.ckpt", slot.prefix(), FILE_PREFIX, seq)
    }

    /// Listing prefix for a slot
    pub fn slot_prefix(slot: CheckpointSlot) -> String {
        format!("{}{}", slot.prefix(), FILE_PREFIX)
    }

    /// Recover the sequence number from a checkpoint path
    pub fn parse_seq(path: &str) -> Option<SeqNo> {
        let name = path.rsplit('/').next()?;
        name.strip_prefix(FILE_PREFIX)?
            .strip_suffix(".ckpt")?
            .parse()
            .ok()
    }

    /// Write one checkpoint into each of `slots`, in order.
    ///
    /// The payload is encoded once. Each slot gets its own staged file that is
    /// promoted before the next slot is touched.
    #[instrument(skip(self, request), fields(seq = request.seq, step = request.step))]
    pub async fn write(
        &self,
        request: &WriteRequest,
        slots: &[CheckpointSlot],
    ) -> Result<Vec<CheckpointRecord>> {
        let start = std::time::Instant::now();
        // Millisecond precision, as stored in the header
        let created_at = Utc::now().trunc_subsecs(3);
        let encoded = self.encode(request, created_at)?;
        let size = encoded.len() as u64;

        let mut records = Vec::with_capacity(slots.len());
        for &slot in slots {
            let path = Self::path_for(slot, request.seq);
            let staged = self.storage.write_staged(&path, encoded.clone()).await?;
            self.storage.promote(staged).await.map_err(|e| {
                error!(path = %path, error = %e, "Failed to promote checkpoint");
                e
            })?;

            debug!(path = %path, slot = %slot, "Checkpoint promoted");
            records.push(CheckpointRecord {
                seq: request.seq,
                step: request.step,
                validation_score: request.validation_score,
                slot,
                path,
                size_bytes: size,
                created_at,
                metadata: request.metadata.clone(),
            });
        }

        let elapsed = start.elapsed();
        info!(
            seq = request.seq,
            step = request.step,
            size_bytes = size,
            elapsed_ms = elapsed.as_millis(),
            "Checkpoint write complete"
        );

        Ok(records)
    }

    /// Read and decode a committed checkpoint, returning its record and payload
    pub async fn read(&self, path: &str, slot: CheckpointSlot) -> Result<(CheckpointRecord, Bytes)> {
        let raw = self.storage.read(path).await?;
        let (header, payload) = Self::decode(path, &raw)?;

        let data = if header.compressed {
            Self::decompress_data(path, &payload)?
        } else {
            payload
        };

        Ok((Self::record_from_header(path, slot, &header, raw.len() as u64)?, data))
    }

    /// Read a committed checkpoint's record without decompressing the payload
    pub async fn read_record(&self, path: &str, slot: CheckpointSlot) -> Result<CheckpointRecord> {
        let raw = self.storage.read(path).await?;
        let (header, _) = Self::decode(path, &raw)?;
        Self::record_from_header(path, slot, &header, raw.len() as u64)
    }

    fn record_from_header(
        path: &str,
        slot: CheckpointSlot,
        header: &CheckpointHeader,
        size_bytes: u64,
    ) -> Result<CheckpointRecord> {
        let metadata: HashMap<String, String> = serde_json::from_str(&header.metadata_json)
            .map_err(|e| Error::CheckpointCorrupted {
                path: path.to_string(),
                reason: format!("invalid metadata: {}", e),
            })?;

        Ok(CheckpointRecord {
            seq: header.seq,
            step: header.step,
            validation_score: header.validation_score,
            slot,
            path: path.to_string(),
            size_bytes,
            created_at: header.created_at,
            metadata,
        })
    }

    /// Encode header and (optionally compressed) payload
    pub fn encode(&self, request: &WriteRequest, created_at: DateTime<Utc>) -> Result<Bytes> {
        let data = if self.compression {
            self.compress_data(&request.data)?
        } else {
            request.data.clone()
        };

        let header = CheckpointHeader {
            magic: CHECKPOINT_MAGIC,
            version: CHECKPOINT_VERSION,
            seq: request.seq,
            step: request.step,
            validation_score: request.validation_score,
            created_at,
            compressed: self.compression,
            data_size: data.len() as u64,
            metadata_json: serde_json::to_string(&request.metadata)?,
        };

        let mut buf = Vec::with_capacity(128 + data.len());

        buf.extend_from_slice(&header.magic);
        buf.extend_from_slice(&header.version.to_le_bytes());
        buf.extend_from_slice(&header.seq.to_le_bytes());
        buf.extend_from_slice(&header.step.to_le_bytes());

        // Score flag, then the value (zero when absent)
        buf.push(u8::from(header.validation_score.is_some()));
        buf.extend_from_slice(&header.validation_score.unwrap_or(0.0).to_le_bytes());

        buf.extend_from_slice(&header.created_at.timestamp_millis().to_le_bytes());
        buf.push(u8::from(header.compressed));
        buf.extend_from_slice(&header.data_size.to_le_bytes());

        let metadata_bytes = header.metadata_json.as_bytes();
        buf.extend_from_slice(&(metadata_bytes.len() as u32).to_le_bytes());
        buf.extend_from_slice(metadata_bytes);

        buf.extend_from_slice(&data);

        Ok(Bytes::from(buf))
    }

    /// Split a raw checkpoint file into header and stored payload
    pub fn decode(path: &str, raw: &Bytes) -> Result<(CheckpointHeader, Bytes)> {
        let mut cursor = HeaderCursor { raw, pos: 0, path };

        let magic: [u8; 4] = cursor.array()?;
        if magic != CHECKPOINT_MAGIC {
            return Err(cursor.corrupted("invalid checkpoint magic"));
        }

        let version = u32::from_le_bytes(cursor.array()?);
        if version != CHECKPOINT_VERSION {
            warn!(
                path,
                "Checkpoint version mismatch: expected {}, got {}", CHECKPOINT_VERSION, version
            );
        }

        let seq = u64::from_le_bytes(cursor.array()?);
        let step = u64::from_le_bytes(cursor.array()?);
        let [has_score] = cursor.array()?;
        let score = f64::from_le_bytes(cursor.array()?);
        let created_ms = i64::from_le_bytes(cursor.array()?);
        let [compressed] = cursor.array()?;
        let data_size = u64::from_le_bytes(cursor.array()?);
        let meta_len = u32::from_le_bytes(cursor.array()?) as usize;
        let metadata = cursor.take(meta_len)?;

        let metadata_json = String::from_utf8(metadata.to_vec())
            .map_err(|_| cursor.corrupted("metadata is not UTF-8"))?;
        let created_at = DateTime::from_timestamp_millis(created_ms)
            .ok_or_else(|| cursor.corrupted("invalid creation timestamp"))?;

        // A short payload means the file was cut off
        let remaining = raw.len() - cursor.pos;
        if remaining as u64 != data_size {
            return Err(cursor.corrupted(&format!(
                "payload length mismatch: header says {}, found {}",
                data_size, remaining
            )));
        }

        let header = CheckpointHeader {
            magic,
            version,
            seq,
            step,
            validation_score: (has_score != 0).then_some(score),
            created_at,
            compressed: compressed != 0,
            data_size,
            metadata_json,
        };

        Ok((header, raw.slice(cursor.pos..)))
    }

    fn compress_data(&self, data: &Bytes) -> Result<Bytes> {
        zstd::encode_all(&data[..], self.compression_level)
            .map(Bytes::from)
            .map_err(|e| Error::persistence(format!("Failed to compress checkpoint: {}", e)))
    }

    fn decompress_data(path: &str, data: &Bytes) -> Result<Bytes> {
        zstd::decode_all(&data[..])
            .map(Bytes::from)
            .map_err(|e| Error::CheckpointCorrupted {
                path: path.to_string(),
                reason: format!("failed to decompress payload: {}", e),
            })
    }
}

struct HeaderCursor<'a> {
    raw: &'a Bytes,
    pos: usize,
    path: &'a str,
}

impl<'a> HeaderCursor<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.pos + len;
        if end > self.raw.len() {
            return Err(self.corrupted("truncated header"));
        }
        let raw: &'a Bytes = self.raw;
        let slice = &raw[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let slice = self.take(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    fn corrupted(&self, reason: &str) -> Error {
        Error::CheckpointCorrupted {
            path: self.path.to_string(),
            reason: reason.to_string(),
        }
    }
}
