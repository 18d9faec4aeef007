//! The artifact store contract and its on-disk envelope.

use super::key::CacheKey;
use crate::core::StageData;
use crate::errors::CnaflowError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Version of the artifact envelope.
pub const FORMAT_VERSION: u32 = 1;

/// Result of a publish-if-absent save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveOutcome {
    /// The artifact was published.
    Written,
    /// An artifact already existed under the key and was left untouched.
    AlreadyPresent,
}

/// Persistent, key-addressed storage for stage outputs.
///
/// `save` never overwrites; a partially written artifact is never visible to
/// `exists` or `load`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Returns true if an artifact is published under the key.
    ///
    /// Only checks metadata; never reads the payload.
    async fn exists(&self, key: &CacheKey) -> Result<bool, CnaflowError>;

    /// Loads and decodes the artifact under the key.
    async fn load(&self, key: &CacheKey) -> Result<StageData, CnaflowError>;

    /// Publishes the artifact unless one already exists under the key.
    async fn save(&self, key: &CacheKey, data: &StageData) -> Result<SaveOutcome, CnaflowError>;

    /// Publishes the artifact, atomically replacing any existing one.
    async fn replace(&self, key: &CacheKey, data: &StageData) -> Result<(), CnaflowError>;
}

/// Header line written in front of every payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactHeader {
    /// Envelope version.
    pub format_version: u32,
    /// Key the artifact was saved under.
    pub key: CacheKey,
    /// Payload kind.
    pub kind: String,
    /// Publication time.
    pub created_at: DateTime<Utc>,
    /// Hex SHA-256 of the payload bytes.
    pub sha256: String,
    /// Payload length in bytes.
    pub payload_len: usize,
}

/// Serializes a payload into a self-describing artifact.
pub fn encode_artifact(key: &CacheKey, data: &StageData) -> Result<Vec<u8>, CnaflowError> {
    if !data.is_finite() {
        return Err(CnaflowError::Serialization(format!(
            "refusing to store non-finite values under {key}"
        )));
    }
    let payload = serde_json::to_vec(data)?;
    let header = ArtifactHeader {
        format_version: FORMAT_VERSION,
        key: key.clone(),
        kind: data.kind().to_string(),
        created_at: Utc::now(),
        sha256: hex::encode(Sha256::digest(&payload)),
        payload_len: payload.len(),
    };
    let mut bytes = serde_json::to_vec(&header)?;
    bytes.push(b'\n');
    bytes.extend_from_slice(&payload);
    Ok(bytes)
}

/// Decodes and verifies an artifact read back from storage.
pub fn decode_artifact(key: &CacheKey, bytes: &[u8]) -> Result<StageData, CnaflowError> {
    let split = bytes
        .iter()
        .position(|&b| b == b'\n')
        .ok_or_else(|| CnaflowError::corrupt(key.as_str(), "missing header line"))?;
    let (header_bytes, rest) = bytes.split_at(split);
    let payload = &rest[1..];

    let header: ArtifactHeader = serde_json::from_slice(header_bytes)
        .map_err(|e| CnaflowError::corrupt(key.as_str(), format!("bad header: {e}")))?;
    if header.format_version != FORMAT_VERSION {
        return Err(CnaflowError::corrupt(
            key.as_str(),
            format!("unsupported format version {}", header.format_version),
        ));
    }
    if &header.key != key {
        return Err(CnaflowError::corrupt(
            key.as_str(),
            format!("artifact was saved under {}", header.key),
        ));
    }
    if header.payload_len != payload.len() {
        return Err(CnaflowError::corrupt(
            key.as_str(),
            format!("expected {} payload bytes, found {}", header.payload_len, payload.len()),
        ));
    }
    if hex::encode(Sha256::digest(payload)) != header.sha256 {
        return Err(CnaflowError::corrupt(key.as_str(), "checksum mismatch"));
    }

    let data: StageData = serde_json::from_slice(payload)
        .map_err(|e| CnaflowError::corrupt(key.as_str(), format!("bad payload: {e}")))?;
    if data.kind() != header.kind {
        return Err(CnaflowError::corrupt(
            key.as_str(),
            format!("header says {}, payload is {}", header.kind, data.kind()),
        ));
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheKeyBuilder, KeySegment};
    use crate::core::CoreCells;

    fn key(token: &'static str) -> CacheKey {
        CacheKeyBuilder::new("t").build(&[KeySegment::new(token)])
    }

    fn data() -> StageData {
        StageData::CoreCells(CoreCells::new(vec!["a".to_string(), "b".to_string()]))
    }

    #[test]
    fn test_envelope_round_trip() {
        let bytes = encode_artifact(&key("cc"), &data()).unwrap();
        assert_eq!(decode_artifact(&key("cc"), &bytes).unwrap(), data());
    }

    #[test]
    fn test_truncated_payload_is_corrupt() {
        let bytes = encode_artifact(&key("cc"), &data()).unwrap();
        let err = decode_artifact(&key("cc"), &bytes[..bytes.len() - 3]).unwrap_err();
        assert!(matches!(err, CnaflowError::CorruptArtifact { .. }));
    }

    #[test]
    fn test_flipped_byte_fails_checksum() {
        let mut bytes = encode_artifact(&key("cc"), &data()).unwrap();
        let last = bytes.len() - 3;
        bytes[last] = if bytes[last] == b'a' { b'b' } else { b'a' };
        let err = decode_artifact(&key("cc"), &bytes).unwrap_err();
        assert!(err.to_string().contains("checksum"));
    }

    #[test]
    fn test_key_mismatch_is_corrupt() {
        let bytes = encode_artifact(&key("cc"), &data()).unwrap();
        let err = decode_artifact(&key("pca"), &bytes).unwrap_err();
        assert!(matches!(err, CnaflowError::CorruptArtifact { .. }));
    }

    #[test]
    fn test_missing_header_is_corrupt() {
        let err = decode_artifact(&key("cc"), b"garbage").unwrap_err();
        assert!(matches!(err, CnaflowError::CorruptArtifact { .. }));
    }
}
