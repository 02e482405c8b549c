use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;

/// A unit of encoded audio data delivered by an active encoder.
///
/// Tagged with the generation of the encoder instance that produced it, so
/// the accumulated sequence can be checked for no-interleaving across
/// encoder replacements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedChunk {
    pub bytes: Vec<u8>,
    pub encoder_generation: u32,
}

/// Metadata describing a finalized recording.
///
/// Serializable for JSON export to the note-backend upload call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtifactMetadata {
    pub id: String,
    pub mime_type: String,
    pub byte_len: u64,
    pub duration_secs: f64,
    pub checksum: String,
    pub created_at: String,
}

impl ArtifactMetadata {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[derive(Debug)]
struct ArtifactInner {
    metadata: ArtifactMetadata,
    bytes: Vec<u8>,
    revoked: AtomicBool,
}

/// Revocable reference to a finalized recording.
///
/// Clones share the same underlying artifact; revoking any clone makes the
/// bytes unavailable through all of them. A revoked reference is never
/// reinstated.
#[derive(Debug, Clone)]
pub struct ArtifactRef {
    inner: Arc<ArtifactInner>,
}

impl ArtifactRef {
    pub(crate) fn new(metadata: ArtifactMetadata, bytes: Vec<u8>) -> Self {
        Self {
            inner: Arc::new(ArtifactInner {
                metadata,
                bytes,
                revoked: AtomicBool::new(false),
            }),
        }
    }

    pub fn metadata(&self) -> &ArtifactMetadata {
        &self.inner.metadata
    }

    pub fn mime_type(&self) -> &str {
        &self.inner.metadata.mime_type
    }

    /// The finalized byte sequence, or `None` once the reference is revoked.
    pub fn bytes(&self) -> Option<&[u8]> {
        if self.is_revoked() {
            None
        } else {
            Some(&self.inner.bytes)
        }
    }

    pub fn is_revoked(&self) -> bool {
        self.inner.revoked.load(Ordering::Acquire)
    }

    pub(crate) fn revoke(&self) {
        self.inner.revoked.store(true, Ordering::Release);
    }
}
