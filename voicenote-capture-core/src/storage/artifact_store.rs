use chrono::Utc;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::artifact::{ArtifactMetadata, ArtifactRef, EncodedChunk};

/// Holds at most one finalized recording at a time.
///
/// Finalizing a new recording revokes and replaces the previous one, so a
/// stale reference held by the UI can never read bytes from a recording the
/// user already replaced.
#[derive(Default)]
pub struct ArtifactStore {
    current: Option<ArtifactRef>,
}

impl ArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assemble accumulated chunks into a single artifact, in delivery
    /// order, and make it the store's current recording.
    pub fn finalize(
        &mut self,
        chunks: &[EncodedChunk],
        mime_type: &str,
        duration_secs: f64,
    ) -> ArtifactRef {
        self.discard();

        let total: usize = chunks.iter().map(|c| c.bytes.len()).sum();
        let mut bytes = Vec::with_capacity(total);
        for chunk in chunks {
            bytes.extend_from_slice(&chunk.bytes);
        }

        let checksum = Sha256::digest(&bytes)
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect::<String>();

        let metadata = ArtifactMetadata {
            id: Uuid::new_v4().to_string(),
            mime_type: mime_type.to_string(),
            byte_len: bytes.len() as u64,
            duration_secs,
            checksum,
            created_at: Utc::now().to_rfc3339(),
        };
        log::info!(
            "finalized recording {} ({} bytes, {:.1}s, {})",
            metadata.id,
            metadata.byte_len,
            duration_secs,
            mime_type
        );

        let artifact = ArtifactRef::new(metadata, bytes);
        self.current = Some(artifact.clone());
        artifact
    }

    pub fn current(&self) -> Option<&ArtifactRef> {
        self.current.as_ref()
    }

    /// Revoke and drop the current recording, if any.
    pub fn discard(&mut self) {
        if let Some(previous) = self.current.take() {
            previous.revoke();
        }
    }
}
