use crate::models::artifact::ArtifactRef;
use crate::models::error::CaptureError;
use crate::models::state::SessionState;

/// Push notifications for UI binding.
///
/// All methods are called from session worker threads, not the UI thread.
/// Implementations should marshal to the UI thread if needed.
pub trait SessionObserver: Send + Sync {
    /// Called when the observable session state changes.
    fn on_state_changed(&self, state: SessionState);

    /// Called periodically with the current normalized loudness while the
    /// session is active.
    fn on_level(&self, level: f32);

    /// Called when an error condition is surfaced.
    fn on_error(&self, error: &CaptureError);

    /// Called when a recording is finalized into an artifact.
    fn on_artifact(&self, artifact: &ArtifactRef);
}
