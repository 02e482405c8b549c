//! Simulated platform backend for `voicenote-capture-core`.
//!
//! Provides a scriptable [`SimBackend`] (synthetic tone-generating devices,
//! hot-plug, permission and capability toggles) and a [`SimEncoderFactory`]
//! producing raw-PCM chunk encoders, so the full capture engine can be
//! exercised without audio hardware.

mod backend;
mod encoder;
mod stream;

pub use backend::SimBackend;
pub use encoder::SimEncoderFactory;
