mod capture;

pub use capture::{CaptureSession, SessionCapabilities};
