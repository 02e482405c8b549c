//! Device enumeration with hot-plug notification.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::error::CaptureError;
use crate::models::source::AudioSourceInfo;
use crate::traits::device_access::{DeviceAccess, DeviceChangeListener};

/// Listener invoked with the refreshed source list after a hot-plug event.
pub type CatalogListener = Arc<dyn Fn(&[AudioSourceInfo]) + Send + Sync + 'static>;

/// Enumerates capturable audio sources and re-enumerates on hot-plug.
///
/// Microphone entries come from the platform; when the platform supports
/// display capture a single synthetic desktop-audio entry is appended. The
/// catalog never holds streams open — entries are identity only.
pub struct DeviceCatalog {
    access: Arc<dyn DeviceAccess>,
    listeners: Arc<Mutex<Vec<CatalogListener>>>,
    watching: Mutex<bool>,
}

impl DeviceCatalog {
    pub fn new(access: Arc<dyn DeviceAccess>) -> Self {
        Self {
            access,
            listeners: Arc::new(Mutex::new(Vec::new())),
            watching: Mutex::new(false),
        }
    }

    /// Enumerate the current source list.
    ///
    /// Requests microphone permission first so device labels are populated;
    /// the permission stream (if the platform needs one for the prompt) is
    /// released before this returns.
    pub fn refresh(&self) -> Result<Vec<AudioSourceInfo>, CaptureError> {
        enumerate_sources(self.access.as_ref())
    }

    /// Register a hot-plug listener. The first registration installs the
    /// platform watch; later ones share it.
    pub fn on_change(&self, listener: CatalogListener) {
        self.listeners.lock().push(listener);

        let mut watching = self.watching.lock();
        if *watching {
            return;
        }
        *watching = true;

        let access = Arc::clone(&self.access);
        let listeners = Arc::clone(&self.listeners);
        let on_devices_changed: DeviceChangeListener = Arc::new(move || {
            match enumerate_sources(access.as_ref()) {
                Ok(sources) => {
                    for listener in listeners.lock().iter() {
                        listener(&sources);
                    }
                }
                Err(err) => log::warn!("device re-enumeration failed: {err}"),
            }
        });
        self.access.watch_devices(on_devices_changed);
    }
}

fn enumerate_sources(access: &dyn DeviceAccess) -> Result<Vec<AudioSourceInfo>, CaptureError> {
    access.request_permission()?;
    let mut sources = access.enumerate()?;
    if access.supports_desktop_capture() {
        sources.push(AudioSourceInfo::desktop());
    }
    Ok(sources)
}
