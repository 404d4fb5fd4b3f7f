/// Camera and picture-library authorization
///
/// Desktop platforms have no prompt-based permission API, so
/// authorization is modeled as sticky probe results: once a probe has
/// determined access, the status stays determined until the app is
/// restarted (recovery for a denial happens outside the app).
use std::path::PathBuf;

use nokhwa::utils::ApiBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationStatus {
    NotDetermined,
    Authorized,
    Denied,
}

/// Access checks the capture view-model runs before touching hardware
/// or writing to the picture library.
pub trait PermissionProvider: Send {
    fn camera_status(&self) -> AuthorizationStatus;
    /// One-shot camera access request. Returns whether access was
    /// granted.
    fn request_camera_access(&mut self) -> bool;

    fn gallery_status(&self) -> AuthorizationStatus;
    /// One-shot picture-library access request, returning the
    /// resulting status.
    fn request_gallery_access(&mut self) -> AuthorizationStatus;
}

/// Production provider: probes the camera backend for usable devices
/// and the picture directory for writability.
pub struct DevicePermissions {
    camera: AuthorizationStatus,
    gallery: AuthorizationStatus,
    gallery_dir: PathBuf,
}

impl DevicePermissions {
    pub fn new(gallery_dir: PathBuf) -> Self {
        DevicePermissions {
            camera: AuthorizationStatus::NotDetermined,
            gallery: AuthorizationStatus::NotDetermined,
            gallery_dir,
        }
    }
}

impl PermissionProvider for DevicePermissions {
    fn camera_status(&self) -> AuthorizationStatus {
        self.camera
    }

    fn request_camera_access(&mut self) -> bool {
        if self.camera == AuthorizationStatus::NotDetermined {
            self.camera = match nokhwa::query(ApiBackend::Auto) {
                Ok(devices) if !devices.is_empty() => AuthorizationStatus::Authorized,
                Ok(_) => {
                    log::warn!("No cameras visible to the capture backend");
                    AuthorizationStatus::Denied
                }
                Err(e) => {
                    log::warn!("Camera access probe failed: {e}");
                    AuthorizationStatus::Denied
                }
            };
        }
        self.camera == AuthorizationStatus::Authorized
    }

    fn gallery_status(&self) -> AuthorizationStatus {
        self.gallery
    }

    fn request_gallery_access(&mut self) -> AuthorizationStatus {
        if self.gallery == AuthorizationStatus::NotDetermined {
            self.gallery = match std::fs::create_dir_all(&self.gallery_dir) {
                Ok(()) => AuthorizationStatus::Authorized,
                Err(e) => {
                    log::warn!(
                        "Picture library at {} is not writable: {e}",
                        self.gallery_dir.display()
                    );
                    AuthorizationStatus::Denied
                }
            };
        }
        self.gallery
    }
}
