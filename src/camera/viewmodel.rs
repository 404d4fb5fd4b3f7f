/// Capture view-model
///
/// Adapts session manager events into view-observable fields and
/// bridges the permission checks. Bindings are plain subscriptions
/// held by the view-model and are torn down with it.
use tokio::sync::oneshot;

use crate::observable::Subscription;

use super::device::{CapturedPhoto, FocusPoint};
use super::permission::{AuthorizationStatus, DevicePermissions, PermissionProvider};
use super::{gallery, AlertError, CameraManager, SessionStatus};

pub struct CameraViewModel {
    pub manager: CameraManager,
    permissions: Box<dyn PermissionProvider>,

    // View-observable fields
    pub is_flash_on: bool,
    pub show_alert_error: bool,
    pub alert_error: AlertError,
    pub show_setting_alert: bool,
    pub is_permission_granted: bool,
    pub captured_image: Option<CapturedPhoto>,
    pub is_image_captured: bool,

    // Bindings onto the manager's observables
    alert_binding: Option<Subscription<Option<AlertError>>>,
    image_binding: Option<Subscription<Option<CapturedPhoto>>>,
}

impl CameraViewModel {
    pub fn new() -> Self {
        Self::with_parts(
            CameraManager::new(),
            Box::new(DevicePermissions::new(gallery::default_dir())),
        )
    }

    pub fn with_parts(manager: CameraManager, permissions: Box<dyn PermissionProvider>) -> Self {
        CameraViewModel {
            manager,
            permissions,
            is_flash_on: false,
            show_alert_error: false,
            alert_error: AlertError::default(),
            show_setting_alert: false,
            is_permission_granted: false,
            captured_image: None,
            is_image_captured: false,
            alert_binding: None,
            image_binding: None,
        }
    }

    /// Subscribe to the manager's alert and captured-image signals.
    pub fn setup_bindings(&mut self) {
        self.alert_binding = Some(self.manager.alert.subscribe());
        self.image_binding = Some(self.manager.captured_image.subscribe());
    }

    /// Drain pending manager events into the view-observable fields.
    /// Called from the UI thread.
    pub fn pump(&mut self) {
        if let Some(binding) = &self.alert_binding {
            while let Some(alert) = binding.try_recv() {
                match alert {
                    Some(alert) => {
                        self.alert_error = alert;
                        self.show_alert_error = true;
                    }
                    None => self.show_alert_error = false,
                }
            }
        }

        if let Some(binding) = &self.image_binding {
            while let Some(image) = binding.try_recv() {
                if image.is_some() {
                    self.is_image_captured = true;
                }
                self.captured_image = image;
            }
        }
    }

    /// One-shot camera access request. On a grant the session is
    /// configured; on a denial the only recovery is the system
    /// settings, surfaced through `show_setting_alert`.
    pub fn request_camera_permission(&mut self) {
        if self.permissions.request_camera_access() {
            self.is_permission_granted = true;
            self.configure_camera();
        } else {
            self.show_setting_alert = true;
        }
    }

    /// Non-prompting status probe.
    pub fn check_device_permission(&mut self) {
        match self.permissions.camera_status() {
            AuthorizationStatus::Authorized => {
                self.is_permission_granted = true;
            }
            AuthorizationStatus::NotDetermined => {
                let _ = self.permissions.request_camera_access();
            }
            AuthorizationStatus::Denied => {
                self.is_permission_granted = false;
                self.show_setting_alert = true;
            }
        }
    }

    pub fn configure_camera(&mut self) {
        if self.manager.status.get() == SessionStatus::Unconfigured {
            self.manager.configure();
        }
    }

    /// One deferred re-attempt when the session is still unconfigured
    /// shortly after the first try.
    pub fn retry_configure_if_needed(&mut self) {
        if self.is_permission_granted && self.manager.status.get() == SessionStatus::Unconfigured {
            log::info!("Retrying camera configuration...");
            self.manager.configure();
        }
    }

    pub fn switch_camera(&mut self) {
        self.manager.switch_position();
    }

    pub fn switch_flash(&mut self) {
        self.is_flash_on = !self.is_flash_on;
        self.manager.set_torch(self.is_flash_on);
    }

    pub fn zoom(&mut self, factor: f32) {
        self.manager.set_zoom(factor);
    }

    pub fn set_focus(&mut self, point: FocusPoint) {
        self.manager.set_focus(point);
    }

    /// Press the shutter. Gallery authorization is requested on every
    /// call, and the capture only proceeds while the gallery
    /// permission is not fully denied.
    pub fn capture_image(&mut self) -> Option<oneshot::Receiver<Option<CapturedPhoto>>> {
        if self.permissions.request_gallery_access() == AuthorizationStatus::Denied {
            self.show_setting_alert = true;
        }

        if self.permissions.gallery_status() != AuthorizationStatus::Denied {
            Some(self.manager.capture_photo())
        } else {
            None
        }
    }
}

impl Drop for CameraViewModel {
    fn drop(&mut self) {
        // Stop capturing when the view-model goes away
        self.manager.stop_capturing();
    }
}

#[cfg(test)]
mod tests {
    use super::super::device::testing::{
        default_caps, new_event_log, DiscoveryBehavior, FakeDiscovery, FakeEvent,
    };
    use super::super::permission::testing::StubPermissions;
    use super::*;
    use std::time::Duration;

    fn temp_gallery() -> std::path::PathBuf {
        std::env::temp_dir()
            .join("wardrobe-studio-tests")
            .join(format!("viewmodel-{}", uuid::Uuid::new_v4()))
    }

    fn view_model_with(
        behavior: DiscoveryBehavior,
        permissions: StubPermissions,
    ) -> (CameraViewModel, super::super::device::testing::EventLog) {
        let events = new_event_log();
        let discovery = FakeDiscovery::new(behavior, events.clone());
        let manager = CameraManager::with_parts(Box::new(discovery), temp_gallery());
        let mut view_model = CameraViewModel::with_parts(manager, Box::new(permissions));
        view_model.setup_bindings();
        (view_model, events)
    }

    fn wait_for_status(view_model: &CameraViewModel, expected: SessionStatus) {
        let sub = view_model.manager.status.subscribe();
        if view_model.manager.status.get() == expected {
            return;
        }
        for _ in 0..20 {
            if let Some(status) = sub.recv_timeout(Duration::from_millis(500)) {
                if status == expected {
                    return;
                }
            }
        }
        panic!("session never reached status {expected:?}");
    }

    #[test]
    fn test_camera_permission_denied_end_to_end() {
        let (mut view_model, events) = view_model_with(
            DiscoveryBehavior::Bind(default_caps()),
            StubPermissions::denying(),
        );

        view_model.request_camera_permission();

        assert!(!view_model.is_permission_granted);
        assert!(view_model.show_setting_alert);
        assert_eq!(view_model.manager.status.get(), SessionStatus::Unconfigured);
        // Configuration never ran, so the hardware was never touched
        assert!(events.lock().is_empty());
    }

    #[test]
    fn test_camera_permission_granted_configures_session() {
        let (mut view_model, events) = view_model_with(
            DiscoveryBehavior::Bind(default_caps()),
            StubPermissions::granting(),
        );

        view_model.request_camera_permission();

        assert!(view_model.is_permission_granted);
        assert!(!view_model.show_setting_alert);
        wait_for_status(&view_model, SessionStatus::Configured);
        assert!(events.lock().contains(&FakeEvent::Started));
    }

    #[test]
    fn test_capture_is_gated_on_gallery_permission() {
        let permissions = StubPermissions {
            camera: AuthorizationStatus::Authorized,
            gallery: AuthorizationStatus::Denied,
        };
        let (mut view_model, events) =
            view_model_with(DiscoveryBehavior::Bind(default_caps()), permissions);

        view_model.request_camera_permission();
        wait_for_status(&view_model, SessionStatus::Configured);

        assert!(view_model.capture_image().is_none());
        assert!(view_model.show_setting_alert);
        assert!(!events.lock().contains(&FakeEvent::Shutter));
    }

    #[test]
    fn test_bindings_surface_capture_and_alert() {
        let (mut view_model, _events) = view_model_with(
            DiscoveryBehavior::Bind(default_caps()),
            StubPermissions::granting(),
        );

        view_model.request_camera_permission();
        wait_for_status(&view_model, SessionStatus::Configured);

        let reply = view_model.capture_image().expect("capture should proceed");
        let photo = reply.blocking_recv().expect("reply should resolve");
        assert!(photo.is_some());

        view_model.pump();
        assert!(view_model.is_image_captured);
        assert!(view_model.captured_image.is_some());
    }

    #[test]
    fn test_alert_binding_sets_flag() {
        let (mut view_model, _events) =
            view_model_with(DiscoveryBehavior::NoDevice, StubPermissions::granting());

        let alert_sub = view_model.manager.alert.subscribe();
        view_model.request_camera_permission();
        // Wait until the session thread has raised the alert
        assert!(alert_sub.recv_timeout(Duration::from_secs(5)).is_some());

        view_model.pump();
        assert!(view_model.show_alert_error);
        assert_eq!(view_model.alert_error.title, "Camera Error");
    }

    #[test]
    fn test_retry_skipped_once_configured() {
        let (mut view_model, events) = view_model_with(
            DiscoveryBehavior::Bind(default_caps()),
            StubPermissions::granting(),
        );

        view_model.request_camera_permission();
        wait_for_status(&view_model, SessionStatus::Configured);
        view_model.retry_configure_if_needed();

        // Sync point for any stray configure command
        let _ = view_model.manager.capture_photo().blocking_recv();
        let discoveries = events
            .lock()
            .iter()
            .filter(|e| matches!(e, FakeEvent::Discovered(_)))
            .count();
        assert_eq!(discoveries, 1);
    }
}
