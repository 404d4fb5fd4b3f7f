/// Capture session management
///
/// `CameraManager` owns the camera hardware binding. All hardware work
/// runs on one dedicated session thread and executes in submission
/// order, so device access is never interleaved. Results flow back to
/// the UI through observables and a one-shot completion per capture.
use std::thread::JoinHandle;

use crossbeam_channel::{unbounded, Receiver, Sender};
use tokio::sync::oneshot;

use crate::observable::Observable;

pub mod device;
pub mod gallery;
pub mod permission;
pub mod viewmodel;

use device::{
    CameraPosition, CaptureDevice, CaptureSettings, CapturedPhoto, DeviceDiscovery, FlashMode,
    FocusPoint, NokhwaDiscovery, PhotoOrientation,
};

/// Represents the camera session's configuration status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Configured,
    Unconfigured,
    Unauthorized,
    Failed,
}

/// A user-facing error alert.
#[derive(Debug, Clone)]
pub struct AlertError {
    pub title: String,
    pub message: String,
    pub primary_button_title: String,
    pub secondary_button_title: Option<String>,
}

impl AlertError {
    pub fn new(title: &str, message: &str, primary_button_title: &str) -> Self {
        AlertError {
            title: title.to_string(),
            message: message.to_string(),
            primary_button_title: primary_button_title.to_string(),
            secondary_button_title: None,
        }
    }
}

impl Default for AlertError {
    fn default() -> Self {
        AlertError {
            title: String::new(),
            message: String::new(),
            primary_button_title: String::from("Accept"),
            secondary_button_title: None,
        }
    }
}

enum SessionCommand {
    Configure,
    StopRunning,
    SwitchPosition,
    SetTorch(bool),
    SetFocus(FocusPoint),
    SetZoom(f32),
    Capture {
        reply: oneshot::Sender<Option<CapturedPhoto>>,
    },
    Shutdown,
}

/// Owns the session thread and the observable session state.
pub struct CameraManager {
    commands: Sender<SessionCommand>,
    thread: Option<JoinHandle<()>>,

    pub status: Observable<SessionStatus>,
    pub alert: Observable<Option<AlertError>>,
    pub captured_image: Observable<Option<CapturedPhoto>>,
    pub position: Observable<CameraPosition>,
    pub flash_mode: Observable<FlashMode>,
}

impl CameraManager {
    pub fn new() -> Self {
        Self::with_parts(Box::new(NokhwaDiscovery::new()), gallery::default_dir())
    }

    pub fn with_parts(discovery: Box<dyn DeviceDiscovery>, gallery_dir: std::path::PathBuf) -> Self {
        let (commands, receiver) = unbounded();

        let status = Observable::new(SessionStatus::Unconfigured);
        let alert = Observable::new(None);
        let captured_image = Observable::new(None);
        let position = Observable::new(CameraPosition::Back);
        let flash_mode = Observable::new(FlashMode::Off);

        let worker = SessionWorker {
            discovery,
            device: None,
            gallery_dir,
            status: status.clone(),
            alert: alert.clone(),
            captured_image: captured_image.clone(),
            position: position.clone(),
            flash_mode: flash_mode.clone(),
        };

        let thread = std::thread::Builder::new()
            .name(String::from("camera-session"))
            .spawn(move || worker.run(receiver))
            .expect("Failed to spawn camera session thread");

        CameraManager {
            commands,
            thread: Some(thread),
            status,
            alert,
            captured_image,
            position,
            flash_mode,
        }
    }

    /// Configure the capture session. No-op unless the session is
    /// still unconfigured.
    pub fn configure(&self) {
        let _ = self.commands.send(SessionCommand::Configure);
    }

    /// Stop the running stream and release the device, keeping the
    /// session thread alive for a later reconfigure.
    pub fn stop_capturing(&self) {
        let _ = self.commands.send(SessionCommand::StopRunning);
    }

    /// Rebind to the camera on the opposite side.
    pub fn switch_position(&self) {
        let _ = self.commands.send(SessionCommand::SwitchPosition);
    }

    pub fn set_torch(&self, on: bool) {
        let _ = self.commands.send(SessionCommand::SetTorch(on));
    }

    pub fn set_focus(&self, point: FocusPoint) {
        let _ = self.commands.send(SessionCommand::SetFocus(point));
    }

    pub fn set_zoom(&self, factor: f32) {
        let _ = self.commands.send(SessionCommand::SetZoom(factor));
    }

    /// Press the shutter. The returned receiver resolves exactly once,
    /// with `None` when the capture could not be performed.
    pub fn capture_photo(&self) -> oneshot::Receiver<Option<CapturedPhoto>> {
        let (reply, receiver) = oneshot::channel();
        if self
            .commands
            .send(SessionCommand::Capture { reply })
            .is_err()
        {
            log::error!("Capture requested after the camera session shut down");
        }
        receiver
    }
}

impl Drop for CameraManager {
    fn drop(&mut self) {
        let _ = self.commands.send(SessionCommand::Shutdown);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Session state living on the session thread.
struct SessionWorker {
    discovery: Box<dyn DeviceDiscovery>,
    device: Option<Box<dyn CaptureDevice>>,
    gallery_dir: std::path::PathBuf,

    status: Observable<SessionStatus>,
    alert: Observable<Option<AlertError>>,
    captured_image: Observable<Option<CapturedPhoto>>,
    position: Observable<CameraPosition>,
    flash_mode: Observable<FlashMode>,
}

impl SessionWorker {
    fn run(mut self, receiver: Receiver<SessionCommand>) {
        log::info!("Camera session thread started");

        while let Ok(command) = receiver.recv() {
            match command {
                SessionCommand::Configure => self.handle_configure(),
                SessionCommand::StopRunning => self.handle_stop_running(),
                SessionCommand::SwitchPosition => self.handle_switch_position(),
                SessionCommand::SetTorch(on) => self.handle_set_torch(on),
                SessionCommand::SetFocus(point) => self.handle_set_focus(point),
                SessionCommand::SetZoom(factor) => self.handle_set_zoom(factor),
                SessionCommand::Capture { reply } => self.handle_capture(reply),
                SessionCommand::Shutdown => break,
            }
        }

        // Release the device lock before the thread exits
        if let Some(device) = &mut self.device {
            device.stop();
        }
        log::info!("Camera session thread stopped");
    }

    fn handle_configure(&mut self) {
        if self.status.get() != SessionStatus::Unconfigured {
            return;
        }

        self.setup_video_input();
        self.setup_photo_output();
        self.start_running();
    }

    /// Bind a camera for the current position as the session's video
    /// input.
    fn setup_video_input(&mut self) {
        let position = self.position.get();
        match self.discovery.discover(position) {
            Ok(device) => {
                self.device = Some(device);
                self.status.set(SessionStatus::Configured);
            }
            Err(device::CameraError::NoDevice(position)) => {
                log::warn!("No camera found for position {position:?}");
                self.status.set(SessionStatus::Unconfigured);
            }
            Err(e) => {
                log::error!("Couldn't create video device input: {e}");
                self.status.set(SessionStatus::Failed);
            }
        }
    }

    /// Verify the bound device can serve still captures.
    fn setup_photo_output(&mut self) {
        let Some(device) = &self.device else { return };

        if device.capabilities().supports_still_capture {
            self.status.set(SessionStatus::Configured);
        } else {
            log::error!("Could not add photo output to the session");
            self.status.set(SessionStatus::Failed);
        }
    }

    fn start_running(&mut self) {
        match self.status.get() {
            SessionStatus::Configured => {
                if let Some(device) = &mut self.device {
                    if let Err(e) = device.start() {
                        log::error!("Capture session failed to start: {e}");
                        self.raise_configuration_alert();
                    }
                }
            }
            SessionStatus::Unconfigured | SessionStatus::Unauthorized => {
                log::warn!(
                    "Capture session not started. Status: {:?}",
                    self.status.get()
                );
                self.raise_configuration_alert();
            }
            SessionStatus::Failed => {}
        }
    }

    fn raise_configuration_alert(&self) {
        self.alert.set(Some(AlertError::new(
            "Camera Error",
            "Camera configuration failed. Either your device camera is not available or its missing permissions",
            "ok",
        )));
    }

    fn handle_stop_running(&mut self) {
        if let Some(device) = &mut self.device {
            if device.is_running() {
                device.stop();
            }
        }
    }

    fn handle_switch_position(&mut self) {
        // Remove the current input first; a bind failure leaves the
        // session without one and the status shows it.
        let Some(mut old_device) = self.device.take() else {
            return;
        };
        let was_running = old_device.is_running();
        old_device.stop();
        drop(old_device);

        self.position.set(self.position.get().flipped());
        self.setup_video_input();

        if was_running {
            if let Some(device) = &mut self.device {
                if let Err(e) = device.start() {
                    log::error!("Failed to restart stream after camera switch: {e}");
                }
            }
        }
    }

    fn handle_set_torch(&mut self, on: bool) {
        let Some(device) = &mut self.device else { return };

        if !device.capabilities().has_torch {
            log::info!("Torch not available for this device.");
            return;
        }

        self.flash_mode
            .set(if on { FlashMode::On } else { FlashMode::Off });
        // Full intensity when enabling
        device.apply_torch(if on { 1.0 } else { 0.0 });
    }

    fn handle_set_focus(&mut self, point: FocusPoint) {
        let Some(device) = &mut self.device else { return };
        device.apply_focus(point, true);
    }

    fn handle_set_zoom(&mut self, factor: f32) {
        let Some(device) = &mut self.device else { return };

        let caps = device.capabilities();
        let clamped = factor.clamp(caps.min_zoom, caps.max_zoom);
        device.apply_zoom(clamped);
    }

    fn handle_capture(&mut self, reply: oneshot::Sender<Option<CapturedPhoto>>) {
        if self.status.get() != SessionStatus::Configured {
            log::warn!(
                "Capture requested but session is not configured (status {:?})",
                self.status.get()
            );
            let _ = reply.send(None);
            return;
        }
        let Some(device) = &mut self.device else {
            let _ = reply.send(None);
            return;
        };

        let caps = device.capabilities().clone();
        let settings = CaptureSettings::for_device(&caps, self.flash_mode.get());

        if settings.flash == FlashMode::On {
            device.apply_torch(1.0);
        }
        let result = device.snapshot(&settings);
        if settings.flash == FlashMode::On {
            device.apply_torch(0.0);
        }

        match result {
            Ok(mut photo) => {
                if settings.rotation_degrees == 90
                    && photo.orientation == PhotoOrientation::LandscapeLeft
                {
                    photo.image = image::imageops::rotate90(&photo.image);
                    photo.orientation = PhotoOrientation::Up;
                }

                match gallery::save_photo(&self.gallery_dir, &photo, settings.codec) {
                    Ok(path) => log::info!("📸 Image saved to gallery: {}", path.display()),
                    Err(e) => log::error!("Error saving image to gallery: {e}"),
                }

                self.captured_image.set(Some(photo.clone()));
                let _ = reply.send(Some(photo));
            }
            Err(e) => {
                log::error!("Error while capturing photo: {e}");
                let _ = reply.send(None);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::device::testing::{
        default_caps, new_event_log, DiscoveryBehavior, FakeDiscovery, FakeEvent,
    };
    use super::*;
    use std::time::Duration;

    fn temp_gallery() -> std::path::PathBuf {
        std::env::temp_dir()
            .join("wardrobe-studio-tests")
            .join(format!("session-{}", uuid::Uuid::new_v4()))
    }

    fn manager_with(behavior: DiscoveryBehavior) -> (CameraManager, super::device::testing::EventLog) {
        let events = new_event_log();
        let discovery = FakeDiscovery::new(behavior, events.clone());
        let manager = CameraManager::with_parts(Box::new(discovery), temp_gallery());
        (manager, events)
    }

    fn wait_for_status(manager: &CameraManager, expected: SessionStatus) {
        let sub = manager.status.subscribe();
        if manager.status.get() == expected {
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
    fn test_capture_requires_configured_session() {
        let (manager, events) = manager_with(DiscoveryBehavior::Bind(default_caps()));

        // No configure() before the shutter press
        let reply = manager.capture_photo();
        let photo = reply.blocking_recv().expect("reply should resolve");

        assert!(photo.is_none());
        assert!(manager.captured_image.get().is_none());
        assert!(!events.lock().contains(&FakeEvent::Shutter));
    }

    #[test]
    fn test_configure_and_capture() {
        let (manager, events) = manager_with(DiscoveryBehavior::Bind(default_caps()));

        manager.configure();
        wait_for_status(&manager, SessionStatus::Configured);

        let photo = manager
            .capture_photo()
            .blocking_recv()
            .expect("reply should resolve")
            .expect("capture should produce a photo");

        // The fake delivers landscape frames and supports rotation
        assert_eq!(photo.orientation, PhotoOrientation::Up);
        assert!(manager.captured_image.get().is_some());
        assert!(events.lock().contains(&FakeEvent::Shutter));
    }

    #[test]
    fn test_configure_is_idempotent() {
        let (manager, events) = manager_with(DiscoveryBehavior::Bind(default_caps()));

        manager.configure();
        manager.configure();
        wait_for_status(&manager, SessionStatus::Configured);

        // Sync point so both commands have been processed
        let _ = manager.capture_photo().blocking_recv();

        let discoveries = events
            .lock()
            .iter()
            .filter(|e| matches!(e, FakeEvent::Discovered(_)))
            .count();
        assert_eq!(discoveries, 1);
    }

    #[test]
    fn test_zoom_is_clamped_to_device_range() {
        let (manager, events) = manager_with(DiscoveryBehavior::Bind(default_caps()));

        manager.configure();
        wait_for_status(&manager, SessionStatus::Configured);

        manager.set_zoom(500.0);
        manager.set_zoom(-3.0);
        manager.set_zoom(2.5);
        let _ = manager.capture_photo().blocking_recv();

        let zooms: Vec<f32> = events
            .lock()
            .iter()
            .filter_map(|e| match e {
                FakeEvent::Zoom(factor) => Some(*factor),
                _ => None,
            })
            .collect();
        // default_caps() has a zoom range of [1.0, 5.0]
        assert_eq!(zooms, vec![5.0, 1.0, 2.5]);
    }

    #[test]
    fn test_missing_device_raises_alert_and_stays_unconfigured() {
        let (manager, events) = manager_with(DiscoveryBehavior::NoDevice);

        let alert_sub = manager.alert.subscribe();
        manager.configure();

        let alert = alert_sub
            .recv_timeout(Duration::from_secs(5))
            .expect("configure should raise an alert")
            .expect("alert should carry an error");
        assert_eq!(alert.title, "Camera Error");
        assert_eq!(manager.status.get(), SessionStatus::Unconfigured);
        assert!(!events.lock().contains(&FakeEvent::Started));
    }

    #[test]
    fn test_bind_failure_marks_session_failed() {
        let (manager, _events) = manager_with(DiscoveryBehavior::BindError);

        manager.configure();
        wait_for_status(&manager, SessionStatus::Failed);
    }

    #[test]
    fn test_switch_position_rebinds_opposite_camera() {
        let (manager, events) = manager_with(DiscoveryBehavior::Bind(default_caps()));

        manager.configure();
        wait_for_status(&manager, SessionStatus::Configured);
        manager.switch_position();
        let _ = manager.capture_photo().blocking_recv();

        assert_eq!(manager.position.get(), CameraPosition::Front);
        let discoveries: Vec<CameraPosition> = events
            .lock()
            .iter()
            .filter_map(|e| match e {
                FakeEvent::Discovered(position) => Some(*position),
                _ => None,
            })
            .collect();
        assert_eq!(discoveries, vec![CameraPosition::Back, CameraPosition::Front]);
    }

    #[test]
    fn test_torch_unavailable_is_logged_only() {
        let mut caps = default_caps();
        caps.has_torch = false;
        caps.flash_available = false;
        let (manager, events) = manager_with(DiscoveryBehavior::Bind(caps));

        manager.configure();
        wait_for_status(&manager, SessionStatus::Configured);
        manager.set_torch(true);
        let _ = manager.capture_photo().blocking_recv();

        assert_eq!(manager.flash_mode.get(), FlashMode::Off);
        assert!(!events
            .lock()
            .iter()
            .any(|e| matches!(e, FakeEvent::Torch(_))));
    }

    #[test]
    fn test_flash_pulses_torch_around_capture() {
        let (manager, events) = manager_with(DiscoveryBehavior::Bind(default_caps()));

        manager.configure();
        wait_for_status(&manager, SessionStatus::Configured);
        manager.set_torch(true);
        let _ = manager.capture_photo().blocking_recv();

        let log = events.lock();
        let sequence: Vec<&FakeEvent> = log
            .iter()
            .filter(|e| matches!(e, FakeEvent::Torch(_) | FakeEvent::Shutter))
            .collect();
        assert_eq!(
            sequence,
            vec![
                &FakeEvent::Torch(1.0), // set_torch(true)
                &FakeEvent::Torch(1.0), // flash on
                &FakeEvent::Shutter,
                &FakeEvent::Torch(0.0), // flash off
            ]
        );
    }

    #[test]
    fn test_focus_forwards_point_with_monitoring() {
        let (manager, events) = manager_with(DiscoveryBehavior::Bind(default_caps()));

        manager.configure();
        wait_for_status(&manager, SessionStatus::Configured);
        manager.set_focus(FocusPoint { x: 0.25, y: 0.75 });
        let _ = manager.capture_photo().blocking_recv();

        assert!(events
            .lock()
            .contains(&FakeEvent::Focus(0.25, 0.75, true)));
    }
}
