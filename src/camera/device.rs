/// Capture device access
///
/// The session manager talks to hardware through the `DeviceDiscovery`
/// and `CaptureDevice` traits. The production implementations wrap
/// nokhwa; tests substitute fakes.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use image::RgbaImage;
use nokhwa::pixel_format::RgbAFormat;
use nokhwa::utils::{
    ApiBackend, CameraIndex, ControlValueDescription, ControlValueSetter, FrameFormat,
    KnownCameraControl, RequestedFormat, RequestedFormatType,
};
use nokhwa::Camera;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which of the machine's cameras a session should bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CameraPosition {
    Front,
    Back,
}

impl CameraPosition {
    pub fn flipped(self) -> Self {
        match self {
            CameraPosition::Front => CameraPosition::Back,
            CameraPosition::Back => CameraPosition::Front,
        }
    }

    /// Enumeration slot this position maps to. The primary camera is
    /// treated as the back camera, a secondary one as the front.
    fn device_index(self) -> usize {
        match self {
            CameraPosition::Back => 0,
            CameraPosition::Front => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashMode {
    On,
    Off,
}

/// Encoding used when a captured original is written to the picture
/// library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhotoCodec {
    Jpeg,
    Png,
}

impl PhotoCodec {
    pub fn extension(self) -> &'static str {
        match self {
            PhotoCodec::Jpeg => "jpg",
            PhotoCodec::Png => "png",
        }
    }
}

/// Normalized focus/exposure point of interest, both axes in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FocusPoint {
    pub x: f32,
    pub y: f32,
}

/// Display orientation of a frame as it left the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhotoOrientation {
    Up,
    LandscapeLeft,
}

/// A still photo as delivered by the capture completion. Not mutated
/// after creation.
#[derive(Debug, Clone)]
pub struct CapturedPhoto {
    pub image: RgbaImage,
    pub orientation: PhotoOrientation,
    pub taken_at: DateTime<Utc>,
}

/// What the bound device can actually do. Queried once at bind time.
#[derive(Debug, Clone)]
pub struct DeviceCapabilities {
    pub name: String,
    pub min_zoom: f32,
    pub max_zoom: f32,
    pub has_torch: bool,
    pub flash_available: bool,
    pub supports_focus: bool,
    pub supports_rotation: bool,
    pub supports_still_capture: bool,
    /// Whether the native stream is already a compressed format.
    pub native_stream_compressed: bool,
}

/// Settings for a single shutter press, derived from the device's
/// capabilities at capture time.
#[derive(Debug, Clone)]
pub struct CaptureSettings {
    pub codec: PhotoCodec,
    pub flash: FlashMode,
    pub rotation_degrees: u32,
}

impl CaptureSettings {
    /// Build settings for one capture: prefer the compressed codec
    /// when the device already streams compressed frames, apply flash
    /// only when the device reports it available, and request the 90
    /// degree rotation correction when the device supports it.
    pub fn for_device(caps: &DeviceCapabilities, flash: FlashMode) -> Self {
        CaptureSettings {
            codec: if caps.native_stream_compressed {
                PhotoCodec::Jpeg
            } else {
                PhotoCodec::Png
            },
            flash: if caps.flash_available { flash } else { FlashMode::Off },
            rotation_degrees: if caps.supports_rotation { 90 } else { 0 },
        }
    }
}

#[derive(Debug, Error)]
pub enum CameraError {
    #[error("no camera found for position {0:?}")]
    NoDevice(CameraPosition),
    #[error("could not bind camera input: {0}")]
    Bind(String),
    #[error("camera stream error: {0}")]
    Stream(String),
    #[error("capture failed: {0}")]
    Capture(String),
}

/// Finds and binds a capture device for a requested position.
pub trait DeviceDiscovery: Send {
    fn discover(&mut self, position: CameraPosition) -> Result<Box<dyn CaptureDevice>, CameraError>;
}

/// One bound camera. All methods are called from the session thread
/// only, in submission order.
pub trait CaptureDevice: Send {
    fn capabilities(&self) -> &DeviceCapabilities;

    fn start(&mut self) -> Result<(), CameraError>;
    fn stop(&mut self);
    fn is_running(&self) -> bool;

    /// Apply an already-clamped zoom factor.
    fn apply_zoom(&mut self, factor: f32);
    /// Drive the torch hardware; 0.0 turns it off.
    fn apply_torch(&mut self, level: f32);
    /// Move the focus and exposure points of interest.
    fn apply_focus(&mut self, point: FocusPoint, monitor_subject_area: bool);

    /// Grab one still frame.
    fn snapshot(&mut self, settings: &CaptureSettings) -> Result<CapturedPhoto, CameraError>;
}

/// Production discovery over the nokhwa backend.
pub struct NokhwaDiscovery;

impl NokhwaDiscovery {
    pub fn new() -> Self {
        NokhwaDiscovery
    }
}

impl DeviceDiscovery for NokhwaDiscovery {
    fn discover(&mut self, position: CameraPosition) -> Result<Box<dyn CaptureDevice>, CameraError> {
        let devices = nokhwa::query(ApiBackend::Auto)
            .map_err(|e| CameraError::Bind(format!("camera enumeration failed: {e}")))?;

        let slot = position.device_index();
        if devices.len() <= slot {
            return Err(CameraError::NoDevice(position));
        }

        let device = NokhwaDevice::open(slot as u32)?;
        log::info!(
            "📷 Bound camera for position {:?}: {}",
            position,
            device.capabilities().name
        );
        Ok(Box::new(device))
    }
}

/// Requests applied to the camera on its capture thread.
enum ControlRequest {
    Start,
    Stop,
    Zoom(f32),
    Focus(FocusPoint),
}

/// Production device. The nokhwa camera lives on a dedicated capture
/// thread that decodes frames into a shared latest-frame slot; the
/// session thread drives it through control requests.
pub struct NokhwaDevice {
    caps: DeviceCapabilities,
    latest_frame: Arc<Mutex<Option<RgbaImage>>>,
    running: Arc<AtomicBool>,
    requests: Sender<ControlRequest>,
    thread_handle: Option<std::thread::JoinHandle<()>>,
}

impl NokhwaDevice {
    fn open(index: u32) -> Result<Self, CameraError> {
        let latest_frame = Arc::new(Mutex::new(None));
        let running = Arc::new(AtomicBool::new(false));
        let (requests, request_receiver) = crossbeam_channel::unbounded();
        let (caps_sender, caps_receiver) = crossbeam_channel::bounded(1);

        let frame_slot = Arc::clone(&latest_frame);
        let running_flag = Arc::clone(&running);

        let thread_handle = std::thread::Builder::new()
            .name(String::from("camera-capture"))
            .spawn(move || {
                capture_thread(index, request_receiver, caps_sender, frame_slot, running_flag);
            })
            .map_err(|e| CameraError::Bind(format!("failed to spawn capture thread: {e}")))?;

        // The thread reports the device capabilities once the camera
        // is bound, or the bind error
        let caps = match caps_receiver.recv_timeout(Duration::from_secs(10)) {
            Ok(Ok(caps)) => caps,
            Ok(Err(e)) => {
                let _ = thread_handle.join();
                return Err(e);
            }
            Err(_) => {
                return Err(CameraError::Bind(String::from(
                    "camera thread did not report in time",
                )))
            }
        };

        Ok(NokhwaDevice {
            caps,
            latest_frame,
            running,
            requests,
            thread_handle: Some(thread_handle),
        })
    }
}

impl CaptureDevice for NokhwaDevice {
    fn capabilities(&self) -> &DeviceCapabilities {
        &self.caps
    }

    fn start(&mut self) -> Result<(), CameraError> {
        self.requests
            .send(ControlRequest::Start)
            .map_err(|_| CameraError::Stream(String::from("capture thread is gone")))
    }

    fn stop(&mut self) {
        let _ = self.requests.send(ControlRequest::Stop);
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn apply_zoom(&mut self, factor: f32) {
        let _ = self.requests.send(ControlRequest::Zoom(factor));
    }

    fn apply_torch(&mut self, _level: f32) {
        // No torch hardware is reported for webcams, nothing to drive
        log::debug!("Torch request ignored by this device");
    }

    fn apply_focus(&mut self, point: FocusPoint, _monitor_subject_area: bool) {
        let _ = self.requests.send(ControlRequest::Focus(point));
    }

    fn snapshot(&mut self, _settings: &CaptureSettings) -> Result<CapturedPhoto, CameraError> {
        if !self.is_running() {
            return Err(CameraError::Capture(String::from("stream is not running")));
        }

        // The capture thread refreshes the slot continuously; right
        // after startup the first frame may still be in flight
        let deadline = Instant::now() + Duration::from_secs(3);
        loop {
            if let Some(image) = self.latest_frame.lock().clone() {
                return Ok(CapturedPhoto {
                    image,
                    orientation: PhotoOrientation::Up,
                    taken_at: Utc::now(),
                });
            }
            if Instant::now() >= deadline {
                return Err(CameraError::Capture(String::from("no frame available")));
            }
            std::thread::sleep(Duration::from_millis(20));
        }
    }
}

impl Drop for NokhwaDevice {
    fn drop(&mut self) {
        let _ = self.requests.send(ControlRequest::Stop);
        // Closing the channel ends the capture thread
        let (closed, _) = crossbeam_channel::unbounded();
        drop(std::mem::replace(&mut self.requests, closed));
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

/// Camera capture thread: binds the device, reports its capabilities,
/// then serves control requests and keeps the latest decoded frame
/// available while streaming.
fn capture_thread(
    index: u32,
    requests: Receiver<ControlRequest>,
    caps_sender: Sender<Result<DeviceCapabilities, CameraError>>,
    frame_slot: Arc<Mutex<Option<RgbaImage>>>,
    running: Arc<AtomicBool>,
) {
    let index = CameraIndex::Index(index);

    // Try the highest available resolution first, then fall back to a
    // permissive format request (the backends disagree about what they
    // will negotiate)
    let requested =
        RequestedFormat::new::<RgbAFormat>(RequestedFormatType::AbsoluteHighestResolution);
    let mut camera = match Camera::new(index.clone(), requested) {
        Ok(camera) => camera,
        Err(e) => {
            log::warn!("Failed to open camera with highest resolution: {e}");
            let fallback = RequestedFormat::new::<RgbAFormat>(RequestedFormatType::None);
            match Camera::new(index, fallback) {
                Ok(camera) => camera,
                Err(e) => {
                    let _ = caps_sender.send(Err(CameraError::Bind(e.to_string())));
                    return;
                }
            }
        }
    };

    let caps = probe_capabilities(&camera);
    let name = caps.name.clone();
    if caps_sender.send(Ok(caps)).is_err() {
        return;
    }

    let mut streaming = false;
    loop {
        if streaming {
            match requests.try_recv() {
                Ok(request) => {
                    handle_request(&mut camera, request, &mut streaming, &running, &name);
                    continue;
                }
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => break,
            }

            match camera.frame() {
                Ok(frame) => match frame.decode_image::<RgbAFormat>() {
                    Ok(image) => *frame_slot.lock() = Some(image),
                    Err(e) => log::warn!("Failed to decode frame: {e}"),
                },
                Err(e) => {
                    log::warn!("Failed to capture frame: {e}");
                    std::thread::sleep(Duration::from_millis(10));
                }
            }
        } else {
            match requests.recv() {
                Ok(request) => handle_request(&mut camera, request, &mut streaming, &running, &name),
                Err(_) => break,
            }
        }
    }

    if streaming {
        let _ = camera.stop_stream();
    }
    running.store(false, Ordering::Release);
    log::info!("Camera capture thread stopped");
}

fn handle_request(
    camera: &mut Camera,
    request: ControlRequest,
    streaming: &mut bool,
    running: &Arc<AtomicBool>,
    name: &str,
) {
    match request {
        ControlRequest::Start => {
            if !*streaming {
                match camera.open_stream() {
                    Ok(()) => {
                        *streaming = true;
                        running.store(true, Ordering::Release);
                        log::info!(
                            "📷 Camera stream opened: {} ({}x{})",
                            name,
                            camera.resolution().width(),
                            camera.resolution().height()
                        );
                    }
                    Err(e) => log::error!("Failed to open camera stream: {e}"),
                }
            }
        }
        ControlRequest::Stop => {
            if *streaming {
                if let Err(e) = camera.stop_stream() {
                    log::warn!("Failed to stop camera stream: {e}");
                }
                *streaming = false;
                running.store(false, Ordering::Release);
            }
        }
        ControlRequest::Zoom(factor) => {
            if let Err(e) = camera.set_camera_control(
                KnownCameraControl::Zoom,
                ControlValueSetter::Integer(factor.round() as i64),
            ) {
                log::debug!("Zoom control not applied by backend: {e}");
            }
        }
        ControlRequest::Focus(_point) => {
            // One-shot autofocus; the point of interest itself is not
            // addressable through the portable control set
            if let Err(e) = camera
                .set_camera_control(KnownCameraControl::Focus, ControlValueSetter::Integer(1))
            {
                log::debug!("Focus control not applied by backend: {e}");
            }
        }
    }
}

fn probe_capabilities(camera: &Camera) -> DeviceCapabilities {
    let (min_zoom, max_zoom) = match camera.camera_control(KnownCameraControl::Zoom) {
        Ok(control) => match control.description().clone() {
            ControlValueDescription::IntegerRange { min, max, .. } => {
                (min as f32, (max as f32).max(min as f32))
            }
            ControlValueDescription::FloatRange { min, max, .. } => {
                (min as f32, (max as f32).max(min as f32))
            }
            _ => (1.0, 1.0),
        },
        Err(_) => (1.0, 1.0),
    };

    let supports_focus = camera.camera_control(KnownCameraControl::Focus).is_ok();

    DeviceCapabilities {
        name: camera.info().human_name().to_string(),
        min_zoom,
        max_zoom,
        // Webcams expose neither a torch nor a one-shot flash
        has_torch: false,
        flash_available: false,
        supports_focus,
        // Desktop streams arrive upright, no rotation metadata
        supports_rotation: false,
        supports_still_capture: true,
        native_stream_compressed: camera.frame_format() == FrameFormat::MJPEG,
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_settings_prefer_compressed_codec() {
        let mut caps = testing::default_caps();
        caps.native_stream_compressed = true;
        let settings = CaptureSettings::for_device(&caps, FlashMode::Off);
        assert_eq!(settings.codec, PhotoCodec::Jpeg);

        caps.native_stream_compressed = false;
        let settings = CaptureSettings::for_device(&caps, FlashMode::Off);
        assert_eq!(settings.codec, PhotoCodec::Png);
    }

    #[test]
    fn test_capture_settings_flash_requires_availability() {
        let mut caps = testing::default_caps();
        caps.flash_available = false;
        let settings = CaptureSettings::for_device(&caps, FlashMode::On);
        assert_eq!(settings.flash, FlashMode::Off);

        caps.flash_available = true;
        let settings = CaptureSettings::for_device(&caps, FlashMode::On);
        assert_eq!(settings.flash, FlashMode::On);
    }

    #[test]
    fn test_capture_settings_rotation_follows_support() {
        let mut caps = testing::default_caps();
        caps.supports_rotation = true;
        assert_eq!(
            CaptureSettings::for_device(&caps, FlashMode::Off).rotation_degrees,
            90
        );

        caps.supports_rotation = false;
        assert_eq!(
            CaptureSettings::for_device(&caps, FlashMode::Off).rotation_degrees,
            0
        );
    }

    #[test]
    fn test_position_flip() {
        assert_eq!(CameraPosition::Back.flipped(), CameraPosition::Front);
        assert_eq!(CameraPosition::Front.flipped(), CameraPosition::Back);
    }
}
