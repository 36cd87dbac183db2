//! Physical camera capture using nokhwa
//!
//! nokhwa's `Camera` is not `Send`, so the device is owned by a dedicated
//! worker thread. `DeviceSource` talks to it over channels and satisfies the
//! same `FrameSource` contract as the simulated backend.

use super::traits::{CameraInfo, Frame, FrameSource, PixelFormat, Resolution};
use crate::camera::{builtin_presets, CameraSettings};
use crate::utils::error::{CameraError, CameraResult};
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    ApiBackend, CameraFormat, CameraIndex, ControlValueSetter, FrameFormat, KnownCameraControl,
    RequestedFormat, RequestedFormatType, Resolution as NokhwaResolution,
};
use nokhwa::Camera;
use std::cmp::Reverse;
use std::sync::mpsc;
use std::thread::JoinHandle;

/// Get list of available cameras
pub fn get_cameras() -> Vec<CameraInfo> {
    match nokhwa::query(ApiBackend::Auto) {
        Ok(cameras) => cameras
            .into_iter()
            .map(|info| {
                let id = match info.index() {
                    CameraIndex::Index(i) => i.to_string(),
                    CameraIndex::String(s) => s.to_string(),
                };
                CameraInfo {
                    id,
                    name: info.human_name().to_string(),
                    supported_resolutions: device_resolutions(info.index()),
                }
            })
            .collect(),
        Err(e) => {
            tracing::warn!("Failed to enumerate cameras: {:?}", e);
            Vec::new()
        }
    }
}

/// Resolutions the device reports, largest first. A device that cannot be
/// opened right now (usually because the live stream holds it) is described
/// by the preset table instead.
fn device_resolutions(index: &CameraIndex) -> Vec<Resolution> {
    let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::None);
    let formats = Camera::new(index.clone(), requested)
        .and_then(|mut camera| camera.compatible_camera_formats());

    let resolutions = match formats {
        Ok(formats) => formats
            .iter()
            .map(|format| Resolution {
                width: format.width(),
                height: format.height(),
            })
            .collect(),
        Err(e) => {
            tracing::debug!("Cannot query formats of camera {}: {}", index, e);
            preset_resolutions()
        }
    };
    largest_first(resolutions)
}

fn preset_resolutions() -> Vec<Resolution> {
    builtin_presets()
        .values()
        .map(|settings| Resolution {
            width: settings.width,
            height: settings.height,
        })
        .collect()
}

fn largest_first(mut resolutions: Vec<Resolution>) -> Vec<Resolution> {
    resolutions.sort_by_key(|r| Reverse((r.width as u64 * r.height as u64, r.width, r.height)));
    resolutions.dedup();
    resolutions
}

enum WorkerRequest {
    Capture(mpsc::SyncSender<CameraResult<Frame>>),
    Close,
}

struct DeviceWorker {
    requests: mpsc::Sender<WorkerRequest>,
    thread: Option<JoinHandle<()>>,
}

/// Camera source backed by a physical device
pub struct DeviceSource {
    device_index: u32,
    worker: Option<DeviceWorker>,
}

impl DeviceSource {
    pub fn new(device_index: u32) -> Self {
        Self {
            device_index,
            worker: None,
        }
    }
}

fn open_camera(index: u32, settings: &CameraSettings) -> CameraResult<Camera> {
    let wanted = CameraFormat::new(
        NokhwaResolution::new(settings.width, settings.height),
        FrameFormat::MJPEG,
        settings.fps,
    );
    let format = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(wanted));

    let mut camera = Camera::new(CameraIndex::Index(index), format)
        .map_err(|e| CameraError::DeviceUnavailable(format!("camera {index}: {e}")))?;

    if settings.hdr {
        // No portable HDR switch; backlight compensation is the closest UVC control
        if let Err(e) = camera.set_camera_control(
            KnownCameraControl::BacklightComp,
            ControlValueSetter::Integer(1),
        ) {
            tracing::warn!("Camera does not support HDR/backlight compensation: {}", e);
        }
    }

    camera
        .open_stream()
        .map_err(|e| CameraError::DeviceUnavailable(format!("failed to open stream: {e}")))?;

    let actual = camera.camera_format();
    tracing::info!(
        "Webcam opened: {}x{} @ {}fps, format={:?} (requested {}x{} @ {}fps)",
        actual.resolution().width(),
        actual.resolution().height(),
        actual.frame_rate(),
        actual.format(),
        settings.width,
        settings.height,
        settings.fps
    );
    Ok(camera)
}

fn run_worker(mut camera: Camera, requests: mpsc::Receiver<WorkerRequest>) {
    let mut sequence: u64 = 0;
    while let Ok(request) = requests.recv() {
        match request {
            WorkerRequest::Capture(reply) => {
                let result = camera
                    .frame()
                    .map_err(|e| CameraError::CaptureFailed(e.to_string()))
                    .and_then(|buffer| {
                        buffer
                            .decode_image::<RgbFormat>()
                            .map_err(|e| CameraError::CaptureFailed(format!("decode: {e}")))
                    })
                    .map(|image| {
                        let (width, height) = image.dimensions();
                        let frame =
                            Frame::new(width, height, PixelFormat::Rgb24, image.into_raw(), sequence);
                        sequence += 1;
                        frame
                    });
                // Requester may have given up; nothing to do then
                let _ = reply.send(result);
            }
            WorkerRequest::Close => break,
        }
    }

    if let Err(e) = camera.stop_stream() {
        tracing::warn!("Error stopping camera stream: {:?}", e);
    }
    tracing::info!("Webcam worker stopped after {} frames", sequence);
}

impl FrameSource for DeviceSource {
    fn name(&self) -> &str {
        "device"
    }

    fn open(&mut self, settings: &CameraSettings) -> CameraResult<()> {
        if self.worker.is_some() {
            return Err(CameraError::DeviceUnavailable(
                "device already open".to_string(),
            ));
        }

        let index = self.device_index;
        let settings = *settings;
        let (request_tx, request_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::sync_channel::<CameraResult<()>>(1);

        let thread = std::thread::Builder::new()
            .name("camera-device".to_string())
            .spawn(move || match open_camera(index, &settings) {
                Ok(camera) => {
                    let _ = ready_tx.send(Ok(()));
                    run_worker(camera, request_rx);
                }
                Err(e) => {
                    tracing::error!("Failed to open camera {}: {}", index, e);
                    let _ = ready_tx.send(Err(e));
                }
            })
            .map_err(|e| CameraError::DeviceUnavailable(format!("spawn worker: {e}")))?;

        let ready = ready_rx.recv().unwrap_or_else(|_| {
            Err(CameraError::DeviceUnavailable(
                "camera worker exited during open".to_string(),
            ))
        });

        match ready {
            Ok(()) => {
                self.worker = Some(DeviceWorker {
                    requests: request_tx,
                    thread: Some(thread),
                });
                Ok(())
            }
            Err(e) => {
                let _ = thread.join();
                Err(e)
            }
        }
    }

    fn capture_frame(&mut self) -> CameraResult<Frame> {
        let worker = self
            .worker
            .as_ref()
            .ok_or_else(|| CameraError::CaptureFailed("device is not open".to_string()))?;

        let (reply_tx, reply_rx) = mpsc::sync_channel(1);
        worker
            .requests
            .send(WorkerRequest::Capture(reply_tx))
            .map_err(|_| CameraError::DeviceUnavailable("camera worker has stopped".to_string()))?;
        reply_rx
            .recv()
            .map_err(|_| CameraError::DeviceUnavailable("camera worker has stopped".to_string()))?
    }

    fn close(&mut self) {
        if let Some(mut worker) = self.worker.take() {
            let _ = worker.requests.send(WorkerRequest::Close);
            if let Some(handle) = worker.thread.take() {
                let _ = handle.join();
            }
            tracing::info!("Webcam capture closed");
        }
    }

    fn is_open(&self) -> bool {
        self.worker.is_some()
    }
}

impl Drop for DeviceSource {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn res(width: u32, height: u32) -> Resolution {
        Resolution { width, height }
    }

    #[test]
    fn test_resolutions_are_deduplicated_largest_first() {
        let sorted = largest_first(vec![
            res(640, 480),
            res(1920, 1080),
            res(640, 480),
            res(1280, 720),
            res(1920, 1080),
        ]);
        assert_eq!(sorted, vec![res(1920, 1080), res(1280, 720), res(640, 480)]);
    }

    #[test]
    fn test_preset_fallback_covers_every_preset() {
        let resolutions = largest_first(preset_resolutions());
        assert_eq!(resolutions.len(), builtin_presets().len());
        assert_eq!(resolutions[0], res(4608, 2592));
        assert!(resolutions.contains(&res(640, 480)));
    }
}
